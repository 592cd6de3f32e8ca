mod app;
mod client;
mod preview;
mod ui;
mod worker;

use beatviz_core::catalog::routes::web_api;
use beatviz_core::VisualizerConfig;
use eframe::NativeOptions;

use crate::app::BeatVizApp;
use crate::client::ApiClient;
use crate::worker::Worker;

/// Path to a JSON config file. Missing keys take their defaults.
const CONFIG_ENV: &str = "BEATVIZ_CONFIG";
/// Web API bearer token. Search and remote playback need it.
const TOKEN_ENV: &str = "BEATVIZ_TOKEN";

fn load_config() -> VisualizerConfig {
    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => VisualizerConfig::load(&path).unwrap_or_else(|e| {
            log::warn!("ignoring config {path}: {e}");
            VisualizerConfig::default()
        }),
        Err(_) => VisualizerConfig::default(),
    };
    if config.api_base.is_empty() {
        config.api_base = web_api::BASE.to_string();
    }
    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config();
    let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
    if token.is_none() {
        log::warn!("{TOKEN_ENV} not set; search and remote playback will fail");
    }

    let client = ApiClient::new(&config.api_base, token);
    let remote_enabled = client.has_token();
    let worker = match Worker::spawn(client) {
        Ok(w) => w,
        Err(e) => {
            log::error!("could not start network worker: {e}");
            return;
        }
    };

    let native_options = NativeOptions::default();
    if let Err(e) = eframe::run_native(
        "beatviz",
        native_options,
        Box::new(move |cc| Ok(Box::new(BeatVizApp::new(cc, config, worker, remote_enabled)))),
    ) {
        log::error!("failed to start native app: {e}");
    }
}
