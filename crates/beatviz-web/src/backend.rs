//! `fetch` calls against the same-origin proxy routes.
use beatviz_core::catalog::{
    routes, AudioAnalysis, PlayRequest, SearchResponse, Track, TransferRequest, UserProfile,
};
use beatviz_core::{BeatSchedule, Result, VisualizerConfig, VizError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::describe_js;

fn transport(err: &JsValue) -> VizError {
    VizError::Transport(describe_js(err))
}

#[derive(Clone, Debug)]
pub struct Backend {
    api_base: String,
    search_limit: u32,
}

impl Backend {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            search_limit: config.search_limit,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send(&self, method: &str, path: &str, body: Option<String>) -> Result<String> {
        let url = self.url(path);
        let opts = RequestInit::new();
        opts.set_method(method);
        opts.set_mode(if self.api_base.is_empty() {
            RequestMode::SameOrigin
        } else {
            RequestMode::Cors
        });
        if let Some(body) = &body {
            opts.set_body(&JsValue::from_str(body));
        }
        let request = Request::new_with_str_and_init(&url, &opts).map_err(|e| transport(&e))?;
        if body.is_some() {
            request
                .headers()
                .set("Content-Type", "application/json")
                .map_err(|e| transport(&e))?;
        }

        let window = web_sys::window().ok_or_else(|| VizError::Transport("no window".into()))?;
        let response: Response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| transport(&e))?
            .dyn_into()
            .map_err(|e| transport(&e))?;
        if !response.ok() {
            return Err(VizError::Http {
                status: response.status(),
                url,
            });
        }
        let text = JsFuture::from(response.text().map_err(|e| transport(&e))?)
            .await
            .map_err(|e| transport(&e))?;
        Ok(text.as_string().unwrap_or_default())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let text = self.send("GET", path, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let body = serde_json::to_string(body)?;
        self.send("POST", path, Some(body)).await.map(drop)
    }

    /// Bearer token for the playback SDK.
    pub async fn token(&self) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct TokenBody {
            access_token: Option<String>,
        }
        let text = self.send("GET", routes::TOKEN, None).await?;
        let token = serde_json::from_str::<TokenBody>(&text)
            .ok()
            .and_then(|b| b.access_token)
            .unwrap_or(text);
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(VizError::NoToken);
        }
        Ok(token)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let q = String::from(js_sys::encode_uri_component(query));
        let path = format!("{}?q={q}&limit={}", routes::SEARCH, self.search_limit);
        let res: SearchResponse = self.get_json(&path).await?;
        Ok(res.into_tracks())
    }

    /// `None` when the proxy has no logged-in user.
    pub async fn me(&self) -> Result<Option<UserProfile>> {
        match self.get_json(routes::ME).await {
            Ok(user) => Ok(Some(user)),
            Err(VizError::Http { status: 401, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn beat_schedule(&self, id: &str) -> Result<BeatSchedule> {
        let analysis: AudioAnalysis = self.get_json(&routes::analysis(id)).await?;
        Ok(analysis.beat_schedule())
    }

    pub async fn play(&self, device_id: &str, uri: &str) -> Result<()> {
        let body = PlayRequest {
            device_id: device_id.to_string(),
            uri: uri.to_string(),
        };
        self.post_json(routes::PLAY, &body).await
    }

    pub async fn transfer(&self, device_id: &str) -> Result<()> {
        let body = TransferRequest {
            device_id: device_id.to_string(),
        };
        self.post_json(routes::TRANSFER, &body).await
    }
}
