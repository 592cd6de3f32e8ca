use std::cell::RefCell;
use std::rc::Rc;

use beatviz_core::catalog::{format_clock, greeting_for, Track, UserProfile};
use beatviz_core::{
    handover, select_mode, AudioGate, BeatSchedule, FrameLoop, FrequencyAnalyzer, Handover,
    LoadTicket, Mode, PainterSurface, PlaybackCapabilities, PlaybackSample, RenderDriver, Result,
    TrackInfo, UserGesture, VisualizerConfig, VisualizerSession,
};
use eframe::egui;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_time::Instant;

mod audio;
mod backend;
mod sdk;
mod ui;

use crate::audio::{PreviewElement, WebAnalyser};
use crate::backend::Backend;
use crate::sdk::RemotePlayer;
use crate::ui::{PanelModel, UiAction};

const CANVAS_ID: &str = "beatviz_canvas";
const NO_PREVIEW: &str = "No preview available for this track.";

/// Best-effort text for a thrown JS value.
pub(crate) fn describe_js(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

/// Results of async work, drained at the top of every frame.
pub enum WebEvent {
    SearchResults(Result<Vec<Track>>),
    Profile(Option<UserProfile>),
    Beats {
        ticket: LoadTicket,
        result: Result<BeatSchedule>,
    },
    PlayerSample {
        track_ids: Vec<String>,
        sample: PlaybackSample,
    },
    DeviceReady {
        device_id: String,
        player: RemotePlayer,
    },
    DeviceGone,
}

pub struct BeatVizApp {
    config: VisualizerConfig,
    backend: Backend,
    session: VisualizerSession,
    driver: RenderDriver,
    frame_loop: FrameLoop,
    panel: PanelModel,
    inbox: Rc<RefCell<Vec<WebEvent>>>,
    preview: Option<PreviewElement>,
    gate: Rc<RefCell<AudioGate<WebAnalyser>>>,
    remote: Option<RemotePlayer>,
}

impl BeatVizApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: VisualizerConfig) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        let backend = Backend::new(&config);
        let mut app = Self {
            backend: backend.clone(),
            session: VisualizerSession::new(config.clone()),
            driver: RenderDriver::new(config.render.clone()),
            frame_loop: FrameLoop::new(),
            panel: PanelModel::new(&config.seed_query),
            inbox: Rc::new(RefCell::new(Vec::new())),
            preview: None,
            gate: Rc::new(RefCell::new(AudioGate::new())),
            remote: None,
            config,
        };

        app.gate.borrow().request_eager();
        if let Err(e) = sdk::install(backend, app.inbox.clone()) {
            log::error!("playback SDK hook not installed: {}", describe_js(&e));
        }
        app.stop_on_pagehide();
        app.fetch_profile();
        app.start_search();
        app
    }

    fn stop_on_pagehide(&self) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let stop = self.frame_loop.stop_handle();
        let on_hide = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            stop.stop();
            log::info!("page hidden, frame loop stopped");
        }) as Box<dyn FnMut(web_sys::Event)>);
        if let Err(e) =
            window.add_event_listener_with_callback("pagehide", on_hide.as_ref().unchecked_ref())
        {
            log::warn!("pagehide listener not installed: {}", describe_js(&e));
        }
        on_hide.forget();
    }

    fn fetch_profile(&self) {
        let backend = self.backend.clone();
        let inbox = self.inbox.clone();
        spawn_local(async move {
            let profile = backend.me().await.unwrap_or_else(|e| {
                log::warn!("profile request failed: {e}");
                None
            });
            inbox.borrow_mut().push(WebEvent::Profile(profile));
        });
    }

    fn start_search(&mut self) {
        let Some(query) = self.panel.begin_search() else {
            return;
        };
        let backend = self.backend.clone();
        let inbox = self.inbox.clone();
        spawn_local(async move {
            let result = backend.search(&query).await;
            inbox.borrow_mut().push(WebEvent::SearchResults(result));
        });
    }

    fn drain_inbox(&mut self) {
        let events: Vec<WebEvent> = self.inbox.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                WebEvent::SearchResults(Ok(tracks)) => {
                    self.panel.searching = false;
                    self.panel.selected = None;
                    self.panel.results = tracks.iter().map(TrackInfo::from).collect();
                    log::info!("{} search results", self.panel.results.len());
                }
                WebEvent::SearchResults(Err(e)) => {
                    self.panel.searching = false;
                    log::warn!("search failed: {e}");
                    self.panel.status = Some(format!("Search failed: {e}"));
                }
                WebEvent::Profile(profile) => {
                    self.panel.badge = greeting_for(profile.as_ref());
                }
                WebEvent::Beats { ticket, result } => {
                    self.session.apply_beat_schedule(&ticket, result);
                }
                WebEvent::PlayerSample { track_ids, sample } => {
                    let Some(ticket) = self.session.current_ticket() else {
                        continue;
                    };
                    // the SDK may still report the previous track for a moment
                    if sdk::sample_is_for(&track_ids, &ticket.track_id) {
                        self.session.record_sample(&ticket, sample);
                    } else {
                        log::debug!("sample for {track_ids:?} while {} is loaded", ticket.track_id);
                    }
                }
                WebEvent::DeviceReady { device_id, player } => {
                    self.session.set_device_id(Some(device_id));
                    self.remote = Some(player);
                    self.panel.remote_ready = true;
                }
                WebEvent::DeviceGone => {
                    self.session.set_device_id(None);
                    self.remote = None;
                    self.panel.remote_ready = false;
                }
            }
        }
    }

    /// Runs inside the click handler, so it may build the audio graph.
    fn select_track(&mut self, index: usize) {
        let Some(track) = self.panel.results.get(index).cloned() else {
            return;
        };
        self.panel.selected = Some(index);
        self.panel.status = None;
        self.panel.show_track(&track);

        let caps = PlaybackCapabilities {
            remote_player: self.session.device_id().is_some(),
        };
        let mode = select_mode(&track, caps);
        self.hand_over(mode);
        match mode {
            Mode::LiveFrequency => {
                let analyzer = self.start_preview(&track);
                self.session.load_track(track, mode, analyzer);
            }
            Mode::BeatPulse => {
                let device_id = self.session.device_id().unwrap_or_default().to_string();
                let ticket = self.session.load_track(track.clone(), mode, None);
                self.start_remote(device_id, track, ticket);
            }
            Mode::Idle => {
                self.session.load_track(track, mode, None);
                self.panel.status = Some(NO_PREVIEW.to_string());
            }
        }
        self.panel.mode = self.session.active_mode();
    }

    /// Silences whatever the outgoing track was playing on.
    fn hand_over(&self, next: Mode) {
        let Handover {
            pause_remote,
            stop_preview,
        } = handover(self.session.active_mode(), next);
        if pause_remote {
            if let Some(remote) = &self.remote {
                remote.pause();
            }
        }
        if stop_preview {
            if let Some(preview) = &self.preview {
                preview.pause();
            }
        }
    }

    fn start_preview(&mut self, track: &TrackInfo) -> Option<Box<dyn FrequencyAnalyzer>> {
        let url = track.preview_url.clone()?;
        if self.preview.is_none() {
            match PreviewElement::create() {
                Ok(p) => self.preview = Some(p),
                Err(e) => {
                    log::error!("{e}");
                    self.panel.status = Some(e.to_string());
                    return None;
                }
            }
        }
        let preview = self.preview.as_ref()?;

        let element = preview.element().clone();
        let analyser_config = self.config.analyser.clone();
        let activated = self
            .gate
            .borrow_mut()
            .activate(UserGesture::from_input_handler(), || {
                WebAnalyser::build(&element, &analyser_config)
            })
            .map(|analyser| analyser.resume_if_suspended());
        if let Err(e) = activated {
            self.panel.status = Some(format!("Audio unavailable: {e}"));
        }

        preview.set_volume(self.panel.volume);
        preview.load(&url);
        preview.play();
        Some(Box::new(self.gate.clone()))
    }

    fn start_remote(&self, device_id: String, track: TrackInfo, ticket: LoadTicket) {
        let backend = self.backend.clone();
        let inbox = self.inbox.clone();
        spawn_local(async move {
            if let Err(e) = backend.play(&device_id, &track.uri).await {
                log::warn!("could not start '{}' on {device_id}: {e}", track.name);
            }
            let result = backend.beat_schedule(&track.id).await;
            inbox.borrow_mut().push(WebEvent::Beats { ticket, result });
        });
    }

    fn play(&mut self) {
        match self.session.active_mode() {
            Mode::LiveFrequency => {
                if let Some(analyser) = self.gate.borrow().get() {
                    analyser.resume_if_suspended();
                }
                if let Some(preview) = &self.preview {
                    preview.play();
                }
            }
            Mode::BeatPulse => {
                if let Some(remote) = &self.remote {
                    remote.resume();
                }
            }
            Mode::Idle => {}
        }
    }

    fn pause(&mut self) {
        match self.session.active_mode() {
            Mode::LiveFrequency => {
                if let Some(preview) = &self.preview {
                    preview.pause();
                }
            }
            Mode::BeatPulse => {
                if let Some(remote) = &self.remote {
                    remote.pause();
                }
            }
            Mode::Idle => {}
        }
    }

    fn handle(&mut self, action: UiAction) {
        match action {
            UiAction::Search => self.start_search(),
            UiAction::Select(i) => self.select_track(i),
            UiAction::Play => self.play(),
            UiAction::Pause => self.pause(),
            UiAction::Volume(v) => {
                if let Some(preview) = &self.preview {
                    preview.set_volume(v);
                }
            }
        }
    }

    fn update_clock(&mut self, now: Instant) {
        let duration_ms = self.session.active_track().map_or(0, |t| t.duration_ms);
        let position = match self.session.active_mode() {
            Mode::LiveFrequency => self.preview.as_ref().map(|p| {
                let total = p.duration_seconds().map_or(duration_ms, |d| (d * 1000.0) as u64);
                (p.position_seconds(), total)
            }),
            Mode::BeatPulse => self.session.position(now).map(|p| (p, duration_ms)),
            Mode::Idle => None,
        };
        self.panel.clock = position.map(|(pos, total)| {
            format!("{} / {}", format_clock((pos * 1000.0) as u64), format_clock(total))
        });
    }
}

impl eframe::App for BeatVizApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_inbox();

        let mut action = None;
        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                action = ui::side_panel(ui, &mut self.panel);
            });
        if let Some(action) = action {
            self.handle(action);
        }

        let now = Instant::now();
        if self.session.active_mode() == Mode::BeatPulse {
            if let Some(remote) = &self.remote {
                remote.poll_state(&self.inbox);
            }
        }
        self.update_clock(now);

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                ui.allocate_rect(rect, egui::Sense::hover());
                let painter = ui.painter_at(rect);
                let mut surface = PainterSurface::new(&painter, rect);
                self.frame_loop
                    .tick(&mut self.session, &self.driver, &mut surface, ctx, now);
            });
    }
}

// WASM entry point
#[wasm_bindgen(start)]
pub fn start() -> std::result::Result<(), JsValue> {
    console_error_panic_hook::set_once();
    eframe::WebLogger::init(log::LevelFilter::Debug).ok();

    wasm_bindgen_futures::spawn_local(async {
        let document = web_sys::window()
            .expect("no global window exists")
            .document()
            .expect("should have a document on window");

        let canvas = document
            .get_element_by_id(CANVAS_ID)
            .expect("no canvas element with id 'beatviz_canvas'")
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .expect("element with id 'beatviz_canvas' is not a canvas");

        let web_options = eframe::WebOptions::default();
        let config = VisualizerConfig::default();

        if let Err(e) = eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(|cc| Ok(Box::new(BeatVizApp::new(cc, config)))),
            )
            .await
        {
            log::error!("failed to start eframe: {}", describe_js(&e));
        }
    });

    Ok(())
}
