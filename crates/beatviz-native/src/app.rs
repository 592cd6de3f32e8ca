use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use beatviz_core::catalog::greeting_for;
use beatviz_core::{
    handover, select_mode, AudioGate, FrameLoop, FrequencyAnalyzer, Handover, LoadTicket, Mode,
    PainterSurface, PlaybackCapabilities, RenderDriver, TrackInfo, UserGesture, VisualizerConfig,
    VisualizerSession,
};
use eframe::egui;
use web_time::Instant;

use crate::preview::{Clip, ClipAnalyzer, PreviewPlayer};
use crate::ui::{self, PanelModel, Progress, UiAction};
use crate::worker::{Job, Reply, Worker};

const NO_PREVIEW: &str = "No preview available for this track.";

type SharedPlayer = Rc<RefCell<PreviewPlayer>>;

pub struct BeatVizApp {
    config: VisualizerConfig,
    session: VisualizerSession,
    driver: RenderDriver,
    frame_loop: FrameLoop,
    panel: PanelModel,
    worker: Worker,
    remote_enabled: bool,
    output: AudioGate<SharedPlayer>,
    last_poll: Option<Instant>,
    poll_in_flight: bool,
}

impl BeatVizApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: VisualizerConfig,
        worker: Worker,
        remote_enabled: bool,
    ) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        let mut app = Self {
            session: VisualizerSession::new(config.clone()),
            driver: RenderDriver::new(config.render.clone()),
            frame_loop: FrameLoop::new(),
            panel: PanelModel::new(&config.seed_query, remote_enabled),
            worker,
            remote_enabled,
            output: AudioGate::new(),
            last_poll: None,
            poll_in_flight: false,
            config,
        };
        app.output.request_eager();
        if remote_enabled {
            app.worker.send(Job::Profile);
        }
        app.start_search();
        app
    }

    fn start_search(&mut self) {
        let Some(query) = self.panel.begin_search() else {
            return;
        };
        self.worker.send(Job::Search {
            query,
            limit: self.config.search_limit,
        });
    }

    fn player(&self) -> Option<&SharedPlayer> {
        self.output.get()
    }

    fn drain_replies(&mut self, now: Instant) {
        for reply in self.worker.drain() {
            match reply {
                Reply::SearchResults(Ok(tracks)) => {
                    self.panel.searching = false;
                    self.panel.selected = None;
                    self.panel.results = tracks.iter().map(TrackInfo::from).collect();
                    log::info!("{} search results", self.panel.results.len());
                }
                Reply::SearchResults(Err(e)) => {
                    self.panel.searching = false;
                    log::warn!("search failed: {e}");
                    self.panel.status = Some(format!("Search failed: {e}"));
                }
                Reply::Profile(result) => {
                    let profile = result
                        .inspect_err(|e| log::warn!("profile request failed: {e}"))
                        .ok();
                    self.panel.badge = greeting_for(profile.as_ref());
                }
                Reply::Beats { ticket, result } => {
                    self.session.apply_beat_schedule(&ticket, result);
                }
                Reply::Features { ticket, result } => {
                    if !self.session.is_current(&ticket) {
                        continue;
                    }
                    match result {
                        Ok(features) => self.panel.features = Some(features),
                        Err(e) => log::warn!("audio features for {} failed: {e}", ticket.track_id),
                    }
                }
                Reply::Preview { ticket, result } => self.on_preview(&ticket, result, now),
                Reply::Player {
                    ticket,
                    result,
                    captured_at,
                } => {
                    self.poll_in_flight = false;
                    match result {
                        Ok(Some(state)) => {
                            // the player may still report the previous track for a moment
                            if !state.is_for(&ticket.track_id) {
                                log::debug!(
                                    "player reports {:?}, waiting for {}",
                                    state.track_id(),
                                    ticket.track_id
                                );
                                continue;
                            }
                            if let Some(sample) = state.to_sample(captured_at) {
                                self.session.record_sample(&ticket, sample);
                            }
                        }
                        Ok(None) => log::debug!("no active playback"),
                        Err(e) => log::warn!("player state poll failed: {e}"),
                    }
                }
                Reply::Remote(Err(e)) => {
                    log::warn!("remote playback command failed: {e}");
                    self.panel.status = Some(format!("Remote player: {e}"));
                }
                Reply::Remote(Ok(())) => {}
            }
        }
    }

    fn on_preview(&mut self, ticket: &LoadTicket, bytes: beatviz_core::Result<Vec<u8>>, now: Instant) {
        if !self.session.is_current(ticket) {
            log::debug!("dropping preview for stale load of {}", ticket.track_id);
            return;
        }
        let Some(player) = self.player().cloned() else {
            return;
        };
        let played = bytes
            .and_then(Clip::decode)
            .and_then(|clip| player.borrow_mut().play_clip(clip, now));
        if let Err(e) = played {
            log::error!("preview for {} failed: {e}", ticket.track_id);
            self.panel.status = Some(format!("Preview failed: {e}"));
        }
    }

    /// Runs inside the click handler, so it may open the audio output.
    fn select_track(&mut self, index: usize, now: Instant) {
        let Some(track) = self.panel.results.get(index).cloned() else {
            return;
        };
        self.panel.selected = Some(index);
        self.panel.status = None;
        self.panel.show_track(&track);
        self.poll_in_flight = false;
        self.last_poll = None;

        let caps = PlaybackCapabilities {
            remote_player: self.remote_enabled,
        };
        let mode = select_mode(&track, caps);
        let Handover {
            pause_remote,
            stop_preview,
        } = handover(self.session.active_mode(), mode);
        if pause_remote {
            self.worker.send(Job::Pause);
        }
        if stop_preview {
            self.stop_preview(now);
        }
        match mode {
            Mode::LiveFrequency => {
                let url = track.preview_url.clone().unwrap_or_default();
                let analyzer = self.open_output();
                let ticket = self.session.load_track(track, mode, analyzer);
                self.worker.track_loaded(&ticket);
                if self.session.active_mode() == Mode::LiveFrequency {
                    self.worker.send(Job::Preview { ticket, url });
                }
            }
            Mode::BeatPulse => {
                let uri = track.uri.clone();
                let ticket = self.session.load_track(track, mode, None);
                self.worker.track_loaded(&ticket);
                self.worker.send(Job::StartRemote { uri });
                self.worker.send(Job::Beats {
                    ticket: ticket.clone(),
                });
                self.worker.send(Job::Features { ticket });
            }
            Mode::Idle => {
                let ticket = self.session.load_track(track, mode, None);
                self.worker.track_loaded(&ticket);
                self.panel.status = Some(NO_PREVIEW.to_string());
            }
        }
        self.panel.mode = self.session.active_mode();
    }

    fn open_output(&mut self) -> Option<Box<dyn FrequencyAnalyzer>> {
        let volume = self.panel.volume;
        match self.output.activate(UserGesture::from_input_handler(), || {
            PreviewPlayer::open().map(|p| Rc::new(RefCell::new(p)))
        }) {
            Ok(player) => {
                player.borrow_mut().set_volume(volume);
                Some(Box::new(ClipAnalyzer::new(
                    player.clone(),
                    self.config.analyser.clone(),
                )))
            }
            Err(e) => {
                self.panel.status = Some(format!("Audio unavailable: {e}"));
                None
            }
        }
    }

    fn stop_preview(&self, now: Instant) {
        if let Some(player) = self.player() {
            player.borrow_mut().stop(now);
        }
    }

    fn play(&mut self, now: Instant) {
        match self.session.active_mode() {
            Mode::LiveFrequency => {
                if let Some(player) = self.player() {
                    player.borrow_mut().resume(now);
                }
            }
            Mode::BeatPulse => self.worker.send(Job::Resume),
            Mode::Idle => {}
        }
    }

    fn pause(&mut self, now: Instant) {
        match self.session.active_mode() {
            Mode::LiveFrequency => {
                if let Some(player) = self.player() {
                    player.borrow_mut().pause(now);
                }
            }
            Mode::BeatPulse => self.worker.send(Job::Pause),
            Mode::Idle => {}
        }
    }

    fn handle(&mut self, action: UiAction, now: Instant) {
        match action {
            UiAction::Search => self.start_search(),
            UiAction::Select(i) => self.select_track(i, now),
            UiAction::Play => self.play(now),
            UiAction::Pause => self.pause(now),
            UiAction::Volume(v) => {
                if let Some(player) = self.player() {
                    player.borrow_mut().set_volume(v);
                }
            }
        }
    }

    /// One position request at a time, at most every `poll_interval_ms`.
    fn poll_player(&mut self, now: Instant) {
        if self.session.active_mode() != Mode::BeatPulse || self.poll_in_flight {
            return;
        }
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        if self.last_poll.is_some_and(|t| now.duration_since(t) < interval) {
            return;
        }
        if let Some(ticket) = self.session.current_ticket() {
            self.worker.send(Job::PollPlayer { ticket });
            self.poll_in_flight = true;
            self.last_poll = Some(now);
        }
    }

    fn update_progress(&mut self, now: Instant) {
        let duration_ms = self.session.active_track().map_or(0, |t| t.duration_ms);
        let seconds = match self.session.active_mode() {
            Mode::LiveFrequency => self.player().and_then(|p| {
                let mut player = p.borrow_mut();
                player.sync(now);
                player.position(now)
            }),
            Mode::BeatPulse => self
                .session
                .position(now)
                .map(|pos| (pos, duration_ms as f64 / 1000.0)),
            Mode::Idle => None,
        };
        self.panel.progress = seconds.map(|(pos, total)| Progress {
            position_ms: (pos * 1000.0) as u64,
            duration_ms: (total * 1000.0) as u64,
        });
    }
}

impl eframe::App for BeatVizApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.drain_replies(now);

        if ctx.input(|i| i.viewport().close_requested()) {
            self.frame_loop.stop_handle().stop();
            self.stop_preview(now);
            self.session.unload();
        }

        let mut action = None;
        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| {
                action = ui::side_panel(ui, &mut self.panel);
            });
        if let Some(action) = action {
            self.handle(action, now);
        }

        self.poll_player(now);
        self.update_progress(now);

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
