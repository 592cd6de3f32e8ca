use std::cell::Cell;
use std::time::Duration;

use beatviz_core::catalog::{AudioAnalysis, PlayerState};
use beatviz_core::render::RecordingSurface;
use beatviz_core::{
    select_mode, BarLayout, BeatSchedule, FrameControl, FrameLoop, FrameScheduler,
    FrequencyAnalyzer, FrequencyFrame, Mode, PixelSurface, PlaybackCapabilities, RenderConfig,
    RenderDriver, TrackInfo, VisualizerConfig, VisualizerSession, VizError,
};
use egui::{Color32, Vec2};
use pretty_assertions::assert_eq;
use web_time::Instant;

#[derive(Default)]
struct CountingScheduler {
    requests: Cell<u32>,
}

impl FrameScheduler for CountingScheduler {
    fn request_frame(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Every bin at the same level.
struct FlatAnalyzer(u8);

impl FrequencyAnalyzer for FlatAnalyzer {
    fn bin_count(&self) -> usize {
        1024
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> beatviz_core::Result<()> {
        frame.resize(1024);
        frame.bins_mut().fill(self.0);
        Ok(())
    }
}

fn track(id: &str, preview: Option<&str>) -> TrackInfo {
    TrackInfo {
        id: id.into(),
        name: format!("Track {id}"),
        artists: "Someone".into(),
        preview_url: preview.map(str::to_string),
        uri: format!("spotify:track:{id}"),
        ..TrackInfo::default()
    }
}

/// Pixels in column `x` that are bar coloured (neither background nor baseline).
fn bar_pixels(surface: &PixelSurface, x: usize, cfg: &RenderConfig) -> usize {
    (0..surface.height())
        .filter_map(|y| surface.pixel(x, y))
        .filter(|c| *c != cfg.background && *c != cfg.baseline)
        .count()
}

#[test]
fn beat_mode_end_to_end() {
    let config = VisualizerConfig {
        render: RenderConfig {
            pulse: BarLayout {
                bar_count: 4,
                height_factor: 0.8,
                min_height_px: 2.0,
            },
            ..RenderConfig::default()
        },
        ..VisualizerConfig::default()
    };
    let render_cfg = config.render.clone();
    let mut session = VisualizerSession::new(config);
    let driver = RenderDriver::new(render_cfg.clone());
    let scheduler = CountingScheduler::default();
    let mut frame_loop = FrameLoop::new();
    let mut surface = PixelSurface::new(1, 1);
    surface.set_display(Vec2::new(200.0, 100.0), 2.0);

    let info = track("a", None);
    let mode = select_mode(&info, PlaybackCapabilities { remote_player: true });
    assert_eq!(mode, Mode::BeatPulse);
    let ticket = session.load_track(info, mode, None);

    let analysis: AudioAnalysis =
        serde_json::from_str(r#"{ "beats": [ { "start": 1.0 }, { "start": 2.0 }, { "start": 3.0 } ] }"#)
            .unwrap();
    assert!(session.apply_beat_schedule(&ticket, Ok(analysis.beat_schedule())));

    let t0 = Instant::now();
    let state: PlayerState =
        serde_json::from_str(r#"{ "progress_ms": 2000, "is_playing": true }"#).unwrap();
    assert!(session.record_sample(&ticket, state.to_sample(t0).unwrap()));

    let control = frame_loop.tick(&mut session, &driver, &mut surface, &scheduler, t0);
    assert_eq!(control, FrameControl::Continue);
    assert_eq!((surface.width(), surface.height()), (400, 200));

    // on the beat: symmetric four-bar hump, centre bars tallest
    let cols: Vec<usize> = [40, 140, 240, 340]
        .iter()
        .map(|&x| bar_pixels(&surface, x, &render_cfg))
        .collect();
    assert_eq!(cols[0], cols[3]);
    assert_eq!(cols[1], cols[2]);
    assert!(cols[1] > cols[0]);

    // half a beat later the pulse is gone and bars sit at their floor
    frame_loop.tick(
        &mut session,
        &driver,
        &mut surface,
        &scheduler,
        t0 + Duration::from_millis(500),
    );
    let floor: Vec<usize> = [40, 140, 240, 340]
        .iter()
        .map(|&x| bar_pixels(&surface, x, &render_cfg))
        .collect();
    assert_eq!(floor, vec![0, 0, 0, 0]);
    assert_eq!(scheduler.requests.get(), 2);
}

#[test]
fn late_schedule_for_previous_track_is_ignored() {
    let mut session = VisualizerSession::new(VisualizerConfig::default());
    let caps = PlaybackCapabilities { remote_player: true };

    let a = track("a", None);
    let ticket_a = session.load_track(a.clone(), select_mode(&a, caps), None);
    let b = track("b", None);
    let ticket_b = session.load_track(b.clone(), select_mode(&b, caps), None);

    // A's analysis resolves after the switch
    assert!(!session.apply_beat_schedule(&ticket_a, BeatSchedule::new(vec![0.25, 0.75])));
    assert!(session.beat_schedule().unwrap().is_empty());

    assert!(session.apply_beat_schedule(&ticket_b, BeatSchedule::new(vec![4.0, 4.5])));
    assert_eq!(session.beat_schedule().unwrap().as_slice(), &[4.0, 4.5]);
    assert_eq!(session.active_track().map(|t| t.id.as_str()), Some("b"));
}

#[test]
fn failed_analysis_keeps_rendering() {
    let mut session = VisualizerSession::new(VisualizerConfig::default());
    let driver = RenderDriver::new(RenderConfig::default());
    let scheduler = CountingScheduler::default();
    let mut frame_loop = FrameLoop::new();
    let mut surface = RecordingSurface::new(480.0, 120.0);

    let ticket = session.load_track(track("a", None), Mode::BeatPulse, None);
    session.apply_beat_schedule(
        &ticket,
        Err(VizError::Http {
            status: 404,
            url: "/api/analysis/a".into(),
        }),
    );
    let now = Instant::now();
    session.record_sample(&ticket, beatviz_core::PlaybackSample::new(0.0, now, true));

    let control = frame_loop.tick(&mut session, &driver, &mut surface, &scheduler, now);
    assert_eq!(control, FrameControl::Continue);
    assert_eq!(surface.bars().len(), 48);
    assert!(surface.bars().iter().all(|(r, _)| (r.height() - 2.0).abs() < 1e-6));
}

#[test]
fn live_mode_draws_full_spectrum() {
    let cfg = RenderConfig::default();
    let mut session = VisualizerSession::new(VisualizerConfig::default());
    let driver = RenderDriver::new(cfg.clone());
    let scheduler = CountingScheduler::default();
    let mut frame_loop = FrameLoop::new();
    let mut surface = RecordingSurface::new(960.0, 400.0);

    let info = track("p", Some("https://p.scdn.co/mp3-preview/p"));
    let mode = select_mode(&info, PlaybackCapabilities::default());
    assert_eq!(mode, Mode::LiveFrequency);
    session.load_track(info, mode, Some(Box::new(FlatAnalyzer(255))));

    frame_loop.tick(&mut session, &driver, &mut surface, &scheduler, Instant::now());
    let bars = surface.bars();
    assert_eq!(bars.len(), 96);
    assert!(bars
        .iter()
        .all(|(r, c)| (r.height() - (400.0 * 0.9 + 1.0)).abs() < 1e-3 && *c == Color32::from_rgb(220, 80, 255)));
}

#[test]
fn stop_flag_ends_the_loop() {
    let mut session = VisualizerSession::new(VisualizerConfig::default());
    let driver = RenderDriver::new(RenderConfig::default());
    let scheduler = CountingScheduler::default();
    let mut frame_loop = FrameLoop::new();
    let mut surface = RecordingSurface::new(100.0, 100.0);
    let stop = frame_loop.stop_handle();

    let mut frames = 0;
    while frame_loop.tick(&mut session, &driver, &mut surface, &scheduler, Instant::now())
        == FrameControl::Continue
    {
        frames += 1;
        if frames == 3 {
            stop.stop();
        }
    }
    assert_eq!(frames, 3);
    assert_eq!(frame_loop.frames(), 3);
    assert_eq!(scheduler.requests.get(), 3);
    assert!(!frame_loop.is_running());
}
