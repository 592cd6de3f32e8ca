//! Per-track state the render loop reads every frame.
//!
//! Async work (beat fetches, player polls) is issued under a [`LoadTicket`]
//! and written back through the session, which drops anything issued for a
//! track that is no longer loaded.
use std::fmt;

use web_time::Instant;

use crate::beats::{pulse_strength, BeatSchedule};
use crate::catalog::TrackInfo;
use crate::clock::{PlaybackSample, PositionEstimator};
use crate::config::VisualizerConfig;
use crate::error::Result;
use crate::mode::Mode;
use crate::render::Signal;
use crate::spectrum::{FrequencyAnalyzer, FrequencyFrame};

/// Where the bars get their data from. Exactly one per loaded track.
pub enum SignalSource {
    Idle,
    LiveFrequency(Box<dyn FrequencyAnalyzer>),
    BeatPulse {
        schedule: BeatSchedule,
        estimator: PositionEstimator,
    },
}

impl SignalSource {
    pub fn mode(&self) -> Mode {
        match self {
            SignalSource::Idle => Mode::Idle,
            SignalSource::LiveFrequency(_) => Mode::LiveFrequency,
            SignalSource::BeatPulse { .. } => Mode::BeatPulse,
        }
    }
}

impl fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Idle => f.write_str("Idle"),
            SignalSource::LiveFrequency(a) => f
                .debug_struct("LiveFrequency")
                .field("bin_count", &a.bin_count())
                .finish(),
            SignalSource::BeatPulse { schedule, estimator } => f
                .debug_struct("BeatPulse")
                .field("beats", &schedule.len())
                .field("latest", &estimator.latest())
                .finish(),
        }
    }
}

/// Identifies the load an async request was issued for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub track_id: String,
    pub generation: u64,
}

#[derive(Debug)]
pub struct VisualizerSession {
    falloff: f64,
    generation: u64,
    track: Option<TrackInfo>,
    source: SignalSource,
    frame: FrequencyFrame,
    device_id: Option<String>,
    analyser_ready: bool,
}

impl VisualizerSession {
    pub fn new(config: VisualizerConfig) -> Self {
        Self {
            falloff: config.pulse_falloff,
            generation: 0,
            track: None,
            source: SignalSource::Idle,
            frame: FrequencyFrame::new(config.analyser.bin_count()),
            device_id: None,
            analyser_ready: true,
        }
    }

    /// Replaces the active source. All beat and position state of the
    /// previous track is dropped here.
    ///
    /// `LiveFrequency` without an analyser falls back to `Idle`.
    pub fn load_track(
        &mut self,
        track: TrackInfo,
        mode: Mode,
        analyzer: Option<Box<dyn FrequencyAnalyzer>>,
    ) -> LoadTicket {
        self.generation += 1;
        self.source = match (mode, analyzer) {
            (Mode::LiveFrequency, Some(analyzer)) => SignalSource::LiveFrequency(analyzer),
            (Mode::LiveFrequency, None) => {
                log::warn!("no analyser for '{}', showing idle bars", track.name);
                SignalSource::Idle
            }
            (Mode::BeatPulse, _) => SignalSource::BeatPulse {
                schedule: BeatSchedule::empty(),
                estimator: PositionEstimator::new(),
            },
            (Mode::Idle, _) => SignalSource::Idle,
        };
        self.frame.clear();
        self.analyser_ready = true;
        log::info!(
            "loaded '{}' in {} mode (generation {})",
            track.name,
            self.source.mode().label(),
            self.generation
        );
        let ticket = LoadTicket {
            track_id: track.id.clone(),
            generation: self.generation,
        };
        self.track = Some(track);
        ticket
    }

    /// Back to idle with no track. Outstanding tickets become stale.
    pub fn unload(&mut self) {
        self.generation += 1;
        self.track = None;
        self.source = SignalSource::Idle;
        self.frame.clear();
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.track.as_ref().is_some_and(|t| t.id == ticket.track_id)
    }

    /// Installs a fetched schedule. A failed fetch installs the empty one.
    ///
    /// Returns false when the result was discarded as stale.
    pub fn apply_beat_schedule(&mut self, ticket: &LoadTicket, result: Result<BeatSchedule>) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "dropping beats for '{}' (generation {}), track changed",
                ticket.track_id,
                ticket.generation
            );
            return false;
        }
        let SignalSource::BeatPulse { schedule, .. } = &mut self.source else {
            log::debug!("beats for '{}' arrived outside beat mode", ticket.track_id);
            return false;
        };
        *schedule = match result {
            Ok(s) => {
                log::info!("{} beats for '{}'", s.len(), ticket.track_id);
                s
            }
            Err(e) => {
                log::warn!("beat analysis for '{}' failed: {e}", ticket.track_id);
                BeatSchedule::empty()
            }
        };
        true
    }

    /// Stores a fresh player sample for the current track.
    pub fn record_sample(&mut self, ticket: &LoadTicket, sample: PlaybackSample) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match &mut self.source {
            SignalSource::BeatPulse { estimator, .. } => {
                estimator.record(sample);
                true
            }
            _ => false,
        }
    }

    pub fn set_device_id(&mut self, device_id: Option<String>) {
        self.device_id = device_id;
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn active_mode(&self) -> Mode {
        self.source.mode()
    }

    pub fn active_track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    pub fn current_ticket(&self) -> Option<LoadTicket> {
        self.track.as_ref().map(|t| LoadTicket {
            track_id: t.id.clone(),
            generation: self.generation,
        })
    }

    pub fn beat_schedule(&self) -> Option<&BeatSchedule> {
        match &self.source {
            SignalSource::BeatPulse { schedule, .. } => Some(schedule),
            _ => None,
        }
    }

    /// Extrapolated remote position, if the active source has one.
    pub fn position(&self, now: Instant) -> Option<f64> {
        match &self.source {
            SignalSource::BeatPulse { estimator, .. } => estimator.position(now),
            _ => None,
        }
    }

    /// This frame's signal. Never fails: an analyser error shows idle bars
    /// and a missing sample shows a flat pulse.
    pub fn signal(&mut self, now: Instant) -> Signal<'_> {
        match &mut self.source {
            SignalSource::Idle => Signal::Idle,
            SignalSource::LiveFrequency(analyzer) => match analyzer.read_frame(&mut self.frame) {
                Ok(()) => {
                    if !self.analyser_ready {
                        log::debug!("analyser producing frames again");
                        self.analyser_ready = true;
                    }
                    Signal::Spectrum(&self.frame)
                }
                Err(e) => {
                    if self.analyser_ready {
                        log::debug!("analyser unavailable, drawing idle: {e}");
                        self.analyser_ready = false;
                    }
                    Signal::Idle
                }
            },
            SignalSource::BeatPulse {
                schedule,
                estimator,
            } => Signal::Pulse(
                estimator
                    .position(now)
                    .map_or(0.0, |p| pulse_strength(schedule, p, self.falloff)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VizError;
    use std::time::Duration;

    fn track(id: &str) -> TrackInfo {
        TrackInfo {
            id: id.into(),
            name: id.to_uppercase(),
            ..TrackInfo::default()
        }
    }

    fn session() -> VisualizerSession {
        VisualizerSession::new(VisualizerConfig::default())
    }

    fn pulse(signal: Signal<'_>) -> f32 {
        match signal {
            Signal::Pulse(p) => p,
            other => panic!("expected pulse, got {other:?}"),
        }
    }

    struct Failing;

    impl FrequencyAnalyzer for Failing {
        fn bin_count(&self) -> usize {
            1024
        }

        fn read_frame(&mut self, _frame: &mut FrequencyFrame) -> Result<()> {
            Err(VizError::AudioUnavailable("suspended".into()))
        }
    }

    #[test]
    fn no_sample_means_flat_pulse() {
        let mut s = session();
        s.load_track(track("a"), Mode::BeatPulse, None);
        assert_eq!(pulse(s.signal(Instant::now())), 0.0);
    }

    #[test]
    fn pulse_follows_sample_and_beats() {
        let mut s = session();
        let ticket = s.load_track(track("a"), Mode::BeatPulse, None);
        let t0 = Instant::now();
        assert!(s.apply_beat_schedule(&ticket, BeatSchedule::new(vec![1.0, 2.0, 3.0])));
        assert!(s.record_sample(&ticket, PlaybackSample::new(1.8, t0, true)));

        let got = pulse(s.signal(t0 + Duration::from_millis(100)));
        assert!((got - 0.6).abs() < 1e-5);
    }

    #[test]
    fn late_beats_for_previous_track_are_dropped() {
        let mut s = session();
        let a = s.load_track(track("a"), Mode::BeatPulse, None);
        let b = s.load_track(track("b"), Mode::BeatPulse, None);

        assert!(!s.apply_beat_schedule(&a, BeatSchedule::new(vec![0.5, 1.0])));
        assert!(s.beat_schedule().unwrap().is_empty());

        assert!(s.apply_beat_schedule(&b, BeatSchedule::new(vec![2.0])));
        assert!(!s.apply_beat_schedule(&a, BeatSchedule::new(vec![0.5])));
        assert_eq!(s.beat_schedule().unwrap().as_slice(), &[2.0]);
    }

    #[test]
    fn reloading_same_track_invalidates_old_ticket() {
        let mut s = session();
        let first = s.load_track(track("a"), Mode::BeatPulse, None);
        let second = s.load_track(track("a"), Mode::BeatPulse, None);
        assert!(!s.is_current(&first));
        assert!(s.is_current(&second));
        assert!(!s.record_sample(&first, PlaybackSample::paused(10.0, Instant::now())));
        assert_eq!(s.position(Instant::now()), None);
    }

    #[test]
    fn failed_fetch_installs_empty_schedule() {
        let mut s = session();
        let ticket = s.load_track(track("a"), Mode::BeatPulse, None);
        assert!(s.apply_beat_schedule(&ticket, Err(VizError::Transport("offline".into()))));
        assert!(s.beat_schedule().unwrap().is_empty());
    }

    #[test]
    fn switching_clears_position_state() {
        let mut s = session();
        let a = s.load_track(track("a"), Mode::BeatPulse, None);
        let now = Instant::now();
        s.record_sample(&a, PlaybackSample::paused(30.0, now));
        assert_eq!(s.position(now), Some(30.0));

        s.load_track(track("b"), Mode::BeatPulse, None);
        assert_eq!(s.position(now), None);
    }

    #[test]
    fn analyser_failure_renders_idle() {
        let mut s = session();
        s.load_track(track("a"), Mode::LiveFrequency, Some(Box::new(Failing)));
        assert_eq!(s.active_mode(), Mode::LiveFrequency);
        assert!(matches!(s.signal(Instant::now()), Signal::Idle));
    }

    #[test]
    fn live_mode_without_analyser_is_idle() {
        let mut s = session();
        let ticket = s.load_track(track("a"), Mode::LiveFrequency, None);
        assert_eq!(s.active_mode(), Mode::Idle);
        assert!(!s.apply_beat_schedule(&ticket, Ok(BeatSchedule::empty())));
    }

    #[test]
    fn unload_makes_tickets_stale() {
        let mut s = session();
        let ticket = s.load_track(track("a"), Mode::BeatPulse, None);
        s.unload();
        assert!(!s.is_current(&ticket));
        assert_eq!(s.active_track(), None);
        assert_eq!(s.current_ticket(), None);
    }

    #[test]
    fn device_id_round_trips() {
        let mut s = session();
        assert_eq!(s.device_id(), None);
        s.set_device_id(Some("dev-1".into()));
        assert_eq!(s.device_id(), Some("dev-1"));
    }
}
