//! Playback position estimation.
//!
//! Remote players report their position rarely and irregularly, while the
//! render loop wants a position every frame. A [`PlaybackSample`] is the last
//! thing the player told us; [`estimate`] extrapolates it to render time.
use web_time::Instant;

/// Latest reported player state. Only the newest sample is ever kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackSample {
    pub reported_position_seconds: f64,
    pub captured_at: Instant,
    pub is_playing: bool,
}

impl PlaybackSample {
    pub fn new(reported_position_seconds: f64, captured_at: Instant, is_playing: bool) -> Self {
        Self {
            reported_position_seconds,
            captured_at,
            is_playing,
        }
    }

    pub fn paused(reported_position_seconds: f64, captured_at: Instant) -> Self {
        Self::new(reported_position_seconds, captured_at, false)
    }
}

/// Current position in seconds, assuming unit-rate playback since capture.
///
/// Paused samples are returned unchanged. The result never goes below zero.
pub fn estimate(sample: &PlaybackSample, now: Instant) -> f64 {
    let position = if sample.is_playing {
        let elapsed = now.saturating_duration_since(sample.captured_at);
        sample.reported_position_seconds + elapsed.as_secs_f64()
    } else {
        sample.reported_position_seconds
    };
    position.max(0.0)
}

/// Holds the most recent sample from a remote player.
#[derive(Clone, Debug, Default)]
pub struct PositionEstimator {
    latest: Option<PlaybackSample>,
}

impl PositionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersedes whatever sample was held before.
    pub fn record(&mut self, sample: PlaybackSample) {
        self.latest = Some(sample);
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }

    pub fn latest(&self) -> Option<&PlaybackSample> {
        self.latest.as_ref()
    }

    /// `None` until the first sample arrives: position is unknown, not zero.
    pub fn position(&self, now: Instant) -> Option<f64> {
        self.latest.as_ref().map(|s| estimate(s, now))
    }
}

/// Play/pause/seek clock for audio we play ourselves.
///
/// Built on the same extrapolation as remote samples, so a local playhead is
/// just a sample that we re-capture on every state change.
#[derive(Clone, Copy, Debug)]
pub struct LocalClock {
    sample: PlaybackSample,
}

impl LocalClock {
    pub fn new(now: Instant) -> Self {
        Self {
            sample: PlaybackSample::paused(0.0, now),
        }
    }

    pub fn play(&mut self, now: Instant) {
        if !self.sample.is_playing {
            self.sample = PlaybackSample::new(self.position(now), now, true);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.sample.is_playing {
            self.sample = PlaybackSample::paused(self.position(now), now);
        }
    }

    pub fn seek(&mut self, position_seconds: f64, now: Instant) {
        self.sample = PlaybackSample::new(position_seconds.max(0.0), now, self.sample.is_playing);
    }

    pub fn position(&self, now: Instant) -> f64 {
        estimate(&self.sample, now)
    }

    pub fn is_playing(&self) -> bool {
        self.sample.is_playing
    }

    pub fn sample(&self) -> PlaybackSample {
        self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use test_case::test_case;

    #[test]
    fn playing_sample_at_capture_time_is_exact() {
        let t0 = Instant::now();
        let sample = PlaybackSample::new(42.125, t0, true);
        assert_eq!(estimate(&sample, t0), 42.125);
    }

    #[test_case(0 ; "at capture")]
    #[test_case(16 ; "one frame later")]
    #[test_case(2_000 ; "two seconds later")]
    fn paused_sample_does_not_move(elapsed_ms: u64) {
        let t0 = Instant::now();
        let sample = PlaybackSample::paused(12.5, t0);
        assert_eq!(estimate(&sample, t0 + Duration::from_millis(elapsed_ms)), 12.5);
    }

    #[test]
    fn playing_sample_extrapolates_linearly() {
        let t0 = Instant::now();
        let sample = PlaybackSample::new(10.0, t0, true);
        let pos = estimate(&sample, t0 + Duration::from_millis(1_500));
        assert!((pos - 11.5).abs() < 1e-9);
    }

    #[test]
    fn render_time_before_capture_does_not_rewind() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_millis(500);
        let sample = PlaybackSample::new(3.0, later, true);
        assert_eq!(estimate(&sample, t0), 3.0);
    }

    #[test]
    fn negative_reports_clamp_to_zero() {
        let t0 = Instant::now();
        assert_eq!(estimate(&PlaybackSample::paused(-0.2, t0), t0), 0.0);
    }

    #[test]
    fn estimator_unknown_until_first_sample() {
        let t0 = Instant::now();
        let mut est = PositionEstimator::new();
        assert_eq!(est.position(t0), None);

        est.record(PlaybackSample::paused(7.0, t0));
        assert_eq!(est.position(t0), Some(7.0));

        est.record(PlaybackSample::paused(9.0, t0));
        assert_eq!(est.position(t0), Some(9.0));

        est.clear();
        assert_eq!(est.position(t0), None);
    }

    #[test]
    fn local_clock_pause_freezes_and_play_resumes() {
        let t0 = Instant::now();
        let mut clock = LocalClock::new(t0);
        assert_eq!(clock.position(t0 + Duration::from_secs(5)), 0.0);

        clock.play(t0);
        let t1 = t0 + Duration::from_secs(2);
        clock.pause(t1);
        assert!(!clock.is_playing());
        assert!((clock.position(t1 + Duration::from_secs(10)) - 2.0).abs() < 1e-9);

        let t2 = t1 + Duration::from_secs(10);
        clock.play(t2);
        assert!((clock.position(t2 + Duration::from_secs(1)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn local_clock_seek_keeps_play_state() {
        let t0 = Instant::now();
        let mut clock = LocalClock::new(t0);
        clock.play(t0);
        clock.seek(20.0, t0);
        assert!(clock.is_playing());
        assert!((clock.position(t0 + Duration::from_millis(250)) - 20.25).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn paused_estimate_ignores_now(pos in 0.0f64..600.0, a in 0u64..100_000, b in 0u64..100_000) {
            let t0 = Instant::now();
            let sample = PlaybackSample::paused(pos, t0);
            let ea = estimate(&sample, t0 + Duration::from_millis(a));
            let eb = estimate(&sample, t0 + Duration::from_millis(b));
            prop_assert_eq!(ea, eb);
            prop_assert_eq!(ea, pos);
        }

        #[test]
        fn playing_estimate_never_decreases(pos in 0.0f64..600.0, a in 0u64..100_000, extra in 0u64..100_000) {
            let t0 = Instant::now();
            let sample = PlaybackSample::new(pos, t0, true);
            let early = estimate(&sample, t0 + Duration::from_millis(a));
            let late = estimate(&sample, t0 + Duration::from_millis(a + extra));
            prop_assert!(late >= early);
        }
    }
}
