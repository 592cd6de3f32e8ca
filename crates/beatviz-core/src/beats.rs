//! Beat schedules and the pulse they produce.
use std::sync::Arc;

use crate::error::{Result, VizError};

/// Pulse fades out completely `1 / DEFAULT_FALLOFF` seconds away from a beat.
pub const DEFAULT_FALLOFF: f64 = 4.0;

/// Assumed gap after the last beat when there is no following one.
const TRAILING_BEAT_GAP: f64 = 0.5;

/// Beat start offsets in seconds from track start.
///
/// Non-negative and strictly increasing. Cheap to clone; a schedule is
/// replaced as a whole, never edited in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatSchedule {
    beats: Arc<[f64]>,
}

impl BeatSchedule {
    /// Strict constructor for already-clean data.
    pub fn new(beats: Vec<f64>) -> Result<Self> {
        if let Some(bad) = beats.iter().find(|b| !b.is_finite() || **b < 0.0) {
            return Err(VizError::InvalidSchedule(format!(
                "beat offset {bad} is not a finite non-negative number"
            )));
        }
        if let Some(w) = beats.windows(2).find(|w| w[1] <= w[0]) {
            return Err(VizError::InvalidSchedule(format!(
                "beats not strictly increasing: {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { beats: beats.into() })
    }

    /// Lenient constructor for API payloads: drops junk, sorts, dedups.
    pub fn from_unsorted(beats: impl IntoIterator<Item = f64>) -> Self {
        let mut clean: Vec<f64> = beats
            .into_iter()
            .filter(|b| b.is_finite() && *b >= 0.0)
            .collect();
        clean.sort_by(f64::total_cmp);
        clean.dedup();
        Self { beats: clean.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.beats
    }

    /// Previous and next beat around `position`.
    ///
    /// Before the first beat the previous one is track start; after the last
    /// one the next is assumed half a second later.
    fn neighbours(&self, position: f64) -> Option<(f64, f64)> {
        if self.beats.is_empty() {
            return None;
        }
        let i = self.beats.partition_point(|&b| b < position);
        let prev = if i > 0 { self.beats[i - 1] } else { 0.0 };
        let next = self
            .beats
            .get(i)
            .copied()
            .unwrap_or(prev + TRAILING_BEAT_GAP);
        Some((prev, next))
    }
}

/// Distance in seconds to whichever surrounding beat is closer.
pub fn nearest_beat_distance(beats: &BeatSchedule, position: f64) -> Option<f64> {
    beats
        .neighbours(position)
        .map(|(prev, next)| (position - prev).abs().min((next - position).abs()))
}

/// Linear decay away from a beat, clamped to `[0, 1]`.
pub fn pulse_from_distance(distance: f64, falloff: f64) -> f32 {
    (1.0 - distance * falloff).clamp(0.0, 1.0) as f32
}

/// Instantaneous pulse strength at `position`. Empty schedules never pulse.
pub fn pulse_strength(beats: &BeatSchedule, position: f64, falloff: f64) -> f32 {
    nearest_beat_distance(beats, position).map_or(0.0, |d| pulse_from_distance(d, falloff))
}
