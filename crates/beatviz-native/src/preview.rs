//! Local preview playback and the analyser that reads it.
//!
//! Clips are decoded up front into mono PCM. The same buffer goes to the
//! output sink and to the FFT, and a [`LocalClock`] says where the playhead
//! is, so the spectrum always comes from what is audible right now.
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use beatviz_core::{
    AnalyserConfig, FftAnalyzer, FrequencyAnalyzer, FrequencyFrame, LocalClock, Result, VizError,
};
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use web_time::Instant;

/// Decoded clip, down-mixed to mono.
#[derive(Clone, Debug)]
pub struct Clip {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl Clip {
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| VizError::Decode(e.to_string()))?;
        let channels = usize::from(decoder.channels().max(1));
        let sample_rate = decoder.sample_rate();
        let interleaved: Vec<i16> = decoder.collect();
        if interleaved.is_empty() {
            return Err(VizError::Decode("clip has no samples".into()));
        }
        Ok(Self::from_mono(downmix(&interleaved, channels), sample_rate))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// The `len` samples ending at `position_seconds`, shorter near the start.
    pub fn window_ending_at(&self, position_seconds: f64, len: usize) -> &[f32] {
        let end = ((position_seconds.max(0.0) * f64::from(self.sample_rate)) as usize)
            .min(self.samples.len());
        &self.samples[end.saturating_sub(len)..end]
    }
}

fn downmix(interleaved: &[i16], channels: usize) -> Vec<f32> {
    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32_768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// Output device plus the clip currently loaded on it.
pub struct PreviewPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    clip: Option<Clip>,
    clock: LocalClock,
    volume: f32,
}

impl PreviewPlayer {
    pub fn open() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| VizError::AudioUnavailable(e.to_string()))?;
        log::info!("audio output opened");
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            clip: None,
            clock: LocalClock::new(Instant::now()),
            volume: 0.8,
        })
    }

    pub fn play_clip(&mut self, clip: Clip, now: Instant) -> Result<()> {
        self.stop(now);
        let sink = Sink::try_new(&self.handle).map_err(|e| VizError::AudioUnavailable(e.to_string()))?;
        sink.set_volume(self.volume);
        sink.append(SamplesBuffer::new(1, clip.sample_rate, clip.samples.to_vec()));
        log::info!("playing {:.1}s preview", clip.duration_seconds());
        self.sink = Some(sink);
        self.clip = Some(clip);
        self.clock = LocalClock::new(now);
        self.clock.play(now);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(sink) = &self.sink {
            sink.pause();
            self.clock.pause(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(sink) = &self.sink {
            if !sink.empty() {
                sink.play();
                self.clock.play(now);
            }
        }
    }

    pub fn stop(&mut self, now: Instant) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.clip = None;
        self.clock.pause(now);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    /// Stops the clock once the sink has run dry.
    pub fn sync(&mut self, now: Instant) {
        let drained = self.sink.as_ref().is_some_and(Sink::empty);
        if drained && self.clock.is_playing() {
            self.clock.pause(now);
        }
    }

    pub fn position(&self, now: Instant) -> Option<(f64, f64)> {
        let clip = self.clip.as_ref()?;
        let duration = clip.duration_seconds();
        Some((self.clock.position(now).min(duration), duration))
    }

    /// Samples under the playhead. Empty while paused, so the spectrum decays.
    pub fn window(&self, now: Instant, len: usize) -> &[f32] {
        match &self.clip {
            Some(clip) if self.clock.is_playing() => clip.window_ending_at(self.clock.position(now), len),
            _ => &[],
        }
    }
}

/// FFT over whatever the shared player is playing.
pub struct ClipAnalyzer {
    player: Rc<RefCell<PreviewPlayer>>,
    fft: FftAnalyzer,
}

impl ClipAnalyzer {
    pub fn new(player: Rc<RefCell<PreviewPlayer>>, config: AnalyserConfig) -> Self {
        Self {
            player,
            fft: FftAnalyzer::new(config),
        }
    }
}

impl FrequencyAnalyzer for ClipAnalyzer {
    fn bin_count(&self) -> usize {
        self.fft.config().bin_count()
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()> {
        let player = self
            .player
            .try_borrow()
            .map_err(|_| VizError::AudioUnavailable("player busy".into()))?;
        let window = player.window(Instant::now(), self.fft.config().fft_size);
        self.fft.process(window, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [16_384i16, -16_384, 32_767, 32_767];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!(mono[0].abs() < 1e-6);
        assert!((mono[1] - 32_767.0 / 32_768.0).abs() < 1e-6);
    }

    #[test]
    fn window_tracks_playhead() {
        let clip = Clip::from_mono((0..1000).map(|i| i as f32).collect(), 100);
        assert_eq!(clip.duration_seconds(), 10.0);

        let w = clip.window_ending_at(5.0, 8);
        assert_eq!(w.len(), 8);
        assert_eq!(w[7], 499.0);

        assert_eq!(clip.window_ending_at(0.02, 8), &[0.0, 1.0]);
        assert!(clip.window_ending_at(0.0, 8).is_empty());
        assert_eq!(clip.window_ending_at(60.0, 4), &[996.0, 997.0, 998.0, 999.0]);
    }
}
