//! Live frequency data: frames, the analyser contract, and the user-gesture gate.
use std::cell::RefCell;
use std::f32::consts::TAU;
use std::rc::Rc;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::AnalyserConfig;
use crate::error::{Result, VizError};

/// One byte magnitude per frequency bin, overwritten every frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyFrame {
    bins: Vec<u8>,
}

impl FrequencyFrame {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bins: vec![0; bin_count],
        }
    }

    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [u8] {
        &mut self.bins
    }

    pub fn resize(&mut self, bin_count: usize) {
        self.bins.resize(bin_count, 0);
    }

    pub fn clear(&mut self) {
        self.bins.fill(0);
    }

    /// Bin `i` normalised to `[0, 1]`; bins past the end read as silence.
    pub fn level(&self, i: usize) -> f32 {
        self.bins.get(i).map_or(0.0, |&b| f32::from(b) / 255.0)
    }
}

/// Picks every `step`-th bin, `step = bin_count / bar_count`. No averaging.
///
/// When there are fewer bins than bars the step is held at one, so the tail
/// bars read past the end and stay at zero.
pub fn sample_bars(frame: &FrequencyFrame, bar_count: usize) -> Vec<f32> {
    if bar_count == 0 {
        return Vec::new();
    }
    let step = (frame.bin_count() / bar_count).max(1);
    (0..bar_count).map(|i| frame.level(i * step)).collect()
}

/// Anything that can fill a [`FrequencyFrame`] on demand.
pub trait FrequencyAnalyzer {
    fn bin_count(&self) -> usize;

    /// Overwrites `frame` with the current spectrum.
    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()>;
}

impl<A: FrequencyAnalyzer + ?Sized> FrequencyAnalyzer for Box<A> {
    fn bin_count(&self) -> usize {
        (**self).bin_count()
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()> {
        (**self).read_frame(frame)
    }
}

// Shared handles, for hosts where UI callbacks and the render loop both hold the analyser.
impl<A: FrequencyAnalyzer> FrequencyAnalyzer for Rc<RefCell<A>> {
    fn bin_count(&self) -> usize {
        self.try_borrow().map_or(0, |a| a.bin_count())
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()> {
        match self.try_borrow_mut() {
            Ok(mut a) => a.read_frame(frame),
            Err(_) => Err(VizError::AudioUnavailable("analyser busy".into())),
        }
    }
}

/// Short-time spectrum of raw PCM, reproducing the browser analyser contract:
/// Blackman window, magnitude scaled by `1/N`, exponential smoothing over
/// frames, then decibels mapped linearly onto `0..=255`.
pub struct FftAnalyzer {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl FftAnalyzer {
    pub fn new(config: AnalyserConfig) -> Self {
        let n = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            window: blackman_window(n),
            buffer: vec![Complex::new(0.0, 0.0); n],
            scratch,
            smoothed: vec![0.0; config.bin_count()],
            fft,
            config,
        }
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Smoothed linear magnitudes from the last call to [`Self::process`].
    pub fn smoothed_magnitudes(&self) -> &[f32] {
        &self.smoothed
    }

    /// Analyses the most recent `fft_size` samples of `samples` (zero-padded
    /// in front when shorter) and writes byte magnitudes into `frame`.
    pub fn process(&mut self, samples: &[f32], frame: &mut FrequencyFrame) {
        let n = self.config.fft_size;
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let tau = self.config.smoothing;
        let min_db = self.config.min_decibels;
        let range = self.config.max_decibels - min_db;
        let bins = self.config.bin_count();
        frame.resize(bins);

        for (k, out) in frame.bins_mut().iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() / n as f32;
            let mut s = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            if !s.is_finite() {
                s = 0.0;
            }
            self.smoothed[k] = s;

            let db = if s > 0.0 { 20.0 * s.log10() } else { f32::NEG_INFINITY };
            let scaled = 255.0 * (db - min_db) / range;
            *out = if scaled.is_nan() { 0 } else { scaled.clamp(0.0, 255.0) as u8 };
        }
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = (1.0 - ALPHA) / 2.0;
    let a1 = 0.5;
    let a2 = ALPHA / 2.0;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (TAU * x).cos() + a2 * (2.0 * TAU * x).cos()
        })
        .collect()
}

/// Proof that the caller is running inside a user-triggered input handler.
///
/// Browsers refuse to start audio outside a gesture, so the only way to get
/// one is to construct it where a click or key press is being handled.
#[derive(Clone, Copy, Debug)]
pub struct UserGesture {
    _private: (),
}

impl UserGesture {
    pub fn from_input_handler() -> Self {
        Self { _private: () }
    }
}

/// Lazily built analyser, only constructed once a [`UserGesture`] arrives.
pub struct AudioGate<A> {
    analyzer: Option<A>,
    failed_attempts: u32,
}

impl<A> Default for AudioGate<A> {
    fn default() -> Self {
        Self {
            analyzer: None,
            failed_attempts: 0,
        }
    }
}

impl<A> AudioGate<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start-up code may ask for audio before any gesture; that is a no-op.
    pub fn request_eager(&self) {
        if self.analyzer.is_none() {
            log::debug!("audio graph deferred until the first user gesture");
        }
    }

    /// Builds the analyser on first use. A failed build leaves the gate
    /// dormant so the next gesture can retry.
    pub fn activate<F>(&mut self, _gesture: UserGesture, build: F) -> Result<&mut A>
    where
        F: FnOnce() -> Result<A>,
    {
        let analyzer = match self.analyzer.take() {
            Some(a) => a,
            None => build().inspect_err(|e| {
                self.failed_attempts += 1;
                log::warn!("audio graph construction failed (attempt {}): {e}", self.failed_attempts);
            })?,
        };
        Ok(self.analyzer.insert(analyzer))
    }

    pub fn is_ready(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn get(&self) -> Option<&A> {
        self.analyzer.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut A> {
        self.analyzer.as_mut()
    }
}

impl<A: FrequencyAnalyzer> FrequencyAnalyzer for AudioGate<A> {
    fn bin_count(&self) -> usize {
        self.analyzer.as_ref().map_or(0, FrequencyAnalyzer::bin_count)
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()> {
        match self.analyzer.as_mut() {
            Some(a) => a.read_frame(frame),
            None => Err(VizError::AudioUnavailable("waiting for a user gesture".into())),
        }
    }
}
