use std::path::Path;

use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::beats::DEFAULT_FALLOFF;
use crate::error::{Result, VizError};

/// Per-mode bar layout. Overrides must spell out all three fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarLayout {
    pub bar_count: usize,
    /// Fraction of the surface height a full-scale bar reaches
    pub height_factor: f32,
    /// Bars never shrink below this, so silence still shows a floor
    pub min_height_px: f32,
}

impl BarLayout {
    pub fn spectrum() -> Self {
        Self {
            bar_count: 96,
            height_factor: 0.9,
            min_height_px: 1.0,
        }
    }

    pub fn pulse() -> Self {
        Self {
            bar_count: 48,
            height_factor: 0.8,
            min_height_px: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub spectrum: BarLayout,
    pub pulse: BarLayout,
    /// Share of each bar slot left empty between bars
    pub gap_ratio: f32,
    pub baseline_height_px: f32,
    pub background: Color32,
    pub baseline: Color32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            spectrum: BarLayout::spectrum(),
            pulse: BarLayout::pulse(),
            gap_ratio: 0.2,
            baseline_height_px: 2.0,
            background: Color32::from_rgb(0x0b, 0x0d, 0x10),
            baseline: Color32::from_rgb(0x11, 0x11, 0x11),
        }
    }
}

/// Settings for the frequency analyser, mirroring Web Audio's `AnalyserNode`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub render: RenderConfig,
    pub analyser: AnalyserConfig,
    /// Pulse falloff per second of distance from the nearest beat
    pub pulse_falloff: f64,
    /// Prefix for API calls; empty means same-origin proxy routes
    pub api_base: String,
    pub seed_query: String,
    pub search_limit: u32,
    pub poll_interval_ms: u64,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            analyser: AnalyserConfig::default(),
            pulse_falloff: DEFAULT_FALLOFF,
            api_base: String::new(),
            seed_query: "Daft Punk".to_string(),
            search_limit: 20,
            poll_interval_ms: 1_000,
        }
    }
}

impl VisualizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, layout) in [("spectrum", &self.render.spectrum), ("pulse", &self.render.pulse)] {
            if layout.bar_count == 0 {
                return Err(VizError::InvalidConfig(format!("{name}.bar_count must be > 0")));
            }
            if !(layout.height_factor > 0.0 && layout.height_factor <= 1.0) {
                return Err(VizError::InvalidConfig(format!(
                    "{name}.height_factor must be in (0, 1]"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.render.gap_ratio) {
            return Err(VizError::InvalidConfig("gap_ratio must be in [0, 1)".into()));
        }
        let a = &self.analyser;
        if !a.fft_size.is_power_of_two() || !(32..=32_768).contains(&a.fft_size) {
            return Err(VizError::InvalidConfig(format!(
                "fft_size {} must be a power of two in 32..=32768",
                a.fft_size
            )));
        }
        if !(0.0..1.0).contains(&a.smoothing) {
            return Err(VizError::InvalidConfig("smoothing must be in [0, 1)".into()));
        }
        if a.min_decibels >= a.max_decibels {
            return Err(VizError::InvalidConfig(
                "min_decibels must be below max_decibels".into(),
            ));
        }
        if !(self.pulse_falloff.is_finite() && self.pulse_falloff > 0.0) {
            return Err(VizError::InvalidConfig("pulse_falloff must be positive".into()));
        }
        Ok(())
    }

    /// Joins `api_base` and a route path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }
}
