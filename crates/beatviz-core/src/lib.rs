//! Playback-synchronized bar visualizer engine.
//!
//! Two signal sources feed one render loop:
//! - a live frequency analyser over decoded audio
//! - beat pulses from a precomputed beat schedule and a polled player position
//!
//! Hosts own the audio, the network and the frame scheduling; this crate owns
//! the timing model and what gets drawn.

pub mod beats;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod mode;
pub mod render;
pub mod session;
pub mod spectrum;

pub use beats::{pulse_strength, BeatSchedule, DEFAULT_FALLOFF};
pub use catalog::{routes, TrackInfo};
pub use clock::{estimate, LocalClock, PlaybackSample, PositionEstimator};
pub use config::{AnalyserConfig, BarLayout, RenderConfig, VisualizerConfig};
pub use error::{Result, VizError};
pub use mode::{handover, select_mode, Handover, Mode, PlaybackCapabilities};
pub use render::{
    DrawSurface, FrameControl, FrameLoop, FrameScheduler, PainterSurface, PixelSurface,
    RenderDriver, Signal, StopHandle,
};
pub use session::{LoadTicket, SignalSource, VisualizerSession};
pub use spectrum::{AudioGate, FftAnalyzer, FrequencyAnalyzer, FrequencyFrame, UserGesture};
