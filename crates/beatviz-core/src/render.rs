//! Bar rendering and the per-frame loop.
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use egui::{Color32, Pos2, Rect, Vec2};
use web_time::Instant;

use crate::config::{BarLayout, RenderConfig};
use crate::session::VisualizerSession;
use crate::spectrum::{sample_bars, FrequencyFrame};

/// A 2D target that can be cleared and filled with rectangles.
///
/// Coordinates are relative to the surface's top-left corner.
pub trait DrawSurface {
    fn size(&self) -> Vec2;

    fn fill_rect(&mut self, rect: Rect, color: Color32);

    fn clear(&mut self, color: Color32) {
        let size = self.size();
        self.fill_rect(Rect::from_min_size(Pos2::ZERO, size), color);
    }

    /// Device pixels per logical point.
    fn pixels_per_point(&self) -> f32 {
        1.0
    }

    /// Brings the backing store in line with the displayed size. Returns true
    /// when it had to resize.
    fn sync_backing_size(&mut self) -> bool {
        false
    }
}

/// What the renderer shows this frame.
#[derive(Clone, Copy, Debug)]
pub enum Signal<'a> {
    Idle,
    Spectrum(&'a FrequencyFrame),
    Pulse(f32),
}

/// Symmetric hump so a pulse is strongest in the centre bars.
///
/// Bars are sampled at their centres, `(i + 0.5) / n`, which keeps the
/// profile mirror-symmetric for any bar count.
pub fn pulse_envelope(bar_count: usize, strength: f32) -> Vec<f32> {
    let strength = strength.clamp(0.0, 1.0);
    (0..bar_count)
        .map(|i| ((i as f32 + 0.5) / bar_count as f32 * PI).sin() * strength)
        .collect()
}

/// Layout and per-bar levels in `[0, 1]` for a signal.
pub fn bar_levels<'c>(signal: &Signal<'_>, config: &'c RenderConfig) -> (&'c BarLayout, Vec<f32>) {
    match signal {
        Signal::Spectrum(frame) => {
            let layout = &config.spectrum;
            (layout, sample_bars(frame, layout.bar_count))
        }
        Signal::Pulse(strength) => {
            let layout = &config.pulse;
            (layout, pulse_envelope(layout.bar_count, *strength))
        }
        Signal::Idle => {
            let layout = &config.pulse;
            (layout, vec![0.0; layout.bar_count])
        }
    }
}

/// Red rises and green falls with intensity; blue stays saturated.
pub fn bar_color(v: f32) -> Color32 {
    let v = v.clamp(0.0, 1.0);
    Color32::from_rgb(
        (40.0 + v * 180.0).round() as u8,
        (200.0 - v * 120.0).round() as u8,
        255,
    )
}

pub struct RenderDriver {
    config: RenderConfig,
}

impl RenderDriver {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Draws one complete frame. Never fails; a zero-sized surface is skipped.
    pub fn draw<S: DrawSurface + ?Sized>(&self, surface: &mut S, signal: &Signal<'_>) {
        surface.sync_backing_size();
        let size = surface.size();
        if size.x <= 0.0 || size.y <= 0.0 {
            return;
        }
        let (w, h) = (size.x, size.y);

        surface.clear(self.config.background);

        let (layout, levels) = bar_levels(signal, &self.config);
        if !levels.is_empty() {
            let slot = w / levels.len() as f32;
            let bar_width = slot * (1.0 - self.config.gap_ratio);
            for (i, v) in levels.iter().enumerate() {
                let bar_height = (v * h * layout.height_factor + layout.min_height_px).min(h);
                let x = i as f32 * slot;
                let rect = Rect::from_min_max(Pos2::new(x, h - bar_height), Pos2::new(x + bar_width, h));
                surface.fill_rect(rect, bar_color(*v));
            }
        }

        let base = self.config.baseline_height_px.min(h);
        surface.fill_rect(
            Rect::from_min_max(Pos2::new(0.0, h - base), Pos2::new(w, h)),
            self.config.baseline,
        );
    }
}

// ===== Frame scheduling =====

/// The host's "call me again next refresh" primitive.
pub trait FrameScheduler {
    fn request_frame(&self);
}

impl FrameScheduler for egui::Context {
    fn request_frame(&self) {
        self.request_repaint();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    Stopped,
}

/// Cloneable handle that ends a [`FrameLoop`] from outside the loop.
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        !self.0.load(Ordering::Relaxed)
    }
}

/// Draws a frame, then asks the host for the next one, until stopped.
#[derive(Debug)]
pub struct FrameLoop {
    running: Arc<AtomicBool>,
    frames: u64,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            frames: 0,
        }
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn tick<S, H>(
        &mut self,
        session: &mut VisualizerSession,
        driver: &RenderDriver,
        surface: &mut S,
        scheduler: &H,
        now: Instant,
    ) -> FrameControl
    where
        S: DrawSurface + ?Sized,
        H: FrameScheduler + ?Sized,
    {
        if !self.is_running() {
            return FrameControl::Stopped;
        }
        let signal = session.signal(now);
        driver.draw(surface, &signal);
        self.frames += 1;
        scheduler.request_frame();
        FrameControl::Continue
    }
}

// ===== Surfaces =====

/// Draws through an egui painter into `rect`.
pub struct PainterSurface<'a> {
    painter: &'a egui::Painter,
    rect: Rect,
}

impl<'a> PainterSurface<'a> {
    pub fn new(painter: &'a egui::Painter, rect: Rect) -> Self {
        Self { painter, rect }
    }
}

impl DrawSurface for PainterSurface<'_> {
    fn size(&self) -> Vec2 {
        self.rect.size()
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        self.painter
            .rect_filled(rect.translate(self.rect.min.to_vec2()), 0.0, color);
    }

    fn pixels_per_point(&self) -> f32 {
        self.painter.pixels_per_point()
    }
}

/// In-memory RGBA surface in device pixels.
///
/// The host reports the displayed size and pixel ratio (a resize observer);
/// the backing buffer follows on the next frame.
#[derive(Clone, Debug)]
pub struct PixelSurface {
    width: usize,
    height: usize,
    pixels: Vec<Color32>,
    display_size: Vec2,
    pixels_per_point: f32,
}

impl PixelSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color32::BLACK; width * height],
            display_size: Vec2::new(width as f32, height as f32),
            pixels_per_point: 1.0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_display(&mut self, display_size: Vec2, pixels_per_point: f32) {
        self.display_size = display_size;
        self.pixels_per_point = pixels_per_point.max(1.0);
    }

    /// Records the display size and resizes right away.
    pub fn resize_for(&mut self, display_size: Vec2, pixels_per_point: f32) -> bool {
        self.set_display(display_size, pixels_per_point);
        self.sync_backing_size()
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    /// Backing size the current display size needs.
    pub fn target_size(&self) -> (usize, usize) {
        let w = (self.display_size.x * self.pixels_per_point).round().max(0.0) as usize;
        let h = (self.display_size.y * self.pixels_per_point).round().max(0.0) as usize;
        (w, h)
    }
}

impl DrawSurface for PixelSurface {
    fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    fn pixels_per_point(&self) -> f32 {
        self.pixels_per_point
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        let x0 = rect.min.x.round().max(0.0) as usize;
        let y0 = rect.min.y.round().max(0.0) as usize;
        let x1 = (rect.max.x.round().max(0.0) as usize).min(self.width);
        let y1 = (rect.max.y.round().max(0.0) as usize).min(self.height);
        for y in y0..y1 {
            let row = y * self.width;
            self.pixels[row + x0.min(x1)..row + x1].fill(color);
        }
    }

    fn sync_backing_size(&mut self) -> bool {
        let (w, h) = self.target_size();
        if (w, h) == (self.width, self.height) {
            return false;
        }
        self.width = w;
        self.height = h;
        self.pixels = vec![Color32::BLACK; w * h];
        true
    }
}

/// Surface that records fill calls instead of rasterising them.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    pub size: Vec2,
    pub fills: Vec<(Rect, Color32)>,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Vec2::new(width, height),
            fills: Vec::new(),
        }
    }

    /// Fills after the background clear and before the baseline.
    pub fn bars(&self) -> &[(Rect, Color32)] {
        let n = self.fills.len();
        if n < 2 {
            return &[];
        }
        &self.fills[1..n - 1]
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        self.fills.push((rect, color));
    }
}
