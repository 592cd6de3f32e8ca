//! Live mode in the browser: a detached `<audio>` element for preview clips
//! and an analyser node tapped off it.
use beatviz_core::{AnalyserConfig, FrequencyAnalyzer, FrequencyFrame, Result, VizError};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{AnalyserNode, AudioContext, AudioContextState, HtmlAudioElement, MediaElementAudioSourceNode};

use crate::describe_js;

fn audio_error(context: &str, err: &JsValue) -> VizError {
    VizError::AudioUnavailable(format!("{context}: {}", describe_js(err)))
}

/// Awaits a promise in the background, logging a rejection instead of failing.
fn settle(promise: js_sys::Promise, what: &'static str) {
    spawn_local(async move {
        if let Err(e) = JsFuture::from(promise).await {
            log::warn!("{what} rejected: {}", describe_js(&e));
        }
    });
}

pub struct PreviewElement {
    audio: HtmlAudioElement,
}

impl PreviewElement {
    pub fn create() -> Result<Self> {
        let audio = HtmlAudioElement::new().map_err(|e| audio_error("create <audio>", &e))?;
        audio.set_cross_origin(Some("anonymous"));
        Ok(Self { audio })
    }

    pub fn element(&self) -> &HtmlAudioElement {
        &self.audio
    }

    pub fn load(&self, url: &str) {
        self.audio.set_src(url);
        self.audio.set_current_time(0.0);
    }

    /// Starts playback. Autoplay policy rejections are logged and tolerated.
    pub fn play(&self) {
        match self.audio.play() {
            Ok(promise) => settle(promise, "preview play()"),
            Err(e) => log::warn!("preview play() threw: {}", describe_js(&e)),
        }
    }

    pub fn pause(&self) {
        if let Err(e) = self.audio.pause() {
            log::warn!("preview pause() threw: {}", describe_js(&e));
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.audio.set_volume(f64::from(volume.clamp(0.0, 1.0)));
    }

    pub fn position_seconds(&self) -> f64 {
        self.audio.current_time()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        let d = self.audio.duration();
        d.is_finite().then_some(d)
    }
}

/// `AnalyserNode` between the preview element and the speakers.
pub struct WebAnalyser {
    context: AudioContext,
    analyser: AnalyserNode,
    _source: MediaElementAudioSourceNode,
}

impl WebAnalyser {
    /// Must run inside a user gesture, otherwise the context starts suspended.
    pub fn build(element: &HtmlAudioElement, config: &AnalyserConfig) -> Result<Self> {
        let context = AudioContext::new().map_err(|e| audio_error("AudioContext", &e))?;
        let analyser = context
            .create_analyser()
            .map_err(|e| audio_error("createAnalyser", &e))?;
        analyser.set_fft_size(config.fft_size as u32);
        analyser.set_smoothing_time_constant(f64::from(config.smoothing));
        analyser.set_min_decibels(f64::from(config.min_decibels));
        analyser.set_max_decibels(f64::from(config.max_decibels));

        let source = context
            .create_media_element_source(element)
            .map_err(|e| audio_error("createMediaElementSource", &e))?;
        source
            .connect_with_audio_node(&analyser)
            .map_err(|e| audio_error("connect source", &e))?;
        analyser
            .connect_with_audio_node(&context.destination())
            .map_err(|e| audio_error("connect destination", &e))?;

        log::info!(
            "audio graph ready: fft {} smoothing {}",
            config.fft_size,
            config.smoothing
        );
        Ok(Self {
            context,
            analyser,
            _source: source,
        })
    }

    pub fn resume_if_suspended(&self) {
        if self.context.state() != AudioContextState::Suspended {
            return;
        }
        match self.context.resume() {
            Ok(promise) => settle(promise, "AudioContext.resume()"),
            Err(e) => log::warn!("AudioContext.resume() threw: {}", describe_js(&e)),
        }
    }
}

impl FrequencyAnalyzer for WebAnalyser {
    fn bin_count(&self) -> usize {
        self.analyser.frequency_bin_count() as usize
    }

    fn read_frame(&mut self, frame: &mut FrequencyFrame) -> Result<()> {
        if self.context.state() == AudioContextState::Closed {
            return Err(VizError::AudioUnavailable("audio context closed".into()));
        }
        frame.resize(self.bin_count());
        self.analyser.get_byte_frequency_data(frame.bins_mut());
        Ok(())
    }
}
