//! Bindings to the streaming service's Web Playback SDK (`Spotify.Player`).
//!
//! The SDK script is loaded by the page. It calls
//! `window.onSpotifyWebPlaybackSDKReady` once, after which a player can be
//! constructed and connected. The player then appears as a remote device the
//! proxy can start playback on.
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use beatviz_core::PlaybackSample;
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_time::Instant;

use crate::backend::Backend;
use crate::describe_js;
use crate::WebEvent;

#[wasm_bindgen(js_namespace = Spotify)]
extern "C" {
    #[wasm_bindgen(js_name = Player)]
    pub type SdkPlayer;

    #[wasm_bindgen(constructor, js_class = "Player")]
    fn new(options: &JsValue) -> SdkPlayer;

    #[wasm_bindgen(method, js_class = "Player")]
    fn connect(this: &SdkPlayer) -> js_sys::Promise;

    #[wasm_bindgen(method, js_class = "Player", js_name = addListener)]
    fn add_listener(this: &SdkPlayer, event: &str, callback: &js_sys::Function) -> bool;

    #[wasm_bindgen(method, js_class = "Player", js_name = getCurrentState)]
    fn get_current_state(this: &SdkPlayer) -> js_sys::Promise;

    #[wasm_bindgen(method, js_class = "Player")]
    fn resume(this: &SdkPlayer) -> js_sys::Promise;

    #[wasm_bindgen(method, js_class = "Player")]
    fn pause(this: &SdkPlayer) -> js_sys::Promise;
}

const PLAYER_NAME: &str = "beatviz";
const READY_HOOK: &str = "onSpotifyWebPlaybackSDKReady";

#[derive(Debug, Deserialize)]
struct ReadyPayload {
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct LinkedFrom {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SdkTrack {
    #[serde(default)]
    id: Option<String>,
    /// Present when the SDK plays a market relink of the requested track
    #[serde(default)]
    linked_from: Option<LinkedFrom>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackWindow {
    #[serde(default)]
    current_track: Option<SdkTrack>,
}

/// Subset of the SDK's `WebPlaybackState`.
#[derive(Debug, Deserialize)]
struct SdkState {
    /// Milliseconds
    position: f64,
    paused: bool,
    #[serde(default)]
    track_window: TrackWindow,
}

impl SdkState {
    /// Ids the current track answers to: its own and the one it relinks.
    fn track_ids(&self) -> Vec<String> {
        let Some(track) = &self.track_window.current_track else {
            return Vec::new();
        };
        let linked = track.linked_from.as_ref().and_then(|l| l.id.as_ref());
        track.id.iter().chain(linked).cloned().collect()
    }
}

/// Whether a player report tagged with `reported` ids belongs to `track_id`.
/// Reports that name no track are trusted.
pub fn sample_is_for(reported: &[String], track_id: &str) -> bool {
    reported.is_empty() || reported.iter().any(|id| id == track_id)
}

/// SDK objects are plain JS objects; round-trip them through JSON into Rust types.
fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue) -> Option<T> {
    let json = js_sys::JSON::stringify(value).ok()?.as_string()?;
    serde_json::from_str(&json)
        .inspect_err(|e| log::debug!("unexpected SDK payload: {e}"))
        .ok()
}

fn settle(promise: js_sys::Promise, what: &'static str) {
    spawn_local(async move {
        if let Err(e) = JsFuture::from(promise).await {
            log::warn!("SDK {what} failed: {}", describe_js(&e));
        }
    });
}

/// Connected SDK player plus the polling state for `getCurrentState`.
#[derive(Clone)]
pub struct RemotePlayer {
    player: Rc<SdkPlayer>,
    poll_in_flight: Rc<Cell<bool>>,
}

impl RemotePlayer {
    pub fn resume(&self) {
        settle(self.player.resume(), "resume()");
    }

    pub fn pause(&self) {
        settle(self.player.pause(), "pause()");
    }

    /// Requests the player's state unless a request is already out. The
    /// sample lands in `inbox` tagged with the track ids it reports.
    pub fn poll_state(&self, inbox: &Rc<RefCell<Vec<WebEvent>>>) {
        if self.poll_in_flight.replace(true) {
            return;
        }
        let player = self.player.clone();
        let in_flight = self.poll_in_flight.clone();
        let inbox = inbox.clone();
        spawn_local(async move {
            let result = JsFuture::from(player.get_current_state()).await;
            let captured_at = Instant::now();
            in_flight.set(false);
            let state = match result {
                Ok(v) if v.is_null() || v.is_undefined() => return,
                Ok(v) => v,
                Err(e) => {
                    log::debug!("getCurrentState failed: {}", describe_js(&e));
                    return;
                }
            };
            let Some(state) = from_js::<SdkState>(&state) else {
                return;
            };
            let sample = PlaybackSample::new(state.position / 1000.0, captured_at, !state.paused);
            inbox.borrow_mut().push(WebEvent::PlayerSample {
                track_ids: state.track_ids(),
                sample,
            });
        });
    }
}

/// Installs the SDK ready hook. When the SDK is already loaded the player is
/// created right away.
pub fn install(backend: Backend, inbox: Rc<RefCell<Vec<WebEvent>>>) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or("no window")?;

    let ready = Closure::wrap(Box::new(move || {
        if let Err(e) = connect_player(backend.clone(), inbox.clone()) {
            log::error!("could not create SDK player: {}", describe_js(&e));
        }
    }) as Box<dyn FnMut()>);

    let sdk_loaded = js_sys::Reflect::get(&window, &"Spotify".into())
        .map(|v| !v.is_undefined())
        .unwrap_or(false);
    if sdk_loaded {
        ready
            .as_ref()
            .unchecked_ref::<js_sys::Function>()
            .call0(&JsValue::NULL)?;
    } else {
        js_sys::Reflect::set(&window, &READY_HOOK.into(), ready.as_ref())?;
    }
    ready.forget();
    Ok(())
}

fn connect_player(backend: Backend, inbox: Rc<RefCell<Vec<WebEvent>>>) -> Result<(), JsValue> {
    let token_backend = backend.clone();
    let get_token = Closure::wrap(Box::new(move |callback: js_sys::Function| {
        let backend = token_backend.clone();
        spawn_local(async move {
            match backend.token().await {
                Ok(token) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(&token)) {
                        log::warn!("SDK token callback threw: {}", describe_js(&e));
                    }
                }
                Err(e) => log::warn!("token request failed: {e}"),
            }
        });
    }) as Box<dyn FnMut(js_sys::Function)>);

    let options = js_sys::Object::new();
    js_sys::Reflect::set(&options, &"name".into(), &PLAYER_NAME.into())?;
    js_sys::Reflect::set(&options, &"getOAuthToken".into(), get_token.as_ref())?;
    js_sys::Reflect::set(&options, &"volume".into(), &JsValue::from_f64(0.8))?;
    get_token.forget();

    let player = Rc::new(SdkPlayer::new(&options));
    let remote = RemotePlayer {
        player: player.clone(),
        poll_in_flight: Rc::new(Cell::new(false)),
    };

    let ready_inbox = inbox.clone();
    let on_ready = Closure::wrap(Box::new(move |payload: JsValue| {
        let Some(ReadyPayload { device_id }) = from_js(&payload) else {
            return;
        };
        log::info!("SDK player ready as device {device_id}");
        let backend = backend.clone();
        let transfer_id = device_id.clone();
        spawn_local(async move {
            if let Err(e) = backend.transfer(&transfer_id).await {
                log::warn!("transfer to {transfer_id} failed: {e}");
            }
        });
        ready_inbox.borrow_mut().push(WebEvent::DeviceReady {
            device_id,
            player: remote.clone(),
        });
    }) as Box<dyn FnMut(JsValue)>);
    player.add_listener("ready", on_ready.as_ref().unchecked_ref());
    on_ready.forget();

    let gone_inbox = inbox;
    let on_not_ready = Closure::wrap(Box::new(move |payload: JsValue| {
        if let Some(ReadyPayload { device_id }) = from_js(&payload) {
            log::warn!("SDK device {device_id} went offline");
        }
        gone_inbox.borrow_mut().push(WebEvent::DeviceGone);
    }) as Box<dyn FnMut(JsValue)>);
    player.add_listener("not_ready", on_not_ready.as_ref().unchecked_ref());
    on_not_ready.forget();

    for event in [
        "initialization_error",
        "authentication_error",
        "account_error",
        "playback_error",
    ] {
        let on_error = Closure::wrap(Box::new(move |payload: JsValue| {
            let message = from_js::<ErrorPayload>(&payload).map(|p| p.message).unwrap_or_default();
            log::error!("SDK {event}: {message}");
        }) as Box<dyn FnMut(JsValue)>);
        player.add_listener(event, on_error.as_ref().unchecked_ref());
        on_error.forget();
    }

    settle(player.connect(), "connect()");
    Ok(())
}
