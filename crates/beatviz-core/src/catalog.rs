//! Streaming API payloads and the few derived strings the UI shows.
//!
//! Only the fields the visualizer reads are modelled; everything else in
//! the JSON is ignored.
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::beats::BeatSchedule;
use crate::clock::PlaybackSample;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// The track a market relink stands in for.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkedTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Set when the player substituted this track for the one requested.
    #[serde(default)]
    pub linked_from: Option<LinkedTrack>,
}

impl Track {
    /// True for `id` itself or for a relink of it.
    pub fn is_or_relinks(&self, id: &str) -> bool {
        self.id == id
            || self
                .linked_from
                .as_ref()
                .and_then(|l| l.id.as_deref())
                .is_some_and(|linked| linked == id)
    }

    /// Artist names joined with ", ".
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Medium cover if present (the API lists images largest first).
    pub fn cover_url(&self) -> Option<&str> {
        let images = &self.album.as_ref()?.images;
        images.get(1).or_else(|| images.first()).map(|i| i.url.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging<T> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<Paging<Track>>,
}

impl SearchResponse {
    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks.map(|p| p.items).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    #[serde(default)]
    pub beats: Vec<TimeInterval>,
}

impl AudioAnalysis {
    pub fn beat_schedule(&self) -> BeatSchedule {
        BeatSchedule::from_unsorted(self.beats.iter().map(|b| b.start))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// `GET /me/player` body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default)]
    pub device: Option<Device>,
}

impl PlayerState {
    /// Position sample stamped with the moment the response arrived.
    ///
    /// `None` when the player did not report a position.
    pub fn to_sample(&self, captured_at: Instant) -> Option<PlaybackSample> {
        let progress = self.progress_ms?;
        Some(PlaybackSample::new(
            progress as f64 / 1000.0,
            captured_at,
            self.is_playing,
        ))
    }

    pub fn track_id(&self) -> Option<&str> {
        self.item.as_ref().map(|t| t.id.as_str())
    }

    /// Whether this report is about `track_id`. A report without an item is
    /// accepted; relinked items count as the track they replace.
    pub fn is_for(&self, track_id: &str) -> bool {
        self.item.as_ref().is_none_or(|t| t.is_or_relinks(track_id))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn greeting(&self) -> String {
        format!("Hi, {}", self.display())
    }
}

/// Badge text for an optional profile.
pub fn greeting_for(user: Option<&UserProfile>) -> String {
    user.map_or_else(|| "Not logged in".to_string(), UserProfile::greeting)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub energy: f64,
    #[serde(default)]
    pub danceability: f64,
    #[serde(default)]
    pub valence: f64,
    /// Pitch class, -1 when undetected
    #[serde(default)]
    pub key: i32,
    /// 1 major, 0 minor
    #[serde(default)]
    pub mode: i32,
}

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl AudioFeatures {
    pub fn key_name(&self) -> &'static str {
        usize::try_from(self.key)
            .ok()
            .and_then(|k| PITCH_CLASSES.get(k))
            .copied()
            .unwrap_or("?")
    }

    pub fn mode_name(&self) -> &'static str {
        if self.mode == 1 {
            "major"
        } else {
            "minor"
        }
    }
}

/// Flattened track the UI and mode selection work with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artists: String,
    pub cover_url: Option<String>,
    pub preview_url: Option<String>,
    pub uri: String,
    pub duration_ms: u64,
}

impl TrackInfo {
    pub fn has_preview(&self) -> bool {
        self.preview_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl From<&Track> for TrackInfo {
    fn from(t: &Track) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            artists: t.artist_line(),
            cover_url: t.cover_url().map(str::to_string),
            preview_url: t.preview_url.clone().filter(|u| !u.is_empty()),
            uri: t.uri.clone(),
            duration_ms: t.duration_ms,
        }
    }
}

/// `POST /api/play` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub device_id: String,
    pub uri: String,
}

/// `POST /api/transfer` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub device_id: String,
}

/// `PUT /me/player/play` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartPlayback {
    pub uris: Vec<String>,
}

/// `m:ss`, minutes unbounded.
pub fn format_clock(ms: u64) -> String {
    let s = ms / 1000;
    format!("{}:{:02}", s / 60, s % 60)
}

pub fn now_playing_line(track: &TrackInfo) -> String {
    if track.artists.is_empty() {
        track.name.clone()
    } else {
        format!("{} — {}", track.name, track.artists)
    }
}

/// Played fraction in `[0, 1]`.
pub fn progress_fraction(position_ms: u64, duration_ms: u64) -> f32 {
    if duration_ms == 0 {
        return 0.0;
    }
    (position_ms as f64 / duration_ms as f64).min(1.0) as f32
}

pub mod routes {
    //! Request paths. Proxy routes are same-origin endpoints served next to
    //! the page; Web API routes are relative to the API base URL.

    pub const TOKEN: &str = "/token";
    pub const SEARCH: &str = "/api/search";
    pub const ME: &str = "/api/me";
    pub const PLAY: &str = "/api/play";
    pub const TRANSFER: &str = "/api/transfer";

    pub fn analysis(id: &str) -> String {
        format!("/api/analysis/{id}")
    }

    pub mod web_api {
        pub const BASE: &str = "https://api.spotify.com/v1";
        pub const SEARCH: &str = "/search";
        pub const ME: &str = "/me";
        pub const PLAYER: &str = "/me/player";
        pub const PLAY: &str = "/me/player/play";
        pub const PAUSE: &str = "/me/player/pause";

        pub fn audio_analysis(id: &str) -> String {
            format!("/audio-analysis/{id}")
        }

        pub fn audio_features(id: &str) -> String {
            format!("/audio-features/{id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use test_case::test_case;

    const SEARCH_JSON: &str = r#"{
        "tracks": {
            "href": "ignored",
            "items": [
                {
                    "id": "4uLU6hMCjMI75M1A2tKUQC",
                    "name": "One More Time",
                    "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
                    "duration_ms": 320357,
                    "preview_url": "https://p.scdn.co/mp3-preview/abc",
                    "artists": [{ "name": "Daft Punk", "id": "4tZwfgrHOc3mvqYlEYSvVi" }],
                    "album": {
                        "name": "Discovery",
                        "images": [
                            { "url": "https://i.scdn.co/640", "width": 640, "height": 640 },
                            { "url": "https://i.scdn.co/300", "width": 300, "height": 300 },
                            { "url": "https://i.scdn.co/64", "width": 64, "height": 64 }
                        ]
                    }
                },
                {
                    "id": "2",
                    "name": "Harder, Better",
                    "preview_url": null,
                    "artists": [{ "name": "Daft Punk" }, { "name": "Kanye" }],
                    "album": { "images": [{ "url": "https://i.scdn.co/only" }] }
                }
            ],
            "total": 2
        }
    }"#;

    #[test]
    fn parses_search_results() {
        let res: SearchResponse = serde_json::from_str(SEARCH_JSON).unwrap();
        let tracks = res.into_tracks();
        assert_eq!(tracks.len(), 2);

        let first = TrackInfo::from(&tracks[0]);
        assert_eq!(first.artists, "Daft Punk");
        assert_eq!(first.cover_url.as_deref(), Some("https://i.scdn.co/300"));
        assert!(first.has_preview());
        assert_eq!(now_playing_line(&first), "One More Time — Daft Punk");

        let second = TrackInfo::from(&tracks[1]);
        assert_eq!(second.artists, "Daft Punk, Kanye");
        assert_eq!(second.cover_url.as_deref(), Some("https://i.scdn.co/only"));
        assert!(!second.has_preview());
    }

    #[test]
    fn empty_search_has_no_tracks() {
        let res: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(res.into_tracks().is_empty());
    }

    #[test]
    fn analysis_beats_become_schedule() {
        let a: AudioAnalysis = serde_json::from_str(
            r#"{ "bars": [], "beats": [
                { "start": 1.5, "duration": 0.5, "confidence": 0.9 },
                { "start": 0.98, "duration": 0.5, "confidence": 0.7 },
                { "start": 1.5, "duration": 0.5, "confidence": 0.1 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(a.beat_schedule().as_slice(), &[0.98, 1.5]);

        let empty: AudioAnalysis = serde_json::from_str(r#"{ "meta": {} }"#).unwrap();
        assert!(empty.beat_schedule().is_empty());
    }

    #[test]
    fn player_state_to_sample() {
        let state: PlayerState = serde_json::from_str(
            r#"{ "progress_ms": 61500, "is_playing": true, "item": { "id": "x", "name": "X" } }"#,
        )
        .unwrap();
        let at = Instant::now();
        let sample = state.to_sample(at).unwrap();
        assert_eq!(sample.reported_position_seconds, 61.5);
        assert!(sample.is_playing);
        assert_eq!(crate::clock::estimate(&sample, at + Duration::from_millis(500)), 62.0);
        assert_eq!(state.track_id(), Some("x"));

        let idle: PlayerState = serde_json::from_str(r#"{ "is_playing": false }"#).unwrap();
        assert_eq!(idle.to_sample(at), None);
    }

    #[test]
    fn relinked_item_counts_as_requested_track() {
        let relinked: PlayerState = serde_json::from_str(
            r#"{
                "progress_ms": 1000,
                "is_playing": true,
                "item": {
                    "id": "market-copy",
                    "name": "Song",
                    "linked_from": { "id": "requested", "uri": "spotify:track:requested" }
                }
            }"#,
        )
        .unwrap();
        assert!(relinked.is_for("requested"));
        assert!(relinked.is_for("market-copy"));
        assert!(!relinked.is_for("other"));

        let plain: PlayerState =
            serde_json::from_str(r#"{ "item": { "id": "a", "name": "A" } }"#).unwrap();
        assert!(plain.is_for("a"));
        assert!(!plain.is_for("b"));

        let empty: PlayerState = serde_json::from_str("{}").unwrap();
        assert!(empty.is_for("anything"));
    }

    #[test]
    fn greetings() {
        let named = UserProfile {
            id: "u1".into(),
            display_name: Some("Ana".into()),
        };
        let anon = UserProfile {
            id: "u2".into(),
            display_name: Some(String::new()),
        };
        assert_eq!(greeting_for(Some(&named)), "Hi, Ana");
        assert_eq!(greeting_for(Some(&anon)), "Hi, u2");
        assert_eq!(greeting_for(None), "Not logged in");
    }

    #[test_case(0, "0:00")]
    #[test_case(999, "0:00")]
    #[test_case(61_000, "1:01")]
    #[test_case(320_357, "5:20")]
    #[test_case(3_600_000, "60:00")]
    fn clock_format(ms: u64, expected: &str) {
        assert_eq!(format_clock(ms), expected);
    }

    #[test]
    fn features_names() {
        let f: AudioFeatures =
            serde_json::from_str(r#"{ "tempo": 123.4, "key": 9, "mode": 0 }"#).unwrap();
        assert_eq!(f.key_name(), "A");
        assert_eq!(f.mode_name(), "minor");
        let unknown = AudioFeatures {
            key: -1,
            mode: 1,
            ..AudioFeatures::default()
        };
        assert_eq!(unknown.key_name(), "?");
        assert_eq!(unknown.mode_name(), "major");
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_fraction(500, 1000), 0.5);
        assert_eq!(progress_fraction(5000, 1000), 1.0);
        assert_eq!(progress_fraction(10, 0), 0.0);
    }

    #[test]
    fn routes_embed_ids() {
        assert_eq!(routes::analysis("abc"), "/api/analysis/abc");
        assert_eq!(routes::web_api::audio_features("abc"), "/audio-features/abc");
        let body = serde_json::to_string(&PlayRequest {
            device_id: "d".into(),
            uri: "spotify:track:abc".into(),
        })
        .unwrap();
        assert_eq!(body, r#"{"device_id":"d","uri":"spotify:track:abc"}"#);
    }
}
