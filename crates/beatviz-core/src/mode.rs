use serde::{Deserialize, Serialize};

use crate::catalog::TrackInfo;

/// Which signal drives the bars for the loaded track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Decoded preview audio feeds a frequency analyser.
    LiveFrequency,
    /// A remote player is polled for position; beats come from track analysis.
    BeatPulse,
    #[default]
    Idle,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::LiveFrequency => "live spectrum",
            Mode::BeatPulse => "beat pulse",
            Mode::Idle => "idle",
        }
    }
}

/// What the host can do besides decoding a preview clip itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackCapabilities {
    /// A remote player is ready to take the track and report its position.
    pub remote_player: bool,
}

/// A decodable preview always wins; it gives real audio to analyse.
pub fn select_mode(track: &TrackInfo, caps: PlaybackCapabilities) -> Mode {
    if track.has_preview() {
        Mode::LiveFrequency
    } else if caps.remote_player {
        Mode::BeatPulse
    } else {
        Mode::Idle
    }
}

/// What to silence when the loaded track moves from one mode to another, so
/// only the new source is ever audible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Handover {
    /// Pause the remote player that was driving beat pulses.
    pub pause_remote: bool,
    /// Stop the local preview clip.
    pub stop_preview: bool,
}

pub fn handover(prev: Mode, next: Mode) -> Handover {
    Handover {
        pause_remote: prev == Mode::BeatPulse && next != Mode::BeatPulse,
        stop_preview: prev == Mode::LiveFrequency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn track(preview: Option<&str>) -> TrackInfo {
        TrackInfo {
            id: "t".into(),
            name: "T".into(),
            preview_url: preview.map(str::to_string),
            ..TrackInfo::default()
        }
    }

    #[test_case(Some("https://p.scdn.co/x"), false, Mode::LiveFrequency ; "preview only")]
    #[test_case(Some("https://p.scdn.co/x"), true, Mode::LiveFrequency ; "preview beats remote")]
    #[test_case(None, true, Mode::BeatPulse ; "remote only")]
    #[test_case(Some(""), true, Mode::BeatPulse ; "blank preview is no preview")]
    #[test_case(None, false, Mode::Idle ; "nothing available")]
    fn selection(preview: Option<&str>, remote_player: bool, expected: Mode) {
        let got = select_mode(&track(preview), PlaybackCapabilities { remote_player });
        assert_eq!(got, expected);
    }

    #[test_case(Mode::BeatPulse, Mode::LiveFrequency, true, false ; "remote to preview pauses remote")]
    #[test_case(Mode::BeatPulse, Mode::Idle, true, false ; "remote to idle pauses remote")]
    #[test_case(Mode::BeatPulse, Mode::BeatPulse, false, false ; "remote to remote replaces the track")]
    #[test_case(Mode::LiveFrequency, Mode::BeatPulse, false, true ; "preview to remote stops preview")]
    #[test_case(Mode::LiveFrequency, Mode::LiveFrequency, false, true ; "preview to preview restarts")]
    #[test_case(Mode::Idle, Mode::LiveFrequency, false, false ; "nothing playing before")]
    fn switching_silences_previous_source(prev: Mode, next: Mode, pause_remote: bool, stop_preview: bool) {
        assert_eq!(
            handover(prev, next),
            Handover {
                pause_remote,
                stop_preview
            }
        );
    }
}
