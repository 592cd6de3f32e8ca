//! Error types shared by the engine and both hosts.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VizError {
    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Request never produced a response (network, CORS, aborted fetch)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Token provider had nothing to hand out
    #[error("no access token available")]
    NoToken,

    /// Audio graph not built yet or torn down
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("invalid beat schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, VizError>;
