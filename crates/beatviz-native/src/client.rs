//! Blocking Web API client. Only ever called from the worker thread.
use std::time::Duration;

use beatviz_core::catalog::{
    routes::web_api, AudioAnalysis, AudioFeatures, PlayerState, SearchResponse, StartPlayback,
    Track, UserProfile,
};
use beatviz_core::{BeatSchedule, Result, VizError};
use serde::de::DeserializeOwned;
use ureq::http::Response;
use ureq::Body;

const PREVIEW_LIMIT_BYTES: u64 = 16 * 1024 * 1024;

fn transport(err: ureq::Error) -> VizError {
    VizError::Transport(err.to_string())
}

pub struct ApiClient {
    agent: ureq::Agent,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(20)))
            .build();
        Self {
            agent: config.into(),
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn bearer(&self) -> Result<String> {
        self.token
            .as_ref()
            .map(|t| format!("Bearer {t}"))
            .ok_or(VizError::NoToken)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn check(url: &str, response: Response<Body>) -> Result<Response<Body>> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(VizError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        let mut request = self.agent.get(&url).header("Authorization", self.bearer()?);
        for (k, v) in query {
            request = request.query(*k, *v);
        }
        let mut response = Self::check(&url, request.call().map_err(transport)?)?;
        let text = response.body_mut().read_to_string().map_err(transport)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<Track>> {
        let limit = limit.to_string();
        let res: SearchResponse = self.get_json(
            web_api::SEARCH,
            &[("q", query), ("type", "track"), ("limit", &limit)],
        )?;
        Ok(res.into_tracks())
    }

    pub fn me(&self) -> Result<UserProfile> {
        self.get_json(web_api::ME, &[])
    }

    pub fn beat_schedule(&self, track_id: &str) -> Result<BeatSchedule> {
        let analysis: AudioAnalysis = self.get_json(&web_api::audio_analysis(track_id), &[])?;
        Ok(analysis.beat_schedule())
    }

    pub fn audio_features(&self, track_id: &str) -> Result<AudioFeatures> {
        self.get_json(&web_api::audio_features(track_id), &[])
    }

    /// `None` when nothing is playing on any device (204 No Content).
    pub fn player_state(&self) -> Result<Option<PlayerState>> {
        let url = self.url(web_api::PLAYER);
        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer()?)
            .call()
            .map_err(transport)?;
        if response.status().as_u16() == 204 {
            return Ok(None);
        }
        let mut response = Self::check(&url, response)?;
        let text = response.body_mut().read_to_string().map_err(transport)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Starts `uri` on the user's active device.
    pub fn start_playback(&self, uri: &str) -> Result<()> {
        let url = self.url(web_api::PLAY);
        let body = serde_json::to_string(&StartPlayback {
            uris: vec![uri.to_string()],
        })?;
        let response = self
            .agent
            .put(&url)
            .header("Authorization", self.bearer()?)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(transport)?;
        Self::check(&url, response).map(drop)
    }

    pub fn resume(&self) -> Result<()> {
        self.put_empty(web_api::PLAY)
    }

    pub fn pause(&self) -> Result<()> {
        self.put_empty(web_api::PAUSE)
    }

    fn put_empty(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        let response = self
            .agent
            .put(&url)
            .header("Authorization", self.bearer()?)
            .send_empty()
            .map_err(transport)?;
        Self::check(&url, response).map(drop)
    }

    /// Preview clips are public CDN files; no token needed.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.agent.get(url).call().map_err(transport)?;
        let mut response = Self::check(url, response)?;
        response
            .body_mut()
            .with_config()
            .limit(PREVIEW_LIMIT_BYTES)
            .read_to_vec()
            .map_err(transport)
    }
}
