use super::analysis::{process_analysis, validate_track_id, AnalysisResponse, RawAnalysis, RawFeatures};
use super::{CueProvider, PlaybackState, SnapshotSource, TrackInfo};
use crate::config::RemoteConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the remote playback and analysis API.
///
/// One instance per access token. Token refresh is the caller's business:
/// an expired token surfaces as `SourceError::Unauthorized` on every call.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteClient {
    pub fn new(token: impl Into<String>, config: &RemoteConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// GET `endpoint`, mapping error statuses. `Ok(None)` for 204 No Content.
    async fn get_json(&self, endpoint: &str) -> Result<Option<Value>, SourceError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        let status = response.status().as_u16();
        if status == 204 {
            return Ok(None);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(err) = SourceError::from_status(status, retry_after.as_deref()) {
            match &err {
                SourceError::Unauthorized => warn!("Token expired or invalid"),
                SourceError::RateLimited { retry_after_secs } => {
                    warn!("Rate limited, retry after {}s", retry_after_secs)
                }
                SourceError::Server(_) => error!("Server error {} for {}", status, endpoint),
                _ => error!("Request to {} failed with status {}", endpoint, status),
            }
            return Err(err);
        }

        Ok(Some(response.json::<Value>().await?))
    }

    pub async fn current_playback(&self) -> Result<Option<PlaybackState>, SourceError> {
        let body = self.get_json("/me/player/currently-playing").await?;
        Ok(body.as_ref().and_then(parse_playback))
    }

    /// Fetch and process the analysis for one track.
    ///
    /// Audio features only refine tempo and energy, so a failure there is
    /// logged and the defaults are used.
    pub async fn audio_analysis(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
        let track_id = validate_track_id(track_id)?;

        let analysis = match self.get_json(&format!("/audio-analysis/{}", track_id)).await {
            Ok(Some(body)) => serde_json::from_value::<RawAnalysis>(body)?,
            Ok(None) | Err(SourceError::NotFound(_)) => {
                return Err(SourceError::NotFound("Track analysis".to_string()))
            }
            Err(err) => return Err(err),
        };

        let features = match self.get_json(&format!("/audio-features/{}", track_id)).await {
            Ok(Some(body)) => match serde_json::from_value::<RawFeatures>(body) {
                Ok(features) => Some(features),
                Err(err) => {
                    warn!("Ignoring malformed audio features for {}: {}", track_id, err);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!("Audio features unavailable for {}: {}", track_id, err);
                None
            }
        };

        let processed = process_analysis(&track_id, analysis, features);
        debug!(
            "Analysis for {}: {} beats, {} segments, {} sections",
            track_id,
            processed.beats.len(),
            processed.segments.len(),
            processed.sections.len()
        );
        Ok(processed)
    }
}

/// Playback state from a currently-playing body. `None` when the body has no
/// `item` field at all; a null item is playback without a track.
pub fn parse_playback(body: &Value) -> Option<PlaybackState> {
    let item = body.get("item")?;
    let track = if item.is_null() { None } else { extract_track_info(item) };

    Some(PlaybackState {
        is_playing: body.get("is_playing").and_then(Value::as_bool).unwrap_or(false),
        progress_ms: body.get("progress_ms").and_then(Value::as_u64).unwrap_or(0),
        track,
    })
}

/// Track metadata with fallbacks for everything except the id.
pub fn extract_track_info(track: &Value) -> Option<TrackInfo> {
    let id = match track.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            debug!("Track item without an id");
            return None;
        }
    };

    let artist = track
        .get("artists")
        .and_then(Value::as_array)
        .and_then(|artists| artists.first())
        .and_then(|artist| artist.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown Artist");

    let album = track.get("album");
    let album_name = album
        .and_then(|album| album.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown Album");
    let album_art = album
        .and_then(|album| album.get("images"))
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .and_then(|image| image.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(TrackInfo {
        id,
        name: track
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Track")
            .to_string(),
        artist: artist.to_string(),
        album: album_name.to_string(),
        album_art,
        duration_ms: track.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
    })
}

#[async_trait]
impl SnapshotSource for RemoteClient {
    async fn poll(&mut self) -> Result<Option<PlaybackState>, SourceError> {
        self.current_playback().await
    }
}

#[async_trait]
impl CueProvider for RemoteClient {
    async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
        self.audio_analysis(track_id).await
    }
}
