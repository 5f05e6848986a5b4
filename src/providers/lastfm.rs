use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{ArtworkImage, LookupError, MetadataProvider, TrackMetadata, TrackQuery};
use crate::fetcher::ApiClient;

/// Cliente para `track.getInfo` de Last.fm.
///
/// Búsqueda difusa: toma el único resultado tal cual viene y convierte la
/// duración de milisegundos a segundos.
pub struct LastFmClient {
    client: Arc<ApiClient>,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TrackInfoResponse {
    track: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: Option<String>,
    mbid: Option<String>,
    // Last.fm devuelve la duración como string en milisegundos
    duration: Option<Value>,
    artist: Option<TrackArtist>,
    album: Option<TrackAlbum>,
}

#[derive(Debug, Deserialize)]
struct TrackArtist {
    mbid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackAlbum {
    artist: Option<String>,
    title: Option<String>,
    mbid: Option<String>,
    #[serde(default)]
    image: Vec<ArtworkImage>,
}

fn duration_millis(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl LastFmClient {
    pub fn new(client: Arc<ApiClient>, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn normalize(response: TrackInfoResponse) -> Result<TrackMetadata, LookupError> {
        let Some(track) = response.track else {
            return Err(LookupError::NoResults);
        };

        let album = track.album;
        Ok(TrackMetadata {
            title: track.name,
            recording_id: track.mbid,
            artist: album.as_ref().and_then(|a| a.artist.clone()),
            artist_id: track.artist.and_then(|a| a.mbid),
            album: album.as_ref().and_then(|a| a.title.clone()),
            release_id: album.as_ref().and_then(|a| a.mbid.clone()),
            duration_secs: Some(
                track.duration.as_ref().map(duration_millis).unwrap_or(0.0) / 1000.0,
            ),
            images: album.map(|a| a.image).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl MetadataProvider for LastFmClient {
    async fn lookup(&self, query: &TrackQuery) -> Result<TrackMetadata, LookupError> {
        let url = format!("{}/2.0", self.base_url);
        let params = [
            ("format", "json".to_string()),
            ("method", "track.getInfo".to_string()),
            ("api_key", self.api_key.clone()),
            ("artist", query.artist.clone()),
            ("track", query.title.clone()),
        ];

        debug!("buscando en Last.fm: {}", query.title);
        let response = self
            .client
            .request(Method::GET, &url, Some(&params), None, None)
            .await?;

        let body = response.text().await.map_err(|e| LookupError::Request {
            reason: e.to_string(),
        })?;
        let parsed: TrackInfoResponse =
            serde_json::from_str(&body).map_err(|_| LookupError::InvalidResponse)?;

        Self::normalize(parsed)
    }

    fn name(&self) -> &'static str {
        "Last.fm"
    }
}
