use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{LookupError, MetadataProvider, TrackMetadata, TrackQuery};
use crate::fetcher::ApiClient;

/// Cliente para la búsqueda de grabaciones de MusicBrainz.
///
/// Solo acepta un candidato con score exacto 100; el primero que cumpla
/// gana y el resto se descarta.
pub struct MusicBrainzClient {
    client: Arc<ApiClient>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    id: String,
    title: String,
    #[serde(default)]
    score: u32,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: Option<String>,
    artist: Option<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: Option<String>,
}

impl MusicBrainzClient {
    pub fn new(client: Arc<ApiClient>, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn build_query(query: &TrackQuery) -> String {
        let mut lucene = format!(
            "recording:\"{}\" AND artist:\"{}\"",
            query.title, query.artist
        );
        if let Some(album) = query.album.as_deref().filter(|a| !a.is_empty()) {
            lucene.push_str(&format!(" AND release:\"{}\"", album));
        }
        lucene
    }

    /// Toma la primera grabación con score exacto; sin match perfecto
    /// no hay resultado.
    fn normalize(response: RecordingSearchResponse) -> Result<TrackMetadata, LookupError> {
        for recording in response.recordings {
            if recording.score != 100 {
                continue;
            }

            let mut metadata = TrackMetadata {
                recording_id: Some(recording.id),
                title: Some(recording.title),
                ..TrackMetadata::default()
            };
            if let Some(credit) = recording.artist_credit.first() {
                metadata.artist = credit.name.clone();
                metadata.artist_id = credit.artist.as_ref().and_then(|a| a.id.clone());
            }
            if let Some(release) = recording.releases.first() {
                metadata.release_id = release.id.clone();
            }
            return Ok(metadata);
        }
        Err(LookupError::NoResults)
    }
}

#[async_trait]
impl MetadataProvider for MusicBrainzClient {
    async fn lookup(&self, query: &TrackQuery) -> Result<TrackMetadata, LookupError> {
        let url = format!("{}/ws/2/recording", self.base_url);
        let lucene = Self::build_query(query);
        let params = [
            ("query", lucene),
            ("fmt", "json".to_string()),
            ("limit", "1".to_string()),
        ];

        debug!("buscando en MusicBrainz: {}", query.title);
        let response = self
            .client
            .request(Method::GET, &url, Some(&params), None, None)
            .await?;

        let body = response.text().await.map_err(|e| LookupError::Request {
            reason: e.to_string(),
        })?;
        let parsed: RecordingSearchResponse =
            serde_json::from_str(&body).map_err(|_| LookupError::InvalidResponse)?;

        Self::normalize(parsed)
    }

    fn name(&self) -> &'static str {
        "MusicBrainz"
    }
}
