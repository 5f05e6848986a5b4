pub mod coordinator;
pub mod coverart;
pub mod lastfm;
pub mod musicbrainz;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use coordinator::LookupCoordinator;
pub use coverart::CoverArtClient;
pub use lastfm::LastFmClient;
pub use musicbrainz::MusicBrainzClient;

use crate::fetcher::FetchError;

/// Fallo de una búsqueda de metadata. Solo `RateLimited` habilita el
/// cambio de proveedor en el coordinador.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("rate limited by {host}")]
    RateLimited { host: String },
    #[error("request failed: {reason}")]
    Request { reason: String },
    #[error("No results found")]
    NoResults,
    #[error("Invalid JSON response")]
    InvalidResponse,
    #[error("No results found after multiple attempts")]
    Exhausted,
}

impl From<FetchError> for LookupError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::RateLimited { host } => LookupError::RateLimited { host },
            FetchError::Request { reason } => LookupError::Request { reason },
        }
    }
}

/// Consulta de una pista tal como la reporta el cliente.
#[derive(Debug, Clone)]
pub struct TrackQuery {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

/// Imagen de carátula en el formato que persiste el servicio
/// (mismo shape que devuelve Last.fm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtworkImage {
    pub size: String,
    #[serde(rename = "#text")]
    pub url: String,
}

impl ArtworkImage {
    pub fn normal(url: String) -> Self {
        Self {
            size: "normal".to_string(),
            url,
        }
    }
}

/// Registro normalizado de metadata. Los shapes específicos de cada
/// proveedor nunca salen de su adaptador.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub recording_id: Option<String>,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub album: Option<String>,
    pub release_id: Option<String>,
    pub duration_secs: Option<f64>,
    pub images: Vec<ArtworkImage>,
}

/// Proveedor de metadata de pistas.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Busca la pista y devuelve el registro normalizado.
    async fn lookup(&self, query: &TrackQuery) -> Result<TrackMetadata, LookupError>;

    /// Nombre del proveedor, para logs.
    fn name(&self) -> &'static str;
}
