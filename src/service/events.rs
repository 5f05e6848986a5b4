use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::AppContext;
use crate::{
    artwork,
    cache::CURRENT_PLAYING_CACHE_KEY,
    error::ServiceError,
    providers::{ArtworkImage, LookupError, TrackMetadata, TrackQuery},
    storage::NewEvent,
};

/// Evento de reproducción tal como lo reporta el cliente.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddMusicPayload {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, rename = "playbackRate")]
    pub playback_rate: bool,
    #[serde(default)]
    pub bundle: String,
    #[serde(default)]
    pub elapsed: f64,
    #[serde(default, rename = "deviceName")]
    pub device_name: String,
    #[serde(default, rename = "artworkUrl")]
    pub artwork_url: Option<String>,
    /// Imagen inline codificada en base64.
    #[serde(default)]
    pub image: Option<String>,
}

/// Resultado de un envío. Un duplicado no es un error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Saved,
    Duplicate,
}

/// Huella del contenido del envío, para suprimir duplicados inmediatos.
fn fingerprint(payload: &AddMusicPayload) -> String {
    format!(
        "{}-{}-{}-{}",
        payload.title, payload.artist, payload.album, payload.playback_rate
    )
}

/// Origen de las imágenes a persistir, en orden de precedencia.
#[derive(Debug, PartialEq)]
enum ImageSource {
    Provider(Vec<ArtworkImage>),
    Remote(String),
    Inline(String),
    None,
}

fn image_source(payload: &AddMusicPayload, metadata: Option<&TrackMetadata>) -> ImageSource {
    if let Some(metadata) = metadata {
        if !metadata.images.is_empty() {
            return ImageSource::Provider(metadata.images.clone());
        }
    }
    if let Some(url) = payload.artwork_url.as_deref().filter(|u| !u.is_empty()) {
        return ImageSource::Remote(url.to_string());
    }
    if let Some(encoded) = payload.image.as_deref().filter(|i| !i.is_empty()) {
        return ImageSource::Inline(encoded.to_string());
    }
    ImageSource::None
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Mezcla payload y metadata en la fila a persistir. El valor del cliente
/// gana si es no vacío para title/artist/album/duration; los campos
/// enriquecidos vienen solo de la búsqueda.
fn build_event(
    payload: &AddMusicPayload,
    metadata: Option<&TrackMetadata>,
    images: Option<String>,
    is_valid: bool,
) -> NewEvent {
    let meta = metadata.cloned().unwrap_or_default();
    NewEvent {
        title: if !payload.title.is_empty() {
            payload.title.clone()
        } else {
            meta.title.unwrap_or_default()
        },
        recording_id: meta.recording_id,
        artist: if !payload.artist.is_empty() {
            payload.artist.clone()
        } else {
            meta.artist.unwrap_or_default()
        },
        artist_id: meta.artist_id,
        album: if !payload.album.is_empty() {
            payload.album.clone()
        } else {
            meta.album.unwrap_or_default()
        },
        release_id: meta.release_id,
        duration: if payload.duration > 0.0 {
            payload.duration
        } else {
            meta.duration_secs.unwrap_or(0.0)
        },
        playback_rate: payload.playback_rate,
        bundle: none_if_empty(&payload.bundle),
        elapsed: payload.elapsed,
        device_name: none_if_empty(&payload.device_name),
        images,
        is_valid,
    }
}

/// Pipeline de envío: validación, deduplicación, búsqueda de metadata,
/// resolución de imágenes, upsert e invalidación del cache, en ese orden.
pub async fn submit_event(
    ctx: &AppContext,
    payload: AddMusicPayload,
) -> Result<SubmitOutcome, ServiceError> {
    if payload.duration == 0.0 {
        return Err(ServiceError::Validation("Missing duration".to_string()));
    }

    // la huella se marca antes de la búsqueda: envíos idénticos que corran
    // en paralelo con el lookup también quedan suprimidos
    let fingerprint = fingerprint(&payload);
    if !ctx.dedup.mark(&fingerprint) {
        info!("envío duplicado para {}, omitido", fingerprint);
        return Ok(SubmitOutcome::Duplicate);
    }

    let query = TrackQuery {
        title: payload.title.clone(),
        artist: payload.artist.clone(),
        album: none_if_empty(&payload.album),
    };
    let metadata = match ctx.coordinator.lookup(&query).await {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            // la búsqueda fallida no aborta el envío: se guarda solo lo
            // que mandó el cliente, marcado como no válido
            warn!("búsqueda de metadata falló: {}", e);
            None
        }
    };
    let is_valid = metadata.is_some();

    let images = match image_source(&payload, metadata.as_ref()) {
        ImageSource::Provider(images) => Some(images),
        ImageSource::Remote(url) => Some(vec![ArtworkImage::normal(url)]),
        ImageSource::Inline(encoded) => {
            let saved = artwork::save_cover_art(&ctx.config.static_dir, &encoded).await?;
            Some(vec![ArtworkImage::normal(format!(
                "{}/static/{}",
                ctx.config.app_url, saved.filename
            ))])
        }
        ImageSource::None => None,
    };
    let images_json = match images {
        Some(images) if !images.is_empty() => Some(
            serde_json::to_string(&images).map_err(|e| ServiceError::Internal(e.into()))?,
        ),
        _ => None,
    };

    let event = build_event(&payload, metadata.as_ref(), images_json, is_valid);
    ctx.store.upsert_event(&event).await?;

    // invalidación síncrona, estrictamente después del commit y antes de
    // responder: la próxima lectura no puede ver datos anteriores a esta fila
    ctx.cache.delete(&CURRENT_PLAYING_CACHE_KEY.to_string());

    Ok(SubmitOutcome::Saved)
}

/// URL externa del artwork según el host que hizo la petición.
fn artwork_url(host: Option<&str>, static_path: &str) -> String {
    match host {
        None => static_path.to_string(),
        Some(host) if host.contains("local") => format!("http://{}{}", host, static_path),
        Some(host) => format!("https://{}{}", host, static_path),
    }
}

/// Lectura read-through de "current playing": cache, luego storage, con
/// espejado local del artwork y repoblado del cache con TTL fijo.
pub async fn current_playing(
    ctx: &AppContext,
    host: Option<String>,
) -> Result<Value, ServiceError> {
    let key = CURRENT_PLAYING_CACHE_KEY.to_string();
    if let Some(cached) = ctx.cache.get(&key) {
        return Ok(cached);
    }

    let row = ctx
        .store
        .latest_valid_event()
        .await?
        .ok_or_else(|| ServiceError::NotFound("No current playing".to_string()))?;

    let images: Option<Value> = row
        .images
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok());
    let image_url = images
        .as_ref()
        .and_then(Value::as_array)
        .and_then(|list| list.last())
        .and_then(|image| image.get("#text"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut response =
        serde_json::to_value(&row).map_err(|e| ServiceError::Internal(e.into()))?;
    let Some(fields) = response.as_object_mut() else {
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "event row did not serialize to an object"
        )));
    };
    fields.insert(
        "images".to_string(),
        images.clone().unwrap_or(Value::Null),
    );

    if let Some(image_url) = image_url {
        let mirrored = artwork::download_and_save_image(
            ctx.client.http(),
            &image_url,
            &ctx.config.static_dir,
            "current_playing.png",
        )
        .await;
        if let Some(static_path) = mirrored {
            fields.remove("images");
            fields.insert(
                "artwork".to_string(),
                Value::String(artwork_url(host.as_deref(), &static_path)),
            );
        }
    }

    ctx.cache.set(
        key,
        response.clone(),
        Some(Duration::from_secs(ctx.config.current_playing_ttl_secs)),
    );

    Ok(response)
}

/// Carátula frontal de un release vía Cover Art Archive.
pub async fn cover_art(ctx: &AppContext, release_id: &str) -> Result<Value, ServiceError> {
    if release_id.is_empty() {
        return Err(ServiceError::Validation("Missing release_id".to_string()));
    }

    match ctx.coverart.front_image(release_id).await {
        Ok(result) => Ok(result),
        Err(LookupError::NoResults) => {
            Err(ServiceError::NotFound("No cover art found".to_string()))
        }
        Err(LookupError::InvalidResponse) => {
            Err(ServiceError::Upstream("Invalid JSON response".to_string()))
        }
        Err(e) => Err(ServiceError::Upstream(format!(
            "Failed to get cover art due to {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ResponseCache,
        config::Config,
        fetcher::{ApiClient, RateLimiter},
        providers::{CoverArtClient, LookupCoordinator, MockMetadataProvider},
        service::SubmissionGuard,
        storage::EventStore,
    };
    use pretty_assertions::assert_eq;
    use sqlx::postgres::PgPoolOptions;
    use std::{collections::HashMap, sync::Arc};

    // contexto de laboratorio: pool perezoso (nunca conecta si el pipeline
    // no llega al storage) y proveedores mockeados
    fn pipeline_ctx(
        primary: MockMetadataProvider,
        secondary: MockMetadataProvider,
    ) -> AppContext {
        let config = Config::test_default();
        let limiter = RateLimiter::new(HashMap::new(), Duration::from_secs(1));
        let client = Arc::new(
            ApiClient::new(&config.app_name, Duration::from_secs(5), limiter).unwrap(),
        );
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url())
            .unwrap();

        AppContext {
            cache: ResponseCache::new(),
            client: client.clone(),
            coordinator: LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 4),
            coverart: CoverArtClient::new(client, config.coverart_base_url.clone()),
            store: EventStore::new(pool),
            dedup: SubmissionGuard::default(),
            config,
        }
    }

    fn silent_provider() -> MockMetadataProvider {
        let mut mock = MockMetadataProvider::new();
        mock.expect_lookup().times(0);
        mock
    }

    fn payload() -> AddMusicPayload {
        AddMusicPayload {
            title: "Nude".to_string(),
            artist: "Radiohead".to_string(),
            album: "In Rainbows".to_string(),
            duration: 261.0,
            elapsed: 30.0,
            bundle: "com.apple.Music".to_string(),
            device_name: "studio".to_string(),
            ..AddMusicPayload::default()
        }
    }

    fn metadata() -> TrackMetadata {
        TrackMetadata {
            title: Some("Nude - Remastered".to_string()),
            recording_id: Some("rec-1".to_string()),
            artist: Some("radiohead".to_string()),
            artist_id: Some("art-1".to_string()),
            album: Some("In Rainbows (Deluxe)".to_string()),
            release_id: Some("rel-1".to_string()),
            duration_secs: Some(255.0),
            images: vec![],
        }
    }

    #[test]
    fn test_fingerprint_includes_playback_rate() {
        let base = payload();
        let mut faster = payload();
        faster.playback_rate = true;

        assert_eq!(fingerprint(&base), "Nude-Radiohead-In Rainbows-false");
        assert_ne!(fingerprint(&base), fingerprint(&faster));
    }

    #[test]
    fn test_client_fields_win_when_present() {
        let event = build_event(&payload(), Some(&metadata()), None, true);
        assert_eq!(event.title, "Nude");
        assert_eq!(event.artist, "Radiohead");
        assert_eq!(event.album, "In Rainbows");
        assert_eq!(event.duration, 261.0);
        assert_eq!(event.elapsed, 30.0);
        // los campos enriquecidos vienen solo de la búsqueda
        assert_eq!(event.recording_id.as_deref(), Some("rec-1"));
        assert_eq!(event.artist_id.as_deref(), Some("art-1"));
        assert_eq!(event.release_id.as_deref(), Some("rel-1"));
        assert!(event.is_valid);
    }

    #[test]
    fn test_lookup_fills_missing_client_fields() {
        let mut sparse = payload();
        sparse.album = String::new();
        sparse.duration = 0.0;

        let event = build_event(&sparse, Some(&metadata()), None, true);
        assert_eq!(event.album, "In Rainbows (Deluxe)");
        assert_eq!(event.duration, 255.0);
    }

    #[test]
    fn test_client_only_event_when_lookup_failed() {
        let event = build_event(&payload(), None, None, false);
        assert_eq!(event.title, "Nude");
        assert_eq!(event.recording_id, None);
        assert_eq!(event.release_id, None);
        assert!(!event.is_valid);
        assert_eq!(event.bundle.as_deref(), Some("com.apple.Music"));
        assert_eq!(event.device_name.as_deref(), Some("studio"));
    }

    #[test]
    fn test_provider_images_have_highest_precedence() {
        let mut with_all = payload();
        with_all.artwork_url = Some("http://client/art.png".to_string());
        with_all.image = Some("aGVsbG8=".to_string());

        let mut meta = metadata();
        meta.images = vec![ArtworkImage::normal("http://lfm/art.png".to_string())];

        match image_source(&with_all, Some(&meta)) {
            ImageSource::Provider(images) => assert_eq!(images[0].url, "http://lfm/art.png"),
            other => panic!("expected provider images, got {:?}", other),
        }
    }

    #[test]
    fn test_artwork_url_beats_inline_image() {
        let mut with_both = payload();
        with_both.artwork_url = Some("http://client/art.png".to_string());
        with_both.image = Some("aGVsbG8=".to_string());

        assert_eq!(
            image_source(&with_both, Some(&metadata())),
            ImageSource::Remote("http://client/art.png".to_string())
        );
    }

    #[test]
    fn test_inline_image_is_last_resort() {
        let mut with_inline = payload();
        with_inline.image = Some("aGVsbG8=".to_string());

        assert_eq!(
            image_source(&with_inline, None),
            ImageSource::Inline("aGVsbG8=".to_string())
        );
        assert_eq!(image_source(&payload(), None), ImageSource::None);
    }

    #[tokio::test]
    async fn test_missing_duration_rejected_before_lookup() {
        let ctx = pipeline_ctx(silent_provider(), silent_provider());

        let mut incomplete = payload();
        incomplete.duration = 0.0;

        let err = submit_event(&ctx, incomplete).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(err.to_string(), "Missing duration");
        // la validación corta antes de marcar la huella: el reintento
        // corregido del mismo contenido no cuenta como duplicado
        assert!(ctx.dedup.mark(&fingerprint(&payload())));
    }

    #[tokio::test]
    async fn test_duplicate_submission_skips_lookup_and_storage() {
        let ctx = pipeline_ctx(silent_provider(), silent_provider());
        assert!(ctx.dedup.mark(&fingerprint(&payload())));

        // los mocks verifican times(0) al soltarse; el pool perezoso nunca
        // conecta porque el pipeline no llega al upsert
        let outcome = submit_event(&ctx, payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Duplicate);
    }

    #[test]
    fn test_artwork_url_scheme_by_host() {
        assert_eq!(
            artwork_url(Some("music.local:8000"), "/static/current_playing.png"),
            "http://music.local:8000/static/current_playing.png"
        );
        assert_eq!(
            artwork_url(Some("example.com"), "/static/current_playing.png"),
            "https://example.com/static/current_playing.png"
        );
        assert_eq!(
            artwork_url(None, "/static/current_playing.png"),
            "/static/current_playing.png"
        );
    }
}
