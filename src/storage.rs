use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

/// Fila a insertar/actualizar, ya con la metadata mezclada.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub recording_id: Option<String>,
    pub artist: String,
    pub artist_id: Option<String>,
    pub album: String,
    pub release_id: Option<String>,
    pub duration: f64,
    pub playback_rate: bool,
    pub bundle: Option<String>,
    pub elapsed: f64,
    pub device_name: Option<String>,
    pub images: Option<String>,
    pub is_valid: bool,
}

/// Proyección usada por la lectura de "current playing".
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CurrentPlayingRow {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub release_id: Option<String>,
    pub duration: Option<f64>,
    pub playback_rate: bool,
    pub elapsed: Option<f64>,
    pub device_name: Option<String>,
    pub updated: DateTime<Utc>,
    pub images: Option<String>,
}

/// Acceso a la tabla de eventos de reproducción.
///
/// Las conexiones se toman del pool por operación; nunca se retienen a
/// través de un await ajeno a la consulta.
#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id            BIGSERIAL PRIMARY KEY,
    title         TEXT NOT NULL,
    recording_id  TEXT,
    artist        TEXT NOT NULL,
    artist_id     TEXT,
    album         TEXT NOT NULL DEFAULT '',
    release_id    TEXT,
    duration      DOUBLE PRECISION,
    playback_rate BOOLEAN NOT NULL DEFAULT FALSE,
    bundle        TEXT,
    elapsed       DOUBLE PRECISION,
    device_name   TEXT,
    images        TEXT,
    is_valid      BOOLEAN NOT NULL DEFAULT FALSE,
    is_deleted    BOOLEAN NOT NULL DEFAULT FALSE,
    play_count    INTEGER NOT NULL DEFAULT 1,
    updated       TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (title, artist, album)
)
"#;

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Crea el esquema si no existe.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        info!("esquema de eventos verificado");
        Ok(())
    }

    /// Upsert por clave natural (title, artist, album): inserta con
    /// play_count 1 o, en conflicto, actualiza los campos mutables,
    /// incrementa el contador y renueva `updated`.
    pub async fn upsert_event(&self, event: &NewEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO events
                (title, recording_id, artist, artist_id, album, release_id,
                 duration, playback_rate, bundle, elapsed, device_name, images,
                 is_valid, play_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
            ON CONFLICT (title, artist, album)
            DO UPDATE SET
                playback_rate = EXCLUDED.playback_rate,
                bundle = EXCLUDED.bundle,
                elapsed = EXCLUDED.elapsed,
                device_name = EXCLUDED.device_name,
                images = EXCLUDED.images,
                play_count = events.play_count + 1,
                updated = now()
            "#,
        )
        .bind(&event.title)
        .bind(&event.recording_id)
        .bind(&event.artist)
        .bind(&event.artist_id)
        .bind(&event.album)
        .bind(&event.release_id)
        .bind(event.duration)
        .bind(event.playback_rate)
        .bind(&event.bundle)
        .bind(event.elapsed)
        .bind(&event.device_name)
        .bind(&event.images)
        .bind(event.is_valid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fila válida y no borrada más recientemente actualizada.
    pub async fn latest_valid_event(&self) -> Result<Option<CurrentPlayingRow>, sqlx::Error> {
        sqlx::query_as::<_, CurrentPlayingRow>(
            r#"
            SELECT title, artist, album, release_id, duration, playback_rate,
                   elapsed, device_name, updated, images
            FROM events
            WHERE is_deleted = FALSE AND is_valid = TRUE
            ORDER BY updated DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
    }
}
