use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// Carátula guardada en el directorio estático.
#[derive(Debug)]
pub struct SavedArtwork {
    pub filename: String,
    #[allow(dead_code)]
    pub path: PathBuf,
}

/// Adivina la extensión a partir de los bytes iniciales del payload.
/// Firmas conocidas: PNG, JPEG, GIF, WEBP y PDF; el resto queda como
/// "unknown" pero igual se guarda.
pub fn sniff_image_ext(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        "png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.starts_with(b"GIF8") {
        "gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "webp"
    } else if bytes.starts_with(b"%PDF") {
        "pdf"
    } else {
        "unknown"
    }
}

/// Decodifica un payload base64 y lo persiste como archivo estático con
/// nombre aleatorio.
pub async fn save_cover_art(static_dir: &Path, encoded: &str) -> Result<SavedArtwork> {
    let encoded = encoded.trim();
    let bytes = STANDARD
        .decode(encoded)
        .context("payload de imagen no es base64 válido")?;

    let ext = sniff_image_ext(&bytes);
    let filename = format!("{}.{}", Uuid::new_v4(), ext);
    let path = static_dir.join(&filename);

    fs::write(&path, &bytes)
        .await
        .with_context(|| format!("no se pudo escribir {}", path.display()))?;

    Ok(SavedArtwork { filename, path })
}

/// Descarga una imagen remota y la guarda con nombre fijo en el
/// directorio estático. Devuelve la ruta pública, o `None` si la
/// descarga falla (el llamador sigue sin artwork local).
pub async fn download_and_save_image(
    http: &reqwest::Client,
    image_url: &str,
    static_dir: &Path,
    filename: &str,
) -> Option<String> {
    let response = match http.get(image_url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("descarga de artwork devolvió {}", response.status());
            return None;
        }
        Err(e) => {
            warn!("descarga de artwork falló: {}", e);
            return None;
        }
    };

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("lectura del artwork falló: {}", e);
            return None;
        }
    };

    let path = static_dir.join(filename);
    if let Err(e) = fs::write(&path, &bytes).await {
        warn!("no se pudo guardar artwork en {}: {}", path.display(), e);
        return None;
    }

    Some(format!("/static/{}", filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(sniff_image_ext(b"\x89PNG\r\n\x1a\n...."), "png");
        assert_eq!(sniff_image_ext(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), "jpg");
        assert_eq!(sniff_image_ext(b"GIF89a...."), "gif");
        assert_eq!(sniff_image_ext(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "webp");
        assert_eq!(sniff_image_ext(b"%PDF-1.7"), "pdf");
    }

    #[test]
    fn test_unrecognized_payload_is_unknown() {
        assert_eq!(sniff_image_ext(b"hello world"), "unknown");
        assert_eq!(sniff_image_ext(b""), "unknown");
        // RIFF sin marca WEBP no es webp
        assert_eq!(sniff_image_ext(b"RIFF\x00\x00\x00\x00WAVE"), "unknown");
    }

    #[tokio::test]
    async fn test_save_cover_art_writes_decoded_payload() {
        let dir = tempfile::tempdir().unwrap();
        let png = b"\x89PNG\r\n\x1a\nrest-of-image";
        let encoded = STANDARD.encode(png);

        let saved = save_cover_art(dir.path(), &encoded).await.unwrap();
        assert!(saved.filename.ends_with(".png"));

        let written = fs::read(&saved.path).await.unwrap();
        assert_eq!(written, png.to_vec());
    }

    #[tokio::test]
    async fn test_save_cover_art_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_cover_art(dir.path(), "no es base64 !!!").await.is_err());
    }
}
