use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::LookupError;
use crate::fetcher::ApiClient;

/// Cliente del Cover Art Archive: carátula frontal de un release.
pub struct CoverArtClient {
    client: Arc<ApiClient>,
    base_url: String,
}

impl CoverArtClient {
    pub fn new(client: Arc<ApiClient>, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Devuelve la primera imagen frontal del release, mezclada sobre
    /// `{"release_id": ...}`.
    pub async fn front_image(&self, release_id: &str) -> Result<Value, LookupError> {
        let url = format!("{}/release/{}", self.base_url, release_id);

        debug!("buscando carátula para release {}", release_id);
        let response = self
            .client
            .request(Method::GET, &url, None, None, None)
            .await?;

        let body = response.text().await.map_err(|e| LookupError::Request {
            reason: e.to_string(),
        })?;
        let parsed: Value =
            serde_json::from_str(&body).map_err(|_| LookupError::InvalidResponse)?;

        let Some(images) = parsed.get("images").and_then(Value::as_array) else {
            return Err(LookupError::NoResults);
        };

        Self::merge_front(release_id, images).ok_or(LookupError::NoResults)
    }

    fn merge_front(release_id: &str, images: &[Value]) -> Option<Value> {
        let front = images
            .iter()
            .find(|image| image.get("front").and_then(Value::as_bool) == Some(true))?;

        let mut result = Map::new();
        result.insert("release_id".to_string(), json!(release_id));
        if let Some(fields) = front.as_object() {
            for (key, value) in fields {
                result.insert(key.clone(), value.clone());
            }
        }
        Some(Value::Object(result))
    }
}
