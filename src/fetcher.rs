use parking_lot::Mutex;
use reqwest::{header::HeaderMap, Method, Response};
use serde_json::Value;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::{debug, error};
use url::Url;

/// Fallo de una llamada saliente. Los llamadores distinguen el rate limit
/// del resto para decidir si cambian de proveedor.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limit exceeded for {host}")]
    RateLimited { host: String },
    #[error("request failed: {reason}")]
    Request { reason: String },
}

impl FetchError {
    #[allow(dead_code)]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

/// Limitador por host: intervalo mínimo entre llamadas salientes.
///
/// El estado es compartido por todos los llamadores del proceso; se marca el
/// timestamp en cuanto se permite el intento, de modo que llamadas
/// concurrentes al mismo host también quedan espaciadas entre sí.
pub struct RateLimiter {
    intervals: HashMap<String, Duration>,
    default_interval: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(intervals: HashMap<String, Duration>, default_interval: Duration) -> Self {
        Self {
            intervals,
            default_interval,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Permite o rechaza un intento de llamada al host. El chequeo y la
    /// marca del timestamp ocurren bajo el mismo lock.
    pub fn acquire(&self, host: &str) -> Result<(), FetchError> {
        let interval = self
            .intervals
            .get(host)
            .copied()
            .unwrap_or(self.default_interval);

        let mut last_call = self.last_call.lock();
        let now = Instant::now();
        if let Some(last) = last_call.get(host) {
            if now.duration_since(*last) < interval {
                return Err(FetchError::RateLimited {
                    host: host.to_string(),
                });
            }
        }
        last_call.insert(host.to_string(), now);
        Ok(())
    }
}

/// Cliente HTTP saliente con rate limiting por host.
pub struct ApiClient {
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl ApiClient {
    pub fn new(app_name: &str, timeout: Duration, limiter: RateLimiter) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/1.0", app_name))
            .build()?;
        Ok(Self { http, limiter })
    }

    /// Cliente crudo, sin pasar por el rate limiter. Solo para descargas de
    /// artefactos ya resueltos (imágenes), nunca para APIs de metadata.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Ejecuta una llamada saliente respetando el intervalo mínimo del host.
    ///
    /// Un rechazo por rate limit no consume la ventana ni toca la red. Un
    /// error de transporte, timeout o status no-2xx se reporta como
    /// [`FetchError::Request`].
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        params: Option<&[(&str, String)]>,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
    ) -> Result<Response, FetchError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .ok_or_else(|| FetchError::Request {
                reason: format!("invalid url: {}", url),
            })?;

        self.limiter.acquire(&host).inspect_err(|e| {
            error!("{}", e);
        })?;

        let mut builder = self.http.request(method, url);
        if let Some(params) = params {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(headers) = headers {
            builder = builder.headers(headers);
        }

        debug!("llamada saliente a {}", host);
        let response = builder.send().await.map_err(|e| {
            error!("request failed: {}", e);
            FetchError::Request {
                reason: e.to_string(),
            }
        })?;

        response.error_for_status().map_err(|e| {
            error!("request failed: {}", e);
            FetchError::Request {
                reason: e.to_string(),
            }
        })
    }
}
