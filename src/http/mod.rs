//! Capa HTTP: rutas, chequeo de token y servido de archivos estáticos.
//! Los handlers son pegamento fino; toda la lógica vive en `service`.

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{
    error::ServiceError,
    service::{
        events::{self, AddMusicPayload, SubmitOutcome},
        weather, AppContext,
    },
};

pub fn router(ctx: Arc<AppContext>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/add-music", post(add_music))
        .route("/cover-art/{release_id}", get(get_cover_art))
        .route("/current-playing", get(get_current_playing))
        .route("/weather", get(get_weather))
        .layer(middleware::from_fn_with_state(ctx.clone(), require_auth));

    // CORS para el widget del sitio: solo el origen configurado; los
    // preflights OPTIONS los responde la capa sin pasar por el token
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            ctx.config.cors_allow_origin.parse::<HeaderValue>().ok(),
        ))
        .allow_methods(Any)
        .allow_headers(Any);

    // los archivos estáticos quedan fuera del chequeo de token: las URLs
    // de artwork que devuelve el servicio deben poder resolverse solas
    Router::new()
        .nest(&ctx.config.base_route, api)
        .route("/static/{filename}", get(static_file))
        .layer(cors)
        .with_state(ctx)
}

async fn require_auth(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let Some(token) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "errors": ["Missing Authorization header"] })),
        )
            .into_response();
    };

    if token != format!("Bearer {}", ctx.config.auth_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "errors": ["Invalid or missing token"] })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn add_music(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<AddMusicPayload>,
) -> Result<Json<Value>, ServiceError> {
    let message = match events::submit_event(&ctx, payload).await? {
        SubmitOutcome::Saved => "Data saved successfully",
        SubmitOutcome::Duplicate => "Duplicate request",
    };
    Ok(Json(json!({ "message": message })))
}

async fn get_cover_art(
    State(ctx): State<Arc<AppContext>>,
    Path(release_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(events::cover_art(&ctx, &release_id).await?))
}

async fn get_current_playing(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ServiceError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    Ok(Json(events::current_playing(&ctx, host).await?))
}

async fn get_weather(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ServiceError> {
    Ok(Json(weather::current_weather(&ctx).await?))
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn static_file(
    State(ctx): State<Arc<AppContext>>,
    Path(filename): Path<String>,
) -> Response {
    // solo nombres planos dentro del directorio estático
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = ctx.config.static_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type_for(&filename))],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
