//! Diagnostics HTTP server: current language, translations, cache and
//! telemetry. Mutating routes require `Authorization: Bearer <API_KEY>` when
//! an API key is configured.

use crate::context::I18nContext;
use crate::error::I18nError;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<I18nContext>,
    pub api_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/language", get(get_language).post(change_language))
        .route("/language/reset", post(reset_language))
        .route("/translate/:namespace/:key", get(translate))
        .route("/dynamic/:key", get(dynamic_translation))
        .route("/cache/metrics", get(cache_metrics))
        .route("/cache/clear", post(clear_cache))
        .route("/metrics", get(translation_metrics))
        .route("/maintenance", post(run_maintenance))
        .route("/report", get(report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Constant-time string comparison, length checked first.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn authorize(headers: &HeaderMap, api_key: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = api_key else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_compare(token, expected) => Ok(()),
        _ => {
            warn!("Rejected unauthorized request");
            Err(ApiError::Unauthorized)
        }
    }
}

pub enum ApiError {
    Unauthorized,
    I18n(I18nError),
}

impl From<I18nError> for ApiError {
    fn from(e: I18nError) -> Self {
        ApiError::I18n(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::I18n(e) => {
                let status = match &e {
                    I18nError::UnsupportedLanguage(_) | I18nError::Validation(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    I18nError::LoadTimeout { .. } | I18nError::RequestTimeout(_) => {
                        StatusCode::GATEWAY_TIMEOUT
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.context.startup().is_initialized();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ok" } else { "starting" },
            "language": state.context.get_current_language().code(),
        })),
    )
}

async fn get_language(State(state): State<AppState>) -> impl IntoResponse {
    let context = &state.context;
    Json(json!({
        "language": context.get_current_language().code(),
        "direction": context.get_current_direction(),
        "is_changing": context.service().is_changing(),
        "document": context.document().snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangeLanguageRequest {
    pub language: String,
}

async fn change_language(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChangeLanguageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, state.api_key.as_deref())?;

    let fallback_used = state.context.service().would_use_fallback(&request.language);
    state.context.change_language(&request.language).await?;
    Ok(Json(json!({
        "language": state.context.get_current_language().code(),
        "requested": request.language,
        "fallback_used": fallback_used,
    })))
}

async fn reset_language(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, state.api_key.as_deref())?;
    state.context.reset_to_default().await?;
    Ok(Json(json!({
        "language": state.context.get_current_language().code(),
    })))
}

async fn translate(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let text = state.context.engine().translate_with(&namespace, &key, &params);
    Json(json!({
        "language": state.context.get_current_language().code(),
        "namespace": namespace,
        "key": key,
        "text": text,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DynamicQuery {
    pub fallback: Option<String>,
}

async fn dynamic_translation(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DynamicQuery>,
) -> impl IntoResponse {
    Json(
        state
            .context
            .get_dynamic_translation(&key, query.fallback.as_deref())
            .await,
    )
}

async fn cache_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.context.get_cache_metrics())
}

async fn clear_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, state.api_key.as_deref())?;
    state.context.clear_cache();
    Ok(StatusCode::NO_CONTENT)
}

async fn translation_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "dynamic": state.context.get_translation_metrics(),
        "startup": state.context.get_startup_metrics(),
    }))
}

async fn run_maintenance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, state.api_key.as_deref())?;
    Ok(Json(state.context.run_maintenance()))
}

async fn report(State(state): State<AppState>) -> impl IntoResponse {
    state.context.generate_report()
}
