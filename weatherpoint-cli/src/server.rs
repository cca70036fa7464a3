use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use weatherpoint_core::{CurrentWeather, RefreshingObservationCache};

/// `cached`, `refreshed` or `failed`.
pub const REFRESH_STATUS_HEADER: &str = "x-refresh-status";
/// Reason of a failed refresh, when it fits in a header.
pub const REFRESH_ERROR_HEADER: &str = "x-refresh-error";

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RefreshingObservationCache>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/weather/current", get(current_weather))
        .route("/weather/current/", get(current_weather))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Serves the best-known observation.
///
/// A failed refresh still returns the previous payload with `200`, flagged via
/// headers. Only when nothing was ever fetched does the caller get a `503`.
pub async fn current_weather(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.current_snapshot().await;

    let mut headers = HeaderMap::new();
    headers.insert(REFRESH_STATUS_HEADER, HeaderValue::from_static(snapshot.status.as_str()));

    if let Some(reason) = snapshot.status.error() {
        if let Ok(value) = HeaderValue::from_str(reason) {
            headers.insert(REFRESH_ERROR_HEADER, value);
        }

        if snapshot.refreshed_at.is_none() {
            tracing::error!("No weather data available: {}", reason);
            return (StatusCode::SERVICE_UNAVAILABLE, headers, error_body(503, reason))
                .into_response();
        }
    }

    (headers, Json(CurrentWeather::from(snapshot.observation.as_ref()))).into_response()
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    let message = format!("The requested URL {} was not found on the server.", uri.path());
    (StatusCode::NOT_FOUND, error_body(404, &message))
}

fn error_body(code: u16, message: &str) -> Json<Value> {
    Json(json!({ "error_code": code, "message": message }))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => {
            tracing::error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
