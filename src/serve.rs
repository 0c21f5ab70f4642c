//! HTTP health surface.
//!
//! `GET /api/health` is plain liveness; `GET /api/tenants/{tenant}/health`
//! returns the tenant's [`HealthReport`] with 503 when an alert is due.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use crate::core::{HealthReport, PollerLimits};
use crate::store::Store;

struct AppState {
    store: Arc<Store>,
    limits: PollerLimits,
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": format!("{:#}", self.0) });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Build the router (for testing without binding to a port).
pub fn router(store: Arc<Store>, limits: PollerLimits) -> Router {
    let state = Arc::new(AppState { store, limits });
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tenants/{tenant}/health", get(tenant_health))
        .with_state(state)
}

pub async fn serve(store: Arc<Store>, limits: PollerLimits, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = router(store, limits);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn tenant_health(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> Result<Response, AppError> {
    let report = HealthReport::collect(&state.store, &tenant, &state.limits, Utc::now())?;
    let status = if report.alert {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}
