//! Status HTTP server
//!
//! `GET /health` -> fastcheck result + last cycle per endpoint.
//! Answers 503 when the configuration check failed.

use crate::health::{AgentHealth, HealthTracker, Status};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub tracker: HealthTracker,
    pub check: Status,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<AgentHealth>) {
    let code = if state.check.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(state.tracker.get_health(&state.check)))
}

pub async fn serve(listen: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind status server on {}", listen))?;
    info!("Status server listening on http://{}", listen);
    axum::serve(listener, build_router(state))
        .await
        .context("Status server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_ok() {
        let tracker = HealthTracker::new();
        tracker.register("10.0.0.1");
        let state = AppState {
            tracker,
            check: Status::ok(),
        };

        let (code, Json(body)) = health(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.endpoints[0].endpoint, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_health_unavailable_on_failed_check() {
        let state = AppState {
            tracker: HealthTracker::new(),
            check: Status::error("no endpoints configured"),
        };

        let (code, _) = health(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    }
}
