//! Web control surface
//!
//! A phone-friendly page plus a small JSON API over the shared override
//! store. Runs as its own process (`azand web`) next to the scheduler daemon;
//! the two only meet through the store file and the speaker itself.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{error, info};

use azanstore::OverrideStore;

use crate::config::Config;
use crate::prayer::AladhanClient;
use crate::sink::{PlaybackSink, SonosSink};

/// Embedded control page
const CONTROL_PAGE: &str = include_str!("../../assets/control.html");

#[derive(Clone)]
struct WebState {
    store: OverrideStore,
    config: Arc<Config>,
}

#[derive(Deserialize)]
struct PauseQuery {
    minutes: Option<i64>,
}

/// Serve the control page and API until the process is stopped.
pub async fn serve(config: Config, store: OverrideStore) -> Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    let local_addr = listener.local_addr()?;

    let state = WebState {
        store,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/pause", post(api_pause))
        .route("/api/resume", post(api_resume))
        .route("/api/stop", post(api_stop))
        .route("/api/prayer-times", get(api_prayer_times))
        .with_state(state);

    info!("Web control listening on http://{local_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(CONTROL_PAGE)
}

/// Current pause state.
///
/// A plain read: an expired-but-uncleared window is reported as-is, the
/// scheduler's next gating check is what clears it.
async fn api_status(State(state): State<WebState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.read() {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "paused": record.paused,
                "pause_until": record.pause_until.map(|t| t.format("%I:%M %p").to_string()),
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to read override state");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

async fn api_pause(
    State(state): State<WebState>,
    Query(query): Query<PauseQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.pause(Local::now(), query.minutes) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "paused"}))),
        Err(e) => {
            error!(error = %e, "Failed to write pause");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

async fn api_resume(State(state): State<WebState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.resume() {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "resumed"}))),
        Err(e) => {
            error!(error = %e, "Failed to write resume");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

/// Stop in-progress playback on the speaker (manual passthrough, does not
/// touch the pause state).
async fn api_stop(State(state): State<WebState>) -> (StatusCode, Json<serde_json::Value>) {
    let result = async {
        let sink = SonosSink::connect(&state.config.speaker).await?;
        sink.stop().await
    }
    .await;

    match result {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "stopped"}))),
        Err(e) => {
            error!(error = %e, "Failed to stop playback");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

/// Today's prayer times for the page grid, fetched live.
async fn api_prayer_times(State(state): State<WebState>) -> (StatusCode, Json<serde_json::Value>) {
    let result = async {
        let client = AladhanClient::new(&state.config.location)?;
        client.fetch(Local::now().date_naive()).await
    }
    .await;

    match result {
        Ok(times) => {
            let map: serde_json::Map<String, serde_json::Value> = times
                .iter()
                .map(|(prayer, at)| {
                    (
                        prayer.to_string(),
                        serde_json::Value::String(at.format("%H:%M").to_string()),
                    )
                })
                .collect();
            (StatusCode::OK, Json(serde_json::json!({"times": map})))
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch prayer times");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Unable to fetch prayer times"})),
            )
        }
    }
}
