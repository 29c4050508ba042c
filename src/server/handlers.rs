//! HTTP handlers for policy configuration, manual sync and health.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::models::CopyPolicy;
use crate::trading::{TriggerOutcome, TriggerSource};

use super::error::ApiResult;
use super::AppState;

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body returned by `POST /bot/sync`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub message: String,
    pub status: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /config`: the current policy, or `null`.
pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<Option<CopyPolicy>>> {
    Ok(Json(state.policies.get().await?))
}

/// `POST /config`: validate and replace the policy wholesale.
pub async fn set_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CopyPolicy>, JsonRejection>,
) -> ApiResult<Json<CopyPolicy>> {
    let Json(policy) = payload?;
    policy.validate()?;

    let stored = state.policies.replace(policy).await?;
    info!(
        source = %stored.source_address,
        ratio = %stored.copy_ratio,
        fixed_amount = ?stored.fixed_amount,
        active = stored.is_active,
        "Copy policy updated"
    );

    Ok(Json(stored))
}

/// `DELETE /config`: remove the policy.
pub async fn clear_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<MessageResponse>> {
    if state.policies.clear().await? {
        info!("Copy policy cleared");
    }

    Ok(Json(MessageResponse {
        message: "Config cleared".to_string(),
    }))
}

/// `POST /bot/sync`: request a sync cycle without waiting for it.
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SyncResponse>) {
    let outcome = state.scheduler.trigger(TriggerSource::Manual);

    let message = match outcome {
        TriggerOutcome::Started => "Sync triggered in background",
        TriggerOutcome::AlreadyRunning => "Sync already in progress",
        TriggerOutcome::ShuttingDown => "Shutting down, sync not started",
    };

    (
        StatusCode::ACCEPTED,
        Json(SyncResponse {
            message: message.to_string(),
            status: outcome.as_str().to_string(),
        }),
    )
}

/// `GET /health`.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }
}
