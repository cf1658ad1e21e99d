//! Health check handler

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub started_at: Arc<Instant>,
    /// Open `/ws/health` sessions
    pub heartbeat_clients: Arc<AtomicUsize>,
}

impl HealthState {
    pub fn new(heartbeat_clients: Arc<AtomicUsize>) -> Self {
        Self {
            started_at: Arc::new(Instant::now()),
            heartbeat_clients,
        }
    }
}

/// Standard response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub heartbeat_clients: usize,
}

/// `GET /api/v1/health` (also `/api/health`)
pub async fn health_check(State(state): State<HealthState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        heartbeat_clients: state.heartbeat_clients.load(Ordering::SeqCst),
    }))
}
