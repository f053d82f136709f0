//! Response bodies for the HTTP API
//!
//! - `POST /api/v1/upload` answers `202` with [`UploadAccepted`]; the outcome
//!   of the transform arrives later over `GET /ws`
//! - `GET /health` answers with [`HealthResponse`]
//! - every error answers with [`ErrorResponse`]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadAccepted {
    pub status: String,
    pub filename: String,
}

impl UploadAccepted {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            status: "accepted".to_string(),
            filename: filename.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PoolStatus {
    pub size: usize,
    pub in_flight: usize,
    pub queued: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub subscribers: usize,
    pub pool: PoolStatus,
    pub metrics: MetricsSnapshot,
}
