//! Database models for resource utilization samples.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Usage and request of one app at one point in time.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UtilizationSample {
    pub env: String,
    pub app: String,
    pub timestamp: DateTime<Utc>,
    pub usage: f64,
    pub request: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct UtilizationBounds {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
