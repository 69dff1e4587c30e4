//! Resource utilization and what it costs.
//!
//! Usage and request samples are priced with fixed per-unit rates: CPU quantities are in cores
//! and memory quantities in bytes, each sample covering one hour.

use std::collections::BTreeMap;

use async_graphql::{Enum, SimpleObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{
    errors::Result as DbResult,
    models::utilization::{UtilizationBounds, UtilizationSample},
};

const CPU_MONTHLY_RATE_PER_CORE: f64 = 131.0;
const MEMORY_MONTHLY_RATE_PER_GIB: f64 = 18.0;
const DAYS_PER_MONTH: f64 = 30.0;
const HOURS_PER_DAY: f64 = 24.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Cpu,
    Memory,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
        }
    }
}

/// Hourly cost of `quantity` units of `resource`.
pub fn cost(resource: ResourceType, quantity: f64) -> f64 {
    match resource {
        ResourceType::Cpu => quantity * (CPU_MONTHLY_RATE_PER_CORE / DAYS_PER_MONTH) / HOURS_PER_DAY,
        ResourceType::Memory => (quantity / BYTES_PER_GIB) * (MEMORY_MONTHLY_RATE_PER_GIB / DAYS_PER_MONTH) / HOURS_PER_DAY,
    }
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct ResourceUtilization {
    pub timestamp: DateTime<Utc>,
    pub usage: f64,
    pub request: f64,
    pub usage_cost: f64,
    pub request_cost: f64,
    /// Cost of requested but unused capacity; negative when usage exceeds the request
    pub request_cost_overage: f64,
}

impl ResourceUtilization {
    pub fn new(resource: ResourceType, timestamp: DateTime<Utc>, usage: f64, request: f64) -> Self {
        let usage_cost = cost(resource, usage);
        let request_cost = cost(resource, request);
        Self {
            timestamp,
            usage,
            request,
            usage_cost,
            request_cost,
            request_cost_overage: request_cost - usage_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct AppUtilization {
    pub env: String,
    pub app: String,
    pub series: Vec<ResourceUtilization>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct TeamUtilization {
    pub apps: Vec<AppUtilization>,
    /// Usage and request summed over all apps per timestamp
    pub total: Vec<ResourceUtilization>,
}

#[derive(Debug, Clone, Copy, PartialEq, SimpleObject)]
pub struct UtilizationDateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl From<UtilizationBounds> for UtilizationDateRange {
    fn from(bounds: UtilizationBounds) -> Self {
        Self {
            start: bounds.start,
            end: bounds.end,
        }
    }
}

#[async_trait]
pub trait UtilizationStore: Send + Sync {
    /// Samples of one app in `[start, end)`.
    async fn app_samples(
        &self,
        env: &str,
        team: &str,
        app: &str,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<UtilizationSample>>;

    /// Samples of every app of a team in `[start, end)`.
    async fn team_samples(&self, team: &str, resource: ResourceType, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<UtilizationSample>>;

    /// Earliest and latest sample timestamps.
    async fn bounds(&self) -> DbResult<UtilizationBounds>;
}

/// Price each sample, ascending by timestamp.
pub fn utilization_for_app(resource: ResourceType, samples: Vec<UtilizationSample>) -> Vec<ResourceUtilization> {
    let mut series: Vec<ResourceUtilization> = samples
        .into_iter()
        .map(|s| ResourceUtilization::new(resource, s.timestamp, s.usage, s.request))
        .collect();
    series.sort_by_key(|point| point.timestamp);
    series
}

/// Group samples per app and environment, and sum them per timestamp for the team total.
pub fn utilization_for_team(resource: ResourceType, samples: Vec<UtilizationSample>) -> TeamUtilization {
    let mut totals: BTreeMap<DateTime<Utc>, (f64, f64)> = BTreeMap::new();
    let mut per_app: BTreeMap<(String, String), Vec<UtilizationSample>> = BTreeMap::new();

    for sample in samples {
        let total = totals.entry(sample.timestamp).or_default();
        total.0 += sample.usage;
        total.1 += sample.request;
        per_app.entry((sample.env.clone(), sample.app.clone())).or_default().push(sample);
    }

    let apps = per_app
        .into_iter()
        .map(|((env, app), samples)| AppUtilization {
            env,
            app,
            series: utilization_for_app(resource, samples),
        })
        .collect();

    let total = totals
        .into_iter()
        .map(|(timestamp, (usage, request))| ResourceUtilization::new(resource, timestamp, usage, request))
        .collect();

    TeamUtilization { apps, total }
}

/// Percentage change of average usage in the last `window` points compared with the `window`
/// points before them. Zero when there is not enough history or the earlier average is zero.
pub fn utilization_trend(series: &[ResourceUtilization], window: usize) -> f64 {
    if window == 0 || series.len() < window * 2 {
        return 0.0;
    }

    let average = |points: &[ResourceUtilization]| points.iter().map(|p| p.usage).sum::<f64>() / points.len() as f64;
    let recent = &series[series.len() - window..];
    let previous = &series[series.len() - window * 2..series.len() - window];

    let before = average(previous);
    if before == 0.0 {
        return 0.0;
    }
    (average(recent) - before) / before * 100.0
}
