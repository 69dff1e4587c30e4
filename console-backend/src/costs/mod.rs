//! Daily and monthly cost reporting.
//!
//! Raw [`CostRecord`]s come from the [`CostStore`]; this module validates the requested date range
//! and reshapes records into gap-free series per cost type, per app or per team.

pub mod normalize;
pub mod updater;

use std::collections::{BTreeMap, HashMap};

use async_graphql::SimpleObject;
use async_trait::async_trait;
use chrono::{Months, NaiveDate};

use crate::db::{errors::Result as DbResult, models::costs::CostRecord};
use crate::errors::{Error, Result};
use normalize::{CostRow, DailyCost, MonthlyCost};

/// Date format used for every date at the cost boundary.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Number of months covered by monthly roll-ups, current month included.
pub const MONTHLY_HISTORY: u32 = 12;

/// Longest daily range a caller may request, in days. One leap year.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Inclusive calendar date range, validated against the current date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::invalid_argument(format!("from date {from} is after to date {to}")));
        }
        if to > today {
            return Err(Error::invalid_argument(format!("to date {to} is in the future")));
        }
        if (to - from).num_days() >= MAX_RANGE_DAYS {
            return Err(Error::invalid_argument(format!(
                "date range {from} to {to} spans more than {MAX_RANGE_DAYS} days"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str, today: NaiveDate) -> Result<Self> {
        Self::new(parse_date(from)?, parse_date(to)?, today)
    }

    /// Range starting on the first day of the month `months - 1` months ago and ending today.
    pub fn trailing_months(today: NaiveDate, months: u32) -> Self {
        let from = normalize::first_of_month(today)
            .checked_sub_months(Months::new(months.saturating_sub(1)))
            .unwrap_or(today);
        Self { from, to: today }
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let invalid = || Error::invalid_argument(format!("invalid date {value:?}, expected YYYY-MM-DD"));
    if value.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

/// Restricts which cost records a store query returns. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostFilter {
    pub env: Option<String>,
    pub team: Option<String>,
    pub app: Option<String>,
}

impl CostFilter {
    pub fn app(env: &str, team: &str, app: &str) -> Self {
        Self {
            env: Some(env.to_string()),
            team: Some(team.to_string()),
            app: Some(app.to_string()),
        }
    }

    pub fn team(team: &str) -> Self {
        Self {
            team: Some(team.to_string()),
            ..Default::default()
        }
    }

    pub fn env(env: &str) -> Self {
        Self {
            env: Some(env.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait CostStore: Send + Sync {
    /// Records matching `filter` with a date inside `range`, ordered by date.
    async fn daily_costs(&self, filter: &CostFilter, range: DateRange) -> DbResult<Vec<CostRecord>>;

    /// Most recent date with any stored cost.
    async fn latest_date(&self) -> DbResult<Option<NaiveDate>>;

    /// Insert or replace records, keyed by (env, team, app, cost type, date).
    async fn upsert(&self, records: &[CostRecord]) -> DbResult<u64>;
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct CostSeries {
    pub cost_type: String,
    pub sum: f64,
    pub data: Vec<DailyCost>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct AppCost {
    pub sum: f64,
    pub series: Vec<CostSeries>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct AppCostBreakdown {
    pub env: String,
    pub app: String,
    pub sum: f64,
    pub series: Vec<CostSeries>,
    pub daily_total: Vec<DailyCost>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct TeamCost {
    pub sum: f64,
    pub apps: Vec<AppCostBreakdown>,
    pub daily_total: Vec<DailyCost>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct TeamAppCost {
    pub team: String,
    pub app: String,
    pub sum: f64,
    pub cost: Vec<DailyCost>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct EnvCost {
    pub env: String,
    pub sum: f64,
    pub apps: Vec<TeamAppCost>,
}

fn cost_series(range: DateRange, rows: impl IntoIterator<Item = CostRow<String>>) -> Vec<CostSeries> {
    normalize::normalize_daily(range.from, range.to, rows)
        .into_iter()
        .map(|(cost_type, data)| CostSeries {
            sum: normalize::sum_days(&data),
            cost_type,
            data,
        })
        .collect()
}

/// Cost of one app, one series per cost type.
pub fn app_cost(range: DateRange, records: Vec<CostRecord>) -> AppCost {
    let series = cost_series(range, records.into_iter().map(|r| CostRow::new(r.cost_type, r.date, r.cost)));
    AppCost {
        sum: series.iter().map(|s| s.sum).sum(),
        series,
    }
}

/// Cost of a team, broken down per app and environment, each with its cost types.
pub fn team_cost(range: DateRange, records: Vec<CostRecord>) -> TeamCost {
    let mut per_app: BTreeMap<(String, String), Vec<CostRow<String>>> = BTreeMap::new();
    for record in records {
        per_app
            .entry((record.env, record.app))
            .or_default()
            .push(CostRow::new(record.cost_type, record.date, record.cost));
    }

    let apps: Vec<AppCostBreakdown> = per_app
        .into_iter()
        .map(|((env, app), rows)| {
            let normalized = normalize::normalize_daily(range.from, range.to, rows);
            let daily_total = normalize::daily_totals(&normalized);
            let series: Vec<CostSeries> = normalized
                .into_iter()
                .map(|(cost_type, data)| CostSeries {
                    sum: normalize::sum_days(&data),
                    cost_type,
                    data,
                })
                .collect();
            AppCostBreakdown {
                env,
                app,
                sum: series.iter().map(|s| s.sum).sum(),
                series,
                daily_total,
            }
        })
        .collect();

    let mut daily_total: Vec<DailyCost> = range
        .from
        .iter_days()
        .take_while(|date| *date <= range.to)
        .map(|date| DailyCost { date, cost: 0.0 })
        .collect();
    for app in &apps {
        for (total, day) in daily_total.iter_mut().zip(&app.daily_total) {
            total.cost += day.cost;
        }
    }

    TeamCost {
        sum: apps.iter().map(|a| a.sum).sum(),
        apps,
        daily_total,
    }
}

/// Cost of every app in an environment, cost types collapsed.
pub fn env_cost(env: &str, range: DateRange, records: Vec<CostRecord>) -> EnvCost {
    let mut collapsed: HashMap<(String, String, NaiveDate), f64> = HashMap::new();
    for record in records {
        *collapsed.entry((record.team, record.app, record.date)).or_default() += record.cost;
    }

    let rows = collapsed
        .into_iter()
        .map(|((team, app, date), cost)| CostRow::new((team, app), date, cost));

    let apps: Vec<TeamAppCost> = normalize::normalize_daily(range.from, range.to, rows)
        .into_iter()
        .map(|((team, app), cost)| TeamAppCost {
            team,
            app,
            sum: normalize::sum_days(&cost),
            cost,
        })
        .collect();

    EnvCost {
        env: env.to_string(),
        sum: apps.iter().map(|a| a.sum).sum(),
        apps,
    }
}

/// Monthly roll-up by cost type, newest month first. `latest` is the newest stored date overall.
pub fn monthly_cost(records: Vec<CostRecord>, latest: NaiveDate) -> Vec<MonthlyCost> {
    normalize::monthly(records.into_iter().map(|r| CostRow::new(r.cost_type, r.date, r.cost)), latest)
}
