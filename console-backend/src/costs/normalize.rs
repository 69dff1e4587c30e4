//! Gap-free daily and monthly cost series.

use std::collections::{BTreeMap, HashMap};

use async_graphql::SimpleObject;
use chrono::{Datelike, Months, NaiveDate};

/// One observed cost value for a category on a day.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRow<K> {
    pub category: K,
    pub date: NaiveDate,
    pub cost: f64,
}

impl<K> CostRow<K> {
    pub fn new(category: K, date: NaiveDate, cost: f64) -> Self {
        Self { category, date, cost }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, SimpleObject)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub cost: f64,
}

/// Expand sparse rows into one entry per calendar day in `[from, to]` for every category present.
///
/// Days without an observation are `0.0`. If a `(category, date)` pair appears more than once the
/// last row wins. Rows outside the range still make their category appear.
pub fn normalize_daily<K, I>(from: NaiveDate, to: NaiveDate, rows: I) -> BTreeMap<K, Vec<DailyCost>>
where
    K: Ord,
    I: IntoIterator<Item = CostRow<K>>,
{
    let mut observed: BTreeMap<K, HashMap<NaiveDate, f64>> = BTreeMap::new();
    for row in rows {
        observed.entry(row.category).or_default().insert(row.date, row.cost);
    }

    observed
        .into_iter()
        .map(|(category, costs)| {
            let series = from
                .iter_days()
                .take_while(|date| *date <= to)
                .map(|date| DailyCost {
                    date,
                    cost: costs.get(&date).copied().unwrap_or(0.0),
                })
                .collect();
            (category, series)
        })
        .collect()
}

/// Sum of every value across every category.
pub fn sum<K>(series: &BTreeMap<K, Vec<DailyCost>>) -> f64 {
    series.values().flatten().map(|day| day.cost).sum()
}

pub fn sum_days(days: &[DailyCost]) -> f64 {
    days.iter().map(|day| day.cost).sum()
}

/// Per-day total across categories. All series must come from the same `normalize_daily` call.
pub fn daily_totals<K>(series: &BTreeMap<K, Vec<DailyCost>>) -> Vec<DailyCost> {
    let mut totals: Vec<DailyCost> = Vec::new();
    for days in series.values() {
        if totals.is_empty() {
            totals = days.clone();
            continue;
        }
        for (total, day) in totals.iter_mut().zip(days) {
            total.cost += day.cost;
        }
    }
    totals
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct MonthlyCost {
    /// First day of the month
    pub month: NaiveDate,
    pub cost: f64,
    /// Last day with data for this month; earlier than the month's end while it is still accumulating
    pub last_recorded_date: NaiveDate,
    pub categories: Vec<CategoryCost>,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct CategoryCost {
    pub category: String,
    pub cost: f64,
}

/// Roll rows up by calendar month, newest month first.
///
/// `latest` is the most recent date observed across all stored costs, not only `rows`. A month
/// is complete once `latest` has passed its last day.
pub fn monthly<I>(rows: I, latest: NaiveDate) -> Vec<MonthlyCost>
where
    I: IntoIterator<Item = CostRow<String>>,
{
    let mut months: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();

    for row in rows {
        *months
            .entry(first_of_month(row.date))
            .or_default()
            .entry(row.category)
            .or_default() += row.cost;
    }

    months
        .into_iter()
        .rev()
        .map(|(month, categories)| MonthlyCost {
            month,
            cost: categories.values().sum(),
            last_recorded_date: last_of_month(month).min(latest),
            categories: categories
                .into_iter()
                .map(|(category, cost)| CategoryCost { category, cost })
                .collect(),
        })
        .collect()
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}
