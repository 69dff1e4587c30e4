//! Database models for daily cost records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use sqlx::FromRow;

/// One row of the `cost` table. Also the wire shape of the cost export, which may quote costs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CostRecord {
    pub env: String,
    #[sqlx(rename = "team_slug")]
    #[serde(alias = "team_slug")]
    pub team: String,
    pub app: String,
    pub cost_type: String,
    pub date: NaiveDate,
    #[sqlx(rename = "daily_cost")]
    #[serde(alias = "daily_cost")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub cost: f64,
}
