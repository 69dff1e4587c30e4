//! Cost queries and upserts against the `cost` table.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use crate::{
    costs::{CostFilter, CostStore, DateRange},
    db::{errors::Result, models::costs::CostRecord},
};

/// Postgres limits a statement to 65535 bind parameters; each record binds six.
const UPSERT_CHUNK_SIZE: usize = 1000;

#[derive(Clone)]
pub struct PgCostStore {
    pool: PgPool,
}

impl PgCostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct LatestDateRow {
    latest: Option<NaiveDate>,
}

#[async_trait]
impl CostStore for PgCostStore {
    #[instrument(skip(self), err)]
    async fn daily_costs(&self, filter: &CostFilter, range: DateRange) -> Result<Vec<CostRecord>> {
        let records = sqlx::query_as::<_, CostRecord>(
            r#"
            SELECT env, team_slug, app, cost_type, date, daily_cost
            FROM cost
            WHERE ($1::TEXT IS NULL OR env = $1)
              AND ($2::TEXT IS NULL OR team_slug = $2)
              AND ($3::TEXT IS NULL OR app = $3)
              AND date >= $4
              AND date <= $5
            ORDER BY date, env, team_slug, app, cost_type
            "#,
        )
        .bind(filter.env.as_deref())
        .bind(filter.team.as_deref())
        .bind(filter.app.as_deref())
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    #[instrument(skip(self), err)]
    async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let row = sqlx::query_as::<_, LatestDateRow>("SELECT MAX(date) AS latest FROM cost")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.latest)
    }

    #[instrument(skip(self, records), fields(count = records.len()), err)]
    async fn upsert(&self, records: &[CostRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for chunk in records.chunks(UPSERT_CHUNK_SIZE) {
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO cost (env, team_slug, app, cost_type, date, daily_cost) ");
            query.push_values(chunk, |mut row, record| {
                row.push_bind(&record.env)
                    .push_bind(&record.team)
                    .push_bind(&record.app)
                    .push_bind(&record.cost_type)
                    .push_bind(record.date)
                    .push_bind(record.cost);
            });
            query.push(" ON CONFLICT ON CONSTRAINT cost_daily_unique DO UPDATE SET daily_cost = EXCLUDED.daily_cost");

            affected += query.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(affected)
    }
}
