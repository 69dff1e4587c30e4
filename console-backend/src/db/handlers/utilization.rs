//! Queries against the `resource_utilization_metrics` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::utilization::{UtilizationBounds, UtilizationSample},
    },
    utilization::{ResourceType, UtilizationStore},
};

#[derive(Clone)]
pub struct PgUtilizationStore {
    pool: PgPool,
}

impl PgUtilizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UtilizationStore for PgUtilizationStore {
    #[instrument(skip(self), err)]
    async fn app_samples(
        &self,
        env: &str,
        team: &str,
        app: &str,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UtilizationSample>> {
        let samples = sqlx::query_as::<_, UtilizationSample>(
            r#"
            SELECT env, app, timestamp, usage, request
            FROM resource_utilization_metrics
            WHERE env = $1 AND team_slug = $2 AND app = $3 AND resource_type = $4
              AND timestamp >= $5 AND timestamp < $6
            ORDER BY timestamp
            "#,
        )
        .bind(env)
        .bind(team)
        .bind(app)
        .bind(resource.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(samples)
    }

    #[instrument(skip(self), err)]
    async fn team_samples(&self, team: &str, resource: ResourceType, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UtilizationSample>> {
        let samples = sqlx::query_as::<_, UtilizationSample>(
            r#"
            SELECT env, app, timestamp, usage, request
            FROM resource_utilization_metrics
            WHERE team_slug = $1 AND resource_type = $2
              AND timestamp >= $3 AND timestamp < $4
            ORDER BY timestamp, env, app
            "#,
        )
        .bind(team)
        .bind(resource.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(samples)
    }

    #[instrument(skip(self), err)]
    async fn bounds(&self) -> Result<UtilizationBounds> {
        let bounds = sqlx::query_as::<_, UtilizationBounds>(r#"SELECT MIN(timestamp) AS start, MAX(timestamp) AS "end" FROM resource_utilization_metrics"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(bounds)
    }
}
