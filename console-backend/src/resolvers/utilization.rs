use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

use super::{Services, query};
use crate::{
    errors::{Error, Result},
    utilization::{
        ResourceType, ResourceUtilization, TeamUtilization, UtilizationDateRange, utilization_for_app, utilization_for_team,
        utilization_trend,
    },
};

/// Samples are hourly; trends compare the last day with the day before.
const TREND_WINDOW: usize = 24;

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start >= end {
        return Err(Error::invalid_argument(format!("start {start} must be before end {end}")));
    }
    Ok(())
}

impl Services {
    #[instrument(skip(self))]
    pub async fn app_utilization(
        &self,
        env: &str,
        team: &str,
        app: &str,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ResourceUtilization>> {
        check_window(start, end)?;
        let samples = query(
            "app_samples",
            self.utilization.app_samples(env, team, app, resource, start, end),
        )
        .await?;
        Ok(utilization_for_app(resource, samples))
    }

    #[instrument(skip(self))]
    pub async fn team_utilization(
        &self,
        team: &str,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TeamUtilization> {
        check_window(start, end)?;
        let samples = query("team_samples", self.utilization.team_samples(team, resource, start, end)).await?;
        Ok(utilization_for_team(resource, samples))
    }

    /// Percentage change in usage of an app over the last day, compared with the day before.
    #[instrument(skip(self))]
    pub async fn app_utilization_trend(&self, env: &str, team: &str, app: &str, resource: ResourceType) -> Result<f64> {
        let end = Utc::now();
        let start = end - Duration::hours(2 * TREND_WINDOW as i64);
        let series = self.app_utilization(env, team, app, resource, start, end).await?;
        Ok(utilization_trend(&series, TREND_WINDOW))
    }

    /// First and last sample timestamps, for bounding date pickers.
    pub async fn utilization_date_range(&self) -> Result<UtilizationDateRange> {
        Ok(query("utilization_bounds", self.utilization.bounds()).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_utils::{FakeUtilizationStore, Fakes, utilization_sample};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn fakes() -> Fakes {
        Fakes::default().with_utilization(
            FakeUtilizationStore::default()
                .with_sample("a", ResourceType::Cpu, utilization_sample("dev", "web", at(2), 0.5, 1.0))
                .with_sample("a", ResourceType::Cpu, utilization_sample("dev", "web", at(1), 0.25, 1.0))
                .with_sample("a", ResourceType::Cpu, utilization_sample("dev", "api", at(1), 1.0, 1.0))
                .with_sample("a", ResourceType::Memory, utilization_sample("dev", "web", at(1), 1e9, 2e9)),
        )
    }

    #[tokio::test]
    async fn app_series_is_ascending_and_priced() {
        let services = fakes().services();
        let series = services
            .app_utilization("dev", "a", "web", ResourceType::Cpu, at(0), at(12))
            .await
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, at(1));
        assert!(series[0].request_cost_overage > 0.0);
    }

    #[tokio::test]
    async fn team_totals_per_timestamp() {
        let services = fakes().services();
        let team = services
            .team_utilization("a", ResourceType::Cpu, at(0), at(12))
            .await
            .unwrap();

        assert_eq!(team.apps.len(), 2);
        assert_eq!(team.total.len(), 2);
        assert_eq!(team.total[0].usage, 1.25);
        assert_eq!(team.total[0].request, 2.0);
    }

    #[tokio::test]
    async fn empty_window_is_rejected() {
        let services = fakes().services();
        let err = services
            .team_utilization("a", ResourceType::Cpu, at(5), at(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn date_range_from_store_bounds() {
        let services = fakes().services();
        let range = services.utilization_date_range().await.unwrap();
        assert_eq!(range.start, Some(at(1)));
        assert_eq!(range.end, Some(at(2)));
    }
}
