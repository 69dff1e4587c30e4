use chrono::{NaiveDate, Utc};
use tracing::instrument;

use super::{Services, query};
use crate::{
    costs::{self, AppCost, CostFilter, DateRange, EnvCost, MONTHLY_HISTORY, TeamCost, normalize::MonthlyCost},
    errors::Result,
};

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl Services {
    /// Daily cost of one app per cost type over `[from, to]` (`YYYY-MM-DD`).
    #[instrument(skip(self))]
    pub async fn app_cost(&self, env: &str, team: &str, app: &str, from: &str, to: &str) -> Result<AppCost> {
        let range = DateRange::parse(from, to, today())?;
        let records = query("daily_costs", self.costs.daily_costs(&CostFilter::app(env, team, app), range)).await?;
        Ok(costs::app_cost(range, records))
    }

    /// Daily cost of a team per app and environment.
    #[instrument(skip(self))]
    pub async fn team_cost(&self, team: &str, from: &str, to: &str) -> Result<TeamCost> {
        let range = DateRange::parse(from, to, today())?;
        let records = query("daily_costs", self.costs.daily_costs(&CostFilter::team(team), range)).await?;
        Ok(costs::team_cost(range, records))
    }

    /// Daily cost of every app in an environment.
    #[instrument(skip(self))]
    pub async fn env_cost(&self, env: &str, from: &str, to: &str) -> Result<EnvCost> {
        let range = DateRange::parse(from, to, today())?;
        let records = query("daily_costs", self.costs.daily_costs(&CostFilter::env(env), range)).await?;
        Ok(costs::env_cost(env, range, records))
    }

    /// Monthly cost of a team over the trailing year, newest month first.
    #[instrument(skip(self))]
    pub async fn monthly_team_cost(&self, team: &str) -> Result<Vec<MonthlyCost>> {
        self.monthly(CostFilter::team(team)).await
    }

    #[instrument(skip(self))]
    pub async fn monthly_app_cost(&self, env: &str, team: &str, app: &str) -> Result<Vec<MonthlyCost>> {
        self.monthly(CostFilter::app(env, team, app)).await
    }

    async fn monthly(&self, filter: CostFilter) -> Result<Vec<MonthlyCost>> {
        let range = DateRange::trailing_months(today(), MONTHLY_HISTORY);
        let (records, latest) = tokio::try_join!(
            query("daily_costs", self.costs.daily_costs(&filter, range)),
            query("latest_date", self.costs.latest_date()),
        )?;
        let Some(latest) = latest else {
            return Ok(Vec::new());
        };
        Ok(costs::monthly_cost(records, latest))
    }
}
