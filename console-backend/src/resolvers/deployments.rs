use tracing::instrument;

use super::{HOOKD, Services, call};
use crate::{
    clients::hookd::{Deployment, DeploymentFilter},
    errors::{Error, Result},
    pagination::{Connection, Pagination},
};

/// Resource kind hookd records for applications.
pub const APPLICATION_KIND: &str = "Application";
/// Resource kind hookd records for naisjobs.
pub const NAISJOB_KIND: &str = "Naisjob";

impl Services {
    /// Deployments of `team`, newest first.
    #[instrument(skip(self))]
    pub async fn deployments(&self, team: &str, pagination: &Pagination) -> Result<Connection<Deployment>> {
        let deployments = self.team_deployments(&DeploymentFilter::team(team)).await?;
        Ok(Connection::paginate(deployments, pagination))
    }

    /// Deployments in `env` that touched the resource `kind`/`name`, newest first.
    #[instrument(skip(self))]
    pub async fn deployments_for(
        &self,
        env: &str,
        team: &str,
        kind: &str,
        name: &str,
        pagination: &Pagination,
    ) -> Result<Connection<Deployment>> {
        self.check_env(env)?;
        let filter = DeploymentFilter {
            cluster: Some(env.to_string()),
            ..DeploymentFilter::team(team)
        };
        let deployments = self
            .team_deployments(&filter)
            .await?
            .into_iter()
            .filter(|d| d.touches(kind, name))
            .collect();
        Ok(Connection::paginate(deployments, pagination))
    }

    pub async fn deployments_for_app(&self, env: &str, team: &str, app: &str, pagination: &Pagination) -> Result<Connection<Deployment>> {
        self.deployments_for(env, team, APPLICATION_KIND, app, pagination).await
    }

    pub async fn deployments_for_job(&self, env: &str, team: &str, job: &str, pagination: &Pagination) -> Result<Connection<Deployment>> {
        self.deployments_for(env, team, NAISJOB_KIND, job, pagination).await
    }

    #[instrument(skip(self))]
    pub async fn deployment(&self, team: &str, id: &str) -> Result<Deployment> {
        self.team_deployments(&DeploymentFilter::team(team))
            .await?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("deployment", id))
    }

    async fn team_deployments(&self, filter: &DeploymentFilter) -> Result<Vec<Deployment>> {
        let mut deployments = call(HOOKD, "deployments", self.deployments.deployments(filter)).await?;
        deployments.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(deployments)
    }
}
