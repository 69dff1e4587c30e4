//! Fields that are resolved on demand instead of being stored on the node.

use async_graphql::{ComplexObject, Context, ID, Result};
use chrono::{DateTime, Utc};

use super::types::{AppConnection, DeploymentConnection, JobConnection, TeamConnection, TeamMemberConnection, pagination, services};
use crate::{
    clients::{
        hookd::{DeployKey, Deployment},
        k8s::{App, Instance, Job},
        teams::{Team, User},
    },
    costs::{AppCost, TeamCost, normalize::MonthlyCost},
    errors::gql,
    resolvers::vulnerabilities::{AppVulnerabilities, TeamVulnerabilities},
    types::Ident,
    utilization::{ResourceType, ResourceUtilization, TeamUtilization},
};

#[ComplexObject]
impl Team {
    async fn id(&self) -> ID {
        Ident::team(&self.slug).into()
    }

    async fn members(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<TeamMemberConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.members(&self.slug, &page).await).map(Into::into)
    }

    /// Applications of the team across every environment.
    async fn apps(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<AppConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.apps(&self.slug, &page).await).map(Into::into)
    }

    async fn jobs(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<JobConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.jobs(&self.slug, &page).await).map(Into::into)
    }

    /// Deployments of the team, newest first.
    async fn deployments(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<DeploymentConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.deployments(&self.slug, &page).await).map(Into::into)
    }

    async fn deploy_key(&self, ctx: &Context<'_>) -> Result<DeployKey> {
        gql(services(ctx)?.deploy_key(&self.slug).await)
    }

    async fn vulnerabilities(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<TeamVulnerabilities> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.team_vulnerabilities(&self.slug, &page).await)
    }

    /// Daily cost between `from` and `to` (`YYYY-MM-DD`, inclusive).
    async fn cost(&self, ctx: &Context<'_>, from: String, to: String) -> Result<TeamCost> {
        gql(services(ctx)?.team_cost(&self.slug, &from, &to).await)
    }

    async fn monthly_cost(&self, ctx: &Context<'_>) -> Result<Vec<MonthlyCost>> {
        gql(services(ctx)?.monthly_team_cost(&self.slug).await)
    }

    async fn utilization(
        &self,
        ctx: &Context<'_>,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TeamUtilization> {
        gql(services(ctx)?.team_utilization(&self.slug, resource, start, end).await)
    }
}

#[ComplexObject]
impl User {
    #[graphql(name = "id")]
    async fn ident(&self) -> ID {
        Ident::user(&self.email).into()
    }

    async fn teams(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<TeamConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.user_teams(&self.email, &page).await).map(Into::into)
    }
}

#[ComplexObject]
impl App {
    async fn id(&self) -> ID {
        Ident::app(&self.env, &self.team, &self.name).into()
    }

    async fn instances(&self, ctx: &Context<'_>) -> Result<Vec<Instance>> {
        gql(services(ctx)?.instances(&self.env, &self.team, &self.name).await)
    }

    async fn deployments(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<DeploymentConnection> {
        let page = pagination(first, after, last, before)?;
        let services = services(ctx)?;
        gql(services.deployments_for_app(&self.env, &self.team, &self.name, &page).await).map(Into::into)
    }

    async fn vulnerabilities(&self, ctx: &Context<'_>) -> Result<AppVulnerabilities> {
        gql(services(ctx)?.app_vulnerabilities(&self.env, &self.team, &self.name).await)
    }

    async fn cost(&self, ctx: &Context<'_>, from: String, to: String) -> Result<AppCost> {
        gql(services(ctx)?.app_cost(&self.env, &self.team, &self.name, &from, &to).await)
    }

    async fn monthly_cost(&self, ctx: &Context<'_>) -> Result<Vec<MonthlyCost>> {
        gql(services(ctx)?.monthly_app_cost(&self.env, &self.team, &self.name).await)
    }

    async fn utilization(
        &self,
        ctx: &Context<'_>,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ResourceUtilization>> {
        let services = services(ctx)?;
        gql(services
            .app_utilization(&self.env, &self.team, &self.name, resource, start, end)
            .await)
    }

    /// Percentage change in usage over the last day.
    async fn utilization_trend(&self, ctx: &Context<'_>, resource: ResourceType) -> Result<f64> {
        gql(services(ctx)?
            .app_utilization_trend(&self.env, &self.team, &self.name, resource)
            .await)
    }
}

#[ComplexObject]
impl Job {
    async fn id(&self) -> ID {
        Ident::job(&self.env, &self.team, &self.name).into()
    }

    async fn instances(&self, ctx: &Context<'_>) -> Result<Vec<Instance>> {
        gql(services(ctx)?.instances(&self.env, &self.team, &self.name).await)
    }

    async fn deployments(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<DeploymentConnection> {
        let page = pagination(first, after, last, before)?;
        let services = services(ctx)?;
        gql(services.deployments_for_job(&self.env, &self.team, &self.name, &page).await).map(Into::into)
    }
}

#[ComplexObject]
impl Deployment {
    #[graphql(name = "id")]
    async fn ident(&self) -> ID {
        Ident::deployment(&self.team, &self.id).into()
    }
}
