use async_graphql::{Context, ID, Object, Result};

use super::types::{SearchResultConnection, TeamConnection, pagination, services};
use crate::{
    auth::CurrentUser,
    clients::{
        k8s::{App, Job},
        teams::{Team, User},
    },
    costs::EnvCost,
    errors::{Error, gql},
    resolvers::node::Node,
    search::SearchType,
    utilization::UtilizationDateRange,
};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The authenticated user.
    async fn me(&self, ctx: &Context<'_>) -> Result<User> {
        let Some(current) = ctx.data_opt::<CurrentUser>() else {
            return gql(Err(Error::Unauthenticated { message: None }));
        };
        gql(services(ctx)?.me(current).await)
    }

    async fn user(&self, ctx: &Context<'_>, email: String) -> Result<User> {
        gql(services(ctx)?.user(&email).await)
    }

    /// Every team, ordered by slug.
    async fn teams(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<TeamConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.teams(&page).await).map(Into::into)
    }

    async fn team(&self, ctx: &Context<'_>, slug: String) -> Result<Team> {
        gql(services(ctx)?.team(&slug).await)
    }

    async fn app(&self, ctx: &Context<'_>, env: String, team: String, name: String) -> Result<App> {
        gql(services(ctx)?.app(&env, &team, &name).await)
    }

    async fn job(&self, ctx: &Context<'_>, env: String, team: String, name: String) -> Result<Job> {
        gql(services(ctx)?.job(&env, &team, &name).await)
    }

    /// Look up any node by its opaque id.
    async fn node(&self, ctx: &Context<'_>, id: ID) -> Result<Node> {
        gql(services(ctx)?.node(&id).await)
    }

    async fn search(
        &self,
        ctx: &Context<'_>,
        query: String,
        #[graphql(name = "type")] kind: Option<SearchType>,
        first: Option<i32>,
        after: Option<String>,
        last: Option<i32>,
        before: Option<String>,
    ) -> Result<SearchResultConnection> {
        let page = pagination(first, after, last, before)?;
        gql(services(ctx)?.search(&query, kind, &page).await).map(Into::into)
    }

    /// Environments the console knows about.
    async fn environments(&self, ctx: &Context<'_>) -> Result<Vec<String>> {
        Ok(services(ctx)?.clusters.environments())
    }

    /// Daily cost of every app in `env` between `from` and `to` (`YYYY-MM-DD`).
    async fn env_cost(&self, ctx: &Context<'_>, env: String, from: String, to: String) -> Result<EnvCost> {
        gql(services(ctx)?.env_cost(&env, &from, &to).await)
    }

    async fn utilization_date_range(&self, ctx: &Context<'_>) -> Result<UtilizationDateRange> {
        gql(services(ctx)?.utilization_date_range().await)
    }
}
