//! Teams directory: teams, their members and users.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_graphql::{Enum, SimpleObject};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use crate::cache::{Clock, SystemClock, TtlCache};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
#[graphql(complex)]
pub struct Team {
    pub slug: String,
    pub purpose: String,
    pub slack_channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
#[graphql(complex)]
pub struct User {
    #[graphql(skip)]
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
pub struct TeamMember {
    pub user: User,
    pub role: TeamRole,
}

#[async_trait]
pub trait TeamsDirectory: Send + Sync {
    async fn teams(&self) -> anyhow::Result<Vec<Team>>;

    async fn team(&self, slug: &str) -> anyhow::Result<Option<Team>>;

    async fn members(&self, slug: &str) -> anyhow::Result<Vec<TeamMember>>;

    async fn user(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Teams `email` is a member of.
    async fn user_teams(&self, email: &str) -> anyhow::Result<Vec<Team>>;
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct TeamsData {
    teams: Vec<Team>,
}

#[derive(Deserialize)]
struct TeamData {
    team: Option<Team>,
}

#[derive(Deserialize)]
struct MembersData {
    team: Option<MembersTeam>,
}

#[derive(Deserialize)]
struct MembersTeam {
    members: Vec<TeamMember>,
}

#[derive(Deserialize)]
struct UserData {
    user: Option<UserWithTeams>,
}

#[derive(Deserialize)]
struct UserWithTeams {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    teams: Vec<Team>,
}

const TEAM_FIELDS: &str = "slug purpose slackChannel";

/// GraphQL-over-HTTP client for the teams backend.
pub struct TeamsClient {
    client: Client,
    endpoint: Url,
    token: String,
}

impl TeamsClient {
    pub fn new(url: &Url, token: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            endpoint: super::endpoint(url, "query")?,
            token: token.into(),
        })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> anyhow::Result<T> {
        debug!(endpoint = %self.endpoint, "Querying teams backend");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let response = super::error_for_status(response).await?;
        let body: GraphqlResponse<T> = response.json().await?;

        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow!("teams backend returned errors: {}", messages.join("; ")));
        }
        body.data.ok_or_else(|| anyhow!("teams backend returned no data"))
    }

    async fn user_with_teams(&self, email: &str) -> anyhow::Result<Option<UserWithTeams>> {
        let query = format!("query($email: String!) {{ user(email: $email) {{ id email name teams {{ {TEAM_FIELDS} }} }} }}");
        let data: UserData = self.query(&query, json!({ "email": email })).await?;
        Ok(data.user)
    }
}

#[async_trait]
impl TeamsDirectory for TeamsClient {
    #[instrument(skip(self), err)]
    async fn teams(&self) -> anyhow::Result<Vec<Team>> {
        let query = format!("query {{ teams {{ {TEAM_FIELDS} }} }}");
        let data: TeamsData = self.query(&query, json!({})).await?;
        Ok(data.teams)
    }

    #[instrument(skip(self), err)]
    async fn team(&self, slug: &str) -> anyhow::Result<Option<Team>> {
        let query = format!("query($slug: String!) {{ team(slug: $slug) {{ {TEAM_FIELDS} }} }}");
        let data: TeamData = self.query(&query, json!({ "slug": slug })).await?;
        Ok(data.team)
    }

    #[instrument(skip(self), err)]
    async fn members(&self, slug: &str) -> anyhow::Result<Vec<TeamMember>> {
        let query = "query($slug: String!) { team(slug: $slug) { members { role user { id email name } } } }";
        let data: MembersData = self.query(query, json!({ "slug": slug })).await?;
        Ok(data.team.map(|team| team.members).unwrap_or_default())
    }

    #[instrument(skip(self), err)]
    async fn user(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.user_with_teams(email).await?.map(|u| u.user))
    }

    #[instrument(skip(self), err)]
    async fn user_teams(&self, email: &str) -> anyhow::Result<Vec<Team>> {
        Ok(self.user_with_teams(email).await?.map(|u| u.teams).unwrap_or_default())
    }
}

/// Serves the team list from a [`TtlCache`]; everything else passes through.
pub struct CachedTeams<C: Clock = SystemClock> {
    inner: Arc<dyn TeamsDirectory>,
    teams: TtlCache<(), Arc<Vec<Team>>, C>,
}

impl CachedTeams<SystemClock> {
    pub fn new(inner: Arc<dyn TeamsDirectory>, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, SystemClock)
    }
}

impl<C: Clock> CachedTeams<C> {
    pub fn with_clock(inner: Arc<dyn TeamsDirectory>, ttl: Duration, clock: C) -> Self {
        Self {
            inner,
            teams: TtlCache::with_clock("teams", ttl, clock),
        }
    }

    async fn cached(&self) -> anyhow::Result<Arc<Vec<Team>>> {
        self.teams
            .get_or_refresh((), || async { self.inner.teams().await.map(Arc::new) })
            .await
    }
}

#[async_trait]
impl<C: Clock> TeamsDirectory for CachedTeams<C> {
    async fn teams(&self) -> anyhow::Result<Vec<Team>> {
        Ok(self.cached().await?.as_ref().clone())
    }

    async fn team(&self, slug: &str) -> anyhow::Result<Option<Team>> {
        Ok(self.cached().await?.iter().find(|team| team.slug == slug).cloned())
    }

    async fn members(&self, slug: &str) -> anyhow::Result<Vec<TeamMember>> {
        self.inner.members(slug).await
    }

    async fn user(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.inner.user(email).await
    }

    async fn user_teams(&self, email: &str) -> anyhow::Result<Vec<Team>> {
        self.inner.user_teams(email).await
    }
}
