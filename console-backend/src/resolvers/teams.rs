use tracing::instrument;

use super::{HOOKD, Services, TEAMS, call};
use crate::{
    auth::CurrentUser,
    clients::{
        hookd::DeployKey,
        teams::{Team, TeamMember, User},
    },
    errors::{Error, Result},
    pagination::{Connection, Pagination},
};

impl Services {
    /// Every team, ordered by slug.
    #[instrument(skip(self))]
    pub async fn teams(&self, pagination: &Pagination) -> Result<Connection<Team>> {
        let mut teams = call(TEAMS, "teams", self.teams.teams()).await?;
        teams.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(Connection::paginate(teams, pagination))
    }

    #[instrument(skip(self))]
    pub async fn team(&self, slug: &str) -> Result<Team> {
        call(TEAMS, "team", self.teams.team(slug))
            .await?
            .ok_or_else(|| Error::not_found("team", slug))
    }

    /// Members of `slug`, ordered by name then email.
    #[instrument(skip(self))]
    pub async fn members(&self, slug: &str, pagination: &Pagination) -> Result<Connection<TeamMember>> {
        let mut members = call(TEAMS, "members", self.teams.members(slug)).await?;
        members.sort_by(|a, b| a.user.name.cmp(&b.user.name).then_with(|| a.user.email.cmp(&b.user.email)));
        Ok(Connection::paginate(members, pagination))
    }

    #[instrument(skip(self))]
    pub async fn user(&self, email: &str) -> Result<User> {
        call(TEAMS, "user", self.teams.user(email))
            .await?
            .ok_or_else(|| Error::not_found("user", email))
    }

    /// The authenticated caller.
    pub async fn me(&self, current: &CurrentUser) -> Result<User> {
        self.user(&current.email).await
    }

    /// Teams `email` belongs to, ordered by slug.
    #[instrument(skip(self))]
    pub async fn user_teams(&self, email: &str, pagination: &Pagination) -> Result<Connection<Team>> {
        let mut teams = call(TEAMS, "user_teams", self.teams.user_teams(email)).await?;
        teams.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(Connection::paginate(teams, pagination))
    }

    #[instrument(skip(self))]
    pub async fn deploy_key(&self, team: &str) -> Result<DeployKey> {
        call(HOOKD, "deploy_key", self.deployments.deploy_key(team)).await
    }
}
