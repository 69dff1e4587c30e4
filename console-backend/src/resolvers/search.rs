use async_graphql::{SimpleObject, Union};
use tracing::instrument;

use super::{Services, TEAMS, call};
use crate::{
    clients::{
        k8s::{App, Job},
        teams::Team,
    },
    errors::{Error, Result},
    pagination::{Connection, Pagination},
    search::{SearchType, rank_all},
};

#[derive(Debug, Clone, PartialEq, Union)]
pub enum SearchNode {
    App(App),
    Job(Job),
    Team(Team),
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct SearchResult {
    pub rank: i32,
    pub node: SearchNode,
}

impl Services {
    /// Rank teams, apps and jobs against `query`. Non-matches are dropped; the rest are ordered by
    /// rank, then name.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, kind: Option<SearchType>, pagination: &Pagination) -> Result<Connection<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_argument("search query cannot be empty"));
        }
        let wants = |t: SearchType| kind.is_none_or(|k| k == t);

        let (teams, apps, jobs) = tokio::try_join!(
            async {
                if wants(SearchType::Team) {
                    call(TEAMS, "teams", self.teams.teams()).await
                } else {
                    Ok(Vec::new())
                }
            },
            async {
                if wants(SearchType::App) {
                    self.all_apps(None).await
                } else {
                    Ok(Vec::new())
                }
            },
            async {
                if wants(SearchType::Job) {
                    self.all_jobs(None).await
                } else {
                    Ok(Vec::new())
                }
            },
        )?;

        let candidates = teams
            .into_iter()
            .map(|team| (team.slug.clone(), SearchNode::Team(team)))
            .chain(apps.into_iter().map(|app| (app.name.clone(), SearchNode::App(app))))
            .chain(jobs.into_iter().map(|job| (job.name.clone(), SearchNode::Job(job))));

        let results = rank_all(query, candidates)
            .into_iter()
            .map(|ranked| SearchResult {
                rank: ranked.rank,
                node: ranked.node,
            })
            .collect();
        Ok(Connection::paginate(results, pagination))
    }
}
