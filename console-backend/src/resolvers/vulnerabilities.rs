use std::sync::Arc;

use async_graphql::SimpleObject;
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use super::{DEPENDENCYTRACK, ImageKey, Services, call, join_error};
use crate::{
    cache::TtlCache,
    clients::k8s::App,
    errors::{Error, Result},
    pagination::{Connection, Pagination},
    vulnerabilities::{Summary, TeamSummary, VulnerabilitySource, summarize, team_summary},
};

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct AppVulnerabilities {
    pub env: String,
    pub app: String,
    pub image: String,
    pub summary: Summary,
}

/// Per-app summaries of one team together with their sum.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamVulnerabilities {
    pub summary: TeamSummary,
    pub apps: Connection<AppVulnerabilities>,
}

impl Services {
    #[instrument(skip(self))]
    pub async fn app_vulnerabilities(&self, env: &str, team: &str, app: &str) -> Result<AppVulnerabilities> {
        let app = self.app(env, team, app).await?;
        scan(self.vulnerabilities.clone(), self.vulnerability_cache.clone(), app).await
    }

    /// Summaries of every app of `team`, ordered by app name then environment.
    ///
    /// One task per app; the page is cut once every task has finished. The team summary covers all
    /// apps, not just the page.
    #[instrument(skip(self))]
    pub async fn team_vulnerabilities(&self, team: &str, pagination: &Pagination) -> Result<TeamVulnerabilities> {
        let apps = self.all_apps(Some(team)).await?;

        let mut tasks = JoinSet::new();
        for app in apps {
            tasks.spawn(scan(self.vulnerabilities.clone(), self.vulnerability_cache.clone(), app));
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.map_err(join_error)??);
        }
        results.sort_by(|a, b| a.app.cmp(&b.app).then_with(|| a.env.cmp(&b.env)));

        Ok(TeamVulnerabilities {
            summary: team_summary(results.iter().map(|r| &r.summary)),
            apps: Connection::paginate(results, pagination),
        })
    }
}

async fn scan(
    source: Arc<dyn VulnerabilitySource>,
    cache: Arc<TtlCache<ImageKey, Summary>>,
    app: App,
) -> Result<AppVulnerabilities> {
    let key = (app.env.clone(), app.team.clone(), app.name.clone(), app.image.clone());
    let summary = cache
        .get_or_refresh(key, || async {
            let findings = call(DEPENDENCYTRACK, "findings", source.findings(&app.image)).await?;
            Ok::<_, Error>(match findings {
                Some(image) => summarize(&image.findings, image.has_bom),
                None => {
                    debug!(image = %app.image, "No dependencytrack project for image");
                    Summary::NO_BOM
                }
            })
        })
        .await?;

    Ok(AppVulnerabilities {
        env: app.env,
        app: app.name,
        image: app.image,
        summary,
    })
}
