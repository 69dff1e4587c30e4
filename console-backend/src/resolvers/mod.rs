//! Read-side aggregation over the collaborators.
//!
//! [`Services`] owns one handle per collaborator and exposes the operations the GraphQL layer
//! resolves. Each operation validates its arguments, fans out to the collaborators it needs,
//! joins the results, establishes ordering and only then paginates or normalizes. The
//! operations are plain async methods so they can be tested without a schema.
//!
//! Every collaborator call is wrapped in [`metrics::instrument`]; failures surface as
//! [`Error::Unavailable`] (HTTP and cluster collaborators) or [`Error::Database`].

pub mod apps;
pub mod costs;
pub mod deployments;
pub mod logs;
pub mod node;
pub mod search;
pub mod teams;
pub mod utilization;
pub mod vulnerabilities;

use std::{future::Future, sync::Arc, time::Duration};

use bon::bon;

use crate::{
    cache::TtlCache,
    clients::{hookd::DeploymentHistory, k8s::ClusterState, teams::TeamsDirectory},
    costs::CostStore,
    db::errors::Result as DbResult,
    errors::{Error, Result},
    metrics,
    utilization::UtilizationStore,
    vulnerabilities::{Summary, VulnerabilitySource},
};

pub const TEAMS: &str = "teams";
pub const HOOKD: &str = "hookd";
pub const CLUSTERS: &str = "clusters";
pub const DEPENDENCYTRACK: &str = "dependencytrack";
pub const DATABASE: &str = "database";

/// Cache key for vulnerability summaries: environment, team, app and image.
pub type ImageKey = (String, String, String, String);

pub struct Services {
    pub teams: Arc<dyn TeamsDirectory>,
    pub deployments: Arc<dyn DeploymentHistory>,
    pub clusters: Arc<dyn ClusterState>,
    pub vulnerabilities: Arc<dyn VulnerabilitySource>,
    pub costs: Arc<dyn CostStore>,
    pub utilization: Arc<dyn UtilizationStore>,
    vulnerability_cache: Arc<TtlCache<ImageKey, Summary>>,
    nodes: node::NodeResolvers,
    log_tail_lines: i64,
}

#[bon]
impl Services {
    #[builder]
    pub fn new(
        teams: Arc<dyn TeamsDirectory>,
        deployments: Arc<dyn DeploymentHistory>,
        clusters: Arc<dyn ClusterState>,
        vulnerabilities: Arc<dyn VulnerabilitySource>,
        costs: Arc<dyn CostStore>,
        utilization: Arc<dyn UtilizationStore>,
        #[builder(default = Duration::from_secs(5 * 60))] vulnerabilities_ttl: Duration,
        #[builder(default = 150)] log_tail_lines: i64,
    ) -> Self {
        Self {
            teams,
            deployments,
            clusters,
            vulnerabilities,
            costs,
            utilization,
            vulnerability_cache: Arc::new(TtlCache::new("vulnerabilities", vulnerabilities_ttl)),
            nodes: node::NodeResolvers::default(),
            log_tail_lines,
        }
    }
}

impl Services {
    /// Fail with `NotFound` unless `env` is one of the watched clusters.
    pub fn check_env(&self, env: &str) -> Result<()> {
        if self.clusters.environments().iter().any(|e| e == env) {
            Ok(())
        } else {
            Err(Error::not_found("environment", env))
        }
    }
}

/// Call an HTTP or cluster collaborator, recording metrics and tagging failures with its name.
pub(crate) async fn call<T>(
    collaborator: &'static str,
    operation: &'static str,
    future: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    metrics::instrument(collaborator, operation, future)
        .await
        .map_err(|e| Error::unavailable(collaborator, e))
}

/// Run a store query, recording metrics.
pub(crate) async fn query<T>(operation: &'static str, future: impl Future<Output = DbResult<T>>) -> Result<T> {
    Ok(metrics::instrument(DATABASE, operation, future).await?)
}

/// Map a failed worker task onto the error taxonomy.
pub(crate) fn join_error(e: tokio::task::JoinError) -> Error {
    if e.is_cancelled() {
        Error::Cancelled
    } else {
        Error::Other(anyhow::anyhow!("worker task panicked: {e}"))
    }
}
