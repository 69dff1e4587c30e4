//! Clients for the collaborators the console aggregates.
//!
//! Each collaborator sits behind a trait so resolvers can be exercised against in-memory fakes:
//!
//! - [`teams::TeamsDirectory`]: teams, members and users from the teams backend
//! - [`hookd::DeploymentHistory`]: deployment history from hookd
//! - [`k8s::ClusterState`]: applications, jobs, pods and logs from every cluster
//! - [`crate::vulnerabilities::VulnerabilitySource`]: findings from dependencytrack
//!
//! Client methods return `anyhow::Result`; resolvers attach the collaborator name when converting
//! failures into [`crate::errors::Error::Unavailable`].

pub mod dependencytrack;
pub mod hookd;
pub mod k8s;
pub mod teams;

use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::{Client, Response};
use url::Url;

/// Install the process-wide rustls provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    install_crypto_provider();
    Client::builder().timeout(timeout).build().context("Failed to create HTTP client")
}

/// Join `path` onto `base`, treating `base` as a directory even without a trailing slash.
pub(crate) fn endpoint(base: &Url, path: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| anyhow!("Failed to construct URL for {path}: {e}"))
}

/// Turn non-2xx responses into errors carrying the status and body.
pub(crate) async fn error_for_status(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("{url} returned {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("http://hookd.local/prefix").unwrap();
        assert_eq!(
            endpoint(&base, "/internal/api/v1/console/deployments").unwrap().as_str(),
            "http://hookd.local/prefix/internal/api/v1/console/deployments"
        );

        let base = Url::parse("http://hookd.local/").unwrap();
        assert_eq!(endpoint(&base, "query").unwrap().as_str(), "http://hookd.local/query");
    }
}
