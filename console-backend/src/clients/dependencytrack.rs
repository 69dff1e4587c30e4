//! Findings from dependencytrack.
//!
//! Every image is a dependencytrack project named after the image repository and versioned by
//! its tag. A project without a BOM import has never been scanned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::vulnerabilities::{Finding, ImageFindings, VulnerabilitySource};

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    uuid: String,
    last_bom_import: Option<i64>,
}

#[derive(Deserialize)]
struct ApiFinding {
    component: Component,
    vulnerability: Vulnerability,
}

#[derive(Deserialize)]
struct Component {
    name: String,
    #[serde(default)]
    purl: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Vulnerability {
    vuln_id: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    aliases: Vec<Alias>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Alias {
    cve_id: Option<String>,
    ghsa_id: Option<String>,
}

impl From<ApiFinding> for Finding {
    fn from(f: ApiFinding) -> Self {
        Self {
            id: f.vulnerability.vuln_id,
            aliases: f
                .vulnerability
                .aliases
                .into_iter()
                .flat_map(|alias| [alias.cve_id, alias.ghsa_id])
                .flatten()
                .collect(),
            component: f.component.purl.unwrap_or(f.component.name),
            severity: f.vulnerability.severity,
        }
    }
}

/// Split `registry/repo:tag` into project name and version. Digests are dropped.
pub fn project_coordinates(image: &str) -> (&str, &str) {
    let image = image.split('@').next().unwrap_or(image);
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

pub struct DependencyTrackClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl DependencyTrackClient {
    pub fn new(base_url: Url, api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url,
            api_key: api_key.into(),
        })
    }

    async fn project(&self, name: &str, version: &str) -> anyhow::Result<Option<Project>> {
        let mut url = super::endpoint(&self.base_url, "api/v1/project/lookup")?;
        url.query_pairs_mut().append_pair("name", name).append_pair("version", version);

        let response = self.client.get(url).header(API_KEY_HEADER, &self.api_key).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(super::error_for_status(response).await?.json().await?))
    }
}

#[async_trait]
impl VulnerabilitySource for DependencyTrackClient {
    #[instrument(skip(self), err)]
    async fn findings(&self, image: &str) -> anyhow::Result<Option<ImageFindings>> {
        let (name, version) = project_coordinates(image);
        let Some(project) = self.project(name, version).await? else {
            return Ok(None);
        };

        if project.last_bom_import.is_none() {
            return Ok(Some(ImageFindings::default()));
        }

        let url = super::endpoint(&self.base_url, &format!("api/v1/finding/project/{}", project.uuid))?;
        let response = self.client.get(url).header(API_KEY_HEADER, &self.api_key).send().await?;
        let findings: Vec<ApiFinding> = super::error_for_status(response).await?.json().await?;

        Ok(Some(ImageFindings {
            has_bom: true,
            findings: findings.into_iter().map(Finding::from).collect(),
        }))
    }
}
