//! Deployment history from hookd.

use std::time::Duration;

use async_graphql::SimpleObject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

/// Header carrying the pre-shared key hookd expects on its internal API.
const PSK_HEADER: &str = "X-PSK";

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
#[graphql(complex)]
pub struct Deployment {
    #[graphql(skip)]
    pub id: String,
    pub team: String,
    pub env: String,
    pub created: DateTime<Utc>,
    pub repository: Option<String>,
    pub statuses: Vec<DeploymentStatus>,
    pub resources: Vec<DeploymentResource>,
}

impl Deployment {
    /// Whether the deployment touched the resource `kind`/`name`.
    pub fn touches(&self, kind: &str, name: &str) -> bool {
        self.resources.iter().any(|r| r.kind == kind && r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
pub struct DeploymentStatus {
    pub id: String,
    #[serde(rename = "status")]
    pub state: String,
    pub message: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
pub struct DeploymentResource {
    pub id: String,
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, SimpleObject)]
pub struct DeployKey {
    pub team: String,
    pub key: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentFilter {
    pub team: Option<String>,
    pub cluster: Option<String>,
    pub limit: Option<usize>,
}

impl DeploymentFilter {
    pub fn team(team: &str) -> Self {
        Self {
            team: Some(team.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait DeploymentHistory: Send + Sync {
    /// Deployments matching `filter`, newest first.
    async fn deployments(&self, filter: &DeploymentFilter) -> anyhow::Result<Vec<Deployment>>;

    async fn deploy_key(&self, team: &str) -> anyhow::Result<DeployKey>;
}

#[derive(Deserialize)]
struct DeploymentsResponse {
    deployments: Vec<HookdDeployment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HookdDeployment {
    deployment_info: DeploymentInfo,
    #[serde(default)]
    statuses: Vec<DeploymentStatus>,
    #[serde(default)]
    resources: Vec<DeploymentResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentInfo {
    id: String,
    team: String,
    cluster: String,
    created: DateTime<Utc>,
    github_repository: Option<String>,
}

impl From<HookdDeployment> for Deployment {
    fn from(d: HookdDeployment) -> Self {
        Self {
            id: d.deployment_info.id,
            team: d.deployment_info.team,
            env: d.deployment_info.cluster,
            created: d.deployment_info.created,
            repository: d.deployment_info.github_repository.filter(|r| !r.is_empty()),
            statuses: d.statuses,
            resources: d.resources,
        }
    }
}

pub struct HookdClient {
    client: Client,
    base_url: Url,
    psk: String,
}

impl HookdClient {
    pub fn new(base_url: Url, psk: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url,
            psk: psk.into(),
        })
    }
}

#[async_trait]
impl DeploymentHistory for HookdClient {
    #[instrument(skip(self), err)]
    async fn deployments(&self, filter: &DeploymentFilter) -> anyhow::Result<Vec<Deployment>> {
        let mut url = super::endpoint(&self.base_url, "internal/api/v1/console/deployments")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(team) = &filter.team {
                query.append_pair("team", team);
            }
            if let Some(cluster) = &filter.cluster {
                query.append_pair("cluster", cluster);
            }
            if let Some(limit) = filter.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }

        let response = self.client.get(url).header(PSK_HEADER, &self.psk).send().await?;
        let body: DeploymentsResponse = super::error_for_status(response).await?.json().await?;

        let mut deployments: Vec<Deployment> = body.deployments.into_iter().map(Deployment::from).collect();
        deployments.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(deployments)
    }

    #[instrument(skip(self), err)]
    async fn deploy_key(&self, team: &str) -> anyhow::Result<DeployKey> {
        let url = super::endpoint(&self.base_url, &format!("internal/api/v1/console/apikey/{}", urlencoding::encode(team)))?;
        let response = self.client.get(url).header(PSK_HEADER, &self.psk).send().await?;
        Ok(super::error_for_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn deploy(id: &str, created: &str, app: &str) -> serde_json::Value {
        json!({
            "deploymentInfo": {
                "id": id,
                "team": "devteam",
                "cluster": "dev-gcp",
                "created": created,
                "githubRepository": "navikt/app"
            },
            "statuses": [
                { "id": format!("{id}-s"), "status": "success", "message": "done", "created": created }
            ],
            "resources": [
                { "id": format!("{id}-r"), "group": "nais.io", "kind": "Application", "name": app, "namespace": "devteam", "version": "v1alpha1" }
            ]
        })
    }

    #[tokio::test]
    async fn fetches_deployments_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/api/v1/console/deployments"))
            .and(query_param("team", "devteam"))
            .and(header("X-PSK", "psk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deployments": [
                    deploy("old", "2024-01-01T10:00:00Z", "a"),
                    deploy("new", "2024-02-01T10:00:00Z", "b")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HookdClient::new(Url::parse(&server.uri()).unwrap(), "psk", Duration::from_secs(5)).unwrap();
        let deployments = client.deployments(&DeploymentFilter::team("devteam")).await.unwrap();

        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[0].id, "new");
        assert_eq!(deployments[0].env, "dev-gcp");
        assert_eq!(deployments[0].statuses[0].state, "success");
        assert!(deployments[0].touches("Application", "b"));
        assert!(!deployments[0].touches("Application", "a"));
    }

    #[tokio::test]
    async fn rejected_psk_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = HookdClient::new(Url::parse(&server.uri()).unwrap(), "wrong", Duration::from_secs(5)).unwrap();
        assert!(client.deployments(&DeploymentFilter::default()).await.is_err());
    }

    #[tokio::test]
    async fn fetches_deploy_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/api/v1/console/apikey/devteam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "team": "devteam",
                "key": "abc",
                "created": "2024-01-01T00:00:00Z",
                "expires": "2025-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = HookdClient::new(Url::parse(&server.uri()).unwrap(), "psk", Duration::from_secs(5)).unwrap();
        assert_eq!(client.deploy_key("devteam").await.unwrap().key, "abc");
    }
}
