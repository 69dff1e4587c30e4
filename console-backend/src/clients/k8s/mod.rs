//! Live cluster state for every configured environment.
//!
//! Applications and Naisjobs are nais custom resources read as [`DynamicObject`]s; their pods are
//! regular [`Pod`]s labelled `app=<name>` in the team's namespace.

mod informers;
mod logs;

pub use informers::KubeClusters;
pub use logs::parse_log_line;

use async_graphql::{Enum, SimpleObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use serde_json::Value;

/// Label linking pods to the application or job that owns them.
pub const APP_LABEL: &str = "app";

/// Container waiting reasons that mean the instance will not become ready on its own.
const FAILING_REASONS: &[&str] = &["CrashLoopBackOff", "ImagePullBackOff", "ErrImagePull", "CreateContainerConfigError"];

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
#[graphql(complex)]
pub struct App {
    pub name: String,
    pub team: String,
    pub env: String,
    pub image: String,
    pub ingresses: Vec<String>,
    pub replicas: Replicas,
    pub resources: Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SimpleObject)]
pub struct Replicas {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleObject)]
pub struct Resources {
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
#[graphql(complex)]
pub struct Job {
    pub name: String,
    pub team: String,
    pub env: String,
    pub image: String,
    pub schedule: Option<String>,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Failing,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct Instance {
    pub name: String,
    pub env: String,
    pub team: String,
    pub app: String,
    pub image: String,
    pub restarts: i32,
    pub state: InstanceState,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct LogLine {
    pub time: DateTime<Utc>,
    pub message: String,
    pub instance: String,
}

pub type LogLines = BoxStream<'static, anyhow::Result<LogLine>>;

#[async_trait]
pub trait ClusterState: Send + Sync {
    /// Environments (clusters) this provider watches.
    fn environments(&self) -> Vec<String>;

    /// Applications in `env`, optionally restricted to one team.
    async fn apps(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<App>>;

    /// Naisjobs in `env`, optionally restricted to one team.
    async fn jobs(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<Job>>;

    /// Pods belonging to the application or job `name`.
    async fn instances(&self, env: &str, team: &str, name: &str) -> anyhow::Result<Vec<Instance>>;

    /// Follow the log of one container of `pod`, starting `tail_lines` back.
    async fn logs(&self, env: &str, team: &str, pod: &str, container: &str, tail_lines: i64) -> anyhow::Result<LogLines>;
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Kubernetes quantities may be strings or bare numbers.
fn quantity_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn app_from_object(env: &str, object: &DynamicObject) -> Option<App> {
    let spec = object.data.get("spec")?;
    Some(App {
        name: object.metadata.name.clone()?,
        team: object.metadata.namespace.clone()?,
        env: env.to_string(),
        image: str_at(spec, "/image").unwrap_or_default().to_string(),
        ingresses: spec
            .get("ingresses")
            .and_then(Value::as_array)
            .map(|ingresses| ingresses.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        replicas: Replicas {
            min: spec.pointer("/replicas/min").and_then(Value::as_i64).unwrap_or(2) as i32,
            max: spec.pointer("/replicas/max").and_then(Value::as_i64).unwrap_or(4) as i32,
        },
        resources: Resources {
            cpu_request: quantity_at(spec, "/resources/requests/cpu"),
            memory_request: quantity_at(spec, "/resources/requests/memory"),
            cpu_limit: quantity_at(spec, "/resources/limits/cpu"),
            memory_limit: quantity_at(spec, "/resources/limits/memory"),
        },
    })
}

pub fn job_from_object(env: &str, object: &DynamicObject) -> Option<Job> {
    let spec = object.data.get("spec")?;
    Some(Job {
        name: object.metadata.name.clone()?,
        team: object.metadata.namespace.clone()?,
        env: env.to_string(),
        image: str_at(spec, "/image").unwrap_or_default().to_string(),
        schedule: str_at(spec, "/schedule").filter(|s| !s.is_empty()).map(str::to_string),
    })
}

pub fn instance_from_pod(env: &str, pod: &Pod) -> Option<Instance> {
    let app = pod.metadata.labels.as_ref()?.get(APP_LABEL)?.clone();
    let spec = pod.spec.as_ref()?;
    let status = pod.status.as_ref();

    let container = spec
        .containers
        .iter()
        .find(|c| c.name == app)
        .or_else(|| spec.containers.first());

    let container_statuses = status.and_then(|s| s.container_statuses.as_deref()).unwrap_or_default();
    let restarts = container_statuses.iter().map(|c| c.restart_count).sum();

    let failing = container_statuses.iter().any(|c| {
        c.state
            .as_ref()
            .and_then(|state| state.waiting.as_ref())
            .and_then(|waiting| waiting.reason.as_deref())
            .is_some_and(|reason| FAILING_REASONS.contains(&reason))
    });
    let running = status.and_then(|s| s.phase.as_deref()) == Some("Running") && container_statuses.iter().all(|c| c.ready);

    let state = if failing {
        InstanceState::Failing
    } else if running {
        InstanceState::Running
    } else {
        InstanceState::Unknown
    };

    Some(Instance {
        name: pod.metadata.name.clone()?,
        env: env.to_string(),
        team: pod.metadata.namespace.clone()?,
        app,
        image: container.and_then(|c| c.image.clone()).unwrap_or_default(),
        restarts,
        state,
        created: pod
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|time| time.0),
    })
}
