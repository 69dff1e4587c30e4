use std::collections::HashMap;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api, Client, Resource,
    api::{ApiResource, DynamicObject, GroupVersionKind, LogParams},
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{
        WatchStreamExt, reflector,
        reflector::{Store, store::Writer},
        watcher,
    },
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::{APP_LABEL, App, ClusterState, Instance, Job, LogLines, app_from_object, instance_from_pod, job_from_object, logs};

/// Lines buffered per log stream before the reader is back-pressured.
const LOG_BUFFER: usize = 256;

fn application_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("nais.io", "v1alpha1", "Application"), "applications")
}

fn naisjob_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("nais.io", "v1", "Naisjob"), "naisjobs")
}

/// Reflector stores for one cluster.
struct Cluster {
    client: Client,
    apps: Store<DynamicObject>,
    jobs: Store<DynamicObject>,
    pods: Store<Pod>,
}

/// [`ClusterState`] backed by one set of reflectors per kubeconfig context.
pub struct KubeClusters {
    clusters: HashMap<String, Cluster>,
}

impl KubeClusters {
    /// Connect to every cluster named in `contexts` and start its reflectors. Reflectors stop when
    /// `shutdown` is cancelled.
    pub async fn connect(contexts: &[String], shutdown: CancellationToken) -> anyhow::Result<Self> {
        super::super::install_crypto_provider();
        let kubeconfig = Kubeconfig::read().ok();

        let mut clusters = HashMap::new();
        for context in contexts {
            let client = match &kubeconfig {
                Some(kubeconfig) => {
                    let options = KubeConfigOptions {
                        context: Some(context.clone()),
                        ..Default::default()
                    };
                    let config = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
                        .await
                        .with_context(|| format!("Failed to load kubeconfig context {context}"))?;
                    Client::try_from(config)?
                }
                // In-cluster: every environment shares the local API server
                None => Client::try_default().await.context("Failed to create in-cluster client")?,
            };

            info!(cluster = %context, "Starting informers");
            clusters.insert(context.clone(), Cluster::start(client, &shutdown));
        }

        Ok(Self { clusters })
    }

    fn cluster(&self, env: &str) -> anyhow::Result<&Cluster> {
        self.clusters.get(env).ok_or_else(|| anyhow!("unknown environment {env}"))
    }
}

impl Cluster {
    fn start(client: Client, shutdown: &CancellationToken) -> Self {
        let apps = spawn_dynamic_reflector(client.clone(), application_resource(), shutdown.clone());
        let jobs = spawn_dynamic_reflector(client.clone(), naisjob_resource(), shutdown.clone());

        let (pods, writer) = reflector::store::<Pod>();
        let api: Api<Pod> = Api::all(client.clone());
        let config = watcher::Config::default().labels(APP_LABEL);
        spawn_reflector("Pod", reflector(writer, watcher(api, config)).default_backoff(), shutdown.clone());

        Self { client, apps, jobs, pods }
    }
}

fn spawn_dynamic_reflector(client: Client, resource: ApiResource, shutdown: CancellationToken) -> Store<DynamicObject> {
    let writer = Writer::new(resource.clone());
    let store = writer.as_reader();
    let api: Api<DynamicObject> = Api::all_with(client, &resource);
    let stream = reflector(writer, watcher(api, watcher::Config::default())).default_backoff();
    spawn_reflector("nais resource", stream, shutdown);
    store
}

/// Drive a reflector stream until shutdown. Watch errors are logged; the backoff reconnects.
fn spawn_reflector<K, S>(kind: &'static str, stream: S, shutdown: CancellationToken)
where
    K: Resource + Send + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = std::pin::pin!(stream);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(kind, "Stopping reflector");
                    break;
                }
                event = stream.next() => match event {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => error!(kind, "Watcher error: {e}"),
                    None => break,
                }
            }
        }
    });
}

fn in_team(namespace: Option<&str>, team: Option<&str>) -> bool {
    team.is_none() || namespace == team
}

#[async_trait]
impl ClusterState for KubeClusters {
    fn environments(&self) -> Vec<String> {
        let mut envs: Vec<String> = self.clusters.keys().cloned().collect();
        envs.sort();
        envs
    }

    async fn apps(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<App>> {
        let cluster = self.cluster(env)?;
        Ok(cluster
            .apps
            .state()
            .iter()
            .filter(|object| in_team(object.metadata.namespace.as_deref(), team))
            .filter_map(|object| app_from_object(env, object))
            .collect())
    }

    async fn jobs(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<Job>> {
        let cluster = self.cluster(env)?;
        Ok(cluster
            .jobs
            .state()
            .iter()
            .filter(|object| in_team(object.metadata.namespace.as_deref(), team))
            .filter_map(|object| job_from_object(env, object))
            .collect())
    }

    async fn instances(&self, env: &str, team: &str, name: &str) -> anyhow::Result<Vec<Instance>> {
        let cluster = self.cluster(env)?;
        let mut instances: Vec<Instance> = cluster
            .pods
            .state()
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(team))
            .filter_map(|pod| instance_from_pod(env, pod))
            .filter(|instance| instance.app == name)
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    #[instrument(skip(self), err)]
    async fn logs(&self, env: &str, team: &str, pod: &str, container: &str, tail_lines: i64) -> anyhow::Result<LogLines> {
        let cluster = self.cluster(env)?;
        let api: Api<Pod> = Api::namespaced(cluster.client.clone(), team);
        let params = LogParams {
            container: Some(container.to_string()),
            follow: true,
            tail_lines: Some(tail_lines),
            timestamps: true,
            ..Default::default()
        };

        let pod = pod.to_string();

        // The reader borrows `api`, so both live in a task that forwards lines until the receiver
        // is dropped.
        let (tx, rx) = mpsc::channel(LOG_BUFFER);
        tokio::spawn(async move {
            let reader = match api.log_stream(&pod, &params).await {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            let mut lines = std::pin::pin!(logs::lines(reader, pod.clone()));
            loop {
                let line = tokio::select! {
                    _ = tx.closed() => break,
                    line = lines.next() => line,
                };
                let Some(line) = line else { break };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            debug!(pod = %pod, "Log follower stopped");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
