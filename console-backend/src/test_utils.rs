//! In-memory collaborators and state builders for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::StreamExt;

use crate::{
    AppState,
    auth::{Authenticator, CurrentUser},
    clients::{
        hookd::{DeployKey, Deployment, DeploymentFilter, DeploymentHistory, DeploymentResource, DeploymentStatus},
        k8s::{App, ClusterState, Instance, InstanceState, Job, LogLine, LogLines, Replicas, Resources},
        teams::{Team, TeamMember, TeamRole, TeamsDirectory, User},
    },
    config::{AuthConfig, Config},
    costs::{CostFilter, CostStore, DATE_FORMAT, DateRange},
    db::{
        errors::Result as DbResult,
        models::{
            costs::CostRecord,
            utilization::{UtilizationBounds, UtilizationSample},
        },
    },
    resolvers::Services,
    utilization::{ResourceType, UtilizationStore},
    vulnerabilities::{Finding, ImageFindings, VulnerabilitySource},
};

pub const TEST_USER: &str = "dev@example.com";

pub fn create_test_config() -> Config {
    Config {
        clusters: vec!["dev".to_string(), "prod".to_string()],
        auth: AuthConfig {
            static_user: Some(TEST_USER.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// One fake per collaborator. Tests replace the ones they care about and build [`Services`] or a
/// whole [`AppState`] from the result.
pub struct Fakes {
    pub teams: Arc<FakeTeams>,
    pub hookd: Arc<FakeHookd>,
    pub clusters: Arc<FakeClusters>,
    pub vulnerabilities: Arc<FakeVulnerabilities>,
    pub costs: Arc<FakeCostStore>,
    pub utilization: Arc<FakeUtilizationStore>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            teams: Arc::new(FakeTeams::default()),
            hookd: Arc::new(FakeHookd::default()),
            clusters: Arc::new(FakeClusters::new(&["dev", "prod"])),
            vulnerabilities: Arc::new(FakeVulnerabilities::default()),
            costs: Arc::new(FakeCostStore::default()),
            utilization: Arc::new(FakeUtilizationStore::default()),
        }
    }
}

impl Fakes {
    pub fn with_teams(mut self, teams: FakeTeams) -> Self {
        self.teams = Arc::new(teams);
        self
    }

    pub fn with_hookd(mut self, hookd: FakeHookd) -> Self {
        self.hookd = Arc::new(hookd);
        self
    }

    pub fn with_clusters(mut self, clusters: FakeClusters) -> Self {
        self.clusters = Arc::new(clusters);
        self
    }

    pub fn with_vulnerabilities(mut self, vulnerabilities: FakeVulnerabilities) -> Self {
        self.vulnerabilities = Arc::new(vulnerabilities);
        self
    }

    pub fn with_costs(mut self, costs: FakeCostStore) -> Self {
        self.costs = Arc::new(costs);
        self
    }

    pub fn with_utilization(mut self, utilization: FakeUtilizationStore) -> Self {
        self.utilization = Arc::new(utilization);
        self
    }

    pub fn services(&self) -> Arc<Services> {
        Arc::new(
            Services::builder()
                .teams(self.teams.clone())
                .deployments(self.hookd.clone())
                .clusters(self.clusters.clone())
                .vulnerabilities(self.vulnerabilities.clone())
                .costs(self.costs.clone())
                .utilization(self.utilization.clone())
                .log_tail_lines(10)
                .build(),
        )
    }

    pub fn state(&self) -> AppState {
        self.state_with_authenticator(Authenticator::Static(CurrentUser {
            email: TEST_USER.to_string(),
        }))
    }

    pub fn state_with_authenticator(&self, authenticator: Authenticator) -> AppState {
        AppState::builder()
            .config(create_test_config())
            .authenticator(Arc::new(authenticator))
            .schema(crate::graphql::build_schema(self.services()))
            .build()
    }

    pub fn server(&self) -> TestServer {
        let router = crate::build_router(self.state()).expect("Failed to build router");
        TestServer::new(router).expect("Failed to create test server")
    }
}

#[derive(Default)]
pub struct FakeTeams {
    teams: Vec<Team>,
    members: HashMap<String, Vec<TeamMember>>,
    team_list_calls: AtomicUsize,
    fail: bool,
}

impl FakeTeams {
    pub fn with_teams(slugs: &[&str]) -> Self {
        Self {
            teams: slugs.iter().map(|slug| team(slug)).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_member(mut self, slug: &str, email: &str, name: &str, role: TeamRole) -> Self {
        self.members.entry(slug.to_string()).or_default().push(TeamMember {
            user: User {
                id: format!("id-{email}"),
                email: email.to_string(),
                name: name.to_string(),
            },
            role,
        });
        self
    }

    pub fn team_list_calls(&self) -> usize {
        self.team_list_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("teams backend unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl TeamsDirectory for FakeTeams {
    async fn teams(&self) -> anyhow::Result<Vec<Team>> {
        self.team_list_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.teams.clone())
    }

    async fn team(&self, slug: &str) -> anyhow::Result<Option<Team>> {
        self.check()?;
        Ok(self.teams.iter().find(|t| t.slug == slug).cloned())
    }

    async fn members(&self, slug: &str) -> anyhow::Result<Vec<TeamMember>> {
        self.check()?;
        Ok(self.members.get(slug).cloned().unwrap_or_default())
    }

    async fn user(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.check()?;
        Ok(self
            .members
            .values()
            .flatten()
            .map(|m| &m.user)
            .find(|u| u.email == email)
            .cloned())
    }

    async fn user_teams(&self, email: &str) -> anyhow::Result<Vec<Team>> {
        self.check()?;
        Ok(self
            .teams
            .iter()
            .filter(|t| {
                self.members
                    .get(&t.slug)
                    .is_some_and(|members| members.iter().any(|m| m.user.email == email))
            })
            .cloned()
            .collect())
    }
}

pub fn team(slug: &str) -> Team {
    Team {
        slug: slug.to_string(),
        purpose: format!("{slug} purpose"),
        slack_channel: format!("#{slug}"),
    }
}

#[derive(Default)]
pub struct FakeHookd {
    deployments: Vec<Deployment>,
}

impl FakeHookd {
    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployments.push(deployment);
        self
    }
}

#[async_trait]
impl DeploymentHistory for FakeHookd {
    async fn deployments(&self, filter: &DeploymentFilter) -> anyhow::Result<Vec<Deployment>> {
        let mut deployments: Vec<Deployment> = self
            .deployments
            .iter()
            .filter(|d| filter.team.as_ref().is_none_or(|team| &d.team == team))
            .filter(|d| filter.cluster.as_ref().is_none_or(|env| &d.env == env))
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.created.cmp(&a.created));
        if let Some(limit) = filter.limit {
            deployments.truncate(limit);
        }
        Ok(deployments)
    }

    async fn deploy_key(&self, team: &str) -> anyhow::Result<DeployKey> {
        Ok(DeployKey {
            team: team.to_string(),
            key: format!("key-{team}"),
            created: at_minute(0),
            expires: at_minute(60),
        })
    }
}

fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
}

/// A deployment created `minute` minutes past noon that touched one resource.
pub fn deployment(id: &str, team: &str, env: &str, minute: u32, (kind, name): (&str, &str)) -> Deployment {
    Deployment {
        id: id.to_string(),
        team: team.to_string(),
        env: env.to_string(),
        created: at_minute(minute),
        repository: Some(format!("navikt/{name}")),
        statuses: vec![DeploymentStatus {
            id: format!("{id}-status"),
            state: "success".to_string(),
            message: None,
            created: at_minute(minute),
        }],
        resources: vec![DeploymentResource {
            id: format!("{id}-resource"),
            group: "nais.io".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: team.to_string(),
            version: "v1alpha1".to_string(),
        }],
    }
}

pub struct FakeClusters {
    environments: Vec<String>,
    apps: Vec<App>,
    jobs: Vec<Job>,
    instances: Vec<Instance>,
    logs: HashMap<String, Vec<LogLine>>,
    endless: HashSet<String>,
    failing: HashSet<String>,
    live_log_streams: Arc<()>,
}

impl FakeClusters {
    pub fn new(environments: &[&str]) -> Self {
        Self {
            environments: environments.iter().map(|e| e.to_string()).collect(),
            apps: Vec::new(),
            jobs: Vec::new(),
            instances: Vec::new(),
            logs: HashMap::new(),
            endless: HashSet::new(),
            failing: HashSet::new(),
            live_log_streams: Arc::new(()),
        }
    }

    pub fn with_app(mut self, app: App) -> Self {
        self.apps.push(app);
        self
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_logs(mut self, pod: &str, lines: Vec<LogLine>) -> Self {
        self.logs.insert(pod.to_string(), lines);
        self
    }

    /// Logs of `pod` never end.
    pub fn with_endless_logs(mut self, pod: &str) -> Self {
        self.endless.insert(pod.to_string());
        self
    }

    pub fn failing_env(mut self, env: &str) -> Self {
        self.failing.insert(env.to_string());
        self
    }

    /// Shared with every endless log stream while it is alive.
    pub fn live_log_streams(&self) -> Arc<()> {
        self.live_log_streams.clone()
    }

    fn check(&self, env: &str) -> anyhow::Result<()> {
        if self.failing.contains(env) {
            return Err(anyhow!("cluster {env} unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterState for FakeClusters {
    fn environments(&self) -> Vec<String> {
        self.environments.clone()
    }

    async fn apps(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<App>> {
        self.check(env)?;
        Ok(self
            .apps
            .iter()
            .filter(|a| a.env == env && team.is_none_or(|t| a.team == t))
            .cloned()
            .collect())
    }

    async fn jobs(&self, env: &str, team: Option<&str>) -> anyhow::Result<Vec<Job>> {
        self.check(env)?;
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.env == env && team.is_none_or(|t| j.team == t))
            .cloned()
            .collect())
    }

    async fn instances(&self, env: &str, team: &str, name: &str) -> anyhow::Result<Vec<Instance>> {
        self.check(env)?;
        Ok(self
            .instances
            .iter()
            .filter(|i| i.env == env && i.team == team && i.app == name)
            .cloned()
            .collect())
    }

    async fn logs(&self, env: &str, _team: &str, pod: &str, _container: &str, _tail_lines: i64) -> anyhow::Result<LogLines> {
        self.check(env)?;
        if self.endless.contains(pod) {
            let alive = self.live_log_streams.clone();
            return Ok(futures::stream::unfold(alive, |alive| async move {
                futures::future::pending::<()>().await;
                Some((Err(anyhow!("unreachable")), alive))
            })
            .boxed());
        }
        let lines = self.logs.get(pod).cloned().unwrap_or_default();
        Ok(futures::stream::iter(lines.into_iter().map(Ok)).boxed())
    }
}

pub fn app(env: &str, team: &str, name: &str, image: &str) -> App {
    App {
        name: name.to_string(),
        team: team.to_string(),
        env: env.to_string(),
        image: image.to_string(),
        ingresses: vec![format!("https://{name}.{env}.example.com")],
        replicas: Replicas { min: 2, max: 4 },
        resources: Resources::default(),
    }
}

pub fn job(env: &str, team: &str, name: &str) -> Job {
    Job {
        name: name.to_string(),
        team: team.to_string(),
        env: env.to_string(),
        image: format!("{name}:1"),
        schedule: Some("0 3 * * *".to_string()),
    }
}

pub fn instance(env: &str, team: &str, app: &str, name: &str) -> Instance {
    Instance {
        name: name.to_string(),
        env: env.to_string(),
        team: team.to_string(),
        app: app.to_string(),
        image: format!("{app}:1"),
        restarts: 0,
        state: InstanceState::Running,
        created: Some(at_minute(0)),
    }
}

pub fn log_line(instance: &str, message: &str) -> LogLine {
    LogLine {
        time: at_minute(0),
        message: message.to_string(),
        instance: instance.to_string(),
    }
}

#[derive(Default)]
pub struct FakeVulnerabilities {
    images: HashMap<String, ImageFindings>,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeVulnerabilities {
    pub fn with_image(mut self, image: &str, findings: Vec<Finding>) -> Self {
        self.images.insert(image.to_string(), ImageFindings { has_bom: true, findings });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VulnerabilitySource for FakeVulnerabilities {
    async fn findings(&self, image: &str) -> anyhow::Result<Option<ImageFindings>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("dependencytrack unavailable"));
        }
        Ok(self.images.get(image).cloned())
    }
}

pub fn finding(id: &str, severity: &str) -> Finding {
    Finding {
        id: id.to_string(),
        aliases: Vec::new(),
        component: "pkg:maven/org.example/lib@1.0".to_string(),
        severity: severity.to_string(),
    }
}

#[derive(Default)]
pub struct FakeCostStore {
    records: Mutex<Vec<CostRecord>>,
}

impl FakeCostStore {
    pub fn with_records(records: Vec<CostRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn records(&self) -> Vec<CostRecord> {
        self.records.lock().unwrap().clone()
    }
}

fn key(r: &CostRecord) -> (&str, &str, &str, &str, NaiveDate) {
    (&r.env, &r.team, &r.app, &r.cost_type, r.date)
}

#[async_trait]
impl CostStore for FakeCostStore {
    async fn daily_costs(&self, filter: &CostFilter, range: DateRange) -> DbResult<Vec<CostRecord>> {
        let mut records: Vec<CostRecord> = self
            .records()
            .into_iter()
            .filter(|r| filter.env.as_ref().is_none_or(|env| &r.env == env))
            .filter(|r| filter.team.as_ref().is_none_or(|team| &r.team == team))
            .filter(|r| filter.app.as_ref().is_none_or(|app| &r.app == app))
            .filter(|r| r.date >= range.from && r.date <= range.to)
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn latest_date(&self) -> DbResult<Option<NaiveDate>> {
        Ok(self.records.lock().unwrap().iter().map(|r| r.date).max())
    }

    async fn upsert(&self, new: &[CostRecord]) -> DbResult<u64> {
        let mut records = self.records.lock().unwrap();
        for record in new {
            match records.iter_mut().find(|r| key(r) == key(record)) {
                Some(existing) => existing.cost = record.cost,
                None => records.push(record.clone()),
            }
        }
        Ok(new.len() as u64)
    }
}

pub fn cost_record(env: &str, team: &str, app: &str, date: &str, cost: f64) -> CostRecord {
    CostRecord {
        env: env.to_string(),
        team: team.to_string(),
        app: app.to_string(),
        cost_type: "Compute Engine".to_string(),
        date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
        cost,
    }
}

#[derive(Default)]
pub struct FakeUtilizationStore {
    samples: Vec<(String, ResourceType, UtilizationSample)>,
}

impl FakeUtilizationStore {
    pub fn with_sample(mut self, team: &str, resource: ResourceType, sample: UtilizationSample) -> Self {
        self.samples.push((team.to_string(), resource, sample));
        self
    }

    fn matching(&self, team: &str, resource: ResourceType, start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = &UtilizationSample> {
        self.samples
            .iter()
            .filter(move |(t, r, s)| t == team && *r == resource && s.timestamp >= start && s.timestamp < end)
            .map(|(_, _, s)| s)
    }
}

#[async_trait]
impl UtilizationStore for FakeUtilizationStore {
    async fn app_samples(
        &self,
        env: &str,
        team: &str,
        app: &str,
        resource: ResourceType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<UtilizationSample>> {
        Ok(self
            .matching(team, resource, start, end)
            .filter(|s| s.env == env && s.app == app)
            .cloned()
            .collect())
    }

    async fn team_samples(&self, team: &str, resource: ResourceType, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<UtilizationSample>> {
        Ok(self.matching(team, resource, start, end).cloned().collect())
    }

    async fn bounds(&self) -> DbResult<UtilizationBounds> {
        let timestamps = || self.samples.iter().map(|(_, _, s)| s.timestamp);
        Ok(UtilizationBounds {
            start: timestamps().min(),
            end: timestamps().max(),
        })
    }
}

pub fn utilization_sample(env: &str, app: &str, timestamp: DateTime<Utc>, usage: f64, request: f64) -> UtilizationSample {
    UtilizationSample {
        env: env.to_string(),
        app: app.to_string(),
        timestamp,
        usage,
        request,
    }
}
