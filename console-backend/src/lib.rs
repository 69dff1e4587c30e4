//! # console-backend: GraphQL backend for the platform console
//!
//! `console-backend` is a backend-for-frontend. It exposes a single GraphQL API to the console
//! frontend and answers it by aggregating data the platform already keeps elsewhere:
//!
//! - the **teams backend** for teams, their members and users
//! - **hookd** for deployment history and deploy keys
//! - one **Kubernetes cluster per environment** for applications, jobs, pods and their logs
//! - **DependencyTrack** for vulnerability findings per container image
//! - a **Postgres** database holding daily cost and hourly resource utilization
//!
//! ## Architecture
//!
//! A request flows through three layers:
//!
//! 1. [`graphql`] parses the query and authenticates the caller through [`auth`]
//! 2. [`resolvers`] validate arguments, fan out to the collaborators in [`clients`] and [`db`]
//!    concurrently, join the results and establish ordering
//! 3. the pure cores ([`pagination`], [`costs::normalize`], [`utilization`], [`vulnerabilities`],
//!    [`search`]) slice and reshape the joined data
//!
//! Collaborators sit behind traits so the resolvers can be tested against in-memory fakes.
//! Slow-changing collaborator data (the team list, vulnerability summaries) is kept in a
//! [`cache::TtlCache`].
//!
//! Alongside the HTTP server, a [`costs::updater::CostUpdater`] periodically ingests new rows from
//! the cost export, and the cluster reflectors keep their in-memory view of every environment
//! current.
//!
//! ## Running
//!
//! ```bash
//! console-backend -f config.yaml
//! ```
//!
//! Configuration is described in [`config`].

pub mod auth;
pub mod cache;
pub mod clients;
pub mod config;
pub mod costs;
pub mod db;
pub mod errors;
pub mod graphql;
pub mod metrics;
pub mod pagination;
pub mod resolvers;
pub mod search;
pub mod telemetry;
pub mod types;
pub mod utilization;
pub mod vulnerabilities;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use axum::{Router, http, http::HeaderValue, routing::get};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::PgPool;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};

use crate::{
    auth::Authenticator,
    clients::{
        dependencytrack::DependencyTrackClient,
        hookd::HookdClient,
        k8s::KubeClusters,
        teams::{CachedTeams, TeamsClient},
    },
    config::CorsOrigin,
    costs::updater::{CostExportClient, CostUpdater},
    db::handlers::{costs::PgCostStore, utilization::PgUtilizationStore},
    graphql::ConsoleSchema,
    resolvers::Services,
};
pub use config::Config;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .authenticator(Arc::new(authenticator))
///     .schema(graphql::build_schema(services))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub authenticator: Arc<Authenticator>,
    pub schema: ConsoleSchema,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router: GraphQL endpoints, health check, optional Prometheus metrics, CORS and
/// request tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .merge(graphql::routes::router())
        .route("/healthz", get(|| async { "OK" }))
        .with_state(state)
        .layer(cors_layer);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

        // HTTP metrics from axum-prometheus followed by the collaborator metrics
        router = router
            .route(
                "/internal/metrics",
                get(|| async move {
                    let mut body = metric_handle.render();
                    body.push_str(&metrics::render());
                    body
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Tasks running next to the HTTP server: the cost updater and the cluster reflectors.
///
/// Dropping this cancels the shutdown token, which stops every task.
pub struct BackgroundServices {
    tasks: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    _drop_guard: tokio_util::sync::DropGuard,
}

impl BackgroundServices {
    fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            _drop_guard: shutdown_token.clone().drop_guard(),
            shutdown_token,
        }
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.tasks {
            let _ = handle.await;
        }
    }
}

/// The assembled server.
///
/// 1. **Create**: [`Application::new`] opens the database pool, runs migrations, connects every
///    collaborator and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves, then stops background services
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting console backend with configuration: {:#?}", config);

        let pool = db::create_pool(&config.database)?;
        if config.database.run_migrations {
            info!("Running database migrations");
            db::migrate(&pool).await?;
        }

        let shutdown_token = CancellationToken::new();
        let mut bg_services = BackgroundServices::new(shutdown_token.clone());
        let timeout = config.request_timeout;

        let teams_client = Arc::new(TeamsClient::new(&config.teams.url, config.teams.token.clone(), timeout)?);
        let teams = Arc::new(CachedTeams::new(teams_client, config.cache.teams_ttl));
        let hookd = Arc::new(HookdClient::new(config.hookd.url.clone(), config.hookd.psk.clone(), timeout)?);
        let clusters = Arc::new(KubeClusters::connect(&config.clusters, shutdown_token.clone()).await?);
        let dependencytrack = Arc::new(DependencyTrackClient::new(
            config.dependencytrack.url.clone(),
            config.dependencytrack.api_key.clone(),
            timeout,
        )?);
        let costs = Arc::new(PgCostStore::new(pool.clone()));
        let utilization = Arc::new(PgUtilizationStore::new(pool.clone()));

        if let Some(source_url) = &config.cost.source_url {
            let fetcher = Arc::new(CostExportClient::new(source_url.clone(), timeout)?);
            let updater = CostUpdater::new(costs.clone(), fetcher, config.cost.update_interval);
            bg_services.tasks.push(tokio::spawn(updater.run(shutdown_token.clone())));
        } else {
            info!("No cost source configured, cost ingestion disabled");
        }

        let services = Arc::new(
            Services::builder()
                .teams(teams)
                .deployments(hookd)
                .clusters(clusters)
                .vulnerabilities(dependencytrack)
                .costs(costs)
                .utilization(utilization)
                .vulnerabilities_ttl(config.cache.vulnerabilities_ttl)
                .log_tail_lines(config.log_tail_lines)
                .build(),
        );

        let state = AppState::builder()
            .config(config.clone())
            .authenticator(Arc::new(Authenticator::from_config(&config.auth, timeout)?))
            .schema(graphql::build_schema(services))
            .build();
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Console backend listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
