//! Periodic ingestion of daily costs from the cost export into the [`CostStore`].

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use url::Url;

use super::{CostStore, DATE_FORMAT};
use crate::{
    clients::{error_for_status, http_client},
    db::models::costs::CostRecord,
    metrics,
};

/// Source of daily cost rows.
#[async_trait]
pub trait CostFetcher: Send + Sync {
    /// Rows dated on or after `from`, or every row when `from` is `None`.
    async fn fetch(&self, from: Option<NaiveDate>) -> anyhow::Result<Vec<CostRecord>>;
}

/// Reads the cost export over HTTP. The export answers `GET <url>?from=YYYY-MM-DD` with a JSON
/// array of records.
pub struct CostExportClient {
    url: Url,
    client: Client,
}

impl CostExportClient {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            url,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl CostFetcher for CostExportClient {
    #[instrument(skip(self))]
    async fn fetch(&self, from: Option<NaiveDate>) -> anyhow::Result<Vec<CostRecord>> {
        let mut url = self.url.clone();
        if let Some(from) = from {
            url.query_pairs_mut().append_pair("from", &from.format(DATE_FORMAT).to_string());
        }
        let response = self.client.get(url).send().await?;
        error_for_status(response)
            .await?
            .json()
            .await
            .context("Failed to decode cost export")
    }
}

pub struct CostUpdater {
    store: Arc<dyn CostStore>,
    fetcher: Arc<dyn CostFetcher>,
    interval: Duration,
}

impl CostUpdater {
    pub fn new(store: Arc<dyn CostStore>, fetcher: Arc<dyn CostFetcher>, interval: Duration) -> Self {
        Self { store, fetcher, interval }
    }

    /// Run one update per interval, starting immediately, until `shutdown` is cancelled.
    /// A failed update is logged and retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = %humantime::format_duration(self.interval), "Starting cost updater");
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cost updater shutting down");
                    return;
                }
                _ = timer.tick() => {}
            }

            match self.update_once().await {
                Ok(0) => debug!("No new cost rows"),
                Ok(count) => info!(count, "Stored new cost rows"),
                Err(e) => error!("Cost update failed: {e:#}"),
            }
        }
    }

    /// Fetch rows newer than the latest stored date and upsert them. Returns the rows written.
    pub async fn update_once(&self) -> anyhow::Result<u64> {
        let latest = metrics::instrument("database", "latest_cost_date", self.store.latest_date()).await?;
        let from = latest.and_then(|date| date.succ_opt());

        let records = metrics::instrument("cost_export", "fetch", self.fetcher.fetch(from)).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let written = metrics::instrument("database", "upsert_costs", self.store.upsert(&records)).await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeCostStore, cost_record};
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    #[derive(Default)]
    struct FakeFetcher {
        rows: Vec<CostRecord>,
        requested: Mutex<Vec<Option<NaiveDate>>>,
        fail: bool,
    }

    #[async_trait]
    impl CostFetcher for FakeFetcher {
        async fn fetch(&self, from: Option<NaiveDate>) -> anyhow::Result<Vec<CostRecord>> {
            self.requested.lock().unwrap().push(from);
            if self.fail {
                anyhow::bail!("export unavailable");
            }
            Ok(self
                .rows
                .iter()
                .filter(|row| from.is_none_or(|from| row.date >= from))
                .cloned()
                .collect())
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[tokio::test]
    async fn fetches_rows_after_latest_stored_date() {
        let store = Arc::new(FakeCostStore::with_records(vec![cost_record("dev", "a", "app", "2024-05-01", 1.0)]));
        let fetcher = Arc::new(FakeFetcher {
            rows: vec![
                cost_record("dev", "a", "app", "2024-05-01", 1.0),
                cost_record("dev", "a", "app", "2024-05-02", 2.0),
                cost_record("dev", "a", "app", "2024-05-03", 3.0),
            ],
            ..Default::default()
        });
        let updater = CostUpdater::new(store.clone(), fetcher.clone(), Duration::from_secs(60));

        assert_eq!(updater.update_once().await.unwrap(), 2);
        assert_eq!(*fetcher.requested.lock().unwrap(), vec![Some(date("2024-05-02"))]);
        assert_eq!(store.records().len(), 3);

        // Nothing newer on the second run
        assert_eq!(updater.update_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_store_fetches_everything() {
        let store = Arc::new(FakeCostStore::default());
        let fetcher = Arc::new(FakeFetcher {
            rows: vec![cost_record("dev", "a", "app", "2024-05-01", 1.0)],
            ..Default::default()
        });
        let updater = CostUpdater::new(store.clone(), fetcher.clone(), Duration::from_secs(60));

        assert_eq!(updater.update_once().await.unwrap(), 1);
        assert_eq!(*fetcher.requested.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn failed_fetch_writes_nothing() {
        let store = Arc::new(FakeCostStore::default());
        let fetcher = Arc::new(FakeFetcher {
            fail: true,
            ..Default::default()
        });
        let updater = CostUpdater::new(store.clone(), fetcher, Duration::from_secs(60));

        assert!(updater.update_once().await.is_err());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(FakeCostStore::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let updater = CostUpdater::new(store, fetcher.clone(), Duration::from_secs(3600));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(updater.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // The first tick fires immediately
        assert_eq!(fetcher.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn export_client_passes_from_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/daily"))
            .and(query_param("from", "2024-05-02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "env": "dev",
                "team_slug": "a",
                "app": "app",
                "cost_type": "Compute Engine",
                "date": "2024-05-02",
                "daily_cost": 1.5
            }])))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/daily", server.uri())).unwrap();
        let client = CostExportClient::new(url, Duration::from_secs(5)).unwrap();
        let rows = client.fetch(Some(date("2024-05-02"))).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].team, "a");
        assert_eq!(rows[0].cost, 1.5);
    }
}
