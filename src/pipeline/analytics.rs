// src/pipeline/analytics.rs

//! Analytics stage: load both datasets, compute, report.

use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AnalyticsConfig, AnalyticsReport, CompletionMessage};
use crate::queue::{Delivery, MessageQueue};
use crate::services::analytics;
use crate::storage::ObjectStore;
use crate::utils;

/// Load the mirrored datasets from `store` and run all three analyses.
pub async fn run_analytics(
    store: &dyn ObjectStore,
    config: &AnalyticsConfig,
    run_id: Option<Uuid>,
) -> Result<AnalyticsReport> {
    let series_key = config.series_key.as_str();
    let population_key = config.population_key.as_str();

    let series_bytes = load(store, series_key).await?;
    let text = String::from_utf8_lossy(&series_bytes);
    let series = analytics::parse_series_table(&text, series_key)?;
    log::info!("Loaded {} series rows from {}", series.len(), series_key);

    let population = analytics::parse_population(&load(store, population_key).await?, population_key)?;
    log::info!(
        "Loaded {} population rows from {}",
        population.len(),
        population_key
    );

    let population_stats =
        analytics::population_stats(&population, config.year_from, config.year_to)?;
    let best_years = analytics::best_year_per_series(&series, &config.best_year_periods);
    let joined = analytics::join_series_population(
        &series,
        &population,
        &config.join_series_id,
        &config.join_period,
    );

    Ok(AnalyticsReport {
        run_id,
        population_stats,
        best_years,
        joined,
    })
}

async fn load(store: &dyn ObjectStore, key: &str) -> Result<Vec<u8>> {
    store
        .get(key)
        .await?
        .ok_or_else(|| AppError::dataset(key, "object not found"))
}

/// What the consumer is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Processing { run_id: Uuid },
}

/// Queue-driven analytics consumer.
///
/// A message is acknowledged only after every analysis succeeds; anything
/// else leaves it for redelivery and, eventually, the dead-letter path.
pub struct AnalyticsConsumer {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn MessageQueue>,
    config: AnalyticsConfig,
    state: Mutex<ConsumerState>,
}

impl AnalyticsConsumer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn MessageQueue>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run the analyses for one completion message.
    pub async fn process(&self, message: &CompletionMessage) -> Result<AnalyticsReport> {
        self.set_state(ConsumerState::Processing {
            run_id: message.run_id,
        });
        log::info!(
            "Processing run {} ({} uploaded, {} skipped)",
            message.run_id,
            message.summary.uploaded,
            message.summary.skipped
        );
        let result = run_analytics(self.store.as_ref(), &self.config, Some(message.run_id)).await;
        self.set_state(ConsumerState::Idle);

        let report = result?;
        utils::log::analytics_report(&report, self.config.report_limit);
        Ok(report)
    }

    /// Parse and process a raw delivery without acknowledging it.
    pub async fn handle(&self, delivery: &Delivery) -> Result<AnalyticsReport> {
        let message = delivery.parse().map_err(|e| {
            AppError::queue(format!(
                "message {} has an unreadable body: {e}",
                delivery.message_id
            ))
        })?;
        self.process(&message).await
    }

    /// Receive at most one message, process it and ack on success.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub async fn poll_once(&self) -> Result<Option<AnalyticsReport>> {
        let Some(delivery) = self.queue.receive().await? else {
            return Ok(None);
        };

        match self.handle(&delivery).await {
            Ok(report) => {
                self.queue.ack(&delivery).await?;
                Ok(Some(report))
            }
            Err(e) => {
                log::warn!(
                    "Message {} failed on receive {}; leaving it for redelivery: {}",
                    delivery.message_id,
                    delivery.receive_count,
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunCounters;
    use crate::queue::MemoryQueue;
    use crate::storage::LocalStorage;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    const SERIES: &str = "series_id\tyear\tperiod\tvalue\tfootnote_codes\n\
        PRS30006032\t2017\tQ01\t0.8\t\n\
        PRS30006032\t2018\tQ01\t1.9\t\n\
        PRS30006032\t2018\tQ02\t0.4\t\n\
        PRS30006011\t2018\tQ01\t2.5\t\n";

    const POPULATION: &str = r#"{"metadata": {"total_records": 6}, "data": [
        {"Year": "2013", "Population": 316128839},
        {"Year": "2014", "Population": 318857056},
        {"Year": "2015", "Population": 321418821},
        {"Year": "2016", "Population": 323127515},
        {"Year": "2017", "Population": 325719178},
        {"Year": "2018", "Population": 327167439}
    ]}"#;

    async fn seeded(tmp: &TempDir) -> Arc<LocalStorage> {
        let store = Arc::new(LocalStorage::new(tmp.path()));
        let config = AnalyticsConfig::default();
        store
            .put_bytes(&config.series_key, SERIES.as_bytes().to_vec(), "text/plain", None)
            .await
            .unwrap();
        store
            .put_bytes(
                &config.population_key,
                POPULATION.as_bytes().to_vec(),
                "application/json",
                None,
            )
            .await
            .unwrap();
        store
    }

    fn message() -> CompletionMessage {
        CompletionMessage::new(RunCounters::default().snapshot(
            Uuid::new_v4(),
            Utc::now(),
            false,
            1,
        ))
    }

    #[tokio::test]
    async fn test_run_analytics_over_store() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(&tmp).await;

        let report = run_analytics(store.as_ref(), &AnalyticsConfig::default(), None)
            .await
            .unwrap();

        assert_eq!(report.population_stats.count, 6);
        assert_eq!(report.best_years.len(), 2);
        assert_eq!(report.joined.len(), 2);
        assert_eq!(report.joined[1].year, 2018);
        assert_eq!(report.joined[1].population, 327167439.0);
    }

    #[tokio::test]
    async fn test_poll_acks_on_success() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(&tmp).await;
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 3));
        let sent = message();
        queue.enqueue(&sent).await.unwrap();

        let consumer = AnalyticsConsumer::new(store, queue.clone(), AnalyticsConfig::default());
        let report = consumer.poll_once().await.unwrap().unwrap();

        assert_eq!(report.run_id, Some(sent.run_id));
        assert_eq!(consumer.state(), ConsumerState::Idle);
        assert!(queue.is_empty());
        assert!(consumer.poll_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_dataset_dead_letters_after_limit() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::new(tmp.path()));
        let queue = Arc::new(MemoryQueue::new(Duration::ZERO, 2));
        queue.enqueue(&message()).await.unwrap();

        let consumer = AnalyticsConsumer::new(store, queue.clone(), AnalyticsConfig::default());
        for _ in 0..2 {
            let err = consumer.poll_once().await.unwrap_err();
            assert!(matches!(err, AppError::Dataset { .. }));
            assert_eq!(consumer.state(), ConsumerState::Idle);
        }

        assert!(consumer.poll_once().await.unwrap().is_none());
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_body_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let consumer = AnalyticsConsumer::new(
            seeded(&tmp).await,
            Arc::new(MemoryQueue::new(Duration::ZERO, 3)),
            AnalyticsConfig::default(),
        );
        let delivery = Delivery {
            receipt: "r".into(),
            message_id: "m".into(),
            receive_count: 1,
            body: "not json".into(),
        };
        assert!(consumer.handle(&delivery).await.is_err());
    }
}
