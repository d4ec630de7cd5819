//! Polling loop feeding the series registry
//!
//! Drives a `SampleSource` on a fixed interval, ingests each returned batch
//! as one tick, and runs the retention pass between ticks so trimming never
//! interleaves with in-flight retrieval.

use crate::models::{MetricReading, ObjectHandle};
use crate::registry::SeriesRegistry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// One owner object's readings for a single tick.
#[derive(Debug, Clone)]
pub struct PollBatch {
    pub owner: Arc<ObjectHandle>,
    pub readings: Vec<MetricReading>,
}

/// Source of raw samples, implemented against the management API by the
/// transport layer.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch the current readings for every monitored object.
    async fn poll(&self) -> Result<Vec<PollBatch>>;
}

/// Configuration for the polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Base polling interval (default: 5 seconds).
    pub interval: Duration,
    /// Maximum samples retained per series before tail trimming.
    pub max_samples: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_samples: 1000,
        }
    }
}

/// Polling loop that periodically ingests samples into the registry.
pub struct PollLoop {
    source: Arc<dyn SampleSource>,
    registry: Arc<SeriesRegistry>,
    config: PollConfig,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn SampleSource>,
        registry: Arc<SeriesRegistry>,
        config: PollConfig,
    ) -> Self {
        Self {
            source,
            registry,
            config,
        }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting sample polling loop"
        );

        let mut ticker = interval(self.config.interval);
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    match self.source.poll().await {
                        Ok(batches) => {
                            let mut ingested = 0usize;
                            for batch in &batches {
                                self.registry.ingest_tick(&batch.owner, &batch.readings);
                                ingested += batch.readings.len();
                            }
                            // Retention runs between ticks only.
                            self.registry.trim_all(self.config.max_samples);

                            cycle_count += 1;
                            if cycle_count % 12 == 0 {
                                // Every minute at the 5s default interval.
                                debug!(
                                    objects = batches.len(),
                                    samples = ingested,
                                    elapsed_ms = start.elapsed().as_millis(),
                                    "Poll cycle complete"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Poll failed, will retry next cycle");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sample polling loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectKind, SeriesId};
    use chrono::Utc;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedSource {
        owner: Arc<ObjectHandle>,
        next_ts: AtomicI64,
    }

    #[async_trait]
    impl SampleSource for FixedSource {
        async fn poll(&self) -> Result<Vec<PollBatch>> {
            let ts = self.next_ts.fetch_add(5, Ordering::SeqCst);
            Ok(vec![PollBatch {
                owner: self.owner.clone(),
                readings: vec![
                    MetricReading::new("cpu0", "0.5", ts),
                    MetricReading::new("cpu1", "0.7", ts),
                ],
            }])
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SampleSource for FailingSource {
        async fn poll(&self) -> Result<Vec<PollBatch>> {
            anyhow::bail!("transport down")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ingests_and_stops() {
        let registry = Arc::new(SeriesRegistry::new());
        let owner = registry.register_object(ObjectKind::Vm, "vm1", 1 << 30);
        let source = Arc::new(FixedSource {
            owner,
            next_ts: AtomicI64::new(Utc::now().timestamp()),
        });
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

        let poll_loop = PollLoop::new(source, registry.clone(), PollConfig::default());
        let handle = tokio::spawn(poll_loop.run(shutdown_rx));

        // Let a few ticks elapse on the paused clock.
        tokio::time::sleep(Duration::from_secs(16)).await;
        shutdown_tx.send(()).expect("send shutdown");
        handle.await.expect("loop task");

        let avg = SeriesId::new(ObjectKind::Vm, "vm1", "avg_cpu");
        let samples = registry.samples(&avg);
        assert!(samples.len() >= 3);
        assert!((samples[0].value - 60.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_source_errors() {
        let registry = Arc::new(SeriesRegistry::new());
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

        let poll_loop = PollLoop::new(Arc::new(FailingSource), registry.clone(), PollConfig::default());
        let handle = tokio::spawn(poll_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        shutdown_tx.send(()).expect("send shutdown");
        handle.await.expect("loop task");

        assert!(registry.is_empty());
    }

    #[test]
    fn test_poll_config_default() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.max_samples, 1000);
    }
}
