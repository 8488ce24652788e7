//! Common interface over the two execution strategies.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use super::aggregate::ArcSpeeds;
use super::coordinator::ComputeCoordinator;
use super::partition::PartitionManager;
use super::streaming::StreamingProcessor;
use crate::config::{EngineConfig, JobConfig};
use crate::parser::read_telemetry;
use crate::stats::ProcessingStats;
use crate::topology::RouteGraphs;

/// Averages per arc plus enough bookkeeping to tell a full run from a partial one.
#[derive(Debug, Clone, Default)]
pub struct SpeedReport {
    pub averages: ArcSpeeds,
    pub stats: ProcessingStats,
    pub partitions_received: usize,
    pub partitions_total: usize,
    pub elapsed: Duration,
}

impl SpeedReport {
    pub fn is_complete(&self) -> bool {
        self.partitions_received == self.partitions_total
    }
}

/// Computes arc speeds from one telemetry file.
#[async_trait]
pub trait SpeedEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn estimate(&self, telemetry: &Path, graphs: Arc<RouteGraphs>) -> Result<SpeedReport>;
}

/// Bounded mode: loads the rows, partitions them and runs a [`ComputeCoordinator`].
pub struct DistributedEstimator {
    config: Arc<EngineConfig>,
    job: JobConfig,
}

impl DistributedEstimator {
    pub fn new(config: Arc<EngineConfig>, job: JobConfig) -> Self {
        Self { config, job }
    }
}

#[async_trait]
impl SpeedEstimator for DistributedEstimator {
    fn name(&self) -> &'static str {
        "distributed"
    }

    async fn estimate(&self, telemetry: &Path, graphs: Arc<RouteGraphs>) -> Result<SpeedReport> {
        let path = telemetry.to_path_buf();
        let max_rows = self.job.max_rows;
        let rows = tokio::task::spawn_blocking(move || read_telemetry(&path, max_rows))
            .await
            .context("telemetry loader panicked")??;

        let coordinator = ComputeCoordinator::new(
            PartitionManager::new(self.job.partition_count()),
            self.job.workers,
            Duration::from_secs(self.job.timeout_secs),
            self.config.clone(),
        );
        Ok(coordinator.run_job(rows, graphs).await)
    }
}

/// Streaming mode: one sequential pass on a blocking thread.
pub struct StreamingEstimator {
    config: Arc<EngineConfig>,
}

impl StreamingEstimator {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeedEstimator for StreamingEstimator {
    fn name(&self) -> &'static str {
        "streaming"
    }

    async fn estimate(&self, telemetry: &Path, graphs: Arc<RouteGraphs>) -> Result<SpeedReport> {
        let path: PathBuf = telemetry.to_path_buf();
        let config = self.config.clone();
        let started = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || {
            StreamingProcessor::new(&graphs, &config).process_path(&path)
        })
        .await
        .context("streaming pass panicked")??;

        info!(vehicles = outcome.vehicles_tracked, "Vehicles tracked at end of stream");
        Ok(SpeedReport {
            averages: outcome.result.averages(),
            stats: outcome.result.stats().clone(),
            partitions_received: 1,
            partitions_total: 1,
            elapsed: started.elapsed(),
        })
    }
}
