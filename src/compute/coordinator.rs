//! Dispatches partitions to a fixed worker pool and merges what finishes in time.

use anyhow::Result;
use csv::StringRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::aggregate::{ArcSpeedAggregator, PartialResult};
use super::estimator::SpeedReport;
use super::partition::PartitionManager;
use super::processor::PartitionProcessor;
use crate::config::EngineConfig;
use crate::stats::ProcessingStats;
use crate::topology::RouteGraphs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Partitioned,
    Dispatched,
    Collecting,
    Done,
}

/// Simulates a distributed job on one process.
///
/// Results are best effort: partitions still running at the deadline are
/// cancelled and contribute nothing.
pub struct ComputeCoordinator {
    partition_manager: PartitionManager,
    workers: usize,
    timeout: Duration,
    config: Arc<EngineConfig>,
}

impl ComputeCoordinator {
    pub fn new(
        partition_manager: PartitionManager,
        workers: usize,
        timeout: Duration,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            partition_manager,
            workers: workers.max(1),
            timeout,
            config,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(rows = rows.len(), workers = self.workers, timeout_secs = self.timeout.as_secs())
    )]
    pub async fn run_job(&self, rows: Vec<StringRecord>, graphs: Arc<RouteGraphs>) -> SpeedReport {
        let started = Instant::now();

        let partitions = self.partition_manager.create_partitions(rows);
        let total = partitions.len();
        transition(JobState::Partitioned, total);

        let pool = Arc::new(Semaphore::new(self.workers));
        let cancel = CancellationToken::new();
        let mut tasks: JoinSet<Result<Option<PartialResult>>> = JoinSet::new();

        for partition in partitions {
            let pool = pool.clone();
            let cancel = cancel.clone();
            let graphs = graphs.clone();
            let config = self.config.clone();

            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await?;
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let partial = tokio::task::spawn_blocking(move || {
                    PartitionProcessor::new(&graphs, &config).process(&partition, &cancel)
                })
                .await?;
                Ok(partial)
            });
        }
        transition(JobState::Dispatched, total);
        // Collection budget starts once every partition is submitted.
        let deadline = Instant::now() + self.timeout;

        let aggregator = ArcSpeedAggregator::new();
        let mut stats = ProcessingStats::default();
        let mut received = 0;
        let mut failed = 0;

        transition(JobState::Collecting, total);
        while received + failed < total {
            if Instant::now() >= deadline {
                warn!(received, total, "Deadline reached before all partitions reported");
                break;
            }
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(Ok(Some(partial))))) => {
                    aggregator.merge(&partial);
                    stats.merge(partial.stats());
                    received += 1;
                    debug!(
                        partition = partial.partition_id(),
                        arcs = partial.arcs().len(),
                        received,
                        total,
                        "Partial result merged"
                    );
                }
                Ok(Some(Ok(Ok(None)))) => {
                    warn!("Partition finished without a result");
                    failed += 1;
                }
                Ok(Some(Ok(Err(e)))) => {
                    error!(error = %e, "Partition task failed");
                    failed += 1;
                }
                Ok(Some(Err(e))) => {
                    error!(error = %e, "Partition task panicked or was aborted");
                    failed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(received, total, "Deadline reached before all partitions reported");
                    break;
                }
            }
        }

        // Unfinished partitions are dropped.
        cancel.cancel();
        tasks.abort_all();
        transition(JobState::Done, total);

        let averages = aggregator.finalize_averages();
        info!(
            arcs = averages.len(),
            received,
            failed,
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );

        SpeedReport {
            averages,
            stats,
            partitions_received: received,
            partitions_total: total,
            elapsed: started.elapsed(),
        }
    }
}

fn transition(state: JobState, partitions: usize) {
    debug!(?state, partitions, "Job state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::datagram::tests::{meridian_graphs, north_deg, row};
    use crate::topology::builder::tests::{line, member, stop};
    use crate::topology::{ArcId, Orientation, build_graphs};
    use std::collections::HashMap;

    /// Two lines' worth of traffic on line 7, spread over several vehicles.
    fn rows() -> Vec<StringRecord> {
        let step = north_deg(500.0);
        let mut rows = Vec::new();
        for bus in 0..6 {
            let base = 3.401 + bus as f64 * 0.003;
            for i in 0..3 {
                rows.push(row(
                    &format!("B{bus}"),
                    "7",
                    &format!("2019-05-29 10:0{}:00", i),
                    base + i as f64 * step,
                    -76.50,
                ));
            }
        }
        rows
    }

    fn coordinator(workers: usize, timeout: Duration) -> ComputeCoordinator {
        ComputeCoordinator::new(
            PartitionManager::new(workers),
            workers,
            timeout,
            Arc::new(EngineConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_complete_run_merges_all_partitions() {
        let graphs = Arc::new(meridian_graphs());
        let report = coordinator(3, Duration::from_secs(30))
            .run_job(rows(), graphs)
            .await;

        assert!(report.is_complete());
        assert_eq!(report.partitions_total, 3);
        assert!(!report.averages.is_empty());
        assert_eq!(report.stats.rows_seen, 18);
        for speed in report.averages.values() {
            assert!(*speed > 0.0 && *speed < 200.0);
        }
    }

    #[tokio::test]
    async fn test_worker_count_does_not_change_result() {
        let graphs = Arc::new(meridian_graphs());
        let one = coordinator(1, Duration::from_secs(30))
            .run_job(rows(), graphs.clone())
            .await;
        let four = coordinator(4, Duration::from_secs(30))
            .run_job(rows(), graphs)
            .await;

        assert_eq!(one.averages.len(), four.averages.len());
        for (id, v) in &one.averages {
            assert!((v - four.averages[id]).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_returns_partial_without_blocking() {
        let graphs = Arc::new(meridian_graphs());
        let full = coordinator(2, Duration::from_secs(30))
            .run_job(rows(), graphs.clone())
            .await;

        let started = std::time::Instant::now();
        let partial = coordinator(2, Duration::ZERO)
            .run_job(rows(), graphs)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!partial.is_complete());
        assert!(partial.averages.len() < full.averages.len());
    }

    /// Line 7 from `meridian_graphs` plus line 8, a 300-stop line whose
    /// matching cost per pair is high.
    fn short_and_long_lines() -> RouteGraphs {
        let mut graphs = meridian_graphs();
        let lines = HashMap::from([(8, line(8))]);
        let stops: HashMap<_, _> = (1..=300)
            .map(|i| (1000 + i, stop(1000 + i, 3.40 + f64::from(i) * 0.001, -76.40)))
            .collect();
        let mut line_stops = Vec::new();
        for seq in 1..=300 {
            line_stops.push(member(seq, seq, Orientation::Outbound, 8, 1000 + seq, ""));
            line_stops.push(member(1000 + seq, seq, Orientation::Inbound, 8, 1301 - seq, ""));
        }
        graphs.extend(build_graphs(&lines, &stops, &line_stops));
        graphs
    }

    #[tokio::test]
    async fn test_deadline_keeps_finished_partition_and_drops_running_one() {
        let graphs = Arc::new(short_and_long_lines());
        let step = north_deg(100.0);

        let mut rows = Vec::new();
        for i in 0..3 {
            rows.push(row(
                "S1",
                "7",
                &format!("2019-05-29 10:00:{:02}", i * 10),
                3.401 + f64::from(i) * step,
                -76.50,
            ));
        }
        for bus in 0..1000 {
            for i in 0..100 {
                let secs = i * 10;
                rows.push(row(
                    &format!("L{bus}"),
                    "8",
                    &format!("2019-05-29 {:02}:{:02}:{:02}", 10 + secs / 3600, (secs / 60) % 60, secs % 60),
                    3.401 + f64::from(i) * step,
                    -76.40,
                ));
            }
        }

        let started = std::time::Instant::now();
        let report = coordinator(2, Duration::from_millis(100))
            .run_job(rows, graphs)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.partitions_total, 2);
        assert_eq!(report.partitions_received, 1);
        assert!(!report.is_complete());
        assert_eq!(report.averages.len(), 1);
        let avg = report.averages[&ArcId::new(7, Orientation::Outbound, 1)];
        assert!((avg - 36.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_bus_split_across_partitions_counts_as_two_groups() {
        let graphs = Arc::new(meridian_graphs());
        let rows = vec![
            row("B1", "7", "2019-05-29 10:00:00", 3.401, -76.50),
            row("B1", "7", "2019-05-29 10:00:10", 3.402, -76.50),
            row("B1", "8", "2019-05-29 10:00:20", 3.403, -76.50),
        ];
        let report = coordinator(2, Duration::from_secs(30))
            .run_job(rows, graphs)
            .await;

        assert!(report.is_complete());
        assert_eq!(report.stats.vehicle_groups, 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let graphs = Arc::new(meridian_graphs());
        let report = coordinator(2, Duration::from_secs(5))
            .run_job(Vec::new(), graphs)
            .await;

        assert!(report.is_complete());
        assert!(report.averages.is_empty());
    }
}
