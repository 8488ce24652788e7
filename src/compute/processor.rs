//! Turns one partition of rows into a [`PartialResult`].

use csv::StringRecord;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::aggregate::PartialResult;
use super::datagram::{self, PairEvaluator};
use super::partition::DatagramPartition;
use crate::config::EngineConfig;
use crate::topology::RouteGraphs;

pub struct PartitionProcessor<'g> {
    evaluator: PairEvaluator<'g>,
}

impl<'g> PartitionProcessor<'g> {
    pub fn new(graphs: &'g RouteGraphs, config: &EngineConfig) -> Self {
        Self {
            evaluator: PairEvaluator::new(graphs, config),
        }
    }

    /// Groups rows by vehicle, orders each vehicle by timestamp and evaluates
    /// every consecutive pair.
    ///
    /// Returns `None` when `cancel` fires before the partition is done; a
    /// cancelled partition contributes nothing.
    pub fn process(
        &self,
        partition: &DatagramPartition,
        cancel: &CancellationToken,
    ) -> Option<PartialResult> {
        let mut result = PartialResult::new(partition.id());
        let stats = result.stats_mut();
        stats.rows_seen = partition.len() as u64;

        let mut by_bus: HashMap<&str, Vec<&StringRecord>> = HashMap::new();
        for row in partition.rows() {
            if let Err(e) = datagram::check_arity(row) {
                trace!(partition = partition.id(), error = %e, "Malformed row skipped");
                stats.malformed_rows += 1;
                continue;
            }
            let bus = datagram::bus_id(row).unwrap_or_default();
            by_bus.entry(bus).or_default().push(row);
        }
        stats.vehicle_groups = by_bus.len() as u64;

        for rows in by_bus.values_mut() {
            if cancel.is_cancelled() {
                debug!(partition = partition.id(), "Partition cancelled");
                return None;
            }

            rows.sort_by(|a, b| datagram::timestamp_text(a).cmp(datagram::timestamp_text(b)));
            for pair in rows.windows(2) {
                let outcome = self.evaluator.evaluate(pair[0], pair[1]);
                result.record(&outcome);
            }
        }

        debug!(
            partition = partition.id(),
            rows = partition.len(),
            buses = by_bus.len(),
            arcs = result.arcs().len(),
            "Partition processed"
        );
        Some(result)
    }
}
