//! Per-arc speed accumulators and their merge.

use dashmap::DashMap;
use std::collections::HashMap;

use super::datagram::PairOutcome;
use crate::stats::ProcessingStats;
use crate::topology::ArcId;

/// Final mapping from arc id to average speed in km/h.
pub type ArcSpeeds = HashMap<ArcId, f64>;

/// Running sum and count of speed samples for one arc.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SumCount {
    pub sum: f64,
    pub count: u64,
}

impl SumCount {
    pub fn add(&mut self, speed_kmh: f64) {
        self.sum += speed_kmh;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &SumCount) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Accumulators produced by one partition (or one streaming pass).
#[derive(Debug, Clone, Default)]
pub struct PartialResult {
    partition_id: usize,
    arcs: HashMap<ArcId, SumCount>,
    stats: ProcessingStats,
}

impl PartialResult {
    pub fn new(partition_id: usize) -> Self {
        Self {
            partition_id,
            ..Default::default()
        }
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    pub fn add_sample(&mut self, arc: ArcId, speed_kmh: f64) {
        self.arcs.entry(arc).or_default().add(speed_kmh);
    }

    /// Counts the outcome and keeps its sample, if any.
    pub fn record(&mut self, outcome: &PairOutcome) {
        self.stats.record(outcome);
        if let PairOutcome::Sample { arc, speed_kmh } = outcome {
            self.add_sample(*arc, *speed_kmh);
        }
    }

    pub fn arcs(&self) -> &HashMap<ArcId, SumCount> {
        &self.arcs
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ProcessingStats {
        &mut self.stats
    }

    pub fn averages(&self) -> ArcSpeeds {
        self.arcs.iter().map(|(id, sc)| (*id, sc.average())).collect()
    }
}

/// Merges partial results from many producers.
///
/// Each arc has its own entry lock, so merges touching different arcs do not
/// wait on each other. `merge` takes `&self` and may be called from any thread.
#[derive(Debug, Default)]
pub struct ArcSpeedAggregator {
    arcs: DashMap<ArcId, SumCount>,
}

impl ArcSpeedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, partial: &PartialResult) {
        for (id, sc) in partial.arcs() {
            self.arcs.entry(*id).or_default().merge(sc);
        }
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn finalize_averages(&self) -> ArcSpeeds {
        self.arcs
            .iter()
            .map(|entry| (*entry.key(), entry.value().average()))
            .collect()
    }
}

/// Combines two result sets; entries from `streaming` replace those in `historical`.
pub fn combine_with_precedence(mut historical: ArcSpeeds, streaming: &ArcSpeeds) -> ArcSpeeds {
    historical.extend(streaming.iter().map(|(id, v)| (*id, *v)));
    historical
}
