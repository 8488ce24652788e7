use serde::Serialize;

use crate::compute::datagram::PairOutcome;

/// Counters collected while turning telemetry rows into arc speed samples.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub rows_seen: u64,
    pub malformed_rows: u64,
    /// Per-partition count of distinct vehicles, summed on merge. A bus whose
    /// rows land in two partitions is two groups.
    pub vehicle_groups: u64,

    // consecutive pairs
    pub pairs_evaluated: u64,
    pub non_positive_elapsed: u64,
    pub speed_outliers: u64,
    pub missing_line: u64,
    pub malformed_pairs: u64,
    pub unmatched: u64,
    pub matched: u64,
}

impl ProcessingStats {
    /// Records the outcome of one consecutive pair.
    pub fn record(&mut self, outcome: &PairOutcome) {
        self.pairs_evaluated += 1;
        match outcome {
            PairOutcome::Sample { .. } => self.matched += 1,
            PairOutcome::NonPositiveElapsed => self.non_positive_elapsed += 1,
            PairOutcome::SpeedOutOfRange => self.speed_outliers += 1,
            PairOutcome::MissingLine => self.missing_line += 1,
            PairOutcome::Malformed(_) => self.malformed_pairs += 1,
            PairOutcome::Unmatched => self.unmatched += 1,
        }
    }

    pub fn merge(&mut self, other: &ProcessingStats) {
        self.rows_seen += other.rows_seen;
        self.malformed_rows += other.malformed_rows;
        self.vehicle_groups += other.vehicle_groups;
        self.pairs_evaluated += other.pairs_evaluated;
        self.non_positive_elapsed += other.non_positive_elapsed;
        self.speed_outliers += other.speed_outliers;
        self.missing_line += other.missing_line;
        self.malformed_pairs += other.malformed_pairs;
        self.unmatched += other.unmatched;
        self.matched += other.matched;
    }

    pub fn pct(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of evaluated pairs that produced a sample.
    pub fn match_pct(&self) -> f64 {
        Self::pct(self.matched, self.pairs_evaluated)
    }
}
