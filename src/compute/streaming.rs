//! Single forward pass over a telemetry file of any size.
//!
//! Only the last row of every vehicle is kept, so memory grows with the number
//! of distinct vehicles seen, not with the file. The pass is sequential.

use anyhow::{Context, Result};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, trace};

use super::aggregate::PartialResult;
use super::datagram::{self, PairEvaluator};
use crate::config::EngineConfig;
use crate::parser::telemetry_reader;
use crate::topology::RouteGraphs;

/// Partition id given to the single result of a streaming pass.
pub const STREAMING_PARTITION: usize = usize::MAX;

pub struct StreamingProcessor<'g> {
    evaluator: PairEvaluator<'g>,
    progress_every: u64,
}

#[derive(Debug)]
pub struct StreamingOutcome {
    pub result: PartialResult,
    /// Size of the last-row-per-vehicle table at the end of the pass.
    pub vehicles_tracked: usize,
}

impl<'g> StreamingProcessor<'g> {
    pub fn new(graphs: &'g RouteGraphs, config: &EngineConfig) -> Self {
        Self {
            evaluator: PairEvaluator::new(graphs, config),
            progress_every: config.progress_every_rows.max(1),
        }
    }

    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub fn process_path(&self, path: &Path) -> Result<StreamingOutcome> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        self.process_reader(file)
    }

    /// Rows are taken in file order; a vehicle whose rows go backwards in time
    /// simply has those pairs rejected.
    pub fn process_reader<R: Read>(&self, reader: R) -> Result<StreamingOutcome> {
        let mut rdr = telemetry_reader(reader);
        let mut last_by_bus: HashMap<String, StringRecord> = HashMap::new();
        let mut result = PartialResult::new(STREAMING_PARTITION);

        let mut record = StringRecord::new();
        loop {
            match rdr.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(e).context("reading telemetry stream"),
                Err(e) => {
                    trace!(error = %e, "Unreadable row skipped");
                    result.stats_mut().rows_seen += 1;
                    result.stats_mut().malformed_rows += 1;
                    continue;
                }
            }

            let rows_seen = {
                let stats = result.stats_mut();
                stats.rows_seen += 1;
                stats.rows_seen
            };
            if rows_seen % self.progress_every == 0 {
                info!(rows = rows_seen, vehicles = last_by_bus.len(), "Streaming progress");
            }

            if datagram::check_arity(&record).is_err() {
                result.stats_mut().malformed_rows += 1;
                continue;
            }

            let bus = datagram::bus_id(&record).unwrap_or_default();
            match last_by_bus.get_mut(bus) {
                Some(prev) => {
                    let outcome = self.evaluator.evaluate(prev, &record);
                    result.record(&outcome);
                    prev.clone_from(&record);
                }
                None => {
                    last_by_bus.insert(bus.to_string(), record.clone());
                }
            }
        }

        result.stats_mut().vehicle_groups = last_by_bus.len() as u64;
        info!(
            rows = result.stats().rows_seen,
            vehicles = last_by_bus.len(),
            arcs = result.arcs().len(),
            "Streaming pass finished"
        );

        Ok(StreamingOutcome {
            result,
            vehicles_tracked: last_by_bus.len(),
        })
    }
}
