//! Output formatting and persistence for arc speed results.
//!
//! Supports logging a sample of results, JSON summaries and CSV export.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::compute::ArcSpeeds;
use crate::topology::{ArcId, ArcIndex};
use csv::WriterBuilder;
use std::path::Path;

/// One row of the exported speed table.
#[derive(Debug, Serialize, PartialEq)]
pub struct ArcSpeedRecord {
    pub arc_id: ArcId,
    pub line_id: Option<i32>,
    pub orientation: Option<&'static str>,
    pub sequence: Option<i32>,
    pub from_stop: Option<i32>,
    pub to_stop: Option<i32>,
    pub avg_speed_kmh: f64,
}

/// Joins speeds with the arc index, ordered by line, orientation and sequence.
/// Ids missing from the index sort last, by id.
pub fn speed_records(speeds: &ArcSpeeds, index: &ArcIndex) -> Vec<ArcSpeedRecord> {
    let mut records: Vec<ArcSpeedRecord> = speeds
        .iter()
        .map(|(id, avg)| match index.get(*id) {
            Some(arc) => ArcSpeedRecord {
                arc_id: *id,
                line_id: Some(arc.line_id),
                orientation: Some(arc.orientation.name()),
                sequence: Some(arc.sequence),
                from_stop: Some(arc.from_stop.stop_id),
                to_stop: Some(arc.to_stop.stop_id),
                avg_speed_kmh: *avg,
            },
            None => ArcSpeedRecord {
                arc_id: *id,
                line_id: None,
                orientation: None,
                sequence: None,
                from_stop: None,
                to_stop: None,
                avg_speed_kmh: *avg,
            },
        })
        .collect();

    records.sort_by_key(|r| (r.line_id.is_none(), r.line_id, r.orientation, r.sequence, r.arc_id));
    records
}

/// Writes the speed table as CSV with a header row, replacing any existing file.
pub fn write_speeds(path: &Path, speeds: &ArcSpeeds, index: &ArcIndex) -> Result<usize> {
    let records = speed_records(speeds, index);
    debug!(path = %path.display(), rows = records.len(), "Writing speed table");

    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(records.len())
}

/// Logs up to `limit` results with their topology, in table order.
pub fn log_sample(speeds: &ArcSpeeds, index: &ArcIndex, limit: usize) {
    for record in speed_records(speeds, index).into_iter().take(limit) {
        match index.get(record.arc_id) {
            Some(arc) => info!(
                arc_id = %record.arc_id,
                line = arc.line_id,
                orientation = %arc.orientation,
                seq = arc.sequence,
                from = %arc.from_stop.short_name,
                to = %arc.to_stop.short_name,
                avg_speed_kmh = record.avg_speed_kmh,
                "Arc speed"
            ),
            None => info!(arc_id = %record.arc_id, avg_speed_kmh = record.avg_speed_kmh, "Arc speed"),
        }
    }
}

/// Logs any serializable summary as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
