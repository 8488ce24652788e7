//! Decoding of raw telemetry rows and evaluation of consecutive fixes.
//!
//! Telemetry rows are positional (no header):
//!
//! | idx | field                          |
//! |-----|--------------------------------|
//! | 0   | event type                     |
//! | 1   | register date                  |
//! | 2   | stop id                        |
//! | 3   | odometer                       |
//! | 4   | latitude, degrees * 1e7        |
//! | 5   | longitude, degrees * 1e7       |
//! | 6   | task id                        |
//! | 7   | line id                        |
//! | 8   | trip id                        |
//! | 9   | unused                         |
//! | 10  | timestamp, `yyyy-MM-dd HH:mm:ss` |
//! | 11  | vehicle (bus) id               |

use chrono::NaiveDateTime;
use csv::StringRecord;

use crate::config::EngineConfig;
use crate::error::RowError;
use crate::geo::{GeoPoint, haversine_m};
use crate::matcher::ArcMatcher;
use crate::parser::{field, parse_field};
use crate::topology::{ArcId, LineId, RouteGraphs};

pub mod fields {
    pub const LATITUDE: usize = 4;
    pub const LONGITUDE: usize = 5;
    pub const LINE_ID: usize = 7;
    pub const TIMESTAMP: usize = 10;
    pub const BUS_ID: usize = 11;
    /// Rows with fewer fields are malformed.
    pub const COUNT: usize = 12;
}

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const COORDINATE_SCALE: f64 = 1e7;

pub fn check_arity(record: &StringRecord) -> Result<(), RowError> {
    if record.len() < fields::COUNT {
        return Err(RowError::TooFewFields {
            found: record.len(),
            expected: fields::COUNT,
        });
    }
    Ok(())
}

pub fn bus_id(record: &StringRecord) -> Result<&str, RowError> {
    field(record, fields::BUS_ID)
}

pub fn line_id(record: &StringRecord) -> Result<LineId, RowError> {
    parse_field(record, fields::LINE_ID, "line_id")
}

/// Raw timestamp text; it sorts chronologically as a string.
pub fn timestamp_text(record: &StringRecord) -> &str {
    field(record, fields::TIMESTAMP).unwrap_or_default()
}

pub fn position(record: &StringRecord) -> Result<GeoPoint, RowError> {
    let lat: f64 = parse_field(record, fields::LATITUDE, "latitude")?;
    let lon: f64 = parse_field(record, fields::LONGITUDE, "longitude")?;
    Ok(GeoPoint::new(lat / COORDINATE_SCALE, lon / COORDINATE_SCALE))
}

/// Seconds since the epoch, reading the naive timestamp as UTC.
pub fn timestamp_secs(record: &StringRecord) -> Result<i64, RowError> {
    let raw = field(record, fields::TIMESTAMP)?;
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|t| t.and_utc().timestamp())
        .map_err(|_| RowError::InvalidTimestamp {
            field: "timestamp",
            value: raw.to_string(),
        })
}

/// Line id of a pair: the current row's when it parses, else the previous row's.
/// Zero means unknown.
pub fn resolve_line_id(prev: &StringRecord, cur: &StringRecord) -> Option<LineId> {
    line_id(cur)
        .or_else(|_| line_id(prev))
        .ok()
        .filter(|id| *id != 0)
}

pub fn speed_kmh(distance_m: f64, elapsed_secs: f64) -> f64 {
    distance_m / elapsed_secs * 3.6
}

/// What became of one (previous, current) pair of fixes.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Sample { arc: ArcId, speed_kmh: f64 },
    NonPositiveElapsed,
    SpeedOutOfRange,
    MissingLine,
    Unmatched,
    Malformed(RowError),
}

/// Turns consecutive fixes of one vehicle into arc speed samples.
///
/// Shared by the partition processor and the streaming processor so both
/// apply the same filters in the same order.
#[derive(Debug, Clone, Copy)]
pub struct PairEvaluator<'g> {
    matcher: ArcMatcher<'g>,
    earth_radius_m: f64,
    max_speed_kmh: f64,
}

impl<'g> PairEvaluator<'g> {
    pub fn new(graphs: &'g RouteGraphs, config: &EngineConfig) -> Self {
        Self {
            matcher: ArcMatcher::new(graphs, config),
            earth_radius_m: config.earth_radius_m,
            max_speed_kmh: config.max_speed_kmh,
        }
    }

    pub fn evaluate(&self, prev: &StringRecord, cur: &StringRecord) -> PairOutcome {
        self.try_evaluate(prev, cur)
            .unwrap_or_else(PairOutcome::Malformed)
    }

    fn try_evaluate(&self, prev: &StringRecord, cur: &StringRecord) -> Result<PairOutcome, RowError> {
        let from = position(prev)?;
        let to = position(cur)?;

        let elapsed = timestamp_secs(cur)? - timestamp_secs(prev)?;
        if elapsed <= 0 {
            return Ok(PairOutcome::NonPositiveElapsed);
        }

        let speed = speed_kmh(haversine_m(from, to, self.earth_radius_m), elapsed as f64);
        if !(speed > 0.0 && speed < self.max_speed_kmh) {
            return Ok(PairOutcome::SpeedOutOfRange);
        }

        let Some(line_id) = resolve_line_id(prev, cur) else {
            return Ok(PairOutcome::MissingLine);
        };

        Ok(match self.matcher.match_arc(line_id, from.midpoint(to)) {
            Some(arc) => PairOutcome::Sample {
                arc,
                speed_kmh: speed,
            },
            None => PairOutcome::Unmatched,
        })
    }
}
