//! CSV loaders for the route topology and the raw telemetry files.
//!
//! Topology files carry a header row; telemetry files do not. Rows that fail
//! to decode are logged and skipped, never fatal.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::DataLayout;
use crate::error::{RowError, TopologyError};
use crate::topology::{Line, LineId, LineStop, Orientation, Stop, StopId};

const ACTIVATION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parsed route topology tables.
#[derive(Debug, Default)]
pub struct Topology {
    pub lines: HashMap<LineId, Line>,
    pub stops: HashMap<StopId, Stop>,
    pub line_stops: Vec<LineStop>,
    /// Rows dropped across all three tables.
    pub skipped_rows: usize,
}

/// Returns the trimmed field at `idx`.
pub(crate) fn field<'r>(record: &'r StringRecord, idx: usize) -> Result<&'r str, RowError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or(RowError::TooFewFields {
            found: record.len(),
            expected: idx + 1,
        })
}

pub(crate) fn parse_field<T: FromStr>(
    record: &StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<T, RowError> {
    let raw = field(record, idx)?;
    raw.parse().map_err(|_| RowError::InvalidNumber {
        field: name,
        value: raw.to_string(),
    })
}

/// Fails with [`TopologyError::MissingFile`] unless `path` exists.
pub fn require_file(path: &Path) -> Result<(), TopologyError> {
    if path.exists() {
        debug!(path = %path.display(), "Found input file");
        Ok(())
    } else {
        Err(TopologyError::MissingFile(path.to_path_buf()))
    }
}

/// Loads all three topology tables. Every file is checked before any parsing starts.
#[tracing::instrument(skip_all, fields(data_dir = %layout.data_dir.display()))]
pub fn load_topology(layout: &DataLayout) -> Result<Topology> {
    let lines_path = layout.lines_path();
    let stops_path = layout.stops_path();
    let line_stops_path = layout.line_stops_path();

    for path in [&lines_path, &stops_path, &line_stops_path] {
        require_file(path)?;
    }

    let (lines, skipped_lines) = parse_lines(open(&lines_path)?)?;
    let (stops, skipped_stops) = parse_stops(open(&stops_path)?)?;
    let (line_stops, skipped_line_stops) = parse_line_stops(open(&line_stops_path)?)?;

    info!(
        lines = lines.len(),
        stops = stops.len(),
        line_stops = line_stops.len(),
        "Topology loaded"
    );

    Ok(Topology {
        lines,
        stops,
        line_stops,
        skipped_rows: skipped_lines + skipped_stops + skipped_line_stops,
    })
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

/// Reads a headed table, decoding each row with `decode` and skipping failures.
fn read_table<T, R, F>(reader: R, table: &'static str, decode: F) -> Result<(Vec<T>, usize)>
where
    R: Read,
    F: Fn(&StringRecord) -> Result<T, RowError>,
{
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e).context(format!("reading {table}")),
            Err(e) => {
                warn!(table, error = %e, "Unreadable row skipped");
                skipped += 1;
                continue;
            }
        };
        match decode(&record) {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(table, error = %e, row = ?record, "Malformed row skipped");
                skipped += 1;
            }
        }
    }

    info!(table, parsed = rows.len(), skipped, "Table parsed");
    Ok((rows, skipped))
}

/// Parses `lines.csv`. Column 4 repeats the plan version; the activation date is column 5.
pub fn parse_lines<R: Read>(reader: R) -> Result<(HashMap<LineId, Line>, usize)> {
    let (rows, skipped) = read_table(reader, "lines", decode_line)?;
    Ok((rows.into_iter().map(|l| (l.line_id, l)).collect(), skipped))
}

pub fn parse_stops<R: Read>(reader: R) -> Result<(HashMap<StopId, Stop>, usize)> {
    let (rows, skipped) = read_table(reader, "stops", decode_stop)?;
    Ok((rows.into_iter().map(|s| (s.stop_id, s)).collect(), skipped))
}

pub fn parse_line_stops<R: Read>(reader: R) -> Result<(Vec<LineStop>, usize)> {
    read_table(reader, "linestops", decode_line_stop)
}

fn decode_line(record: &StringRecord) -> Result<Line, RowError> {
    let raw_date = field(record, 5)?;
    let activation_date = NaiveDateTime::parse_from_str(raw_date, ACTIVATION_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw_date, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| RowError::InvalidTimestamp {
            field: "activation_date",
            value: raw_date.to_string(),
        })?;

    Ok(Line {
        line_id: parse_field(record, 0, "line_id")?,
        plan_version_id: parse_field(record, 1, "plan_version_id")?,
        short_name: field(record, 2)?.to_string(),
        description: field(record, 3)?.to_string(),
        activation_date,
    })
}

fn decode_stop(record: &StringRecord) -> Result<Stop, RowError> {
    Ok(Stop {
        stop_id: parse_field(record, 0, "stop_id")?,
        plan_version_id: parse_field(record, 1, "plan_version_id")?,
        short_name: field(record, 2)?.to_string(),
        long_name: field(record, 3)?.to_string(),
        gps_x: parse_field(record, 4, "gps_x")?,
        gps_y: parse_field(record, 5, "gps_y")?,
        decimal_lon: parse_field(record, 6, "decimal_longitude")?,
        decimal_lat: parse_field(record, 7, "decimal_latitude")?,
    })
}

fn decode_line_stop(record: &StringRecord) -> Result<LineStop, RowError> {
    let code: i32 = parse_field(record, 2, "orientation")?;
    let orientation = Orientation::from_code(code).ok_or(RowError::InvalidOrientation(code))?;

    Ok(LineStop {
        line_stop_id: parse_field(record, 0, "line_stop_id")?,
        stop_sequence: parse_field(record, 1, "stop_sequence")?,
        orientation,
        line_id: parse_field(record, 3, "line_id")?,
        stop_id: parse_field(record, 4, "stop_id")?,
        plan_version_id: parse_field(record, 5, "plan_version_id")?,
        line_variant: field(record, 6).unwrap_or_default().to_string(),
        line_variant_type: field(record, 7).unwrap_or_default().to_string(),
    })
}

/// CSV reader configured for headerless telemetry files.
pub fn telemetry_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// Loads telemetry rows into memory, stopping after `max_rows` rows when set.
#[tracing::instrument(skip_all, fields(path = %path.display(), max_rows))]
pub fn read_telemetry(path: &Path, max_rows: Option<usize>) -> Result<Vec<StringRecord>> {
    read_telemetry_from(open(path)?, max_rows)
}

pub fn read_telemetry_from<R: Read>(reader: R, max_rows: Option<usize>) -> Result<Vec<StringRecord>> {
    let mut rdr = telemetry_reader(reader);
    let limit = max_rows.unwrap_or(usize::MAX);

    let mut rows = Vec::new();
    let mut unreadable = 0usize;
    for result in rdr.records() {
        if rows.len() + unreadable >= limit {
            break;
        }
        match result {
            Ok(record) => rows.push(record),
            Err(e) if e.is_io_error() => return Err(e).context("reading telemetry"),
            Err(e) => {
                debug!(error = %e, "Unreadable telemetry row skipped");
                unreadable += 1;
            }
        }
    }

    info!(rows = rows.len(), unreadable, "Telemetry loaded");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = "LINEID,PLANVERSIONID,SHORTNAME,DESCRIPTION,PLANVERSIONID,ACTIVATIONDATE,CREATIONDATE\n\
        131,241,T31,Chiminangos - Universidades,241,2019-01-26 00:00:00.000,2019-01-20 10:00:00.000\n\
        oops,241,X,broken,241,2019-01-26 00:00:00.000,2019-01-20 10:00:00.000\n";

    const STOPS: &str = "STOPID,PLANVERSIONID,SHORTNAME,LONGNAME,GPS_X,GPS_Y,DECIMALLONGITUDE,DECIMALLATITUDE\n\
        500250,241,Univ,Universidades,1060000,872000,-76.5320,3.3750\n\
        500300,241,Short,row,1,2\n";

    const LINE_STOPS: &str = "LINESTOPID,STOPSEQUENCE,ORIENTATION,LINEID,STOPID,PLANVERSIONID,LINEVARIANT,LINEVARIANTTYPE\n\
        1,1,0,131,500250,241,T31A,1\n\
        2,2,1,131,500300,241\n\
        3,3,7,131,500300,241,,\n";

    #[test]
    fn test_parse_lines_skips_bad_id() {
        let (lines, skipped) = parse_lines(LINES.as_bytes()).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(skipped, 1);
        let line = &lines[&131];
        assert_eq!(line.short_name, "T31");
        assert_eq!(line.activation_date.to_string(), "2019-01-26 00:00:00");
    }

    #[test]
    fn test_parse_stops_skips_short_row() {
        let (stops, skipped) = parse_stops(STOPS.as_bytes()).unwrap();

        assert_eq!(stops.len(), 1);
        assert_eq!(skipped, 1);
        let stop = &stops[&500250];
        assert_eq!(stop.decimal_lat, 3.3750);
        assert_eq!(stop.decimal_lon, -76.5320);
    }

    #[test]
    fn test_parse_line_stops_optional_variant_and_bad_orientation() {
        let (rows, skipped) = parse_line_stops(LINE_STOPS.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(rows[0].line_variant, "T31A");
        assert_eq!(rows[0].orientation, Orientation::Outbound);
        assert_eq!(rows[1].line_variant, "");
        assert_eq!(rows[1].orientation, Orientation::Inbound);
    }

    #[test]
    fn test_read_telemetry_respects_max_rows() {
        let data = "a,b,c\nd,e,f\ng,h,i\n";
        let rows = read_telemetry_from(data.as_bytes(), Some(2)).unwrap();
        assert_eq!(rows.len(), 2);

        let all = read_telemetry_from(data.as_bytes(), None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_telemetry_has_no_header() {
        let rows = read_telemetry_from("1,2,3\n".as_bytes(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "1");
    }

    #[test]
    fn test_require_file_reports_missing_path() {
        let missing = Path::new("/definitely/not/here/lines-241.csv");
        let err = require_file(missing).unwrap_err();
        assert!(err.to_string().contains("lines-241.csv"));
    }

    #[test]
    fn test_field_reports_arity() {
        let record = StringRecord::from(vec!["1", "2"]);
        assert_eq!(
            field(&record, 4),
            Err(RowError::TooFewFields { found: 2, expected: 5 })
        );
        assert_eq!(parse_field::<i32>(&record, 1, "x"), Ok(2));
    }
}
