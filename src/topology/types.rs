//! Route topology entities.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::geo::GeoPoint;

pub type LineId = i32;
pub type StopId = i32;

/// A physical stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub stop_id: StopId,
    pub plan_version_id: i32,
    pub short_name: String,
    pub long_name: String,
    pub gps_x: i64,
    pub gps_y: i64,
    pub decimal_lon: f64,
    pub decimal_lat: f64,
}

impl Stop {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.decimal_lat, self.decimal_lon)
    }
}

/// A transit line (route).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub line_id: LineId,
    pub plan_version_id: i32,
    pub short_name: String,
    pub description: String,
    pub activation_date: NaiveDateTime,
}

/// Direction of travel along a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Orientation {
    Outbound,
    Inbound,
}

impl Orientation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Orientation::Outbound),
            1 => Some(Orientation::Inbound),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Orientation::Outbound => 0,
            Orientation::Inbound => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Outbound => "IDA",
            Orientation::Inbound => "VUELTA",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Membership of a stop in a line, at a position of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineStop {
    pub line_stop_id: i32,
    pub stop_sequence: i32,
    pub orientation: Orientation,
    pub line_id: LineId,
    pub stop_id: StopId,
    pub plan_version_id: i32,
    /// May be empty; the empty label is a variant of its own.
    pub line_variant: String,
    pub line_variant_type: String,
}

impl LineStop {
    pub fn sort_key(&self) -> (LineId, Orientation, i32) {
        (self.line_id, self.orientation, self.stop_sequence)
    }
}

/// Identifier of an arc across the whole pipeline.
///
/// Derived from `(line_id, orientation, sequence)` only. Two variants of the same
/// line and orientation that share a sequence number get the same id and their
/// samples are pooled. Any other pair of arcs gets distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArcId(i64);

impl ArcId {
    /// The one id function. Packs the line id in the high 32 bits, the
    /// orientation in bit 31 and the low 31 bits of the sequence below it.
    pub fn new(line_id: LineId, orientation: Orientation, sequence: i32) -> Self {
        let line = i64::from(line_id) << 32;
        let orientation = i64::from(orientation.code()) << 31;
        let sequence = i64::from(sequence as u32 & 0x7fff_ffff);
        ArcId(line | orientation | sequence)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directed edge between two consecutive stops of one (line, orientation, variant) group.
#[derive(Debug, Clone, Serialize)]
pub struct RouteArc {
    pub line_id: LineId,
    pub orientation: Orientation,
    pub from_stop: Stop,
    pub to_stop: Stop,
    /// Sequence number of `from_stop` within its group.
    pub sequence: i32,
}

impl RouteArc {
    pub fn id(&self) -> ArcId {
        ArcId::new(self.line_id, self.orientation, self.sequence)
    }
}

// Equality follows the arc id, not the endpoints.
impl PartialEq for RouteArc {
    fn eq(&self, other: &Self) -> bool {
        self.line_id == other.line_id
            && self.orientation == other.orientation
            && self.sequence == other.sequence
    }
}

impl Eq for RouteArc {}

impl std::hash::Hash for RouteArc {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.line_id.hash(state);
        self.orientation.hash(state);
        self.sequence.hash(state);
    }
}

impl fmt::Display for RouteArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Arc[Line={}, {}, Seq={}]: {} ({}) -> {} ({})",
            self.line_id,
            self.orientation,
            self.sequence,
            self.from_stop.short_name,
            self.from_stop.stop_id,
            self.to_stop.short_name,
            self.to_stop.stop_id
        )
    }
}

/// Arcs of one line in both directions. Read-only once built.
#[derive(Debug, Clone)]
pub struct RouteGraph {
    line: Line,
    outbound: Vec<RouteArc>,
    inbound: Vec<RouteArc>,
    stops: BTreeMap<StopId, Stop>,
}

impl RouteGraph {
    pub(crate) fn new(line: Line) -> Self {
        Self {
            line,
            outbound: Vec::new(),
            inbound: Vec::new(),
            stops: BTreeMap::new(),
        }
    }

    pub(crate) fn add_arc(&mut self, arc: RouteArc) {
        self.stops
            .entry(arc.from_stop.stop_id)
            .or_insert_with(|| arc.from_stop.clone());
        self.stops
            .entry(arc.to_stop.stop_id)
            .or_insert_with(|| arc.to_stop.clone());
        match arc.orientation {
            Orientation::Outbound => self.outbound.push(arc),
            Orientation::Inbound => self.inbound.push(arc),
        }
    }

    pub fn line(&self) -> &Line {
        &self.line
    }

    pub fn outbound(&self) -> &[RouteArc] {
        &self.outbound
    }

    pub fn inbound(&self) -> &[RouteArc] {
        &self.inbound
    }

    pub fn arcs(&self) -> impl Iterator<Item = &RouteArc> {
        self.outbound.iter().chain(self.inbound.iter())
    }

    pub fn stops(&self) -> &BTreeMap<StopId, Stop> {
        &self.stops
    }

    pub fn total_arcs(&self) -> usize {
        self.outbound.len() + self.inbound.len()
    }

    pub fn total_stops(&self) -> usize {
        self.stops.len()
    }
}
