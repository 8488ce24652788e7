//! Nearest-arc lookup for a single GPS position.

use crate::config::EngineConfig;
use crate::geo::{GeoPoint, point_to_segment_m};
use crate::topology::{ArcId, LineId, RouteArc, RouteGraphs};

/// Resolves positions to arcs of a named line.
///
/// Both orientations are searched and the globally nearest arc wins. Ties keep
/// the first arc seen, outbound before inbound.
#[derive(Debug, Clone, Copy)]
pub struct ArcMatcher<'g> {
    graphs: &'g RouteGraphs,
    radius_m: f64,
    earth_radius_m: f64,
}

impl<'g> ArcMatcher<'g> {
    pub fn new(graphs: &'g RouteGraphs, config: &EngineConfig) -> Self {
        Self {
            graphs,
            radius_m: config.match_radius_m,
            earth_radius_m: config.earth_radius_m,
        }
    }

    /// Nearest arc of `line_id` and its distance in meters, regardless of the radius.
    pub fn nearest(&self, line_id: LineId, point: GeoPoint) -> Option<(&'g RouteArc, f64)> {
        let graph = self.graphs.get(&line_id)?;

        let mut best: Option<(&'g RouteArc, f64)> = None;
        for arc in graph.arcs() {
            let d = point_to_segment_m(
                point,
                arc.from_stop.position(),
                arc.to_stop.position(),
                self.earth_radius_m,
            );
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((arc, d));
            }
        }
        best
    }

    /// Id of the nearest arc within the match radius, or `None`.
    pub fn match_arc(&self, line_id: LineId, point: GeoPoint) -> Option<ArcId> {
        self.nearest(line_id, point)
            .filter(|(_, d)| *d <= self.radius_m)
            .map(|(arc, _)| arc.id())
    }
}
