//! Lookups derived from the built graphs.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::builder::RouteGraphs;
use super::types::{ArcId, LineId, RouteArc};

/// Maps arc ids back to the arc they were derived from, for readable output.
#[derive(Debug, Default)]
pub struct ArcIndex {
    arcs: HashMap<ArcId, RouteArc>,
}

impl ArcIndex {
    /// Walks every arc once. Lines are visited in ascending id order so that
    /// colliding ids always resolve to the same arc.
    pub fn build(graphs: &RouteGraphs) -> Self {
        let mut line_ids: Vec<LineId> = graphs.keys().copied().collect();
        line_ids.sort_unstable();

        let mut arcs = HashMap::new();
        for line_id in line_ids {
            for arc in graphs[&line_id].arcs() {
                arcs.insert(arc.id(), arc.clone());
            }
        }
        Self { arcs }
    }

    pub fn get(&self, id: ArcId) -> Option<&RouteArc> {
        self.arcs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}

/// Size of the built network.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub routes: usize,
    pub arcs: usize,
    pub outbound_arcs: usize,
    pub inbound_arcs: usize,
    pub unique_stops: usize,
}

impl GraphSummary {
    pub fn from_graphs(graphs: &RouteGraphs) -> Self {
        let mut summary = GraphSummary {
            routes: graphs.len(),
            ..Default::default()
        };
        let mut stops = HashSet::new();
        for graph in graphs.values() {
            summary.outbound_arcs += graph.outbound().len();
            summary.inbound_arcs += graph.inbound().len();
            stops.extend(graph.stops().keys().copied());
        }
        summary.arcs = summary.outbound_arcs + summary.inbound_arcs;
        summary.unique_stops = stops.len();
        summary
    }
}
