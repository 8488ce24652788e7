//! Builds one [`RouteGraph`] per line from the flat line-stop table.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::types::{Line, LineId, LineStop, Orientation, RouteArc, RouteGraph, Stop, StopId};

pub type RouteGraphs = HashMap<LineId, RouteGraph>;

/// Groups memberships by line, then by (orientation, variant), and links
/// consecutive stops inside each group only.
///
/// Memberships of lines missing from `lines` are dropped. A membership whose
/// stop is missing from `stops` produces no arc on either side of it.
#[tracing::instrument(skip_all, fields(lines = lines.len(), stops = stops.len(), line_stops = line_stops.len()))]
pub fn build_graphs(
    lines: &HashMap<LineId, Line>,
    stops: &HashMap<StopId, Stop>,
    line_stops: &[LineStop],
) -> RouteGraphs {
    info!("Building route graphs");

    let mut by_line: BTreeMap<LineId, Vec<&LineStop>> = BTreeMap::new();
    for ls in line_stops {
        by_line.entry(ls.line_id).or_default().push(ls);
    }

    let mut graphs = RouteGraphs::with_capacity(by_line.len());
    for (line_id, members) in by_line {
        let Some(line) = lines.get(&line_id) else {
            warn!(line_id, memberships = members.len(), "Line not found, skipping its stops");
            continue;
        };
        graphs.insert(line_id, build_line_graph(line, &members, stops));
    }

    info!(graphs = graphs.len(), "Route graphs built");
    graphs
}

fn build_line_graph(line: &Line, members: &[&LineStop], stops: &HashMap<StopId, Stop>) -> RouteGraph {
    let mut graph = RouteGraph::new(line.clone());

    let mut groups: BTreeMap<(Orientation, &str), Vec<&LineStop>> = BTreeMap::new();
    for ls in members {
        groups
            .entry((ls.orientation, ls.line_variant.as_str()))
            .or_default()
            .push(ls);
    }

    for ((orientation, variant), mut group) in groups {
        group.sort_by_key(|ls| ls.stop_sequence);
        debug!(
            line_id = line.line_id,
            %orientation,
            variant,
            members = group.len(),
            "Linking variant group"
        );

        for pair in group.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let from = stops.get(&current.stop_id);
            let to = stops.get(&next.stop_id);

            match (from, to) {
                (Some(from), Some(to)) => graph.add_arc(RouteArc {
                    line_id: current.line_id,
                    orientation,
                    from_stop: from.clone(),
                    to_stop: to.clone(),
                    sequence: current.stop_sequence,
                }),
                _ => {
                    if from.is_none() {
                        warn!(stop_id = current.stop_id, line_id = line.line_id, "Origin stop not found");
                    }
                    if to.is_none() {
                        warn!(stop_id = next.stop_id, line_id = line.line_id, "Destination stop not found");
                    }
                }
            }
        }
    }

    graph
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compute::PartialResult;
    use chrono::NaiveDate;

    pub(crate) fn line(line_id: LineId) -> Line {
        Line {
            line_id,
            plan_version_id: 241,
            short_name: format!("T{line_id:02}"),
            description: "Ruta Test".into(),
            activation_date: NaiveDate::from_ymd_opt(2019, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    pub(crate) fn stop(stop_id: StopId, lat: f64, lon: f64) -> Stop {
        Stop {
            stop_id,
            plan_version_id: 241,
            short_name: format!("P{stop_id}"),
            long_name: format!("Parada {stop_id}"),
            gps_x: 0,
            gps_y: 0,
            decimal_lon: lon,
            decimal_lat: lat,
        }
    }

    pub(crate) fn member(
        id: i32,
        sequence: i32,
        orientation: Orientation,
        line_id: LineId,
        stop_id: StopId,
        variant: &str,
    ) -> LineStop {
        LineStop {
            line_stop_id: id,
            stop_sequence: sequence,
            orientation,
            line_id,
            stop_id,
            plan_version_id: 241,
            line_variant: variant.into(),
            line_variant_type: String::new(),
        }
    }

    fn three_stop_fixture() -> (HashMap<LineId, Line>, HashMap<StopId, Stop>, Vec<LineStop>) {
        let lines = HashMap::from([(1, line(1))]);
        let stops = HashMap::from([
            (101, stop(101, 3.40, -76.50)),
            (102, stop(102, 3.41, -76.50)),
            (103, stop(103, 3.42, -76.50)),
        ]);
        let line_stops = vec![
            member(1, 1, Orientation::Outbound, 1, 101, ""),
            member(2, 2, Orientation::Outbound, 1, 102, ""),
            member(3, 3, Orientation::Outbound, 1, 103, ""),
            member(4, 1, Orientation::Inbound, 1, 103, ""),
            member(5, 2, Orientation::Inbound, 1, 102, ""),
            member(6, 3, Orientation::Inbound, 1, 101, ""),
        ];
        (lines, stops, line_stops)
    }

    fn endpoints(arcs: &[RouteArc]) -> Vec<(StopId, StopId)> {
        arcs.iter()
            .map(|a| (a.from_stop.stop_id, a.to_stop.stop_id))
            .collect()
    }

    #[test]
    fn test_builds_one_graph_per_line() {
        let (lines, stops, line_stops) = three_stop_fixture();
        let graphs = build_graphs(&lines, &stops, &line_stops);

        assert_eq!(graphs.len(), 1);
        assert!(graphs.contains_key(&1));
    }

    #[test]
    fn test_consecutive_arcs_in_both_directions() {
        let (lines, stops, line_stops) = three_stop_fixture();
        let graphs = build_graphs(&lines, &stops, &line_stops);
        let graph = &graphs[&1];

        assert_eq!(endpoints(graph.outbound()), vec![(101, 102), (102, 103)]);
        assert_eq!(endpoints(graph.inbound()), vec![(103, 102), (102, 101)]);
        assert_eq!(graph.total_arcs(), 4);
    }

    #[test]
    fn test_graph_collects_touched_stops() {
        let (lines, stops, line_stops) = three_stop_fixture();
        let graphs = build_graphs(&lines, &stops, &line_stops);
        let graph = &graphs[&1];

        assert_eq!(graph.total_stops(), 3);
        assert!(graph.stops().contains_key(&101));
        assert!(graph.stops().contains_key(&103));
    }

    #[test]
    fn test_sorts_by_sequence_within_group() {
        let (lines, stops, _) = three_stop_fixture();
        let shuffled = vec![
            member(3, 3, Orientation::Outbound, 1, 103, ""),
            member(1, 1, Orientation::Outbound, 1, 101, ""),
            member(2, 2, Orientation::Outbound, 1, 102, ""),
        ];
        let graphs = build_graphs(&lines, &stops, &shuffled);
        let arcs = graphs[&1].outbound();

        assert_eq!(endpoints(arcs), vec![(101, 102), (102, 103)]);
        assert_eq!(arcs[0].sequence, 1);
        assert_eq!(arcs[1].sequence, 2);
    }

    #[test]
    fn test_no_arcs_across_variants() {
        let lines = HashMap::from([(1, line(1))]);
        let stops = HashMap::from([
            (101, stop(101, 3.40, -76.50)),
            (102, stop(102, 3.41, -76.50)),
            (201, stop(201, 3.50, -76.60)),
            (202, stop(202, 3.51, -76.60)),
        ]);
        // Interleaved sequences: a naive sort over the whole orientation
        // would link 101 -> 201 -> 102 -> 202.
        let line_stops = vec![
            member(1, 1, Orientation::Outbound, 1, 101, "A"),
            member(2, 3, Orientation::Outbound, 1, 102, "A"),
            member(3, 2, Orientation::Outbound, 1, 201, "B"),
            member(4, 4, Orientation::Outbound, 1, 202, "B"),
        ];
        let graphs = build_graphs(&lines, &stops, &line_stops);
        let arcs = endpoints(graphs[&1].outbound());

        assert_eq!(arcs.len(), 2);
        assert!(arcs.contains(&(101, 102)));
        assert!(arcs.contains(&(201, 202)));
    }

    #[test]
    fn test_long_route_has_distinct_arc_ids() {
        let lines = HashMap::from([(131, line(131))]);
        let stops: HashMap<StopId, Stop> = (1..=40)
            .map(|id| (id, stop(id, 3.40 + f64::from(id) * 0.001, -76.50)))
            .collect();
        let mut line_stops = Vec::new();
        for seq in 1..=40 {
            line_stops.push(member(seq, seq, Orientation::Outbound, 131, seq, ""));
            line_stops.push(member(100 + seq, seq, Orientation::Inbound, 131, 41 - seq, ""));
        }
        let graphs = build_graphs(&lines, &stops, &line_stops);
        let graph = &graphs[&131];

        assert_eq!(graph.total_arcs(), 78);
        let ids: std::collections::HashSet<_> = graph.arcs().map(RouteArc::id).collect();
        assert_eq!(ids.len(), graph.total_arcs());
    }

    #[test]
    fn test_variants_sharing_a_sequence_share_an_arc_id() {
        let lines = HashMap::from([(1, line(1))]);
        let stops = HashMap::from([
            (101, stop(101, 3.40, -76.50)),
            (102, stop(102, 3.41, -76.50)),
            (201, stop(201, 3.50, -76.60)),
            (202, stop(202, 3.51, -76.60)),
        ]);
        let line_stops = vec![
            member(1, 1, Orientation::Outbound, 1, 101, "A"),
            member(2, 2, Orientation::Outbound, 1, 102, "A"),
            member(3, 1, Orientation::Outbound, 1, 201, "B"),
            member(4, 2, Orientation::Outbound, 1, 202, "B"),
        ];
        let graphs = build_graphs(&lines, &stops, &line_stops);
        let arcs = graphs[&1].outbound();

        assert_eq!(arcs.len(), 2);
        assert_ne!(arcs[0].from_stop.stop_id, arcs[1].from_stop.stop_id);
        assert_eq!(arcs[0].id(), arcs[1].id());

        let mut result = PartialResult::new(0);
        result.add_sample(arcs[0].id(), 20.0);
        result.add_sample(arcs[1].id(), 40.0);
        assert_eq!(result.arcs().len(), 1);
        let pooled = result.arcs()[&arcs[0].id()];
        assert_eq!(pooled.count, 2);
        assert_eq!(pooled.average(), 30.0);
    }

    #[test]
    fn test_empty_variant_is_its_own_group() {
        let lines = HashMap::from([(1, line(1))]);
        let stops = HashMap::from([
            (101, stop(101, 3.40, -76.50)),
            (102, stop(102, 3.41, -76.50)),
        ]);
        let line_stops = vec![
            member(1, 1, Orientation::Outbound, 1, 101, ""),
            member(2, 2, Orientation::Outbound, 1, 102, "X"),
        ];
        let graphs = build_graphs(&lines, &stops, &line_stops);

        assert_eq!(graphs[&1].total_arcs(), 0);
    }

    #[test]
    fn test_missing_stop_breaks_the_chain() {
        let (lines, mut stops, line_stops) = three_stop_fixture();
        stops.remove(&102);
        let graphs = build_graphs(&lines, &stops, &line_stops);

        // 101 -> 103 must not be synthesized.
        assert_eq!(graphs[&1].total_arcs(), 0);
    }

    #[test]
    fn test_unknown_line_is_skipped() {
        let (_, stops, line_stops) = three_stop_fixture();
        let graphs = build_graphs(&HashMap::new(), &stops, &line_stops);
        assert!(graphs.is_empty());
    }
}
