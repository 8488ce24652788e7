//! Route network model.
//!
//! Lines, stops and their memberships come in as flat tables and are turned into
//! one [`RouteGraph`] per line by [`build_graphs`]. Graphs are never mutated
//! afterwards and are shared read-only by every worker.

pub mod builder;
pub mod index;
pub mod types;

pub use builder::{RouteGraphs, build_graphs};
pub use index::{ArcIndex, GraphSummary};
pub use types::{ArcId, Line, LineId, LineStop, Orientation, RouteArc, RouteGraph, Stop, StopId};
