//! The speed computation engine.
//!
//! Two strategies share the per-pair logic in [`datagram`]:
//! a partitioned run over rows held in memory ([`coordinator`]) and a
//! single sequential pass over a file of any size ([`streaming`]).

pub mod aggregate;
pub mod coordinator;
pub mod datagram;
pub mod estimator;
pub mod partition;
pub mod processor;
pub mod streaming;

pub use aggregate::{ArcSpeedAggregator, ArcSpeeds, PartialResult, SumCount, combine_with_precedence};
pub use coordinator::{ComputeCoordinator, JobState};
pub use estimator::{DistributedEstimator, SpeedEstimator, SpeedReport, StreamingEstimator};
pub use partition::{DatagramPartition, PartitionManager};
pub use processor::PartitionProcessor;
pub use streaming::{StreamingOutcome, StreamingProcessor};
