//! Contract layer of a pluggable request-processing gateway.
//!
//! Independent named pipelines run sequences of plugins over tasks. Each
//! pipeline owns a [`context::PipelineContext`] exposing scratch data
//! buckets, a statistics engine, and participation in a process-wide
//! cross-pipeline rendezvous store through which an upstream pipeline hands
//! a request to a downstream pipeline and synchronously awaits the typed
//! response under cancellation.

pub mod bucket;
pub mod context;
pub mod error;
pub mod plugin;
pub mod rendezvous;
pub mod statistics;
pub mod task;

pub use context::{PipelineConfig, PipelineContext};
pub use error::{GatewayError, Result};
pub use rendezvous::{DownstreamRequest, RendezvousStore, UpstreamResponse};
pub use statistics::{PipelineStatistics, StatisticsKind};
