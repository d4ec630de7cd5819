//! In-memory performance time series for hosts and VMs
//!
//! This crate provides the core functionality for:
//! - Bounded per-(object, metric) sample buffers with sorted-order invariants
//! - Windowed retrieval via binary chop and interval-folding downsampling
//! - Cross-series derived metrics (average CPU, memory used)
//! - Y-axis scale policies consumed by a renderer
//! - A polling loop and series registry with observability

pub mod classify;
pub mod models;
pub mod observability;
pub mod poll;
pub mod registry;
pub mod scale;
pub mod series;

pub use models::{
    IdParseError, MetricReading, ObjectHandle, ObjectKind, QueryWindow, Sample, SeriesId, SENTINEL,
};
pub use observability::StoreMetrics;
pub use poll::{PollBatch, PollConfig, PollLoop, SampleSource};
pub use registry::SeriesRegistry;
pub use scale::{ScaleMode, ScalePolicy, ScaleUnit};
pub use series::Series;
