//! Telemetry for Partyline: what the server has been doing, and how busy
//! the process is.
//!
//! # Key types
//!
//! - [`Telemetry`]: the aggregator: capped event log, all-time summary,
//!   bucketed health reports
//! - [`Reporter`]: cloneable write handle handed to rooms and connections
//! - [`ResourceSampler`]: smoothed CPU usage and resident memory
//! - [`HealthReport`]: the serializable result of a health query

mod aggregator;
mod event;
mod reporter;
mod usage;

pub use aggregator::{
    HealthQuery, HealthReport, RoomSummary, SegmentColumn, SegmentDatum,
    SeriesPoint, Telemetry, TelemetryConfig, Uptime, now_ms,
};
pub use event::{EventKind, EventRecord};
pub use reporter::Reporter;
pub use usage::{CpuUsage, MemoryUsage, ResourceSampler};
