//! Windowed audit history and egress cost aggregation for cluster workloads.
//!
//! - [`range`]: the [`Set`](range::Set) trait and the lock-guarded
//!   [`Range`](range::Range) container holding one set per window
//! - [`audit`]: audit results, per-window [`AuditSet`](audit::AuditSet)
//!   snapshots with merge-by-presence, and cumulative coverage
//! - [`network`]: joining zone/region/internet egress usage per workload and
//!   pricing it into a cost series
//! - [`config`] / [`logging`]: runtime settings and log setup

pub mod audit;
pub mod config;
pub mod logging;
pub mod model;
pub mod network;
pub mod range;

pub use audit::{AuditCoverage, AuditSet, AuditSetRange, CoverageStrategy};
pub use model::{Vector, Window};
pub use network::{CostAlignment, NetworkUsageData, get_network_cost, get_network_usage_data};
pub use range::{Range, Set};
