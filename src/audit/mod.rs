//! Audit history: results, per-window snapshots and cumulative coverage.

pub mod coverage;
pub mod set;
pub mod types;

pub use coverage::{AuditCoverage, Coverage, CoverageStrategy, IntervalSet};
pub use set::{AuditSet, AuditSetData, AuditSetRange};
pub use types::{
    AllocationReconciliationAudit, Audit, AuditFloatResult, AuditStatus, AuditType, Divergence,
};
