//! Audit result records.
//!
//! An audit compares an expected quantity with the quantity actually observed
//! and records the outcome. [`AllocationReconciliationAudit`] is the concrete
//! payload for allocation reconciliation: expected vs actual totals per node
//! and resource, plus structural anomalies that have no numeric comparison.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// AuditType / AuditStatus
// ---------------------------------------------------------------------------

/// Kind of audit. `All` is the "no filter" wildcard used when selecting
/// audits; `InvalidType` is what any unrecognized name parses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditType {
    AllocationReconciliation,
    All,
    InvalidType,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllocationReconciliation => "AuditAllocationReconciliation",
            Self::All => "",
            Self::InvalidType => "InvalidType",
        }
    }
}

impl From<&str> for AuditType {
    fn from(s: &str) -> Self {
        match s {
            "AuditAllocationReconciliation" => Self::AllocationReconciliation,
            "" => Self::All,
            _ => Self::InvalidType,
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Outcome of an audit. Audits that were never evaluated report `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Passed,
    #[default]
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "Passed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit / AuditFloatResult
// ---------------------------------------------------------------------------

/// Summary of a single audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub audit_type: AuditType,
    pub status: AuditStatus,
    pub description: String,
    pub last_run: DateTime<Utc>,
}

/// Expected vs actual value of one quantity.
///
/// There is no built-in tolerance; callers decide what counts as divergent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFloatResult {
    pub expected: f64,
    pub actual: f64,
}

impl AuditFloatResult {
    pub fn new(expected: f64, actual: f64) -> Self {
        Self { expected, actual }
    }

    /// `actual - expected`.
    pub fn delta(&self) -> f64 {
        self.actual - self.expected
    }

    /// True if `|actual - expected|` exceeds `tolerance`.
    pub fn diverges(&self, tolerance: f64) -> bool {
        self.delta().abs() > tolerance
    }
}

// ---------------------------------------------------------------------------
// AllocationReconciliationAudit
// ---------------------------------------------------------------------------

/// Per-node, per-resource reconciliation of expected vs allocated totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationReconciliationAudit {
    pub status: AuditStatus,
    pub description: String,
    pub last_run: DateTime<Utc>,
    /// node -> resource name -> comparison.
    pub resources: BTreeMap<String, BTreeMap<String, AuditFloatResult>>,
    /// Allocations that reference no node.
    pub allocs_with_no_node: BTreeSet<String>,
    /// Nodes that received no allocations.
    pub nodes_with_no_allocs: BTreeSet<String>,
    /// Nodes that were expected but not observed.
    pub missing_nodes: BTreeSet<String>,
}

/// One divergent `(node, resource)` comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Divergence {
    pub node: String,
    pub resource: String,
    pub result: AuditFloatResult,
}

impl AllocationReconciliationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the comparison for `resource` on `node`.
    pub fn record(
        &mut self,
        node: impl Into<String>,
        resource: impl Into<String>,
        expected: f64,
        actual: f64,
    ) {
        self.resources
            .entry(node.into())
            .or_default()
            .insert(resource.into(), AuditFloatResult::new(expected, actual));
    }

    pub fn get(&self, node: &str, resource: &str) -> Option<&AuditFloatResult> {
        self.resources.get(node)?.get(resource)
    }

    /// Number of recorded `(node, resource)` comparisons.
    pub fn comparison_count(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }

    /// Every comparison whose delta exceeds `tolerance`, in node/resource order.
    pub fn divergent(&self, tolerance: f64) -> Vec<Divergence> {
        self.resources
            .iter()
            .flat_map(|(node, by_resource)| {
                by_resource
                    .iter()
                    .filter(|(_, r)| r.diverges(tolerance))
                    .map(move |(resource, r)| Divergence {
                        node: node.clone(),
                        resource: resource.clone(),
                        result: *r,
                    })
            })
            .collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.allocs_with_no_node.len() + self.nodes_with_no_allocs.len() + self.missing_nodes.len()
    }

    pub fn has_anomalies(&self) -> bool {
        self.anomaly_count() > 0
    }

    /// Judge the recorded comparisons and anomalies.
    ///
    /// Fails if any comparison diverges by more than `tolerance` or any
    /// structural anomaly was recorded. Updates `status`, `description` and
    /// `last_run`, and returns the new status.
    pub fn evaluate(&mut self, tolerance: f64, now: DateTime<Utc>) -> AuditStatus {
        let divergent = self.divergent(tolerance).len();
        let checked = self.comparison_count();
        let anomalies = self.anomaly_count();

        self.status = if divergent == 0 && anomalies == 0 {
            AuditStatus::Passed
        } else {
            AuditStatus::Failed
        };
        self.description = format!(
            "{divergent}/{checked} node resources diverged beyond {tolerance}; \
             {anomalies} structural anomalies \
             ({} allocations without node, {} nodes without allocations, {} missing nodes)",
            self.allocs_with_no_node.len(),
            self.nodes_with_no_allocs.len(),
            self.missing_nodes.len(),
        );
        self.last_run = now;
        self.status
    }

    pub fn to_audit(&self) -> Audit {
        Audit {
            audit_type: AuditType::AllocationReconciliation,
            status: self.status,
            description: self.description.clone(),
            last_run: self.last_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
