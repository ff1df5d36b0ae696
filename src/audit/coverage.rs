//! Cumulative audit coverage.
//!
//! Coverage answers "over which span of time has an audit of this type run".
//! Two strategies are available:
//!
//! - [`CoverageStrategy::Union`] keeps one enclosing window per audit type,
//!   grown with [`Window::expand`]. Cheap, but a hole between two audited
//!   windows is reported as covered.
//! - [`CoverageStrategy::Intervals`] keeps a sorted, disjoint interval set so
//!   holes stay visible through [`Coverage::gaps`].
//!
//! Coverage only grows; nothing removes time from it.

use std::fmt;

use clap::ValueEnum;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, Serializer};

use super::set::AuditSet;
use super::types::AuditType;
use crate::model::Window;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStrategy {
    #[default]
    Union,
    Intervals,
}

impl std::str::FromStr for CoverageStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "intervals" => Ok(Self::Intervals),
            _ => Err(format!("Unknown coverage strategy: {}", s)),
        }
    }
}

impl fmt::Display for CoverageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "union"),
            Self::Intervals => write!(f, "intervals"),
        }
    }
}

// ---------------------------------------------------------------------------
// IntervalSet
// ---------------------------------------------------------------------------

/// Sorted set of disjoint, non-adjacent, non-empty windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalSet {
    intervals: Vec<Window>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `window`, merging it with every interval it overlaps or touches.
    /// Zero-length windows cover nothing and are ignored.
    pub fn insert(&mut self, window: Window) {
        if window.is_zero() {
            return;
        }

        let mut merged = window;
        let mut placed = false;
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        for iv in self.intervals.drain(..) {
            if iv.touches(&merged) {
                merged.expand(&iv);
            } else if iv.end() < merged.start() {
                out.push(iv);
            } else {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(iv);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.intervals = out;
    }

    pub fn as_slice(&self) -> &[Window] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Enclosing span of every interval.
    pub fn span(&self) -> Option<Window> {
        let first = self.intervals.first()?;
        let last = self.intervals.last()?;
        Some(first.union(last))
    }

    /// Uncovered windows between consecutive intervals.
    pub fn gaps(&self) -> Vec<Window> {
        self.intervals
            .windows(2)
            .filter_map(|pair| Window::new(pair[0].end(), pair[1].start()).ok())
            .collect()
    }

    /// True if a single interval encloses `window`.
    pub fn covers(&self, window: &Window) -> bool {
        self.intervals.iter().any(|iv| iv.encloses(window))
    }
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

/// Coverage of a single audit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Coverage {
    Union { window: Option<Window> },
    Intervals { intervals: IntervalSet },
}

impl Coverage {
    pub fn new(strategy: CoverageStrategy) -> Self {
        match strategy {
            CoverageStrategy::Union => Self::Union { window: None },
            CoverageStrategy::Intervals => Self::Intervals {
                intervals: IntervalSet::new(),
            },
        }
    }

    pub fn strategy(&self) -> CoverageStrategy {
        match self {
            Self::Union { .. } => CoverageStrategy::Union,
            Self::Intervals { .. } => CoverageStrategy::Intervals,
        }
    }

    pub fn extend(&mut self, window: &Window) {
        match self {
            Self::Union { window: Some(w) } => w.expand(window),
            Self::Union { window: w @ None } => *w = Some(*window),
            Self::Intervals { intervals } => intervals.insert(*window),
        }
    }

    /// Enclosing span of everything covered so far.
    pub fn window(&self) -> Option<Window> {
        match self {
            Self::Union { window } => *window,
            Self::Intervals { intervals } => intervals.span(),
        }
    }

    /// Covered intervals. Under `Union` this is the single enclosing window.
    pub fn intervals(&self) -> Vec<Window> {
        match self {
            Self::Union { window } => window.iter().copied().collect(),
            Self::Intervals { intervals } => intervals.as_slice().to_vec(),
        }
    }

    /// Known holes. `Union` coverage cannot see holes and always reports none.
    pub fn gaps(&self) -> Vec<Window> {
        match self {
            Self::Union { .. } => Vec::new(),
            Self::Intervals { intervals } => intervals.gaps(),
        }
    }

    pub fn covers(&self, window: &Window) -> bool {
        match self {
            Self::Union { window: Some(w) } => w.encloses(window),
            Self::Union { window: None } => false,
            Self::Intervals { intervals } => intervals.covers(window),
        }
    }
}

impl Default for Coverage {
    fn default() -> Self {
        Self::new(CoverageStrategy::default())
    }
}

// ---------------------------------------------------------------------------
// AuditCoverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditCoverageData {
    pub allocation_reconciliation: Coverage,
}

/// Per-audit-type coverage, safe to update from several threads.
pub struct AuditCoverage {
    strategy: CoverageStrategy,
    inner: RwLock<AuditCoverageData>,
}

impl AuditCoverage {
    pub fn new(strategy: CoverageStrategy) -> Self {
        Self {
            strategy,
            inner: RwLock::new(AuditCoverageData {
                allocation_reconciliation: Coverage::new(strategy),
            }),
        }
    }

    pub fn strategy(&self) -> CoverageStrategy {
        self.strategy
    }

    /// Extend coverage by `set`'s window for every audit the set carries.
    pub fn update(&self, set: &AuditSet) {
        // Read the set before taking our lock; never hold both.
        if let Some(window) = set.allocation_reconciliation_window() {
            self.inner.write().allocation_reconciliation.extend(&window);
        }
    }

    /// Coverage for one audit type. `All` yields the coverage of every type
    /// combined; `InvalidType` yields `None`.
    pub fn coverage(&self, audit_type: AuditType) -> Option<Coverage> {
        let inner = self.inner.read();
        match audit_type {
            AuditType::AllocationReconciliation | AuditType::All => {
                Some(inner.allocation_reconciliation.clone())
            }
            AuditType::InvalidType => None,
        }
    }

    pub fn window(&self, audit_type: AuditType) -> Option<Window> {
        self.coverage(audit_type)?.window()
    }

    pub fn intervals(&self, audit_type: AuditType) -> Vec<Window> {
        self.coverage(audit_type)
            .map(|c| c.intervals())
            .unwrap_or_default()
    }

    pub fn gaps(&self, audit_type: AuditType) -> Vec<Window> {
        self.coverage(audit_type)
            .map(|c| c.gaps())
            .unwrap_or_default()
    }

    pub fn covers(&self, audit_type: AuditType, window: &Window) -> bool {
        self.coverage(audit_type)
            .is_some_and(|c| c.covers(window))
    }

    pub fn data(&self) -> AuditCoverageData {
        self.inner.read().clone()
    }
}

impl Default for AuditCoverage {
    fn default() -> Self {
        Self::new(CoverageStrategy::default())
    }
}

impl Clone for AuditCoverage {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            inner: RwLock::new(self.data()),
        }
    }
}

impl fmt::Debug for AuditCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditCoverage")
            .field("strategy", &self.strategy)
            .field("inner", &*self.inner.read())
            .finish()
    }
}

impl Serialize for AuditCoverage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::AllocationReconciliationAudit;

    fn w(start: i64, end: i64) -> Window {
        Window::from_unix(start, end).unwrap()
    }

    fn audited(start: i64, end: i64) -> AuditSet {
        let set = AuditSet::new(w(start, end));
        set.set_allocation_reconciliation(Some(AllocationReconciliationAudit::new()));
        set
    }

    #[test]
    fn interval_insert_merges_overlap_and_adjacency() {
        let mut set = IntervalSet::new();
        set.insert(w(20, 30));
        set.insert(w(0, 10));
        set.insert(w(40, 50));
        assert_eq!(set.as_slice(), &[w(0, 10), w(20, 30), w(40, 50)]);

        set.insert(w(10, 20));
        assert_eq!(set.as_slice(), &[w(0, 30), w(40, 50)]);

        set.insert(w(25, 45));
        assert_eq!(set.as_slice(), &[w(0, 50)]);
    }

    #[test]
    fn interval_insert_ignores_zero_windows() {
        let mut set = IntervalSet::new();
        set.insert(w(5, 5));
        assert!(set.is_empty());
    }

    #[test]
    fn union_coverage_hides_holes() {
        let mut c = Coverage::new(CoverageStrategy::Union);
        c.extend(&w(0, 10));
        c.extend(&w(20, 30));
        assert_eq!(c.window(), Some(w(0, 30)));
        assert!(c.gaps().is_empty());
        assert!(c.covers(&w(12, 18)));
    }

    #[test]
    fn interval_coverage_reports_gap() {
        let mut c = Coverage::new(CoverageStrategy::Intervals);
        c.extend(&w(0, 10));
        c.extend(&w(20, 30));
        assert_eq!(c.window(), Some(w(0, 30)));
        assert_eq!(c.intervals(), vec![w(0, 10), w(20, 30)]);
        assert_eq!(c.gaps(), vec![w(10, 20)]);
        assert!(!c.covers(&w(12, 18)));
        assert!(c.covers(&w(2, 8)));
    }

    #[test]
    fn update_ignores_sets_without_audits() {
        let cov = AuditCoverage::default();
        cov.update(&AuditSet::new(w(0, 10)));
        assert_eq!(cov.window(AuditType::AllocationReconciliation), None);

        cov.update(&audited(0, 10));
        assert_eq!(cov.window(AuditType::AllocationReconciliation), Some(w(0, 10)));
    }

    #[test]
    fn audit_type_selection() {
        let cov = AuditCoverage::new(CoverageStrategy::Intervals);
        cov.update(&audited(0, 10));
        assert_eq!(cov.window(AuditType::All), Some(w(0, 10)));
        assert_eq!(cov.window(AuditType::InvalidType), None);
        assert!(!cov.covers(AuditType::InvalidType, &w(0, 1)));
    }

    #[test]
    fn strategy_parse_and_display() {
        assert_eq!("Intervals".parse::<CoverageStrategy>(), Ok(CoverageStrategy::Intervals));
        assert!("hull".parse::<CoverageStrategy>().is_err());
        assert_eq!(CoverageStrategy::Union.to_string(), "union");
    }

    #[test]
    fn coverage_json_shape() {
        let cov = AuditCoverage::new(CoverageStrategy::Intervals);
        cov.update(&audited(0, 10));
        let json = serde_json::to_value(&cov).unwrap();
        assert_eq!(json["allocation_reconciliation"]["strategy"], "intervals");
        assert_eq!(
            json["allocation_reconciliation"]["intervals"]
                .as_array()
                .map(Vec::len),
            Some(1)
        );
    }
}
