//! Audit snapshots.
//!
//! An [`AuditSet`] bundles the results of every audit that ran over one
//! window. Each audit type is an optional field; a set with no audits is
//! empty. Sets merge by presence: fields present on the incoming set replace
//! the receiver's, absent fields leave the receiver untouched.
//!
//! Sets are stored in an [`AuditSetRange`] as shared `Arc` handles.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::coverage::{AuditCoverage, CoverageStrategy};
use super::types::AllocationReconciliationAudit;
use crate::model::Window;
use crate::range::{Range, Set, SetError};

/// Ordered history of audit snapshots.
pub type AuditSetRange = Range<Arc<AuditSet>>;

/// Plain contents of an [`AuditSet`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSetData {
    #[serde(default)]
    pub allocation_reconciliation: Option<AllocationReconciliationAudit>,
    pub window: Window,
}

impl AuditSetData {
    /// Copy every audit present on `other` into `self`. The window is kept.
    pub fn patch(&mut self, other: &AuditSetData) {
        if let Some(audit) = &other.allocation_reconciliation {
            self.allocation_reconciliation = Some(audit.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allocation_reconciliation.is_none()
    }
}

/// One window's audit results, guarded by a read/write lock.
#[derive(Default)]
pub struct AuditSet {
    inner: RwLock<AuditSetData>,
}

impl AuditSet {
    /// Empty set over `window`.
    pub fn new(window: Window) -> Self {
        Self::from_data(AuditSetData {
            allocation_reconciliation: None,
            window,
        })
    }

    pub fn from_data(data: AuditSetData) -> Self {
        Self {
            inner: RwLock::new(data),
        }
    }

    /// Copy of the current contents.
    pub fn data(&self) -> AuditSetData {
        self.inner.read().clone()
    }

    pub fn allocation_reconciliation(&self) -> Option<AllocationReconciliationAudit> {
        self.inner.read().allocation_reconciliation.clone()
    }

    pub fn set_allocation_reconciliation(&self, audit: Option<AllocationReconciliationAudit>) {
        self.inner.write().allocation_reconciliation = audit;
    }

    /// Edit the allocation reconciliation audit, creating it if absent.
    ///
    /// `f` works on a copy with no lock held and may call back into this set;
    /// the edited copy is stored afterwards, replacing whatever is there.
    pub fn with_allocation_reconciliation<R>(
        &self,
        f: impl FnOnce(&mut AllocationReconciliationAudit) -> R,
    ) -> R {
        let mut audit = self.allocation_reconciliation().unwrap_or_default();
        let out = f(&mut audit);
        self.inner.write().allocation_reconciliation = Some(audit);
        out
    }

    /// The set's window if it carries an allocation reconciliation audit.
    pub fn allocation_reconciliation_window(&self) -> Option<Window> {
        let inner = self.inner.read();
        inner
            .allocation_reconciliation
            .as_ref()
            .map(|_| inner.window)
    }

    /// Merge `other` into `self` by presence.
    ///
    /// `other` is copied under its own read lock, which is released before
    /// `self`'s write lock is taken, so merging a set into itself is fine.
    pub fn update(&self, other: &AuditSet) {
        let incoming = other.data();
        self.inner.write().patch(&incoming);
    }

    /// Merge `that` into `this`, or adopt `that` when there is no receiver.
    pub fn update_audit_set(this: Option<Arc<AuditSet>>, that: Arc<AuditSet>) -> Arc<AuditSet> {
        match this {
            None => that,
            Some(this) => {
                this.update(&that);
                this
            }
        }
    }
}

impl From<AuditSetData> for AuditSet {
    fn from(data: AuditSetData) -> Self {
        Self::from_data(data)
    }
}

impl Clone for AuditSet {
    fn clone(&self) -> Self {
        Self::from_data(self.data())
    }
}

impl PartialEq for AuditSet {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.data() == other.data()
    }
}

impl fmt::Debug for AuditSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuditSet").field(&*self.inner.read()).finish()
    }
}

impl Serialize for AuditSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuditSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        AuditSetData::deserialize(deserializer).map(Self::from_data)
    }
}

impl Set for AuditSet {
    fn clone_set(&self) -> Box<dyn Set> {
        Box::new(self.clone())
    }

    fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    fn window(&self) -> Window {
        self.inner.read().window
    }

    fn marshal_binary(&self) -> Result<Vec<u8>, SetError> {
        Ok(rmp_serde::to_vec_named(&*self.inner.read())?)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SetError> {
        *self.inner.get_mut() = rmp_serde::from_slice(data)?;
        Ok(())
    }
}

impl Range<Arc<AuditSet>> {
    /// Fold every stored set into a fresh coverage.
    pub fn coverage(&self, strategy: CoverageStrategy) -> AuditCoverage {
        let coverage = AuditCoverage::new(strategy);
        self.each(|_, set| coverage.update(set));
        coverage
    }

    /// Merge `set` into the stored set with the same window, or append it.
    /// Returns the handle now holding the merged results.
    pub fn insert_or_update(&self, set: Arc<AuditSet>) -> Arc<AuditSet> {
        let window = set.window();
        match self.find_or_append(Arc::clone(&set), |s| s.window() == window) {
            Some(existing) => AuditSet::update_audit_set(Some(existing), set),
            None => set,
        }
    }
}
