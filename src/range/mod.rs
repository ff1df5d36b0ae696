//! Time-windowed set containers.
//!
//! - [`Set`]: capability trait for anything stored in a [`Range`]: it can
//!   clone itself polymorphically, report emptiness and its covering
//!   [`Window`], and round-trip through a binary representation.
//! - [`Range`]: append-only, lock-guarded ordered sequence of sets.
//!
//! Binary representations are MessagePack (`rmp-serde`). The exact layout is
//! an implementation detail of each set type.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::model::Window;

/// Errors raised by [`Range`] accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("range: index out of range: {index} (len {len})")]
    IndexOutOfRange { index: i64, len: usize },
}

/// Errors raised while encoding or decoding a [`Set`].
#[derive(Error, Debug)]
pub enum SetError {
    #[error("failed to encode set: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode set: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("cannot decode into a set that is shared by other handles")]
    Shared,
}

/// Capability contract for a time-windowed snapshot.
pub trait Set: Send + Sync {
    /// Deep copy, independent of `self`.
    fn clone_set(&self) -> Box<dyn Set>;

    fn is_empty(&self) -> bool;

    /// The span of time this set describes.
    fn window(&self) -> Window;

    fn marshal_binary(&self) -> Result<Vec<u8>, SetError>;

    /// Replace the contents of `self` with the decoded `data`.
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SetError>;
}

/// Sets are usually shared between a range and its readers via `Arc`.
///
/// Decoding in place requires the handle to be unique.
impl<T: Set + Clone + 'static> Set for Arc<T> {
    fn clone_set(&self) -> Box<dyn Set> {
        Box::new(Arc::new(T::clone(self)))
    }

    fn is_empty(&self) -> bool {
        T::is_empty(self)
    }

    fn window(&self) -> Window {
        T::window(self)
    }

    fn marshal_binary(&self) -> Result<Vec<u8>, SetError> {
        T::marshal_binary(self)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SetError> {
        Arc::get_mut(self).ok_or(SetError::Shared)?.unmarshal_binary(data)
    }
}

/// Append-only ordered sequence of sets.
///
/// Insertion order is arrival order; the range never re-sorts, so callers may
/// append windows out of chronological order. Indices are stable once
/// assigned. Every accessor takes the internal lock only for the duration of
/// the slice access: set methods and caller closures run against a snapshot,
/// never under the range's lock.
pub struct Range<T> {
    sets: RwLock<Vec<T>>,
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Self {
            sets: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Set + Clone> Range<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, set: T) {
        self.sets.write().push(set);
    }

    /// Return the set at index `i`.
    ///
    /// For `Arc` items this is the shared handle, not a copy: clone the set
    /// before mutating it if other readers must not observe the change.
    pub fn get(&self, i: usize) -> Result<T, RangeError> {
        let sets = self.sets.read();
        sets.get(i).cloned().ok_or(RangeError::IndexOutOfRange {
            index: i as i64,
            len: sets.len(),
        })
    }

    /// Return the first stored set matching `pred`, or append `set` if none
    /// does.
    ///
    /// `pred` runs with no lock held. The append only lands if the range has
    /// not grown since the last scan; otherwise the new tail is scanned and
    /// the append retried, so two callers racing on the same key still end
    /// up with one stored set.
    pub fn find_or_append<P>(&self, set: T, mut pred: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut scanned = 0;
        loop {
            let snapshot = self.snapshot();
            if let Some(found) = snapshot[scanned..].iter().find(|s| pred(s)) {
                return Some(found.clone());
            }
            scanned = snapshot.len();

            let mut sets = self.sets.write();
            if sets.len() == scanned {
                sets.push(set);
                return None;
            }
        }
    }

    /// [`Range::get`] for callers holding a signed index.
    pub fn get_signed(&self, i: i64) -> Result<T, RangeError> {
        match usize::try_from(i) {
            Ok(idx) => self.get(idx),
            Err(_) => Err(RangeError::IndexOutOfRange {
                index: i,
                len: self.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    /// True if the range holds no sets, or every set it holds is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot().iter().all(|s| s.is_empty())
    }

    /// Invoke `f` for every set, in storage order.
    ///
    /// `f` runs against a snapshot taken under the read lock; the lock is
    /// released before the first call, so `f` may append to this range. Sets
    /// appended during iteration are not visited.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(usize, &T),
    {
        for (i, set) in self.snapshot().iter().enumerate() {
            f(i, set);
        }
    }

    /// Clone of the current sequence.
    pub fn snapshot(&self) -> Vec<T> {
        self.sets.read().clone()
    }

    /// Enclosing span of every set's window, or `None` for an empty range.
    pub fn span(&self) -> Option<Window> {
        let sets = self.snapshot();
        let mut iter = sets.iter();
        let mut span = iter.next()?.window();
        for set in iter {
            span.expand(&set.window());
        }
        Some(span)
    }

    /// Encode as an ordered array of each set's binary form.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, SetError> {
        let blobs = self
            .snapshot()
            .iter()
            .map(Set::marshal_binary)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rmp_serde::to_vec(&blobs)?)
    }
}

impl<T: Set + Clone + Default> Range<T> {
    /// Replace the contents of this range with the decoded `data`.
    pub fn unmarshal_binary(&self, data: &[u8]) -> Result<(), SetError> {
        let blobs: Vec<Vec<u8>> = rmp_serde::from_slice(data)?;
        let mut decoded = Vec::with_capacity(blobs.len());
        for blob in &blobs {
            let mut set = T::default();
            set.unmarshal_binary(blob)?;
            decoded.push(set);
        }
        *self.sets.write() = decoded;
        Ok(())
    }

    /// Decode a range previously written by [`Range::marshal_binary`].
    pub fn from_binary(data: &[u8]) -> Result<Self, SetError> {
        let range = Self::new();
        range.unmarshal_binary(data)?;
        Ok(range)
    }
}

impl<T: Clone> Clone for Range<T> {
    fn clone(&self) -> Self {
        Self {
            sets: RwLock::new(self.sets.read().clone()),
        }
    }
}

impl<T> std::fmt::Debug for Range<T>
where
    T: std::fmt::Debug + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sets = self.sets.read().clone();
        f.debug_struct("Range").field("sets", &sets).finish()
    }
}

impl<T: Serialize + Clone> Serialize for Range<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sets = self.sets.read().clone();
        sets.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counts {
        window: Window,
        counts: Vec<u32>,
    }

    impl Counts {
        fn new(start: i64, end: i64, counts: &[u32]) -> Self {
            Self {
                window: Window::from_unix(start, end).unwrap(),
                counts: counts.to_vec(),
            }
        }
    }

    impl Set for Counts {
        fn clone_set(&self) -> Box<dyn Set> {
            Box::new(self.clone())
        }

        fn is_empty(&self) -> bool {
            self.counts.is_empty()
        }

        fn window(&self) -> Window {
            self.window
        }

        fn marshal_binary(&self) -> Result<Vec<u8>, SetError> {
            Ok(rmp_serde::to_vec_named(self)?)
        }

        fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SetError> {
            *self = rmp_serde::from_slice(data)?;
            Ok(())
        }
    }

    #[test]
    fn fresh_range_is_empty() {
        let r: Range<Counts> = Range::new();
        assert_eq!(r.len(), 0);
        assert!(r.is_empty());
        assert!(r.span().is_none());
    }

    #[test]
    fn range_of_empty_sets_is_empty() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[]));
        r.append(Counts::new(10, 20, &[]));
        assert_eq!(r.len(), 2);
        assert!(r.is_empty());

        r.append(Counts::new(20, 30, &[1]));
        assert!(!r.is_empty());
    }

    #[test]
    fn get_out_of_range() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[1]));
        assert!(r.get(0).is_ok());
        assert_eq!(
            r.get(1),
            Err(RangeError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            r.get_signed(-1),
            Err(RangeError::IndexOutOfRange { index: -1, len: 1 })
        );
    }

    #[test]
    fn appends_keep_arrival_order() {
        let r = Range::new();
        r.append(Counts::new(20, 30, &[3]));
        r.append(Counts::new(0, 10, &[1]));
        assert_eq!(r.get(0).unwrap().counts, vec![3]);
        assert_eq!(r.get(1).unwrap().counts, vec![1]);
        assert_eq!(r.span(), Some(Window::from_unix(0, 30).unwrap()));
    }

    #[test]
    fn each_visits_in_order_and_allows_reentrant_append() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[1]));
        r.append(Counts::new(10, 20, &[2]));

        let mut seen = Vec::new();
        r.each(|i, set| {
            seen.push((i, set.counts[0]));
            r.append(Counts::new(100, 110, &[9]));
        });
        assert_eq!(seen, vec![(0, 1), (1, 2)]);
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn find_or_append_returns_existing_match() {
        let r = Range::new();
        assert!(
            r.find_or_append(Counts::new(0, 10, &[1]), |s| s.window == w(0, 10))
                .is_none()
        );
        let found = r.find_or_append(Counts::new(0, 10, &[2]), |s| s.window == w(0, 10));
        assert_eq!(found.map(|s| s.counts), Some(vec![1]));
        assert_eq!(r.len(), 1);
    }

    fn w(start: i64, end: i64) -> Window {
        Window::from_unix(start, end).unwrap()
    }

    #[test]
    fn find_or_append_predicate_may_read_the_range() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[1]));

        let mut lens = Vec::new();
        let found = r.find_or_append(Counts::new(10, 20, &[2]), |s| {
            lens.push(r.len());
            s.window == w(10, 20)
        });
        assert!(found.is_none());
        assert_eq!(lens, vec![1]);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn find_or_append_rescans_sets_appended_by_the_predicate() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[1]));

        // The first scan sneaks in a matching set; the append must see it.
        let mut first = true;
        let found = r.find_or_append(Counts::new(10, 20, &[2]), |s| {
            if first {
                first = false;
                r.append(Counts::new(10, 20, &[7]));
            }
            s.window == w(10, 20)
        });
        assert_eq!(found.map(|s| s.counts), Some(vec![7]));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn binary_preserves_order() {
        let r = Range::new();
        r.append(Counts::new(20, 30, &[3, 4]));
        r.append(Counts::new(0, 10, &[1]));
        let bytes = r.marshal_binary().unwrap();

        let decoded: Range<Counts> = Range::from_binary(&bytes).unwrap();
        assert_eq!(decoded.snapshot(), r.snapshot());
    }

    #[test]
    fn json_is_array_of_sets() {
        let r = Range::new();
        r.append(Counts::new(0, 10, &[1]));
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["counts"], serde_json::json!([1]));
    }

    #[test]
    fn shared_arc_cannot_decode_in_place() {
        let mut shared = Arc::new(Counts::new(0, 10, &[1]));
        let _other = Arc::clone(&shared);
        let bytes = Counts::new(0, 5, &[]).marshal_binary().unwrap();
        assert!(matches!(
            shared.unmarshal_binary(&bytes),
            Err(SetError::Shared)
        ));
    }

    #[test]
    fn clone_set_is_independent() {
        let original = Counts::new(0, 10, &[1]);
        let copy = original.clone_set();
        assert_eq!(copy.window(), original.window());
        assert!(!copy.is_empty());
    }
}
