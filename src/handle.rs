//! Unique handle: exclusive, movable ownership of a raw resource identifier.
//!
//! C-style APIs hand out opaque identifiers (a file descriptor, a database
//! connection pointer, a kernel object) that must be released exactly once.
//! `UniqueHandle` ties that release to the owner's lifetime. What counts as
//! "no resource" and how to release one is supplied by a `HandleTraits`
//! policy, so one wrapper serves every resource kind.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// =============================================================================
// Traits policy
// =============================================================================

/// Compile-time policy describing one kind of raw handle.
pub trait HandleTraits {
    /// The raw identifier type (pointer, descriptor, id...).
    type Raw: Copy + PartialEq;

    /// What a failed release reports.
    type Error: std::error::Error;

    /// The sentinel meaning "no resource is held".
    fn invalid() -> Self::Raw;

    /// Releases a valid identifier. Never called with `invalid()`.
    fn close(value: Self::Raw) -> Result<(), Self::Error>;
}

// =============================================================================
// UniqueHandle
// =============================================================================

/// Owns at most one raw identifier and closes it on drop.
///
/// Not `Clone`: duplicating a raw identifier would close it twice.
pub struct UniqueHandle<T: HandleTraits> {
    value: T::Raw,
    _traits: PhantomData<T>,
}

impl<T: HandleTraits> UniqueHandle<T> {
    /// Takes ownership of `value`, which may be the sentinel.
    pub fn new(value: T::Raw) -> Self {
        Self {
            value,
            _traits: PhantomData,
        }
    }

    /// A handle holding nothing.
    pub fn empty() -> Self {
        Self::new(T::invalid())
    }

    pub fn is_valid(&self) -> bool {
        self.value != T::invalid()
    }

    /// The raw value, still owned by this handle.
    pub fn get(&self) -> T::Raw {
        self.value
    }

    /// Gives up ownership without closing. The caller now releases the value.
    #[must_use = "the released value must be closed by the caller"]
    pub fn release(&mut self) -> T::Raw {
        std::mem::replace(&mut self.value, T::invalid())
    }

    /// Moves ownership out into a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self {
        Self::new(self.release())
    }

    /// Replaces the owned value, closing the old one first.
    ///
    /// Resetting to the value already held is a no-op. Returns whether the
    /// handle is valid afterwards. A failed close is logged, not returned;
    /// use [`try_reset`](Self::try_reset) to observe it.
    pub fn reset(&mut self, value: T::Raw) -> bool {
        if self.value != value {
            self.close_logged();
            self.value = value;
        }
        self.is_valid()
    }

    /// Closes the owned value, leaving the handle empty.
    pub fn reset_empty(&mut self) -> bool {
        self.reset(T::invalid())
    }

    /// Like [`reset`](Self::reset) but reports a failed close.
    ///
    /// The new value is adopted even when closing the old one fails.
    pub fn try_reset(&mut self, value: T::Raw) -> Result<bool, T::Error> {
        if self.value == value {
            return Ok(self.is_valid());
        }
        let old = std::mem::replace(&mut self.value, value);
        if old != T::invalid() {
            T::close(old)?;
        }
        Ok(self.is_valid())
    }

    /// Move-assignment: closes what this handle owns and adopts `other`'s value.
    pub fn assign(&mut self, mut other: Self) {
        self.reset(other.release());
    }

    /// Exchanges owned values. Nothing is opened or closed.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.value, &mut other.value);
    }

    /// A slot for C "out parameter" APIs to write a raw value into.
    ///
    /// Anything currently owned is closed first, so the slot always starts
    /// at the sentinel.
    pub fn out_slot(&mut self) -> &mut T::Raw {
        self.reset_empty();
        &mut self.value
    }

    /// Closes the owned value now and reports the outcome.
    pub fn close(mut self) -> Result<(), T::Error> {
        let value = self.release();
        if value != T::invalid() {
            T::close(value)?;
        }
        Ok(())
    }

    fn close_logged(&mut self) {
        let value = self.release();
        if value == T::invalid() {
            return;
        }
        if let Err(err) = T::close(value) {
            log::error!(
                "failed to close {}: {err}",
                std::any::type_name::<T>()
            );
        }
    }
}

/// Exchanges the values owned by two handles.
pub fn swap<T: HandleTraits>(left: &mut UniqueHandle<T>, right: &mut UniqueHandle<T>) {
    left.swap(right);
}

impl<T: HandleTraits> Drop for UniqueHandle<T> {
    fn drop(&mut self) {
        self.close_logged();
    }
}

impl<T: HandleTraits> Default for UniqueHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: HandleTraits> fmt::Debug for UniqueHandle<T>
where
    T::Raw: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueHandle")
            .field("value", &self.value)
            .field("valid", &self.is_valid())
            .finish()
    }
}

// Comparisons look at the raw values only.

impl<T: HandleTraits> PartialEq for UniqueHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: HandleTraits> Eq for UniqueHandle<T> where T::Raw: Eq {}

impl<T: HandleTraits> PartialOrd for UniqueHandle<T>
where
    T::Raw: PartialOrd,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<T: HandleTraits> Ord for UniqueHandle<T>
where
    T::Raw: Ord,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: HandleTraits> Hash for UniqueHandle<T>
where
    T::Raw: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use thiserror::Error;

    thread_local! {
        static CLOSED: RefCell<Vec<u32>> = RefCell::new(Vec::new());
        static FAILING: RefCell<HashSet<u32>> = RefCell::new(HashSet::new());
    }

    #[derive(Debug, Error)]
    #[error("close failed for id {0}")]
    struct CloseFailed(u32);

    /// Integer ids with 0 as "no resource"; every close is recorded.
    struct Recorded;

    impl HandleTraits for Recorded {
        type Raw = u32;
        type Error = CloseFailed;

        fn invalid() -> u32 {
            0
        }

        fn close(value: u32) -> Result<(), CloseFailed> {
            CLOSED.with(|c| c.borrow_mut().push(value));
            if FAILING.with(|f| f.borrow().contains(&value)) {
                Err(CloseFailed(value))
            } else {
                Ok(())
            }
        }
    }

    type Handle = UniqueHandle<Recorded>;

    fn closed() -> Vec<u32> {
        CLOSED.with(|c| c.borrow().clone())
    }

    fn fail_on(value: u32) {
        FAILING.with(|f| f.borrow_mut().insert(value));
    }

    fn clear() {
        CLOSED.with(|c| c.borrow_mut().clear());
        FAILING.with(|f| f.borrow_mut().clear());
    }

    #[test]
    fn test_default_handle_is_invalid() {
        clear();
        let h = Handle::default();
        assert!(!h.is_valid());
        assert_eq!(h.get(), 0);
        assert!(!Handle::empty().is_valid());
        assert!(!Handle::new(0).is_valid());
    }

    #[test]
    fn test_new_with_value_is_valid() {
        clear();
        let h = Handle::new(5);
        assert!(h.is_valid());
        assert_eq!(h.get(), 5);
        assert!(closed().is_empty());
    }

    #[test]
    fn test_release_returns_value_without_closing() {
        clear();
        let mut h = Handle::new(9);
        let before = h.get();
        let raw = h.release();
        assert_eq!(raw, before);
        assert!(!h.is_valid());
        drop(h);
        assert!(closed().is_empty());
    }

    #[test]
    fn test_reset_different_value_closes_old() {
        clear();
        let mut h = Handle::new(1);
        assert!(h.reset(2));
        assert_eq!(closed(), vec![1]);
        assert_eq!(h.get(), 2);
    }

    #[test]
    fn test_reset_same_value_is_noop() {
        clear();
        let mut h = Handle::new(1);
        assert!(h.reset(1));
        assert!(closed().is_empty());
        assert_eq!(h.get(), 1);
    }

    #[test]
    fn test_reset_empty_twice_closes_nothing() {
        clear();
        let mut h = Handle::empty();
        assert!(!h.reset_empty());
        assert!(!h.reset_empty());
        assert!(closed().is_empty());
    }

    #[test]
    fn test_reset_empty_closes_owned_value() {
        clear();
        let mut h = Handle::new(3);
        assert!(!h.reset_empty());
        assert_eq!(closed(), vec![3]);
        assert!(!h.reset_empty());
        assert_eq!(closed(), vec![3]);
    }

    #[test]
    fn test_move_transfers_without_closing() {
        clear();
        let mut a = Handle::new(4);
        let b = a.take();
        assert!(!a.is_valid());
        assert_eq!(b.get(), 4);
        assert!(closed().is_empty());

        let c = b;
        assert_eq!(c.get(), 4);
        assert!(closed().is_empty());
        drop(c);
        drop(a);
        assert_eq!(closed(), vec![4]);
    }

    #[test]
    fn test_drop_closes_exactly_once() {
        clear();
        {
            let _valid = Handle::new(11);
            let _invalid = Handle::empty();
        }
        assert_eq!(closed(), vec![11]);
    }

    #[test]
    fn test_swap_exchanges_without_closing() {
        clear();
        let mut a = Handle::new(1);
        let mut b = Handle::new(2);
        a.swap(&mut b);
        assert_eq!((a.get(), b.get()), (2, 1));
        swap(&mut a, &mut b);
        assert_eq!((a.get(), b.get()), (1, 2));

        let mut empty = Handle::empty();
        swap(&mut a, &mut empty);
        assert!(!a.is_valid());
        assert_eq!(empty.get(), 1);
        assert!(closed().is_empty());
    }

    #[test]
    fn test_assign_closes_target_and_empties_source() {
        clear();
        let mut target = Handle::new(1);
        let mut source = Handle::new(2);
        target.assign(source.take());
        assert_eq!(closed(), vec![1]);
        assert_eq!(target.get(), 2);
        assert!(!source.is_valid());
    }

    #[test]
    fn test_plain_assignment_drops_previous_owner() {
        clear();
        let mut h = Handle::new(1);
        assert_eq!(h.get(), 1);
        h = Handle::new(2);
        assert_eq!(closed(), vec![1]);
        assert_eq!(h.get(), 2);
    }

    #[test]
    fn test_out_slot_closes_owned_value_first() {
        clear();
        let mut h = Handle::new(8);
        *h.out_slot() = 12;
        assert_eq!(closed(), vec![8]);
        assert_eq!(h.get(), 12);

        let mut fresh = Handle::empty();
        assert_eq!(*fresh.out_slot(), 0);
        *fresh.out_slot() = 13;
        assert!(fresh.is_valid());
        assert_eq!(closed(), vec![8]);
    }

    #[test]
    fn test_close_reports_failure_once() {
        clear();
        fail_on(6);
        let h = Handle::new(6);
        let err = h.close().unwrap_err();
        assert_eq!(err.to_string(), "close failed for id 6");
        assert_eq!(closed(), vec![6]);
    }

    #[test]
    fn test_close_empty_is_ok() {
        clear();
        assert!(Handle::empty().close().is_ok());
        assert!(closed().is_empty());
    }

    #[test]
    fn test_try_reset_reports_failure_and_adopts_new_value() {
        clear();
        fail_on(1);
        let mut h = Handle::new(1);
        assert!(h.try_reset(2).is_err());
        assert_eq!(h.get(), 2);
        assert!(h.try_reset(2).unwrap());
        assert!(!h.try_reset(0).unwrap());
        assert_eq!(closed(), vec![1, 2]);
    }

    #[test]
    fn test_failed_close_on_drop_does_not_panic() {
        clear();
        fail_on(3);
        {
            let _h = Handle::new(3);
        }
        assert_eq!(closed(), vec![3]);
    }

    #[test]
    fn test_comparisons_use_raw_values() {
        let a = Handle::new(1);
        let b = Handle::new(2);
        assert!(a != b);
        assert!(a < b);
        assert!(b >= a);
        assert_eq!(Handle::empty(), Handle::default());

        let mut released = [a, b];
        for h in &mut released {
            let _ = h.release();
        }
    }

    #[test]
    fn test_debug_output() {
        let h = Handle::empty();
        assert_eq!(format!("{h:?}"), "UniqueHandle { value: 0, valid: false }");
    }

    #[test]
    fn test_end_to_end_reset_sequence() {
        clear();
        {
            let mut h = Handle::default();
            assert!(!h.is_valid());

            assert!(h.reset(42));
            assert_eq!(h.get(), 42);

            assert!(h.reset(42));
            assert_eq!(h.get(), 42);
            assert!(closed().is_empty());

            assert!(h.reset(7));
            assert_eq!(closed(), vec![42]);
            assert_eq!(h.get(), 7);
        }
        assert_eq!(closed(), vec![42, 7]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reset(u32),
        Release,
        Take,
        Swap,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..6).prop_map(Op::Reset),
            Just(Op::Release),
            Just(Op::Take),
            Just(Op::Swap),
        ]
    }

    proptest! {
        #[test]
        fn test_every_value_closed_at_most_once(ops in prop::collection::vec(op(), 0..40)) {
            clear();
            let mut next_id = 100u32;
            let mut released = Vec::new();
            {
                let mut a = Handle::empty();
                let mut b = Handle::new(99);
                let mut moved = Vec::new();
                for op in ops {
                    match op {
                        // Reset ids are made unique so ownership is never duplicated.
                        Op::Reset(0) => { a.reset_empty(); }
                        Op::Reset(_) => { next_id += 1; a.reset(next_id); }
                        Op::Release => {
                            let raw = a.release();
                            if raw != 0 { released.push(raw); }
                        }
                        Op::Take => moved.push(a.take()),
                        Op::Swap => a.swap(&mut b),
                    }
                    prop_assert!(!closed().iter().any(|v| *v == a.get() && a.is_valid()));
                }
            }

            let log = closed();
            let unique: HashSet<_> = log.iter().copied().collect();
            prop_assert_eq!(unique.len(), log.len());
            prop_assert!(!log.contains(&0));
            for raw in &released {
                prop_assert!(!log.contains(raw));
            }
            // Everything handed out was either closed or released.
            let issued: HashSet<u32> = (101..=next_id).chain(std::iter::once(99)).collect();
            let accounted: HashSet<u32> = log.iter().chain(released.iter()).copied().collect();
            prop_assert_eq!(issued, accounted);
        }
    }
}
