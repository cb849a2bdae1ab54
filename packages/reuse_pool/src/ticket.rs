/// Names one checkout of one slot of an [`ObjectPool`][crate::ObjectPool].
///
/// A ticket is handed out together with the element by `acquire()` and `reserve()` and must be
/// presented to `release()` when the element is given back. It carries the type tag of the
/// element, so the element is cached under the type it was checked out for.
///
/// Tickets are plain values and can be copied, which means a caller can attempt to release the
/// same checkout twice. The pool detects this and reports
/// [`UsageError::ReleasedTwice`][crate::UsageError::ReleasedTwice]. A ticket whose slot has
/// since been discarded or handed out again, or that was issued by a different pool, is not
/// recognized at all; the element released with it is then treated as untracked.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Ticket<T> {
    slot: usize,

    /// Unique across all pools in the process, so neither a stale ticket nor a ticket from
    /// another pool ever matches a live checkout.
    checkout: u64,

    tag: T,
}

impl<T: Copy> Ticket<T> {
    #[must_use]
    pub(crate) fn new(slot: usize, checkout: u64, tag: T) -> Self {
        Self {
            slot,
            checkout,
            tag,
        }
    }

    /// The type tag the element was checked out for.
    #[must_use]
    pub fn tag(&self) -> T {
        self.tag
    }

    #[must_use]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub(crate) fn checkout(&self) -> u64 {
        self.checkout
    }
}
