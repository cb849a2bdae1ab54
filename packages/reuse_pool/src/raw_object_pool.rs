use std::any::type_name;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::list::{IntrusiveList, Linked, Links};
use crate::metrics::{
    OBJECT_EVICTIONS, OBJECT_HITS, OBJECT_INVALIDATIONS, OBJECT_MISSES,
    OBJECT_OVERFLOW_ALLOCATIONS, OBJECT_SHRINKS,
};
use crate::{ReleaseOutcome, Ticket, UsageError};

/// List family of the cross-type recency list. Only cached slots are members.
#[derive(Debug)]
struct Recency;

/// List family of the type buckets and of the free bucket. A slot is a member of at most one
/// of them at a time, so they can share the same links.
#[derive(Debug)]
struct Bucket;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotState {
    /// Unbound, member of the free bucket.
    Free,

    /// Holds an idle element, member of its type bucket and of the recency list.
    Cached,

    /// The element is held by a caller. Member of no list.
    InUse,
}

#[derive(Debug)]
struct Slot<E, T> {
    element: Option<E>,
    tag: Option<T>,

    /// Cleared when the type of the checked out element may have been invalidated, which
    /// means the element must not be cached again on release.
    valid: bool,

    state: SlotState,

    /// The checkout that last bound this slot. Zero for free slots.
    checkout: u64,

    recency: Links,
    bucket: Links,
}

impl<E, T> Slot<E, T> {
    fn free() -> Self {
        Self {
            element: None,
            tag: None,
            valid: true,
            state: SlotState::Free,
            checkout: 0,
            recency: Links::default(),
            bucket: Links::default(),
        }
    }

    fn reset(&mut self) {
        debug_assert!(
            self.element.is_none(),
            "slot must be emptied before it is reset"
        );

        self.tag = None;
        self.valid = true;
        self.state = SlotState::Free;
        self.checkout = 0;
    }
}

impl<E, T> Linked<Recency> for Slot<E, T> {
    fn links(&self) -> &Links {
        &self.recency
    }

    fn links_mut(&mut self) -> &mut Links {
        &mut self.recency
    }
}

impl<E, T> Linked<Bucket> for Slot<E, T> {
    fn links(&self) -> &Links {
        &self.bucket
    }

    fn links_mut(&mut self) -> &mut Links {
        &mut self.bucket
    }
}

type SlotList<E, T, L> = IntrusiveList<Slot<E, T>, L>;

/// Source of checkout ids, shared by all pools in the process so that a ticket issued by one pool
/// never names a live checkout of another. Zero is never issued.
static NEXT_CHECKOUT: AtomicU64 = AtomicU64::new(1);

fn next_checkout() -> u64 {
    NEXT_CHECKOUT.fetch_add(1, Ordering::Relaxed)
}

/// What [`RawObjectPool::release()`] did with a released element.
///
/// Elements in the `Discarded` and `Untracked` variants will never be reused and must be
/// destroyed by the caller.
#[derive(Debug, Eq, PartialEq)]
#[must_use]
#[non_exhaustive]
pub enum Released<E> {
    /// The element is now cached and will be handed out again by `acquire()`.
    Cached,

    /// The slot was discarded (shrink-back after overflow or an invalidated type) and the
    /// element must be destroyed.
    Discarded(E),

    /// The ticket did not refer to a checkout of this pool. The element must be destroyed.
    Untracked(E),
}

impl<E> Released<E> {
    /// The outcome without the element.
    pub fn outcome(&self) -> ReleaseOutcome {
        match self {
            Self::Cached => ReleaseOutcome::Cached,
            Self::Discarded(_) => ReleaseOutcome::Discarded,
            Self::Untracked(_) => ReleaseOutcome::Untracked,
        }
    }

    /// The element that must be destroyed, if any.
    pub fn into_doomed(self) -> Option<E> {
        match self {
            Self::Cached => None,
            Self::Discarded(element) | Self::Untracked(element) => Some(element),
        }
    }
}

/// The single-threaded core of an [`ObjectPool`][crate::ObjectPool].
///
/// Tracks up to `capacity` slots (more during overflow), each of which is in exactly one of
/// three states:
///
/// * free - unbound, waiting in the free bucket;
/// * cached - holding an idle element, a member of the bucket of its type and of the global
///   recency list;
/// * in use - bound to an element that a caller currently holds.
///
/// Within a type, elements are reused most-recently-released first. Across types, the least
/// recently released cached element is evicted when a new element needs a slot.
///
/// This type never destroys elements itself. Every operation that gives up an element returns
/// it to the caller, who is responsible for destroying it. Dropping the pool drops the cached
/// elements in place. Use [`ObjectPool`][crate::ObjectPool] for a thread-safe pool that
/// destroys elements via its backend.
///
/// # Thread safety
///
/// This type is thread-mobile ([`Send`]) if the elements are but it is not meant to be shared.
/// [`ObjectPool`][crate::ObjectPool] wraps it in a mutex.
pub struct RawObjectPool<E, T> {
    slots: Arena<Slot<E, T>>,

    free: SlotList<E, T, Bucket>,

    /// Created lazily on first use of a type and never removed.
    buckets: HashMap<T, SlotList<E, T, Bucket>>,

    /// Head is the most recently released element, tail is the eviction candidate.
    recency: SlotList<E, T, Recency>,

    in_use: usize,

    capacity: usize,
}

impl<E, T> RawObjectPool<E, T>
where
    T: Copy + Debug + Eq + Hash,
{
    /// Creates a pool that caches up to `capacity` elements. All slots are allocated upfront.
    ///
    /// A capacity of zero disables caching: every `acquire()` misses and every released
    /// element is discarded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Arena::with_capacity(capacity);
        let mut free = SlotList::new();

        for _ in 0..capacity {
            let index = slots.insert(Slot::free());
            free.push_front(&mut slots, index);
        }

        Self {
            slots,
            free,
            buckets: HashMap::new(),
            recency: SlotList::new(),
            in_use: 0,
            capacity,
        }
    }

    /// Checks out the most recently released cached element of the type.
    ///
    /// Returns `None` if no element of the type is cached. The caller is then expected to
    /// construct a new element and register it via [`reserve()`][Self::reserve].
    pub fn acquire(&mut self, tag: T) -> Option<(E, Ticket<T>)> {
        let popped = self
            .buckets
            .get_mut(&tag)
            .and_then(|bucket| bucket.pop_front(&mut self.slots));

        let Some(index) = popped else {
            OBJECT_MISSES.with(|e| e.observe_once());
            trace!(?tag, "object cache miss");
            return None;
        };

        self.recency.remove(&mut self.slots, index);

        let checkout = next_checkout();
        let slot = self.slots.get_mut(index);
        debug_assert_eq!(slot.state, SlotState::Cached);

        let element = slot
            .element
            .take()
            .expect("cached slot always holds an element");
        slot.state = SlotState::InUse;
        slot.valid = true;
        slot.checkout = checkout;

        self.in_use = self
            .in_use
            .checked_add(1)
            .expect("cannot have more slots in use than exist");

        OBJECT_HITS.with(|e| e.observe_once());
        trace!(?tag, slot = index, "object cache hit");

        Some((element, Ticket::new(index, checkout, tag)))
    }

    /// Starts tracking a freshly constructed element of the type, which the caller holds.
    ///
    /// The slot is taken from the free bucket if possible. Otherwise the least recently
    /// released cached element of any type is evicted and its slot reused; the evicted element
    /// is returned and must be destroyed by the caller. If there is nothing to evict either,
    /// the pool temporarily grows beyond its capacity and shrinks back on a later release.
    pub fn reserve(&mut self, tag: T) -> (Ticket<T>, Option<E>) {
        let mut evicted = None;

        let index = if let Some(index) = self.free.pop_front(&mut self.slots) {
            index
        } else if let Some(index) = self.recency.pop_back(&mut self.slots) {
            let evicted_tag = self
                .slots
                .get(index)
                .tag
                .expect("cached slot always has a type tag");

            self.buckets
                .get_mut(&evicted_tag)
                .expect("cached slot is always a member of the bucket of its type")
                .remove(&mut self.slots, index);

            let slot = self.slots.get_mut(index);
            evicted = Some(
                slot.element
                    .take()
                    .expect("cached slot always holds an element"),
            );
            slot.reset();

            OBJECT_EVICTIONS.with(|e| e.observe_once());
            debug!(
                ?evicted_tag,
                slot = index,
                "evicted least recently released element"
            );

            index
        } else {
            let index = self.slots.insert(Slot::free());

            OBJECT_OVERFLOW_ALLOCATIONS.with(|e| e.observe_once());
            debug!(
                current_capacity = self.slots.len(),
                capacity = self.capacity,
                "all slots in use, growing beyond capacity"
            );

            index
        };

        self.buckets.entry(tag).or_default();

        let checkout = next_checkout();
        let slot = self.slots.get_mut(index);
        slot.tag = Some(tag);
        slot.valid = true;
        slot.state = SlotState::InUse;
        slot.checkout = checkout;

        self.in_use = self
            .in_use
            .checked_add(1)
            .expect("cannot have more slots in use than exist");

        (Ticket::new(index, checkout, tag), evicted)
    }

    /// Gives back an element that was checked out with the ticket.
    ///
    /// The element is cached unless the pool is above its capacity (the slot is then discarded
    /// to shrink the pool back) or the type of the element was invalidated while it was checked
    /// out. An element released with a ticket this pool does not recognize is returned as
    /// untracked.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::ReleasedTwice`] if the checkout named by the ticket was already
    /// released and the element has not been acquired since. The element passed in is dropped.
    pub fn release(&mut self, ticket: Ticket<T>, element: E) -> Result<Released<E>, UsageError> {
        let index = ticket.slot();

        let state = match self.slots.try_get(index) {
            Some(slot) if slot.checkout == ticket.checkout() => slot.state,
            _ => SlotState::Free,
        };

        match state {
            SlotState::Cached => return Err(UsageError::ReleasedTwice { slot: index }),
            SlotState::Free => {
                trace!(tag = ?ticket.tag(), slot = index, "released untracked element");
                return Ok(Released::Untracked(element));
            }
            SlotState::InUse => {}
        }

        self.in_use = self
            .in_use
            .checked_sub(1)
            .expect("an in-use slot was found so the count must be non-zero");

        if !self.slots.get(index).valid {
            self.retire(index);

            OBJECT_INVALIDATIONS.with(|e| e.observe_once());
            debug!(tag = ?ticket.tag(), slot = index, "discarded element of invalidated type");

            return Ok(Released::Discarded(element));
        }

        if self.slots.len() > self.capacity {
            self.retire(index);

            OBJECT_SHRINKS.with(|e| e.observe_once());
            debug!(
                current_capacity = self.slots.len(),
                capacity = self.capacity,
                "shrank back towards capacity"
            );

            return Ok(Released::Discarded(element));
        }

        let slot = self.slots.get_mut(index);
        slot.element = Some(element);
        slot.state = SlotState::Cached;

        self.buckets
            .entry(ticket.tag())
            .or_default()
            .push_front(&mut self.slots, index);
        self.recency.push_front(&mut self.slots, index);

        Ok(Released::Cached)
    }

    /// Reverts a [`reserve()`][Self::reserve] whose element never came to exist, releasing the
    /// slot without caching anything. Unknown or stale tickets are ignored.
    pub(crate) fn abandon(&mut self, ticket: Ticket<T>) {
        let index = ticket.slot();

        let checked_out = self.slots.try_get(index).is_some_and(|slot| {
            slot.checkout == ticket.checkout() && slot.state == SlotState::InUse
        });

        if !checked_out {
            return;
        }

        self.in_use = self
            .in_use
            .checked_sub(1)
            .expect("an in-use slot was found so the count must be non-zero");

        self.retire(index);
    }

    /// Removes every cached element of the type from the pool, returning them for destruction.
    ///
    /// Every element currently checked out, of any type, is also marked invalid and will be
    /// discarded rather than cached when it is released. The in-use slots carry no per-type
    /// index, so the invalidation errs on the side of discarding too much.
    pub fn invalidate_type(&mut self, tag: T) -> Vec<E> {
        let mut doomed = Vec::new();

        if let Some(bucket) = self.buckets.get_mut(&tag) {
            Self::drain_bucket(
                bucket,
                &mut self.slots,
                &mut self.recency,
                &mut self.free,
                &mut doomed,
            );
        }

        let marked = self.mark_in_use_invalid();
        debug!(
            ?tag,
            dropped = doomed.len(),
            marked,
            "invalidated cached elements of type"
        );

        doomed
    }

    /// Removes every cached element of every type from the pool, returning them for
    /// destruction, and marks every element currently checked out as invalid.
    ///
    /// This is linear in the number of slots.
    pub fn invalidate_all(&mut self) -> Vec<E> {
        let mut doomed = Vec::with_capacity(self.recency.len());

        for bucket in self.buckets.values_mut() {
            Self::drain_bucket(
                bucket,
                &mut self.slots,
                &mut self.recency,
                &mut self.free,
                &mut doomed,
            );
        }

        let marked = self.mark_in_use_invalid();
        debug!(dropped = doomed.len(), marked, "invalidated all cached elements");

        doomed
    }

    /// The number of cached elements, of all types. Excludes free and in-use slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.recency.len()
    }

    /// The number of cached elements of the type.
    #[must_use]
    pub fn size_of(&self, tag: T) -> usize {
        self.buckets.get(&tag).map_or(0, IntrusiveList::len)
    }

    /// Whether the pool caches no elements at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }

    /// The number of elements currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of slots that currently exist. Equal to the capacity unless the pool has
    /// temporarily grown beyond it because all slots were checked out.
    #[must_use]
    pub fn current_capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lets go of a slot that is no longer in use and holds no element: the slot is discarded
    /// if the pool is above capacity, otherwise it goes back to the free bucket.
    fn retire(&mut self, index: usize) {
        if self.slots.len() > self.capacity {
            drop(self.slots.remove(index));
        } else {
            self.slots.get_mut(index).reset();
            self.free.push_front(&mut self.slots, index);
        }
    }

    fn drain_bucket(
        bucket: &mut SlotList<E, T, Bucket>,
        slots: &mut Arena<Slot<E, T>>,
        recency: &mut SlotList<E, T, Recency>,
        free: &mut SlotList<E, T, Bucket>,
        doomed: &mut Vec<E>,
    ) {
        while let Some(index) = bucket.pop_front(slots) {
            recency.remove(slots, index);

            let slot = slots.get_mut(index);
            doomed.push(
                slot.element
                    .take()
                    .expect("cached slot always holds an element"),
            );
            slot.reset();

            free.push_front(slots, index);

            OBJECT_INVALIDATIONS.with(|e| e.observe_once());
        }
    }

    fn mark_in_use_invalid(&mut self) -> usize {
        let mut marked: usize = 0;

        for slot in self.slots.values_mut() {
            if slot.state == SlotState::InUse {
                slot.valid = false;
                marked = marked
                    .checked_add(1)
                    .expect("cannot have more slots than usize::MAX");
            }
        }

        marked
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        let mut free: usize = 0;
        let mut cached: usize = 0;
        let mut in_use: usize = 0;

        for (index, slot) in self.slots.iter() {
            match slot.state {
                SlotState::Free => {
                    assert!(
                        slot.element.is_none() && slot.tag.is_none(),
                        "free slot {index} is still bound in pool of {}",
                        type_name::<E>()
                    );
                    free = free.checked_add(1).expect("bounded by slot count");
                }
                SlotState::Cached => {
                    assert!(
                        slot.element.is_some() && slot.tag.is_some(),
                        "cached slot {index} is not bound in pool of {}",
                        type_name::<E>()
                    );
                    cached = cached.checked_add(1).expect("bounded by slot count");
                }
                SlotState::InUse => {
                    assert!(
                        slot.element.is_none() && slot.tag.is_some(),
                        "in-use slot {index} holds an element in pool of {}",
                        type_name::<E>()
                    );
                    in_use = in_use.checked_add(1).expect("bounded by slot count");
                }
            }
        }

        let free_members: Vec<_> = self.free.iter(&self.slots).collect();
        assert_eq!(free_members.len(), self.free.len());
        assert_eq!(free_members.len(), free);
        for index in free_members {
            assert_eq!(self.slots.get(index).state, SlotState::Free);
        }

        let recency_members: Vec<_> = self.recency.iter(&self.slots).collect();
        assert_eq!(recency_members.len(), self.recency.len());
        assert_eq!(recency_members.len(), cached);
        for index in recency_members {
            assert_eq!(self.slots.get(index).state, SlotState::Cached);
        }

        let mut bucketed: usize = 0;
        for (tag, bucket) in &self.buckets {
            let members: Vec<_> = bucket.iter(&self.slots).collect();
            assert_eq!(members.len(), bucket.len());

            for index in members {
                let slot = self.slots.get(index);
                assert_eq!(slot.state, SlotState::Cached);
                assert_eq!(slot.tag, Some(*tag));
                bucketed = bucketed.checked_add(1).expect("bounded by slot count");
            }
        }
        assert_eq!(bucketed, cached);

        assert_eq!(in_use, self.in_use);
        assert_eq!(
            free.checked_add(cached)
                .and_then(|sum| sum.checked_add(in_use)),
            Some(self.slots.len())
        );

        // Overflow only happens when every slot is in use and every release above capacity
        // shrinks, so the excess can never exceed the number of outstanding checkouts.
        let excess = self
            .slots
            .len()
            .checked_sub(self.capacity)
            .expect("the pool never shrinks below its capacity");
        assert!(
            excess <= self.in_use,
            "overflow of {excess} slots exceeds {} checkouts in pool of {}",
            self.in_use,
            type_name::<E>()
        );
    }
}

impl<E, T> Debug for RawObjectPool<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .field("current_capacity", &self.slots.len())
            .field("cached", &self.recency.len())
            .field("in_use", &self.in_use)
            .field("free", &self.free.len())
            .field("types", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(
        clippy::arithmetic_side_effects,
        clippy::cast_possible_truncation,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::metrics::total_count;

    assert_impl_all!(RawObjectPool<String, u8>: Send, Debug);

    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    enum Kind {
        Customer,
        Order,
    }

    /// Reserves and releases the element, leaving it cached.
    fn cache(pool: &mut RawObjectPool<&'static str, Kind>, element: &'static str, tag: Kind) {
        let (ticket, evicted) = pool.reserve(tag);
        assert!(evicted.is_none());
        assert_eq!(pool.release(ticket, element), Ok(Released::Cached));
    }

    #[test]
    fn starts_with_all_slots_free() {
        let pool = RawObjectPool::<&str, Kind>::new(4);

        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.current_capacity(), 4);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.in_use(), 0);
        assert!(pool.is_empty());
        pool.integrity_check();
    }

    #[test]
    fn acquire_on_unknown_type_misses() {
        let mut pool = RawObjectPool::<&str, Kind>::new(4);

        assert!(pool.acquire(Kind::Customer).is_none());
    }

    #[test]
    fn round_trip_returns_same_element() {
        let mut pool = RawObjectPool::new(4);

        let (ticket, _) = pool.reserve(Kind::Customer);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.release(ticket, "alice"), Ok(Released::Cached));
        assert_eq!(pool.size_of(Kind::Customer), 1);

        let (element, ticket) = pool.acquire(Kind::Customer).expect("element was cached");
        assert_eq!(element, "alice");
        assert_eq!(ticket.tag(), Kind::Customer);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.in_use(), 1);
        pool.integrity_check();
    }

    #[test]
    fn reuse_within_type_is_most_recent_first() {
        let mut pool = RawObjectPool::new(4);

        cache(&mut pool, "first", Kind::Customer);
        cache(&mut pool, "second", Kind::Customer);
        cache(&mut pool, "third", Kind::Customer);

        assert_eq!(pool.acquire(Kind::Customer).map(|(e, _)| e), Some("third"));
        assert_eq!(pool.acquire(Kind::Customer).map(|(e, _)| e), Some("second"));
        assert_eq!(pool.acquire(Kind::Customer).map(|(e, _)| e), Some("first"));
        assert!(pool.acquire(Kind::Customer).is_none());
    }

    #[test]
    fn acquire_never_crosses_types() {
        let mut pool = RawObjectPool::new(4);

        cache(&mut pool, "order", Kind::Order);

        assert!(pool.acquire(Kind::Customer).is_none());
        assert_eq!(pool.size_of(Kind::Order), 1);
    }

    #[test]
    fn reserve_evicts_least_recently_released_across_types() {
        let mut pool = RawObjectPool::new(3);

        cache(&mut pool, "oldest", Kind::Customer);
        cache(&mut pool, "middle", Kind::Order);
        cache(&mut pool, "newest", Kind::Customer);

        let (_ticket, evicted) = pool.reserve(Kind::Order);
        assert_eq!(evicted, Some("oldest"));
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.size_of(Kind::Customer), 1);
        assert_eq!(pool.size_of(Kind::Order), 1);
        assert_eq!(pool.current_capacity(), 3);

        let (_ticket, evicted) = pool.reserve(Kind::Order);
        assert_eq!(evicted, Some("middle"));
        pool.integrity_check();
    }

    #[test]
    fn acquired_element_is_not_an_eviction_candidate() {
        let mut pool = RawObjectPool::new(2);

        cache(&mut pool, "a", Kind::Customer);
        cache(&mut pool, "b", Kind::Order);

        let (element, ticket) = pool.acquire(Kind::Customer).expect("cached");
        assert_eq!(pool.release(ticket, element), Ok(Released::Cached));

        // "a" was released again after "b", so "b" is now the oldest.
        let (_ticket, evicted) = pool.reserve(Kind::Order);
        assert_eq!(evicted, Some("b"));
    }

    #[test]
    fn overflow_grows_and_shrinks_back() {
        let mut pool = RawObjectPool::new(2);

        let (t1, _) = pool.reserve(Kind::Customer);
        let (t2, _) = pool.reserve(Kind::Customer);
        let (t3, evicted) = pool.reserve(Kind::Customer);

        assert!(evicted.is_none());
        assert_eq!(pool.current_capacity(), 3);
        assert_eq!(pool.in_use(), 3);
        pool.integrity_check();

        assert_eq!(pool.release(t1, "one"), Ok(Released::Discarded("one")));
        assert_eq!(pool.current_capacity(), 2);

        assert_eq!(pool.release(t2, "two"), Ok(Released::Cached));
        assert_eq!(pool.release(t3, "three"), Ok(Released::Cached));
        assert_eq!(pool.current_capacity(), 2);
        assert_eq!(pool.size(), 2);
        pool.integrity_check();
    }

    #[test]
    fn zero_capacity_never_caches() {
        let mut pool = RawObjectPool::new(0);

        let (ticket, evicted) = pool.reserve(Kind::Order);
        assert!(evicted.is_none());
        assert_eq!(pool.current_capacity(), 1);

        assert_eq!(pool.release(ticket, "order"), Ok(Released::Discarded("order")));
        assert_eq!(pool.current_capacity(), 0);
        assert!(pool.acquire(Kind::Order).is_none());
        pool.integrity_check();
    }

    #[test]
    fn double_release_is_usage_error() {
        let mut pool = RawObjectPool::new(2);

        let (ticket, _) = pool.reserve(Kind::Customer);
        assert_eq!(pool.release(ticket, "alice"), Ok(Released::Cached));

        assert_eq!(
            pool.release(ticket, "alice"),
            Err(UsageError::ReleasedTwice {
                slot: ticket.slot()
            })
        );

        assert_eq!(pool.size(), 1);
        pool.integrity_check();
    }

    #[test]
    fn stale_ticket_is_untracked() {
        let mut pool = RawObjectPool::new(1);

        let (ticket, _) = pool.reserve(Kind::Customer);
        assert_eq!(pool.release(ticket, "alice"), Ok(Released::Cached));

        // Someone else checks the element out again, which makes the old ticket stale.
        let (element, fresh) = pool.acquire(Kind::Customer).expect("cached");
        assert_ne!(ticket, fresh);

        assert_eq!(
            pool.release(ticket, "impostor"),
            Ok(Released::Untracked("impostor"))
        );
        assert_eq!(pool.release(fresh, element), Ok(Released::Cached));
        pool.integrity_check();
    }

    #[test]
    fn ticket_from_other_pool_is_untracked() {
        let mut other = RawObjectPool::<&str, Kind>::new(8);
        let (foreign, _) = other.reserve(Kind::Order);

        let mut pool = RawObjectPool::<&str, Kind>::new(1);

        assert_eq!(
            pool.release(foreign, "stranger"),
            Ok(Released::Untracked("stranger"))
        );
        pool.integrity_check();
    }

    #[test]
    fn ticket_from_same_shaped_pool_is_untracked() {
        let mut first = RawObjectPool::<&str, Kind>::new(2);
        let mut second = RawObjectPool::<&str, Kind>::new(2);

        let (foreign, _) = first.reserve(Kind::Order);
        let (own, _) = second.reserve(Kind::Order);
        assert_eq!(foreign.slot(), own.slot());

        assert_eq!(
            second.release(foreign, "stranger"),
            Ok(Released::Untracked("stranger"))
        );
        assert_eq!(second.in_use(), 1);
        assert_eq!(second.size(), 0);

        // The real holder is unaffected.
        assert_eq!(second.release(own, "owned"), Ok(Released::Cached));
        assert_eq!(first.release(foreign, "mine"), Ok(Released::Cached));

        first.integrity_check();
        second.integrity_check();
    }

    #[test]
    fn eviction_is_counted() {
        let before = total_count("reuse_pool_object_evictions");

        let mut pool = RawObjectPool::new(1);
        cache(&mut pool, "old", Kind::Customer);
        let (_ticket, evicted) = pool.reserve(Kind::Order);
        assert_eq!(evicted, Some("old"));

        assert!(total_count("reuse_pool_object_evictions") > before);
    }

    #[test]
    fn invalidate_type_frees_cached_slots_and_marks_in_use() {
        let mut pool = RawObjectPool::new(10);

        for element in ["c1", "c2", "c3", "c4", "c5"] {
            cache(&mut pool, element, Kind::Customer);
        }
        for element in ["o1", "o2", "o3"] {
            cache(&mut pool, element, Kind::Order);
        }

        let (checked_out, _) = pool.reserve(Kind::Customer);
        let (other_type, _) = pool.reserve(Kind::Order);

        let mut doomed = pool.invalidate_type(Kind::Customer);
        doomed.sort_unstable();
        assert_eq!(doomed, vec!["c1", "c2", "c3", "c4", "c5"]);

        assert_eq!(pool.size(), 3);
        assert_eq!(pool.size_of(Kind::Customer), 0);
        assert_eq!(pool.size_of(Kind::Order), 3);
        pool.integrity_check();

        assert_eq!(
            pool.release(checked_out, "c6"),
            Ok(Released::Discarded("c6"))
        );
        assert_eq!(pool.size_of(Kind::Customer), 0);

        // The invalidation is deliberately over-broad and also hits other types.
        assert_eq!(
            pool.release(other_type, "o4"),
            Ok(Released::Discarded("o4"))
        );
        assert_eq!(pool.size_of(Kind::Order), 3);

        assert_eq!(pool.current_capacity(), 10);
        pool.integrity_check();
    }

    #[test]
    fn invalidated_slots_are_reused() {
        let mut pool = RawObjectPool::new(2);

        cache(&mut pool, "a", Kind::Customer);
        cache(&mut pool, "b", Kind::Customer);

        assert_eq!(pool.invalidate_type(Kind::Customer).len(), 2);

        // Slots went back to the free bucket, so nothing needs to be evicted or grown.
        let (_ticket, evicted) = pool.reserve(Kind::Order);
        assert!(evicted.is_none());
        assert_eq!(pool.current_capacity(), 2);
    }

    #[test]
    fn reacquired_element_is_valid_again() {
        let mut pool = RawObjectPool::new(2);

        let (checked_out, _) = pool.reserve(Kind::Order);
        _ = pool.invalidate_type(Kind::Customer);
        assert_eq!(
            pool.release(checked_out, "x"),
            Ok(Released::Discarded("x"))
        );

        cache(&mut pool, "y", Kind::Order);
        let (element, ticket) = pool.acquire(Kind::Order).expect("cached");
        assert_eq!(pool.release(ticket, element), Ok(Released::Cached));
    }

    #[test]
    fn invalidate_all_empties_every_bucket() {
        let mut pool = RawObjectPool::new(4);

        cache(&mut pool, "c", Kind::Customer);
        cache(&mut pool, "o", Kind::Order);
        let (checked_out, _) = pool.reserve(Kind::Order);

        let mut doomed = pool.invalidate_all();
        doomed.sort_unstable();
        assert_eq!(doomed, vec!["c", "o"]);
        assert!(pool.is_empty());

        assert_eq!(
            pool.release(checked_out, "late"),
            Ok(Released::Discarded("late"))
        );
        assert_eq!(pool.current_capacity(), 4);
        pool.integrity_check();
    }

    #[test]
    fn invalidated_overflow_slot_is_discarded() {
        let mut pool = RawObjectPool::new(1);

        let (t1, _) = pool.reserve(Kind::Customer);
        let (t2, _) = pool.reserve(Kind::Customer);
        assert_eq!(pool.current_capacity(), 2);

        _ = pool.invalidate_all();

        assert_eq!(pool.release(t1, "1"), Ok(Released::Discarded("1")));
        assert_eq!(pool.current_capacity(), 1);
        assert_eq!(pool.release(t2, "2"), Ok(Released::Discarded("2")));
        assert_eq!(pool.current_capacity(), 1);
        assert_eq!(pool.size(), 0);
        pool.integrity_check();
    }

    #[test]
    fn abandon_returns_slot() {
        let mut pool = RawObjectPool::<&str, Kind>::new(1);

        let (ticket, _) = pool.reserve(Kind::Order);
        pool.abandon(ticket);

        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.current_capacity(), 1);

        // A second abandon is ignored.
        pool.abandon(ticket);
        assert_eq!(pool.current_capacity(), 1);
        pool.integrity_check();
    }

    #[test]
    fn released_outcome_exposes_doomed_element() {
        let released: Released<u8> = Released::Discarded(5);
        assert_eq!(released.outcome(), ReleaseOutcome::Discarded);
        assert_eq!(released.into_doomed(), Some(5));

        let released: Released<u8> = Released::Cached;
        assert_eq!(released.outcome(), ReleaseOutcome::Cached);
        assert_eq!(released.into_doomed(), None);
    }

    #[test]
    fn random_operations_preserve_invariants() {
        const CAPACITY: usize = 8;
        const TAGS: u8 = 4;

        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut pool = RawObjectPool::<u64, u8>::new(CAPACITY);

        let mut outstanding: Vec<(u64, Ticket<u8>)> = Vec::new();
        let mut destroyed = HashSet::new();
        let mut created: u64 = 0;

        for _ in 0..20_000 {
            let tag = rng.random_range(0..TAGS);

            match rng.random_range(0..10) {
                0..=2 => {
                    if let Some(checkout) = pool.acquire(tag) {
                        outstanding.push(checkout);
                    }
                }
                3..=4 => {
                    created += 1;
                    let (ticket, evicted) = pool.reserve(tag);
                    outstanding.push((created, ticket));

                    if let Some(evicted) = evicted {
                        assert!(destroyed.insert(evicted), "destroyed twice: {evicted}");
                    }
                }
                5..=8 => {
                    if !outstanding.is_empty() {
                        let (element, ticket) =
                            outstanding.swap_remove(rng.random_range(0..outstanding.len()));

                        let released = pool.release(ticket, element).expect("released once");
                        if let Some(doomed) = released.into_doomed() {
                            assert!(destroyed.insert(doomed), "destroyed twice: {doomed}");
                        }
                    }
                }
                _ => {
                    for doomed in pool.invalidate_type(tag) {
                        assert!(destroyed.insert(doomed), "destroyed twice: {doomed}");
                    }
                }
            }

            pool.integrity_check();

            if outstanding.is_empty() {
                assert_eq!(pool.current_capacity(), CAPACITY);
            }
            assert!(pool.size() <= CAPACITY);
        }

        // Every element ever created is accounted for exactly once.
        let accounted = destroyed.len() + pool.size() + outstanding.len();
        assert_eq!(accounted as u64, created);
    }
}
