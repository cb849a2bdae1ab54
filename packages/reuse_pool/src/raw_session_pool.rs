use std::any::type_name;
use std::fmt;
use std::mem;

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::UsageError;
use crate::arena::Arena;
use crate::list::{IntrusiveList, Linked, Links};
use crate::metrics::{SESSION_EVICTIONS, SESSION_HITS, SESSION_MISSES};

/// List family of the global recency list across all partitions.
#[derive(Debug)]
struct Recency;

/// List family of the per-partition queues.
#[derive(Debug)]
struct Partition;

#[derive(Debug)]
struct Entry<S> {
    session: S,

    /// Key of the queue this entry is a member of. Taken out when the entry is unlinked.
    partition: String,

    recency: Links,
    queue: Links,
}

impl<S> Linked<Recency> for Entry<S> {
    fn links(&self) -> &Links {
        &self.recency
    }

    fn links_mut(&mut self) -> &mut Links {
        &mut self.recency
    }
}

impl<S> Linked<Partition> for Entry<S> {
    fn links(&self) -> &Links {
        &self.queue
    }

    fn links_mut(&mut self) -> &mut Links {
        &mut self.queue
    }
}

type EntryList<S, L> = IntrusiveList<Entry<S>, L>;

/// What [`RawSessionPool::release()`] did with a released session.
///
/// Sessions in the `Evicted` and `Declined` variants are no longer owned by the pool and must be
/// closed by the caller.
#[derive(Debug, Eq, PartialEq)]
#[must_use]
#[non_exhaustive]
pub enum Stashed<S> {
    /// The session is now cached.
    Cached,

    /// The session is now cached and the pool went over capacity, so the session that had been
    /// idle the longest, in any partition, was evicted.
    Evicted(S),

    /// The pool has zero capacity and did not take the session.
    Declined(S),
}

impl<S> Stashed<S> {
    /// The session that must be closed, if any.
    pub fn into_doomed(self) -> Option<S> {
        match self {
            Self::Cached => None,
            Self::Evicted(session) | Self::Declined(session) => Some(session),
        }
    }
}

/// The single-threaded core of a [`SessionPool`][crate::SessionPool].
///
/// Idle sessions are kept in one queue per partition. A session is only ever handed out again
/// for the partition it was released under. The total number of idle sessions across all
/// partitions is bounded by the capacity; going over it evicts the session that has been idle
/// the longest, regardless of partition.
///
/// Partitions exist only while they have idle sessions.
///
/// Like [`RawObjectPool`][crate::RawObjectPool], this type never closes sessions itself: every
/// session it gives up is returned to the caller. Dropping the pool drops the idle sessions in
/// place.
///
/// # Thread safety
///
/// This type is thread-mobile ([`Send`]) if the sessions are.
/// [`SessionPool`][crate::SessionPool] wraps it in a mutex.
pub struct RawSessionPool<S> {
    entries: Arena<Entry<S>>,

    /// Head of each queue is the most recently released session of that partition.
    partitions: HashMap<String, EntryList<S, Partition>>,

    /// Head is the most recently released session, tail is the eviction candidate.
    recency: EntryList<S, Recency>,

    capacity: usize,
}

impl<S> RawSessionPool<S> {
    /// Creates a pool that caches up to `capacity` idle sessions.
    ///
    /// A capacity of zero disables caching: every `acquire()` misses and every released session
    /// is declined.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arena::with_capacity(capacity),
            partitions: HashMap::new(),
            recency: EntryList::new(),
            capacity,
        }
    }

    /// Takes an idle session of the partition out of the pool.
    ///
    /// Returns `None` if the partition has no idle sessions.
    pub fn acquire(&mut self, partition: &str) -> Option<S> {
        let popped = self
            .partitions
            .get_mut(partition)
            .and_then(|queue| queue.pop_front(&mut self.entries));

        let Some(index) = popped else {
            SESSION_MISSES.with(|e| e.observe_once());
            trace!(partition, "session cache miss");
            return None;
        };

        if self
            .partitions
            .get(partition)
            .is_some_and(IntrusiveList::is_empty)
        {
            self.partitions.remove(partition);
        }

        self.recency.remove(&mut self.entries, index);

        SESSION_HITS.with(|e| e.observe_once());
        trace!(partition, "session cache hit");

        Some(self.entries.remove(index).session)
    }

    /// Caches an idle session under the partition.
    ///
    /// If this takes the pool over capacity, the session that has been idle the longest is
    /// evicted and returned to the caller for closing.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EmptyPartition`] if the partition name is empty. The session is
    /// dropped.
    pub fn release(&mut self, partition: &str, session: S) -> Result<Stashed<S>, UsageError> {
        if partition.is_empty() {
            return Err(UsageError::EmptyPartition);
        }

        if self.capacity == 0 {
            return Ok(Stashed::Declined(session));
        }

        let index = self.entries.insert(Entry {
            session,
            partition: partition.to_owned(),
            recency: Links::default(),
            queue: Links::default(),
        });

        if !self.partitions.contains_key(partition) {
            self.partitions
                .insert(partition.to_owned(), EntryList::new());
        }

        self.partitions
            .get_mut(partition)
            .expect("partition queue was created above")
            .push_front(&mut self.entries, index);
        self.recency.push_front(&mut self.entries, index);

        if self.entries.len() <= self.capacity {
            return Ok(Stashed::Cached);
        }

        Ok(Stashed::Evicted(self.evict_oldest()))
    }

    /// Takes every idle session of the partition out of the pool, returning them for closing.
    pub fn remove_partition(&mut self, partition: &str) -> Vec<S> {
        let Some(mut queue) = self.partitions.remove(partition) else {
            return Vec::new();
        };

        let drained = self.drain_queue(&mut queue);
        debug!(partition, removed = drained.len(), "removed session partition");

        drained
    }

    /// Takes every idle session of every partition out of the pool, returning them for closing.
    pub fn clear(&mut self) -> Vec<S> {
        if self.capacity == 0 {
            return Vec::new();
        }

        let mut drained = Vec::with_capacity(self.recency.len());

        for (_, mut queue) in mem::take(&mut self.partitions) {
            drained.append(&mut self.drain_queue(&mut queue));
        }

        debug!(removed = drained.len(), "cleared all session partitions");

        drained
    }

    /// The number of idle sessions across all partitions.
    #[must_use]
    pub fn size(&self) -> usize {
        self.recency.len()
    }

    /// The number of idle sessions of the partition.
    #[must_use]
    pub fn size_of(&self, partition: &str) -> usize {
        self.partitions
            .get(partition)
            .map_or(0, IntrusiveList::len)
    }

    /// Whether the pool holds no idle sessions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_oldest(&mut self) -> S {
        let index = self
            .recency
            .pop_back(&mut self.entries)
            .expect("a pool over capacity always has idle sessions");

        let partition = mem::take(&mut self.entries.get_mut(index).partition);

        let queue = self
            .partitions
            .get_mut(&partition)
            .expect("idle session is always a member of the queue of its partition");
        queue.remove(&mut self.entries, index);

        if queue.is_empty() {
            self.partitions.remove(&partition);
        }

        SESSION_EVICTIONS.with(|e| e.observe_once());
        debug!(
            %partition,
            capacity = self.capacity,
            "evicted least recently released session"
        );

        self.entries.remove(index).session
    }

    fn drain_queue(&mut self, queue: &mut EntryList<S, Partition>) -> Vec<S> {
        let mut drained = Vec::with_capacity(queue.len());

        while let Some(index) = queue.pop_front(&mut self.entries) {
            self.recency.remove(&mut self.entries, index);
            drained.push(self.entries.remove(index).session);
        }

        drained
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        assert!(
            self.entries.len() <= self.capacity,
            "{} idle sessions exceed capacity {} in pool of {}",
            self.entries.len(),
            self.capacity,
            type_name::<S>()
        );

        let recency_members: Vec<_> = self.recency.iter(&self.entries).collect();
        assert_eq!(recency_members.len(), self.recency.len());
        assert_eq!(recency_members.len(), self.entries.len());

        let mut queued: usize = 0;
        for (partition, queue) in &self.partitions {
            assert!(
                !queue.is_empty(),
                "empty queue for partition '{partition}' was not removed"
            );

            let members: Vec<_> = queue.iter(&self.entries).collect();
            assert_eq!(members.len(), queue.len());

            for index in members {
                assert_eq!(&self.entries.get(index).partition, partition);
                queued = queued.checked_add(1).expect("bounded by entry count");
            }
        }
        assert_eq!(queued, self.entries.len());
    }
}

impl<S> fmt::Debug for RawSessionPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .field("cached", &self.recency.len())
            .field("partitions", &self.partitions.len())
            .finish()
    }
}
