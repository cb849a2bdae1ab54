//! Metrics for the pools.
//!
//! Every structural decision a pool makes is observed as an occurrence of a counter event.
//! The events use per-thread instances to minimize contention.

use nm::Event;
#[cfg(test)]
use nm::Report;

thread_local! {
    /// An object pool `acquire()` found a cached element.
    pub(crate) static OBJECT_HITS: Event = Event::builder()
        .name("reuse_pool_object_hits")
        .build();

    /// An object pool `acquire()` found no cached element for the type.
    pub(crate) static OBJECT_MISSES: Event = Event::builder()
        .name("reuse_pool_object_misses")
        .build();

    /// A `reserve()` had to evict the least recently released cached element.
    pub(crate) static OBJECT_EVICTIONS: Event = Event::builder()
        .name("reuse_pool_object_evictions")
        .build();

    /// A `reserve()` found no reusable slot and grew the pool beyond its capacity.
    pub(crate) static OBJECT_OVERFLOW_ALLOCATIONS: Event = Event::builder()
        .name("reuse_pool_object_overflow_allocations")
        .build();

    /// A `release()` shrank an overflowed pool back by discarding the slot.
    pub(crate) static OBJECT_SHRINKS: Event = Event::builder()
        .name("reuse_pool_object_shrinks")
        .build();

    /// A cached or released element was destroyed because its type was invalidated.
    pub(crate) static OBJECT_INVALIDATIONS: Event = Event::builder()
        .name("reuse_pool_object_invalidations")
        .build();

    /// A session pool `acquire()` found an idle session for the partition.
    pub(crate) static SESSION_HITS: Event = Event::builder()
        .name("reuse_pool_session_hits")
        .build();

    /// A session pool `acquire()` found no idle session for the partition.
    pub(crate) static SESSION_MISSES: Event = Event::builder()
        .name("reuse_pool_session_misses")
        .build();

    /// A `release()` pushed the session pool over capacity and the oldest idle session was closed.
    pub(crate) static SESSION_EVICTIONS: Event = Event::builder()
        .name("reuse_pool_session_evictions")
        .build();
}

/// Total occurrences of the named event observed so far on all threads.
#[cfg(test)]
pub(crate) fn total_count(name: &str) -> u64 {
    Report::collect()
        .events()
        .find(|event| &**event.name() == name)
        .map_or(0, |event| event.count())
}
