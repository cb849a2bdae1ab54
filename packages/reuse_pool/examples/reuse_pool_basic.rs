//! Basic usage example for `ObjectPool` and `SessionPool`.
//!
//! Demonstrates sizing both pools from a TOML configuration, reusing cached objects, eviction
//! across types and partitions, and detection of a double release.

use std::sync::atomic::{AtomicU64, Ordering};

use reuse_pool::{
    BackendError, CacheConfig, ObjectBackend, ObjectPool, ReleaseOutcome, SessionBackend,
    SessionPool,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Kind {
    Customer,
    Order,
}

/// Hands out numbered records and connections, printing every lifecycle call.
#[derive(Debug, Default)]
struct Records {
    next: AtomicU64,
}

impl ObjectBackend for Records {
    type Element = (Kind, u64);
    type Tag = Kind;

    fn construct(&self, tag: &Kind) -> Result<(Kind, u64), BackendError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        println!("constructing {tag:?} #{id}");
        Ok((*tag, id))
    }

    fn destroy(&self, (kind, id): (Kind, u64)) -> Result<(), BackendError> {
        println!("destroying {kind:?} #{id}");
        Ok(())
    }
}

impl SessionBackend for Records {
    type Session = (String, u64);

    fn open_session(&self, partition: &str) -> Result<(String, u64), BackendError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        println!("opening session #{id} to {partition}");
        Ok((partition.to_owned(), id))
    }

    fn close_session(&self, (partition, id): (String, u64)) -> Result<(), BackendError> {
        println!("closing session #{id} to {partition}");
        Ok(())
    }
}

fn main() -> Result<(), reuse_pool::Error> {
    tracing_subscriber::fmt().init();

    let config = CacheConfig::from_toml_str(
        r"
        max_cached_instances = 2
        max_cached_sessions = 3
        warmup_cached_sessions = 2
        ",
    )?;

    let objects = ObjectPool::from_config(&config, Records::default());

    let (customer, ticket) = objects.acquire_or_construct(Kind::Customer)?;
    objects.release(ticket, customer)?;

    // Same type again: a hit, nothing is constructed.
    let (customer, ticket) = objects.acquire_or_construct(Kind::Customer)?;
    println!("reused {customer:?}");
    objects.release(ticket, customer)?;

    let (order, ticket) = objects.acquire_or_construct(Kind::Order)?;
    let outcome = objects.release(ticket, order)?;
    assert_eq!(outcome, ReleaseOutcome::Cached);

    // The ticket is spent; using it again is a bug in the caller that the pool detects.
    match objects.release(ticket, order) {
        Err(error) => println!("rejected: {error}"),
        Ok(outcome) => println!("unexpectedly accepted: {outcome:?}"),
    }

    println!(
        "object pool holds {} cached ({} customers, {} orders)",
        objects.size(),
        objects.size_of(Kind::Customer),
        objects.size_of(Kind::Order)
    );

    let sessions = SessionPool::from_config(&config, Records::default());
    let opened = sessions.warm_up("inventory", config.warmup_cached_sessions())?;
    println!("warmed up {opened} sessions");

    for partition in ["billing", "shipping"] {
        let session = sessions.acquire_or_open(partition)?;
        // The third idle session pushes out the longest idle one.
        sessions.release(partition, session)?;
    }

    println!(
        "session pool holds {} idle ({} inventory)",
        sessions.size(),
        sessions.size_of("inventory")
    );

    sessions.clear()?;

    Ok(())
}
