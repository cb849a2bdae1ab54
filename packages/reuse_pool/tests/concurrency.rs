//! Exercises both pools from many threads at once and checks that nothing is lost or destroyed
//! twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use reuse_pool::{BackendError, ObjectBackend, ObjectPool, SessionBackend, SessionPool};

const THREADS: u64 = 8;
const ROUNDS: u64 = 2_000;

#[derive(Debug, Default)]
struct Recorder {
    created: AtomicU64,
    destroyed: Mutex<HashSet<u64>>,
}

impl Recorder {
    fn next_id(&self) -> u64 {
        self.created.fetch_add(1, Ordering::Relaxed)
    }

    fn record_destroyed(&self, id: u64) {
        assert!(self.destroyed.lock().insert(id), "{id} destroyed twice");
    }
}

impl ObjectBackend for Recorder {
    type Element = u64;
    type Tag = u64;

    fn construct(&self, _tag: &u64) -> Result<u64, BackendError> {
        Ok(self.next_id())
    }

    fn destroy(&self, element: u64) -> Result<(), BackendError> {
        self.record_destroyed(element);
        Ok(())
    }
}

impl SessionBackend for Recorder {
    type Session = u64;

    fn open_session(&self, _partition: &str) -> Result<u64, BackendError> {
        Ok(self.next_id())
    }

    fn close_session(&self, session: u64) -> Result<(), BackendError> {
        self.record_destroyed(session);
        Ok(())
    }
}

#[cfg_attr(miri, ignore)]
#[test]
fn object_pool_under_contention() {
    let pool = Arc::new(ObjectPool::builder().capacity(16).build(Recorder::default()));

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let tag = (worker + round) % 5;
                    let (element, ticket) = pool.acquire_or_construct(tag).unwrap();

                    if round % 97 == 0 {
                        pool.invalidate_type(tag).unwrap();
                    }

                    pool.release(ticket, element).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(pool.in_use(), 0);
    assert!(pool.size() <= 16);
    assert_eq!(pool.current_capacity(), 16);

    let created = pool.backend().created.load(Ordering::Relaxed);
    let destroyed = pool.backend().destroyed.lock().len() as u64;
    assert_eq!(destroyed + pool.size() as u64, created);
}

#[cfg_attr(miri, ignore)]
#[test]
fn session_pool_under_contention() {
    let pool = Arc::new(SessionPool::builder().capacity(8).build(Recorder::default()));

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let partition = format!("db{}", worker % 3);

                for round in 0..ROUNDS {
                    let session = pool.acquire_or_open(&partition).unwrap();

                    if round % 101 == 0 {
                        pool.remove_partition(&partition).unwrap();
                    }

                    assert_eq!(pool.release(&partition, session).unwrap(), None);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(pool.size() <= 8);

    let created = pool.backend().created.load(Ordering::Relaxed);
    let destroyed = pool.backend().destroyed.lock().len() as u64;
    assert_eq!(destroyed + pool.size() as u64, created);
}
