use std::any::type_name;
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    BackendError, CacheConfig, Error, RawSessionPool, Result, SessionBackend, SessionPoolBuilder,
    Stashed, UsageError,
};

/// A thread-safe cache of open sessions, partitioned by name.
///
/// A partition is typically a logical database. Sessions released under a partition are only
/// handed out again for that partition. At most `capacity` idle sessions are kept across all
/// partitions; releasing one more closes the session that has been idle the longest.
///
/// Sessions that are checked out belong to the caller. The pool only closes sessions it holds
/// idle, through its backend, exactly once each. All index mutation happens under a single lock;
/// backend calls happen after the lock has been released.
///
/// # Example
///
/// ```rust
/// use reuse_pool::{BackendError, SessionBackend, SessionPool};
///
/// #[derive(Debug)]
/// struct Connections;
///
/// impl SessionBackend for Connections {
///     type Session = String;
///
///     fn open_session(&self, partition: &str) -> Result<String, BackendError> {
///         Ok(format!("session to {partition}"))
///     }
///
///     fn close_session(&self, _session: String) -> Result<(), BackendError> {
///         Ok(())
///     }
/// }
///
/// let pool = SessionPool::builder().capacity(8).build(Connections);
///
/// let session = pool.acquire_or_open("inventory")?;
/// pool.release("inventory", session)?;
///
/// assert_eq!(pool.size_of("inventory"), 1);
/// assert!(pool.acquire("inventory").is_some());
/// # Ok::<(), reuse_pool::Error>(())
/// ```
pub struct SessionPool<B>
where
    B: SessionBackend,
{
    backend: B,
    core: Mutex<RawSessionPool<B::Session>>,
}

impl<B> SessionPool<B>
where
    B: SessionBackend,
{
    /// Returns a builder for configuring the pool.
    pub fn builder() -> SessionPoolBuilder<B> {
        SessionPoolBuilder::new()
    }

    /// Creates a pool sized by `max_cached_sessions` of the configuration.
    ///
    /// The pool starts out empty. Call [`warm_up()`][Self::warm_up] with
    /// [`CacheConfig::warmup_cached_sessions()`] to open sessions ahead of demand.
    #[must_use]
    pub fn from_config(config: &CacheConfig, backend: B) -> Self {
        Self::builder()
            .capacity(config.max_cached_sessions())
            .build(backend)
    }

    #[must_use]
    pub(crate) fn new_inner(capacity: usize, backend: B) -> Self {
        Self {
            backend,
            core: Mutex::new(RawSessionPool::new(capacity)),
        }
    }

    /// Takes an idle session of the partition out of the pool.
    ///
    /// Returns `None` on a miss. A miss is not an error: the caller opens a new session.
    pub fn acquire(&self, partition: &str) -> Option<B::Session> {
        self.core.lock().acquire(partition)
    }

    /// Takes an idle session of the partition out of the pool, opening a new one through the
    /// backend on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EmptyPartition`] if the partition name is empty, or
    /// [`Error::Backend`] if opening the session failed.
    pub fn acquire_or_open(&self, partition: &str) -> Result<B::Session> {
        validate_partition(partition)?;

        if let Some(session) = self.acquire(partition) {
            return Ok(session);
        }

        self.backend
            .open_session(partition)
            .map_err(Error::Backend)
    }

    /// Gives back a session that is no longer in use, to be cached under the partition.
    ///
    /// If the pool has zero capacity, the session is handed back as `Some` and the caller must
    /// close it. Otherwise the session is cached and `None` is returned; if this takes the pool
    /// over capacity, the session that has been idle the longest is closed.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EmptyPartition`] if the partition name is empty. The session is
    /// closed in that case.
    ///
    /// Returns [`Error::Backend`] if closing an evicted session failed. The released session is
    /// cached regardless.
    pub fn release(&self, partition: &str, session: B::Session) -> Result<Option<B::Session>> {
        if let Err(error) = validate_partition(partition) {
            if let Err(secondary) = self.backend.close_session(session) {
                warn!(%secondary, "failed to close session released under an empty partition");
            }

            return Err(error);
        }

        let stashed = self.core.lock().release(partition, session)?;

        match stashed {
            Stashed::Cached => Ok(None),
            Stashed::Declined(declined) => Ok(Some(declined)),
            Stashed::Evicted(evicted) => {
                self.backend
                    .close_session(evicted)
                    .map_err(Error::Backend)?;
                Ok(None)
            }
        }
    }

    /// Opens up to `count` sessions for the partition and caches them, so that the next
    /// requests for the partition are hits.
    ///
    /// Never opens more sessions than there is room for in the pool. Returns how many sessions
    /// were opened.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EmptyPartition`] if the partition name is empty, or the first
    /// [`Error::Backend`] raised while opening sessions or closing a session evicted by a
    /// concurrent release. Sessions opened before the failure remain cached.
    pub fn warm_up(&self, partition: &str, count: usize) -> Result<usize> {
        validate_partition(partition)?;

        let room = {
            let core = self.core.lock();
            core.capacity().saturating_sub(core.size())
        };
        let target = count.min(room);

        for _ in 0..target {
            let session = self
                .backend
                .open_session(partition)
                .map_err(Error::Backend)?;

            if let Some(declined) = self.release(partition, session)? {
                self.backend
                    .close_session(declined)
                    .map_err(Error::Backend)?;
            }
        }

        debug!(partition, opened = target, "warmed up session partition");

        Ok(target)
    }

    /// Closes every idle session of the partition.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Backend`] raised while closing sessions. All sessions are
    /// closed regardless; later failures are logged.
    pub fn remove_partition(&self, partition: &str) -> Result<()> {
        let doomed = self.core.lock().remove_partition(partition);
        self.close_all(doomed)
    }

    /// Closes every idle session of every partition.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Backend`] raised while closing sessions. All sessions are
    /// closed regardless; later failures are logged.
    pub fn clear(&self) -> Result<()> {
        let doomed = self.core.lock().clear();
        self.close_all(doomed)
    }

    /// The number of idle sessions across all partitions.
    #[must_use]
    pub fn size(&self) -> usize {
        self.core.lock().size()
    }

    /// The number of idle sessions of the partition.
    #[must_use]
    pub fn size_of(&self, partition: &str) -> usize {
        self.core.lock().size_of(partition)
    }

    /// Whether no sessions are idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.lock().is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.lock().capacity()
    }

    /// The backend that opens and closes the sessions.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn close_all(&self, doomed: Vec<B::Session>) -> Result<()> {
        let mut first_error: Option<BackendError> = None;

        for session in doomed {
            if let Err(error) = self.backend.close_session(session) {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    warn!(%error, "failed to close removed session");
                }
            }
        }

        first_error.map_or(Ok(()), |error| Err(Error::Backend(error)))
    }
}

fn validate_partition(partition: &str) -> Result<()> {
    if partition.is_empty() {
        return Err(UsageError::EmptyPartition.into());
    }

    Ok(())
}

impl<B> Drop for SessionPool<B>
where
    B: SessionBackend,
{
    fn drop(&mut self) {
        for session in self.core.get_mut().clear() {
            if let Err(error) = self.backend.close_session(session) {
                warn!(%error, "failed to close idle session while dropping pool");
            }
        }
    }
}

impl<B> fmt::Debug for SessionPool<B>
where
    B: SessionBackend,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("core", &*self.core.lock())
            .finish_non_exhaustive()
    }
}
