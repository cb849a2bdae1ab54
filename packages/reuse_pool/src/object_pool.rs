use std::any::type_name;
use std::fmt;

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    BackendError, CacheConfig, Error, ObjectBackend, ObjectPoolBuilder, RawObjectPool, Result,
    Ticket,
};

/// What [`ObjectPool::release()`] did with a released element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReleaseOutcome {
    /// The element is cached and will be handed out again for its type.
    Cached,

    /// The element was destroyed because the pool was shrinking back to its capacity or
    /// because its type was invalidated while it was checked out.
    Discarded,

    /// The ticket did not name a checkout of this pool, so the element was destroyed
    /// immediately.
    Untracked,
}

/// A thread-safe cache of expensive-to-construct elements, keyed by type.
///
/// Callers check elements out with [`acquire()`][Self::acquire] and give them back with
/// [`release()`][Self::release]. On a miss the caller constructs a new element and registers it
/// with [`reserve()`][Self::reserve], or lets the pool do both via
/// [`acquire_or_construct()`][Self::acquire_or_construct].
///
/// The pool caches at most `capacity` idle elements. When all slots are checked out, new
/// elements are still accepted: the pool temporarily grows and shrinks back as those elements
/// are released, so callers never block waiting for a slot.
///
/// Elements that will never be reused are destroyed through the backend exactly once. All
/// index mutation happens under a single lock; backend calls happen after the lock has been
/// released.
///
/// # Example
///
/// ```rust
/// use reuse_pool::{BackendError, ObjectBackend, ObjectPool};
///
/// #[derive(Debug)]
/// struct Buffers;
///
/// impl ObjectBackend for Buffers {
///     type Element = Vec<u8>;
///     type Tag = usize;
///
///     fn construct(&self, size: &usize) -> Result<Vec<u8>, BackendError> {
///         Ok(vec![0; *size])
///     }
///
///     fn destroy(&self, _buffer: Vec<u8>) -> Result<(), BackendError> {
///         Ok(())
///     }
/// }
///
/// let pool = ObjectPool::builder().capacity(16).build(Buffers);
///
/// let (buffer, ticket) = pool.acquire_or_construct(1024)?;
/// assert_eq!(buffer.len(), 1024);
/// pool.release(ticket, buffer)?;
///
/// // The second request for the same size reuses the buffer.
/// assert!(pool.acquire(1024).is_some());
/// # Ok::<(), reuse_pool::Error>(())
/// ```
pub struct ObjectPool<B>
where
    B: ObjectBackend,
{
    backend: B,
    core: Mutex<RawObjectPool<B::Element, B::Tag>>,
}

impl<B> ObjectPool<B>
where
    B: ObjectBackend,
{
    /// Returns a builder for configuring the pool.
    pub fn builder() -> ObjectPoolBuilder<B> {
        ObjectPoolBuilder::new()
    }

    /// Creates a pool sized by `max_cached_instances` of the configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig, backend: B) -> Self {
        Self::builder()
            .capacity(config.max_cached_instances())
            .build(backend)
    }

    #[must_use]
    pub(crate) fn new_inner(capacity: usize, backend: B) -> Self {
        Self {
            backend,
            core: Mutex::new(RawObjectPool::new(capacity)),
        }
    }

    /// Checks out the most recently released cached element of the type.
    ///
    /// Returns `None` on a miss. A miss is not an error: the caller constructs a new element
    /// and registers it with [`reserve()`][Self::reserve].
    pub fn acquire(&self, tag: B::Tag) -> Option<(B::Element, Ticket<B::Tag>)> {
        self.core.lock().acquire(tag)
    }

    /// Starts tracking a freshly constructed element of the type, which the caller keeps
    /// holding until it calls [`release()`][Self::release] with the returned ticket.
    ///
    /// If no slot is free, the least recently released cached element of any type is evicted
    /// and destroyed. If nothing is cached either, the pool grows beyond its capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if destroying the evicted element failed. The reservation is
    /// undone in that case and the caller still owns its element.
    pub fn reserve(&self, tag: B::Tag) -> Result<Ticket<B::Tag>> {
        let (ticket, evicted) = self.core.lock().reserve(tag);

        if let Some(evicted) = evicted {
            if let Err(error) = self.backend.destroy(evicted) {
                self.core.lock().abandon(ticket);
                return Err(Error::Backend(error));
            }
        }

        Ok(ticket)
    }

    /// Checks out a cached element of the type, constructing and reserving a new one through
    /// the backend on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if constructing the new element failed, or if destroying an
    /// element evicted to make room for it failed. In the latter case the new element is
    /// destroyed again before returning.
    pub fn acquire_or_construct(&self, tag: B::Tag) -> Result<(B::Element, Ticket<B::Tag>)> {
        if let Some(checkout) = self.acquire(tag) {
            return Ok(checkout);
        }

        let element = self.backend.construct(&tag).map_err(Error::Backend)?;

        match self.reserve(tag) {
            Ok(ticket) => Ok((element, ticket)),
            Err(error) => {
                if let Err(secondary) = self.backend.destroy(element) {
                    warn!(
                        %secondary,
                        ?tag,
                        "failed to destroy element constructed for a failed reservation"
                    );
                }

                Err(error)
            }
        }
    }

    /// Gives back an element that was checked out with the ticket.
    ///
    /// The element is cached for reuse unless the pool is shrinking back from an overflow or
    /// the type of the element was invalidated while it was checked out, in which case it is
    /// destroyed. An element released with a ticket this pool does not recognize is destroyed
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the checkout was already released without being acquired
    /// again in between. This is a bug in the caller. The element passed in is dropped without
    /// being destroyed, as it is likely another handle to an element the pool already owns.
    ///
    /// Returns [`Error::Backend`] if destroying the element failed.
    pub fn release(
        &self,
        ticket: Ticket<B::Tag>,
        element: B::Element,
    ) -> Result<ReleaseOutcome> {
        let released = self.core.lock().release(ticket, element)?;
        let outcome = released.outcome();

        if let Some(doomed) = released.into_doomed() {
            self.backend.destroy(doomed).map_err(Error::Backend)?;
        }

        Ok(outcome)
    }

    /// Destroys every cached element of the type and marks every checked out element (of any
    /// type) so that it is destroyed instead of cached when released.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Backend`] raised while destroying elements. All elements are
    /// destroyed regardless; later failures are logged.
    pub fn invalidate_type(&self, tag: B::Tag) -> Result<()> {
        let doomed = self.core.lock().invalidate_type(tag);
        self.destroy_all(doomed)
    }

    /// Destroys every cached element and marks every checked out element so that it is
    /// destroyed instead of cached when released.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Backend`] raised while destroying elements. All elements are
    /// destroyed regardless; later failures are logged.
    pub fn invalidate_all(&self) -> Result<()> {
        let doomed = self.core.lock().invalidate_all();
        self.destroy_all(doomed)
    }

    /// The number of cached elements of all types. Excludes elements that are checked out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.core.lock().size()
    }

    /// The number of cached elements of the type.
    #[must_use]
    pub fn size_of(&self, tag: B::Tag) -> usize {
        self.core.lock().size_of(tag)
    }

    /// Whether no elements are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.lock().is_empty()
    }

    /// The number of elements currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.core.lock().in_use()
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.lock().capacity()
    }

    /// The number of slots that currently exist, which exceeds the capacity while the pool
    /// has overflowed.
    #[must_use]
    pub fn current_capacity(&self) -> usize {
        self.core.lock().current_capacity()
    }

    /// The backend that constructs and destroys the elements.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn destroy_all(&self, doomed: Vec<B::Element>) -> Result<()> {
        let mut first_error: Option<BackendError> = None;

        for element in doomed {
            if let Err(error) = self.backend.destroy(element) {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    warn!(%error, "failed to destroy invalidated element");
                }
            }
        }

        first_error.map_or(Ok(()), |error| Err(Error::Backend(error)))
    }
}

impl<B> Drop for ObjectPool<B>
where
    B: ObjectBackend,
{
    fn drop(&mut self) {
        for element in self.core.get_mut().invalidate_all() {
            if let Err(error) = self.backend.destroy(element) {
                warn!(%error, "failed to destroy cached element while dropping pool");
            }
        }
    }
}

impl<B> fmt::Debug for ObjectPool<B>
where
    B: ObjectBackend,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("core", &*self.core.lock())
            .finish_non_exhaustive()
    }
}
