use std::any::type_name;
use std::cell::Cell;
use std::fmt::{self, Debug};
use std::marker::PhantomData;

use crate::{ObjectBackend, ObjectPool, SessionBackend, SessionPool};

/// Builder for creating an instance of [`ObjectPool`].
///
/// The capacity defaults to zero, which disables caching: every `acquire()` misses and every
/// released element is destroyed.
///
/// # Examples
///
/// ```
/// use reuse_pool::{BackendError, ObjectBackend, ObjectPool};
///
/// # #[derive(Debug)]
/// # struct Strings;
/// #
/// # impl ObjectBackend for Strings {
/// #     type Element = String;
/// #     type Tag = u8;
/// #
/// #     fn construct(&self, _tag: &u8) -> Result<String, BackendError> {
/// #         Ok(String::new())
/// #     }
/// #
/// #     fn destroy(&self, _element: String) -> Result<(), BackendError> {
/// #         Ok(())
/// #     }
/// # }
/// let pool = ObjectPool::builder().capacity(64).build(Strings);
///
/// assert_eq!(pool.capacity(), 64);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[must_use]
pub struct ObjectPoolBuilder<B> {
    capacity: usize,

    // The backend type is fixed by `build()`, letting `ObjectPool::builder()` infer it.
    _backend: PhantomData<fn() -> B>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl<B> ObjectPoolBuilder<B> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            _backend: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Sets the maximum number of idle elements the pool caches, across all types.
    ///
    /// All slots for this many elements are allocated when the pool is built.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the pool, which will destroy elements through the backend.
    #[must_use]
    #[inline]
    pub fn build(self, backend: B) -> ObjectPool<B>
    where
        B: ObjectBackend,
    {
        ObjectPool::new_inner(self.capacity, backend)
    }
}

impl<B> Debug for ObjectPoolBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Builder for creating an instance of [`SessionPool`].
///
/// The capacity defaults to zero, which disables caching: every `acquire()` misses and every
/// released session is handed back to the caller to close.
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[must_use]
pub struct SessionPoolBuilder<B> {
    capacity: usize,

    // The backend type is fixed by `build()`, letting `SessionPool::builder()` infer it.
    _backend: PhantomData<fn() -> B>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl<B> SessionPoolBuilder<B> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            _backend: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Sets the maximum number of idle sessions the pool caches, across all partitions.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the pool, which will open and close sessions through the backend.
    #[must_use]
    #[inline]
    pub fn build(self, backend: B) -> SessionPool<B>
    where
        B: SessionBackend,
    {
        SessionPool::new_inner(self.capacity, backend)
    }
}

impl<B> Debug for SessionPoolBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{MockObjectBackend, MockSessionBackend};

    assert_impl_all!(ObjectPoolBuilder<MockObjectBackend>: Send, Debug);
    assert_not_impl_any!(ObjectPoolBuilder<MockObjectBackend>: Sync);
    assert_impl_all!(SessionPoolBuilder<MockSessionBackend>: Send, Debug);
    assert_not_impl_any!(SessionPoolBuilder<MockSessionBackend>: Sync);

    #[test]
    fn object_builder_defaults_to_no_caching() {
        let builder = ObjectPoolBuilder::<MockObjectBackend>::new();
        assert_eq!(builder.capacity, 0);
    }

    #[test]
    fn object_builder_sets_capacity() {
        let builder = ObjectPoolBuilder::<MockObjectBackend>::new().capacity(12);
        assert_eq!(builder.capacity, 12);
    }

    #[test]
    fn object_pool_builder_infers_backend_from_build() {
        let pool = ObjectPool::builder()
            .capacity(3)
            .build(MockObjectBackend::new());

        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn session_builder_defaults_to_no_caching() {
        let builder = SessionPoolBuilder::<MockSessionBackend>::new();
        assert_eq!(builder.capacity, 0);
    }

    #[test]
    fn session_builder_sets_capacity() {
        let builder = SessionPoolBuilder::<MockSessionBackend>::new().capacity(100);
        assert_eq!(builder.capacity, 100);
    }

    #[test]
    fn session_pool_builder_infers_backend_from_build() {
        let pool = SessionPool::builder()
            .capacity(5)
            .build(MockSessionBackend::new());

        assert_eq!(pool.capacity(), 5);
    }
}
