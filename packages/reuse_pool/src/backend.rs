use std::fmt::Debug;
use std::hash::Hash;

use crate::BackendError;

/// Constructs and permanently destroys the elements tracked by an
/// [`ObjectPool`][crate::ObjectPool].
///
/// The pool itself only ever calls [`destroy()`][Self::destroy], exactly once for every element
/// that it decides will never be reused. [`construct()`][Self::construct] is called on behalf
/// of callers by [`ObjectPool::acquire_or_construct()`][crate::ObjectPool::acquire_or_construct]
/// after a miss.
#[cfg_attr(test, mockall::automock(type Element = u64; type Tag = u8;))]
pub trait ObjectBackend {
    /// The pooled domain object.
    type Element;

    /// Identifies which bucket of the pool an element belongs to. Elements are only ever handed
    /// out again for the same tag they were released under.
    type Tag: Copy + Debug + Eq + Hash;

    /// Creates a new element of the given type. Each call yields a fresh, distinct element.
    ///
    /// # Errors
    ///
    /// Any error is propagated unmodified to the caller of the pool.
    fn construct(&self, tag: &Self::Tag) -> Result<Self::Element, BackendError>;

    /// Permanently tears down an element. The element is never used again afterwards.
    ///
    /// # Errors
    ///
    /// Any error is propagated unmodified to the caller of the pool.
    fn destroy(&self, element: Self::Element) -> Result<(), BackendError>;
}

/// Opens and permanently closes the sessions cached by a [`SessionPool`][crate::SessionPool].
#[cfg_attr(test, mockall::automock(type Session = u64;))]
pub trait SessionBackend {
    /// An open session bound to one partition.
    type Session;

    /// Opens a new session for the partition.
    ///
    /// # Errors
    ///
    /// Any error is propagated unmodified to the caller of the pool.
    fn open_session(&self, partition: &str) -> Result<Self::Session, BackendError>;

    /// Permanently closes a session. The session is never used again afterwards.
    ///
    /// # Errors
    ///
    /// Any error is propagated unmodified to the caller of the pool.
    fn close_session(&self, session: Self::Session) -> Result<(), BackendError>;
}
