use thiserror::Error;

/// An error produced by an [`ObjectBackend`][crate::ObjectBackend] or
/// [`SessionBackend`][crate::SessionBackend].
///
/// The pools never inspect, wrap or retry backend errors. They are handed to the caller as the
/// [`Error::Backend`] variant with the original error preserved as its source.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when configuring or operating the pools.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A configuration value was rejected when building a configuration or a pool.
    #[error("invalid configuration: '{setting}' {problem}")]
    Configuration {
        /// Name of the setting that was rejected.
        setting: &'static str,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// The caller violated the usage contract of a pool.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The backend failed to construct, destroy, open or close an item.
    #[error("backend operation failed: {0}")]
    Backend(#[source] BackendError),
}

impl Error {
    /// Returns the original backend error if this is a [`Error::Backend`].
    #[must_use]
    pub fn into_backend(self) -> Option<BackendError> {
        match self {
            Self::Backend(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether this error signals caller misuse of a pool.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

/// Misuse of a pool by its caller. These are bugs in the calling code and are never retried or
/// recovered from by the pools.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum UsageError {
    /// An element was released with a ticket whose checkout had already been released, with no
    /// acquire in between.
    #[error("element in slot {slot} was released twice")]
    ReleasedTwice {
        /// The slot that the ticket refers to.
        slot: usize,
    },

    /// A session was released under an empty partition name.
    #[error("sessions cannot be cached under an empty partition name")]
    EmptyPartition,
}

/// A specialized `Result` type for pool operations, returning the crate's [`Error`] type as the
/// error value.
pub type Result<T> = std::result::Result<T, Error>;
