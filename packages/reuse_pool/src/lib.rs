#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Bounded caches of expensive-to-construct objects and expensive-to-open sessions.
//!
//! This crate provides two thread-safe pools that let a high-throughput client skip the cost of
//! constructing and tearing down resources on every request, while bounding how many idle
//! resources are kept around and detecting misuse such as releasing the same element twice.
//!
//! * [`ObjectPool`] caches domain objects keyed by a type tag. Elements are handed out again
//!   most-recently-released first within a type; across types, the least recently released
//!   element is evicted when room is needed. When every slot is checked out, the pool grows
//!   temporarily instead of blocking and shrinks back as elements are released.
//! * [`SessionPool`] caches open sessions keyed by a partition name, typically a logical
//!   database. The total number of idle sessions across partitions is bounded, with the longest
//!   idle session evicted first.
//!
//! Constructing, destroying, opening and closing are done by a caller-supplied backend
//! ([`ObjectBackend`], [`SessionBackend`]). The pools call `destroy`/`close_session` exactly once
//! for every element they decide will never be used again, and never while holding their lock.
//!
//! The single-threaded cores [`RawObjectPool`] and [`RawSessionPool`] are also exposed. They
//! never call a backend: every element they give up is returned to the caller instead.
//!
//! # Configuration
//!
//! Pools are sized either via their builders or from a [`CacheConfig`], which validates the
//! signed values found in configuration files. A capacity of zero disables caching.
//!
//! # Example
//!
//! ```rust
//! use reuse_pool::{BackendError, CacheConfig, ObjectBackend, ObjectPool, ReleaseOutcome};
//!
//! #[derive(Debug)]
//! struct Customers;
//!
//! impl ObjectBackend for Customers {
//!     type Element = String;
//!     type Tag = &'static str;
//!
//!     fn construct(&self, kind: &&'static str) -> Result<String, BackendError> {
//!         Ok(format!("new {kind}"))
//!     }
//!
//!     fn destroy(&self, _element: String) -> Result<(), BackendError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = CacheConfig::from_toml_str("max_cached_instances = 2")?;
//! let pool = ObjectPool::from_config(&config, Customers);
//!
//! let (customer, ticket) = pool.acquire_or_construct("customer")?;
//! assert_eq!(customer, "new customer");
//!
//! assert_eq!(pool.release(ticket, customer)?, ReleaseOutcome::Cached);
//! assert_eq!(pool.size_of("customer"), 1);
//!
//! // Releasing the same checkout twice is detected.
//! assert!(pool.release(ticket, String::new()).is_err());
//! # Ok::<(), reuse_pool::Error>(())
//! ```

mod arena;
mod backend;
mod builder;
mod config;
mod error;
mod list;
mod metrics;
mod object_pool;
mod raw_object_pool;
mod raw_session_pool;
mod session_pool;
mod ticket;

pub use backend::{ObjectBackend, SessionBackend};
#[cfg(test)]
pub(crate) use backend::{MockObjectBackend, MockSessionBackend};
pub use builder::*;
pub use config::*;
pub use error::*;
pub use object_pool::{ObjectPool, ReleaseOutcome};
pub use raw_object_pool::{RawObjectPool, Released};
pub use raw_session_pool::{RawSessionPool, Stashed};
pub use session_pool::SessionPool;
pub use ticket::Ticket;
