use std::cell::Cell;
use std::marker::PhantomData;

use toml::Value;

use crate::{Error, Result};

/// Name of the setting that sizes the object pool.
pub const MAX_CACHED_INSTANCES: &str = "max_cached_instances";

/// Name of the setting that sizes the session pool.
pub const MAX_CACHED_SESSIONS: &str = "max_cached_sessions";

/// Name of the setting for how many sessions to open ahead of demand.
pub const WARMUP_CACHED_SESSIONS: &str = "warmup_cached_sessions";

/// Validated sizing of the pools.
///
/// The settings arrive as signed integers from configuration files and property maps, so they
/// are checked once, here, and pools built from a `CacheConfig` can rely on them. A value of
/// zero disables the corresponding cache.
///
/// # Example
///
/// ```
/// use reuse_pool::CacheConfig;
///
/// let config = CacheConfig::from_toml_str(
///     r#"
///     max_cached_instances = 256
///     max_cached_sessions = 100
///     warmup_cached_sessions = 10
///     "#,
/// )?;
///
/// assert_eq!(config.max_cached_sessions(), 100);
///
/// let rejected = CacheConfig::builder().max_cached_sessions(-1).build();
/// assert!(rejected.is_err());
/// # Ok::<(), reuse_pool::Error>(())
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheConfig {
    max_cached_instances: usize,
    max_cached_sessions: usize,
    warmup_cached_sessions: usize,
}

impl CacheConfig {
    /// Returns a builder that accepts the raw, signed setting values.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    /// Parses the settings from a TOML document. Settings that are absent default to zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the document is not valid TOML, contains a setting
    /// this crate does not know, or has a setting that is not a non-negative integer.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let value: Value = toml::from_str(contents).map_err(|error| Error::Configuration {
            setting: "document",
            problem: format!("is not valid TOML: {error}"),
        })?;

        let Value::Table(table) = value else {
            return Err(Error::Configuration {
                setting: "document",
                problem: "must be a table of settings".to_string(),
            });
        };

        let mut builder = Self::builder();

        for (key, value) in &table {
            let setting = match key.as_str() {
                MAX_CACHED_INSTANCES => MAX_CACHED_INSTANCES,
                MAX_CACHED_SESSIONS => MAX_CACHED_SESSIONS,
                WARMUP_CACHED_SESSIONS => WARMUP_CACHED_SESSIONS,
                other => {
                    return Err(Error::Configuration {
                        setting: "document",
                        problem: format!("contains unknown setting '{other}'"),
                    });
                }
            };

            let Some(number) = value.as_integer() else {
                return Err(Error::Configuration {
                    setting,
                    problem: format!("must be an integer, got {}", value.type_str()),
                });
            };

            builder = match setting {
                MAX_CACHED_INSTANCES => builder.max_cached_instances(number),
                MAX_CACHED_SESSIONS => builder.max_cached_sessions(number),
                _ => builder.warmup_cached_sessions(number),
            };
        }

        builder.build()
    }

    /// Capacity of the object pool.
    #[must_use]
    pub fn max_cached_instances(&self) -> usize {
        self.max_cached_instances
    }

    /// Capacity of the session pool.
    #[must_use]
    pub fn max_cached_sessions(&self) -> usize {
        self.max_cached_sessions
    }

    /// How many sessions to open ahead of demand when warming up a session pool.
    #[must_use]
    pub fn warmup_cached_sessions(&self) -> usize {
        self.warmup_cached_sessions
    }
}

/// Builder for creating an instance of [`CacheConfig`] from signed setting values.
///
/// Every setting defaults to zero.
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct CacheConfigBuilder {
    max_cached_instances: i64,
    max_cached_sessions: i64,
    warmup_cached_sessions: i64,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl CacheConfigBuilder {
    pub(crate) fn new() -> Self {
        Self {
            max_cached_instances: 0,
            max_cached_sessions: 0,
            warmup_cached_sessions: 0,
            _not_sync: PhantomData,
        }
    }

    /// Sets the capacity of the object pool.
    pub fn max_cached_instances(mut self, value: i64) -> Self {
        self.max_cached_instances = value;
        self
    }

    /// Sets the capacity of the session pool.
    pub fn max_cached_sessions(mut self, value: i64) -> Self {
        self.max_cached_sessions = value;
        self
    }

    /// Sets how many sessions to open ahead of demand when warming up a session pool.
    pub fn warmup_cached_sessions(mut self, value: i64) -> Self {
        self.warmup_cached_sessions = value;
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first setting that is negative or does not
    /// fit in `usize`.
    pub fn build(self) -> Result<CacheConfig> {
        Ok(CacheConfig {
            max_cached_instances: non_negative(MAX_CACHED_INSTANCES, self.max_cached_instances)?,
            max_cached_sessions: non_negative(MAX_CACHED_SESSIONS, self.max_cached_sessions)?,
            warmup_cached_sessions: non_negative(
                WARMUP_CACHED_SESSIONS,
                self.warmup_cached_sessions,
            )?,
        })
    }
}

fn non_negative(setting: &'static str, value: i64) -> Result<usize> {
    if value < 0 {
        return Err(Error::Configuration {
            setting,
            problem: format!("can not be less than 0, got {value}"),
        });
    }

    usize::try_from(value).map_err(|_| Error::Configuration {
        setting,
        problem: format!("{value} is too large for this platform"),
    })
}
