//! Persistent memoization of expensive classifier calls.
//!
//! A [`CallCache`] stores call results in a [redb](https://github.com/cberner/redb)
//! database. Every handle is scoped to one namespace (one table), so two
//! classifiers sharing a database file never see each other's entries. The
//! key of an entry is a [`fingerprint`] of the function name and the full
//! argument set; the value is the JSON-serialized result.
//!
//! Failed calls are never stored: the error is handed back to the caller
//! inside [`CachedCallError::Call`] and the next call with the same arguments
//! invokes the function again.

use crate::config::write_canonical;
use redb::{Database, ReadableTableMetadata, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the cache store itself.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying database failed.
    #[error("cache database error in namespace `{namespace}`: {source}")]
    Database {
        namespace: String,
        #[source]
        source: redb::Error,
    },
    /// Arguments or results could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The directory holding the database could not be created.
    #[error("cannot create cache directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Namespaces name redb tables and must not be empty.
    #[error("cache namespace cannot be empty")]
    EmptyNamespace,
}

/// Error returned by a memoized call.
#[derive(Debug, Error)]
pub enum CachedCallError<E> {
    /// The wrapped function failed; its error is passed through untouched.
    #[error(transparent)]
    Call(E),
    /// The cache could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl<E> CachedCallError<E> {
    /// The wrapped function's error, if that is what failed.
    pub fn into_call(self) -> Option<E> {
        match self {
            Self::Call(err) => Some(err),
            Self::Cache(_) => None,
        }
    }
}

/// Stable fingerprint of a call: SHA-256 over the canonical JSON of
/// `{"args": args, "function": function}`.
///
/// Positional and keyword arguments are both captured by passing a tuple or
/// a struct as `args`.
///
/// # Errors
///
/// Returns [`CacheError::Serialization`] if `args` cannot be serialized.
pub fn fingerprint<A: Serialize + ?Sized>(function: &str, args: &A) -> Result<String, CacheError> {
    let value = serde_json::json!({
        "function": function,
        "args": serde_json::to_value(args)?,
    });
    let mut canonical = String::new();
    write_canonical(&mut canonical, &value);
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

/// Handle on one namespace of a persistent call cache.
///
/// Handles are cheap to clone and safe to share between threads; redb
/// serializes writers, so concurrent memoized calls resolve to
/// last-writer-wins on the same fingerprint.
///
/// # Examples
///
/// ```
/// use sdg_benchmark::cache::CallCache;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let cache = CallCache::open(dir.path().join("cache.redb"), "my_classifier")?;
/// let double = cache.memoize("double", |x: &u32| Ok::<_, std::io::Error>(x * 2));
/// assert_eq!(double.call(&21)?, 42);
/// assert_eq!(cache.len()?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CallCache {
    db: Arc<Database>,
    namespace: Arc<str>,
}

impl std::fmt::Debug for CallCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl CallCache {
    /// Open or create the database at `path` and scope a handle to
    /// `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the file cannot be opened or the
    /// namespace table cannot be created, and [`CacheError::EmptyNamespace`]
    /// for an empty namespace.
    pub fn open(path: impl AsRef<Path>, namespace: &str) -> Result<Self, CacheError> {
        let db = Database::create(path.as_ref()).map_err(|e| db_error(namespace, e))?;
        Self::with_database(Arc::new(db), namespace)
    }

    /// Scope another handle on the same database to a different namespace.
    ///
    /// # Errors
    ///
    /// See [`CallCache::open`].
    pub fn scoped(&self, namespace: &str) -> Result<Self, CacheError> {
        Self::with_database(Arc::clone(&self.db), namespace)
    }

    fn with_database(db: Arc<Database>, namespace: &str) -> Result<Self, CacheError> {
        if namespace.is_empty() {
            return Err(CacheError::EmptyNamespace);
        }
        let txn = db.begin_write().map_err(|e| db_error(namespace, e))?;
        txn.open_table(table(namespace))
            .map_err(|e| db_error(namespace, e))?;
        txn.commit().map_err(|e| db_error(namespace, e))?;
        Ok(Self {
            db,
            namespace: namespace.into(),
        })
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Look up a stored result by fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the read fails or the stored bytes do not
    /// decode as `R`.
    pub fn get<R: DeserializeOwned>(&self, key: &str) -> Result<Option<R>, CacheError> {
        let txn = self.db.begin_read().map_err(|e| self.error(e))?;
        let table = txn
            .open_table(table(&self.namespace))
            .map_err(|e| self.error(e))?;
        match table.get(key).map_err(|e| self.error(e))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Store a result under a fingerprint, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization or the write transaction fails.
    pub fn put<R: Serialize + ?Sized>(&self, key: &str, value: &R) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        let txn = self.db.begin_write().map_err(|e| self.error(e))?;
        {
            let mut table = txn
                .open_table(table(&self.namespace))
                .map_err(|e| self.error(e))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(|e| self.error(e))?;
        }
        txn.commit().map_err(|e| self.error(e))
    }

    /// Number of entries in this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the read fails.
    pub fn len(&self) -> Result<u64, CacheError> {
        let txn = self.db.begin_read().map_err(|e| self.error(e))?;
        let table = txn
            .open_table(table(&self.namespace))
            .map_err(|e| self.error(e))?;
        table.len().map_err(|e| self.error(e))
    }

    /// Whether this namespace holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the read fails.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        self.len().map(|n| n == 0)
    }

    /// Drop every entry in this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the write fails.
    pub fn clear(&self) -> Result<(), CacheError> {
        let txn = self.db.begin_write().map_err(|e| self.error(e))?;
        txn.delete_table(table(&self.namespace))
            .map_err(|e| self.error(e))?;
        txn.open_table(table(&self.namespace))
            .map_err(|e| self.error(e))?;
        txn.commit().map_err(|e| self.error(e))
    }

    /// Wrap `function` so equal arguments are answered from the cache.
    ///
    /// `name` distinguishes functions memoized in the same namespace.
    pub fn memoize<F>(&self, name: &str, function: F) -> Memoized<F> {
        Memoized {
            cache: self.clone(),
            name: name.to_owned(),
            function,
        }
    }

    fn error(&self, source: impl Into<redb::Error>) -> CacheError {
        db_error(&self.namespace, source)
    }
}

fn table(namespace: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(namespace)
}

fn db_error(namespace: &str, source: impl Into<redb::Error>) -> CacheError {
    CacheError::Database {
        namespace: namespace.to_owned(),
        source: source.into(),
    }
}

/// A function whose successful results are persisted by argument fingerprint.
#[derive(Debug, Clone)]
pub struct Memoized<F> {
    cache: CallCache,
    name: String,
    function: F,
}

impl<F> Memoized<F> {
    /// Call through the cache.
    ///
    /// On a hit the stored result is returned and the function is not
    /// invoked. On a miss the function runs once; only an `Ok` result is
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns [`CachedCallError::Call`] with the function's own error, or
    /// [`CachedCallError::Cache`] if the cache cannot be used.
    pub fn call<A, R, E>(&self, args: &A) -> Result<R, CachedCallError<E>>
    where
        A: Serialize + ?Sized,
        R: Serialize + DeserializeOwned,
        F: Fn(&A) -> Result<R, E>,
    {
        let key = fingerprint(&self.name, args)?;
        if let Some(hit) = self.cache.get(&key)? {
            debug!(namespace = self.cache.namespace(), function = %self.name, %key, "cache hit");
            return Ok(hit);
        }
        debug!(namespace = self.cache.namespace(), function = %self.name, %key, "cache miss");
        let result = (self.function)(args).map_err(CachedCallError::Call)?;
        self.cache.put(&key, &result)?;
        Ok(result)
    }

    #[must_use]
    pub fn cache(&self) -> &CallCache {
        &self.cache
    }
}
