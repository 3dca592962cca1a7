//! Cache layer for reconciled ticket data
//!
//! One [`CacheEntry`] per credential group. Entries are replaced wholesale on
//! every write, so there is no partial-update state for readers to observe.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::{CacheConfig, SqliteCache};

use crate::config::{CacheBackend, CacheSettings};
use crate::model::CacheEntry;
use crate::Result;

/// Key-value store of cache entries keyed by group id
///
/// Last write wins per group.
pub trait CacheStore: Send + Sync {
    fn get(&self, group_id: &str) -> Result<Option<CacheEntry>>;

    fn set(&self, group_id: &str, entry: &CacheEntry) -> Result<()>;

    /// Returns true if an entry was removed
    fn remove(&self, group_id: &str) -> Result<bool>;

    fn clear(&self) -> Result<()>;

    /// Group ids with a cached entry, sorted
    fn groups(&self) -> Result<Vec<String>>;
}

impl<T: CacheStore + ?Sized> CacheStore for Box<T> {
    fn get(&self, group_id: &str) -> Result<Option<CacheEntry>> {
        (**self).get(group_id)
    }

    fn set(&self, group_id: &str, entry: &CacheEntry) -> Result<()> {
        (**self).set(group_id, entry)
    }

    fn remove(&self, group_id: &str) -> Result<bool> {
        (**self).remove(group_id)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn groups(&self) -> Result<Vec<String>> {
        (**self).groups()
    }
}

/// Open the backend selected in the configuration
pub fn open(settings: &CacheSettings) -> Result<Box<dyn CacheStore>> {
    match settings.backend {
        CacheBackend::Memory => Ok(Box::new(MemoryCache::new())),
        CacheBackend::Sqlite => {
            let config = CacheConfig {
                path: settings.path.clone(),
                ..Default::default()
            };
            Ok(Box::new(SqliteCache::new(config)?))
        }
    }
}
