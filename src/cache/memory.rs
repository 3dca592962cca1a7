//! In-process cache backend

use super::CacheStore;
use crate::model::CacheEntry;
use crate::{Result, TickBridgeError};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Cache entries held in process memory; lost on exit
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| TickBridgeError::Cache("memory cache lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, group_id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.get(group_id).cloned())
    }

    fn set(&self, group_id: &str, entry: &CacheEntry) -> Result<()> {
        self.lock()?.insert(group_id.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, group_id: &str) -> Result<bool> {
        Ok(self.lock()?.remove(group_id).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn groups(&self) -> Result<Vec<String>> {
        let mut groups: Vec<String> = self.lock()?.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }
}
