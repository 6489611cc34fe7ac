//! Per-(plugin, instance) key/value scratch space.
//!
//! A bucket is owned by exactly one (plugin, instance) pair, or by a plugin
//! collectively when created under [`DATA_BUCKET_FOR_ALL_PLUGIN_INSTANCES`].
//! Instance-scoped buckets are deleted by that instance's cleanup; the shared
//! bucket only goes away when the plugin itself is removed from the pipeline.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use crate::error::BucketError;

/// Instance id marking a bucket shared by all instances of a plugin.
pub const DATA_BUCKET_FOR_ALL_PLUGIN_INSTANCES: &str = "*";

/// Values are type-erased; callers downcast with the concrete type they
/// bound. Keys are strings (all known call sites key by string constants,
/// e.g. the HTTP mux bucket keys).
pub type BucketValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BucketKey {
    plugin_name: String,
    instance_id: String,
}

/// All data buckets of one pipeline context.
pub struct BucketStore {
    buckets: DashMap<BucketKey, Arc<DataBucket>>,
}

impl BucketStore {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Returns the bucket for `(plugin_name, instance_id)`, creating it on
    /// first access.
    pub fn bucket(&self, plugin_name: &str, instance_id: &str) -> Arc<DataBucket> {
        let key = BucketKey {
            plugin_name: plugin_name.to_string(),
            instance_id: instance_id.to_string(),
        };
        self.buckets
            .entry(key)
            .or_insert_with(|| Arc::new(DataBucket::new()))
            .clone()
    }

    /// Removes and returns the bucket, or a fresh empty bucket if absent so
    /// callers never have to branch on existence. The evicted bucket stays
    /// readable for the caller's final inspection.
    pub fn delete_bucket(&self, plugin_name: &str, instance_id: &str) -> Arc<DataBucket> {
        let key = BucketKey {
            plugin_name: plugin_name.to_string(),
            instance_id: instance_id.to_string(),
        };
        match self.buckets.remove(&key) {
            Some((_, bucket)) => {
                debug!(plugin = plugin_name, instance = instance_id, "deleted data bucket");
                bucket
            }
            None => Arc::new(DataBucket::new()),
        }
    }

    /// Removes every bucket of `plugin_name`, the shared sentinel bucket
    /// included. Used when the plugin itself is removed from the pipeline
    /// definition, not when an individual instance cleans up.
    pub fn delete_plugin_buckets(&self, plugin_name: &str) {
        self.buckets.retain(|key, _| key.plugin_name != plugin_name);
        debug!(plugin = plugin_name, "deleted all data buckets of plugin");
    }

    /// Marks every bucket closed and evicts it. Part of pipeline context
    /// teardown.
    pub fn close(&self) {
        for entry in self.buckets.iter() {
            entry.value().close();
        }
        self.buckets.clear();
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One bucket. Every call observes a consistent, immediately-prior state;
/// operations on different buckets proceed fully in parallel.
pub struct DataBucket {
    entries: Mutex<HashMap<String, BucketValue>>,
    closed: AtomicBool,
}

impl DataBucket {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, BucketValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `value` under `key`. Binding an already-bound key leaves the
    /// bucket untouched and fails with [`BucketError::AlreadyBound`], which
    /// carries the prior value.
    pub fn bind(
        &self,
        key: impl Into<String>,
        value: BucketValue,
    ) -> Result<BucketValue, BucketError> {
        if self.is_closed() {
            return Err(BucketError::BucketClosed);
        }
        let key = key.into();
        let mut entries = self.lock_entries();
        if let Some(existing) = entries.get(&key) {
            return Err(BucketError::AlreadyBound {
                key,
                existing: existing.clone(),
            });
        }
        entries.insert(key, value.clone());
        Ok(value)
    }

    /// Returns the bound value, or `None` if absent (or the bucket was
    /// already closed).
    pub fn query(&self, key: &str) -> Option<BucketValue> {
        if self.is_closed() {
            return None;
        }
        self.lock_entries().get(key).cloned()
    }

    /// Queries `key`, binding the factory's value on a miss. The factory is
    /// invoked at most once even under concurrent callers racing on the same
    /// missing key; all callers observe the same final value.
    pub fn query_or_bind_default<F>(
        &self,
        key: impl Into<String>,
        default_value: F,
    ) -> Result<BucketValue, BucketError>
    where
        F: FnOnce() -> BucketValue,
    {
        if self.is_closed() {
            return Err(BucketError::BucketClosed);
        }
        let key = key.into();
        let mut entries = self.lock_entries();
        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }
        let value = default_value();
        entries.insert(key, value.clone());
        Ok(value)
    }

    /// Removes and returns the bound value, or `None` if absent.
    pub fn unbind(&self, key: &str) -> Option<BucketValue> {
        if self.is_closed() {
            return None;
        }
        self.lock_entries().remove(key)
    }
}
