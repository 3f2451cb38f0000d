//! Registry of containers created by this process.
//!
//! Maps container id to the local time the container was created. The runner
//! records ids; whoever removes a container (handle cleanup, runner cleanup,
//! the garbage collector) unrecords it.
//!
//! All access goes through one mutex that is only held for the map operation
//! itself, never across a runtime call.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Concurrency-safe container id registry.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a container created now.
    pub fn record(&self, id: &str) {
        self.record_at(id, Utc::now());
    }

    /// Record a container created at `created`.
    pub fn record_at(&self, id: &str, created: DateTime<Utc>) {
        self.entries().insert(id.to_string(), created);
    }

    /// Forget a container. Returns false if it was not recorded.
    pub fn unrecord(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Ids of containers recorded before `now - age`.
    pub fn snapshot_older_than(&self, now: DateTime<Utc>, age: Duration) -> Vec<String> {
        let Some(boundary) = age_boundary(now, age) else {
            return Vec::new();
        };
        self.entries()
            .iter()
            .filter(|(_, created)| **created < boundary)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove and return every recorded id.
    pub fn drain(&self) -> Vec<String> {
        self.entries().drain().map(|(id, _)| id).collect()
    }

    /// Check whether `id` is recorded.
    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    /// Number of recorded containers.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// True if no container is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// `now - age`, or `None` if that lies before the representable range.
pub(crate) fn age_boundary(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age).ok()?;
    now.checked_sub_signed(age)
}
