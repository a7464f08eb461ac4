//! Per-resource-type admission serialization
//!
//! Admission reads a timeline, then writes to it. Holding the resource
//! type's token across both keeps two overlapping admissions on the same
//! resource type from missing each other. Different resource types never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Held for the duration of one admission
pub type ResourceToken = OwnedMutexGuard<()>;

/// Lazily created mutex per resource type
pub struct ResourceLocks {
    /// When false, `acquire` returns immediately without a token
    enabled: bool,
    /// Token per resource type
    tokens: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Locks that never block
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wait for exclusive access to `resource_type`
    pub async fn acquire(&self, resource_type: &str) -> Option<ResourceToken> {
        if !self.enabled {
            return None;
        }

        let token = {
            let mut tokens = self.tokens.lock().await;
            tokens
                .entry(resource_type.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = token.lock_owned().await;
        debug!(resource_type = %resource_type, "Acquired admission token");
        Some(guard)
    }

    /// Number of resource types that have been locked at least once
    pub async fn tracked_count(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

impl Default for ResourceLocks {
    fn default() -> Self {
        Self::new(true)
    }
}
