//! Cached resolution of cross-pipeline references
//!
//! Failure policy: network and auth errors are caught here and downgraded
//! to "not found" so a single unreachable dependency cannot abort a batch;
//! the underlying message is preserved in [`ExistenceCheck::error`] for
//! callers that want the distinction. The cache has no TTL; staleness
//! between runs is handled by [`PipelineResolver::clear_cache`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{ClientError, WorkspaceClient};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    workspace_id: String,
    name: String,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, String>,
    hits: u64,
    misses: u64,
}

/// Cache introspection snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Outcome of an existence check. `found` keeps the boolean contract;
/// `error` preserves why a lookup came back negative when it failed
/// rather than genuinely missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistenceCheck {
    pub found: bool,
    pub pipeline_id: Option<String>,
    pub error: Option<String>,
}

/// Resolves pipeline display names to target-workspace item ids, with a
/// per-instance cache. Owning the cache here (rather than process-wide)
/// keeps concurrent migrations from cross-contaminating.
pub struct PipelineResolver {
    client: Arc<dyn WorkspaceClient>,
    cache: Mutex<CacheState>,
}

impl PipelineResolver {
    pub fn new(client: Arc<dyn WorkspaceClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(CacheState::default()),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // A poisoned lock only means a panic elsewhere mid-update; the
        // map itself is always in a consistent state.
        self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Check whether a pipeline with the given display name exists in the
    /// target workspace. Never returns an error: lookup failures are
    /// reported as not-found with the message attached.
    pub async fn check_pipeline_exists(
        &self,
        name: &str,
        workspace_id: &str,
        token: &str,
    ) -> ExistenceCheck {
        match self.client.get_item_by_name(workspace_id, name, token).await {
            Ok(Some(item)) => ExistenceCheck {
                found: true,
                pipeline_id: Some(item.id),
                error: None,
            },
            Ok(None) => ExistenceCheck {
                found: false,
                pipeline_id: None,
                error: None,
            },
            Err(err) => {
                warn!(%workspace_id, %name, error = %err, "pipeline lookup failed; treating as not found");
                ExistenceCheck {
                    found: false,
                    pipeline_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Resolve a pipeline reference to its target-workspace id. An empty
    /// name is a defined not-found; any failure yields `None`, never an
    /// error. Successful resolutions are cached per
    /// `(workspace_id, name)`; concurrent resolutions of the same key are
    /// last-writer-wins, and no partial entry is ever observable.
    pub async fn resolve_pipeline_reference(
        &self,
        name: &str,
        workspace_id: &str,
        token: &str,
    ) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let key = CacheKey {
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
        };
        {
            let mut cache = self.cache();
            if let Some(id) = cache.entries.get(&key).cloned() {
                cache.hits += 1;
                debug!(%workspace_id, %name, "pipeline reference cache hit");
                return Some(id);
            }
            cache.misses += 1;
        }

        let check = self.check_pipeline_exists(name, workspace_id, token).await;
        let id = check.pipeline_id?;
        let mut cache = self.cache();
        cache.entries.insert(key, id.clone());
        Some(id)
    }

    /// Confirm that each of a set of already-known target ids still
    /// exists. Checks run concurrently; the result carries exactly one
    /// boolean per requested id, including ids unknown to the backend
    /// (`false`), and is returned only once all checks have completed.
    pub async fn batch_validate_pipelines(
        &self,
        workspace_id: &str,
        ids: &[String],
        token: &str,
    ) -> HashMap<String, bool> {
        let checks = ids.iter().map(|id| async move {
            let exists = match self.client.get_item(workspace_id, id, token).await {
                Ok(Some(_)) => true,
                Ok(None) => false,
                Err(err) => {
                    warn!(%workspace_id, item_id = %id, error = %err, "batch validation lookup failed; treating as missing");
                    false
                }
            };
            (id.clone(), exists)
        });
        join_all(checks).await.into_iter().collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache();
        CacheStats {
            size: cache.entries.len(),
            hits: cache.hits,
            misses: cache.misses,
        }
    }

    /// Drop every cache entry and reset the counters. Called between
    /// independent migration runs to avoid cross-run staleness.
    pub fn clear_cache(&self) {
        let mut cache = self.cache();
        *cache = CacheState::default();
    }
}
