//! Fragment cache with event-driven invalidation
//!
//! Entries are keyed by the subject's string value. A background task
//! subscribed to the event bus evicts subjects touched by committed
//! transactions and removed by duplicate merges, together with any cached
//! fragment that embeds or links to one of them.

use graph_common::events::{EventBus, GraphEvent};
use graph_common::{Resource, Result, SessionContext};
use graph_store::{Fragment, GraphStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Default)]
pub struct EntityCache {
    entries: RwLock<HashMap<String, Arc<Fragment>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, resource: &Resource) -> Option<Arc<Fragment>> {
        self.entries.read().await.get(resource.string_value()).cloned()
    }

    pub async fn insert(&self, fragment: Fragment) -> Arc<Fragment> {
        let key = fragment.resource().string_value().to_string();
        let fragment = Arc::new(fragment);
        self.entries.write().await.insert(key, Arc::clone(&fragment));
        fragment
    }

    /// Cached fragment, or load it (without neighbours) and cache it
    pub async fn get_or_load(
        &self,
        store: &dyn GraphStore,
        resource: &Resource,
        ctx: &SessionContext,
    ) -> Result<Arc<Fragment>> {
        if let Some(hit) = self.get(resource).await {
            trace!(subject = %resource, "Cache hit");
            return Ok(hit);
        }
        let fragment = store.get_fragment(resource, false, ctx).await?;
        Ok(self.insert(fragment).await)
    }

    /// Remove the entries for `keys` and every fragment whose statements
    /// mention one of them; returns how many entries were dropped
    pub async fn evict<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> usize {
        let keys: HashSet<&str> = keys.into_iter().map(String::as_str).collect();
        if keys.is_empty() {
            return 0;
        }
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, fragment| !keys.contains(key.as_str()) && !mentions_any(fragment, &keys));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn apply(&self, event: &GraphEvent) {
        let evicted = match event {
            GraphEvent::TransactionsCommitted { affected, .. } => self.evict(affected).await,
            GraphEvent::DuplicatesMerged { survivor, removed, .. } => {
                self.evict(removed.iter().chain(std::iter::once(survivor))).await
            }
            _ => return,
        };
        if evicted > 0 {
            debug!(evicted, event = event.event_type(), "Evicted cached fragments");
        }
    }

    /// Subscribe to the event bus and evict until `cancel` fires
    ///
    /// A lagging subscriber has missed evictions, so the whole cache is
    /// cleared.
    pub fn spawn_invalidation(self: &Arc<Self>, events: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut subscription = events.subscribe("entity-cache");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = subscription.recv() => match received {
                        Ok(event) => cache.apply(&event).await,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Entity cache lagged behind events, clearing");
                            cache.clear().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            subscription.unsubscribe();
        })
    }
}

fn mentions_any(fragment: &Fragment, keys: &HashSet<&str>) -> bool {
    fragment.model().iter().any(|st| {
        keys.contains(st.subject.string_value()) || (st.object.is_resource() && keys.contains(st.object.string_value()))
    })
}
