//! Event types for the graph event channel
//!
//! Job completion handlers publish to the EventBus; caches and other observers
//! subscribe at startup and unsubscribe at shutdown.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Graph event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphEvent {
    /// A maintenance job started a run
    JobStarted {
        job: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A maintenance job finished a run
    JobCompleted {
        job: String,
        /// Number of candidates the run acted on
        processed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A maintenance job run ended with an error
    JobFailed {
        job: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transactions were committed to the store
    ///
    /// Triggers:
    /// - Entity cache: evict affected resources
    TransactionsCommitted {
        /// Transaction identifiers (IRIs)
        transactions: Vec<String>,
        /// Subjects touched by the transactions, as IRI text or blank node id
        affected: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Duplicates of one entity were folded into a survivor
    DuplicatesMerged {
        survivor: String,
        removed: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GraphEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            GraphEvent::JobStarted { .. } => "JobStarted",
            GraphEvent::JobCompleted { .. } => "JobCompleted",
            GraphEvent::JobFailed { .. } => "JobFailed",
            GraphEvent::TransactionsCommitted { .. } => "TransactionsCommitted",
            GraphEvent::DuplicatesMerged { .. } => "DuplicatesMerged",
        }
    }
}

/// Central event distribution bus
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GraphEvent>,
    capacity: usize,
    next_subscription: Arc<AtomicU64>,
}

/// A registered listener on the EventBus
///
/// Dropping the subscription also unsubscribes; `unsubscribe` does it explicitly
/// and logs the lifecycle change.
pub struct Subscription {
    id: u64,
    name: String,
    rx: broadcast::Receiver<GraphEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<GraphEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Result<GraphEvent, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        debug!(subscriber = %self.name, id = self.id, "Unsubscribed from event bus");
    }
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            capacity,
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        debug!(subscriber = %name, id, "Subscribed to event bus");
        Subscription {
            id,
            name,
            rx: self.tx.subscribe(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GraphEvent,
    ) -> Result<usize, broadcast::error::SendError<GraphEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GraphEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
