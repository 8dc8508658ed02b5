//! Repository access layer
//!
//! Every store operation goes through one of the `*_with_connection` wrappers:
//! the session is checked (authorized, repository resolved) before any
//! connection is opened, one connection is checked out for the operation and
//! released on every path, and the outcome is recorded in [`StoreMetrics`].
//!
//! Multi-row operations on behalf of scheduled jobs are bounded by a timeout.
//! When it expires the in-flight future is dropped, which releases the
//! connection and discards any uncommitted native transaction.

use crate::backend::ConnectionProvider;
use crate::metrics::{Cardinality, OperationState, StoreMetrics};
use futures::future::BoxFuture;
use graph_common::{Error, RepositoryType, Result, SessionContext};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Default bound for multi-row operations issued by scheduled jobs
pub const DEFAULT_SCHEDULED_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AccessLayer<P: ConnectionProvider> {
    provider: P,
    metrics: Arc<StoreMetrics>,
    scheduled_timeout: Duration,
}

impl<P: ConnectionProvider> AccessLayer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            metrics: Arc::new(StoreMetrics::new()),
            scheduled_timeout: DEFAULT_SCHEDULED_TIMEOUT,
        }
    }

    pub fn with_scheduled_timeout(mut self, timeout: Duration) -> Self {
        self.scheduled_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Check the session before touching the store
    ///
    /// Authorization is read from the environment flag; the repository type
    /// must already be resolved.
    pub fn verify_valid_and_authorized(&self, ctx: &SessionContext) -> Result<RepositoryType> {
        let environment = ctx.environment();
        if !environment.is_authorized() {
            return Err(Error::InsufficientPrivilege(
                "Session is not authorized for store access".to_string(),
            ));
        }
        environment
            .repository_type()
            .ok_or_else(|| Error::Config("No repository type resolved for session".to_string()))
    }

    /// Run `f` against one connection and return its single result
    pub async fn apply_with_connection<T, F>(&self, ctx: &SessionContext, operation: &'static str, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut P::Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        self.execute(ctx, operation, Cardinality::Single, false, f).await
    }

    /// Run `f` against one connection for its side effects only
    pub async fn consume_with_connection<F>(&self, ctx: &SessionContext, operation: &'static str, f: F) -> Result<()>
    where
        F: for<'c> FnOnce(&'c mut P::Connection) -> BoxFuture<'c, Result<()>> + Send,
    {
        self.execute(ctx, operation, Cardinality::Single, false, f).await
    }

    /// Run `f` against one connection and return all rows it produces
    ///
    /// Rows are fully materialized before the connection is released.
    /// Scheduled sessions are bounded by the scheduled timeout.
    pub async fn apply_many_with_connection<T, F>(
        &self,
        ctx: &SessionContext,
        operation: &'static str,
        f: F,
    ) -> Result<Vec<T>>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut P::Connection) -> BoxFuture<'c, Result<Vec<T>>> + Send,
    {
        let timed = ctx.is_scheduled();
        self.execute(ctx, operation, Cardinality::Multiple, timed, f).await
    }

    pub(crate) async fn execute<T, F>(
        &self,
        ctx: &SessionContext,
        operation: &'static str,
        cardinality: Cardinality,
        timed: bool,
        f: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut P::Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let repository = self.verify_valid_and_authorized(ctx)?;
        let start = Instant::now();

        let result = match self.provider.connect(repository).await {
            Ok(mut conn) => {
                let fut = f(&mut conn);
                if timed {
                    match tokio::time::timeout(self.scheduled_timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => {
                            let after_ms = u64::try_from(self.scheduled_timeout.as_millis()).unwrap_or(u64::MAX);
                            warn!(
                                operation,
                                repository = %repository,
                                after_ms,
                                "Scheduled store operation timed out"
                            );
                            Err(Error::Timeout {
                                operation: operation.to_string(),
                                after_ms,
                            })
                        }
                    }
                } else {
                    fut.await
                }
            }
            Err(err) => Err(err),
        };

        let state = if result.is_ok() {
            OperationState::Complete
        } else {
            OperationState::Failure
        };
        self.metrics.record(cardinality, state, start.elapsed());
        debug!(
            operation,
            repository = %repository,
            backend = self.provider.name(),
            elapsed_ms = start.elapsed().as_millis(),
            ok = result.is_ok(),
            "Store operation finished"
        );

        result.map_err(|err| classify(operation, err))
    }
}

/// Map an operation failure onto the error surface callers see
///
/// Typed errors pass through. Anything untyped from the backend is logged
/// and replaced by an internal error that carries no query detail.
fn classify(operation: &'static str, err: Error) -> Error {
    match err {
        Error::InvalidQuery(message) => {
            warn!(operation, %message, "Malformed query");
            Error::InvalidQuery(message)
        }
        err @ (Error::Database(_) | Error::Io(_) | Error::Serialization(_)) => {
            error!(operation, error = %err, "Store operation failed");
            Error::Internal(format!("Store operation {} failed", operation))
        }
        other => other,
    }
}
