//! Append-only transaction log
//!
//! Committed transactions are persisted with their graphs (created, updated,
//! deleted, affected, provenance) to the `Transactions` repository. The log is
//! for audit only; nothing reads it back to recover in-flight state.

use crate::access::AccessLayer;
use crate::backend::{ConnectionProvider, StoreConnection};
use crate::transaction::Transaction;
use async_trait::async_trait;
use graph_common::{RepositoryType, Result, SessionContext, Statement};
use std::sync::Arc;
use tracing::{debug, error};

#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Append the transactions and hand them back
    async fn store(&self, transactions: Vec<Transaction>, ctx: &SessionContext) -> Result<Vec<Transaction>>;
}

/// Transaction log kept in the store's `Transactions` repository
pub struct RepositoryTransactionLog<P: ConnectionProvider> {
    access: Arc<AccessLayer<P>>,
}

impl<P: ConnectionProvider> RepositoryTransactionLog<P> {
    pub fn new(access: Arc<AccessLayer<P>>) -> Self {
        Self { access }
    }
}

#[async_trait]
impl<P: ConnectionProvider> TransactionLog for RepositoryTransactionLog<P> {
    async fn store(&self, transactions: Vec<Transaction>, ctx: &SessionContext) -> Result<Vec<Transaction>> {
        if transactions.is_empty() {
            return Ok(transactions);
        }

        let statements: Vec<Statement> = transactions.iter().flat_map(|t| t.to_model().into_vec()).collect();
        let count = statements.len();
        let log_ctx = ctx.clone().with_repository(RepositoryType::Transactions);

        self.access
            .consume_with_connection(&log_ctx, "store_transactions", move |conn| {
                Box::pin(async move {
                    conn.begin().await?;
                    if let Err(err) = conn.add(&statements).await {
                        if let Err(rollback_err) = conn.rollback().await {
                            error!(rollback_error = %rollback_err, "Rollback of transaction log write failed");
                        }
                        return Err(err);
                    }
                    conn.commit().await
                })
            })
            .await?;

        debug!(transactions = transactions.len(), statements = count, "Transactions logged");
        Ok(transactions)
    }
}
