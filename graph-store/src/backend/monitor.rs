//! Connection hold-time monitoring
//!
//! Wraps a native SQLite transaction and logs how long the underlying pool
//! connection was held, so slow commits and leaked transactions show up in logs.

use graph_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Instant;

/// Native transaction that logs acquisition and release timing
pub(crate) struct MonitoredTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    pub(crate) fn inner_mut(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))
    }

    pub(crate) async fn commit(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "LONG TRANSACTION - Connection held for extended period"
            );
        } else if held_ms > 1000 {
            tracing::info!(
                caller = self.caller,
                held_ms = held_ms,
                "Transaction held longer than expected (>1s)"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms = held_ms,
                "Connection released (commit)"
            );
        }
        Ok(())
    }

    pub(crate) async fn rollback(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;
        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );
        Ok(())
    }
}

impl Drop for MonitoredTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped
            let held_ms = self.acquired_at.elapsed().as_millis();
            if held_ms > 2000 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms = held_ms,
                    "LONG TRANSACTION DROPPED - Connection held then released via Drop"
                );
            } else {
                tracing::debug!(
                    caller = self.caller,
                    held_ms = held_ms,
                    "Connection released (drop)"
                );
            }
        }
    }
}

/// Begin a native transaction with pool wait-time logging
pub(crate) async fn begin_monitored(
    pool: &SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction> {
    let start = Instant::now();
    tracing::debug!(caller = caller, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated"
        );
    } else if wait_ms > 500 {
        tracing::info!(
            caller = caller,
            wait_ms = wait_ms,
            "Connection acquisition slower than expected (>500ms)"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
