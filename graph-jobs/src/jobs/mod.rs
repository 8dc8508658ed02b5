//! Maintenance jobs
//!
//! Every job is idempotent and safe to re-run against a live store: each run
//! discovers its own candidates, stages changes into transactions and commits
//! them through the repository, then appends them to the transaction log.

pub mod assign_types;
pub mod merge_duplicates;
pub mod replace_linked;
pub mod replace_subjects;

use async_trait::async_trait;
use graph_common::config::JobsConfig;
use graph_common::events::EventBus;
use graph_common::{Error, Result, SessionContext};
use graph_store::{GraphStore, Transaction, TransactionLog};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub use assign_types::AssignInternalTypes;
pub use merge_duplicates::{DescendingIdentifier, Duplicate, DuplicateCandidate, MergeDuplicates, OriginalSelector};
pub use replace_linked::ReplaceLinkedIdentifiers;
pub use replace_subjects::ReplaceSubjectIdentifiers;

/// Result of one successful job run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    /// Candidates the run acted on
    pub processed: usize,
    /// Transactions committed
    pub transactions: usize,
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &SessionContext) -> Result<JobOutcome>;
}

/// Collaborators shared by all jobs
#[derive(Clone)]
pub struct JobServices {
    pub store: Arc<dyn GraphStore>,
    pub log: Arc<dyn TransactionLog>,
    pub events: EventBus,
    pub config: JobsConfig,
}

/// Buffers staged transactions, commits them in batches and appends every
/// `log_batch` committed batches to the transaction log.
///
/// Transactions that reached the store are always logged, including when the
/// run stops on an error: failures from the buffer itself flush the log before
/// returning, and callers hand other errors to [`CommitBuffer::abandon`].
pub(crate) struct CommitBuffer<'a> {
    services: &'a JobServices,
    ctx: &'a SessionContext,
    commit_batch: usize,
    staged: Vec<Transaction>,
    committed: Vec<Transaction>,
    batches_since_log: usize,
    total: usize,
}

impl<'a> CommitBuffer<'a> {
    pub(crate) fn new(services: &'a JobServices, ctx: &'a SessionContext, commit_batch: usize) -> Self {
        Self {
            services,
            ctx,
            commit_batch: commit_batch.max(1),
            staged: Vec::new(),
            committed: Vec::new(),
            batches_since_log: 0,
            total: 0,
        }
    }

    pub(crate) async fn push(&mut self, transaction: Transaction) -> Result<()> {
        self.staged.push(transaction);
        if self.staged.len() >= self.commit_batch {
            self.commit_staged().await?;
        }
        Ok(())
    }

    /// Commit staged transactions as one unit; any commit without the success
    /// marker aborts the run
    async fn commit_staged(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.staged);
        let committed = match self.services.store.commit(batch, self.ctx, true).await {
            Ok(committed) => committed,
            Err(e) => return Err(self.flush_on_error(e).await),
        };
        let failure = committed.iter().find_map(|transaction| transaction.assert_success().err());
        debug!(transactions = committed.len(), "Committed batch");
        self.total += committed.len();
        self.committed.extend(committed);
        if let Some(e) = failure {
            return Err(self.flush_on_error(e).await);
        }
        self.batches_since_log += 1;

        if self.batches_since_log >= self.services.config.log_batch.max(1) {
            self.write_log().await?;
        }
        Ok(())
    }

    async fn write_log(&mut self) -> Result<()> {
        self.batches_since_log = 0;
        if self.committed.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.committed);
        self.services.log.store(entries, self.ctx).await?;
        Ok(())
    }

    /// Log whatever was committed so far and hand back the original error
    async fn flush_on_error(&mut self, error: Error) -> Error {
        if let Err(log_error) = self.write_log().await {
            warn!(error = %log_error, "Could not log committed transactions of a failed run");
        }
        error
    }

    /// Stop the run: staged transactions are dropped, committed ones are logged
    pub(crate) async fn abandon(mut self, error: Error) -> Error {
        if !self.staged.is_empty() {
            debug!(transactions = self.staged.len(), "Dropping staged transactions");
        }
        self.flush_on_error(error).await
    }

    /// Commit what is left and flush the log; returns the number of committed
    /// transactions
    pub(crate) async fn finish(mut self) -> Result<usize> {
        self.commit_staged().await?;
        self.write_log().await?;
        Ok(self.total)
    }
}
