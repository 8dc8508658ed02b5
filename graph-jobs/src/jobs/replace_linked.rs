//! Linked identifier repair
//!
//! For every `(s, ORIGINAL_IDENTIFIER, o)` left by subject normalization,
//! statements still pointing at `o` are rewritten to point at `s`. The
//! provenance statement is then dropped; if `o` was an IRI it becomes
//! `(s, owl:sameAs, o)` so the external identifier stays discoverable.

use super::{CommitBuffer, Job, JobOutcome, JobServices};
use async_trait::async_trait;
use graph_common::vocab::{local, owl};
use graph_common::{Error, RepositoryType, Resource, Result, SessionContext, Statement, Value};
use graph_store::{Activity, Transaction};
use tracing::{debug, info};

pub const NAME: &str = "replace_linked_identifiers";

pub struct ReplaceLinkedIdentifiers {
    services: JobServices,
    enabled: bool,
}

impl ReplaceLinkedIdentifiers {
    /// `enabled` is false when no identifier mapper is switched on, in which
    /// case there is nothing this job may relink
    pub fn new(services: JobServices, enabled: bool) -> Self {
        Self { services, enabled }
    }

    async fn relink(&self, provenance: Statement, ctx: &SessionContext) -> Result<Option<Transaction>> {
        let Some(old) = provenance.object.as_resource() else {
            return Ok(None);
        };
        let new = provenance.subject.clone();

        let pointing: Vec<Statement> = self
            .services
            .store
            .list_statements(None, None, Some(&provenance.object), ctx)
            .await?
            .into_iter()
            .filter(|st| st.predicate != local::ORIGINAL_IDENTIFIER && st.predicate != owl::SAME_AS)
            .collect();
        let relinked: Vec<Statement> = pointing
            .iter()
            .map(|st| st.with_object(Value::from(new.clone())))
            .collect();
        debug!(old = %old, new = %new, statements = pointing.len(), "Relinking statements");

        let mut transaction = Transaction::new()
            .remove(pointing, Activity::Removed)
            .remove([provenance], Activity::Removed)
            .insert(relinked, Activity::Updated);

        if let Resource::Iri(iri) = old {
            transaction = transaction.insert([Statement::new(new, owl::SAME_AS, iri)], Activity::Inserted);
        }
        Ok(Some(transaction))
    }

    async fn relink_all(
        &self,
        candidates: Vec<Statement>,
        buffer: &mut CommitBuffer<'_>,
        ctx: &SessionContext,
    ) -> Result<usize> {
        let mut processed = 0;
        for provenance in candidates {
            if let Some(transaction) = self.relink(provenance, ctx).await? {
                buffer.push(transaction).await?;
                processed += 1;
            }
        }
        Ok(processed)
    }
}

#[async_trait]
impl Job for ReplaceLinkedIdentifiers {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, ctx: &SessionContext) -> Result<JobOutcome> {
        if !self.enabled {
            return Err(Error::Config("No identifier mapper is enabled".to_string()));
        }
        let ctx = ctx.clone().with_repository(RepositoryType::Entities);

        let candidates: Vec<Statement> = self
            .services
            .store
            .list_statements(None, Some(&local::ORIGINAL_IDENTIFIER), None, &ctx)
            .await?
            .into_iter()
            .filter(|st| st.object.is_resource())
            .collect();
        if candidates.is_empty() {
            debug!("No linked identifiers to replace");
            return Ok(JobOutcome::default());
        }

        let mut buffer = CommitBuffer::new(&self.services, &ctx, self.services.config.link_commit_batch);
        let processed = match self.relink_all(candidates, &mut buffer, &ctx).await {
            Ok(processed) => processed,
            Err(e) => return Err(buffer.abandon(e).await),
        };

        let transactions = buffer.finish().await?;
        info!(processed, transactions, "Replaced linked identifiers");
        Ok(JobOutcome { processed, transactions })
    }
}
