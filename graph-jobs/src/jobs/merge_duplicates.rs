//! Duplicate detection and merge
//!
//! Characteristic properties are checked one after another, each on its own
//! spawned worker that the run awaits before moving on. For each property,
//! subjects of the same type sharing a value are grouped; every group with
//! more than one member is a candidate. The selector picks a survivor, links
//! pointing at the other members are moved to it, and the other members are
//! deleted.
//!
//! A pass that fills the candidate limit is repeated for the same property.
//! Errors abort the property for this run; relinks already committed stay,
//! since relinking again only finds fewer inbound links.

use super::{Job, JobOutcome, JobServices};
use async_trait::async_trait;
use chrono::Utc;
use graph_common::events::GraphEvent;
use graph_common::vocab::{characteristic_properties, local, rdf};
use graph_common::{Error, Iri, RepositoryType, Resource, Result, SessionContext, Value};
use graph_store::query::{var, Filter};
use graph_store::{Activity, SelectQuery, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "merge_duplicates";

/// A (type, property, value) combination held by more than one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCandidate {
    pub type_iri: Iri,
    pub property: Iri,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duplicate {
    pub id: Resource,
}

/// Picks the surviving subject out of a duplicate set
pub trait OriginalSelector: Send + Sync {
    /// Split into the survivor and the duplicates to remove; `None` for an
    /// empty set
    fn select(&self, duplicates: Vec<Duplicate>) -> Option<(Duplicate, Vec<Duplicate>)>;
}

/// The lexicographically greatest identifier survives
#[derive(Debug, Default, Clone)]
pub struct DescendingIdentifier;

impl OriginalSelector for DescendingIdentifier {
    fn select(&self, mut duplicates: Vec<Duplicate>) -> Option<(Duplicate, Vec<Duplicate>)> {
        duplicates.sort_by(|a, b| b.id.string_value().cmp(a.id.string_value()));
        let mut rest = duplicates.into_iter();
        let survivor = rest.next()?;
        Some((survivor, rest.collect()))
    }
}

#[derive(Debug, Default)]
struct PassOutcome {
    candidates: usize,
    removed: usize,
    transactions: usize,
}

#[derive(Clone)]
pub struct MergeDuplicates {
    services: JobServices,
    selector: Arc<dyn OriginalSelector>,
}

impl MergeDuplicates {
    pub fn new(services: JobServices) -> Self {
        Self {
            services,
            selector: Arc::new(DescendingIdentifier),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn OriginalSelector>) -> Self {
        self.selector = selector;
        self
    }

    fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.services.config.merge_discovery_timeout_ms)
    }

    async fn find_candidates(&self, property: &Iri, ctx: &SessionContext) -> Result<Vec<DuplicateCandidate>> {
        let query = SelectQuery::select(&["type", "value", "count"])
            .pattern(var("s"), rdf::TYPE, var("type"))
            .pattern(var("s"), property.clone(), var("value"))
            .filter(Filter::not_starts_with("type", local::URN_PREFIX))
            .group_by(&["type", "value"], "s", "count", 1)
            .limit(self.services.config.merge_candidate_limit.max(1));

        let timeout = self.discovery_timeout();
        let rows = tokio::time::timeout(timeout, self.services.store.select(&query, ctx))
            .await
            .map_err(|_| Error::Timeout {
                operation: "merge candidate discovery".to_string(),
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let type_iri = row.get("type")?.as_iri()?.clone();
                let value = row.get("value")?.clone();
                Some(DuplicateCandidate {
                    type_iri,
                    property: property.clone(),
                    value,
                })
            })
            .collect())
    }

    async fn find_duplicates(&self, candidate: &DuplicateCandidate, ctx: &SessionContext) -> Result<Vec<Duplicate>> {
        let query = SelectQuery::select(&["s"])
            .pattern(var("s"), rdf::TYPE, candidate.type_iri.clone())
            .pattern(var("s"), candidate.property.clone(), candidate.value.clone())
            .distinct();
        let rows = self.services.store.select(&query, ctx).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("s").and_then(|v| v.as_resource()))
            .map(|id| Duplicate { id })
            .collect())
    }

    /// Commit one merge step; the committed transaction is recorded in
    /// `committed` even when it carries no success marker
    async fn commit_step(
        &self,
        transaction: Transaction,
        committed: &mut Vec<Transaction>,
        ctx: &SessionContext,
    ) -> Result<()> {
        let transaction = self.services.store.commit_one(transaction, ctx).await?;
        let outcome = transaction.assert_success();
        committed.push(transaction);
        outcome
    }

    /// Point every statement referencing `duplicate` at `survivor`
    async fn relink(
        &self,
        duplicate: &Resource,
        survivor: &Resource,
        committed: &mut Vec<Transaction>,
        ctx: &SessionContext,
    ) -> Result<()> {
        let target = Value::from(duplicate.clone());
        let inbound = self.services.store.list_statements(None, None, Some(&target), ctx).await?;
        if inbound.is_empty() {
            return Ok(());
        }
        let relinked: Vec<_> = inbound
            .iter()
            .map(|st| st.with_object(Value::from(survivor.clone())))
            .collect();
        debug!(duplicate = %duplicate, survivor = %survivor, links = inbound.len(), "Relinking duplicate");

        let transaction = Transaction::new()
            .remove(inbound, Activity::Removed)
            .insert(relinked, Activity::Updated);
        self.commit_step(transaction, committed, ctx).await
    }

    async fn delete(&self, duplicate: &Resource, committed: &mut Vec<Transaction>, ctx: &SessionContext) -> Result<()> {
        let statements = self.services.store.list_statements(Some(duplicate), None, None, ctx).await?;
        if statements.is_empty() {
            return Ok(());
        }
        let transaction = Transaction::new().remove(statements, Activity::Removed);
        self.commit_step(transaction, committed, ctx).await
    }

    async fn fold_into(
        &self,
        survivor: &Duplicate,
        removable: &[Duplicate],
        committed: &mut Vec<Transaction>,
        ctx: &SessionContext,
    ) -> Result<()> {
        for duplicate in removable {
            self.relink(&duplicate.id, &survivor.id, committed, ctx).await?;
            self.delete(&duplicate.id, committed, ctx).await?;
        }
        Ok(())
    }

    async fn merge_candidate(&self, candidate: &DuplicateCandidate, ctx: &SessionContext) -> Result<(usize, usize)> {
        let duplicates = self.find_duplicates(candidate, ctx).await?;
        if duplicates.len() < 2 {
            return Ok((0, 0));
        }
        let Some((survivor, removable)) = self.selector.select(duplicates) else {
            return Ok((0, 0));
        };

        let mut transactions = Vec::new();
        let folded = self.fold_into(&survivor, &removable, &mut transactions, ctx).await;

        let committed = transactions.len();
        if !transactions.is_empty() {
            match self.services.log.store(transactions, ctx).await {
                Ok(_) => {}
                Err(e) if folded.is_ok() => return Err(e),
                Err(e) => warn!(error = %e, "Could not log transactions of an aborted merge"),
            }
        }
        folded?;
        info!(
            survivor = %survivor.id,
            removed = removable.len(),
            property = %candidate.property,
            value = %candidate.value,
            "Merged duplicates"
        );
        self.services.events.emit_lossy(GraphEvent::DuplicatesMerged {
            survivor: survivor.id.string_value().to_string(),
            removed: removable.iter().map(|d| d.id.string_value().to_string()).collect(),
            timestamp: Utc::now(),
        });
        Ok((removable.len(), committed))
    }

    async fn merge_pass(&self, property: &Iri, ctx: &SessionContext) -> Result<PassOutcome> {
        let candidates = self.find_candidates(property, ctx).await?;
        let mut pass = PassOutcome {
            candidates: candidates.len(),
            ..PassOutcome::default()
        };
        for candidate in &candidates {
            let (removed, transactions) = self.merge_candidate(candidate, ctx).await?;
            pass.removed += removed;
            pass.transactions += transactions;
        }
        Ok(pass)
    }

    /// Merge all duplicates for one property; returns (removed, transactions)
    async fn merge_property(&self, property: &Iri, ctx: &SessionContext) -> Result<(usize, usize)> {
        let limit = self.services.config.merge_candidate_limit.max(1);
        let mut removed = 0;
        let mut transactions = 0;
        loop {
            match self.merge_pass(property, ctx).await {
                Ok(pass) => {
                    removed += pass.removed;
                    transactions += pass.transactions;
                    if pass.candidates < limit || pass.removed == 0 {
                        break;
                    }
                    debug!(property = %property, "Candidate limit reached, repeating pass");
                }
                Err(e @ Error::Invariant(_)) => return Err(e),
                Err(e) if e.is_timeout() => {
                    warn!(property = %property, error = %e, "Duplicate discovery timed out");
                    break;
                }
                Err(e) => {
                    error!(property = %property, error = %e, "Duplicate merge aborted for property");
                    break;
                }
            }
        }
        Ok((removed, transactions))
    }
}

#[async_trait]
impl Job for MergeDuplicates {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, ctx: &SessionContext) -> Result<JobOutcome> {
        let ctx = ctx.clone().with_repository(RepositoryType::Entities);
        let mut outcome = JobOutcome::default();
        for property in characteristic_properties() {
            let worker = self.clone();
            let worker_ctx = ctx.clone();
            let name = property.to_string();
            let handle = tokio::spawn(async move { worker.merge_property(&property, &worker_ctx).await });
            let (removed, transactions) = handle
                .await
                .map_err(|e| Error::Internal(format!("Merge worker for {} failed: {}", name, e)))??;
            outcome.processed += removed;
            outcome.transactions += transactions;
        }
        if outcome.processed > 0 {
            info!(removed = outcome.processed, transactions = outcome.transactions, "Duplicate merge finished");
        } else {
            debug!("No duplicates found");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dup(id: &str) -> Duplicate {
        Duplicate { id: Resource::iri(id) }
    }

    #[test]
    fn test_descending_identifier_keeps_greatest() {
        let (survivor, rest) = DescendingIdentifier
            .select(vec![dup("urn:pwid:meg:e:b"), dup("urn:pwid:meg:e:c"), dup("urn:pwid:meg:e:a")])
            .unwrap();
        assert_eq!(survivor, dup("urn:pwid:meg:e:c"));
        assert_eq!(rest, vec![dup("urn:pwid:meg:e:b"), dup("urn:pwid:meg:e:a")]);
    }

    #[test]
    fn test_descending_identifier_empty_set() {
        assert!(DescendingIdentifier.select(Vec::new()).is_none());
    }
}
