//! Subject identifier normalization
//!
//! Finds typed subjects outside the local namespace (blank nodes and external
//! IRIs), gives each a canonical local IRI and rewrites its statements. The
//! old identifier is kept as `(new, ORIGINAL_IDENTIFIER, old)` so that the
//! linked-identifier job can repair statements still pointing at it.

use super::{CommitBuffer, Job, JobOutcome, JobServices};
use crate::transformers::IdentifierMapper;
use async_trait::async_trait;
use graph_common::vocab::{local, rdf};
use graph_common::{Error, Iri, Model, RepositoryType, Resource, Result, SessionContext, Statement};
use graph_store::query::{var, Filter};
use graph_store::{Activity, SelectQuery, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

pub const NAME: &str = "replace_subject_identifiers";

/// Working set for one candidate subject
struct StatementsBag {
    candidate: Resource,
    removable: Model,
    converted: Model,
    original_identifier: Option<Statement>,
}

impl StatementsBag {
    fn new(candidate: Resource) -> Self {
        Self {
            candidate,
            removable: Model::new(),
            converted: Model::new(),
            original_identifier: None,
        }
    }

    /// Rewrite subjects found in `mappings`; other statements are left alone
    fn convert(mut self, fragment: Vec<Statement>, mappings: &BTreeMap<Resource, Iri>) -> Self {
        for statement in fragment {
            let Some(new) = mappings.get(&statement.subject) else {
                continue;
            };
            let new_subject = Resource::Iri(new.clone());
            if statement.subject == self.candidate && self.original_identifier.is_none() {
                self.original_identifier = Some(Statement::new(
                    new_subject.clone(),
                    local::ORIGINAL_IDENTIFIER,
                    statement.subject.clone(),
                ));
            }
            self.converted.insert(statement.with_subject(new_subject));
            self.removable.insert(statement);
        }
        self
    }

    fn into_transaction(self) -> Option<Transaction> {
        if self.removable.is_empty() {
            return None;
        }
        let mut inserts = self.converted;
        inserts.extend(self.original_identifier);
        Some(
            Transaction::new()
                .remove(self.removable, Activity::Removed)
                .insert(inserts, Activity::Inserted),
        )
    }
}

pub struct ReplaceSubjectIdentifiers {
    services: JobServices,
    mappers: Vec<Arc<dyn IdentifierMapper>>,
}

impl ReplaceSubjectIdentifiers {
    /// Mappers are consulted in order; a later mapper's mapping for the same
    /// subject replaces an earlier one
    pub fn new(services: JobServices, mappers: Vec<Arc<dyn IdentifierMapper>>) -> Self {
        Self { services, mappers }
    }

    async fn candidates(&self, ctx: &SessionContext) -> Result<Vec<Resource>> {
        let query = SelectQuery::select(&["s"])
            .pattern(var("s"), rdf::TYPE, var("type"))
            .filter(Filter::not_starts_with("s", local::URN_PREFIX))
            .distinct()
            .limit(self.services.config.subject_candidate_limit.max(1));

        let rows = self.services.store.select(&query, ctx).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("s").and_then(|v| v.as_resource()))
            .collect())
    }

    fn mappings(&self, model: &Model, ctx: &SessionContext) -> BTreeMap<Resource, Iri> {
        let mut mappings = BTreeMap::new();
        for mapper in &self.mappers {
            for mapping in mapper.build_mappings(model, ctx.environment()) {
                trace!(mapper = mapper.name(), old = %mapping.old, new = %mapping.new, "Identifier mapping");
                mappings.insert(mapping.old, mapping.new);
            }
        }
        mappings
    }

    async fn rewrite_all(
        &self,
        candidates: Vec<Resource>,
        buffer: &mut CommitBuffer<'_>,
        ctx: &SessionContext,
    ) -> Result<usize> {
        let mut processed = 0;
        for candidate in candidates {
            let fragment = self
                .services
                .store
                .list_statements(Some(&candidate), None, None, ctx)
                .await?;
            let model: Model = fragment.iter().cloned().collect();
            let mappings = self.mappings(&model, ctx);

            let bag = StatementsBag::new(candidate.clone()).convert(fragment, &mappings);
            match bag.into_transaction() {
                Some(transaction) => {
                    buffer.push(transaction).await?;
                    processed += 1;
                }
                None => trace!(subject = %candidate, "No mapping for candidate"),
            }
        }
        Ok(processed)
    }
}

#[async_trait]
impl Job for ReplaceSubjectIdentifiers {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, ctx: &SessionContext) -> Result<JobOutcome> {
        if self.mappers.is_empty() {
            return Err(Error::Config("No identifier mapper is enabled".to_string()));
        }
        let ctx = ctx.clone().with_repository(RepositoryType::Entities);

        let candidates = self.candidates(&ctx).await?;
        if candidates.is_empty() {
            debug!("No subjects with replaceable identifiers");
            return Ok(JobOutcome::default());
        }
        debug!(candidates = candidates.len(), "Replacing subject identifiers");

        let mut buffer = CommitBuffer::new(&self.services, &ctx, self.services.config.subject_commit_batch);
        let processed = match self.rewrite_all(candidates, &mut buffer, &ctx).await {
            Ok(processed) => processed,
            Err(e) => return Err(buffer.abandon(e).await),
        };

        let transactions = buffer.finish().await?;
        info!(processed, transactions, "Replaced subject identifiers");
        Ok(JobOutcome { processed, transactions })
    }
}
