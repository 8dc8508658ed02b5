//! Internal type assignment
//!
//! Typed subjects without one of the internal markers are handed to the type
//! transformer; everything it produces is committed in one transaction.

use super::{Job, JobOutcome, JobServices};
use crate::transformers::TypeTransformer;
use async_trait::async_trait;
use graph_common::vocab::{internal_types, rdf};
use graph_common::{Error, Model, RepositoryType, Resource, Result, SessionContext};
use graph_store::query::{var, Filter, TriplePattern};
use graph_store::{Activity, SelectQuery, Transaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "assign_internal_types";

pub struct AssignInternalTypes {
    services: JobServices,
    transformer: Option<Arc<dyn TypeTransformer>>,
    enabled: bool,
}

impl AssignInternalTypes {
    pub fn new(services: JobServices, transformer: Option<Arc<dyn TypeTransformer>>, enabled: bool) -> Self {
        Self {
            services,
            transformer,
            enabled,
        }
    }

    fn transformer(&self) -> Result<&Arc<dyn TypeTransformer>> {
        match &self.transformer {
            Some(transformer) if self.enabled => Ok(transformer),
            Some(transformer) => Err(Error::Config(format!(
                "Type transformer {} is disabled",
                transformer.name()
            ))),
            None => Err(Error::Config("No type transformer is configured".to_string())),
        }
    }

    async fn candidates(&self, ctx: &SessionContext) -> Result<Vec<Resource>> {
        let mut query = SelectQuery::select(&["s"])
            .pattern(var("s"), rdf::TYPE, var("type"))
            .filter(Filter::not_starts_with("type", rdf::NAMESPACE));
        for marker in internal_types() {
            query = query.filter(Filter::NotExists(vec![TriplePattern::new(var("s"), rdf::TYPE, marker)]));
        }
        let query = query.distinct().limit(self.services.config.type_candidate_limit.max(1));

        let rows = self.services.store.select(&query, ctx).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("s").and_then(|v| v.as_resource()))
            .collect())
    }
}

#[async_trait]
impl Job for AssignInternalTypes {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, ctx: &SessionContext) -> Result<JobOutcome> {
        let transformer = self.transformer()?;
        let ctx = ctx.clone().with_repository(RepositoryType::Entities);

        let candidates = self.candidates(&ctx).await?;
        if candidates.is_empty() {
            debug!("No subjects without internal type");
            return Ok(JobOutcome::default());
        }

        let mut statements = Model::new();
        let mut processed = 0;
        for candidate in &candidates {
            let fragment = match self.services.store.get_fragment(candidate, false, &ctx).await {
                Ok(fragment) => fragment,
                Err(Error::NotFound(_)) => {
                    warn!(subject = %candidate, "Candidate disappeared before type assignment");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let produced = transformer.get_statements(&fragment);
            if !produced.is_empty() {
                processed += 1;
            }
            statements.extend(produced);
        }

        if statements.is_empty() {
            return Ok(JobOutcome { processed, transactions: 0 });
        }

        let transaction = Transaction::new().insert(statements, Activity::Inserted);
        let committed = self.services.store.commit_one(transaction, &ctx).await?;
        let outcome = committed.assert_success();
        self.services.log.store(vec![committed], &ctx).await?;
        outcome?;

        info!(processed, candidates = candidates.len(), transformer = transformer.name(), "Assigned internal types");
        Ok(JobOutcome { processed, transactions: 1 })
    }
}
