//! graph-jobs library interface
//!
//! Maintenance jobs over the graph store (identifier normalization, type
//! assignment, duplicate merge), their scheduler, the entity cache and the
//! admin API.

pub mod api;
pub mod cache;
pub mod jobs;
pub mod scheduler;
pub mod transformers;

pub use crate::api::{build_router, ApiError, ApiResult, AppState};

use graph_common::config::{GraphConfig, TransformersConfig};
use graph_common::events::EventBus;
use graph_store::{AccessLayer, ConnectionProvider, GraphRepository, RepositoryTransactionLog, StoreMetrics};
use jobs::{
    AssignInternalTypes, JobServices, MergeDuplicates, ReplaceLinkedIdentifiers, ReplaceSubjectIdentifiers,
};
use scheduler::JobScheduler;
use std::sync::Arc;
use std::time::Duration;
use transformers::{AnonymousIdentifiers, ExternalIdentifiers, IdentifierMapper, LocalTypes, TypeTransformer};

/// Repository, transaction log and event bus over one connection provider
pub fn build_services<P: ConnectionProvider>(
    provider: P,
    config: &GraphConfig,
    events: EventBus,
    metrics: Arc<StoreMetrics>,
) -> JobServices {
    let access = Arc::new(
        AccessLayer::new(provider)
            .with_scheduled_timeout(Duration::from_millis(config.store.scheduled_timeout_ms))
            .with_metrics(metrics),
    );
    let store = GraphRepository::new(Arc::clone(&access)).with_events(events.clone());
    let log = RepositoryTransactionLog::new(access);

    JobServices {
        store: Arc::new(store),
        log: Arc::new(log),
        events,
        config: config.jobs.clone(),
    }
}

/// Register the four jobs in dependency order: subject rewrite, object
/// relink, type assignment, duplicate merge
pub fn build_scheduler(services: JobServices, transformers: &TransformersConfig) -> JobScheduler {
    let mut mappers: Vec<Arc<dyn IdentifierMapper>> = Vec::new();
    if transformers.replace_external_identifiers {
        mappers.push(Arc::new(ExternalIdentifiers));
    }
    if transformers.replace_anonymous_identifiers {
        mappers.push(Arc::new(AnonymousIdentifiers));
    }

    let relink_enabled = !mappers.is_empty();
    let type_transformer: Arc<dyn TypeTransformer> = Arc::new(LocalTypes);

    let schedules = services.config.clone();
    let mut scheduler = JobScheduler::new(services.events.clone());
    scheduler.register(
        Arc::new(ReplaceSubjectIdentifiers::new(services.clone(), mappers)),
        schedules.replace_subject_identifiers,
    );
    scheduler.register(
        Arc::new(ReplaceLinkedIdentifiers::new(services.clone(), relink_enabled)),
        schedules.replace_linked_identifiers,
    );
    scheduler.register(
        Arc::new(AssignInternalTypes::new(
            services.clone(),
            Some(type_transformer),
            transformers.type_coercion,
        )),
        schedules.assign_internal_types,
    );
    scheduler.register(Arc::new(MergeDuplicates::new(services)), schedules.merge_duplicates);
    scheduler
}
