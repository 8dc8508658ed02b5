//! Subject rewrite and object relink against the in-memory store

mod helpers;

use graph_common::config::{GraphConfig, StoreConfig};
use graph_common::events::GraphEvent;
use graph_common::vocab::{dc, local, owl, rdf, rdfs, sdo};
use graph_common::{Error, Iri, Resource, Statement, Value};
use graph_jobs::cache::EntityCache;
use graph_jobs::jobs::{Job, ReplaceLinkedIdentifiers, ReplaceSubjectIdentifiers};
use graph_jobs::transformers::{AnonymousIdentifiers, ExternalIdentifiers, IdentifierMapper};
use graph_store::SqliteStore;
use helpers::{FailingCommits, Harness};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const LINK: Iri = Iri::from_static("https://schema.org/about");

fn subject_job(harness: &Harness) -> ReplaceSubjectIdentifiers {
    let mappers: Vec<Arc<dyn IdentifierMapper>> = vec![Arc::new(ExternalIdentifiers), Arc::new(AnonymousIdentifiers)];
    ReplaceSubjectIdentifiers::new(harness.services.clone(), mappers)
}

fn link_job(harness: &Harness) -> ReplaceLinkedIdentifiers {
    ReplaceLinkedIdentifiers::new(harness.services.clone(), true)
}

/// Subject holding `(subject, ORIGINAL_IDENTIFIER, original)`
fn rewritten(statements: &[Statement], original: &Resource) -> Option<Resource> {
    let original = Value::from(original.clone());
    statements
        .iter()
        .find(|st| st.predicate == local::ORIGINAL_IDENTIFIER && st.object == original)
        .map(|st| st.subject.clone())
}

#[tokio::test]
async fn test_anonymous_subject_round_trip() {
    let harness = Harness::new();
    let blank = Resource::blank("b1");
    harness
        .load(vec![
            Statement::new(blank.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(blank.clone(), rdfs::LABEL, Value::literal("x")),
        ])
        .await;

    let outcome = subject_job(&harness).run(&harness.ctx()).await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.transactions, 1);

    let statements = harness.entities().await;
    let new = rewritten(&statements, &blank).expect("original identifier statement");
    assert!(new.as_iri().unwrap().starts_with(local::entities::NAMESPACE));
    assert!(statements.contains(&Statement::new(new.clone(), rdf::TYPE, sdo::VIDEO_OBJECT)));
    assert!(statements.contains(&Statement::new(new.clone(), rdfs::LABEL, Value::literal("x"))));
    assert!(!statements.iter().any(|st| st.subject == blank));
    assert!(harness.logged().await > 0);
}

#[tokio::test]
async fn test_subject_rewrite_is_idempotent() {
    let harness = Harness::new();
    harness
        .load(vec![
            Statement::new(Resource::blank("b1"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::iri("http://example.org/v/1"), rdf::TYPE, sdo::VIDEO_OBJECT),
        ])
        .await;
    let job = subject_job(&harness);

    let first = job.run(&harness.ctx()).await.unwrap();
    assert_eq!(first.processed, 2);
    let after_first = harness.entities().await;

    let second = job.run(&harness.ctx()).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.transactions, 0);
    assert_eq!(harness.entities().await, after_first);
}

#[tokio::test]
async fn test_same_value_under_two_blank_nodes_stays_two_subjects() {
    let harness = Harness::new();
    let mut statements = Vec::new();
    for id in ["b1", "b2"] {
        statements.push(Statement::new(Resource::blank(id), rdf::TYPE, sdo::VIDEO_OBJECT));
        statements.push(Statement::new(Resource::blank(id), dc::IDENTIFIER, Value::literal("x")));
    }
    harness.load(statements).await;

    subject_job(&harness).run(&harness.ctx()).await.unwrap();

    let statements = harness.entities().await;
    let first = rewritten(&statements, &Resource::blank("b1")).unwrap();
    let second = rewritten(&statements, &Resource::blank("b2")).unwrap();
    assert_ne!(first, second);
    assert!(!statements.iter().any(|st| st.subject.is_blank()));
}

#[tokio::test]
async fn test_object_relink_to_rewritten_blank_node() {
    let harness = Harness::new();
    let owner = Resource::iri("urn:pwid:meg:e:owner");
    let blank = Resource::blank("b");
    harness
        .load(vec![
            Statement::new(owner.clone(), LINK, blank.clone()),
            Statement::new(blank.clone(), rdf::TYPE, sdo::THING),
            Statement::new(blank.clone(), rdfs::LABEL, Value::literal("B")),
        ])
        .await;

    subject_job(&harness).run(&harness.ctx()).await.unwrap();
    let new = rewritten(&harness.entities().await, &blank).unwrap();

    let outcome = link_job(&harness).run(&harness.ctx()).await.unwrap();
    assert_eq!(outcome.processed, 1);

    let statements = harness.entities().await;
    assert!(statements.contains(&Statement::new(owner, LINK, new)));
    assert!(!harness.mentions(&blank).await);
    assert!(!statements.iter().any(|st| st.predicate == local::ORIGINAL_IDENTIFIER));
    assert!(!statements.iter().any(|st| st.predicate == owl::SAME_AS));
}

#[tokio::test]
async fn test_external_identifier_kept_as_same_as() {
    let harness = Harness::new();
    let owner = Resource::iri("urn:pwid:meg:e:owner");
    let external = Resource::iri("http://example.org/video/1");
    harness
        .load(vec![
            Statement::new(external.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(external.clone(), sdo::NAME, Value::literal("Video 1")),
            Statement::new(owner.clone(), LINK, external.clone()),
        ])
        .await;

    subject_job(&harness).run(&harness.ctx()).await.unwrap();
    let new = rewritten(&harness.entities().await, &external).unwrap();
    link_job(&harness).run(&harness.ctx()).await.unwrap();

    let statements = harness.entities().await;
    let external_iri = external.as_iri().unwrap().clone();
    assert!(statements.contains(&Statement::new(new.clone(), owl::SAME_AS, external_iri)));
    assert!(statements.contains(&Statement::new(owner, LINK, new)));
    assert!(!statements.iter().any(|st| st.predicate == local::ORIGINAL_IDENTIFIER));
    assert!(!statements.iter().any(|st| st.subject == external));
}

#[tokio::test]
async fn test_relink_leaves_same_as_and_provenance_alone() {
    let harness = Harness::new();
    let owner = Resource::iri("urn:pwid:meg:e:owner");
    let mirror = Resource::iri("urn:pwid:meg:e:mirror");
    let external = Resource::iri("http://example.org/video/2");
    harness
        .load(vec![
            Statement::new(external.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(owner.clone(), LINK, external.clone()),
            Statement::new(mirror.clone(), owl::SAME_AS, external.clone()),
        ])
        .await;

    subject_job(&harness).run(&harness.ctx()).await.unwrap();
    let new = rewritten(&harness.entities().await, &external).unwrap();
    let outcome = link_job(&harness).run(&harness.ctx()).await.unwrap();
    assert_eq!(outcome.processed, 1);

    let statements = harness.entities().await;
    assert!(statements.contains(&Statement::new(owner, LINK, new.clone())));
    assert!(statements.contains(&Statement::new(mirror.clone(), owl::SAME_AS, external.clone())));
    assert!(!statements.contains(&Statement::new(mirror, owl::SAME_AS, new.clone())));
    assert!(!statements.contains(&Statement::new(new.clone(), local::ORIGINAL_IDENTIFIER, new)));
}

#[tokio::test]
async fn test_link_job_without_mappers_is_config_error() {
    let harness = Harness::new();
    let job = ReplaceLinkedIdentifiers::new(harness.services.clone(), false);
    assert!(matches!(job.run(&harness.ctx()).await, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_failed_batch_still_logs_committed_transactions() {
    let mut config = GraphConfig::default();
    config.jobs.subject_commit_batch = 1;
    config.jobs.log_batch = 10;
    // load is the first entities commit, the job's second batch the third
    let harness = Harness::with_provider(FailingCommits::new(3), config);
    let mut statements = Vec::new();
    for id in ["b1", "b2"] {
        statements.push(Statement::new(Resource::blank(id), rdf::TYPE, sdo::VIDEO_OBJECT));
    }
    harness.load(statements).await;
    assert_eq!(harness.logged().await, 0);

    let result = subject_job(&harness).run(&harness.ctx()).await;
    assert!(result.is_err());

    let statements = harness.entities().await;
    let rewritten_subjects = statements
        .iter()
        .filter(|st| st.predicate == local::ORIGINAL_IDENTIFIER)
        .count();
    assert_eq!(rewritten_subjects, 1);
    assert!(harness.logged().await > 0);
}

#[tokio::test]
async fn test_subject_and_link_jobs_on_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("graph.db"), &StoreConfig::default())
        .await
        .unwrap();
    let harness = Harness::with_provider(store, GraphConfig::default());
    let owner = Resource::iri("urn:pwid:meg:e:owner");
    let blank = Resource::blank("b1");
    harness
        .load(vec![
            Statement::new(blank.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(blank.clone(), rdfs::LABEL, Value::literal("x")),
            Statement::new(owner.clone(), LINK, blank.clone()),
        ])
        .await;

    let outcome = subject_job(&harness).run(&harness.ctx()).await.unwrap();
    assert_eq!(outcome.processed, 1);
    let new = rewritten(&harness.entities().await, &blank).unwrap();
    link_job(&harness).run(&harness.ctx()).await.unwrap();

    let statements = harness.entities().await;
    assert!(statements.contains(&Statement::new(new.clone(), rdfs::LABEL, Value::literal("x"))));
    assert!(statements.contains(&Statement::new(owner, LINK, new)));
    assert!(!harness.mentions(&blank).await);
    assert!(harness.logged().await > 0);

    let again = subject_job(&harness).run(&harness.ctx()).await.unwrap();
    assert_eq!(again.processed, 0);
}

#[tokio::test]
async fn test_subject_rewrite_without_mappers_is_config_error() {
    let harness = Harness::new();
    let job = ReplaceSubjectIdentifiers::new(harness.services.clone(), Vec::new());
    assert!(matches!(job.run(&harness.ctx()).await, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_commits_publish_events_and_evict_cache() {
    let harness = Harness::new();
    let blank = Resource::blank("b1");
    harness
        .load(vec![
            Statement::new(blank.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(blank.clone(), rdfs::LABEL, Value::literal("x")),
        ])
        .await;

    let cache = Arc::new(EntityCache::new());
    cache
        .get_or_load(harness.services.store.as_ref(), &blank, &harness.ctx())
        .await
        .unwrap();
    assert_eq!(cache.len().await, 1);

    let mut subscription = harness.events.subscribe("test");
    let cancel = CancellationToken::new();
    let invalidation = cache.spawn_invalidation(&harness.events, cancel.clone());

    subject_job(&harness).run(&harness.ctx()).await.unwrap();

    match subscription.recv().await.unwrap() {
        GraphEvent::TransactionsCommitted { affected, .. } => assert!(affected.contains(&"b1".to_string())),
        other => panic!("unexpected event {:?}", other),
    }
    for _ in 0..100 {
        if cache.is_empty().await {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(cache.is_empty().await);

    cancel.cancel();
    invalidation.await.unwrap();
}
