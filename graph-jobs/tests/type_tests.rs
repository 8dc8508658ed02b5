//! Internal type assignment against the in-memory store

mod helpers;

use graph_common::vocab::{local::entities, rdf, rdfs, sdo, skos};
use graph_common::{Error, Iri, Resource, Statement, Value};
use graph_jobs::jobs::{AssignInternalTypes, Job};
use graph_jobs::transformers::{LocalTypes, TypeTransformer};
use helpers::Harness;
use std::sync::Arc;

const DURATION: Iri = Iri::from_static("https://example.org/Duration");
const VALUE: Iri = Iri::from_static("https://example.org/value");

fn local_types() -> Option<Arc<dyn TypeTransformer>> {
    Some(Arc::new(LocalTypes))
}

#[tokio::test]
async fn test_missing_or_disabled_transformer_is_config_error() {
    let harness = Harness::new();
    let ctx = harness.ctx();

    let missing = AssignInternalTypes::new(harness.services.clone(), None, true);
    assert!(matches!(missing.run(&ctx).await, Err(Error::Config(_))));

    let disabled = AssignInternalTypes::new(harness.services.clone(), local_types(), false);
    assert!(matches!(disabled.run(&ctx).await, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_markers_assigned_in_one_transaction() {
    let harness = Harness::new();
    let video = Resource::iri("urn:pwid:meg:e:video");
    let genre = Resource::iri("urn:pwid:meg:e:genre");
    let duration = Resource::iri("urn:pwid:meg:e:duration");
    let done = Resource::iri("urn:pwid:meg:e:done");
    harness
        .load(vec![
            Statement::new(video.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(video.clone(), rdfs::LABEL, Value::literal("Clip")),
            Statement::new(genre.clone(), rdf::TYPE, skos::CONCEPT),
            Statement::new(genre.clone(), skos::PREF_LABEL, Value::literal("Jazz")),
            Statement::new(duration.clone(), rdf::TYPE, DURATION),
            Statement::new(duration.clone(), VALUE, Value::literal("PT3M")),
            Statement::new(done.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(done.clone(), rdf::TYPE, entities::CLASSIFIER),
        ])
        .await;
    let logged_before = harness.logged().await;

    let job = AssignInternalTypes::new(harness.services.clone(), local_types(), true);
    let outcome = job.run(&harness.ctx()).await.unwrap();
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.transactions, 1);
    assert!(harness.logged().await > logged_before);

    let statements = harness.entities().await;
    assert!(statements.contains(&Statement::new(video, rdf::TYPE, entities::INDIVIDUAL)));
    assert!(statements.contains(&Statement::new(genre, rdf::TYPE, entities::CLASSIFIER)));
    assert!(statements.contains(&Statement::new(duration, rdf::TYPE, entities::EMBEDDED)));
    assert!(!statements.contains(&Statement::new(done, rdf::TYPE, entities::INDIVIDUAL)));

    let again = job.run(&harness.ctx()).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.transactions, 0);
}
