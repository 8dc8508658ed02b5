//! Store capabilities and the repository implementing them
//!
//! Jobs and services are written against the capability traits
//! ([`StatementsAware`], [`Queryable`], [`Commitable`], [`Fragmentable`]) or the
//! [`GraphStore`] bundle; [`GraphRepository`] implements all of them over any
//! [`ConnectionProvider`] through the [`AccessLayer`].
//!
//! # Commit protocol
//!
//! One connection is checked out per commit call. For each transaction the
//! inserted (`created ∪ updated`) and removed (`deleted`) statements are
//! written inside one native transaction: begin, add, remove, commit. A
//! transaction with nothing to write completes without store I/O. A failure
//! rolls the native transaction back and marks the transaction failed; it is
//! recorded, not returned as an error, so sibling transactions still commit.
//!
//! With `merge` set, all transactions of the call share one native transaction
//! and therefore one outcome.

use crate::access::AccessLayer;
use crate::backend::{ConnectionProvider, StoreConnection};
use crate::fragment::{self, Fragment};
use crate::metrics::Cardinality;
use crate::query::{self, Bindings, ConstructQuery, SelectQuery};
use crate::transaction::Transaction;
use async_trait::async_trait;
use graph_common::events::{EventBus, GraphEvent};
use graph_common::vocab::{local::entities, rdf};
use graph_common::{Authority, Error, Iri, Model, Resource, Result, SessionContext, Statement, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

#[async_trait]
pub trait StatementsAware: Send + Sync {
    /// Statement pattern lookup; `None` matches anything
    async fn list_statements(
        &self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        ctx: &SessionContext,
    ) -> Result<Vec<Statement>>;

    async fn has_statement(&self, statement: &Statement, ctx: &SessionContext) -> Result<bool> {
        let found = self
            .list_statements(
                Some(&statement.subject),
                Some(&statement.predicate),
                Some(&statement.object),
                ctx,
            )
            .await?;
        Ok(!found.is_empty())
    }

    /// True if the resource is the subject of any statement
    async fn exists(&self, subject: &Resource, ctx: &SessionContext) -> Result<bool> {
        Ok(!self.list_statements(Some(subject), None, None, ctx).await?.is_empty())
    }

    async fn types_of(&self, subject: &Resource, ctx: &SessionContext) -> Result<Vec<Iri>> {
        let statements = self.list_statements(Some(subject), Some(&rdf::TYPE), None, ctx).await?;
        Ok(statements.into_iter().filter_map(|st| st.object.as_iri().cloned()).collect())
    }

    async fn subjects_of_type(&self, type_iri: &Iri, ctx: &SessionContext) -> Result<Vec<Resource>> {
        let object = Value::Iri(type_iri.clone());
        let statements = self.list_statements(None, Some(&rdf::TYPE), Some(&object), ctx).await?;
        let subjects: BTreeSet<Resource> = statements.into_iter().map(|st| st.subject).collect();
        Ok(subjects.into_iter().collect())
    }

    /// Delete every statement of the session's repository; System authority only
    async fn purge(&self, ctx: &SessionContext) -> Result<()>;
}

#[async_trait]
pub trait Queryable: Send + Sync {
    async fn select(&self, query: &SelectQuery, ctx: &SessionContext) -> Result<Vec<Bindings>>;

    async fn construct(&self, query: &ConstructQuery, ctx: &SessionContext) -> Result<Model>;
}

#[async_trait]
pub trait Commitable: Send + Sync {
    /// Commit transactions and return them, in order, in their terminal state
    async fn commit(&self, transactions: Vec<Transaction>, ctx: &SessionContext, merge: bool)
        -> Result<Vec<Transaction>>;

    async fn commit_one(&self, transaction: Transaction, ctx: &SessionContext) -> Result<Transaction> {
        self.commit(vec![transaction], ctx, false)
            .await?
            .pop()
            .ok_or_else(|| Error::Internal("Commit returned no transaction".to_string()))
    }
}

#[async_trait]
pub trait Fragmentable: Send + Sync {
    async fn get_fragment(&self, resource: &Resource, include_neighbours: bool, ctx: &SessionContext)
        -> Result<Fragment>;

    /// Number of subjects marked as individual entities
    async fn count_fragments(&self, ctx: &SessionContext) -> Result<usize>;
}

/// Everything a job needs from a store
pub trait GraphStore: StatementsAware + Queryable + Commitable + Fragmentable {}

impl<T> GraphStore for T where T: StatementsAware + Queryable + Commitable + Fragmentable {}

/// Repository over one connection provider
pub struct GraphRepository<P: ConnectionProvider> {
    access: Arc<AccessLayer<P>>,
    events: Option<EventBus>,
}

impl<P: ConnectionProvider> Clone for GraphRepository<P> {
    fn clone(&self) -> Self {
        Self {
            access: Arc::clone(&self.access),
            events: self.events.clone(),
        }
    }
}

impl<P: ConnectionProvider> GraphRepository<P> {
    pub fn new(access: Arc<AccessLayer<P>>) -> Self {
        Self { access, events: None }
    }

    /// Publish `TransactionsCommitted` after each commit call
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn access(&self) -> &Arc<AccessLayer<P>> {
        &self.access
    }

    fn publish_committed(&self, transactions: &[Transaction]) {
        let Some(events) = &self.events else {
            return;
        };
        let completed: Vec<&Transaction> = transactions.iter().filter(|t| t.is_completed()).collect();
        if completed.is_empty() {
            return;
        }
        let affected: BTreeSet<String> = completed
            .iter()
            .flat_map(|t| t.affected_resources().iter().map(|r| r.string_value().to_string()))
            .collect();
        events.emit_lossy(GraphEvent::TransactionsCommitted {
            transactions: completed.iter().map(|t| t.identifier().to_string()).collect(),
            affected: affected.into_iter().collect(),
            timestamp: chrono::Utc::now(),
        });
    }
}

async fn write_statements<C>(conn: &mut C, add: &[Statement], remove: &[Statement]) -> Result<()>
where
    C: StoreConnection + ?Sized,
{
    conn.begin().await?;
    conn.add(add).await?;
    conn.remove(remove).await?;
    conn.commit().await
}

/// Write, rolling back on failure; returns the failure message
async fn write_or_rollback<C>(conn: &mut C, add: &[Statement], remove: &[Statement]) -> std::result::Result<(), String>
where
    C: StoreConnection + ?Sized,
{
    match write_statements(conn, add, remove).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(rollback_err) = conn.rollback().await {
                error!(
                    commit_error = %err,
                    rollback_error = %rollback_err,
                    "Rollback failed after commit failure"
                );
            }
            Err(err.to_string())
        }
    }
}

async fn commit_each<C>(conn: &mut C, transactions: &mut [Transaction])
where
    C: StoreConnection + ?Sized,
{
    for transaction in transactions.iter_mut() {
        let add = transaction.inserted_statements();
        let remove = transaction.removed_statements();
        if add.is_empty() && remove.is_empty() {
            transaction.set_completed();
            continue;
        }
        match write_or_rollback(conn, &add, &remove).await {
            Ok(()) => {
                transaction.set_completed();
                debug!(
                    transaction = %transaction.identifier(),
                    inserted = add.len(),
                    removed = remove.len(),
                    "Transaction committed"
                );
            }
            Err(reason) => {
                warn!(transaction = %transaction.identifier(), %reason, "Transaction failed");
                transaction.set_failed(reason);
            }
        }
    }
}

async fn commit_merged<C>(conn: &mut C, transactions: &mut [Transaction])
where
    C: StoreConnection + ?Sized,
{
    let mut add = Vec::new();
    let mut remove = Vec::new();
    for transaction in transactions.iter() {
        add.extend(transaction.inserted_statements());
        remove.extend(transaction.removed_statements());
    }

    let outcome = if add.is_empty() && remove.is_empty() {
        Ok(())
    } else {
        write_or_rollback(conn, &add, &remove).await
    };

    match &outcome {
        Ok(()) => debug!(
            transactions = transactions.len(),
            inserted = add.len(),
            removed = remove.len(),
            "Merged transactions committed"
        ),
        Err(reason) => warn!(transactions = transactions.len(), %reason, "Merged transactions failed"),
    }

    for transaction in transactions.iter_mut() {
        match &outcome {
            Ok(()) => transaction.set_completed(),
            Err(reason) => transaction.set_failed(reason.clone()),
        }
    }
}

#[async_trait]
impl<P: ConnectionProvider> StatementsAware for GraphRepository<P> {
    async fn list_statements(
        &self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        ctx: &SessionContext,
    ) -> Result<Vec<Statement>> {
        let subject = subject.cloned();
        let predicate = predicate.cloned();
        let object = object.cloned();
        self.access
            .apply_many_with_connection(ctx, "list_statements", move |conn| {
                Box::pin(async move {
                    conn.statements(subject.as_ref(), predicate.as_ref(), object.as_ref())
                        .await
                })
            })
            .await
    }

    async fn purge(&self, ctx: &SessionContext) -> Result<()> {
        if !ctx.authority().satisfies(Authority::System) {
            return Err(Error::InsufficientPrivilege(
                "Purging a repository requires system authority".to_string(),
            ));
        }
        self.access
            .consume_with_connection(ctx, "purge", |conn| Box::pin(async move { conn.clear().await }))
            .await?;
        warn!(repository = ?ctx.environment().repository_type(), "Repository purged");
        Ok(())
    }
}

#[async_trait]
impl<P: ConnectionProvider> Queryable for GraphRepository<P> {
    async fn select(&self, query: &SelectQuery, ctx: &SessionContext) -> Result<Vec<Bindings>> {
        trace!(query = ?query, "Select query");
        let query = query.clone();
        self.access
            .apply_many_with_connection(ctx, "select", move |conn| {
                Box::pin(async move { query::evaluate(conn, &query).await })
            })
            .await
    }

    async fn construct(&self, query: &ConstructQuery, ctx: &SessionContext) -> Result<Model> {
        trace!(query = ?query, "Construct query");
        let query = query.clone();
        let statements = self
            .access
            .apply_many_with_connection(ctx, "construct", move |conn| {
                Box::pin(async move { Ok(query::construct(conn, &query).await?.into_vec()) })
            })
            .await?;
        Ok(statements.into_iter().collect())
    }
}

#[async_trait]
impl<P: ConnectionProvider> Commitable for GraphRepository<P> {
    async fn commit(
        &self,
        transactions: Vec<Transaction>,
        ctx: &SessionContext,
        merge: bool,
    ) -> Result<Vec<Transaction>> {
        if transactions.is_empty() {
            return Ok(transactions);
        }
        let cardinality = Cardinality::of(transactions.len());
        let committed = self
            .access
            .execute(ctx, "commit", cardinality, false, move |conn| {
                Box::pin(async move {
                    let mut transactions = transactions;
                    if merge {
                        commit_merged(conn, &mut transactions).await;
                    } else {
                        commit_each(conn, &mut transactions).await;
                    }
                    Ok(transactions)
                })
            })
            .await?;

        self.publish_committed(&committed);
        Ok(committed)
    }
}

#[async_trait]
impl<P: ConnectionProvider> Fragmentable for GraphRepository<P> {
    async fn get_fragment(
        &self,
        resource: &Resource,
        include_neighbours: bool,
        ctx: &SessionContext,
    ) -> Result<Fragment> {
        let resource = resource.clone();
        self.access
            .apply_with_connection(ctx, "get_fragment", move |conn| {
                Box::pin(async move { fragment::load(conn, &resource, include_neighbours).await })
            })
            .await
    }

    async fn count_fragments(&self, ctx: &SessionContext) -> Result<usize> {
        let subjects = self.subjects_of_type(&entities::INDIVIDUAL, ctx).await?;
        Ok(subjects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::transaction::Activity;
    use graph_common::vocab::{rdfs, sdo};
    use graph_common::RepositoryType;

    fn repository() -> (MemoryStore, GraphRepository<MemoryStore>) {
        let store = MemoryStore::new();
        let repo = GraphRepository::new(Arc::new(AccessLayer::new(store.clone())));
        (store, repo)
    }

    fn label(subject: &str, value: &str) -> Statement {
        Statement::new(Resource::iri(subject), rdfs::LABEL, Value::literal(value))
    }

    #[tokio::test]
    async fn test_commit_inserts_and_removes() {
        let (store, repo) = repository();
        let ctx = SessionContext::system();

        let first = Transaction::new().insert([label("urn:a", "old")], Activity::Inserted);
        let first = repo.commit_one(first, &ctx).await.unwrap();
        assert!(first.is_completed());
        first.assert_success().unwrap();

        let second = Transaction::new()
            .remove([label("urn:a", "old")], Activity::Removed)
            .insert([label("urn:a", "new")], Activity::Updated);
        let second = repo.commit_one(second, &ctx).await.unwrap();
        assert!(second.is_completed());

        assert_eq!(store.snapshot(RepositoryType::Entities).await, vec![label("urn:a", "new")]);
    }

    #[tokio::test]
    async fn test_empty_transaction_completes() {
        let (store, repo) = repository();
        let committed = repo
            .commit(vec![Transaction::new(), Transaction::new()], &SessionContext::system(), false)
            .await
            .unwrap();
        assert_eq!(committed.len(), 2);
        assert!(committed.iter().all(Transaction::is_completed));
        assert_eq!(store.len(RepositoryType::Entities).await, 0);
    }

    #[tokio::test]
    async fn test_events_published_for_completed_transactions() {
        let (_store, repo) = repository();
        let bus = EventBus::new(16);
        let repo = repo.with_events(bus.clone());
        let mut sub = bus.subscribe("test");

        let trx = Transaction::new().insert([label("urn:a", "x")], Activity::Inserted);
        let id = trx.identifier().to_string();
        repo.commit_one(trx, &SessionContext::system()).await.unwrap();

        match sub.recv().await.unwrap() {
            GraphEvent::TransactionsCommitted { transactions, affected, .. } => {
                assert_eq!(transactions, vec![id]);
                assert_eq!(affected, vec!["urn:a".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_statement_queries() {
        let (_store, repo) = repository();
        let ctx = SessionContext::system();
        let video = Resource::iri("urn:pwid:meg:e:v");
        let trx = Transaction::new().insert(
            [
                Statement::new(video.clone(), rdf::TYPE, sdo::VIDEO_OBJECT),
                Statement::new(video.clone(), rdf::TYPE, entities::INDIVIDUAL),
            ],
            Activity::Inserted,
        );
        repo.commit_one(trx, &ctx).await.unwrap();

        assert!(repo.exists(&video, &ctx).await.unwrap());
        assert_eq!(repo.types_of(&video, &ctx).await.unwrap().len(), 2);
        assert_eq!(repo.subjects_of_type(&sdo::VIDEO_OBJECT, &ctx).await.unwrap(), vec![video.clone()]);
        assert_eq!(repo.count_fragments(&ctx).await.unwrap(), 1);
        assert!(repo
            .has_statement(&Statement::new(video.clone(), rdf::TYPE, sdo::VIDEO_OBJECT), &ctx)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_purge_requires_system_authority() {
        let (store, repo) = repository();
        let ctx = SessionContext::system();
        repo.commit_one(Transaction::new().insert([label("urn:a", "x")], Activity::Inserted), &ctx)
            .await
            .unwrap();

        let maintainer = SessionContext::new(Authority::Maintainer)
            .with_repository(RepositoryType::Entities)
            .authorize(Authority::Maintainer)
            .unwrap();
        assert!(matches!(
            repo.purge(&maintainer).await,
            Err(Error::InsufficientPrivilege(_))
        ));

        repo.purge(&ctx).await.unwrap();
        assert_eq!(store.len(RepositoryType::Entities).await, 0);
    }
}
