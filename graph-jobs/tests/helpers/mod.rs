//! Shared fixtures for graph-jobs integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use graph_common::config::GraphConfig;
use graph_common::events::EventBus;
use graph_common::{Error, Iri, RepositoryType, Resource, Result, SessionContext, Statement, Value};
use graph_jobs::build_services;
use graph_jobs::jobs::JobServices;
use graph_store::backend::memory::MemoryConnection;
use graph_store::{Activity, ConnectionProvider, MemoryStore, StoreConnection, StoreMetrics, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Job services over one store, wired the way the binary wires them
pub struct Harness {
    pub services: JobServices,
    pub events: EventBus,
    pub metrics: Arc<StoreMetrics>,
    pub config: GraphConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_provider(MemoryStore::new(), config)
    }

    pub fn with_provider<P: ConnectionProvider>(provider: P, config: GraphConfig) -> Self {
        let events = EventBus::new(256);
        let metrics = Arc::new(StoreMetrics::new());
        let services = build_services(provider, &config, events.clone(), Arc::clone(&metrics));
        Self {
            services,
            events,
            metrics,
            config,
        }
    }

    pub fn ctx(&self) -> SessionContext {
        SessionContext::system()
    }

    /// Import statements into the entities repository
    pub async fn load(&self, statements: Vec<Statement>) {
        let transaction = Transaction::new().insert(statements, Activity::Inserted);
        let committed = self.services.store.commit_one(transaction, &self.ctx()).await.unwrap();
        committed.assert_success().unwrap();
    }

    async fn all(&self, repository: RepositoryType) -> Vec<Statement> {
        let ctx = self.ctx().with_repository(repository);
        let mut statements = self
            .services
            .store
            .list_statements(None, None, None, &ctx)
            .await
            .unwrap();
        statements.sort();
        statements
    }

    /// Entity statements, sorted
    pub async fn entities(&self) -> Vec<Statement> {
        self.all(RepositoryType::Entities).await
    }

    /// Number of statements in the transaction log
    pub async fn logged(&self) -> usize {
        self.all(RepositoryType::Transactions).await.len()
    }

    pub async fn subjects(&self) -> Vec<Resource> {
        let mut subjects: Vec<Resource> = self.entities().await.into_iter().map(|st| st.subject).collect();
        subjects.dedup();
        subjects
    }

    /// True if any statement references the resource as subject or object
    pub async fn mentions(&self, resource: &Resource) -> bool {
        let value = Value::from(resource.clone());
        self.entities()
            .await
            .iter()
            .any(|st| &st.subject == resource || st.object == value)
    }
}

/// Memory store that rejects the n-th native commit on the entities
/// repository (1-based); the transaction log is never affected
#[derive(Clone)]
pub struct FailingCommits {
    inner: MemoryStore,
    fail_nth: usize,
    commits: Arc<AtomicUsize>,
}

impl FailingCommits {
    pub fn new(fail_nth: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_nth,
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub struct FailingConnection {
    inner: MemoryConnection,
    repository: RepositoryType,
    store: FailingCommits,
}

#[async_trait]
impl ConnectionProvider for FailingCommits {
    type Connection = FailingConnection;

    fn name(&self) -> &'static str {
        "failing"
    }

    async fn connect(&self, repository: RepositoryType) -> Result<FailingConnection> {
        Ok(FailingConnection {
            inner: self.inner.connect(repository).await?,
            repository,
            store: self.clone(),
        })
    }
}

#[async_trait]
impl StoreConnection for FailingConnection {
    async fn statements(
        &mut self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> Result<Vec<Statement>> {
        self.inner.statements(subject, predicate, object).await
    }

    async fn begin(&mut self) -> Result<()> {
        self.inner.begin().await
    }

    async fn add(&mut self, statements: &[Statement]) -> Result<()> {
        self.inner.add(statements).await
    }

    async fn remove(&mut self, statements: &[Statement]) -> Result<()> {
        self.inner.remove(statements).await
    }

    async fn commit(&mut self) -> Result<()> {
        if self.repository == RepositoryType::Entities {
            let current = self.store.commits.fetch_add(1, Ordering::SeqCst) + 1;
            if current == self.store.fail_nth {
                return Err(Error::Internal("commit rejected".to_string()));
            }
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }

    async fn clear(&mut self) -> Result<()> {
        self.inner.clear().await
    }
}
