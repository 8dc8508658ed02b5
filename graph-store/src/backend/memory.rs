//! In-memory backend
//!
//! Each repository type is an ordered statement set behind a shared lock.
//! Writes are buffered on the connection and applied under a single write lock
//! at commit, so readers never observe a half-applied transaction.

use super::{ConnectionProvider, StoreConnection};
use async_trait::async_trait;
use graph_common::{Error, Iri, RepositoryType, Resource, Result, Statement, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

type Repositories = HashMap<RepositoryType, BTreeSet<Statement>>;

/// Ephemeral store, cheap to clone; clones share the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    repositories: Arc<RwLock<Repositories>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements currently committed to a repository
    pub async fn len(&self, repository: RepositoryType) -> usize {
        self.repositories
            .read()
            .await
            .get(&repository)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Committed statements of a repository, in order
    pub async fn snapshot(&self, repository: RepositoryType) -> Vec<Statement> {
        self.repositories
            .read()
            .await
            .get(&repository)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Pending {
    additions: Vec<Statement>,
    removals: Vec<Statement>,
}

/// Connection to one repository of a [`MemoryStore`]
pub struct MemoryConnection {
    repositories: Arc<RwLock<Repositories>>,
    repository: RepositoryType,
    pending: Option<Pending>,
}

impl MemoryConnection {
    fn pending_mut(&mut self) -> Result<&mut Pending> {
        self.pending
            .as_mut()
            .ok_or_else(|| Error::Internal("No active transaction on connection".to_string()))
    }
}

#[async_trait]
impl ConnectionProvider for MemoryStore {
    type Connection = MemoryConnection;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, repository: RepositoryType) -> Result<MemoryConnection> {
        Ok(MemoryConnection {
            repositories: Arc::clone(&self.repositories),
            repository,
            pending: None,
        })
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn statements(
        &mut self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> Result<Vec<Statement>> {
        let guard = self.repositories.read().await;
        let mut found: BTreeSet<Statement> = guard
            .get(&self.repository)
            .map(|set| {
                set.iter()
                    .filter(|st| st.matches(subject, predicate, object))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(guard);

        if let Some(pending) = &self.pending {
            for st in &pending.removals {
                found.remove(st);
            }
            found.extend(
                pending
                    .additions
                    .iter()
                    .filter(|st| st.matches(subject, predicate, object))
                    .cloned(),
            );
        }

        Ok(found.into_iter().collect())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::Internal("Transaction already active on connection".to_string()));
        }
        self.pending = Some(Pending::default());
        Ok(())
    }

    async fn add(&mut self, statements: &[Statement]) -> Result<()> {
        let pending = self.pending_mut()?;
        pending.removals.retain(|st| !statements.contains(st));
        pending.additions.extend_from_slice(statements);
        Ok(())
    }

    async fn remove(&mut self, statements: &[Statement]) -> Result<()> {
        let pending = self.pending_mut()?;
        pending.additions.retain(|st| !statements.contains(st));
        pending.removals.extend_from_slice(statements);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal("No active transaction on connection".to_string()))?;

        let mut guard = self.repositories.write().await;
        let set = guard.entry(self.repository).or_default();
        for st in &pending.removals {
            set.remove(st);
        }
        set.extend(pending.additions.iter().cloned());

        trace!(
            repository = %self.repository,
            added = pending.additions.len(),
            removed = pending.removals.len(),
            "Memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.repositories.write().await.remove(&self.repository);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_common::vocab::rdfs;

    fn label(subject: &str, value: &str) -> Statement {
        Statement::new(Resource::iri(subject), rdfs::LABEL, Value::literal(value))
    }

    #[tokio::test]
    async fn test_writes_require_transaction() {
        let store = MemoryStore::new();
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();
        assert!(conn.add(&[label("urn:a", "x")]).await.is_err());
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_private() {
        let store = MemoryStore::new();
        let mut writer = store.connect(RepositoryType::Entities).await.unwrap();
        let mut reader = store.connect(RepositoryType::Entities).await.unwrap();

        writer.begin().await.unwrap();
        writer.add(&[label("urn:a", "x")]).await.unwrap();

        assert_eq!(writer.statements(None, None, None).await.unwrap().len(), 1);
        assert!(reader.statements(None, None, None).await.unwrap().is_empty());

        writer.commit().await.unwrap();
        assert_eq!(reader.statements(None, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_and_repositories_are_separate() {
        let store = MemoryStore::new();
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();
        conn.begin().await.unwrap();
        conn.add(&[label("urn:a", "x")]).await.unwrap();
        conn.rollback().await.unwrap();
        assert_eq!(store.len(RepositoryType::Entities).await, 0);

        let mut schema = store.connect(RepositoryType::Schema).await.unwrap();
        schema.begin().await.unwrap();
        schema.add(&[label("urn:a", "x")]).await.unwrap();
        schema.commit().await.unwrap();
        assert_eq!(store.len(RepositoryType::Schema).await, 1);
        assert_eq!(store.len(RepositoryType::Entities).await, 0);
    }
}
