//! Store backends
//!
//! A backend is a [`ConnectionProvider`] that hands out one [`StoreConnection`]
//! per logical operation. Connections are never shared between concurrent
//! operations; each commit call checks out its own.

use async_trait::async_trait;
use graph_common::{Iri, RepositoryType, Resource, Result, Statement, Value};

pub mod memory;
pub(crate) mod monitor;
pub(crate) mod retry;
pub mod sqlite;

/// One checked-out connection to a repository
///
/// Writes are only accepted between `begin` and `commit`/`rollback`. Reads see
/// committed state plus, inside a native transaction, the connection's own writes.
#[async_trait]
pub trait StoreConnection: Send {
    /// Statement pattern lookup; `None` matches anything
    async fn statements(
        &mut self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> Result<Vec<Statement>>;

    async fn begin(&mut self) -> Result<()>;

    async fn add(&mut self, statements: &[Statement]) -> Result<()>;

    async fn remove(&mut self, statements: &[Statement]) -> Result<()>;

    /// Prepare and commit the native transaction as one unit
    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Delete every statement of the repository
    async fn clear(&mut self) -> Result<()>;
}

/// Source of connections, one per repository type
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    type Connection: StoreConnection + 'static;

    /// Backend name for logs and metrics
    fn name(&self) -> &'static str;

    async fn connect(&self, repository: RepositoryType) -> Result<Self::Connection>;
}
