//! SQLite backend
//!
//! All repositories share one `statements` table partitioned by a `repository`
//! column. Terms are stored in their text encoding (see [`graph_common::model`]),
//! predicates and contexts as plain IRI text.

use super::monitor::{begin_monitored, MonitoredTransaction};
use super::retry::retry_on_lock;
use super::{ConnectionProvider, StoreConnection};
use async_trait::async_trait;
use graph_common::config::StoreConfig;
use graph_common::{Error, Iri, RepositoryType, Resource, Result, Statement, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

type StatementRow = (String, String, String, String);

/// SQLite-backed statement store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open(db_path: &Path, config: &StoreConfig) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        // WAL allows concurrent readers with one writer
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query(&format!("PRAGMA busy_timeout = {}", config.busy_timeout_ms))
            .execute(&pool)
            .await?;

        Self::from_pool(pool, config.max_lock_wait_ms).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool, max_lock_wait_ms: u64) -> Result<Self> {
        create_statements_table(&pool).await?;
        Ok(Self { pool, max_lock_wait_ms })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_statements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statements (
            repository TEXT NOT NULL,
            subject TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (repository, subject, predicate, object, context)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_statements_predicate ON statements(repository, predicate)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_statements_object ON statements(repository, object)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Connection to one repository of a [`SqliteStore`]
pub struct SqliteConnection {
    pool: SqlitePool,
    repository: RepositoryType,
    max_lock_wait_ms: u64,
    tx: Option<MonitoredTransaction>,
}

impl SqliteConnection {
    fn active(&mut self) -> Result<&mut MonitoredTransaction> {
        self.tx
            .as_mut()
            .ok_or_else(|| Error::Internal("No active transaction on connection".to_string()))
    }
}

#[async_trait]
impl ConnectionProvider for SqliteStore {
    type Connection = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self, repository: RepositoryType) -> Result<SqliteConnection> {
        Ok(SqliteConnection {
            pool: self.pool.clone(),
            repository,
            max_lock_wait_ms: self.max_lock_wait_ms,
            tx: None,
        })
    }
}

fn context_text(statement: &Statement) -> String {
    statement
        .context
        .as_ref()
        .map(|c| c.as_str().to_string())
        .unwrap_or_default()
}

fn decode_row((subject, predicate, object, context): StatementRow) -> Result<Statement> {
    let subject = Value::decode(&subject)?
        .as_resource()
        .ok_or_else(|| Error::Internal(format!("Literal stored in subject position: {}", subject)))?;
    let object = Value::decode(&object)?;
    let mut statement = Statement::new(subject, Iri::new(predicate), object);
    if !context.is_empty() {
        statement.context = Some(Iri::new(context));
    }
    Ok(statement)
}

#[async_trait]
impl StoreConnection for SqliteConnection {
    async fn statements(
        &mut self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> Result<Vec<Statement>> {
        let mut sql = String::from(
            "SELECT subject, predicate, object, context FROM statements WHERE repository = ?",
        );
        if subject.is_some() {
            sql.push_str(" AND subject = ?");
        }
        if predicate.is_some() {
            sql.push_str(" AND predicate = ?");
        }
        if object.is_some() {
            sql.push_str(" AND object = ?");
        }
        sql.push_str(" ORDER BY subject, predicate, object, context");

        let mut query = sqlx::query_as::<_, StatementRow>(&sql).bind(self.repository.as_str());
        if let Some(subject) = subject {
            query = query.bind(subject.to_string());
        }
        if let Some(predicate) = predicate {
            query = query.bind(predicate.as_str().to_string());
        }
        if let Some(object) = object {
            query = query.bind(object.encode());
        }

        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx.inner_mut()?).await?,
            None => query.fetch_all(&self.pool).await?,
        };

        rows.into_iter().map(decode_row).collect()
    }

    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::Internal("Transaction already active on connection".to_string()));
        }
        let caller = self.repository.as_str();
        let pool = &self.pool;
        let tx = retry_on_lock("sqlite begin", self.max_lock_wait_ms, || {
            begin_monitored(pool, caller)
        })
        .await?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn add(&mut self, statements: &[Statement]) -> Result<()> {
        let repository = self.repository.as_str();
        let tx = self.active()?.inner_mut()?;
        for statement in statements {
            sqlx::query(
                "INSERT OR IGNORE INTO statements (repository, subject, predicate, object, context) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(repository)
            .bind(statement.subject.to_string())
            .bind(statement.predicate.as_str().to_string())
            .bind(statement.object.encode())
            .bind(context_text(statement))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn remove(&mut self, statements: &[Statement]) -> Result<()> {
        let repository = self.repository.as_str();
        let tx = self.active()?.inner_mut()?;
        for statement in statements {
            sqlx::query(
                "DELETE FROM statements WHERE repository = ? AND subject = ? AND predicate = ? \
                 AND object = ? AND context = ?",
            )
            .bind(repository)
            .bind(statement.subject.to_string())
            .bind(statement.predicate.as_str().to_string())
            .bind(statement.object.encode())
            .bind(context_text(statement))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("No active transaction on connection".to_string()))?;
        tx.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    async fn clear(&mut self) -> Result<()> {
        let repository = self.repository.as_str();
        match self.tx.as_mut() {
            Some(tx) => {
                sqlx::query("DELETE FROM statements WHERE repository = ?")
                    .bind(repository)
                    .execute(&mut **tx.inner_mut()?)
                    .await?;
            }
            None => {
                let pool = &self.pool;
                retry_on_lock("sqlite clear", self.max_lock_wait_ms, || async move {
                    sqlx::query("DELETE FROM statements WHERE repository = ?")
                        .bind(repository)
                        .execute(pool)
                        .await
                        .map_err(Error::from)
                })
                .await?;
            }
        }
        Ok(())
    }
}
