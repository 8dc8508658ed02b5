//! # Graph Store
//!
//! Transactional statement store for the knowledge graph:
//! - Transaction model with inserted/updated/removed graphs and provenance
//! - Capability traits (`StatementsAware`, `Queryable`, `Commitable`, `Fragmentable`)
//! - Authorization-gated access layer with metrics and scheduled-caller timeouts
//! - In-memory and SQLite backends
//! - Append-only transaction log

pub mod access;
pub mod backend;
pub mod fragment;
pub mod metrics;
pub mod query;
pub mod repository;
pub mod transaction;
pub mod transaction_log;

pub use access::AccessLayer;
pub use backend::memory::MemoryStore;
pub use backend::sqlite::SqliteStore;
pub use backend::{ConnectionProvider, StoreConnection};
pub use fragment::Fragment;
pub use metrics::StoreMetrics;
pub use query::{Bindings, SelectQuery};
pub use repository::{Commitable, Fragmentable, GraphRepository, GraphStore, Queryable, StatementsAware};
pub use transaction::{Activity, Transaction, TransactionStatus};
pub use transaction_log::{RepositoryTransactionLog, TransactionLog};
