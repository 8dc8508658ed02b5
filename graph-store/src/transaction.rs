//! Transaction model
//!
//! A transaction stages statements for insertion and removal and is committed
//! exactly once through [`crate::repository::Commitable::commit`]. It is an owned,
//! move-only accumulator: every staging call consumes the transaction and hands
//! it back, so a transaction is never aliased across concurrent tasks.
//!
//! A statement is never both inserted and removed by the same transaction. When
//! staging would produce that, the removal wins and the insert is dropped.
//!
//! Status moves from `Pending` to `Completed` or `Failed` once and never again.

use chrono::{DateTime, SecondsFormat, Utc};
use graph_common::identifiers;
use graph_common::vocab::{local::transactions as graphs, rdf, trx, xsd};
use graph_common::{Error, Iri, Literal, Model, Resource, Result, Statement, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{trace, warn};

/// Why a statement is part of the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activity {
    /// New statements, staged into the created graph
    Inserted,
    /// Replacement statements, staged into the updated graph
    Updated,
    /// Statements to delete
    Removed,
}

impl Activity {
    fn predicate(&self) -> Iri {
        match self {
            Activity::Inserted => trx::INSERTED,
            Activity::Updated => trx::UPDATED,
            Activity::Removed => trx::REMOVED,
        }
    }
}

/// Commit outcome of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", tag = "status", content = "reason")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed(String),
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Staged change set, the unit of atomicity
#[derive(Debug)]
pub struct Transaction {
    identifier: Iri,
    created: Model,
    updated: Model,
    deleted: Model,
    affected: BTreeSet<Resource>,
    provenance: Model,
    status: TransactionStatus,
    started_at: DateTime<Utc>,
}

impl Transaction {
    /// New pending transaction with a freshly minted identifier
    pub fn new() -> Self {
        let identifier = identifiers::random(graphs::NAMESPACE);
        let started_at = Utc::now();
        let subject = Resource::Iri(identifier.clone());

        let mut provenance = Model::new();
        provenance.insert(Statement::new(subject.clone(), rdf::TYPE, trx::TRANSACTION));
        provenance.insert(Statement::new(subject.clone(), trx::STATUS, Value::literal(trx::RUNNING)));
        provenance.insert(Statement::new(
            subject,
            trx::TIME,
            Literal::typed(started_at.to_rfc3339_opts(SecondsFormat::Millis, true), xsd::DATE_TIME),
        ));

        Self {
            identifier,
            created: Model::new(),
            updated: Model::new(),
            deleted: Model::new(),
            affected: BTreeSet::new(),
            provenance,
            status: TransactionStatus::Pending,
            started_at,
        }
    }

    /// Stage statements for insertion
    ///
    /// `Activity::Updated` stages into the updated graph, anything else into the
    /// created graph. Statements already staged for removal are skipped.
    pub fn insert(mut self, statements: impl IntoIterator<Item = Statement>, activity: Activity) -> Self {
        for statement in statements {
            if self.deleted.contains(&statement) {
                trace!(transaction = %self.identifier, %statement, "Skipping insert of statement staged for removal");
                continue;
            }
            self.record_activity(&statement.subject, activity);
            match activity {
                Activity::Updated => self.updated.insert(statement),
                _ => self.created.insert(statement),
            };
        }
        self
    }

    /// Stage statements for removal; removal wins over any staged insert
    pub fn remove(mut self, statements: impl IntoIterator<Item = Statement>, activity: Activity) -> Self {
        for statement in statements {
            self.created.remove(&statement);
            self.updated.remove(&statement);
            self.record_activity(&statement.subject, activity);
            self.deleted.insert(statement);
        }
        self
    }

    /// Declare interest in a resource
    pub fn affected(mut self, resource: Resource) -> Self {
        self.affected.insert(resource);
        self
    }

    /// Declare interest in every subject of a model
    pub fn affected_by(mut self, model: &Model) -> Self {
        self.affected.extend(model.subjects());
        self
    }

    fn record_activity(&mut self, subject: &Resource, activity: Activity) {
        self.affected.insert(subject.clone());
        self.provenance.insert(Statement::new(
            Resource::Iri(self.identifier.clone()),
            activity.predicate(),
            subject.clone(),
        ));
    }

    pub fn identifier(&self) -> &Iri {
        &self.identifier
    }

    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TransactionStatus::Failed(_))
    }

    /// Statements to add at commit time: created ∪ updated
    pub fn inserted_statements(&self) -> Vec<Statement> {
        self.created.iter().chain(self.updated.iter()).cloned().collect()
    }

    pub fn removed_statements(&self) -> Vec<Statement> {
        self.deleted.iter().cloned().collect()
    }

    pub fn created(&self) -> &Model {
        &self.created
    }

    pub fn updated(&self) -> &Model {
        &self.updated
    }

    pub fn deleted(&self) -> &Model {
        &self.deleted
    }

    pub fn affected_resources(&self) -> &BTreeSet<Resource> {
        &self.affected
    }

    pub fn provenance(&self) -> &Model {
        &self.provenance
    }

    /// True if nothing is staged for insertion or removal
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// True if the provenance graph carries the success status
    pub fn has_success_marker(&self) -> bool {
        self.provenance.contains(&Statement::new(
            Resource::Iri(self.identifier.clone()),
            trx::STATUS,
            Value::literal(trx::SUCCESS),
        ))
    }

    /// Fails with an invariant error unless the commit was recorded as successful
    pub fn assert_success(&self) -> Result<()> {
        if self.has_success_marker() {
            Ok(())
        } else {
            Err(Error::Invariant(format!(
                "Transaction {} lacks success status after commit ({:?})",
                self.identifier, self.status
            )))
        }
    }

    pub(crate) fn set_completed(&mut self) {
        if self.status.is_terminal() {
            warn!(transaction = %self.identifier, status = ?self.status, "Ignoring completion of finished transaction");
            return;
        }
        self.swap_status(trx::SUCCESS);
        self.status = TransactionStatus::Completed;
    }

    pub(crate) fn set_failed(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            warn!(transaction = %self.identifier, status = ?self.status, "Ignoring failure of finished transaction");
            return;
        }
        let reason = reason.into();
        self.swap_status(trx::FAILURE);
        self.provenance.insert(Statement::new(
            Resource::Iri(self.identifier.clone()),
            trx::REASON,
            Value::literal(reason.clone()),
        ));
        self.status = TransactionStatus::Failed(reason);
    }

    fn swap_status(&mut self, status: &str) {
        let subject = Resource::Iri(self.identifier.clone());
        self.provenance.remove(&Statement::new(subject.clone(), trx::STATUS, Value::literal(trx::RUNNING)));
        self.provenance.insert(Statement::new(subject, trx::STATUS, Value::literal(status)));
    }

    /// Every statement of the transaction placed in its graph, as persisted by the
    /// transaction log
    pub fn to_model(&self) -> Model {
        let subject = Resource::Iri(self.identifier.clone());
        let mut model = Model::new();

        model.extend(self.created.iter().map(|st| st.in_context(graphs::GRAPH_CREATED)));
        model.extend(self.updated.iter().map(|st| st.in_context(graphs::GRAPH_UPDATED)));
        model.extend(self.deleted.iter().map(|st| st.in_context(graphs::GRAPH_DELETED)));
        model.extend(self.affected.iter().map(|resource| {
            Statement::new(subject.clone(), trx::AFFECTS, resource.clone()).in_context(graphs::GRAPH_AFFECTED)
        }));
        model.extend(self.provenance.iter().map(|st| st.in_context(graphs::GRAPH_PROVENANCE)));
        model
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
