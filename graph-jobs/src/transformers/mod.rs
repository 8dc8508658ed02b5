//! Pluggable transformers used by the maintenance jobs
//!
//! Identifier mappers decide which subjects get a canonical local IRI; type
//! transformers decide which internal marker a fragment receives. Both are
//! CPU-only and run inline on data the job already loaded.

pub mod identifiers;
pub mod types;

use graph_common::{Environment, Iri, Model, Resource, Statement};
use graph_store::Fragment;

pub use identifiers::{AnonymousIdentifiers, ExternalIdentifiers};
pub use types::LocalTypes;

/// One subject rename: `old` becomes `new`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMapping {
    pub old: Resource,
    pub new: Iri,
}

pub trait IdentifierMapper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mappings for the subjects of `model` this mapper is responsible for
    fn build_mappings(&self, model: &Model, environment: &Environment) -> Vec<IdentifierMapping>;
}

pub trait TypeTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Statements assigning internal markers to the fragment's subject
    fn get_statements(&self, fragment: &Fragment) -> Vec<Statement>;
}
