//! # Graph Common Library
//!
//! Shared code for the graph store and its maintenance jobs including:
//! - RDF value model (IRIs, blank nodes, literals, statements)
//! - Local vocabulary and well-known namespaces
//! - Event types (GraphEvent enum) and the EventBus
//! - Session, environment and authority descriptors
//! - Configuration loading
//! - Reproducible local identifiers

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod identifiers;
pub mod model;
pub mod vocab;

pub use auth::{Authority, Environment, RepositoryType, SessionContext};
pub use error::{Error, Result};
pub use model::{BlankNode, Iri, Literal, Model, Resource, Statement, Value};
