//! Fragments: all statements about one subject
//!
//! A fragment carries its subject's statements plus, transitively, the
//! statements of embedded sub-fragments (objects typed `Embedded`). Loading
//! with neighbours adds one level of the root's linked resources, restricted to
//! their type statements and short literal values.

use crate::backend::StoreConnection;
use graph_common::vocab::{local::entities, rdf};
use graph_common::{Error, Iri, Model, Resource, Result, Statement, Value};
use std::collections::BTreeSet;

/// Literal neighbour values at or above this length are left out
pub const MAX_NEIGHBOUR_LITERAL: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    resource: Resource,
    model: Model,
}

impl Fragment {
    pub fn new(resource: Resource, model: Model) -> Self {
        Self { resource, model }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    /// Statements with the fragment's own subject
    pub fn own_statements(&self) -> impl Iterator<Item = &Statement> {
        self.model.iter().filter(move |st| st.subject == self.resource)
    }

    pub fn types(&self) -> Vec<Iri> {
        self.own_statements()
            .filter(|st| st.predicate == rdf::TYPE)
            .filter_map(|st| st.object.as_iri().cloned())
            .collect()
    }

    pub fn has_type(&self, type_iri: &Iri) -> bool {
        self.types().iter().any(|t| t == type_iri)
    }

    pub fn is_individual(&self) -> bool {
        self.has_type(&entities::INDIVIDUAL)
    }

    pub fn is_classifier(&self) -> bool {
        self.has_type(&entities::CLASSIFIER)
    }

    pub fn is_embedded(&self) -> bool {
        self.has_type(&entities::EMBEDDED)
    }
}

async fn is_embedded<C>(conn: &mut C, resource: &Resource) -> Result<bool>
where
    C: StoreConnection + ?Sized,
{
    let marker = Value::Iri(entities::EMBEDDED);
    Ok(!conn
        .statements(Some(resource), Some(&rdf::TYPE), Some(&marker))
        .await?
        .is_empty())
}

fn is_neighbour_statement(statement: &Statement) -> bool {
    if statement.predicate == rdf::TYPE {
        return true;
    }
    statement
        .object
        .as_literal()
        .is_some_and(|literal| literal.label().chars().count() < MAX_NEIGHBOUR_LITERAL)
}

/// Load the fragment of `resource`; `NotFound` if it has no statements
pub(crate) async fn load<C>(conn: &mut C, resource: &Resource, include_neighbours: bool) -> Result<Fragment>
where
    C: StoreConnection + ?Sized,
{
    let mut model = Model::new();
    let mut visited = BTreeSet::new();
    let mut neighbours = BTreeSet::new();
    let mut queue = vec![resource.clone()];

    while let Some(subject) = queue.pop() {
        if !visited.insert(subject.clone()) {
            continue;
        }
        for statement in conn.statements(Some(&subject), None, None).await? {
            if let Some(object) = statement.object.as_resource() {
                if !visited.contains(&object) {
                    if is_embedded(conn, &object).await? {
                        queue.push(object);
                    } else if subject == *resource {
                        neighbours.insert(object);
                    }
                }
            }
            model.insert(statement);
        }
    }

    if model.is_empty() {
        return Err(Error::NotFound(format!("No statements for {}", resource)));
    }

    if include_neighbours {
        for neighbour in neighbours.difference(&visited) {
            let statements = conn.statements(Some(neighbour), None, None).await?;
            model.extend(statements.into_iter().filter(is_neighbour_statement));
        }
    }

    Ok(Fragment::new(resource.clone(), model))
}
