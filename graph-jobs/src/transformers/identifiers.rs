//! Identifier mappers for external and anonymous subjects

use super::{IdentifierMapper, IdentifierMapping};
use graph_common::identifiers;
use graph_common::vocab::{local, naming_properties, rdf};
use graph_common::{Environment, Model, Resource};
use tracing::trace;

/// Maps IRI subjects outside the local namespace to `checksum(iri)`
#[derive(Debug, Default, Clone)]
pub struct ExternalIdentifiers;

impl IdentifierMapper for ExternalIdentifiers {
    fn name(&self) -> &'static str {
        "external_identifiers"
    }

    fn build_mappings(&self, model: &Model, _environment: &Environment) -> Vec<IdentifierMapping> {
        model
            .subjects()
            .into_iter()
            .filter_map(|subject| {
                let iri = subject.as_iri()?;
                if identifiers::is_local(iri) {
                    return None;
                }
                let new = identifiers::reproducible(local::entities::NAMESPACE, &[iri.as_str()]);
                trace!(old = %iri, %new, "Mapping external identifier");
                Some(IdentifierMapping { old: subject.clone(), new })
            })
            .collect()
    }
}

/// Maps blank-node subjects to local IRIs
///
/// A node with a type and a naming value gets a reproducible identifier over
/// (type, value, node id); any other node gets a random one.
#[derive(Debug, Default, Clone)]
pub struct AnonymousIdentifiers;

impl AnonymousIdentifiers {
    fn naming_value(model: &Model, subject: &Resource) -> Option<String> {
        naming_properties()
            .iter()
            .find_map(|property| model.object_of(subject, property))
            .map(|value| value.string_value().to_string())
    }

    fn first_type(model: &Model, subject: &Resource) -> Option<String> {
        model
            .object_of(subject, &rdf::TYPE)
            .map(|value| value.string_value().to_string())
    }
}

impl IdentifierMapper for AnonymousIdentifiers {
    fn name(&self) -> &'static str {
        "anonymous_identifiers"
    }

    fn build_mappings(&self, model: &Model, _environment: &Environment) -> Vec<IdentifierMapping> {
        model
            .subjects()
            .into_iter()
            .filter(Resource::is_blank)
            .map(|subject| {
                let new = match (Self::first_type(model, &subject), Self::naming_value(model, &subject)) {
                    (Some(type_iri), Some(value)) => identifiers::reproducible(
                        local::entities::NAMESPACE,
                        &[type_iri.as_str(), value.as_str(), subject.string_value()],
                    ),
                    _ => identifiers::random(local::entities::NAMESPACE),
                };
                trace!(old = %subject, %new, "Mapping anonymous identifier");
                IdentifierMapping { old: subject, new }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_common::vocab::{rdfs, sdo};
    use graph_common::{Statement, Value};

    fn model() -> Model {
        [
            Statement::new(Resource::blank("b1"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::blank("b1"), rdfs::LABEL, Value::literal("x")),
            Statement::new(Resource::blank("b2"), sdo::NAME, Value::literal("untyped")),
            Statement::new(Resource::iri("http://example.org/video/1"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::iri("urn:pwid:meg:e:done"), rdf::TYPE, sdo::VIDEO_OBJECT),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_external_mapper_skips_local_and_blank_subjects() {
        let mappings = ExternalIdentifiers.build_mappings(&model(), &Environment::new());
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].old, Resource::iri("http://example.org/video/1"));
        assert!(mappings[0].new.starts_with(local::entities::NAMESPACE));

        let again = ExternalIdentifiers.build_mappings(&model(), &Environment::new());
        assert_eq!(again, mappings);
    }

    #[test]
    fn test_anonymous_mapper_is_reproducible_when_named() {
        let first = AnonymousIdentifiers.build_mappings(&model(), &Environment::new());
        let second = AnonymousIdentifiers.build_mappings(&model(), &Environment::new());
        assert_eq!(first.len(), 2);

        let named = |m: &Vec<IdentifierMapping>| {
            m.iter().find(|m| m.old == Resource::blank("b1")).map(|m| m.new.clone())
        };
        let unnamed = |m: &Vec<IdentifierMapping>| {
            m.iter().find(|m| m.old == Resource::blank("b2")).map(|m| m.new.clone())
        };
        assert_eq!(named(&first), named(&second));
        assert_ne!(unnamed(&first), unnamed(&second));
    }
}
