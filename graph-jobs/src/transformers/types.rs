//! Default internal type assignment

use super::TypeTransformer;
use graph_common::vocab::{is_characteristic_property, is_classifier_type, is_individual_type, local::entities, rdf};
use graph_common::{Iri, Statement};
use graph_store::Fragment;
use tracing::{trace, warn};

const NAMING_FRAGMENTS: [&str; 6] = ["name", "title", "label", "id", "key", "code"];

/// Marks fragments as individual, classifier or embedded
///
/// - Individual: a known individual type, or (without a classifier type) a
///   characteristic property or a predicate whose local name looks like a name
///   or an identifier
/// - Classifier: a classifier type
/// - Embedded: any other typed fragment
#[derive(Debug, Default, Clone)]
pub struct LocalTypes;

impl LocalTypes {
    fn looks_like_naming(predicate: &Iri) -> bool {
        let local = predicate.local_name().to_lowercase();
        NAMING_FRAGMENTS.iter().any(|fragment| local.contains(fragment))
    }

    fn marker_for(fragment: &Fragment) -> Option<Iri> {
        let types = fragment.types();
        let classifier = types.iter().any(is_classifier_type);
        let predicates: Vec<&Iri> = fragment
            .own_statements()
            .map(|st| &st.predicate)
            .filter(|p| **p != rdf::TYPE)
            .collect();

        let individual = types.iter().any(is_individual_type)
            || (!classifier && predicates.iter().any(|p| is_characteristic_property(p)))
            || (!classifier && predicates.iter().any(|p| Self::looks_like_naming(p)));

        if individual {
            Some(entities::INDIVIDUAL)
        } else if classifier {
            Some(entities::CLASSIFIER)
        } else if !types.is_empty() {
            Some(entities::EMBEDDED)
        } else {
            None
        }
    }
}

impl TypeTransformer for LocalTypes {
    fn name(&self) -> &'static str {
        "local_types"
    }

    fn get_statements(&self, fragment: &Fragment) -> Vec<Statement> {
        match Self::marker_for(fragment) {
            Some(marker) => {
                trace!(subject = %fragment.resource(), %marker, "Assigning internal type");
                vec![Statement::new(fragment.resource().clone(), rdf::TYPE, marker)]
            }
            None => {
                warn!(
                    subject = %fragment.resource(),
                    statements = fragment.model().len(),
                    "Subject could not be identified for local type"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_common::vocab::{rdfs, sdo, skos};
    use graph_common::{Model, Resource, Value};

    fn fragment(statements: Vec<(Iri, Value)>) -> Fragment {
        let subject = Resource::iri("urn:pwid:meg:e:x");
        let model: Model = statements
            .into_iter()
            .map(|(p, o)| Statement::new(subject.clone(), p, o))
            .collect();
        Fragment::new(subject, model)
    }

    fn marker(fragment: &Fragment) -> Option<Value> {
        LocalTypes.get_statements(fragment).pop().map(|st| st.object)
    }

    #[test]
    fn test_individual_by_type_or_characteristic_property() {
        let video = fragment(vec![(rdf::TYPE, sdo::VIDEO_OBJECT.into())]);
        assert_eq!(marker(&video), Some(entities::INDIVIDUAL.into()));

        let labelled = fragment(vec![
            (rdf::TYPE, Value::iri("https://example.org/Thing")),
            (rdfs::LABEL, Value::literal("x")),
        ]);
        assert_eq!(marker(&labelled), Some(entities::INDIVIDUAL.into()));

        let coded = fragment(vec![
            (rdf::TYPE, Value::iri("https://example.org/Thing")),
            (Iri::new("https://example.org/productCode"), Value::literal("x")),
        ]);
        assert_eq!(marker(&coded), Some(entities::INDIVIDUAL.into()));
    }

    #[test]
    fn test_classifier_and_embedded() {
        let term = fragment(vec![
            (rdf::TYPE, skos::CONCEPT.into()),
            (skos::PREF_LABEL, Value::literal("Term 1")),
        ]);
        assert_eq!(marker(&term), Some(entities::CLASSIFIER.into()));

        let embedded = fragment(vec![
            (rdf::TYPE, Value::iri("https://example.org/Duration")),
            (Iri::new("https://example.org/value"), Value::literal("PT3M")),
        ]);
        assert_eq!(marker(&embedded), Some(entities::EMBEDDED.into()));

        let untyped = fragment(vec![(Iri::new("https://example.org/value"), Value::literal("1"))]);
        assert_eq!(marker(&untyped), None);
    }
}
