//! Vocabulary constants
//!
//! Local namespaces used for canonical identifiers and transaction provenance,
//! plus the handful of well-known terms the maintenance jobs rely on.

use crate::model::Iri;

/// Local namespaces
pub mod local {
    use super::Iri;

    /// Prefix shared by every locally minted identifier
    pub const URN_PREFIX: &str = "urn:pwid:meg:";

    /// Predicate recording the identifier a subject had before normalization
    pub const ORIGINAL_IDENTIFIER: Iri = Iri::from_static("urn:int:srcid");

    pub mod entities {
        use super::Iri;

        pub const NAMESPACE: &str = "urn:pwid:meg:e:";
        pub const INDIVIDUAL: Iri = Iri::from_static("urn:pwid:meg:e:Individual");
        pub const CLASSIFIER: Iri = Iri::from_static("urn:pwid:meg:e:Classifier");
        pub const EMBEDDED: Iri = Iri::from_static("urn:pwid:meg:e:Embedded");
    }

    pub mod classifiers {
        pub const NAMESPACE: &str = "urn:pwid:meg:c:";
    }

    pub mod transactions {
        use super::Iri;

        pub const NAMESPACE: &str = "urn:pwid:meg:t:";
        pub const GRAPH_CREATED: Iri = Iri::from_static("urn:pwid:meg:t:InsertedStatements");
        pub const GRAPH_UPDATED: Iri = Iri::from_static("urn:pwid:meg:t:UpdatedStatements");
        pub const GRAPH_DELETED: Iri = Iri::from_static("urn:pwid:meg:t:RemovedStatements");
        pub const GRAPH_AFFECTED: Iri = Iri::from_static("urn:pwid:meg:t:AffectedResource");
        pub const GRAPH_PROVENANCE: Iri = Iri::from_static("urn:pwid:meg:t:ProvenanceStatements");
    }
}

/// Transaction vocabulary
pub mod trx {
    use super::Iri;

    pub const NAMESPACE: &str = "https://w3id.org/av360/megt#";
    pub const TRANSACTION: Iri = Iri::from_static("https://w3id.org/av360/megt#Transaction");
    pub const STATUS: Iri = Iri::from_static("https://w3id.org/av360/megt#status");
    pub const REASON: Iri = Iri::from_static("https://w3id.org/av360/megt#reason");
    pub const TIME: Iri = Iri::from_static("https://w3id.org/av360/megt#time");
    pub const AFFECTS: Iri = Iri::from_static("https://w3id.org/av360/megt#affects");
    pub const INSERTED: Iri = Iri::from_static("https://w3id.org/av360/megt#inserted");
    pub const UPDATED: Iri = Iri::from_static("https://w3id.org/av360/megt#updated");
    pub const REMOVED: Iri = Iri::from_static("https://w3id.org/av360/megt#removed");

    pub const RUNNING: &str = "running";
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
}

pub mod rdf {
    use super::Iri;

    pub const NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const TYPE: Iri = Iri::from_static("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
}

pub mod rdfs {
    use super::Iri;

    pub const LABEL: Iri = Iri::from_static("http://www.w3.org/2000/01/rdf-schema#label");
}

pub mod owl {
    use super::Iri;

    pub const SAME_AS: Iri = Iri::from_static("http://www.w3.org/2002/07/owl#sameAs");
}

pub mod skos {
    use super::Iri;

    pub const PREF_LABEL: Iri = Iri::from_static("http://www.w3.org/2004/02/skos/core#prefLabel");
    pub const CONCEPT: Iri = Iri::from_static("http://www.w3.org/2004/02/skos/core#Concept");
}

pub mod dc {
    use super::Iri;

    pub const IDENTIFIER: Iri = Iri::from_static("http://purl.org/dc/elements/1.1/identifier");
}

pub mod dcterms {
    use super::Iri;

    pub const IDENTIFIER: Iri = Iri::from_static("http://purl.org/dc/terms/identifier");
    pub const TITLE: Iri = Iri::from_static("http://purl.org/dc/terms/title");
}

pub mod xsd {
    use super::Iri;

    pub const DATE_TIME: Iri = Iri::from_static("http://www.w3.org/2001/XMLSchema#dateTime");
}

/// schema.org under its `https` namespace
pub mod sdo {
    use super::Iri;

    pub const NAMESPACE: &str = "https://schema.org/";
    pub const IDENTIFIER: Iri = Iri::from_static("https://schema.org/identifier");
    pub const TERM_CODE: Iri = Iri::from_static("https://schema.org/termCode");
    pub const NAME: Iri = Iri::from_static("https://schema.org/name");
    pub const TITLE: Iri = Iri::from_static("https://schema.org/title");
    pub const URL: Iri = Iri::from_static("https://schema.org/url");

    pub const CREATIVE_WORK: Iri = Iri::from_static("https://schema.org/CreativeWork");
    pub const THING: Iri = Iri::from_static("https://schema.org/Thing");
    pub const ORGANIZATION: Iri = Iri::from_static("https://schema.org/Organization");
    pub const PERSON: Iri = Iri::from_static("https://schema.org/Person");
    pub const PLACE: Iri = Iri::from_static("https://schema.org/Place");
    pub const PRODUCT: Iri = Iri::from_static("https://schema.org/Product");
    pub const VIDEO_OBJECT: Iri = Iri::from_static("https://schema.org/VideoObject");
    pub const DEFINED_TERM: Iri = Iri::from_static("https://schema.org/DefinedTerm");
    pub const CATEGORY_CODE: Iri = Iri::from_static("https://schema.org/CategoryCode");
}

/// schema.org under its legacy `http` namespace
pub mod schema {
    use super::Iri;

    pub const NAMESPACE: &str = "http://schema.org/";
    pub const IDENTIFIER: Iri = Iri::from_static("http://schema.org/identifier");
    pub const TERM_CODE: Iri = Iri::from_static("http://schema.org/termCode");
    pub const NAME: Iri = Iri::from_static("http://schema.org/name");
    pub const URL: Iri = Iri::from_static("http://schema.org/url");
}

/// Properties whose shared value marks two same-typed fragments as duplicates,
/// in the order the merge job checks them
pub fn characteristic_properties() -> Vec<Iri> {
    vec![
        rdfs::LABEL,
        owl::SAME_AS,
        sdo::IDENTIFIER,
        sdo::TERM_CODE,
        sdo::NAME,
        sdo::URL,
        schema::IDENTIFIER,
        schema::TERM_CODE,
        schema::NAME,
        schema::URL,
        skos::PREF_LABEL,
        dcterms::IDENTIFIER,
        dc::IDENTIFIER,
    ]
}

/// Properties consulted, in order, when deriving a reproducible identifier
/// for an anonymous node
pub fn naming_properties() -> Vec<Iri> {
    vec![
        rdfs::LABEL,
        dc::IDENTIFIER,
        dcterms::IDENTIFIER,
        skos::PREF_LABEL,
        sdo::IDENTIFIER,
        sdo::TERM_CODE,
    ]
}

/// Types whose instances are independently addressable entities
pub fn is_individual_type(iri: &Iri) -> bool {
    [
        sdo::CREATIVE_WORK,
        sdo::THING,
        sdo::ORGANIZATION,
        sdo::PERSON,
        sdo::PLACE,
        sdo::PRODUCT,
        sdo::VIDEO_OBJECT,
    ]
    .contains(iri)
}

/// Types whose instances are shared vocabulary terms
pub fn is_classifier_type(iri: &Iri) -> bool {
    [sdo::DEFINED_TERM, sdo::CATEGORY_CODE, skos::CONCEPT].contains(iri)
}

pub fn is_characteristic_property(iri: &Iri) -> bool {
    [
        sdo::IDENTIFIER,
        sdo::TITLE,
        sdo::NAME,
        sdo::TERM_CODE,
        sdo::URL,
        schema::IDENTIFIER,
        schema::NAME,
        rdfs::LABEL,
        dc::IDENTIFIER,
        dcterms::IDENTIFIER,
        dcterms::TITLE,
        skos::PREF_LABEL,
    ]
    .contains(iri)
}

/// The three internal classification markers
pub fn internal_types() -> [Iri; 3] {
    [local::entities::INDIVIDUAL, local::entities::CLASSIFIER, local::entities::EMBEDDED]
}
