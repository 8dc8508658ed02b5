//! RDF value model
//!
//! Statements are immutable (subject, predicate, object, context) tuples. Terms
//! are comparable and hashable so they can be used in ordered sets and as map keys.
//!
//! Terms have a compact text encoding close to N-Triples, used by the SQLite
//! backend to store one term per column:
//! - IRI: `<urn:pwid:meg:e:abc>`
//! - Blank node: `_:b1`
//! - Literal: `"label"`, `"label"@en`, `"12"^^<http://www.w3.org/2001/XMLSchema#int>`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// Internationalized resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Iri(Cow<'static, str>);

impl Iri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    /// Constant IRI for vocabulary terms
    pub const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local part after the last `#`, `/` or `:`
    pub fn local_name(&self) -> &str {
        match self.0.rfind(['#', '/', ':']) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Namespace part up to and including the last `#`, `/` or `:`
    pub fn namespace(&self) -> &str {
        match self.0.rfind(['#', '/', ':']) {
            Some(idx) => &self.0[..=idx],
            None => "",
        }
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Anonymous node, scoped to the store it was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlankNode(String);

impl BlankNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh blank node with a random identifier
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.0)
    }
}

/// Literal value with optional language tag or datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    label: String,
    language: Option<String>,
    datatype: Option<Iri>,
}

impl Literal {
    /// Plain string literal
    pub fn string(label: impl Into<String>) -> Self {
        Self { label: label.into(), language: None, datatype: None }
    }

    /// Language-tagged literal
    pub fn with_language(label: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            language: Some(language.into().to_lowercase()),
            datatype: None,
        }
    }

    /// Typed literal
    pub fn typed(label: impl Into<String>, datatype: Iri) -> Self {
        Self { label: label.into(), language: None, datatype: Some(datatype) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn datatype(&self) -> Option<&Iri> {
        self.datatype.as_ref()
    }
}

/// Subject position term: IRI or blank node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    Iri(Iri),
    Blank(BlankNode),
}

impl Resource {
    pub fn iri(value: impl Into<String>) -> Self {
        Resource::Iri(Iri::new(value))
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Resource::Blank(BlankNode::new(id))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Resource::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Resource::Blank(_))
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Resource::Iri(iri) => Some(iri),
            Resource::Blank(_) => None,
        }
    }

    /// IRI text or blank node identifier
    pub fn string_value(&self) -> &str {
        match self {
            Resource::Iri(iri) => iri.as_str(),
            Resource::Blank(node) => node.id(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Iri(iri) => write!(f, "<{}>", iri),
            Resource::Blank(node) => write!(f, "{}", node),
        }
    }
}

impl From<Iri> for Resource {
    fn from(value: Iri) -> Self {
        Resource::Iri(value)
    }
}

impl From<BlankNode> for Resource {
    fn from(value: BlankNode) -> Self {
        Resource::Blank(value)
    }
}

/// Object position term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Iri(Iri),
    Blank(BlankNode),
    Literal(Literal),
}

impl Value {
    pub fn iri(value: impl Into<String>) -> Self {
        Value::Iri(Iri::new(value))
    }

    pub fn literal(label: impl Into<String>) -> Self {
        Value::Literal(Literal::string(label))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Value::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Value::Literal(_))
    }

    pub fn is_resource(&self) -> bool {
        !self.is_literal()
    }

    /// The term as a subject, if it can be one
    pub fn as_resource(&self) -> Option<Resource> {
        match self {
            Value::Iri(iri) => Some(Resource::Iri(iri.clone())),
            Value::Blank(node) => Some(Resource::Blank(node.clone())),
            Value::Literal(_) => None,
        }
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Value::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Value::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Lexical form: IRI text, blank node identifier or literal label
    pub fn string_value(&self) -> &str {
        match self {
            Value::Iri(iri) => iri.as_str(),
            Value::Blank(node) => node.id(),
            Value::Literal(literal) => literal.label(),
        }
    }

    /// Encode the term for storage
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a term produced by [`Value::encode`]
    pub fn decode(encoded: &str) -> Result<Value> {
        if let Some(rest) = encoded.strip_prefix('<') {
            let iri = rest
                .strip_suffix('>')
                .ok_or_else(|| Error::InvalidInput(format!("Unterminated IRI term: {}", encoded)))?;
            return Ok(Value::iri(iri));
        }
        if let Some(id) = encoded.strip_prefix("_:") {
            return Ok(Value::Blank(BlankNode::new(id)));
        }
        if encoded.starts_with('"') {
            return decode_literal(encoded).map(Value::Literal);
        }
        Err(Error::InvalidInput(format!("Unrecognized term encoding: {}", encoded)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Iri(iri) => write!(f, "<{}>", iri),
            Value::Blank(node) => write!(f, "{}", node),
            Value::Literal(literal) => {
                write!(f, "\"{}\"", escape(literal.label()))?;
                if let Some(language) = literal.language() {
                    write!(f, "@{}", language)
                } else if let Some(datatype) = literal.datatype() {
                    write!(f, "^^<{}>", datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl From<Iri> for Value {
    fn from(value: Iri) -> Self {
        Value::Iri(value)
    }
}

impl From<BlankNode> for Value {
    fn from(value: BlankNode) -> Self {
        Value::Blank(value)
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        Value::Literal(value)
    }
}

impl From<Resource> for Value {
    fn from(value: Resource) -> Self {
        match value {
            Resource::Iri(iri) => Value::Iri(iri),
            Resource::Blank(node) => Value::Blank(node),
        }
    }
}

fn escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn decode_literal(encoded: &str) -> Result<Literal> {
    let mut label = String::new();
    let mut chars = encoded.char_indices().skip(1);
    let mut end = None;

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => label.push('\n'),
                Some((_, 'r')) => label.push('\r'),
                Some((_, 't')) => label.push('\t'),
                Some((_, other)) => label.push(other),
                None => break,
            },
            '"' => {
                end = Some(idx);
                break;
            }
            other => label.push(other),
        }
    }

    let end = end.ok_or_else(|| Error::InvalidInput(format!("Unterminated literal: {}", encoded)))?;
    let suffix = &encoded[end + 1..];

    if suffix.is_empty() {
        Ok(Literal::string(label))
    } else if let Some(language) = suffix.strip_prefix('@') {
        Ok(Literal::with_language(label, language))
    } else if let Some(datatype) = suffix.strip_prefix("^^<").and_then(|s| s.strip_suffix('>')) {
        Ok(Literal::typed(label, Iri::new(datatype)))
    } else {
        Err(Error::InvalidInput(format!("Malformed literal suffix: {}", suffix)))
    }
}

/// A single RDF statement, optionally placed in a named graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Resource,
    pub predicate: Iri,
    pub object: Value,
    pub context: Option<Iri>,
}

impl Statement {
    pub fn new(subject: impl Into<Resource>, predicate: Iri, object: impl Into<Value>) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            context: None,
        }
    }

    /// Copy of this statement placed in the given named graph
    pub fn in_context(&self, context: Iri) -> Self {
        Self { context: Some(context), ..self.clone() }
    }

    /// Copy of this statement in the default graph
    pub fn without_context(&self) -> Self {
        Self { context: None, ..self.clone() }
    }

    pub fn with_subject(&self, subject: Resource) -> Self {
        Self { subject, ..self.clone() }
    }

    pub fn with_object(&self, object: Value) -> Self {
        Self { object, ..self.clone() }
    }

    /// Pattern match; `None` matches anything
    pub fn matches(
        &self,
        subject: Option<&Resource>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
    ) -> bool {
        subject.map_or(true, |s| &self.subject == s)
            && predicate.map_or(true, |p| &self.predicate == p)
            && object.map_or(true, |o| &self.object == o)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " <{}>", context)?;
        }
        f.write_str(" .")
    }
}

/// Ordered set of statements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    statements: BTreeSet<Statement>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the statement was not yet present
    pub fn insert(&mut self, statement: Statement) -> bool {
        self.statements.insert(statement)
    }

    pub fn remove(&mut self, statement: &Statement) -> bool {
        self.statements.remove(statement)
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.statements.contains(statement)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    /// Statements matching the pattern, in model order
    pub fn filter<'a, 'q>(
        &'a self,
        subject: Option<&'q Resource>,
        predicate: Option<&'q Iri>,
        object: Option<&'q Value>,
    ) -> impl Iterator<Item = &'a Statement> + 'q
    where
        'a: 'q,
    {
        self.statements
            .iter()
            .filter(move |st| st.matches(subject, predicate, object))
    }

    /// First object for a subject/predicate pair
    pub fn object_of(&self, subject: &Resource, predicate: &Iri) -> Option<&Value> {
        self.statements
            .iter()
            .find(|st| st.matches(Some(subject), Some(predicate), None))
            .map(|st| &st.object)
    }

    pub fn subjects(&self) -> BTreeSet<Resource> {
        self.statements.iter().map(|st| st.subject.clone()).collect()
    }

    pub fn predicates(&self) -> BTreeSet<Iri> {
        self.statements.iter().map(|st| st.predicate.clone()).collect()
    }

    pub fn objects(&self) -> BTreeSet<Value> {
        self.statements.iter().map(|st| st.object.clone()).collect()
    }

    pub fn into_vec(self) -> Vec<Statement> {
        self.statements.into_iter().collect()
    }
}

impl FromIterator<Statement> for Model {
    fn from_iter<T: IntoIterator<Item = Statement>>(iter: T) -> Self {
        Self { statements: iter.into_iter().collect() }
    }
}

impl Extend<Statement> for Model {
    fn extend<T: IntoIterator<Item = Statement>>(&mut self, iter: T) {
        self.statements.extend(iter)
    }
}

impl IntoIterator for Model {
    type Item = Statement;
    type IntoIter = std::collections::btree_set::IntoIter<Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.into_iter()
    }
}

impl<'a> IntoIterator for &'a Model {
    type Item = &'a Statement;
    type IntoIter = std::collections::btree_set::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}
