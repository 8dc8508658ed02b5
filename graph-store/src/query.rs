//! Structured select and construct queries
//!
//! Queries are basic graph patterns with variables, a small set of filters
//! (prefix tests, string equality, exclusion lists, negated sub-patterns),
//! optional grouping with a `count(DISTINCT ?x) > n` condition, `DISTINCT` and
//! `LIMIT`. They are evaluated by index-nested-loop joins over a connection's
//! statement pattern lookup, so every backend answers them the same way.
//!
//! A query that projects, filters or groups on a variable no pattern binds, or
//! that asks for zero rows, is malformed and fails with `Error::InvalidQuery`.

use crate::backend::StoreConnection;
use graph_common::{Error, Iri, Literal, Model, Resource, Result, Statement, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One result row: variable name to bound value
pub type Bindings = BTreeMap<String, Value>;

const XSD_INTEGER: Iri = Iri::from_static("http://www.w3.org/2001/XMLSchema#integer");

/// Pattern position: variable or constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(String),
    Const(Value),
}

/// Variable term
pub fn var(name: &str) -> Term {
    Term::Var(name.to_string())
}

impl From<Iri> for Term {
    fn from(value: Iri) -> Self {
        Term::Const(Value::Iri(value))
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Const(value)
    }
}

impl From<Resource> for Term {
    fn from(value: Resource) -> Self {
        Term::Const(value.into())
    }
}

impl Term {
    fn var_name(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            Term::Const(_) => None,
        }
    }

    fn resolve(&self, row: &Bindings) -> Option<Value> {
        match self {
            Term::Var(name) => row.get(name).cloned(),
            Term::Const(value) => Some(value.clone()),
        }
    }
}

/// Triple pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: impl Into<Term>, predicate: impl Into<Term>, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    fn vars(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(Term::var_name)
    }

    /// Bind the pattern's variables against a statement, extending `row`
    fn unify(&self, row: &Bindings, statement: &Statement) -> Option<Bindings> {
        let mut out = row.clone();
        let positions = [
            (&self.subject, Value::from(statement.subject.clone())),
            (&self.predicate, Value::Iri(statement.predicate.clone())),
            (&self.object, statement.object.clone()),
        ];
        for (term, value) in positions {
            match term {
                Term::Const(expected) => {
                    if expected != &value {
                        return None;
                    }
                }
                Term::Var(name) => match out.get(name) {
                    Some(bound) if bound != &value => return None,
                    Some(_) => {}
                    None => {
                        out.insert(name.clone(), value);
                    }
                },
            }
        }
        Some(out)
    }

    fn instantiate(&self, row: &Bindings) -> Option<Statement> {
        let subject = self.subject.resolve(row)?.as_resource()?;
        let predicate = self.predicate.resolve(row)?.as_iri()?.clone();
        let object = self.object.resolve(row)?;
        Some(Statement::new(subject, predicate, object))
    }
}

/// Row filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `STRSTARTS(STR(?var), prefix)`
    StartsWith { var: String, prefix: String },
    /// `!STRSTARTS(STR(?var), prefix)`
    NotStartsWith { var: String, prefix: String },
    /// `STR(?var) = text`
    StrEquals { var: String, text: String },
    /// `?var NOT IN (...)`
    NotIn { var: String, values: Vec<Value> },
    /// `isIRI(?var) || isBlank(?var)`
    IsResource { var: String },
    /// `FILTER NOT EXISTS { ... }`
    NotExists(Vec<TriplePattern>),
}

impl Filter {
    pub fn starts_with(var: &str, prefix: &str) -> Self {
        Filter::StartsWith { var: var.to_string(), prefix: prefix.to_string() }
    }

    pub fn not_starts_with(var: &str, prefix: &str) -> Self {
        Filter::NotStartsWith { var: var.to_string(), prefix: prefix.to_string() }
    }

    pub fn str_equals(var: &str, text: &str) -> Self {
        Filter::StrEquals { var: var.to_string(), text: text.to_string() }
    }

    pub fn not_in(var: &str, values: Vec<Value>) -> Self {
        Filter::NotIn { var: var.to_string(), values }
    }

    pub fn is_resource(var: &str) -> Self {
        Filter::IsResource { var: var.to_string() }
    }

    fn var_name(&self) -> Option<&str> {
        match self {
            Filter::StartsWith { var, .. }
            | Filter::NotStartsWith { var, .. }
            | Filter::StrEquals { var, .. }
            | Filter::NotIn { var, .. }
            | Filter::IsResource { var } => Some(var),
            Filter::NotExists(_) => None,
        }
    }
}

/// `GROUP BY ?vars HAVING (count(DISTINCT ?counted) > more_than)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    pub vars: Vec<String>,
    pub counted: String,
    pub count_var: String,
    pub more_than: usize,
}

/// Select query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    projection: Vec<String>,
    patterns: Vec<TriplePattern>,
    filters: Vec<Filter>,
    group: Option<GroupBy>,
    distinct: bool,
    limit: Option<usize>,
}

impl SelectQuery {
    pub fn select(vars: &[&str]) -> Self {
        Self {
            projection: vars.iter().map(|v| v.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn pattern(mut self, subject: impl Into<Term>, predicate: impl Into<Term>, object: impl Into<Term>) -> Self {
        self.patterns.push(TriplePattern::new(subject, predicate, object));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Group rows and keep groups with more than `more_than` distinct `counted` values.
    /// The count is bound to `count_var`.
    pub fn group_by(mut self, vars: &[&str], counted: &str, count_var: &str, more_than: usize) -> Self {
        self.group = Some(GroupBy {
            vars: vars.iter().map(|v| v.to_string()).collect(),
            counted: counted.to_string(),
            count_var: count_var.to_string(),
            more_than,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    fn bound_vars(&self) -> BTreeSet<&str> {
        self.patterns.iter().flat_map(|p| p.vars()).collect()
    }

    /// Reject queries that cannot be evaluated as written
    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(Error::InvalidQuery("query has no patterns".to_string()));
        }
        if self.projection.is_empty() {
            return Err(Error::InvalidQuery("query projects no variables".to_string()));
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidQuery("limit must be greater than zero".to_string()));
        }

        let bound = self.bound_vars();
        for filter in &self.filters {
            if let Some(name) = filter.var_name() {
                if !bound.contains(name) {
                    return Err(Error::InvalidQuery(format!("filter uses unbound variable ?{}", name)));
                }
            }
        }

        match &self.group {
            Some(group) => {
                for name in group.vars.iter().chain(std::iter::once(&group.counted)) {
                    if !bound.contains(name.as_str()) {
                        return Err(Error::InvalidQuery(format!("grouping uses unbound variable ?{}", name)));
                    }
                }
                for name in &self.projection {
                    if !group.vars.contains(name) && name != &group.count_var {
                        return Err(Error::InvalidQuery(format!(
                            "projected variable ?{} is neither grouped nor the count",
                            name
                        )));
                    }
                }
            }
            None => {
                for name in &self.projection {
                    if !bound.contains(name.as_str()) {
                        return Err(Error::InvalidQuery(format!("projected variable ?{} is not bound", name)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Construct query: a template instantiated once per row of a select query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructQuery {
    template: Vec<TriplePattern>,
    query: SelectQuery,
}

impl ConstructQuery {
    pub fn new(template: Vec<TriplePattern>, query: SelectQuery) -> Self {
        Self { template, query }
    }

    pub fn validate(&self) -> Result<()> {
        self.query.validate()?;
        for name in self.template.iter().flat_map(|p| p.vars()) {
            if !self.query.projection.iter().any(|p| p == name) {
                return Err(Error::InvalidQuery(format!("template uses unprojected variable ?{}", name)));
            }
        }
        Ok(())
    }
}

/// Evaluate a select query against a connection
pub async fn evaluate<C>(conn: &mut C, query: &SelectQuery) -> Result<Vec<Bindings>>
where
    C: StoreConnection + ?Sized,
{
    query.validate()?;

    let joined = join(conn, vec![Bindings::new()], &query.patterns).await?;

    let mut rows = Vec::with_capacity(joined.len());
    for row in joined {
        if passes(conn, &row, &query.filters).await? {
            rows.push(row);
        }
    }

    if let Some(group) = &query.group {
        rows = group_rows(rows, group);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for row in rows {
        let projected: Bindings = query
            .projection
            .iter()
            .filter_map(|name| row.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        if query.distinct && !seen.insert(projected.clone()) {
            continue;
        }
        out.push(projected);
        if query.limit.is_some_and(|limit| out.len() >= limit) {
            break;
        }
    }
    Ok(out)
}

/// Evaluate a construct query against a connection
pub async fn construct<C>(conn: &mut C, query: &ConstructQuery) -> Result<Model>
where
    C: StoreConnection + ?Sized,
{
    query.validate()?;
    let rows = evaluate(conn, &query.query).await?;
    Ok(rows
        .iter()
        .flat_map(|row| query.template.iter().filter_map(move |p| p.instantiate(row)))
        .collect())
}

async fn join<C>(conn: &mut C, seeds: Vec<Bindings>, patterns: &[TriplePattern]) -> Result<Vec<Bindings>>
where
    C: StoreConnection + ?Sized,
{
    let mut rows = seeds;
    for pattern in patterns {
        let mut next = Vec::new();
        for row in &rows {
            let subject = match pattern.subject.resolve(row) {
                Some(value) => match value.as_resource() {
                    Some(resource) => Some(resource),
                    None => continue,
                },
                None => None,
            };
            let predicate = match pattern.predicate.resolve(row) {
                Some(Value::Iri(iri)) => Some(iri),
                Some(_) => continue,
                None => None,
            };
            let object = pattern.object.resolve(row);

            let found = conn
                .statements(subject.as_ref(), predicate.as_ref(), object.as_ref())
                .await?;
            next.extend(found.iter().filter_map(|st| pattern.unify(row, st)));
        }
        rows = next;
        if rows.is_empty() {
            break;
        }
    }
    Ok(rows)
}

async fn passes<C>(conn: &mut C, row: &Bindings, filters: &[Filter]) -> Result<bool>
where
    C: StoreConnection + ?Sized,
{
    for filter in filters {
        let keep = match filter {
            Filter::StartsWith { var, prefix } => row
                .get(var)
                .is_some_and(|v| v.string_value().starts_with(prefix.as_str())),
            Filter::NotStartsWith { var, prefix } => row
                .get(var)
                .is_some_and(|v| !v.string_value().starts_with(prefix.as_str())),
            Filter::StrEquals { var, text } => row.get(var).is_some_and(|v| v.string_value() == text),
            Filter::NotIn { var, values } => row.get(var).is_some_and(|v| !values.contains(v)),
            Filter::IsResource { var } => row.get(var).is_some_and(Value::is_resource),
            Filter::NotExists(patterns) => join(conn, vec![row.clone()], patterns).await?.is_empty(),
        };
        if !keep {
            return Ok(false);
        }
    }
    Ok(true)
}

fn group_rows(rows: Vec<Bindings>, group: &GroupBy) -> Vec<Bindings> {
    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut counted: HashMap<Vec<Value>, BTreeSet<Value>> = HashMap::new();

    for row in rows {
        let key: Option<Vec<Value>> = group.vars.iter().map(|name| row.get(name).cloned()).collect();
        let (Some(key), Some(value)) = (key, row.get(&group.counted)) else {
            continue;
        };
        let entry = counted.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            BTreeSet::new()
        });
        entry.insert(value.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let count = counted.get(&key).map(BTreeSet::len).unwrap_or(0);
            if count <= group.more_than {
                return None;
            }
            let mut row: Bindings = group.vars.iter().cloned().zip(key).collect();
            row.insert(
                group.count_var.clone(),
                Value::Literal(Literal::typed(count.to_string(), XSD_INTEGER)),
            );
            Some(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::backend::ConnectionProvider;
    use graph_common::vocab::{rdf, rdfs, sdo};
    use graph_common::RepositoryType;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();
        conn.begin().await.unwrap();
        conn.add(&[
            Statement::new(Resource::iri("urn:pwid:meg:e:a"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::iri("urn:pwid:meg:e:a"), rdfs::LABEL, Value::literal("Term 1")),
            Statement::new(Resource::iri("urn:pwid:meg:e:b"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::iri("urn:pwid:meg:e:b"), rdfs::LABEL, Value::literal("Term 1")),
            Statement::new(Resource::blank("c"), rdf::TYPE, sdo::VIDEO_OBJECT),
            Statement::new(Resource::blank("c"), rdfs::LABEL, Value::literal("Term 2")),
        ])
        .await
        .unwrap();
        conn.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_join_and_prefix_filter() {
        let store = seeded().await;
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();

        let query = SelectQuery::select(&["s"])
            .pattern(var("s"), rdf::TYPE, var("type"))
            .filter(Filter::not_starts_with("s", "urn:pwid:meg:"))
            .distinct();

        let rows = evaluate(&mut conn, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["s"], Value::Blank(graph_common::BlankNode::new("c")));
    }

    #[tokio::test]
    async fn test_group_having_count() {
        let store = seeded().await;
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();

        let query = SelectQuery::select(&["type", "value", "count"])
            .pattern(var("s"), rdf::TYPE, var("type"))
            .pattern(var("s"), rdfs::LABEL, var("value"))
            .group_by(&["type", "value"], "s", "count", 1)
            .limit(10);

        let rows = evaluate(&mut conn, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], Value::literal("Term 1"));
        assert_eq!(rows[0]["count"].string_value(), "2");
    }

    #[tokio::test]
    async fn test_not_exists_and_str_equals() {
        let store = seeded().await;
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();

        let query = SelectQuery::select(&["s"])
            .pattern(var("s"), rdfs::LABEL, var("v"))
            .filter(Filter::str_equals("v", "Term 1"))
            .filter(Filter::NotExists(vec![TriplePattern::new(
                var("s"),
                rdf::TYPE,
                Iri::new("https://schema.org/Missing"),
            )]));

        let rows = evaluate(&mut conn, &query).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_and_construct() {
        let store = seeded().await;
        let mut conn = store.connect(RepositoryType::Entities).await.unwrap();

        let query = SelectQuery::select(&["s", "v"])
            .pattern(var("s"), rdfs::LABEL, var("v"))
            .limit(2);
        assert_eq!(evaluate(&mut conn, &query).await.unwrap().len(), 2);

        let renamed = ConstructQuery::new(
            vec![TriplePattern::new(var("s"), sdo::NAME, var("v"))],
            SelectQuery::select(&["s", "v"]).pattern(var("s"), rdfs::LABEL, var("v")),
        );
        let model = construct(&mut conn, &renamed).await.unwrap();
        assert_eq!(model.len(), 3);
        assert!(model.iter().all(|st| st.predicate == sdo::NAME));
    }

    #[test]
    fn test_malformed_queries_are_rejected() {
        let unbound = SelectQuery::select(&["x"]).pattern(var("s"), rdf::TYPE, var("t"));
        assert!(matches!(unbound.validate(), Err(Error::InvalidQuery(_))));

        let zero = SelectQuery::select(&["s"]).pattern(var("s"), rdf::TYPE, var("t")).limit(0);
        assert!(matches!(zero.validate(), Err(Error::InvalidQuery(_))));

        let empty = SelectQuery::select(&["s"]);
        assert!(matches!(empty.validate(), Err(Error::InvalidQuery(_))));

        let bad_filter = SelectQuery::select(&["s"])
            .pattern(var("s"), rdf::TYPE, var("t"))
            .filter(Filter::str_equals("nope", "x"));
        assert!(matches!(bad_filter.validate(), Err(Error::InvalidQuery(_))));
    }
}
