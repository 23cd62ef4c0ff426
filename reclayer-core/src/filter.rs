//! Filter expression tree and operator resolution.
//!
//! A [`Filter`] is a small predicate AST: comparison leaves combined with
//! `and`/`or`/`not`. Leaves carry an operator *name*; what a leaf means in
//! backend terms is decided by the [`ResolverRegistry`] that translates the
//! tree into BSON fragments. Registering a resolver for a new operator name
//! extends the filter language without touching this module.

use bson::{Bson, Document, doc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One node of a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A single `field <operator> value` predicate. `value` is `None` for
    /// operators that take no operand, like `EXISTS`.
    Leaf {
        field: String,
        operator: String,
        value: Option<Bson>,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// A leaf with the given operator name. The escape hatch for operators
    /// registered on top of the built-ins.
    pub fn compare(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Bson>,
    ) -> Self {
        Filter::Leaf {
            field: field.into(),
            operator: operator.into(),
            value: Some(value.into()),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, "=", value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, "!=", value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, "<", value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, "<=", value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, ">", value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, ">=", value)
    }

    pub fn is_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> Self {
        Self::compare(field, "IN", array_of(values))
    }

    pub fn not_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> Self {
        Self::compare(field, "NOT IN", array_of(values))
    }

    /// Regular-expression match on a string field.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, "LIKE", pattern.into())
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, "NOT LIKE", pattern.into())
    }

    /// Inclusive range predicate.
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        Self::compare(field, "BETWEEN", vec![low.into(), high.into()])
    }

    pub fn not_between(
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        Self::compare(field, "NOT BETWEEN", vec![low.into(), high.into()])
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Leaf {
            field: field.into(),
            operator: "EXISTS".into(),
            value: None,
        }
    }

    pub fn not_exists(field: impl Into<String>) -> Self {
        Filter::Leaf {
            field: field.into(),
            operator: "NOT EXISTS".into(),
            value: None,
        }
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Leaf accessors for custom resolvers; `None` on combinator nodes.
    pub fn field(&self) -> Option<&str> {
        match self {
            Filter::Leaf { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn operator(&self) -> Option<&str> {
        match self {
            Filter::Leaf { operator, .. } => Some(operator),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Bson> {
        match self {
            Filter::Leaf { value, .. } => value.as_ref(),
            _ => None,
        }
    }
}

fn array_of(values: impl IntoIterator<Item = impl Into<Bson>>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}

/// Translates one leaf into a backend fragment, or `None` when the leaf
/// cannot be expressed (wrong operand shape, unknown operator).
pub type FilterResolver = Arc<dyn Fn(&Filter) -> Option<Document> + Send + Sync>;

/// Operator-name to resolver mapping.
///
/// An owned value injected into each query rather than process-global
/// state: two queries can carry different operator vocabularies without
/// interfering. Cloning is cheap (resolvers are `Arc`-shared).
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, FilterResolver>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry")
            .field("operators", &names)
            .finish()
    }
}

impl ResolverRegistry {
    /// An empty registry with no operators at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in comparison, membership,
    /// pattern, range and existence operators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("=", |f| {
            let (field, value) = leaf_operand(f)?;
            Some(doc! { field: value.clone() })
        });
        for (name, op) in [
            ("!=", "$ne"),
            ("<", "$lt"),
            ("<=", "$lte"),
            (">", "$gt"),
            (">=", "$gte"),
        ] {
            registry.register(name, move |f| {
                let (field, value) = leaf_operand(f)?;
                Some(doc! { field: { op: value.clone() } })
            });
        }
        for (name, op) in [("IN", "$in"), ("NOT IN", "$nin")] {
            registry.register(name, move |f| {
                let (field, value) = leaf_operand(f)?;
                let Bson::Array(values) = value else {
                    return None;
                };
                Some(doc! { field: { op: values.clone() } })
            });
        }
        registry.register("LIKE", |f| {
            let (field, pattern) = string_operand(f)?;
            Some(doc! { field: { "$regex": pattern } })
        });
        registry.register("NOT LIKE", |f| {
            let (field, pattern) = string_operand(f)?;
            Some(doc! { field: { "$not": { "$regex": pattern } } })
        });
        registry.register("BETWEEN", |f| {
            let (field, low, high) = range_operand(f)?;
            Some(doc! { field: { "$gte": low, "$lte": high } })
        });
        registry.register("NOT BETWEEN", |f| {
            let (field, low, high) = range_operand(f)?;
            Some(doc! { field: { "$not": { "$gte": low, "$lte": high } } })
        });
        registry.register("EXISTS", |f| {
            let field = f.field()?;
            Some(doc! { field: { "$exists": true } })
        });
        registry.register("NOT EXISTS", |f| {
            let field = f.field()?;
            Some(doc! { field: { "$exists": false } })
        });

        registry
    }

    /// Registers a resolver for an operator name. Re-registering an
    /// existing name replaces the previous resolver.
    pub fn register(
        &mut self,
        operator: impl Into<String>,
        resolver: impl Fn(&Filter) -> Option<Document> + Send + Sync + 'static,
    ) {
        self.resolvers.insert(operator.into(), Arc::new(resolver));
    }

    pub fn is_registered(&self, operator: &str) -> bool {
        self.resolvers.contains_key(operator)
    }

    /// Translates a filter tree into one BSON fragment.
    ///
    /// A branch that resolves to nothing imposes no constraint: an
    /// `and`/`or` with one empty side collapses to the other side, and an
    /// unregistered leaf operator resolves to `None` rather than an error.
    pub fn resolve(&self, filter: &Filter) -> Option<Document> {
        match filter {
            Filter::And(left, right) => self.combine("$and", left, right),
            Filter::Or(left, right) => self.combine("$or", left, right),
            Filter::Not(inner) => {
                let inner = self.resolve(inner)?;
                Some(doc! { "$not": inner })
            }
            Filter::Leaf { operator, .. } => self.resolvers.get(operator)?(filter),
        }
    }

    fn combine(&self, op: &str, left: &Filter, right: &Filter) -> Option<Document> {
        match (self.resolve(left), self.resolve(right)) {
            (Some(l), Some(r)) => Some(doc! { op: [l, r] }),
            (Some(one), None) | (None, Some(one)) => Some(one),
            (None, None) => None,
        }
    }
}

fn leaf_operand(filter: &Filter) -> Option<(&str, &Bson)> {
    Some((filter.field()?, filter.value()?))
}

fn string_operand(filter: &Filter) -> Option<(&str, &str)> {
    match filter.value()? {
        Bson::String(s) => Some((filter.field()?, s)),
        _ => None,
    }
}

fn range_operand(filter: &Filter) -> Option<(&str, Bson, Bson)> {
    match filter.value()? {
        Bson::Array(bounds) if bounds.len() == 2 => {
            Some((filter.field()?, bounds[0].clone(), bounds[1].clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResolverRegistry {
        ResolverRegistry::with_defaults()
    }

    #[test]
    fn equality_emits_a_bare_pair() {
        let fragment = registry().resolve(&Filter::eq("name", "alice")).unwrap();
        assert_eq!(fragment, doc! { "name": "alice" });
    }

    #[test]
    fn comparisons_wrap_the_operator() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::gt("age", 18)).unwrap(),
            doc! { "age": { "$gt": 18 } }
        );
        assert_eq!(
            r.resolve(&Filter::ne("name", "bob")).unwrap(),
            doc! { "name": { "$ne": "bob" } }
        );
        assert_eq!(
            r.resolve(&Filter::lte("age", 65)).unwrap(),
            doc! { "age": { "$lte": 65 } }
        );
    }

    #[test]
    fn membership_requires_an_array_operand() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::is_in("status", ["a", "b"])).unwrap(),
            doc! { "status": { "$in": ["a", "b"] } }
        );
        // A scalar operand for IN cannot be expressed.
        assert_eq!(r.resolve(&Filter::compare("status", "IN", "a")), None);
    }

    #[test]
    fn between_is_inclusive() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::between("age", 18, 30)).unwrap(),
            doc! { "age": { "$gte": 18, "$lte": 30 } }
        );
        assert_eq!(
            r.resolve(&Filter::not_between("age", 18, 30)).unwrap(),
            doc! { "age": { "$not": { "$gte": 18, "$lte": 30 } } }
        );
        assert_eq!(
            r.resolve(&Filter::compare("age", "BETWEEN", vec![1, 2, 3])),
            None
        );
    }

    #[test]
    fn like_requires_a_string_pattern() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::like("name", "^ali")).unwrap(),
            doc! { "name": { "$regex": "^ali" } }
        );
        assert_eq!(r.resolve(&Filter::compare("name", "LIKE", 1)), None);
        assert_eq!(
            r.resolve(&Filter::not_like("name", "^ali")).unwrap(),
            doc! { "name": { "$not": { "$regex": "^ali" } } }
        );
    }

    #[test]
    fn existence_ignores_the_operand() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::exists("email")).unwrap(),
            doc! { "email": { "$exists": true } }
        );
        assert_eq!(
            r.resolve(&Filter::not_exists("email")).unwrap(),
            doc! { "email": { "$exists": false } }
        );
    }

    #[test]
    fn and_or_collapse_empty_branches() {
        let r = registry();
        let known = Filter::eq("name", "alice");
        let unknown = Filter::compare("name", "FUZZY", "alice");

        assert_eq!(
            r.resolve(&known.clone().and(Filter::gt("age", 18))).unwrap(),
            doc! { "$and": [{ "name": "alice" }, { "age": { "$gt": 18 } }] }
        );
        assert_eq!(
            r.resolve(&known.clone().and(unknown.clone())).unwrap(),
            doc! { "name": "alice" }
        );
        assert_eq!(
            r.resolve(&unknown.clone().or(known.clone())).unwrap(),
            doc! { "name": "alice" }
        );
        assert_eq!(r.resolve(&unknown.clone().and(unknown.clone())), None);

        assert_eq!(
            r.resolve(&known.clone().or(Filter::eq("name", "bob"))).unwrap(),
            doc! { "$or": [{ "name": "alice" }, { "name": "bob" }] }
        );
    }

    #[test]
    fn negation_wraps_the_child() {
        let r = registry();
        assert_eq!(
            r.resolve(&Filter::eq("name", "alice").not()).unwrap(),
            doc! { "$not": { "name": "alice" } }
        );
        assert_eq!(
            r.resolve(&Filter::compare("name", "FUZZY", "x").not()),
            None
        );
    }

    #[test]
    fn unregistered_operator_resolves_to_nothing() {
        assert_eq!(
            registry().resolve(&Filter::compare("name", "SOUNDS LIKE", "x")),
            None
        );
    }

    #[test]
    fn registration_overwrites() {
        let mut r = registry();
        r.register("=", |f| {
            let field = f.field()?;
            Some(doc! { field: { "$exists": true } })
        });

        assert_eq!(
            r.resolve(&Filter::eq("name", "alice")).unwrap(),
            doc! { "name": { "$exists": true } }
        );
    }

    #[test]
    fn custom_operator_extends_the_vocabulary() {
        let mut r = registry();
        r.register("CASE_INSENSITIVE", |f| {
            let field = f.field()?;
            let Bson::String(s) = f.value()? else {
                return None;
            };
            Some(doc! { field: { "$regex": format!("^{s}$"), "$options": "i" } })
        });

        assert_eq!(
            r.resolve(&Filter::compare("name", "CASE_INSENSITIVE", "John"))
                .unwrap(),
            doc! { "name": { "$regex": "^John$", "$options": "i" } }
        );
    }
}
