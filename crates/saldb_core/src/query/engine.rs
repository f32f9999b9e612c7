//! Query evaluation against one pinned revision.
//!
//! Leaves resolve to candidate id sets through an index (hash or B-tree
//! lookup for comparisons, token search for `Contains`), or through a scan of
//! the revision when the leaf names an unindexed field and scans are
//! allowed. `And` intersects its children smallest-first; `Or` unions them.

use crate::error::{CoreError, CoreResult};
use crate::index::{IdSet, Index, IndexKey, IndexKind, IndexManager, TokenizerConfig};
use crate::object::{compare_keys, ObjectGraph, ObjectId, PersistentObject};
use crate::query::expr::{CompareOp, Expr, QueryOptions};
use crate::query::results::QueryResult;
use crate::schema::{FieldSelector, Registry};
use crate::types::RevisionId;
use crate::value::{Value, ValueKind};
use std::cell::Cell;
use std::ops::Bound;

/// Where a leaf takes its candidates from.
enum Source<'a> {
    Index(&'a dyn Index),
    Scan(FieldSelector, ValueKind),
}

/// Evaluates expressions against a single revision.
pub struct QueryEngine<'a> {
    registry: &'a Registry,
    indexes: &'a IndexManager,
    graph: &'a ObjectGraph,
    tokenizer: &'a TokenizerConfig,
    at: RevisionId,
    allow_full_scans: bool,
    scans: Cell<usize>,
}

impl<'a> QueryEngine<'a> {
    /// Creates an engine reading revision `at`.
    pub fn new(
        registry: &'a Registry,
        indexes: &'a IndexManager,
        graph: &'a ObjectGraph,
        tokenizer: &'a TokenizerConfig,
        at: RevisionId,
    ) -> Self {
        Self {
            registry,
            indexes,
            graph,
            tokenizer,
            at,
            allow_full_scans: true,
            scans: Cell::new(0),
        }
    }

    /// Sets whether unindexed field leaves may scan.
    #[must_use]
    pub fn allow_full_scans(mut self, allow: bool) -> Self {
        self.allow_full_scans = allow;
        self
    }

    /// Returns how many leaves were answered by scanning so far.
    #[must_use]
    pub fn scans(&self) -> usize {
        self.scans.get()
    }

    /// Evaluates `expr` and orders, then truncates, the matches.
    ///
    /// # Errors
    ///
    /// `UnknownIndex` for leaves naming neither an index nor a scannable
    /// field, `AmbiguousField` for unqualified scan fields some type sees
    /// twice, `TypeMismatch` for operands the target cannot compare, and
    /// `InvalidState` for empty `And`/`Or` nodes.
    pub fn evaluate(&self, expr: &Expr, options: &QueryOptions) -> CoreResult<QueryResult> {
        let matches = self.eval(expr)?;
        let total = matches.len();
        let ids = match &options.order_by {
            Some(target) => self.order(matches, target, options)?,
            None => {
                let limit = options.limit.unwrap_or(total);
                if options.reverse {
                    matches.into_iter().rev().take(limit).collect()
                } else {
                    matches.into_iter().take(limit).collect()
                }
            }
        };
        Ok(QueryResult::new(total, ids))
    }

    /// Evaluates `expr` to the full set of matching ids.
    pub fn eval(&self, expr: &Expr) -> CoreResult<IdSet> {
        match expr {
            Expr::Compare { target, op, value } => self.compare(target, *op, value),
            Expr::Contains { target, text } => self.contains(target, text),
            Expr::And(children) => {
                let mut sets = self.eval_children(children, "And")?;
                sets.sort_by_key(IdSet::len);
                let mut sets = sets.into_iter();
                let mut result = sets.next().unwrap_or_default();
                for set in sets {
                    if result.is_empty() {
                        break;
                    }
                    result.retain(|id| set.contains(id));
                }
                Ok(result)
            }
            Expr::Or(children) => Ok(self
                .eval_children(children, "Or")?
                .into_iter()
                .flatten()
                .collect()),
        }
    }

    fn eval_children(&self, children: &[Expr], node: &str) -> CoreResult<Vec<IdSet>> {
        if children.is_empty() {
            return Err(CoreError::invalid_state(format!(
                "{node} needs at least one sub-expression"
            )));
        }
        children.iter().map(|child| self.eval(child)).collect()
    }

    fn source(&self, target: &str) -> CoreResult<Source<'a>> {
        if let Ok(index) = self.indexes.get(target) {
            return Ok(Source::Index(index));
        }
        if !self.allow_full_scans {
            return Err(CoreError::unknown_index(target));
        }
        let selector = FieldSelector::parse(target);
        match self.registry.field_kind(&selector)? {
            Some(kind) => Ok(Source::Scan(selector, kind)),
            None => Err(CoreError::unknown_index(target)),
        }
    }

    fn literal_key(&self, index: &dyn Index, value: &Value) -> CoreResult<IndexKey> {
        let spec = index.spec();
        let coerced = match spec.declared_kind() {
            Some(kind) => value.clone().coerce(kind).map_err(|v| {
                CoreError::type_mismatch(format!(
                    "index `{}` holds {kind} values, not {}",
                    spec.name(),
                    v.describe()
                ))
            })?,
            None => value.clone(),
        };
        IndexKey::from_value(&coerced).ok_or_else(|| {
            CoreError::type_mismatch(format!(
                "{} is not comparable in index `{}`",
                value.describe(),
                spec.name()
            ))
        })
    }

    fn compare(&self, target: &str, op: CompareOp, value: &Value) -> CoreResult<IdSet> {
        match self.source(target)? {
            Source::Index(index) => {
                let key = self.literal_key(index, value)?;
                if index.spec().index_kind() == IndexKind::Text && op != CompareOp::Eq {
                    return Err(CoreError::type_mismatch(format!(
                        "text index `{target}` supports only equality and containment"
                    )));
                }
                match op {
                    CompareOp::Eq => Ok(index.lookup(&key, self.at)),
                    CompareOp::Lt => index.range(Bound::Unbounded, Bound::Excluded(&key), self.at),
                    CompareOp::Lte => index.range(Bound::Unbounded, Bound::Included(&key), self.at),
                    CompareOp::Gt => index.range(Bound::Excluded(&key), Bound::Unbounded, self.at),
                    CompareOp::Gte => index.range(Bound::Included(&key), Bound::Unbounded, self.at),
                }
            }
            Source::Scan(selector, kind) => {
                let literal = value.clone().coerce(kind).map_err(|v| {
                    CoreError::type_mismatch(format!(
                        "field `{selector}` holds {kind} values, not {}",
                        v.describe()
                    ))
                })?;
                let rhs = IndexKey::from_value(&literal).ok_or_else(|| {
                    CoreError::type_mismatch(format!(
                        "{} is not comparable with field `{selector}`",
                        value.describe()
                    ))
                })?;
                self.scan(&selector, |object_value| {
                    let Some(lhs) = IndexKey::from_value(object_value) else {
                        return Ok(false);
                    };
                    Ok(match op {
                        CompareOp::Eq => lhs == rhs,
                        CompareOp::Lt => lhs < rhs,
                        CompareOp::Lte => lhs <= rhs,
                        CompareOp::Gt => lhs > rhs,
                        CompareOp::Gte => lhs >= rhs,
                    })
                })
            }
        }
    }

    fn contains(&self, target: &str, text: &str) -> CoreResult<IdSet> {
        match self.source(target)? {
            Source::Index(index) => index.search(text, self.at),
            Source::Scan(selector, kind) => {
                if kind != ValueKind::Text {
                    return Err(CoreError::type_mismatch(format!(
                        "field `{selector}` holds {kind} values, not text"
                    )));
                }
                let wanted = self.tokenizer.tokenize(text);
                self.scan(&selector, |object_value| {
                    let Value::Text(body) = object_value else {
                        return Ok(false);
                    };
                    let tokens = self.tokenizer.tokenize(body);
                    Ok(!wanted.is_empty() && wanted.iter().all(|t| tokens.contains(t)))
                })
            }
        }
    }

    /// Tests every object live at the pinned revision that carries the field.
    fn scan<F>(&self, selector: &FieldSelector, mut test: F) -> CoreResult<IdSet>
    where
        F: FnMut(&Value) -> CoreResult<bool>,
    {
        self.scans.set(self.scans.get() + 1);
        let mut found = IdSet::new();
        for object in self.graph.live_at(self.at) {
            let ty = object.resolved_type();
            let slot = match &selector.schema {
                Some(schema) => ty.resolve_qualified(schema, &selector.field),
                None => ty.resolve_field(&selector.field),
            };
            let slot = match slot {
                Ok(slot) => slot,
                Err(CoreError::UnknownField { .. }) => continue,
                Err(err) => return Err(err),
            };
            let value = object.value(&slot.field_ref()).unwrap_or(&Value::Null);
            if !value.is_null() && test(value)? {
                found.insert(object.id());
            }
        }
        Ok(found)
    }

    fn sort_key(&self, source: &Source<'_>, object: &PersistentObject) -> Option<IndexKey> {
        match source {
            Source::Index(index) => index
                .spec()
                .extract(object)
                .ok()?
                .iter()
                .find_map(|v| index.keys_for(v).ok()?.into_iter().next()),
            Source::Scan(selector, _) => {
                let value = match &selector.schema {
                    Some(schema) => object.get_qualified(schema, &selector.field),
                    None => object.get(&selector.field),
                };
                value.ok().and_then(IndexKey::from_value)
            }
        }
    }

    fn order(
        &self,
        matches: IdSet,
        target: &str,
        options: &QueryOptions,
    ) -> CoreResult<Vec<ObjectId>> {
        let source = self.source(target)?;
        if let Source::Index(index) = &source {
            if index.spec().index_kind() == IndexKind::Text {
                return Err(CoreError::type_mismatch(format!(
                    "cannot order by text index `{target}`"
                )));
            }
        }

        let mut keyed: Vec<(Option<IndexKey>, ObjectId)> = matches
            .into_iter()
            .map(|id| {
                let key = self
                    .graph
                    .try_resolve(self.at, id)
                    .and_then(|object| self.sort_key(&source, &object));
                (key, id)
            })
            .collect();

        let cmp = |a: &(Option<IndexKey>, ObjectId), b: &(Option<IndexKey>, ObjectId)| {
            compare_keys(a.0.as_ref(), b.0.as_ref(), options.reverse).then(a.1.cmp(&b.1))
        };
        match options.limit {
            Some(0) => keyed.clear(),
            Some(limit) if limit < keyed.len() => {
                keyed.select_nth_unstable_by(limit - 1, cmp);
                keyed.truncate(limit);
                keyed.sort_by(cmp);
            }
            _ => keyed.sort_by(cmp),
        }
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSpec;
    use crate::object::Version;
    use crate::schema::{FieldRef, Schema, SchemaField, TypeDef};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        indexes: IndexManager,
        graph: ObjectGraph,
        tokenizer: TokenizerConfig,
        ids: Vec<ObjectId>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = Registry::new();
            registry
                .register_schema(
                    Schema::new("Item")
                        .field(SchemaField::new("rank", ValueKind::Integer))
                        .field(SchemaField::new("label", ValueKind::Text))
                        .field(SchemaField::new("body", ValueKind::Text))
                        .field(SchemaField::new("weight", ValueKind::Integer)),
                )
                .unwrap();
            registry.register_type("Item", TypeDef::new(["Item"])).unwrap();
            registry.register_index(IndexSpec::field("rank")).unwrap();
            registry
                .register_index(IndexSpec::field("body").kind(IndexKind::Text))
                .unwrap();
            registry.initialize().unwrap();

            let tokenizer = TokenizerConfig::default();
            let mut indexes = IndexManager::new(registry.index_specs().unwrap(), tokenizer.clone());
            let mut graph = ObjectGraph::new();
            let ty = registry.type_def("Item").unwrap();

            let rows: [(Option<i64>, &str, &str); 4] = [
                (Some(3), "c", "red apple"),
                (Some(1), "a", "green apple"),
                (None, "d", "red cherry"),
                (Some(2), "b", "blue berry"),
            ];
            let mut ids = Vec::new();
            let mut changes: BTreeMap<ObjectId, Version> = BTreeMap::new();
            for (n, (rank, label, body)) in rows.into_iter().enumerate() {
                let id = ObjectId::from_bytes([n as u8 + 1; 16]);
                let mut obj = PersistentObject::new(id, Arc::clone(&ty));
                obj.set(FieldRef::new("Item", "rank"), rank.into());
                obj.set(FieldRef::new("Item", "label"), label.into());
                obj.set(FieldRef::new("Item", "body"), body.into());
                changes.insert(id, Some(Arc::new(obj)));
                ids.push(id);
            }
            let at = RevisionId::new(1);
            let updates = indexes
                .compute_updates(&graph, Some(RevisionId::ROOT), &changes)
                .unwrap();
            for (id, v) in changes {
                graph.put(at, id, v);
            }
            indexes.apply(at, &updates);

            Self {
                registry,
                indexes,
                graph,
                tokenizer,
                ids,
            }
        }

        fn engine(&self) -> QueryEngine<'_> {
            QueryEngine::new(
                &self.registry,
                &self.indexes,
                &self.graph,
                &self.tokenizer,
                RevisionId::new(1),
            )
        }
    }

    fn ids(result: QueryResult) -> Vec<ObjectId> {
        result.collect()
    }

    #[test]
    fn range_and_equality() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let opts = QueryOptions::new();

        let result = engine.evaluate(&Expr::field("rank").gt(1), &opts).unwrap();
        assert_eq!(result.total(), 2);
        assert_eq!(ids(result), vec![fx.ids[0], fx.ids[3]]);

        let result = engine.evaluate(&Expr::field("rank").eq(1), &opts).unwrap();
        assert_eq!(ids(result), vec![fx.ids[1]]);
    }

    #[test]
    fn and_equals_intersection() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let left = Expr::field("rank").gte(2);
        let right = Expr::field("body").contains("red");

        let expected: IdSet = engine
            .eval(&left)
            .unwrap()
            .intersection(&engine.eval(&right).unwrap())
            .copied()
            .collect();
        assert_eq!(engine.eval(&left.and(right)).unwrap(), expected);
        assert_eq!(expected.into_iter().collect::<Vec<_>>(), vec![fx.ids[0]]);
    }

    #[test]
    fn or_unions_without_duplicates() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let expr = Expr::field("body").contains("apple").or(Expr::field("rank").lte(2));
        let result = engine.eval(&expr).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn order_limit_and_count() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let all = Expr::of_type("Item");

        let result = engine
            .evaluate(&all, &QueryOptions::new().order_by("rank"))
            .unwrap();
        // Missing rank sorts last.
        assert_eq!(ids(result), vec![fx.ids[1], fx.ids[3], fx.ids[0], fx.ids[2]]);

        let result = engine
            .evaluate(&all, &QueryOptions::new().order_by("rank").reverse().limit(2))
            .unwrap();
        assert_eq!(result.total(), 4);
        assert_eq!(ids(result), vec![fx.ids[0], fx.ids[3]]);
    }

    #[test]
    fn scan_unindexed_field() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let result = engine
            .evaluate(
                &Expr::field("label").gte("b"),
                &QueryOptions::new().order_by("label"),
            )
            .unwrap();
        assert_eq!(ids(result), vec![fx.ids[3], fx.ids[0], fx.ids[2]]);

        assert_eq!(engine.scans(), 1);

        let engine = fx.engine();
        engine
            .evaluate(&Expr::field("rank").gt(0), &QueryOptions::new().order_by("label"))
            .unwrap();
        assert_eq!(engine.scans(), 0);

        let strict = fx.engine().allow_full_scans(false);
        assert!(matches!(
            strict.eval(&Expr::field("label").eq("a")),
            Err(CoreError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn scan_operands_checked_without_objects() {
        let fx = Fixture::new();
        let empty = ObjectGraph::new();
        let engine = QueryEngine::new(
            &fx.registry,
            &fx.indexes,
            &empty,
            &fx.tokenizer,
            RevisionId::ROOT,
        );
        assert!(matches!(
            engine.eval(&Expr::field("label").gt(5)),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::field("weight").contains("x")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::field("Item.weight").eq(Value::Null)),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(engine.eval(&Expr::field("weight").gte(1)).unwrap().is_empty());
        assert_eq!(engine.scans(), 1);
    }

    #[test]
    fn errors() {
        let fx = Fixture::new();
        let engine = fx.engine();
        assert!(matches!(
            engine.eval(&Expr::field("missing").eq(1)),
            Err(CoreError::UnknownIndex { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::field("rank").gt("high")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::field("path").gt("/a")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::field("rank").contains("x")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            engine.eval(&Expr::And(vec![])),
            Err(CoreError::InvalidState { .. })
        ));
    }
}
