//! Graph filters: class restriction plus an optional condition tree,
//! applied to the edges and vertices met during traversal.

use hashbrown::{HashMap, HashSet};

use crate::model::{PropertyTypeMap, Record, RecordId};
use crate::schema;
use crate::storage::StoreState;
use crate::{Result, graph};

use super::condition::{Condition, FilterExpr};

#[derive(Debug, Clone)]
struct ClassScope {
    name: String,
    with_subclasses: bool,
}

/// Restriction on which classes (and optionally which records) a traversal
/// step accepts. Class names unknown at evaluation time contribute zero
/// matches rather than failing, so a misspelled restriction yields empty
/// results.
#[derive(Debug, Clone, Default)]
pub struct GraphFilter {
    expr: Option<FilterExpr>,
    only: Option<Vec<ClassScope>>,
    exclude: Vec<ClassScope>,
}

impl GraphFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only records of exactly these classes.
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes = self.only.get_or_insert_with(Vec::new);
        scopes.extend(
            names.into_iter().map(|n| ClassScope { name: n.into(), with_subclasses: false }),
        );
        self
    }

    /// Accept only records of these classes or their descendants.
    pub fn only_sub_class_of<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes = self.only.get_or_insert_with(Vec::new);
        scopes.extend(
            names.into_iter().map(|n| ClassScope { name: n.into(), with_subclasses: true }),
        );
        self
    }

    /// Reject records of exactly these classes.
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .extend(names.into_iter().map(|n| ClassScope { name: n.into(), with_subclasses: false }));
        self
    }

    /// Reject records of these classes and their descendants.
    pub fn exclude_sub_class_of<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .extend(names.into_iter().map(|n| ClassScope { name: n.into(), with_subclasses: true }));
        self
    }

    /// Additionally require the record to pass this filter tree.
    pub fn filter(mut self, expr: impl Into<FilterExpr>) -> Self {
        self.expr = Some(expr.into());
        self
    }

    /// Resolve class names against one snapshot.
    pub(crate) fn compile(&self, state: &StoreState) -> CompiledGraphFilter {
        let resolve = |scopes: &[ClassScope]| {
            let mut ids = HashSet::new();
            for scope in scopes {
                if let Some(class) = schema::try_class_by_name(state, &scope.name) {
                    if scope.with_subclasses {
                        ids.extend(schema::subtree(state, class.id));
                    } else {
                        ids.insert(class.id);
                    }
                }
            }
            ids
        };
        CompiledGraphFilter {
            include: self.only.as_deref().map(|scopes| resolve(scopes)),
            exclude: resolve(&self.exclude),
            expr: self.expr.clone(),
            type_maps: HashMap::new(),
        }
    }
}

impl From<Condition> for GraphFilter {
    fn from(c: Condition) -> Self {
        GraphFilter::new().filter(c)
    }
}

impl From<FilterExpr> for GraphFilter {
    fn from(expr: FilterExpr) -> Self {
        GraphFilter::new().filter(expr)
    }
}

/// A [`GraphFilter`] with class names resolved to ids and per-class type
/// maps cached for condition evaluation.
pub(crate) struct CompiledGraphFilter {
    include: Option<HashSet<u16>>,
    exclude: HashSet<u16>,
    expr: Option<FilterExpr>,
    type_maps: HashMap<u16, PropertyTypeMap>,
}

impl CompiledGraphFilter {
    pub(crate) fn accepts_class(&self, class_id: u16) -> bool {
        if self.exclude.contains(&class_id) {
            return false;
        }
        match &self.include {
            Some(ids) => ids.contains(&class_id),
            None => true,
        }
    }

    /// Whether the filter needs the record materialized at all.
    pub(crate) fn has_expr(&self) -> bool {
        self.expr.is_some()
    }

    /// Full check: class scope plus the condition tree over the record.
    pub(crate) fn accepts(&mut self, state: &StoreState, rid: RecordId) -> Result<bool> {
        if !self.accepts_class(rid.class_id) {
            return Ok(false);
        }
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        let record = graph::fetch_record(state, rid)?;
        let types = self
            .type_maps
            .entry(rid.class_id)
            .or_insert_with(|| schema::property_type_map(state, rid.class_id));
        expr.execute(&record, types)
    }

    pub(crate) fn accepts_record(
        &mut self,
        state: &StoreState,
        rid: RecordId,
        record: &Record,
    ) -> Result<bool> {
        if !self.accepts_class(rid.class_id) {
            return Ok(false);
        }
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        let types = self
            .type_maps
            .entry(rid.class_id)
            .or_insert_with(|| schema::property_type_map(state, rid.class_id));
        expr.execute(record, types)
    }
}
