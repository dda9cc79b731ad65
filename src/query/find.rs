//! Record-level find operators: class scans, subtree scans, and adjacency
//! scans, with index acceleration for single-leaf conditions.

use std::collections::VecDeque;

use hashbrown::HashSet;

use crate::index::{self, IndexQuery};
use crate::model::{ClassDescriptor, RecordDescriptor, RecordId};
use crate::tx::Transaction;
use crate::{Result, graph, schema};

use super::condition::{Comparator, FilterExpr};
use super::filter::GraphFilter;
use super::result::{CursorPlan, RecordResult, ResultSet, ResultSetCursor};
use super::{Direction, validate_vertex};

// ============================================================================
// FindOperation — class scans
// ============================================================================

/// Builder for `find` / `find_sub_class_of`: scans one class or its whole
/// subtree, optionally filtered.
pub struct FindOperation<'txn> {
    txn: &'txn Transaction,
    target: ClassDescriptor,
    classes: Vec<u16>,
    filter: Option<FilterExpr>,
}

impl<'txn> std::fmt::Debug for FindOperation<'txn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindOperation")
            .field("target", &self.target)
            .field("classes", &self.classes)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<'txn> FindOperation<'txn> {
    pub(crate) fn new(
        txn: &'txn Transaction,
        class_name: &str,
        with_subclasses: bool,
    ) -> Result<Self> {
        let state = txn.state();
        let target = schema::class_by_name(state, class_name)?;
        let classes = if with_subclasses {
            schema::subtree(state, target.id)
        } else {
            vec![target.id]
        };
        Ok(Self { txn, target, classes, filter: None })
    }

    pub fn filter(mut self, expr: impl Into<FilterExpr>) -> Self {
        self.filter = Some(expr.into());
        self
    }

    pub fn get_result(&self) -> Result<ResultSet> {
        let state = self.txn.state();
        if let Some(rids) = self.try_index()? {
            let mut out = Vec::with_capacity(rids.len());
            for rid in rids {
                let record = graph::fetch_record(state, rid)?;
                out.push(RecordResult::new(RecordDescriptor::from(rid), record));
            }
            return Ok(ResultSet(out));
        }

        let mut out = Vec::new();
        for &class_id in &self.classes {
            let types = self
                .filter
                .as_ref()
                .map(|_| schema::property_type_map(state, class_id));
            for position in graph::record_positions(state, class_id)? {
                let rid = RecordId::new(class_id, position);
                let record = graph::fetch_record(state, rid)?;
                if let (Some(expr), Some(types)) = (&self.filter, &types) {
                    if !expr.execute(&record, types)? {
                        continue;
                    }
                }
                out.push(RecordResult::new(RecordDescriptor::from(rid), record));
            }
        }
        Ok(ResultSet(out))
    }

    pub fn get_cursor(self) -> Result<ResultSetCursor<'txn>> {
        if let Some(rids) = self.try_index()? {
            let state = self.txn.state();
            let mut items = VecDeque::with_capacity(rids.len());
            for rid in rids {
                let record = graph::fetch_record(state, rid)?;
                items.push_back(RecordResult::new(RecordDescriptor::from(rid), record));
            }
            return Ok(ResultSetCursor::new(self.txn, CursorPlan::Materialized(items)));
        }
        Ok(ResultSetCursor::new(
            self.txn,
            CursorPlan::Scan {
                classes: self.classes,
                class_idx: 0,
                last_key: None,
                filter: self.filter,
            },
        ))
    }

    /// Use an index when the filter is one positive leaf with an indexable
    /// comparator on an indexed property. Case-folded comparisons scan: the
    /// index stores original-case keys.
    fn try_index(&self) -> Result<Option<Vec<RecordId>>> {
        let Some(cond) = self.filter.as_ref().and_then(FilterExpr::as_single_condition) else {
            return Ok(None);
        };
        if cond.ignore_case {
            return Ok(None);
        }
        let state = self.txn.state();
        let Ok(prop) = schema::resolve_property(state, self.target.id, &cond.prop) else {
            return Ok(None);
        };

        // The index may live on the class itself or on an ancestor whose
        // index covers this subtree.
        let mut scope = vec![self.target.id];
        scope.extend(schema::ancestors(state, self.target.id));
        let Some(idx) = scope
            .into_iter()
            .find_map(|cid| schema::index_on(state, cid, prop.id))
        else {
            return Ok(None);
        };

        let query = match &cond.comparator {
            Comparator::Eq(v) => IndexQuery::Eq(v.clone()),
            Comparator::Lt(v) => IndexQuery::Upper(v.clone(), false),
            Comparator::Le(v) => IndexQuery::Upper(v.clone(), true),
            Comparator::Gt(v) => IndexQuery::Lower(v.clone(), false),
            Comparator::Ge(v) => IndexQuery::Lower(v.clone(), true),
            Comparator::Between { lo, hi, bounds } => {
                IndexQuery::Between { lo: lo.clone(), hi: hi.clone(), bounds: *bounds }
            }
            Comparator::In(set) => IndexQuery::In(set.clone()),
            _ => return Ok(None),
        };

        let rids = index::lookup(state, &idx, prop.ty, &query)?;
        // The index spans the indexed class's whole subtree; keep only the
        // classes this find targets.
        Ok(Some(rids.into_iter().filter(|rid| self.classes.contains(&rid.class_id)).collect()))
    }
}

// ============================================================================
// FindEdgeOperation — adjacency scans
// ============================================================================

/// Builder for `find_in_edge` / `find_out_edge` / `find_edge`: enumerates
/// the edges incident to one vertex, filtered by a [`GraphFilter`].
pub struct FindEdgeOperation<'txn> {
    txn: &'txn Transaction,
    vertex: RecordId,
    direction: Direction,
    filter: GraphFilter,
}

impl<'txn> std::fmt::Debug for FindEdgeOperation<'txn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindEdgeOperation")
            .field("vertex", &self.vertex)
            .field("direction", &self.direction)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<'txn> FindEdgeOperation<'txn> {
    pub(crate) fn new(
        txn: &'txn Transaction,
        vertex: RecordDescriptor,
        direction: Direction,
    ) -> Result<Self> {
        validate_vertex(txn.state(), vertex.rid)?;
        Ok(Self { txn, vertex: vertex.rid, direction, filter: GraphFilter::new() })
    }

    pub fn filter(mut self, filter: impl Into<GraphFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn get_result(&self) -> Result<ResultSet> {
        let state = self.txn.state();
        let mut compiled = self.filter.compile(state);
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut out = Vec::new();
        for edge in incident_edges(state, self.vertex, self.direction)? {
            if !seen.insert(edge) {
                continue;
            }
            if !compiled.accepts_class(edge.class_id) {
                continue;
            }
            let record = graph::fetch_record(state, edge)?;
            if compiled.has_expr() && !compiled.accepts_record(state, edge, &record)? {
                continue;
            }
            out.push(RecordResult::new(RecordDescriptor::from(edge), record));
        }
        Ok(ResultSet(out))
    }

    pub fn get_cursor(self) -> Result<ResultSetCursor<'txn>> {
        let items: VecDeque<RecordResult> = self.get_result()?.into_iter().collect();
        Ok(ResultSetCursor::new(self.txn, CursorPlan::Materialized(items)))
    }
}

/// Incident edge rids of a vertex in the requested direction. `Both`
/// reports a self-loop once per side it appears on; callers dedupe.
pub(crate) fn incident_edges(
    state: &crate::storage::StoreState,
    vertex: RecordId,
    direction: Direction,
) -> Result<Vec<RecordId>> {
    let mut out = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        out.extend(graph::out_edges(state, vertex)?.into_iter().map(|(edge, _)| edge));
    }
    if matches!(direction, Direction::In | Direction::Both) {
        out.extend(graph::in_edges(state, vertex)?.into_iter().map(|(edge, _)| edge));
    }
    Ok(out)
}
