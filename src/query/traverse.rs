//! BFS traversal and shortest path.
//!
//! Both walk the adjacency maps breadth-first under a pair of graph
//! filters: `where_edge` gates which edges are followed, `where_vertex`
//! gates which discovered vertices are admitted (and expanded). The source
//! itself is the caller's anchor and is never filtered.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::model::{RecordDescriptor, RecordId};
use crate::storage::StoreState;
use crate::tx::Transaction;
use crate::{Result, graph};

use super::filter::{CompiledGraphFilter, GraphFilter};
use super::result::{CursorPlan, RecordResult, ResultSet, ResultSetCursor};
use super::{Direction, validate_vertex};

/// One BFS step: edges leaving `vertex` in `direction` that the edge
/// filter accepts, paired with the vertex on the other end.
fn expand(
    state: &StoreState,
    vertex: RecordId,
    direction: Direction,
    edge_filter: &mut CompiledGraphFilter,
) -> Result<Vec<(RecordId, RecordId)>> {
    let mut hops = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        hops.extend(graph::out_edges(state, vertex)?);
    }
    if matches!(direction, Direction::In | Direction::Both) {
        hops.extend(graph::in_edges(state, vertex)?);
    }
    let mut accepted = Vec::with_capacity(hops.len());
    for (edge, neighbor) in hops {
        if edge_filter.accepts(state, edge)? {
            accepted.push((edge, neighbor));
        }
    }
    Ok(accepted)
}

// ============================================================================
// TraverseOperation
// ============================================================================

/// Builder for `traverse` / `traverse_in` / `traverse_out`: breadth-first
/// expansion from one or more sources, reporting every vertex whose
/// discovery depth lies in `[min, max]`. Depth 0 is the source itself.
pub struct TraverseOperation<'txn> {
    txn: &'txn Transaction,
    sources: Vec<RecordId>,
    direction: Direction,
    min_depth: u32,
    max_depth: u32,
    edge_filter: GraphFilter,
    vertex_filter: GraphFilter,
}

impl<'txn> std::fmt::Debug for TraverseOperation<'txn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraverseOperation")
            .field("sources", &self.sources)
            .field("direction", &self.direction)
            .field("min_depth", &self.min_depth)
            .field("max_depth", &self.max_depth)
            .field("edge_filter", &self.edge_filter)
            .field("vertex_filter", &self.vertex_filter)
            .finish()
    }
}

impl<'txn> TraverseOperation<'txn> {
    pub(crate) fn new(
        txn: &'txn Transaction,
        source: RecordDescriptor,
        direction: Direction,
    ) -> Result<Self> {
        validate_vertex(txn.state(), source.rid)?;
        Ok(Self {
            txn,
            sources: vec![source.rid],
            direction,
            min_depth: 0,
            max_depth: u32::MAX,
            edge_filter: GraphFilter::new(),
            vertex_filter: GraphFilter::new(),
        })
    }

    /// Traverse from this vertex as well; duplicates keep their smallest
    /// discovery depth.
    pub fn add_source(mut self, source: RecordDescriptor) -> Self {
        self.sources.push(source.rid);
        self
    }

    /// Report only vertices discovered at depths in `[min, max]`.
    /// `min > max` yields nothing.
    pub fn depth(mut self, min: u32, max: u32) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    pub fn where_edge(mut self, filter: impl Into<GraphFilter>) -> Self {
        self.edge_filter = filter.into();
        self
    }

    pub fn where_vertex(mut self, filter: impl Into<GraphFilter>) -> Self {
        self.vertex_filter = filter.into();
        self
    }

    pub fn get_result(&self) -> Result<ResultSet> {
        let state = self.txn.state();
        if self.min_depth > self.max_depth {
            return Ok(ResultSet::default());
        }
        for &source in &self.sources {
            validate_vertex(state, source)?;
        }
        let mut edge_filter = self.edge_filter.compile(state);
        let mut vertex_filter = self.vertex_filter.compile(state);

        let mut visited: HashSet<RecordId> = HashSet::new();
        let mut queue: VecDeque<(RecordId, u32)> = VecDeque::new();
        let mut out = Vec::new();

        for &source in &self.sources {
            if visited.insert(source) {
                if self.min_depth == 0 {
                    let record = graph::fetch_record(state, source)?;
                    out.push(RecordResult::at_depth(RecordDescriptor::from(source), record, 0));
                }
                queue.push_back((source, 0));
            }
        }

        while let Some((vertex, depth)) = queue.pop_front() {
            if depth == self.max_depth {
                continue;
            }
            for (_, neighbor) in expand(state, vertex, self.direction, &mut edge_filter)? {
                if visited.contains(&neighbor) {
                    continue;
                }
                if !vertex_filter.accepts(state, neighbor)? {
                    continue;
                }
                visited.insert(neighbor);
                let next_depth = depth + 1;
                if next_depth >= self.min_depth {
                    let record = graph::fetch_record(state, neighbor)?;
                    out.push(RecordResult::at_depth(
                        RecordDescriptor::from(neighbor),
                        record,
                        next_depth,
                    ));
                }
                queue.push_back((neighbor, next_depth));
            }
        }
        Ok(ResultSet(out))
    }

    pub fn get_cursor(self) -> Result<ResultSetCursor<'txn>> {
        let items: VecDeque<RecordResult> = self.get_result()?.into_iter().collect();
        Ok(ResultSetCursor::new(self.txn, CursorPlan::Materialized(items)))
    }
}

// ============================================================================
// ShortestPathOperation
// ============================================================================

/// Builder for `shortest_path`: breadth-first search along out-edges from
/// `src` to `dst`, returning the vertices of one shortest filtered path
/// with depths `0..=L`. Ties break deterministically by adjacency order.
pub struct ShortestPathOperation<'txn> {
    txn: &'txn Transaction,
    src: RecordId,
    dst: RecordId,
    edge_filter: GraphFilter,
    vertex_filter: GraphFilter,
}

impl<'txn> std::fmt::Debug for ShortestPathOperation<'txn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortestPathOperation")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("edge_filter", &self.edge_filter)
            .field("vertex_filter", &self.vertex_filter)
            .finish()
    }
}

impl<'txn> ShortestPathOperation<'txn> {
    pub(crate) fn new(
        txn: &'txn Transaction,
        src: RecordDescriptor,
        dst: RecordDescriptor,
    ) -> Result<Self> {
        validate_vertex(txn.state(), src.rid)?;
        validate_vertex(txn.state(), dst.rid)?;
        Ok(Self {
            txn,
            src: src.rid,
            dst: dst.rid,
            edge_filter: GraphFilter::new(),
            vertex_filter: GraphFilter::new(),
        })
    }

    pub fn where_edge(mut self, filter: impl Into<GraphFilter>) -> Self {
        self.edge_filter = filter.into();
        self
    }

    pub fn where_vertex(mut self, filter: impl Into<GraphFilter>) -> Self {
        self.vertex_filter = filter.into();
        self
    }

    pub fn get_result(&self) -> Result<ResultSet> {
        let state = self.txn.state();
        validate_vertex(state, self.src)?;
        validate_vertex(state, self.dst)?;

        if self.src == self.dst {
            let record = graph::fetch_record(state, self.src)?;
            return Ok(ResultSet(vec![RecordResult::at_depth(
                RecordDescriptor::from(self.src),
                record,
                0,
            )]));
        }

        let mut edge_filter = self.edge_filter.compile(state);
        let mut vertex_filter = self.vertex_filter.compile(state);

        let mut parent: HashMap<RecordId, RecordId> = HashMap::new();
        let mut queue: VecDeque<RecordId> = VecDeque::new();
        queue.push_back(self.src);

        'bfs: while let Some(vertex) = queue.pop_front() {
            for (_, neighbor) in expand(state, vertex, Direction::Out, &mut edge_filter)? {
                if neighbor == self.src || parent.contains_key(&neighbor) {
                    continue;
                }
                // Every vertex on the path except the anchor must pass.
                if !vertex_filter.accepts(state, neighbor)? {
                    continue;
                }
                parent.insert(neighbor, vertex);
                if neighbor == self.dst {
                    break 'bfs;
                }
                queue.push_back(neighbor);
            }
        }

        if !parent.contains_key(&self.dst) {
            return Ok(ResultSet::default());
        }

        let mut path = vec![self.dst];
        let mut cursor = self.dst;
        while cursor != self.src {
            cursor = parent[&cursor];
            path.push(cursor);
        }
        path.reverse();

        let mut out = Vec::with_capacity(path.len());
        for (depth, rid) in path.into_iter().enumerate() {
            let record = graph::fetch_record(state, rid)?;
            out.push(RecordResult::at_depth(RecordDescriptor::from(rid), record, depth as u32));
        }
        Ok(ResultSet(out))
    }

    pub fn get_cursor(self) -> Result<ResultSetCursor<'txn>> {
        let items: VecDeque<RecordResult> = self.get_result()?.into_iter().collect();
        Ok(ResultSetCursor::new(self.txn, CursorPlan::Materialized(items)))
    }
}
