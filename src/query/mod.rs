//! # Query Engine
//!
//! Filter evaluation and the graph query operators, layered over the
//! snapshot a transaction is bound to:
//!
//! * [`Condition`] / [`FilterExpr`] — property comparators composed with
//!   `&`, `|`, `!`, plus opaque record predicates
//! * [`GraphFilter`] — class restriction + filter tree for traversal steps
//! * [`FindOperation`] / [`FindEdgeOperation`] — class scans (index
//!   accelerated where a single-leaf condition hits an index) and
//!   adjacency scans
//! * [`TraverseOperation`] / [`ShortestPathOperation`] — BFS expansion and
//!   BFS shortest path
//!
//! Every operation finishes with `get_result()` (materialized) or
//! `get_cursor()` (lazy, forward-only).

pub mod condition;
pub mod filter;
pub mod find;
pub mod result;
pub mod traverse;

pub use condition::{Condition, FilterExpr, RecordPredicate};
pub use filter::GraphFilter;
pub use find::{FindEdgeOperation, FindOperation};
pub use result::{RecordResult, ResultSet, ResultSetCursor};
pub use traverse::{ShortestPathOperation, TraverseOperation};

use crate::model::{ClassKind, RecordId};
use crate::storage::StoreState;
use crate::{Error, Result, graph, schema};

/// Which adjacency side a scan or traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// A rid handed directly to a graph operation must name a live vertex:
/// unknown class, wrong kind, and missing record are distinct errors.
pub(crate) fn validate_vertex(state: &StoreState, rid: RecordId) -> Result<()> {
    let class = schema::class_by_id(state, rid.class_id)?;
    if class.kind != ClassKind::Vertex {
        return Err(Error::MismatchClassType(class.name));
    }
    if !graph::record_exists(state, rid) {
        return Err(Error::NoSuchVertex);
    }
    Ok(())
}
