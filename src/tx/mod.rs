//! # Transactions
//!
//! MVCC snapshot transactions and the public operation surface.
//!
//! A [`Transaction`] pins the store epoch current at begin-time. Readers
//! share epochs freely; the single writer stages a private copy-on-write
//! state and publishes it on [`commit`](Transaction::commit). A writer sees
//! its own edits immediately; readers never see a writer's edits, committed
//! or not, until they begin a new transaction.
//!
//! Every façade operation stages against a scratch clone first, so a failed
//! operation leaves the transaction exactly as it was; the caller decides
//! whether to continue or roll back.
//!
//! `commit` and `rollback` consume the transaction; dropping one without
//! committing is a rollback.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    ClassDescriptor, ClassKind, DbInfo, IndexDescriptor, PropertyDescriptor, PropertyType, Record,
    RecordDescriptor,
};
use crate::query::{
    Direction, FindEdgeOperation, FindOperation, ShortestPathOperation, TraverseOperation,
};
use crate::storage::{Snapshot, StoreState, WriterToken};
use crate::{ContextHandle, Error, Result, graph, index, schema};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

/// A transaction over one database. Not thread-safe: one thread holds it
/// exclusively. Obtained from [`Context::begin`](crate::Context::begin).
pub struct Transaction {
    handle: ContextHandle,
    mode: TxnMode,
    snapshot: Snapshot,
    staged: Option<StoreState>,
    _writer: Option<WriterToken>,
    dirty: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn begin(handle: ContextHandle, mode: TxnMode) -> Result<Self> {
        let (writer, snapshot, staged) = match mode {
            TxnMode::ReadOnly => (None, handle.core.snapshot(), None),
            TxnMode::ReadWrite => {
                // Claim the writer slot before snapshotting so the staged
                // state starts from the newest committed epoch.
                let token = handle.core.begin_write()?;
                let snapshot = handle.core.snapshot();
                let staged = StoreState::clone(&snapshot);
                (Some(token), snapshot, Some(staged))
            }
        };
        debug!(?mode, "transaction begun");
        Ok(Self { handle, mode, snapshot, staged, _writer: writer, dirty: false })
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    /// The state this transaction reads: its staged edits for a writer,
    /// the pinned snapshot for a reader.
    pub(crate) fn state(&self) -> &StoreState {
        self.staged.as_ref().unwrap_or(&self.snapshot)
    }

    /// Run a mutation against a scratch clone; adopt it only on success.
    fn with_write<T>(
        &mut self,
        op: impl FnOnce(&mut StoreState, bool) -> Result<T>,
    ) -> Result<T> {
        let staged = self.staged.as_mut().ok_or(Error::InvalidTxnMode)?;
        let mut scratch = staged.clone();
        let out = op(&mut scratch, self.handle.settings.enable_versioning)?;
        *staged = scratch;
        self.dirty = true;
        Ok(out)
    }

    /// Publish all staged changes as a new snapshot. A failure leaves the
    /// store on its previous epoch with nothing applied.
    pub fn commit(mut self) -> Result<()> {
        if let Some(staged) = self.staged.take() {
            if self.dirty {
                self.handle.core.publish(staged)?;
            }
        }
        debug!("transaction committed");
        Ok(())
    }

    /// Discard all staged changes. Always legal.
    pub fn rollback(mut self) -> Result<()> {
        self.staged = None;
        debug!("transaction rolled back");
        Ok(())
    }

    // ========================================================================
    // Schema: classes
    // ========================================================================

    pub fn add_class(&mut self, name: &str, kind: ClassKind) -> Result<ClassDescriptor> {
        self.with_write(|state, _| schema::create_class(state, name, kind, None))
    }

    /// New class inheriting `base`'s kind, with `base` as parent.
    pub fn add_sub_class_of(&mut self, base: &str, name: &str) -> Result<ClassDescriptor> {
        self.with_write(|state, _| {
            let base = schema::class_by_name(state, base)?;
            schema::create_class(state, name, base.kind, Some(base.id))
        })
    }

    pub fn rename_class(&mut self, old: &str, new: &str) -> Result<ClassDescriptor> {
        self.with_write(|state, _| schema::rename_class(state, old, new))
    }

    /// Drop a class: its records and the records of every descendant go
    /// (each removal cascading through adjacency and indexes), its catalog
    /// rows go, and its direct children become parent-less.
    pub fn drop_class(&mut self, name: &str) -> Result<()> {
        self.with_write(|state, versioning| {
            let class = schema::class_by_name(state, name)?;
            let own_props: Vec<u16> =
                schema::own_properties(state, class.id).iter().map(|p| p.id).collect();
            if schema::all_indexes(state)
                .iter()
                .any(|i| i.class_id != class.id && own_props.contains(&i.property_id))
            {
                return Err(Error::PropertyInUse(name.to_string()));
            }

            for class_id in schema::subtree(state, class.id) {
                graph::remove_all(state, class_id, versioning)?;
            }
            for idx in schema::indexes_on_class(state, class.id) {
                index::drop_pages(state, idx.id);
            }
            graph::drop_class_maps(state, class.id);
            schema::remove_class_rows(state, &class)
        })
    }

    // ========================================================================
    // Schema: properties
    // ========================================================================

    pub fn add_property(
        &mut self,
        class: &str,
        name: &str,
        ty: PropertyType,
    ) -> Result<PropertyDescriptor> {
        self.with_write(|state, _| schema::create_property(state, class, name, ty))
    }

    pub fn rename_property(
        &mut self,
        class: &str,
        old: &str,
        new: &str,
    ) -> Result<PropertyDescriptor> {
        self.with_write(|state, _| schema::rename_property(state, class, old, new))
    }

    pub fn drop_property(&mut self, class: &str, name: &str) -> Result<()> {
        self.with_write(|state, _| schema::drop_property(state, class, name))
    }

    // ========================================================================
    // Schema: indexes
    // ========================================================================

    /// Create an index on `(class, property)` and populate it from every
    /// existing record of the class and its descendants. A uniqueness
    /// violation aborts the whole operation.
    pub fn add_index(&mut self, class: &str, property: &str, unique: bool) -> Result<IndexDescriptor> {
        self.with_write(|state, _| {
            let class = schema::class_by_name(state, class)?;
            let prop = schema::resolve_property(state, class.id, property)?;
            if !prop.ty.is_indexable() {
                return Err(Error::InvalidPropertyTypeForIndex);
            }
            let descriptor = schema::create_index_row(state, class.id, prop.id, unique)?;
            let classes = schema::subtree(state, class.id);
            index::populate(state, &descriptor, prop.ty, &classes)?;
            debug!(class = %class.name, property = %prop.name, unique, "index created");
            Ok(descriptor)
        })
    }

    pub fn drop_index(&mut self, class: &str, property: &str) -> Result<()> {
        self.with_write(|state, _| {
            let class = schema::class_by_name(state, class)?;
            let prop = schema::resolve_property(state, class.id, property)?;
            let descriptor =
                schema::index_on(state, class.id, prop.id).ok_or(Error::NoSuchIndex)?;
            schema::remove_index_row(state, descriptor.id);
            index::drop_pages(state, descriptor.id);
            Ok(())
        })
    }

    // ========================================================================
    // Schema: introspection
    // ========================================================================

    pub fn get_class(&self, name: &str) -> Result<ClassDescriptor> {
        schema::class_by_name(self.state(), name)
    }

    pub fn get_classes(&self) -> Result<Vec<ClassDescriptor>> {
        Ok(schema::all_classes(self.state()))
    }

    /// Resolve a property on a class, walking ancestors; the descriptor's
    /// `inherited` flag reports where it was found.
    pub fn get_property(&self, class: &str, name: &str) -> Result<PropertyDescriptor> {
        let state = self.state();
        let class = schema::class_by_name(state, class)?;
        schema::resolve_property(state, class.id, name)
    }

    /// Own and inherited properties of a class.
    pub fn get_properties(&self, class: &str) -> Result<Vec<PropertyDescriptor>> {
        let state = self.state();
        let class = schema::class_by_name(state, class)?;
        Ok(schema::resolved_properties(state, class.id))
    }

    pub fn get_index(&self, class: &str, property: &str) -> Result<IndexDescriptor> {
        let state = self.state();
        let class = schema::class_by_name(state, class)?;
        let prop = schema::resolve_property(state, class.id, property)?;
        schema::index_on(state, class.id, prop.id).ok_or(Error::NoSuchIndex)
    }

    pub fn get_indexes(&self, class: &str) -> Result<Vec<IndexDescriptor>> {
        let state = self.state();
        let class = schema::class_by_name(state, class)?;
        Ok(schema::indexes_on_class(state, class.id))
    }

    pub fn get_db_info(&self) -> Result<DbInfo> {
        Ok(schema::db_info(self.state(), self.handle.core.path()))
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn add_vertex(&mut self, class: &str, record: Record) -> Result<RecordDescriptor> {
        self.with_write(|state, versioning| {
            let class = schema::class_by_name(state, class)?;
            graph::create_vertex(state, &class, &record, versioning)
        })
    }

    pub fn add_edge(
        &mut self,
        class: &str,
        src: RecordDescriptor,
        dst: RecordDescriptor,
        record: Record,
    ) -> Result<RecordDescriptor> {
        self.with_write(|state, versioning| {
            let class = schema::class_by_name(state, class)?;
            graph::create_edge(state, &class, src.rid, dst.rid, &record, versioning)
        })
    }

    /// Merge `record`'s properties into the stored record.
    pub fn update(&mut self, descriptor: RecordDescriptor, record: Record) -> Result<()> {
        self.with_write(|state, versioning| {
            graph::update_record(state, descriptor.rid, &record, versioning)
        })
    }

    pub fn update_src(&mut self, edge: RecordDescriptor, src: RecordDescriptor) -> Result<()> {
        self.with_write(|state, versioning| graph::update_src(state, edge.rid, src.rid, versioning))
    }

    pub fn update_dst(&mut self, edge: RecordDescriptor, dst: RecordDescriptor) -> Result<()> {
        self.with_write(|state, versioning| graph::update_dst(state, edge.rid, dst.rid, versioning))
    }

    /// Remove a record. A vertex sheds all incident edges first.
    pub fn remove(&mut self, descriptor: RecordDescriptor) -> Result<()> {
        self.with_write(|state, versioning| graph::remove_record(state, descriptor.rid, versioning))
    }

    /// Remove every record of a class. Succeeds as a no-op on an empty
    /// class.
    pub fn remove_all(&mut self, class: &str) -> Result<()> {
        self.with_write(|state, versioning| {
            let class = schema::class_by_name(state, class)?;
            graph::remove_all(state, class.id, versioning)
        })
    }

    pub fn fetch_record(&self, descriptor: RecordDescriptor) -> Result<Record> {
        graph::fetch_record(self.state(), descriptor.rid)
    }

    /// The source vertex of an edge.
    pub fn fetch_src(&self, edge: RecordDescriptor) -> Result<Record> {
        let state = self.state();
        let (src, _) = graph::edge_endpoints(state, edge.rid)?;
        graph::fetch_record(state, src)
    }

    /// The destination vertex of an edge.
    pub fn fetch_dst(&self, edge: RecordDescriptor) -> Result<Record> {
        let state = self.state();
        let (_, dst) = graph::edge_endpoints(state, edge.rid)?;
        graph::fetch_record(state, dst)
    }

    /// Both endpoints of an edge, source first.
    pub fn fetch_src_dst(&self, edge: RecordDescriptor) -> Result<(Record, Record)> {
        let state = self.state();
        let (src, dst) = graph::edge_endpoints(state, edge.rid)?;
        Ok((graph::fetch_record(state, src)?, graph::fetch_record(state, dst)?))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Scan records of exactly this class.
    pub fn find(&self, class: &str) -> Result<FindOperation<'_>> {
        FindOperation::new(self, class, false)
    }

    /// Scan records of this class and every descendant.
    pub fn find_sub_class_of(&self, class: &str) -> Result<FindOperation<'_>> {
        FindOperation::new(self, class, true)
    }

    pub fn find_in_edge(&self, vertex: RecordDescriptor) -> Result<FindEdgeOperation<'_>> {
        FindEdgeOperation::new(self, vertex, Direction::In)
    }

    pub fn find_out_edge(&self, vertex: RecordDescriptor) -> Result<FindEdgeOperation<'_>> {
        FindEdgeOperation::new(self, vertex, Direction::Out)
    }

    pub fn find_edge(&self, vertex: RecordDescriptor) -> Result<FindEdgeOperation<'_>> {
        FindEdgeOperation::new(self, vertex, Direction::Both)
    }

    /// BFS from a vertex following both edge directions.
    pub fn traverse(&self, source: RecordDescriptor) -> Result<TraverseOperation<'_>> {
        TraverseOperation::new(self, source, Direction::Both)
    }

    /// BFS following only incoming edges.
    pub fn traverse_in(&self, source: RecordDescriptor) -> Result<TraverseOperation<'_>> {
        TraverseOperation::new(self, source, Direction::In)
    }

    /// BFS following only outgoing edges.
    pub fn traverse_out(&self, source: RecordDescriptor) -> Result<TraverseOperation<'_>> {
        TraverseOperation::new(self, source, Direction::Out)
    }

    /// One shortest filtered path from `src` to `dst` along out-edges.
    pub fn shortest_path(
        &self,
        src: RecordDescriptor,
        dst: RecordDescriptor,
    ) -> Result<ShortestPathOperation<'_>> {
        ShortestPathOperation::new(self, src, dst)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.staged.is_some() {
            debug!("transaction dropped without commit; discarding staged state");
        }
    }
}
