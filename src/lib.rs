//! # nogdb-rs — Clean Rust Embedded Graph Database
//!
//! A reimplementation of NogDB's typed property-graph model in Rust:
//! classes with single inheritance, typed properties, vertices and edges
//! with bidirectional adjacency, unique and non-unique secondary indexes,
//! and MVCC snapshot transactions, all in-process over one on-disk store.
//!
//! ## Design Principles
//!
//! 1. **Clean DTOs**: `Record`, `Bytes`, and the descriptors cross all boundaries
//! 2. **Everything through the store adapter**: the engine persists only via
//!    named ordered sub-maps with snapshot reads and atomic commit
//! 3. **Snapshot isolation**: many readers, one writer, nobody blocks reads
//! 4. **Queries read the same snapshot** the transaction was born with
//!
//! ## Quick Start
//!
//! ```rust
//! use nogdb_rs::{ClassKind, Condition, Context, PropertyType, Record, TxnMode};
//!
//! # fn example() -> nogdb_rs::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let ctx = Context::open(dir.path().join("graph.db"))?;
//!
//! let mut txn = ctx.begin(TxnMode::ReadWrite)?;
//! txn.add_class("Person", ClassKind::Vertex)?;
//! txn.add_property("Person", "name", PropertyType::Text)?;
//! txn.add_class("Knows", ClassKind::Edge)?;
//!
//! let ada = txn.add_vertex("Person", Record::new().set("name", "Ada"))?;
//! let brian = txn.add_vertex("Person", Record::new().set("name", "Brian"))?;
//! txn.add_edge("Knows", ada, brian, Record::new())?;
//! txn.commit()?;
//!
//! let txn = ctx.begin(TxnMode::ReadOnly)?;
//! let found = txn.find("Person")?.filter(Condition::new("name").eq("Ada")).get_result()?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod codec;
pub mod graph;
pub mod index;
pub mod model;
pub mod query;
pub mod schema;
pub mod storage;
pub mod tx;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Bytes, ClassDescriptor, ClassKind, DbInfo, IndexDescriptor, PropertyDescriptor, PropertyType,
    PropertyTypeMap, Record, RecordDescriptor, RecordId,
};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxnMode};

// ============================================================================
// Re-exports: Query surface
// ============================================================================

pub use query::{Condition, FilterExpr, GraphFilter, RecordResult, ResultSet, ResultSetCursor};

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

// ============================================================================
// Context
// ============================================================================

/// Database-level settings fixed at open time.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// When off, record versions stay `0` instead of counting mutations.
    pub enable_versioning: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { enable_versioning: true }
    }
}

#[derive(Clone)]
pub(crate) struct ContextHandle {
    pub(crate) core: std::sync::Arc<storage::StoreCore>,
    pub(crate) settings: Settings,
}

/// The primary entry point: owns the store handle for one database path and
/// spawns transactions. Thread-safe; a `Context` may be shared across
/// threads, but each [`Transaction`] belongs to one thread.
///
/// Opening the same path twice (even from two `Context` values) attaches to
/// the same underlying store, coordinated by its transactional primitives.
pub struct Context {
    handle: RwLock<Option<ContextHandle>>,
}

impl Context {
    /// Open (or create) the database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Settings::default())
    }

    /// Open (or create) the database at `path`.
    pub fn open_with(path: impl AsRef<Path>, settings: Settings) -> Result<Self> {
        let core = storage::open(path.as_ref())?;
        debug!(path = %core.path().display(), "context opened");
        Ok(Self { handle: RwLock::new(Some(ContextHandle { core, settings })) })
    }

    /// Begin a transaction bound to the current snapshot.
    pub fn begin(&self, mode: TxnMode) -> Result<Transaction> {
        let handle = self.handle()?;
        Transaction::begin(handle, mode)
    }

    /// The database path this context is bound to.
    pub fn path(&self) -> Result<PathBuf> {
        Ok(self.handle()?.core.path().to_path_buf())
    }

    /// Schema catalog summary as of the current snapshot.
    pub fn db_info(&self) -> Result<DbInfo> {
        self.begin(TxnMode::ReadOnly)?.get_db_info()
    }

    /// Release the store handle. Every later operation on this context
    /// reports [`Error::ClosedContext`] instead of touching the store.
    pub fn close(&self) {
        if let Some(handle) = self.handle.write().take() {
            debug!(path = %handle.core.path().display(), "context closed");
        }
    }

    fn handle(&self) -> Result<ContextHandle> {
        self.handle.read().clone().ok_or(Error::ClosedContext)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Every failure the engine can report. [`Error::code`] yields the stable
/// error-code string callers and tests match on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid class name")]
    InvalidClassName,

    #[error("invalid class type")]
    InvalidClassType,

    #[error("invalid property name")]
    InvalidPropertyName,

    #[error("invalid property type")]
    InvalidPropertyType,

    #[error("property type cannot be indexed")]
    InvalidPropertyTypeForIndex,

    #[error("unique index constraint violation")]
    IndexConstraintViolation,

    #[error("comparator is invalid for the property type")]
    InvalidComparator,

    #[error("a class named `{0}` already exists")]
    DuplicateClass(String),

    #[error("a property named `{0}` already exists on the class")]
    DuplicateProperty(String),

    #[error("an index already exists on the property")]
    DuplicateIndex,

    #[error("property `{0}` clashes with an inherited property")]
    OverrideProperty(String),

    #[error("class `{0}` does not exist")]
    NoSuchClass(String),

    #[error("property `{0}` does not exist")]
    NoSuchProperty(String),

    #[error("no index on the property")]
    NoSuchIndex,

    #[error("record does not exist")]
    NoSuchRecord,

    #[error("class `{0}` has the wrong kind for this operation")]
    MismatchClassType(String),

    #[error("property `{0}` is in use by an index")]
    PropertyInUse(String),

    #[error("source or seed vertex does not exist")]
    NoSuchVertex,

    #[error("edge source vertex does not exist")]
    NoSuchSource,

    #[error("edge destination vertex does not exist")]
    NoSuchDestination,

    #[error("operation requires a read-write transaction")]
    InvalidTxnMode,

    #[error("another read-write transaction is live")]
    WriterBusy,

    #[error("context is closed")]
    ClosedContext,

    #[error("stored record bytes are corrupt")]
    CorruptRecord,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error-code string for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidClassName => "CTX_INVALID_CLASSNAME",
            Error::InvalidClassType => "CTX_INVALID_CLASSTYPE",
            Error::InvalidPropertyName => "CTX_INVALID_PROPERTYNAME",
            Error::InvalidPropertyType => "CTX_INVALID_PROPTYPE",
            Error::InvalidPropertyTypeForIndex => "CTX_INVALID_PROPTYPE_INDEX",
            Error::IndexConstraintViolation => "CTX_INVALID_INDEX_CONSTRAINT",
            Error::InvalidComparator => "CTX_INVALID_COMPARATOR",
            Error::DuplicateClass(_) => "CTX_DUPLICATE_CLASS",
            Error::DuplicateProperty(_) => "CTX_DUPLICATE_PROPERTY",
            Error::DuplicateIndex => "CTX_DUPLICATE_INDEX",
            Error::OverrideProperty(_) => "CTX_OVERRIDE_PROPERTY",
            Error::NoSuchClass(_) => "CTX_NOEXST_CLASS",
            Error::NoSuchProperty(_) => "CTX_NOEXST_PROPERTY",
            Error::NoSuchIndex => "CTX_NOEXST_INDEX",
            Error::NoSuchRecord => "CTX_NOEXST_RECORD",
            Error::MismatchClassType(_) => "CTX_MISMATCH_CLASSTYPE",
            Error::PropertyInUse(_) => "CTX_IN_USED_PROPERTY",
            Error::NoSuchVertex => "GRAPH_NOEXST_VERTEX",
            Error::NoSuchSource => "GRAPH_NOEXST_SRC",
            Error::NoSuchDestination => "GRAPH_NOEXST_DST",
            Error::InvalidTxnMode => "TXN_INVALID_MODE",
            Error::WriterBusy => "TXN_BUSY",
            Error::ClosedContext => "CTX_CLOSED",
            Error::CorruptRecord => "CTX_CORRUPT_RECORD",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
