//! Schema and record descriptors.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of a stored record: the owning class plus the position
/// within that class's record table. Stable for the record's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub class_id: u16,
    pub position_id: i64,
}

impl RecordId {
    pub const fn new(class_id: u16, position_id: i64) -> Self {
        Self { class_id, position_id }
    }

    /// Position `-1` is the reserved "no record" sentinel.
    pub fn is_valid(&self) -> bool {
        self.position_id >= 1
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.class_id, self.position_id)
    }
}

/// User-visible handle to a record. Wraps the [`RecordId`]; every record
/// operation on a transaction takes or returns one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub rid: RecordId,
}

impl RecordDescriptor {
    pub const fn new(class_id: u16, position_id: i64) -> Self {
        Self { rid: RecordId::new(class_id, position_id) }
    }
}

impl From<RecordId> for RecordDescriptor {
    fn from(rid: RecordId) -> Self {
        Self { rid }
    }
}

impl fmt::Display for RecordDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rid)
    }
}

/// Whether a class partitions vertex records or edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    Vertex,
    Edge,
}

/// Scalar property types. Fixed-width integers are stored little-endian;
/// `Text` is UTF-8; `Blob` is an opaque byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    TinyInt,
    UnsignedTinyInt,
    SmallInt,
    UnsignedSmallInt,
    Integer,
    UnsignedInteger,
    BigInt,
    UnsignedBigInt,
    Real,
    Text,
    Blob,
}

impl PropertyType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, PropertyType::Text | PropertyType::Blob)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, PropertyType::Text)
    }

    /// Blob values have no defined sort order, so they cannot be indexed.
    pub fn is_indexable(&self) -> bool {
        !matches!(self, PropertyType::Blob)
    }
}

/// A class in the schema catalog. `parent` links single-inheritance
/// hierarchies; the parent graph is a forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub id: u16,
    pub name: String,
    pub kind: ClassKind,
    pub parent: Option<u16>,
}

/// A typed property declared on a class. `inherited` is set when the
/// descriptor was resolved through an ancestor rather than the class itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub id: u16,
    pub name: String,
    pub ty: PropertyType,
    pub inherited: bool,
}

/// A secondary index over one `(class, property)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub id: u32,
    pub class_id: u16,
    pub property_id: u16,
    pub unique: bool,
}

/// Snapshot summary of the schema catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfo {
    pub db_path: PathBuf,
    pub num_class: u32,
    pub num_property: u32,
    pub num_index: u32,
    pub max_class_id: u16,
    pub max_property_id: u16,
    pub max_index_id: u32,
}
