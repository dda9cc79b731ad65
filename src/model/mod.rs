//! # Property Graph Model
//!
//! Clean DTOs that define the typed property-graph surface.
//! These types cross every boundary: storage ↔ schema ↔ transaction ↔ user.
//!
//! Design rule: NO storage types, NO catalog state here.
//! This module is pure data — no I/O, no locks.

pub mod bytes;
pub mod descriptor;
pub mod record;

pub use bytes::Bytes;
pub use descriptor::{
    ClassDescriptor, ClassKind, DbInfo, IndexDescriptor, PropertyDescriptor, PropertyType,
    RecordDescriptor, RecordId,
};
pub use record::{PropertyTypeMap, Record};
