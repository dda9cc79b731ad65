//! # Schema Catalog
//!
//! Persistent classes, properties, and indexes over the store's catalog
//! sub-maps. Classes form a single-inheritance forest; properties resolve
//! by walking a class toward its root; indexes attach to one
//! `(class, property)` pair and cover the class's subtree.
//!
//! Catalog rows are bincode-encoded structs keyed by big-endian id, so an
//! ordered scan enumerates ids ascending and the last row carries the
//! maximum id.
//!
//! Functions here read or mutate catalog rows only. Cascades that touch
//! records, adjacency, or index pages are orchestrated by the transaction
//! over this module plus `graph` and `index`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{PropertyIdMap, PropertyNameMap};
use crate::model::{
    ClassDescriptor, ClassKind, DbInfo, IndexDescriptor, PropertyDescriptor, PropertyType,
    PropertyTypeMap,
};
use crate::model::record::is_reserved_name;
use crate::storage::{MapId, StoreState};
use crate::{Error, Result};

// ============================================================================
// Catalog rows
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassRow {
    name: String,
    kind: ClassKind,
    parent: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PropertyRow {
    class_id: u16,
    name: String,
    ty: PropertyType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRow {
    class_id: u16,
    property_id: u16,
    unique: bool,
}

fn decode_row<T: serde::de::DeserializeOwned>(raw: &[u8]) -> Result<T> {
    bincode::deserialize(raw).map_err(|e| Error::Storage(e.to_string()))
}

fn encode_row<T: Serialize>(row: &T) -> Vec<u8> {
    bincode::serialize(row).expect("catalog row serialize")
}

fn class_key(id: u16) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn property_key(id: u16) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn index_key(id: u32) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn name_ok(name: &str) -> bool {
    !name.is_empty() && !is_reserved_name(name)
}

// ============================================================================
// Class reads
// ============================================================================

pub(crate) fn all_classes(state: &StoreState) -> Vec<ClassDescriptor> {
    state
        .scan_prefix(MapId::ClassCatalog, &[])
        .filter_map(|(k, v)| {
            let id = u16::from_be_bytes(k.try_into().ok()?);
            let row: ClassRow = decode_row(v).ok()?;
            Some(ClassDescriptor { id, name: row.name, kind: row.kind, parent: row.parent })
        })
        .collect()
}

pub(crate) fn class_by_id(state: &StoreState, id: u16) -> Result<ClassDescriptor> {
    let raw = state
        .get(MapId::ClassCatalog, &class_key(id))
        .ok_or_else(|| Error::NoSuchClass(format!("#{id}")))?;
    let row: ClassRow = decode_row(raw)?;
    Ok(ClassDescriptor { id, name: row.name, kind: row.kind, parent: row.parent })
}

pub(crate) fn try_class_by_name(state: &StoreState, name: &str) -> Option<ClassDescriptor> {
    all_classes(state).into_iter().find(|c| c.name == name)
}

pub(crate) fn class_by_name(state: &StoreState, name: &str) -> Result<ClassDescriptor> {
    try_class_by_name(state, name).ok_or_else(|| Error::NoSuchClass(name.to_string()))
}

/// The class plus every descendant, root first.
pub(crate) fn subtree(state: &StoreState, root: u16) -> Vec<u16> {
    let classes = all_classes(state);
    let mut result = vec![root];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for c in classes.iter().filter(|c| c.parent == Some(parent)) {
            result.push(c.id);
            frontier.push(c.id);
        }
    }
    result
}

/// Ancestors of a class, nearest first, excluding the class itself.
pub(crate) fn ancestors(state: &StoreState, id: u16) -> Vec<u16> {
    let mut result = Vec::new();
    let mut cursor = class_by_id(state, id).ok().and_then(|c| c.parent);
    while let Some(parent) = cursor {
        result.push(parent);
        cursor = class_by_id(state, parent).ok().and_then(|c| c.parent);
    }
    result
}

// ============================================================================
// Property reads
// ============================================================================

fn all_properties(state: &StoreState) -> Vec<(u16, PropertyRow)> {
    state
        .scan_prefix(MapId::PropertyCatalog, &[])
        .filter_map(|(k, v)| {
            let id = u16::from_be_bytes(k.try_into().ok()?);
            Some((id, decode_row::<PropertyRow>(v).ok()?))
        })
        .collect()
}

/// Properties declared directly on the class.
pub(crate) fn own_properties(state: &StoreState, class_id: u16) -> Vec<PropertyDescriptor> {
    all_properties(state)
        .into_iter()
        .filter(|(_, row)| row.class_id == class_id)
        .map(|(id, row)| PropertyDescriptor { id, name: row.name, ty: row.ty, inherited: false })
        .collect()
}

/// Own properties plus every inherited one, walking the class toward its
/// root. The name guard keeps the nearest declaration should a stored
/// catalog ever carry an axis duplicate.
pub(crate) fn resolved_properties(state: &StoreState, class_id: u16) -> Vec<PropertyDescriptor> {
    let mut result = own_properties(state, class_id);
    for ancestor in ancestors(state, class_id) {
        for prop in own_properties(state, ancestor) {
            if !result.iter().any(|p| p.name == prop.name) {
                result.push(PropertyDescriptor { inherited: true, ..prop });
            }
        }
    }
    result
}

/// Resolve one property name on a class, walking ancestors.
pub(crate) fn resolve_property(
    state: &StoreState,
    class_id: u16,
    name: &str,
) -> Result<PropertyDescriptor> {
    resolved_properties(state, class_id)
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::NoSuchProperty(name.to_string()))
}

pub(crate) fn property_name_map(state: &StoreState, class_id: u16) -> PropertyNameMap {
    resolved_properties(state, class_id)
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect()
}

pub(crate) fn property_id_map(state: &StoreState, class_id: u16) -> PropertyIdMap {
    resolved_properties(state, class_id)
        .into_iter()
        .map(|p| (p.id, (p.name, p.ty)))
        .collect()
}

pub(crate) fn property_type_map(state: &StoreState, class_id: u16) -> PropertyTypeMap {
    resolved_properties(state, class_id)
        .into_iter()
        .map(|p| (p.name, p.ty))
        .collect()
}

fn property_row(state: &StoreState, property_id: u16) -> Result<PropertyRow> {
    let raw = state
        .get(MapId::PropertyCatalog, &property_key(property_id))
        .ok_or_else(|| Error::NoSuchProperty(format!("#{property_id}")))?;
    decode_row(raw)
}

pub(crate) fn property_type_by_id(state: &StoreState, property_id: u16) -> Result<PropertyType> {
    Ok(property_row(state, property_id)?.ty)
}

// ============================================================================
// Index reads
// ============================================================================

pub(crate) fn all_indexes(state: &StoreState) -> Vec<IndexDescriptor> {
    state
        .scan_prefix(MapId::IndexCatalog, &[])
        .filter_map(|(k, v)| {
            let id = u32::from_be_bytes(k.try_into().ok()?);
            let row: IndexRow = decode_row(v).ok()?;
            Some(IndexDescriptor {
                id,
                class_id: row.class_id,
                property_id: row.property_id,
                unique: row.unique,
            })
        })
        .collect()
}

pub(crate) fn indexes_on_class(state: &StoreState, class_id: u16) -> Vec<IndexDescriptor> {
    all_indexes(state).into_iter().filter(|i| i.class_id == class_id).collect()
}

/// Indexes that must be maintained for a record of `class_id`: its own
/// class's indexes plus any ancestor's (an ancestor index covers the
/// subtree).
pub(crate) fn applicable_indexes(state: &StoreState, class_id: u16) -> Vec<IndexDescriptor> {
    let mut scope = vec![class_id];
    scope.extend(ancestors(state, class_id));
    all_indexes(state)
        .into_iter()
        .filter(|i| scope.contains(&i.class_id))
        .collect()
}

pub(crate) fn index_on(
    state: &StoreState,
    class_id: u16,
    property_id: u16,
) -> Option<IndexDescriptor> {
    all_indexes(state)
        .into_iter()
        .find(|i| i.class_id == class_id && i.property_id == property_id)
}

// ============================================================================
// DbInfo
// ============================================================================

pub(crate) fn db_info(state: &StoreState, path: &Path) -> DbInfo {
    let max_be2 = |map: MapId| {
        state
            .map(map)
            .and_then(|m| m.keys().next_back())
            .and_then(|k| Some(u16::from_be_bytes(k.as_slice().try_into().ok()?)))
            .unwrap_or(0)
    };
    let max_index_id = state
        .map(MapId::IndexCatalog)
        .and_then(|m| m.keys().next_back())
        .and_then(|k| Some(u32::from_be_bytes(k.as_slice().try_into().ok()?)))
        .unwrap_or(0);
    DbInfo {
        db_path: path.to_path_buf(),
        num_class: state.map(MapId::ClassCatalog).map_or(0, |m| m.len() as u32),
        num_property: state.map(MapId::PropertyCatalog).map_or(0, |m| m.len() as u32),
        num_index: state.map(MapId::IndexCatalog).map_or(0, |m| m.len() as u32),
        max_class_id: max_be2(MapId::ClassCatalog),
        max_property_id: max_be2(MapId::PropertyCatalog),
        max_index_id,
    }
}

// ============================================================================
// Class writes
// ============================================================================

fn next_class_id(state: &StoreState) -> u16 {
    db_info_max_class_id(state) + 1
}

fn db_info_max_class_id(state: &StoreState) -> u16 {
    state
        .map(MapId::ClassCatalog)
        .and_then(|m| m.keys().next_back())
        .and_then(|k| Some(u16::from_be_bytes(k.as_slice().try_into().ok()?)))
        .unwrap_or(0)
}

fn put_class_row(state: &mut StoreState, id: u16, row: &ClassRow) {
    state.put(MapId::ClassCatalog, class_key(id), encode_row(row));
}

pub(crate) fn create_class(
    state: &mut StoreState,
    name: &str,
    kind: ClassKind,
    parent: Option<u16>,
) -> Result<ClassDescriptor> {
    if !name_ok(name) {
        return Err(Error::InvalidClassName);
    }
    if try_class_by_name(state, name).is_some() {
        return Err(Error::DuplicateClass(name.to_string()));
    }
    let id = next_class_id(state);
    put_class_row(state, id, &ClassRow { name: name.to_string(), kind, parent });
    debug!(class = name, id, ?kind, "class created");
    Ok(ClassDescriptor { id, name: name.to_string(), kind, parent })
}

pub(crate) fn rename_class(state: &mut StoreState, old: &str, new: &str) -> Result<ClassDescriptor> {
    if !name_ok(new) {
        return Err(Error::InvalidClassName);
    }
    let class = class_by_name(state, old)?;
    if old == new {
        return Ok(class);
    }
    if try_class_by_name(state, new).is_some() {
        return Err(Error::DuplicateClass(new.to_string()));
    }
    let row = ClassRow { name: new.to_string(), kind: class.kind, parent: class.parent };
    put_class_row(state, class.id, &row);
    debug!(old, new, id = class.id, "class renamed");
    Ok(ClassDescriptor { id: class.id, name: new.to_string(), kind: class.kind, parent: class.parent })
}

/// Remove the class's catalog rows: the class row, its property rows, and
/// its index rows. Direct children become parent-less.
pub(crate) fn remove_class_rows(state: &mut StoreState, class: &ClassDescriptor) -> Result<()> {
    for prop in own_properties(state, class.id) {
        state.delete(MapId::PropertyCatalog, &property_key(prop.id));
    }
    for index in indexes_on_class(state, class.id) {
        state.delete(MapId::IndexCatalog, &index_key(index.id));
    }
    for child in all_classes(state).into_iter().filter(|c| c.parent == Some(class.id)) {
        put_class_row(
            state,
            child.id,
            &ClassRow { name: child.name, kind: child.kind, parent: None },
        );
    }
    state.delete(MapId::ClassCatalog, &class_key(class.id));
    debug!(class = %class.name, id = class.id, "class dropped");
    Ok(())
}

// ============================================================================
// Property writes
// ============================================================================

fn next_property_id(state: &StoreState) -> u16 {
    state
        .map(MapId::PropertyCatalog)
        .and_then(|m| m.keys().next_back())
        .and_then(|k| Some(u16::from_be_bytes(k.as_slice().try_into().ok()?)))
        .unwrap_or(0)
        + 1
}

/// Reject a name that collides along the ancestor-descendant axis.
///
/// Any clash with an ancestor or a descendant is rejected, whatever the
/// declared types: a same-typed ancestor clash is a duplicate, everything
/// else on the axis is an override. Sibling classes never conflict.
fn check_property_name(
    state: &StoreState,
    class_id: u16,
    name: &str,
    ty: PropertyType,
) -> Result<()> {
    for prop in own_properties(state, class_id) {
        if prop.name == name {
            return Err(Error::DuplicateProperty(name.to_string()));
        }
    }
    for ancestor in ancestors(state, class_id) {
        for prop in own_properties(state, ancestor) {
            if prop.name == name {
                return Err(if prop.ty == ty {
                    Error::DuplicateProperty(name.to_string())
                } else {
                    Error::OverrideProperty(name.to_string())
                });
            }
        }
    }
    for descendant in subtree(state, class_id).into_iter().skip(1) {
        for prop in own_properties(state, descendant) {
            if prop.name == name {
                return Err(Error::OverrideProperty(name.to_string()));
            }
        }
    }
    Ok(())
}

pub(crate) fn create_property(
    state: &mut StoreState,
    class_name: &str,
    name: &str,
    ty: PropertyType,
) -> Result<PropertyDescriptor> {
    if !name_ok(name) {
        return Err(Error::InvalidPropertyName);
    }
    let class = class_by_name(state, class_name)?;
    check_property_name(state, class.id, name, ty)?;
    let id = next_property_id(state);
    state.put(
        MapId::PropertyCatalog,
        property_key(id),
        encode_row(&PropertyRow { class_id: class.id, name: name.to_string(), ty }),
    );
    debug!(class = class_name, property = name, id, ?ty, "property created");
    Ok(PropertyDescriptor { id, name: name.to_string(), ty, inherited: false })
}

pub(crate) fn drop_property(state: &mut StoreState, class_name: &str, name: &str) -> Result<()> {
    let class = class_by_name(state, class_name)?;
    let prop = own_properties(state, class.id)
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::NoSuchProperty(name.to_string()))?;
    if all_indexes(state).iter().any(|i| i.property_id == prop.id) {
        return Err(Error::PropertyInUse(name.to_string()));
    }
    state.delete(MapId::PropertyCatalog, &property_key(prop.id));
    debug!(class = class_name, property = name, "property dropped");
    Ok(())
}

pub(crate) fn rename_property(
    state: &mut StoreState,
    class_name: &str,
    old: &str,
    new: &str,
) -> Result<PropertyDescriptor> {
    if !name_ok(new) {
        return Err(Error::InvalidPropertyName);
    }
    let class = class_by_name(state, class_name)?;
    let prop = own_properties(state, class.id)
        .into_iter()
        .find(|p| p.name == old)
        .ok_or_else(|| Error::NoSuchProperty(old.to_string()))?;
    check_property_name(state, class.id, new, prop.ty)?;
    state.put(
        MapId::PropertyCatalog,
        property_key(prop.id),
        encode_row(&PropertyRow { class_id: class.id, name: new.to_string(), ty: prop.ty }),
    );
    debug!(class = class_name, old, new, "property renamed");
    Ok(PropertyDescriptor { id: prop.id, name: new.to_string(), ty: prop.ty, inherited: false })
}

// ============================================================================
// Index catalog writes
// ============================================================================

fn next_index_id(state: &StoreState) -> u32 {
    state
        .map(MapId::IndexCatalog)
        .and_then(|m| m.keys().next_back())
        .and_then(|k| Some(u32::from_be_bytes(k.as_slice().try_into().ok()?)))
        .unwrap_or(0)
        + 1
}

/// Catalog row only; the data pages are populated by `index::populate`.
pub(crate) fn create_index_row(
    state: &mut StoreState,
    class_id: u16,
    property_id: u16,
    unique: bool,
) -> Result<IndexDescriptor> {
    if index_on(state, class_id, property_id).is_some() {
        return Err(Error::DuplicateIndex);
    }
    let id = next_index_id(state);
    state.put(
        MapId::IndexCatalog,
        index_key(id),
        encode_row(&IndexRow { class_id, property_id, unique }),
    );
    Ok(IndexDescriptor { id, class_id, property_id, unique })
}

pub(crate) fn remove_index_row(state: &mut StoreState, index_id: u32) {
    state.delete(MapId::IndexCatalog, &index_key(index_id));
}
