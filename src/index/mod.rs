//! # Index Engine
//!
//! Unique and non-unique secondary indexes over one `(class, property)`
//! pair, stored as ordered sub-maps whose key order equals value order:
//!
//! * signed integers: sign bit flipped, big-endian
//! * unsigned integers: big-endian
//! * reals: IEEE-754 total-order transform, big-endian
//! * text: byte-escaped UTF-8 with a `0x00` terminator
//!
//! A unique index maps `encoded value → rid`; a non-unique index maps
//! `encoded value ++ rid → ()` and enumerates by prefix. Blob properties
//! have no order and cannot be indexed.

use std::ops::Bound;

use smallvec::SmallVec;

use crate::codec::extract_property;
use crate::model::{Bytes, IndexDescriptor, PropertyType, RecordId};
use crate::schema;
use crate::storage::{MapId, StoreState, prefix_end};
use crate::{Error, Result};

// ============================================================================
// Order-preserving key encoding
// ============================================================================

/// Encode a raw property value as an index key fragment whose byte order
/// matches the value order of `ty`.
pub(crate) fn encode_key(raw: &Bytes, ty: PropertyType) -> Result<Vec<u8>> {
    let mut key: SmallVec<[u8; 16]> = SmallVec::new();
    match ty {
        PropertyType::TinyInt => key.push((raw.to_tiny_int()? as u8) ^ 0x80),
        PropertyType::UnsignedTinyInt => key.push(raw.to_tiny_int_u()?),
        PropertyType::SmallInt => {
            key.extend_from_slice(&((raw.to_small_int()? as u16) ^ 0x8000).to_be_bytes())
        }
        PropertyType::UnsignedSmallInt => {
            key.extend_from_slice(&raw.to_small_int_u()?.to_be_bytes())
        }
        PropertyType::Integer => {
            key.extend_from_slice(&((raw.to_int()? as u32) ^ 0x8000_0000).to_be_bytes())
        }
        PropertyType::UnsignedInteger => key.extend_from_slice(&raw.to_int_u()?.to_be_bytes()),
        PropertyType::BigInt => {
            key.extend_from_slice(&((raw.to_big_int()? as u64) ^ (1 << 63)).to_be_bytes())
        }
        PropertyType::UnsignedBigInt => key.extend_from_slice(&raw.to_big_int_u()?.to_be_bytes()),
        PropertyType::Real => {
            let bits = raw.to_real()?.to_bits();
            // Total order: negative reals flip entirely, others flip the sign.
            let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
            key.extend_from_slice(&ordered.to_be_bytes());
        }
        PropertyType::Text => {
            // 0x00 escapes to 0x00 0xff so the 0x00 terminator stays
            // unambiguous and shorter strings sort first.
            for &b in raw.as_raw() {
                key.push(b);
                if b == 0x00 {
                    key.push(0xff);
                }
            }
            key.push(0x00);
        }
        PropertyType::Blob => return Err(Error::InvalidPropertyTypeForIndex),
    }
    Ok(key.into_vec())
}

const RID_LEN: usize = 10;

fn encode_rid(rid: RecordId) -> [u8; RID_LEN] {
    let mut buf = [0u8; RID_LEN];
    buf[..2].copy_from_slice(&rid.class_id.to_be_bytes());
    buf[2..].copy_from_slice(&(rid.position_id as u64).to_be_bytes());
    buf
}

fn decode_rid(raw: &[u8]) -> Result<RecordId> {
    if raw.len() != RID_LEN {
        return Err(Error::CorruptRecord);
    }
    let class_id = u16::from_be_bytes(raw[..2].try_into().expect("rid class bytes"));
    let position_id = u64::from_be_bytes(raw[2..].try_into().expect("rid position bytes")) as i64;
    Ok(RecordId::new(class_id, position_id))
}

// ============================================================================
// Maintenance
// ============================================================================

fn insert_entry(
    state: &mut StoreState,
    index: &IndexDescriptor,
    key: Vec<u8>,
    rid: RecordId,
) -> Result<()> {
    let map = MapId::Index(index.id);
    if index.unique {
        if state.contains(map, &key) {
            return Err(Error::IndexConstraintViolation);
        }
        state.put(map, key, encode_rid(rid).to_vec());
    } else {
        let mut full = key;
        full.extend_from_slice(&encode_rid(rid));
        state.put(map, full, Vec::new());
    }
    Ok(())
}

fn remove_entry(state: &mut StoreState, index: &IndexDescriptor, key: Vec<u8>, rid: RecordId) {
    let map = MapId::Index(index.id);
    if index.unique {
        state.delete(map, &key);
    } else {
        let mut full = key;
        full.extend_from_slice(&encode_rid(rid));
        state.delete(map, &full);
    }
}

/// Re-point every index applicable to `rid`'s class from the old bundle's
/// value to the new bundle's. `None` stands for "record absent" on either
/// side (creation or removal). Runs inside the writer's staged state, so a
/// failure (unique collision) leaves nothing half-applied once the caller
/// abandons the staged operation.
pub(crate) fn maintain(
    state: &mut StoreState,
    rid: RecordId,
    old_bundle: Option<&[u8]>,
    new_bundle: Option<&[u8]>,
) -> Result<()> {
    let indexes = schema::applicable_indexes(state, rid.class_id);
    for index in indexes {
        let ty = schema::property_type_by_id(state, index.property_id)?;
        let old_value = match old_bundle {
            Some(bundle) => extract_property(bundle, index.property_id)?,
            None => None,
        };
        let new_value = match new_bundle {
            Some(bundle) => extract_property(bundle, index.property_id)?,
            None => None,
        };
        if old_value == new_value {
            continue;
        }
        if let Some(value) = old_value {
            remove_entry(state, &index, encode_key(&value, ty)?, rid);
        }
        if let Some(value) = new_value {
            insert_entry(state, &index, encode_key(&value, ty)?, rid)?;
        }
    }
    Ok(())
}

/// Build the data pages of a fresh index from every existing record of the
/// indexed class and its descendants.
pub(crate) fn populate(
    state: &mut StoreState,
    index: &IndexDescriptor,
    ty: PropertyType,
    class_ids: &[u16],
) -> Result<()> {
    for &class_id in class_ids {
        let entries: Vec<(RecordId, Bytes)> = {
            let Some(records) = state.map(MapId::Records(class_id)) else { continue };
            let mut out = Vec::new();
            for (key, payload) in records.iter() {
                let position = u64::from_be_bytes(
                    key.as_slice().try_into().map_err(|_| Error::CorruptRecord)?,
                ) as i64;
                let bundle = record_bundle(state, class_id, payload)?;
                if let Some(value) = extract_property(bundle, index.property_id)? {
                    out.push((RecordId::new(class_id, position), value));
                }
            }
            out
        };
        for (rid, value) in entries {
            insert_entry(state, index, encode_key(&value, ty)?, rid)?;
        }
    }
    Ok(())
}

/// Slice the property bundle out of a stored payload without copying.
fn record_bundle<'a>(state: &StoreState, class_id: u16, payload: &'a [u8]) -> Result<&'a [u8]> {
    let class = schema::class_by_id(state, class_id)?;
    let header = match class.kind {
        crate::model::ClassKind::Vertex => 8,
        crate::model::ClassKind::Edge => 28,
    };
    payload.get(header..).ok_or(Error::CorruptRecord)
}

/// Drop an index's data pages.
pub(crate) fn drop_pages(state: &mut StoreState, index_id: u32) {
    state.drop_map(MapId::Index(index_id));
}

// ============================================================================
// Lookup
// ============================================================================

/// A bounded scan over one index, expressed in raw property values.
pub(crate) enum IndexQuery {
    Eq(Bytes),
    /// Half-open comparisons: bound value plus inclusivity.
    Lower(Bytes, bool),
    Upper(Bytes, bool),
    Between { lo: Bytes, hi: Bytes, bounds: (bool, bool) },
    In(Vec<Bytes>),
}

/// Run a query against one index. Results come back in key order; callers
/// filter by class scope.
pub(crate) fn lookup(
    state: &StoreState,
    index: &IndexDescriptor,
    ty: PropertyType,
    query: &IndexQuery,
) -> Result<Vec<RecordId>> {
    match query {
        IndexQuery::Eq(value) => lookup_eq(state, index, encode_key(value, ty)?),
        IndexQuery::In(values) => {
            let mut out = Vec::new();
            for value in values {
                out.extend(lookup_eq(state, index, encode_key(value, ty)?)?);
            }
            Ok(out)
        }
        IndexQuery::Lower(value, inclusive) => {
            lookup_range(state, index, Some((encode_key(value, ty)?, *inclusive)), None)
        }
        IndexQuery::Upper(value, inclusive) => {
            lookup_range(state, index, None, Some((encode_key(value, ty)?, *inclusive)))
        }
        IndexQuery::Between { lo, hi, bounds } => lookup_range(
            state,
            index,
            Some((encode_key(lo, ty)?, bounds.0)),
            Some((encode_key(hi, ty)?, bounds.1)),
        ),
    }
}

fn lookup_eq(state: &StoreState, index: &IndexDescriptor, key: Vec<u8>) -> Result<Vec<RecordId>> {
    let map = MapId::Index(index.id);
    if index.unique {
        return match state.get(map, &key) {
            Some(raw) => Ok(vec![decode_rid(raw)?]),
            None => Ok(vec![]),
        };
    }
    let mut out = Vec::new();
    for (full, _) in state.scan_prefix(map, &key) {
        // Exact-value entries are precisely prefix + rid; anything longer
        // belongs to a value this key merely prefixes.
        if full.len() == key.len() + RID_LEN {
            out.push(decode_rid(&full[key.len()..])?);
        }
    }
    Ok(out)
}

fn lookup_range(
    state: &StoreState,
    index: &IndexDescriptor,
    lower: Option<(Vec<u8>, bool)>,
    upper: Option<(Vec<u8>, bool)>,
) -> Result<Vec<RecordId>> {
    let Some(map) = state.map(MapId::Index(index.id)) else {
        return Ok(vec![]);
    };

    // Conservative scan window; exact value-part comparison below makes the
    // bounds precise even where encoded values interleave with rid bytes.
    let start: Bound<Vec<u8>> = match &lower {
        Some((key, _)) => Bound::Included(key.clone()),
        None => Bound::Unbounded,
    };
    let end: Bound<Vec<u8>> = match &upper {
        Some((key, true)) => match prefix_end(key) {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        },
        Some((key, false)) => Bound::Excluded(key.clone()),
        None => Bound::Unbounded,
    };

    let mut out = Vec::new();
    for (full, value) in map.range((start, end)) {
        let encoded_value: &[u8] = if index.unique { full } else {
            if full.len() < RID_LEN {
                return Err(Error::CorruptRecord);
            }
            &full[..full.len() - RID_LEN]
        };
        if let Some((key, inclusive)) = &lower {
            let ord = encoded_value.cmp(key.as_slice());
            if ord == std::cmp::Ordering::Less || (!inclusive && ord == std::cmp::Ordering::Equal) {
                continue;
            }
        }
        if let Some((key, inclusive)) = &upper {
            let ord = encoded_value.cmp(key.as_slice());
            if ord == std::cmp::Ordering::Greater || (!inclusive && ord == std::cmp::Ordering::Equal)
            {
                continue;
            }
        }
        if index.unique {
            out.push(decode_rid(value)?);
        } else {
            out.push(decode_rid(&full[full.len() - RID_LEN..])?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_key_order_spans_negatives() {
        let ty = PropertyType::Integer;
        let values = [i32::MIN, -1000, -1, 0, 1, 1000, i32::MAX];
        let keys: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode_key(&Bytes::from(*v), ty).unwrap())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_big_int_key_order() {
        let ty = PropertyType::BigInt;
        let values = [i64::MIN, -424242424242, -1, 0, 42, i64::MAX];
        let keys: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode_key(&Bytes::from(*v), ty).unwrap())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_real_key_order() {
        let ty = PropertyType::Real;
        let values = [f64::NEG_INFINITY, -1000.5, -0.25, 0.0, 0.25, 3.14, f64::INFINITY];
        let keys: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode_key(&Bytes::from(*v), ty).unwrap())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_text_key_order_and_prefix_safety() {
        let ty = PropertyType::Text;
        let values = ["", "a", "ab", "abc", "b"];
        let keys: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode_key(&Bytes::from(*v), ty).unwrap())
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_blob_not_indexable() {
        assert!(matches!(
            encode_key(&Bytes::from(vec![1u8, 2]), PropertyType::Blob),
            Err(Error::InvalidPropertyTypeForIndex)
        ));
    }

    fn test_index(unique: bool) -> IndexDescriptor {
        IndexDescriptor { id: 1, class_id: 1, property_id: 1, unique }
    }

    #[test]
    fn test_unique_collision_leaves_index_unchanged() {
        let mut state = StoreState::default();
        let index = test_index(true);
        let key = encode_key(&Bytes::from(7i32), PropertyType::Integer).unwrap();

        insert_entry(&mut state, &index, key.clone(), RecordId::new(1, 1)).unwrap();
        let err = insert_entry(&mut state, &index, key, RecordId::new(1, 2));
        assert!(matches!(err, Err(Error::IndexConstraintViolation)));

        let hits = lookup(
            &state,
            &index,
            PropertyType::Integer,
            &IndexQuery::Eq(Bytes::from(7i32)),
        )
        .unwrap();
        assert_eq!(hits, vec![RecordId::new(1, 1)]);
    }

    #[test]
    fn test_non_unique_eq_and_range() {
        let mut state = StoreState::default();
        let index = test_index(false);
        let ty = PropertyType::Integer;
        for (pos, v) in [(1i64, -5i32), (2, 0), (3, 0), (4, 9)] {
            let key = encode_key(&Bytes::from(v), ty).unwrap();
            insert_entry(&mut state, &index, key, RecordId::new(1, pos)).unwrap();
        }

        let zeros = lookup(&state, &index, ty, &IndexQuery::Eq(Bytes::from(0i32))).unwrap();
        assert_eq!(zeros.len(), 2);

        let ge_zero =
            lookup(&state, &index, ty, &IndexQuery::Lower(Bytes::from(0i32), true)).unwrap();
        assert_eq!(ge_zero.len(), 3);

        let window = lookup(
            &state,
            &index,
            ty,
            &IndexQuery::Between {
                lo: Bytes::from(-5i32),
                hi: Bytes::from(9i32),
                bounds: (false, false),
            },
        )
        .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_text_eq_not_fooled_by_prefix_values() {
        let mut state = StoreState::default();
        let index = test_index(false);
        let ty = PropertyType::Text;
        for (pos, v) in [(1i64, "ab"), (2, "abc")] {
            let key = encode_key(&Bytes::from(v), ty).unwrap();
            insert_entry(&mut state, &index, key, RecordId::new(1, pos)).unwrap();
        }
        let hits = lookup(&state, &index, ty, &IndexQuery::Eq(Bytes::from("ab"))).unwrap();
        assert_eq!(hits, vec![RecordId::new(1, 1)]);
    }
}
