//! Record payload codec.
//!
//! A stored record value is a small fixed header followed by a
//! self-describing property bundle:
//!
//! ```text
//! vertex payload:  u64 version | bundle
//! edge payload:    u64 version | src rid | dst rid | bundle
//! bundle:          u16 count | count × (u16 property_id, u32 length, bytes)
//! rid:             u16 class_id | i64 position_id
//! ```
//!
//! All integers little-endian. Decoding needs no schema; *naming* the
//! properties does: the id-to-name mapping comes from the catalog, and ids
//! that no longer resolve are skipped rather than erased.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;

use crate::model::{Bytes, PropertyDescriptor, PropertyType, Record, RecordId};
use crate::{Error, Result};

/// Resolved write-side view of a class's properties: name → descriptor
/// (own and inherited).
pub type PropertyNameMap = HashMap<String, PropertyDescriptor>;

/// Resolved read-side view: property id → (name, type).
pub type PropertyIdMap = HashMap<u16, (String, PropertyType)>;

/// Encode a record's property bundle. Property names that the class (or an
/// ancestor) does not declare are rejected.
pub fn encode_bundle(record: &Record, props: &PropertyNameMap) -> Result<Vec<u8>> {
    let mut entries: Vec<(u16, &Bytes)> = Vec::with_capacity(record.len());
    for (name, value) in record.properties() {
        let descriptor = props
            .get(name)
            .ok_or_else(|| Error::NoSuchProperty(name.to_string()))?;
        entries.push((descriptor.id, value));
    }
    // Deterministic layout: bundle bytes are a function of content alone.
    entries.sort_by_key(|(id, _)| *id);

    let mut buf = Vec::with_capacity(8 + entries.len() * 8);
    buf.write_u16::<LittleEndian>(entries.len() as u16)
        .expect("vec write");
    for (id, value) in entries {
        buf.write_u16::<LittleEndian>(id).expect("vec write");
        buf.write_u32::<LittleEndian>(value.len() as u32)
            .expect("vec write");
        buf.extend_from_slice(value.as_raw());
    }
    Ok(buf)
}

/// Decode a property bundle into a record. Ids absent from `props` decode
/// to nothing: the bytes stay on disk but are invisible to readers.
pub fn decode_bundle(mut buf: &[u8], props: &PropertyIdMap) -> Result<Record> {
    let mut record = Record::new();
    let count = buf.read_u16::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
    for _ in 0..count {
        let id = buf.read_u16::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
        let len = buf.read_u32::<LittleEndian>().map_err(|_| Error::CorruptRecord)? as usize;
        if buf.len() < len {
            return Err(Error::CorruptRecord);
        }
        let (value, rest) = buf.split_at(len);
        buf = rest;
        if let Some((name, _)) = props.get(&id) {
            record.insert_raw(name.clone(), Bytes::from(value));
        }
    }
    Ok(record)
}

/// Pull one property's raw bytes out of a bundle without decoding the rest.
/// Index maintenance is keyed by property id, so this skips name resolution.
pub fn extract_property(mut buf: &[u8], property_id: u16) -> Result<Option<Bytes>> {
    let count = buf.read_u16::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
    for _ in 0..count {
        let id = buf.read_u16::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
        let len = buf.read_u32::<LittleEndian>().map_err(|_| Error::CorruptRecord)? as usize;
        if buf.len() < len {
            return Err(Error::CorruptRecord);
        }
        let (value, rest) = buf.split_at(len);
        if id == property_id {
            return Ok(Some(Bytes::from(value)));
        }
        buf = rest;
    }
    Ok(None)
}

fn write_rid(buf: &mut Vec<u8>, rid: RecordId) {
    buf.write_u16::<LittleEndian>(rid.class_id).expect("vec write");
    buf.write_i64::<LittleEndian>(rid.position_id).expect("vec write");
}

fn read_rid(buf: &mut &[u8]) -> Result<RecordId> {
    let class_id = buf.read_u16::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
    let position_id = buf.read_i64::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
    Ok(RecordId::new(class_id, position_id))
}

/// Stored form of a vertex record.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexPayload {
    pub version: u64,
    pub bundle: Vec<u8>,
}

impl VertexPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bundle.len());
        buf.write_u64::<LittleEndian>(self.version).expect("vec write");
        buf.extend_from_slice(&self.bundle);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let version = buf.read_u64::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
        Ok(Self { version, bundle: buf.to_vec() })
    }
}

/// Stored form of an edge record; endpoints ride in the header so
/// adjacency repair never decodes the bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePayload {
    pub version: u64,
    pub src: RecordId,
    pub dst: RecordId,
    pub bundle: Vec<u8>,
}

impl EdgePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(28 + self.bundle.len());
        buf.write_u64::<LittleEndian>(self.version).expect("vec write");
        write_rid(&mut buf, self.src);
        write_rid(&mut buf, self.dst);
        buf.extend_from_slice(&self.bundle);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let version = buf.read_u64::<LittleEndian>().map_err(|_| Error::CorruptRecord)?;
        let src = read_rid(&mut buf)?;
        let dst = read_rid(&mut buf)?;
        Ok(Self { version, src, dst, bundle: buf.to_vec() })
    }
}
