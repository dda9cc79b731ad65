//! # Record Store
//!
//! Vertex and edge records plus the adjacency bookkeeping that keeps the
//! graph navigable from both ends:
//!
//! * `records::<class>` — position → payload (version, endpoints, bundle)
//! * `adj_out::<class>` / `adj_in::<class>` — `(vertex position, edge rid)`
//!   → neighbor rid, so enumerating a vertex's edges is one prefix scan and
//!   neighbor discovery never decodes edge payloads
//!
//! Every edge is present in its source's out-map and its destination's
//! in-map; removal always clears both sides. Record versions count
//! mutations when versioning is enabled: property updates, endpoint moves,
//! and losing an adjacent edge all bump the affected records.

use byteorder::{BigEndian, ByteOrder};
use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::trace;

use crate::codec::{self, EdgePayload, VertexPayload};
use crate::model::{ClassDescriptor, ClassKind, Record, RecordDescriptor, RecordId};
use crate::schema;
use crate::storage::{MapId, StoreState};
use crate::{Error, Result};

// ============================================================================
// Keys
// ============================================================================

pub(crate) fn record_key(position_id: i64) -> [u8; 8] {
    (position_id as u64).to_be_bytes()
}

pub(crate) fn position_from_key(key: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = key.try_into().map_err(|_| Error::CorruptRecord)?;
    Ok(u64::from_be_bytes(raw) as i64)
}

fn rid_bytes(rid: RecordId) -> [u8; 10] {
    let mut buf = [0u8; 10];
    BigEndian::write_u16(&mut buf[..2], rid.class_id);
    BigEndian::write_u64(&mut buf[2..], rid.position_id as u64);
    buf
}

fn rid_from_bytes(raw: &[u8]) -> Result<RecordId> {
    if raw.len() != 10 {
        return Err(Error::CorruptRecord);
    }
    Ok(RecordId::new(
        BigEndian::read_u16(&raw[..2]),
        BigEndian::read_u64(&raw[2..]) as i64,
    ))
}

/// `(vertex position, edge rid)` — prefix scans on the vertex position
/// enumerate the vertex's edges in edge-rid order.
fn adjacency_key(vertex: RecordId, edge: RecordId) -> [u8; 18] {
    let mut buf = [0u8; 18];
    BigEndian::write_u64(&mut buf[..8], vertex.position_id as u64);
    buf[8..].copy_from_slice(&rid_bytes(edge));
    buf
}

// ============================================================================
// Position allocation
// ============================================================================

fn position_counter_key(class_id: u16) -> Vec<u8> {
    let mut key = b"pos:".to_vec();
    key.extend_from_slice(&class_id.to_be_bytes());
    key
}

/// Monotonic per-class allocator; positions are never reused, so a dropped
/// record's id stays dead.
fn next_position(state: &mut StoreState, class_id: u16) -> i64 {
    let key = position_counter_key(class_id);
    let next = state
        .get(MapId::Meta, &key)
        .map(|raw| BigEndian::read_u64(raw))
        .unwrap_or(0)
        + 1;
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, next);
    state.put(MapId::Meta, key, buf.to_vec());
    next as i64
}

pub(crate) fn clear_position_counter(state: &mut StoreState, class_id: u16) {
    state.delete(MapId::Meta, &position_counter_key(class_id));
}

// ============================================================================
// Payload access
// ============================================================================

pub(crate) fn vertex_payload(state: &StoreState, rid: RecordId) -> Result<VertexPayload> {
    let raw = state
        .get(MapId::Records(rid.class_id), &record_key(rid.position_id))
        .ok_or(Error::NoSuchRecord)?;
    VertexPayload::decode(raw)
}

pub(crate) fn edge_payload(state: &StoreState, rid: RecordId) -> Result<EdgePayload> {
    let raw = state
        .get(MapId::Records(rid.class_id), &record_key(rid.position_id))
        .ok_or(Error::NoSuchRecord)?;
    EdgePayload::decode(raw)
}

pub(crate) fn record_exists(state: &StoreState, rid: RecordId) -> bool {
    state.contains(MapId::Records(rid.class_id), &record_key(rid.position_id))
}

fn is_live_vertex(state: &StoreState, rid: RecordId) -> bool {
    schema::class_by_id(state, rid.class_id)
        .map(|c| c.kind == ClassKind::Vertex)
        .unwrap_or(false)
        && record_exists(state, rid)
}

fn bump(version: u64, versioning: bool) -> u64 {
    if versioning { version + 1 } else { version }
}

fn initial_version(versioning: bool) -> u64 {
    if versioning { 1 } else { 0 }
}

/// Touch a vertex whose adjacency changed.
fn bump_vertex_version(state: &mut StoreState, rid: RecordId, versioning: bool) -> Result<()> {
    if !versioning {
        return Ok(());
    }
    let mut payload = vertex_payload(state, rid)?;
    payload.version += 1;
    state.put(
        MapId::Records(rid.class_id),
        record_key(rid.position_id).to_vec(),
        payload.encode(),
    );
    Ok(())
}

// ============================================================================
// Creation
// ============================================================================

pub(crate) fn create_vertex(
    state: &mut StoreState,
    class: &ClassDescriptor,
    record: &Record,
    versioning: bool,
) -> Result<RecordDescriptor> {
    if class.kind != ClassKind::Vertex {
        return Err(Error::MismatchClassType(class.name.clone()));
    }
    let bundle = codec::encode_bundle(record, &schema::property_name_map(state, class.id))?;
    let position = next_position(state, class.id);
    let rid = RecordId::new(class.id, position);
    let payload = VertexPayload { version: initial_version(versioning), bundle };
    state.put(MapId::Records(class.id), record_key(position).to_vec(), payload.encode());
    crate::index::maintain(state, rid, None, Some(&payload.bundle))?;
    trace!(%rid, class = %class.name, "vertex created");
    Ok(RecordDescriptor::from(rid))
}

pub(crate) fn create_edge(
    state: &mut StoreState,
    class: &ClassDescriptor,
    src: RecordId,
    dst: RecordId,
    record: &Record,
    versioning: bool,
) -> Result<RecordDescriptor> {
    if class.kind != ClassKind::Edge {
        return Err(Error::MismatchClassType(class.name.clone()));
    }
    if !is_live_vertex(state, src) {
        return Err(Error::NoSuchSource);
    }
    if !is_live_vertex(state, dst) {
        return Err(Error::NoSuchDestination);
    }
    let bundle = codec::encode_bundle(record, &schema::property_name_map(state, class.id))?;
    let position = next_position(state, class.id);
    let rid = RecordId::new(class.id, position);
    let payload = EdgePayload { version: initial_version(versioning), src, dst, bundle };
    state.put(MapId::Records(class.id), record_key(position).to_vec(), payload.encode());

    state.put(
        MapId::AdjOut(src.class_id),
        adjacency_key(src, rid).to_vec(),
        rid_bytes(dst).to_vec(),
    );
    state.put(
        MapId::AdjIn(dst.class_id),
        adjacency_key(dst, rid).to_vec(),
        rid_bytes(src).to_vec(),
    );
    bump_vertex_version(state, src, versioning)?;
    if dst != src {
        bump_vertex_version(state, dst, versioning)?;
    }
    crate::index::maintain(state, rid, None, Some(&payload.bundle))?;
    trace!(%rid, class = %class.name, %src, %dst, "edge created");
    Ok(RecordDescriptor::from(rid))
}

// ============================================================================
// Fetch
// ============================================================================

/// Materialize a record with synthesized metadata. The class must be live
/// in this snapshot.
pub(crate) fn fetch_record(state: &StoreState, rid: RecordId) -> Result<Record> {
    let class = schema::class_by_id(state, rid.class_id)?;
    let (version, bundle) = match class.kind {
        ClassKind::Vertex => {
            let payload = vertex_payload(state, rid)?;
            (payload.version, payload.bundle)
        }
        ClassKind::Edge => {
            let payload = edge_payload(state, rid)?;
            (payload.version, payload.bundle)
        }
    };
    let record = codec::decode_bundle(&bundle, &schema::property_id_map(state, class.id))?;
    Ok(record.with_metadata(class.name, RecordDescriptor::from(rid), version))
}

/// The source and destination vertex rids of an edge.
pub(crate) fn edge_endpoints(state: &StoreState, rid: RecordId) -> Result<(RecordId, RecordId)> {
    let class = schema::class_by_id(state, rid.class_id)?;
    if class.kind != ClassKind::Edge {
        return Err(Error::MismatchClassType(class.name));
    }
    let payload = edge_payload(state, rid)?;
    Ok((payload.src, payload.dst))
}

/// Every outgoing `(edge, destination)` pair of a vertex.
pub(crate) fn out_edges(state: &StoreState, vertex: RecordId) -> Result<Vec<(RecordId, RecordId)>> {
    adjacent(state, MapId::AdjOut(vertex.class_id), vertex)
}

/// Every incoming `(edge, source)` pair of a vertex.
pub(crate) fn in_edges(state: &StoreState, vertex: RecordId) -> Result<Vec<(RecordId, RecordId)>> {
    adjacent(state, MapId::AdjIn(vertex.class_id), vertex)
}

fn adjacent(
    state: &StoreState,
    map: MapId,
    vertex: RecordId,
) -> Result<Vec<(RecordId, RecordId)>> {
    let prefix = (vertex.position_id as u64).to_be_bytes();
    let mut out = Vec::new();
    for (key, neighbor) in state.scan_prefix(map, &prefix) {
        let edge = rid_from_bytes(&key[8..])?;
        out.push((edge, rid_from_bytes(neighbor)?));
    }
    Ok(out)
}

// ============================================================================
// Update
// ============================================================================

/// Merge `record`'s properties over the stored bundle.
pub(crate) fn update_record(
    state: &mut StoreState,
    rid: RecordId,
    record: &Record,
    versioning: bool,
) -> Result<()> {
    let class = schema::class_by_id(state, rid.class_id)?;
    let name_map = schema::property_name_map(state, class.id);
    let id_map = schema::property_id_map(state, class.id);

    match class.kind {
        ClassKind::Vertex => {
            let payload = vertex_payload(state, rid)?;
            let merged = codec::decode_bundle(&payload.bundle, &id_map)?.merged_with(record);
            let next = VertexPayload {
                version: bump(payload.version, versioning),
                bundle: codec::encode_bundle(&merged, &name_map)?,
            };
            crate::index::maintain(state, rid, Some(&payload.bundle), Some(&next.bundle))?;
            state.put(MapId::Records(rid.class_id), record_key(rid.position_id).to_vec(), next.encode());
        }
        ClassKind::Edge => {
            let payload = edge_payload(state, rid)?;
            let merged = codec::decode_bundle(&payload.bundle, &id_map)?.merged_with(record);
            let next = EdgePayload {
                version: bump(payload.version, versioning),
                src: payload.src,
                dst: payload.dst,
                bundle: codec::encode_bundle(&merged, &name_map)?,
            };
            crate::index::maintain(state, rid, Some(&payload.bundle), Some(&next.bundle))?;
            state.put(MapId::Records(rid.class_id), record_key(rid.position_id).to_vec(), next.encode());
        }
    }
    trace!(rid = %rid, "record updated");
    Ok(())
}

/// Re-point an edge's source. Adjacency moves first, then the record is
/// rewritten; both old endpoints and the incoming one are touched.
pub(crate) fn update_src(
    state: &mut StoreState,
    rid: RecordId,
    new_src: RecordId,
    versioning: bool,
) -> Result<()> {
    let class = schema::class_by_id(state, rid.class_id)?;
    if class.kind != ClassKind::Edge {
        return Err(Error::MismatchClassType(class.name));
    }
    if !is_live_vertex(state, new_src) {
        return Err(Error::NoSuchSource);
    }
    let payload = edge_payload(state, rid)?;

    state.delete(MapId::AdjOut(payload.src.class_id), &adjacency_key(payload.src, rid));
    let next = EdgePayload {
        version: bump(payload.version, versioning),
        src: new_src,
        dst: payload.dst,
        bundle: payload.bundle,
    };
    state.put(MapId::Records(rid.class_id), record_key(rid.position_id).to_vec(), next.encode());
    state.put(
        MapId::AdjOut(new_src.class_id),
        adjacency_key(new_src, rid).to_vec(),
        rid_bytes(next.dst).to_vec(),
    );
    // The in-side neighbor pointer now names the new source.
    state.put(
        MapId::AdjIn(next.dst.class_id),
        adjacency_key(next.dst, rid).to_vec(),
        rid_bytes(new_src).to_vec(),
    );

    for vertex in distinct([payload.src, payload.dst, new_src]) {
        bump_vertex_version(state, vertex, versioning)?;
    }
    trace!(%rid, %new_src, "edge source moved");
    Ok(())
}

/// Re-point an edge's destination; mirror image of [`update_src`].
pub(crate) fn update_dst(
    state: &mut StoreState,
    rid: RecordId,
    new_dst: RecordId,
    versioning: bool,
) -> Result<()> {
    let class = schema::class_by_id(state, rid.class_id)?;
    if class.kind != ClassKind::Edge {
        return Err(Error::MismatchClassType(class.name));
    }
    if !is_live_vertex(state, new_dst) {
        return Err(Error::NoSuchDestination);
    }
    let payload = edge_payload(state, rid)?;

    state.delete(MapId::AdjIn(payload.dst.class_id), &adjacency_key(payload.dst, rid));
    let next = EdgePayload {
        version: bump(payload.version, versioning),
        src: payload.src,
        dst: new_dst,
        bundle: payload.bundle,
    };
    state.put(MapId::Records(rid.class_id), record_key(rid.position_id).to_vec(), next.encode());
    state.put(
        MapId::AdjIn(new_dst.class_id),
        adjacency_key(new_dst, rid).to_vec(),
        rid_bytes(next.src).to_vec(),
    );
    state.put(
        MapId::AdjOut(next.src.class_id),
        adjacency_key(next.src, rid).to_vec(),
        rid_bytes(new_dst).to_vec(),
    );

    for vertex in distinct([payload.src, payload.dst, new_dst]) {
        bump_vertex_version(state, vertex, versioning)?;
    }
    trace!(%rid, %new_dst, "edge destination moved");
    Ok(())
}

fn distinct<const N: usize>(rids: [RecordId; N]) -> SmallVec<[RecordId; 4]> {
    let mut out: SmallVec<[RecordId; 4]> = SmallVec::new();
    for rid in rids {
        if !out.contains(&rid) {
            out.push(rid);
        }
    }
    out
}

// ============================================================================
// Removal
// ============================================================================

/// Remove a record. Vertices shed every incident edge first (each with its
/// back-reference); edges clear both adjacency entries and touch the
/// surviving endpoints.
pub(crate) fn remove_record(state: &mut StoreState, rid: RecordId, versioning: bool) -> Result<()> {
    let class = schema::class_by_id(state, rid.class_id)?;
    match class.kind {
        ClassKind::Vertex => remove_vertex(state, rid, versioning),
        ClassKind::Edge => remove_edge(state, rid, versioning, true),
    }
}

fn remove_vertex(state: &mut StoreState, rid: RecordId, versioning: bool) -> Result<()> {
    if !record_exists(state, rid) {
        return Err(Error::NoSuchRecord);
    }
    // A self-loop appears in both adjacency maps; dedupe before removal.
    let mut incident: HashSet<RecordId> = HashSet::new();
    for (edge, _) in out_edges(state, rid)? {
        incident.insert(edge);
    }
    for (edge, _) in in_edges(state, rid)? {
        incident.insert(edge);
    }
    for edge in incident {
        remove_edge(state, edge, versioning, true)?;
    }

    let payload = vertex_payload(state, rid)?;
    crate::index::maintain(state, rid, Some(&payload.bundle), None)?;
    state.delete(MapId::Records(rid.class_id), &record_key(rid.position_id));
    trace!(%rid, "vertex removed");
    Ok(())
}

fn remove_edge(
    state: &mut StoreState,
    rid: RecordId,
    versioning: bool,
    touch_endpoints: bool,
) -> Result<()> {
    let payload = edge_payload(state, rid)?;
    state.delete(MapId::AdjOut(payload.src.class_id), &adjacency_key(payload.src, rid));
    state.delete(MapId::AdjIn(payload.dst.class_id), &adjacency_key(payload.dst, rid));

    crate::index::maintain(state, rid, Some(&payload.bundle), None)?;
    state.delete(MapId::Records(rid.class_id), &record_key(rid.position_id));

    if touch_endpoints {
        for vertex in distinct([payload.src, payload.dst]) {
            if is_live_vertex(state, vertex) {
                bump_vertex_version(state, vertex, versioning)?;
            }
        }
    }
    trace!(%rid, "edge removed");
    Ok(())
}

/// Remove every record of one class.
pub(crate) fn remove_all(state: &mut StoreState, class_id: u16, versioning: bool) -> Result<()> {
    for position in record_positions(state, class_id)? {
        // Cascaded edge removal may have already taken records of this
        // class; skip the ones that are gone.
        let rid = RecordId::new(class_id, position);
        if record_exists(state, rid) {
            remove_record(state, rid, versioning)?;
        }
    }
    Ok(())
}

pub(crate) fn record_positions(state: &StoreState, class_id: u16) -> Result<Vec<i64>> {
    state
        .scan_prefix(MapId::Records(class_id), &[])
        .map(|(key, _)| position_from_key(key))
        .collect()
}

/// Drop a class's record and adjacency sub-maps wholesale, after the
/// per-record cascade has cleared cross-class references.
pub(crate) fn drop_class_maps(state: &mut StoreState, class_id: u16) {
    state.drop_map(MapId::Records(class_id));
    state.drop_map(MapId::AdjOut(class_id));
    state.drop_map(MapId::AdjIn(class_id));
    clear_position_counter(state, class_id);
}
