//! Epoch images: the immutable ordered-map universe a snapshot sees.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Identifier of one named ordered sub-map inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MapId {
    /// Class catalog rows keyed by big-endian class id.
    ClassCatalog,
    /// Property catalog rows keyed by big-endian property id.
    PropertyCatalog,
    /// Index catalog rows keyed by big-endian index id.
    IndexCatalog,
    /// Store-internal counters (position allocators).
    Meta,
    /// Record payloads of one class, keyed by big-endian position.
    Records(u16),
    /// Incoming adjacency of one vertex class.
    AdjIn(u16),
    /// Outgoing adjacency of one vertex class.
    AdjOut(u16),
    /// Data pages of one secondary index.
    Index(u32),
}

pub type OrderedMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// One immutable epoch of the whole store: every sub-map behind an `Arc`.
///
/// Readers clone the outer state (cheap: one `Arc` per touched sub-map);
/// the single writer mutates its private clone via [`Arc::make_mut`], so
/// sub-maps copy only when first written in a transaction.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    maps: HashMap<MapId, Arc<OrderedMap>>,
}

impl StoreState {
    pub fn get(&self, map: MapId, key: &[u8]) -> Option<&[u8]> {
        self.maps.get(&map)?.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, map: MapId, key: &[u8]) -> bool {
        self.maps.get(&map).is_some_and(|m| m.contains_key(key))
    }

    /// Borrow one sub-map for in-place ordered scans. Absent maps read as
    /// empty.
    pub fn map(&self, map: MapId) -> Option<&OrderedMap> {
        self.maps.get(&map).map(Arc::as_ref)
    }

    /// Owned handle to one sub-map, for cursors that outlive the borrow.
    pub fn map_handle(&self, map: MapId) -> Option<Arc<OrderedMap>> {
        self.maps.get(&map).cloned()
    }

    /// Forward scan of every `(key, value)` whose key starts with `prefix`.
    pub fn scan_prefix<'a>(
        &'a self,
        map: MapId,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.maps
            .get(&map)
            .into_iter()
            .flat_map(move |m| {
                let upper: Bound<Vec<u8>> = match prefix_end(prefix) {
                    Some(end) => Bound::Excluded(end),
                    None => Bound::Unbounded,
                };
                m.range((Bound::Included(prefix.to_vec()), upper))
            })
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn put(&mut self, map: MapId, key: Vec<u8>, value: Vec<u8>) {
        let m = self.maps.entry(map).or_default();
        Arc::make_mut(m).insert(key, value);
    }

    pub fn delete(&mut self, map: MapId, key: &[u8]) -> bool {
        match self.maps.get_mut(&map) {
            Some(m) => Arc::make_mut(m).remove(key).is_some(),
            None => false,
        }
    }

    /// Remove a whole sub-map (class drop, index drop).
    pub fn drop_map(&mut self, map: MapId) {
        self.maps.remove(&map);
    }

    pub fn map_ids(&self) -> impl Iterator<Item = MapId> + '_ {
        self.maps.keys().copied()
    }
}

/// Smallest key strictly greater than every key with this prefix, or `None`
/// when the prefix is all `0xff`.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// Serializable form of a [`StoreState`] for the on-disk image.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoreImage {
    maps: Vec<(MapId, Vec<(Vec<u8>, Vec<u8>)>)>,
}

impl From<&StoreState> for StoreImage {
    fn from(state: &StoreState) -> Self {
        let mut maps: Vec<(MapId, Vec<(Vec<u8>, Vec<u8>)>)> = state
            .maps
            .iter()
            .map(|(id, m)| (*id, m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            .collect();
        maps.sort_by_key(|(id, _)| *id);
        Self { maps }
    }
}

impl From<StoreImage> for StoreState {
    fn from(image: StoreImage) -> Self {
        let maps = image
            .maps
            .into_iter()
            .map(|(id, pairs)| (id, Arc::new(pairs.into_iter().collect::<OrderedMap>())))
            .collect();
        Self { maps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let mut s = StoreState::default();
        s.put(MapId::Meta, b"k".to_vec(), b"v".to_vec());
        assert_eq!(s.get(MapId::Meta, b"k"), Some(b"v".as_slice()));
        assert!(s.delete(MapId::Meta, b"k"));
        assert_eq!(s.get(MapId::Meta, b"k"), None);
        assert!(!s.delete(MapId::Meta, b"k"));
    }

    #[test]
    fn test_copy_on_write_isolation() {
        let mut base = StoreState::default();
        base.put(MapId::Records(1), vec![1], b"one".to_vec());

        let snapshot = base.clone();
        base.put(MapId::Records(1), vec![2], b"two".to_vec());
        base.delete(MapId::Records(1), &[1]);

        // The clone still sees the old epoch.
        assert_eq!(snapshot.get(MapId::Records(1), &[1]), Some(b"one".as_slice()));
        assert_eq!(snapshot.get(MapId::Records(1), &[2]), None);
        assert_eq!(base.get(MapId::Records(1), &[2]), Some(b"two".as_slice()));
    }

    #[test]
    fn test_scan_prefix_ordered() {
        let mut s = StoreState::default();
        for (k, v) in [(vec![1, 0], b"a"), (vec![1, 2], b"b"), (vec![2, 0], b"c")] {
            s.put(MapId::Meta, k, v.to_vec());
        }
        let hits: Vec<_> = s.scan_prefix(MapId::Meta, &[1]).map(|(k, _)| k.to_vec()).collect();
        assert_eq!(hits, vec![vec![1, 0], vec![1, 2]]);
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(prefix_end(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
    }

    #[test]
    fn test_image_round_trip() {
        let mut s = StoreState::default();
        s.put(MapId::ClassCatalog, vec![0, 1], b"class".to_vec());
        s.put(MapId::Records(7), vec![9], b"rec".to_vec());

        let restored = StoreState::from(StoreImage::from(&s));
        assert_eq!(restored.get(MapId::ClassCatalog, &[0, 1]), Some(b"class".as_slice()));
        assert_eq!(restored.get(MapId::Records(7), &[9]), Some(b"rec".as_slice()));
    }
}
