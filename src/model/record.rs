//! A record: the property bundle attached to one vertex or edge.

use hashbrown::HashMap;

use super::{Bytes, PropertyType, RecordDescriptor};

/// Property name → declared type, used by the query layer to interpret
/// raw property bytes.
pub type PropertyTypeMap = HashMap<String, PropertyType>;

/// Names beginning with `@` are metadata synthesized on read
/// (`@className`, `@recordId`, `@version`) and can never be stored.
pub(crate) fn is_reserved_name(name: &str) -> bool {
    name.starts_with('@')
}

/// A bundle of named property values plus read-only record metadata.
///
/// Built fluently for writes and materialized by fetches:
///
/// ```
/// use nogdb_rs::Record;
///
/// let r = Record::new().set("name", "ada").set("age", 36i32);
/// assert_eq!(r.get_text("name").unwrap(), "ada");
/// assert_eq!(r.get_int("age").unwrap(), 36);
/// assert!(r.get("missing").is_none());
/// assert!(r.get_text("missing").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Record {
    props: HashMap<String, Bytes>,
    class_name: Option<String>,
    descriptor: Option<RecordDescriptor>,
    version: u64,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one property. Reserved `@`-names are silently ignored.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        let name = name.into();
        if !is_reserved_name(&name) {
            self.props.insert(name, value.into());
        }
        self
    }

    /// Remove a property from the bundle.
    pub fn unset(mut self, name: &str) -> Self {
        self.props.remove(name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.props.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    // Typed getters. The property must be present; asking for an absent
    // one is an error, not a default. Probe with `get`/`contains` first
    // when absence is expected.

    fn require(&self, name: &str) -> crate::Result<&Bytes> {
        self.props
            .get(name)
            .ok_or_else(|| crate::Error::NoSuchProperty(name.to_string()))
    }

    pub fn get_tiny_int(&self, name: &str) -> crate::Result<i8> {
        self.require(name)?.to_tiny_int()
    }

    pub fn get_tiny_int_u(&self, name: &str) -> crate::Result<u8> {
        self.require(name)?.to_tiny_int_u()
    }

    pub fn get_small_int(&self, name: &str) -> crate::Result<i16> {
        self.require(name)?.to_small_int()
    }

    pub fn get_small_int_u(&self, name: &str) -> crate::Result<u16> {
        self.require(name)?.to_small_int_u()
    }

    pub fn get_int(&self, name: &str) -> crate::Result<i32> {
        self.require(name)?.to_int()
    }

    pub fn get_int_u(&self, name: &str) -> crate::Result<u32> {
        self.require(name)?.to_int_u()
    }

    pub fn get_big_int(&self, name: &str) -> crate::Result<i64> {
        self.require(name)?.to_big_int()
    }

    pub fn get_big_int_u(&self, name: &str) -> crate::Result<u64> {
        self.require(name)?.to_big_int_u()
    }

    pub fn get_real(&self, name: &str) -> crate::Result<f64> {
        self.require(name)?.to_real()
    }

    pub fn get_text(&self, name: &str) -> crate::Result<String> {
        self.require(name)?.to_text()
    }

    // Metadata synthesized by fetches; never stored with the record.

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn descriptor(&self) -> Option<RecordDescriptor> {
        self.descriptor
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn with_metadata(
        mut self,
        class_name: impl Into<String>,
        descriptor: RecordDescriptor,
        version: u64,
    ) -> Self {
        self.class_name = Some(class_name.into());
        self.descriptor = Some(descriptor);
        self.version = version;
        self
    }

    pub(crate) fn insert_raw(&mut self, name: String, value: Bytes) {
        self.props.insert(name, value);
    }

    /// Merge `other`'s properties over this record's, keeping everything
    /// not mentioned by `other`.
    pub(crate) fn merged_with(mut self, other: &Record) -> Record {
        for (name, value) in other.properties() {
            self.props.insert(name.to_string(), value.clone());
        }
        self
    }
}

/// Equality covers properties only; fetch metadata is incidental.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.props == other.props
    }
}
