//! Raw property values.
//!
//! A [`Bytes`] is the untyped byte string a record stores for one property.
//! Interpretation needs the schema: the typed views decode fixed-width
//! little-endian scalars or pass UTF-8 through, and reject buffers whose
//! width disagrees with the requested type.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An owned, untyped property value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn new(raw: Vec<u8>) -> Self {
        Self(raw)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.0
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N]> {
        self.0
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidPropertyType)
    }

    pub fn to_tiny_int(&self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.fixed::<1>()?))
    }

    pub fn to_tiny_int_u(&self) -> Result<u8> {
        Ok(u8::from_le_bytes(self.fixed::<1>()?))
    }

    pub fn to_small_int(&self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.fixed::<2>()?))
    }

    pub fn to_small_int_u(&self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.fixed::<2>()?))
    }

    pub fn to_int(&self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.fixed::<4>()?))
    }

    pub fn to_int_u(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.fixed::<4>()?))
    }

    pub fn to_big_int(&self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.fixed::<8>()?))
    }

    pub fn to_big_int_u(&self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.fixed::<8>()?))
    }

    pub fn to_real(&self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.fixed::<8>()?)))
    }

    pub fn to_text(&self) -> Result<String> {
        String::from_utf8(self.0.clone()).map_err(|_| Error::InvalidPropertyType)
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<bytes[{}]>", self.0.len())
    }
}

impl From<i8> for Bytes {
    fn from(v: i8) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<u8> for Bytes {
    fn from(v: u8) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<i16> for Bytes {
    fn from(v: i16) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<u16> for Bytes {
    fn from(v: u16) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<i32> for Bytes {
    fn from(v: i32) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<u32> for Bytes {
    fn from(v: u32) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<i64> for Bytes {
    fn from(v: i64) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<u64> for Bytes {
    fn from(v: u64) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl From<f64> for Bytes {
    fn from(v: f64) -> Self {
        let mut buf = [0u8; 8];
        LittleEndian::write_f64(&mut buf, v);
        Self(buf.to_vec())
    }
}

impl From<&str> for Bytes {
    fn from(v: &str) -> Self {
        Self(v.as_bytes().to_vec())
    }
}

impl From<String> for Bytes {
    fn from(v: String) -> Self {
        Self(v.into_bytes())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}
