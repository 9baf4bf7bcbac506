//! Values that stores hold.
//!
//! [`Value`] is what a `get` hands back: text, raw bytes, a JSON document, or
//! an opaque binary object. [`Payload`] is what a `put` accepts: any value,
//! plus the two input-only shapes (a file on disk and a byte stream) that the
//! codec reads fully before writing.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// An opaque binary serialization of a Rust value (MessagePack).
///
/// Used for values that have no JSON form, and for collection payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryObject {
    bytes: Vec<u8>,
}

impl BinaryObject {
    /// Serialize any value into a binary object.
    pub fn pack<T: Serialize + ?Sized>(value: &T) -> StoreResult<Self> {
        Ok(Self {
            bytes: rmp_serde::to_vec_named(value)?,
        })
    }

    /// Deserialize the binary object back into a concrete type.
    pub fn unpack<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(rmp_serde::from_slice(&self.bytes)?)
    }

    /// Wrap bytes previously produced by [`BinaryObject::pack`].
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The serialized bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the object, returning the serialized bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A decoded stored value.
///
/// # Examples
///
/// ```
/// use kyrostore::Value;
///
/// let text = Value::from("hello");
/// let bytes = Value::from(vec![1u8, 2, 3]);
///
/// assert!(text.is_text());
/// assert_eq!(bytes.as_bytes(), Some(&[1u8, 2, 3][..]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A JSON document.
    Json(serde_json::Value),
    /// A binary-serialized object.
    Object(BinaryObject),
}

impl Value {
    /// Convert a serializable value, preferring JSON.
    ///
    /// Values serde_json refuses (maps with non-string keys, for instance)
    /// fall back to a [`BinaryObject`].
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> StoreResult<Self> {
        match serde_json::to_value(value) {
            Ok(json) => Ok(Self::Json(json)),
            Err(_) => Ok(Self::Object(BinaryObject::pack(value)?)),
        }
    }

    /// Deserialize a JSON, binary-object or text value into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> StoreResult<T> {
        match self {
            Self::Json(v) => Ok(serde_json::from_value(v.clone())?),
            Self::Object(obj) => obj.unpack(),
            Self::Text(s) => Ok(serde_json::from_value(serde_json::Value::String(s.clone()))?),
            Self::Bytes(_) => Err(StoreError::serialization(
                "raw bytes cannot be deserialized into a typed value",
            )),
        }
    }

    /// Whether this is text.
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Whether these are raw bytes.
    pub const fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// Whether this is JSON.
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Whether this is a binary object.
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// The text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The bytes, if these are raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The JSON document, if this is JSON.
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// The binary object, if this is one.
    pub const fn as_object(&self) -> Option<&BinaryObject> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "bytes[{}]", v.len()),
            Self::Json(v) => write!(f, "{v}"),
            Self::Object(v) => write!(f, "object[{}]", v.as_bytes().len()),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<BinaryObject> for Value {
    fn from(v: BinaryObject) -> Self {
        Self::Object(v)
    }
}

/// Input to a `put`.
pub enum Payload {
    /// Contents of a file; the content type is sniffed.
    File(PathBuf),
    /// A reader consumed to the end.
    Stream(Box<dyn Read + Send>),
    /// An in-memory value.
    Value(Value),
}

impl Payload {
    /// Wrap a reader.
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Convert a serializable value; see [`Value::from_serialize`].
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> StoreResult<Self> {
        Value::from_serialize(value).map(Self::Value)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) => f.debug_tuple("File").field(p).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl<T: Into<Value>> From<T> for Payload {
    fn from(v: T) -> Self {
        Self::Value(v.into())
    }
}

impl From<&Path> for Payload {
    fn from(v: &Path) -> Self {
        Self::File(v.to_path_buf())
    }
}

impl From<PathBuf> for Payload {
    fn from(v: PathBuf) -> Self {
        Self::File(v)
    }
}
