//! Content codec shared by every backend.
//!
//! `encode` turns a [`Payload`] into bytes plus a content descriptor; `decode`
//! turns bytes back into a [`Value`] using only the stored content type.
//!
//! Encoding walks a fixed rule chain, first match wins:
//!
//! ```text
//! file path -> text -> bytes -> stream -> json -> binary object
//!  (sniffed)   utf-8   octet    (read)    json    x-binary-object
//! ```
//!
//! The local and kv backends persist the descriptor next to the body using
//! [`pack`]/[`unpack`]:
//!
//! ```text
//! [version: 1][type len: 2 LE][type][ext len: 2 LE][ext][body]
//! ```

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{StoreError, StoreResult};
use crate::value::{BinaryObject, Payload, Value};

/// `text/plain; charset=utf-8`
pub const TEXT_UTF8: &str = "text/plain; charset=utf-8";
/// `text/plain`
pub const TEXT_PLAIN: &str = "text/plain";
/// `application/octet-stream`
pub const OCTET_STREAM: &str = "application/octet-stream";
/// `application/json`
pub const JSON: &str = "application/json";
/// `application/x-binary-object`
pub const BINARY_OBJECT: &str = "application/x-binary-object";
/// `application/x-gzip`
pub const X_GZIP: &str = "application/x-gzip";
/// `application/gzip`
pub const GZIP: &str = "application/gzip";

const ENVELOPE_VERSION: u8 = 1;

/// Bytes plus the descriptor needed to decode them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Encoded body.
    pub bytes: Vec<u8>,
    /// Length of `bytes`.
    pub size: usize,
    /// MIME type the body decodes by.
    pub content_type: String,
    /// Source file extension, empty unless encoded from a file.
    pub extension: String,
}

impl Encoded {
    fn new(bytes: Vec<u8>, content_type: &str) -> Self {
        Self {
            size: bytes.len(),
            bytes,
            content_type: content_type.to_string(),
            extension: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    FilePath,
    Text,
    Bytes,
    Stream,
    Json,
    Object,
}

impl Rule {
    const CHAIN: [Self; 6] = [
        Self::FilePath,
        Self::Text,
        Self::Bytes,
        Self::Stream,
        Self::Json,
        Self::Object,
    ];

    const fn accepts(self, payload: &Payload) -> bool {
        match self {
            Self::FilePath => matches!(payload, Payload::File(_)),
            Self::Text => matches!(payload, Payload::Value(Value::Text(_))),
            Self::Bytes => matches!(payload, Payload::Value(Value::Bytes(_))),
            Self::Stream => matches!(payload, Payload::Stream(_)),
            Self::Json => matches!(payload, Payload::Value(Value::Json(_))),
            Self::Object => matches!(payload, Payload::Value(Value::Object(_))),
        }
    }

    fn apply(self, payload: Payload) -> StoreResult<Encoded> {
        match (self, payload) {
            (Self::FilePath, Payload::File(path)) => encode_file(&path),
            (Self::Text, Payload::Value(Value::Text(s))) => {
                Ok(Encoded::new(s.into_bytes(), TEXT_UTF8))
            }
            (Self::Bytes, Payload::Value(Value::Bytes(b))) => Ok(Encoded::new(b, OCTET_STREAM)),
            (Self::Stream, Payload::Stream(mut reader)) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Encoded::new(buf, OCTET_STREAM))
            }
            (Self::Json, Payload::Value(Value::Json(v))) => {
                Ok(Encoded::new(serde_json::to_vec(&v)?, JSON))
            }
            (Self::Object, Payload::Value(Value::Object(obj))) => {
                Ok(Encoded::new(obj.into_bytes(), BINARY_OBJECT))
            }
            (rule, payload) => Err(StoreError::serialization(format!(
                "encode rule {rule:?} does not apply to {payload:?}"
            ))),
        }
    }
}

fn encode_file(path: &Path) -> StoreResult<Encoded> {
    let bytes = fs::read(path)?;
    let content_type = sniff_content_type(path, &bytes);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    let mut encoded = Encoded::new(bytes, &content_type);
    encoded.extension = extension;
    Ok(encoded)
}

/// Guess a MIME type from file contents, then from the file name.
#[must_use]
pub fn sniff_content_type(path: &Path, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Encode a payload into bytes and a content descriptor.
pub fn encode(payload: Payload) -> StoreResult<Encoded> {
    let rule = Rule::CHAIN
        .into_iter()
        .find(|rule| rule.accepts(&payload))
        .ok_or_else(|| StoreError::serialization("no encoder accepts this payload"))?;
    rule.apply(payload)
}

/// Decode bytes using the stored content type.
///
/// # Errors
/// `UnsupportedContentType` for any type outside the known set.
pub fn decode(bytes: Vec<u8>, content_type: &str) -> StoreResult<Value> {
    match content_type {
        TEXT_UTF8 => String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|e| StoreError::serialization(format!("invalid utf-8 text: {e}"))),
        TEXT_PLAIN => {
            if !bytes.is_ascii() {
                return Err(StoreError::serialization("text/plain payload is not ascii"));
            }
            String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|e| StoreError::serialization(format!("invalid text: {e}")))
        }
        OCTET_STREAM => Ok(Value::Bytes(bytes)),
        JSON => Ok(Value::Json(serde_json::from_slice(&bytes)?)),
        BINARY_OBJECT => Ok(Value::Object(BinaryObject::from_bytes(bytes))),
        X_GZIP | GZIP => gunzip(&bytes).map(Value::Bytes),
        other => Err(StoreError::UnsupportedContentType {
            content_type: other.to_string(),
        }),
    }
}

/// Decode a remote object, honoring transparent compression.
///
/// A gzip content encoding, or an octet-stream object whose key ends in
/// `.gz`, is decompressed before decoding.
pub fn decode_remote(
    bytes: Vec<u8>,
    content_type: &str,
    content_encoding: Option<&str>,
    key: &str,
) -> StoreResult<Value> {
    if content_encoding.is_some_and(|e| e.eq_ignore_ascii_case("gzip")) {
        return gunzip(&bytes).map(Value::Bytes);
    }
    if content_type == OCTET_STREAM && key.ends_with(".gz") {
        return gunzip(&bytes).map(Value::Bytes);
    }
    decode(bytes, content_type)
}

fn gunzip(bytes: &[u8]) -> StoreResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Serialize an encoded value and its descriptor into one buffer.
#[must_use]
pub fn pack(encoded: &Encoded) -> Vec<u8> {
    let ct = encoded.content_type.as_bytes();
    let ext = encoded.extension.as_bytes();
    let mut out = Vec::with_capacity(1 + 2 + ct.len() + 2 + ext.len() + encoded.bytes.len());
    out.push(ENVELOPE_VERSION);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(ct.len().min(u16::MAX as usize) as u16).to_le_bytes());
    out.extend_from_slice(&ct[..ct.len().min(u16::MAX as usize)]);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(ext.len().min(u16::MAX as usize) as u16).to_le_bytes());
    out.extend_from_slice(&ext[..ext.len().min(u16::MAX as usize)]);
    out.extend_from_slice(&encoded.bytes);
    out
}

/// Parse a buffer produced by [`pack`].
pub fn unpack(buf: &[u8]) -> StoreResult<Encoded> {
    fn field<'a>(buf: &'a [u8], pos: &mut usize) -> StoreResult<&'a [u8]> {
        let len_bytes = buf
            .get(*pos..*pos + 2)
            .ok_or_else(|| StoreError::serialization("truncated envelope header"))?;
        let len = usize::from(u16::from_le_bytes([len_bytes[0], len_bytes[1]]));
        *pos += 2;
        let data = buf
            .get(*pos..*pos + len)
            .ok_or_else(|| StoreError::serialization("truncated envelope field"))?;
        *pos += len;
        Ok(data)
    }

    match buf.first() {
        Some(&ENVELOPE_VERSION) => {}
        Some(v) => {
            return Err(StoreError::serialization(format!(
                "unsupported envelope version: {v} (expected {ENVELOPE_VERSION})"
            )))
        }
        None => return Err(StoreError::serialization("empty envelope")),
    }

    let mut pos = 1;
    let content_type = String::from_utf8(field(buf, &mut pos)?.to_vec())
        .map_err(|e| StoreError::serialization(format!("bad content type: {e}")))?;
    let extension = String::from_utf8(field(buf, &mut pos)?.to_vec())
        .map_err(|e| StoreError::serialization(format!("bad extension: {e}")))?;
    let bytes = buf[pos..].to_vec();

    Ok(Encoded {
        size: bytes.len(),
        bytes,
        content_type,
        extension,
    })
}

/// Encode a payload straight into a packed envelope.
pub fn encode_packed(payload: Payload) -> StoreResult<Vec<u8>> {
    encode(payload).map(|e| pack(&e))
}

/// Decode a packed envelope straight into a value.
pub fn decode_packed(buf: &[u8]) -> StoreResult<Value> {
    let encoded = unpack(buf)?;
    decode(encoded.bytes, &encoded.content_type)
}
