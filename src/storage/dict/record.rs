//! Binary framing for dictionary files.
//!
//! ```text
//! header: [MAGIC: 4 bytes][version: 1 byte][generation: 16 bytes]
//! record: [version: 1][op: 1][key len: 4 LE][value len: 4 LE][key][value][crc32: 4 LE]
//! ```
//!
//! The CRC covers everything in the record before it.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use uuid::Uuid;

/// Current record format version.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes identifying a dictionary file.
pub const MAGIC: [u8; 4] = *b"KSDB";

/// Header size in bytes.
pub const HEADER_LEN: u64 = 4 + 1 + 16;

// Sanity check: reject unreasonably large entries (100 MB max)
const MAX_ENTRY_SIZE: usize = 100 * 1024 * 1024;

const FIXED_LEN: usize = 1 + 1 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Put = 1,
    Delete = 2,
}

impl Op {
    fn from_byte(b: u8) -> IoResult<Self> {
        match b {
            1 => Ok(Self::Put),
            2 => Ok(Self::Delete),
            other => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("unknown record op: {other}"),
            )),
        }
    }
}

/// One mutation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub key: String,
    pub value: Vec<u8>,
}

impl Record {
    pub fn put(key: &str, value: Vec<u8>) -> Self {
        Self {
            op: Op::Put,
            key: key.to_string(),
            value,
        }
    }

    pub fn delete(key: &str) -> Self {
        Self {
            op: Op::Delete,
            key: key.to_string(),
            value: Vec::new(),
        }
    }

    /// Bytes this record occupies on disk.
    pub fn encoded_len(&self) -> u64 {
        (FIXED_LEN + self.key.len() + self.value.len()) as u64
    }

    pub fn encode(&self) -> IoResult<Vec<u8>> {
        let key = self.key.as_bytes();
        if key.len() > MAX_ENTRY_SIZE || self.value.len() > MAX_ENTRY_SIZE {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                format!("entry for {} exceeds maximum {MAX_ENTRY_SIZE}", self.key),
            ));
        }

        let mut out = Vec::with_capacity(FIXED_LEN + key.len() + self.value.len());
        out.push(FORMAT_VERSION);
        out.push(self.op as u8);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&self.value);

        let mut hasher = Hasher::new();
        hasher.update(&out);
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(out)
    }

    /// Read one record, verifying its checksum.
    ///
    /// A record cut off by end of file surfaces as `UnexpectedEof`.
    pub fn decode(reader: &mut impl Read) -> IoResult<Self> {
        let mut fixed = [0u8; 10];
        reader.read_exact(&mut fixed)?;

        if fixed[0] != FORMAT_VERSION {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("unsupported record version: {} (expected {FORMAT_VERSION})", fixed[0]),
            ));
        }
        let op = Op::from_byte(fixed[1])?;
        let key_len = u32::from_le_bytes([fixed[2], fixed[3], fixed[4], fixed[5]]) as usize;
        let value_len = u32::from_le_bytes([fixed[6], fixed[7], fixed[8], fixed[9]]) as usize;
        if key_len > MAX_ENTRY_SIZE || value_len > MAX_ENTRY_SIZE {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("entry size {} exceeds maximum {MAX_ENTRY_SIZE}", key_len.max(value_len)),
            ));
        }

        let mut body = vec![0u8; key_len + value_len];
        reader.read_exact(&mut body)?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes)?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = Hasher::new();
        hasher.update(&fixed);
        hasher.update(&body);
        let computed_crc = hasher.finalize();
        if stored_crc != computed_crc {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"),
            ));
        }

        let value = body.split_off(key_len);
        let key = String::from_utf8(body)
            .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("key is not utf-8: {e}")))?;
        Ok(Self { op, key, value })
    }
}

/// Write the file header for a generation.
pub fn write_header(writer: &mut impl Write, generation: Uuid) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])?;
    writer.write_all(generation.as_bytes())?;
    Ok(())
}

/// Read and validate the file header, returning its generation.
pub fn read_header(reader: &mut impl Read) -> IoResult<Uuid> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported dictionary version: {}", version[0]),
        ));
    }

    let mut generation = [0u8; 16];
    reader.read_exact(&mut generation)?;
    Ok(Uuid::from_bytes(generation))
}
