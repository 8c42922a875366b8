//! Per-segment value storage.
//!
//! A [`ValueLog`] is an append-only sequence of value records owned by one
//! segment. Appending returns a [`ValueHandle`], a stable reference that
//! dereferences to the same record for the segment's lifetime. There is no
//! per-entry removal; reclamation is segment-granular via [`ValueLog::clear`].

use std::sync::{Arc, Mutex};

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::errdata;
use crate::error::Result;

/// Encoded header: meta (u8) followed by cas_counter (u16, big-endian).
pub const VALUE_HEADER_SIZE: usize = 3;

/// A value record: opaque payload plus metadata carried through from the
/// surrounding store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueStruct {
    pub meta: u8,
    pub cas_counter: u16,
    pub value: Vec<u8>,
}

impl ValueStruct {
    /// A record holding just a payload.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Size of the encoded record in bytes.
    pub fn encoded_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.value.len()
    }

    /// Appends the encoded record to `buf`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        let mut header = [0u8; VALUE_HEADER_SIZE];
        header[0] = self.meta;
        BigEndian::write_u16(&mut header[1..], self.cas_counter);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.value);
    }

    /// Decodes a record previously written by [`encode_to`](Self::encode_to).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < VALUE_HEADER_SIZE {
            return errdata!("value record too short: {} bytes", buf.len());
        }
        Ok(Self {
            meta: buf[0],
            cas_counter: BigEndian::read_u16(&buf[1..VALUE_HEADER_SIZE]),
            value: buf[VALUE_HEADER_SIZE..].to_vec(),
        })
    }
}

impl From<&[u8]> for ValueStruct {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

/// A stable reference to a record inside one segment's value log.
///
/// Handles stay memory-safe after the segment is freed, but the record they
/// point at is no longer reachable through the segment.
#[derive(Debug, Clone)]
pub struct ValueHandle(Arc<ValueStruct>);

impl ValueHandle {
    pub fn value(&self) -> &ValueStruct {
        &self.0
    }
}

/// Append-only value storage for one segment.
#[derive(Debug, Default)]
pub struct ValueLog {
    entries: Mutex<Vec<ValueHandle>>,
}

impl ValueLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its handle. O(1).
    pub fn push(&self, value: ValueStruct) -> Result<ValueHandle> {
        let handle = ValueHandle(Arc::new(value));
        self.entries.lock()?.push(handle.clone());
        Ok(handle)
    }

    /// Drops all records. Outstanding handles remain valid to their holders.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
