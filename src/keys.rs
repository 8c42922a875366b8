//! Composite key codec.
//!
//! Every indexed key is the user key followed by an 8-byte big-endian
//! timestamp suffix. The suffix stores `u64::MAX - ts` so that plain byte
//! comparison of two suffixes orders newer timestamps first; combined with
//! the split comparator below, keys sort by user key ascending and, within
//! one user key, newest version first. Scans rely on this: seeking at
//! `key_with_ts(user_key, snapshot_ts)` lands on the newest version visible
//! at the snapshot.

use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};

/// Width of the timestamp suffix in bytes.
pub const TS_WIDTH: usize = 8;

/// Appends the timestamp suffix to a user key.
pub fn key_with_ts(user_key: &[u8], ts: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_key.len() + TS_WIDTH);
    out.extend_from_slice(user_key);
    let mut suffix = [0u8; TS_WIDTH];
    BigEndian::write_u64(&mut suffix, u64::MAX - ts);
    out.extend_from_slice(&suffix);
    out
}

/// Extracts the timestamp from a composite key.
///
/// Panics if the key has no timestamp suffix; all callers must pass
/// composite keys.
pub fn parse_ts(key: &[u8]) -> u64 {
    assert!(
        key.len() >= TS_WIDTH,
        "composite key must carry an {TS_WIDTH}-byte timestamp suffix, got {} bytes",
        key.len()
    );
    u64::MAX - BigEndian::read_u64(&key[key.len() - TS_WIDTH..])
}

/// Strips the timestamp suffix, returning the user key.
///
/// Panics if the key has no timestamp suffix.
pub fn user_key(key: &[u8]) -> &[u8] {
    assert!(
        key.len() >= TS_WIDTH,
        "composite key must carry an {TS_WIDTH}-byte timestamp suffix, got {} bytes",
        key.len()
    );
    &key[..key.len() - TS_WIDTH]
}

/// Compares two composite keys: user-key prefix first, timestamp suffix on
/// equality. A plain byte comparison of whole keys would order `a<ts>`
/// against `aa<ts>` by suffix bytes instead of by user key.
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    let (a_key, a_suffix) = a.split_at(a.len() - TS_WIDTH);
    let (b_key, b_suffix) = b.split_at(b.len() - TS_WIDTH);
    a_key.cmp(b_key).then_with(|| a_suffix.cmp(b_suffix))
}

/// A composite key ordered by [`compare_keys`], usable as the key of an
/// ordered map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey(pub Vec<u8>);

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.0, &other.0)
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Vec<u8>> for CompositeKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for CompositeKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
