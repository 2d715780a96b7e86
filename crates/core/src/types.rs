//! Core types for the transaction engine
//!
//! This module defines the fundamental identifiers used throughout the system:
//! - [`Key`]: Fixed-width, byte-ordered record key
//! - [`Tid`]: 64-bit transaction / version identifier
//! - [`TableId`], [`PartitionId`], [`WorkerId`]: dense indices

use serde::{Deserialize, Serialize};

/// Width of a [`Key`] in bytes.
pub const KEY_LEN: usize = 16;

/// Dense table index (0..tables).
pub type TableId = usize;

/// Dense partition index (0..partitions).
pub type PartitionId = usize;

/// Dense worker index. One worker thread per partition.
pub type WorkerId = usize;

/// Worker ids a [`Tid`] can carry; ids are `0..MAX_WORKERS`.
pub const MAX_WORKERS: usize = 256;

/// Fixed-width key identifying a tuple within a table and partition
///
/// Keys compare byte-by-byte. The integer constructors encode big-endian so
/// that byte order matches numeric order, which keeps the OCC commit-time
/// lock order identical to the natural key order.
///
/// # Examples
///
/// ```
/// use adaptcc_core::types::Key;
///
/// let a = Key::from_u64(1);
/// let b = Key::from_u64(256);
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Create a key from raw bytes
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Key(bytes)
    }

    /// Encode a single integer id into the low 8 bytes
    pub fn from_u64(id: u64) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes[KEY_LEN - 8..].copy_from_slice(&id.to_be_bytes());
        Key(bytes)
    }

    /// Encode a composite key of up to four 32-bit components
    ///
    /// Components are laid out most-significant first, so composite keys sort
    /// by their first component, then the second, and so on.
    ///
    /// ```
    /// use adaptcc_core::types::Key;
    ///
    /// let k = Key::from_parts(&[3, 7]);
    /// assert_eq!(k.part(0), Some(3));
    /// assert_eq!(k.part(1), Some(7));
    /// assert_eq!(k.part(2), Some(0));
    /// assert_eq!(k.part(4), None);
    /// ```
    pub fn from_parts(parts: &[u32]) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        for (i, p) in parts.iter().take(KEY_LEN / 4).enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&p.to_be_bytes());
        }
        Key(bytes)
    }

    /// Read back the `index`-th 32-bit component; `None` past the fourth
    pub fn part(&self, index: usize) -> Option<u32> {
        if index >= KEY_LEN / 4 {
            return None;
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.0[index * 4..index * 4 + 4]);
        Some(u32::from_be_bytes(word))
    }

    /// Read back the low 8 bytes as an integer
    pub fn as_u64(&self) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[KEY_LEN - 8..]);
        u64::from_be_bytes(word)
    }

    /// Raw byte view
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl From<u64> for Key {
    fn from(id: u64) -> Self {
        Key::from_u64(id)
    }
}

/// Transaction / version identifier
///
/// A TID doubles as a commit version (published on OCC records) and as a
/// transaction age (wait-die ordering: smaller is older).
///
/// Layout of TIDs drawn by a worker:
///
/// ```text
///  63        16 15     8 7       0
/// +------------+--------+---------+
/// |  counter   | worker | counter |
/// |            |   id   |  % 256  |
/// +------------+--------+---------+
/// ```
///
/// Bit 63 is never set in a drawn TID; it is reserved for the write-lock bit
/// of the versioned mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tid(u64);

impl Tid {
    /// The zero TID, older than every drawn TID
    pub const ZERO: Tid = Tid(0);

    /// Bits below the counter
    pub const COUNTER_SHIFT: u32 = 16;

    /// Wrap a raw value
    pub const fn new(raw: u64) -> Self {
        Tid(raw)
    }

    /// Compose a TID from a worker counter and worker id
    pub fn compose(counter: u64, worker: WorkerId) -> Self {
        Tid(counter << Self::COUNTER_SHIFT | ((worker as u64) & 0xff) << 8 | (counter % 256))
    }

    /// Raw value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The worker-local counter this TID was drawn from
    pub const fn counter(self) -> u64 {
        self.0 >> Self::COUNTER_SHIFT
    }

    /// The worker id embedded in this TID
    pub const fn worker(self) -> u64 {
        (self.0 >> 8) & 0xff
    }
}

impl std::fmt::Display for Tid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
