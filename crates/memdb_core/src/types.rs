//! Core type definitions for memdb.

use std::fmt;
use std::sync::Arc;

/// An ordered index key.
///
/// Keys compare bytewise (lexicographically), so conversions from numbers
/// use big-endian encodings that preserve numeric order. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Arc<[u8]>);

impl IndexKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the empty key, which sorts before every other key.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(&[][..]))
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for IndexKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if !s.chars().any(char::is_control) => write!(f, "{s:?}"),
            _ => {
                f.write_str("0x")?;
                for b in self.0.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s.as_bytes()))
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for IndexKey {
    fn from(b: &[u8]) -> Self {
        Self(Arc::from(b))
    }
}

impl From<Vec<u8>> for IndexKey {
    fn from(b: Vec<u8>) -> Self {
        Self(Arc::from(b))
    }
}

impl From<u64> for IndexKey {
    fn from(n: u64) -> Self {
        Self(Arc::from(n.to_be_bytes().as_slice()))
    }
}

impl From<i64> for IndexKey {
    fn from(n: i64) -> Self {
        // Flipping the sign bit maps i64::MIN..=i64::MAX onto 0..=u64::MAX.
        let biased = (n as u64) ^ (1 << 63);
        Self(Arc::from(biased.to_be_bytes().as_slice()))
    }
}

impl From<bool> for IndexKey {
    fn from(b: bool) -> Self {
        Self(Arc::from([u8::from(b)].as_slice()))
    }
}

/// Sequence number of a WAL entry.
///
/// Entries are numbered from 1. Zero means nothing has been logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence number before the first entry.
    pub const ZERO: Self = Self(0);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the next sequence number, or `None` if the space is exhausted.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(seq) => Some(Self(seq)),
            None => None,
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_ordering() {
        let s1 = SequenceNumber::new(1);
        let s2 = SequenceNumber::new(2);
        assert!(s1 < s2);
        assert_eq!(SequenceNumber::default(), SequenceNumber::ZERO);
    }

    #[test]
    fn sequence_number_next() {
        let s1 = SequenceNumber::new(5);
        assert_eq!(s1.next().as_u64(), 6);
        assert_eq!(s1.to_string(), "seq:5");
        assert_eq!(s1.checked_next(), Some(SequenceNumber::new(6)));
        assert_eq!(SequenceNumber::new(u64::MAX).checked_next(), None);
    }

    #[test]
    fn string_keys_order_lexicographically() {
        let a = IndexKey::from("0001");
        let b = IndexKey::from("0002".to_string());
        assert!(a < b);
        assert!(IndexKey::empty() < a);
        assert_eq!(a.as_bytes(), b"0001");
    }

    #[test]
    fn unsigned_keys_order_numerically() {
        let keys: Vec<IndexKey> = [0u64, 1, 255, 256, u64::MAX]
            .into_iter()
            .map(IndexKey::from)
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn signed_keys_order_numerically() {
        let keys: Vec<IndexKey> = [i64::MIN, -300, -1, 0, 1, 300, i64::MAX]
            .into_iter()
            .map(IndexKey::from)
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn bool_keys() {
        assert!(IndexKey::from(false) < IndexKey::from(true));
        assert_eq!(IndexKey::from(true).len(), 1);
    }

    #[test]
    fn debug_rendering() {
        assert_eq!(format!("{:?}", IndexKey::from("abc")), "\"abc\"");
        assert_eq!(format!("{:?}", IndexKey::from(vec![0u8, 255])), "0x00ff");
    }
}
