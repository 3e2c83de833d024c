//! Byte View Module
//!
//! Immutable view over cached bytes.

use std::fmt;

use bytes::Bytes;

// == Byte Size ==
/// Anything whose memory footprint can be charged against a byte budget.
pub trait ByteSize {
    /// Number of bytes this value accounts for.
    fn byte_size(&self) -> usize;
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

// == Byte View ==
/// An immutable sequence of bytes handed out by the cache.
///
/// Cloning is cheap (reference counted) and no clone can mutate the bytes
/// seen by another, so readers never observe cache-internal state changing
/// under them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    // == Constructor ==
    /// Copies `data` into a new view. The caller keeps ownership of `data`.
    pub fn copy_from(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// Number of bytes in the view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrows the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns an owned copy of the bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Shares the bytes without copying, for handing to an HTTP body.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl ByteSize for ByteView {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView").field("len", &self.len()).finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_detaches_from_source() {
        let mut source = b"hello".to_vec();
        let view = ByteView::copy_from(&source);

        source[0] = b'j';

        assert_eq!(view.as_slice(), b"hello");
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn test_to_vec_is_independent_copy() {
        let view = ByteView::copy_from(b"abc");
        let mut owned = view.to_vec();
        owned.push(b'd');

        assert_eq!(view.as_slice(), b"abc");
        assert_eq!(owned, b"abcd");
    }

    #[test]
    fn test_display_is_lossy_utf8() {
        let view = ByteView::copy_from(b"630");
        assert_eq!(view.to_string(), "630");
    }

    #[test]
    fn test_empty_view() {
        let view = ByteView::default();
        assert!(view.is_empty());
        assert_eq!(view.byte_size(), 0);
    }
}
