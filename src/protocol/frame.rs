//! Response frame: an ordered sequence of byte blobs.
//!
//! One frame corresponds to one complete server response. The first blob
//! carries the status keyword (`ok`, `not_found`, or an error label); the
//! remaining blobs are the payload. Blobs use `bytes::Bytes` so cloning a
//! frame or handing blobs to callers is cheap.

use bytes::Bytes;

/// A complete server response frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    blobs: Vec<Bytes>,
}

impl Frame {
    /// Build a frame from its blobs.
    pub fn new(blobs: Vec<Bytes>) -> Self {
        Self { blobs }
    }

    /// The status blob, i.e. the first blob of the frame.
    #[inline]
    pub fn status(&self) -> Option<&[u8]> {
        self.blobs.first().map(|b| b.as_ref())
    }

    /// The payload blobs following the status.
    #[inline]
    pub fn body(&self) -> &[Bytes] {
        if self.blobs.is_empty() {
            &[]
        } else {
            &self.blobs[1..]
        }
    }

    /// All blobs, status included.
    #[inline]
    pub fn blobs(&self) -> &[Bytes] {
        &self.blobs
    }

    /// Consume the frame, dropping the status and returning the payload.
    pub fn into_body(mut self) -> Vec<Bytes> {
        if self.blobs.is_empty() {
            return Vec::new();
        }
        self.blobs.remove(0);
        self.blobs
    }

    /// Number of blobs, status included.
    #[inline]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// An empty frame signals a closed connection.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(parts: &[&[u8]]) -> Frame {
        Frame::new(parts.iter().map(|p| Bytes::copy_from_slice(p)).collect())
    }

    #[test]
    fn test_status_and_body_split() {
        let frame = frame_of(&[b"ok", b"a", b"b"]);
        assert_eq!(frame.status(), Some(&b"ok"[..]));
        assert_eq!(frame.body().len(), 2);
        assert_eq!(frame.body()[0], Bytes::from_static(b"a"));
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::default();
        assert!(frame.is_empty());
        assert_eq!(frame.status(), None);
        assert!(frame.body().is_empty());
    }

    #[test]
    fn test_status_only_frame_has_empty_body() {
        let frame = frame_of(&[b"ok"]);
        assert!(!frame.is_empty());
        assert!(frame.body().is_empty());
        assert!(frame.into_body().is_empty());
    }

    #[test]
    fn test_into_body_drops_status() {
        let frame = frame_of(&[b"ok", b"x"]);
        let body = frame.into_body();
        assert_eq!(body, vec![Bytes::from_static(b"x")]);
    }
}
