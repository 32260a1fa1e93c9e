//! Incremental response-frame parser.
//!
//! The parser is fed raw socket reads and extracts complete frames: zero
//! or more length-prefixed blobs followed by an empty terminator line.
//! Each blob is `<ascii-decimal-length>\n<payload><terminator>` where the
//! terminator is `\n` or `\r\n`; the length line itself may also end in
//! `\r\n`. Data may arrive fragmented at arbitrary byte boundaries: a
//! parse attempt either consumes exactly one whole frame or leaves the
//! buffer untouched.

use bytes::Bytes;

use super::buffer::RecvBuffer;
use super::frame::Frame;
use crate::error::{Result, SsdbError};

/// Longest accepted length line, terminator included.
const MAX_HEADER_LEN: usize = 19;

/// Stateless scanner over a growable receive buffer.
///
/// "Stateless" in the sense that every attempt re-scans from offset zero;
/// the only state between attempts is the buffered bytes themselves.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: RecvBuffer,
}

impl FrameParser {
    /// Create a parser with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: RecvBuffer::new(),
        }
    }

    /// Append bytes read from the socket.
    ///
    /// # Errors
    ///
    /// Returns [`SsdbError::BufferLimit`] when the buffer would exceed its
    /// hard cap.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.buf.append(data)
    }

    /// Try to extract one complete frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` when a full frame was parsed; exactly its bytes
    ///   have been consumed from the buffer
    /// - `Ok(None)` when more data is needed; the buffer is unchanged
    /// - `Err(..)` on a malformed length line; the connection must be
    ///   dropped since the stream can no longer be re-synchronized
    pub fn try_parse(&mut self) -> Result<Option<Frame>> {
        match scan(self.buf.as_slice())? {
            Some((consumed, blobs)) => {
                self.buf.consume(consumed);
                Ok(Some(Frame::new(blobs)))
            }
            None => Ok(None),
        }
    }

    /// Drop all buffered bytes and release storage. Called on disconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Scan for one complete frame. Returns the byte count to consume and the
/// copied-out blobs, or `None` when the data ends mid-frame.
fn scan(data: &[u8]) -> Result<Option<(usize, Vec<Bytes>)>> {
    let mut cursor = 0usize;
    let mut blobs = Vec::new();

    loop {
        let nl = match data[cursor..].iter().position(|&b| b == b'\n') {
            Some(offset) => cursor + offset,
            None => return Ok(None),
        };
        let header = &data[cursor..=nl];

        // An empty line where a length would start terminates the frame.
        if header == b"\n" || header == b"\r\n" {
            return Ok(Some((nl + 1, blobs)));
        }

        let line = strip_line_terminator(header);
        if !line.first().is_some_and(|b| b.is_ascii_digit()) {
            return Err(SsdbError::Protocol(
                "length line does not start with a digit".into(),
            ));
        }
        if header.len() > MAX_HEADER_LEN {
            return Err(SsdbError::Protocol("length line too long".into()));
        }
        let size = parse_length(line)?;

        let payload_start = nl + 1;
        // u64 math so a huge declared length cannot overflow the cursor.
        let payload_end = payload_start as u64 + size;
        if payload_end >= data.len() as u64 {
            // Payload or its terminator not buffered yet.
            return Ok(None);
        }
        let payload_end = payload_end as usize;

        match data[payload_end] {
            b'\n' => {
                blobs.push(Bytes::copy_from_slice(&data[payload_start..payload_end]));
                cursor = payload_end + 1;
            }
            b'\r' => {
                if payload_end + 1 >= data.len() {
                    return Ok(None);
                }
                if data[payload_end + 1] != b'\n' {
                    return Ok(None);
                }
                blobs.push(Bytes::copy_from_slice(&data[payload_start..payload_end]));
                cursor = payload_end + 2;
            }
            _ => return Ok(None),
        }
    }
}

/// Strip the trailing `\n` and an optional `\r` before it.
fn strip_line_terminator(header: &[u8]) -> &[u8] {
    let line = &header[..header.len() - 1];
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Parse an all-digit decimal length.
fn parse_length(line: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for &b in line {
        if !b.is_ascii_digit() {
            return Err(SsdbError::Protocol(
                "length line contains a non-digit".into(),
            ));
        }
        value = value * 10 + u64::from(b - b'0');
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &mut FrameParser) -> Option<Frame> {
        parser.try_parse().unwrap()
    }

    fn blob_strs(frame: &Frame) -> Vec<&[u8]> {
        frame.blobs().iter().map(|b| b.as_ref()).collect()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n3\nfoo\n\n").unwrap();
        let frame = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&frame), vec![&b"ok"[..], &b"foo"[..]]);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_blobless_frame_is_just_the_terminator() {
        let mut parser = FrameParser::new();
        parser.feed(b"\n").unwrap();
        let frame = parse_all(&mut parser).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_incomplete_leaves_buffer_untouched() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n3\nfo").unwrap();
        assert!(parse_all(&mut parser).is_none());
        assert_eq!(parser.buffered(), 10);
    }

    #[test]
    fn test_frame_requires_trailing_empty_line() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n").unwrap();
        assert!(parse_all(&mut parser).is_none());
        parser.feed(b"\n").unwrap();
        assert!(parse_all(&mut parser).is_some());
    }

    #[test]
    fn test_byte_at_a_time_matches_bulk_feed() {
        let wire = b"2\nok\n1\na\n2\nbc\n\n";

        let mut bulk = FrameParser::new();
        bulk.feed(wire).unwrap();
        let expected = parse_all(&mut bulk).unwrap();

        let mut trickle = FrameParser::new();
        let mut got = None;
        for byte in wire {
            trickle.feed(&[*byte]).unwrap();
            if let Some(frame) = parse_all(&mut trickle) {
                got = Some(frame);
            }
        }
        assert_eq!(got.unwrap(), expected);
    }

    #[test]
    fn test_chunked_at_every_split_point() {
        let wire = b"2\nok\n5\nhello\n\n";
        for split in 1..wire.len() {
            let mut parser = FrameParser::new();
            parser.feed(&wire[..split]).unwrap();
            let early = parse_all(&mut parser);
            parser.feed(&wire[split..]).unwrap();
            let frame = early.or_else(|| parse_all(&mut parser)).unwrap();
            assert_eq!(blob_strs(&frame), vec![&b"ok"[..], &b"hello"[..]]);
        }
    }

    #[test]
    fn test_crlf_terminators_accepted_everywhere() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\r\nok\r\n3\r\nfoo\r\n\r\n").unwrap();
        let frame = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&frame), vec![&b"ok"[..], &b"foo"[..]]);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_zero_length_blob() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n0\n\n\n").unwrap();
        let frame = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&frame), vec![&b"ok"[..], &b""[..]]);
    }

    #[test]
    fn test_payload_may_contain_newlines() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n3\na\nb\n\n").unwrap();
        let frame = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&frame), vec![&b"ok"[..], &b"a\nb"[..]]);
    }

    #[test]
    fn test_two_frames_parse_one_at_a_time() {
        let mut parser = FrameParser::new();
        parser.feed(b"2\nok\n\n9\nnot_found\n\n").unwrap();
        let first = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&first), vec![&b"ok"[..]]);
        let second = parse_all(&mut parser).unwrap();
        assert_eq!(blob_strs(&second), vec![&b"not_found"[..]]);
        assert!(parse_all(&mut parser).is_none());
    }

    #[test]
    fn test_non_digit_length_is_an_error() {
        let mut parser = FrameParser::new();
        parser.feed(b"x\nok\n\n").unwrap();
        assert!(matches!(
            parser.try_parse(),
            Err(SsdbError::Protocol(_))
        ));
    }

    #[test]
    fn test_embedded_non_digit_is_an_error() {
        let mut parser = FrameParser::new();
        parser.feed(b"1a\nok\n\n").unwrap();
        assert!(parser.try_parse().is_err());
    }

    #[test]
    fn test_oversize_length_line_is_an_error() {
        let mut parser = FrameParser::new();
        parser.feed(b"11111111111111111111\n").unwrap();
        assert!(parser.try_parse().is_err());
    }

    #[test]
    fn test_nineteen_byte_header_is_accepted_as_incomplete() {
        // 18 digits + \n = 19 bytes, within the limit; the declared
        // payload is nowhere near buffered so this parses as incomplete.
        let mut parser = FrameParser::new();
        parser.feed(b"100000000000000000\n").unwrap();
        assert!(parser.try_parse().unwrap().is_none());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut parser = FrameParser::new();
        parser.feed(b"5\nhel").unwrap();
        parser.reset();
        assert_eq!(parser.buffered(), 0);
        parser.feed(b"2\nok\n\n").unwrap();
        assert!(parse_all(&mut parser).is_some());
    }
}
