//! Request serialization.
//!
//! A request is the command name followed by its arguments, each emitted
//! as `<ascii-decimal-length>\n<token>\n`, with one extra `\n` closing the
//! request. Only `\n` is ever emitted; `\r\n` is a parse-side tolerance.

use bytes::{BufMut, Bytes, BytesMut};

/// One request token: raw bytes or an integer rendered as decimal ASCII
/// at encode time.
///
/// The closed set of conversions below is the whole coercion surface;
/// anything else simply does not convert into an [`Arg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Raw bytes, sent verbatim. Text converts through its UTF-8 bytes.
    Bytes(Bytes),
    /// Integer, sent as its decimal ASCII representation.
    Int(i64),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Bytes(Bytes::from(value.into_bytes()))
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(value: &[u8; N]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u16> for Arg {
    fn from(value: u16) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::Int(value as i64)
    }
}

/// Map a command to its on-wire spelling. The server's native spelling of
/// `delete` is `del`.
pub fn canonical_name(name: &str) -> &str {
    if name == "delete" {
        "del"
    } else {
        name
    }
}

/// Serialize a request to wire bytes.
pub fn encode_request(name: &str, args: &[Arg]) -> Bytes {
    let name = canonical_name(name);
    let mut out = BytesMut::with_capacity(request_size_hint(name, args));
    put_token(&mut out, name.as_bytes());
    for arg in args {
        match arg {
            Arg::Bytes(bytes) => put_token(&mut out, bytes),
            Arg::Int(value) => {
                let (digits, len) = format_int(*value);
                put_token(&mut out, &digits[..len]);
            }
        }
    }
    out.put_u8(b'\n');
    out.freeze()
}

fn request_size_hint(name: &str, args: &[Arg]) -> usize {
    // Length line worst case: 20 digits + newline, plus token + newline.
    let per_token = 22;
    let payload: usize = args
        .iter()
        .map(|arg| match arg {
            Arg::Bytes(bytes) => bytes.len(),
            Arg::Int(_) => 20,
        })
        .sum();
    name.len() + payload + per_token * (args.len() + 1) + 1
}

fn put_token(out: &mut BytesMut, token: &[u8]) {
    let (digits, len) = format_uint(token.len() as u64);
    out.put_slice(&digits[..len]);
    out.put_u8(b'\n');
    out.put_slice(token);
    out.put_u8(b'\n');
}

/// Render an unsigned integer into a stack buffer, avoiding a heap
/// allocation per token.
fn format_uint(mut value: u64) -> ([u8; 20], usize) {
    let mut buf = [0u8; 20];
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    let mut len = 0;
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}

fn format_int(value: i64) -> ([u8; 21], usize) {
    let mut buf = [0u8; 21];
    let (digits, len) = format_uint(value.unsigned_abs());
    if value < 0 {
        buf[0] = b'-';
        buf[1..=len].copy_from_slice(&digits[..len]);
        (buf, len + 1)
    } else {
        buf[..len].copy_from_slice(&digits[..len]);
        (buf, len)
    }
}
