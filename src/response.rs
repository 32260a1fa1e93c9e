//! Response classification and interpretation.
//!
//! Every command maps to exactly one response class, which fixes the
//! shape of the value extracted from a successful frame. The table is
//! built once on first use; a command name appearing in two classes is a
//! programming error and panics at table build.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;

use crate::error::{Result, SsdbError};
use crate::protocol::{canonical_name, Frame};

/// Shape of the value a command's response body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// No payload; success carries no value.
    NoResponse,
    /// Single integer in the first body blob.
    Int,
    /// Single float in the first body blob.
    Float,
    /// First body blob, verbatim.
    Bytes,
    /// The whole body as an ordered sequence.
    List,
    /// Body pairs as an ordered byte-to-byte mapping.
    StrMap,
    /// Body pairs with integer values.
    IntMap,
    /// Cursor page: byte values plus the key to resume from.
    StrMapScan,
    /// Cursor page with integer values.
    IntMapScan,
}

/// How non-digit values in integer-map bodies are handled.
///
/// The wire format carries scores and counts as ASCII; historically a
/// value that is not all digits coerces to `-1` rather than failing,
/// which masks protocol mismatches. Strict mode surfaces them instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntValueMode {
    /// Non-digit values become `-1`.
    #[default]
    Lenient,
    /// Non-digit values are a protocol error.
    Strict,
}

/// One page of a cursor scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<V> {
    /// Key to pass as the next scan's start, absent when the page is
    /// empty (the scan is finished).
    pub next: Option<Bytes>,
    /// Entries in server order.
    pub entries: Vec<(Bytes, V)>,
}

impl<V> ScanPage<V> {
    /// True when the scan returned nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A successfully interpreted response value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Integer result.
    Int(i64),
    /// Float result.
    Float(f64),
    /// Raw byte payload.
    Bytes(Bytes),
    /// Ordered sequence of byte blobs.
    List(Vec<Bytes>),
    /// Ordered byte-to-byte mapping.
    StrMap(Vec<(Bytes, Bytes)>),
    /// Ordered byte-to-integer mapping.
    IntMap(Vec<(Bytes, i64)>),
    /// Scan page with byte values.
    StrScan(ScanPage<Bytes>),
    /// Scan page with integer values.
    IntScan(ScanPage<i64>),
}

const NO_RESPONSE_COMMANDS: &[&str] = &["ping", "qset"];

const INT_COMMANDS: &[&str] = &[
    "auth",
    "dbsize",
    "set",
    "setx",
    "setnx",
    "expire",
    "ttl",
    "del",
    "incr",
    "decr",
    "exists",
    "getbit",
    "setbit",
    "bitcount",
    "countbit",
    "strlen",
    "multi_set",
    "multi_del",
    "hset",
    "hdel",
    "hincr",
    "hdecr",
    "hexists",
    "hsize",
    "hclear",
    "multi_hset",
    "multi_hdel",
    "zset",
    "zget",
    "zdel",
    "zincr",
    "zdecr",
    "zexists",
    "zsize",
    "zrank",
    "zrrank",
    "zclear",
    "zcount",
    "zsum",
    "zremrangebyrank",
    "zremrangebyscore",
    "multi_zset",
    "multi_zdel",
    "qsize",
    "qclear",
    "qpush",
    "qpush_front",
    "qpush_back",
    "qtrim_front",
    "qtrim_back",
];

const FLOAT_COMMANDS: &[&str] = &["zavg"];

const BYTES_COMMANDS: &[&str] = &[
    "version", "get", "getset", "substr", "hget", "qfront", "qback", "qget",
];

const LIST_COMMANDS: &[&str] = &[
    "info",
    "keys",
    "rkeys",
    "hlist",
    "hrlist",
    "hkeys",
    "zlist",
    "zrlist",
    "zkeys",
    "qlist",
    "qrlist",
    "qrange",
    "qslice",
    "qpop",
    "qpop_front",
    "qpop_back",
];

const STR_MAP_COMMANDS: &[&str] = &["multi_get", "hgetall", "multi_hget"];

const INT_MAP_COMMANDS: &[&str] = &[
    "multi_exists",
    "multi_hexists",
    "multi_hsize",
    "zrange",
    "zrrange",
    "zpop_front",
    "zpop_back",
    "multi_zget",
    "multi_zexists",
    "multi_zsize",
];

const STR_MAP_SCAN_COMMANDS: &[&str] = &["scan", "rscan", "hscan", "hrscan"];

const INT_MAP_SCAN_COMMANDS: &[&str] = &["zscan", "zrscan"];

const CLASS_GROUPS: &[(ResponseClass, &[&str])] = &[
    (ResponseClass::NoResponse, NO_RESPONSE_COMMANDS),
    (ResponseClass::Int, INT_COMMANDS),
    (ResponseClass::Float, FLOAT_COMMANDS),
    (ResponseClass::Bytes, BYTES_COMMANDS),
    (ResponseClass::List, LIST_COMMANDS),
    (ResponseClass::StrMap, STR_MAP_COMMANDS),
    (ResponseClass::IntMap, INT_MAP_COMMANDS),
    (ResponseClass::StrMapScan, STR_MAP_SCAN_COMMANDS),
    (ResponseClass::IntMapScan, INT_MAP_SCAN_COMMANDS),
];

fn class_table() -> &'static HashMap<&'static str, ResponseClass> {
    static TABLE: OnceLock<HashMap<&'static str, ResponseClass>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for (class, names) in CLASS_GROUPS {
            for name in *names {
                let previous = table.insert(*name, *class);
                assert!(
                    previous.is_none(),
                    "command {name} classified twice"
                );
            }
        }
        table
    })
}

/// Look up the response class of a command, `None` for unknown commands.
pub fn response_class(cmd: &str) -> Option<ResponseClass> {
    class_table().get(canonical_name(cmd)).copied()
}

/// Interpret a response frame for the given command.
///
/// Returns `Ok(None)` for an absent value: a `not_found` status, or
/// success on a command whose class carries no payload.
///
/// # Errors
///
/// - [`SsdbError::ConnectionClosed`] on an empty frame
/// - [`SsdbError::Remote`] when the status is neither `ok` nor `not_found`
/// - [`SsdbError::UnknownCommand`] when the command is not classified
/// - [`SsdbError::Protocol`] when the body does not fit the class shape
pub fn interpret(cmd: &str, frame: &Frame, mode: IntValueMode) -> Result<Option<Reply>> {
    let status = match frame.status() {
        Some(status) => status,
        None => return Err(SsdbError::ConnectionClosed),
    };
    if status == b"not_found" {
        return Ok(None);
    }
    if status != b"ok" {
        return Err(SsdbError::Remote(
            String::from_utf8_lossy(status).into_owned(),
        ));
    }

    let class = response_class(cmd)
        .ok_or_else(|| SsdbError::UnknownCommand(cmd.to_string()))?;
    let body = frame.body();

    let reply = match class {
        ResponseClass::NoResponse => return Ok(None),
        ResponseClass::Int => Reply::Int(parse_int(first_blob(body)?)?),
        ResponseClass::Float => Reply::Float(parse_float(first_blob(body)?)?),
        ResponseClass::Bytes => Reply::Bytes(first_blob(body)?.clone()),
        ResponseClass::List => Reply::List(body.to_vec()),
        ResponseClass::StrMap => Reply::StrMap(str_pairs(body)?),
        ResponseClass::IntMap => Reply::IntMap(int_pairs(body, mode)?),
        ResponseClass::StrMapScan => Reply::StrScan(ScanPage {
            next: scan_cursor(body)?,
            entries: str_pairs(body)?,
        }),
        ResponseClass::IntMapScan => Reply::IntScan(ScanPage {
            next: scan_cursor(body)?,
            entries: int_pairs(body, mode)?,
        }),
    };
    Ok(Some(reply))
}

fn first_blob(body: &[Bytes]) -> Result<&Bytes> {
    body.first()
        .ok_or_else(|| SsdbError::Protocol("response body is empty".into()))
}

fn parse_int(blob: &Bytes) -> Result<i64> {
    let text = std::str::from_utf8(blob)
        .map_err(|_| SsdbError::Protocol("integer body is not UTF-8".into()))?;
    text.parse::<i64>()
        .map_err(|_| SsdbError::Protocol(format!("invalid integer body: {text:?}")))
}

fn parse_float(blob: &Bytes) -> Result<f64> {
    let text = std::str::from_utf8(blob)
        .map_err(|_| SsdbError::Protocol("float body is not UTF-8".into()))?;
    text.parse::<f64>()
        .map_err(|_| SsdbError::Protocol(format!("invalid float body: {text:?}")))
}

fn str_pairs(body: &[Bytes]) -> Result<Vec<(Bytes, Bytes)>> {
    if body.len() % 2 != 0 {
        return Err(SsdbError::Protocol("odd-length map body".into()));
    }
    Ok(body
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

fn int_pairs(body: &[Bytes], mode: IntValueMode) -> Result<Vec<(Bytes, i64)>> {
    if body.len() % 2 != 0 {
        return Err(SsdbError::Protocol("odd-length map body".into()));
    }
    let mut entries = Vec::with_capacity(body.len() / 2);
    for pair in body.chunks_exact(2) {
        let value = match mode {
            IntValueMode::Lenient => lenient_int(&pair[1]),
            IntValueMode::Strict => parse_int(&pair[1])?,
        };
        entries.push((pair[0].clone(), value));
    }
    Ok(entries)
}

/// Legacy coercion: values that are not pure ASCII digits become `-1`.
fn lenient_int(blob: &Bytes) -> i64 {
    if blob.is_empty() || !blob.iter().all(|b| b.is_ascii_digit()) {
        return -1;
    }
    std::str::from_utf8(blob)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .unwrap_or(-1)
}

fn scan_cursor(body: &[Bytes]) -> Result<Option<Bytes>> {
    if body.is_empty() {
        return Ok(None);
    }
    if body.len() % 2 != 0 {
        return Err(SsdbError::Protocol("odd-length map body".into()));
    }
    Ok(Some(body[body.len() - 2].clone()))
}
