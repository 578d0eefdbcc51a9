//! Table shapes the HTTP glue hands to scripts: subrequest responses and URI query arguments.

use std::collections::{BTreeMap, HashMap};

use percent_encoding::percent_decode_str;

use crate::batch::Batch;
use crate::encode::BatchEncode;

/// Result of an internal subrequest, pushed as `{ status = int, body = string, header = {...} }`.
/// Only the first value of each header is exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureResponse {
    pub status: i64,
    pub body: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

impl BatchEncode for CaptureResponse {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) {
        batch.table();
        batch.int_field("status", self.status);
        batch.string_field("body", &self.body);

        let present = self.headers.values().filter(|v| !v.is_empty()).count();
        batch.table_sized(0, present);
        for (name, values) in &self.headers {
            if let Some(first) = values.first() {
                batch.string_entry(name, first);
            }
        }
        batch.set_field_inline("header");
    }
}

/// One `key[=value]` pair of a query string. `value == None` is a bare key (`?flag`), which
/// scripts see as boolean `true`. Decoded text is raw bytes and need not be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArg {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

fn escapes_are_well_formed(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if !bytes.get(i + 1..i + 3).is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// `+` is a space and `%XX` is the byte `XX`. A malformed `%` escape leaves the text as it was.
fn unescape(raw: &str) -> Vec<u8> {
    if !escapes_are_well_formed(raw) {
        return raw.as_bytes().to_vec();
    }
    percent_decode_str(&raw.replace('+', " ")).collect()
}

/// Splits a raw query string into arguments in order of appearance.
///
/// `k=v` yields the decoded value, `k=` an empty string and a bare `k` a boolean argument. Empty
/// parts are skipped. When `max_args > 0`, parsing stops after that many arguments and the
/// second return value reports the truncation.
pub fn parse_query_string(raw: &str, max_args: usize) -> (Vec<QueryArg>, bool) {
    let mut args = Vec::new();
    for part in raw.split('&').filter(|p| !p.is_empty()) {
        if max_args > 0 && args.len() >= max_args {
            return (args, true);
        }
        let arg = match part.split_once('=') {
            Some((key, value)) => QueryArg { key: unescape(key), value: Some(unescape(value)) },
            None => QueryArg { key: unescape(part), value: None },
        };
        args.push(arg);
    }
    (args, false)
}

/// Query arguments pushed as a table keyed by name. A name seen once maps to its value; a
/// repeated name maps to an array of its values in order. Arguments with an empty name are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs(pub Vec<QueryArg>);

impl QueryArgs {
    pub fn parse(raw: &str, max_args: usize) -> (Self, bool) {
        let (args, truncated) = parse_query_string(raw, max_args);
        (Self(args), truncated)
    }

    fn buckets(&self) -> Vec<(&[u8], Vec<&QueryArg>)> {
        // First appearance fixes the bucket order.
        let mut order: HashMap<&[u8], usize> = HashMap::new();
        let mut buckets: Vec<(&[u8], Vec<&QueryArg>)> = Vec::new();
        for arg in self.0.iter().filter(|a| !a.key.is_empty()) {
            match order.get(arg.key.as_slice()) {
                Some(&i) => buckets[i].1.push(arg),
                None => {
                    order.insert(arg.key.as_slice(), buckets.len());
                    buckets.push((arg.key.as_slice(), vec![arg]));
                }
            }
        }
        buckets
    }
}

fn push_arg_value<'a>(arg: &'a QueryArg, batch: &mut Batch<'a>) {
    match &arg.value {
        Some(v) => batch.bytes(v),
        None => batch.bool(true),
    };
}

impl BatchEncode for QueryArgs {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) {
        let buckets = self.buckets();
        batch.table_sized(0, buckets.len());
        for (key, args) in buckets {
            batch.bytes(key);
            if let [single] = args.as_slice() {
                push_arg_value(*single, batch);
            } else {
                batch.table_sized(args.len(), 0);
                for (j, arg) in args.iter().copied().enumerate() {
                    push_arg_value(arg, batch);
                    batch.set_index(j as u32 + 1);
                }
            }
            batch.set();
        }
    }
}
