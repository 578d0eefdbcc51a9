use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::batch::Batch;

pub trait BatchEncode {
    /// Appends instructions that leave one value on the stack.
    fn encode<'a>(&'a self, batch: &mut Batch<'a>);
}

/// Encodes a single value into a fresh batch.
pub fn encode_value<T: BatchEncode + ?Sized>(value: &T) -> Batch<'_> {
    let mut batch = Batch::new();
    value.encode(&mut batch);
    batch
}

impl<T: BatchEncode + ?Sized> BatchEncode for &T {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { (**self).encode(batch); }
}

impl<T: BatchEncode + ?Sized> BatchEncode for Box<T> {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { (**self).encode(batch); }
}

impl BatchEncode for bool {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.bool(*self); }
}

macro_rules! impl_encode_int {
    ($($type:ty),*) => {
        $(
            impl BatchEncode for $type {
                fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.int(*self as i64); }
            }
        )*
    };
}

impl_encode_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_encode_wide_uint {
    ($($type:ty),*) => {
        $(
            /// Values beyond `i64::MAX` fall back to a float.
            impl BatchEncode for $type {
                fn encode<'a>(&'a self, batch: &mut Batch<'a>) {
                    match i64::try_from(*self) {
                        Ok(v) => batch.int(v),
                        Err(_) => batch.number(*self as f64),
                    };
                }
            }
        )*
    };
}

impl_encode_wide_uint!(u64, usize);

impl BatchEncode for f64 {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.number(*self); }
}

impl BatchEncode for f32 {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.number(*self as f64); }
}

impl BatchEncode for str {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.string(self); }
}

impl BatchEncode for String {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { batch.string(self); }
}

impl<T: BatchEncode> BatchEncode for Option<T> {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) {
        match self {
            Some(v) => v.encode(batch),
            None => {
                batch.nil();
            }
        }
    }
}

fn encode_seq<'a, T: BatchEncode + 'a>(items: impl ExactSizeIterator<Item = &'a T>, batch: &mut Batch<'a>) {
    batch.table_sized(items.len(), 0);
    for (i, item) in items.enumerate() {
        item.encode(batch);
        let idx = u32::try_from(i + 1).unwrap_or(u32::MAX);
        batch.set_index(idx);
    }
}

fn encode_map<'a, T: BatchEncode + 'a>(
    entries: impl ExactSizeIterator<Item = (&'a String, &'a T)>,
    batch: &mut Batch<'a>,
) {
    batch.table_sized(0, entries.len());
    for (key, value) in entries {
        value.encode(batch);
        batch.set_field(key);
    }
}

impl<T: BatchEncode> BatchEncode for [T] {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { encode_seq(self.iter(), batch); }
}

impl<T: BatchEncode, const N: usize> BatchEncode for [T; N] {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { encode_seq(self.iter(), batch); }
}

impl<T: BatchEncode> BatchEncode for Vec<T> {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { encode_seq(self.iter(), batch); }
}

impl<T: BatchEncode> BatchEncode for BTreeMap<String, T> {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { encode_map(self.iter(), batch); }
}

impl<T: BatchEncode, S: BuildHasher> BatchEncode for HashMap<String, T, S> {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { encode_map(self.iter(), batch); }
}

/// Receives the instructions of a JSON document walk, so tapes can be built from JSON by writers
/// other than [`Batch`].
pub trait JsonSink<'a> {
    fn nil(&mut self);
    fn bool(&mut self, v: bool);
    fn int(&mut self, v: i64);
    fn number(&mut self, v: f64);
    fn string(&mut self, s: &'a str);
    fn table_sized(&mut self, narr: usize, nrec: usize);
    fn set_index(&mut self, idx: u32);
    fn set_field(&mut self, name: &'a str);
}

/// Feeds `doc` to `sink` as instructions that push one value. Arrays get 1-based indices and
/// `null` pushes nil, so a null element or member leaves no entry behind.
pub fn walk_json<'a, S: JsonSink<'a> + ?Sized>(doc: &'a serde_json::Value, sink: &mut S) {
    use serde_json::Value as Json;
    match doc {
        Json::Null => sink.nil(),
        Json::Bool(b) => sink.bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => sink.int(i),
            None => sink.number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => sink.string(s),
        Json::Array(items) => {
            sink.table_sized(items.len(), 0);
            for (i, item) in items.iter().enumerate() {
                walk_json(item, sink);
                sink.set_index(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        Json::Object(members) => {
            sink.table_sized(0, members.len());
            for (name, member) in members {
                walk_json(member, sink);
                sink.set_field(name);
            }
        }
    }
}

impl<'a> JsonSink<'a> for Batch<'a> {
    fn nil(&mut self) { Batch::nil(self); }
    fn bool(&mut self, v: bool) { Batch::bool(self, v); }
    fn int(&mut self, v: i64) { Batch::int(self, v); }
    fn number(&mut self, v: f64) { Batch::number(self, v); }
    fn string(&mut self, s: &'a str) { Batch::string(self, s); }
    fn table_sized(&mut self, narr: usize, nrec: usize) { Batch::table_sized(self, narr, nrec); }
    fn set_index(&mut self, idx: u32) { Batch::set_index(self, idx); }
    fn set_field(&mut self, name: &'a str) { Batch::set_field(self, name); }
}

impl BatchEncode for serde_json::Value {
    fn encode<'a>(&'a self, batch: &mut Batch<'a>) { walk_json(self, batch); }
}
