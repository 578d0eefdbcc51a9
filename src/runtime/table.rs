use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use nohash_hasher::IntMap;

use super::value::{HostFn, TableRef, Value};
use crate::error::{runtime, Error, NAN_INDEX, NIL_INDEX};

/// Upper bound on what a size hint may pre-allocate; larger hints are clamped.
pub const MAX_PRESIZE: usize = 1 << 16;

/// Float keys with an exact integer value are stored as integers.
pub(crate) fn float_to_int(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) { Some(f as i64) } else { None }
}

/// Keys that are neither integers nor strings.
#[derive(Clone)]
enum Key {
    Num(u64),
    Bool(bool),
    Table(TableRef),
    Function(HostFn),
}

impl Key {
    fn identity(&self) -> (u8, usize) {
        match self {
            Key::Num(bits) => (0, *bits as usize),
            Key::Bool(b) => (1, *b as usize),
            Key::Table(t) => (2, Rc::as_ptr(t) as *const u8 as usize),
            Key::Function(f) => (3, Rc::as_ptr(f) as *const u8 as usize),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Key::Num(bits) => Value::Num(f64::from_bits(*bits)),
            Key::Bool(b) => Value::Bool(*b),
            Key::Table(t) => Value::Table(t.clone()),
            Key::Function(f) => Value::Function(f.clone()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Num(a), Key::Num(b)) => a == b,
            _ => self.identity() == other.identity(),
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Num(bits) => (0u8, *bits).hash(state),
            _ => self.identity().hash(state),
        }
    }
}

enum Slot<'k> {
    Int(i64),
    Str(&'k Rc<[u8]>),
    Other(Key),
}

fn slot(key: &Value) -> Result<Slot<'_>, Error> {
    Ok(match key {
        Value::Nil => return runtime(NIL_INDEX),
        Value::Int(i) => Slot::Int(*i),
        Value::Num(f) if f.is_nan() => return runtime(NAN_INDEX),
        Value::Num(f) => match float_to_int(*f) {
            Some(i) => Slot::Int(i),
            None => Slot::Other(Key::Num(f.to_bits())),
        },
        Value::Bool(b) => Slot::Other(Key::Bool(*b)),
        Value::Str(s) => Slot::Str(s),
        Value::Table(t) => Slot::Other(Key::Table(t.clone())),
        Value::Function(f) => Slot::Other(Key::Function(f.clone())),
    })
}

#[derive(Default)]
pub struct Table {
    /// Keys `1..=array.len()`; never ends in `Nil`.
    array: Vec<Value>,
    ints: IntMap<i64, Value>,
    strs: HashMap<Rc<[u8]>, Value>,
    others: HashMap<Key, Value>,
    metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        Table {
            array: Vec::with_capacity(narr.min(MAX_PRESIZE)),
            strs: HashMap::with_capacity(nrec.min(MAX_PRESIZE)),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &Value) -> Value {
        match slot(key) {
            Ok(Slot::Int(i)) => self.get_int(i),
            Ok(Slot::Str(s)) => self.get_str(s),
            Ok(Slot::Other(k)) => self.others.get(&k).cloned().unwrap_or_default(),
            Err(_) => Value::Nil,
        }
    }

    pub fn get_int(&self, key: i64) -> Value {
        if key >= 1 && (key as u64) <= self.array.len() as u64 {
            return self.array[(key - 1) as usize].clone();
        }
        self.ints.get(&key).cloned().unwrap_or_default()
    }

    pub fn get_str(&self, key: &[u8]) -> Value { self.strs.get(key).cloned().unwrap_or_default() }

    /// Assigns `t[key] = value`; a nil value removes the entry.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), Error> {
        match slot(&key)? {
            Slot::Int(i) => self.set_int(i, value),
            Slot::Str(s) => self.set_str_shared(s.clone(), value),
            Slot::Other(k) => {
                if value.is_nil() {
                    self.others.remove(&k);
                } else {
                    self.others.insert(k, value);
                }
            }
        }
        Ok(())
    }

    pub fn set_int(&mut self, key: i64, value: Value) {
        let len = self.array.len() as u64;
        if key >= 1 && (key as u64) <= len {
            self.array[(key - 1) as usize] = value;
            while self.array.last().is_some_and(Value::is_nil) {
                self.array.pop();
            }
            return;
        }
        if key >= 1 && key as u64 == len + 1 && !value.is_nil() {
            self.ints.remove(&key);
            self.array.push(value);
            self.migrate_from_ints();
            return;
        }
        if value.is_nil() {
            self.ints.remove(&key);
        } else {
            self.ints.insert(key, value);
        }
    }

    pub fn set_str(&mut self, key: &[u8], value: Value) {
        if value.is_nil() {
            self.strs.remove(key);
        } else if let Some(slot) = self.strs.get_mut(key) {
            *slot = value;
        } else {
            self.strs.insert(Rc::from(key), value);
        }
    }

    fn set_str_shared(&mut self, key: Rc<[u8]>, value: Value) {
        if value.is_nil() {
            self.strs.remove(&key);
        } else {
            self.strs.insert(key, value);
        }
    }

    /// Pulls `len+1, len+2, ...` out of the integer map once the array reaches them.
    fn migrate_from_ints(&mut self) {
        while let Some(v) = self.ints.remove(&(self.array.len() as i64 + 1)) {
            self.array.push(v);
        }
    }

    /// Border of the sequence part (`#t`).
    pub fn len(&self) -> usize { self.array.len() }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.ints.is_empty() && self.strs.is_empty() && self.others.is_empty()
    }

    /// Number of keyed (non-sequence) entries.
    pub fn record_count(&self) -> usize { self.ints.len() + self.strs.len() + self.others.len() }

    pub fn array_capacity(&self) -> usize { self.array.capacity() }

    /// The items when the table is a proper sequence with nothing else in it.
    pub fn sequence(&self) -> Option<&[Value]> {
        if self.record_count() != 0 || self.array.iter().any(Value::is_nil) { return None; }
        Some(&self.array)
    }

    /// Every non-nil entry: sequence part in order, then integer keys ascending, then string
    /// keys bytewise, then the remaining keys.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut out = Vec::with_capacity(self.array.len() + self.record_count());
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                out.push((Value::Int(i as i64 + 1), v.clone()));
            }
        }
        let mut ints: Vec<_> = self.ints.iter().collect();
        ints.sort_unstable_by_key(|(k, _)| **k);
        out.extend(ints.into_iter().map(|(k, v)| (Value::Int(*k), v.clone())));
        let mut strs: Vec<_> = self.strs.iter().collect();
        strs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        out.extend(strs.into_iter().map(|(k, v)| (Value::Str(k.clone()), v.clone())));
        let mut others: Vec<_> = self.others.iter().map(|(k, v)| (k.to_value(), v.clone())).collect();
        others.sort_by_cached_key(|(k, _)| k.to_string());
        out.extend(others);
        out
    }

    pub fn metatable(&self) -> Option<TableRef> { self.metatable.clone() }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) { self.metatable = mt; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appending_moves_integer_keys_into_the_array() {
        let mut t = Table::new();
        t.set_int(2, Value::Int(20));
        t.set_int(3, Value::Int(30));
        assert_eq!(t.len(), 0);
        t.set_int(1, Value::Int(10));
        assert_eq!(t.len(), 3);
        assert_eq!(t.sequence().map(|s| s.len()), Some(3));
    }

    #[test]
    fn integral_float_keys_alias_integers() {
        let mut t = Table::new();
        t.set(Value::Num(1.0), Value::string("a")).unwrap();
        assert_eq!(t.get_int(1), Value::string("a"));
        t.set(Value::Num(1.5), Value::string("b")).unwrap();
        assert_eq!(t.get(&Value::Num(1.5)), Value::string("b"));
    }

    #[test]
    fn nil_and_nan_keys_are_rejected() {
        let mut t = Table::new();
        assert_eq!(t.set(Value::Nil, Value::Int(1)), Err(Error::Runtime(NIL_INDEX)));
        assert_eq!(t.set(Value::Num(f64::NAN), Value::Int(1)), Err(Error::Runtime(NAN_INDEX)));
        assert!(t.is_empty());
    }

    #[test]
    fn assigning_nil_removes_entries() {
        let mut t = Table::new();
        t.set_str(b"k", Value::Bool(true));
        t.set_int(1, Value::Int(1));
        t.set_str(b"k", Value::Nil);
        t.set_int(1, Value::Nil);
        assert!(t.is_empty());
    }

    #[test]
    fn presize_hints_are_clamped() {
        let t = Table::with_capacity(u32::MAX as usize, 4);
        assert!(t.array_capacity() >= MAX_PRESIZE);
        assert!(t.array_capacity() < u32::MAX as usize);
    }

    #[test]
    fn table_keys_compare_by_identity() {
        let a = Value::table(Table::new());
        let b = Value::table(Table::new());
        let mut t = Table::new();
        t.set(a.clone(), Value::Int(1)).unwrap();
        assert_eq!(t.get(&a), Value::Int(1));
        assert_eq!(t.get(&b), Value::Nil);
    }
}
