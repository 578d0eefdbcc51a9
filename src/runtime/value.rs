use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::table::Table;
use crate::error::Error;

pub type TableRef = Rc<RefCell<Table>>;
pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Vec<Value>, Error>>;

/// A runtime value. Strings are immutable byte strings; tables and functions are shared by
/// reference and compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(Rc<[u8]>),
    Table(TableRef),
    Function(HostFn),
}

impl Value {
    pub fn string(bytes: impl AsRef<[u8]>) -> Value { Value::Str(Rc::from(bytes.as_ref())) }

    pub fn table(t: Table) -> Value { Value::Table(Rc::new(RefCell::new(t))) }

    pub fn function(f: impl Fn(&[Value]) -> Result<Vec<Value>, Error> + 'static) -> Value {
        Value::Function(Rc::new(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool { matches!(self, Value::Nil) }

    /// Everything except `nil` and `false` is true.
    #[inline]
    pub fn truthy(&self) -> bool { !matches!(self, Value::Nil | Value::Bool(false)) }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Num(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> { self.as_bytes().and_then(|b| std::str::from_utf8(b).ok()) }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    fn addr(&self) -> usize {
        match self {
            Value::Table(t) => Rc::as_ptr(t) as *const u8 as usize,
            Value::Function(f) => Rc::as_ptr(f) as *const u8 as usize,
            _ => 0,
        }
    }
}

/// Raw equality: numbers compare by mathematical value, strings by content, tables and
/// functions by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Int(i), Value::Num(f)) | (Value::Num(f), Value::Int(i)) => {
                super::table::float_to_int(*f) == Some(*i)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(_), Value::Table(_)) | (Value::Function(_), Value::Function(_)) => {
                self.addr() == other.addr()
            }
            _ => false,
        }
    }
}

pub(crate) fn fmt_number(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `tostring` rendering.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Num(n) => f.write_str(&fmt_number(*n)),
            Value::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            Value::Table(_) | Value::Function(_) => write!(f, "{}: 0x{:x}", self.type_name(), self.addr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{}\"", s.escape_ascii()),
            _ => Display::fmt(self, f),
        }
    }
}

const MAX_SERIALIZE_DEPTH: usize = 64;

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        Nested { value: self, depth: 0 }.serialize(s)
    }
}

/// String keys as themselves; any other key in brackets (`[5]`, `[true]`) so it cannot collide
/// with the string spelled the same way.
fn json_key(k: &Value) -> String {
    match k {
        Value::Str(_) => k.to_string(),
        other => format!("[{}]", other),
    }
}

/// Depth-limited walk so self-referencing tables still serialize.
struct Nested<'v> {
    value: &'v Value,
    depth: usize,
}

impl Serialize for Nested<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Nil => s.serialize_unit(),
            Value::Bool(b) => s.serialize_bool(*b),
            Value::Int(i) => s.serialize_i64(*i),
            Value::Num(f) => s.serialize_f64(*f),
            Value::Str(b) => s.serialize_str(&String::from_utf8_lossy(b)),
            Value::Function(_) => s.serialize_str(&self.value.to_string()),
            Value::Table(t) => {
                if self.depth >= MAX_SERIALIZE_DEPTH {
                    return s.serialize_str(&self.value.to_string());
                }
                let depth = self.depth + 1;
                let t = t.borrow();
                if let Some(items) = t.sequence() {
                    let mut seq = s.serialize_seq(Some(items.len()))?;
                    for value in items {
                        seq.serialize_element(&Nested { value, depth })?;
                    }
                    seq.end()
                } else {
                    let entries = t.entries();
                    let mut map = s.serialize_map(Some(entries.len()))?;
                    for (k, value) in &entries {
                        map.serialize_entry(&json_key(k), &Nested { value, depth })?;
                    }
                    map.end()
                }
            }
        }
    }
}
