// Positive indices count from the bottom starting at 1, negative ones from the top.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use nohash_hasher::IntMap;

use super::table::Table;
use super::value::{TableRef, Value};
use crate::error::*;
use crate::target::StackTarget;

/// Reference returned for a nil value; pushing it yields nil.
pub const REF_NIL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    pub max_stack: usize,
}

impl StateConfig {
    pub const DEFAULT_MAX_STACK: usize = 1_000_000;
}

impl Default for StateConfig {
    fn default() -> Self { Self { max_stack: Self::DEFAULT_MAX_STACK } }
}

fn index_error(v: &Value) -> &'static str {
    match v {
        Value::Nil => INDEX_NIL,
        Value::Bool(_) => INDEX_BOOLEAN,
        Value::Int(_) | Value::Num(_) => INDEX_NUMBER,
        Value::Str(_) => INDEX_STRING,
        Value::Function(_) => INDEX_FUNCTION,
        Value::Table(_) => NOT_A_TABLE,
    }
}

const MAX_NEWINDEX_CHAIN: usize = 100;

/// Non-raw assignment: a missing key on a table whose metatable has `__newindex` goes to that
/// handler (called as `h(t, k, v)`) or, for a table handler, is retried on that table.
fn assign(mut t: TableRef, key: Value, value: Value) -> Result<(), Error> {
    for _ in 0..MAX_NEWINDEX_CHAIN {
        let handler = {
            let tb = t.borrow();
            if tb.get(&key).is_nil() {
                tb.metatable().map(|mt| mt.borrow().get_str(b"__newindex")).unwrap_or_default()
            } else {
                Value::Nil
            }
        };
        match handler {
            Value::Function(f) => {
                f(&[Value::Table(t), key, value])?;
                return Ok(());
            }
            Value::Table(next) => t = next,
            _ => return t.borrow_mut().set(key, value),
        }
    }
    runtime(NEWINDEX_LOOP)
}

pub struct State {
    stack: Vec<Value>,
    globals: TableRef,
    refs: IntMap<i32, Value>,
    free_refs: Vec<i32>,
    next_ref: i32,
    metatables: HashMap<String, TableRef>,
    config: StateConfig,
}

impl Default for State {
    fn default() -> Self { Self::new() }
}

impl State {
    pub fn new() -> Self { Self::with_config(StateConfig::default()) }

    pub fn with_config(config: StateConfig) -> Self {
        Self {
            stack: Vec::new(),
            globals: Rc::new(RefCell::new(Table::new())),
            refs: IntMap::default(),
            free_refs: Vec::new(),
            next_ref: 1,
            metatables: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &StateConfig { &self.config }

    // ---------------- Stack ----------------

    #[inline]
    pub fn top(&self) -> usize { self.stack.len() }

    /// Grows the stack with nils or drops values so that exactly `n` remain.
    pub fn set_top(&mut self, n: usize) -> Result<(), Error> {
        if n > self.config.max_stack { return runtime(STACK_OVERFLOW); }
        self.stack.resize(n, Value::Nil);
        Ok(())
    }

    fn abs_index(&self, idx: i32) -> Option<usize> {
        let len = self.stack.len();
        if idx > 0 {
            let i = idx as usize - 1;
            (i < len).then_some(i)
        } else if idx < 0 {
            len.checked_sub(idx.unsigned_abs() as usize)
        } else {
            None
        }
    }

    pub fn get(&self, idx: i32) -> Option<&Value> { self.abs_index(idx).map(|i| &self.stack[i]) }

    pub fn values(&self) -> &[Value] { &self.stack }

    pub fn push(&mut self, v: Value) -> Result<(), Error> {
        if self.stack.len() >= self.config.max_stack { return runtime(STACK_OVERFLOW); }
        self.stack.push(v);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.stack.pop().ok_or(Error::Runtime(STACK_UNDERFLOW))
    }

    pub fn pop_n(&mut self, n: usize) -> Result<(), Error> {
        let len = self.stack.len();
        if n > len { return runtime(STACK_UNDERFLOW); }
        self.stack.truncate(len - n);
        Ok(())
    }

    pub fn push_nil(&mut self) -> Result<(), Error> { self.push(Value::Nil) }
    pub fn push_bool(&mut self, v: bool) -> Result<(), Error> { self.push(Value::Bool(v)) }
    pub fn push_int(&mut self, v: i64) -> Result<(), Error> { self.push(Value::Int(v)) }
    pub fn push_number(&mut self, v: f64) -> Result<(), Error> { self.push(Value::Num(v)) }
    pub fn push_string(&mut self, bytes: &[u8]) -> Result<(), Error> { self.push(Value::string(bytes)) }

    pub fn push_value(&mut self, idx: i32) -> Result<(), Error> {
        let v = self.get(idx).cloned().ok_or(Error::Runtime(INVALID_INDEX))?;
        self.push(v)
    }

    pub fn create_table(&mut self, narr: usize, nrec: usize) -> Result<(), Error> {
        self.push(Value::table(Table::with_capacity(narr, nrec)))
    }

    /// The table at `idx`, or the runtime error for indexing whatever is there instead.
    pub fn table_at(&self, idx: i32) -> Result<TableRef, Error> {
        match self.get(idx) {
            Some(Value::Table(t)) => Ok(t.clone()),
            Some(other) => runtime(index_error(other)),
            None => runtime(INVALID_INDEX),
        }
    }

    /// `t[k] = v` where `t` is at `idx`, `v` on top and `k` just below it. Pops key and value.
    /// Honors `__newindex`.
    pub fn set_table(&mut self, idx: i32) -> Result<(), Error> {
        let len = self.stack.len();
        if len < 2 { return runtime(STACK_UNDERFLOW); }
        let t = self.table_at(idx)?;
        let key = self.stack[len - 2].clone();
        let value = self.stack[len - 1].clone();
        assign(t, key, value)?;
        self.stack.truncate(len - 2);
        Ok(())
    }

    /// `t[name] = v` where `t` is at `idx` and `v` on top. Pops the value. Honors `__newindex`.
    pub fn set_field(&mut self, idx: i32, name: &[u8]) -> Result<(), Error> {
        let t = self.table_at(idx)?;
        let value = self.pop()?;
        assign(t, Value::string(name), value)
    }

    /// Raw `t[n] = v` where `t` is at `idx` and `v` on top. Pops the value.
    pub fn raw_seti(&mut self, idx: i32, n: i64) -> Result<(), Error> {
        let t = self.table_at(idx)?;
        let value = self.pop()?;
        t.borrow_mut().set_int(n, value);
        Ok(())
    }

    pub fn get_field(&mut self, idx: i32, name: &[u8]) -> Result<(), Error> {
        let v = self.table_at(idx)?.borrow().get_str(name);
        self.push(v)
    }

    pub fn raw_geti(&mut self, idx: i32, n: i64) -> Result<(), Error> {
        let v = self.table_at(idx)?.borrow().get_int(n);
        self.push(v)
    }

    // ---------------- Globals ----------------

    pub fn globals(&self) -> TableRef { self.globals.clone() }

    pub fn get_global(&mut self, name: &str) -> Result<(), Error> {
        let v = self.globals.borrow().get_str(name.as_bytes());
        self.push(v)
    }

    pub fn set_global(&mut self, name: &str) -> Result<(), Error> {
        let v = self.pop()?;
        self.globals.borrow_mut().set_str(name.as_bytes(), v);
        Ok(())
    }

    // ---------------- Registry references ----------------

    /// Pops the top value into the registry and returns a handle for it. Handles of released
    /// references are reused; nil always yields [`REF_NIL`].
    pub fn reference(&mut self) -> Result<i32, Error> {
        let v = self.pop()?;
        if v.is_nil() { return Ok(REF_NIL); }
        let r = match self.free_refs.pop() {
            Some(r) => r,
            None => {
                let r = self.next_ref;
                self.next_ref += 1;
                r
            }
        };
        self.refs.insert(r, v);
        Ok(r)
    }

    pub fn unreference(&mut self, r: i32) {
        if r >= 0 && self.refs.remove(&r).is_some() {
            self.free_refs.push(r);
        }
    }

    pub fn push_ref(&mut self, r: i32) -> Result<(), Error> {
        if r == REF_NIL { return self.push_nil(); }
        let v = self.refs.get(&r).cloned().ok_or(Error::Runtime(INVALID_REF))?;
        self.push(v)
    }

    pub fn ref_count(&self) -> usize { self.refs.len() }

    // ---------------- Named metatables ----------------

    /// Pushes the metatable registered as `name`, creating it (with `__name` set) if needed.
    /// Returns true when it was created.
    pub fn new_metatable(&mut self, name: &str) -> Result<bool, Error> {
        if let Some(mt) = self.metatables.get(name) {
            let mt = mt.clone();
            self.push(Value::Table(mt))?;
            return Ok(false);
        }
        let mut t = Table::new();
        t.set_str(b"__name", Value::string(name));
        let mt = Rc::new(RefCell::new(t));
        self.push(Value::Table(mt.clone()))?;
        self.metatables.insert(name.to_string(), mt);
        Ok(true)
    }

    pub fn get_metatable_by_name(&mut self, name: &str) -> Result<(), Error> {
        let v = self.metatables.get(name).cloned().map(Value::Table).unwrap_or_default();
        self.push(v)
    }

    /// Sets the metatable registered as `name` (none if unregistered) on the table on top.
    pub fn set_metatable_by_name(&mut self, name: &str) -> Result<(), Error> {
        let t = self.table_at(-1)?;
        t.borrow_mut().set_metatable(self.metatables.get(name).cloned());
        Ok(())
    }

    pub fn get_metatable(&self, idx: i32) -> Option<TableRef> {
        match self.get(idx)? {
            Value::Table(t) => t.borrow().metatable(),
            _ => None,
        }
    }

    // ---------------- Calls and errors ----------------

    /// Calls the function below `nargs` arguments, replacing both with its results. With
    /// `nresults` set, results are truncated or padded with nil to that count.
    pub fn call(&mut self, nargs: usize, nresults: Option<usize>) -> Result<(), Error> {
        let base = nargs
            .checked_add(1)
            .and_then(|n| self.stack.len().checked_sub(n))
            .ok_or(Error::Runtime(STACK_UNDERFLOW))?;
        let f = match &self.stack[base] {
            Value::Function(f) => f.clone(),
            _ => return runtime(CALL_NON_FUNCTION),
        };
        let mut results = f(&self.stack[base + 1..])?;
        if let Some(n) = nresults {
            results.resize(n, Value::Nil);
        }
        if base + results.len() > self.config.max_stack { return runtime(STACK_OVERFLOW); }
        self.stack.truncate(base);
        self.stack.extend(results);
        Ok(())
    }

    /// Formats the error value on top through `debug.traceback` if installed. Leaves the stack as is.
    pub fn traceback(&self) -> String {
        let err = self.get(-1).cloned().unwrap_or_default();
        let msg = error_message(&err);
        let handler = match self.globals.borrow().get_str(b"debug") {
            Value::Table(debug) => debug.borrow().get_str(b"traceback"),
            _ => Value::Nil,
        };
        if let Value::Function(f) = handler {
            if let Ok(results) = f(&[Value::string(&msg)]) {
                if let Some(text) = results.first().and_then(Value::as_bytes) {
                    return String::from_utf8_lossy(text).into_owned();
                }
            }
        }
        msg
    }
}

/// Text of an error value: strings and numbers as themselves, anything else as a placeholder.
pub fn error_message(err: &Value) -> String {
    match err {
        Value::Str(_) | Value::Int(_) | Value::Num(_) => err.to_string(),
        other => format!("(error object is a {} value)", other.type_name()),
    }
}

impl StackTarget for State {
    fn push_nil(&mut self) -> Result<(), Error> { State::push_nil(self) }
    fn push_bool(&mut self, v: bool) -> Result<(), Error> { State::push_bool(self, v) }
    fn push_int(&mut self, v: i64) -> Result<(), Error> { State::push_int(self, v) }
    fn push_float(&mut self, v: f64) -> Result<(), Error> { self.push_number(v) }
    fn push_string(&mut self, bytes: &[u8]) -> Result<(), Error> { State::push_string(self, bytes) }

    fn new_table_sized(&mut self, array_hint: u32, map_hint: u32) -> Result<(), Error> {
        self.create_table(array_hint as usize, map_hint as usize)
    }

    fn generic_set(&mut self) -> Result<(), Error> {
        if self.stack.len() < 3 { return runtime(STACK_UNDERFLOW); }
        self.set_table(-3)
    }

    fn set_field(&mut self, key: &[u8]) -> Result<(), Error> {
        if self.stack.len() < 2 { return runtime(STACK_UNDERFLOW); }
        State::set_field(self, -2, key)
    }

    fn set_index(&mut self, idx: i64) -> Result<(), Error> {
        if self.stack.len() < 2 { return runtime(STACK_UNDERFLOW); }
        self.raw_seti(-2, idx)
    }

    fn pop_n(&mut self, count: usize) -> Result<(), Error> { State::pop_n(self, count) }

    fn depth(&self) -> usize { self.top() }

    fn truncate(&mut self, depth: usize) { self.stack.truncate(depth); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_the_top() {
        let mut l = State::new();
        l.push_int(1).unwrap();
        l.push_int(2).unwrap();
        assert_eq!(l.get(-1), Some(&Value::Int(2)));
        assert_eq!(l.get(1), Some(&Value::Int(1)));
        assert_eq!(l.get(-3), None);
        assert_eq!(l.get(0), None);
    }

    #[test]
    fn stack_limit_is_enforced() {
        let mut l = State::with_config(StateConfig { max_stack: 2 });
        l.push_nil().unwrap();
        l.push_nil().unwrap();
        assert_eq!(l.push_nil(), Err(Error::Runtime(STACK_OVERFLOW)));
        assert_eq!(l.top(), 2);
    }

    #[test]
    fn references_are_reused_after_release() {
        let mut l = State::new();
        l.push_string(b"a").unwrap();
        let r1 = l.reference().unwrap();
        l.push_string(b"b").unwrap();
        let r2 = l.reference().unwrap();
        assert_ne!(r1, r2);
        l.unreference(r1);
        l.push_int(3).unwrap();
        assert_eq!(l.reference().unwrap(), r1);
        l.push_ref(r2).unwrap();
        assert_eq!(l.get(-1), Some(&Value::string("b")));
        l.push_nil().unwrap();
        assert_eq!(l.reference().unwrap(), REF_NIL);
        assert_eq!(l.push_ref(999), Err(Error::Runtime(INVALID_REF)));
    }

    #[test]
    fn named_metatables_are_created_once() {
        let mut l = State::new();
        assert!(l.new_metatable("socket").unwrap());
        l.pop().unwrap();
        assert!(!l.new_metatable("socket").unwrap());
        l.pop().unwrap();

        l.create_table(0, 0).unwrap();
        l.set_metatable_by_name("socket").unwrap();
        let mt = l.get_metatable(-1).unwrap();
        assert_eq!(mt.borrow().get_str(b"__name"), Value::string("socket"));

        l.get_metatable_by_name("missing").unwrap();
        assert!(l.get(-1).unwrap().is_nil());
    }

    #[test]
    fn traceback_falls_back_to_the_message() {
        let mut l = State::new();
        l.push_string(b"boom").unwrap();
        assert_eq!(l.traceback(), "boom");
        l.push_bool(false).unwrap();
        assert_eq!(l.traceback(), "(error object is a boolean value)");
        assert_eq!(l.top(), 2);
    }

    #[test]
    fn traceback_uses_installed_handler() {
        let mut l = State::new();
        let mut debug = Table::new();
        debug.set_str(b"traceback", Value::function(|args| {
            let msg = args.first().map(|v| v.to_string()).unwrap_or_default();
            Ok(vec![Value::string(format!("{}\nstack traceback:\n\t[host]", msg))])
        }));
        l.push(Value::table(debug)).unwrap();
        l.set_global("debug").unwrap();
        l.push_int(7).unwrap();
        assert_eq!(l.traceback(), "7\nstack traceback:\n\t[host]");
    }

    #[test]
    fn call_replaces_function_and_arguments() {
        let mut l = State::new();
        l.push(Value::function(|args| Ok(vec![Value::Int(args.len() as i64)]))).unwrap();
        l.push_nil().unwrap();
        l.push_nil().unwrap();
        l.call(2, Some(2)).unwrap();
        assert_eq!(l.values(), &[Value::Int(2), Value::Nil]);
    }

    #[test]
    fn call_with_an_impossible_argument_count_underflows() {
        let mut l = State::new();
        l.push_nil().unwrap();
        assert_eq!(l.call(usize::MAX, None), Err(Error::Runtime(STACK_UNDERFLOW)));
        assert_eq!(l.top(), 1);
    }

    fn logging_newindex(log: &Rc<RefCell<Vec<Value>>>) -> TableRef {
        let log = log.clone();
        let mut mt = Table::new();
        mt.set_str(b"__newindex", Value::function(move |args| {
            log.borrow_mut().push(args[1].clone());
            Ok(vec![])
        }));
        Rc::new(RefCell::new(mt))
    }

    #[test]
    fn non_raw_sets_go_through_newindex() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut t = Table::new();
        t.set_str(b"present", Value::Int(0));
        t.set_metatable(Some(logging_newindex(&log)));
        let t = Rc::new(RefCell::new(t));

        let mut l = State::new();
        l.push(Value::Table(t.clone())).unwrap();
        l.push_string(b"missing").unwrap();
        l.push_int(1).unwrap();
        l.set_table(-3).unwrap();
        l.push_int(2).unwrap();
        l.set_field(-2, b"present").unwrap();
        l.push_int(3).unwrap();
        StackTarget::set_field(&mut l, b"other").unwrap();
        l.push_int(4).unwrap();
        l.raw_seti(-2, 9).unwrap();

        assert_eq!(*log.borrow(), vec![Value::string("missing"), Value::string("other")]);
        let t = t.borrow();
        assert!(t.get_str(b"missing").is_nil());
        assert_eq!(t.get_str(b"present"), Value::Int(2));
        assert_eq!(t.get_int(9), Value::Int(4));
        assert_eq!(l.top(), 1);
    }

    #[test]
    fn newindex_tables_are_followed() {
        let sink = Rc::new(RefCell::new(Table::new()));
        let mut mt = Table::new();
        mt.set_str(b"__newindex", Value::Table(sink.clone()));
        let mut t = Table::new();
        t.set_metatable(Some(Rc::new(RefCell::new(mt))));

        let mut l = State::new();
        l.push(Value::table(t)).unwrap();
        l.push_bool(true).unwrap();
        l.set_field(-2, b"k").unwrap();
        assert_eq!(sink.borrow().get_str(b"k"), Value::Bool(true));

        let looped = Rc::new(RefCell::new(Table::new()));
        let mut mt = Table::new();
        mt.set_str(b"__newindex", Value::Table(looped.clone()));
        looped.borrow_mut().set_metatable(Some(Rc::new(RefCell::new(mt))));
        l.push(Value::Table(looped)).unwrap();
        l.push_bool(true).unwrap();
        assert_eq!(l.set_field(-2, b"k"), Err(Error::Runtime(NEWINDEX_LOOP)));
    }
}
