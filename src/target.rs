use crate::error::Error;

/// The operand stack of an embedded runtime, reduced to what the batch interpreter needs.
///
/// Depth contract: every push and table creation adds one value; `generic_set` removes two;
/// `set_field` and `set_index` remove one; `pop_n(n)` removes `n`. A failing call must leave the
/// stack as it found it.
pub trait StackTarget {
    fn push_nil(&mut self) -> Result<(), Error>;
    fn push_bool(&mut self, v: bool) -> Result<(), Error>;
    fn push_int(&mut self, v: i64) -> Result<(), Error>;
    fn push_float(&mut self, v: f64) -> Result<(), Error>;
    /// Copies `bytes` into runtime-owned storage before returning.
    fn push_string(&mut self, bytes: &[u8]) -> Result<(), Error>;

    fn new_table(&mut self) -> Result<(), Error> { self.new_table_sized(0, 0) }
    /// The hints only pre-size storage; backends without presizing may ignore them.
    fn new_table_sized(&mut self, array_hint: u32, map_hint: u32) -> Result<(), Error>;

    /// Value on top, key below it, table below the key: `table[key] = value`, pops key and value.
    fn generic_set(&mut self) -> Result<(), Error>;
    /// Value on top, table below it: `table[key] = value`, pops the value.
    fn set_field(&mut self, key: &[u8]) -> Result<(), Error>;
    /// Value on top, table below it: raw `table[idx] = value`, pops the value.
    fn set_index(&mut self, idx: i64) -> Result<(), Error>;
    fn pop_n(&mut self, count: usize) -> Result<(), Error>;

    /// Current number of values on the stack.
    fn depth(&self) -> usize;
    /// Drops values above `depth`; no-op when the stack is already at or below it.
    fn truncate(&mut self, depth: usize);
}

/// Remembered stack depth for undoing a failed batch.
///
/// The interpreter never rolls back. Callers that want all-or-nothing construction take a
/// snapshot before executing and restore it on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct StackGuard {
    depth: usize,
}

impl StackGuard {
    pub fn snapshot<T: StackTarget + ?Sized>(target: &T) -> Self { Self { depth: target.depth() } }

    pub fn depth(&self) -> usize { self.depth }

    /// Values pushed since the snapshot, or zero if the stack shrank below it.
    pub fn pushed_since<T: StackTarget + ?Sized>(&self, target: &T) -> usize {
        target.depth().saturating_sub(self.depth)
    }

    pub fn restore<T: StackTarget + ?Sized>(self, target: &mut T) { target.truncate(self.depth); }
}
