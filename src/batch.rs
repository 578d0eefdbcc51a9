// Strings passed by reference go into the tape as address and length. The `'a` lifetime keeps
// them borrowed while the batch exists, and the buffer is never exposed mutably.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::error::Error;
use crate::host::{HostBytes, TrustedHost};
use crate::interp::{execute, execute_or_restore};
use crate::target::StackTarget;
use crate::tape::TapeWriter;

#[inline]
fn hint_u32(n: usize) -> u32 { u32::try_from(n).unwrap_or(u32::MAX) }

#[derive(Debug, Clone, Default)]
pub struct Batch<'a> {
    tape: TapeWriter,
    _anchor: PhantomData<&'a [u8]>,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self { Self::from_buffer(Vec::with_capacity(TapeWriter::DEFAULT_CAPACITY)) }

    fn from_buffer(buf: Vec<u8>) -> Self {
        Self { tape: TapeWriter::from_vec(buf), _anchor: PhantomData }
    }

    fn into_buffer(self) -> Vec<u8> { self.tape.into_bytes() }

    pub fn reset(&mut self) { self.tape.clear(); }
    #[inline]
    pub fn len(&self) -> usize { self.tape.len() }
    #[inline]
    pub fn is_empty(&self) -> bool { self.tape.is_empty() }
    /// The encoded tape. Pointer operands in it are only meaningful while `self` is alive.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] { self.tape.as_bytes() }

    pub fn nil(&mut self) -> &mut Self {
        self.tape.nil();
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.tape.bool(v);
        self
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        self.tape.int(v);
        self
    }

    pub fn number(&mut self, v: f64) -> &mut Self {
        self.tape.number(v);
        self
    }

    /// Pushes `s` in pointer mode; the bytes stay in host memory until the batch runs.
    pub fn string(&mut self, s: &'a str) -> &mut Self { self.bytes(s.as_bytes()) }

    pub fn bytes(&mut self, b: &'a [u8]) -> &mut Self {
        let view = HostBytes::from_slice(b);
        self.tape.string_ptr(view.addr(), view.len());
        self
    }

    pub fn inline_string(&mut self, s: &str) -> &mut Self {
        self.tape.inline_string(s);
        self
    }

    pub fn table(&mut self) -> &mut Self {
        self.tape.table();
        self
    }

    pub fn table_sized(&mut self, narr: usize, nrec: usize) -> &mut Self {
        self.tape.table_sized(hint_u32(narr), hint_u32(nrec));
        self
    }

    pub fn set(&mut self) -> &mut Self {
        self.tape.set();
        self
    }

    /// Pops the value into field `name` of the table at -2; `name` stays in host memory.
    pub fn set_field(&mut self, name: &'a str) -> &mut Self {
        let view = HostBytes::from_slice(name.as_bytes());
        self.tape.set_field_ptr(view.addr(), view.len());
        self
    }

    pub fn set_field_inline(&mut self, name: &str) -> &mut Self {
        self.tape.set_field_inline(name.as_bytes());
        self
    }

    /// Pops the value into integer key `idx` of the table at -2, bypassing metamethods.
    pub fn set_index(&mut self, idx: u32) -> &mut Self {
        self.tape.set_index(idx);
        self
    }

    pub fn pop(&mut self, n: u8) -> &mut Self {
        self.tape.pop(n);
        self
    }

    /// `t.name = val` with a pointer-mode value and an inline field name.
    pub fn string_field(&mut self, name: &str, val: &'a str) -> &mut Self {
        self.string(val).set_field_inline(name)
    }

    pub fn int_field(&mut self, name: &str, val: i64) -> &mut Self {
        self.int(val).set_field_inline(name)
    }

    pub fn string_entry(&mut self, key: &'a str, val: &'a str) -> &mut Self {
        self.string(key).string(val).set()
    }

    /// On error the stack keeps whatever the instructions before the failure built.
    #[allow(unsafe_code)]
    pub fn push<T: StackTarget + ?Sized>(&self, target: &mut T) -> Result<(), Error> {
        if self.is_empty() { return Ok(()); }
        // SAFETY: every pointer operand in `self.tape` came from a `&'a` borrow, and `'a`
        // outlives `self`.
        let host = unsafe { TrustedHost::new() };
        execute(self.as_bytes(), &host, target)
    }

    /// Like [`push`](Self::push), but restores the stack depth if any instruction fails.
    #[allow(unsafe_code)]
    pub fn push_or_restore<T: StackTarget + ?Sized>(&self, target: &mut T) -> Result<(), Error> {
        if self.is_empty() { return Ok(()); }
        // SAFETY: as in `push`.
        let host = unsafe { TrustedHost::new() };
        execute_or_restore(self.as_bytes(), &host, target)
    }
}

/// Per-thread pool of batch buffers. At most `limit` buffers are retained.
pub struct BatchPool {
    free: RefCell<Vec<Vec<u8>>>,
    limit: usize,
}

impl BatchPool {
    pub const DEFAULT_LIMIT: usize = 64;

    pub fn new() -> Self { Self::with_limit(Self::DEFAULT_LIMIT) }

    pub fn with_limit(limit: usize) -> Self { Self { free: RefCell::new(Vec::new()), limit } }

    pub fn acquire<'a>(&self) -> Batch<'a> {
        match self.free.borrow_mut().pop() {
            Some(buf) => Batch::from_buffer(buf),
            None => Batch::new(),
        }
    }

    pub fn release(&self, batch: Batch<'_>) {
        let mut free = self.free.borrow_mut();
        if free.len() < self.limit {
            let mut buf = batch.into_buffer();
            buf.clear();
            free.push(buf);
        }
    }

    pub fn pooled(&self) -> usize { self.free.borrow().len() }
}

impl Default for BatchPool {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Op;

    #[test]
    fn builder_emits_expected_opcodes() {
        let mut b = Batch::new();
        b.nil();
        assert_eq!(b.as_bytes()[0], Op::Nil.byte());

        b.reset();
        b.bool(true);
        assert_eq!(b.as_bytes(), &[Op::True.byte()]);

        b.reset();
        b.bool(false);
        assert_eq!(b.as_bytes(), &[Op::False.byte()]);

        b.reset();
        b.int(42);
        assert_eq!(b.len(), 9);

        b.reset();
        b.inline_string("test");
        assert_eq!(b.as_bytes()[0], Op::StrI.byte());
        assert_eq!(b.len(), 9);
    }

    #[test]
    fn pointer_mode_embeds_the_string_address() {
        let body = String::from("hello world");
        let mut b = Batch::new();
        b.string(&body);
        let bytes = b.as_bytes();
        assert_eq!(bytes[0], Op::Str.byte());
        let addr = u64::from_le_bytes(bytes[1..9].try_into().unwrap());
        let len = u32::from_le_bytes(bytes[9..13].try_into().unwrap());
        assert_eq!(addr, body.as_ptr() as usize as u64);
        assert_eq!(len, 11);
    }

    #[test]
    fn empty_strings_use_a_null_address() {
        let mut b = Batch::new();
        b.string("");
        assert_eq!(&b.as_bytes()[1..], &[0u8; 12]);
    }

    #[test]
    fn pool_hands_back_reset_batches() {
        let pool = BatchPool::new();
        let mut b1 = pool.acquire();
        b1.int(1).int(2).int(3);
        pool.release(b1);
        assert_eq!(pool.pooled(), 1);

        let b2 = pool.acquire();
        assert!(b2.is_empty());
        assert_eq!(pool.pooled(), 0);
        pool.release(b2);
    }

    #[test]
    fn pool_respects_its_limit() {
        let pool = BatchPool::with_limit(1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.pooled(), 1);
    }
}
