use paste::paste;

use crate::opcode::Op;

macro_rules! impl_write_le {
    ($($type:ident),*) => {
        paste! {
            $(
                #[inline]
                fn [<write_ $type>](&mut self, v: $type) {
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
            )*
        }
    };
}

/// Converts a payload length to its `u32` wire form.
///
/// # Panics
/// If `len` does not fit in 32 bits; such a payload cannot be expressed on the tape.
#[inline]
pub(crate) fn len_u32(len: usize) -> u32 {
    assert!(len <= u32::MAX as usize, "tape payload of {} bytes exceeds u32 length", len);
    len as u32
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapeWriter {
    buf: Vec<u8>,
}

impl TapeWriter {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self { Self::with_capacity(Self::DEFAULT_CAPACITY) }

    pub fn with_capacity(cap: usize) -> Self { Self { buf: Vec::with_capacity(cap) } }

    /// Reuses an existing allocation; previous contents are discarded.
    pub fn from_vec(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    #[inline]
    pub fn clear(&mut self) { self.buf.clear(); }
    #[inline]
    pub fn len(&self) -> usize { self.buf.len() }
    #[inline]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] { &self.buf }
    pub fn into_bytes(self) -> Vec<u8> { self.buf }

    impl_write_le!(u32, u64, i64, f64);

    #[inline]
    fn op(&mut self, op: Op) { self.buf.push(op.byte()); }

    pub fn nil(&mut self) -> &mut Self {
        self.op(Op::Nil);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.op(if v { Op::True } else { Op::False });
        self
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        self.op(Op::Int);
        self.write_i64(v);
        self
    }

    pub fn number(&mut self, v: f64) -> &mut Self {
        self.op(Op::Num);
        self.write_f64(v);
        self
    }

    pub fn string_ptr(&mut self, addr: u64, len: u32) -> &mut Self {
        self.op(Op::Str);
        self.write_u64(addr);
        self.write_u32(len);
        self
    }

    pub fn inline_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.op(Op::StrI);
        self.write_u32(len_u32(bytes.len()));
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn inline_string(&mut self, s: &str) -> &mut Self { self.inline_bytes(s.as_bytes()) }

    pub fn table(&mut self) -> &mut Self {
        self.op(Op::Table);
        self
    }

    pub fn table_sized(&mut self, array_hint: u32, map_hint: u32) -> &mut Self {
        self.op(Op::TableA);
        self.write_u32(array_hint);
        self.write_u32(map_hint);
        self
    }

    pub fn set(&mut self) -> &mut Self {
        self.op(Op::Set);
        self
    }

    pub fn set_field_ptr(&mut self, addr: u64, len: u32) -> &mut Self {
        self.op(Op::SetF);
        self.write_u64(addr);
        self.write_u32(len);
        self
    }

    pub fn set_field_inline(&mut self, key: &[u8]) -> &mut Self {
        self.op(Op::SetFI);
        self.write_u32(len_u32(key.len()));
        self.buf.extend_from_slice(key);
        self
    }

    pub fn set_index(&mut self, idx: u32) -> &mut Self {
        self.op(Op::SetI);
        self.write_u32(idx);
        self
    }

    pub fn pop(&mut self, count: u8) -> &mut Self {
        self.op(Op::Pop);
        self.buf.push(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_sizes_match_the_wire_format() {
        let mut w = TapeWriter::new();
        w.int(42);
        assert_eq!(w.as_bytes(), &[0x04, 0x2A, 0, 0, 0, 0, 0, 0, 0]);

        w.clear();
        w.inline_string("test");
        assert_eq!(w.len(), 9);

        w.clear();
        w.string_ptr(0x1000, 5);
        assert_eq!(w.as_bytes(), &[0x06, 0, 0x10, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0]);
    }

    #[test]
    fn from_vec_keeps_the_allocation() {
        let mut v = Vec::with_capacity(1024);
        v.extend_from_slice(b"junk");
        let w = TapeWriter::from_vec(v);
        assert!(w.is_empty());
        assert!(w.into_bytes().capacity() >= 1024);
    }
}
