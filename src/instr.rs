// Every bounds check on the tape happens in `decode_next`.

use std::fmt::{Display, Formatter};

use crate::byte_iter::ByteIter;
use crate::error::Error;
use crate::opcode::Op;
use crate::tape::TapeWriter;

/// One instruction with its operands. Inline payloads borrow from the tape; pointer operands stay
/// raw until a [`HostMemory`](crate::host::HostMemory) policy resolves them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr<'t> {
    Nil,
    True,
    False,
    Int(i64),
    Num(f64),
    Str { addr: u64, len: u32 },
    StrI(&'t [u8]),
    Table,
    TableA { array: u32, map: u32 },
    Set,
    SetF { addr: u64, len: u32 },
    SetFI(&'t [u8]),
    SetI(u32),
    Pop(u8),
}

impl Instr<'_> {
    pub fn op(&self) -> Op {
        match self {
            Instr::Nil => Op::Nil,
            Instr::True => Op::True,
            Instr::False => Op::False,
            Instr::Int(_) => Op::Int,
            Instr::Num(_) => Op::Num,
            Instr::Str { .. } => Op::Str,
            Instr::StrI(_) => Op::StrI,
            Instr::Table => Op::Table,
            Instr::TableA { .. } => Op::TableA,
            Instr::Set => Op::Set,
            Instr::SetF { .. } => Op::SetF,
            Instr::SetFI(_) => Op::SetFI,
            Instr::SetI(_) => Op::SetI,
            Instr::Pop(_) => Op::Pop,
        }
    }

    /// Bytes this instruction occupies on the tape.
    pub fn encoded_len(&self) -> usize {
        let payload = match self {
            Instr::StrI(b) | Instr::SetFI(b) => b.len(),
            _ => 0,
        };
        1 + self.op().operand_width() + payload
    }

    /// Net change in stack depth when the instruction succeeds.
    pub fn stack_delta(&self) -> isize {
        match self {
            Instr::Nil | Instr::True | Instr::False | Instr::Int(_) | Instr::Num(_)
            | Instr::Str { .. } | Instr::StrI(_) | Instr::Table | Instr::TableA { .. } => 1,
            Instr::Set => -2,
            Instr::SetF { .. } | Instr::SetFI(_) | Instr::SetI(_) => -1,
            Instr::Pop(n) => -(*n as isize),
        }
    }

    pub fn encode(&self, w: &mut TapeWriter) {
        match *self {
            Instr::Nil => w.nil(),
            Instr::True => w.bool(true),
            Instr::False => w.bool(false),
            Instr::Int(v) => w.int(v),
            Instr::Num(v) => w.number(v),
            Instr::Str { addr, len } => w.string_ptr(addr, len),
            Instr::StrI(b) => w.inline_bytes(b),
            Instr::Table => w.table(),
            Instr::TableA { array, map } => w.table_sized(array, map),
            Instr::Set => w.set(),
            Instr::SetF { addr, len } => w.set_field_ptr(addr, len),
            Instr::SetFI(b) => w.set_field_inline(b),
            Instr::SetI(idx) => w.set_index(idx),
            Instr::Pop(n) => w.pop(n),
        };
    }
}

impl Display for Instr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let op = self.op();
        match self {
            Instr::Int(v) => write!(f, "{} {}", op, v),
            Instr::Num(v) => write!(f, "{} {:?}", op, v),
            Instr::Str { addr, len } | Instr::SetF { addr, len } => {
                write!(f, "{} 0x{:016x} len={}", op, addr, len)
            }
            Instr::StrI(b) | Instr::SetFI(b) => write!(f, "{} \"{}\"", op, b.escape_ascii()),
            Instr::TableA { array, map } => write!(f, "{} array={} map={}", op, array, map),
            Instr::SetI(idx) => write!(f, "{} {}", op, idx),
            Instr::Pop(n) => write!(f, "{} {}", op, n),
            _ => write!(f, "{}", op),
        }
    }
}

/// Decodes the instruction under the cursor. `Ok(None)` means the tape is exhausted.
pub(crate) fn decode_next<'t>(it: &mut ByteIter<'t>) -> Result<Option<Instr<'t>>, Error> {
    let offset = it.cur();
    let Some(byte) = it.read_u8() else { return Ok(None) };
    let op = Op::from_byte(byte).ok_or(Error::UnknownOpcode { offset, byte })?;
    let truncated = Error::TruncatedOperand { offset, op };

    let instr = match op {
        Op::Nil => Instr::Nil,
        Op::True => Instr::True,
        Op::False => Instr::False,
        Op::Int => Instr::Int(it.read_i64().ok_or(truncated)?),
        Op::Num => Instr::Num(it.read_f64().ok_or(truncated)?),
        Op::Str | Op::SetF => {
            let addr = it.read_u64().ok_or(truncated)?;
            let len = it.read_u32().ok_or(truncated)?;
            if op == Op::Str { Instr::Str { addr, len } } else { Instr::SetF { addr, len } }
        }
        Op::StrI | Op::SetFI => {
            let len = it.read_u32().ok_or(truncated)?;
            let bytes = it.take(len as usize).ok_or(truncated)?;
            if op == Op::StrI { Instr::StrI(bytes) } else { Instr::SetFI(bytes) }
        }
        Op::Table => Instr::Table,
        Op::TableA => {
            let array = it.read_u32().ok_or(truncated)?;
            let map = it.read_u32().ok_or(truncated)?;
            Instr::TableA { array, map }
        }
        Op::Set => Instr::Set,
        Op::SetI => Instr::SetI(it.read_u32().ok_or(truncated)?),
        Op::Pop => Instr::Pop(it.read_u8().ok_or(truncated)?),
    };
    Ok(Some(instr))
}

/// Iterates `(offset, instruction)` pairs. Stops after the first error.
pub struct Decoder<'t> {
    it: ByteIter<'t>,
    failed: bool,
}

impl<'t> Decoder<'t> {
    pub fn new(tape: &'t [u8]) -> Self { Self { it: ByteIter::new(tape), failed: false } }
}

impl<'t> Iterator for Decoder<'t> {
    type Item = Result<(usize, Instr<'t>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.it.empty() { return None; }
        let offset = self.it.cur();
        match decode_next(&mut self.it) {
            Ok(Some(instr)) => Some(Ok((offset, instr))),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_payload_is_borrowed_from_the_tape() {
        let tape = [0x07, 3, 0, 0, 0, b'f', b'o', b'o', 0x0E, 2];
        let got: Vec<_> = Decoder::new(&tape).collect::<Result<_, _>>().unwrap();
        assert_eq!(got, vec![(0, Instr::StrI(b"foo")), (8, Instr::Pop(2))]);
    }

    #[test]
    fn length_prefix_past_the_end_is_truncated() {
        let tape = [0x0C, 0xFF, 0xFF, 0xFF, 0xFF, b'x'];
        let err = Decoder::new(&tape).next().unwrap().unwrap_err();
        assert_eq!(err, Error::TruncatedOperand { offset: 0, op: Op::SetFI });
    }

    #[test]
    fn decoder_stops_after_an_error() {
        let tape = [0x01, 0x42, 0x01];
        let mut d = Decoder::new(&tape);
        assert_eq!(d.next(), Some(Ok((0, Instr::Nil))));
        assert_eq!(d.next(), Some(Err(Error::UnknownOpcode { offset: 1, byte: 0x42 })));
        assert_eq!(d.next(), None);
    }

    #[test]
    fn encoded_len_and_delta_follow_the_operand_shape() {
        assert_eq!(Instr::Int(7).encoded_len(), 9);
        assert_eq!(Instr::Str { addr: 0, len: 3 }.encoded_len(), 13);
        assert_eq!(Instr::SetFI(b"abc").encoded_len(), 8);
        assert_eq!(Instr::TableA { array: 1, map: 1 }.encoded_len(), 9);
        assert_eq!(Instr::Set.stack_delta(), -2);
        assert_eq!(Instr::Pop(3).stack_delta(), -3);
    }
}
