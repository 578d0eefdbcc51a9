// Multi-byte operands are little-endian. Lengths are u32 and host addresses 8 bytes.

use std::fmt::{Display, Formatter};

/// Width of a pointer operand.
pub const PTR_SIZE: usize = 8;
/// Width of a length, index or hint operand.
pub const LEN_SIZE: usize = 4;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// push nil
    Nil = 0x01,
    /// push true
    True = 0x02,
    /// push false
    False = 0x03,
    /// `i64` operand; push integer
    Int = 0x04,
    /// `f64` bit pattern; push float
    Num = 0x05,
    /// host address + `u32` length; push a copy of the host bytes
    Str = 0x06,
    /// `u32` length + inline bytes; push a copy of the inline bytes
    StrI = 0x07,
    /// push an empty table
    Table = 0x08,
    /// `u32` array hint + `u32` map hint; push a pre-sized table
    TableA = 0x09,
    /// pop value and key, assign into the table below them
    Set = 0x0A,
    /// host address + `u32` length key; pop value, assign into the table below it
    SetF = 0x0B,
    /// `u32` length + inline key bytes; pop value, assign into the table below it
    SetFI = 0x0C,
    /// `u32` index; pop value, raw-assign at that integer key
    SetI = 0x0D,
    /// `u8` count; discard that many values
    Pop = 0x0E,
}

impl Op {
    pub const ALL: [Op; 14] = [
        Op::Nil, Op::True, Op::False, Op::Int, Op::Num, Op::Str, Op::StrI,
        Op::Table, Op::TableA, Op::Set, Op::SetF, Op::SetFI, Op::SetI, Op::Pop,
    ];

    #[inline]
    pub fn from_byte(byte: u8) -> Option<Op> {
        match byte {
            0x01 => Some(Op::Nil),
            0x02 => Some(Op::True),
            0x03 => Some(Op::False),
            0x04 => Some(Op::Int),
            0x05 => Some(Op::Num),
            0x06 => Some(Op::Str),
            0x07 => Some(Op::StrI),
            0x08 => Some(Op::Table),
            0x09 => Some(Op::TableA),
            0x0A => Some(Op::Set),
            0x0B => Some(Op::SetF),
            0x0C => Some(Op::SetFI),
            0x0D => Some(Op::SetI),
            0x0E => Some(Op::Pop),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn byte(self) -> u8 { self as u8 }

    /// Fixed part of the operand in bytes. For `STRI`/`SETFI` this is the length prefix only.
    pub fn operand_width(self) -> usize {
        match self {
            Op::Nil | Op::True | Op::False | Op::Table | Op::Set => 0,
            Op::Int | Op::Num => 8,
            Op::Str | Op::SetF => PTR_SIZE + LEN_SIZE,
            Op::StrI | Op::SetFI | Op::SetI => LEN_SIZE,
            Op::TableA => 2 * LEN_SIZE,
            Op::Pop => 1,
        }
    }

    /// Opcodes whose operand carries its own payload after a length prefix.
    #[inline]
    pub fn has_inline_payload(self) -> bool { matches!(self, Op::StrI | Op::SetFI) }

    /// Opcodes that reference host memory by address.
    #[inline]
    pub fn has_pointer(self) -> bool { matches!(self, Op::Str | Op::SetF) }

    pub fn name(self) -> &'static str {
        match self {
            Op::Nil => "NIL",
            Op::True => "TRUE",
            Op::False => "FALSE",
            Op::Int => "INT",
            Op::Num => "NUM",
            Op::Str => "STR",
            Op::StrI => "STRI",
            Op::Table => "TABLE",
            Op::TableA => "TABLEA",
            Op::Set => "SET",
            Op::SetF => "SETF",
            Op::SetFI => "SETFI",
            Op::SetI => "SETI",
            Op::Pop => "POP",
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_map_back_to_their_opcode() {
        for op in Op::ALL {
            assert_eq!(Op::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn bytes_outside_the_set_are_rejected() {
        assert_eq!(Op::from_byte(0x00), None);
        assert_eq!(Op::from_byte(0x0F), None);
        assert_eq!(Op::from_byte(0xFF), None);
    }
}
