use std::fmt::{Display, Formatter};

use crate::opcode::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The byte at `offset` is not a defined opcode.
    UnknownOpcode { offset: usize, byte: u8 },
    /// The instruction starting at `offset` needs more bytes than the tape holds.
    TruncatedOperand { offset: usize, op: Op },
    /// A pointer-mode operand was rejected by the host memory policy.
    BadPointer { offset: usize },
    /// The stack target refused an operation.
    Runtime(&'static str),
}

impl Error {
    /// True for the malformed-tape kinds, false for host and runtime failures.
    #[inline]
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::UnknownOpcode { .. } | Error::TruncatedOperand { .. })
    }

    /// Tape offset of the failing instruction, when the error came from the tape.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::UnknownOpcode { offset, .. }
            | Error::TruncatedOperand { offset, .. }
            | Error::BadPointer { offset } => Some(*offset),
            Error::Runtime(_) => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownOpcode { offset, byte } => {
                write!(f, "{} 0x{:02x} at offset {}", UNKNOWN_OPCODE, byte, offset)
            }
            Error::TruncatedOperand { offset, op } => {
                write!(f, "{} for {} at offset {}", TRUNCATED_OPERAND, op, offset)
            }
            Error::BadPointer { offset } => write!(f, "{} at offset {}", BAD_POINTER, offset),
            Error::Runtime(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for Error {}

#[inline(always)]
pub fn runtime<T>(msg: &'static str) -> Result<T, Error> { Err(Error::Runtime(msg)) }

// Decode errors
pub const UNKNOWN_OPCODE: &str = "unknown opcode";
pub const TRUNCATED_OPERAND: &str = "truncated operand";
// Host errors
pub const BAD_POINTER: &str = "pointer operand outside host memory";
// Runtime errors
pub const STACK_OVERFLOW: &str = "stack overflow";
pub const STACK_UNDERFLOW: &str = "stack underflow";
pub const NIL_INDEX: &str = "table index is nil";
pub const NAN_INDEX: &str = "table index is NaN";
pub const INDEX_NIL: &str = "attempt to index a nil value";
pub const INDEX_BOOLEAN: &str = "attempt to index a boolean value";
pub const INDEX_NUMBER: &str = "attempt to index a number value";
pub const INDEX_STRING: &str = "attempt to index a string value";
pub const INDEX_FUNCTION: &str = "attempt to index a function value";
pub const INVALID_INDEX: &str = "invalid stack index";
pub const INVALID_REF: &str = "invalid registry reference";
pub const NOT_A_TABLE: &str = "table expected";
pub const CALL_NON_FUNCTION: &str = "attempt to call a non-function value";
pub const NEWINDEX_LOOP: &str = "'__newindex' chain too long; possible loop";
