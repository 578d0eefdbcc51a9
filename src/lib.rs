#![deny(unsafe_code)]

// Traces each decoded instruction when the batch_debug feature is enabled
#[cfg(feature = "batch_debug")]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(feature = "batch_debug"))]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_println;

pub mod error;
pub mod opcode;
mod byte_iter;
pub mod instr;
pub mod tape;
pub mod host;
pub mod target;
pub mod interp;
pub mod batch;
pub mod encode;
pub mod shapes;
pub mod disasm;
pub mod runtime;

pub use batch::{Batch, BatchPool};
pub use disasm::{disassemble, Listing};
pub use encode::{encode_value, walk_json, BatchEncode, JsonSink};
pub use error::Error;
pub use host::{HostBytes, HostMemory, NoPointers, Segment, TrustedHost};
pub use instr::{Decoder, Instr};
pub use interp::{execute, execute_or_restore};
pub use opcode::Op;
pub use runtime::{State, StateConfig, Table, TableRef, Value};
pub use shapes::{parse_query_string, CaptureResponse, QueryArg, QueryArgs};
pub use tape::TapeWriter;
pub use target::{StackGuard, StackTarget};
