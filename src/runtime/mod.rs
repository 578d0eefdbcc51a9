//! In-process reference runtime the tools and tests run batches on.

mod state;
mod table;
mod value;

pub use state::{error_message, State, StateConfig, REF_NIL};
pub use table::{Table, MAX_PRESIZE};
pub use value::{HostFn, TableRef, Value};
