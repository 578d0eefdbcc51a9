// The first error ends the batch; nothing already applied is undone.

use crate::byte_iter::ByteIter;
use crate::debug_println;
use crate::error::Error;
use crate::host::HostMemory;
use crate::instr::{decode_next, Instr};
use crate::target::{StackGuard, StackTarget};

/// Runs every instruction of `tape` against `target`, resolving pointer operands through `host`.
pub fn execute<T, M>(tape: &[u8], host: &M, target: &mut T) -> Result<(), Error>
where
    T: StackTarget + ?Sized,
    M: HostMemory + ?Sized,
{
    let mut it = ByteIter::new(tape);
    let mut presize = PresizeBudget::new(tape.len());
    loop {
        let offset = it.cur();
        let instr = match decode_next(&mut it) {
            Ok(Some(instr)) => instr,
            Ok(None) => return Ok(()),
            Err(e) => {
                debug_println!("[batch] decode failed at {:04x}: {}", offset, e);
                return Err(e);
            }
        };
        debug_println!("[batch] {:04x}  {}", offset, instr);
        apply(instr, offset, host, &mut presize, target)?;
    }
}

/// Like [`execute`], but on any error truncates the stack back to its depth before the call.
pub fn execute_or_restore<T, M>(tape: &[u8], host: &M, target: &mut T) -> Result<(), Error>
where
    T: StackTarget + ?Sized,
    M: HostMemory + ?Sized,
{
    let guard = StackGuard::snapshot(target);
    let result = execute(tape, host, target);
    if result.is_err() {
        guard.restore(target);
    }
    result
}

/// Every pre-sized slot is filled by at least one set instruction of at least one byte, so honest
/// hints never total more than the tape length. Hints beyond that are cut down.
struct PresizeBudget {
    left: usize,
}

impl PresizeBudget {
    fn new(tape_len: usize) -> Self { Self { left: tape_len } }

    fn take(&mut self, hint: u32) -> u32 {
        let granted = (hint as usize).min(self.left);
        self.left -= granted;
        granted as u32
    }
}

#[inline]
fn resolve<'m, M: HostMemory + ?Sized>(host: &'m M, addr: u64, len: u32, offset: usize) -> Result<&'m [u8], Error> {
    host.view(addr, len).ok_or(Error::BadPointer { offset })
}

#[inline]
fn apply<T, M>(
    instr: Instr<'_>,
    offset: usize,
    host: &M,
    presize: &mut PresizeBudget,
    target: &mut T,
) -> Result<(), Error>
where
    T: StackTarget + ?Sized,
    M: HostMemory + ?Sized,
{
    match instr {
        Instr::Nil => target.push_nil(),
        Instr::True => target.push_bool(true),
        Instr::False => target.push_bool(false),
        Instr::Int(v) => target.push_int(v),
        Instr::Num(v) => target.push_float(v),
        Instr::Str { addr, len } => target.push_string(resolve(host, addr, len, offset)?),
        Instr::StrI(bytes) => target.push_string(bytes),
        Instr::Table => target.new_table(),
        Instr::TableA { array, map } => {
            let array = presize.take(array);
            target.new_table_sized(array, presize.take(map))
        }
        Instr::Set => target.generic_set(),
        Instr::SetF { addr, len } => target.set_field(resolve(host, addr, len, offset)?),
        Instr::SetFI(key) => target.set_field(key),
        Instr::SetI(idx) => target.set_index(idx as i64),
        Instr::Pop(count) => target.pop_n(count as usize),
    }
}
