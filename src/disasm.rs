use std::fmt::{Display, Formatter};

use crate::error::Error;
use crate::host::HostMemory;
use crate::instr::{Decoder, Instr};

/// A fully decoded tape.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<'t> {
    pub instrs: Vec<(usize, Instr<'t>)>,
}

/// Decodes the whole tape without executing it. Fails on the first malformed instruction.
pub fn disassemble(tape: &[u8]) -> Result<Listing<'_>, Error> {
    let instrs = Decoder::new(tape).collect::<Result<Vec<_>, _>>()?;
    Ok(Listing { instrs })
}

impl<'t> Listing<'t> {
    pub fn len(&self) -> usize { self.instrs.len() }

    pub fn is_empty(&self) -> bool { self.instrs.is_empty() }

    /// Stack depth change if every instruction succeeds.
    pub fn net_depth(&self) -> isize { self.instrs.iter().map(|(_, i)| i.stack_delta()).sum() }

    /// Deepest point reached above the starting depth.
    pub fn max_depth(&self) -> isize {
        let mut depth = 0isize;
        let mut max = 0isize;
        for (_, instr) in &self.instrs {
            depth += instr.stack_delta();
            max = max.max(depth);
        }
        max
    }

    /// Count of instructions per opcode, in opcode order.
    pub fn histogram(&self) -> Vec<(crate::opcode::Op, usize)> {
        crate::opcode::Op::ALL
            .iter()
            .map(|op| (*op, self.instrs.iter().filter(|(_, i)| i.op() == *op).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Listing with pointer-mode strings shown through `host` where it can resolve them.
    pub fn with_host<'l, M: HostMemory + ?Sized>(&'l self, host: &'l M) -> WithHost<'l, 't, M> {
        WithHost { listing: self, host }
    }
}

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (offset, instr) in &self.instrs {
            writeln!(f, "{:04x}  {}", offset, instr)?;
        }
        Ok(())
    }
}

pub struct WithHost<'l, 't, M: ?Sized> {
    listing: &'l Listing<'t>,
    host: &'l M,
}

impl<M: HostMemory + ?Sized> Display for WithHost<'_, '_, M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (offset, instr) in &self.listing.instrs {
            write!(f, "{:04x}  {}", offset, instr)?;
            if let Instr::Str { addr, len } | Instr::SetF { addr, len } = instr {
                match self.host.view(*addr, *len) {
                    Some(bytes) => write!(f, "  ; \"{}\"", bytes.escape_ascii())?,
                    None => f.write_str("  ; <unresolved>")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Segment;
    use crate::tape::TapeWriter;

    #[test]
    fn listing_shows_offsets_and_operands() {
        let mut w = TapeWriter::new();
        w.table().int(-5).set_field_inline(b"n");
        let listing = disassemble(w.as_bytes()).unwrap();
        assert_eq!(listing.to_string(), "0000  TABLE\n0001  INT -5\n000a  SETFI \"n\"\n");
        assert_eq!(listing.net_depth(), 1);
        assert_eq!(listing.max_depth(), 2);
    }

    #[test]
    fn host_view_annotates_pointer_strings() {
        let seg_bytes = b"keyvalue";
        let mut w = TapeWriter::new();
        w.string_ptr(3, 5).string_ptr(100, 1);
        let listing = disassemble(w.as_bytes()).unwrap();
        let seg = Segment::new(0, seg_bytes);
        let text = listing.with_host(&seg).to_string();
        assert!(text.contains("; \"value\""));
        assert!(text.contains("; <unresolved>"));
    }
}
