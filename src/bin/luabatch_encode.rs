use clap::Parser;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use luabatch::{walk_json, JsonSink, TapeWriter};
use serde_json::Value as Json;

#[derive(Parser, Debug)]
#[command(name = "luabatch-encode")]
#[command(about = "Encode a JSON document as a batch tape")]
#[command(long_about = "
luabatch-encode - turn a JSON document into a value-construction tape

Arrays become tables with 1-based indices and objects become tables keyed by member name.
Strings are inlined (STRI, SETFI) unless --segment is given, in which case they are written
to the segment file and referenced by offset (STR, SETF).

Examples:
  # Inline strings, binary output
  luabatch-encode doc.json -o doc.tape

  # Pointer strings, hex output on stdout
  luabatch-encode doc.json --segment strings.bin --hex
")]
struct Args {
    /// JSON input file (stdin when omitted)
    input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the tape as hex digits
    #[arg(long)]
    hex: bool,

    /// Write string bytes to this file and reference them by offset
    #[arg(short, long)]
    segment: Option<PathBuf>,

    /// Address the segment will be mapped at
    #[arg(long, default_value_t = 0)]
    base: u64,
}

struct Encoder {
    tape: TapeWriter,
    segment: Option<Vec<u8>>,
    base: u64,
    too_long: bool,
}

impl Encoder {
    fn intern(&mut self, s: &str) -> Option<(u64, u32)> {
        let seg = self.segment.as_mut()?;
        let addr = self.base + seg.len() as u64;
        seg.extend_from_slice(s.as_bytes());
        Some((addr, s.len() as u32))
    }

    fn fits(&mut self, s: &str) -> bool {
        self.too_long |= u32::try_from(s.len()).is_err();
        !self.too_long
    }
}

impl<'a> JsonSink<'a> for Encoder {
    fn nil(&mut self) { self.tape.nil(); }
    fn bool(&mut self, v: bool) { self.tape.bool(v); }
    fn int(&mut self, v: i64) { self.tape.int(v); }
    fn number(&mut self, v: f64) { self.tape.number(v); }

    fn string(&mut self, s: &'a str) {
        if !self.fits(s) { return; }
        match self.intern(s) {
            Some((addr, len)) => self.tape.string_ptr(addr, len),
            None => self.tape.inline_string(s),
        };
    }

    fn table_sized(&mut self, narr: usize, nrec: usize) {
        let hint = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        self.tape.table_sized(hint(narr), hint(nrec));
    }

    fn set_index(&mut self, idx: u32) { self.tape.set_index(idx); }

    fn set_field(&mut self, name: &'a str) {
        if !self.fits(name) { return; }
        match self.intern(name) {
            Some((addr, len)) => self.tape.set_field_ptr(addr, len),
            None => self.tape.set_field_inline(name.as_bytes()),
        };
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let text = match &args.input {
        Some(path) => fs::read_to_string(path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let doc: Json = serde_json::from_str(&text).map_err(|e| format!("Invalid JSON: {}", e))?;

    let mut enc = Encoder {
        tape: TapeWriter::new(),
        segment: args.segment.as_ref().map(|_| Vec::new()),
        base: args.base,
        too_long: false,
    };
    walk_json(&doc, &mut enc);
    if enc.too_long {
        return Err("String longer than 4 GiB".into());
    }

    let tape = enc.tape.into_bytes();
    let out = if args.hex { format!("{}\n", hex::encode(&tape)).into_bytes() } else { tape };
    match &args.output {
        Some(path) => fs::write(path, out)?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&out)?;
        }
    }
    if let (Some(path), Some(seg)) = (&args.segment, &enc.segment) {
        fs::write(path, seg)?;
    }
    Ok(())
}
