use clap::Parser;
use std::path::PathBuf;
use luabatch::{disassemble, Segment};

mod utils;
use utils::{read_segment, read_tape};

#[derive(Parser, Debug)]
#[command(name = "luabatch-inspect")]
#[command(about = "Disassemble a batch tape")]
#[command(long_about = "
luabatch-inspect - decode a value-construction tape without running it

Prints one instruction per line with its byte offset. With --segment, pointer-mode
strings are shown next to the instruction that refers to them.

Examples:
  luabatch-inspect response.tape
  luabatch-inspect response.hex --hex --segment strings.bin --stats
")]
struct Args {
    /// Path to the tape file
    tape_file: PathBuf,

    /// The tape file holds hex digits instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// File providing the bytes pointer-mode strings refer to
    #[arg(short, long)]
    segment: Option<PathBuf>,

    /// Address the segment is mapped at
    #[arg(long, default_value_t = 0)]
    base: u64,

    /// Print instruction counts and stack effect
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let tape = read_tape(&args.tape_file, args.hex)?;
    let segment = read_segment(args.segment.as_deref())?;
    let listing = disassemble(&tape).map_err(|e| format!("Decode failed: {}", e))?;

    match &segment {
        Some(seg) => print!("{}", listing.with_host(&Segment::new(args.base, seg))),
        None => print!("{}", listing),
    }

    if args.stats {
        println!();
        println!("Instructions: {} ({} bytes)", listing.len(), tape.len());
        for (op, count) in listing.histogram() {
            println!("  {:<7}{}", op.name(), count);
        }
        println!("Net stack effect: {:+}", listing.net_depth());
        println!("Peak depth: {}", listing.max_depth());
    }
    Ok(())
}
