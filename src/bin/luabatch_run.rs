use clap::Parser;
use std::path::PathBuf;
use luabatch::{execute, execute_or_restore, HostMemory, NoPointers, Segment, State, StateConfig};

mod utils;
use utils::{read_segment, read_tape};

#[derive(Parser, Debug)]
#[command(name = "luabatch-run")]
#[command(about = "Execute a batch tape against the reference runtime")]
#[command(long_about = "
luabatch-run - execute a value-construction tape and print the resulting stack

Pointer-mode strings (STR, SETF) resolve against a segment file mapped at --base.
Without a segment, any pointer instruction fails with a bad-pointer error.

Examples:
  # Run a binary tape
  luabatch-run response.tape

  # Run a hex tape whose strings live in a separate file
  luabatch-run response.hex --hex --segment strings.bin

  # Roll the stack back if the tape fails part way
  luabatch-run broken.tape --restore
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

    /// Stack depth limit of the runtime
    #[arg(long, default_value_t = StateConfig::DEFAULT_MAX_STACK)]
    max_stack: usize,

    /// Restore the stack depth when execution fails
    #[arg(short, long)]
    restore: bool,

    /// Print the stack as compact JSON
    #[arg(long)]
    compact: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn run<M: HostMemory + ?Sized>(args: &Args, tape: &[u8], host: &M, state: &mut State) -> Result<(), luabatch::Error> {
    if args.restore {
        execute_or_restore(tape, host, state)
    } else {
        execute(tape, host, state)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let tape = read_tape(&args.tape_file, args.hex)?;
    let segment = read_segment(args.segment.as_deref())?;
    if args.debug {
        eprintln!("Tape size: {} bytes", tape.len());
        if let Some(seg) = &segment {
            eprintln!("Segment: {} bytes at 0x{:x}", seg.len(), args.base);
        }
    }

    let mut state = State::with_config(StateConfig { max_stack: args.max_stack });
    let result = match &segment {
        Some(seg) => run(&args, &tape, &Segment::new(args.base, seg), &mut state),
        None => run(&args, &tape, &NoPointers, &mut state),
    };

    let stack = if args.compact {
        serde_json::to_string(state.values())?
    } else {
        serde_json::to_string_pretty(state.values())?
    };
    println!("{}", stack);

    if let Err(e) = result {
        if args.debug {
            eprintln!("Stack depth at failure: {}", state.top());
        }
        return Err(format!("Execution failed: {}", e).into());
    }
    Ok(())
}
