//! Jargon machine entry point.
//!
//! Runs a textual instruction listing:
//! 1) parse the listing (one instruction per line, `#` comments),
//! 2) load it, resolving every label to a code index,
//! 3) execute until the machine halts or faults.
//!
//! On a clean halt the decoded final value is printed to stdout and the
//! process exits 0. Any other outcome (a parse or load diagnostic, a
//! terminal status other than `halted`, a malformed-state error) goes to
//! stderr and the process exits 1, so shells and scripts can detect
//! failure. With `--verbose` the loaded program and every machine state are
//! traced through the logger.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::debug;

use jargon::bytecode::parse_listing;
use jargon::input::StdinInput;
use jargon::loader::load;
use jargon::vm::{Status, Vm};

/// Run a Jargon instruction listing.
#[derive(Parser)]
#[command(name = "jargon", version, about = "Jargon virtual machine")]
struct Cli {
    /// Path to an instruction listing.
    file: PathBuf,

    /// Capacity of the runtime stack, in cells.
    #[arg(long, default_value_t = 1000)]
    stack_max: usize,

    /// Capacity of the runtime heap, in cells.
    #[arg(long, default_value_t = 1000)]
    heap_max: usize,

    /// Trace the loaded program and every machine state.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let src = fs::read_to_string(&cli.file).unwrap_or_else(|e| {
        eprintln!("{}: {}", cli.file.display(), e);
        process::exit(1)
    });

    let listing = match parse_listing(&src) {
        Ok(listing) => listing,
        Err(e) => {
            eprintln!("{}: {}", cli.file.display(), e);
            process::exit(1)
        }
    };

    let program = match load(&listing) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1)
        }
    };
    debug!("loaded program:\n{}", program);

    let mut vm = Vm::new(program, cli.stack_max, cli.heap_max);
    let mut input = StdinInput;
    match vm.run(&mut input) {
        Ok(Status::Halted) => match vm.result() {
            Ok(value) => println!("{}", value),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        },
        Ok(status) => {
            eprintln!("{}", status);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
