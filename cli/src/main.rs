//! `64th`: a command-line Forth-like REPL over `forth64_core`.

use forth64_core::memory::DEFAULT_DATA_CELLS;
use forth64_core::repl::{ReaderTokenSource, Repl};
use std::io;

const USAGE: &str = "64th [-d <cells>]";

enum Flags {
    Run { data_cells: u64 },
    Usage,
    Exit(i32),
}

fn parse_args(args: &[String]) -> Flags {
    let mut data_cells = DEFAULT_DATA_CELLS;
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--" {
            break;
        }
        if arg == "-h" {
            return Flags::Usage;
        }
        if arg == "-d" {
            let Some(value) = args.get(i + 1) else {
                eprintln!("-d argument must be a number greater than 0");
                return Flags::Exit(0);
            };
            match value.parse::<u64>() {
                Ok(n) if n > 0 => data_cells = n,
                _ => {
                    eprintln!("-d argument must be a number greater than 0");
                    return Flags::Exit(0);
                }
            }
            i += 2;
            continue;
        }
        if let Some(flag) = arg.strip_prefix('-') {
            eprintln!("Invalid option '-{flag}'");
            eprintln!("Try '64th -h'");
            return Flags::Exit(1);
        }
        i += 1;
    }
    Flags::Run { data_cells }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let data_cells = match parse_args(&args) {
        Flags::Usage => {
            println!("{USAGE}");
            return;
        }
        Flags::Exit(code) => std::process::exit(code),
        Flags::Run { data_cells } => data_cells,
    };

    let mut repl = Repl::new(data_cells);
    let mut source = ReaderTokenSource::new(io::stdin());
    repl.run(&mut source);
}
