//! JAPL driver
//!
//! `japl [file]` executes a script. With no argument and a terminal on
//! stdin it starts the REPL; with piped stdin it reads the embedded test
//! protocol (source up to an EOT byte, the remainder being the program's
//! standard input payload). `-c EXPR` evaluates inline source, and
//! `--test PATH...` runs the directive test runner.

mod repl;
mod test_runner;

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser as ClapParser};
use tracing_subscriber::EnvFilter;

use japl_compiler::compile;
use japl_runtime::Vm;

/// Lex or compile error.
const EXIT_COMPILE: i32 = 65;
/// Runtime error.
const EXIT_RUNTIME: i32 = 70;
/// Driver I/O failure.
const EXIT_IO: i32 = 74;

#[derive(ClapParser)]
#[command(name = "japl")]
#[command(about = "The JAPL programming language", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Source file to execute; with no file, start the REPL
    file: Option<PathBuf>,

    /// Evaluate EXPR as inline source and exit
    #[arg(short = 'c', value_name = "EXPR")]
    command: Option<String>,

    /// Run the directive test runner over these files or directories
    #[arg(long = "test", value_name = "PATH", num_args = 1..)]
    test: Vec<PathBuf>,

    /// Print version information and exit
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    version: bool,
}

fn main() {
    let filter = EnvFilter::try_from_env("JAPL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    if cli.version {
        println!("japl {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }
    if !cli.test.is_empty() {
        return test_runner::run_paths(&cli.test);
    }
    if let Some(source) = cli.command {
        return run_source(&source, "<command>");
    }
    match cli.file {
        Some(path) => run_file(&path),
        None if io::stdin().is_terminal() => repl::run(),
        None => run_piped(),
    }
}

fn run_file(path: &Path) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("japl: cannot read {}: {}", path.display(), error);
            return EXIT_IO;
        }
    };
    run_source(&source, &path.display().to_string())
}

/// Embedded test protocol: everything up to EOT (0x04) is the source; the
/// remainder is the program's standard input payload.
fn run_piped() -> i32 {
    let mut input = Vec::new();
    if let Err(error) = io::stdin().read_to_end(&mut input) {
        eprintln!("japl: cannot read stdin: {}", error);
        return EXIT_IO;
    }
    let source = match input.iter().position(|&byte| byte == 0x04) {
        Some(eot) => &input[..eot],
        None => &input[..],
    };
    let source = String::from_utf8_lossy(source).into_owned();
    run_source(&source, "<stdin>")
}

fn run_source(source: &str, file: &str) -> i32 {
    let mut vm = Vm::new(file);
    register_interrupt(&vm);

    let function = match compile(source, file, vm.heap_mut()) {
        Ok(function) => function,
        Err(_) => return EXIT_COMPILE,
    };
    match vm.interpret(function) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("{}", error);
            EXIT_RUNTIME
        }
    }
}

/// SIGINT sets the VM's cooperative interrupt flag; the VM raises
/// `InterruptedError` before its next instruction.
#[cfg(unix)]
fn register_interrupt(vm: &Vm) {
    let flag = vm.interrupt_flag();
    if let Err(error) = signal_hook::flag::register(signal_hook::consts::SIGINT, flag) {
        tracing::warn!("could not install SIGINT handler: {}", error);
    }
}

#[cfg(not(unix))]
fn register_interrupt(_vm: &Vm) {}
