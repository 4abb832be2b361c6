//! Interactive read-eval-print loop
//!
//! One VM lives for the whole session: globals persist across lines while
//! the value and frame stacks reset per evaluation. After each successful
//! line the value most recently popped at top level is echoed unless it
//! is nil. Errors re-enter the prompt with the VM state intact.

use std::io::{self, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use japl_compiler::compile;
use japl_core::value::Object;
use japl_runtime::Vm;

const PROMPT: &str = "=> ";

pub fn run() -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("japl: cannot start line editor: {}", error);
            return crate::EXIT_IO;
        }
    };

    banner();
    let mut vm = Vm::new("<stdin>");

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line == "//clear" {
                    clear_screen();
                    banner();
                    continue;
                }
                let _ = editor.add_history_entry(line);
                evaluate(&mut vm, line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("japl: {}", error);
                break;
            }
        }
    }
    0
}

fn banner() {
    println!(
        "JAPL {} [{} {}]",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

fn evaluate(vm: &mut Vm, source: &str) {
    // Compile errors were already reported to stderr.
    let Ok(function) = compile(source, "<stdin>", vm.heap_mut()) else {
        return;
    };
    match vm.interpret(function) {
        Ok(()) => {
            let last = vm.take_last_pop();
            if !matches!(last.as_ref(), Object::Nil) {
                println!("{}", last);
            }
        }
        Err(error) => eprintln!("{}", error),
    }
}

fn clear_screen() {
    print!("\x1b[2J\x1b[1;1H");
    let _ = io::stdout().flush();
}
