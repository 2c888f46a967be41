use std::fs::File;
use std::io::{self, Read, Write};
use std::str::FromStr;

use anyhow::{Context, Result};
use argh::FromArgs;
use brainfk::interpreter::Interpreter;
use brainfk::machine::{BytecodeMachine, JitMachine, Machine};
use brainfk::tape::Tape;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Execute Brainfuck programs and choose the execution environment to run
/// them in. Starts an interactive prompt when no file is given.
#[derive(FromArgs, Debug)]
struct Args {
    /// execution environment to run the brainfuck program in (`interpreter`, `vm` or `jit`)
    #[argh(option, default = "Environment::VirtualMachine")]
    env: Environment,

    /// the brainfuck program to execute; omit for a repl
    #[argh(positional)]
    file: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Environment {
    Interpreter,
    VirtualMachine,
    JitCompiler,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreter" => Ok(Environment::Interpreter),
            "vm" => Ok(Environment::VirtualMachine),
            "jit" => Ok(Environment::JitCompiler),
            _ => Err(r#"

    valid values:
    - `interpreter` to execute the source directly (slow)
    - `vm`          to compile to bytecode first   (faster)
    - `jit`         to compile to native code      (fastest)"#
                .to_string()),
        }
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    match args.file {
        Some(file) => {
            let mut program = String::new();

            File::open(&file)
                .with_context(|| format!("failed to open file {file}"))?
                .read_to_string(&mut program)
                .with_context(|| format!("failed to read file {file}"))?;

            run_program(args.env, &program)
        }
        None => run_repl(args.env),
    }
}

fn run_program(env: Environment, program: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let mut stdin = io::stdin().lock();

    let mut output = |byte: u8| -> io::Result<()> {
        stdout.write_all(&[byte])?;
        stdout.flush()
    };
    let mut input = || -> io::Result<u8> {
        let mut buf = [0; 1];
        stdin.read_exact(&mut buf)?;
        Ok(buf[0])
    };

    let mut tape = Tape::new();

    match env {
        Environment::Interpreter => Interpreter::new(program)
            .execute(&mut tape, &mut output, &mut input)
            .context("failed to execute the program with the interpreter"),
        Environment::VirtualMachine => {
            let machine = BytecodeMachine;
            let executable = machine.compile(program)?;
            machine
                .execute(&executable, &mut tape, &mut output, &mut input)
                .context("failed to execute the program on the virtual machine")
        }
        Environment::JitCompiler => {
            let machine = JitMachine;
            let executable = machine.compile(program)?;
            machine
                .execute(&executable, &mut tape, &mut output, &mut input)
                .context("failed to execute the program with the jit compiler")
        }
    }
}

/// Prompt loop: every line is a complete program, compiled and executed
/// against a fresh tape. `quit` or end-of-input leaves the repl.
fn run_repl(env: Environment) -> Result<()> {
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("brainfk> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = editor.add_history_entry(line);
                if line.eq_ignore_ascii_case("quit") {
                    break;
                }

                if let Err(err) = run_program(env, line) {
                    eprintln!("error: {err:#}");
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}
