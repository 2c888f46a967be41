use crate::compiler::{Compiler, Instruction};
use crate::error::{CompileError, ExecuteError};
use crate::jit::{JitCompiler, JitProgram};
use crate::tape::Tape;
use crate::virtual_machine::VirtualMachine;
use crate::{ByteIn, ByteOut};

/// The compile/execute interface both backends implement.
///
/// `compile` turns source text into an opaque [Executable]; `execute` runs
/// one against a caller-owned tape with caller-supplied byte callbacks. An
/// executable may be executed any number of times, but only by the machine
/// flavor that produced it.
pub trait Machine {
    fn compile(&self, code: &str) -> Result<Executable, CompileError>;

    fn execute(
        &self,
        executable: &Executable,
        tape: &mut Tape,
        output: ByteOut<'_>,
        input: ByteIn<'_>,
    ) -> Result<(), ExecuteError>;
}

/// A compiled program. The payload is backend-specific and private;
/// handing an executable to the wrong machine fails with
/// [ExecuteError::BackendMismatch] instead of misinterpreting the payload.
pub struct Executable {
    payload: Payload,
}

enum Payload {
    Bytecode(Vec<Instruction>),
    Jit(JitProgram),
}

/// Machine backed by the bytecode compiler and its dispatch-loop
/// interpreter.
pub struct BytecodeMachine;

impl Machine for BytecodeMachine {
    fn compile(&self, code: &str) -> Result<Executable, CompileError> {
        Ok(Executable {
            payload: Payload::Bytecode(Compiler::new(code).compile()?),
        })
    }

    fn execute(
        &self,
        executable: &Executable,
        tape: &mut Tape,
        output: ByteOut<'_>,
        input: ByteIn<'_>,
    ) -> Result<(), ExecuteError> {
        match &executable.payload {
            Payload::Bytecode(instructions) => {
                VirtualMachine::new(instructions).execute(tape, output, input)?;
                Ok(())
            }
            Payload::Jit(_) => Err(ExecuteError::BackendMismatch),
        }
    }
}

/// Machine backed by the Cranelift lowering backend; executables hold
/// native code.
pub struct JitMachine;

impl Machine for JitMachine {
    fn compile(&self, code: &str) -> Result<Executable, CompileError> {
        Ok(Executable {
            payload: Payload::Jit(JitCompiler::new(code).compile()?),
        })
    }

    fn execute(
        &self,
        executable: &Executable,
        tape: &mut Tape,
        output: ByteOut<'_>,
        input: ByteIn<'_>,
    ) -> Result<(), ExecuteError> {
        match &executable.payload {
            Payload::Jit(program) => {
                program.execute(tape, output, input)?;
                Ok(())
            }
            Payload::Bytecode(_) => Err(ExecuteError::BackendMismatch),
        }
    }
}
