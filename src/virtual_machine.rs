use std::io;

use crate::compiler::Instruction;
use crate::tape::Tape;
use crate::{ByteIn, ByteOut};

/// Dispatch loop over a compiled instruction slice.
///
/// Holds only the program counter; the tape and the byte callbacks belong to
/// the caller. Execution ends when the program counter runs off the end of
/// the instruction slice.
pub struct VirtualMachine<'a> {
    instructions: &'a [Instruction],
    pc: usize,
}

impl<'a> VirtualMachine<'a> {
    pub fn new(instructions: &'a [Instruction]) -> Self {
        Self {
            instructions,
            pc: 0,
        }
    }

    /// Executes the program, returning an error if one of the callbacks
    /// fails.
    pub fn execute(
        &mut self,
        tape: &mut Tape,
        mut output: ByteOut<'_>,
        mut input: ByteIn<'_>,
    ) -> io::Result<()> {
        self.pc = 0;

        while self.pc < self.instructions.len() {
            match self.instructions[self.pc] {
                Instruction::MovePointer(n) => tape.move_by(n),
                Instruction::AddCell(n) => tape.add(n),
                Instruction::Output => output(tape.read())?,
                Instruction::Input => tape.write(input()?),
                Instruction::Zero(0) => tape.write(0),
                Instruction::Zero(n) => tape.clear_run(n as usize),
                // Taken jumps add their operand on top of the regular
                // increment below.
                Instruction::JumpIfZero(n) if tape.read() == 0 => {
                    self.pc = self.pc.wrapping_add_signed(n as isize);
                }
                Instruction::JumpIfNonZero(n) if tape.read() != 0 => {
                    self.pc = self.pc.wrapping_add_signed(n as isize);
                }
                Instruction::JumpIfZero(_) | Instruction::JumpIfNonZero(_) => {}
            }

            self.pc += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read};

    use crate::compiler::Compiler;
    use crate::tape::Tape;

    use super::VirtualMachine;

    fn run(code: &str, input: &[u8]) -> (Tape, Vec<u8>) {
        let instructions = Compiler::new(code).compile().unwrap();
        let mut tape = Tape::new();
        let mut out = Vec::new();
        let mut cursor = Cursor::new(input.to_vec());

        let mut write = |byte: u8| -> io::Result<()> {
            out.push(byte);
            Ok(())
        };
        let mut read = || -> io::Result<u8> {
            let mut buf = [0; 1];
            cursor.read_exact(&mut buf)?;
            Ok(buf[0])
        };

        VirtualMachine::new(&instructions)
            .execute(&mut tape, &mut write, &mut read)
            .unwrap();

        (tape, out)
    }

    #[test]
    fn test_program_hi() {
        let code = "++++++++++[>+>+++>+++++++>++++++++++<<<<-]>>>++.>+++++.<<<.";
        let (_, out) = run(code, &[]);

        assert_eq!(out, b"Hi\n");
    }

    #[test]
    fn test_program_echo_until_dot() {
        // The loop exits when the input byte equals '.' (46), matching the
        // 46 decrements.
        let code = "+[,.----------------------------------------------]";
        let (_, out) = run(code, b"hello.");

        assert_eq!(out, b"hello.");
    }

    #[test]
    fn test_program_clear_then_space() {
        let code = "++++[-]++++++++++++++++++++++++++++++++.";
        let (tape, out) = run(code, &[]);

        assert_eq!(out, b" ");
        assert_eq!(tape.cell(0), 32);
    }

    #[test]
    fn test_program_fills_cells() {
        let (tape, _) = run("+>++>+++", &[]);

        assert_eq!(&tape.cells()[..4], &[1, 2, 3, 0]);
        assert_eq!(tape.pointer(), 2);
    }

    #[test]
    fn test_program_clear_chain() {
        let (tape, _) = run("+>++>+++<<[-]>[-]>[-]", &[]);

        assert_eq!(&tape.cells()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_program_skips_loop_on_zero_cell() {
        let (tape, _) = run("[++>]+", &[]);

        assert_eq!(tape.cell(0), 1);
        assert_eq!(tape.pointer(), 0);
    }

    #[test]
    fn test_cell_wraparound() {
        let code = "+".repeat(300);
        let (tape, _) = run(&code, &[]);

        // 300 mod 256
        assert_eq!(tape.cell(0), 44);
    }

    #[test]
    fn test_read_failure_propagates() {
        let instructions = Compiler::new(",").compile().unwrap();
        let mut tape = Tape::new();

        let mut write = |_: u8| -> io::Result<()> { Ok(()) };
        let mut read = || -> io::Result<u8> {
            let mut buf = [0; 1];
            io::empty().read_exact(&mut buf)?;
            Ok(buf[0])
        };

        let err = VirtualMachine::new(&instructions)
            .execute(&mut tape, &mut write, &mut read)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_program_hello_world() {
        let instructions = Compiler::new(include_str!("../programs/hello_world.b"))
            .compile()
            .unwrap();
        let mut tape = Tape::new();
        let mut out = Vec::new();

        let mut write = |byte: u8| -> io::Result<()> {
            out.push(byte);
            Ok(())
        };
        let mut read = || -> io::Result<u8> { Ok(0) };

        VirtualMachine::new(&instructions)
            .execute(&mut tape, &mut write, &mut read)
            .unwrap();

        assert_eq!(String::from_utf8(out), Ok("Hello World!\n".into()));
    }
}
