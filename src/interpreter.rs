use std::io;

use crate::syntax::{
    IDENT_DEC_DATA, IDENT_DEC_DP, IDENT_INC_DATA, IDENT_INC_DP, IDENT_JUMP_NOT_ZERO,
    IDENT_JUMP_ZERO, IDENT_READ_BYTE, IDENT_WRITE_BYTE,
};
use crate::tape::Tape;
use crate::{ByteIn, ByteOut};

/// Character-dispatch interpreter over the raw source.
///
/// No compilation stage: brackets are matched by scanning for the partner
/// with a depth counter, and unknown bytes fall through as comments. The
/// bytecode pipeline is required to be observably identical to this
/// executor.
pub struct Interpreter<'a> {
    code: &'a [u8],
    ip: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code: code.as_bytes(),
            ip: 0,
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
        self.ip = 0;

        while self.ip < self.code.len() {
            match self.code[self.ip] {
                IDENT_INC_DP => tape.move_by(1),
                IDENT_DEC_DP => tape.move_by(-1),
                IDENT_INC_DATA => tape.add(1),
                IDENT_DEC_DATA => tape.add(-1),
                IDENT_WRITE_BYTE => output(tape.read())?,
                IDENT_READ_BYTE => tape.write(input()?),
                IDENT_JUMP_ZERO if tape.read() == 0 => {
                    let mut brackets = 0;
                    loop {
                        match self.code[self.ip] {
                            IDENT_JUMP_ZERO => brackets += 1,
                            IDENT_JUMP_NOT_ZERO => brackets -= 1,
                            _ => {}
                        };
                        if brackets == 0 {
                            break;
                        }
                        self.ip += 1;
                    }
                }
                IDENT_JUMP_NOT_ZERO if tape.read() != 0 => {
                    let mut brackets = 0;
                    loop {
                        match self.code[self.ip] {
                            IDENT_JUMP_ZERO => brackets -= 1,
                            IDENT_JUMP_NOT_ZERO => brackets += 1,
                            _ => {}
                        };
                        if brackets == 0 {
                            break;
                        }
                        self.ip -= 1;
                    }
                }
                _ => {}
            }

            self.ip += 1;
        }

        Ok(())
    }
}
