use crate::error::{BracketSide, CompileError};
use crate::syntax::{
    Scanner, Token, TokenKind, IDENT_DEC_DATA, IDENT_DEC_DP, IDENT_INC_DATA, IDENT_INC_DP,
};

/// A single bytecode instruction.
///
/// Jump operands are relative: a taken jump at index `i` with operand `k`
/// continues execution at `i + k + 1`, so a `JumpIfZero` at `i` always has
/// its matching `JumpIfNonZero` at `i + k` and vice versa (with `k`
/// negative). `AddCell` keeps the full signed run sum; the executors reduce
/// it modulo 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Move the data pointer by a signed number of cells.
    MovePointer(i32),
    /// Add a signed value to the current cell, modulo 256.
    AddCell(i32),
    /// Branch forward past the matching `JumpIfNonZero` when the current
    /// cell is zero.
    JumpIfZero(i32),
    /// Branch backward to just past the matching `JumpIfZero` when the
    /// current cell is non-zero.
    JumpIfNonZero(i32),
    /// Emit the current cell through the byte-out callback.
    Output,
    /// Replace the current cell with the next byte-in byte.
    Input,
    /// `Zero(0)` clears the current cell in place. `Zero(n)`, n > 0, clears
    /// `n` cells starting at the pointer and advances the pointer by `n`.
    Zero(i32),
}

/// Single-pass bytecode compiler.
///
/// Brackets resolve through a nesting stack: `[` pushes the index of its
/// placeholder instruction, `]` pops it and backpatches the forward offset.
/// The peepholes recognize `[-]` and chains of `[-]>` units directly from
/// the token stream, so fused instructions are the canonical form.
pub struct Compiler {
    tokens: Vec<Token>,
}

impl Compiler {
    pub fn new(code: &str) -> Self {
        Self {
            tokens: Scanner::new(code).collect(),
        }
    }

    pub fn compile(&self) -> Result<Vec<Instruction>, CompileError> {
        let mut res = Vec::new();

        // Entries pair the index of a pending JumpIfZero in `res` with the
        // source offset of its `[`, kept for diagnostics.
        let mut stack: Vec<(usize, usize)> = Vec::new();

        let mut i = 0;
        while i < self.tokens.len() {
            if self.is_clear_loop(i) {
                i = self.push_zero(i, &mut res);
                continue;
            }

            let token = self.tokens[i];
            match token.kind {
                TokenKind::Run(ident, len) => {
                    let len = len as i32;
                    res.push(match ident {
                        IDENT_INC_DP => Instruction::MovePointer(len),
                        IDENT_DEC_DP => Instruction::MovePointer(-len),
                        IDENT_INC_DATA => Instruction::AddCell(len),
                        IDENT_DEC_DATA => Instruction::AddCell(-len),
                        _ => unreachable!("scanner only batches pointer and data operators"),
                    });
                }
                TokenKind::Output => res.push(Instruction::Output),
                TokenKind::Input => res.push(Instruction::Input),
                TokenKind::Open => {
                    stack.push((res.len(), token.offset));
                    res.push(Instruction::JumpIfZero(0));
                }
                TokenKind::Close => {
                    let (open, _) =
                        stack
                            .pop()
                            .ok_or(CompileError::UnmatchedBracket {
                                side: BracketSide::Close,
                                offset: token.offset,
                            })?;
                    res[open] = Instruction::JumpIfZero((res.len() - open) as i32);
                    res.push(Instruction::JumpIfNonZero(open as i32 - res.len() as i32));
                }
            }

            i += 1;
        }

        if let Some(&(_, offset)) = stack.last() {
            return Err(CompileError::UnmatchedBracket {
                side: BracketSide::Open,
                offset,
            });
        }

        Ok(res)
    }

    /// Do the tokens at `i` spell `[-]`?
    fn is_clear_loop(&self, i: usize) -> bool {
        matches!(
            self.tokens.get(i..i + 3),
            Some(
                [
                    Token {
                        kind: TokenKind::Open,
                        ..
                    },
                    Token {
                        kind: TokenKind::Run(IDENT_DEC_DATA, 1),
                        ..
                    },
                    Token {
                        kind: TokenKind::Close,
                        ..
                    },
                ]
            )
        )
    }

    /// Emit the Zero instruction for the clear loop at `i`, absorbing a
    /// chain of `[-]>` units into a single clear-and-advance when one is
    /// present. Returns the index of the first unconsumed token.
    ///
    /// Each chain unit consumes exactly one `>`; when the final unit is
    /// followed by a longer run, the leftover pointer moves are emitted as
    /// an ordinary MovePointer, and the chain ends there.
    fn push_zero(&self, mut i: usize, res: &mut Vec<Instruction>) -> usize {
        match self.pointer_run(i + 3) {
            None => {
                res.push(Instruction::Zero(0));
                i + 3
            }
            Some(run) => {
                let mut units = 1;
                let mut leftover = run - 1;
                i += 4;

                while leftover == 0 && self.is_clear_loop(i) {
                    match self.pointer_run(i + 3) {
                        Some(run) => {
                            units += 1;
                            leftover = run - 1;
                            i += 4;
                        }
                        None => break,
                    }
                }

                res.push(Instruction::Zero(units));
                if leftover > 0 {
                    res.push(Instruction::MovePointer(leftover as i32));
                }
                i
            }
        }
    }

    /// Length of the `>` run at token index `i`, if there is one.
    fn pointer_run(&self, i: usize) -> Option<usize> {
        match self.tokens.get(i) {
            Some(Token {
                kind: TokenKind::Run(IDENT_INC_DP, len),
                ..
            }) => Some(*len),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Compiler, Instruction};
    use crate::error::{BracketSide, CompileError};

    #[test]
    fn test_compile() {
        let code = "[]+[>>][,.--++][]";
        let instructions = Compiler::new(code).compile().unwrap();

        // Runs of the same operator compile into one instruction carrying
        // the run length, and jump operands are relative to the jump's own
        // index.
        assert_eq!(
            instructions,
            vec![
                Instruction::JumpIfZero(1),
                Instruction::JumpIfNonZero(-1),
                Instruction::AddCell(1),
                Instruction::JumpIfZero(2),
                Instruction::MovePointer(2),
                Instruction::JumpIfNonZero(-2),
                Instruction::JumpIfZero(5),
                Instruction::Input,
                Instruction::Output,
                Instruction::AddCell(-2),
                Instruction::AddCell(2),
                Instruction::JumpIfNonZero(-5),
                Instruction::JumpIfZero(1),
                Instruction::JumpIfNonZero(-1),
            ]
        );
    }

    #[test]
    fn test_compile_clear_loop() {
        assert_eq!(
            Compiler::new("[-]").compile().unwrap(),
            vec![Instruction::Zero(0)]
        );
    }

    #[test]
    fn test_compile_clear_loop_with_comments() {
        // The peephole matches the token stream, not the raw bytes.
        assert_eq!(
            Compiler::new("[ minus: - ] done").compile().unwrap(),
            vec![Instruction::Zero(0)]
        );
    }

    #[test]
    fn test_compile_clear_and_advance_chain() {
        assert_eq!(
            Compiler::new("[-]>[-]>").compile().unwrap(),
            vec![Instruction::Zero(2)]
        );
        assert_eq!(
            Compiler::new("[-]>[-]>[-]>").compile().unwrap(),
            vec![Instruction::Zero(3)]
        );
    }

    #[test]
    fn test_compile_clear_chain_splits_longer_pointer_run() {
        // Only one `>` belongs to each unit; `>>` ends the chain and the
        // second move survives as its own instruction.
        assert_eq!(
            Compiler::new("[-]>>[-]>").compile().unwrap(),
            vec![
                Instruction::Zero(1),
                Instruction::MovePointer(1),
                Instruction::Zero(1),
            ]
        );
    }

    #[test]
    fn test_compile_clear_chain_followed_by_bare_clear() {
        // The trailing `[-]` has no `>` so it stays a plain clear.
        assert_eq!(
            Compiler::new("[-]>[-]").compile().unwrap(),
            vec![Instruction::Zero(1), Instruction::Zero(0)]
        );
    }

    #[test]
    fn test_compile_does_not_fold_wider_loops() {
        // `[--]` is an ordinary loop, not a clear.
        assert_eq!(
            Compiler::new("[--]").compile().unwrap(),
            vec![
                Instruction::JumpIfZero(2),
                Instruction::AddCell(-2),
                Instruction::JumpIfNonZero(-2),
            ]
        );
    }

    #[test]
    fn test_compile_empty_and_comment_only_programs() {
        assert_eq!(Compiler::new("").compile().unwrap(), vec![]);
        assert_eq!(
            Compiler::new("only a comment\n").compile().unwrap(),
            vec![]
        );
    }

    #[test]
    fn test_compile_unmatched_close_bracket() {
        let err = Compiler::new("]").compile().unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnmatchedBracket {
                side: BracketSide::Close,
                offset: 0,
            }
        ));

        let err = Compiler::new("+-[]]").compile().unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnmatchedBracket {
                side: BracketSide::Close,
                offset: 4,
            }
        ));
    }

    #[test]
    fn test_compile_unmatched_open_bracket() {
        let err = Compiler::new("[").compile().unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnmatchedBracket {
                side: BracketSide::Open,
                offset: 0,
            }
        ));

        // The innermost pending bracket is reported.
        let err = Compiler::new("+[[]").compile().unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnmatchedBracket {
                side: BracketSide::Open,
                offset: 1,
            }
        ));
    }
}
