use std::collections::HashSet;

use once_cell::sync::Lazy;

pub const IDENT_INC_DP: u8 = b'>';
pub const IDENT_DEC_DP: u8 = b'<';
pub const IDENT_INC_DATA: u8 = b'+';
pub const IDENT_DEC_DATA: u8 = b'-';
pub const IDENT_WRITE_BYTE: u8 = b'.';
pub const IDENT_READ_BYTE: u8 = b',';
pub const IDENT_JUMP_ZERO: u8 = b'[';
pub const IDENT_JUMP_NOT_ZERO: u8 = b']';

pub static IDENTS: Lazy<HashSet<u8>> = Lazy::new(|| {
    let mut idents = HashSet::new();

    idents.insert(IDENT_INC_DP);
    idents.insert(IDENT_DEC_DP);
    idents.insert(IDENT_INC_DATA);
    idents.insert(IDENT_DEC_DATA);
    idents.insert(IDENT_WRITE_BYTE);
    idents.insert(IDENT_READ_BYTE);
    idents.insert(IDENT_JUMP_ZERO);
    idents.insert(IDENT_JUMP_NOT_ZERO);

    idents
});

/// A recognized piece of source text.
///
/// The four repeating operators `> < + -` are batched into maximal runs; the
/// remaining operators are single tokens. Every other byte is a comment and
/// never reaches the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A maximal run of one of `> < + -`, with the operator byte and the run
    /// length.
    Run(u8, usize),
    Output,
    Input,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first operator in the source text, for
    /// diagnostics.
    pub offset: usize,
}

/// Tokenizer over Brainfuck source text. Never fails.
pub struct Scanner<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code: code.as_bytes(),
            pos: 0,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.pos < self.code.len() && !IDENTS.contains(&self.code[self.pos]) {
            self.pos += 1;
        }

        if self.pos >= self.code.len() {
            return None;
        }

        let offset = self.pos;
        let ident = self.code[self.pos];

        let kind = match ident {
            IDENT_INC_DP | IDENT_DEC_DP | IDENT_INC_DATA | IDENT_DEC_DATA => {
                let mut len = 0;
                while self.pos < self.code.len() && self.code[self.pos] == ident {
                    len += 1;
                    self.pos += 1;
                }
                TokenKind::Run(ident, len)
            }
            other => {
                self.pos += 1;
                match other {
                    IDENT_WRITE_BYTE => TokenKind::Output,
                    IDENT_READ_BYTE => TokenKind::Input,
                    IDENT_JUMP_ZERO => TokenKind::Open,
                    IDENT_JUMP_NOT_ZERO => TokenKind::Close,
                    _ => unreachable!("byte is in IDENTS"),
                }
            }
        };

        Some(Token { kind, offset })
    }
}
