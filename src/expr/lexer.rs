//! Tokenizer for representation expressions and archived programs.

use std::ops::Range;

use logos::Logos;

use crate::error::ParseError;

/// Token kinds. Keywords lex as [`Tok::Name`] and are told apart by the
/// parser.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Tok {
    /// Identifier or keyword.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,
    /// Decimal integer literal.
    #[regex(r"[0-9][0-9_]*")]
    Int,
    /// Float literal.
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+")]
    Float,
    /// Imaginary literal, `2j` or `1.5e3j`.
    #[regex(r"([0-9][0-9_]*(\.[0-9_]*)?|\.[0-9][0-9_]*)([eE][+-]?[0-9]+)?[jJ]")]
    Imag,
    /// String literal in single or double quotes.
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Str,
    /// Byte string literal.
    #[regex(r#"[bB]'([^'\\\n]|\\.)*'"#)]
    #[regex(r#"[bB]"([^"\\\n]|\\.)*""#)]
    Bytes,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `,`
    #[token(",")]
    Comma,
    /// `:`
    #[token(":")]
    Colon,
    /// `;`
    #[token(";")]
    Semi,
    /// `.`
    #[token(".")]
    Dot,
    /// `=`
    #[token("=")]
    Assign,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
}

impl Tok {
    /// Net bracket depth change.
    pub fn depth(self) -> i32 {
        match self {
            Self::LParen | Self::LBracket | Self::LBrace => 1,
            Self::RParen | Self::RBracket | Self::RBrace => -1,
            _ => 0,
        }
    }
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind.
    pub kind: Tok,
    /// Byte range in the source text.
    pub span: Range<usize>,
}

/// Tokenize `src`, shifting spans by `base`.
pub fn tokenize_at(src: &str, base: usize) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Tok::lexer(src);
    let mut tokens = Vec::new();
    while let Some(kind) = lexer.next() {
        let span = lexer.span();
        match kind {
            Ok(kind) => tokens.push(Token { kind, span: span.start + base..span.end + base }),
            Err(()) => {
                return Err(ParseError::new(
                    format!("unexpected character {:?}", &src[span.clone()]),
                    span.start + base,
                ))
            }
        }
    }
    Ok(tokens)
}

/// Tokenize a complete source text.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    tokenize_at(src, 0)
}
