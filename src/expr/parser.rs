//! Recursive-descent expression parser.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | postfix
//! postfix := atom ('(' args ')' | '.' NAME | '[' expr ']')*
//! atom    := NAME | literal | '(' [expr (',' expr)* [',']] ')'
//!          | '[' ... ']' | '{' [expr ':' expr (',' ...)*] '}'
//! ```

use crate::error::ParseError;
use crate::names::is_keyword;

use super::lexer::{tokenize, Tok, Token};
use super::{BinOp, Expr, NameRef, UnaryOp};

/// Token cursor over one expression or logical line.
pub(crate) struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl<'s> Parser<'s> {
    /// Cursor over pre-lexed tokens whose spans index into `src`.
    pub(crate) fn from_tokens(src: &'s str, tokens: Vec<Token>, end: usize) -> Self {
        Self { src, tokens, pos: 0, end }
    }

    pub(crate) fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn peek_at(&self, n: usize) -> Option<Tok> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    /// Text of the next token if it is a name.
    pub(crate) fn peek_name(&self) -> Option<&'s str> {
        match self.tokens.get(self.pos) {
            Some(t) if t.kind == Tok::Name => Some(&self.src[t.span.clone()]),
            _ => None,
        }
    }

    /// Whether the next tokens are `NAME =`.
    pub(crate) fn assignment_ahead(&self) -> bool {
        self.peek() == Some(Tok::Name) && self.peek_at(1) == Some(Tok::Assign)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset of the next token, for error messages.
    pub(crate) fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |t| t.span.start)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: Tok) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError::new(message, self.offset()))
    }

    pub(crate) fn expect(&mut self, kind: Tok, what: &str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(k) if k == kind => {
                self.bump().ok_or_else(|| ParseError::new("unexpected end", self.end))
            }
            _ => self.error(format!("expected {what}")),
        }
    }

    /// Consume a keyword.
    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_name() == Some(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a plain identifier.
    pub(crate) fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek_name() {
            Some(name) if !is_keyword(name) => {
                self.pos += 1;
                Ok(name.to_string())
            }
            _ => self.error("expected identifier"),
        }
    }

    /// Consume `a.b.c`.
    pub(crate) fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.identifier()?;
        while self.eat(Tok::Dot) {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    /// Fail unless every token has been consumed.
    pub(crate) fn finish(&self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            self.error("unexpected trailing input")
        }
    }

    /// Parse one expression.
    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    /// Parse `a, b, c` as a tuple when more than one expression is present.
    pub(crate) fn expression_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.expression()?;
        if self.peek() != Some(Tok::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(Tok::Comma) {
            if self.at_end() || self.peek() == Some(Tok::Semi) {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Tok::Minus) => UnaryOp::Neg,
            Some(Tok::Plus) => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    self.pos += 1;
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call { func: Box::new(expr), args, kwargs };
                }
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let attr = match self.peek_name() {
                        Some(name) => name.to_string(),
                        None => return self.error("expected attribute name"),
                    };
                    self.pos += 1;
                    expr = Expr::Attribute { value: Box::new(expr), attr };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.expression_list()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat(Tok::RParen) {
            if self.peek() == Some(Tok::Name) && self.peek_at(1) == Some(Tok::Assign) {
                let name = self.identifier()?;
                self.pos += 1;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return self.error(format!("keyword argument repeated: {name}"));
                }
                kwargs.push((name, self.expression()?));
            } else if kwargs.is_empty() {
                args.push(self.expression()?);
            } else {
                return self.error("positional argument follows keyword argument");
            }
            if !self.eat(Tok::Comma) {
                self.expect(Tok::RParen, "',' or ')'")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.bump() else {
            return Err(ParseError::new("unexpected end of input", self.end));
        };
        let text = &self.src[token.span.clone()];
        match token.kind {
            Tok::Name => match text {
                "None" => Ok(Expr::None),
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                kw if is_keyword(kw) => {
                    Err(ParseError::new(format!("unsupported syntax: {kw}"), token.span.start))
                }
                _ => Ok(Expr::Name(NameRef { id: text.to_string(), span: token.span })),
            },
            Tok::Int => text
                .replace('_', "")
                .parse()
                .map(Expr::Int)
                .map_err(|_| {
                    let message = format!("integer literal out of range: {text}");
                    ParseError::new(message, token.span.start)
                }),
            Tok::Float => parse_float(text, token.span.start).map(Expr::Float),
            Tok::Imag => parse_float(&text[..text.len() - 1], token.span.start).map(Expr::Imag),
            Tok::Str | Tok::Bytes => self.string_literals(token),
            Tok::LParen => self.parenthesized(),
            Tok::LBracket => {
                let items = self.sequence(Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::LBrace => self.dict(),
            _ => Err(ParseError::new(format!("unexpected {text:?}"), token.span.start)),
        }
    }

    fn string_literals(&mut self, first: Token) -> Result<Expr, ParseError> {
        let is_bytes = first.kind == Tok::Bytes;
        let mut text = String::new();
        let mut bytes = Vec::new();
        let mut token = first;
        loop {
            let raw = &self.src[token.span.clone()];
            if is_bytes {
                bytes.extend(unescape_bytes(&raw[2..raw.len() - 1], token.span.start)?);
            } else {
                text.push_str(&unescape_str(&raw[1..raw.len() - 1], token.span.start)?);
            }
            match self.peek() {
                Some(kind @ (Tok::Str | Tok::Bytes)) => {
                    if (kind == Tok::Bytes) != is_bytes {
                        return self.error("cannot mix bytes and nonbytes literals");
                    }
                    match self.bump() {
                        Some(next) => token = next,
                        None => break,
                    }
                }
                _ => break,
            }
        }
        Ok(if is_bytes { Expr::Bytes(bytes) } else { Expr::Str(text) })
    }

    fn parenthesized(&mut self) -> Result<Expr, ParseError> {
        if self.eat(Tok::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(Tok::RParen) {
            return Ok(first);
        }
        self.expect(Tok::Comma, "',' or ')'")?;
        let mut items = vec![first];
        items.extend(self.sequence(Tok::RParen, "')'")?);
        Ok(Expr::Tuple(items))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: Tok, what: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(Tok::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        Ok(items)
    }

    fn dict(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !self.eat(Tok::RBrace) {
            let key = self.expression()?;
            self.expect(Tok::Colon, "':'")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat(Tok::Comma) {
                self.expect(Tok::RBrace, "'}'")?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }
}

fn parse_float(text: &str, offset: usize) -> Result<f64, ParseError> {
    text.replace('_', "")
        .parse()
        .map_err(|_| ParseError::new(format!("invalid float literal: {text}"), offset))
}

fn hex_escape<I: Iterator<Item = char>>(
    chars: &mut I,
    digits: usize,
    offset: usize,
) -> Result<u32, ParseError> {
    let hex: String = chars.take(digits).collect();
    if hex.len() != digits {
        return Err(ParseError::new("truncated \\x escape", offset));
    }
    u32::from_str_radix(&hex, 16)
        .map_err(|_| ParseError::new(format!("invalid escape \\x{hex}"), offset))
}

fn simple_escape(c: char) -> Option<char> {
    Some(match c {
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'v' => '\x0b',
        _ => return None,
    })
}

/// Decode the body of a string literal.
pub(crate) fn unescape_str(body: &str, offset: usize) -> Result<String, ParseError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            return Err(ParseError::new("trailing backslash in string", offset));
        };
        if let Some(decoded) = simple_escape(e) {
            out.push(decoded);
            continue;
        }
        let code = match e {
            'x' => hex_escape(&mut chars, 2, offset)?,
            'u' => hex_escape(&mut chars, 4, offset)?,
            'U' => hex_escape(&mut chars, 8, offset)?,
            other => {
                out.push('\\');
                out.push(other);
                continue;
            }
        };
        let decoded =
            char::from_u32(code).ok_or_else(|| ParseError::new("invalid code point", offset))?;
        out.push(decoded);
    }
    Ok(out)
}

/// Decode the body of a byte string literal.
pub(crate) fn unescape_bytes(body: &str, offset: usize) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if !c.is_ascii() {
            return Err(ParseError::new("bytes can only contain ASCII literal characters", offset));
        }
        if c != '\\' {
            out.push(c as u8);
            continue;
        }
        let Some(e) = chars.next() else {
            return Err(ParseError::new("trailing backslash in bytes", offset));
        };
        if e == 'x' {
            out.push(hex_escape(&mut chars, 2, offset)? as u8);
        } else if let Some(decoded) = simple_escape(e) {
            out.push(decoded as u8);
        } else {
            out.push(b'\\');
            out.push(e as u8);
        }
    }
    Ok(out)
}

/// Parse a complete expression.
pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::from_tokens(src, tokens, src.len());
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}
