//! Statement parser for archived programs.
//!
//! Physical lines are joined into logical lines while brackets are open;
//! blocks are delimited by indentation.

use crate::error::ParseError;

use super::lexer::{tokenize_at, Tok, Token};
use super::parser::Parser;
use super::{ImportName, Param, Stmt};

struct Line {
    indent: usize,
    start: usize,
    end: usize,
    tokens: Vec<Token>,
}

fn logical_lines(src: &str) -> Result<Vec<Line>, ParseError> {
    let mut lines = Vec::new();
    let mut pending: Option<Line> = None;
    let mut depth = 0i32;
    let mut offset = 0;
    for physical in src.split_inclusive('\n') {
        let start = offset;
        offset += physical.len();
        let tokens = tokenize_at(physical, start)?;
        match pending.as_mut() {
            Some(line) => {
                line.end = offset;
                depth += tokens.iter().map(|t| t.kind.depth()).sum::<i32>();
                line.tokens.extend(tokens);
            }
            None => {
                if tokens.is_empty() {
                    continue;
                }
                let indent = physical.len() - physical.trim_start_matches([' ', '\t']).len();
                depth = tokens.iter().map(|t| t.kind.depth()).sum();
                pending = Some(Line { indent, start, end: offset, tokens });
            }
        }
        if depth < 0 {
            return Err(ParseError::new("unmatched closing bracket", offset));
        }
        if depth == 0 {
            lines.extend(pending.take());
        }
    }
    if let Some(line) = pending {
        return Err(ParseError::new("unexpected end of input inside brackets", line.start));
    }
    Ok(lines)
}

struct ProgramParser<'s> {
    src: &'s str,
    lines: Vec<Line>,
    index: usize,
}

impl<'s> ProgramParser<'s> {
    fn line_parser(&self, index: usize) -> Parser<'s> {
        let line = &self.lines[index];
        Parser::from_tokens(self.src, line.tokens.clone(), line.end)
    }

    fn block(&mut self, indent: usize) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while let Some(line) = self.lines.get(self.index) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(ParseError::new("unexpected indent", line.start));
            }
            stmts.extend(self.statement(indent)?);
        }
        Ok(stmts)
    }

    /// Body after a `:`; either the rest of the line or an indented block.
    fn suite(&mut self, parser: &mut Parser<'s>, indent: usize) -> Result<Vec<Stmt>, ParseError> {
        parser.expect(Tok::Colon, "':'")?;
        if !parser.at_end() {
            let stmts = simple_statements(parser)?;
            self.index += 1;
            return Ok(stmts);
        }
        self.index += 1;
        let inner = self.lines.get(self.index).map(|l| l.indent).filter(|i| *i > indent);
        match inner {
            Some(inner) => self.block(inner),
            None => parser.error("expected an indented block"),
        }
    }

    fn statement(&mut self, indent: usize) -> Result<Vec<Stmt>, ParseError> {
        let mut parser = self.line_parser(self.index);
        match parser.peek_name() {
            Some("def") => {
                parser.eat_keyword("def");
                let name = parser.identifier()?;
                parser.expect(Tok::LParen, "'('")?;
                let mut params = Vec::new();
                while !parser.eat(Tok::RParen) {
                    let pname = parser.identifier()?;
                    let default =
                        if parser.eat(Tok::Assign) { Some(parser.expression()?) } else { None };
                    params.push(Param { name: pname, default });
                    if !parser.eat(Tok::Comma) {
                        parser.expect(Tok::RParen, "')'")?;
                        break;
                    }
                }
                let body = self.suite(&mut parser, indent)?;
                Ok(vec![Stmt::FunctionDef { name, params, body }])
            }
            Some("try") => {
                parser.eat_keyword("try");
                let body = self.suite(&mut parser, indent)?;
                let Some(line) = self.lines.get(self.index).filter(|l| l.indent == indent) else {
                    return parser.error("expected 'except' after 'try' block");
                };
                let start = line.start;
                let mut handler_parser = self.line_parser(self.index);
                if !handler_parser.eat_keyword("except") {
                    return Err(ParseError::new("expected 'except'", start));
                }
                let handler = match handler_parser.peek() {
                    Some(Tok::Colon) => None,
                    _ => Some(handler_parser.dotted_name()?),
                };
                let except = self.suite(&mut handler_parser, indent)?;
                Ok(vec![Stmt::Try { body, handler, except }])
            }
            _ => {
                let stmts = simple_statements(&mut parser)?;
                self.index += 1;
                Ok(stmts)
            }
        }
    }
}

fn import_names(parser: &mut Parser<'_>, dotted: bool) -> Result<Vec<ImportName>, ParseError> {
    let mut names = Vec::new();
    loop {
        let name = if dotted { parser.dotted_name()? } else { parser.identifier()? };
        let alias = if parser.eat_keyword("as") { Some(parser.identifier()?) } else { None };
        names.push(ImportName { name, alias });
        if !parser.eat(Tok::Comma) {
            return Ok(names);
        }
    }
}

fn simple_statement(parser: &mut Parser<'_>) -> Result<Stmt, ParseError> {
    match parser.peek_name() {
        Some("import") => {
            parser.eat_keyword("import");
            Ok(Stmt::Import(import_names(parser, true)?))
        }
        Some("from") => {
            parser.eat_keyword("from");
            let module = parser.dotted_name()?;
            if !parser.eat_keyword("import") {
                return parser.error("expected 'import'");
            }
            let parens = parser.eat(Tok::LParen);
            let names = import_names(parser, false)?;
            if parens {
                parser.expect(Tok::RParen, "')'")?;
            }
            Ok(Stmt::FromImport { module, names })
        }
        Some("del") => {
            parser.eat_keyword("del");
            let mut names = vec![parser.identifier()?];
            while parser.eat(Tok::Comma) {
                names.push(parser.identifier()?);
            }
            Ok(Stmt::Delete(names))
        }
        Some("pass") => {
            parser.eat_keyword("pass");
            Ok(Stmt::Pass)
        }
        Some("return") => {
            parser.eat_keyword("return");
            if parser.at_end() || parser.peek() == Some(Tok::Semi) {
                Ok(Stmt::Return(None))
            } else {
                Ok(Stmt::Return(Some(parser.expression_list()?)))
            }
        }
        _ => {
            let mut targets = Vec::new();
            while parser.assignment_ahead() {
                targets.push(parser.identifier()?);
                parser.eat(Tok::Assign);
            }
            let value = parser.expression_list()?;
            if targets.is_empty() {
                Ok(Stmt::Expr(value))
            } else {
                Ok(Stmt::Assign { targets, value })
            }
        }
    }
}

fn simple_statements(parser: &mut Parser<'_>) -> Result<Vec<Stmt>, ParseError> {
    let mut stmts = vec![simple_statement(parser)?];
    while parser.eat(Tok::Semi) {
        if parser.at_end() {
            break;
        }
        stmts.push(simple_statement(parser)?);
    }
    parser.finish()?;
    Ok(stmts)
}

/// Parse a whole program.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ParseError> {
    let lines = logical_lines(src)?;
    if let Some(first) = lines.first() {
        if first.indent > 0 {
            return Err(ParseError::new("unexpected indent", first.start));
        }
    }
    let mut parser = ProgramParser { src, lines, index: 0 };
    let stmts = parser.block(0)?;
    if let Some(line) = parser.lines.get(parser.index) {
        return Err(ParseError::new(
            "unindent does not match any outer indentation level",
            line.start,
        ));
    }
    Ok(stmts)
}
