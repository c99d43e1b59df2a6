//! Parser for the textual program format
//!
//! Parses programs like:
//!
//! ```text
//! program pipelined_mul;
//! input a : 32;
//! input b : 32;
//! input f : 32;
//! output c : 32;
//! m = mul_pipelined(a, b) latency 1;
//! s = add(m, f);
//! write(c, s);
//! ```
//!
//! Names must be defined before they are used, which keeps the resulting
//! program in dependency order.

use std::collections::HashMap;
use std::ops::Range;

use crate::catalog::FunctionalUnitCatalog;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};
use crate::program::{Opcode, Program, Value};

/// Parser for program sources
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Result<Token, ()>>,
    span: Range<usize>,
    /// Supplies default latencies when a statement doesn't give one
    catalog: Option<FunctionalUnitCatalog>,
    names: HashMap<String, Value>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next();
        let span = lexer.span();
        Self {
            lexer,
            current,
            span,
            catalog: None,
            names: HashMap::new(),
        }
    }

    /// Take default instruction latencies from a catalog
    pub fn with_catalog(mut self, catalog: &FunctionalUnitCatalog) -> Self {
        self.catalog = Some(catalog.clone());
        self
    }

    fn lexer_error(&self) -> CompileError {
        CompileError::LexerError {
            position: self.span.start,
            message: format!("unexpected character `{}`", self.lexer.slice()),
        }
    }

    /// The current token, or a lexer error if it couldn't be lexed
    fn peek(&self) -> CompileResult<Option<&Token>> {
        match &self.current {
            Some(Ok(tok)) => Ok(Some(tok)),
            Some(Err(())) => Err(self.lexer_error()),
            None => Ok(None),
        }
    }

    /// Advance to the next token
    fn advance(&mut self) -> CompileResult<Option<Token>> {
        if let Some(Err(())) = self.current {
            return Err(self.lexer_error());
        }
        let prev = self.current.take();
        self.current = self.lexer.next();
        self.span = self.lexer.span();
        Ok(prev.and_then(Result::ok))
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        match &self.current {
            Some(Ok(tok)) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            _ => false,
        }
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<Token> {
        if self.check(&expected) {
            self.advance()?
                .ok_or_else(|| CompileError::parse_error("Unexpected end of input"))
        } else {
            Err(CompileError::parse_error(format!(
                "Expected `{}`, got {}",
                expected,
                self.describe_current()?
            )))
        }
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match self.expect(Token::Ident(String::new()))? {
            Token::Ident(name) => Ok(name),
            _ => unreachable!("expect() checked the token kind"),
        }
    }

    fn expect_number(&mut self) -> CompileResult<u32> {
        match self.expect(Token::Number(0))? {
            Token::Number(n) => Ok(n),
            _ => unreachable!("expect() checked the token kind"),
        }
    }

    fn describe_current(&self) -> CompileResult<String> {
        Ok(match self.peek()? {
            Some(tok) => format!("`{}`", tok),
            None => "end of input".to_string(),
        })
    }

    /// Parse a complete program
    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let name = if self.check(&Token::Program) {
            self.advance()?;
            let name = self.expect_ident()?;
            self.expect(Token::Semicolon)?;
            name
        } else {
            "main".to_string()
        };

        let mut program = Program::new(name);
        while self.peek()?.is_some() {
            self.parse_statement(&mut program)?;
        }

        Ok(program)
    }

    /// Parse a single statement
    fn parse_statement(&mut self, program: &mut Program) -> CompileResult<()> {
        match self.peek()? {
            Some(Token::Input) | Some(Token::Output) => self.parse_port(program),
            Some(Token::Ident(_)) => {
                let name = self.expect_ident()?;
                if self.check(&Token::Equals) {
                    self.advance()?;
                    let opcode = self.expect_ident()?;
                    let value = self.parse_call(program, &opcode)?;
                    self.define(name, value)
                } else {
                    self.parse_call(program, &name)?;
                    Ok(())
                }
            }
            Some(Token::Program) => Err(CompileError::parse_error(
                "`program` header must come first",
            )),
            _ => Err(CompileError::parse_error(format!(
                "Expected a statement, got {}",
                self.describe_current()?
            ))),
        }
    }

    /// `input NAME : WIDTH ;` or `output NAME : WIDTH ;`
    fn parse_port(&mut self, program: &mut Program) -> CompileResult<()> {
        let is_input = self.check(&Token::Input);
        self.advance()?;

        let name = self.expect_ident()?;
        self.expect(Token::Colon)?;
        let width = self.expect_number()?;
        self.expect(Token::Semicolon)?;

        let value = if is_input {
            program.add_input(&name, width)?
        } else {
            program.add_output(&name, width)?
        };
        self.define(name, value)
    }

    /// `OPCODE ( NAME, ... ) [latency N] ;`
    fn parse_call(&mut self, program: &mut Program, opcode: &str) -> CompileResult<Value> {
        let op = Opcode::from_name(opcode)
            .ok_or_else(|| CompileError::parse_error(format!("Unknown operation `{}`", opcode)))?;

        self.expect(Token::LParen)?;
        let mut operands = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let name = self.expect_ident()?;
                let value = self
                    .names
                    .get(&name)
                    .copied()
                    .ok_or_else(|| CompileError::undefined(name))?;
                operands.push(value);

                if self.check(&Token::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        let latency = if self.check(&Token::Latency) {
            self.advance()?;
            Some(self.expect_number()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;

        let value = program.add_instr(op, &operands)?;
        let latency = latency.unwrap_or_else(|| self.default_latency(op));
        if latency > 0 {
            program.set_latency(value, latency)?;
        }
        Ok(value)
    }

    fn default_latency(&self, opcode: Opcode) -> u32 {
        self.catalog
            .as_ref()
            .and_then(|catalog| catalog.lookup(opcode))
            .map_or(0, |unit| unit.latency)
    }

    fn define(&mut self, name: String, value: Value) -> CompileResult<()> {
        if self.names.contains_key(&name) {
            return Err(CompileError::parse_error(format!(
                "`{}` is already defined",
                name
            )));
        }
        self.names.insert(name, value);
        Ok(())
    }
}
