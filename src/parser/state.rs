use std::collections::HashMap;

use crate::lexer::{Token, TokenKind};
use crate::location::Location;

use super::{ParseError, ParseResult};

/// Cursor over the lexer's token stream. Virtual newline tokens are consumed
/// by `advance` and folded into a "line broke" flag the grammar consults for
/// statement separation; the parser itself never sees them.
#[derive(Debug, Clone)]
pub struct ParseState {
    tokens: Vec<Token>,
    index: usize,
    pub token: Token,
    pub prior_token: Token,
    newline: bool,

    /// Token-level substitutions applied to type names while parsing type
    /// references, e.g. `vector` -> `vector.vector`.
    pub type_macros: HashMap<String, String>,
}

impl ParseState {
    pub fn new(tokens: Vec<Token>) -> Self {
        let location = tokens
            .first()
            .map(|token| token.location.clone())
            .unwrap_or_else(Location::builtin);

        let mut state = Self {
            tokens,
            index: 0,
            token: Token::none(location.clone()),
            prior_token: Token::none(location),
            newline: false,
            type_macros: HashMap::new(),
        };
        state.advance();
        state.newline = false;
        state
    }

    pub fn with_type_macros(tokens: Vec<Token>, type_macros: HashMap<String, String>) -> Self {
        let mut state = Self::new(tokens);
        state.type_macros = type_macros;
        state
    }

    /// Move to the next token, skipping newlines but remembering that one was
    /// crossed.
    pub fn advance(&mut self) {
        self.prior_token = std::mem::replace(
            &mut self.token,
            Token::none(self.prior_token.location.clone()),
        );
        self.newline = false;

        while let Some(token) = self.tokens.get(self.index) {
            self.index += 1;
            if token.kind == TokenKind::Newline {
                self.newline = true;
                continue;
            }
            self.token = token.clone();
            return;
        }

        let location = self
            .tokens
            .last()
            .map(|token| token.location.clone())
            .unwrap_or_else(Location::builtin);
        self.token = Token::none(location);
    }

    /// Did a newline (or an explicit semicolon) separate the prior token from
    /// the current one?
    pub fn line_broke(&self) -> bool {
        self.newline || self.prior_token.kind == TokenKind::Semicolon
    }

    pub fn eof(&self) -> bool {
        self.token.kind == TokenKind::None
    }

    /// Peek at the kind of the token after the current one, skipping
    /// newlines. Used for the two-token lookahead that disambiguates
    /// `x := ...` from an expression statement.
    pub fn next_kind(&self) -> TokenKind {
        let mut index = self.index;
        while let Some(token) = self.tokens.get(index) {
            index += 1;
            if token.kind != TokenKind::Newline {
                return token.kind;
            }
        }
        TokenKind::None
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.token.location.clone(),
        }
    }

    pub fn error_at(&self, location: Location, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location,
        }
    }

    /// Fail unless the current token has the expected kind; on success return
    /// it and advance past it.
    pub fn chomp(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.token.kind != kind {
            return Err(self.error(format!("expected {kind}, got {}", self.token)));
        }
        let token = self.token.clone();
        self.advance();
        Ok(token)
    }

    /// Advance past the current token if it has the given kind.
    pub fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.token.kind == kind {
            let token = self.token.clone();
            self.advance();
            return Some(token);
        }
        None
    }
}
