mod token;

pub use token::*;

use std::error::Error;
use std::fmt::Display;
use std::iter::Peekable;
use std::str::Chars;

use log::trace;

use crate::atom::Atom;
use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub location: Location,
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

/// The full output of a lexer run. Comments are lexed as tokens but
/// delivered out-of-band so the parser never sees them; the test corpus uses
/// them for expected-error markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Token>,
}

/// Indentation-aware tokenizer. Tracks a stack of indentation depths and
/// emits virtual `Indent`/`Outdent`/`Newline` tokens; newlines and
/// indentation changes inside any bracketed form are treated as plain
/// whitespace.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    filename: Atom,
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    indent_stack: Vec<usize>,
    nested: Vec<TokenKind>,
    tokens: Vec<Token>,
    comments: Vec<Token>,
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    pub fn new(filename: Atom, input: &'a str) -> Self {
        Self {
            filename,
            chars: input.chars().peekable(),
            line: 1,
            col: 1,
            indent_stack: vec![0],
            nested: vec![],
            tokens: vec![],
            comments: vec![],
        }
    }

    fn location(&self) -> Location {
        Location::new(self.filename.clone(), self.line, self.col)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 1;
            }
            Some(_) => self.col += 1,
            None => {}
        }
        c
    }

    fn advance_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            return true;
        }
        false
    }

    fn push_token(&mut self, kind: TokenKind, text: impl Into<String>, location: Location) {
        self.tokens.push(Token::new(kind, text, location));
    }

    fn error<T>(&self, location: Location, message: impl Into<String>) -> LexResult<T> {
        Err(LexError {
            message: message.into(),
            location,
        })
    }

    pub fn lex(self) -> LexResult<Vec<Token>> {
        Ok(self.lex_internal()?.tokens)
    }

    pub fn lex_with_comments(self) -> LexResult<Lexed> {
        self.lex_internal()
    }

    fn lex_internal(mut self) -> LexResult<Lexed> {
        self.begin_line()?;

        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    let location = self.location();
                    self.advance();
                    if self.nested.is_empty() {
                        self.push_token(TokenKind::Newline, "\n", location);
                        self.begin_line()?;
                    }
                }
                '#' => self.lex_comment(),
                '"' => self.lex_string()?,
                '\'' => self.lex_char()?,
                '@' => self.lex_version()?,
                c if is_identifier_start(c) => self.lex_identifier(),
                c if c.is_ascii_digit() => self.lex_number()?,
                _ => self.lex_operator()?,
            }
        }

        if let Some(last) = self.tokens.last() {
            if last.kind != TokenKind::Newline {
                let location = self.location();
                self.push_token(TokenKind::Newline, "\n", location);
            }
        }

        // unwind any remaining indentation so that indents and outdents
        // balance at end-of-file
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            let location = self.location();
            self.push_token(TokenKind::Outdent, "", location);
        }

        trace!(
            "lexed {count} tokens from {file}",
            count = self.tokens.len(),
            file = self.filename
        );

        Ok(Lexed {
            tokens: self.tokens,
            comments: self.comments,
        })
    }

    /// Handle the start of a physical line: skip blank and comment-only
    /// lines (they never affect the indentation stack), then compare the
    /// first contentful line's indentation against the stack.
    fn begin_line(&mut self) -> LexResult<()> {
        loop {
            let line_start = self.location();
            let mut depth = 0usize;
            let mut saw_tab = false;
            let mut saw_space = false;

            while let Some(&c) = self.chars.peek() {
                match c {
                    '\t' => {
                        saw_tab = true;
                        depth += 1;
                        self.advance();
                    }
                    ' ' => {
                        saw_space = true;
                        depth += 1;
                        self.advance();
                    }
                    _ => break,
                }
            }

            match self.chars.peek() {
                None => return Ok(()),
                Some('\n') => {
                    self.advance();
                    continue;
                }
                Some('#') => {
                    self.lex_comment();
                    self.advance_if('\n');
                    continue;
                }
                Some(_) => {
                    if saw_tab && saw_space {
                        return self.error(
                            line_start,
                            "mixed tabs and spaces in leading whitespace",
                        );
                    }

                    if !self.nested.is_empty() {
                        // inside brackets, indentation is not significant
                        return Ok(());
                    }

                    let top = *self.indent_stack.last().unwrap_or(&0);
                    if depth > top {
                        self.indent_stack.push(depth);
                        self.push_token(TokenKind::Indent, "", line_start);
                    } else if depth < top {
                        while let Some(&top) = self.indent_stack.last() {
                            if top <= depth {
                                break;
                            }
                            self.indent_stack.pop();
                            self.push_token(TokenKind::Outdent, "", line_start.clone());
                        }
                        if self.indent_stack.last() != Some(&depth) {
                            return self.error(
                                line_start,
                                format!(
                                    "indentation of {depth} does not match any enclosing block"
                                ),
                            );
                        }
                    }
                    return Ok(());
                }
            }
        }
    }

    fn lex_comment(&mut self) {
        let location = self.location();
        let mut text = String::new();

        self.advance();
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }

        self.comments.push(Token::new(TokenKind::Comment, text, location));
    }

    fn lex_identifier(&mut self) {
        let location = self.location();
        let mut text = String::new();

        while let Some(&c) = self.chars.peek() {
            if !is_identifier_char(c) {
                break;
            }
            text.push(c);
            self.advance();
        }

        let kind = KEYWORDS
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.push_token(kind, text, location);
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let location = self.location();
        let mut text = String::new();
        let mut is_float = false;

        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }

        // a dot starts the fractional part unless it is a '..'
        if self.chars.peek() == Some(&'.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('.');
                self.advance();
                while let Some(&c) = self.chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
            }
        }

        if matches!(self.chars.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            let e = lookahead.next().unwrap();
            let mut exponent = String::from(e);
            if matches!(lookahead.peek(), Some('+') | Some('-')) {
                exponent.push(*lookahead.peek().unwrap());
                lookahead.next();
            }
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..exponent.len() {
                    self.advance();
                }
                text.push_str(&exponent);
                while let Some(&c) = self.chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntegerLiteral
        };
        self.push_token(kind, text, location);
        Ok(())
    }

    fn lex_string(&mut self) -> LexResult<()> {
        let location = self.location();
        let mut text = String::new();

        self.advance();
        loop {
            match self.chars.peek() {
                None => return self.error(location, "unterminated string literal"),
                Some('\n') => return self.error(location, "unterminated string literal"),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    text.push('\\');
                    self.advance();
                    let Some(escaped) = self.advance() else {
                        return self.error(location, "unterminated string literal");
                    };
                    text.push(escaped);
                }
                Some(&c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        self.push_token(TokenKind::StringLiteral, text, location);
        Ok(())
    }

    fn lex_char(&mut self) -> LexResult<()> {
        let location = self.location();
        let mut text = String::new();

        self.advance();
        loop {
            match self.chars.peek() {
                None => return self.error(location, "unterminated char literal"),
                Some('\n') => return self.error(location, "unterminated char literal"),
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    text.push('\\');
                    self.advance();
                    let Some(escaped) = self.advance() else {
                        return self.error(location, "unterminated char literal");
                    };
                    text.push(escaped);
                }
                Some(&c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        self.push_token(TokenKind::CharLiteral, text, location);
        Ok(())
    }

    fn lex_version(&mut self) -> LexResult<()> {
        let location = self.location();
        let mut text = String::new();

        self.advance();
        if !self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            return self.error(location, "expected a version number after '@'");
        }

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        self.push_token(TokenKind::Version, text, location);
        Ok(())
    }

    fn lex_operator(&mut self) -> LexResult<()> {
        use TokenKind::*;

        let location = self.location();
        let c = self.advance().unwrap();

        let (kind, text): (TokenKind, String) = match c {
            '(' => {
                self.nested.push(LParen);
                (LParen, "(".into())
            }
            '[' => {
                self.nested.push(LSquare);
                (LSquare, "[".into())
            }
            '{' => {
                self.nested.push(LCurly);
                (LCurly, "{".into())
            }
            ')' => {
                self.pop_nested(LParen, &location)?;
                (RParen, ")".into())
            }
            ']' => {
                self.pop_nested(LSquare, &location)?;
                (RSquare, "]".into())
            }
            '}' => {
                self.pop_nested(LCurly, &location)?;
                (RCurly, "}".into())
            }
            ',' => (Comma, ",".into()),
            ';' => (Semicolon, ";".into()),
            '=' => {
                if self.advance_if('=') {
                    (Equal, "==".into())
                } else {
                    (Assign, "=".into())
                }
            }
            '!' => {
                if self.advance_if('=') {
                    (Inequal, "!=".into())
                } else {
                    (Bang, "!".into())
                }
            }
            '<' => {
                if self.advance_if('=') {
                    (Lte, "<=".into())
                } else {
                    (Lt, "<".into())
                }
            }
            '>' => {
                if self.advance_if('=') {
                    (Gte, ">=".into())
                } else {
                    (Gt, ">".into())
                }
            }
            '+' => {
                if self.advance_if('=') {
                    (PlusEq, "+=".into())
                } else {
                    (Plus, "+".into())
                }
            }
            '-' => {
                if self.advance_if('=') {
                    (MinusEq, "-=".into())
                } else {
                    (Minus, "-".into())
                }
            }
            '*' => {
                if self.advance_if('=') {
                    (TimesEq, "*=".into())
                } else {
                    (Times, "*".into())
                }
            }
            '/' => {
                if self.advance_if('=') {
                    (DivideByEq, "/=".into())
                } else {
                    (DivideBy, "/".into())
                }
            }
            '%' => {
                if self.advance_if('=') {
                    (ModEq, "%=".into())
                } else {
                    (Mod, "%".into())
                }
            }
            '?' => {
                if self.advance_if('=') {
                    (MaybeEq, "?=".into())
                } else {
                    (Maybe, "?".into())
                }
            }
            '.' => {
                if self.advance_if('.') {
                    (DoubleDot, "..".into())
                } else {
                    (Dot, ".".into())
                }
            }
            ':' => {
                if self.advance_if('=') {
                    (Becomes, ":=".into())
                } else if self.chars.peek().copied().is_some_and(is_identifier_start) {
                    let mut text = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !is_identifier_char(c) {
                            break;
                        }
                        text.push(c);
                        self.advance();
                    }
                    (AtomLiteral, text)
                } else {
                    (Colon, ":".into())
                }
            }
            c => {
                return self.error(location, format!("illegal character '{c}'"));
            }
        };

        self.push_token(kind, text, location);
        Ok(())
    }

    fn pop_nested(&mut self, expected: TokenKind, location: &Location) -> LexResult<()> {
        match self.nested.pop() {
            Some(open) if open == expected => Ok(()),
            Some(open) => self.error(
                location.clone(),
                format!("mismatched closing bracket; expected one closing {open}"),
            ),
            None => self.error(location.clone(), "unbalanced closing bracket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(Atom::from("test.zion"), input)
            .lex()
            .unwrap()
            .iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_lex_identifier_and_keyword() {
        use TokenKind::*;

        assert_eq!(
            vec![Def, Identifier, LParen, RParen, Newline],
            lex_kinds("def main()")
        );
    }

    #[test]
    fn test_lex_indent_outdent() {
        use TokenKind::*;

        assert_eq!(
            vec![
                Def, Identifier, LParen, RParen, Newline, Indent, Pass, Newline, Outdent,
            ],
            lex_kinds("def main()\n\tpass\n")
        );
    }

    #[test]
    fn test_indents_and_outdents_balance_at_eof() {
        let tokens = Lexer::new(
            Atom::from("test.zion"),
            "def main()\n\tif x\n\t\tpass\n\telse\n\t\tpass",
        )
        .lex()
        .unwrap();

        let indents = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Indent)
            .count();
        let outdents = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Outdent)
            .count();
        assert_eq!(indents, outdents);
    }

    #[test]
    fn test_blank_and_comment_lines_do_not_outdent() {
        use TokenKind::*;

        assert_eq!(
            vec![
                While, True, Newline, Indent, Pass, Newline, Pass, Newline, Outdent,
            ],
            lex_kinds("while true\n\tpass\n\n# a comment\n\tpass\n")
        );
    }

    #[test]
    fn test_newline_inside_brackets_is_whitespace() {
        use TokenKind::*;

        assert_eq!(
            vec![
                Identifier, LParen, IntegerLiteral, Comma, IntegerLiteral, RParen, Newline,
            ],
            lex_kinds("f(1,\n\t\t2)\n")
        );
    }

    #[test]
    fn test_inconsistent_indentation_fails() {
        let result = Lexer::new(Atom::from("test.zion"), "if x\n\t\t\tpass\n\t\tpass\n").lex();

        assert!(result.is_err());
        let error = result.unwrap_err();
        assert_eq!(3, error.location.line);
    }

    #[test]
    fn test_unterminated_string_fails() {
        let result = Lexer::new(Atom::from("test.zion"), "x = \"oops\n").lex();

        assert!(result.is_err());
    }

    #[test]
    fn test_lex_literals() {
        use TokenKind::*;

        assert_eq!(
            vec![
                IntegerLiteral,
                FloatLiteral,
                StringLiteral,
                CharLiteral,
                AtomLiteral,
                Nil,
                Newline,
            ],
            lex_kinds("42 3.1415e2 \"hey\" 'x' :north nil")
        );
    }

    #[test]
    fn test_lex_version_token() {
        let tokens = Lexer::new(Atom::from("test.zion"), "module fib @1.2.3\n")
            .lex()
            .unwrap();

        assert_eq!(TokenKind::Version, tokens[2].kind);
        assert_eq!("1.2.3", tokens[2].text);
    }

    #[test]
    fn test_double_dot_is_not_a_float() {
        use TokenKind::*;

        assert_eq!(
            vec![IntegerLiteral, DoubleDot, IntegerLiteral, Newline],
            lex_kinds("1..10")
        );
    }

    #[test]
    fn test_comments_are_out_of_band() {
        let lexed = Lexer::new(Atom::from("test.zion"), "pass # remark\n")
            .lex_with_comments()
            .unwrap();

        assert_eq!(
            vec![TokenKind::Pass, TokenKind::Newline],
            lexed.tokens.iter().map(|t| t.kind).collect::<Vec<_>>()
        );
        assert_eq!(1, lexed.comments.len());
        assert_eq!(" remark", lexed.comments[0].text);
    }

    #[test]
    fn test_becomes_operator() {
        use TokenKind::*;

        assert_eq!(
            vec![Identifier, Becomes, IntegerLiteral, Newline],
            lex_kinds("x := 1")
        );
    }
}
