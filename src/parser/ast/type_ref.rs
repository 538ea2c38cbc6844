use crate::lexer::{Token, TokenKind};
use crate::parser::{ParseResult, ParseState};

/// A type expression as written in the source. Elaboration into a type value
/// happens in the checker, where the typename environment is known.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRefExpr {
    /// A (possibly module-qualified) type name with optional curly-brace
    /// arguments: `int`, `vector.vector{int}`, `map{str, any V}`.
    Named {
        token: Token,
        name: String,
        args: Vec<TypeRefExpr>,
    },
    /// `any` or `any T`.
    Generic { token: Token, name: Option<String> },
    /// `[T]` list sugar.
    List {
        token: Token,
        element: Box<TypeRefExpr>,
    },
    /// `{T1, T2, ...}` tuple.
    Tuple { token: Token, dims: Vec<TypeRefExpr> },
    /// `T?`.
    Maybe {
        token: Token,
        just: Box<TypeRefExpr>,
    },
}

impl TypeRefExpr {
    pub fn token(&self) -> &Token {
        match self {
            TypeRefExpr::Named { token, .. } => token,
            TypeRefExpr::Generic { token, .. } => token,
            TypeRefExpr::List { token, .. } => token,
            TypeRefExpr::Tuple { token, .. } => token,
            TypeRefExpr::Maybe { token, .. } => token,
        }
    }

    pub fn parse(ps: &mut ParseState) -> ParseResult<TypeRefExpr> {
        let type_ref = match ps.token.kind {
            TokenKind::LSquare => Self::parse_list(ps)?,
            TokenKind::LCurly => Self::parse_tuple(ps)?,
            TokenKind::Any => Self::parse_generic(ps)?,
            TokenKind::Identifier => Self::parse_named(ps)?,
            _ => {
                return Err(ps.error(format!(
                    "expected a type reference, got {}",
                    ps.token
                )))
            }
        };

        if let Some(maybe_token) = ps.accept(TokenKind::Maybe) {
            return Ok(TypeRefExpr::Maybe {
                token: maybe_token,
                just: Box::new(type_ref),
            });
        }

        Ok(type_ref)
    }

    fn parse_named(ps: &mut ParseState) -> ParseResult<TypeRefExpr> {
        let token = ps.chomp(TokenKind::Identifier)?;
        let mut name = token.text.clone();

        // module-qualified type names join with dots
        while ps.token.kind == TokenKind::Dot && !ps.line_broke() {
            ps.advance();
            let part = ps.chomp(TokenKind::Identifier)?;
            name.push('.');
            name.push_str(&part.text);
        }

        if let Some(replacement) = ps.type_macros.get(&name) {
            name = replacement.clone();
        }

        let mut args = vec![];
        if ps.token.kind == TokenKind::LCurly {
            ps.advance();
            while ps.token.kind != TokenKind::RCurly {
                args.push(TypeRefExpr::parse(ps)?);
                if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RCurly {
                    return Err(ps.error(format!(
                        "expected '}}' or ',' in type arguments, got {}",
                        ps.token
                    )));
                }
            }
            ps.chomp(TokenKind::RCurly)?;
        }

        Ok(TypeRefExpr::Named {
            token,
            name,
            args,
        })
    }

    fn parse_generic(ps: &mut ParseState) -> ParseResult<TypeRefExpr> {
        let token = ps.chomp(TokenKind::Any)?;
        let name = if ps.token.kind == TokenKind::Identifier && !ps.line_broke() {
            let name_token = ps.token.clone();
            ps.advance();
            Some(name_token.text)
        } else {
            None
        };

        Ok(TypeRefExpr::Generic { token, name })
    }

    fn parse_list(ps: &mut ParseState) -> ParseResult<TypeRefExpr> {
        let token = ps.chomp(TokenKind::LSquare)?;
        let element = TypeRefExpr::parse(ps)?;
        ps.chomp(TokenKind::RSquare)?;

        Ok(TypeRefExpr::List {
            token,
            element: Box::new(element),
        })
    }

    fn parse_tuple(ps: &mut ParseState) -> ParseResult<TypeRefExpr> {
        let token = ps.chomp(TokenKind::LCurly)?;
        let mut dims = vec![];

        while ps.token.kind != TokenKind::RCurly {
            dims.push(TypeRefExpr::parse(ps)?);
            if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RCurly {
                return Err(ps.error(format!(
                    "expected '}}' or ',' in tuple type, got {}",
                    ps.token
                )));
            }
        }
        ps.chomp(TokenKind::RCurly)?;

        Ok(TypeRefExpr::Tuple { token, dims })
    }
}
