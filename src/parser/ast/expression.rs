use crate::lexer::{Token, TokenKind};
use crate::location::Location;
use crate::parser::{ParseResult, ParseState};

use super::statement::FunctionDefn;
use super::type_ref::TypeRefExpr;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer, float, string, char, atom, `nil`, `true` or `false`.
    Literal { token: Token },
    /// An identifier use.
    Reference { token: Token },
    Prefix(Box<PrefixExpr>),
    Binary(Box<BinaryExpr>),
    Ternary(Box<TernaryExpr>),
    Dot(Box<DotExpr>),
    Index(Box<IndexExpr>),
    Callsite(Box<CallsiteExpr>),
    Tuple(TupleExpr),
    ArrayLiteral(ArrayLiteralExpr),
    Cast(Box<CastExpr>),
    Sizeof(SizeofExpr),
    Typeid(Box<TypeidExpr>),
    /// A function literal; also how nested functions appear in blocks.
    FunctionDefn(Box<FunctionDefn>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    Inequal,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Times,
    DivideBy,
    Mod,
}

impl BinaryOp {
    /// The runtime overload a binary operation resolves to.
    pub fn function_name(&self) -> &'static str {
        match self {
            BinaryOp::Or => "__or__",
            BinaryOp::And => "__and__",
            BinaryOp::Equal => "__eq__",
            BinaryOp::Inequal => "__ineq__",
            BinaryOp::In => "__in__",
            BinaryOp::NotIn => "__not_in__",
            BinaryOp::Lt => "__lt__",
            BinaryOp::Lte => "__lte__",
            BinaryOp::Gt => "__gt__",
            BinaryOp::Gte => "__gte__",
            BinaryOp::Plus => "__plus__",
            BinaryOp::Minus => "__minus__",
            BinaryOp::Times => "__times__",
            BinaryOp::DivideBy => "__divide__",
            BinaryOp::Mod => "__mod__",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefixExpr {
    pub token: Token,
    pub op: PrefixOp,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub token: Token,
    pub op: BinaryOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TernaryExpr {
    pub token: Token,
    pub condition: Expr,
    pub then_expr: Expr,
    pub else_expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotExpr {
    pub token: Token,
    pub lhs: Expr,
    pub rhs: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub token: Token,
    pub lhs: Expr,
    pub index: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallsiteExpr {
    pub token: Token,
    pub function_expr: Expr,
    pub params: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleExpr {
    pub token: Token,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteralExpr {
    pub token: Token,
    pub items: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastExpr {
    pub token: Token,
    pub expr: Expr,
    pub type_ref: TypeRefExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeofExpr {
    pub token: Token,
    pub type_ref: TypeRefExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeidExpr {
    pub token: Token,
    pub expr: Expr,
}

impl Expr {
    pub fn token(&self) -> &Token {
        match self {
            Expr::Literal { token } => token,
            Expr::Reference { token } => token,
            Expr::Prefix(prefix) => &prefix.token,
            Expr::Binary(binary) => &binary.token,
            Expr::Ternary(ternary) => &ternary.token,
            Expr::Dot(dot) => &dot.token,
            Expr::Index(index) => &index.token,
            Expr::Callsite(callsite) => &callsite.token,
            Expr::Tuple(tuple) => &tuple.token,
            Expr::ArrayLiteral(array) => &array.token,
            Expr::Cast(cast) => &cast.token,
            Expr::Sizeof(sizeof) => &sizeof.token,
            Expr::Typeid(typeid) => &typeid.token,
            Expr::FunctionDefn(defn) => &defn.decl.token,
        }
    }

    pub fn location(&self) -> Location {
        self.token().location.clone()
    }

    pub fn parse(ps: &mut ParseState) -> ParseResult<Expr> {
        let condition = Self::parse_or(ps)?;

        if ps.line_broke() || ps.token.kind != TokenKind::Maybe {
            return Ok(condition);
        }

        let token = ps.chomp(TokenKind::Maybe)?;
        let then_expr = Expr::parse(ps)?;
        ps.chomp(TokenKind::Colon)?;
        let else_expr = Expr::parse(ps)?;

        Ok(Expr::Ternary(Box::new(TernaryExpr {
            token,
            condition,
            then_expr,
            else_expr,
        })))
    }

    fn parse_or(ps: &mut ParseState) -> ParseResult<Expr> {
        let mut expr = Self::parse_and(ps)?;

        while !ps.line_broke() && ps.token.kind == TokenKind::Or {
            let token = ps.token.clone();
            ps.advance();
            let rhs = Self::parse_and(ps)?;
            expr = Expr::Binary(Box::new(BinaryExpr {
                token,
                op: BinaryOp::Or,
                lhs: expr,
                rhs,
            }));
        }

        Ok(expr)
    }

    fn parse_and(ps: &mut ParseState) -> ParseResult<Expr> {
        let mut expr = Self::parse_eq(ps)?;

        while !ps.line_broke() && ps.token.kind == TokenKind::And {
            let token = ps.token.clone();
            ps.advance();
            let rhs = Self::parse_eq(ps)?;
            expr = Expr::Binary(Box::new(BinaryExpr {
                token,
                op: BinaryOp::And,
                lhs: expr,
                rhs,
            }));
        }

        Ok(expr)
    }

    fn parse_eq(ps: &mut ParseState) -> ParseResult<Expr> {
        let lhs = Self::parse_ineq(ps)?;

        let mut not_in = false;
        if !ps.line_broke()
            && ps.token.kind == TokenKind::Not
            && ps.next_kind() == TokenKind::In
        {
            ps.advance();
            not_in = true;
        }

        let op = match ps.token.kind {
            _ if ps.line_broke() && !not_in => return Ok(lhs),
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::Inequal => BinaryOp::Inequal,
            TokenKind::In if not_in => BinaryOp::NotIn,
            TokenKind::In => BinaryOp::In,
            _ if not_in => {
                return Err(ps.error(format!("expected 'in' after 'not', got {}", ps.token)))
            }
            _ => return Ok(lhs),
        };

        let token = ps.token.clone();
        ps.advance();
        let rhs = Self::parse_ineq(ps)?;

        Ok(Expr::Binary(Box::new(BinaryExpr {
            token,
            op,
            lhs,
            rhs,
        })))
    }

    fn parse_ineq(ps: &mut ParseState) -> ParseResult<Expr> {
        let lhs = Self::parse_plus(ps)?;

        let op = match ps.token.kind {
            _ if ps.line_broke() => return Ok(lhs),
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Lte => BinaryOp::Lte,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Gte => BinaryOp::Gte,
            _ => return Ok(lhs),
        };

        let token = ps.token.clone();
        ps.advance();
        let rhs = Self::parse_plus(ps)?;

        Ok(Expr::Binary(Box::new(BinaryExpr {
            token,
            op,
            lhs,
            rhs,
        })))
    }

    fn parse_plus(ps: &mut ParseState) -> ParseResult<Expr> {
        let mut expr = Self::parse_times(ps)?;

        loop {
            let op = match ps.token.kind {
                _ if ps.line_broke() => break,
                TokenKind::Plus => BinaryOp::Plus,
                TokenKind::Minus => BinaryOp::Minus,
                _ => break,
            };
            let token = ps.token.clone();
            ps.advance();
            let rhs = Self::parse_times(ps)?;
            expr = Expr::Binary(Box::new(BinaryExpr {
                token,
                op,
                lhs: expr,
                rhs,
            }));
        }

        Ok(expr)
    }

    fn parse_times(ps: &mut ParseState) -> ParseResult<Expr> {
        let mut expr = Self::parse_prefix(ps)?;

        loop {
            let op = match ps.token.kind {
                _ if ps.line_broke() => break,
                TokenKind::Times => BinaryOp::Times,
                TokenKind::DivideBy => BinaryOp::DivideBy,
                TokenKind::Mod => BinaryOp::Mod,
                _ => break,
            };
            let token = ps.token.clone();
            ps.advance();
            let rhs = Self::parse_prefix(ps)?;
            expr = Expr::Binary(Box::new(BinaryExpr {
                token,
                op,
                lhs: expr,
                rhs,
            }));
        }

        Ok(expr)
    }

    fn parse_prefix(ps: &mut ParseState) -> ParseResult<Expr> {
        let op = match ps.token.kind {
            TokenKind::Not => Some(PrefixOp::Not),
            TokenKind::Minus => Some(PrefixOp::Minus),
            TokenKind::Plus => Some(PrefixOp::Plus),
            _ => None,
        };

        let Some(op) = op else {
            return Self::parse_postfix(ps);
        };

        let token = ps.token.clone();
        ps.advance();
        let rhs = Self::parse_prefix(ps)?;

        Ok(Expr::Prefix(Box::new(PrefixExpr { token, op, rhs })))
    }

    fn parse_postfix(ps: &mut ParseState) -> ParseResult<Expr> {
        let mut expr = Self::parse_base(ps)?;

        loop {
            if ps.line_broke() {
                break;
            }
            match ps.token.kind {
                TokenKind::LParen => {
                    let token = ps.token.clone();
                    ps.advance();
                    let mut params = vec![];
                    while ps.token.kind != TokenKind::RParen {
                        params.push(Expr::parse(ps)?);
                        if ps.accept(TokenKind::Comma).is_none()
                            && ps.token.kind != TokenKind::RParen
                        {
                            return Err(ps.error(format!(
                                "unexpected token {} in parameter list",
                                ps.token
                            )));
                        }
                    }
                    ps.chomp(TokenKind::RParen)?;
                    expr = Expr::Callsite(Box::new(CallsiteExpr {
                        token,
                        function_expr: expr,
                        params,
                    }));
                }
                TokenKind::Dot => {
                    let token = ps.token.clone();
                    ps.advance();
                    let rhs = ps.chomp(TokenKind::Identifier)?;
                    expr = Expr::Dot(Box::new(DotExpr {
                        token,
                        lhs: expr,
                        rhs,
                    }));
                }
                TokenKind::LSquare => {
                    let token = ps.token.clone();
                    ps.advance();
                    let index = Expr::parse(ps)?;
                    ps.chomp(TokenKind::RSquare)?;
                    expr = Expr::Index(Box::new(IndexExpr {
                        token,
                        lhs: expr,
                        index,
                    }));
                }
                TokenKind::As => {
                    let token = ps.token.clone();
                    ps.advance();
                    let type_ref = TypeRefExpr::parse(ps)?;
                    expr = Expr::Cast(Box::new(CastExpr {
                        token,
                        expr,
                        type_ref,
                    }));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_base(ps: &mut ParseState) -> ParseResult<Expr> {
        match ps.token.kind {
            TokenKind::LParen => Self::parse_tuple(ps),
            TokenKind::Identifier => {
                let token = ps.token.clone();
                ps.advance();
                Ok(Expr::Reference { token })
            }
            TokenKind::Sizeof => {
                let token = ps.chomp(TokenKind::Sizeof)?;
                ps.chomp(TokenKind::LParen)?;
                let type_ref = TypeRefExpr::parse(ps)?;
                ps.chomp(TokenKind::RParen)?;
                Ok(Expr::Sizeof(SizeofExpr { token, type_ref }))
            }
            TokenKind::GetTypeid => {
                let token = ps.chomp(TokenKind::GetTypeid)?;
                ps.chomp(TokenKind::LParen)?;
                let expr = Expr::parse(ps)?;
                ps.chomp(TokenKind::RParen)?;
                Ok(Expr::Typeid(Box::new(TypeidExpr { token, expr })))
            }
            _ => Self::parse_literal(ps),
        }
    }

    fn parse_literal(ps: &mut ParseState) -> ParseResult<Expr> {
        match ps.token.kind {
            TokenKind::Nil
            | TokenKind::True
            | TokenKind::False
            | TokenKind::IntegerLiteral
            | TokenKind::FloatLiteral
            | TokenKind::StringLiteral
            | TokenKind::CharLiteral
            | TokenKind::AtomLiteral => {
                let token = ps.token.clone();
                ps.advance();
                Ok(Expr::Literal { token })
            }
            TokenKind::LSquare => Self::parse_array_literal(ps),
            TokenKind::Def => {
                let defn = FunctionDefn::parse(ps)?;
                Ok(Expr::FunctionDefn(Box::new(defn)))
            }
            TokenKind::Indent => Err(ps.error("unexpected indent")),
            _ => Err(ps.error(format!("out of place token {}", ps.token))),
        }
    }

    fn parse_array_literal(ps: &mut ParseState) -> ParseResult<Expr> {
        let token = ps.chomp(TokenKind::LSquare)?;
        let mut items = vec![];

        while ps.token.kind != TokenKind::RSquare {
            items.push(Expr::parse(ps)?);
            if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RSquare {
                return Err(ps.error(
                    "found something that does not make sense in an array literal",
                ));
            }
        }
        ps.chomp(TokenKind::RSquare)?;

        Ok(Expr::ArrayLiteral(ArrayLiteralExpr { token, items }))
    }

    fn parse_tuple(ps: &mut ParseState) -> ParseResult<Expr> {
        let start_token = ps.chomp(TokenKind::LParen)?;
        let expr = Self::parse_or(ps)?;

        if ps.accept(TokenKind::Comma).is_none() {
            ps.chomp(TokenKind::RParen)?;
            return Ok(expr);
        }

        let mut values = vec![expr];
        while ps.token.kind != TokenKind::RParen {
            values.push(Self::parse_or(ps)?);
            if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RParen {
                return Err(ps.error(format!(
                    "unexpected token {} in tuple. expected comma or right-paren",
                    ps.token
                )));
            }
        }
        ps.chomp(TokenKind::RParen)?;

        Ok(Expr::Tuple(TupleExpr {
            token: start_token,
            values,
        }))
    }
}
