use crate::lexer::{Token, TokenKind};
use crate::parser::{ParseResult, ParseState};

use super::expression::Expr;
use super::type_ref::TypeRefExpr;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    VarDecl(VarDecl),
    Assignment(Assignment),
    If(Box<IfBlock>),
    While(Box<WhileBlock>),
    For(Box<ForBlock>),
    When(Box<WhenBlock>),
    Return(ReturnStatement),
    Break { token: Token },
    Continue { token: Token },
    Pass { token: Token },
    FunctionDefn(FunctionDefn),
    TypeDef(TypeDef),
    Expression(Expr),
}

/// `var x int = e`, `var x = e`, `var x int`, or the `x := e` sugar. Either
/// the type or the initializer (or both) is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// The name token.
    pub token: Token,
    pub name: String,
    pub type_ref: Option<TypeRefExpr>,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    PlusEq,
    MinusEq,
    TimesEq,
    DivideByEq,
    ModEq,
}

impl AssignOp {
    /// The runtime overload an op-assignment desugars through.
    pub fn function_name(&self) -> Option<&'static str> {
        match self {
            AssignOp::Assign => None,
            AssignOp::PlusEq => Some("__plus__"),
            AssignOp::MinusEq => Some("__minus__"),
            AssignOp::TimesEq => Some("__times__"),
            AssignOp::DivideByEq => Some("__divide__"),
            AssignOp::ModEq => Some("__mod__"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub token: Token,
    pub op: AssignOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

/// A condition position accepts either an expression or a declaration whose
/// name is scoped to the then-branch (with `Maybe` narrowing).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expression(Expr),
    VarDecl(VarDecl),
}

impl Condition {
    pub fn token(&self) -> &Token {
        match self {
            Condition::Expression(expr) => expr.token(),
            Condition::VarDecl(var_decl) => &var_decl.token,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    pub token: Token,
    pub condition: Condition,
    pub block: Block,
    pub else_: Option<ElseBranch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    Elif(Box<IfBlock>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileBlock {
    pub token: Token,
    pub condition: Condition,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    pub token: Token,
    pub var_token: Token,
    pub iterable: Expr,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBlock {
    pub token: Token,
    pub scrutinee: Condition,
    pub patterns: Vec<PatternBlock>,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBlock {
    pub token: Token,
    pub type_ref: TypeRefExpr,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub token: Token,
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub token: Token,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// The name token.
    pub token: Token,
    pub name: String,
    pub params: Vec<VarDecl>,
    pub return_type: Option<TypeRefExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefn {
    pub decl: FunctionDecl,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub token: Token,
    /// The type's name token.
    pub name: Token,
    /// Declared type variables, e.g. `type pair{any A, any B} has ...`.
    pub type_variables: Vec<String>,
    pub algebra: TypeAlgebra,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeAlgebra {
    /// `type T is Ctor(..) or Ctor ...`
    Sum { token: Token, ctors: Vec<DataCtor> },
    /// `type T has` followed by indented dimensions.
    Product { token: Token, dims: Vec<Dimension> },
    /// `type T matches U` (an alias).
    Alias { token: Token, type_ref: TypeRefExpr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataCtor {
    pub token: Token,
    pub params: Vec<TypeRefExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub token: Token,
    pub name: String,
    pub type_ref: TypeRefExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagDecl {
    pub token: Token,
    pub name: Token,
}

impl Statement {
    pub fn parse(ps: &mut ParseState) -> ParseResult<Statement> {
        match ps.token.kind {
            TokenKind::Var => {
                ps.advance();
                Ok(Statement::VarDecl(VarDecl::parse(ps)?))
            }
            TokenKind::If => Ok(Statement::If(Box::new(IfBlock::parse(ps)?))),
            TokenKind::While => Ok(Statement::While(Box::new(WhileBlock::parse(ps)?))),
            TokenKind::For => Ok(Statement::For(Box::new(ForBlock::parse(ps)?))),
            TokenKind::When => Ok(Statement::When(Box::new(WhenBlock::parse(ps)?))),
            TokenKind::Return => Ok(Statement::Return(ReturnStatement::parse(ps)?)),
            TokenKind::Type => Ok(Statement::TypeDef(TypeDef::parse(ps)?)),
            TokenKind::Pass => Ok(Statement::Pass {
                token: ps.chomp(TokenKind::Pass)?,
            }),
            TokenKind::Continue => Ok(Statement::Continue {
                token: ps.chomp(TokenKind::Continue)?,
            }),
            TokenKind::Break => Ok(Statement::Break {
                token: ps.chomp(TokenKind::Break)?,
            }),
            TokenKind::Def => Ok(Statement::FunctionDefn(FunctionDefn::parse(ps)?)),
            _ => Self::parse_assignment(ps),
        }
    }

    /// Parse an expression statement, promoting it to an assignment, an
    /// op-assignment, or a `:=` declaration when the right operator follows.
    fn parse_assignment(ps: &mut ParseState) -> ParseResult<Statement> {
        // name := expr declares a new inferred variable
        if ps.token.kind == TokenKind::Identifier && ps.next_kind() == TokenKind::Becomes {
            let name_token = ps.chomp(TokenKind::Identifier)?;
            ps.chomp(TokenKind::Becomes)?;
            let initializer = Expr::parse(ps)?;
            return Ok(Statement::VarDecl(VarDecl {
                name: name_token.text.clone(),
                token: name_token,
                type_ref: None,
                initializer: Some(initializer),
            }));
        }

        let lhs = Expr::parse(ps)?;

        let op = match ps.token.kind {
            _ if ps.line_broke() => None,
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::PlusEq),
            TokenKind::MinusEq => Some(AssignOp::MinusEq),
            TokenKind::TimesEq => Some(AssignOp::TimesEq),
            TokenKind::DivideByEq => Some(AssignOp::DivideByEq),
            TokenKind::ModEq => Some(AssignOp::ModEq),
            TokenKind::Becomes => {
                return Err(ps.error(":= may only come after an identifier"));
            }
            _ => None,
        };

        let Some(op) = op else {
            return Ok(Statement::Expression(lhs));
        };

        let token = ps.token.clone();
        ps.advance();
        let rhs = Expr::parse(ps)?;

        Ok(Statement::Assignment(Assignment {
            token,
            op,
            lhs,
            rhs,
        }))
    }
}

impl VarDecl {
    /// Parse everything following the `var` keyword.
    pub fn parse(ps: &mut ParseState) -> ParseResult<VarDecl> {
        let name_token = ps.chomp(TokenKind::Identifier)?;

        let type_ref = if ps.token.kind != TokenKind::Assign && !ps.line_broke() {
            Some(TypeRefExpr::parse(ps)?)
        } else {
            None
        };

        let initializer = if ps.accept(TokenKind::Assign).is_some() {
            Some(Expr::parse(ps)?)
        } else {
            None
        };

        if type_ref.is_none() && initializer.is_none() {
            return Err(ps.error_at(
                name_token.location.clone(),
                format!(
                    "var declaration of '{}' needs a type or an initializer",
                    name_token.text
                ),
            ));
        }

        Ok(VarDecl {
            name: name_token.text.clone(),
            token: name_token,
            type_ref,
            initializer,
        })
    }

    /// Parse one parameter in a function declaration. A parameter without a
    /// type is generic, as if declared `any`.
    pub fn parse_param(ps: &mut ParseState) -> ParseResult<VarDecl> {
        let name_token = ps.chomp(TokenKind::Identifier)?;

        if ps.token.kind == TokenKind::Assign {
            return Err(ps.error("default values for function arguments are not a thing"));
        }

        let type_ref = if matches!(ps.token.kind, TokenKind::Comma | TokenKind::RParen) {
            None
        } else {
            Some(TypeRefExpr::parse(ps)?)
        };

        Ok(VarDecl {
            name: name_token.text.clone(),
            token: name_token,
            type_ref,
            initializer: None,
        })
    }
}

impl Condition {
    pub fn parse(ps: &mut ParseState) -> ParseResult<Condition> {
        if ps.token.kind == TokenKind::Var {
            ps.advance();
            return Ok(Condition::VarDecl(VarDecl::parse(ps)?));
        }

        if ps.token.kind == TokenKind::Identifier && ps.next_kind() == TokenKind::Becomes {
            let name_token = ps.chomp(TokenKind::Identifier)?;
            ps.chomp(TokenKind::Becomes)?;
            let initializer = Expr::parse(ps)?;
            return Ok(Condition::VarDecl(VarDecl {
                name: name_token.text.clone(),
                token: name_token,
                type_ref: None,
                initializer: Some(initializer),
            }));
        }

        Ok(Condition::Expression(Expr::parse(ps)?))
    }
}

impl Block {
    pub fn parse(ps: &mut ParseState) -> ParseResult<Block> {
        let token = ps.chomp(TokenKind::Indent)?;

        if ps.token.kind == TokenKind::Outdent {
            return Err(ps.error("empty blocks are not allowed, sorry. use pass."));
        }

        let mut statements = vec![];
        while ps.token.kind != TokenKind::Outdent && !ps.eof() {
            while ps.accept(TokenKind::Semicolon).is_some() {}
            if ps.token.kind == TokenKind::Outdent || ps.eof() {
                break;
            }
            if !statements.is_empty()
                && !ps.line_broke()
                && !matches!(
                    ps.prior_token.kind,
                    TokenKind::Indent | TokenKind::Outdent | TokenKind::Semicolon
                )
            {
                return Err(
                    ps.error("statements must be separated by a newline (or a semicolon)")
                );
            }
            statements.push(Statement::parse(ps)?);
        }

        ps.chomp(TokenKind::Outdent)?;

        Ok(Block { token, statements })
    }
}

impl IfBlock {
    pub fn parse(ps: &mut ParseState) -> ParseResult<IfBlock> {
        let token = if matches!(ps.token.kind, TokenKind::If | TokenKind::Elif) {
            let token = ps.token.clone();
            ps.advance();
            token
        } else {
            return Err(ps.error("expected if or elif"));
        };

        let condition = Condition::parse(ps)?;
        let block = Block::parse(ps)?;

        let else_ = match ps.token.kind {
            TokenKind::Elif => Some(ElseBranch::Elif(Box::new(IfBlock::parse(ps)?))),
            TokenKind::Else => {
                ps.advance();
                Some(ElseBranch::Block(Block::parse(ps)?))
            }
            _ => None,
        };

        Ok(IfBlock {
            token,
            condition,
            block,
            else_,
        })
    }
}

impl WhileBlock {
    pub fn parse(ps: &mut ParseState) -> ParseResult<WhileBlock> {
        let token = ps.chomp(TokenKind::While)?;
        let condition = Condition::parse(ps)?;
        let block = Block::parse(ps)?;

        Ok(WhileBlock {
            token,
            condition,
            block,
        })
    }
}

impl ForBlock {
    pub fn parse(ps: &mut ParseState) -> ParseResult<ForBlock> {
        let token = ps.chomp(TokenKind::For)?;
        let var_token = ps.chomp(TokenKind::Identifier)?;
        ps.chomp(TokenKind::In)?;
        let iterable = Expr::parse(ps)?;
        let block = Block::parse(ps)?;

        Ok(ForBlock {
            token,
            var_token,
            iterable,
            block,
        })
    }
}

impl WhenBlock {
    pub fn parse(ps: &mut ParseState) -> ParseResult<WhenBlock> {
        let token = ps.chomp(TokenKind::When)?;
        let scrutinee = Condition::parse(ps)?;

        ps.chomp(TokenKind::Indent)?;

        let mut patterns = vec![];
        while ps.token.kind == TokenKind::Is {
            let is_token = ps.chomp(TokenKind::Is)?;
            let type_ref = TypeRefExpr::parse(ps)?;
            let block = Block::parse(ps)?;
            patterns.push(PatternBlock {
                token: is_token,
                type_ref,
                block,
            });
        }

        if patterns.is_empty() {
            return Err(ps.error("when blocks need at least one 'is' pattern"));
        }

        let else_block = if ps.accept(TokenKind::Else).is_some() {
            Some(Block::parse(ps)?)
        } else {
            None
        };

        ps.chomp(TokenKind::Outdent)?;

        Ok(WhenBlock {
            token,
            scrutinee,
            patterns,
            else_block,
        })
    }
}

impl ReturnStatement {
    pub fn parse(ps: &mut ParseState) -> ParseResult<ReturnStatement> {
        let token = ps.chomp(TokenKind::Return)?;

        let expr = if !ps.line_broke()
            && ps.token.kind != TokenKind::Outdent
            && !ps.eof()
        {
            Some(Expr::parse(ps)?)
        } else {
            None
        };

        Ok(ReturnStatement { token, expr })
    }
}

impl FunctionDecl {
    pub fn parse(ps: &mut ParseState) -> ParseResult<FunctionDecl> {
        ps.chomp(TokenKind::Def)?;
        let name_token = ps.chomp(TokenKind::Identifier)?;
        ps.chomp(TokenKind::LParen)?;

        let mut params = vec![];
        while ps.token.kind != TokenKind::RParen {
            params.push(VarDecl::parse_param(ps)?);
            if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RParen {
                return Err(ps.error("unexpected token in parameter list declaration"));
            }
        }
        ps.chomp(TokenKind::RParen)?;

        let return_type = if matches!(
            ps.token.kind,
            TokenKind::Identifier | TokenKind::Any | TokenKind::LSquare | TokenKind::LCurly
        ) && !ps.line_broke()
        {
            Some(TypeRefExpr::parse(ps)?)
        } else {
            None
        };

        Ok(FunctionDecl {
            name: name_token.text.clone(),
            token: name_token,
            params,
            return_type,
        })
    }
}

impl FunctionDefn {
    pub fn parse(ps: &mut ParseState) -> ParseResult<FunctionDefn> {
        let decl = FunctionDecl::parse(ps)?;
        let block = Block::parse(ps)?;

        Ok(FunctionDefn { decl, block })
    }
}

impl TypeDef {
    pub fn parse(ps: &mut ParseState) -> ParseResult<TypeDef> {
        let token = ps.chomp(TokenKind::Type)?;
        let name = ps.chomp(TokenKind::Identifier)?;

        // optional declared type variables: type pair{any A, any B} has ...
        let mut type_variables = vec![];
        if ps.accept(TokenKind::LCurly).is_some() {
            while ps.token.kind != TokenKind::RCurly {
                ps.chomp(TokenKind::Any)?;
                let var = ps.chomp(TokenKind::Identifier)?;
                type_variables.push(var.text);
                if ps.accept(TokenKind::Comma).is_none() && ps.token.kind != TokenKind::RCurly {
                    return Err(ps.error("expected '}' or ',' in type variable list"));
                }
            }
            ps.chomp(TokenKind::RCurly)?;
        }

        let algebra = TypeAlgebra::parse(ps)?;

        Ok(TypeDef {
            token,
            name,
            type_variables,
            algebra,
        })
    }
}

impl TypeAlgebra {
    pub fn parse(ps: &mut ParseState) -> ParseResult<TypeAlgebra> {
        match ps.token.kind {
            TokenKind::Is => Self::parse_sum(ps),
            TokenKind::Has => Self::parse_product(ps),
            TokenKind::Matches => {
                let token = ps.chomp(TokenKind::Matches)?;
                let type_ref = TypeRefExpr::parse(ps)?;
                Ok(TypeAlgebra::Alias { token, type_ref })
            }
            _ => Err(ps.error(
                "type descriptions must begin with 'is', 'has', or 'matches'",
            )),
        }
    }

    fn parse_sum(ps: &mut ParseState) -> ParseResult<TypeAlgebra> {
        let is_token = ps.chomp(TokenKind::Is)?;

        let expect_outdent = ps.accept(TokenKind::Indent).is_some();

        if ps.token.kind != TokenKind::Identifier {
            return Err(ps.error(format!(
                "sum types must begin with an identifier. found {}",
                ps.token
            )));
        }

        let mut ctors = vec![];
        loop {
            ctors.push(DataCtor::parse(ps)?);
            if ps.accept(TokenKind::Or).is_none() {
                break;
            }
        }

        if expect_outdent {
            ps.chomp(TokenKind::Outdent)?;
        }

        Ok(TypeAlgebra::Sum {
            token: is_token,
            ctors,
        })
    }

    fn parse_product(ps: &mut ParseState) -> ParseResult<TypeAlgebra> {
        let has_token = ps.chomp(TokenKind::Has)?;
        ps.chomp(TokenKind::Indent)?;

        let mut dims = vec![];
        while ps.token.kind != TokenKind::Outdent && !ps.eof() {
            if !dims.is_empty() && !ps.line_broke() {
                return Err(ps.error("product type dimensions must be separated by a newline"));
            }
            dims.push(Dimension::parse(ps)?);
        }
        ps.chomp(TokenKind::Outdent)?;

        Ok(TypeAlgebra::Product {
            token: has_token,
            dims,
        })
    }
}

impl DataCtor {
    pub fn parse(ps: &mut ParseState) -> ParseResult<DataCtor> {
        let name_token = ps.chomp(TokenKind::Identifier)?;

        let mut params = vec![];
        if ps.accept(TokenKind::LParen).is_some() {
            loop {
                params.push(TypeRefExpr::parse(ps)?);
                if ps.accept(TokenKind::Comma).is_none() {
                    break;
                }
            }
            ps.chomp(TokenKind::RParen)?;
        }

        Ok(DataCtor {
            token: name_token,
            params,
        })
    }
}

impl Dimension {
    pub fn parse(ps: &mut ParseState) -> ParseResult<Dimension> {
        ps.accept(TokenKind::Var);
        let name_token = ps.chomp(TokenKind::Identifier)?;
        let type_ref = TypeRefExpr::parse(ps)?;

        Ok(Dimension {
            name: name_token.text.clone(),
            token: name_token,
            type_ref,
        })
    }
}

impl TagDecl {
    pub fn parse(ps: &mut ParseState) -> ParseResult<TagDecl> {
        let token = ps.chomp(TokenKind::Tag)?;
        let name = ps.chomp(TokenKind::Identifier)?;

        Ok(TagDecl { token, name })
    }
}
