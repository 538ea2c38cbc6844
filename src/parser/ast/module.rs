use crate::atom::Atom;
use crate::lexer::{Token, TokenKind};
use crate::parser::{ParseResult, ParseState};

use super::statement::{FunctionDecl, FunctionDefn, TagDecl, TypeDef, VarDecl};

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub token: Token,
    pub name: String,
    pub version: Option<String>,
}

/// `link module m [as n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkModule {
    pub token: Token,
    pub decl: ModuleDecl,
    pub link_as_name: Option<Token>,
}

/// `link def f(...) T` declares an extern function provided by the runtime
/// or another object file.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFunction {
    pub token: Token,
    pub decl: FunctionDecl,
}

/// `link name to module m.symbol` renames an import.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkName {
    pub token: Token,
    pub local_name: Token,
    pub module_decl: ModuleDecl,
    pub remote_name: Token,
}

/// One source module: its declaration plus ordered lists of everything it
/// declares at top level.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub token: Token,
    pub filename: Atom,
    pub decl: ModuleDecl,
    pub linked_modules: Vec<LinkModule>,
    pub linked_functions: Vec<LinkFunction>,
    pub linked_names: Vec<LinkName>,
    pub type_defs: Vec<TypeDef>,
    pub tags: Vec<TagDecl>,
    pub functions: Vec<FunctionDefn>,
    pub var_decls: Vec<VarDecl>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub modules: Vec<Module>,
}

impl ModuleDecl {
    pub fn parse(ps: &mut ParseState) -> ParseResult<ModuleDecl> {
        let token = ps.chomp(TokenKind::Module)?;
        let name = ps.chomp(TokenKind::Identifier)?;

        let version = ps
            .accept(TokenKind::Version)
            .map(|version| version.text);

        Ok(ModuleDecl {
            token,
            name: name.text,
            version,
        })
    }
}

enum Link {
    Module(LinkModule),
    Function(LinkFunction),
    Name(LinkName),
}

fn parse_link(ps: &mut ParseState) -> ParseResult<Link> {
    let link_token = ps.chomp(TokenKind::Link)?;

    match ps.token.kind {
        TokenKind::Def => {
            let decl = FunctionDecl::parse(ps)?;
            Ok(Link::Function(LinkFunction {
                token: link_token,
                decl,
            }))
        }
        TokenKind::Module => {
            let decl = ModuleDecl::parse(ps)?;
            let link_as_name = if ps.accept(TokenKind::As).is_some() {
                Some(ps.chomp(TokenKind::Identifier)?)
            } else {
                None
            };
            Ok(Link::Module(LinkModule {
                token: link_token,
                decl,
                link_as_name,
            }))
        }
        TokenKind::Identifier => {
            let local_name = ps.chomp(TokenKind::Identifier)?;
            ps.chomp(TokenKind::To)?;
            let module_decl = ModuleDecl::parse(ps)?;
            ps.chomp(TokenKind::Dot)?;
            let remote_name = ps.chomp(TokenKind::Identifier)?;
            Ok(Link::Name(LinkName {
                token: link_token,
                local_name,
                module_decl,
                remote_name,
            }))
        }
        _ => Err(ps.error(
            "link must be followed by a function declaration, a module import, or a name",
        )),
    }
}

impl Module {
    pub fn parse(ps: &mut ParseState, filename: Atom) -> ParseResult<Module> {
        let decl = ModuleDecl::parse(ps)?;

        let mut module = Module {
            token: decl.token.clone(),
            filename,
            decl,
            linked_modules: vec![],
            linked_functions: vec![],
            linked_names: vec![],
            type_defs: vec![],
            tags: vec![],
            functions: vec![],
            var_decls: vec![],
        };

        loop {
            match ps.token.kind {
                TokenKind::Link => match parse_link(ps)? {
                    Link::Module(link) => module.linked_modules.push(link),
                    Link::Function(link) => module.linked_functions.push(link),
                    Link::Name(link) => module.linked_names.push(link),
                },
                TokenKind::Def => module.functions.push(FunctionDefn::parse(ps)?),
                TokenKind::Type => module.type_defs.push(TypeDef::parse(ps)?),
                TokenKind::Tag => module.tags.push(TagDecl::parse(ps)?),
                TokenKind::Var => {
                    ps.advance();
                    module.var_decls.push(VarDecl::parse(ps)?);
                }
                TokenKind::None => break,
                _ => {
                    return Err(ps.error(format!(
                        "unexpected {} at top-level module scope",
                        ps.token
                    )))
                }
            }
        }

        Ok(module)
    }
}
