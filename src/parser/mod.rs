pub mod ast;
mod state;

pub use state::*;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use crate::atom::Atom;
use crate::lexer::{Lexer, Token};
use crate::location::Location;

use self::ast::Module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a whole module from an already-lexed token stream.
pub fn parse_module(
    tokens: Vec<Token>,
    filename: Atom,
    type_macros: HashMap<String, String>,
) -> ParseResult<Module> {
    let mut ps = ParseState::with_type_macros(tokens, type_macros);
    let module = Module::parse(&mut ps, filename)?;
    if !ps.eof() {
        return Err(ps.error(format!("unexpected {} after end of module", ps.token)));
    }
    Ok(module)
}

/// Lex and parse a module from source text. Lex errors are reported as parse
/// errors; callers that care about the distinction use the lexer directly.
pub fn parse_source(source: &str, filename: Atom) -> ParseResult<Module> {
    let tokens = Lexer::new(filename.clone(), source)
        .lex()
        .map_err(|e| ParseError {
            message: e.message,
            location: e.location,
        })?;
    parse_module(tokens, filename, HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    fn parse(source: &str) -> Module {
        parse_source(source, Atom::from("test.zion")).unwrap()
    }

    #[test]
    fn test_parse_minimal_module() {
        let module = parse("module minimal @0.1.0\n");

        assert_eq!("minimal", module.decl.name);
        assert_eq!(Some("0.1.0".to_string()), module.decl.version);
        assert!(module.functions.is_empty());
    }

    #[test]
    fn test_parse_module_one_function() {
        let module = parse("module arith\ndef f() int\n\treturn 1 + 2\n");

        assert_eq!(1, module.functions.len());
        let function = &module.functions[0];
        assert_eq!("f", function.decl.name);
        assert_eq!(1, function.block.statements.len());

        let Statement::Return(ret) = &function.block.statements[0] else {
            panic!("expected a return statement");
        };
        let Some(Expr::Binary(binary)) = &ret.expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(BinaryOp::Plus, binary.op);
    }

    #[test]
    fn test_parse_fizz_buzz() {
        let module = parse(concat!(
            "module fizzbuzz @1.2.3\n",
            "def main(maximum int) int\n",
            "\tvar i int = 1\n",
            "\twhile i <= maximum\n",
            "\t\tif i % 15 == 0\n",
            "\t\t\tprint(\"fizzbuzz\")\n",
            "\t\t\ti = i + 1\n",
            "\t\t\tcontinue\n",
            "\t\tif i % 3 == 0\n",
            "\t\t\tprint(\"fizz\")\n",
            "\t\tif i % 5 == 0\n",
            "\t\t\tprint(\"buzz\")\n",
            "\t\ti = i + 1\n",
        ));

        assert_eq!(1, module.functions.len());
        let main = &module.functions[0];
        assert_eq!(2, main.block.statements.len());

        let Statement::While(while_block) = &main.block.statements[1] else {
            panic!("expected a while block");
        };

        let ifs = while_block
            .block
            .statements
            .iter()
            .filter(|statement| matches!(statement, Statement::If(_)))
            .count();
        assert_eq!(3, ifs);

        let Statement::If(first_if) = &while_block.block.statements[0] else {
            panic!("expected an if block");
        };
        let Condition::Expression(Expr::Binary(eq)) = &first_if.condition else {
            panic!("expected a binary condition");
        };
        assert_eq!(BinaryOp::Equal, eq.op);
        let Expr::Binary(modulo) = &eq.lhs else {
            panic!("expected a mod expression");
        };
        assert_eq!(BinaryOp::Mod, modulo.op);
    }

    #[test]
    fn test_parse_mixed_precedences() {
        let module = parse("module m\ndef f() int\n\treturn 1 + 2 * 3 - 4\n");

        let Statement::Return(ret) = &module.functions[0].block.statements[0] else {
            panic!("expected a return");
        };
        // ((1 + (2 * 3)) - 4)
        let Some(Expr::Binary(minus)) = &ret.expr else {
            panic!("expected binary");
        };
        assert_eq!(BinaryOp::Minus, minus.op);
        let Expr::Binary(plus) = &minus.lhs else {
            panic!("expected plus on the left");
        };
        assert_eq!(BinaryOp::Plus, plus.op);
        let Expr::Binary(times) = &plus.rhs else {
            panic!("expected times under plus");
        };
        assert_eq!(BinaryOp::Times, times.op);
    }

    #[test]
    fn test_parse_multiple_logical_ops() {
        let module = parse("module m\ndef f(a bool, b bool, c bool) bool\n\treturn a and b or not c\n");

        let Statement::Return(ret) = &module.functions[0].block.statements[0] else {
            panic!("expected a return");
        };
        let Some(Expr::Binary(or)) = &ret.expr else {
            panic!("expected or at the top");
        };
        assert_eq!(BinaryOp::Or, or.op);
        let Expr::Binary(and) = &or.lhs else {
            panic!("expected and on the left");
        };
        assert_eq!(BinaryOp::And, and.op);
        let Expr::Prefix(not) = &or.rhs else {
            panic!("expected not on the right");
        };
        assert_eq!(PrefixOp::Not, not.op);
    }

    #[test]
    fn test_parse_becomes_sugar() {
        let module = parse("module m\ndef f() int\n\tx := 41\n\treturn x + 1\n");

        let Statement::VarDecl(var_decl) = &module.functions[0].block.statements[0] else {
            panic!("expected a var decl from :=");
        };
        assert_eq!("x", var_decl.name);
        assert!(var_decl.type_ref.is_none());
        assert!(var_decl.initializer.is_some());
    }

    #[test]
    fn test_parse_link_extern_module() {
        let module = parse("module m\nlink module vector\nlink module list as l\n");

        assert_eq!(2, module.linked_modules.len());
        assert_eq!("vector", module.linked_modules[0].decl.name);
        assert_eq!(
            "l",
            module.linked_modules[1].link_as_name.as_ref().unwrap().text
        );
    }

    #[test]
    fn test_parse_link_extern_function() {
        let module = parse("module m\nlink def putstr(s str) int\n");

        assert_eq!(1, module.linked_functions.len());
        assert_eq!("putstr", module.linked_functions[0].decl.name);
        assert_eq!(1, module.linked_functions[0].decl.params.len());
    }

    #[test]
    fn test_parse_type_product() {
        let module = parse("module m\ntype point has\n\tvar x int\n\tvar y int\n");

        assert_eq!(1, module.type_defs.len());
        let TypeAlgebra::Product { dims, .. } = &module.type_defs[0].algebra else {
            panic!("expected a product type");
        };
        assert_eq!(2, dims.len());
        assert_eq!("x", dims[0].name);
    }

    #[test]
    fn test_parse_type_sum() {
        let module = parse("module m\ntype direction is North or South(int) or East or West\n");

        let TypeAlgebra::Sum { ctors, .. } = &module.type_defs[0].algebra else {
            panic!("expected a sum type");
        };
        assert_eq!(4, ctors.len());
        assert_eq!("South", ctors[1].token.text);
        assert_eq!(1, ctors[1].params.len());
    }

    #[test]
    fn test_parse_type_alias_with_maybe() {
        let module = parse("module m\ntype opt matches int?\n");

        let TypeAlgebra::Alias { type_ref, .. } = &module.type_defs[0].algebra else {
            panic!("expected an alias");
        };
        assert!(matches!(type_ref, TypeRefExpr::Maybe { .. }));
    }

    #[test]
    fn test_parse_when_block() {
        let module = parse(concat!(
            "module m\n",
            "def f(v any) int\n",
            "\twhen v\n",
            "\t\tis int\n",
            "\t\t\treturn 1\n",
            "\t\tis str\n",
            "\t\t\treturn 2\n",
            "\t\telse\n",
            "\t\t\treturn 3\n",
        ));

        let Statement::When(when_block) = &module.functions[0].block.statements[0] else {
            panic!("expected a when block");
        };
        assert_eq!(2, when_block.patterns.len());
        assert!(when_block.else_block.is_some());
    }

    #[test]
    fn test_parse_multiple_dots() {
        let module = parse("module m\ndef f() int\n\treturn a.b.c\n");

        let Statement::Return(ret) = &module.functions[0].block.statements[0] else {
            panic!("expected a return");
        };
        let Some(Expr::Dot(outer)) = &ret.expr else {
            panic!("expected a dot expr");
        };
        assert_eq!("c", outer.rhs.text);
        let Expr::Dot(inner) = &outer.lhs else {
            panic!("expected a nested dot expr");
        };
        assert_eq!("b", inner.rhs.text);
    }

    #[test]
    fn test_parse_array_literal() {
        let module = parse("module m\ndef f() [int]\n\treturn [1, 2, 3]\n");

        let Statement::Return(ret) = &module.functions[0].block.statements[0] else {
            panic!("expected a return");
        };
        let Some(Expr::ArrayLiteral(array)) = &ret.expr else {
            panic!("expected an array literal");
        };
        assert_eq!(3, array.items.len());
    }

    #[test]
    fn test_parse_module_var() {
        let module = parse("module m\nvar counter int = 0\n");

        assert_eq!(1, module.var_decls.len());
        assert_eq!("counter", module.var_decls[0].name);
    }

    #[test]
    fn test_parse_error_quotes_unexpected_token() {
        let result = parse_source(
            "module m\ndef f() int\n\treturn return\n",
            Atom::from("test.zion"),
        );

        let error = result.unwrap_err();
        assert!(
            error.message.contains("'return'") && error.message.contains("(return)"),
            "got: {}",
            error.message
        );
    }

    #[test]
    fn test_statements_need_separation() {
        let result = parse_source(
            "module m\ndef f() int\n\treturn 1 return 2\n",
            Atom::from("test.zion"),
        );

        assert!(result.is_err());
    }
}
