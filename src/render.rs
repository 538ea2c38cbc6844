use crate::lexer::TokenKind;
use crate::parser::ast::*;

/// Pretty-print a parsed module back to source. Parsing the output yields a
/// structurally equal AST (modulo comments and whitespace).
pub fn render_module(module: &Module) -> String {
    let mut renderer = Renderer::default();
    renderer.module(module);
    renderer.out
}

#[derive(Default)]
struct Renderer {
    out: String,
    indent: usize,
}

// binding strength, loosest first; mirrors the parser's precedence climb
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary(_) => 1,
        Expr::Binary(binary) => match binary.op {
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Equal | BinaryOp::Inequal | BinaryOp::In | BinaryOp::NotIn => 4,
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => 5,
            BinaryOp::Plus | BinaryOp::Minus => 6,
            BinaryOp::Times | BinaryOp::DivideBy | BinaryOp::Mod => 7,
        },
        Expr::Prefix(_) => 8,
        Expr::Dot(_) | Expr::Index(_) | Expr::Callsite(_) | Expr::Cast(_) => 9,
        _ => 10,
    }
}

fn binary_op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "or",
        BinaryOp::And => "and",
        BinaryOp::Equal => "==",
        BinaryOp::Inequal => "!=",
        BinaryOp::In => "in",
        BinaryOp::NotIn => "not in",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Times => "*",
        BinaryOp::DivideBy => "/",
        BinaryOp::Mod => "%",
    }
}

pub fn render_expr(expr: &Expr) -> String {
    render_with_context(expr, 0)
}

fn render_with_context(expr: &Expr, context: u8) -> String {
    let text = match expr {
        Expr::Literal { token } => match token.kind {
            TokenKind::StringLiteral => format!("\"{}\"", token.text),
            TokenKind::CharLiteral => format!("'{}'", token.text),
            TokenKind::AtomLiteral => format!(":{}", token.text),
            _ => token.text.clone(),
        },
        Expr::Reference { token } => token.text.clone(),
        Expr::Prefix(prefix) => {
            let op = match prefix.op {
                PrefixOp::Not => "not ",
                PrefixOp::Minus => "-",
                PrefixOp::Plus => "+",
            };
            format!("{op}{}", render_with_context(&prefix.rhs, 8))
        }
        Expr::Binary(binary) => {
            let level = precedence(expr);
            format!(
                "{} {} {}",
                render_with_context(&binary.lhs, level),
                binary_op_text(binary.op),
                // left-associative: the right operand binds one tighter
                render_with_context(&binary.rhs, level + 1)
            )
        }
        Expr::Ternary(ternary) => format!(
            "{} ? {} : {}",
            render_with_context(&ternary.condition, 2),
            render_with_context(&ternary.then_expr, 1),
            render_with_context(&ternary.else_expr, 1)
        ),
        Expr::Dot(dot) => format!(
            "{}.{}",
            render_with_context(&dot.lhs, 9),
            dot.rhs.text
        ),
        Expr::Index(index) => format!(
            "{}[{}]",
            render_with_context(&index.lhs, 9),
            render_expr(&index.index)
        ),
        Expr::Callsite(callsite) => {
            let params: Vec<String> =
                callsite.params.iter().map(render_expr).collect();
            format!(
                "{}({})",
                render_with_context(&callsite.function_expr, 9),
                params.join(", ")
            )
        }
        Expr::Tuple(tuple) => {
            let values: Vec<String> = tuple.values.iter().map(render_expr).collect();
            format!("({},)", values.join(", "))
        }
        Expr::ArrayLiteral(array) => {
            let items: Vec<String> = array.items.iter().map(render_expr).collect();
            format!("[{}]", items.join(", "))
        }
        Expr::Cast(cast) => format!(
            "{} as {}",
            render_with_context(&cast.expr, 9),
            render_type_ref(&cast.type_ref)
        ),
        Expr::Sizeof(sizeof) => format!("sizeof({})", render_type_ref(&sizeof.type_ref)),
        Expr::Typeid(typeid) => format!("__get_typeid__({})", render_expr(&typeid.expr)),
        Expr::FunctionDefn(defn) => {
            // function literals only render as their declaration head
            render_function_decl(&defn.decl)
        }
    };

    if precedence(expr) < context {
        format!("({text})")
    } else {
        text
    }
}

pub fn render_type_ref(type_ref: &TypeRefExpr) -> String {
    match type_ref {
        TypeRefExpr::Named { name, args, .. } => {
            if args.is_empty() {
                name.clone()
            } else {
                let args: Vec<String> = args.iter().map(render_type_ref).collect();
                format!("{name}{{{}}}", args.join(", "))
            }
        }
        TypeRefExpr::Generic { name, .. } => match name {
            Some(name) => format!("any {name}"),
            None => "any".to_string(),
        },
        TypeRefExpr::List { element, .. } => format!("[{}]", render_type_ref(element)),
        TypeRefExpr::Tuple { dims, .. } => {
            let dims: Vec<String> = dims.iter().map(render_type_ref).collect();
            format!("{{{}}}", dims.join(", "))
        }
        TypeRefExpr::Maybe { just, .. } => format!("{}?", render_type_ref(just)),
    }
}

fn render_function_decl(decl: &FunctionDecl) -> String {
    let params: Vec<String> = decl
        .params
        .iter()
        .map(|param| match &param.type_ref {
            Some(type_ref) => format!("{} {}", param.name, render_type_ref(type_ref)),
            None => param.name.clone(),
        })
        .collect();
    let mut text = format!("def {}({})", decl.name, params.join(", "));
    if let Some(return_type) = &decl.return_type {
        text.push(' ');
        text.push_str(&render_type_ref(return_type));
    }
    text
}

impl Renderer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn module(&mut self, module: &Module) {
        match &module.decl.version {
            Some(version) => self.line(&format!("module {} @{version}", module.decl.name)),
            None => self.line(&format!("module {}", module.decl.name)),
        }

        for link in &module.linked_modules {
            match &link.link_as_name {
                Some(alias) => {
                    self.line(&format!("link module {} as {}", link.decl.name, alias.text))
                }
                None => self.line(&format!("link module {}", link.decl.name)),
            }
        }
        for link in &module.linked_functions {
            self.line(&format!("link {}", render_function_decl(&link.decl)));
        }
        for link in &module.linked_names {
            self.line(&format!(
                "link {} to module {}.{}",
                link.local_name.text, link.module_decl.name, link.remote_name.text
            ));
        }

        for type_def in &module.type_defs {
            self.type_def(type_def);
        }
        for tag in &module.tags {
            self.line(&format!("tag {}", tag.name.text));
        }
        for var_decl in &module.var_decls {
            self.var_decl_line(var_decl);
        }
        for function in &module.functions {
            self.function(function);
        }
    }

    fn type_def(&mut self, type_def: &TypeDef) {
        let vars = if type_def.type_variables.is_empty() {
            String::new()
        } else {
            let vars: Vec<String> = type_def
                .type_variables
                .iter()
                .map(|v| format!("any {v}"))
                .collect();
            format!("{{{}}}", vars.join(", "))
        };
        let head = format!("type {}{vars}", type_def.name.text);

        match &type_def.algebra {
            TypeAlgebra::Sum { ctors, .. } => {
                let ctors: Vec<String> = ctors
                    .iter()
                    .map(|ctor| {
                        if ctor.params.is_empty() {
                            ctor.token.text.clone()
                        } else {
                            let params: Vec<String> =
                                ctor.params.iter().map(render_type_ref).collect();
                            format!("{}({})", ctor.token.text, params.join(", "))
                        }
                    })
                    .collect();
                self.line(&format!("{head} is {}", ctors.join(" or ")));
            }
            TypeAlgebra::Product { dims, .. } => {
                self.line(&format!("{head} has"));
                self.indent += 1;
                for dim in dims {
                    self.line(&format!(
                        "var {} {}",
                        dim.name,
                        render_type_ref(&dim.type_ref)
                    ));
                }
                self.indent -= 1;
            }
            TypeAlgebra::Alias { type_ref, .. } => {
                self.line(&format!("{head} matches {}", render_type_ref(type_ref)));
            }
        }
    }

    fn function(&mut self, function: &FunctionDefn) {
        self.line(&render_function_decl(&function.decl));
        self.block(&function.block);
    }

    fn block(&mut self, block: &Block) {
        self.indent += 1;
        for statement in &block.statements {
            self.statement(statement);
        }
        self.indent -= 1;
    }

    fn var_decl_line(&mut self, var_decl: &VarDecl) {
        match (&var_decl.type_ref, &var_decl.initializer) {
            (Some(type_ref), Some(initializer)) => self.line(&format!(
                "var {} {} = {}",
                var_decl.name,
                render_type_ref(type_ref),
                render_expr(initializer)
            )),
            (Some(type_ref), None) => self.line(&format!(
                "var {} {}",
                var_decl.name,
                render_type_ref(type_ref)
            )),
            (None, Some(initializer)) => {
                self.line(&format!("{} := {}", var_decl.name, render_expr(initializer)))
            }
            (None, None) => {}
        }
    }

    fn condition(&self, condition: &Condition) -> String {
        match condition {
            Condition::Expression(expr) => render_expr(expr),
            Condition::VarDecl(var_decl) => match (&var_decl.type_ref, &var_decl.initializer) {
                (Some(type_ref), Some(initializer)) => format!(
                    "var {} {} = {}",
                    var_decl.name,
                    render_type_ref(type_ref),
                    render_expr(initializer)
                ),
                (None, Some(initializer)) => {
                    format!("{} := {}", var_decl.name, render_expr(initializer))
                }
                _ => format!("var {}", var_decl.name),
            },
        }
    }

    fn if_block(&mut self, if_block: &IfBlock, keyword: &str) {
        self.line(&format!("{keyword} {}", self.condition(&if_block.condition)));
        self.block(&if_block.block);
        match &if_block.else_ {
            Some(ElseBranch::Elif(elif)) => self.if_block(elif, "elif"),
            Some(ElseBranch::Block(block)) => {
                self.line("else");
                self.block(block);
            }
            None => {}
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::VarDecl(var_decl) => self.var_decl_line(var_decl),
            Statement::Assignment(assignment) => {
                let op = match assignment.op {
                    AssignOp::Assign => "=",
                    AssignOp::PlusEq => "+=",
                    AssignOp::MinusEq => "-=",
                    AssignOp::TimesEq => "*=",
                    AssignOp::DivideByEq => "/=",
                    AssignOp::ModEq => "%=",
                };
                self.line(&format!(
                    "{} {op} {}",
                    render_expr(&assignment.lhs),
                    render_expr(&assignment.rhs)
                ));
            }
            Statement::If(if_block) => self.if_block(if_block, "if"),
            Statement::While(while_block) => {
                self.line(&format!("while {}", self.condition(&while_block.condition)));
                self.block(&while_block.block);
            }
            Statement::For(for_block) => {
                self.line(&format!(
                    "for {} in {}",
                    for_block.var_token.text,
                    render_expr(&for_block.iterable)
                ));
                self.block(&for_block.block);
            }
            Statement::When(when_block) => {
                self.line(&format!("when {}", self.condition(&when_block.scrutinee)));
                self.indent += 1;
                for pattern in &when_block.patterns {
                    self.line(&format!("is {}", render_type_ref(&pattern.type_ref)));
                    self.block(&pattern.block);
                }
                if let Some(else_block) = &when_block.else_block {
                    self.line("else");
                    self.block(else_block);
                }
                self.indent -= 1;
            }
            Statement::Return(ret) => match &ret.expr {
                Some(expr) => self.line(&format!("return {}", render_expr(expr))),
                None => self.line("return"),
            },
            Statement::Break { .. } => self.line("break"),
            Statement::Continue { .. } => self.line("continue"),
            Statement::Pass { .. } => self.line("pass"),
            Statement::FunctionDefn(defn) => self.function(defn),
            Statement::TypeDef(type_def) => self.type_def(type_def),
            Statement::Expression(expr) => {
                let rendered = render_expr(expr);
                self.line(&rendered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::parser::parse_source;

    fn round_trip(source: &str) {
        let module = parse_source(source, Atom::from("test.zion")).unwrap();
        let rendered = render_module(&module);
        let reparsed = parse_source(&rendered, Atom::from("test.zion"))
            .unwrap_or_else(|e| panic!("rendered source failed to parse: {e}\n{rendered}"));
        assert_eq!(module, reparsed, "\nrendered:\n{rendered}");
    }

    #[test]
    fn test_round_trip_minimal_module() {
        round_trip("module minimal @0.1.0\n");
    }

    #[test]
    fn test_round_trip_arithmetic() {
        round_trip("module arith\ndef f() int\n\treturn 1 + 2 * 3 - 4\n");
    }

    #[test]
    fn test_round_trip_fizz_buzz() {
        round_trip(concat!(
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
            "\t\ti = i + 1\n",
        ));
    }

    #[test]
    fn test_round_trip_parenthesized_precedence() {
        round_trip("module m\ndef f() int\n\treturn (1 + 2) * 3\n");
    }

    #[test]
    fn test_round_trip_types_and_links() {
        round_trip(concat!(
            "module shapes\n",
            "link module vector as v\n",
            "link def putstr(s str) int\n",
            "type shape is Circle(float) or Square(float) or Empty\n",
            "type point has\n",
            "\tvar x int\n",
            "\tvar y int\n",
            "type opt matches int?\n",
            "tag Ready\n",
            "var counter int = 0\n",
        ));
    }

    #[test]
    fn test_round_trip_when_and_conditions() {
        round_trip(concat!(
            "module m\n",
            "def f(v any, x int?) int\n",
            "\tif y := x\n",
            "\t\treturn y\n",
            "\twhen v\n",
            "\t\tis int\n",
            "\t\t\treturn 1\n",
            "\t\telse\n",
            "\t\t\treturn 2\n",
        ));
    }
}
