use log::debug;

use crate::ir::{IrType, Value};
use crate::parser::ast;
use crate::scopes::{BoundVar, ScopeId};
use crate::types::is_managed_type;

use super::coercions::resolve_value;
use super::{full_eval, Checker, FnContext};

impl Checker<'_> {
    /// Lower a `when` block into a cascade of runtime type-id comparisons.
    /// Each pattern block gets a fresh scope in which the scrutinee's name
    /// is re-typed to the pattern's type. Returns whether every path through
    /// the when returns.
    pub(crate) fn check_when(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        when_block: &ast::WhenBlock,
    ) -> bool {
        let location = when_block.token.location.clone();

        // evaluate the scrutinee once
        let (scrutinee, scrutinee_name) = match &when_block.scrutinee {
            ast::Condition::Expression(expr) => {
                let name = match expr {
                    ast::Expr::Reference { token } => Some(token.text.clone()),
                    _ => None,
                };
                let Some(var) = self.check_expression(scope, ctx, expr) else {
                    return false;
                };
                (resolve_value(&mut ctx.builder, var), name)
            }
            ast::Condition::VarDecl(var_decl) => {
                let Some(var) =
                    self.check_var_decl(scope, ctx, var_decl, super::life::LifeForm::Block)
                else {
                    return false;
                };
                (
                    resolve_value(&mut ctx.builder, var),
                    Some(var_decl.name.clone()),
                )
            }
        };

        let env = self.env(scope);
        if !is_managed_type(&scrutinee.type_, &env) {
            self.status.error(
                location.clone(),
                format!(
                    "when needs a managed value to dispatch on, not {}",
                    scrutinee.type_
                ),
            );
            return false;
        }

        let scrutinee_type_id = ctx.builder.call(
            IrType::I32,
            "__get_var_type_id",
            vec![(scrutinee.ir_type.clone(), scrutinee.value.clone())],
        );

        let end_label = ctx.builder.add_block("when.end");
        let mut all_patterns_return = true;
        let mut matched_any = false;

        for pattern in &when_block.patterns {
            let Some(pattern_type) = self.elaborate(scope, &pattern.type_ref) else {
                continue;
            };

            // a pattern that elaborates to nothing is skipped silently
            let evaluated = full_eval(&pattern_type, &env);
            if evaluated.is_unreachable() {
                debug!("skipping unreachable pattern {pattern_type}");
                continue;
            }
            matched_any = true;

            let pattern_type_id = self
                .scopes
                .get_or_assign_type_id(&pattern_type.signature());

            let matches = ctx.builder.call(
                IrType::I1,
                "__type_id_eq_type_id",
                vec![
                    (IrType::I32, scrutinee_type_id.clone()),
                    (IrType::I32, Value::Int(pattern_type_id as i64)),
                ],
            );

            let match_label = ctx.builder.add_block("when.match");
            let next_label = ctx.builder.add_block("when.next");
            ctx.builder.cond_br(matches, &match_label, &next_label);

            ctx.builder.set_current_block(&match_label);
            let pattern_scope = self.scopes.new_local_scope(scope);
            if let Some(name) = &scrutinee_name {
                let narrowed_ir = self
                    .lower(scope, &pattern_type, &pattern.token.location)
                    .unwrap_or(IrType::opaque_ptr());
                let narrowed = BoundVar {
                    name: name.clone(),
                    type_: pattern_type.clone(),
                    ir_type: narrowed_ir,
                    value: scrutinee.value.clone(),
                    location: pattern.token.location.clone(),
                    is_global: false,
                };
                let _ = self
                    .scopes
                    .put_bound_variable(pattern_scope, name, narrowed);
            }

            let returns = self.check_block_statements(pattern_scope, ctx, &pattern.block);
            all_patterns_return &= returns;
            if !ctx.builder.current_block_terminated() {
                ctx.builder.br(&end_label);
            }

            ctx.builder.set_current_block(&next_label);
        }

        // the final fall-through block holds the else branch, if any
        let returns_else = match &when_block.else_block {
            Some(else_block) => {
                let else_scope = self.scopes.new_local_scope(scope);
                if let Some(name) = &scrutinee_name {
                    let original = BoundVar {
                        name: name.clone(),
                        ..scrutinee.clone()
                    };
                    let _ = self
                        .scopes
                        .put_bound_variable(else_scope, name, original);
                }
                let returns = self.check_block_statements(else_scope, ctx, else_block);
                if !ctx.builder.current_block_terminated() {
                    ctx.builder.br(&end_label);
                }
                returns
            }
            None => {
                // non-exhaustive matching without an else falls through;
                // runtime behavior when nothing matches is undefined
                ctx.builder.br(&end_label);
                false
            }
        };

        if !matched_any {
            self.status.error(
                location,
                "when block has no reachable patterns",
            );
        }

        ctx.builder.set_current_block(&end_label);
        let returns = all_patterns_return && returns_else && matched_any;
        if returns {
            ctx.builder.emit(crate::ir::Instruction::Unreachable);
        }
        returns
    }
}
