mod builtins;
mod callable;
mod coercions;
mod life;
mod patterns;
mod scope_setup;
mod type_instantiation;

pub use coercions::coerce;
pub use type_instantiation::{elaborate_type_ref, lower_type};

use log::debug;

use crate::diagnostics::Status;
use crate::ir::{FunctionBuilder, IrType, Value};
use crate::location::Location;
use crate::parser::ast;
use crate::scopes::{BoundVar, LoopContext, ScopeId, Scopes, UncheckedVar, UncheckedVarKind};
use crate::types::{
    eval, is_managed_type, type_id, type_nil, type_ref_to, type_void, Gensym, Type, TypeEnv,
    TypeMap, TypeRef,
};

use self::coercions::resolve_value;
use self::life::{emit_addref, Life, LifeForm};

/// Per-function emission context: the IR builder, the lifetime extents, and
/// the IR module the finished function belongs to.
pub struct FnContext {
    pub builder: FunctionBuilder,
    pub life: Life,
    pub ir_module: String,
}

/// The type checker / lowerer. Runs as a series of phases over the program
/// AST, resolving names through the scope arena and emitting typed IR one
/// function at a time.
pub struct Checker<'a> {
    pub program: &'a ast::Program,
    pub scopes: &'a mut Scopes,
    pub status: &'a mut Status,
    pub gensym: &'a mut Gensym,
    pub no_std_lib: bool,
    pub(crate) module_scopes: Vec<(String, ScopeId)>,
    pub(crate) link_functions: Vec<(ScopeId, ast::LinkFunction)>,
}

/// Run phases 0 through 3 over the program, emitting IR into the scopes'
/// IR modules.
pub fn type_check_program(
    program: &ast::Program,
    scopes: &mut Scopes,
    status: &mut Status,
    gensym: &mut Gensym,
    no_std_lib: bool,
) {
    builtins::install_base_types(scopes);
    builtins::install_runtime_builtins(scopes);

    let mut checker = Checker {
        program,
        scopes,
        status,
        gensym,
        no_std_lib,
        module_scopes: vec![],
        link_functions: vec![],
    };

    checker.scope_setup_program();
    if !checker.status.ok() {
        return;
    }

    checker.type_check_module_types();
    if !checker.status.ok() {
        return;
    }

    checker.type_check_module_links();
    checker.type_check_all_module_var_slots();
    checker.type_check_program_functions();

    if checker.status.ok() {
        checker.synthesize_entry_point();
    }
}

impl Checker<'_> {
    pub(crate) fn env(&self, scope: ScopeId) -> TypeEnv {
        self.scopes.type_env(scope)
    }

    /// Elaborate a type reference and substitute any type variables bound by
    /// the enclosing generic-substitution context.
    pub(crate) fn elaborate(
        &mut self,
        scope: ScopeId,
        type_ref: &ast::TypeRefExpr,
    ) -> Option<TypeRef> {
        let type_ = elaborate_type_ref(type_ref, scope, self.scopes, self.status, self.gensym)?;
        let bindings = self.scopes.type_bindings(scope);
        if bindings.is_empty() {
            return Some(type_);
        }
        Some(crate::types::rebind(&type_, &bindings))
    }

    /// Lower a type and intern the resulting bound type in program scope,
    /// keyed by signature. Interning is idempotent; a conflicting lowered
    /// representation for the same signature is a hard error.
    pub(crate) fn lower(
        &mut self,
        scope: ScopeId,
        type_: &TypeRef,
        location: &Location,
    ) -> Option<IrType> {
        let env = self.env(scope);
        let lowered = match lower_type(type_, &env) {
            Ok(ir) => ir,
            Err(message) => {
                self.status.error(location.clone(), message);
                return None;
            }
        };

        let (dimensions, name_index) = match full_eval(type_, &env).as_ref() {
            Type::Ptr { element } => match element.as_ref() {
                Type::Managed { element } => match element.as_ref() {
                    Type::Struct {
                        dimensions,
                        name_index,
                    } => (dimensions.clone(), name_index.clone()),
                    _ => (vec![], Default::default()),
                },
                _ => (vec![], Default::default()),
            },
            _ => (vec![], Default::default()),
        };

        if let Err(message) = self.scopes.upsert_bound_type(crate::scopes::BoundType {
            type_: type_.clone(),
            lowered: lowered.clone(),
            location: location.clone(),
            dimensions,
            name_index,
        }) {
            self.status.error(location.clone(), message);
            return None;
        }

        Some(lowered)
    }

    /// Bind every `link def` as an extern function in its module scope.
    fn type_check_module_links(&mut self) {
        let links = std::mem::take(&mut self.link_functions);
        'links: for (module_scope, link) in links {
            let decl = &link.decl;
            let mut params = vec![];
            let mut param_irs = vec![];
            for param in &decl.params {
                let Some(type_ref) = &param.type_ref else {
                    self.status.error(
                        param.token.location.clone(),
                        "externally linked functions need concrete parameter types",
                    );
                    continue 'links;
                };
                let Some(type_) = self.elaborate(module_scope, type_ref) else {
                    continue 'links;
                };
                if !type_.is_fully_bound() {
                    self.status.error(
                        param.token.location.clone(),
                        format!("extern parameter type {type_} is not fully bound"),
                    );
                    continue 'links;
                }
                let Some(ir) = self.lower(module_scope, &type_, &param.token.location) else {
                    continue 'links;
                };
                params.push(type_);
                param_irs.push(ir);
            }

            let ret = match &decl.return_type {
                Some(type_ref) => match self.elaborate(module_scope, type_ref) {
                    Some(type_) => type_,
                    None => continue,
                },
                None => type_void(),
            };
            let Some(ret_ir) = self.lower(module_scope, &ret, &decl.token.location) else {
                continue;
            };

            let type_ = crate::types::type_function(
                crate::types::type_args(params.clone(), Default::default()),
                ret.clone(),
            );
            let var = BoundVar {
                name: decl.name.clone(),
                type_,
                ir_type: IrType::Fn {
                    params: param_irs.clone(),
                    ret: Box::new(ret_ir.clone()),
                },
                value: Value::Global(decl.name.clone()),
                location: decl.token.location.clone(),
                is_global: true,
            };

            if let Err((message, previous)) =
                self.scopes.put_bound_variable(module_scope, &decl.name, var)
            {
                self.status.error(decl.token.location.clone(), message);
                self.status.info(previous, "previously declared here");
                continue;
            }

            if let Some(module_name) = self.scopes.module_name(module_scope) {
                self.scopes
                    .ir_module_mut(&module_name)
                    .declare_extern(&decl.name, param_irs, ret_ir);
            }
        }
    }

    /// Phase 2: every module-level var initializer is elaborated into the
    /// single program-scope `__init_module_vars` function; each variable
    /// becomes a program-owned global.
    fn type_check_all_module_var_slots(&mut self) {
        let builder = FunctionBuilder::new("__init_module_vars", vec![], IrType::Void);
        let mut ctx = FnContext {
            builder,
            life: Life::new(),
            ir_module: crate::scopes::PROGRAM_IR_MODULE.to_string(),
        };
        ctx.life.push(LifeForm::Function);

        for (index, module) in self.program.modules.iter().enumerate() {
            let module_scope = self.module_scopes[index].1;
            for var_decl in &module.var_decls {
                self.type_check_module_var_decl(module_scope, &mut ctx, var_decl);
            }
        }

        ctx.life.pop(&mut ctx.builder);
        ctx.builder.ret(None);
        let function = ctx.builder.finish();
        self.scopes
            .ir_module_mut(crate::scopes::PROGRAM_IR_MODULE)
            .functions
            .push(function);
    }

    fn type_check_module_var_decl(
        &mut self,
        module_scope: ScopeId,
        ctx: &mut FnContext,
        var_decl: &ast::VarDecl,
    ) {
        let Some(module_name) = self.scopes.module_name(module_scope) else {
            return;
        };
        debug!(
            "type checking module var '{module}.{name}'",
            module = module_name,
            name = var_decl.name
        );

        ctx.life.push(LifeForm::Statement);

        let initializer = var_decl.initializer.as_ref().and_then(|expr| {
            let var = self.check_expression(module_scope, ctx, expr)?;
            Some(resolve_value(&mut ctx.builder, var))
        });

        let declared = var_decl
            .type_ref
            .as_ref()
            .and_then(|type_ref| self.elaborate(module_scope, type_ref));

        let type_ = match (&declared, &initializer) {
            (Some(declared), _) => declared.clone(),
            (None, Some(initializer)) => initializer.type_.clone(),
            (None, None) => {
                ctx.life.pop(&mut ctx.builder);
                return;
            }
        };

        let Some(ir) = self.lower(module_scope, &type_, &var_decl.token.location) else {
            ctx.life.pop(&mut ctx.builder);
            return;
        };

        let global_name = format!("{module_name}.{}", var_decl.name);
        self.scopes
            .ir_module_mut(crate::scopes::PROGRAM_IR_MODULE)
            .globals
            .push(crate::ir::GlobalDecl {
                name: global_name.clone(),
                ty: ir.clone(),
                init: zero_value(&ir),
            });

        if let Some(initializer) = initializer {
            let env = self.env(module_scope);
            if let Some(coerced) = coerce(
                &mut ctx.builder,
                self.status,
                &var_decl.token.location,
                initializer,
                &type_,
                &env,
            ) {
                if is_managed_type(&type_, &env) {
                    emit_addref(&mut ctx.builder, coerced.value.clone());
                }
                ctx.builder
                    .store(ir.clone(), coerced.value, Value::Global(global_name.clone()));
            }
        }

        let var = BoundVar {
            name: var_decl.name.clone(),
            type_: type_ref_to(type_),
            ir_type: ir,
            value: Value::Global(global_name),
            location: var_decl.token.location.clone(),
            is_global: true,
        };
        if let Err((message, previous)) =
            self.scopes
                .put_bound_variable(module_scope, &var_decl.name, var)
        {
            self.status
                .error(var_decl.token.location.clone(), message);
            self.status.info(previous, "previously declared here");
        }

        ctx.life.pop(&mut ctx.builder);
    }

    /// Phase 3: elaborate every non-generic module-level function. Generic
    /// ones wait for a concrete callsite to force an instantiation.
    fn type_check_program_functions(&mut self) {
        for index in 0..self.scopes.unchecked_vars.len() {
            let unchecked = self.scopes.unchecked_vars[index].clone();
            let UncheckedVarKind::Function(defn) = &unchecked.kind else {
                continue;
            };

            let Some((params, ret)) =
                self.elaborate_function_decl(unchecked.module_scope, &defn.decl)
            else {
                continue;
            };
            let generic = params.iter().any(|param| !param.is_fully_bound())
                || !ret.is_fully_bound();
            if generic {
                debug!(
                    "skipping generic function '{name}' until a callsite instantiates it",
                    name = unchecked.name
                );
                continue;
            }

            if let Some(var) = self.instantiate_function(
                unchecked.module_scope,
                defn,
                params,
                ret,
                TypeMap::new(),
            ) {
                if let Err((message, previous)) =
                    self.scopes
                        .put_bound_variable(unchecked.module_scope, &unchecked.name, var)
                {
                    self.status.error(unchecked.location.clone(), message);
                    self.status.info(previous, "previously declared here");
                }
            }
        }
    }

    /// Without `NO_STD_LIB`, the runtime owns `main`: the synthesized entry
    /// point initializes module vars and then calls the renamed user main.
    fn synthesize_entry_point(&mut self) {
        if self.no_std_lib {
            return;
        }
        let Some(user_main) = self.scopes.get_instantiation_by_name("user/main") else {
            return;
        };

        let mut builder = FunctionBuilder::new("main", vec![], IrType::I64);
        builder.call(IrType::Void, "__init_module_vars", vec![]);

        let ret = crate::types::get_function_return_type(&user_main.type_);
        match ret {
            Some(ret) if !ret.is_void() => {
                let result = builder.call(IrType::I64, "user/main", vec![]);
                builder.ret(Some((IrType::I64, result)));
            }
            _ => {
                builder.call(IrType::Void, "user/main", vec![]);
                builder.ret(Some((IrType::I64, Value::Int(0))));
            }
        }

        let function = builder.finish();
        self.scopes
            .ir_module_mut(crate::scopes::PROGRAM_IR_MODULE)
            .functions
            .push(function);
    }

    /// Check a block's statements in a fresh local scope. Returns whether
    /// every control path through the block returns.
    pub(crate) fn check_block_statements(
        &mut self,
        parent: ScopeId,
        ctx: &mut FnContext,
        block: &ast::Block,
    ) -> bool {
        let scope = self.scopes.new_local_scope(parent);
        ctx.life.push(LifeForm::Block);

        let mut returns = false;
        for statement in &block.statements {
            returns |= self.check_statement(scope, ctx, statement);
        }

        if returns {
            // the return already unwound through this frame
            ctx.life.discard();
        } else {
            ctx.life.pop(&mut ctx.builder);
        }
        returns
    }

    fn check_statement(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        statement: &ast::Statement,
    ) -> bool {
        match statement {
            ast::Statement::VarDecl(var_decl) => {
                let _ = self.check_var_decl(scope, ctx, var_decl, LifeForm::Block);
                false
            }
            ast::Statement::Assignment(assignment) => {
                self.check_assignment(scope, ctx, assignment);
                false
            }
            ast::Statement::If(if_block) => self.check_if(scope, ctx, if_block),
            ast::Statement::While(while_block) => {
                self.check_while(scope, ctx, while_block);
                false
            }
            ast::Statement::For(for_block) => {
                self.check_for(scope, ctx, for_block);
                false
            }
            ast::Statement::When(when_block) => self.check_when(scope, ctx, when_block),
            ast::Statement::Return(ret) => {
                self.check_return(scope, ctx, ret);
                true
            }
            ast::Statement::Break { token } => {
                match self.scopes.nearest_loop(scope) {
                    Some(LoopContext { break_label, .. }) => {
                        ctx.life.release_to(LifeForm::Loop, &mut ctx.builder);
                        ctx.builder.br(&break_label);
                    }
                    None => {
                        self.status
                            .error(token.location.clone(), "break outside of a loop");
                    }
                }
                false
            }
            ast::Statement::Continue { token } => {
                match self.scopes.nearest_loop(scope) {
                    Some(LoopContext { continue_label, .. }) => {
                        ctx.life.release_to(LifeForm::Loop, &mut ctx.builder);
                        ctx.builder.br(&continue_label);
                    }
                    None => {
                        self.status
                            .error(token.location.clone(), "continue outside of a loop");
                    }
                }
                false
            }
            ast::Statement::Pass { .. } => false,
            ast::Statement::FunctionDefn(defn) => {
                self.check_nested_function(scope, ctx, defn);
                false
            }
            ast::Statement::TypeDef(type_def) => {
                self.check_local_type_def(scope, type_def);
                false
            }
            ast::Statement::Expression(expr) => {
                ctx.life.push(LifeForm::Statement);
                let _ = self.check_expression(scope, ctx, expr);
                ctx.life.pop(&mut ctx.builder);
                false
            }
        }
    }

    pub(crate) fn check_var_decl(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        var_decl: &ast::VarDecl,
        form: LifeForm,
    ) -> Option<BoundVar> {
        ctx.life.push(LifeForm::Statement);
        let result = self.check_var_decl_inner(scope, ctx, var_decl, form);
        ctx.life.pop(&mut ctx.builder);
        result
    }

    fn check_var_decl_inner(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        var_decl: &ast::VarDecl,
        form: LifeForm,
    ) -> Option<BoundVar> {
        let initializer = match &var_decl.initializer {
            Some(expr) => {
                let var = self.check_expression(scope, ctx, expr)?;
                Some(resolve_value(&mut ctx.builder, var))
            }
            None => None,
        };

        let declared = match &var_decl.type_ref {
            Some(type_ref) => Some(self.elaborate(scope, type_ref)?),
            None => None,
        };

        let type_ = match (&declared, &initializer) {
            (Some(declared), _) => declared.clone(),
            (None, Some(initializer)) => initializer.type_.clone(),
            (None, None) => return None,
        };

        let location = &var_decl.token.location;
        let ir = self.lower(scope, &type_, location)?;
        let slot = ctx.builder.alloca(ir.clone(), var_decl.name.clone());

        let env = self.env(scope);
        match initializer {
            Some(initializer) => {
                let coerced = coerce(
                    &mut ctx.builder,
                    self.status,
                    location,
                    initializer,
                    &type_,
                    &env,
                )?;
                if is_managed_type(&type_, &env) {
                    emit_addref(&mut ctx.builder, coerced.value.clone());
                }
                ctx.builder.store(ir.clone(), coerced.value, slot.clone());
            }
            None => {
                ctx.builder
                    .store(ir.clone(), zero_value(&ir), slot.clone());
            }
        }

        if is_managed_type(&type_, &env) {
            ctx.life.track_slot(form, slot.clone(), ir.clone());
        }

        let var = BoundVar {
            name: var_decl.name.clone(),
            type_: type_ref_to(type_),
            ir_type: ir,
            value: slot,
            location: location.clone(),
            is_global: false,
        };
        if let Err((message, previous)) =
            self.scopes
                .put_bound_variable(scope, &var_decl.name, var.clone())
        {
            self.status.error(location.clone(), message);
            self.status.info(previous, "previously declared here");
            return None;
        }
        Some(var)
    }

    fn check_assignment(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        assignment: &ast::Assignment,
    ) {
        ctx.life.push(LifeForm::Statement);
        let _ = self.check_assignment_inner(scope, ctx, assignment);
        ctx.life.pop(&mut ctx.builder);
    }

    fn check_assignment_inner(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        assignment: &ast::Assignment,
    ) -> Option<()> {
        // indexed assignment goes through the runtime's __setitem__
        if let (ast::Expr::Index(index), ast::AssignOp::Assign) =
            (&assignment.lhs, &assignment.op)
        {
            let lhs = self.check_expression(scope, ctx, &index.lhs)?;
            let lhs = resolve_value(&mut ctx.builder, lhs);
            let idx = self.check_expression(scope, ctx, &index.index)?;
            let idx = resolve_value(&mut ctx.builder, idx);
            let rhs = self.check_expression(scope, ctx, &assignment.rhs)?;
            let rhs = resolve_value(&mut ctx.builder, rhs);
            self.resolve_function_call(
                scope,
                scope,
                ctx,
                "__setitem__",
                vec![lhs, idx, rhs],
                &assignment.token.location,
            )?;
            return Some(());
        }

        let rhs = self.check_expression(scope, ctx, &assignment.rhs)?;
        let rhs = resolve_value(&mut ctx.builder, rhs);

        let lvalue = self.check_lvalue(scope, ctx, &assignment.lhs)?;
        let env = self.env(scope);

        let value = match assignment.op.function_name() {
            None => {
                coerce(
                    &mut ctx.builder,
                    self.status,
                    &assignment.token.location,
                    rhs,
                    &lvalue.element,
                    &env,
                )?
                .value
            }
            Some(function_name) => {
                let current = ctx
                    .builder
                    .load(lvalue.element_ir.clone(), lvalue.address.clone());
                let current_var = BoundVar {
                    name: String::new(),
                    type_: lvalue.element.clone(),
                    ir_type: lvalue.element_ir.clone(),
                    value: current,
                    location: assignment.token.location.clone(),
                    is_global: false,
                };
                let result = self.resolve_function_call(
                    scope,
                    scope,
                    ctx,
                    function_name,
                    vec![current_var, rhs],
                    &assignment.token.location,
                )?;
                coerce(
                    &mut ctx.builder,
                    self.status,
                    &assignment.token.location,
                    result,
                    &lvalue.element,
                    &env,
                )?
                .value
            }
        };

        if is_managed_type(&lvalue.element, &env) {
            emit_addref(&mut ctx.builder, value.clone());
            let old = ctx
                .builder
                .load(lvalue.element_ir.clone(), lvalue.address.clone());
            ctx.builder.call(
                IrType::Void,
                "__release_var",
                vec![(IrType::opaque_ptr(), old)],
            );
        }

        ctx.builder
            .store(lvalue.element_ir, value, lvalue.address);
        Some(())
    }

    fn check_lvalue(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        expr: &ast::Expr,
    ) -> Option<Lvalue> {
        match expr {
            ast::Expr::Reference { token } => {
                let Some(var) = self.scopes.get_bound_variable(scope, &token.text) else {
                    self.status.error(
                        token.location.clone(),
                        format!("undefined symbol '{}'", token.text),
                    );
                    return None;
                };
                let Type::Ref { element } = var.type_.as_ref() else {
                    self.status.error(
                        token.location.clone(),
                        format!("'{}' cannot be assigned to; it is not a mutable slot", token.text),
                    );
                    return None;
                };
                Some(Lvalue {
                    address: var.value.clone(),
                    element: element.clone(),
                    element_ir: var.ir_type,
                })
            }
            ast::Expr::Dot(dot) => {
                let member = self.check_dot_expr(scope, ctx, dot)?;
                let Type::Ref { element } = member.type_.as_ref() else {
                    self.status.error(
                        dot.token.location.clone(),
                        "this expression cannot be assigned to",
                    );
                    return None;
                };
                Some(Lvalue {
                    address: member.value.clone(),
                    element: element.clone(),
                    element_ir: member.ir_type,
                })
            }
            other => {
                self.status.error(
                    other.location(),
                    "invalid left-hand side of an assignment",
                );
                None
            }
        }
    }

    fn check_if(&mut self, scope: ScopeId, ctx: &mut FnContext, if_block: &ast::IfBlock) -> bool {
        let Some((cond, narrowing)) = self.check_condition(scope, ctx, &if_block.condition)
        else {
            return false;
        };

        let then_label = ctx.builder.add_block("then");
        let else_label = ctx.builder.add_block("else");
        let end_label = ctx.builder.add_block("end");
        ctx.builder.cond_br(cond, &then_label, &else_label);

        ctx.builder.set_current_block(&then_label);
        let then_scope = self.scopes.new_local_scope(scope);
        if let Some((name, var)) = narrowing {
            let _ = self.scopes.put_bound_variable(then_scope, &name, var);
        }
        let returns_then = self.check_block_statements(then_scope, ctx, &if_block.block);
        if !ctx.builder.current_block_terminated() {
            ctx.builder.br(&end_label);
        }

        ctx.builder.set_current_block(&else_label);
        let returns_else = match &if_block.else_ {
            None => {
                ctx.builder.br(&end_label);
                false
            }
            Some(ast::ElseBranch::Elif(elif)) => {
                let returns = self.check_if(scope, ctx, elif);
                if !ctx.builder.current_block_terminated() {
                    ctx.builder.br(&end_label);
                }
                returns
            }
            Some(ast::ElseBranch::Block(block)) => {
                let returns = self.check_block_statements(scope, ctx, block);
                if !ctx.builder.current_block_terminated() {
                    ctx.builder.br(&end_label);
                }
                returns
            }
        };

        ctx.builder.set_current_block(&end_label);
        let returns = returns_then && returns_else;
        if returns {
            ctx.builder.emit(crate::ir::Instruction::Unreachable);
        }
        returns
    }

    fn check_while(&mut self, scope: ScopeId, ctx: &mut FnContext, while_block: &ast::WhileBlock) {
        let cond_label = ctx.builder.add_block("while.cond");
        let body_label = ctx.builder.add_block("while.body");
        let end_label = ctx.builder.add_block("while.end");

        ctx.builder.br(&cond_label);
        ctx.builder.set_current_block(&cond_label);

        let Some((cond, narrowing)) =
            self.check_condition(scope, ctx, &while_block.condition)
        else {
            return;
        };
        ctx.builder.cond_br(cond, &body_label, &end_label);

        let loop_scope = self.scopes.new_loop_scope(
            scope,
            LoopContext {
                continue_label: cond_label.clone(),
                break_label: end_label.clone(),
            },
        );
        if let Some((name, var)) = narrowing {
            let _ = self.scopes.put_bound_variable(loop_scope, &name, var);
        }

        ctx.life.push(LifeForm::Loop);
        ctx.builder.set_current_block(&body_label);
        self.check_block_statements(loop_scope, ctx, &while_block.block);
        if !ctx.builder.current_block_terminated() {
            ctx.builder.br(&cond_label);
        }

        ctx.builder.set_current_block(&end_label);
        ctx.life.pop(&mut ctx.builder);
    }

    /// `for x in xs` drives the runtime iteration protocol: `__iter__` once,
    /// then `__next__` until it yields nil.
    fn check_for(&mut self, scope: ScopeId, ctx: &mut FnContext, for_block: &ast::ForBlock) {
        ctx.life.push(LifeForm::Statement);
        let iterable = self.check_expression(scope, ctx, &for_block.iterable);
        let iterable = iterable.map(|var| resolve_value(&mut ctx.builder, var));
        ctx.life.pop(&mut ctx.builder);
        let Some(iterable) = iterable else {
            return;
        };

        let location = for_block.token.location.clone();
        let Some(iterator) =
            self.resolve_function_call(scope, scope, ctx, "__iter__", vec![iterable], &location)
        else {
            return;
        };

        let cond_label = ctx.builder.add_block("for.cond");
        let body_label = ctx.builder.add_block("for.body");
        let end_label = ctx.builder.add_block("for.end");

        ctx.builder.br(&cond_label);
        ctx.builder.set_current_block(&cond_label);

        let Some(next) = self.resolve_function_call(
            scope,
            scope,
            ctx,
            "__next__",
            vec![iterator.clone()],
            &location,
        ) else {
            return;
        };

        let Type::Maybe { just } = eval(&next.type_, &self.env(scope)).as_ref().clone() else {
            self.status.error(
                location,
                format!("__next__ must return a maybe, not {}", next.type_),
            );
            return;
        };

        let cond = ctx.builder.call(
            IrType::I1,
            "__not_nil__",
            vec![(next.ir_type.clone(), next.value.clone())],
        );
        ctx.builder.cond_br(cond, &body_label, &end_label);

        let loop_scope = self.scopes.new_loop_scope(
            scope,
            LoopContext {
                continue_label: cond_label.clone(),
                break_label: end_label.clone(),
            },
        );

        ctx.builder.set_current_block(&body_label);

        // bind the loop variable to the unwrapped element
        let env = self.env(scope);
        let narrowed = coerce(
            &mut ctx.builder,
            self.status,
            &for_block.var_token.location,
            next,
            &just,
            &env,
        );
        if let Some(narrowed) = narrowed {
            let var = BoundVar {
                name: for_block.var_token.text.clone(),
                location: for_block.var_token.location.clone(),
                ..narrowed
            };
            let _ = self
                .scopes
                .put_bound_variable(loop_scope, &for_block.var_token.text, var);
        }

        ctx.life.push(LifeForm::Loop);
        self.check_block_statements(loop_scope, ctx, &for_block.block);
        if !ctx.builder.current_block_terminated() {
            ctx.builder.br(&cond_label);
        }

        ctx.builder.set_current_block(&end_label);
        ctx.life.pop(&mut ctx.builder);
    }

    fn check_return(&mut self, scope: ScopeId, ctx: &mut FnContext, ret: &ast::ReturnStatement) {
        ctx.life.push(LifeForm::Statement);

        let value = match &ret.expr {
            Some(expr) => {
                let Some(var) = self.check_expression(scope, ctx, expr) else {
                    ctx.life.pop(&mut ctx.builder);
                    return;
                };
                Some(resolve_value(&mut ctx.builder, var))
            }
            None => None,
        };

        let constraint = self.scopes.get_return_type_constraint(scope);
        let env = self.env(scope);

        let final_value = match (value, constraint) {
            (None, None) => {
                self.scopes.set_return_type_constraint(scope, type_void());
                None
            }
            (None, Some(constraint)) => {
                if !constraint.is_void() {
                    self.status.error(
                        ret.token.location.clone(),
                        format!("this function returns {constraint}, not void"),
                    );
                }
                None
            }
            (Some(var), None) => {
                self.scopes
                    .set_return_type_constraint(scope, var.type_.clone());
                Some(var)
            }
            (Some(var), Some(constraint)) => coerce(
                &mut ctx.builder,
                self.status,
                &ret.token.location,
                var,
                &constraint,
                &env,
            ),
        };

        match final_value {
            Some(var) => {
                // the returned value transfers to the caller; everything
                // else unwinds
                ctx.life.untrack(&var.value);
                ctx.life.release_to(LifeForm::Function, &mut ctx.builder);
                ctx.builder.ret(Some((var.ir_type, var.value)));
            }
            None => {
                ctx.life.release_to(LifeForm::Function, &mut ctx.builder);
                ctx.builder.ret(None);
            }
        }
        ctx.life.discard();
    }

    fn check_nested_function(
        &mut self,
        scope: ScopeId,
        _ctx: &mut FnContext,
        defn: &ast::FunctionDefn,
    ) {
        self.scopes.add_unchecked_var(
            scope,
            UncheckedVar {
                name: defn.decl.name.clone(),
                location: defn.decl.token.location.clone(),
                module_scope: scope,
                kind: UncheckedVarKind::Function(defn.clone()),
            },
        );
    }

    fn check_local_type_def(&mut self, scope: ScopeId, type_def: &ast::TypeDef) {
        match &type_def.algebra {
            ast::TypeAlgebra::Alias { type_ref, .. } => {
                if let Some(type_) = self.elaborate(scope, type_ref) {
                    self.scopes
                        .put_typename(scope, &type_def.name.text, type_);
                }
            }
            _ => {
                self.status.error(
                    type_def.token.location.clone(),
                    "type definitions inside functions must be aliases",
                );
            }
        }
    }

    /// Evaluate a condition to an `i1`, producing the then-branch narrowing
    /// binding when the condition names a maybe-typed value.
    pub(crate) fn check_condition(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        condition: &ast::Condition,
    ) -> Option<(Value, Option<(String, BoundVar)>)> {
        match condition {
            ast::Condition::Expression(ast::Expr::Reference { token }) => {
                let var = self.check_expression(
                    scope,
                    ctx,
                    &ast::Expr::Reference {
                        token: token.clone(),
                    },
                )?;
                let loaded = resolve_value(&mut ctx.builder, var);
                self.condition_of_value(scope, ctx, loaded, Some(token.text.clone()), &token.location)
            }
            ast::Condition::Expression(expr) => {
                let var = self.check_expression(scope, ctx, expr)?;
                let loaded = resolve_value(&mut ctx.builder, var);
                self.condition_of_value(scope, ctx, loaded, None, &expr.location())
            }
            ast::Condition::VarDecl(var_decl) => {
                let initializer = var_decl.initializer.as_ref()?;
                let var = self.check_expression(scope, ctx, initializer)?;
                let loaded = resolve_value(&mut ctx.builder, var);
                let loaded = match &var_decl.type_ref {
                    Some(type_ref) => {
                        let declared = self.elaborate(scope, type_ref)?;
                        let env = self.env(scope);
                        coerce(
                            &mut ctx.builder,
                            self.status,
                            &var_decl.token.location,
                            loaded,
                            &declared,
                            &env,
                        )?
                    }
                    None => loaded,
                };
                self.condition_of_value(
                    scope,
                    ctx,
                    loaded,
                    Some(var_decl.name.clone()),
                    &var_decl.token.location,
                )
            }
        }
    }

    fn condition_of_value(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        value: BoundVar,
        name: Option<String>,
        location: &Location,
    ) -> Option<(Value, Option<(String, BoundVar)>)> {
        let env = self.env(scope);
        let evaluated = eval(&value.type_, &env);

        if matches!(evaluated.as_ref(), Type::Maybe { .. }) {
            // eliminating the false (nil) side of a maybe leaves the payload
            let narrowed_type =
                crate::types::boolean_refinement(&evaluated, false, &env)?;
            let cond = ctx.builder.call(
                IrType::I1,
                "__not_nil__",
                vec![(value.ir_type.clone(), value.value.clone())],
            );
            let narrowing = match name {
                Some(name) => {
                    let narrowed = coerce(
                        &mut ctx.builder,
                        self.status,
                        location,
                        value,
                        &narrowed_type,
                        &env,
                    )?;
                    let narrowed = BoundVar {
                        name: name.clone(),
                        ..narrowed
                    };
                    Some((name, narrowed))
                }
                None => None,
            };
            return Some((cond, narrowing));
        }

        let binding = name.map(|name| {
            (
                name.clone(),
                BoundVar {
                    name,
                    ..value.clone()
                },
            )
        });

        let cond = self.truthiness(scope, ctx, value, location)?;
        Some((cond, binding))
    }

    /// Lower a non-maybe value to an `i1`: bools directly, pointers by nil
    /// check, otherwise via a `__bool__` overload if one exists.
    fn truthiness(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        value: BoundVar,
        location: &Location,
    ) -> Option<Value> {
        let env = self.env(scope);

        if crate::types::is_type_id(&value.type_, "bool")
            || crate::types::is_type_id(&value.type_, "true")
            || crate::types::is_type_id(&value.type_, "false")
        {
            return Some(value.value);
        }

        if value.type_.is_nil() || crate::types::is_ptr(&value.type_, &env) {
            return Some(ctx.builder.call(
                IrType::I1,
                "__not_nil__",
                vec![(value.ir_type, value.value)],
            ));
        }

        if !self.scopes.get_callables(scope, "__bool__").is_empty() {
            let type_ = value.type_.clone();
            if let Some(result) =
                self.resolve_function_call(scope, scope, ctx, "__bool__", vec![value], location)
            {
                return Some(result.value);
            }
            self.status.info(
                location.clone(),
                format!("while looking for a __bool__ overload for {type_}"),
            );
            return None;
        }

        self.status.error(
            location.clone(),
            format!("cannot branch on a value of type {}", value.type_),
        );
        None
    }

    pub(crate) fn check_expression(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        expr: &ast::Expr,
    ) -> Option<BoundVar> {
        match expr {
            ast::Expr::Literal { token } => self.check_literal(scope, token),
            ast::Expr::Reference { token } => self.check_reference(scope, ctx, token),
            ast::Expr::Prefix(prefix) => {
                let rhs = self.check_expression(scope, ctx, &prefix.rhs)?;
                let rhs = resolve_value(&mut ctx.builder, rhs);
                let function_name = match prefix.op {
                    ast::PrefixOp::Not => "__not__",
                    ast::PrefixOp::Minus => "__negative__",
                    ast::PrefixOp::Plus => "__positive__",
                };
                self.resolve_function_call(
                    scope,
                    scope,
                    ctx,
                    function_name,
                    vec![rhs],
                    &prefix.token.location,
                )
            }
            ast::Expr::Binary(binary) => self.check_binary(scope, ctx, binary),
            ast::Expr::Ternary(ternary) => self.check_ternary(scope, ctx, ternary),
            ast::Expr::Dot(dot) => self.check_dot_expr(scope, ctx, dot),
            ast::Expr::Index(index) => {
                let lhs = self.check_expression(scope, ctx, &index.lhs)?;
                let lhs = resolve_value(&mut ctx.builder, lhs);
                let idx = self.check_expression(scope, ctx, &index.index)?;
                let idx = resolve_value(&mut ctx.builder, idx);
                self.resolve_function_call(
                    scope,
                    scope,
                    ctx,
                    "__getitem__",
                    vec![lhs, idx],
                    &index.token.location,
                )
            }
            ast::Expr::Callsite(callsite) => self.check_callsite(scope, ctx, callsite),
            ast::Expr::Tuple(tuple) => self.check_tuple(scope, ctx, tuple),
            ast::Expr::ArrayLiteral(array) => self.check_array_literal(scope, ctx, array),
            ast::Expr::Cast(cast) => {
                let var = self.check_expression(scope, ctx, &cast.expr)?;
                let var = resolve_value(&mut ctx.builder, var);
                let target = self.elaborate(scope, &cast.type_ref)?;
                let env = self.env(scope);
                coerce(
                    &mut ctx.builder,
                    self.status,
                    &cast.token.location,
                    var,
                    &target,
                    &env,
                )
            }
            ast::Expr::Sizeof(sizeof) => {
                let type_ = self.elaborate(scope, &sizeof.type_ref)?;
                if !type_.is_fully_bound() {
                    self.status.error(
                        sizeof.token.location.clone(),
                        format!("sizeof needs a fully bound type, not {type_}"),
                    );
                    return None;
                }
                let ir = self.lower(scope, &type_, &sizeof.token.location)?;
                Some(BoundVar {
                    name: String::new(),
                    type_: type_id("int", sizeof.token.location.clone()),
                    ir_type: IrType::I64,
                    value: Value::Int(ir.size_in_bytes() as i64),
                    location: sizeof.token.location.clone(),
                    is_global: false,
                })
            }
            ast::Expr::Typeid(typeid) => {
                let var = self.check_expression(scope, ctx, &typeid.expr)?;
                let var = resolve_value(&mut ctx.builder, var);
                let raw = ctx.builder.call(
                    IrType::I32,
                    "__get_var_type_id",
                    vec![(var.ir_type, var.value)],
                );
                let widened =
                    ctx.builder
                        .cast(crate::ir::CastOp::Sext, raw, IrType::I32, IrType::I64);
                Some(BoundVar {
                    name: String::new(),
                    type_: type_id("int", typeid.token.location.clone()),
                    ir_type: IrType::I64,
                    value: widened,
                    location: typeid.token.location.clone(),
                    is_global: false,
                })
            }
            ast::Expr::FunctionDefn(defn) => self.check_function_literal(scope, ctx, defn),
        }
    }

    fn check_literal(&mut self, _scope: ScopeId, token: &crate::lexer::Token) -> Option<BoundVar> {
        use crate::lexer::TokenKind;

        let location = token.location.clone();
        let (type_, ir_type, value) = match token.kind {
            TokenKind::IntegerLiteral => match token.text.parse::<i64>() {
                Ok(v) => (
                    type_id("int", location.clone()),
                    IrType::I64,
                    Value::Int(v),
                ),
                Err(_) => {
                    self.status.error(
                        location,
                        format!("integer literal '{}' does not fit in 64 bits", token.text),
                    );
                    return None;
                }
            },
            TokenKind::FloatLiteral => match token.text.parse::<f64>() {
                Ok(v) => (
                    type_id("float", location.clone()),
                    IrType::F64,
                    Value::Float(v),
                ),
                Err(_) => {
                    self.status
                        .error(location, format!("bad float literal '{}'", token.text));
                    return None;
                }
            },
            TokenKind::StringLiteral => match unescape::unescape(&token.text) {
                Some(text) => (
                    type_id("str", location.clone()),
                    IrType::Str,
                    Value::Str(text),
                ),
                None => {
                    self.status.error(
                        location,
                        format!("bad escape sequence in string literal \"{}\"", token.text),
                    );
                    return None;
                }
            },
            TokenKind::CharLiteral => {
                let Some(text) = unescape::unescape(&token.text) else {
                    self.status.error(
                        location,
                        format!("bad escape sequence in char literal '{}'", token.text),
                    );
                    return None;
                };
                let mut chars = text.chars();
                let (Some(c), None) = (chars.next(), chars.next()) else {
                    self.status.error(
                        location,
                        format!("char literal '{}' must be a single character", token.text),
                    );
                    return None;
                };
                (
                    type_id("char", location.clone()),
                    IrType::I8,
                    Value::Int(c as i64),
                )
            }
            TokenKind::AtomLiteral => (
                type_id("atom", location.clone()),
                IrType::Str,
                Value::Str(token.text.clone()),
            ),
            TokenKind::Nil => (type_nil(), IrType::opaque_ptr(), Value::Null),
            TokenKind::True => (
                type_id("bool", location.clone()),
                IrType::I1,
                Value::Bool(true),
            ),
            TokenKind::False => (
                type_id("bool", location.clone()),
                IrType::I1,
                Value::Bool(false),
            ),
            _ => {
                self.status
                    .error(location, format!("unexpected literal {token}"));
                return None;
            }
        };

        Some(BoundVar {
            name: String::new(),
            type_,
            ir_type,
            value,
            location: token.location.clone(),
            is_global: false,
        })
    }

    fn check_reference(
        &mut self,
        scope: ScopeId,
        _ctx: &mut FnContext,
        token: &crate::lexer::Token,
    ) -> Option<BoundVar> {
        let name = &token.text;
        let vars = self.scopes.get_bound_variables(scope, name);
        match vars.len() {
            1 => return vars.into_iter().next(),
            0 => {}
            _ => {
                self.status.error(
                    token.location.clone(),
                    format!("reference to '{name}' is ambiguous between its overloads"),
                );
                return None;
            }
        }

        // a bare reference to a not-yet-elaborated function
        let callables = self.scopes.get_callables(scope, name);
        for callable in callables {
            if let crate::scopes::Callable::Unchecked(index) = callable {
                let unchecked = self.scopes.unchecked_vars[index].clone();
                if let UncheckedVarKind::Function(defn) = &unchecked.kind {
                    let (params, ret) =
                        self.elaborate_function_decl(unchecked.module_scope, &defn.decl)?;
                    if params.iter().all(|p| p.is_fully_bound()) && ret.is_fully_bound() {
                        return self.instantiate_function(
                            unchecked.module_scope,
                            defn,
                            params,
                            ret,
                            TypeMap::new(),
                        );
                    }
                }
            }
        }

        self.status.error(
            token.location.clone(),
            format!("undefined symbol '{name}'"),
        );
        None
    }

    fn check_binary(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        binary: &ast::BinaryExpr,
    ) -> Option<BoundVar> {
        match binary.op {
            ast::BinaryOp::And | ast::BinaryOp::Or => {
                return self.check_short_circuit(scope, ctx, binary)
            }
            ast::BinaryOp::Equal | ast::BinaryOp::Inequal => {
                // nil comparisons compile to a null check
                let lhs_is_nil = matches!(
                    &binary.lhs,
                    ast::Expr::Literal { token } if token.kind == crate::lexer::TokenKind::Nil
                );
                let rhs_is_nil = matches!(
                    &binary.rhs,
                    ast::Expr::Literal { token } if token.kind == crate::lexer::TokenKind::Nil
                );
                if lhs_is_nil || rhs_is_nil {
                    return self.check_nil_comparison(scope, ctx, binary, lhs_is_nil && rhs_is_nil);
                }
            }
            _ => {}
        }

        let lhs = self.check_expression(scope, ctx, &binary.lhs)?;
        let lhs = resolve_value(&mut ctx.builder, lhs);
        let rhs = self.check_expression(scope, ctx, &binary.rhs)?;
        let rhs = resolve_value(&mut ctx.builder, rhs);

        match binary.op {
            ast::BinaryOp::NotIn => {
                let contained = self.resolve_function_call(
                    scope,
                    scope,
                    ctx,
                    "__in__",
                    vec![lhs, rhs],
                    &binary.token.location,
                )?;
                self.resolve_function_call(
                    scope,
                    scope,
                    ctx,
                    "__not__",
                    vec![contained],
                    &binary.token.location,
                )
            }
            op => self.resolve_function_call(
                scope,
                scope,
                ctx,
                op.function_name(),
                vec![lhs, rhs],
                &binary.token.location,
            ),
        }
    }

    fn check_nil_comparison(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        binary: &ast::BinaryExpr,
        both_nil: bool,
    ) -> Option<BoundVar> {
        let location = binary.token.location.clone();
        let bool_type = type_id("bool", location.clone());

        if both_nil {
            return Some(BoundVar {
                name: String::new(),
                type_: bool_type,
                ir_type: IrType::I1,
                value: Value::Bool(binary.op == ast::BinaryOp::Equal),
                location,
                is_global: false,
            });
        }

        let other = if matches!(
            &binary.lhs,
            ast::Expr::Literal { token } if token.kind == crate::lexer::TokenKind::Nil
        ) {
            &binary.rhs
        } else {
            &binary.lhs
        };

        let value = self.check_expression(scope, ctx, other)?;
        let value = resolve_value(&mut ctx.builder, value);

        let env = self.env(scope);
        let evaluated = eval(&value.type_, &env);
        if !matches!(evaluated.as_ref(), Type::Maybe { .. })
            && !crate::types::is_ptr(&value.type_, &env)
            && !value.type_.is_nil()
        {
            self.status.error(
                location,
                format!("cannot compare a value of type {} to nil", value.type_),
            );
            return None;
        }

        let not_nil = ctx.builder.call(
            IrType::I1,
            "__not_nil__",
            vec![(value.ir_type, value.value)],
        );
        let result = if binary.op == ast::BinaryOp::Equal {
            ctx.builder
                .call(IrType::I1, "__not__", vec![(IrType::I1, not_nil)])
        } else {
            not_nil
        };

        Some(BoundVar {
            name: String::new(),
            type_: bool_type,
            ir_type: IrType::I1,
            value: result,
            location,
            is_global: false,
        })
    }

    fn check_short_circuit(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        binary: &ast::BinaryExpr,
    ) -> Option<BoundVar> {
        let location = binary.token.location.clone();

        let lhs = self.check_expression(scope, ctx, &binary.lhs)?;
        let lhs = resolve_value(&mut ctx.builder, lhs);
        let lhs_value = self.truthiness(scope, ctx, lhs, &location)?;

        let slot = ctx.builder.alloca(IrType::I1, "short_circuit");
        ctx.builder
            .store(IrType::I1, lhs_value.clone(), slot.clone());

        let rhs_label = ctx.builder.add_block("rhs");
        let end_label = ctx.builder.add_block("end");

        match binary.op {
            ast::BinaryOp::And => ctx.builder.cond_br(lhs_value, &rhs_label, &end_label),
            _ => ctx.builder.cond_br(lhs_value, &end_label, &rhs_label),
        }

        ctx.builder.set_current_block(&rhs_label);
        let rhs = self.check_expression(scope, ctx, &binary.rhs)?;
        let rhs = resolve_value(&mut ctx.builder, rhs);
        let rhs_value = self.truthiness(scope, ctx, rhs, &location)?;
        ctx.builder.store(IrType::I1, rhs_value, slot.clone());
        ctx.builder.br(&end_label);

        ctx.builder.set_current_block(&end_label);
        let result = ctx.builder.load(IrType::I1, slot);

        Some(BoundVar {
            name: String::new(),
            type_: type_id("bool", location.clone()),
            ir_type: IrType::I1,
            value: result,
            location,
            is_global: false,
        })
    }

    fn check_ternary(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        ternary: &ast::TernaryExpr,
    ) -> Option<BoundVar> {
        let location = ternary.token.location.clone();

        let cond = self.check_expression(scope, ctx, &ternary.condition)?;
        let cond = resolve_value(&mut ctx.builder, cond);
        let cond_value = self.truthiness(scope, ctx, cond, &location)?;

        let then_label = ctx.builder.add_block("then");
        let else_label = ctx.builder.add_block("else");
        let end_label = ctx.builder.add_block("end");
        ctx.builder.cond_br(cond_value, &then_label, &else_label);

        ctx.builder.set_current_block(&then_label);
        let then_var = self.check_expression(scope, ctx, &ternary.then_expr)?;
        let then_var = resolve_value(&mut ctx.builder, then_var);

        let env = self.env(scope);
        let result_type = then_var.type_.clone();
        let result_ir = then_var.ir_type.clone();

        let slot = ctx.builder.alloca(result_ir.clone(), "ternary");
        ctx.builder
            .store(result_ir.clone(), then_var.value, slot.clone());
        ctx.builder.br(&end_label);

        ctx.builder.set_current_block(&else_label);
        let else_var = self.check_expression(scope, ctx, &ternary.else_expr)?;
        let else_var = resolve_value(&mut ctx.builder, else_var);
        let else_var = coerce(
            &mut ctx.builder,
            self.status,
            &location,
            else_var,
            &result_type,
            &env,
        )?;
        ctx.builder
            .store(result_ir.clone(), else_var.value, slot.clone());
        ctx.builder.br(&end_label);

        ctx.builder.set_current_block(&end_label);
        let value = ctx.builder.load(result_ir.clone(), slot);

        Some(BoundVar {
            name: String::new(),
            type_: result_type,
            ir_type: result_ir,
            value,
            location,
            is_global: false,
        })
    }

    pub(crate) fn check_dot_expr(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        dot: &ast::DotExpr,
    ) -> Option<BoundVar> {
        // module member access
        if let ast::Expr::Reference { token } = &dot.lhs {
            if self.scopes.get_bound_variable(scope, &token.text).is_none() {
                if let Some(module_scope) = self.scopes.find_module_scope(scope, &token.text) {
                    let member = &dot.rhs.text;
                    let vars = self.scopes.get_bound_variables(module_scope, member);
                    return match vars.len() {
                        1 => vars.into_iter().next(),
                        0 => {
                            self.status.error(
                                dot.rhs.location.clone(),
                                format!(
                                    "module '{}' has no symbol '{member}'",
                                    token.text
                                ),
                            );
                            None
                        }
                        _ => {
                            self.status.error(
                                dot.rhs.location.clone(),
                                format!(
                                    "reference to '{}.{member}' is ambiguous",
                                    token.text
                                ),
                            );
                            None
                        }
                    };
                }
            }
        }

        // struct member access
        let lhs = self.check_expression(scope, ctx, &dot.lhs)?;
        let lhs = resolve_value(&mut ctx.builder, lhs);

        let env = self.env(scope);
        let evaluated = full_eval(&lhs.type_, &env);

        let (dimensions, name_index) = match evaluated.as_ref() {
            Type::Ptr { element } => match element.as_ref() {
                Type::Managed { element } => match element.as_ref() {
                    Type::Struct {
                        dimensions,
                        name_index,
                    } => (dimensions.clone(), name_index.clone()),
                    _ => {
                        self.status.error(
                            dot.token.location.clone(),
                            format!("type {} has no members", lhs.type_),
                        );
                        return None;
                    }
                },
                _ => {
                    self.status.error(
                        dot.token.location.clone(),
                        format!("type {} has no members", lhs.type_),
                    );
                    return None;
                }
            },
            _ => {
                self.status.error(
                    dot.token.location.clone(),
                    format!("type {} has no members", lhs.type_),
                );
                return None;
            }
        };

        let member = &dot.rhs.text;
        let Some(&index) = name_index.get(member) else {
            self.status.error(
                dot.rhs.location.clone(),
                format!("type {} has no member '{member}'", lhs.type_),
            );
            return None;
        };

        let mut dim_irs = vec![];
        for dimension in &dimensions {
            dim_irs.push(self.lower(scope, dimension, &dot.token.location)?);
        }
        let struct_ir = IrType::Struct(dim_irs.clone());

        let address = ctx.builder.gep(struct_ir, lhs.value, index);
        let member_type = dimensions[index].clone();
        let member_ir = dim_irs[index].clone();

        Some(BoundVar {
            name: member.clone(),
            type_: type_ref_to(member_type),
            ir_type: member_ir,
            value: address,
            location: dot.rhs.location.clone(),
            is_global: false,
        })
    }

    fn check_callsite(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        callsite: &ast::CallsiteExpr,
    ) -> Option<BoundVar> {
        let mut args = vec![];
        for param in &callsite.params {
            let var = self.check_expression(scope, ctx, param)?;
            args.push(resolve_value(&mut ctx.builder, var));
        }

        match &callsite.function_expr {
            ast::Expr::Reference { token } => self.resolve_function_call(
                scope,
                scope,
                ctx,
                &token.text,
                args,
                &callsite.token.location,
            ),
            ast::Expr::Dot(dot) => {
                if let ast::Expr::Reference { token } = &dot.lhs {
                    if self.scopes.get_bound_variable(scope, &token.text).is_none() {
                        if let Some(module_scope) =
                            self.scopes.find_module_scope(scope, &token.text)
                        {
                            return self.resolve_function_call(
                                module_scope,
                                scope,
                                ctx,
                                &dot.rhs.text,
                                args,
                                &callsite.token.location,
                            );
                        }
                    }
                }
                self.status.error(
                    callsite.token.location.clone(),
                    "only direct function names and module members can be called",
                );
                None
            }
            ast::Expr::FunctionDefn(defn) => {
                let function = self.check_function_literal(scope, ctx, defn)?;
                self.emit_direct_call(scope, ctx, function, args, &callsite.token.location)
            }
            other => {
                let function = self.check_expression(scope, ctx, other)?;
                if function.type_.is_function() {
                    self.emit_direct_call(scope, ctx, function, args, &callsite.token.location)
                } else {
                    self.status.error(
                        callsite.token.location.clone(),
                        format!("cannot call a non-callable value of type {}", function.type_),
                    );
                    None
                }
            }
        }
    }

    fn check_tuple(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        tuple: &ast::TupleExpr,
    ) -> Option<BoundVar> {
        let location = tuple.token.location.clone();
        let mut values = vec![];
        for value in &tuple.values {
            let var = self.check_expression(scope, ctx, value)?;
            values.push(resolve_value(&mut ctx.builder, var));
        }

        let dimensions: Vec<TypeRef> = values.iter().map(|v| v.type_.clone()).collect();
        let tuple_type = crate::types::type_ptr(crate::types::type_managed(
            crate::types::type_struct(dimensions.clone(), Default::default()),
        ));

        let type_id_value = self
            .scopes
            .get_or_assign_type_id(&tuple_type.signature());

        let mut dim_irs = vec![];
        for dimension in &dimensions {
            dim_irs.push(self.lower(scope, dimension, &location)?);
        }
        let struct_ir = IrType::Struct(dim_irs.clone());

        let object = ctx.builder.call(
            IrType::opaque_ptr(),
            "__allocate",
            vec![
                (IrType::I32, Value::Int(type_id_value as i64)),
                (IrType::I64, Value::Int(values.len() as i64)),
            ],
        );

        let env = self.env(scope);
        for (index, value) in values.into_iter().enumerate() {
            let address = ctx
                .builder
                .gep(struct_ir.clone(), object.clone(), index);
            if is_managed_type(&value.type_, &env) {
                emit_addref(&mut ctx.builder, value.value.clone());
            }
            ctx.builder
                .store(dim_irs[index].clone(), value.value, address);
        }

        ctx.life.track_value(object.clone());

        Some(BoundVar {
            name: String::new(),
            type_: tuple_type,
            ir_type: IrType::opaque_ptr(),
            value: object,
            location,
            is_global: false,
        })
    }

    fn check_array_literal(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        array: &ast::ArrayLiteralExpr,
    ) -> Option<BoundVar> {
        let location = array.token.location.clone();
        let mut items = vec![];
        for item in &array.items {
            let var = self.check_expression(scope, ctx, item)?;
            items.push(resolve_value(&mut ctx.builder, var));
        }

        let env = self.env(scope);
        let item_type = match items.first() {
            Some(first) => first.type_.clone(),
            None => crate::types::type_fresh_variable(self.gensym, location.clone()),
        };

        let list_type = crate::types::type_operator(
            type_id("list", location.clone()),
            item_type.clone(),
        );
        let type_id_value = self.scopes.get_or_assign_type_id(&list_type.signature());

        let object = ctx.builder.call(
            IrType::opaque_ptr(),
            "__allocate",
            vec![
                (IrType::I32, Value::Int(type_id_value as i64)),
                (IrType::I64, Value::Int(items.len() as i64)),
            ],
        );

        let item_ir = match items.first() {
            Some(first) => first.ir_type.clone(),
            None => IrType::opaque_ptr(),
        };
        let struct_ir = IrType::Struct(vec![item_ir.clone(); items.len()]);

        for (index, item) in items.into_iter().enumerate() {
            let item = coerce(
                &mut ctx.builder,
                self.status,
                &location,
                item,
                &item_type,
                &env,
            )?;
            let address = ctx
                .builder
                .gep(struct_ir.clone(), object.clone(), index);
            if is_managed_type(&item_type, &env) {
                emit_addref(&mut ctx.builder, item.value.clone());
            }
            ctx.builder.store(item_ir.clone(), item.value, address);
        }

        ctx.life.track_value(object.clone());

        Some(BoundVar {
            name: String::new(),
            type_: list_type,
            ir_type: IrType::opaque_ptr(),
            value: object,
            location,
            is_global: false,
        })
    }

    fn check_function_literal(
        &mut self,
        scope: ScopeId,
        _ctx: &mut FnContext,
        defn: &ast::FunctionDefn,
    ) -> Option<BoundVar> {
        let (params, ret) = self.elaborate_function_decl(scope, &defn.decl)?;
        if params.iter().any(|p| !p.is_fully_bound()) || !ret.is_fully_bound() {
            self.status.error(
                defn.decl.token.location.clone(),
                "function literals cannot be generic",
            );
            return None;
        }

        let var = self.instantiate_function(scope, defn, params, ret, TypeMap::new())?;
        let _ = self
            .scopes
            .put_bound_variable(scope, &defn.decl.name, var.clone());
        Some(var)
    }
}

struct Lvalue {
    address: Value,
    element: TypeRef,
    element_ir: IrType,
}

/// Chase alias expansions to a fixpoint, boundedly.
pub(crate) fn full_eval(type_: &TypeRef, env: &TypeEnv) -> TypeRef {
    let mut current = type_.clone();
    for _ in 0..16 {
        let evaluated = eval(&current, env);
        if evaluated.signature() == current.signature() {
            break;
        }
        current = evaluated;
    }
    current
}

fn zero_value(ir: &IrType) -> Value {
    match ir {
        IrType::I1 => Value::Bool(false),
        IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64 => Value::Int(0),
        IrType::F64 => Value::Float(0.0),
        IrType::Str => Value::Str(String::new()),
        IrType::Ptr(_) => Value::Null,
        _ => Value::Unit,
    }
}

impl Checker<'_> {
    /// Emit a call through an already-resolved function value.
    pub(crate) fn emit_direct_call(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        function: BoundVar,
        args: Vec<BoundVar>,
        location: &Location,
    ) -> Option<BoundVar> {
        let Value::Global(callee) = function.value.clone() else {
            self.status.error(
                location.clone(),
                "indirect calls through values are not supported",
            );
            return None;
        };

        let Some(param_types) = crate::types::get_function_args(&function.type_) else {
            self.status.error(
                location.clone(),
                format!("cannot call a non-callable value of type {}", function.type_),
            );
            return None;
        };
        let ret = crate::types::get_function_return_type(&function.type_)
            .unwrap_or_else(type_void);

        if param_types.len() != args.len() {
            self.status.error(
                location.clone(),
                format!(
                    "'{callee}' takes {} arguments, got {}",
                    param_types.len(),
                    args.len()
                ),
            );
            return None;
        }

        let env = self.env(scope);
        let mut call_args = vec![];
        for (arg, param_type) in args.into_iter().zip(param_types.iter()) {
            let coerced = coerce(
                &mut ctx.builder,
                self.status,
                location,
                arg,
                param_type,
                &env,
            )?;
            call_args.push((coerced.ir_type.clone(), coerced.value));
        }

        let ret_ir = self.lower(scope, &ret, location)?;
        let result = ctx.builder.call(ret_ir.clone(), callee, call_args);

        if is_managed_type(&ret, &env) {
            ctx.life.track_value(result.clone());
        }

        Some(BoundVar {
            name: String::new(),
            type_: ret,
            ir_type: ret_ir,
            value: result,
            location: location.clone(),
            is_global: false,
        })
    }
}
