use log::debug;

use crate::ir::{FunctionBuilder, IrType, Value};
use crate::location::Location;
use crate::parser::ast;
use crate::scopes::{BoundVar, Callable, ScopeId, UncheckedVarKind};
use crate::types::unification::{unify_core, Unification};
use crate::types::{
    is_managed_type, rebind, type_args, type_function, type_void, NameIndex, TypeMap, TypeRef,
};

use super::life::{emit_addref, Life, LifeForm};
use super::{Checker, FnContext};

/// One overload candidate that unified with the callsite's argument tuple.
enum Viable {
    Bound(BoundVar),
    Generic {
        module_scope: ScopeId,
        defn: ast::FunctionDefn,
        params: Vec<TypeRef>,
        ret: TypeRef,
    },
    Ctor {
        module_scope: ScopeId,
        name: String,
        args: Vec<TypeRef>,
        result: TypeRef,
    },
}

/// IR symbol names keep only identifier-ish characters.
fn sanitize_symbol(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '/' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn args_signature(params: &[TypeRef]) -> String {
    let sigs: Vec<String> = params.iter().map(|p| p.signature()).collect();
    format!("({})", sigs.join(", "))
}

impl Checker<'_> {
    /// Elaborate a function declaration's parameter and return types. A
    /// parameter without a type annotation is generic, as if written `any`.
    /// A missing return type means void.
    pub(crate) fn elaborate_function_decl(
        &mut self,
        scope: ScopeId,
        decl: &ast::FunctionDecl,
    ) -> Option<(Vec<TypeRef>, TypeRef)> {
        let mut params = vec![];
        for param in &decl.params {
            let type_ = match &param.type_ref {
                Some(type_ref) => self.elaborate(scope, type_ref)?,
                None => crate::types::type_fresh_variable(
                    self.gensym,
                    param.token.location.clone(),
                ),
            };
            params.push(type_);
        }

        let ret = match &decl.return_type {
            Some(type_ref) => self.elaborate(scope, type_ref)?,
            None => type_void(),
        };

        Some((params, ret))
    }

    /// Resolve a named callsite: gather candidate callables visible from
    /// `lookup_scope`, unify each candidate's parameter tuple against the
    /// argument tuple, instantiate generics on demand, and emit the call.
    pub(crate) fn resolve_function_call(
        &mut self,
        lookup_scope: ScopeId,
        scope: ScopeId,
        ctx: &mut FnContext,
        name: &str,
        args: Vec<BoundVar>,
        location: &Location,
    ) -> Option<BoundVar> {
        let arg_types: Vec<TypeRef> = args.iter().map(|arg| arg.type_.clone()).collect();
        let args_tuple = type_args(arg_types.clone(), NameIndex::new());
        let env = self.env(scope);

        let callables = self.scopes.get_callables(lookup_scope, name);
        if callables.is_empty() {
            self.status.error(
                location.clone(),
                format!("undefined function '{name}'"),
            );
            return None;
        }

        let mut viable: Vec<(Viable, TypeMap, Vec<TypeRef>)> = vec![];
        let mut tried: Vec<(String, Location)> = vec![];

        for callable in callables {
            match callable {
                Callable::Bound(var) => {
                    let Some(params) = crate::types::get_function_args(&var.type_) else {
                        continue;
                    };
                    let declared = type_args(params.clone(), NameIndex::new());
                    let unification: Unification =
                        unify_core(&declared, &args_tuple, &env, TypeMap::new(), 0);
                    if unification.result {
                        let bound_params: Vec<TypeRef> = params
                            .iter()
                            .map(|p| rebind(p, &unification.bindings))
                            .collect();
                        push_deduped(
                            &mut viable,
                            Viable::Bound(var),
                            unification.bindings,
                            bound_params,
                        );
                    } else {
                        tried.push((var.type_.signature(), var.location.clone()));
                    }
                }
                Callable::Unchecked(index) => {
                    let unchecked = self.scopes.unchecked_vars[index].clone();
                    match &unchecked.kind {
                        UncheckedVarKind::Function(defn) => {
                            let Some((params, ret)) =
                                self.elaborate_function_decl(unchecked.module_scope, &defn.decl)
                            else {
                                continue;
                            };
                            let declared = type_args(params.clone(), NameIndex::new());
                            let unification =
                                unify_core(&declared, &args_tuple, &env, TypeMap::new(), 0);
                            if unification.result {
                                let bound_params: Vec<TypeRef> = params
                                    .iter()
                                    .map(|p| rebind(p, &unification.bindings))
                                    .collect();
                                push_deduped(
                                    &mut viable,
                                    Viable::Generic {
                                        module_scope: unchecked.module_scope,
                                        defn: defn.clone(),
                                        params,
                                        ret,
                                    },
                                    unification.bindings,
                                    bound_params,
                                );
                            } else {
                                tried.push((
                                    args_signature(&params),
                                    unchecked.location.clone(),
                                ));
                            }
                        }
                        UncheckedVarKind::DataCtor {
                            args: ctor_args,
                            result,
                            ..
                        } => {
                            let declared = type_args(ctor_args.clone(), NameIndex::new());
                            let unification =
                                unify_core(&declared, &args_tuple, &env, TypeMap::new(), 0);
                            if unification.result {
                                let bound_params: Vec<TypeRef> = ctor_args
                                    .iter()
                                    .map(|p| rebind(p, &unification.bindings))
                                    .collect();
                                push_deduped(
                                    &mut viable,
                                    Viable::Ctor {
                                        module_scope: unchecked.module_scope,
                                        name: unchecked.name.clone(),
                                        args: ctor_args.clone(),
                                        result: result.clone(),
                                    },
                                    unification.bindings,
                                    bound_params,
                                );
                            } else {
                                tried.push((
                                    args_signature(ctor_args),
                                    unchecked.location.clone(),
                                ));
                            }
                        }
                    }
                }
            }
        }

        match viable.len() {
            0 => {
                self.status.error(
                    location.clone(),
                    format!(
                        "no overload of '{name}' accepts {}",
                        args_signature(&arg_types)
                    ),
                );
                for (signature, candidate_location) in tried {
                    self.status.info(
                        candidate_location,
                        format!("candidate '{name}' {signature} did not match"),
                    );
                }
                None
            }
            1 => {
                let (choice, bindings, _) = viable.into_iter().next().unwrap();
                self.emit_chosen_call(scope, ctx, choice, bindings, args, location)
            }
            _ => {
                self.status.error(
                    location.clone(),
                    format!(
                        "call to '{name}' with {} is ambiguous between {} overloads",
                        args_signature(&arg_types),
                        viable.len()
                    ),
                );
                None
            }
        }
    }

    fn emit_chosen_call(
        &mut self,
        scope: ScopeId,
        ctx: &mut FnContext,
        choice: Viable,
        bindings: TypeMap,
        args: Vec<BoundVar>,
        location: &Location,
    ) -> Option<BoundVar> {
        let function = match choice {
            Viable::Bound(var) => {
                let params = crate::types::get_function_args(&var.type_)?;
                let ret = crate::types::get_function_return_type(&var.type_)?;
                let bound_params: Vec<TypeRef> =
                    params.iter().map(|p| rebind(p, &bindings)).collect();
                let bound_ret = rebind(&ret, &bindings);
                BoundVar {
                    type_: type_function(
                        type_args(bound_params, NameIndex::new()),
                        bound_ret,
                    ),
                    ..var
                }
            }
            Viable::Generic {
                module_scope,
                defn,
                params,
                ret,
            } => self.instantiate_function(module_scope, &defn, params, ret, bindings)?,
            Viable::Ctor {
                module_scope,
                name,
                args: ctor_args,
                result,
            } => {
                let bound_args: Vec<TypeRef> =
                    ctor_args.iter().map(|a| rebind(a, &bindings)).collect();
                let bound_result = rebind(&result, &bindings);
                self.instantiate_data_ctor(
                    module_scope,
                    &name,
                    bound_args,
                    bound_result,
                    location,
                )?
            }
        };

        // runtime builtins get an extern declaration in the calling module
        if function.location.line == 0 {
            if let (Value::Global(callee), IrType::Fn { params, ret }) =
                (&function.value, &function.ir_type)
            {
                self.scopes
                    .ir_module_mut(&ctx.ir_module)
                    .declare_extern(callee.clone(), params.clone(), (**ret).clone());
            }
        }

        self.emit_direct_call(scope, ctx, function, args, location)
    }

    /// Elaborate one function body under the given type-variable bindings,
    /// memoized per distinct instantiation signature.
    pub(crate) fn instantiate_function(
        &mut self,
        module_scope: ScopeId,
        defn: &ast::FunctionDefn,
        params: Vec<TypeRef>,
        ret: TypeRef,
        bindings: TypeMap,
    ) -> Option<BoundVar> {
        let decl = &defn.decl;
        let location = decl.token.location.clone();
        let module_name = self.scopes.module_name(module_scope).unwrap_or_default();

        let bound_params: Vec<TypeRef> =
            params.iter().map(|p| rebind(p, &bindings)).collect();
        for (param, param_type) in decl.params.iter().zip(bound_params.iter()) {
            if !param_type.is_fully_bound() {
                self.status.error(
                    param.token.location.clone(),
                    format!(
                        "unable to instantiate '{}' without a concrete type for '{}'",
                        decl.name, param.name
                    ),
                );
                return None;
            }
        }

        let memo_key = format!(
            "{module_name}.{name}{args}",
            name = decl.name,
            args = args_signature(&bound_params)
        );
        if let Some(existing) = self.scopes.get_instantiation(&memo_key) {
            return Some(existing);
        }

        debug!("instantiating {memo_key}");

        let rename_to_user_main =
            !self.no_std_lib && decl.name == "main" && bindings.is_empty();
        let fn_name = if rename_to_user_main {
            "user/main".to_string()
        } else if bindings.is_empty() {
            sanitize_symbol(&format!("{module_name}.{}", decl.name))
        } else {
            sanitize_symbol(&memo_key)
        };

        let bound_ret = rebind(&ret, &bindings);
        let constraint = if bound_ret.is_fully_bound() {
            Some(bound_ret.clone())
        } else {
            None
        };

        // memoize before checking the body so recursion terminates
        let declared_type = type_function(
            type_args(bound_params.clone(), NameIndex::new()),
            bound_ret.clone(),
        );
        let mut param_irs = vec![];
        for (param, param_type) in decl.params.iter().zip(bound_params.iter()) {
            param_irs.push(self.lower(module_scope, param_type, &param.token.location)?);
        }
        let ret_ir = match &constraint {
            Some(constraint) => self.lower(module_scope, constraint, &location)?,
            None => IrType::Void,
        };
        let fn_var = BoundVar {
            name: decl.name.clone(),
            type_: declared_type,
            ir_type: IrType::Fn {
                params: param_irs.clone(),
                ret: Box::new(ret_ir.clone()),
            },
            value: Value::Global(fn_name.clone()),
            location: location.clone(),
            is_global: true,
        };
        self.scopes
            .memoize_instantiation(memo_key.clone(), fn_var.clone());

        // the function scope sits inside a substitution scope carrying this
        // instantiation's bindings
        let parent = if bindings.is_empty() {
            module_scope
        } else {
            self.scopes.new_generic_scope(module_scope, bindings)
        };
        let fn_scope = self.scopes.new_function_scope(parent, &decl.name);
        if let Some(constraint) = &constraint {
            self.scopes
                .set_return_type_constraint(fn_scope, constraint.clone());
        }

        let builder = FunctionBuilder::new(
            fn_name.clone(),
            decl.params
                .iter()
                .zip(param_irs.iter())
                .map(|(param, ir)| (param.name.clone(), ir.clone()))
                .collect(),
            ret_ir,
        );
        let mut fn_ctx = FnContext {
            builder,
            life: Life::new(),
            ir_module: module_name.clone(),
        };
        fn_ctx.life.push(LifeForm::Function);

        let env = self.env(fn_scope);
        for (index, (param, param_type)) in
            decl.params.iter().zip(bound_params.iter()).enumerate()
        {
            let ir = param_irs[index].clone();
            let slot = fn_ctx.builder.alloca(ir.clone(), param.name.clone());
            let incoming = fn_ctx.builder.param_value(index);
            if is_managed_type(param_type, &env) {
                emit_addref(&mut fn_ctx.builder, incoming.clone());
                fn_ctx
                    .life
                    .track_slot(LifeForm::Function, slot.clone(), ir.clone());
            }
            fn_ctx.builder.store(ir.clone(), incoming, slot.clone());

            let var = BoundVar {
                name: param.name.clone(),
                type_: crate::types::type_ref_to(param_type.clone()),
                ir_type: ir,
                value: slot,
                location: param.token.location.clone(),
                is_global: false,
            };
            if let Err((message, previous)) =
                self.scopes.put_bound_variable(fn_scope, &param.name, var)
            {
                self.status.error(param.token.location.clone(), message);
                self.status.info(previous, "previously declared here");
            }
        }

        let returns = self.check_block_statements(fn_scope, &mut fn_ctx, &defn.block);

        let final_ret = self
            .scopes
            .get_return_type_constraint(fn_scope)
            .unwrap_or_else(type_void);

        if !returns {
            if final_ret.is_void() {
                if !fn_ctx.builder.current_block_terminated() {
                    fn_ctx
                        .life
                        .release_to(LifeForm::Function, &mut fn_ctx.builder);
                    fn_ctx.builder.ret(None);
                }
            } else {
                self.status.error(
                    location.clone(),
                    format!(
                        "not all control paths through '{}' return a {final_ret}",
                        decl.name
                    ),
                );
                return None;
            }
        }

        let final_ret_ir = self.lower(module_scope, &final_ret, &location)?;
        fn_ctx.builder.set_return_type(final_ret_ir.clone());
        let function = fn_ctx.builder.finish();
        self.scopes
            .ir_module_mut(&module_name)
            .functions
            .push(function);

        let final_var = BoundVar {
            type_: type_function(
                type_args(bound_params, NameIndex::new()),
                final_ret,
            ),
            ir_type: IrType::Fn {
                params: param_irs,
                ret: Box::new(final_ret_ir),
            },
            ..fn_var
        };
        self.scopes
            .memoize_instantiation(memo_key, final_var.clone());
        Some(final_var)
    }

    /// Build the generated constructor for a data type: allocate, stamp the
    /// runtime type id, store each dimension.
    fn instantiate_data_ctor(
        &mut self,
        module_scope: ScopeId,
        name: &str,
        args: Vec<TypeRef>,
        result: TypeRef,
        location: &Location,
    ) -> Option<BoundVar> {
        for arg in &args {
            if !arg.is_fully_bound() {
                self.status.error(
                    location.clone(),
                    format!("unable to construct '{name}' without a concrete type for {arg}"),
                );
                return None;
            }
        }

        let result_signature = result.signature();
        let memo_key = format!("ctor:{result_signature}{}", args_signature(&args));
        if let Some(existing) = self.scopes.get_instantiation(&memo_key) {
            return Some(existing);
        }

        debug!("instantiating data ctor {memo_key}");

        let module_name = self.scopes.module_name(module_scope).unwrap_or_default();
        let fn_name = sanitize_symbol(&format!("ctor.{result_signature}"));
        let type_id_value = self.scopes.get_or_assign_type_id(&result_signature);

        let mut param_irs = vec![];
        for arg in &args {
            param_irs.push(self.lower(module_scope, arg, location)?);
        }
        let struct_ir = IrType::Struct(param_irs.clone());

        let mut builder = FunctionBuilder::new(
            fn_name.clone(),
            param_irs
                .iter()
                .enumerate()
                .map(|(i, ir)| (format!("dim{i}"), ir.clone()))
                .collect(),
            IrType::opaque_ptr(),
        );

        let object = builder.call(
            IrType::opaque_ptr(),
            "__allocate",
            vec![
                (IrType::I32, Value::Int(type_id_value as i64)),
                (IrType::I64, Value::Int(args.len() as i64)),
            ],
        );

        let env = self.env(module_scope);
        for (index, arg) in args.iter().enumerate() {
            let address = builder.gep(struct_ir.clone(), object.clone(), index);
            let incoming = builder.param_value(index);
            if is_managed_type(arg, &env) {
                emit_addref(&mut builder, incoming.clone());
            }
            builder.store(param_irs[index].clone(), incoming, address);
        }
        builder.ret(Some((IrType::opaque_ptr(), object)));

        self.scopes
            .ir_module_mut(&module_name)
            .functions
            .push(builder.finish());

        let fn_var = BoundVar {
            name: name.to_string(),
            type_: type_function(type_args(args, NameIndex::new()), result),
            ir_type: IrType::Fn {
                params: param_irs,
                ret: Box::new(IrType::opaque_ptr()),
            },
            value: Value::Global(fn_name),
            location: location.clone(),
            is_global: true,
        };
        self.scopes.memoize_instantiation(memo_key, fn_var.clone());
        Some(fn_var)
    }
}

/// Keep at most one viable candidate per bound-parameter signature; an
/// already-instantiated function and its unchecked origin would otherwise
/// double-count.
fn push_deduped(
    viable: &mut Vec<(Viable, TypeMap, Vec<TypeRef>)>,
    choice: Viable,
    bindings: TypeMap,
    bound_params: Vec<TypeRef>,
) {
    let signature = args_signature(&bound_params);
    let already_present = viable
        .iter()
        .any(|(_, _, params)| args_signature(params) == signature);
    if !already_present {
        viable.push((choice, bindings, bound_params));
    }
}
