use log::debug;

use crate::diagnostics::Status;
use crate::ir::IrType;
use crate::parser::ast;
use crate::scopes::{ScopeId, Scopes, UncheckedTypeKind, UncheckedVar, UncheckedVarKind};
use crate::types::sum::type_sum_safe;
use crate::types::{
    eval, type_id, type_lambda, type_managed, type_maybe, type_operator, type_ptr, type_struct,
    type_variable, Gensym, NameIndex, Type, TypeEnv, TypeRef,
};

use super::Checker;

/// Names that lower directly without an alias entry.
fn is_builtin_type_name(name: &str) -> bool {
    matches!(
        name,
        "float" | "str" | "bool" | "void" | "nil" | "atom" | "true" | "false" | "__unreachable"
    )
}

/// Compute the lowered representation of a fully-elaborated type. Managed
/// pointers are type-erased to an opaque pointer, which is also what breaks
/// the recursion for self-referential data types.
pub fn lower_type(type_: &TypeRef, env: &TypeEnv) -> Result<IrType, String> {
    // chase alias chains to a fixpoint, boundedly
    let mut current = type_.clone();
    for _ in 0..16 {
        let evaluated = eval(&current, env);
        if evaluated.signature() == current.signature() {
            break;
        }
        current = evaluated;
    }

    match current.as_ref() {
        Type::Integer { bits, .. } => match bits {
            1 => Ok(IrType::I1),
            8 => Ok(IrType::I8),
            16 => Ok(IrType::I16),
            32 => Ok(IrType::I32),
            64 => Ok(IrType::I64),
            other => Err(format!("no lowered representation for int{other}")),
        },
        Type::Id { name, .. } => match name.as_str() {
            "float" => Ok(IrType::F64),
            "str" | "atom" => Ok(IrType::Str),
            "bool" | "true" | "false" => Ok(IrType::I1),
            "void" | "__unreachable" => Ok(IrType::Void),
            "nil" => Ok(IrType::opaque_ptr()),
            name => Err(format!("unbound type '{name}'")),
        },
        Type::Ptr { element } => match element.as_ref() {
            Type::Managed { .. } => Ok(IrType::opaque_ptr()),
            _ => Ok(IrType::ptr_to(lower_type(element, env)?)),
        },
        Type::Managed { .. } | Type::Extern { .. } => Ok(IrType::opaque_ptr()),
        Type::Struct { dimensions, .. } => {
            let mut dims = Vec::with_capacity(dimensions.len());
            for dimension in dimensions {
                dims.push(lower_type(dimension, env)?);
            }
            Ok(IrType::Struct(dims))
        }
        Type::Function { args, return_type } => {
            let Type::Args { dimensions, .. } = args.as_ref() else {
                return Err(format!("malformed function type {current}"));
            };
            let mut params = Vec::with_capacity(dimensions.len());
            for dimension in dimensions {
                params.push(lower_type(dimension, env)?);
            }
            Ok(IrType::Fn {
                params,
                ret: Box::new(lower_type(return_type, env)?),
            })
        }
        Type::Maybe { just } => {
            let lowered = lower_type(just, env)?;
            if lowered.is_ptr() {
                Ok(lowered)
            } else {
                Ok(IrType::ptr_to(lowered))
            }
        }
        Type::Sum { .. } => Ok(IrType::opaque_ptr()),
        Type::Ref { element } => Ok(IrType::ptr_to(lower_type(element, env)?)),
        Type::Variable { .. } => Err(format!("type {current} is not fully bound")),
        Type::Lambda { .. } => Err(format!(
            "type {current} needs type arguments before it can be used here"
        )),
        Type::Operator { .. } => {
            // an unreduced application of a nominal head is a type-erased
            // managed value at runtime
            if current.is_fully_bound() {
                Ok(IrType::opaque_ptr())
            } else {
                Err(format!("unbound type {current}"))
            }
        }
        Type::Module { .. } => Err("module types have no lowered representation".to_string()),
        Type::Args { .. } => Err("argument tuples are not value types".to_string()),
        Type::Literal { .. } => Err(format!("literal type {current} cannot be lowered")),
    }
}

/// Elaborate a parsed type reference into a type value, resolving names
/// through the typename environment visible from `scope`. Nominal types
/// resolve to their qualified `module.name` id.
pub fn elaborate_type_ref(
    type_ref: &ast::TypeRefExpr,
    scope: ScopeId,
    scopes: &Scopes,
    status: &mut Status,
    gensym: &mut Gensym,
) -> Option<TypeRef> {
    match type_ref {
        ast::TypeRefExpr::Named { token, name, args } => {
            let env = scopes.type_env(scope);
            let canonical = if let Some(aliased) = env.lookup(name) {
                match aliased.as_ref() {
                    Type::Id { name: id_name, .. } => id_name.clone(),
                    _ => name.clone(),
                }
            } else if is_builtin_type_name(name) {
                name.clone()
            } else {
                status.error(
                    token.location.clone(),
                    format!("undefined type '{name}'"),
                );
                return None;
            };

            let mut result = type_id(canonical, token.location.clone());
            for arg in args {
                let arg = elaborate_type_ref(arg, scope, scopes, status, gensym)?;
                result = type_operator(result, arg);
            }
            Some(result)
        }
        ast::TypeRefExpr::Generic { token, name } => match name {
            Some(name) => Some(type_variable(name.clone(), token.location.clone())),
            None => Some(type_variable(gensym.fresh(), token.location.clone())),
        },
        ast::TypeRefExpr::List { token, element } => {
            let element = elaborate_type_ref(element, scope, scopes, status, gensym)?;
            Some(type_operator(
                type_id("list", token.location.clone()),
                element,
            ))
        }
        ast::TypeRefExpr::Tuple { dims, .. } => {
            let mut elaborated = Vec::with_capacity(dims.len());
            for dim in dims {
                elaborated.push(elaborate_type_ref(dim, scope, scopes, status, gensym)?);
            }
            Some(type_ptr(type_managed(type_struct(
                elaborated,
                NameIndex::new(),
            ))))
        }
        ast::TypeRefExpr::Maybe { just, .. } => {
            let just = elaborate_type_ref(just, scope, scopes, status, gensym)?;
            Some(type_maybe(just))
        }
    }
}

/// Wrap a type body in type-lambdas for its declared type variables, so
/// use-site applications β-reduce in declaration order.
fn wrap_type_lambdas(type_variables: &[String], body: TypeRef) -> TypeRef {
    let mut result = body;
    for variable in type_variables.iter().rev() {
        result = type_lambda(variable.clone(), result);
    }
    result
}

/// The nominal use-site form of a declared type: its qualified id applied
/// to the declared type variables.
fn applied_nominal(qualified: &str, type_variables: &[String], location: &crate::location::Location) -> TypeRef {
    let mut result = type_id(qualified, location.clone());
    for variable in type_variables {
        result = type_operator(result, type_variable(variable.clone(), location.clone()));
    }
    result
}

impl Checker<'_> {
    /// Phase 1: elaborate every module's type definitions, in source order,
    /// into the typename environments, and register data constructors as
    /// unchecked variables. Nominal names are declared first so that type
    /// bodies can refer to themselves and to later definitions.
    pub fn type_check_module_types(&mut self) {
        // declare nominal names
        for index in 0..self.scopes.unchecked_types.len() {
            let unchecked = self.scopes.unchecked_types[index].clone();
            let module_scope = unchecked.module_scope;
            let Some(module_name) = self.scopes.module_name(module_scope) else {
                continue;
            };

            match &unchecked.kind {
                UncheckedTypeKind::TypeDef(def) => {
                    let qualified = format!("{module_name}.{}", def.name.text);
                    self.scopes.put_typename(
                        module_scope,
                        &def.name.text,
                        type_id(qualified, def.name.location.clone()),
                    );
                    if let ast::TypeAlgebra::Sum { ctors, .. } = &def.algebra {
                        for ctor in ctors {
                            let ctor_qualified = format!("{module_name}.{}", ctor.token.text);
                            self.scopes.put_typename(
                                module_scope,
                                &ctor.token.text,
                                type_id(ctor_qualified, ctor.token.location.clone()),
                            );
                        }
                    }
                }
                UncheckedTypeKind::Tag(tag) => {
                    let qualified = format!("{module_name}.{}", tag.name.text);
                    self.scopes.put_typename(
                        module_scope,
                        &tag.name.text,
                        type_id(qualified, tag.name.location.clone()),
                    );
                }
            }
        }

        // elaborate bodies
        for index in 0..self.scopes.unchecked_types.len() {
            let unchecked = self.scopes.unchecked_types[index].clone();
            let module_scope = unchecked.module_scope;
            let Some(module_name) = self.scopes.module_name(module_scope) else {
                continue;
            };

            match unchecked.kind {
                UncheckedTypeKind::TypeDef(def) => {
                    self.elaborate_type_def(&module_name, module_scope, &def)
                }
                UncheckedTypeKind::Tag(tag) => {
                    let qualified = format!("{module_name}.{}", tag.name.text);
                    debug!("elaborating tag {qualified}");
                    self.install_nominal_struct(
                        module_scope,
                        &qualified,
                        &tag.name,
                        &[],
                        vec![],
                        NameIndex::new(),
                    );
                }
            }
        }
    }

    fn elaborate_type_def(
        &mut self,
        module_name: &str,
        module_scope: ScopeId,
        def: &ast::TypeDef,
    ) {
        let qualified = format!("{module_name}.{}", def.name.text);
        debug!("elaborating type {qualified}");

        match &def.algebra {
            ast::TypeAlgebra::Alias { type_ref, .. } => {
                let Some(aliased) = elaborate_type_ref(
                    type_ref,
                    module_scope,
                    self.scopes,
                    self.status,
                    self.gensym,
                ) else {
                    return;
                };
                let wrapped = wrap_type_lambdas(&def.type_variables, aliased);
                self.scopes
                    .put_typename(crate::scopes::PROGRAM_SCOPE, &qualified, wrapped);
            }
            ast::TypeAlgebra::Product { dims, .. } => {
                let mut dimensions = vec![];
                let mut name_index = NameIndex::new();
                for (i, dim) in dims.iter().enumerate() {
                    let Some(dim_type) = elaborate_type_ref(
                        &dim.type_ref,
                        module_scope,
                        self.scopes,
                        self.status,
                        self.gensym,
                    ) else {
                        return;
                    };
                    dimensions.push(dim_type);
                    name_index.insert(dim.name.clone(), i);
                }
                self.install_nominal_struct(
                    module_scope,
                    &qualified,
                    &def.name,
                    &def.type_variables,
                    dimensions,
                    name_index,
                );
            }
            ast::TypeAlgebra::Sum { ctors, token } => {
                let mut options = vec![];
                for ctor in ctors {
                    let ctor_qualified = format!("{module_name}.{}", ctor.token.text);
                    let mut dimensions = vec![];
                    for param in &ctor.params {
                        let Some(param_type) = elaborate_type_ref(
                            param,
                            module_scope,
                            self.scopes,
                            self.status,
                            self.gensym,
                        ) else {
                            return;
                        };
                        dimensions.push(param_type);
                    }
                    self.install_nominal_struct(
                        module_scope,
                        &ctor_qualified,
                        &ctor.token,
                        &def.type_variables,
                        dimensions,
                        NameIndex::new(),
                    );
                    options.push(applied_nominal(
                        &ctor_qualified,
                        &def.type_variables,
                        &ctor.token.location,
                    ));
                }

                let env = self.scopes.type_env(module_scope);
                match type_sum_safe(options, token.location.clone(), &env) {
                    Ok(sum) => {
                        let wrapped = wrap_type_lambdas(&def.type_variables, sum);
                        self.scopes.put_typename(
                            crate::scopes::PROGRAM_SCOPE,
                            &qualified,
                            wrapped,
                        );
                    }
                    Err(message) => {
                        self.status.error(token.location.clone(), message);
                    }
                }
            }
        }
    }

    /// Install one nominal product type: the qualified name maps to a
    /// managed struct pointer, and the constructor is registered as an
    /// unchecked variable for on-demand instantiation.
    fn install_nominal_struct(
        &mut self,
        module_scope: ScopeId,
        qualified: &str,
        name_token: &crate::lexer::Token,
        type_variables: &[String],
        dimensions: Vec<TypeRef>,
        name_index: NameIndex,
    ) {
        let struct_type = type_ptr(type_managed(type_struct(
            dimensions.clone(),
            name_index.clone(),
        )));
        let wrapped = wrap_type_lambdas(type_variables, struct_type);
        self.scopes
            .put_typename(crate::scopes::PROGRAM_SCOPE, qualified, wrapped);

        let result = applied_nominal(qualified, type_variables, &name_token.location);
        self.scopes.add_unchecked_var(
            module_scope,
            UncheckedVar {
                name: name_token.text.clone(),
                location: name_token.location.clone(),
                module_scope,
                kind: UncheckedVarKind::DataCtor {
                    args: dimensions,
                    result,
                    name_index,
                },
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::types::{type_integer, TypeMap};

    fn loc() -> Location {
        Location::builtin()
    }

    #[test]
    fn test_lower_basic_types() {
        let mut aliases = TypeMap::new();
        aliases.insert("int".to_string(), type_integer(64, true));
        let env = TypeEnv::new(aliases);

        assert_eq!(IrType::I64, lower_type(&type_id("int", loc()), &env).unwrap());
        assert_eq!(IrType::F64, lower_type(&type_id("float", loc()), &env).unwrap());
        assert_eq!(IrType::Str, lower_type(&type_id("str", loc()), &env).unwrap());
        assert_eq!(IrType::I1, lower_type(&type_id("bool", loc()), &env).unwrap());
        assert_eq!(IrType::Void, lower_type(&type_id("void", loc()), &env).unwrap());
    }

    #[test]
    fn test_lower_managed_pointer_is_opaque() {
        let env = TypeEnv::default();
        let point = type_ptr(type_managed(type_struct(
            vec![type_integer(64, true), type_integer(64, true)],
            NameIndex::new(),
        )));

        assert_eq!(IrType::opaque_ptr(), lower_type(&point, &env).unwrap());
    }

    #[test]
    fn test_lower_recursive_nominal_type_terminates() {
        // type node has next node?; value int
        let mut aliases = TypeMap::new();
        aliases.insert("int".to_string(), type_integer(64, true));
        aliases.insert(
            "m.node".to_string(),
            type_ptr(type_managed(type_struct(
                vec![
                    type_maybe(type_id("m.node", loc())),
                    type_id("int", loc()),
                ],
                NameIndex::new(),
            ))),
        );
        let env = TypeEnv::new(aliases);

        assert_eq!(
            IrType::opaque_ptr(),
            lower_type(&type_id("m.node", loc()), &env).unwrap()
        );
    }

    #[test]
    fn test_lower_maybe_boxes_non_pointers() {
        let mut aliases = TypeMap::new();
        aliases.insert("int".to_string(), type_integer(64, true));
        let env = TypeEnv::new(aliases);

        assert_eq!(
            IrType::ptr_to(IrType::I64),
            lower_type(&type_maybe(type_id("int", loc())), &env).unwrap()
        );
        assert_eq!(
            IrType::Str,
            lower_type(&type_maybe(type_id("str", loc())), &env).unwrap()
        );
    }

    #[test]
    fn test_lower_unbound_variable_fails() {
        let env = TypeEnv::default();

        assert!(lower_type(&type_variable("T", loc()), &env).is_err());
    }
}
