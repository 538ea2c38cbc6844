use log::trace;

use super::{eval, Type, TypeEnv, TypeMap, TypeRef};

/// The outcome of a unification attempt. On success `bindings` holds the
/// most-general substitution making the two inputs equivalent under the
/// typename environment.
#[derive(Debug, Clone)]
pub struct Unification {
    pub result: bool,
    pub reason: String,
    pub bindings: TypeMap,
}

impl Unification {
    fn success(bindings: TypeMap) -> Self {
        Self {
            result: true,
            reason: String::new(),
            bindings,
        }
    }

    fn failure(reason: impl Into<String>, bindings: TypeMap) -> Self {
        Self {
            result: false,
            reason: reason.into(),
            bindings,
        }
    }
}

/// How many alias/lambda reductions a single unification attempt may apply
/// before giving up. Keeps recursive type aliases from expanding forever.
const MAX_UNIFY_DEPTH: usize = 2;

/// Follow variable bindings transitively until hitting a non-variable or an
/// unbound variable.
pub fn prune(type_: &TypeRef, bindings: &TypeMap) -> TypeRef {
    if let Type::Variable { name, .. } = type_.as_ref() {
        if let Some(bound) = bindings.get(name) {
            return prune(bound, bindings);
        }
    }
    type_.clone()
}

/// Does `var_name` occur anywhere in `type_` after pruning?
pub fn occurs_in_type(var_name: &str, type_: &TypeRef, bindings: &TypeMap) -> bool {
    let pruned = prune(type_, bindings);

    match pruned.as_ref() {
        Type::Variable { name, .. } => name == var_name,
        Type::Id { .. } | Type::Integer { .. } | Type::Literal { .. } => false,
        Type::Operator { oper, operand } => {
            occurs_in_type(var_name, oper, bindings) || occurs_in_type(var_name, operand, bindings)
        }
        Type::Lambda { binding, body } => {
            binding != var_name && occurs_in_type(var_name, body, bindings)
        }
        Type::Struct { dimensions, .. } | Type::Args { dimensions, .. } => dimensions
            .iter()
            .any(|dimension| occurs_in_type(var_name, dimension, bindings)),
        Type::Function { args, return_type } => {
            occurs_in_type(var_name, args, bindings)
                || occurs_in_type(var_name, return_type, bindings)
        }
        Type::Sum { options, .. } => options
            .iter()
            .any(|option| occurs_in_type(var_name, option, bindings)),
        Type::Maybe { just } => occurs_in_type(var_name, just, bindings),
        Type::Ptr { element } | Type::Ref { element } | Type::Managed { element } => {
            occurs_in_type(var_name, element, bindings)
        }
        Type::Module { inner } => occurs_in_type(var_name, inner, bindings),
        Type::Extern {
            inner, underlying, ..
        } => {
            occurs_in_type(var_name, inner, bindings)
                || occurs_in_type(var_name, underlying, bindings)
        }
    }
}

/// Hindley-Milner unification of `a` (typically the declared side) against
/// `b` (typically the value side), modulo the typename environment.
pub fn unify(a: &TypeRef, b: &TypeRef, env: &TypeEnv) -> Unification {
    unify_core(a, b, env, TypeMap::new(), 0)
}

pub fn unify_core(
    a: &TypeRef,
    b: &TypeRef,
    env: &TypeEnv,
    bindings: TypeMap,
    depth: usize,
) -> Unification {
    trace!("unifying {a} and {b}");

    let a = prune(a, &bindings);
    let b = prune(b, &bindings);

    if a.repr(&bindings) == b.repr(&bindings) {
        return Unification::success(bindings);
    }

    if let Type::Variable { name, .. } = a.as_ref() {
        if occurs_in_type(name, &b, &bindings) {
            return Unification::failure(
                format!("recursive unification on {a} and {b}"),
                bindings,
            );
        }
        let mut bindings = bindings;
        bindings.insert(name.clone(), b.clone());
        return Unification::success(bindings);
    }

    if let Type::Variable { name, .. } = b.as_ref() {
        if occurs_in_type(name, &a, &bindings) {
            return Unification::failure(
                format!("recursive unification on {b} and {a}"),
                bindings,
            );
        }
        let mut bindings = bindings;
        bindings.insert(name.clone(), a.clone());
        return Unification::success(bindings);
    }

    // try a bounded round of alias expansion and lambda reduction
    if depth < MAX_UNIFY_DEPTH {
        let ea = eval(&a, env);
        let eb = eval(&b, env);
        if ea.signature() != a.signature() || eb.signature() != b.signature() {
            return unify_core(&ea, &eb, env, bindings, depth + 1);
        }
    }

    match (a.as_ref(), b.as_ref()) {
        (
            Type::Operator { oper: ao, operand: ax },
            Type::Operator { oper: bo, operand: bx },
        ) => {
            let oper_unification = unify_core(ao, bo, env, bindings, depth);
            if !oper_unification.result {
                return oper_unification;
            }
            unify_core(ax, bx, env, oper_unification.bindings, depth)
        }
        (Type::Ptr { element: ae }, Type::Ptr { element: be }) => {
            unify_core(ae, be, env, bindings, depth)
        }
        (Type::Ref { element: ae }, Type::Ref { element: be }) => {
            unify_core(ae, be, env, bindings, depth)
        }
        (Type::Managed { element: ae }, Type::Managed { element: be }) => {
            unify_core(ae, be, env, bindings, depth)
        }
        (Type::Module { inner: ai }, Type::Module { inner: bi }) => {
            unify_core(ai, bi, env, bindings, depth)
        }
        (Type::Maybe { just: aj }, Type::Maybe { just: bj }) => {
            unify_core(aj, bj, env, bindings, depth)
        }
        (Type::Maybe { just: aj }, _) => {
            // a maybe is a sum of its payload and nil
            if b.is_nil() {
                return Unification::success(bindings);
            }
            unify_core(aj, &b, env, bindings, depth)
        }
        (
            Type::Function {
                args: aa,
                return_type: ar,
            },
            Type::Function {
                args: ba,
                return_type: br,
            },
        ) => {
            let args_unification = unify_core(aa, ba, env, bindings, depth);
            if !args_unification.result {
                return args_unification;
            }
            unify_core(ar, br, env, args_unification.bindings, depth)
        }
        (
            Type::Struct {
                dimensions: ad,
                name_index: an,
            },
            Type::Struct {
                dimensions: bd,
                name_index: bn,
            },
        )
        | (
            Type::Args {
                dimensions: ad,
                name_index: an,
            },
            Type::Args {
                dimensions: bd,
                name_index: bn,
            },
        ) => {
            if ad.len() != bd.len() {
                return Unification::failure(
                    format!("dimensionality mismatch between {a} and {b}"),
                    bindings,
                );
            }
            if an != bn {
                return Unification::failure(
                    format!("dimension names do not match between {a} and {b}"),
                    bindings,
                );
            }
            let mut bindings = bindings;
            for (ai, bi) in ad.iter().zip(bd.iter()) {
                let unification = unify_core(ai, bi, env, bindings, depth);
                if !unification.result {
                    return unification;
                }
                bindings = unification.bindings;
            }
            Unification::success(bindings)
        }
        (Type::Sum { options, .. }, _) => {
            // every option on the value side must be accepted by some option
            // on the declared side
            let value_options: Vec<TypeRef> = match b.as_ref() {
                Type::Sum {
                    options: b_options, ..
                } => b_options.clone(),
                _ => vec![b.clone()],
            };

            let mut bindings = bindings;
            'values: for value_option in &value_options {
                for declared_option in options {
                    let unification =
                        unify_core(declared_option, value_option, env, bindings.clone(), depth);
                    if unification.result {
                        bindings = unification.bindings;
                        continue 'values;
                    }
                }
                return Unification::failure(
                    format!("no option of {a} accepts {value_option}"),
                    bindings,
                );
            }
            Unification::success(bindings)
        }
        _ => Unification::failure(format!("type mismatch between {a} and {b}"), bindings),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::super::*;
    use super::*;
    use crate::location::Location;

    fn loc() -> Location {
        Location::builtin()
    }

    fn env() -> TypeEnv {
        TypeEnv::default()
    }

    #[test]
    fn test_unify_identical_ids() {
        let unification = unify(&type_id("int64", loc()), &type_id("int64", loc()), &env());

        assert!(unification.result);
        assert!(unification.bindings.is_empty());
    }

    #[test]
    fn test_unify_variable_binds() {
        let unification = unify(&type_variable("T", loc()), &type_id("str", loc()), &env());

        assert!(unification.result);
        assert_eq!(
            "str",
            unification.bindings.get("T").unwrap().signature()
        );
    }

    #[test]
    fn test_unify_output_substitution_equates_inputs() {
        let a = type_operator(type_id("vector", loc()), type_variable("T", loc()));
        let b = type_operator(type_id("vector", loc()), type_id("int64", loc()));

        let unification = unify(&a, &b, &env());
        assert!(unification.result);
        assert_eq!(
            rebind(&a, &unification.bindings).signature(),
            rebind(&b, &unification.bindings).signature()
        );
    }

    #[test]
    fn test_occurs_check_fails_recursive_unification() {
        let t = type_variable("T", loc());
        let vector_t = type_operator(type_id("vector", loc()), t.clone());

        let unification = unify(&t, &vector_t, &env());
        assert!(!unification.result);
        assert!(unification.reason.contains("recursive unification"));
    }

    #[test]
    fn test_unify_through_alias() {
        let mut aliases = TypeMap::new();
        aliases.insert("age".to_string(), type_integer(64, true));
        let env = TypeEnv::new(aliases);

        let unification = unify(&type_id("age", loc()), &type_integer(64, true), &env);
        assert!(unification.result);
    }

    #[test]
    fn test_unify_function_types() {
        let f = type_function(
            type_args(vec![type_variable("T", loc())], NameIndex::new()),
            type_variable("T", loc()),
        );
        let g = type_function(
            type_args(vec![type_id("str", loc())], NameIndex::new()),
            type_id("str", loc()),
        );

        let unification = unify(&f, &g, &env());
        assert!(unification.result);
        assert_eq!("str", unification.bindings.get("T").unwrap().signature());
    }

    #[test]
    fn test_unify_function_return_conflict() {
        let f = type_function(
            type_args(vec![type_variable("T", loc())], NameIndex::new()),
            type_variable("T", loc()),
        );
        let g = type_function(
            type_args(vec![type_id("str", loc())], NameIndex::new()),
            type_id("int64", loc()),
        );

        let unification = unify(&f, &g, &env());
        assert!(!unification.result);
    }

    #[test]
    fn test_unify_args_arity_mismatch() {
        let a = type_args(vec![type_id("int64", loc())], NameIndex::new());
        let b = type_args(
            vec![type_id("int64", loc()), type_id("int64", loc())],
            NameIndex::new(),
        );

        let unification = unify(&a, &b, &env());
        assert!(!unification.result);
        assert!(unification.reason.contains("dimensionality"));
    }

    #[test]
    fn test_unify_sum_accepts_member() {
        let sum = Rc::new(Type::Sum {
            options: vec![type_id("circle", loc()), type_id("square", loc())],
            location: loc(),
        });

        assert!(unify(&sum, &type_id("circle", loc()), &env()).result);
        assert!(!unify(&sum, &type_id("triangle", loc()), &env()).result);
    }

    #[test]
    fn test_unify_maybe_accepts_nil_and_payload() {
        let maybe_int = type_maybe(type_id("int64", loc()));

        assert!(unify(&maybe_int, &type_nil(), &env()).result);
        assert!(unify(&maybe_int, &type_id("int64", loc()), &env()).result);
        assert!(!unify(&maybe_int, &type_id("str", loc()), &env()).result);
    }

    #[test]
    fn test_recursive_alias_unification_terminates() {
        let mut aliases = TypeMap::new();
        aliases.insert(
            "tree".to_string(),
            type_operator(type_id("node", loc()), type_id("tree", loc())),
        );
        let env = TypeEnv::new(aliases);

        // terminates thanks to the depth bound; failure is acceptable
        let unification = unify(&type_id("tree", loc()), &type_id("int64", loc()), &env);
        assert!(!unification.result);
    }
}
