use crate::ir::{IrType, Value};
use crate::location::Location;
use crate::scopes::{BoundVar, Scopes, PROGRAM_SCOPE};
use crate::types::{
    type_args, type_function, type_id, type_integer, NameIndex, TypeRef,
};

/// Install the built-in type aliases into the program scope's typename
/// environment. These are always present, with or without the standard
/// library.
pub fn install_base_types(scopes: &mut Scopes) {
    let mut alias = |name: &str, bits: u32, signed: bool| {
        scopes.put_typename(PROGRAM_SCOPE, name, type_integer(bits, signed));
    };

    alias("int", 64, true);
    alias("int64", 64, true);
    alias("int32", 32, true);
    alias("int16", 16, true);
    alias("int8", 8, true);
    alias("uint", 64, false);
    alias("uint64", 64, false);
    alias("uint32", 32, false);
    alias("uint16", 16, false);
    alias("uint8", 8, false);
    alias("char", 8, true);
    alias("byte", 8, false);
    alias("bool", 1, false);
}

fn int() -> TypeRef {
    type_id("int", Location::builtin())
}

fn float() -> TypeRef {
    type_id("float", Location::builtin())
}

fn str_() -> TypeRef {
    type_id("str", Location::builtin())
}

fn bool_() -> TypeRef {
    type_id("bool", Location::builtin())
}

fn char_() -> TypeRef {
    type_id("char", Location::builtin())
}

fn void() -> TypeRef {
    type_id("void", Location::builtin())
}

fn bind_runtime_fn(scopes: &mut Scopes, name: &str, params: Vec<(TypeRef, IrType)>, ret: (TypeRef, IrType)) {
    let (param_types, param_irs): (Vec<TypeRef>, Vec<IrType>) = params.into_iter().unzip();
    let type_ = type_function(type_args(param_types, NameIndex::new()), ret.0);
    let ir_type = IrType::Fn {
        params: param_irs,
        ret: Box::new(ret.1),
    };
    let var = BoundVar {
        name: name.to_string(),
        type_,
        ir_type,
        value: Value::Global(name.to_string()),
        location: Location::builtin(),
        is_global: true,
    };
    // runtime bindings never conflict with themselves
    let _ = scopes.put_bound_variable(PROGRAM_SCOPE, name, var);
}

/// Register the runtime's symbol surface as callables in the program scope:
/// arithmetic and comparison overloads per int/float/str, boxing and
/// stringification helpers, and `print`.
pub fn install_runtime_builtins(scopes: &mut Scopes) {
    let i = || (int(), IrType::I64);
    let f = || (float(), IrType::F64);
    let s = || (str_(), IrType::Str);
    let b = || (bool_(), IrType::I1);
    let c = || (char_(), IrType::I8);
    let v = || (void(), IrType::Void);

    for name in ["__plus__", "__minus__", "__times__", "__divide__", "__mod__"] {
        bind_runtime_fn(scopes, name, vec![i(), i()], i());
        bind_runtime_fn(scopes, name, vec![f(), f()], f());
    }
    bind_runtime_fn(scopes, "__plus__", vec![s(), s()], s());

    for name in ["__eq__", "__ineq__", "__lt__", "__lte__", "__gt__", "__gte__"] {
        bind_runtime_fn(scopes, name, vec![i(), i()], b());
        bind_runtime_fn(scopes, name, vec![f(), f()], b());
        bind_runtime_fn(scopes, name, vec![s(), s()], b());
        bind_runtime_fn(scopes, name, vec![c(), c()], b());
    }
    bind_runtime_fn(scopes, "__eq__", vec![b(), b()], b());
    bind_runtime_fn(scopes, "__ineq__", vec![b(), b()], b());

    bind_runtime_fn(scopes, "__not__", vec![b()], b());
    bind_runtime_fn(scopes, "__negative__", vec![i()], i());
    bind_runtime_fn(scopes, "__negative__", vec![f()], f());
    bind_runtime_fn(scopes, "__positive__", vec![i()], i());
    bind_runtime_fn(scopes, "__positive__", vec![f()], f());

    for param in [i(), f(), s(), b()] {
        bind_runtime_fn(scopes, "print", vec![param], v());
    }
    for param in [i(), f(), b()] {
        bind_runtime_fn(scopes, "__str__", vec![param], s());
    }
    bind_runtime_fn(scopes, "putstr", vec![s()], i());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_overloads_are_registered() {
        let mut scopes = Scopes::new();
        install_runtime_builtins(&mut scopes);

        let callables = scopes.get_callables(PROGRAM_SCOPE, "__plus__");
        assert_eq!(3, callables.len());
    }

    #[test]
    fn test_base_int_alias() {
        let mut scopes = Scopes::new();
        install_base_types(&mut scopes);

        let env = scopes.type_env(PROGRAM_SCOPE);
        assert_eq!("int64", env.lookup("int").unwrap().signature());
    }
}
