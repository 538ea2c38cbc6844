use crate::diagnostics::Status;
use crate::ir::{CastOp, FunctionBuilder, IrType, Value};
use crate::location::Location;
use crate::scopes::BoundVar;
use crate::types::unification::unify;
use crate::types::{eval, Type, TypeEnv, TypeRef};

use super::lower_type;

/// The full table of implicit conversions, applied at argument passing,
/// assignment, and return. Anything not listed here is a type error; no
/// other implicit conversions exist.
///
/// 1. identical signatures: no-op
/// 2. integer -> integer of a different width: extend per the signedness of
///    the source, or truncate
/// 3. nil -> pointer: null constant of the target type
/// 4. pointer -> pointer: bit-cast
/// 5. `&T` -> `T`: load
/// 6. `T` <-> `T?`: box/unbox when the lowered representations differ
pub fn coerce(
    builder: &mut FunctionBuilder,
    status: &mut Status,
    location: &Location,
    var: BoundVar,
    target: &TypeRef,
    env: &TypeEnv,
) -> Option<BoundVar> {
    if var.type_.signature() == target.signature() {
        return Some(var);
    }

    // a ref is read through before any other conversion
    if let Type::Ref { element } = var.type_.as_ref() {
        let loaded = load_ref(builder, &var, element);
        return coerce(builder, status, location, loaded, target, env);
    }

    let target_ir = match lower_type(target, env) {
        Ok(ir) => ir,
        Err(message) => {
            status.error(location.clone(), message);
            return None;
        }
    };

    let source = eval(&var.type_, env);
    let evaluated_target = eval(target, env);

    // integer width adjustment, signedness of the source decides
    if let (
        Type::Integer {
            bits: from_bits,
            signed,
        },
        Type::Integer { bits: to_bits, .. },
    ) = (source.as_ref(), evaluated_target.as_ref())
    {
        let value = if from_bits == to_bits {
            var.value
        } else if from_bits < to_bits {
            let op = if *signed { CastOp::Sext } else { CastOp::Zext };
            builder.cast(op, var.value, var.ir_type.clone(), target_ir.clone())
        } else {
            builder.cast(
                CastOp::Trunc,
                var.value,
                var.ir_type.clone(),
                target_ir.clone(),
            )
        };
        return Some(BoundVar {
            type_: target.clone(),
            ir_type: target_ir,
            value,
            ..var
        });
    }

    // nil becomes a null pointer of the target's lowered type
    if var.type_.is_nil() && target_ir.is_ptr() {
        return Some(BoundVar {
            type_: target.clone(),
            ir_type: target_ir,
            value: Value::Null,
            ..var
        });
    }

    // T -> T? boxes when the payload is not already a pointer
    if let Type::Maybe { just } = evaluated_target.as_ref() {
        let unification = unify(just, &var.type_, env);
        if unification.result {
            let value = if var.ir_type.is_ptr() || var.ir_type == target_ir {
                var.value
            } else {
                builder.call(
                    target_ir.clone(),
                    "__box__",
                    vec![(var.ir_type.clone(), var.value)],
                )
            };
            return Some(BoundVar {
                type_: target.clone(),
                ir_type: target_ir,
                value,
                ..var
            });
        }
    }

    // T? -> T unboxes
    if let Type::Maybe { just } = source.as_ref() {
        if unify(just, &evaluated_target, env).result
            || unify(&evaluated_target, just, env).result
        {
            let value = if var.ir_type == target_ir {
                var.value
            } else if target_ir.is_ptr() {
                builder.cast(
                    CastOp::Bitcast,
                    var.value,
                    var.ir_type.clone(),
                    target_ir.clone(),
                )
            } else {
                builder.load(target_ir.clone(), var.value)
            };
            return Some(BoundVar {
                type_: target.clone(),
                ir_type: target_ir,
                value,
                ..var
            });
        }
    }

    // pointer to pointer is a bit-cast, provided the logical types agree
    if var.ir_type.is_ptr() && target_ir.is_ptr() {
        let unification = unify(target, &var.type_, env);
        if unification.result {
            let value = if var.ir_type == target_ir {
                var.value
            } else {
                builder.cast(
                    CastOp::Bitcast,
                    var.value,
                    var.ir_type.clone(),
                    target_ir.clone(),
                )
            };
            return Some(BoundVar {
                type_: target.clone(),
                ir_type: target_ir,
                value,
                ..var
            });
        }
    }

    // structurally equivalent after alias expansion: reuse the value
    if unify(target, &var.type_, env).result && var.ir_type == target_ir {
        return Some(BoundVar {
            type_: target.clone(),
            ir_type: target_ir,
            value: var.value,
            ..var
        });
    }

    status.error(
        location.clone(),
        format!("cannot convert {} to {}", var.type_, target),
    );
    None
}

/// Read a `&T` through to its `T` value. Ref-typed bound variables carry
/// the lowered *element* type and an address value.
pub fn load_ref(builder: &mut FunctionBuilder, var: &BoundVar, element: &TypeRef) -> BoundVar {
    let element_ir = var.ir_type.clone();
    let value = builder.load(element_ir.clone(), var.value.clone());
    BoundVar {
        name: var.name.clone(),
        type_: element.clone(),
        ir_type: element_ir,
        value,
        location: var.location.clone(),
        is_global: false,
    }
}

/// Strip a ref type, emitting the load, when present; otherwise pass the
/// value through untouched.
pub fn resolve_value(builder: &mut FunctionBuilder, var: BoundVar) -> BoundVar {
    match var.type_.clone().as_ref() {
        Type::Ref { element } => load_ref(builder, &var, element),
        _ => var,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{type_id, type_integer, type_maybe, type_nil, type_ref_to, TypeMap};

    fn loc() -> Location {
        Location::builtin()
    }

    fn env_with_ints() -> TypeEnv {
        let mut aliases = TypeMap::new();
        aliases.insert("int".to_string(), type_integer(64, true));
        aliases.insert("int32".to_string(), type_integer(32, true));
        aliases.insert("uint8".to_string(), type_integer(8, false));
        TypeEnv::new(aliases)
    }

    fn var_of(type_: TypeRef, ir_type: IrType, value: Value) -> BoundVar {
        BoundVar {
            name: String::new(),
            type_,
            ir_type,
            value,
            location: loc(),
            is_global: false,
        }
    }

    #[test]
    fn test_identical_signature_is_a_noop() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(type_id("int", loc()), IrType::I64, Value::Int(3));

        let coerced = coerce(
            &mut builder,
            &mut status,
            &loc(),
            var.clone(),
            &type_id("int", loc()),
            &env_with_ints(),
        )
        .unwrap();

        assert_eq!(var.value, coerced.value);
        assert!(builder.finish().blocks[0].instructions.is_empty());
    }

    #[test]
    fn test_signed_widening_uses_sext() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(type_id("int32", loc()), IrType::I32, Value::Reg(5));

        coerce(
            &mut builder,
            &mut status,
            &loc(),
            var,
            &type_id("int", loc()),
            &env_with_ints(),
        )
        .unwrap();

        let function = builder.finish();
        assert!(matches!(
            function.blocks[0].instructions[0],
            crate::ir::Instruction::Cast {
                op: CastOp::Sext,
                ..
            }
        ));
    }

    #[test]
    fn test_unsigned_widening_uses_zext() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(type_id("uint8", loc()), IrType::I8, Value::Reg(5));

        coerce(
            &mut builder,
            &mut status,
            &loc(),
            var,
            &type_id("int", loc()),
            &env_with_ints(),
        )
        .unwrap();

        let function = builder.finish();
        assert!(matches!(
            function.blocks[0].instructions[0],
            crate::ir::Instruction::Cast {
                op: CastOp::Zext,
                ..
            }
        ));
    }

    #[test]
    fn test_nil_to_pointer_is_null() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(type_nil(), IrType::opaque_ptr(), Value::Null);
        let target = type_maybe(type_id("str", loc()));

        let coerced = coerce(
            &mut builder,
            &mut status,
            &loc(),
            var,
            &target,
            &env_with_ints(),
        )
        .unwrap();

        assert_eq!(Value::Null, coerced.value);
    }

    #[test]
    fn test_ref_to_value_loads() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(
            type_ref_to(type_id("int", loc())),
            IrType::I64,
            Value::Reg(0),
        );

        let coerced = coerce(
            &mut builder,
            &mut status,
            &loc(),
            var,
            &type_id("int", loc()),
            &env_with_ints(),
        )
        .unwrap();

        assert_eq!(IrType::I64, coerced.ir_type);
        let function = builder.finish();
        assert!(matches!(
            function.blocks[0].instructions[0],
            crate::ir::Instruction::Load { .. }
        ));
    }

    #[test]
    fn test_unrelated_types_fail() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut status = Status::new();
        let var = var_of(type_id("str", loc()), IrType::Str, Value::Reg(0));

        let coerced = coerce(
            &mut builder,
            &mut status,
            &loc(),
            var,
            &type_id("int", loc()),
            &env_with_ints(),
        );

        assert!(coerced.is_none());
        assert!(!status.ok());
    }
}
