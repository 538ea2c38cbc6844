pub mod signature;
pub mod sum;
pub mod unification;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::rc::Rc;

use crate::lexer::Token;
use crate::location::Location;

pub type TypeRef = Rc<Type>;
/// Type-variable bindings and typename maps. A BTreeMap keeps iteration
/// deterministic, which keeps signatures and diagnostics deterministic.
pub type TypeMap = BTreeMap<String, TypeRef>;
pub type NameIndex = BTreeMap<String, usize>;

pub const BUILTIN_VOID_TYPE: &str = "void";
pub const BUILTIN_NIL_TYPE: &str = "nil";
pub const BUILTIN_UNREACHABLE_TYPE: &str = "__unreachable";

/// An immutable type value. Composite variants hold reference-counted
/// children, so rebinding shares whatever subtrees it does not touch.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Id {
        name: String,
        location: Location,
    },
    Variable {
        name: String,
        location: Location,
    },
    /// Left-associative type application, `vector{int}`.
    Operator {
        oper: TypeRef,
        operand: TypeRef,
    },
    /// Type-level abstraction; applied by `eval`.
    Lambda {
        binding: String,
        body: TypeRef,
    },
    Struct {
        dimensions: Vec<TypeRef>,
        name_index: NameIndex,
    },
    /// The argument tuple of a function type.
    Args {
        dimensions: Vec<TypeRef>,
        name_index: NameIndex,
    },
    Function {
        args: TypeRef,
        return_type: TypeRef,
    },
    Sum {
        options: Vec<TypeRef>,
        location: Location,
    },
    Maybe {
        just: TypeRef,
    },
    Ptr {
        element: TypeRef,
    },
    Ref {
        element: TypeRef,
    },
    Managed {
        element: TypeRef,
    },
    Module {
        inner: TypeRef,
    },
    Integer {
        bits: u32,
        signed: bool,
    },
    Literal {
        token: Token,
    },
    /// A foreign type with runtime-managed lifetime hooks.
    Extern {
        inner: TypeRef,
        underlying: TypeRef,
        finalizer: String,
        mark: String,
    },
}

impl Type {
    /// Write the canonical representation, substituting bound variables as
    /// they are encountered. Signatures ignore source locations entirely.
    pub fn emit(&self, out: &mut String, bindings: &TypeMap) {
        match self {
            Type::Id { name, .. } => out.push_str(name),
            Type::Variable { name, .. } => {
                if let Some(bound) = bindings.get(name) {
                    bound.emit(out, bindings);
                } else {
                    out.push_str("any ");
                    out.push_str(name);
                }
            }
            Type::Operator { oper, operand } => {
                oper.emit(out, bindings);
                out.push('{');
                operand.emit(out, bindings);
                out.push('}');
            }
            Type::Lambda { binding, body } => {
                out.push_str("(lambda ");
                out.push_str(binding);
                out.push(' ');
                let mut inner = bindings.clone();
                inner.remove(binding);
                body.emit(out, &inner);
                out.push(')');
            }
            Type::Struct {
                dimensions,
                name_index,
            } => {
                out.push_str("struct{");
                join_dimensions(out, dimensions, name_index, bindings);
                out.push('}');
            }
            Type::Args {
                dimensions,
                name_index,
            } => {
                out.push_str("args{");
                join_dimensions(out, dimensions, name_index, bindings);
                out.push('}');
            }
            Type::Function { args, return_type } => {
                out.push_str("def ");
                args.emit(out, bindings);
                out.push(' ');
                return_type.emit(out, bindings);
            }
            Type::Sum { options, .. } => {
                out.push_str("(or");
                for option in options {
                    out.push(' ');
                    option.emit(out, bindings);
                }
                out.push(')');
            }
            Type::Maybe { just } => {
                just.emit(out, bindings);
                out.push('?');
            }
            Type::Ptr { element } => {
                out.push('*');
                element.emit(out, bindings);
            }
            Type::Ref { element } => {
                out.push('&');
                element.emit(out, bindings);
            }
            Type::Managed { element } => {
                out.push_str("managed{");
                element.emit(out, bindings);
                out.push('}');
            }
            Type::Module { inner } => {
                out.push_str("module{");
                inner.emit(out, bindings);
                out.push('}');
            }
            Type::Integer { bits, signed } => {
                if !signed {
                    out.push('u');
                }
                out.push_str("int");
                out.push_str(&bits.to_string());
            }
            Type::Literal { token } => {
                out.push_str("(literal ");
                out.push_str(&token.text);
                out.push(')');
            }
            Type::Extern {
                inner,
                underlying,
                finalizer,
                mark,
            } => {
                out.push_str("extern{");
                inner.emit(out, bindings);
                out.push(' ');
                underlying.emit(out, bindings);
                out.push(' ');
                out.push_str(finalizer);
                out.push(' ');
                out.push_str(mark);
                out.push('}');
            }
        }
    }

    pub fn repr(&self, bindings: &TypeMap) -> String {
        let mut out = String::new();
        self.emit(&mut out, bindings);
        out
    }

    /// The canonical textual form. Signature equality is the authoritative
    /// structural-equality check between types.
    pub fn signature(&self) -> String {
        self.repr(&TypeMap::new())
    }

    /// The set of free type variables.
    pub fn ftvs(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        self.collect_ftvs(&mut set);
        set
    }

    fn collect_ftvs(&self, set: &mut BTreeSet<String>) {
        match self {
            Type::Id { .. } | Type::Integer { .. } | Type::Literal { .. } => {}
            Type::Variable { name, .. } => {
                set.insert(name.clone());
            }
            Type::Operator { oper, operand } => {
                oper.collect_ftvs(set);
                operand.collect_ftvs(set);
            }
            Type::Lambda { binding, body } => {
                let mut inner = BTreeSet::new();
                body.collect_ftvs(&mut inner);
                inner.remove(binding);
                set.extend(inner);
            }
            Type::Struct { dimensions, .. } | Type::Args { dimensions, .. } => {
                for dimension in dimensions {
                    dimension.collect_ftvs(set);
                }
            }
            Type::Function { args, return_type } => {
                args.collect_ftvs(set);
                return_type.collect_ftvs(set);
            }
            Type::Sum { options, .. } => {
                for option in options {
                    option.collect_ftvs(set);
                }
            }
            Type::Maybe { just } => just.collect_ftvs(set),
            Type::Ptr { element } | Type::Ref { element } | Type::Managed { element } => {
                element.collect_ftvs(set)
            }
            Type::Module { inner } => inner.collect_ftvs(set),
            Type::Extern {
                inner, underlying, ..
            } => {
                inner.collect_ftvs(set);
                underlying.collect_ftvs(set);
            }
        }
    }

    /// A type is fully bound iff it has no free type variables.
    pub fn is_fully_bound(&self) -> bool {
        self.ftvs().is_empty()
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Id { name, .. } if name == BUILTIN_VOID_TYPE)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Type::Id { name, .. } if name == BUILTIN_NIL_TYPE)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Type::Id { name, .. } if name == BUILTIN_UNREACHABLE_TYPE)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn location(&self) -> Location {
        match self {
            Type::Id { location, .. } => location.clone(),
            Type::Variable { location, .. } => location.clone(),
            Type::Operator { oper, .. } => oper.location(),
            Type::Lambda { body, .. } => body.location(),
            Type::Struct { dimensions, .. } | Type::Args { dimensions, .. } => dimensions
                .first()
                .map(|dimension| dimension.location())
                .unwrap_or_else(Location::builtin),
            Type::Function { args, .. } => args.location(),
            Type::Sum { location, .. } => location.clone(),
            Type::Maybe { just } => just.location(),
            Type::Ptr { element } | Type::Ref { element } | Type::Managed { element } => {
                element.location()
            }
            Type::Module { inner } => inner.location(),
            Type::Integer { .. } => Location::builtin(),
            Type::Literal { token } => token.location.clone(),
            Type::Extern { inner, .. } => inner.location(),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

fn join_dimensions(
    out: &mut String,
    dimensions: &[TypeRef],
    name_index: &NameIndex,
    bindings: &TypeMap,
) {
    let mut names: BTreeMap<usize, &str> = BTreeMap::new();
    for (name, index) in name_index {
        names.insert(*index, name);
    }

    for (i, dimension) in dimensions.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        if let Some(name) = names.get(&i) {
            out.push_str(name);
            out.push(' ');
        }
        dimension.emit(out, bindings);
    }
}

/// Substitute type variables by name throughout a type tree.
pub fn rebind(type_: &TypeRef, bindings: &TypeMap) -> TypeRef {
    if bindings.is_empty() {
        return type_.clone();
    }

    match type_.as_ref() {
        Type::Id { .. } | Type::Integer { .. } | Type::Literal { .. } => type_.clone(),
        Type::Variable { name, .. } => match bindings.get(name) {
            Some(bound) => bound.clone(),
            None => type_.clone(),
        },
        Type::Operator { oper, operand } => {
            type_operator(rebind(oper, bindings), rebind(operand, bindings))
        }
        Type::Lambda { binding, body } => {
            let mut inner = bindings.clone();
            inner.remove(binding);
            type_lambda(binding.clone(), rebind(body, &inner))
        }
        Type::Struct {
            dimensions,
            name_index,
        } => type_struct(
            dimensions.iter().map(|d| rebind(d, bindings)).collect(),
            name_index.clone(),
        ),
        Type::Args {
            dimensions,
            name_index,
        } => type_args(
            dimensions.iter().map(|d| rebind(d, bindings)).collect(),
            name_index.clone(),
        ),
        Type::Function { args, return_type } => {
            type_function(rebind(args, bindings), rebind(return_type, bindings))
        }
        Type::Sum { options, location } => Rc::new(Type::Sum {
            options: options.iter().map(|o| rebind(o, bindings)).collect(),
            location: location.clone(),
        }),
        Type::Maybe { just } => type_maybe(rebind(just, bindings)),
        Type::Ptr { element } => type_ptr(rebind(element, bindings)),
        Type::Ref { element } => type_ref_to(rebind(element, bindings)),
        Type::Managed { element } => type_managed(rebind(element, bindings)),
        Type::Module { inner } => type_module(rebind(inner, bindings)),
        Type::Extern {
            inner,
            underlying,
            finalizer,
            mark,
        } => type_extern(
            rebind(inner, bindings),
            rebind(underlying, bindings),
            finalizer.clone(),
            mark.clone(),
        ),
    }
}

/// The typename environment: the visible type aliases, plus a memo of alias
/// expansions so that recursive aliases do not get re-expanded quadratically.
#[derive(Default, Debug, Clone)]
pub struct TypeEnv {
    aliases: TypeMap,
    eval_memo: RefCell<BTreeMap<String, TypeRef>>,
}

impl TypeEnv {
    pub fn new(aliases: TypeMap) -> Self {
        Self {
            aliases,
            eval_memo: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.aliases.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub fn insert(&mut self, name: String, type_: TypeRef) {
        self.eval_memo.borrow_mut().clear();
        self.aliases.insert(name, type_);
    }

    pub fn aliases(&self) -> &TypeMap {
        &self.aliases
    }
}

const MAX_EVAL_DEPTH: usize = 16;

/// Partial normalization: expand type aliases and β-reduce type-lambda
/// applications, to a bounded depth so recursive aliases terminate.
pub fn eval(type_: &TypeRef, env: &TypeEnv) -> TypeRef {
    eval_depth(type_, env, 0)
}

fn eval_depth(type_: &TypeRef, env: &TypeEnv, depth: usize) -> TypeRef {
    if depth >= MAX_EVAL_DEPTH {
        return type_.clone();
    }

    match type_.as_ref() {
        Type::Id { name, .. } => {
            if let Some(memoized) = env.eval_memo.borrow().get(name) {
                return memoized.clone();
            }
            match env.lookup(name) {
                Some(aliased) => {
                    env.eval_memo
                        .borrow_mut()
                        .insert(name.clone(), aliased.clone());
                    aliased
                }
                None => type_.clone(),
            }
        }
        Type::Operator { oper, operand } => eval_apply(oper, operand, env, depth),
        Type::Maybe { just } => {
            let inner = eval_depth(just, env, depth + 1);
            if Rc::ptr_eq(&inner, just) {
                type_.clone()
            } else {
                type_maybe(inner)
            }
        }
        Type::Ptr { element } => {
            let inner = eval_depth(element, env, depth + 1);
            if Rc::ptr_eq(&inner, element) {
                type_.clone()
            } else {
                type_ptr(inner)
            }
        }
        Type::Ref { element } => {
            let inner = eval_depth(element, env, depth + 1);
            if Rc::ptr_eq(&inner, element) {
                type_.clone()
            } else {
                type_ref_to(inner)
            }
        }
        _ => type_.clone(),
    }
}

fn eval_apply(oper: &TypeRef, operand: &TypeRef, env: &TypeEnv, depth: usize) -> TypeRef {
    let evaluated_oper = eval_depth(oper, env, depth + 1);

    match evaluated_oper.as_ref() {
        Type::Lambda { binding, body } => {
            let mut bindings = TypeMap::new();
            bindings.insert(binding.clone(), operand.clone());
            let reduced = rebind(body, &bindings);
            eval_depth(&reduced, env, depth + 1)
        }
        Type::Operator {
            oper: inner_oper,
            operand: inner_operand,
        } => {
            let reduced = eval_apply(inner_oper, inner_operand, env, depth + 1);
            if reduced.signature() == evaluated_oper.signature() {
                // no further reduction possible
                type_operator(evaluated_oper, operand.clone())
            } else {
                eval_apply(&reduced, operand, env, depth + 1)
            }
        }
        _ => type_operator(evaluated_oper, operand.clone()),
    }
}

/// Narrow a type given an eliminated truthiness value: with `false`
/// eliminated a `T?` becomes `T`, with `true` eliminated it becomes `nil`,
/// and so on. Returns `None` when nothing of the type remains.
pub fn boolean_refinement(type_: &TypeRef, eliminated: bool, env: &TypeEnv) -> Option<TypeRef> {
    match type_.as_ref() {
        Type::Maybe { just } => {
            if eliminated {
                Some(type_nil())
            } else {
                Some(just.clone())
            }
        }
        Type::Id { name, location } => match (name.as_str(), eliminated) {
            ("bool", true) => Some(type_id("false", location.clone())),
            ("bool", false) => Some(type_id("true", location.clone())),
            ("true", true) => None,
            ("false", false) => None,
            ("nil", false) => None,
            _ => Some(type_.clone()),
        },
        Type::Sum { options, location } => {
            let remaining: Vec<TypeRef> = options
                .iter()
                .filter_map(|option| boolean_refinement(option, eliminated, env))
                .collect();
            match remaining.len() {
                0 => None,
                1 => Some(remaining.into_iter().next().unwrap()),
                _ => sum::type_sum_safe(remaining, location.clone(), env).ok(),
            }
        }
        _ => Some(type_.clone()),
    }
}

/// Generator for fresh anonymous type variables. Owned by the compiler
/// instance so repeated compilations produce identical gensym streams.
#[derive(Default, Debug)]
pub struct Gensym {
    next: usize,
}

impl Gensym {
    pub fn fresh(&mut self) -> String {
        self.next += 1;
        format!("__{}", self.next)
    }
}

pub fn type_id(name: impl Into<String>, location: Location) -> TypeRef {
    Rc::new(Type::Id {
        name: name.into(),
        location,
    })
}

pub fn type_nil() -> TypeRef {
    type_id(BUILTIN_NIL_TYPE, Location::builtin())
}

pub fn type_void() -> TypeRef {
    type_id(BUILTIN_VOID_TYPE, Location::builtin())
}

pub fn type_unreachable() -> TypeRef {
    type_id(BUILTIN_UNREACHABLE_TYPE, Location::builtin())
}

pub fn type_variable(name: impl Into<String>, location: Location) -> TypeRef {
    Rc::new(Type::Variable {
        name: name.into(),
        location,
    })
}

pub fn type_fresh_variable(gensym: &mut Gensym, location: Location) -> TypeRef {
    type_variable(gensym.fresh(), location)
}

pub fn type_operator(oper: TypeRef, operand: TypeRef) -> TypeRef {
    Rc::new(Type::Operator { oper, operand })
}

pub fn type_lambda(binding: impl Into<String>, body: TypeRef) -> TypeRef {
    Rc::new(Type::Lambda {
        binding: binding.into(),
        body,
    })
}

pub fn type_struct(dimensions: Vec<TypeRef>, name_index: NameIndex) -> TypeRef {
    Rc::new(Type::Struct {
        dimensions,
        name_index,
    })
}

pub fn type_args(dimensions: Vec<TypeRef>, name_index: NameIndex) -> TypeRef {
    Rc::new(Type::Args {
        dimensions,
        name_index,
    })
}

pub fn type_function(args: TypeRef, return_type: TypeRef) -> TypeRef {
    Rc::new(Type::Function { args, return_type })
}

/// `T?`. Never wraps another maybe, a ref, or bare nil.
pub fn type_maybe(just: TypeRef) -> TypeRef {
    match just.as_ref() {
        Type::Maybe { .. } => just,
        _ if just.is_nil() => just,
        Type::Ref { element } => type_maybe(element.clone()),
        _ => Rc::new(Type::Maybe { just }),
    }
}

pub fn type_ptr(element: TypeRef) -> TypeRef {
    Rc::new(Type::Ptr { element })
}

/// `&T`. A ref never wraps a ref.
pub fn type_ref_to(element: TypeRef) -> TypeRef {
    match element.as_ref() {
        Type::Ref { .. } => element,
        _ => Rc::new(Type::Ref { element }),
    }
}

pub fn type_managed(element: TypeRef) -> TypeRef {
    Rc::new(Type::Managed { element })
}

pub fn type_module(inner: TypeRef) -> TypeRef {
    Rc::new(Type::Module { inner })
}

pub fn type_integer(bits: u32, signed: bool) -> TypeRef {
    Rc::new(Type::Integer { bits, signed })
}

pub fn type_literal(token: Token) -> TypeRef {
    Rc::new(Type::Literal { token })
}

pub fn type_extern(
    inner: TypeRef,
    underlying: TypeRef,
    finalizer: impl Into<String>,
    mark: impl Into<String>,
) -> TypeRef {
    Rc::new(Type::Extern {
        inner,
        underlying,
        finalizer: finalizer.into(),
        mark: mark.into(),
    })
}

pub fn is_type_id(type_: &TypeRef, name: &str) -> bool {
    matches!(type_.as_ref(), Type::Id { name: n, .. } if n == name)
}

/// Is this type a managed pointer (or a sum of managed pointers, or an
/// extern type) whose lifetime needs addref/release tracking?
pub fn is_managed_type(type_: &TypeRef, env: &TypeEnv) -> bool {
    let evaluated = eval(type_, env);
    match evaluated.as_ref() {
        Type::Ptr { element } => matches!(element.as_ref(), Type::Managed { .. }),
        Type::Managed { .. } => true,
        Type::Extern { .. } => true,
        Type::Maybe { just } => is_managed_type(just, env),
        Type::Sum { options, .. } => options.iter().any(|option| is_managed_type(option, env)),
        Type::Id { name, .. } => name == "str",
        _ => false,
    }
}

pub fn is_ptr(type_: &TypeRef, env: &TypeEnv) -> bool {
    let evaluated = eval(type_, env);
    matches!(
        evaluated.as_ref(),
        Type::Ptr { .. } | Type::Managed { .. } | Type::Extern { .. }
    ) || matches!(evaluated.as_ref(), Type::Maybe { just } if is_ptr(just, env))
}

pub fn get_function_return_type(type_: &TypeRef) -> Option<TypeRef> {
    match type_.as_ref() {
        Type::Function { return_type, .. } => Some(return_type.clone()),
        _ => None,
    }
}

pub fn get_function_args(type_: &TypeRef) -> Option<Vec<TypeRef>> {
    match type_.as_ref() {
        Type::Function { args, .. } => match args.as_ref() {
            Type::Args { dimensions, .. } => Some(dimensions.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::builtin()
    }

    #[test]
    fn test_signature_is_canonical() {
        let vector_int = type_operator(type_id("vector", loc()), type_id("int64", loc()));

        assert_eq!("vector{int64}", vector_int.signature());
    }

    #[test]
    fn test_rebind_with_empty_bindings_is_identity() {
        let t = type_maybe(type_ptr(type_managed(type_id("point", loc()))));

        assert_eq!(t.signature(), rebind(&t, &TypeMap::new()).signature());
    }

    #[test]
    fn test_rebind_with_disjoint_bindings_is_identity() {
        let t = type_operator(type_id("vector", loc()), type_variable("T", loc()));
        let mut bindings = TypeMap::new();
        bindings.insert("U".to_string(), type_id("int64", loc()));

        assert_eq!(t.signature(), rebind(&t, &bindings).signature());
    }

    #[test]
    fn test_rebind_substitutes_variables() {
        let t = type_operator(type_id("vector", loc()), type_variable("T", loc()));
        let mut bindings = TypeMap::new();
        bindings.insert("T".to_string(), type_id("int64", loc()));

        assert_eq!("vector{int64}", rebind(&t, &bindings).signature());
    }

    #[test]
    fn test_lambda_shadows_binding_in_rebind() {
        let t = type_lambda("T", type_variable("T", loc()));
        let mut bindings = TypeMap::new();
        bindings.insert("T".to_string(), type_id("int64", loc()));

        assert_eq!(t.signature(), rebind(&t, &bindings).signature());
    }

    #[test]
    fn test_ftvs_of_lambda_exclude_binding() {
        let t = type_lambda(
            "T",
            type_operator(type_variable("T", loc()), type_variable("U", loc())),
        );

        let ftvs = t.ftvs();
        assert!(!ftvs.contains("T"));
        assert!(ftvs.contains("U"));
        assert!(!t.is_fully_bound());
    }

    #[test]
    fn test_maybe_never_nests() {
        let t = type_maybe(type_maybe(type_id("int64", loc())));

        assert_eq!("int64?", t.signature());
    }

    #[test]
    fn test_ref_never_nests() {
        let t = type_ref_to(type_ref_to(type_id("int64", loc())));

        assert_eq!("&int64", t.signature());
    }

    #[test]
    fn test_eval_expands_alias() {
        let mut aliases = TypeMap::new();
        aliases.insert("age".to_string(), type_integer(64, true));
        let env = TypeEnv::new(aliases);

        let evaluated = eval(&type_id("age", loc()), &env);
        assert_eq!("int64", evaluated.signature());
    }

    #[test]
    fn test_eval_beta_reduces_lambda_application() {
        let mut aliases = TypeMap::new();
        aliases.insert(
            "box".to_string(),
            type_lambda(
                "T",
                type_ptr(type_managed(type_variable("T", loc()))),
            ),
        );
        let env = TypeEnv::new(aliases);

        let applied = type_operator(type_id("box", loc()), type_id("int64", loc()));
        let evaluated = eval(&applied, &env);

        assert_eq!("*managed{int64}", evaluated.signature());
    }

    #[test]
    fn test_eval_is_bounded_on_recursive_aliases() {
        let mut aliases = TypeMap::new();
        // type loop matches loop
        aliases.insert("loop".to_string(), type_id("loop", loc()));
        let env = TypeEnv::new(aliases);

        // must terminate
        let evaluated = eval(&type_id("loop", loc()), &env);
        assert_eq!("loop", evaluated.signature());
    }

    #[test]
    fn test_boolean_refinement() {
        let env = TypeEnv::default();
        let maybe_int = type_maybe(type_id("int64", loc()));

        let narrowed = boolean_refinement(&maybe_int, false, &env).unwrap();
        assert_eq!("int64", narrowed.signature());

        let nil_side = boolean_refinement(&maybe_int, true, &env).unwrap();
        assert_eq!("nil", nil_side.signature());

        let bool_type = type_id("bool", loc());
        let falsy = boolean_refinement(&bool_type, true, &env).unwrap();
        assert_eq!("false", falsy.signature());

        assert!(boolean_refinement(&type_id("true", loc()), true, &env).is_none());
    }

    #[test]
    fn test_gensym_stream_is_deterministic() {
        let mut a = Gensym::default();
        let mut b = Gensym::default();

        assert_eq!(a.fresh(), b.fresh());
        assert_eq!(a.fresh(), b.fresh());
    }
}
