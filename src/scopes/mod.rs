use std::collections::{BTreeMap, HashMap};

use log::trace;

use crate::ir::{IrModule, IrType, Value};
use crate::location::Location;
use crate::parser::ast;
use crate::types::{NameIndex, TypeEnv, TypeMap, TypeRef};

/// Index of a scope in the program's scope arena. Parents are held as
/// indices, so the arena owns every scope and nothing points upward by
/// reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

pub const PROGRAM_SCOPE: ScopeId = ScopeId(0);

/// The IR module holding program-level globals and `__init_module_vars`.
pub const PROGRAM_IR_MODULE: &str = "__program__";

/// A name bound to a typed, lowered value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVar {
    pub name: String,
    pub type_: TypeRef,
    pub ir_type: IrType,
    pub value: Value,
    pub location: Location,
    pub is_global: bool,
}

/// A logical type paired with its lowered representation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundType {
    pub type_: TypeRef,
    pub lowered: IrType,
    pub location: Location,
    pub dimensions: Vec<TypeRef>,
    pub name_index: NameIndex,
}

/// A yet-to-be-elaborated definition. Generic definitions stay unchecked
/// until a concrete use site forces an instantiation.
#[derive(Debug, Clone)]
pub struct UncheckedVar {
    pub name: String,
    pub location: Location,
    pub module_scope: ScopeId,
    pub kind: UncheckedVarKind,
}

#[derive(Debug, Clone)]
pub enum UncheckedVarKind {
    Function(ast::FunctionDefn),
    /// A generated data constructor: allocates, stamps the type id, and
    /// stores each dimension.
    DataCtor {
        args: Vec<TypeRef>,
        result: TypeRef,
        name_index: NameIndex,
    },
}

#[derive(Debug, Clone)]
pub struct UncheckedType {
    pub module_scope: ScopeId,
    pub kind: UncheckedTypeKind,
}

#[derive(Debug, Clone)]
pub enum UncheckedTypeKind {
    TypeDef(ast::TypeDef),
    Tag(ast::TagDecl),
}

/// A callable gathered from the scope chain: either already bound or still
/// awaiting elaboration.
#[derive(Debug, Clone)]
pub enum Callable {
    Bound(BoundVar),
    Unchecked(usize),
}

#[derive(Debug, Clone)]
pub struct LoopContext {
    pub continue_label: String,
    pub break_label: String,
}

#[derive(Debug)]
pub enum ScopeKind {
    Program,
    Module {
        name: String,
    },
    Function {
        name: String,
        return_type_constraint: Option<TypeRef>,
    },
    Local {
        loop_context: Option<LoopContext>,
    },
    /// Transient wrapper carrying one generic instantiation's bindings.
    GenericSubstitution,
}

#[derive(Debug)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    bound_vars: HashMap<String, Vec<BoundVar>>,
    typename_env: TypeMap,
    type_variable_bindings: TypeMap,
    unchecked_vars: HashMap<String, Vec<usize>>,
    module_aliases: HashMap<String, ScopeId>,
}

impl ScopeData {
    fn new(parent: Option<ScopeId>, kind: ScopeKind) -> Self {
        Self {
            parent,
            kind,
            bound_vars: HashMap::new(),
            typename_env: TypeMap::new(),
            type_variable_bindings: TypeMap::new(),
            unchecked_vars: HashMap::new(),
            module_aliases: HashMap::new(),
        }
    }
}

/// The tree of lexical environments, flattened into an arena. The program
/// scope additionally owns bound-type interning, runtime type ids, the
/// generic-instantiation memo, and the IR modules the checker emits into.
#[derive(Debug)]
pub struct Scopes {
    scopes: Vec<ScopeData>,
    module_scopes: BTreeMap<String, ScopeId>,
    pub unchecked_vars: Vec<UncheckedVar>,
    pub unchecked_types: Vec<UncheckedType>,
    bound_types: BTreeMap<String, BoundType>,
    type_ids: BTreeMap<String, i32>,
    next_type_id: i32,
    instantiations: HashMap<String, BoundVar>,
    pub ir_modules: BTreeMap<String, IrModule>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        let mut scopes = Self {
            scopes: vec![ScopeData::new(None, ScopeKind::Program)],
            module_scopes: BTreeMap::new(),
            unchecked_vars: vec![],
            unchecked_types: vec![],
            bound_types: BTreeMap::new(),
            type_ids: BTreeMap::new(),
            // type id 1 is reserved for str
            next_type_id: 2,
            instantiations: HashMap::new(),
            ir_modules: BTreeMap::new(),
        };
        scopes
            .ir_modules
            .insert(PROGRAM_IR_MODULE.to_string(), IrModule::new(PROGRAM_IR_MODULE));
        scopes
    }

    fn add(&mut self, data: ScopeData) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(data);
        id
    }

    pub fn new_module_scope(&mut self, name: &str) -> ScopeId {
        let id = self.add(ScopeData::new(
            Some(PROGRAM_SCOPE),
            ScopeKind::Module {
                name: name.to_string(),
            },
        ));
        self.module_scopes.insert(name.to_string(), id);
        self.ir_modules
            .entry(name.to_string())
            .or_insert_with(|| IrModule::new(name));
        id
    }

    pub fn new_function_scope(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        self.add(ScopeData::new(
            Some(parent),
            ScopeKind::Function {
                name: name.to_string(),
                return_type_constraint: None,
            },
        ))
    }

    pub fn new_local_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.add(ScopeData::new(
            Some(parent),
            ScopeKind::Local { loop_context: None },
        ))
    }

    pub fn new_loop_scope(&mut self, parent: ScopeId, loop_context: LoopContext) -> ScopeId {
        self.add(ScopeData::new(
            Some(parent),
            ScopeKind::Local {
                loop_context: Some(loop_context),
            },
        ))
    }

    pub fn new_generic_scope(&mut self, parent: ScopeId, bindings: TypeMap) -> ScopeId {
        let mut data = ScopeData::new(Some(parent), ScopeKind::GenericSubstitution);
        data.type_variable_bindings = bindings;
        self.add(data)
    }

    fn data(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.0]
    }

    fn data_mut(&mut self, id: ScopeId) -> &mut ScopeData {
        &mut self.scopes[id.0]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.data(id).parent
    }

    pub fn find_module_scope(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(target) = self.data(id).module_aliases.get(name) {
                return Some(*target);
            }
            current = self.data(id).parent;
        }
        None
    }

    pub fn add_module_alias(&mut self, scope: ScopeId, alias: &str, target: ScopeId) {
        self.data_mut(scope)
            .module_aliases
            .insert(alias.to_string(), target);
    }

    pub fn module_scope_by_name(&self, name: &str) -> Option<ScopeId> {
        self.module_scopes.get(name).copied()
    }

    /// The name of the module enclosing this scope, if any.
    pub fn module_name(&self, from: ScopeId) -> Option<String> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let ScopeKind::Module { name } = &self.data(id).kind {
                return Some(name.clone());
            }
            current = self.data(id).parent;
        }
        None
    }

    /// Idempotent-with-error insertion. Re-binding the same name with the
    /// same signature is a no-op; function overloads with distinct
    /// signatures accumulate; everything else is an error paired with the
    /// previous location.
    pub fn put_bound_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        var: BoundVar,
    ) -> Result<(), (String, Location)> {
        trace!("binding '{name}' : {type_}", type_ = var.type_);

        let vars = self
            .data_mut(scope)
            .bound_vars
            .entry(name.to_string())
            .or_default();

        for existing in vars.iter() {
            if existing.type_.signature() == var.type_.signature() {
                return Ok(());
            }
            if !(existing.type_.is_function() && var.type_.is_function()) {
                return Err((
                    format!("'{name}' is already bound with type {}", existing.type_),
                    existing.location.clone(),
                ));
            }
        }

        vars.push(var);
        Ok(())
    }

    /// All bound variables for a name in the nearest scope that has any.
    pub fn get_bound_variables(&self, from: ScopeId, name: &str) -> Vec<BoundVar> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(vars) = self.data(id).bound_vars.get(name) {
                return vars.clone();
            }
            current = self.data(id).parent;
        }
        vec![]
    }

    pub fn get_bound_variable(&self, from: ScopeId, name: &str) -> Option<BoundVar> {
        let vars = self.get_bound_variables(from, name);
        if vars.len() == 1 {
            return vars.into_iter().next();
        }
        None
    }

    /// Is the name bound directly in this scope (not an ancestor)?
    pub fn bound_in_this_scope(&self, scope: ScopeId, name: &str) -> bool {
        self.data(scope).bound_vars.contains_key(name)
    }

    pub fn add_unchecked_var(&mut self, scope: ScopeId, var: UncheckedVar) -> usize {
        let index = self.unchecked_vars.len();
        let name = var.name.clone();
        self.unchecked_vars.push(var);
        self.data_mut(scope)
            .unchecked_vars
            .entry(name)
            .or_default()
            .push(index);
        index
    }

    pub fn add_unchecked_type(&mut self, unchecked_type: UncheckedType) {
        self.unchecked_types.push(unchecked_type);
    }

    /// Accumulate bound and unchecked callables for a name, walking from
    /// this scope up through all ancestors.
    pub fn get_callables(&self, from: ScopeId, name: &str) -> Vec<Callable> {
        let mut callables = vec![];
        let mut current = Some(from);
        while let Some(id) = current {
            let data = self.data(id);
            if let Some(vars) = data.bound_vars.get(name) {
                for var in vars {
                    if var.type_.is_function() {
                        callables.push(Callable::Bound(var.clone()));
                    }
                }
            }
            if let Some(indices) = data.unchecked_vars.get(name) {
                for index in indices {
                    callables.push(Callable::Unchecked(*index));
                }
            }
            current = data.parent;
        }
        callables
    }

    pub fn put_typename(&mut self, scope: ScopeId, name: &str, type_: TypeRef) {
        self.data_mut(scope)
            .typename_env
            .insert(name.to_string(), type_);
    }

    /// The merged typename environment visible from a scope; nearer scopes
    /// shadow outer ones.
    pub fn type_env(&self, from: ScopeId) -> TypeEnv {
        let mut chain = vec![];
        let mut current = Some(from);
        while let Some(id) = current {
            chain.push(id);
            current = self.data(id).parent;
        }

        let mut aliases = TypeMap::new();
        for id in chain.into_iter().rev() {
            for (name, type_) in &self.data(id).typename_env {
                aliases.insert(name.clone(), type_.clone());
            }
        }
        TypeEnv::new(aliases)
    }

    /// The merged type-variable substitution context visible from a scope.
    pub fn type_bindings(&self, from: ScopeId) -> TypeMap {
        let mut chain = vec![];
        let mut current = Some(from);
        while let Some(id) = current {
            chain.push(id);
            current = self.data(id).parent;
        }

        let mut bindings = TypeMap::new();
        for id in chain.into_iter().rev() {
            for (name, type_) in &self.data(id).type_variable_bindings {
                bindings.insert(name.clone(), type_.clone());
            }
        }
        bindings
    }

    pub fn set_return_type_constraint(&mut self, from: ScopeId, type_: TypeRef) {
        let mut current = Some(from);
        while let Some(id) = current {
            if let ScopeKind::Function {
                return_type_constraint,
                ..
            } = &mut self.data_mut(id).kind
            {
                *return_type_constraint = Some(type_);
                return;
            }
            current = self.data(id).parent;
        }
    }

    pub fn get_return_type_constraint(&self, from: ScopeId) -> Option<TypeRef> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let ScopeKind::Function {
                return_type_constraint,
                ..
            } = &self.data(id).kind
            {
                return return_type_constraint.clone();
            }
            current = self.data(id).parent;
        }
        None
    }

    /// The innermost enclosing loop's break/continue labels, stopping at
    /// function boundaries.
    pub fn nearest_loop(&self, from: ScopeId) -> Option<LoopContext> {
        let mut current = Some(from);
        while let Some(id) = current {
            match &self.data(id).kind {
                ScopeKind::Local {
                    loop_context: Some(context),
                } => return Some(context.clone()),
                ScopeKind::Function { .. } => return None,
                _ => {}
            }
            current = self.data(id).parent;
        }
        None
    }

    /// Intern a bound type by signature. Inserts are idempotent; a conflict
    /// on the lowered representation is an error.
    pub fn upsert_bound_type(&mut self, bound_type: BoundType) -> Result<(), String> {
        let signature = bound_type.type_.signature();
        if let Some(existing) = self.bound_types.get(&signature) {
            if existing.lowered != bound_type.lowered {
                return Err(format!(
                    "conflicting lowered representations for type {signature}"
                ));
            }
            return Ok(());
        }
        self.bound_types.insert(signature, bound_type);
        Ok(())
    }

    pub fn get_bound_type(&self, signature: &str) -> Option<&BoundType> {
        self.bound_types.get(signature)
    }

    /// Runtime type ids are assigned densely by first use, keyed by type
    /// signature, so they are deterministic across runs.
    pub fn get_or_assign_type_id(&mut self, signature: &str) -> i32 {
        if signature == "str" {
            return 1;
        }
        if let Some(id) = self.type_ids.get(signature) {
            return *id;
        }
        let id = self.next_type_id;
        self.next_type_id += 1;
        self.type_ids.insert(signature.to_string(), id);
        id
    }

    pub fn get_instantiation(&self, key: &str) -> Option<BoundVar> {
        self.instantiations.get(key).cloned()
    }

    /// Find an instantiated function by its emitted symbol name.
    pub fn get_instantiation_by_name(&self, fn_name: &str) -> Option<BoundVar> {
        self.instantiations
            .values()
            .find(|var| matches!(&var.value, Value::Global(name) if name == fn_name))
            .cloned()
    }

    pub fn memoize_instantiation(&mut self, key: String, var: BoundVar) {
        self.instantiations.insert(key, var);
    }

    pub fn ir_module_mut(&mut self, name: &str) -> &mut IrModule {
        self.ir_modules
            .entry(name.to_string())
            .or_insert_with(|| IrModule::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{type_args, type_function, type_id, NameIndex};

    fn int() -> TypeRef {
        type_id("int", Location::builtin())
    }

    fn fn_type(params: Vec<TypeRef>, ret: TypeRef) -> TypeRef {
        type_function(type_args(params, NameIndex::new()), ret)
    }

    fn var(name: &str, type_: TypeRef) -> BoundVar {
        BoundVar {
            name: name.to_string(),
            type_,
            ir_type: IrType::I64,
            value: Value::Int(0),
            location: Location::builtin(),
            is_global: false,
        }
    }

    #[test]
    fn test_rebinding_same_signature_is_a_noop() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");

        scopes
            .put_bound_variable(module, "x", var("x", int()))
            .unwrap();
        scopes
            .put_bound_variable(module, "x", var("x", int()))
            .unwrap();

        assert_eq!(1, scopes.get_bound_variables(module, "x").len());
    }

    #[test]
    fn test_conflicting_nonfunction_rebinding_is_an_error() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");

        scopes
            .put_bound_variable(module, "x", var("x", int()))
            .unwrap();
        let result =
            scopes.put_bound_variable(module, "x", var("x", type_id("str", Location::builtin())));

        assert!(result.is_err());
    }

    #[test]
    fn test_function_overloads_accumulate() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");

        scopes
            .put_bound_variable(module, "f", var("f", fn_type(vec![int()], int())))
            .unwrap();
        scopes
            .put_bound_variable(
                module,
                "f",
                var(
                    "f",
                    fn_type(vec![type_id("str", Location::builtin())], int()),
                ),
            )
            .unwrap();

        assert_eq!(2, scopes.get_callables(module, "f").len());
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");
        let function = scopes.new_function_scope(module, "f");
        let local = scopes.new_local_scope(function);

        scopes
            .put_bound_variable(module, "x", var("x", int()))
            .unwrap();

        assert!(scopes.get_bound_variable(local, "x").is_some());
        assert!(!scopes.bound_in_this_scope(local, "x"));
    }

    #[test]
    fn test_type_env_shadows_outward() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");
        let function = scopes.new_function_scope(module, "f");

        scopes.put_typename(PROGRAM_SCOPE, "t", int());
        scopes.put_typename(module, "t", type_id("str", Location::builtin()));

        let env = scopes.type_env(function);
        assert_eq!("str", env.lookup("t").unwrap().signature());
    }

    #[test]
    fn test_return_constraint_reaches_enclosing_function() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");
        let function = scopes.new_function_scope(module, "f");
        let local = scopes.new_local_scope(function);

        assert!(scopes.get_return_type_constraint(local).is_none());
        scopes.set_return_type_constraint(local, int());
        assert_eq!(
            "int",
            scopes.get_return_type_constraint(function).unwrap().signature()
        );
    }

    #[test]
    fn test_nearest_loop_stops_at_function_boundary() {
        let mut scopes = Scopes::new();
        let module = scopes.new_module_scope("m");
        let function = scopes.new_function_scope(module, "f");
        let loop_scope = scopes.new_loop_scope(
            function,
            LoopContext {
                continue_label: "cond.1".to_string(),
                break_label: "end.2".to_string(),
            },
        );
        let inner_function = scopes.new_function_scope(loop_scope, "g");

        assert!(scopes.nearest_loop(loop_scope).is_some());
        assert!(scopes.nearest_loop(inner_function).is_none());
    }

    #[test]
    fn test_type_ids_are_deterministic() {
        let mut scopes = Scopes::new();

        let a = scopes.get_or_assign_type_id("m.circle");
        let b = scopes.get_or_assign_type_id("m.square");

        assert_eq!(a, scopes.get_or_assign_type_id("m.circle"));
        assert_ne!(a, b);
        assert_eq!(1, scopes.get_or_assign_type_id("str"));
    }
}
