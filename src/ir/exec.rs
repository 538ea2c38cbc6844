use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::rc::Rc;

use log::trace;

use super::{CastOp, Instruction, IrFunction, IrModule, Value};

/// In-process evaluator for the typed IR. This stands in for the JIT of the
/// reference backend: the `run` command type-checks, lowers, and then
/// executes the IR directly against the runtime builtins.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    Bool(bool),
    Null,
    Unit,
    /// A stack slot or boxed value.
    Cell(Rc<RefCell<RtValue>>),
    /// A managed heap object carrying its runtime type id.
    Obj(Rc<Object>),
    /// The address of one dimension of an object.
    Slot(Rc<Object>, usize),
}

#[derive(Debug, PartialEq)]
pub struct Object {
    pub type_id: i32,
    pub dims: RefCell<Vec<RtValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub message: String,
}

impl ExecError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl Error for ExecError {}

type ExecResult<T> = Result<T, ExecError>;

pub struct Machine {
    functions: HashMap<String, IrFunction>,
    globals: HashMap<String, Rc<RefCell<RtValue>>>,
    /// Captured program output; flushed to stdout by the caller.
    pub output: String,
}

const STR_TYPE_ID: i32 = 1;

impl Machine {
    pub fn new(modules: &[IrModule]) -> Self {
        let mut functions = HashMap::new();
        let mut globals = HashMap::new();

        for module in modules {
            for function in &module.functions {
                functions.insert(function.name.clone(), function.clone());
            }
            for global in &module.globals {
                globals.insert(
                    global.name.clone(),
                    Rc::new(RefCell::new(const_value(&global.init))),
                );
            }
        }

        Self {
            functions,
            globals,
            output: String::new(),
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Run the entry function and return the process exit code. The entry
    /// point is expected to have called `__init_module_vars` itself (the
    /// synthesized `main` does); callers bypassing it do so explicitly.
    pub fn run(&mut self, entry: &str) -> ExecResult<i64> {
        let result = self.call(entry, vec![])?;
        match result {
            RtValue::Int(code) => Ok(code),
            RtValue::Unit | RtValue::Null => Ok(0),
            other => Err(ExecError::new(format!(
                "entry point returned a non-integer value: {other:?}"
            ))),
        }
    }

    pub fn call(&mut self, name: &str, args: Vec<RtValue>) -> ExecResult<RtValue> {
        let Some(function) = self.functions.get(name).cloned() else {
            return self.call_builtin(name, args);
        };

        trace!("calling {name} with {n} args", n = args.len());

        if args.len() != function.params.len() {
            return Err(ExecError::new(format!(
                "arity mismatch calling '{name}': expected {}, got {}",
                function.params.len(),
                args.len()
            )));
        }

        let mut regs: HashMap<usize, RtValue> = HashMap::new();
        for (index, arg) in args.into_iter().enumerate() {
            regs.insert(index, arg);
        }

        self.exec_function(&function, regs)
    }

    fn exec_function(
        &mut self,
        function: &IrFunction,
        mut regs: HashMap<usize, RtValue>,
    ) -> ExecResult<RtValue> {
        let mut block_index = 0usize;

        'blocks: loop {
            let block = function
                .blocks
                .get(block_index)
                .ok_or_else(|| ExecError::new("fell off the end of a function"))?;

            for instruction in &block.instructions {
                match instruction {
                    Instruction::Alloca { dst, .. } => {
                        regs.insert(
                            *dst,
                            RtValue::Cell(Rc::new(RefCell::new(RtValue::Unit))),
                        );
                    }
                    Instruction::Load { dst, src, .. } => {
                        let address = self.eval(src, &regs)?;
                        let value = load_from(&address)?;
                        regs.insert(*dst, value);
                    }
                    Instruction::Store { value, dst, .. } => {
                        let value = self.eval(value, &regs)?;
                        let address = self.eval(dst, &regs)?;
                        store_to(&address, value)?;
                    }
                    Instruction::Gep {
                        dst, base, index, ..
                    } => {
                        let base = self.eval(base, &regs)?;
                        let RtValue::Obj(object) = deref(base)? else {
                            return Err(ExecError::new("gep on a non-object"));
                        };
                        regs.insert(*dst, RtValue::Slot(object, *index));
                    }
                    Instruction::Call {
                        dst, callee, args, ..
                    } => {
                        let mut values = Vec::with_capacity(args.len());
                        for (_, arg) in args {
                            values.push(self.eval(arg, &regs)?);
                        }
                        let result = self.call(callee, values)?;
                        if let Some(dst) = dst {
                            regs.insert(*dst, result);
                        }
                    }
                    Instruction::Cast {
                        dst, op, value, to, ..
                    } => {
                        let value = self.eval(value, &regs)?;
                        let result = match (op, &value) {
                            (CastOp::Bitcast, _) => value,
                            (CastOp::Sext, RtValue::Int(v)) => RtValue::Int(*v),
                            (CastOp::Zext, RtValue::Int(v)) => RtValue::Int(*v),
                            (CastOp::Zext, RtValue::Bool(b)) => RtValue::Int(*b as i64),
                            (CastOp::Trunc, RtValue::Int(v)) => {
                                match to.integer_bits() {
                                    Some(64) | None => RtValue::Int(*v),
                                    Some(1) => RtValue::Bool(*v & 1 != 0),
                                    Some(bits) => {
                                        let mask = (1i64 << bits) - 1;
                                        RtValue::Int(v & mask)
                                    }
                                }
                            }
                            _ => {
                                return Err(ExecError::new(format!(
                                    "bad cast {op} on {value:?}"
                                )))
                            }
                        };
                        regs.insert(*dst, result);
                    }
                    Instruction::Br { label } => {
                        block_index = self.block_index(function, label)?;
                        continue 'blocks;
                    }
                    Instruction::CondBr {
                        cond,
                        then_label,
                        else_label,
                    } => {
                        let cond = self.eval(cond, &regs)?;
                        let truthy = match cond {
                            RtValue::Bool(b) => b,
                            RtValue::Int(v) => v != 0,
                            RtValue::Null => false,
                            _ => true,
                        };
                        let label = if truthy { then_label } else { else_label };
                        block_index = self.block_index(function, label)?;
                        continue 'blocks;
                    }
                    Instruction::Ret { value } => {
                        return match value {
                            Some((_, value)) => self.eval(value, &regs),
                            None => Ok(RtValue::Unit),
                        };
                    }
                    Instruction::Unreachable => {
                        return Err(ExecError::new("executed unreachable"));
                    }
                }
            }

            return Err(ExecError::new(format!(
                "block '{}' ended without a terminator",
                block.label
            )));
        }
    }

    fn block_index(&self, function: &IrFunction, label: &str) -> ExecResult<usize> {
        function
            .blocks
            .iter()
            .position(|block| block.label == label)
            .ok_or_else(|| ExecError::new(format!("no such block '{label}'")))
    }

    fn eval(&self, value: &Value, regs: &HashMap<usize, RtValue>) -> ExecResult<RtValue> {
        match value {
            Value::Reg(reg) => regs
                .get(reg)
                .cloned()
                .ok_or_else(|| ExecError::new(format!("use of undefined register %{reg}"))),
            Value::Global(name) => self
                .globals
                .get(name)
                .map(|cell| RtValue::Cell(cell.clone()))
                .ok_or_else(|| ExecError::new(format!("use of undefined global @{name}"))),
            Value::Int(v) => Ok(RtValue::Int(*v)),
            Value::Float(v) => Ok(RtValue::Float(*v)),
            Value::Str(s) => Ok(RtValue::Str(Rc::new(s.clone()))),
            Value::Bool(b) => Ok(RtValue::Bool(*b)),
            Value::Null => Ok(RtValue::Null),
            Value::Unit => Ok(RtValue::Unit),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<RtValue>) -> ExecResult<RtValue> {
        let arity_error = || ExecError::new(format!("bad arguments to builtin '{name}'"));

        match name {
            "__plus__" | "__minus__" | "__times__" | "__divide__" | "__mod__" => {
                let [a, b] = two(args).ok_or_else(arity_error)?;
                arith(name, a, b)
            }
            "__eq__" | "__ineq__" | "__lt__" | "__lte__" | "__gt__" | "__gte__" => {
                let [a, b] = two(args).ok_or_else(arity_error)?;
                compare(name, a, b)
            }
            "__not__" => match args.into_iter().next() {
                Some(RtValue::Bool(b)) => Ok(RtValue::Bool(!b)),
                _ => Err(arity_error()),
            },
            "__negative__" => match args.into_iter().next() {
                Some(RtValue::Int(v)) => Ok(RtValue::Int(-v)),
                Some(RtValue::Float(v)) => Ok(RtValue::Float(-v)),
                _ => Err(arity_error()),
            },
            "__positive__" => args.into_iter().next().ok_or_else(arity_error),
            "__box__" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                Ok(RtValue::Cell(Rc::new(RefCell::new(value))))
            }
            "__str__" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                Ok(RtValue::Str(Rc::new(render_value(&value))))
            }
            "print" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                self.output.push_str(&render_value(&value));
                self.output.push('\n');
                Ok(RtValue::Unit)
            }
            "putstr" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                let text = render_value(&value);
                self.output.push_str(&text);
                Ok(RtValue::Int(text.len() as i64))
            }
            "__allocate" => {
                let [type_id, ndims] = two(args).ok_or_else(arity_error)?;
                let (RtValue::Int(type_id), RtValue::Int(ndims)) = (type_id, ndims) else {
                    return Err(arity_error());
                };
                Ok(RtValue::Obj(Rc::new(Object {
                    type_id: type_id as i32,
                    dims: RefCell::new(vec![RtValue::Unit; ndims as usize]),
                })))
            }
            "__addref_var" | "__release_var" => Ok(RtValue::Unit),
            "__get_var_type_id" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                let type_id = match deref(value)? {
                    RtValue::Obj(object) => object.type_id,
                    RtValue::Str(_) => STR_TYPE_ID,
                    _ => 0,
                };
                Ok(RtValue::Int(type_id as i64))
            }
            "__type_id_eq_type_id" => {
                let [a, b] = two(args).ok_or_else(arity_error)?;
                Ok(RtValue::Bool(a == b))
            }
            "__not_nil__" => {
                let value = args.into_iter().next().ok_or_else(arity_error)?;
                Ok(RtValue::Bool(!matches!(value, RtValue::Null)))
            }
            _ => Err(ExecError::new(format!("call to unknown function '{name}'"))),
        }
    }
}

fn two(args: Vec<RtValue>) -> Option<[RtValue; 2]> {
    let mut iter = args.into_iter();
    let a = iter.next()?;
    let b = iter.next()?;
    if iter.next().is_some() {
        return None;
    }
    Some([a, b])
}

fn const_value(value: &Value) -> RtValue {
    match value {
        Value::Int(v) => RtValue::Int(*v),
        Value::Float(v) => RtValue::Float(*v),
        Value::Str(s) => RtValue::Str(Rc::new(s.clone())),
        Value::Bool(b) => RtValue::Bool(*b),
        Value::Null => RtValue::Null,
        _ => RtValue::Unit,
    }
}

fn deref(value: RtValue) -> ExecResult<RtValue> {
    match value {
        RtValue::Cell(cell) => {
            let inner = cell.borrow().clone();
            Ok(inner)
        }
        other => Ok(other),
    }
}

fn load_from(address: &RtValue) -> ExecResult<RtValue> {
    match address {
        RtValue::Cell(cell) => Ok(cell.borrow().clone()),
        RtValue::Slot(object, index) => object
            .dims
            .borrow()
            .get(*index)
            .cloned()
            .ok_or_else(|| ExecError::new("load from out-of-range dimension")),
        _ => Err(ExecError::new("load from a non-address value")),
    }
}

fn store_to(address: &RtValue, value: RtValue) -> ExecResult<()> {
    match address {
        RtValue::Cell(cell) => {
            *cell.borrow_mut() = value;
            Ok(())
        }
        RtValue::Slot(object, index) => {
            let mut dims = object.dims.borrow_mut();
            if *index >= dims.len() {
                return Err(ExecError::new("store to out-of-range dimension"));
            }
            dims[*index] = value;
            Ok(())
        }
        _ => Err(ExecError::new("store to a non-address value")),
    }
}

fn arith(name: &str, a: RtValue, b: RtValue) -> ExecResult<RtValue> {
    match (a, b) {
        (RtValue::Int(a), RtValue::Int(b)) => {
            let result = match name {
                "__plus__" => a.wrapping_add(b),
                "__minus__" => a.wrapping_sub(b),
                "__times__" => a.wrapping_mul(b),
                "__divide__" => {
                    if b == 0 {
                        return Err(ExecError::new("integer division by zero"));
                    }
                    a / b
                }
                "__mod__" => {
                    if b == 0 {
                        return Err(ExecError::new("integer modulo by zero"));
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(RtValue::Int(result))
        }
        (RtValue::Float(a), RtValue::Float(b)) => {
            let result = match name {
                "__plus__" => a + b,
                "__minus__" => a - b,
                "__times__" => a * b,
                "__divide__" => a / b,
                "__mod__" => a % b,
                _ => unreachable!(),
            };
            Ok(RtValue::Float(result))
        }
        (RtValue::Str(a), RtValue::Str(b)) if name == "__plus__" => {
            Ok(RtValue::Str(Rc::new(format!("{a}{b}"))))
        }
        (a, b) => Err(ExecError::new(format!(
            "bad operands for {name}: {a:?} and {b:?}"
        ))),
    }
}

fn compare(name: &str, a: RtValue, b: RtValue) -> ExecResult<RtValue> {
    let ordering = match (&a, &b) {
        (RtValue::Int(a), RtValue::Int(b)) => a.partial_cmp(b),
        (RtValue::Float(a), RtValue::Float(b)) => a.partial_cmp(b),
        (RtValue::Str(a), RtValue::Str(b)) => a.partial_cmp(b),
        (RtValue::Bool(a), RtValue::Bool(b)) => a.partial_cmp(b),
        (RtValue::Null, RtValue::Null) => Some(std::cmp::Ordering::Equal),
        _ => None,
    };

    let Some(ordering) = ordering else {
        return match name {
            "__eq__" => Ok(RtValue::Bool(false)),
            "__ineq__" => Ok(RtValue::Bool(true)),
            _ => Err(ExecError::new(format!(
                "bad operands for {name}: {a:?} and {b:?}"
            ))),
        };
    };

    let result = match name {
        "__eq__" => ordering.is_eq(),
        "__ineq__" => !ordering.is_eq(),
        "__lt__" => ordering.is_lt(),
        "__lte__" => ordering.is_le(),
        "__gt__" => ordering.is_gt(),
        "__gte__" => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(RtValue::Bool(result))
}

fn render_value(value: &RtValue) -> String {
    match value {
        RtValue::Int(v) => v.to_string(),
        RtValue::Float(v) => v.to_string(),
        RtValue::Str(s) => s.to_string(),
        RtValue::Bool(b) => b.to_string(),
        RtValue::Null => "nil".to_string(),
        RtValue::Unit => String::new(),
        RtValue::Cell(cell) => render_value(&cell.borrow()),
        RtValue::Obj(object) => format!("<object #{}>", object.type_id),
        RtValue::Slot(..) => "<slot>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{FunctionBuilder, IrType};
    use super::*;

    #[test]
    fn test_run_arithmetic() {
        let mut module = IrModule::new("arith");
        let mut builder = FunctionBuilder::new("main", vec![], IrType::I64);
        let sum = builder.call(
            IrType::I64,
            "__plus__",
            vec![(IrType::I64, Value::Int(40)), (IrType::I64, Value::Int(2))],
        );
        builder.ret(Some((IrType::I64, sum)));
        module.functions.push(builder.finish());

        let mut machine = Machine::new(&[module]);
        assert_eq!(42, machine.run("main").unwrap());
    }

    #[test]
    fn test_globals_and_branches() {
        let mut module = IrModule::new("m");
        module.globals.push(super::super::GlobalDecl {
            name: "m.x".to_string(),
            ty: IrType::I64,
            init: Value::Int(10),
        });

        let mut builder = FunctionBuilder::new("main", vec![], IrType::I64);
        let loaded = builder.load(IrType::I64, Value::Global("m.x".to_string()));
        let is_ten = builder.call(
            IrType::I1,
            "__eq__",
            vec![(IrType::I64, loaded.clone()), (IrType::I64, Value::Int(10))],
        );
        let then_label = builder.add_block("then");
        let else_label = builder.add_block("else");
        builder.cond_br(is_ten, &then_label, &else_label);
        builder.set_current_block(&then_label);
        builder.ret(Some((IrType::I64, Value::Int(0))));
        builder.set_current_block(&else_label);
        builder.ret(Some((IrType::I64, Value::Int(1))));
        module.functions.push(builder.finish());

        let mut machine = Machine::new(&[module]);
        assert_eq!(0, machine.run("main").unwrap());
    }

    #[test]
    fn test_print_collects_output() {
        let mut module = IrModule::new("m");
        let mut builder = FunctionBuilder::new("main", vec![], IrType::I64);
        builder.call(
            IrType::Void,
            "print",
            vec![(IrType::Str, Value::Str("hello".to_string()))],
        );
        builder.ret(Some((IrType::I64, Value::Int(0))));
        module.functions.push(builder.finish());

        let mut machine = Machine::new(&[module]);
        machine.run("main").unwrap();
        assert_eq!("hello\n", machine.output);
    }

    #[test]
    fn test_objects_and_type_ids() {
        let mut machine = Machine::new(&[]);
        let object = machine
            .call("__allocate", vec![RtValue::Int(7), RtValue::Int(2)])
            .unwrap();

        let type_id = machine
            .call("__get_var_type_id", vec![object])
            .unwrap();
        assert_eq!(RtValue::Int(7), type_id);
    }
}
