pub mod exec;
pub mod reader;
mod render;

use std::fmt::Display;

/// The lowered representation of a type. This is the opaque handle side of a
/// bound type; the logical type system never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F64,
    Str,
    Ptr(Box<IrType>),
    Struct(Vec<IrType>),
    Fn {
        params: Vec<IrType>,
        ret: Box<IrType>,
    },
    Void,
}

impl IrType {
    pub fn ptr_to(element: IrType) -> IrType {
        IrType::Ptr(Box::new(element))
    }

    /// An opaque pointer, used for type-erased managed values.
    pub fn opaque_ptr() -> IrType {
        IrType::ptr_to(IrType::I8)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, IrType::Ptr(_) | IrType::Str)
    }

    pub fn integer_bits(&self) -> Option<u32> {
        match self {
            IrType::I1 => Some(1),
            IrType::I8 => Some(8),
            IrType::I16 => Some(16),
            IrType::I32 => Some(32),
            IrType::I64 => Some(64),
            _ => None,
        }
    }

    /// Byte size of the lowered representation; what `sizeof` reports.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            IrType::I1 | IrType::I8 => 1,
            IrType::I16 => 2,
            IrType::I32 => 4,
            IrType::I64 | IrType::F64 => 8,
            IrType::Str | IrType::Ptr(_) | IrType::Fn { .. } => 8,
            IrType::Struct(dims) => dims.iter().map(IrType::size_in_bytes).sum(),
            IrType::Void => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A virtual register, `%n`. Function parameters occupy the first
    /// registers.
    Reg(usize),
    /// A named global, `@name`.
    Global(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Bitcast,
    Sext,
    Zext,
    Trunc,
}

impl Display for CastOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastOp::Bitcast => f.write_str("bitcast"),
            CastOp::Sext => f.write_str("sext"),
            CastOp::Zext => f.write_str("zext"),
            CastOp::Trunc => f.write_str("trunc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserve a stack slot; `dst` is a pointer to it.
    Alloca {
        dst: usize,
        ty: IrType,
        name: String,
    },
    Load {
        dst: usize,
        ty: IrType,
        src: Value,
    },
    Store {
        ty: IrType,
        value: Value,
        dst: Value,
    },
    /// Address of a struct member.
    Gep {
        dst: usize,
        ty: IrType,
        base: Value,
        index: usize,
    },
    Call {
        dst: Option<usize>,
        ret: IrType,
        callee: String,
        args: Vec<(IrType, Value)>,
    },
    Cast {
        dst: usize,
        op: CastOp,
        value: Value,
        from: IrType,
        to: IrType,
    },
    Br {
        label: String,
    },
    CondBr {
        cond: Value,
        then_label: String,
        else_label: String,
    },
    Ret {
        value: Option<(IrType, Value)>,
    },
    Unreachable,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Br { .. }
                | Instruction::CondBr { .. }
                | Instruction::Ret { .. }
                | Instruction::Unreachable
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub ret: IrType,
    pub blocks: Vec<IrBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: IrType,
    pub init: Value,
}

/// One IR module per source module, plus one program-level module holding
/// globals and the module-initializer function.
#[derive(Debug, Clone, PartialEq)]
pub struct IrModule {
    pub name: String,
    pub externs: Vec<ExternDecl>,
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<IrFunction>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            externs: vec![],
            globals: vec![],
            functions: vec![],
        }
    }

    pub fn declare_extern(&mut self, name: impl Into<String>, params: Vec<IrType>, ret: IrType) {
        let name = name.into();
        if self.externs.iter().any(|decl| decl.name == name) {
            return;
        }
        self.externs.push(ExternDecl { name, params, ret });
    }
}

/// Incrementally builds one IR function, one basic block at a time.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    params: Vec<(String, IrType)>,
    ret: IrType,
    blocks: Vec<IrBlock>,
    current: usize,
    next_reg: usize,
    next_label: usize,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: Vec<(String, IrType)>, ret: IrType) -> Self {
        let next_reg = params.len();
        Self {
            name: name.into(),
            params,
            ret,
            blocks: vec![IrBlock {
                label: "entry".to_string(),
                instructions: vec![],
            }],
            current: 0,
            next_reg,
            next_label: 0,
        }
    }

    pub fn param_value(&self, index: usize) -> Value {
        Value::Reg(index)
    }

    pub fn set_return_type(&mut self, ret: IrType) {
        self.ret = ret;
    }

    pub fn return_type(&self) -> &IrType {
        &self.ret
    }

    pub fn fresh_reg(&mut self) -> usize {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    pub fn add_block(&mut self, hint: &str) -> String {
        self.next_label += 1;
        let label = format!("{hint}.{}", self.next_label);
        self.blocks.push(IrBlock {
            label: label.clone(),
            instructions: vec![],
        });
        label
    }

    pub fn set_current_block(&mut self, label: &str) {
        self.current = self
            .blocks
            .iter()
            .position(|block| block.label == label)
            .unwrap_or(self.current);
    }

    pub fn current_block_terminated(&self) -> bool {
        self.blocks[self.current]
            .instructions
            .last()
            .is_some_and(Instruction::is_terminator)
    }

    pub fn emit(&mut self, instruction: Instruction) {
        // nothing may follow a terminator within a block
        if self.current_block_terminated() {
            return;
        }
        self.blocks[self.current].instructions.push(instruction);
    }

    pub fn alloca(&mut self, ty: IrType, name: impl Into<String>) -> Value {
        let dst = self.fresh_reg();
        self.emit(Instruction::Alloca {
            dst,
            ty,
            name: name.into(),
        });
        Value::Reg(dst)
    }

    pub fn load(&mut self, ty: IrType, src: Value) -> Value {
        let dst = self.fresh_reg();
        self.emit(Instruction::Load { dst, ty, src });
        Value::Reg(dst)
    }

    pub fn store(&mut self, ty: IrType, value: Value, dst: Value) {
        self.emit(Instruction::Store { ty, value, dst });
    }

    pub fn gep(&mut self, ty: IrType, base: Value, index: usize) -> Value {
        let dst = self.fresh_reg();
        self.emit(Instruction::Gep {
            dst,
            ty,
            base,
            index,
        });
        Value::Reg(dst)
    }

    pub fn call(&mut self, ret: IrType, callee: impl Into<String>, args: Vec<(IrType, Value)>) -> Value {
        if ret == IrType::Void {
            self.emit(Instruction::Call {
                dst: None,
                ret,
                callee: callee.into(),
                args,
            });
            return Value::Unit;
        }
        let dst = self.fresh_reg();
        self.emit(Instruction::Call {
            dst: Some(dst),
            ret,
            callee: callee.into(),
            args,
        });
        Value::Reg(dst)
    }

    pub fn cast(&mut self, op: CastOp, value: Value, from: IrType, to: IrType) -> Value {
        let dst = self.fresh_reg();
        self.emit(Instruction::Cast {
            dst,
            op,
            value,
            from,
            to,
        });
        Value::Reg(dst)
    }

    pub fn br(&mut self, label: &str) {
        self.emit(Instruction::Br {
            label: label.to_string(),
        });
    }

    pub fn cond_br(&mut self, cond: Value, then_label: &str, else_label: &str) {
        self.emit(Instruction::CondBr {
            cond,
            then_label: then_label.to_string(),
            else_label: else_label.to_string(),
        });
    }

    pub fn ret(&mut self, value: Option<(IrType, Value)>) {
        self.emit(Instruction::Ret { value });
    }

    pub fn finish(self) -> IrFunction {
        IrFunction {
            name: self.name,
            params: self.params,
            ret: self.ret,
            blocks: self.blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_emits_into_current_block() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::I64);
        let value = builder.call(
            IrType::I64,
            "__plus__",
            vec![(IrType::I64, Value::Int(1)), (IrType::I64, Value::Int(2))],
        );
        builder.ret(Some((IrType::I64, value)));

        let function = builder.finish();
        assert_eq!(1, function.blocks.len());
        assert_eq!(2, function.blocks[0].instructions.len());
        assert!(function.blocks[0].instructions[1].is_terminator());
    }

    #[test]
    fn test_nothing_follows_a_terminator() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        builder.ret(None);
        builder.store(IrType::I64, Value::Int(1), Value::Reg(0));

        let function = builder.finish();
        assert_eq!(1, function.blocks[0].instructions.len());
    }

    #[test]
    fn test_param_registers_precede_fresh_registers() {
        let mut builder = FunctionBuilder::new(
            "f",
            vec![("x".to_string(), IrType::I64)],
            IrType::I64,
        );

        assert_eq!(Value::Reg(0), builder.param_value(0));
        assert_eq!(1, builder.fresh_reg());
    }

    #[test]
    fn test_struct_size() {
        let ty = IrType::Struct(vec![IrType::I64, IrType::I1, IrType::F64]);

        assert_eq!(17, ty.size_in_bytes());
    }
}
