use std::fmt::Display;

use super::{
    ExternDecl, GlobalDecl, Instruction, IrBlock, IrFunction, IrModule, IrType, Value,
};

/// The textual `.llir` rendering. The reader in `ir::reader` parses exactly
/// this format back, so changes here must be mirrored there.
impl Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::I1 => f.write_str("i1"),
            IrType::I8 => f.write_str("i8"),
            IrType::I16 => f.write_str("i16"),
            IrType::I32 => f.write_str("i32"),
            IrType::I64 => f.write_str("i64"),
            IrType::F64 => f.write_str("f64"),
            IrType::Str => f.write_str("str"),
            IrType::Ptr(element) => write!(f, "ptr<{element}>"),
            IrType::Struct(dims) => {
                f.write_str("struct{")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{dim}")?;
                }
                f.write_str("}")
            }
            IrType::Fn { params, ret } => {
                f.write_str("fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") {ret}")
            }
            IrType::Void => f.write_str("void"),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Reg(reg) => write!(f, "%{reg}"),
            Value::Global(name) => write!(f, "@{name}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
            Value::Str(text) => write!(f, "\"{}\"", escape(text)),
            Value::Bool(true) => f.write_str("true"),
            Value::Bool(false) => f.write_str("false"),
            Value::Null => f.write_str("null"),
            Value::Unit => f.write_str("unit"),
        }
    }
}

fn join_args(args: &[(IrType, Value)]) -> String {
    args.iter()
        .map(|(ty, value)| format!("{ty} {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Alloca { dst, ty, name } => {
                write!(f, "%{dst} = alloca {ty} ; {name}")
            }
            Instruction::Load { dst, ty, src } => write!(f, "%{dst} = load {ty} {src}"),
            Instruction::Store { ty, value, dst } => write!(f, "store {ty} {value} {dst}"),
            Instruction::Gep { dst, ty, base, index } => {
                write!(f, "%{dst} = gep {ty} {base} {index}")
            }
            Instruction::Call {
                dst,
                ret,
                callee,
                args,
            } => match dst {
                Some(dst) => write!(f, "%{dst} = call {ret} @{callee}({})", join_args(args)),
                None => write!(f, "call {ret} @{callee}({})", join_args(args)),
            },
            Instruction::Cast {
                dst,
                op,
                value,
                from,
                to,
            } => write!(f, "%{dst} = {op} {from} {value} to {to}"),
            Instruction::Br { label } => write!(f, "br {label}"),
            Instruction::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(f, "condbr {cond} {then_label} {else_label}"),
            Instruction::Ret { value } => match value {
                Some((ty, value)) => write!(f, "ret {ty} {value}"),
                None => f.write_str("ret void"),
            },
            Instruction::Unreachable => f.write_str("unreachable"),
        }
    }
}

impl Display for IrBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        Ok(())
    }
}

impl Display for IrFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = self
            .params
            .iter()
            .map(|(name, ty)| format!("{ty} %{name}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "def @{}({params}) {} {{", self.name, self.ret)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        f.write_str("}\n")
    }
}

impl Display for ExternDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = self
            .params
            .iter()
            .map(|ty| ty.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "extern @{}({params}) {}", self.name, self.ret)
    }
}

impl Display for GlobalDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "global @{} {} = {}", self.name, self.ty, self.init)
    }
}

impl Display for IrModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "module {}", self.name)?;
        if !self.externs.is_empty() {
            writeln!(f)?;
            for decl in &self.externs {
                writeln!(f, "{decl}")?;
            }
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                writeln!(f, "{global}")?;
            }
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
