use std::error::Error;
use std::fmt::Display;

use super::{
    CastOp, ExternDecl, GlobalDecl, Instruction, IrBlock, IrFunction, IrModule, IrType, Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrReadError {
    pub message: String,
    pub line: usize,
}

impl Display for IrReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl Error for IrReadError {}

type ReadResult<T> = Result<T, IrReadError>;

/// Character cursor over a single line of IR text.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { text, pos: 0, line }
    }

    fn error<T>(&self, message: impl Into<String>) -> ReadResult<T> {
        Err(IrReadError {
            message: message.into(),
            line: self.line,
        })
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_spaces(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            return true;
        }
        false
    }

    fn expect(&mut self, prefix: &str) -> ReadResult<()> {
        if !self.eat(prefix) {
            return self.error(format!("expected '{prefix}' at '{}'", self.rest()));
        }
        Ok(())
    }

    fn at_end(&mut self) -> bool {
        self.skip_spaces();
        self.rest().is_empty()
    }

    fn word(&mut self) -> &'a str {
        self.skip_spaces();
        let start = self.pos;
        while let Some(c) = self.rest().chars().next() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '/' || c == '@' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn number(&mut self) -> ReadResult<usize> {
        self.skip_spaces();
        let start = self.pos;
        while self.rest().chars().next().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.text[start..self.pos]
            .parse()
            .or_else(|_| self.error("expected a number"))
    }

    fn parse_type(&mut self) -> ReadResult<IrType> {
        self.skip_spaces();
        if self.eat("ptr<") {
            let element = self.parse_type()?;
            self.expect(">")?;
            return Ok(IrType::ptr_to(element));
        }
        if self.eat("struct{") {
            let mut dims = vec![];
            self.skip_spaces();
            if !self.eat("}") {
                loop {
                    dims.push(self.parse_type()?);
                    self.skip_spaces();
                    if self.eat(",") {
                        continue;
                    }
                    self.expect("}")?;
                    break;
                }
            }
            return Ok(IrType::Struct(dims));
        }
        if self.eat("fn(") {
            let mut params = vec![];
            self.skip_spaces();
            if !self.eat(")") {
                loop {
                    params.push(self.parse_type()?);
                    self.skip_spaces();
                    if self.eat(",") {
                        continue;
                    }
                    self.expect(")")?;
                    break;
                }
            }
            let ret = self.parse_type()?;
            return Ok(IrType::Fn {
                params,
                ret: Box::new(ret),
            });
        }

        let word = self.word();
        match word {
            "i1" => Ok(IrType::I1),
            "i8" => Ok(IrType::I8),
            "i16" => Ok(IrType::I16),
            "i32" => Ok(IrType::I32),
            "i64" => Ok(IrType::I64),
            "f64" => Ok(IrType::F64),
            "str" => Ok(IrType::Str),
            "void" => Ok(IrType::Void),
            other => self.error(format!("unknown type '{other}'")),
        }
    }

    fn parse_value(&mut self) -> ReadResult<Value> {
        self.skip_spaces();
        if self.eat("%") {
            return Ok(Value::Reg(self.number()?));
        }
        if self.eat("@") {
            return Ok(Value::Global(self.word().to_string()));
        }
        if self.eat("\"") {
            let mut text = String::new();
            loop {
                let Some(c) = self.rest().chars().next() else {
                    return self.error("unterminated string constant");
                };
                self.pos += c.len_utf8();
                match c {
                    '"' => break,
                    '\\' => {
                        let Some(escaped) = self.rest().chars().next() else {
                            return self.error("unterminated escape");
                        };
                        self.pos += escaped.len_utf8();
                        match escaped {
                            'n' => text.push('\n'),
                            't' => text.push('\t'),
                            'r' => text.push('\r'),
                            c => text.push(c),
                        }
                    }
                    c => text.push(c),
                }
            }
            return Ok(Value::Str(text));
        }

        let start = self.pos;
        while self
            .rest()
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || "+-._".contains(c))
        {
            self.pos += 1;
        }
        let word = &self.text[start..self.pos];
        match word {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            "unit" => Ok(Value::Unit),
            _ if word.contains('.') || word.contains('e') => word
                .parse::<f64>()
                .map(Value::Float)
                .or_else(|_| self.error(format!("bad float constant '{word}'"))),
            _ => word
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| self.error(format!("bad constant '{word}'"))),
        }
    }

    fn parse_typed_args(&mut self) -> ReadResult<Vec<(IrType, Value)>> {
        self.expect("(")?;
        let mut args = vec![];
        self.skip_spaces();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            let ty = self.parse_type()?;
            let value = self.parse_value()?;
            args.push((ty, value));
            self.skip_spaces();
            if self.eat(",") {
                continue;
            }
            self.expect(")")?;
            break;
        }
        Ok(args)
    }
}

fn parse_instruction(cursor: &mut Cursor) -> ReadResult<Instruction> {
    cursor.skip_spaces();

    if cursor.eat("store ") {
        let ty = cursor.parse_type()?;
        let value = cursor.parse_value()?;
        let dst = cursor.parse_value()?;
        return Ok(Instruction::Store { ty, value, dst });
    }
    if cursor.eat("call ") {
        let ret = cursor.parse_type()?;
        cursor.skip_spaces();
        cursor.expect("@")?;
        let callee = cursor.word().to_string();
        let args = cursor.parse_typed_args()?;
        return Ok(Instruction::Call {
            dst: None,
            ret,
            callee,
            args,
        });
    }
    if cursor.eat("br ") {
        let label = cursor.word().to_string();
        return Ok(Instruction::Br { label });
    }
    if cursor.eat("condbr ") {
        let cond = cursor.parse_value()?;
        cursor.skip_spaces();
        let then_label = cursor.word().to_string();
        cursor.skip_spaces();
        let else_label = cursor.word().to_string();
        return Ok(Instruction::CondBr {
            cond,
            then_label,
            else_label,
        });
    }
    if cursor.eat("ret void") {
        return Ok(Instruction::Ret { value: None });
    }
    if cursor.eat("ret ") {
        let ty = cursor.parse_type()?;
        let value = cursor.parse_value()?;
        return Ok(Instruction::Ret {
            value: Some((ty, value)),
        });
    }
    if cursor.eat("unreachable") {
        return Ok(Instruction::Unreachable);
    }

    // %dst = ... forms
    cursor.expect("%")?;
    let dst = cursor.number()?;
    cursor.skip_spaces();
    cursor.expect("=")?;
    cursor.skip_spaces();

    if cursor.eat("alloca ") {
        let ty = cursor.parse_type()?;
        cursor.skip_spaces();
        let name = if cursor.eat("; ") {
            cursor.rest().to_string()
        } else {
            String::new()
        };
        return Ok(Instruction::Alloca { dst, ty, name });
    }
    if cursor.eat("load ") {
        let ty = cursor.parse_type()?;
        let src = cursor.parse_value()?;
        return Ok(Instruction::Load { dst, ty, src });
    }
    if cursor.eat("gep ") {
        let ty = cursor.parse_type()?;
        let base = cursor.parse_value()?;
        let index = cursor.number()?;
        return Ok(Instruction::Gep {
            dst,
            ty,
            base,
            index,
        });
    }
    if cursor.eat("call ") {
        let ret = cursor.parse_type()?;
        cursor.skip_spaces();
        cursor.expect("@")?;
        let callee = cursor.word().to_string();
        let args = cursor.parse_typed_args()?;
        return Ok(Instruction::Call {
            dst: Some(dst),
            ret,
            callee,
            args,
        });
    }

    for op in [CastOp::Bitcast, CastOp::Sext, CastOp::Zext, CastOp::Trunc] {
        if cursor.eat(&format!("{op} ")) {
            let from = cursor.parse_type()?;
            let value = cursor.parse_value()?;
            cursor.skip_spaces();
            cursor.expect("to")?;
            let to = cursor.parse_type()?;
            return Ok(Instruction::Cast {
                dst,
                op,
                value,
                from,
                to,
            });
        }
    }

    cursor.error(format!("unrecognized instruction '{}'", cursor.rest()))
}

/// Parse the textual IR format back into a module. This is the `read-ir`
/// entry point; it validates structure as it goes.
pub fn read_module(input: &str) -> ReadResult<IrModule> {
    let mut module: Option<IrModule> = None;
    let mut current_function: Option<IrFunction> = None;

    for (index, raw_line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let mut cursor = Cursor::new(line.trim_start(), line_number);

        if cursor.eat("module ") {
            if module.is_some() {
                return cursor.error("duplicate module header");
            }
            module = Some(IrModule::new(cursor.word()));
            continue;
        }

        let Some(module) = module.as_mut() else {
            return cursor.error("expected a module header first");
        };

        if cursor.eat("extern @") {
            let name = cursor.word().to_string();
            cursor.expect("(")?;
            let mut params = vec![];
            cursor.skip_spaces();
            if !cursor.eat(")") {
                loop {
                    params.push(cursor.parse_type()?);
                    cursor.skip_spaces();
                    if cursor.eat(",") {
                        continue;
                    }
                    cursor.expect(")")?;
                    break;
                }
            }
            let ret = cursor.parse_type()?;
            module.externs.push(ExternDecl { name, params, ret });
            continue;
        }

        if cursor.eat("global @") {
            let name = cursor.word().to_string();
            let ty = cursor.parse_type()?;
            cursor.skip_spaces();
            cursor.expect("=")?;
            let init = cursor.parse_value()?;
            module.globals.push(GlobalDecl { name, ty, init });
            continue;
        }

        if cursor.eat("def @") {
            if current_function.is_some() {
                return cursor.error("nested function definition");
            }
            let name = cursor.word().to_string();
            cursor.expect("(")?;
            let mut params = vec![];
            cursor.skip_spaces();
            if !cursor.eat(")") {
                loop {
                    let ty = cursor.parse_type()?;
                    cursor.skip_spaces();
                    cursor.expect("%")?;
                    let param_name = cursor.word().to_string();
                    params.push((param_name, ty));
                    cursor.skip_spaces();
                    if cursor.eat(",") {
                        continue;
                    }
                    cursor.expect(")")?;
                    break;
                }
            }
            let ret = cursor.parse_type()?;
            cursor.skip_spaces();
            cursor.expect("{")?;
            current_function = Some(IrFunction {
                name,
                params,
                ret,
                blocks: vec![],
            });
            continue;
        }

        if line.trim() == "}" {
            let Some(function) = current_function.take() else {
                return cursor.error("'}' outside a function");
            };
            validate_function(&function, line_number)?;
            module.functions.push(function);
            continue;
        }

        let Some(function) = current_function.as_mut() else {
            return cursor.error(format!("unexpected line outside a function: '{line}'"));
        };

        if let Some(label) = line.trim().strip_suffix(':') {
            function.blocks.push(IrBlock {
                label: label.to_string(),
                instructions: vec![],
            });
            continue;
        }

        let instruction = parse_instruction(&mut cursor)?;
        if !cursor.at_end() && !matches!(instruction, Instruction::Alloca { .. }) {
            return cursor.error(format!("trailing junk: '{}'", cursor.rest()));
        }
        let Some(block) = function.blocks.last_mut() else {
            return cursor.error("instruction before any block label");
        };
        block.instructions.push(instruction);
    }

    if current_function.is_some() {
        return Err(IrReadError {
            message: "unterminated function definition".to_string(),
            line: input.lines().count(),
        });
    }

    module.ok_or_else(|| IrReadError {
        message: "empty input".to_string(),
        line: 1,
    })
}

fn validate_function(function: &IrFunction, line: usize) -> ReadResult<()> {
    let error = |message: String| {
        Err(IrReadError {
            message,
            line,
        })
    };

    if function.blocks.is_empty() {
        return error(format!("function '{}' has no blocks", function.name));
    }

    for block in &function.blocks {
        let Some(last) = block.instructions.last() else {
            return error(format!(
                "block '{}' in '{}' is empty",
                block.label, function.name
            ));
        };
        if !last.is_terminator() {
            return error(format!(
                "block '{}' in '{}' does not end with a terminator",
                block.label, function.name
            ));
        }

        for instruction in &block.instructions {
            let targets: Vec<&String> = match instruction {
                Instruction::Br { label } => vec![label],
                Instruction::CondBr {
                    then_label,
                    else_label,
                    ..
                } => vec![then_label, else_label],
                _ => continue,
            };
            for target in targets {
                if !function.blocks.iter().any(|b| &b.label == target) {
                    return error(format!(
                        "branch to unknown block '{target}' in '{}'",
                        function.name
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_text() {
        let mut module = IrModule::new("arith");
        module.declare_extern("__plus__", vec![IrType::I64, IrType::I64], IrType::I64);
        module.globals.push(GlobalDecl {
            name: "arith.counter".to_string(),
            ty: IrType::I64,
            init: Value::Int(0),
        });

        let mut builder = super::super::FunctionBuilder::new("arith.f", vec![], IrType::I64);
        let sum = builder.call(
            IrType::I64,
            "__plus__",
            vec![(IrType::I64, Value::Int(1)), (IrType::I64, Value::Int(2))],
        );
        builder.ret(Some((IrType::I64, sum)));
        module.functions.push(builder.finish());

        let text = module.to_string();
        let parsed = read_module(&text).unwrap();

        assert_eq!(module, parsed);
    }

    #[test]
    fn test_branch_to_unknown_block_is_rejected() {
        let text = "module m\n\ndef @f() void {\nentry:\n  br nowhere\n}\n";

        assert!(read_module(text).is_err());
    }

    #[test]
    fn test_block_requires_terminator() {
        let text = "module m\n\ndef @f() i64 {\nentry:\n  %0 = load i64 @g\n}\n";

        assert!(read_module(text).is_err());
    }

    #[test]
    fn test_read_string_constants() {
        let text =
            "module m\n\ndef @f() void {\nentry:\n  call void @print(str \"hi\\n\")\n  ret void\n}\n";

        let module = read_module(text).unwrap();
        let Instruction::Call { args, .. } = &module.functions[0].blocks[0].instructions[0]
        else {
            panic!("expected a call");
        };
        assert_eq!(Value::Str("hi\n".to_string()), args[0].1);
    }
}
