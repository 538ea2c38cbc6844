use crate::ir::{FunctionBuilder, IrType, Value};

/// The nesting of managed-value extents, innermost first:
/// statement ⊂ block ⊂ loop ⊂ function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeForm {
    Statement,
    Block,
    Loop,
    Function,
}

#[derive(Debug, Clone)]
enum Tracked {
    /// A temporary value that is released as-is.
    Direct(Value),
    /// A variable slot; the current contents are loaded and released.
    Slot(Value, IrType),
}

#[derive(Debug, Clone)]
struct Frame {
    form: LifeForm,
    values: Vec<Tracked>,
}

/// A stack of lifetime extents. Every managed value is tracked in the frame
/// matching its extent and released exactly once on every control-flow path
/// out of that extent: normal exits pop the frame, non-local exits
/// (`break`, `continue`, `return`) unwind through enclosing frames without
/// popping them.
#[derive(Debug, Default)]
pub struct Life {
    frames: Vec<Frame>,
}

impl Life {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, form: LifeForm) {
        self.frames.push(Frame {
            form,
            values: vec![],
        });
    }

    /// Track a temporary in the innermost frame.
    pub fn track_value(&mut self, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.push(Tracked::Direct(value));
        }
    }

    /// Track a variable slot in the innermost frame of the given form.
    pub fn track_slot(&mut self, form: LifeForm, slot: Value, ty: IrType) {
        if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.form == form) {
            frame.values.push(Tracked::Slot(slot, ty));
        }
    }

    /// Release the innermost frame's values and pop it.
    pub fn pop(&mut self, builder: &mut FunctionBuilder) {
        if let Some(frame) = self.frames.pop() {
            release_frame(&frame, builder);
        }
    }

    /// Pop the innermost frame without emitting releases; used when the
    /// block is statically known to have diverged on every path.
    pub fn discard(&mut self) {
        self.frames.pop();
    }

    /// Stop tracking a specific value, innermost frame first. Used when a
    /// value's ownership transfers out of the current extent, e.g. a
    /// returned temporary.
    pub fn untrack(&mut self, value: &Value) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(index) = frame
                .values
                .iter()
                .position(|tracked| matches!(tracked, Tracked::Direct(v) if v == value))
            {
                frame.values.remove(index);
                return;
            }
        }
    }

    /// Emit releases for every frame from the innermost up to and including
    /// the first frame of the given form, without popping anything. This is
    /// the unwind path for break, continue and return.
    pub fn release_to(&self, form: LifeForm, builder: &mut FunctionBuilder) {
        for frame in self.frames.iter().rev() {
            release_frame(frame, builder);
            if frame.form == form {
                return;
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

fn release_frame(frame: &Frame, builder: &mut FunctionBuilder) {
    for tracked in &frame.values {
        let value = match tracked {
            Tracked::Direct(value) => value.clone(),
            Tracked::Slot(slot, ty) => builder.load(ty.clone(), slot.clone()),
        };
        builder.call(
            IrType::Void,
            "__release_var",
            vec![(IrType::opaque_ptr(), value)],
        );
    }
}

/// Emit an addref for a managed value being captured into a new binding.
pub fn emit_addref(builder: &mut FunctionBuilder, value: Value) {
    builder.call(
        IrType::Void,
        "__addref_var",
        vec![(IrType::opaque_ptr(), value)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;

    fn release_count(builder: FunctionBuilder) -> usize {
        builder
            .finish()
            .blocks
            .iter()
            .flat_map(|block| block.instructions.iter())
            .filter(
                |i| matches!(i, Instruction::Call { callee, .. } if callee == "__release_var"),
            )
            .count()
    }

    #[test]
    fn test_pop_releases_tracked_values() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut life = Life::new();

        life.push(LifeForm::Function);
        life.push(LifeForm::Block);
        life.track_value(Value::Reg(0));
        life.track_value(Value::Reg(1));

        life.pop(&mut builder);
        assert_eq!(1, life.depth());
        assert_eq!(2, release_count(builder));
    }

    #[test]
    fn test_release_to_unwinds_through_enclosing_frames() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut life = Life::new();

        life.push(LifeForm::Function);
        life.track_value(Value::Reg(0));
        life.push(LifeForm::Loop);
        life.track_value(Value::Reg(1));
        life.push(LifeForm::Block);
        life.track_value(Value::Reg(2));

        // a continue releases the block and the loop, not the function
        life.release_to(LifeForm::Loop, &mut builder);
        assert_eq!(3, life.depth());
        assert_eq!(2, release_count(builder));
    }

    #[test]
    fn test_release_to_function_releases_everything() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut life = Life::new();

        life.push(LifeForm::Function);
        life.track_value(Value::Reg(0));
        life.push(LifeForm::Block);
        life.track_value(Value::Reg(1));

        life.release_to(LifeForm::Function, &mut builder);
        assert_eq!(2, release_count(builder));
    }

    #[test]
    fn test_slot_release_loads_current_contents() {
        let mut builder = FunctionBuilder::new("f", vec![], IrType::Void);
        let mut life = Life::new();

        life.push(LifeForm::Block);
        life.track_slot(LifeForm::Block, Value::Reg(0), IrType::opaque_ptr());
        life.pop(&mut builder);

        let function = builder.finish();
        let instructions = &function.blocks[0].instructions;
        assert!(matches!(instructions[0], Instruction::Load { .. }));
        assert!(
            matches!(&instructions[1], Instruction::Call { callee, .. } if callee == "__release_var")
        );
    }
}
