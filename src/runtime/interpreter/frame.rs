use std::sync::Arc;

use paste::paste;

use crate::runtime::{Method, NativeResult, Reference, Slot, Slots, VmError};

/// The frame stack of the single bytecode thread. The caller of a frame is the frame below
/// it.
#[derive(Debug)]
pub struct Thread {
    frames: Vec<Frame>,
    max_depth: usize,
}

#[derive(Debug)]
pub struct Frame {
    pub(crate) method: Arc<Method>,
    pub(crate) local_vars: Slots,
    pub(crate) operand_stack: OperandStack,
    /// address of the instruction being executed; for a caller, its invoke instruction
    pub(crate) pc: usize,
    pub(crate) next_pc: usize,
}

#[derive(Debug, Default)]
pub struct OperandStack(Vec<Slot>);

impl Thread {
    pub fn new(max_depth: usize) -> Thread {
        Thread {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Address of the instruction being executed in the top frame.
    pub fn pc(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.pc)
    }

    pub fn push_frame(&mut self, frame: Frame) -> NativeResult<()> {
        if self.frames.len() >= self.max_depth {
            return Err(VmError::StackOverflow {
                depth: self.max_depth,
            }
            .into());
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub(crate) fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Drops every frame above `depth`.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// Moves the arguments off the caller's operand stack into a new frame for `method`.
    pub fn invoke_method(&mut self, method: Arc<Method>) -> NativeResult<()> {
        let mut frame = Frame::new(method);
        let arg_slot_count = frame.method.arg_slot_count;
        if let Some(caller) = self.frames.last_mut() {
            for index in (0..arg_slot_count).rev() {
                let slot = caller.operand_stack.pop_slot();
                frame.local_vars.set_slot(index, slot);
            }
        }
        log::debug!(
            "invoke {}.{}{}",
            frame.method.class().class_name,
            frame.method.name,
            frame.method.descriptor
        );
        self.push_frame(frame)
    }
}

impl Frame {
    pub fn new(method: Arc<Method>) -> Frame {
        // a native body needs room for its arguments even when max_locals is smaller
        let locals = method.max_locals.max(method.arg_slot_count);
        Frame {
            local_vars: Slots::new(locals),
            operand_stack: OperandStack::with_capacity(method.max_stack),
            method,
            pc: 0,
            next_pc: 0,
        }
    }

    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    pub fn local_vars(&self) -> &Slots {
        &self.local_vars
    }

    pub fn local_vars_mut(&mut self) -> &mut Slots {
        &mut self.local_vars
    }

    pub fn operand_stack(&mut self) -> &mut OperandStack {
        &mut self.operand_stack
    }
}

macro_rules! single_slot_stack {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            impl OperandStack {
                $(
                    pub fn [<push_ $name>](&mut self, value: $ty) {
                        self.0.push(Slot::[<from_ $name>](value));
                    }

                    pub fn [<pop_ $name>](&mut self) -> $ty {
                        self.pop_slot().$name()
                    }
                )*
            }
        }
    };
}

macro_rules! double_slot_stack {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            impl OperandStack {
                $(
                    pub fn [<push_ $name>](&mut self, value: $ty) {
                        let (low, high) = Slot::[<from_ $name>](value);
                        self.0.push(low);
                        self.0.push(high);
                    }

                    pub fn [<pop_ $name>](&mut self) -> $ty {
                        let high = self.pop_slot();
                        let low = self.pop_slot();
                        Slot::$name(low, high)
                    }
                )*
            }
        }
    };
}

single_slot_stack!(int: i32, float: f32, reference: Option<Reference>);
double_slot_stack!(long: i64, double: f64);

impl OperandStack {
    pub fn with_capacity(capacity: usize) -> Self {
        OperandStack(Vec::with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_slot(&mut self, slot: Slot) {
        self.0.push(slot);
    }

    pub fn pop_slot(&mut self) -> Slot {
        self.0.pop().expect("operand stack underflow")
    }

    pub fn push_boolean(&mut self, value: bool) {
        self.push_int(value as i32);
    }

    /// `n = 0` is the top of the stack.
    pub fn get_ref_from_top(&self, n: usize) -> Option<Reference> {
        self.0[self.0.len() - 1 - n].reference()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Removes and returns every slot, bottom first.
    pub(crate) fn take_slots(&mut self) -> Vec<Slot> {
        std::mem::take(&mut self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_is_two_slots() {
        let mut stack = OperandStack::with_capacity(4);
        stack.push_int(3);
        stack.push_long(i64::MIN + 5);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop_long(), i64::MIN + 5);
        assert_eq!(stack.pop_int(), 3);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_double_low_word_first() {
        let mut stack = OperandStack::with_capacity(2);
        stack.push_double(1.5);
        let high = stack.pop_slot();
        let low = stack.pop_slot();
        assert_eq!(Slot::double(low, high), 1.5);
    }

    #[test]
    fn test_ref_from_top() {
        let mut stack = OperandStack::with_capacity(3);
        let reference = Reference::from_bits(5);
        stack.push_reference(reference);
        stack.push_int(1);
        stack.push_reference(None);
        assert_eq!(stack.get_ref_from_top(0), None);
        assert_eq!(stack.get_ref_from_top(2), reference);
    }
}
