mod class;
mod double;
mod float;
mod misc;
mod object;
mod string;
mod system;
mod throwable;

use dashmap::DashMap;

use crate::runtime::{
    Exception, Frame, Method, NativeResult, OperandStack, Reference, Slots, Thread, Vm,
    famous_classes::{NULL_POINTER_EXCEPTION, UNSATISFIED_LINK_ERROR},
};

/// A host function standing in for a `native` method. Arguments are in the top frame's
/// locals; results go onto its operand stack.
pub type NativeMethod = fn(&mut NativeEnv<'_>) -> NativeResult<()>;

pub struct NativeEnv<'a> {
    pub vm: &'a Vm,
    pub thread: &'a mut Thread,
}

impl<'a> NativeEnv<'a> {
    pub fn new(vm: &'a Vm, thread: &'a mut Thread) -> Self {
        Self { vm, thread }
    }

    /// The native method's own frame.
    pub fn frame(&mut self) -> &mut Frame {
        self.thread
            .top_frame_mut()
            .expect("native method runs in a frame")
    }

    pub fn args(&mut self) -> &Slots {
        self.frame().local_vars()
    }

    pub fn stack(&mut self) -> &mut OperandStack {
        self.frame().operand_stack()
    }

    /// Reference argument `index`, raising `NullPointerException` for null.
    pub fn non_null_arg(&mut self, index: usize) -> NativeResult<Reference> {
        self.args()
            .get_reference(index)
            .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION))
    }

    pub fn this(&mut self) -> NativeResult<Reference> {
        self.non_null_arg(0)
    }
}

// key: class_name, method_name, method_descriptor
type Key = (String, String, String);

#[derive(Debug, Default)]
pub struct NativeRegistry(DashMap<Key, NativeMethod>);

impl NativeRegistry {
    pub(crate) fn register(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        method: NativeMethod,
    ) {
        self.0.insert(
            (
                class_name.to_string(),
                name.to_string(),
                descriptor.to_string(),
            ),
            method,
        );
    }

    pub(crate) fn lookup(&self, method: &Method) -> NativeResult<NativeMethod> {
        let class = method.class();
        let key = (
            class.class_name().to_string(),
            method.name.to_string(),
            method.descriptor.to_string(),
        );
        if let Some(native) = self.0.get(&key) {
            return Ok(*native.value());
        }
        if &*method.descriptor == "()V"
            && (&*method.name == "registerNatives" || &*method.name == "initIDs")
        {
            log::debug!("{}.{} treated as no-op", key.0, key.1);
            return Ok(native_nop);
        }
        log::debug!("no native for {}.{}{}", key.0, key.1, key.2);
        Err(Exception::new_vm_msg(
            UNSATISFIED_LINK_ERROR,
            format!("{}.{}{}", key.0, key.1, key.2),
        ))
    }
}

fn native_nop(_: &mut NativeEnv<'_>) -> NativeResult<()> {
    Ok(())
}

pub(crate) fn register_natives(vm: &Vm) {
    object::register_natives(vm);
    class::register_natives(vm);
    system::register_natives(vm);
    throwable::register_natives(vm);
    float::register_natives(vm);
    double::register_natives(vm);
    string::register_natives(vm);
    misc::register_natives(vm);
}
