use crate::runtime::{NativeEnv, NativeResult, Vm};

// private static native long set(int d);
fn file_descriptor_set(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    env.stack().push_long(0);
    Ok(())
}

// private static native boolean VMSupportsCS8();
fn atomic_long_vm_supports_cs8(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    env.stack().push_boolean(false);
    Ok(())
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native("java/io/FileDescriptor", "set", "(I)J", file_descriptor_set);
    vm.register_native(
        "java/util/concurrent/atomic/AtomicLong",
        "VMSupportsCS8",
        "()Z",
        atomic_long_vm_supports_cs8,
    );
}
