use crate::runtime::{
    Exception, NativeEnv, NativeResult, Vm,
    famous_classes::{CLONE_NOT_SUPPORTED_EXCEPTION, CLONEABLE},
};

const OBJECT: &str = "java/lang/Object";

// public final native Class<?> getClass();
fn native_object_get_class(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let this = env.this()?;
    let class = env.vm.heap().get(this).class().clone();
    let mirror = env.vm.class_object(&class)?;
    env.stack().push_reference(Some(mirror));
    Ok(())
}

// public native int hashCode();
fn native_object_hash_code(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let this = env.this()?;
    env.stack().push_int(this.to_bits() as i32);
    Ok(())
}

// protected native Object clone() throws CloneNotSupportedException;
fn native_object_clone(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let this = env.this()?;
    let object = env.vm.heap().get(this);
    let cloneable = env.vm.load_class(CLONEABLE)?;
    if !cloneable.is_assignable_from(object.class()) {
        return Err(Exception::new_vm_msg(
            CLONE_NOT_SUPPORTED_EXCEPTION,
            object.class().java_name(),
        ));
    }
    let cloned = env.vm.heap().allocate(object.shallow_clone());
    env.stack().push_reference(Some(cloned));
    Ok(())
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(OBJECT, "getClass", "()Ljava/lang/Class;", native_object_get_class);
    vm.register_native(OBJECT, "hashCode", "()I", native_object_hash_code);
    vm.register_native(OBJECT, "clone", "()Ljava/lang/Object;", native_object_clone);
}
