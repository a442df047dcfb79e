use std::sync::Arc;

use crate::{
    descriptor::array_class_name,
    runtime::{
        ArrayData, Class, Exception, Extra, NativeEnv, NativeResult, Object, Reference, Slot,
        Vm,
        famous_classes::{CLASS_NOT_FOUND_EXCEPTION, FIELD, NO_SUCH_METHOD_ERROR},
        heap::reflection::mirrored_class,
    },
};

const CLASS: &str = "java/lang/Class";
const FIELD_CONSTRUCTOR: &str =
    "(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/Class;IILjava/lang/String;[B)V";

fn this_class(env: &mut NativeEnv<'_>) -> NativeResult<Arc<Class>> {
    let this = env.this()?;
    mirrored_class(env.vm, this)
        .ok_or_else(|| Exception::unsupported("class object without a mirrored class"))
}

// static native Class<?> getPrimitiveClass(String name);
fn get_primitive_class(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let name = env.non_null_arg(0)?;
    let name = env.vm.rust_string(name);
    let class = env.vm.load_class(&name)?;
    if !class.is_primitive() {
        return Err(Exception::new_vm_msg(CLASS_NOT_FOUND_EXCEPTION, name));
    }
    let mirror = env.vm.class_object(&class)?;
    env.stack().push_reference(Some(mirror));
    Ok(())
}

// private native String getName0();
fn get_name0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let class = this_class(env)?;
    let name = env.vm.intern_string(&class.java_name())?;
    env.stack().push_reference(Some(name));
    Ok(())
}

// private static native boolean desiredAssertionStatus0(Class<?> clazz);
fn desired_assertion_status0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    env.stack().push_boolean(false);
    Ok(())
}

// public native boolean isInterface();
fn is_interface(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let class = this_class(env)?;
    env.stack().push_boolean(class.is_interface());
    Ok(())
}

// public native boolean isPrimitive();
fn is_primitive(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let class = this_class(env)?;
    env.stack().push_boolean(class.is_primitive());
    Ok(())
}

// public native boolean isArray();
fn is_array(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let class = this_class(env)?;
    env.stack().push_boolean(class.is_array());
    Ok(())
}

// private native Field[] getDeclaredFields0(boolean publicOnly);
fn get_declared_fields0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let class = this_class(env)?;
    let public_only = env.args().get_boolean(1);
    let vm = env.vm;

    let field_class = vm.load_class(FIELD)?;
    let constructor = field_class
        .get_method("<init>", FIELD_CONSTRUCTOR)
        .cloned()
        .ok_or_else(|| {
            Exception::new_vm_msg(
                NO_SUCH_METHOD_ERROR,
                format!("{FIELD}.<init>{FIELD_CONSTRUCTOR}"),
            )
        })?;
    vm.ensure_initialized(env.thread, &field_class)?;

    let class_mirror = vm.class_object(&class)?;
    let mut field_objects = Vec::new();
    for field in class.fields() {
        if public_only && !field.is_public() {
            continue;
        }
        let object = Object::new_instance(Arc::clone(&field_class));
        object.set_extra(Extra::Field(Arc::clone(field)));
        let object = vm.heap().allocate(object);

        let field_type = vm.load_class(&field.field_type().class_name())?;
        let args = [
            Slot::from_reference(Some(object)),
            Slot::from_reference(Some(class_mirror)),
            Slot::from_reference(Some(vm.intern_string(field.name())?)),
            Slot::from_reference(Some(vm.class_object(&field_type)?)),
            Slot::from_int(field.access_flags as i32),
            Slot::from_int(field.slot_id() as i32),
            // generic signature
            Slot::from_reference(None),
            // annotations
            Slot::from_reference(None),
        ];
        vm.invoke(env.thread, &constructor, &args)?;
        field_objects.push(Some(object));
    }

    let array = new_reference_array(vm, FIELD, field_objects)?;
    env.stack().push_reference(Some(array));
    Ok(())
}

fn new_reference_array(
    vm: &Vm,
    component: &str,
    elements: Vec<Option<Reference>>,
) -> NativeResult<Reference> {
    let array_class = vm.load_class(&array_class_name(component))?;
    Ok(vm
        .heap()
        .allocate(Object::new_array(array_class, ArrayData::References(elements))))
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(
        CLASS,
        "getPrimitiveClass",
        "(Ljava/lang/String;)Ljava/lang/Class;",
        get_primitive_class,
    );
    vm.register_native(CLASS, "getName0", "()Ljava/lang/String;", get_name0);
    vm.register_native(
        CLASS,
        "desiredAssertionStatus0",
        "(Ljava/lang/Class;)Z",
        desired_assertion_status0,
    );
    vm.register_native(CLASS, "isInterface", "()Z", is_interface);
    vm.register_native(CLASS, "isPrimitive", "()Z", is_primitive);
    vm.register_native(CLASS, "isArray", "()Z", is_array);
    vm.register_native(
        CLASS,
        "getDeclaredFields0",
        "(Z)[Ljava/lang/reflect/Field;",
        get_declared_fields0,
    );
}
