use std::{
    env, path,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::runtime::{
    Exception, NativeEnv, NativeResult, Reference, Vm,
    famous_classes::{
        ARRAY_STORE_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION, NO_SUCH_FIELD_ERROR,
        NO_SUCH_METHOD_ERROR, NULL_POINTER_EXCEPTION,
    },
    Slot,
};

const SYSTEM: &str = "java/lang/System";

//     public static native void arraycopy(Object src,  int  srcPos,
//                                         Object dest, int destPos,
//                                         int length);
fn native_system_arraycopy(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let args = env.args();
    let src_ref = args.get_reference(0);
    let src_pos = args.get_int(1);
    let dest_ref = args.get_reference(2);
    let dest_pos = args.get_int(3);
    let length = args.get_int(4);

    let (Some(src_ref), Some(dest_ref)) = (src_ref, dest_ref) else {
        return Err(Exception::new_vm(NULL_POINTER_EXCEPTION));
    };
    let heap = env.vm.heap();
    let src = heap.get(src_ref);
    let dest = heap.get(dest_ref);
    if !src.is_array() || !dest.is_array() {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            "arraycopy: argument is not an array",
        ));
    }
    // boolean and byte arrays share storage, so primitive arrays compare by class
    let same_kind = src_ref == dest_ref
        || match (src.class().component_class(), dest.class().component_class()) {
            (Some(src_component), Some(dest_component))
                if src_component.is_primitive() || dest_component.is_primitive() =>
            {
                Arc::ptr_eq(src_component, dest_component)
            }
            _ => src.with_array(|src_data| {
                dest.with_array(|dest_data| src_data.is_same_kind(dest_data))
            }),
        };
    if !same_kind {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            format!(
                "arraycopy: type mismatch: can not copy {} into {}",
                src.class().java_name(),
                dest.class().java_name()
            ),
        ));
    }

    let (src_len, dest_len) = (src.array_length() as i64, dest.array_length() as i64);
    let (src_pos, dest_pos, length) = (src_pos as i64, dest_pos as i64, length as i64);
    if src_pos < 0
        || dest_pos < 0
        || length < 0
        || src_pos + length > src_len
        || dest_pos + length > dest_len
    {
        return Err(Exception::new_vm_msg(
            INDEX_OUT_OF_BOUNDS_EXCEPTION,
            format!(
                "arraycopy: range [{src_pos}, {}) of {src_len} into [{dest_pos}, {}) of {dest_len}",
                src_pos + length,
                dest_pos + length
            ),
        ));
    }
    let (src_pos, dest_pos, length) = (src_pos as usize, dest_pos as usize, length as usize);

    if src_ref == dest_ref {
        src.with_array_mut(|data| data.copy_within(src_pos, dest_pos, length));
        return Ok(());
    }

    // reference elements are copied up to the first one the destination cannot hold
    let copyable = match (src.class().component_class(), dest.class().component_class()) {
        (Some(src_component), Some(dest_component))
            if !dest_component.is_primitive()
                && !dest_component.is_assignable_from(src_component) =>
        {
            (src_pos..src_pos + length)
                .position(|index| {
                    let element = src.array_get::<Option<Reference>>(index as i32).flatten();
                    element.is_some_and(|element| {
                        !dest_component.is_assignable_from(heap.get(element).class())
                    })
                })
                .unwrap_or(length)
        }
        _ => length,
    };
    src.with_array(|src_data| {
        dest.with_array_mut(|dest_data| src_data.copy_to(src_pos, dest_data, dest_pos, copyable))
    });
    if copyable < length {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            format!(
                "arraycopy: element type mismatch at index {}",
                src_pos + copyable
            ),
        ));
    }
    Ok(())
}

// public static native long currentTimeMillis();
fn current_time_millis(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64);
    env.stack().push_long(millis);
    Ok(())
}

// public static native long nanoTime();
fn nano_time(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let nanos = env.vm.uptime().as_nanos() as i64;
    env.stack().push_long(nanos);
    Ok(())
}

// public static native int identityHashCode(Object x);
fn identity_hash_code(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let hash = env.args().get_reference(0).map_or(0, |r| r.to_bits() as i32);
    env.stack().push_int(hash);
    Ok(())
}

fn set_stream(env: &mut NativeEnv<'_>, name: &str, descriptor: &str) -> NativeResult<()> {
    let stream = env.args().get_reference(0);
    let system = env.vm.load_class(SYSTEM)?;
    let field = system
        .get_field(name, descriptor)
        .filter(|field| field.is_static())
        .ok_or_else(|| Exception::new_vm_msg(NO_SUCH_FIELD_ERROR, name.to_string()))?;
    system.static_vars.write().set_reference(field.slot_id(), stream);
    Ok(())
}

// private static native void setIn0(InputStream in);
fn set_in0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    set_stream(env, "in", "Ljava/io/InputStream;")
}

// private static native void setOut0(PrintStream out);
fn set_out0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    set_stream(env, "out", "Ljava/io/PrintStream;")
}

// private static native void setErr0(PrintStream err);
fn set_err0(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    set_stream(env, "err", "Ljava/io/PrintStream;")
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

fn system_properties() -> Vec<(&'static str, String)> {
    let user_dir = env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|_| ".".to_string());
    let (path_separator, line_separator) = if cfg!(windows) {
        (";", "\r\n")
    } else {
        (":", "\n")
    };
    vec![
        ("java.version", "1.8.0".to_string()),
        ("java.vendor", env!("CARGO_PKG_NAME").to_string()),
        ("java.vendor.url", env!("CARGO_PKG_REPOSITORY").to_string()),
        ("java.home", env_or_empty("JAVA_HOME")),
        ("java.class.version", "52.0".to_string()),
        ("java.class.path", env_or_empty("CLASSPATH")),
        ("os.name", env::consts::OS.to_string()),
        ("os.arch", env::consts::ARCH.to_string()),
        ("os.version", String::new()),
        ("file.separator", path::MAIN_SEPARATOR.to_string()),
        ("path.separator", path_separator.to_string()),
        ("line.separator", line_separator.to_string()),
        ("user.name", env_or_empty(if cfg!(windows) { "USERNAME" } else { "USER" })),
        ("user.home", env_or_empty(if cfg!(windows) { "USERPROFILE" } else { "HOME" })),
        ("user.dir", user_dir),
        ("file.encoding", "UTF-8".to_string()),
        ("sun.stdout.encoding", "UTF-8".to_string()),
        ("sun.stderr.encoding", "UTF-8".to_string()),
        ("sun.jnu.encoding", "UTF-8".to_string()),
    ]
}

// private static native Properties initProperties(Properties props);
fn init_properties(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    const SET_PROPERTY: &str = "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/Object;";
    let props = env.non_null_arg(0)?;
    let vm = env.vm;
    let set_property = vm
        .heap()
        .get(props)
        .class()
        .lookup_virtual_method("setProperty", SET_PROPERTY)
        .ok_or_else(|| {
            Exception::new_vm_msg(NO_SUCH_METHOD_ERROR, format!("setProperty{SET_PROPERTY}"))
        })?;
    for (key, value) in system_properties() {
        log::trace!("system property {key}={value:?}");
        let args = [
            Slot::from_reference(Some(props)),
            Slot::from_reference(Some(vm.new_string(key)?)),
            Slot::from_reference(Some(vm.new_string(&value)?)),
        ];
        vm.invoke(env.thread, &set_property, &args)?;
    }
    env.stack().push_reference(Some(props));
    Ok(())
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(
        SYSTEM,
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        native_system_arraycopy,
    );
    vm.register_native(SYSTEM, "currentTimeMillis", "()J", current_time_millis);
    vm.register_native(SYSTEM, "nanoTime", "()J", nano_time);
    vm.register_native(
        SYSTEM,
        "identityHashCode",
        "(Ljava/lang/Object;)I",
        identity_hash_code,
    );
    vm.register_native(SYSTEM, "setIn0", "(Ljava/io/InputStream;)V", set_in0);
    vm.register_native(SYSTEM, "setOut0", "(Ljava/io/PrintStream;)V", set_out0);
    vm.register_native(SYSTEM, "setErr0", "(Ljava/io/PrintStream;)V", set_err0);
    vm.register_native(
        SYSTEM,
        "initProperties",
        "(Ljava/util/Properties;)Ljava/util/Properties;",
        init_properties,
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        consts::ACC_PUBLIC,
        runtime::{
            ArrayData, Object, Slot, Thread,
            interpreter::instructions as inst,
            test_support::{ClassFileBuilder, test_vm},
        },
    };

    fn array(vm: &Vm, class_name: &str, data: ArrayData) -> Reference {
        let class = vm.load_class(class_name).unwrap();
        vm.heap().allocate(Object::new_array(class, data))
    }

    fn arraycopy(
        vm: &Vm,
        thread: &mut Thread,
        src: Option<Reference>,
        src_pos: i32,
        dest: Option<Reference>,
        dest_pos: i32,
        length: i32,
    ) -> NativeResult<Vec<Slot>> {
        let system = vm.load_class(SYSTEM).unwrap();
        let method = Arc::clone(
            system
                .get_method("arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V")
                .unwrap(),
        );
        let args = [
            Slot::from_reference(src),
            Slot::from_int(src_pos),
            Slot::from_reference(dest),
            Slot::from_int(dest_pos),
            Slot::from_int(length),
        ];
        vm.invoke(thread, &method, &args)
    }

    fn thrown_class(vm: &Vm, result: NativeResult<Vec<Slot>>) -> String {
        match result {
            Err(Exception::UserException(throwable)) => {
                vm.heap().get(throwable).class().class_name().to_string()
            }
            other => panic!("expected a thrown exception, got {other:?}"),
        }
    }

    #[test]
    fn test_arraycopy_overlapping() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let ints = array(&vm, "[I", ArrayData::Ints(vec![1, 2, 3, 4, 5]));
        arraycopy(&vm, &mut thread, Some(ints), 0, Some(ints), 1, 4).unwrap();
        vm.heap()
            .get(ints)
            .with_array(|data| assert_eq!(data, &ArrayData::Ints(vec![1, 1, 2, 3, 4])));
    }

    #[test]
    fn test_arraycopy_checks() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let ints = array(&vm, "[I", ArrayData::Ints(vec![0; 4]));
        let longs = array(&vm, "[J", ArrayData::Longs(vec![0; 4]));

        let result = arraycopy(&vm, &mut thread, None, 0, Some(ints), 0, 1);
        assert_eq!(thrown_class(&vm, result), NULL_POINTER_EXCEPTION);
        let result = arraycopy(&vm, &mut thread, Some(ints), 0, Some(longs), 0, 1);
        assert_eq!(thrown_class(&vm, result), ARRAY_STORE_EXCEPTION);
        let result = arraycopy(&vm, &mut thread, Some(ints), 2, Some(ints), 0, 3);
        assert_eq!(thrown_class(&vm, result), INDEX_OUT_OF_BOUNDS_EXCEPTION);
        let result = arraycopy(&vm, &mut thread, Some(ints), 0, Some(ints), 0, -1);
        assert_eq!(thrown_class(&vm, result), INDEX_OUT_OF_BOUNDS_EXCEPTION);
        assert!(thread.is_empty());
    }

    #[test]
    fn test_arraycopy_reference_store_check() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let string = vm.intern_string("s").unwrap();
        let object = vm
            .heap()
            .allocate(Object::new_instance(vm.load_class("java/lang/Object").unwrap()));
        let objects = array(
            &vm,
            "[Ljava/lang/Object;",
            ArrayData::References(vec![Some(string), Some(object)]),
        );
        let strings = array(
            &vm,
            "[Ljava/lang/String;",
            ArrayData::References(vec![None, None]),
        );

        let result = arraycopy(&vm, &mut thread, Some(objects), 0, Some(strings), 0, 2);
        assert_eq!(thrown_class(&vm, result), ARRAY_STORE_EXCEPTION);
        let strings = vm.heap().get(strings);
        assert_eq!(strings.array_get::<Option<Reference>>(0), Some(Some(string)));
        assert_eq!(strings.array_get::<Option<Reference>>(1), Some(None));
    }

    #[test]
    fn test_identity_hash_code_of_null() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let system = vm.load_class(SYSTEM).unwrap();
        let method = system
            .get_method("identityHashCode", "(Ljava/lang/Object;)I")
            .unwrap();
        let result = vm
            .invoke(&mut thread, method, &[Slot::from_reference(None)])
            .unwrap();
        assert_eq!(result[0].int(), 0);
    }

    #[test]
    fn test_arraycopy_boolean_into_byte_array() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let booleans = array(&vm, "[Z", ArrayData::Bytes(vec![1, 1]));
        let bytes = array(&vm, "[B", ArrayData::Bytes(vec![0, 0]));

        let result = arraycopy(&vm, &mut thread, Some(booleans), 0, Some(bytes), 0, 2);
        assert_eq!(thrown_class(&vm, result), ARRAY_STORE_EXCEPTION);
        vm.heap()
            .get(bytes)
            .with_array(|data| assert_eq!(data, &ArrayData::Bytes(vec![0, 0])));
    }

    #[test]
    fn test_nano_time_is_monotonic() {
        let vm = test_vm(vec![]);
        let mut thread = vm.new_thread();
        let system = vm.load_class(SYSTEM).unwrap();
        let method = system.get_method("nanoTime", "()J").unwrap();
        let first = vm.invoke(&mut thread, method, &[]).unwrap();
        let second = vm.invoke(&mut thread, method, &[]).unwrap();
        let first = Slot::long(first[0], first[1]);
        assert!(first >= 0);
        assert!(Slot::long(second[0], second[1]) >= first);
    }

    /// A `java/util/Properties` that appends every pair to two parallel arrays.
    fn properties_class() -> ClassFileBuilder {
        const STRINGS: &str = "[Ljava/lang/String;";
        let mut builder = ClassFileBuilder::new("java/util/Properties", Some("java/lang/Object"));
        builder.add_field(ACC_PUBLIC, "keys", STRINGS);
        builder.add_field(ACC_PUBLIC, "values", STRINGS);
        builder.add_field(ACC_PUBLIC, "count", "I");
        let [keys_hi, keys_lo] = builder
            .field_ref("java/util/Properties", "keys", STRINGS)
            .to_be_bytes();
        let [values_hi, values_lo] = builder
            .field_ref("java/util/Properties", "values", STRINGS)
            .to_be_bytes();
        let [count_hi, count_lo] = builder
            .field_ref("java/util/Properties", "count", "I")
            .to_be_bytes();
        builder.add_method(
            ACC_PUBLIC,
            "setProperty",
            "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/Object;",
            3,
            3,
            &[
                inst::ALOAD_0,
                inst::GETFIELD,
                keys_hi,
                keys_lo,
                inst::ALOAD_0,
                inst::GETFIELD,
                count_hi,
                count_lo,
                inst::ALOAD_1,
                inst::AASTORE,
                inst::ALOAD_0,
                inst::GETFIELD,
                values_hi,
                values_lo,
                inst::ALOAD_0,
                inst::GETFIELD,
                count_hi,
                count_lo,
                inst::ALOAD_2,
                inst::AASTORE,
                inst::ALOAD_0,
                inst::DUP,
                inst::GETFIELD,
                count_hi,
                count_lo,
                inst::ICONST_1,
                inst::IADD,
                inst::PUTFIELD,
                count_hi,
                count_lo,
                inst::ACONST_NULL,
                inst::ARETURN,
            ],
        );
        builder
    }

    #[test]
    fn test_init_properties() {
        let vm = test_vm(vec![properties_class().build()]);
        let mut thread = vm.new_thread();
        let properties_class = vm.load_class("java/util/Properties").unwrap();
        let props = vm
            .heap()
            .allocate(Object::new_instance(Arc::clone(&properties_class)));
        let keys = array(&vm, "[Ljava/lang/String;", ArrayData::References(vec![None; 64]));
        let values = array(&vm, "[Ljava/lang/String;", ArrayData::References(vec![None; 64]));
        let object = vm.heap().get(props);
        object.set_ref_var("keys", "[Ljava/lang/String;", Some(keys)).unwrap();
        object.set_ref_var("values", "[Ljava/lang/String;", Some(values)).unwrap();

        let system = vm.load_class(SYSTEM).unwrap();
        let method = system
            .get_method(
                "initProperties",
                "(Ljava/util/Properties;)Ljava/util/Properties;",
            )
            .unwrap();
        let result = vm
            .invoke(&mut thread, method, &[Slot::from_reference(Some(props))])
            .unwrap();
        assert_eq!(result[0].reference(), Some(props));
        assert!(thread.is_empty());

        let count_slot = properties_class.get_field("count", "I").unwrap().slot_id();
        let count = vm.heap().get(props).with_fields(|fields| fields.get_int(count_slot));
        assert_eq!(count as usize, system_properties().len());

        let pairs: Vec<(String, String)> = (0..count)
            .map(|index| {
                let key = vm.heap().get(keys).array_get::<Option<Reference>>(index);
                let value = vm.heap().get(values).array_get::<Option<Reference>>(index);
                (
                    vm.rust_string(key.flatten().unwrap()),
                    vm.rust_string(value.flatten().unwrap()),
                )
            })
            .collect();
        assert!(pairs.contains(&("java.version".to_string(), "1.8.0".to_string())));
        assert!(pairs.contains(&("file.encoding".to_string(), "UTF-8".to_string())));
        let line_separator = if cfg!(windows) { "\r\n" } else { "\n" };
        assert!(pairs.contains(&("line.separator".to_string(), line_separator.to_string())));
    }

    #[test]
    fn test_init_properties_requires_set_property() {
        let vm = test_vm(vec![
            ClassFileBuilder::new("java/util/Properties", Some("java/lang/Object")).build(),
        ]);
        let mut thread = vm.new_thread();
        let props = vm.heap().allocate(Object::new_instance(
            vm.load_class("java/util/Properties").unwrap(),
        ));
        let system = vm.load_class(SYSTEM).unwrap();
        let method = system
            .get_method(
                "initProperties",
                "(Ljava/util/Properties;)Ljava/util/Properties;",
            )
            .unwrap();
        let result = vm.invoke(&mut thread, method, &[Slot::from_reference(Some(props))]);
        assert_eq!(thrown_class(&vm, result), NO_SUCH_METHOD_ERROR);
    }
}
