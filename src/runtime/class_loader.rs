use std::sync::{Arc, Weak};

use crate::{
    class::{ClassFile, ClassFormatError, ConstantPoolInfo, MethodInfo, cp_class_name, cp_utf8},
    consts::FieldAccessFlag,
    descriptor::{FieldDescriptor, FieldType, parse_field_descriptor, parse_method_descriptor},
    runtime::{
        Class, ClassMember, Constant, Exception, ExceptionHandler, Field, Frame, Method,
        NativeResult, Thread, Vm,
        famous_classes::{CLASS_FORMAT_ERROR, STRING},
    },
};

mod bootstrap;
pub(crate) use bootstrap::BootstrapClassLoader;

/// Assigns slot ids: instance fields continue after the superclass's slots, static fields
/// start at 0. Long and double fields take two slots.
///
/// Returns the fields plus the instance and static slot counts. The fields' class
/// back-references are filled in by the caller.
pub(crate) fn layout_fields(
    class_file: &ClassFile,
    super_slot_count: usize,
) -> Result<(Vec<Field>, usize, usize), ClassFormatError> {
    let cp = &class_file.constant_pool;
    let mut instance_slot_count = super_slot_count;
    let mut static_slot_count = 0;
    let mut fields = Vec::with_capacity(class_file.fields.len());

    for info in &class_file.fields {
        let name = cp_utf8(cp, info.name_index)?;
        let descriptor = cp_utf8(cp, info.descriptor_index)?;
        let (_, FieldDescriptor(field_type)) = parse_field_descriptor(descriptor)
            .map_err(|_| ClassFormatError(format!("invalid field descriptor {descriptor}")))?;

        let counter = if info.access_flags.contains(FieldAccessFlag::STATIC) {
            &mut static_slot_count
        } else {
            &mut instance_slot_count
        };
        let slot_id = *counter;
        *counter += field_type.slot_size();

        fields.push(Field {
            member: ClassMember {
                access_flags: info.access_flags.bits(),
                name: Arc::clone(name),
                descriptor: Arc::clone(descriptor),
                class: Weak::new(),
            },
            const_value_index: info.constant_value_index(),
            slot_id,
            field_type,
        });
    }
    Ok((fields, instance_slot_count, static_slot_count))
}

/// Native methods get the two-byte `invokenative; xreturn` body.
pub(crate) fn convert_method(
    cp: &[ConstantPoolInfo],
    info: &MethodInfo,
) -> Result<Method, ClassFormatError> {
    let name = cp_utf8(cp, info.name_index)?;
    let descriptor = cp_utf8(cp, info.descriptor_index)?;
    let (_, parsed_descriptor) = parse_method_descriptor(descriptor)
        .map_err(|_| ClassFormatError(format!("invalid method descriptor {descriptor}")))?;
    let access_flags = info.access_flags.bits();
    let arg_slot_count = Method::arg_slot_count(&parsed_descriptor, access_flags);
    let exceptions = info
        .exception_index_table()
        .iter()
        .map(|&index| cp_class_name(cp, index).cloned())
        .collect::<Result<Vec<_>, _>>()?;

    let member = ClassMember {
        access_flags,
        name: Arc::clone(name),
        descriptor: Arc::clone(descriptor),
        class: Weak::new(),
    };
    let mut method = Method {
        member,
        max_stack: 0,
        max_locals: 0,
        code: Arc::from([]),
        exception_table: vec![],
        line_numbers: vec![],
        exceptions,
        arg_slot_count,
        parsed_descriptor,
    };

    if method.is_native() {
        method.code = Method::native_code(&method.parsed_descriptor);
        method.max_stack = Method::NATIVE_MAX_STACK;
        method.max_locals = arg_slot_count;
    } else if let Some(code) = info.code() {
        method.max_stack = code.max_stack as usize;
        method.max_locals = code.max_locals as usize;
        method.code = Arc::from(code.code.as_slice());
        method.exception_table = code
            .exception_table
            .iter()
            .map(|item| ExceptionHandler {
                start_pc: item.start_pc as usize,
                end_pc: item.end_pc as usize,
                handler_pc: item.handler_pc as usize,
                catch_type: (item.catch_type != 0).then_some(item.catch_type),
            })
            .collect();
        method.line_numbers = code.line_numbers();
    }
    Ok(method)
}

/// Stores ConstantValue attributes of `static final` fields into static storage.
pub(crate) fn seed_static_finals(vm: &Vm, class: &Class) -> NativeResult<()> {
    for field in &class.fields {
        if !field.is_static() || !field.is_final() {
            continue;
        }
        let Some(index) = field.const_value_index else {
            continue;
        };
        let slot_id = field.slot_id;
        match (&field.field_type, class.constant_pool.get(index)?) {
            (
                FieldType::Boolean
                | FieldType::Byte
                | FieldType::Char
                | FieldType::Short
                | FieldType::Int,
                Constant::Integer(value),
            ) => class.static_vars.write().set_int(slot_id, *value),
            (FieldType::Long, Constant::Long(value)) => {
                class.static_vars.write().set_long(slot_id, *value)
            }
            (FieldType::Float, Constant::Float(value)) => {
                class.static_vars.write().set_float(slot_id, *value)
            }
            (FieldType::Double, Constant::Double(value)) => {
                class.static_vars.write().set_double(slot_id, *value)
            }
            (FieldType::Object(name), Constant::String(value)) if name == STRING => {
                let string = vm.intern_string(value)?;
                class.static_vars.write().set_reference(slot_id, Some(string));
            }
            (field_type, constant) => {
                return Err(Exception::new_vm_msg(
                    CLASS_FORMAT_ERROR,
                    format!(
                        "bad ConstantValue {constant:?} for field {}.{} of type {}",
                        class.class_name,
                        field.name,
                        field_type.to_descriptor()
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Marks `class` as started and schedules its `<clinit>`. An uninitialized superclass is
/// scheduled afterwards, so its frame lands on top and runs first.
pub(crate) fn initialize_class(thread: &mut Thread, class: &Arc<Class>) -> NativeResult<()> {
    class.start_init();
    if let Some(clinit) = class.clinit() {
        log::debug!("scheduling {}.<clinit>", class.class_name);
        thread.push_frame(Frame::new(Arc::clone(clinit)))?;
    }
    if !class.is_interface() {
        if let Some(super_class) = &class.super_class {
            if !super_class.init_started() {
                initialize_class(thread, super_class)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consts::{ACC_NATIVE, ACC_PUBLIC, ACC_STATIC},
        runtime::{
            VmOptions,
            interpreter::instructions as inst,
            test_support::{ClassFileBuilder, TestClassPath, bootstrap_classes},
        },
    };

    fn vm_with(classes: Vec<ClassFile>) -> Vm {
        let class_path = TestClassPath::new(bootstrap_classes().into_iter().chain(classes));
        Vm::with_parser(
            VmOptions::default(),
            Box::new(class_path.clone()),
            Box::new(class_path),
        )
    }

    #[test]
    fn test_native_method_body() {
        let mut builder = ClassFileBuilder::new("pkg/N", Some("java/lang/Object"));
        builder.add_method(ACC_PUBLIC | ACC_NATIVE, "size", "(JLjava/lang/String;)D", 0, 0, &[]);
        builder.add_method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "run", "()V", 0, 0, &[]);
        let vm = vm_with(vec![builder.build()]);
        let class = vm.load_class("pkg/N").unwrap();

        let size = class.get_method("size", "(JLjava/lang/String;)D").unwrap();
        assert_eq!(&size.code[..], &[inst::INVOKENATIVE, inst::DRETURN]);
        assert_eq!(size.arg_slot_count, 4);
        assert_eq!(size.max_locals, 4);
        assert_eq!(size.max_stack, 4);
        assert_eq!(size.line_number(0), -2);

        let run = class.get_method("run", "()V").unwrap();
        assert_eq!(&run.code[..], &[inst::INVOKENATIVE, inst::RETURN]);
        assert_eq!(run.arg_slot_count, 0);
    }

    #[test]
    fn test_super_clinit_is_scheduled_last() {
        let mut base = ClassFileBuilder::new("pkg/Base", Some("java/lang/Object"));
        base.add_method(ACC_STATIC, "<clinit>", "()V", 0, 0, &[inst::RETURN]);
        let mut derived = ClassFileBuilder::new("pkg/Derived", Some("pkg/Base"));
        derived.add_method(ACC_STATIC, "<clinit>", "()V", 0, 0, &[inst::RETURN]);
        let vm = vm_with(vec![base.build(), derived.build()]);

        let derived = vm.load_class("pkg/Derived").unwrap();
        let mut thread = Thread::new(16);
        initialize_class(&mut thread, &derived).unwrap();

        assert!(derived.init_started());
        assert!(derived.super_class().unwrap().init_started());
        // java/lang/Object stub has no <clinit>
        assert_eq!(thread.depth(), 2);
        let top = thread.top_frame().unwrap();
        assert_eq!(top.method.class().class_name().as_ref(), "pkg/Base");
    }
}
