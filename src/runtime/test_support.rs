//! In-memory class files for tests: a builder, a class path over a map, and minimal stubs of
//! the core `java/lang` classes.

use std::{collections::HashMap, sync::Arc};

use crate::{
    class::{
        AttributeInfo, ClassFile, ClassFormatError, ClassParser, CodeAttribute, ConstantPoolInfo,
        ExceptionTableItem, FieldInfo, LineNumberTableItem, MethodInfo,
    },
    classpath::ClassPathEntry,
    consts::{
        ACC_ABSTRACT, ACC_FINAL, ACC_NATIVE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC,
        ClassAccessFlag, FieldAccessFlag, MethodAccessFlag,
    },
    runtime::{Vm, VmOptions, famous_classes::*, interpreter::instructions as inst},
};

pub(crate) struct ClassFileBuilder {
    constant_pool: Vec<ConstantPoolInfo>,
    access_flags: ClassAccessFlag,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: Vec<AttributeInfo>,
}

impl ClassFileBuilder {
    pub(crate) fn new(class_name: &str, super_class: Option<&str>) -> Self {
        let mut builder = Self {
            constant_pool: vec![],
            access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };
        builder.this_class = builder.class(class_name);
        if let Some(super_class) = super_class {
            builder.super_class = builder.class(super_class);
        }
        builder
    }

    fn push(&mut self, info: ConstantPoolInfo) -> u16 {
        self.constant_pool.push(info);
        self.constant_pool.len() as u16
    }

    pub(crate) fn set_access_flags(&mut self, access_flags: ClassAccessFlag) {
        self.access_flags = access_flags;
    }

    pub(crate) fn set_interface(&mut self) {
        self.access_flags =
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT;
    }

    pub(crate) fn set_source_file(&mut self, source_file: &str) {
        let sourcefile_index = self.utf8(source_file);
        self.attributes
            .push(AttributeInfo::SourceFile { sourcefile_index });
    }

    pub(crate) fn add_interface(&mut self, interface: &str) {
        let index = self.class(interface);
        self.interfaces.push(index);
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        let existing = self.constant_pool.iter().position(
            |info| matches!(info, ConstantPoolInfo::Utf8(existing) if &**existing == value),
        );
        match existing {
            Some(position) => position as u16 + 1,
            None => self.push(ConstantPoolInfo::Utf8(Arc::from(value))),
        }
    }

    pub(crate) fn class(&mut self, class_name: &str) -> u16 {
        let name_index = self.utf8(class_name);
        let existing = self.constant_pool.iter().position(|info| {
            matches!(info, ConstantPoolInfo::Class { name_index: existing } if *existing == name_index)
        });
        match existing {
            Some(position) => position as u16 + 1,
            None => self.push(ConstantPoolInfo::Class { name_index }),
        }
    }

    /// Always a new entry, so two equal strings get two indices.
    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let string_index = self.utf8(value);
        self.push(ConstantPoolInfo::String { string_index })
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        self.push(ConstantPoolInfo::Integer(value))
    }

    pub(crate) fn float(&mut self, value: f32) -> u16 {
        self.push(ConstantPoolInfo::Float(value))
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        let index = self.push(ConstantPoolInfo::Long(value));
        self.push(ConstantPoolInfo::Empty);
        index
    }

    pub(crate) fn double(&mut self, value: f64) -> u16 {
        let index = self.push(ConstantPoolInfo::Double(value));
        self.push(ConstantPoolInfo::Empty);
        index
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub(crate) fn field_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class_name);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub(crate) fn method_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class_name);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    pub(crate) fn interface_method_ref(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class_index = self.class(class_name);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    pub(crate) fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(FieldInfo {
            access_flags: FieldAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes: vec![],
        });
    }

    pub(crate) fn add_constant_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        constantvalue_index: u16,
    ) {
        self.add_field(access_flags, name, descriptor);
        if let Some(field) = self.fields.last_mut() {
            field
                .attributes
                .push(AttributeInfo::ConstantValue { constantvalue_index });
        }
    }

    /// Native and abstract methods get no Code attribute.
    pub(crate) fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) {
        self.add_method_full(
            access_flags,
            name,
            descriptor,
            max_stack,
            max_locals,
            code,
            &[],
            &[],
        );
    }

    /// `lines` holds `(start_pc, line_number)` pairs.
    pub(crate) fn add_method_with_lines(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        lines: &[(u16, u16)],
    ) {
        self.add_method_full(
            access_flags,
            name,
            descriptor,
            max_stack,
            max_locals,
            code,
            &[],
            lines,
        );
    }

    /// `handlers` holds `(start_pc, end_pc, handler_pc, catch_type)`; catch type 0 catches
    /// everything.
    pub(crate) fn add_method_with_handlers(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        handlers: &[(u16, u16, u16, u16)],
    ) {
        self.add_method_full(
            access_flags,
            name,
            descriptor,
            max_stack,
            max_locals,
            code,
            handlers,
            &[],
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn add_method_full(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        handlers: &[(u16, u16, u16, u16)],
        lines: &[(u16, u16)],
    ) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut attributes = vec![];
        if access_flags & (ACC_NATIVE | ACC_ABSTRACT) == 0 {
            let mut code_attributes = vec![];
            if !lines.is_empty() {
                code_attributes.push(AttributeInfo::LineNumberTable(
                    lines
                        .iter()
                        .map(|&(start_pc, line_number)| LineNumberTableItem {
                            start_pc,
                            line_number,
                        })
                        .collect(),
                ));
            }
            attributes.push(AttributeInfo::Code(CodeAttribute {
                max_stack,
                max_locals,
                code: code.to_vec(),
                exception_table: handlers
                    .iter()
                    .map(
                        |&(start_pc, end_pc, handler_pc, catch_type)| ExceptionTableItem {
                            start_pc,
                            end_pc,
                            handler_pc,
                            catch_type,
                        },
                    )
                    .collect(),
                attributes: code_attributes,
            }));
        }
        self.methods.push(MethodInfo {
            access_flags: MethodAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        });
    }

    pub(crate) fn build(self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.constant_pool,
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }
}

/// Serves prebuilt class files: `read_class` hands out the class name as the "bytes", and
/// `parse` maps it back to the stored [`ClassFile`].
#[derive(Debug, Clone)]
pub(crate) struct TestClassPath {
    classes: Arc<HashMap<String, ClassFile>>,
}

impl TestClassPath {
    /// Later classes replace earlier ones of the same name.
    pub(crate) fn new(classes: impl IntoIterator<Item = ClassFile>) -> Self {
        let classes = classes
            .into_iter()
            .map(|class| {
                let name = class.class_name().expect("class name").to_string();
                (name, class)
            })
            .collect();
        Self {
            classes: Arc::new(classes),
        }
    }
}

impl ClassPathEntry for TestClassPath {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        self.classes
            .contains_key(class_name)
            .then(|| (class_name.as_bytes().to_vec(), "memory".to_string()))
    }
}

impl ClassParser for TestClassPath {
    fn parse(&self, bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
        let name = std::str::from_utf8(bytes)
            .map_err(|_| ClassFormatError("not a test class name".to_string()))?;
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| ClassFormatError(format!("unknown test class {name}")))
    }
}

/// A [`Vm`] over [`bootstrap_classes`] plus `classes`.
pub(crate) fn test_vm(classes: Vec<ClassFile>) -> Vm {
    let class_path = TestClassPath::new(bootstrap_classes().into_iter().chain(classes));
    Vm::with_parser(
        VmOptions::default(),
        Box::new(class_path.clone()),
        Box::new(class_path),
    )
}

fn interface(class_name: &str) -> ClassFile {
    let mut builder = ClassFileBuilder::new(class_name, Some(OBJECT));
    builder.set_interface();
    builder.build()
}

/// `()V` and `(Ljava/lang/String;)V` constructors delegating to the superclass.
fn throwable_subclass(class_name: &str, super_class: &str) -> ClassFile {
    let mut builder = ClassFileBuilder::new(class_name, Some(super_class));
    let [i_hi, i_lo] = builder.method_ref(super_class, "<init>", "()V").to_be_bytes();
    let [s_hi, s_lo] = builder
        .method_ref(super_class, "<init>", "(Ljava/lang/String;)V")
        .to_be_bytes();
    builder.add_method(
        ACC_PUBLIC,
        "<init>",
        "()V",
        1,
        1,
        &[inst::ALOAD_0, inst::INVOKESPECIAL, i_hi, i_lo, inst::RETURN],
    );
    builder.add_method(
        ACC_PUBLIC,
        "<init>",
        "(Ljava/lang/String;)V",
        2,
        2,
        &[
            inst::ALOAD_0,
            inst::ALOAD_1,
            inst::INVOKESPECIAL,
            s_hi,
            s_lo,
            inst::RETURN,
        ],
    );
    builder.build()
}

fn object() -> ClassFile {
    let mut builder = ClassFileBuilder::new(OBJECT, None);
    builder.add_method(ACC_PUBLIC, "<init>", "()V", 0, 1, &[inst::RETURN]);
    builder.add_method(ACC_PUBLIC | ACC_NATIVE, "hashCode", "()I", 0, 0, &[]);
    builder.add_method(
        ACC_PROTECTED | ACC_NATIVE,
        "clone",
        "()Ljava/lang/Object;",
        0,
        0,
        &[],
    );
    builder.add_method(
        ACC_PUBLIC | ACC_FINAL | ACC_NATIVE,
        "getClass",
        "()Ljava/lang/Class;",
        0,
        0,
        &[],
    );
    builder.build()
}

fn string() -> ClassFile {
    let mut builder = ClassFileBuilder::new(STRING, Some(OBJECT));
    builder.add_field(ACC_PRIVATE | ACC_FINAL, "value", "[C");
    builder.add_method(
        ACC_PUBLIC | ACC_NATIVE,
        "intern",
        "()Ljava/lang/String;",
        0,
        0,
        &[],
    );
    builder.build()
}

fn class() -> ClassFile {
    let mut builder = ClassFileBuilder::new(CLASS, Some(OBJECT));
    let natives = [
        (
            ACC_STATIC,
            "getPrimitiveClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        ),
        (ACC_PRIVATE, "getName0", "()Ljava/lang/String;"),
        (
            ACC_PRIVATE | ACC_STATIC,
            "desiredAssertionStatus0",
            "(Ljava/lang/Class;)Z",
        ),
        (ACC_PUBLIC, "isInterface", "()Z"),
        (ACC_PUBLIC, "isPrimitive", "()Z"),
        (ACC_PUBLIC, "isArray", "()Z"),
        (
            ACC_PRIVATE,
            "getDeclaredFields0",
            "(Z)[Ljava/lang/reflect/Field;",
        ),
        (ACC_PRIVATE | ACC_STATIC, "registerNatives", "()V"),
    ];
    for (access_flags, name, descriptor) in natives {
        builder.add_method(access_flags | ACC_NATIVE, name, descriptor, 0, 0, &[]);
    }
    builder.build()
}

fn field() -> ClassFile {
    let mut builder = ClassFileBuilder::new(FIELD, Some(OBJECT));
    let fields = [
        ("clazz", "Ljava/lang/Class;"),
        ("name", "Ljava/lang/String;"),
        ("type", "Ljava/lang/Class;"),
        ("modifiers", "I"),
        ("slot", "I"),
    ];
    let mut code = vec![];
    for (local, (name, descriptor)) in fields.iter().enumerate() {
        builder.add_field(ACC_PRIVATE, name, descriptor);
        let [hi, lo] = builder.field_ref(FIELD, name, descriptor).to_be_bytes();
        let load = if descriptor.starts_with('L') {
            inst::ALOAD
        } else {
            inst::ILOAD
        };
        code.extend([inst::ALOAD_0, load, local as u8 + 1, inst::PUTFIELD, hi, lo]);
    }
    code.push(inst::RETURN);
    builder.add_method(
        0,
        "<init>",
        "(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/Class;IILjava/lang/String;[B)V",
        2,
        8,
        &code,
    );
    builder.build()
}

fn system() -> ClassFile {
    let mut builder = ClassFileBuilder::new("java/lang/System", Some(OBJECT));
    builder.add_field(
        ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
        "in",
        "Ljava/io/InputStream;",
    );
    builder.add_field(
        ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
        "out",
        "Ljava/io/PrintStream;",
    );
    builder.add_field(
        ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
        "err",
        "Ljava/io/PrintStream;",
    );
    let natives = [
        (
            ACC_PUBLIC,
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        ),
        (ACC_PUBLIC, "currentTimeMillis", "()J"),
        (ACC_PUBLIC, "nanoTime", "()J"),
        (ACC_PUBLIC, "identityHashCode", "(Ljava/lang/Object;)I"),
        (ACC_PRIVATE, "setIn0", "(Ljava/io/InputStream;)V"),
        (ACC_PRIVATE, "setOut0", "(Ljava/io/PrintStream;)V"),
        (ACC_PRIVATE, "setErr0", "(Ljava/io/PrintStream;)V"),
        (
            ACC_PRIVATE,
            "initProperties",
            "(Ljava/util/Properties;)Ljava/util/Properties;",
        ),
    ];
    for (access_flags, name, descriptor) in natives {
        builder.add_method(
            access_flags | ACC_STATIC | ACC_NATIVE,
            name,
            descriptor,
            0,
            0,
            &[],
        );
    }
    builder.build()
}

fn boxed(class_name: &str, natives: [(&str, &str); 2]) -> ClassFile {
    let mut builder = ClassFileBuilder::new(class_name, Some(OBJECT));
    for (name, descriptor) in natives {
        builder.add_method(
            ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
            name,
            descriptor,
            0,
            0,
            &[],
        );
    }
    builder.build()
}

fn throwable() -> ClassFile {
    let mut builder = ClassFileBuilder::new(THROWABLE, Some(OBJECT));
    builder.add_field(ACC_PRIVATE, "detailMessage", "Ljava/lang/String;");
    let [o_hi, o_lo] = builder.method_ref(OBJECT, "<init>", "()V").to_be_bytes();
    let [f_hi, f_lo] = builder
        .method_ref(THROWABLE, "fillInStackTrace", "()Ljava/lang/Throwable;")
        .to_be_bytes();
    let [n_hi, n_lo] = builder
        .method_ref(THROWABLE, "fillInStackTrace", "(I)Ljava/lang/Throwable;")
        .to_be_bytes();
    let [m_hi, m_lo] = builder
        .field_ref(THROWABLE, "detailMessage", "Ljava/lang/String;")
        .to_be_bytes();

    builder.add_method(
        ACC_PUBLIC,
        "<init>",
        "()V",
        1,
        1,
        &[
            inst::ALOAD_0,
            inst::INVOKESPECIAL,
            o_hi,
            o_lo,
            inst::ALOAD_0,
            inst::INVOKEVIRTUAL,
            f_hi,
            f_lo,
            inst::POP,
            inst::RETURN,
        ],
    );
    builder.add_method(
        ACC_PUBLIC,
        "<init>",
        "(Ljava/lang/String;)V",
        2,
        2,
        &[
            inst::ALOAD_0,
            inst::INVOKESPECIAL,
            o_hi,
            o_lo,
            inst::ALOAD_0,
            inst::INVOKEVIRTUAL,
            f_hi,
            f_lo,
            inst::POP,
            inst::ALOAD_0,
            inst::ALOAD_1,
            inst::PUTFIELD,
            m_hi,
            m_lo,
            inst::RETURN,
        ],
    );
    builder.add_method(
        ACC_PUBLIC,
        "fillInStackTrace",
        "()Ljava/lang/Throwable;",
        2,
        1,
        &[
            inst::ALOAD_0,
            inst::ICONST_0,
            inst::INVOKEVIRTUAL,
            n_hi,
            n_lo,
            inst::ARETURN,
        ],
    );
    builder.add_method(
        ACC_PRIVATE | ACC_NATIVE,
        "fillInStackTrace",
        "(I)Ljava/lang/Throwable;",
        0,
        0,
        &[],
    );
    builder.add_method(
        ACC_PUBLIC,
        "getMessage",
        "()Ljava/lang/String;",
        1,
        1,
        &[inst::ALOAD_0, inst::GETFIELD, m_hi, m_lo, inst::ARETURN],
    );
    builder.build()
}

/// Minimal stand-ins for the classes the runtime itself relies on.
pub(crate) fn bootstrap_classes() -> Vec<ClassFile> {
    let mut classes = vec![
        object(),
        interface(CLONEABLE),
        interface(SERIALIZABLE),
        string(),
        class(),
        field(),
        system(),
        boxed(
            "java/lang/Float",
            [("floatToRawIntBits", "(F)I"), ("intBitsToFloat", "(I)F")],
        ),
        boxed(
            "java/lang/Double",
            [
                ("doubleToRawLongBits", "(D)J"),
                ("longBitsToDouble", "(J)D"),
            ],
        ),
        throwable(),
    ];

    const LINKAGE_ERROR: &str = "java/lang/LinkageError";
    const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
    const REFLECTIVE_OPERATION_EXCEPTION: &str = "java/lang/ReflectiveOperationException";
    let hierarchy = [
        ("java/lang/Exception", THROWABLE),
        ("java/lang/Error", THROWABLE),
        (RUNTIME_EXCEPTION, "java/lang/Exception"),
        (LINKAGE_ERROR, "java/lang/Error"),
        (INCOMPATIBLE_CLASS_CHANGE_ERROR, LINKAGE_ERROR),
        (NO_SUCH_FIELD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
        (NO_SUCH_METHOD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
        (ILLEGAL_ACCESS_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
        (INSTANTIATION_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
        (ABSTRACT_METHOD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
        (CLASS_FORMAT_ERROR, LINKAGE_ERROR),
        (CLASS_CIRCULARITY_ERROR, LINKAGE_ERROR),
        (NO_CLASS_DEF_FOUND_ERROR, LINKAGE_ERROR),
        (UNSATISFIED_LINK_ERROR, LINKAGE_ERROR),
        (REFLECTIVE_OPERATION_EXCEPTION, "java/lang/Exception"),
        (CLASS_NOT_FOUND_EXCEPTION, REFLECTIVE_OPERATION_EXCEPTION),
        (CLONE_NOT_SUPPORTED_EXCEPTION, "java/lang/Exception"),
        (NULL_POINTER_EXCEPTION, RUNTIME_EXCEPTION),
        (NEGATIVE_ARRAY_SIZE_EXCEPTION, RUNTIME_EXCEPTION),
        (ARRAY_STORE_EXCEPTION, RUNTIME_EXCEPTION),
        (CLASS_CAST_EXCEPTION, RUNTIME_EXCEPTION),
        (ARITHMETIC_EXCEPTION, RUNTIME_EXCEPTION),
        (INDEX_OUT_OF_BOUNDS_EXCEPTION, RUNTIME_EXCEPTION),
        (ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION),
    ];
    classes.extend(
        hierarchy
            .iter()
            .map(|(class_name, super_class)| throwable_subclass(class_name, super_class)),
    );
    classes
}
