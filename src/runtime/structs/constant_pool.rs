use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
    class::{ClassFormatError, ConstantPoolInfo, cp_class_name, cp_name_and_type, cp_utf8},
    runtime::{
        Class, Exception, Field, Method, NativeResult, Vm,
        famous_classes::{
            CLASS_FORMAT_ERROR, ILLEGAL_ACCESS_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR,
            NO_SUCH_FIELD_ERROR, NO_SUCH_METHOD_ERROR, OBJECT,
        },
    },
};

/// Runtime constant pool entry. Symbolic references resolve lazily and at most once.
#[derive(Debug)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(Arc<str>),
    Utf8(Arc<str>),
    Class(ClassRef),
    Fieldref(FieldRef),
    Methodref(MethodRef),
    InterfaceMethodref(InterfaceMethodRef),
    NameAndType {
        name: Arc<str>,
        descriptor: Arc<str>,
    },
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module(Arc<str>),
    Package(Arc<str>),
    Empty,
}

#[derive(Debug, Default)]
pub struct ConstantPool(Vec<Constant>);

impl ConstantPool {
    pub(crate) fn from_class_file(cp: &[ConstantPoolInfo]) -> Result<Self, ClassFormatError> {
        let member = |class_index: u16, name_and_type_index: u16| {
            let (name, descriptor) = cp_name_and_type(cp, name_and_type_index)?;
            Ok::<_, ClassFormatError>(MemberRef {
                class: ClassRef::new(cp_class_name(cp, class_index)?),
                name: Arc::clone(name),
                descriptor: Arc::clone(descriptor),
            })
        };

        let mut constants = Vec::with_capacity(cp.len());
        for info in cp {
            let constant = match info {
                ConstantPoolInfo::Utf8(value) => Constant::Utf8(Arc::clone(value)),
                ConstantPoolInfo::Integer(value) => Constant::Integer(*value),
                ConstantPoolInfo::Float(value) => Constant::Float(*value),
                ConstantPoolInfo::Long(value) => Constant::Long(*value),
                ConstantPoolInfo::Double(value) => Constant::Double(*value),
                ConstantPoolInfo::Class { name_index } => {
                    Constant::Class(ClassRef::new(cp_utf8(cp, *name_index)?))
                }
                ConstantPoolInfo::String { string_index } => {
                    Constant::String(Arc::clone(cp_utf8(cp, *string_index)?))
                }
                ConstantPoolInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                } => Constant::Fieldref(FieldRef {
                    member: member(*class_index, *name_and_type_index)?,
                    resolved: OnceCell::new(),
                }),
                ConstantPoolInfo::Methodref {
                    class_index,
                    name_and_type_index,
                } => Constant::Methodref(MethodRef {
                    member: member(*class_index, *name_and_type_index)?,
                    resolved: OnceCell::new(),
                }),
                ConstantPoolInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => Constant::InterfaceMethodref(InterfaceMethodRef {
                    member: member(*class_index, *name_and_type_index)?,
                    resolved: OnceCell::new(),
                }),
                ConstantPoolInfo::NameAndType {
                    name_index,
                    descriptor_index,
                } => Constant::NameAndType {
                    name: Arc::clone(cp_utf8(cp, *name_index)?),
                    descriptor: Arc::clone(cp_utf8(cp, *descriptor_index)?),
                },
                ConstantPoolInfo::MethodHandle { .. } => Constant::MethodHandle,
                ConstantPoolInfo::MethodType { .. } => Constant::MethodType,
                ConstantPoolInfo::Dynamic { .. } => Constant::Dynamic,
                ConstantPoolInfo::InvokeDynamic { .. } => Constant::InvokeDynamic,
                ConstantPoolInfo::Module { name_index } => {
                    Constant::Module(Arc::clone(cp_utf8(cp, *name_index)?))
                }
                ConstantPoolInfo::Package { name_index } => {
                    Constant::Package(Arc::clone(cp_utf8(cp, *name_index)?))
                }
                ConstantPoolInfo::Empty => Constant::Empty,
            };
            constants.push(constant);
        }
        Ok(ConstantPool(constants))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 1-based, like the operands that index it.
    pub fn get(&self, index: u16) -> NativeResult<&Constant> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .ok_or_else(|| {
                Exception::new_vm_msg(
                    CLASS_FORMAT_ERROR,
                    format!("constant pool index {index} out of range"),
                )
            })
    }

    pub(crate) fn class_ref(&self, index: u16) -> NativeResult<&ClassRef> {
        match self.get(index)? {
            Constant::Class(class_ref) => Ok(class_ref),
            other => Err(unexpected(index, "Class", other)),
        }
    }

    pub(crate) fn field_ref(&self, index: u16) -> NativeResult<&FieldRef> {
        match self.get(index)? {
            Constant::Fieldref(field_ref) => Ok(field_ref),
            other => Err(unexpected(index, "Fieldref", other)),
        }
    }

    pub(crate) fn interface_method_ref(&self, index: u16) -> NativeResult<&InterfaceMethodRef> {
        match self.get(index)? {
            Constant::InterfaceMethodref(method_ref) => Ok(method_ref),
            other => Err(unexpected(index, "InterfaceMethodref", other)),
        }
    }

    /// `invokestatic` and `invokespecial` may name either kind of method reference.
    pub(crate) fn any_method_ref(&self, index: u16) -> NativeResult<AnyMethodRef<'_>> {
        match self.get(index)? {
            Constant::Methodref(method_ref) => Ok(AnyMethodRef::Class(method_ref)),
            Constant::InterfaceMethodref(method_ref) => Ok(AnyMethodRef::Interface(method_ref)),
            other => Err(unexpected(index, "Methodref", other)),
        }
    }

    pub(crate) fn method_ref(&self, index: u16) -> NativeResult<&MethodRef> {
        match self.get(index)? {
            Constant::Methodref(method_ref) => Ok(method_ref),
            other => Err(unexpected(index, "Methodref", other)),
        }
    }
}

fn unexpected(index: u16, expected: &str, found: &Constant) -> Exception {
    Exception::new_vm_msg(
        CLASS_FORMAT_ERROR,
        format!("constant #{index} should be {expected}, found {found:?}"),
    )
}

#[derive(Debug)]
pub struct ClassRef {
    pub(crate) name: Arc<str>,
    resolved: OnceCell<Arc<Class>>,
}

impl ClassRef {
    pub(crate) fn new(name: &Arc<str>) -> Self {
        ClassRef {
            name: Arc::clone(name),
            resolved: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn resolved_class(&self, vm: &Vm, referrer: &Class) -> NativeResult<Arc<Class>> {
        self.resolved
            .get_or_try_init(|| {
                vm.count_resolution();
                let class = vm.load_class(&self.name)?;
                if !class.is_accessible_to(referrer) {
                    return Err(Exception::new_vm_msg(
                        ILLEGAL_ACCESS_ERROR,
                        format!(
                            "tried to access class {} from class {}",
                            class.java_name(),
                            referrer.java_name()
                        ),
                    ));
                }
                Ok(class)
            })
            .map(Arc::clone)
    }
}

#[derive(Debug)]
pub struct MemberRef {
    pub(crate) class: ClassRef,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
}

impl MemberRef {
    pub fn class_ref(&self) -> &ClassRef {
        &self.class
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<str> {
        &self.descriptor
    }

    fn describe(&self) -> String {
        format!("{}.{}{}", self.class.name.replace('/', "."), self.name, self.descriptor)
    }
}

fn illegal_member_access(kind: &str, member: &MemberRef, referrer: &Class) -> Exception {
    Exception::new_vm_msg(
        ILLEGAL_ACCESS_ERROR,
        format!(
            "tried to access {kind} {} from class {}",
            member.describe(),
            referrer.java_name()
        ),
    )
}

#[derive(Debug)]
pub struct FieldRef {
    pub(crate) member: MemberRef,
    resolved: OnceCell<Arc<Field>>,
}

impl FieldRef {
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    pub fn resolved_field(&self, vm: &Vm, referrer: &Class) -> NativeResult<Arc<Field>> {
        self.resolved
            .get_or_try_init(|| {
                let class = self.member.class.resolved_class(vm, referrer)?;
                vm.count_resolution();
                let field = class
                    .lookup_field(&self.member.name, &self.member.descriptor)
                    .ok_or_else(|| {
                        log::debug!("field {} not found", self.member.describe());
                        Exception::new_vm_msg(NO_SUCH_FIELD_ERROR, self.member.name.to_string())
                    })?;
                if !field.is_accessible_to(referrer) {
                    return Err(illegal_member_access("field", &self.member, referrer));
                }
                Ok(field)
            })
            .map(Arc::clone)
    }
}

#[derive(Debug)]
pub struct MethodRef {
    pub(crate) member: MemberRef,
    resolved: OnceCell<Arc<Method>>,
}

impl MethodRef {
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    pub fn resolved_method(&self, vm: &Vm, referrer: &Class) -> NativeResult<Arc<Method>> {
        self.resolved
            .get_or_try_init(|| {
                let class = self.member.class.resolved_class(vm, referrer)?;
                vm.count_resolution();
                if class.is_interface() {
                    return Err(Exception::new_vm_msg(
                        INCOMPATIBLE_CLASS_CHANGE_ERROR,
                        format!("found interface {}, but class was expected", class.java_name()),
                    ));
                }
                let method = class
                    .lookup_method(&self.member.name, &self.member.descriptor)
                    .ok_or_else(|| {
                        log::debug!("method {} not found", self.member.describe());
                        Exception::new_vm_msg(NO_SUCH_METHOD_ERROR, self.member.describe())
                    })?;
                if !method.is_accessible_to(referrer) {
                    return Err(illegal_member_access("method", &self.member, referrer));
                }
                Ok(method)
            })
            .map(Arc::clone)
    }
}

#[derive(Debug)]
pub struct InterfaceMethodRef {
    pub(crate) member: MemberRef,
    resolved: OnceCell<Arc<Method>>,
}

impl InterfaceMethodRef {
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    pub fn resolved_interface_method(
        &self,
        vm: &Vm,
        referrer: &Class,
    ) -> NativeResult<Arc<Method>> {
        self.resolved
            .get_or_try_init(|| {
                let class = self.member.class.resolved_class(vm, referrer)?;
                vm.count_resolution();
                if !class.is_interface() {
                    return Err(Exception::new_vm_msg(
                        INCOMPATIBLE_CLASS_CHANGE_ERROR,
                        format!("found class {}, but interface was expected", class.java_name()),
                    ));
                }
                let name = &self.member.name;
                let descriptor = &self.member.descriptor;
                // public methods of Object are members of every interface
                let method = match class.lookup_interface_method(name, descriptor) {
                    Some(method) => Some(method),
                    None => vm
                        .load_class(OBJECT)?
                        .get_method(name, descriptor)
                        .filter(|method| method.is_public() && !method.is_static())
                        .cloned(),
                };
                let method = method.ok_or_else(|| {
                    log::debug!("interface method {} not found", self.member.describe());
                    Exception::new_vm_msg(NO_SUCH_METHOD_ERROR, self.member.describe())
                })?;
                if !method.is_accessible_to(referrer) {
                    return Err(illegal_member_access("method", &self.member, referrer));
                }
                Ok(method)
            })
            .map(Arc::clone)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum AnyMethodRef<'a> {
    Class(&'a MethodRef),
    Interface(&'a InterfaceMethodRef),
}

impl AnyMethodRef<'_> {
    pub(crate) fn member(&self) -> &MemberRef {
        match self {
            AnyMethodRef::Class(method_ref) => &method_ref.member,
            AnyMethodRef::Interface(method_ref) => &method_ref.member,
        }
    }

    pub(crate) fn resolved(&self, vm: &Vm, referrer: &Class) -> NativeResult<Arc<Method>> {
        match self {
            AnyMethodRef::Class(method_ref) => method_ref.resolved_method(vm, referrer),
            AnyMethodRef::Interface(method_ref) => {
                method_ref.resolved_interface_method(vm, referrer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        VmOptions,
        test_support::{ClassFileBuilder, TestClassPath, bootstrap_classes},
    };

    fn vm_with(classes: Vec<crate::class::ClassFile>) -> Vm {
        let class_path = TestClassPath::new(bootstrap_classes().into_iter().chain(classes));
        Vm::with_parser(
            VmOptions::default(),
            Box::new(class_path.clone()),
            Box::new(class_path),
        )
    }

    #[test]
    fn test_class_ref_resolves_once() {
        let mut builder = ClassFileBuilder::new("pkg/A", Some("java/lang/Object"));
        let class_index = builder.class("pkg/B");
        let vm = vm_with(vec![
            builder.build(),
            ClassFileBuilder::new("pkg/B", Some("java/lang/Object")).build(),
        ]);
        let a = vm.load_class("pkg/A").unwrap();
        let class_ref = a.constant_pool.class_ref(class_index).unwrap();

        let before = vm.resolution_count();
        let first = class_ref.resolved_class(&vm, &a).unwrap();
        let second = class_ref.resolved_class(&vm, &a).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(vm.resolution_count(), before + 1);
    }

    #[test]
    fn test_field_ref_resolves_once() {
        let mut builder = ClassFileBuilder::new("pkg/A", Some("java/lang/Object"));
        let field_index = builder.field_ref("pkg/B", "count", "I");
        let mut b = ClassFileBuilder::new("pkg/B", Some("java/lang/Object"));
        b.add_field(crate::consts::ACC_PUBLIC, "count", "I");
        let vm = vm_with(vec![builder.build(), b.build()]);
        let a = vm.load_class("pkg/A").unwrap();
        let field_ref = a.constant_pool.field_ref(field_index).unwrap();

        let first = field_ref.resolved_field(&vm, &a).unwrap();
        let after_first = vm.resolution_count();
        let second = field_ref.resolved_field(&vm, &a).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(vm.resolution_count(), after_first);
        assert_eq!(&*first.name, "count");
    }

    #[test]
    fn test_private_field_is_not_accessible() {
        let mut builder = ClassFileBuilder::new("pkg/A", Some("java/lang/Object"));
        let field_index = builder.field_ref("pkg/B", "secret", "I");
        let mut b = ClassFileBuilder::new("pkg/B", Some("java/lang/Object"));
        b.add_field(crate::consts::ACC_PRIVATE, "secret", "I");
        let vm = vm_with(vec![builder.build(), b.build()]);
        let a = vm.load_class("pkg/A").unwrap();
        let field_ref = a.constant_pool.field_ref(field_index).unwrap();

        let err = field_ref.resolved_field(&vm, &a).unwrap_err();
        assert!(matches!(
            err,
            Exception::VmException { class_name, .. } if class_name == ILLEGAL_ACCESS_ERROR
        ));
    }

    #[test]
    fn test_method_ref_to_interface_is_incompatible() {
        let mut builder = ClassFileBuilder::new("pkg/A", Some("java/lang/Object"));
        let method_index = builder.method_ref("pkg/I", "run", "()V");
        let mut i = ClassFileBuilder::new("pkg/I", Some("java/lang/Object"));
        i.set_access_flags(
            crate::consts::ClassAccessFlag::PUBLIC
                | crate::consts::ClassAccessFlag::INTERFACE
                | crate::consts::ClassAccessFlag::ABSTRACT,
        );
        let vm = vm_with(vec![builder.build(), i.build()]);
        let a = vm.load_class("pkg/A").unwrap();
        let method_ref = a.constant_pool.method_ref(method_index).unwrap();

        let err = method_ref.resolved_method(&vm, &a).unwrap_err();
        assert!(matches!(
            err,
            Exception::VmException { class_name, .. }
                if class_name == INCOMPATIBLE_CLASS_CHANGE_ERROR
        ));
    }
}
