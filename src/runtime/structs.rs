use std::{
    fmt, ptr,
    ops::Deref,
    sync::{Arc, Weak},
};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

pub use constant_pool::*;
pub use object::*;
pub use slots::*;

use crate::{
    class::{ClassFormatError, LineNumberTableItem},
    consts::{
        ACC_ABSTRACT, ACC_FINAL, ACC_NATIVE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC,
        ClassAccessFlag,
    },
    descriptor::{FieldType, MethodDescriptor, primitive_descriptor},
    runtime::{Reference, famous_classes::CLASS_FORMAT_ERROR},
};

mod constant_pool;
mod object;
mod slots;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitState {
    NotStarted,
    Started,
}

#[derive(Debug)]
pub struct Class {
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) class_name: Arc<str>,
    pub(crate) super_class_name: Option<Arc<str>>,
    pub(crate) interface_names: Vec<Arc<str>>,
    pub(crate) constant_pool: ConstantPool,
    pub(crate) fields: Vec<Arc<Field>>,
    pub(crate) methods: Vec<Arc<Method>>,
    pub(crate) source_file: Option<Arc<str>>,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) interfaces: Vec<Arc<Class>>,
    /// including every superclass's instance slots
    pub(crate) instance_slot_count: usize,
    pub(crate) static_slot_count: usize,
    pub(crate) static_vars: RwLock<Slots>,
    pub(crate) init_state: Mutex<InitState>,
    /// only for arrays
    pub(crate) component_class: Option<Arc<Class>>,
    pub(crate) j_class: OnceCell<Reference>,
}

impl Class {
    /// A class that is never read from bytes: arrays, primitives and the shim class.
    /// It starts out initialized.
    pub(crate) fn new_synthetic(
        class_name: &str,
        access_flags: ClassAccessFlag,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
        component_class: Option<Arc<Class>>,
        methods: impl FnOnce(&Weak<Class>) -> Vec<Arc<Method>>,
    ) -> Arc<Class> {
        Arc::new_cyclic(|this| Class {
            access_flags,
            class_name: Arc::from(class_name),
            super_class_name: super_class.as_ref().map(|c| Arc::clone(&c.class_name)),
            interface_names: interfaces
                .iter()
                .map(|c| Arc::clone(&c.class_name))
                .collect(),
            constant_pool: ConstantPool::default(),
            fields: vec![],
            methods: methods(this),
            source_file: None,
            instance_slot_count: super_class.as_ref().map_or(0, |c| c.instance_slot_count),
            super_class,
            interfaces,
            static_slot_count: 0,
            static_vars: RwLock::new(Slots::new(0)),
            init_state: Mutex::new(InitState::Started),
            component_class,
            j_class: OnceCell::new(),
        })
    }

    pub(crate) fn new_primitive(class_name: &str) -> Arc<Class> {
        Self::new_synthetic(
            class_name,
            ClassAccessFlag::PUBLIC,
            None,
            vec![],
            None,
            |_| vec![],
        )
    }

    pub fn class_name(&self) -> &Arc<str> {
        &self.class_name
    }

    /// `java.lang.Object` for `java/lang/Object`.
    pub fn java_name(&self) -> String {
        self.class_name.replace('/', ".")
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    pub fn component_class(&self) -> Option<&Arc<Class>> {
        self.component_class.as_ref()
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    pub fn is_public(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::PUBLIC)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::ABSTRACT)
    }

    pub fn is_super(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::SUPER)
    }

    pub fn is_array(&self) -> bool {
        self.class_name.starts_with('[')
    }

    pub fn is_primitive(&self) -> bool {
        self.super_class.is_none() && primitive_descriptor(&self.class_name).is_some()
    }

    pub(crate) fn package_name(&self) -> &str {
        let Some((package, _)) = self.class_name.rsplit_once('/') else {
            return "";
        };
        package
    }

    pub(crate) fn is_same_package(&self, other: &Class) -> bool {
        self.package_name() == other.package_name()
    }

    /// Class-level access: public, or declared in the same package.
    pub(crate) fn is_accessible_to(&self, other: &Class) -> bool {
        self.is_public() || self.is_same_package(other)
    }

    pub fn init_started(&self) -> bool {
        *self.init_state.lock() == InitState::Started
    }

    pub(crate) fn start_init(&self) {
        *self.init_state.lock() = InitState::Started;
    }

    pub fn get_field(&self, name: &str, descriptor: &str) -> Option<&Arc<Field>> {
        self.fields
            .iter()
            .find(|field| &*field.name == name && &*field.descriptor == descriptor)
    }

    pub fn get_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
        self.methods
            .iter()
            .find(|method| &*method.name == name && &*method.descriptor == descriptor)
    }

    pub(crate) fn clinit(&self) -> Option<&Arc<Method>> {
        self.get_method("<clinit>", "()V")
            .filter(|method| method.is_static())
    }

    pub(crate) fn main_method(&self) -> Option<&Arc<Method>> {
        self.get_method("main", "([Ljava/lang/String;)V")
            .filter(|method| method.is_static() && method.is_public())
    }
}

/// Header shared by fields and methods.
#[derive(Debug)]
pub struct ClassMember {
    pub(crate) access_flags: u16,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) class: Weak<Class>,
}

impl ClassMember {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<str> {
        &self.descriptor
    }

    pub fn class(&self) -> Arc<Class> {
        self.class.upgrade().expect("class outlives its members")
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub fn is_protected(&self) -> bool {
        self.access_flags & ACC_PROTECTED != 0
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & ACC_FINAL != 0
    }

    pub(crate) fn is_declared_by(&self, class: &Class) -> bool {
        ptr::eq(self.class.as_ptr(), class)
    }

    pub(crate) fn is_accessible_to(&self, referrer: &Class) -> bool {
        if self.is_public() {
            return true;
        }
        let owner = self.class();
        if self.is_private() {
            return ptr::eq(owner.as_ref(), referrer);
        }
        if self.is_protected() {
            return ptr::eq(owner.as_ref(), referrer)
                || referrer.is_subclass_of(&owner)
                || owner.is_same_package(referrer);
        }
        owner.is_same_package(referrer)
    }
}

#[derive(Debug)]
pub struct Field {
    pub(crate) member: ClassMember,
    pub(crate) const_value_index: Option<u16>,
    /// instance slot id, or static slot id for static fields
    pub(crate) slot_id: usize,
    pub(crate) field_type: FieldType,
}

impl Deref for Field {
    type Target = ClassMember;

    fn deref(&self) -> &ClassMember {
        &self.member
    }
}

impl Field {
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_long(&self) -> bool {
        self.field_type.is_long()
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub(crate) start_pc: usize,
    pub(crate) end_pc: usize,
    pub(crate) handler_pc: usize,
    /// `None` catches everything
    pub(crate) catch_type: Option<u16>,
}

#[derive(Debug)]
pub struct Method {
    pub(crate) member: ClassMember,
    pub(crate) max_stack: usize,
    pub(crate) max_locals: usize,
    pub(crate) code: Arc<[u8]>,
    pub(crate) exception_table: Vec<ExceptionHandler>,
    pub(crate) line_numbers: Vec<LineNumberTableItem>,
    pub(crate) exceptions: Vec<Arc<str>>,
    pub(crate) parsed_descriptor: MethodDescriptor,
    pub(crate) arg_slot_count: usize,
}

impl Deref for Method {
    type Target = ClassMember;

    fn deref(&self) -> &ClassMember {
        &self.member
    }
}

impl Method {
    pub(crate) const NATIVE_MAX_STACK: usize = 4;

    /// `invokenative` followed by the return instruction for `return_type`.
    pub(crate) fn native_code(descriptor: &MethodDescriptor) -> Arc<[u8]> {
        use crate::runtime::interpreter::instructions as inst;
        let ret = match &descriptor.return_type {
            None => inst::RETURN,
            Some(FieldType::Object(_) | FieldType::Array(_)) => inst::ARETURN,
            Some(FieldType::Double) => inst::DRETURN,
            Some(FieldType::Float) => inst::FRETURN,
            Some(FieldType::Long) => inst::LRETURN,
            Some(_) => inst::IRETURN,
        };
        Arc::from([inst::INVOKENATIVE, ret])
    }

    pub(crate) fn arg_slot_count(descriptor: &MethodDescriptor, access_flags: u16) -> usize {
        let receiver = if access_flags & ACC_STATIC == 0 { 1 } else { 0 };
        descriptor.parameter_slot_count() + receiver
    }

    pub fn code(&self) -> &Arc<[u8]> {
        &self.code
    }

    pub fn parsed_descriptor(&self) -> &MethodDescriptor {
        &self.parsed_descriptor
    }

    pub fn declared_exceptions(&self) -> &[Arc<str>] {
        &self.exceptions
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// -2 for native methods, -1 when the line is unknown.
    pub fn line_number(&self, pc: usize) -> i32 {
        if self.is_native() {
            return -2;
        }
        self.line_numbers
            .iter()
            .filter(|item| item.start_pc as usize <= pc)
            .max_by_key(|item| item.start_pc)
            .map_or(-1, |item| item.line_number as i32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTraceElement {
    pub file_name: Option<Arc<str>>,
    /// dotted
    pub class_name: String,
    pub method_name: Arc<str>,
    pub line_number: i32,
}

impl fmt::Display for StackTraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)?;
        match (&self.file_name, self.line_number) {
            (_, -2) => write!(f, "(Native Method)"),
            (Some(file), line) if line >= 0 => write!(f, "({file}:{line})"),
            (Some(file), _) => write!(f, "({file})"),
            (None, _) => write!(f, "(Unknown Source)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtException {
    pub thread_name: String,
    /// dotted
    pub class_name: String,
    pub message: Option<String>,
    pub stack_trace: Vec<StackTraceElement>,
}

impl fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Exception in thread \"{}\" {}",
            self.thread_name, self.class_name
        )?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        for element in &self.stack_trace {
            write!(f, "\n\tat {element}")?;
        }
        Ok(())
    }
}

/// Conditions that end the run; handlers never see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    StackOverflow { depth: usize },
    UncaughtException(UncaughtException),
    Unsupported(String),
    MainMethodNotFound(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackOverflow { depth } => {
                write!(f, "java.lang.StackOverflowError: more than {depth} frames")
            }
            VmError::UncaughtException(exception) => fmt::Display::fmt(exception, f),
            VmError::Unsupported(what) => write!(f, "unsupported: {what}"),
            VmError::MainMethodNotFound(class_name) => write!(
                f,
                "Error: Main method not found in class {class_name}, please define the main method as:\n   public static void main(String[] args)"
            ),
        }
    }
}

impl std::error::Error for VmError {}

#[derive(Debug)]
pub enum Exception {
    VmException {
        class_name: &'static str,
        message: String,
    },
    UserException(Reference),
    Fatal(VmError),
}

impl Exception {
    pub(crate) fn new_vm(class_name: &'static str) -> Self {
        Exception::VmException {
            class_name,
            message: Default::default(),
        }
    }

    pub(crate) fn new_vm_msg(class_name: &'static str, message: impl Into<String>) -> Self {
        Exception::VmException {
            class_name,
            message: message.into(),
        }
    }

    pub(crate) fn new(exception: Reference) -> Self {
        Exception::UserException(exception)
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Exception::Fatal(VmError::Unsupported(what.into()))
    }
}

impl From<ClassFormatError> for Exception {
    fn from(err: ClassFormatError) -> Self {
        Exception::new_vm_msg(CLASS_FORMAT_ERROR, err.0)
    }
}

impl From<VmError> for Exception {
    fn from(err: VmError) -> Self {
        Exception::Fatal(err)
    }
}

pub type NativeResult<T> = ::std::result::Result<T, Exception>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_trace_element_display() {
        let element = StackTraceElement {
            file_name: Some(Arc::from("Main.java")),
            class_name: "pkg.Main".to_string(),
            method_name: Arc::from("main"),
            line_number: 7,
        };
        assert_eq!(element.to_string(), "pkg.Main.main(Main.java:7)");

        let native = StackTraceElement {
            line_number: -2,
            ..element.clone()
        };
        assert_eq!(native.to_string(), "pkg.Main.main(Native Method)");
    }

    #[test]
    fn test_uncaught_exception_display() {
        let uncaught = UncaughtException {
            thread_name: "main".to_string(),
            class_name: "java.lang.ArithmeticException".to_string(),
            message: Some("/ by zero".to_string()),
            stack_trace: vec![StackTraceElement {
                file_name: Some(Arc::from("Main.java")),
                class_name: "Main".to_string(),
                method_name: Arc::from("main"),
                line_number: 3,
            }],
        };
        assert_eq!(
            uncaught.to_string(),
            "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n\tat Main.main(Main.java:3)"
        );
    }

    #[test]
    fn test_package_name() {
        let class = Class::new_primitive("int");
        assert_eq!(class.package_name(), "");
        assert!(class.is_primitive());
        assert!(!class.is_array());
    }
}
