use std::{ptr, sync::Arc};

use crate::runtime::{
    Class, Field, Method,
    famous_classes::{CLONEABLE, OBJECT, SERIALIZABLE},
};

impl Class {
    /// Whether a value of class `source` can be stored where `self` is expected.
    pub fn is_assignable_from(&self, source: &Class) -> bool {
        if ptr::eq(self, source) {
            return true;
        }
        if let Some(source_component) = &source.component_class {
            // source is array
            return match &self.component_class {
                Some(target_component) => {
                    if source_component.is_primitive() || target_component.is_primitive() {
                        Arc::ptr_eq(source_component, target_component)
                    } else {
                        target_component.is_assignable_from(source_component)
                    }
                }
                None if self.is_interface() => {
                    self.class_name.as_ref() == CLONEABLE
                        || self.class_name.as_ref() == SERIALIZABLE
                }
                None => self.class_name.as_ref() == OBJECT,
            };
        }
        if source.is_interface() {
            return if self.is_interface() {
                source.is_sub_interface_of(self)
            } else {
                self.class_name.as_ref() == OBJECT
            };
        }
        if self.is_interface() {
            source.is_implements(self)
        } else {
            source.is_subclass_of(self)
        }
    }

    /// Strict superclass chain check.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut class = self.super_class.as_ref();
        while let Some(current) = class {
            if ptr::eq(current.as_ref(), other) {
                return true;
            }
            class = current.super_class.as_ref();
        }
        false
    }

    /// `self` or one of its superclasses implements `interface`, directly or through a
    /// superinterface.
    pub fn is_implements(&self, interface: &Class) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if current
                .interfaces
                .iter()
                .any(|i| ptr::eq(i.as_ref(), interface) || i.is_sub_interface_of(interface))
            {
                return true;
            }
            class = current.super_class.as_deref();
        }
        false
    }

    pub fn is_sub_interface_of(&self, interface: &Class) -> bool {
        self.interfaces
            .iter()
            .any(|i| ptr::eq(i.as_ref(), interface) || i.is_sub_interface_of(interface))
    }

    /// Own fields, then interfaces depth-first, then the superclass chain.
    pub fn lookup_field(&self, name: &str, descriptor: &str) -> Option<Arc<Field>> {
        if let Some(field) = self.get_field(name, descriptor) {
            return Some(Arc::clone(field));
        }
        for interface in &self.interfaces {
            if let Some(field) = interface.lookup_field(name, descriptor) {
                return Some(field);
            }
        }
        self.super_class.as_ref()?.lookup_field(name, descriptor)
    }

    /// Same order as [`Class::lookup_field`].
    pub fn lookup_method(&self, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        if let Some(method) = self.get_method(name, descriptor) {
            return Some(Arc::clone(method));
        }
        for interface in &self.interfaces {
            if let Some(method) = interface.lookup_interface_method(name, descriptor) {
                return Some(method);
            }
        }
        self.super_class.as_ref()?.lookup_method(name, descriptor)
    }

    /// Own methods, then superinterfaces depth-first.
    pub fn lookup_interface_method(&self, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        if let Some(method) = self.get_method(name, descriptor) {
            return Some(Arc::clone(method));
        }
        self.interfaces
            .iter()
            .find_map(|interface| interface.lookup_interface_method(name, descriptor))
    }

    /// Virtual dispatch target: the class chain first, then default methods from the
    /// interfaces of every class in the chain.
    pub(crate) fn lookup_virtual_method(
        &self,
        name: &str,
        descriptor: &str,
    ) -> Option<Arc<Method>> {
        self.lookup_method_in_class(name, descriptor)
            .or_else(|| self.lookup_default_method(name, descriptor))
    }

    pub(crate) fn lookup_method_in_class(
        &self,
        name: &str,
        descriptor: &str,
    ) -> Option<Arc<Method>> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(method) = current.get_method(name, descriptor) {
                return Some(Arc::clone(method));
            }
            class = current.super_class.as_deref();
        }
        None
    }

    fn lookup_default_method(&self, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        let mut class = Some(self);
        while let Some(current) = class {
            let found = current
                .interfaces
                .iter()
                .filter_map(|interface| interface.lookup_interface_method(name, descriptor))
                .find(|method| !method.is_abstract() && !method.is_static());
            if found.is_some() {
                return found;
            }
            class = current.super_class.as_deref();
        }
        None
    }

    /// Number of superclass links between `self` and the root.
    pub(crate) fn depth(&self) -> usize {
        let mut depth = 0;
        let mut class = self.super_class.as_deref();
        while let Some(current) = class {
            depth += 1;
            class = current.super_class.as_deref();
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consts::{ACC_PUBLIC, ClassAccessFlag},
        runtime::{
            Vm, VmOptions,
            interpreter::instructions as inst,
            test_support::{ClassFileBuilder, TestClassPath, bootstrap_classes, test_vm},
        },
    };

    fn vm() -> Vm {
        let mut runnable = ClassFileBuilder::new("pkg/Runnable", Some(OBJECT));
        runnable.set_access_flags(
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT,
        );
        let mut task = ClassFileBuilder::new("pkg/Task", Some(OBJECT));
        task.add_interface("pkg/Runnable");
        let sub_task = ClassFileBuilder::new("pkg/SubTask", Some("pkg/Task"));
        let mut sub_runnable = ClassFileBuilder::new("pkg/SubRunnable", Some(OBJECT));
        sub_runnable.set_access_flags(
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT,
        );
        sub_runnable.add_interface("pkg/Runnable");

        let class_path = TestClassPath::new(bootstrap_classes().into_iter().chain([
            runnable.build(),
            task.build(),
            sub_task.build(),
            sub_runnable.build(),
        ]));
        Vm::with_parser(
            VmOptions::default(),
            Box::new(class_path.clone()),
            Box::new(class_path),
        )
    }

    #[test]
    fn test_class_assignability() {
        let vm = vm();
        let object = vm.load_class(OBJECT).unwrap();
        let runnable = vm.load_class("pkg/Runnable").unwrap();
        let task = vm.load_class("pkg/Task").unwrap();
        let sub_task = vm.load_class("pkg/SubTask").unwrap();
        let sub_runnable = vm.load_class("pkg/SubRunnable").unwrap();

        assert!(task.is_assignable_from(&sub_task));
        assert!(!sub_task.is_assignable_from(&task));
        assert!(object.is_assignable_from(&sub_task));
        assert!(runnable.is_assignable_from(&sub_task));
        assert!(runnable.is_assignable_from(&sub_runnable));
        assert!(!sub_runnable.is_assignable_from(&runnable));
        assert!(object.is_assignable_from(&runnable));
        assert!(!task.is_assignable_from(&runnable));
    }

    #[test]
    fn test_array_assignability() {
        let vm = vm();
        let object = vm.load_class(OBJECT).unwrap();
        let cloneable = vm.load_class(CLONEABLE).unwrap();
        let serializable = vm.load_class(SERIALIZABLE).unwrap();
        let runnable = vm.load_class("pkg/Runnable").unwrap();
        let task_array = vm.load_class("[Lpkg/Task;").unwrap();
        let sub_task_array = vm.load_class("[Lpkg/SubTask;").unwrap();
        let runnable_array = vm.load_class("[Lpkg/Runnable;").unwrap();
        let int_array = vm.load_class("[I").unwrap();
        let long_array = vm.load_class("[J").unwrap();
        let object_array = vm.load_class("[Ljava/lang/Object;").unwrap();

        assert!(cloneable.is_assignable_from(&task_array));
        assert!(serializable.is_assignable_from(&int_array));
        assert!(!runnable.is_assignable_from(&task_array));
        assert!(object.is_assignable_from(&int_array));

        assert!(task_array.is_assignable_from(&sub_task_array));
        assert!(!sub_task_array.is_assignable_from(&task_array));
        assert!(runnable_array.is_assignable_from(&sub_task_array));
        assert!(object_array.is_assignable_from(&runnable_array));
        assert!(!object_array.is_assignable_from(&int_array));
        assert!(!int_array.is_assignable_from(&long_array));
        assert!(int_array.is_assignable_from(&vm.load_class("[I").unwrap()));
    }

    #[test]
    fn test_depth() {
        let vm = vm();
        assert_eq!(vm.load_class(OBJECT).unwrap().depth(), 0);
        assert_eq!(vm.load_class("pkg/SubTask").unwrap().depth(), 2);
    }

    fn returning(class_name: &str, super_class: &str, value: u8) -> ClassFileBuilder {
        let mut builder = ClassFileBuilder::new(class_name, Some(super_class));
        builder.add_method(
            ACC_PUBLIC,
            "f",
            "()I",
            1,
            1,
            &[inst::BIPUSH, value, inst::IRETURN],
        );
        builder
    }

    #[test]
    fn test_method_lookup_prefers_interfaces_over_superclass() {
        let mut greeter = returning("order/Greeter", OBJECT, 1);
        greeter.set_access_flags(
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT,
        );
        let base = returning("order/Base", OBJECT, 2);
        let mut inherits = ClassFileBuilder::new("order/Inherits", Some("order/Base"));
        inherits.add_interface("order/Greeter");
        let mut overrides = returning("order/Overrides", "order/Base", 3);
        overrides.add_interface("order/Greeter");
        let vm = test_vm(vec![
            greeter.build(),
            base.build(),
            inherits.build(),
            overrides.build(),
        ]);

        let declarer = |class_name: &str, method: Option<Arc<Method>>| {
            assert_eq!(
                method.unwrap().class().class_name().to_string(),
                class_name,
            );
        };
        let inherits = vm.load_class("order/Inherits").unwrap();
        declarer("order/Greeter", inherits.lookup_method("f", "()I"));
        declarer("order/Base", inherits.lookup_virtual_method("f", "()I"));

        let overrides = vm.load_class("order/Overrides").unwrap();
        declarer("order/Overrides", overrides.lookup_method("f", "()I"));
        declarer("order/Overrides", overrides.lookup_virtual_method("f", "()I"));
        assert!(overrides.lookup_method("g", "()I").is_none());
    }
}
