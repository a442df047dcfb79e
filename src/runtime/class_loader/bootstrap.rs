use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::{
    class::{ClassFile, ClassParser},
    classpath::ClassPathEntry,
    consts::ClassAccessFlag,
    descriptor::{component_class_name, primitive_descriptor},
    runtime::{
        Class, ConstantPool, Exception, InitState, NativeResult, Slots, Vm,
        class_loader::{convert_method, layout_fields, seed_static_finals},
        famous_classes::{
            CLASS_CIRCULARITY_ERROR, CLASS_NOT_FOUND_EXCEPTION, CLONEABLE,
            INCOMPATIBLE_CLASS_CHANGE_ERROR, NO_CLASS_DEF_FOUND_ERROR, OBJECT, SERIALIZABLE,
        },
    },
};

/// The single class loader of a [`Vm`]: reads bytes from the class path, parses, links and
/// caches classes by name.
pub(crate) struct BootstrapClassLoader {
    class_path: Box<dyn ClassPathEntry>,
    parser: Box<dyn ClassParser>,
    class_registry: DashMap<Arc<str>, Arc<Class>>,
    /// names currently being defined
    loading: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for BootstrapClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapClassLoader")
            .field("class_path", &self.class_path)
            .field("loaded", &self.class_registry.len())
            .finish()
    }
}

impl BootstrapClassLoader {
    pub(crate) fn new(class_path: Box<dyn ClassPathEntry>, parser: Box<dyn ClassParser>) -> Self {
        Self {
            class_path,
            parser,
            class_registry: DashMap::new(),
            loading: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn loaded_class(&self, class_name: &str) -> Option<Arc<Class>> {
        self.class_registry
            .get(class_name)
            .map(|class| Arc::clone(class.value()))
    }

    pub(crate) fn load_class(&self, vm: &Vm, class_name: &str) -> NativeResult<Arc<Class>> {
        if let Some(class) = self.loaded_class(class_name) {
            return Ok(class);
        }
        if class_name.starts_with('[') {
            let class = self.define_array(vm, class_name)?;
            return Ok(self.register(class));
        }
        if primitive_descriptor(class_name).is_some() {
            return Ok(self.register(Class::new_primitive(class_name)));
        }

        if !self.loading.lock().insert(class_name.to_string()) {
            return Err(Exception::new_vm_msg(
                CLASS_CIRCULARITY_ERROR,
                class_name.replace('/', "."),
            ));
        }
        let class = self.define_class(vm, class_name);
        self.loading.lock().remove(class_name);
        class
    }

    fn register(&self, class: Arc<Class>) -> Arc<Class> {
        let class_name = Arc::clone(&class.class_name);
        Arc::clone(self.class_registry.entry(class_name).or_insert(class).value())
    }

    fn define_array(&self, vm: &Vm, class_name: &str) -> NativeResult<Arc<Class>> {
        let component_name = component_class_name(class_name).ok_or_else(|| {
            Exception::new_vm_msg(CLASS_NOT_FOUND_EXCEPTION, class_name.replace('/', "."))
        })?;
        let component = self.load_class(vm, &component_name)?;
        let super_class = self.load_class(vm, OBJECT)?;
        let interfaces = vec![
            self.load_class(vm, CLONEABLE)?,
            self.load_class(vm, SERIALIZABLE)?,
        ];
        let mut access_flags = ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT;
        if component.is_public() {
            access_flags |= ClassAccessFlag::PUBLIC;
        }
        Ok(Class::new_synthetic(
            class_name,
            access_flags,
            Some(super_class),
            interfaces,
            Some(component),
            |_| vec![],
        ))
    }

    fn define_class(&self, vm: &Vm, class_name: &str) -> NativeResult<Arc<Class>> {
        let (bytes, source) = self.class_path.read_class(class_name).ok_or_else(|| {
            Exception::new_vm_msg(CLASS_NOT_FOUND_EXCEPTION, class_name.replace('/', "."))
        })?;
        let class_file = self.parser.parse(&bytes)?;
        if class_file.class_name()?.as_ref() != class_name {
            return Err(Exception::new_vm_msg(
                NO_CLASS_DEF_FOUND_ERROR,
                format!(
                    "{class_name} (wrong name: {})",
                    class_file.class_name()?
                ),
            ));
        }

        let class = self.link_class(vm, &class_file)?;
        let class = self.register(class);
        // registered first so seeding can see the class; a failure must not leave it cached
        if let Err(err) = seed_static_finals(vm, &class) {
            self.class_registry.remove(class_name);
            return Err(err);
        }

        if vm.options().verbose_class {
            log::info!("[Loaded {} from {source}]", class.java_name());
        } else {
            log::debug!("[Loaded {} from {source}]", class.java_name());
        }
        Ok(class)
    }

    fn link_class(&self, vm: &Vm, class_file: &ClassFile) -> NativeResult<Arc<Class>> {
        let cp = &class_file.constant_pool;
        let class_name = Arc::clone(class_file.class_name()?);
        let constant_pool = ConstantPool::from_class_file(cp)?;

        let super_class_name = class_file.super_class_name()?.cloned();
        let super_class = match &super_class_name {
            Some(super_class_name) => {
                let super_class = self.load_class(vm, super_class_name)?;
                if super_class.is_interface() {
                    return Err(Exception::new_vm_msg(
                        INCOMPATIBLE_CLASS_CHANGE_ERROR,
                        format!("class {class_name} has interface {super_class_name} as super class"),
                    ));
                }
                Some(super_class)
            }
            None => None,
        };

        let interface_names = class_file.interface_names()?;
        let mut interfaces = Vec::with_capacity(interface_names.len());
        for interface_name in &interface_names {
            let interface = self.load_class(vm, interface_name)?;
            if !interface.is_interface() {
                return Err(Exception::new_vm_msg(
                    INCOMPATIBLE_CLASS_CHANGE_ERROR,
                    format!("class {class_name} can not implement {interface_name}, because it is not an interface"),
                ));
            }
            interfaces.push(interface);
        }

        let super_slot_count = super_class.as_ref().map_or(0, |c| c.instance_slot_count);
        let (fields, instance_slot_count, static_slot_count) =
            layout_fields(class_file, super_slot_count)?;
        let methods = class_file
            .methods
            .iter()
            .map(|method| convert_method(cp, method))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new_cyclic(|this| Class {
            access_flags: class_file.access_flags,
            class_name,
            super_class_name,
            interface_names,
            constant_pool,
            fields: fields
                .into_iter()
                .map(|mut field| {
                    field.member.class = this.clone();
                    Arc::new(field)
                })
                .collect(),
            methods: methods
                .into_iter()
                .map(|mut method| {
                    method.member.class = this.clone();
                    Arc::new(method)
                })
                .collect(),
            source_file: class_file.source_file(),
            super_class,
            interfaces,
            instance_slot_count,
            static_slot_count,
            static_vars: RwLock::new(Slots::new(static_slot_count)),
            init_state: Mutex::new(InitState::NotStarted),
            component_class: None,
            j_class: Default::default(),
        }))
    }
}
