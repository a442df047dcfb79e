use std::sync::Arc;

use crate::runtime::{Class, Extra, NativeResult, Object, Reference, Vm, famous_classes::CLASS};

/// The `java/lang/Class` object mirroring `class`, created on first request.
pub(crate) fn class_object(vm: &Vm, class: &Arc<Class>) -> NativeResult<Reference> {
    class
        .j_class
        .get_or_try_init(|| {
            let mirror = Object::new_instance(vm.load_class(CLASS)?);
            mirror.set_extra(Extra::Class(Arc::clone(class)));
            Ok(vm.heap().allocate(mirror))
        })
        .copied()
}

/// Inverse of [`class_object`]. `None` when `mirror` is not a class object.
pub(crate) fn mirrored_class(vm: &Vm, mirror: Reference) -> Option<Arc<Class>> {
    match vm.heap().get(mirror).extra()? {
        Extra::Class(class) => Some(class),
        _ => None,
    }
}
