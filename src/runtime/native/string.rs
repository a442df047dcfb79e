use crate::runtime::{NativeEnv, NativeResult, Vm, famous_classes::STRING};

// public native String intern();
fn native_string_intern(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let this = env.this()?;
    let interned = env.vm.intern_string_object(this)?;
    env.stack().push_reference(Some(interned));
    Ok(())
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(STRING, "intern", "()Ljava/lang/String;", native_string_intern);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Slot, test_support::test_vm};

    #[test]
    fn test_intern_returns_literal() {
        let vm = test_vm(vec![]);
        let literal = vm.intern_string("same").unwrap();
        let fresh = vm.new_string("same").unwrap();
        assert_ne!(literal, fresh);

        let class = vm.load_class(STRING).unwrap();
        let intern = class.get_method("intern", "()Ljava/lang/String;").unwrap();
        let mut thread = vm.new_thread();
        let result = vm
            .invoke(&mut thread, intern, &[Slot::from_reference(Some(fresh))])
            .unwrap();
        assert_eq!(result[0].reference(), Some(literal));
    }
}
