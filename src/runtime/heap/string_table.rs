use std::collections::HashMap;

use parking_lot::Mutex;

use crate::runtime::{
    ArrayData, NativeResult, Object, Reference, Vm,
    famous_classes::STRING,
};

/// One canonical `java/lang/String` per content.
#[derive(Debug, Default)]
pub struct StringTable {
    map: Mutex<HashMap<String, Reference>>,
}

impl StringTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn intern(&self, vm: &Vm, value: &str) -> NativeResult<Reference> {
        if let Some(string) = self.map.lock().get(value) {
            return Ok(*string);
        }
        // allocation may load classes, so the lock is not held across it
        let string = new_string(vm, value)?;
        Ok(*self.map.lock().entry(value.to_string()).or_insert(string))
    }

    /// `String.intern()`: the first object seen for a content becomes canonical.
    pub(crate) fn intern_object(&self, vm: &Vm, string: Reference) -> NativeResult<Reference> {
        let value = rust_string(vm, string)?;
        Ok(*self.map.lock().entry(value).or_insert(string))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

/// A fresh, non-interned string object backed by a `[C` array.
pub(crate) fn new_string(vm: &Vm, value: &str) -> NativeResult<Reference> {
    let string_class = vm.load_class(STRING)?;
    let chars_class = vm.load_class("[C")?;
    let chars = ArrayData::Chars(value.encode_utf16().collect());
    let chars = vm.heap().allocate(Object::new_array(chars_class, chars));
    let string = Object::new_instance(string_class);
    string.set_ref_var("value", "[C", Some(chars))?;
    Ok(vm.heap().allocate(string))
}

pub(crate) fn rust_string(vm: &Vm, string: Reference) -> NativeResult<String> {
    let Some(chars) = vm.heap().get(string).get_ref_var("value", "[C")? else {
        return Ok(String::new());
    };
    Ok(vm.heap().get(chars).with_array(|data| match data {
        ArrayData::Chars(chars) => String::from_utf16_lossy(chars),
        _ => String::new(),
    }))
}
