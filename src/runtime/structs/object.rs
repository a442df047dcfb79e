use std::sync::Arc;

use parking_lot::RwLock;

use crate::runtime::{
    Class, Exception, Field, NativeResult, Reference, Slots, StackTraceElement,
    famous_classes::NO_SUCH_FIELD_ERROR,
};

#[derive(Debug)]
pub struct Object {
    class: Arc<Class>,
    data: RwLock<ObjectData>,
    extra: RwLock<Option<Extra>>,
}

#[derive(Debug, Clone)]
pub enum ObjectData {
    Fields(Slots),
    Array(ArrayData),
}

/// Array storage; booleans share the byte representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bytes(Vec<i8>),
    Chars(Vec<u16>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Longs(Vec<i64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    References(Vec<Option<Reference>>),
}

/// Host-side payload some objects carry next to their fields.
#[derive(Debug, Clone)]
pub enum Extra {
    /// `java/lang/Class` mirror
    Class(Arc<Class>),
    StackTrace(Arc<[StackTraceElement]>),
    /// `java/lang/reflect/Field` mirror
    Field(Arc<Field>),
}

macro_rules! for_each_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            ArrayData::Bytes($array) => $body,
            ArrayData::Chars($array) => $body,
            ArrayData::Shorts($array) => $body,
            ArrayData::Ints($array) => $body,
            ArrayData::Longs($array) => $body,
            ArrayData::Floats($array) => $body,
            ArrayData::Doubles($array) => $body,
            ArrayData::References($array) => $body,
        }
    };
}

impl ArrayData {
    /// Zeroed storage for an array class such as `[I` or `[Ljava/lang/String;`.
    pub fn new(array_class_name: &str, length: usize) -> ArrayData {
        match array_class_name.as_bytes().get(1) {
            Some(b'Z' | b'B') => ArrayData::Bytes(vec![0; length]),
            Some(b'C') => ArrayData::Chars(vec![0; length]),
            Some(b'S') => ArrayData::Shorts(vec![0; length]),
            Some(b'I') => ArrayData::Ints(vec![0; length]),
            Some(b'J') => ArrayData::Longs(vec![0; length]),
            Some(b'F') => ArrayData::Floats(vec![0.0; length]),
            Some(b'D') => ArrayData::Doubles(vec![0.0; length]),
            _ => ArrayData::References(vec![None; length]),
        }
    }

    pub fn len(&self) -> usize {
        for_each_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlap-safe copy inside one array.
    pub(crate) fn copy_within(&mut self, src_pos: usize, dest_pos: usize, length: usize) {
        for_each_array!(self, array => array.copy_within(src_pos..src_pos + length, dest_pos))
    }

    /// Returns `false` when the element types differ.
    pub(crate) fn copy_to(
        &self,
        src_pos: usize,
        dest: &mut ArrayData,
        dest_pos: usize,
        length: usize,
    ) -> bool {
        macro_rules! copy {
            ($($variant:ident),*) => {
                match (self, dest) {
                    $(
                        (ArrayData::$variant(src), ArrayData::$variant(dest)) => {
                            dest[dest_pos..dest_pos + length]
                                .copy_from_slice(&src[src_pos..src_pos + length]);
                            true
                        }
                    )*
                    _ => false,
                }
            };
        }
        copy!(Bytes, Chars, Shorts, Ints, Longs, Floats, Doubles, References)
    }

    pub(crate) fn is_same_kind(&self, other: &ArrayData) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Element types an [`ArrayData`] variant holds.
pub trait ArrayType: Copy {
    fn slice(data: &ArrayData) -> Option<&[Self]>;
    fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]>;
}

macro_rules! array_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ArrayType for $ty {
                fn slice(data: &ArrayData) -> Option<&[Self]> {
                    match data {
                        ArrayData::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]> {
                    match data {
                        ArrayData::$variant(array) => Some(array),
                        _ => None,
                    }
                }
            }
        )*
    };
}

array_type!(
    i8 => Bytes,
    u16 => Chars,
    i16 => Shorts,
    i32 => Ints,
    i64 => Longs,
    f32 => Floats,
    f64 => Doubles,
    Option<Reference> => References,
);

impl Object {
    pub fn new_instance(class: Arc<Class>) -> Object {
        let fields = Slots::new(class.instance_slot_count);
        Object {
            class,
            data: RwLock::new(ObjectData::Fields(fields)),
            extra: RwLock::new(None),
        }
    }

    pub fn new_array(class: Arc<Class>, data: ArrayData) -> Object {
        Object {
            class,
            data: RwLock::new(ObjectData::Array(data)),
            extra: RwLock::new(None),
        }
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.data.read(), ObjectData::Array(_))
    }

    /// Shallow copy without the extra payload.
    pub(crate) fn shallow_clone(&self) -> Object {
        Object {
            class: Arc::clone(&self.class),
            data: RwLock::new(self.data.read().clone()),
            extra: RwLock::new(None),
        }
    }

    pub fn with_fields<R>(&self, f: impl FnOnce(&Slots) -> R) -> R {
        match &*self.data.read() {
            ObjectData::Fields(fields) => f(fields),
            ObjectData::Array(_) => panic!("{} is an array", self.class.class_name),
        }
    }

    pub fn with_fields_mut<R>(&self, f: impl FnOnce(&mut Slots) -> R) -> R {
        match &mut *self.data.write() {
            ObjectData::Fields(fields) => f(fields),
            ObjectData::Array(_) => panic!("{} is an array", self.class.class_name),
        }
    }

    pub fn with_array<R>(&self, f: impl FnOnce(&ArrayData) -> R) -> R {
        match &*self.data.read() {
            ObjectData::Array(array) => f(array),
            ObjectData::Fields(_) => panic!("{} is not an array", self.class.class_name),
        }
    }

    pub fn with_array_mut<R>(&self, f: impl FnOnce(&mut ArrayData) -> R) -> R {
        match &mut *self.data.write() {
            ObjectData::Array(array) => f(array),
            ObjectData::Fields(_) => panic!("{} is not an array", self.class.class_name),
        }
    }

    pub fn array_length(&self) -> usize {
        self.with_array(ArrayData::len)
    }

    /// `None` when `index` is out of bounds or the element type differs.
    pub fn array_get<T: ArrayType>(&self, index: i32) -> Option<T> {
        let index = usize::try_from(index).ok()?;
        self.with_array(|data| T::slice(data)?.get(index).copied())
    }

    /// `false` when `index` is out of bounds or the element type differs.
    pub fn array_set<T: ArrayType>(&self, index: i32, value: T) -> bool {
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        self.with_array_mut(|data| {
            match T::slice_mut(data).and_then(|array| array.get_mut(index)) {
                Some(element) => {
                    *element = value;
                    true
                }
                None => false,
            }
        })
    }

    pub fn extra(&self) -> Option<Extra> {
        self.extra.read().clone()
    }

    pub fn set_extra(&self, extra: Extra) {
        *self.extra.write() = Some(extra);
    }

    pub(crate) fn has_stack_trace(&self) -> bool {
        matches!(*self.extra.read(), Some(Extra::StackTrace(_)))
    }

    pub(crate) fn stack_trace(&self) -> Option<Arc<[StackTraceElement]>> {
        match &*self.extra.read() {
            Some(Extra::StackTrace(trace)) => Some(Arc::clone(trace)),
            _ => None,
        }
    }

    fn instance_field(&self, name: &str, descriptor: &str) -> NativeResult<Arc<Field>> {
        self.class
            .lookup_field(name, descriptor)
            .filter(|field| !field.is_static())
            .ok_or_else(|| {
                Exception::new_vm_msg(
                    NO_SUCH_FIELD_ERROR,
                    format!("{}.{name}", self.class.java_name()),
                )
            })
    }

    pub fn get_ref_var(&self, name: &str, descriptor: &str) -> NativeResult<Option<Reference>> {
        let field = self.instance_field(name, descriptor)?;
        Ok(self.with_fields(|fields| fields.get_reference(field.slot_id)))
    }

    pub fn set_ref_var(
        &self,
        name: &str,
        descriptor: &str,
        value: Option<Reference>,
    ) -> NativeResult<()> {
        let field = self.instance_field(name, descriptor)?;
        self.with_fields_mut(|fields| fields.set_reference(field.slot_id, value));
        Ok(())
    }
}
