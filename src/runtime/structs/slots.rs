use paste::paste;

use crate::runtime::Reference;

/// One 32-bit storage cell. Null is 0.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Slot(u32);

impl Slot {
    pub fn from_int(value: i32) -> Self {
        Slot(value as u32)
    }

    pub fn int(self) -> i32 {
        self.0 as i32
    }

    pub fn from_float(value: f32) -> Self {
        Slot(value.to_bits())
    }

    pub fn float(self) -> f32 {
        f32::from_bits(self.0)
    }

    pub fn from_reference(value: Option<Reference>) -> Self {
        Slot(value.map_or(0, Reference::to_bits))
    }

    pub fn reference(self) -> Option<Reference> {
        Reference::from_bits(self.0)
    }

    /// (low, high)
    pub fn from_long(value: i64) -> (Self, Self) {
        (Slot(value as u32), Slot((value >> 32) as u32))
    }

    pub fn long(low: Self, high: Self) -> i64 {
        (((high.0 as u64) << 32) | low.0 as u64) as i64
    }

    pub fn from_double(value: f64) -> (Self, Self) {
        Self::from_long(value.to_bits() as i64)
    }

    pub fn double(low: Self, high: Self) -> f64 {
        f64::from_bits(Self::long(low, high) as u64)
    }
}

/// Fixed-size slot array: local variables, instance fields and static fields.
/// A long/double keeps its low word at `index` and its high word at `index + 1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Slots(Vec<Slot>);

macro_rules! single_slot_accessors {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            impl Slots {
                $(
                    pub fn [<get_ $name>](&self, index: usize) -> $ty {
                        self.0[index].$name()
                    }

                    pub fn [<set_ $name>](&mut self, index: usize, value: $ty) {
                        self.0[index] = Slot::[<from_ $name>](value);
                    }
                )*
            }
        }
    };
}

macro_rules! double_slot_accessors {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            impl Slots {
                $(
                    pub fn [<get_ $name>](&self, index: usize) -> $ty {
                        Slot::$name(self.0[index], self.0[index + 1])
                    }

                    pub fn [<set_ $name>](&mut self, index: usize, value: $ty) {
                        let (low, high) = Slot::[<from_ $name>](value);
                        self.0[index] = low;
                        self.0[index + 1] = high;
                    }
                )*
            }
        }
    };
}

single_slot_accessors!(int: i32, float: f32, reference: Option<Reference>);
double_slot_accessors!(long: i64, double: f64);

impl Slots {
    pub fn new(size: usize) -> Self {
        Slots(vec![Slot::default(); size])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_slot(&self, index: usize) -> Slot {
        self.0[index]
    }

    pub fn set_slot(&mut self, index: usize, slot: Slot) {
        self.0[index] = slot;
    }

    pub fn get_this(&self) -> Option<Reference> {
        self.get_reference(0)
    }

    pub fn get_boolean(&self, index: usize) -> bool {
        self.get_int(index) != 0
    }
}
