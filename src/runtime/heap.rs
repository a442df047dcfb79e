pub(crate) mod reflection;
pub(crate) mod string_table;

use std::{num::NonZeroU32, sync::Arc};

use parking_lot::RwLock;

use crate::runtime::Object;

/// Non-null handle of a heap object. Stored in a [`Slot`](crate::runtime::Slot) as its id;
/// id 0 is null.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference(NonZeroU32);

impl Reference {
    pub(crate) fn from_bits(bits: u32) -> Option<Self> {
        NonZeroU32::new(bits).map(Reference)
    }

    pub(crate) fn to_bits(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Object table. Objects are never reclaimed; they live as long as the heap.
#[derive(Debug, Default)]
pub struct Heap {
    objects: RwLock<Vec<Arc<Object>>>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, object: Object) -> Reference {
        let mut objects = self.objects.write();
        objects.push(Arc::new(object));
        let id = u32::try_from(objects.len()).expect("heap exhausted");
        Reference::from_bits(id).expect("id starts at 1")
    }

    pub fn get(&self, reference: Reference) -> Arc<Object> {
        Arc::clone(&self.objects.read()[reference.index()])
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
