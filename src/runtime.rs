mod class_loader;
pub(crate) mod famous_classes;
mod heap;
mod inheritance;
pub mod interpreter;
mod native;
mod structs;
#[cfg(test)]
pub(crate) mod test_support;
mod vm;

pub use heap::{Heap, Reference};
pub use interpreter::{Frame, OperandStack, Thread};
pub use native::{NativeEnv, NativeMethod, NativeRegistry};
pub use structs::*;
pub use vm::{Vm, VmOptions};
