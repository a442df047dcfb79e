//! Structural view of the binary class-file format.

mod parser;
mod structs;

pub use parser::*;
pub use structs::*;

/// Turns raw class bytes into a [`ClassFile`].
pub trait ClassParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ClassFile, ClassFormatError>;
}
