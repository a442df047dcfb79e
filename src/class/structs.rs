use std::{fmt, sync::Arc};

mod constant_pool;
mod java_str;

pub use constant_pool::*;
pub(crate) use java_str::JavaStr;

use crate::consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag};

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) this_class: u16,
    pub(crate) super_class: u16,
    pub(crate) interfaces: Vec<u16>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    ConstantValue { constantvalue_index: u16 },
    Exceptions { exception_index_table: Vec<u16> },
    SourceFile { sourcefile_index: u16 },
    LineNumberTable(Vec<LineNumberTableItem>),
    Unknown { name: Arc<str>, info: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) code: Vec<u8>,
    pub(crate) exception_table: Vec<ExceptionTableItem>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableItem {
    pub(crate) start_pc: u16,
    pub(crate) end_pc: u16,
    pub(crate) handler_pc: u16,
    /// 0 means catch-all
    pub(crate) catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberTableItem {
    pub(crate) start_pc: u16,
    pub(crate) line_number: u16,
}

impl ClassFile {
    pub fn class_name(&self) -> Result<&Arc<str>, ClassFormatError> {
        cp_class_name(&self.constant_pool, self.this_class)
    }

    /// `None` only for `java/lang/Object`.
    pub fn super_class_name(&self) -> Result<Option<&Arc<str>>, ClassFormatError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        cp_class_name(&self.constant_pool, self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<Arc<str>>, ClassFormatError> {
        self.interfaces
            .iter()
            .map(|&index| cp_class_name(&self.constant_pool, index).cloned())
            .collect()
    }

    pub fn source_file(&self) -> Option<Arc<str>> {
        self.attributes.iter().find_map(|attribute| match attribute {
            AttributeInfo::SourceFile { sourcefile_index } => {
                cp_utf8(&self.constant_pool, *sourcefile_index).ok().cloned()
            }
            _ => None,
        })
    }
}

impl MethodInfo {
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attribute| match attribute {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn exception_index_table(&self) -> &[u16] {
        self.attributes
            .iter()
            .find_map(|attribute| match attribute {
                AttributeInfo::Exceptions {
                    exception_index_table,
                } => Some(exception_index_table.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl FieldInfo {
    pub fn constant_value_index(&self) -> Option<u16> {
        self.attributes.iter().find_map(|attribute| match attribute {
            AttributeInfo::ConstantValue {
                constantvalue_index,
            } => Some(*constantvalue_index),
            _ => None,
        })
    }
}

impl CodeAttribute {
    pub fn line_numbers(&self) -> Vec<LineNumberTableItem> {
        self.attributes
            .iter()
            .filter_map(|attribute| match attribute {
                AttributeInfo::LineNumberTable(items) => Some(items.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFormatError(pub String);

impl fmt::Display for ClassFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ClassFormatError {}

impl From<nom::Err<nom::error::Error<&[u8]>>> for ClassFormatError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ClassFormatError("truncated class file".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => ClassFormatError(format!(
                "malformed class file: {:?} with {} bytes left",
                e.code,
                e.input.len()
            )),
        }
    }
}
