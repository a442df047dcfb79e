use std::sync::Arc;

use crate::class::ClassFormatError;

/// Raw constant pool entry; indices point back into the same pool.
#[derive(Debug, Clone)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// second slot of a Long/Double, and index 0
    Empty,
}

/// Entry at a 1-based constant pool index.
pub fn cp_entry(cp: &[ConstantPoolInfo], index: u16) -> Result<&ConstantPoolInfo, ClassFormatError> {
    (index as usize)
        .checked_sub(1)
        .and_then(|i| cp.get(i))
        .ok_or_else(|| ClassFormatError(format!("constant pool index {index} out of range")))
}

pub fn cp_utf8(cp: &[ConstantPoolInfo], index: u16) -> Result<&Arc<str>, ClassFormatError> {
    let ConstantPoolInfo::Utf8(value) = cp_entry(cp, index)? else {
        return Err(ClassFormatError(format!("constant #{index} is not Utf8")));
    };
    Ok(value)
}

pub fn cp_class_name(cp: &[ConstantPoolInfo], index: u16) -> Result<&Arc<str>, ClassFormatError> {
    let ConstantPoolInfo::Class { name_index } = cp_entry(cp, index)? else {
        return Err(ClassFormatError(format!("constant #{index} is not Class")));
    };
    cp_utf8(cp, *name_index)
}

/// (name, descriptor)
pub fn cp_name_and_type(
    cp: &[ConstantPoolInfo],
    index: u16,
) -> Result<(&Arc<str>, &Arc<str>), ClassFormatError> {
    let ConstantPoolInfo::NameAndType {
        name_index,
        descriptor_index,
    } = cp_entry(cp, index)?
    else {
        return Err(ClassFormatError(format!("constant #{index} is not NameAndType")));
    };
    Ok((cp_utf8(cp, *name_index)?, cp_utf8(cp, *descriptor_index)?))
}
