use std::sync::Arc;

use crate::{
    class::{
        AttributeInfo, ClassFile, ClassFormatError, ClassParser, CodeAttribute, ConstantPoolInfo,
        ExceptionTableItem, FieldInfo, LineNumberTableItem, MethodInfo, cp_utf8,
        structs::JavaStr,
    },
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
};
use nom::{
    IResult, Parser,
    bytes::complete::{tag, take},
    combinator::eof,
    error_position,
    multi::count,
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u32, u8},
};

/// The default [`ClassParser`], reading the binary class-file format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassFileParser;

impl ClassParser for ClassFileParser {
    fn parse(&self, bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
        Ok(class_file(bytes)?)
    }
}

pub fn class_file(input: &[u8]) -> Result<ClassFile, nom::Err<nom::error::Error<&[u8]>>> {
    let (input, (minor, major)) = parse_header(input)?;
    let (input, constant_pool) = parse_constant_pool(input)?;

    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces) = parse_interfaces(input)?;
    let (input, fields) = parse_fields(input, &constant_pool)?;
    let (input, methods) = parse_methods(input, &constant_pool)?;
    let (input, attributes) = parse_attributes(input, &constant_pool)?;

    eof(input)?;

    Ok(ClassFile {
        major_version: major,
        minor_version: minor,
        access_flags: ClassAccessFlag::from_bits_retain(access_flags),
        this_class,
        super_class,
        constant_pool,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

fn parse_header(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, _) = tag(&[0xcau8, 0xfe, 0xba, 0xbe] as &[u8])(input)?;
    let (input, minor) = be_u16(input)?;
    let (input, major) = be_u16(input)?;
    Ok((input, (minor, major)))
}

fn parse_constant_pool(input: &[u8]) -> IResult<&[u8], Vec<ConstantPoolInfo>> {
    let (input, constant_pool_count) = be_u16(input)?;
    let entry_count = (constant_pool_count as usize).saturating_sub(1);

    let mut constant_pool = Vec::with_capacity(entry_count);

    let mut input = input;

    while constant_pool.len() < entry_count {
        let constant;
        (input, constant) = parse_constant(input)?;
        let need_empty = matches!(
            constant,
            ConstantPoolInfo::Long(_) | ConstantPoolInfo::Double(_)
        );
        constant_pool.push(constant);
        if need_empty {
            constant_pool.push(ConstantPoolInfo::Empty);
        }
    }

    Ok((input, constant_pool))
}

fn parse_constant(mut input: &[u8]) -> IResult<&[u8], ConstantPoolInfo> {
    let tag;
    (input, tag) = u8(input)?;
    let cp_info = match tag {
        1 => {
            let length;
            (input, length) = be_u16(input)?;
            let bytes;
            (input, bytes) = take(length)(input)?;
            // SAFETY: from JVM class file
            let Some(text) = JavaStr::new(bytes).to_str_arc() else {
                return Err(nom::Err::Failure(error_position!(
                    input,
                    nom::error::ErrorKind::Verify
                )));
            };
            ConstantPoolInfo::Utf8(text)
        }
        3 => {
            let int;
            (input, int) = be_i32(input)?;
            ConstantPoolInfo::Integer(int)
        }
        4 => {
            let float;
            (input, float) = be_f32(input)?;
            ConstantPoolInfo::Float(float)
        }
        5 => {
            let long;
            (input, long) = be_i64(input)?;
            ConstantPoolInfo::Long(long)
        }
        6 => {
            let double;
            (input, double) = be_f64(input)?;
            ConstantPoolInfo::Double(double)
        }
        7 => {
            let name_index;
            (input, name_index) = be_u16(input)?;

            ConstantPoolInfo::Class { name_index }
        }
        8 => {
            let string_index;
            (input, string_index) = be_u16(input)?;

            ConstantPoolInfo::String { string_index }
        }
        9 | 10 | 11 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            match tag {
                9 => ConstantPoolInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                },
                10 => ConstantPoolInfo::Methodref {
                    class_index,
                    name_and_type_index,
                },
                _ => ConstantPoolInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                },
            }
        }
        12 => {
            let (name_index, descriptor_index);
            (input, name_index) = be_u16(input)?;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            }
        }
        15 => {
            let (reference_kind, reference_index);
            (input, reference_kind) = u8(input)?;
            (input, reference_index) = be_u16(input)?;
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            }
        }
        16 => {
            let descriptor_index;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::MethodType { descriptor_index }
        }
        17 | 18 => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            if tag == 17 {
                ConstantPoolInfo::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
            } else {
                ConstantPoolInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
            }
        }
        19 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Module { name_index }
        }
        20 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Package { name_index }
        }
        _ => {
            log::debug!("unknown constant tag {tag}");
            return Err(nom::Err::Failure(error_position!(
                input,
                nom::error::ErrorKind::Tag
            )));
        }
    };
    Ok((input, cp_info))
}

fn parse_interfaces(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    let (input, interface_count) = be_u16(input)?;

    let (input, interfaces) = count(be_u16, interface_count as _).parse(input)?;

    Ok((input, interfaces))
}

fn parse_fields<'a>(
    input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> IResult<&'a [u8], Vec<FieldInfo>> {
    let (input, field_count) = be_u16(input)?;
    let (input, fields) =
        count(|i: &'a [u8]| parse_field(i, cp), field_count as _).parse(input)?;
    Ok((input, fields))
}

fn parse_field<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> IResult<&'a [u8], FieldInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;

    let (input, attributes) = parse_attributes(input, cp)?;
    Ok((
        input,
        FieldInfo {
            access_flags: FieldAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

fn parse_methods<'a>(
    input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> IResult<&'a [u8], Vec<MethodInfo>> {
    let (input, methods_count) = be_u16(input)?;

    let (input, methods) =
        count(|i: &'a [u8]| parse_method(i, cp), methods_count as _).parse(input)?;

    Ok((input, methods))
}

fn parse_method<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> IResult<&'a [u8], MethodInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, attributes) = parse_attributes(input, cp)?;

    Ok((
        input,
        MethodInfo {
            access_flags: MethodAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

fn parse_attributes<'a>(
    input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> IResult<&'a [u8], Vec<AttributeInfo>> {
    let (input, attributes_count) = be_u16(input)?;

    let (input, attributes) =
        count(|i: &'a [u8]| parse_attribute(i, cp), attributes_count as _).parse(input)?;

    Ok((input, attributes))
}

fn parse_attribute<'a>(
    input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> IResult<&'a [u8], AttributeInfo> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;

    let Ok(name) = cp_utf8(cp, attribute_name_index) else {
        return Err(nom::Err::Failure(error_position!(
            input,
            nom::error::ErrorKind::Verify
        )));
    };

    let attribute = match name.as_ref() {
        "Code" => AttributeInfo::Code(parse_code(info, cp)?.1),
        "ConstantValue" => {
            let (_, constantvalue_index) = be_u16(info)?;
            AttributeInfo::ConstantValue {
                constantvalue_index,
            }
        }
        "Exceptions" => {
            let (info, number_of_exceptions) = be_u16(info)?;
            let (_, exception_index_table) =
                count(be_u16, number_of_exceptions as _).parse(info)?;
            AttributeInfo::Exceptions {
                exception_index_table,
            }
        }
        "SourceFile" => {
            let (_, sourcefile_index) = be_u16(info)?;
            AttributeInfo::SourceFile { sourcefile_index }
        }
        "LineNumberTable" => {
            let (info, table_length) = be_u16(info)?;
            let (_, items) = count(parse_line_number, table_length as _).parse(info)?;
            AttributeInfo::LineNumberTable(items)
        }
        _ => AttributeInfo::Unknown {
            name: Arc::clone(name),
            info: info.to_vec(),
        },
    };

    Ok((input, attribute))
}

fn parse_code<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> IResult<&'a [u8], CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(parse_exception_table_item, exception_table_length as _).parse(input)?;
    let (input, attributes) = parse_attributes(input, cp)?;

    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code: code.to_vec(),
            exception_table,
            attributes,
        },
    ))
}

fn parse_exception_table_item(input: &[u8]) -> IResult<&[u8], ExceptionTableItem> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = be_u16(input)?;
    Ok((
        input,
        ExceptionTableItem {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}

fn parse_line_number(input: &[u8]) -> IResult<&[u8], LineNumberTableItem> {
    let (input, start_pc) = be_u16(input)?;
    let (input, line_number) = be_u16(input)?;
    Ok((
        input,
        LineNumberTableItem {
            start_pc,
            line_number,
        },
    ))
}
