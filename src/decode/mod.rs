//! Decoding of the wasm binary module format.
//!
//! The decoder consumes the whole binary: the `\0asm` preamble, then a
//! sequence of `(id, length, payload)` sections. Every section payload is
//! parsed in a bounded sub-stream; leftover bytes are malformed. Custom
//! sections are skipped after a validating name read; all other section ids
//! may appear at most once.
//!
//! Function bodies come out of the decoder already flattened (see
//! [`body`]); the validator still has to resolve branch targets before the
//! module becomes executable.

use crate::module::{
    DataSegment, ElementItems, ElementSegment, ExportEntry, ExternalKind, FuncBody, GlobalEntry,
    GlobalType, ImportDescriptor, ImportEntry, InitExpr, MemoryType, Module, Mutability,
    SegmentMode, TableType,
};
use crate::stream::{Stream, StreamError};
use crate::types::{AddressType, Limits, Signature, ValueType};
use crate::{isa, Error};
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;

mod body;

pub(crate) use self::body::parse_expression;

/// `\0asm`
const WASM_MAGIC: u32 = 0x6d73_6100;
const WASM_VERSION: u32 = 1;

impl From<StreamError> for Error {
    fn from(error: StreamError) -> Error {
        Error::Malformed(error.to_string())
    }
}

pub(crate) fn decode_module(bytes: &[u8]) -> Result<Module, Error> {
    let mut stream = Stream::new(bytes);

    if stream.read_u32_le()? != WASM_MAGIC {
        return Err(Error::Malformed("invalid magic".into()));
    }
    if stream.read_u32_le()? != WASM_VERSION {
        return Err(Error::Malformed("unsupported version".into()));
    }

    let mut module = Module {
        types: Vec::new(),
        imports: Vec::new(),
        functions: Vec::new(),
        tables: Vec::new(),
        memories: Vec::new(),
        globals: Vec::new(),
        exports: Vec::new(),
        start: None,
        elements: Vec::new(),
        code: Vec::new(),
        data: Vec::new(),
        data_count: None,
    };

    let mut seen_sections = [false; 12];
    let mut code_section_seen = false;

    while !stream.is_at_end() {
        let id = stream.read_byte()?;
        let length = stream.read_leb_u32()? as usize;
        let payload = stream.read_bytes(length)?;
        let mut section = Stream::new(payload);

        if id == 0 {
            // Custom sections only have their name checked for UTF-8
            // well-formedness; the payload is opaque to the engine.
            section.read_name()?;
            section.skip(section.len() - section.offset())?;
            continue;
        }

        let index = match id {
            1..=12 => (id - 1) as usize,
            _ => return Err(Error::Malformed(format!("unknown section id {}", id))),
        };
        if seen_sections[index] {
            return Err(Error::Malformed(format!("duplicate section id {}", id)));
        }
        seen_sections[index] = true;

        match id {
            1 => decode_type_section(&mut section, &mut module)?,
            2 => decode_import_section(&mut section, &mut module)?,
            3 => {
                module.functions = section.read_vec(|s| s.read_leb_u32())?;
            }
            4 => {
                module.tables = section.read_vec(|s| read_table_type(s))?;
            }
            5 => {
                module.memories = section.read_vec(|s| read_memory_type(s))?;
            }
            6 => decode_global_section(&mut section, &mut module)?,
            7 => decode_export_section(&mut section, &mut module)?,
            8 => module.start = Some(section.read_leb_u32()?),
            9 => decode_element_section(&mut section, &mut module)?,
            10 => {
                code_section_seen = true;
                decode_code_section(&mut section, &mut module)?;
            }
            11 => decode_data_section(&mut section, &mut module)?,
            12 => {
                if code_section_seen {
                    return Err(Error::Malformed(
                        "data count section must precede the code section".into(),
                    ));
                }
                module.data_count = Some(section.read_leb_u32()?);
            }
            _ => unreachable!("section id checked above"),
        }

        if !section.is_at_end() {
            return Err(Error::Malformed(format!(
                "trailing bytes in section id {}",
                id
            )));
        }
    }

    if module.functions.len() != module.code.len() {
        return Err(Error::Malformed(format!(
            "function section declares {} functions but code section has {} bodies",
            module.functions.len(),
            module.code.len()
        )));
    }
    if let Some(count) = module.data_count {
        if count as usize != module.data.len() {
            return Err(Error::Malformed(format!(
                "data count section declares {} segments but data section has {}",
                count,
                module.data.len()
            )));
        }
    }

    Ok(module)
}

fn decode_type_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.types = section.read_vec(|s| {
        if s.read_byte()? != 0x60 {
            return Err(Error::Malformed("function type must start with 0x60".into()));
        }
        let params = s.read_vec(body::read_value_type)?;
        let results = s.read_vec(body::read_value_type)?;
        Ok(Signature::from_parts(params, results))
    })?;
    Ok(())
}

fn decode_import_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.imports = section.read_vec(|s| {
        let import_module = s.read_name()?;
        let field = s.read_name()?;
        let descriptor = match s.read_byte()? {
            0x00 => ImportDescriptor::Function(s.read_leb_u32()?),
            0x01 => ImportDescriptor::Table(read_table_type(s)?),
            0x02 => ImportDescriptor::Memory(read_memory_type(s)?),
            0x03 => ImportDescriptor::Global(read_global_type(s)?),
            kind => return Err(Error::Malformed(format!("invalid import kind {:#04x}", kind))),
        };
        Ok(ImportEntry {
            module: import_module,
            field,
            descriptor,
        })
    })?;
    Ok(())
}

fn decode_global_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.globals = section.read_vec(|s| {
        let global_type = read_global_type(s)?;
        let init_expr = InitExpr(parse_expression(s)?);
        Ok::<GlobalEntry, Error>(GlobalEntry {
            global_type,
            init_expr,
        })
    })?;
    Ok(())
}

fn decode_export_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.exports = section.read_vec(|s| {
        let field = s.read_name()?;
        let kind = match s.read_byte()? {
            0x00 => ExternalKind::Function,
            0x01 => ExternalKind::Table,
            0x02 => ExternalKind::Memory,
            0x03 => ExternalKind::Global,
            kind => return Err(Error::Malformed(format!("invalid export kind {:#04x}", kind))),
        };
        let index = s.read_leb_u32()?;
        Ok(ExportEntry { field, kind, index })
    })?;
    Ok(())
}

/// Element segments come in seven encodings: bit 0 of the flags selects
/// passive/declarative over active, bit 1 adds an explicit table index (or
/// turns passive into declarative), bit 2 switches the payload from
/// function indices to constant expressions.
fn decode_element_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.elements = section.read_vec(|s| {
        let flags = s.read_leb_u32()?;
        let segment = match flags {
            0 => ElementSegment {
                mode: SegmentMode::Active,
                table_index: 0,
                offset: Some(InitExpr(parse_expression(s)?)),
                elem_type: ValueType::FuncRef,
                items: ElementItems::Functions(s.read_vec(|s| s.read_leb_u32())?),
            },
            1 => ElementSegment {
                mode: SegmentMode::Passive,
                table_index: 0,
                offset: None,
                elem_type: read_elem_kind(s)?,
                items: ElementItems::Functions(s.read_vec(|s| s.read_leb_u32())?),
            },
            2 => {
                let table_index = s.read_leb_u32()?;
                let offset = InitExpr(parse_expression(s)?);
                ElementSegment {
                    mode: SegmentMode::Active,
                    table_index,
                    offset: Some(offset),
                    elem_type: read_elem_kind(s)?,
                    items: ElementItems::Functions(s.read_vec(|s| s.read_leb_u32())?),
                }
            }
            3 => ElementSegment {
                mode: SegmentMode::Declarative,
                table_index: 0,
                offset: None,
                elem_type: read_elem_kind(s)?,
                items: ElementItems::Functions(s.read_vec(|s| s.read_leb_u32())?),
            },
            4 => ElementSegment {
                mode: SegmentMode::Active,
                table_index: 0,
                offset: Some(InitExpr(parse_expression(s)?)),
                elem_type: ValueType::FuncRef,
                items: ElementItems::Expressions(read_elem_exprs(s)?),
            },
            5 => ElementSegment {
                mode: SegmentMode::Passive,
                table_index: 0,
                offset: None,
                elem_type: body::read_ref_type(s)?,
                items: ElementItems::Expressions(read_elem_exprs(s)?),
            },
            6 => {
                let table_index = s.read_leb_u32()?;
                let offset = InitExpr(parse_expression(s)?);
                ElementSegment {
                    mode: SegmentMode::Active,
                    table_index,
                    offset: Some(offset),
                    elem_type: body::read_ref_type(s)?,
                    items: ElementItems::Expressions(read_elem_exprs(s)?),
                }
            }
            7 => ElementSegment {
                mode: SegmentMode::Declarative,
                table_index: 0,
                offset: None,
                elem_type: body::read_ref_type(s)?,
                items: ElementItems::Expressions(read_elem_exprs(s)?),
            },
            _ => {
                return Err(Error::Malformed(format!(
                    "invalid element segment flags {}",
                    flags
                )))
            }
        };
        Ok(segment)
    })?;
    Ok(())
}

fn read_elem_kind(stream: &mut Stream) -> Result<ValueType, Error> {
    match stream.read_byte()? {
        0x00 => Ok(ValueType::FuncRef),
        kind => Err(Error::Malformed(format!(
            "invalid element kind {:#04x}",
            kind
        ))),
    }
}

fn read_elem_exprs(stream: &mut Stream) -> Result<Vec<InitExpr>, Error> {
    stream.read_vec(|s| parse_expression(s).map(InitExpr))
}

fn decode_code_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.code = section.read_vec(|s| {
        let size = s.read_leb_u32()? as usize;
        let mut body = Stream::new(s.read_bytes(size)?);

        let locals: Vec<(u32, ValueType)> = body.read_vec(|s| {
            let count = s.read_leb_u32()?;
            let value_type = body::read_value_type(s)?;
            Ok::<(u32, ValueType), Error>((count, value_type))
        })?;
        let mut total: u64 = 0;
        for &(count, _) in &locals {
            total += u64::from(count);
        }
        if total > u64::from(u32::MAX) {
            return Err(Error::Malformed("too many locals".into()));
        }

        let code = isa::Instructions::new(parse_expression(&mut body)?);
        if !body.is_at_end() {
            return Err(Error::Malformed("trailing bytes in function body".into()));
        }
        Ok(FuncBody { locals, code })
    })?;
    Ok(())
}

fn decode_data_section(section: &mut Stream, module: &mut Module) -> Result<(), Error> {
    module.data = section.read_vec(|s| {
        let flags = s.read_leb_u32()?;
        let segment = match flags {
            0 => {
                let offset = InitExpr(parse_expression(s)?);
                DataSegment {
                    mode: SegmentMode::Active,
                    memory_index: 0,
                    offset: Some(offset),
                    data: read_byte_vec(s)?,
                }
            }
            1 => DataSegment {
                mode: SegmentMode::Passive,
                memory_index: 0,
                offset: None,
                data: read_byte_vec(s)?,
            },
            2 => {
                let memory_index = s.read_leb_u32()?;
                let offset = InitExpr(parse_expression(s)?);
                DataSegment {
                    mode: SegmentMode::Active,
                    memory_index,
                    offset: Some(offset),
                    data: read_byte_vec(s)?,
                }
            }
            _ => {
                return Err(Error::Malformed(format!(
                    "invalid data segment flags {}",
                    flags
                )))
            }
        };
        Ok(segment)
    })?;
    Ok(())
}

fn read_byte_vec(stream: &mut Stream) -> Result<Vec<u8>, Error> {
    let len = stream.read_leb_u32()? as usize;
    Ok(stream.read_bytes(len)?.to_vec())
}

fn read_limits(stream: &mut Stream) -> Result<(Limits, AddressType), Error> {
    let flags = stream.read_byte()?;
    if !matches!(flags, 0x00 | 0x01 | 0x04 | 0x05) {
        return Err(Error::Malformed(format!("invalid limits flags {:#04x}", flags)));
    }
    let address_type = if flags & 0x04 != 0 {
        AddressType::I64
    } else {
        AddressType::I32
    };
    let min = stream.read_leb_u64()?;
    let max = if flags & 0x01 != 0 {
        Some(stream.read_leb_u64()?)
    } else {
        None
    };
    Ok((Limits::new(min, max), address_type))
}

fn read_table_type(stream: &mut Stream) -> Result<TableType, Error> {
    let elem_type = body::read_ref_type(stream)?;
    let (limits, address_type) = read_limits(stream)?;
    Ok(TableType {
        elem_type,
        limits,
        address_type,
    })
}

fn read_memory_type(stream: &mut Stream) -> Result<MemoryType, Error> {
    let (limits, address_type) = read_limits(stream)?;
    Ok(MemoryType {
        limits,
        address_type,
    })
}

fn read_global_type(stream: &mut Stream) -> Result<GlobalType, Error> {
    let content_type = body::read_value_type(stream)?;
    let mutability = match stream.read_byte()? {
        0x00 => Mutability::Constant,
        0x01 => Mutability::Variable,
        byte => {
            return Err(Error::Malformed(format!(
                "invalid global mutability {:#04x}",
                byte
            )))
        }
    };
    Ok(GlobalType {
        content_type,
        mutability,
    })
}

#[cfg(test)]
mod tests {
    use super::decode_module;
    use crate::isa::{BranchTarget, Instruction};
    use crate::types::ValueType;
    use crate::Error;
    use assert_matches::assert_matches;

    fn wat2wasm(source: &str) -> Vec<u8> {
        wat::parse_str(source).expect("failed to parse wat")
    }

    #[test]
    fn minimal_module() {
        let module = decode_module(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]).unwrap();
        assert!(module.types.is_empty());
        assert!(module.functions.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        assert_matches!(
            decode_module(&[0x01, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]),
            Err(Error::Malformed(_))
        );
    }

    #[test]
    fn rejects_bad_version() {
        assert_matches!(
            decode_module(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]),
            Err(Error::Malformed(_))
        );
    }

    #[test]
    fn rejects_truncated_module() {
        assert_matches!(
            decode_module(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00]),
            Err(Error::Malformed(_))
        );
    }

    #[test]
    fn rejects_duplicate_section() {
        // Two empty function sections.
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x00, 0x03, 0x01, 0x00,
        ];
        assert_matches!(decode_module(&bytes), Err(Error::Malformed(_)));
    }

    #[test]
    fn rejects_trailing_section_bytes() {
        // A type section that claims one extra byte.
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0xff,
        ];
        assert_matches!(decode_module(&bytes), Err(Error::Malformed(_)));
    }

    #[test]
    fn decodes_flat_body() {
        let wasm = wat2wasm(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        assert_eq!(module.functions, &[0]);
        let code = module.code[0].code.as_slice();
        assert_eq!(
            code,
            &[
                Instruction::LocalGet(0),
                Instruction::LocalGet(1),
                Instruction::I32Add,
                Instruction::End,
            ]
        );
    }

    #[test]
    fn block_continuation_points_after_end() {
        let wasm = wat2wasm(
            r#"
            (module
                (func
                    block
                        br 0
                    end))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        let code = module.code[0].code.as_slice();
        // block, br, end (block), end (function)
        assert_matches!(&code[0], Instruction::Block(control) => {
            assert_eq!(control.label.continuation, 3);
        });
        assert_matches!(&code[1], Instruction::Br(BranchTarget::Depth(0)));
    }

    #[test]
    fn loop_continuation_is_its_head() {
        let wasm = wat2wasm(
            r#"
            (module
                (func
                    loop
                        br 0
                    end))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        let code = module.code[0].code.as_slice();
        assert_matches!(&code[0], Instruction::Loop(control) => {
            assert_eq!(control.label.continuation, 0);
        });
    }

    #[test]
    fn if_records_else_location() {
        let wasm = wat2wasm(
            r#"
            (module
                (func (param i32) (result i32)
                    local.get 0
                    if (result i32)
                        i32.const 1
                    else
                        i32.const 2
                    end))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        let code = module.code[0].code.as_slice();
        assert_matches!(&code[1], Instruction::If(control) => {
            assert_eq!(control.else_location, Some(3));
            assert_eq!(control.end_label.continuation, 6);
        });
        assert_matches!(&code[3], Instruction::Else(label) => {
            assert_eq!(label.continuation, 6);
        });
    }

    #[test]
    fn rejects_unknown_opcode() {
        // (func) body with byte 0x27 which is unassigned.
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // preamble
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type ()->()
            0x03, 0x02, 0x01, 0x00, // function section
            0x0a, 0x05, 0x01, 0x03, 0x00, 0x27, 0x0b, // code
        ];
        assert_matches!(decode_module(&bytes), Err(Error::Malformed(_)));
    }

    #[test]
    fn decodes_memory64_limits() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // preamble
            0x05, 0x04, 0x01, 0x05, 0x01, 0x02, // memory (i64 min 1 max 2)
        ];
        let module = decode_module(&bytes).unwrap();
        assert_eq!(module.memories.len(), 1);
        assert_eq!(
            module.memories[0].address_type,
            crate::types::AddressType::I64
        );
        assert_eq!(module.memories[0].limits.min, 1);
        assert_eq!(module.memories[0].limits.max, Some(2));
    }

    #[test]
    fn decodes_passive_data_segment() {
        let wasm = wat2wasm(
            r#"
            (module
                (memory 1)
                (data "abc"))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        assert_eq!(module.data.len(), 1);
        assert_eq!(module.data[0].mode, crate::module::SegmentMode::Passive);
        assert_eq!(module.data[0].data, b"abc");
    }

    #[test]
    fn decodes_element_kinds() {
        let wasm = wat2wasm(
            r#"
            (module
                (table 4 funcref)
                (func $f)
                (elem (i32.const 0) $f)
                (elem funcref (ref.func $f))
                (elem declare func $f))
            "#,
        );
        let module = decode_module(&wasm).unwrap();
        assert_eq!(module.elements.len(), 3);
        assert_eq!(module.elements[0].mode, crate::module::SegmentMode::Active);
        assert_eq!(module.elements[1].mode, crate::module::SegmentMode::Passive);
        assert_eq!(
            module.elements[2].mode,
            crate::module::SegmentMode::Declarative
        );
        assert_eq!(module.elements[1].elem_type, ValueType::FuncRef);
    }
}
