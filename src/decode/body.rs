//! Parsing of instruction sequences.
//!
//! Expressions arrive as structured control flow and leave as a flat
//! [`isa::Instruction`] list. A stack of pending `block`/`loop`/`if` begin
//! markers is maintained while parsing; every `end` pops the matching begin
//! marker and patches the continuation into the instruction recorded at the
//! begin index. Loops need no end fixup since their continuation is the loop
//! head. Branch instructions keep their relative depths here; the validator
//! later rewrites them to resolved labels.

use crate::isa::{
    BlockControl, BrTableData, BranchTarget, IfControl, Instruction, Label, LaneMemArg, MemArg,
};
use crate::stream::Stream;
use crate::types::{BlockType, ValueType};
use crate::Error;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

/// Pending structured-control begin marker.
struct BlockBegin {
    /// Index of the `block`/`if` instruction to patch at `end`.
    begin: u32,
    /// Loops resolve to their head immediately and need no end fixup.
    is_loop: bool,
}

/// Placeholder until the validator fills arity and entry height.
fn unresolved_label(continuation: u32) -> Label {
    Label {
        continuation,
        arity: 0,
        height: 0,
    }
}

/// Parses one expression: an instruction sequence up to and including the
/// `end` that closes the outermost (implicit) block.
pub(crate) fn parse_expression(stream: &mut Stream) -> Result<Vec<Instruction>, Error> {
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut begin_stack: Vec<BlockBegin> = Vec::new();

    loop {
        let opcode = stream.read_byte()?;
        match opcode {
            0x00 => instructions.push(Instruction::Unreachable),
            0x01 => instructions.push(Instruction::Nop),
            0x02 => {
                let block_type = read_block_type(stream)?;
                begin_stack.push(BlockBegin {
                    begin: instructions.len() as u32,
                    is_loop: false,
                });
                instructions.push(Instruction::Block(BlockControl {
                    block_type,
                    label: unresolved_label(0),
                }));
            }
            0x03 => {
                let block_type = read_block_type(stream)?;
                begin_stack.push(BlockBegin {
                    begin: instructions.len() as u32,
                    is_loop: true,
                });
                // A loop's continuation is its own head.
                let label = unresolved_label(instructions.len() as u32);
                instructions.push(Instruction::Loop(BlockControl { block_type, label }));
            }
            0x04 => {
                let block_type = read_block_type(stream)?;
                begin_stack.push(BlockBegin {
                    begin: instructions.len() as u32,
                    is_loop: false,
                });
                instructions.push(Instruction::If(IfControl {
                    block_type,
                    end_label: unresolved_label(0),
                    else_location: None,
                }));
            }
            0x05 => {
                let begin = begin_stack
                    .last()
                    .ok_or_else(|| Error::Malformed("misplaced else".into()))?;
                let else_location = instructions.len() as u32;
                match instructions.get_mut(begin.begin as usize) {
                    Some(Instruction::If(control)) if control.else_location.is_none() => {
                        control.else_location = Some(else_location);
                    }
                    _ => return Err(Error::Malformed("misplaced else".into())),
                }
                instructions.push(Instruction::Else(unresolved_label(0)));
            }
            0x0b => {
                instructions.push(Instruction::End);

                let begin = match begin_stack.pop() {
                    Some(begin) => begin,
                    // The `end` of the outermost block terminates the
                    // expression.
                    None => return Ok(instructions),
                };
                if begin.is_loop {
                    continue;
                }

                let label = unresolved_label(instructions.len() as u32);
                let else_location = match instructions
                    .get_mut(begin.begin as usize)
                    .expect("begin markers index instructions already pushed")
                {
                    Instruction::Block(control) => {
                        control.label = label;
                        None
                    }
                    Instruction::If(control) => {
                        control.end_label = label;
                        control.else_location
                    }
                    _ => unreachable!("begin markers point at block or if instructions"),
                };
                if let Some(else_location) = else_location {
                    instructions[else_location as usize] = Instruction::Else(label);
                }
            }
            0x0c => {
                let depth = stream.read_leb_u32()?;
                instructions.push(Instruction::Br(BranchTarget::Depth(depth)));
            }
            0x0d => {
                let depth = stream.read_leb_u32()?;
                instructions.push(Instruction::BrIf(BranchTarget::Depth(depth)));
            }
            0x0e => {
                let targets = stream.read_vec(|s| s.read_leb_u32().map(BranchTarget::Depth))?;
                let default = BranchTarget::Depth(stream.read_leb_u32()?);
                instructions.push(Instruction::BrTable(Box::new(BrTableData {
                    targets,
                    default,
                })));
            }
            0x0f => instructions.push(Instruction::Return),
            0x10 => instructions.push(Instruction::Call(stream.read_leb_u32()?)),
            0x11 => {
                let type_index = stream.read_leb_u32()?;
                let table_index = stream.read_leb_u32()?;
                instructions.push(Instruction::CallIndirect {
                    type_index,
                    table_index,
                });
            }

            0x1a => instructions.push(Instruction::Drop),
            0x1b => instructions.push(Instruction::Select),
            0x1c => {
                let types = stream.read_vec(|s| read_value_type(s))?;
                if types.len() != 1 {
                    return Err(Error::Malformed(
                        "typed select must name exactly one type".into(),
                    ));
                }
                instructions.push(Instruction::TypedSelect(types[0]));
            }

            0x20 => instructions.push(Instruction::LocalGet(stream.read_leb_u32()?)),
            0x21 => instructions.push(Instruction::LocalSet(stream.read_leb_u32()?)),
            0x22 => instructions.push(Instruction::LocalTee(stream.read_leb_u32()?)),
            0x23 => instructions.push(Instruction::GlobalGet(stream.read_leb_u32()?)),
            0x24 => instructions.push(Instruction::GlobalSet(stream.read_leb_u32()?)),

            0x25 => instructions.push(Instruction::TableGet(stream.read_leb_u32()?)),
            0x26 => instructions.push(Instruction::TableSet(stream.read_leb_u32()?)),

            0x28..=0x3e => {
                let memarg = read_memarg(stream)?;
                instructions.push(match opcode {
                    0x28 => Instruction::I32Load(memarg),
                    0x29 => Instruction::I64Load(memarg),
                    0x2a => Instruction::F32Load(memarg),
                    0x2b => Instruction::F64Load(memarg),
                    0x2c => Instruction::I32Load8S(memarg),
                    0x2d => Instruction::I32Load8U(memarg),
                    0x2e => Instruction::I32Load16S(memarg),
                    0x2f => Instruction::I32Load16U(memarg),
                    0x30 => Instruction::I64Load8S(memarg),
                    0x31 => Instruction::I64Load8U(memarg),
                    0x32 => Instruction::I64Load16S(memarg),
                    0x33 => Instruction::I64Load16U(memarg),
                    0x34 => Instruction::I64Load32S(memarg),
                    0x35 => Instruction::I64Load32U(memarg),
                    0x36 => Instruction::I32Store(memarg),
                    0x37 => Instruction::I64Store(memarg),
                    0x38 => Instruction::F32Store(memarg),
                    0x39 => Instruction::F64Store(memarg),
                    0x3a => Instruction::I32Store8(memarg),
                    0x3b => Instruction::I32Store16(memarg),
                    0x3c => Instruction::I64Store8(memarg),
                    0x3d => Instruction::I64Store16(memarg),
                    0x3e => Instruction::I64Store32(memarg),
                    _ => unreachable!(),
                });
            }

            0x3f => instructions.push(Instruction::MemorySize(stream.read_leb_u32()?)),
            0x40 => instructions.push(Instruction::MemoryGrow(stream.read_leb_u32()?)),

            0x41 => instructions.push(Instruction::I32Const(stream.read_leb_i32()?)),
            0x42 => instructions.push(Instruction::I64Const(stream.read_leb_i64()?)),
            0x43 => instructions.push(Instruction::F32Const(stream.read_f32_bits()?)),
            0x44 => instructions.push(Instruction::F64Const(stream.read_f64_bits()?)),

            0xd0 => {
                let ref_type = read_ref_type(stream)?;
                instructions.push(Instruction::RefNull(ref_type));
            }
            0xd1 => instructions.push(Instruction::RefIsNull),
            0xd2 => instructions.push(Instruction::RefFunc(stream.read_leb_u32()?)),

            0xfc => {
                let instruction = parse_fc_instruction(stream)?;
                instructions.push(instruction);
            }
            0xfd => {
                let instruction = parse_simd_instruction(stream)?;
                instructions.push(instruction);
            }

            _ => match plain_instruction(opcode) {
                Some(instruction) => instructions.push(instruction),
                None => {
                    return Err(Error::Malformed(format!("unknown opcode {:#04x}", opcode)))
                }
            },
        }
    }
}

pub(crate) fn read_value_type(stream: &mut Stream) -> Result<ValueType, Error> {
    let byte = stream.read_byte()?;
    ValueType::from_byte(byte)
        .ok_or_else(|| Error::Malformed(format!("invalid value type {:#04x}", byte)))
}

pub(crate) fn read_ref_type(stream: &mut Stream) -> Result<ValueType, Error> {
    let value_type = read_value_type(stream)?;
    if !value_type.is_ref() {
        return Err(Error::Malformed(format!(
            "{} is not a reference type",
            value_type
        )));
    }
    Ok(value_type)
}

/// Block types encode as a 33-bit signed LEB: negative one-byte values are
/// the inline forms, non-negative values index the type section.
fn read_block_type(stream: &mut Stream) -> Result<BlockType, Error> {
    let encoded = stream.read_leb_i33()?;
    if encoded >= 0 {
        return Ok(BlockType::TypeIndex(encoded as u32));
    }
    match encoded {
        -64 => Ok(BlockType::Empty),
        -1 => Ok(BlockType::Value(ValueType::I32)),
        -2 => Ok(BlockType::Value(ValueType::I64)),
        -3 => Ok(BlockType::Value(ValueType::F32)),
        -4 => Ok(BlockType::Value(ValueType::F64)),
        -5 => Ok(BlockType::Value(ValueType::V128)),
        -16 => Ok(BlockType::Value(ValueType::FuncRef)),
        -17 => Ok(BlockType::Value(ValueType::ExternRef)),
        _ => Err(Error::Malformed(format!("invalid block type {}", encoded))),
    }
}

/// A memory access immediate: alignment exponent, then the memory index when
/// bit 6 of the alignment field is set, then the byte offset.
fn read_memarg(stream: &mut Stream) -> Result<MemArg, Error> {
    let mut align = stream.read_leb_u32()?;
    let mut memory_index = 0;
    if align & 0x40 != 0 {
        align &= !0x40;
        memory_index = stream.read_leb_u32()?;
    }
    let offset = stream.read_leb_u64()?;
    Ok(MemArg {
        align,
        offset,
        memory_index,
    })
}

fn read_lane_memarg(stream: &mut Stream) -> Result<LaneMemArg, Error> {
    let memarg = read_memarg(stream)?;
    let lane = stream.read_byte()?;
    Ok(LaneMemArg { memarg, lane })
}

/// Bulk memory/table and saturating truncation family (`0xFC` prefix).
fn parse_fc_instruction(stream: &mut Stream) -> Result<Instruction, Error> {
    let secondary = stream.read_leb_u32()?;
    let instruction = match secondary {
        0 => Instruction::I32TruncSatF32S,
        1 => Instruction::I32TruncSatF32U,
        2 => Instruction::I32TruncSatF64S,
        3 => Instruction::I32TruncSatF64U,
        4 => Instruction::I64TruncSatF32S,
        5 => Instruction::I64TruncSatF32U,
        6 => Instruction::I64TruncSatF64S,
        7 => Instruction::I64TruncSatF64U,
        8 => Instruction::MemoryInit {
            data_index: stream.read_leb_u32()?,
            memory_index: stream.read_leb_u32()?,
        },
        9 => Instruction::DataDrop(stream.read_leb_u32()?),
        10 => Instruction::MemoryCopy {
            dst_index: stream.read_leb_u32()?,
            src_index: stream.read_leb_u32()?,
        },
        11 => Instruction::MemoryFill(stream.read_leb_u32()?),
        12 => Instruction::TableInit {
            elem_index: stream.read_leb_u32()?,
            table_index: stream.read_leb_u32()?,
        },
        13 => Instruction::ElemDrop(stream.read_leb_u32()?),
        14 => Instruction::TableCopy {
            dst_index: stream.read_leb_u32()?,
            src_index: stream.read_leb_u32()?,
        },
        15 => Instruction::TableGrow(stream.read_leb_u32()?),
        16 => Instruction::TableSize(stream.read_leb_u32()?),
        17 => Instruction::TableFill(stream.read_leb_u32()?),
        _ => {
            return Err(Error::Malformed(format!(
                "unknown opcode 0xfc {:#04x}",
                secondary
            )))
        }
    };
    Ok(instruction)
}

/// SIMD family (`0xFD` prefix).
fn parse_simd_instruction(stream: &mut Stream) -> Result<Instruction, Error> {
    let secondary = stream.read_leb_u32()?;
    let instruction = match secondary {
        0x00 => Instruction::V128Load(read_memarg(stream)?),
        0x01 => Instruction::V128Load8x8S(read_memarg(stream)?),
        0x02 => Instruction::V128Load8x8U(read_memarg(stream)?),
        0x03 => Instruction::V128Load16x4S(read_memarg(stream)?),
        0x04 => Instruction::V128Load16x4U(read_memarg(stream)?),
        0x05 => Instruction::V128Load32x2S(read_memarg(stream)?),
        0x06 => Instruction::V128Load32x2U(read_memarg(stream)?),
        0x07 => Instruction::V128Load8Splat(read_memarg(stream)?),
        0x08 => Instruction::V128Load16Splat(read_memarg(stream)?),
        0x09 => Instruction::V128Load32Splat(read_memarg(stream)?),
        0x0a => Instruction::V128Load64Splat(read_memarg(stream)?),
        0x0b => Instruction::V128Store(read_memarg(stream)?),
        0x0c => Instruction::V128Const(stream.read_bytes_16()?),
        0x0d => Instruction::I8x16Shuffle(stream.read_bytes_16()?),
        0x15 => Instruction::I8x16ExtractLaneS(stream.read_byte()?),
        0x16 => Instruction::I8x16ExtractLaneU(stream.read_byte()?),
        0x17 => Instruction::I8x16ReplaceLane(stream.read_byte()?),
        0x18 => Instruction::I16x8ExtractLaneS(stream.read_byte()?),
        0x19 => Instruction::I16x8ExtractLaneU(stream.read_byte()?),
        0x1a => Instruction::I16x8ReplaceLane(stream.read_byte()?),
        0x1b => Instruction::I32x4ExtractLane(stream.read_byte()?),
        0x1c => Instruction::I32x4ReplaceLane(stream.read_byte()?),
        0x1d => Instruction::I64x2ExtractLane(stream.read_byte()?),
        0x1e => Instruction::I64x2ReplaceLane(stream.read_byte()?),
        0x1f => Instruction::F32x4ExtractLane(stream.read_byte()?),
        0x20 => Instruction::F32x4ReplaceLane(stream.read_byte()?),
        0x21 => Instruction::F64x2ExtractLane(stream.read_byte()?),
        0x22 => Instruction::F64x2ReplaceLane(stream.read_byte()?),
        0x54 => Instruction::V128Load8Lane(read_lane_memarg(stream)?),
        0x55 => Instruction::V128Load16Lane(read_lane_memarg(stream)?),
        0x56 => Instruction::V128Load32Lane(read_lane_memarg(stream)?),
        0x57 => Instruction::V128Load64Lane(read_lane_memarg(stream)?),
        0x58 => Instruction::V128Store8Lane(read_lane_memarg(stream)?),
        0x59 => Instruction::V128Store16Lane(read_lane_memarg(stream)?),
        0x5a => Instruction::V128Store32Lane(read_lane_memarg(stream)?),
        0x5b => Instruction::V128Store64Lane(read_lane_memarg(stream)?),
        0x5c => Instruction::V128Load32Zero(read_memarg(stream)?),
        0x5d => Instruction::V128Load64Zero(read_memarg(stream)?),
        _ => match plain_simd_instruction(secondary) {
            Some(instruction) => instruction,
            None => {
                return Err(Error::Malformed(format!(
                    "unknown opcode 0xfd {:#04x}",
                    secondary
                )))
            }
        },
    };
    Ok(instruction)
}

/// Single-byte opcodes with no immediates.
fn plain_instruction(opcode: u8) -> Option<Instruction> {
    use self::Instruction::*;

    let instruction = match opcode {
        0x45 => I32Eqz,
        0x46 => I32Eq,
        0x47 => I32Ne,
        0x48 => I32LtS,
        0x49 => I32LtU,
        0x4a => I32GtS,
        0x4b => I32GtU,
        0x4c => I32LeS,
        0x4d => I32LeU,
        0x4e => I32GeS,
        0x4f => I32GeU,
        0x50 => I64Eqz,
        0x51 => I64Eq,
        0x52 => I64Ne,
        0x53 => I64LtS,
        0x54 => I64LtU,
        0x55 => I64GtS,
        0x56 => I64GtU,
        0x57 => I64LeS,
        0x58 => I64LeU,
        0x59 => I64GeS,
        0x5a => I64GeU,
        0x5b => F32Eq,
        0x5c => F32Ne,
        0x5d => F32Lt,
        0x5e => F32Gt,
        0x5f => F32Le,
        0x60 => F32Ge,
        0x61 => F64Eq,
        0x62 => F64Ne,
        0x63 => F64Lt,
        0x64 => F64Gt,
        0x65 => F64Le,
        0x66 => F64Ge,
        0x67 => I32Clz,
        0x68 => I32Ctz,
        0x69 => I32Popcnt,
        0x6a => I32Add,
        0x6b => I32Sub,
        0x6c => I32Mul,
        0x6d => I32DivS,
        0x6e => I32DivU,
        0x6f => I32RemS,
        0x70 => I32RemU,
        0x71 => I32And,
        0x72 => I32Or,
        0x73 => I32Xor,
        0x74 => I32Shl,
        0x75 => I32ShrS,
        0x76 => I32ShrU,
        0x77 => I32Rotl,
        0x78 => I32Rotr,
        0x79 => I64Clz,
        0x7a => I64Ctz,
        0x7b => I64Popcnt,
        0x7c => I64Add,
        0x7d => I64Sub,
        0x7e => I64Mul,
        0x7f => I64DivS,
        0x80 => I64DivU,
        0x81 => I64RemS,
        0x82 => I64RemU,
        0x83 => I64And,
        0x84 => I64Or,
        0x85 => I64Xor,
        0x86 => I64Shl,
        0x87 => I64ShrS,
        0x88 => I64ShrU,
        0x89 => I64Rotl,
        0x8a => I64Rotr,
        0x8b => F32Abs,
        0x8c => F32Neg,
        0x8d => F32Ceil,
        0x8e => F32Floor,
        0x8f => F32Trunc,
        0x90 => F32Nearest,
        0x91 => F32Sqrt,
        0x92 => F32Add,
        0x93 => F32Sub,
        0x94 => F32Mul,
        0x95 => F32Div,
        0x96 => F32Min,
        0x97 => F32Max,
        0x98 => F32Copysign,
        0x99 => F64Abs,
        0x9a => F64Neg,
        0x9b => F64Ceil,
        0x9c => F64Floor,
        0x9d => F64Trunc,
        0x9e => F64Nearest,
        0x9f => F64Sqrt,
        0xa0 => F64Add,
        0xa1 => F64Sub,
        0xa2 => F64Mul,
        0xa3 => F64Div,
        0xa4 => F64Min,
        0xa5 => F64Max,
        0xa6 => F64Copysign,
        0xa7 => I32WrapI64,
        0xa8 => I32TruncF32S,
        0xa9 => I32TruncF32U,
        0xaa => I32TruncF64S,
        0xab => I32TruncF64U,
        0xac => I64ExtendI32S,
        0xad => I64ExtendI32U,
        0xae => I64TruncF32S,
        0xaf => I64TruncF32U,
        0xb0 => I64TruncF64S,
        0xb1 => I64TruncF64U,
        0xb2 => F32ConvertI32S,
        0xb3 => F32ConvertI32U,
        0xb4 => F32ConvertI64S,
        0xb5 => F32ConvertI64U,
        0xb6 => F32DemoteF64,
        0xb7 => F64ConvertI32S,
        0xb8 => F64ConvertI32U,
        0xb9 => F64ConvertI64S,
        0xba => F64ConvertI64U,
        0xbb => F64PromoteF32,
        0xbc => I32ReinterpretF32,
        0xbd => I64ReinterpretF64,
        0xbe => F32ReinterpretI32,
        0xbf => F64ReinterpretI64,
        0xc0 => I32Extend8S,
        0xc1 => I32Extend16S,
        0xc2 => I64Extend8S,
        0xc3 => I64Extend16S,
        0xc4 => I64Extend32S,
        _ => return None,
    };
    Some(instruction)
}

/// SIMD opcodes with no immediates.
fn plain_simd_instruction(secondary: u32) -> Option<Instruction> {
    use self::Instruction::*;

    let instruction = match secondary {
        0x0e => I8x16Swizzle,
        0x0f => I8x16Splat,
        0x10 => I16x8Splat,
        0x11 => I32x4Splat,
        0x12 => I64x2Splat,
        0x13 => F32x4Splat,
        0x14 => F64x2Splat,
        0x23 => I8x16Eq,
        0x24 => I8x16Ne,
        0x25 => I8x16LtS,
        0x26 => I8x16LtU,
        0x27 => I8x16GtS,
        0x28 => I8x16GtU,
        0x29 => I8x16LeS,
        0x2a => I8x16LeU,
        0x2b => I8x16GeS,
        0x2c => I8x16GeU,
        0x2d => I16x8Eq,
        0x2e => I16x8Ne,
        0x2f => I16x8LtS,
        0x30 => I16x8LtU,
        0x31 => I16x8GtS,
        0x32 => I16x8GtU,
        0x33 => I16x8LeS,
        0x34 => I16x8LeU,
        0x35 => I16x8GeS,
        0x36 => I16x8GeU,
        0x37 => I32x4Eq,
        0x38 => I32x4Ne,
        0x39 => I32x4LtS,
        0x3a => I32x4LtU,
        0x3b => I32x4GtS,
        0x3c => I32x4GtU,
        0x3d => I32x4LeS,
        0x3e => I32x4LeU,
        0x3f => I32x4GeS,
        0x40 => I32x4GeU,
        0x41 => F32x4Eq,
        0x42 => F32x4Ne,
        0x43 => F32x4Lt,
        0x44 => F32x4Gt,
        0x45 => F32x4Le,
        0x46 => F32x4Ge,
        0x47 => F64x2Eq,
        0x48 => F64x2Ne,
        0x49 => F64x2Lt,
        0x4a => F64x2Gt,
        0x4b => F64x2Le,
        0x4c => F64x2Ge,
        0x4d => V128Not,
        0x4e => V128And,
        0x4f => V128AndNot,
        0x50 => V128Or,
        0x51 => V128Xor,
        0x52 => V128Bitselect,
        0x53 => V128AnyTrue,
        0x5e => F32x4DemoteF64x2Zero,
        0x5f => F64x2PromoteLowF32x4,
        0x60 => I8x16Abs,
        0x61 => I8x16Neg,
        0x62 => I8x16Popcnt,
        0x63 => I8x16AllTrue,
        0x64 => I8x16Bitmask,
        0x65 => I8x16NarrowI16x8S,
        0x66 => I8x16NarrowI16x8U,
        0x67 => F32x4Ceil,
        0x68 => F32x4Floor,
        0x69 => F32x4Trunc,
        0x6a => F32x4Nearest,
        0x6b => I8x16Shl,
        0x6c => I8x16ShrS,
        0x6d => I8x16ShrU,
        0x6e => I8x16Add,
        0x6f => I8x16AddSatS,
        0x70 => I8x16AddSatU,
        0x71 => I8x16Sub,
        0x72 => I8x16SubSatS,
        0x73 => I8x16SubSatU,
        0x74 => F64x2Ceil,
        0x75 => F64x2Floor,
        0x76 => I8x16MinS,
        0x77 => I8x16MinU,
        0x78 => I8x16MaxS,
        0x79 => I8x16MaxU,
        0x7a => F64x2Trunc,
        0x7b => I8x16AvgrU,
        0x7c => I16x8ExtaddPairwiseI8x16S,
        0x7d => I16x8ExtaddPairwiseI8x16U,
        0x7e => I32x4ExtaddPairwiseI16x8S,
        0x7f => I32x4ExtaddPairwiseI16x8U,
        0x80 => I16x8Abs,
        0x81 => I16x8Neg,
        0x82 => I16x8Q15MulrSatS,
        0x83 => I16x8AllTrue,
        0x84 => I16x8Bitmask,
        0x85 => I16x8NarrowI32x4S,
        0x86 => I16x8NarrowI32x4U,
        0x87 => I16x8ExtendLowI8x16S,
        0x88 => I16x8ExtendHighI8x16S,
        0x89 => I16x8ExtendLowI8x16U,
        0x8a => I16x8ExtendHighI8x16U,
        0x8b => I16x8Shl,
        0x8c => I16x8ShrS,
        0x8d => I16x8ShrU,
        0x8e => I16x8Add,
        0x8f => I16x8AddSatS,
        0x90 => I16x8AddSatU,
        0x91 => I16x8Sub,
        0x92 => I16x8SubSatS,
        0x93 => I16x8SubSatU,
        0x94 => F64x2Nearest,
        0x95 => I16x8Mul,
        0x96 => I16x8MinS,
        0x97 => I16x8MinU,
        0x98 => I16x8MaxS,
        0x99 => I16x8MaxU,
        0x9b => I16x8AvgrU,
        0x9c => I16x8ExtmulLowI8x16S,
        0x9d => I16x8ExtmulHighI8x16S,
        0x9e => I16x8ExtmulLowI8x16U,
        0x9f => I16x8ExtmulHighI8x16U,
        0xa0 => I32x4Abs,
        0xa1 => I32x4Neg,
        0xa3 => I32x4AllTrue,
        0xa4 => I32x4Bitmask,
        0xa7 => I32x4ExtendLowI16x8S,
        0xa8 => I32x4ExtendHighI16x8S,
        0xa9 => I32x4ExtendLowI16x8U,
        0xaa => I32x4ExtendHighI16x8U,
        0xab => I32x4Shl,
        0xac => I32x4ShrS,
        0xad => I32x4ShrU,
        0xae => I32x4Add,
        0xb1 => I32x4Sub,
        0xb5 => I32x4Mul,
        0xb6 => I32x4MinS,
        0xb7 => I32x4MinU,
        0xb8 => I32x4MaxS,
        0xb9 => I32x4MaxU,
        0xba => I32x4DotI16x8S,
        0xbc => I32x4ExtmulLowI16x8S,
        0xbd => I32x4ExtmulHighI16x8S,
        0xbe => I32x4ExtmulLowI16x8U,
        0xbf => I32x4ExtmulHighI16x8U,
        0xc0 => I64x2Abs,
        0xc1 => I64x2Neg,
        0xc3 => I64x2AllTrue,
        0xc4 => I64x2Bitmask,
        0xc7 => I64x2ExtendLowI32x4S,
        0xc8 => I64x2ExtendHighI32x4S,
        0xc9 => I64x2ExtendLowI32x4U,
        0xca => I64x2ExtendHighI32x4U,
        0xcb => I64x2Shl,
        0xcc => I64x2ShrS,
        0xcd => I64x2ShrU,
        0xce => I64x2Add,
        0xd1 => I64x2Sub,
        0xd5 => I64x2Mul,
        0xd6 => I64x2Eq,
        0xd7 => I64x2Ne,
        0xd8 => I64x2LtS,
        0xd9 => I64x2GtS,
        0xda => I64x2LeS,
        0xdb => I64x2GeS,
        0xdc => I64x2ExtmulLowI32x4S,
        0xdd => I64x2ExtmulHighI32x4S,
        0xde => I64x2ExtmulLowI32x4U,
        0xdf => I64x2ExtmulHighI32x4U,
        0xe0 => F32x4Abs,
        0xe1 => F32x4Neg,
        0xe3 => F32x4Sqrt,
        0xe4 => F32x4Add,
        0xe5 => F32x4Sub,
        0xe6 => F32x4Mul,
        0xe7 => F32x4Div,
        0xe8 => F32x4Min,
        0xe9 => F32x4Max,
        0xea => F32x4Pmin,
        0xeb => F32x4Pmax,
        0xec => F64x2Abs,
        0xed => F64x2Neg,
        0xef => F64x2Sqrt,
        0xf0 => F64x2Add,
        0xf1 => F64x2Sub,
        0xf2 => F64x2Mul,
        0xf3 => F64x2Div,
        0xf4 => F64x2Min,
        0xf5 => F64x2Max,
        0xf6 => F64x2Pmin,
        0xf7 => F64x2Pmax,
        0xf8 => I32x4TruncSatF32x4S,
        0xf9 => I32x4TruncSatF32x4U,
        0xfa => F32x4ConvertI32x4S,
        0xfb => F32x4ConvertI32x4U,
        0xfc => I32x4TruncSatF64x2SZero,
        0xfd => I32x4TruncSatF64x2UZero,
        0xfe => F64x2ConvertLowI32x4S,
        0xff => F64x2ConvertLowI32x4U,
        _ => return None,
    };
    Some(instruction)
}
