//! The instruction set executed by the interpreter.
//!
//! The set is derived from Wasm, with one substantial difference: structured
//! control flow arrives here already *flattened*. Wasm encodes control flow
//! with nested `block`/`loop`/`if` constructs whose branch instructions name
//! a relative nesting depth; executing those directly would force the
//! interpreter to re-discover the matching `end` on every branch. Instead,
//! the decoder records for every structured construct where its continuation
//! lives in the flat instruction list, and the validator then rewrites every
//! branch into a concrete [`Label`] record. At run time a branch is a single
//! value-stack truncation plus a jump.
//!
//! Immediates that the binary format encodes with reserved or alignment
//! bytes (`memory.size`, `call_indirect`, memargs) are decoded into plain
//! argument structs here; the interpreter never re-parses anything.

use crate::types::{BlockType, ValueType};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// A fully resolved branch target.
///
/// `continuation` is the index of the instruction execution resumes at: for
/// a `loop` this is the loop head, for `block`/`if` the instruction after
/// the matching `end`. `arity` is the number of values the branch carries;
/// `height` is the operand stack height at entry to the construct. Taking
/// the branch truncates the stack to `height` while preserving the top
/// `arity` values, then jumps to `continuation`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub continuation: u32,
    pub arity: u32,
    pub height: u32,
}

/// Argument of `br`/`br_if` and each `br_table` entry.
///
/// The decoder produces the relative `Depth` form straight from the binary;
/// the validator resolves every occurrence to a `Label`. The interpreter
/// only ever observes the resolved form.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchTarget {
    /// Relative label depth as encoded in the binary.
    Depth(u32),
    /// Resolved target, rewritten in place by the validator.
    Resolved(Label),
}

impl BranchTarget {
    /// The resolved label of this target.
    ///
    /// # Panics
    ///
    /// Panics if the target was never resolved; validation rewrites every
    /// branch before a module becomes executable.
    pub fn label(&self) -> Label {
        match *self {
            BranchTarget::Resolved(label) => label,
            BranchTarget::Depth(_) => {
                panic!("branch target not resolved; validation rewrites every branch")
            }
        }
    }

    pub fn depth(&self) -> Option<u32> {
        match *self {
            BranchTarget::Depth(depth) => Some(depth),
            BranchTarget::Resolved(_) => None,
        }
    }
}

/// `br_table` payload: a list of targets plus the default target.
#[derive(Clone, Debug, PartialEq)]
pub struct BrTableData {
    pub targets: Vec<BranchTarget>,
    pub default: BranchTarget,
}

/// Metadata of a `block` or `loop` instruction.
///
/// The label's continuation and arity are filled by the decoder (blocks at
/// the matching `end`, loops immediately); the entry stack height is filled
/// by the validator. At run time the instruction itself is a no-op.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockControl {
    pub block_type: BlockType,
    pub label: Label,
}

/// Metadata of an `if` instruction.
///
/// `else_location` is the index of the `else` instruction when present.
/// A falsy condition jumps behind the `else` marker, or to the end
/// continuation when there is no else arm.
#[derive(Clone, Debug, PartialEq)]
pub struct IfControl {
    pub block_type: BlockType,
    pub end_label: Label,
    pub else_location: Option<u32>,
}

/// Memory access immediate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemArg {
    /// Alignment exponent; `2^align` must not exceed the access width.
    pub align: u32,
    /// Static byte offset added to the dynamic address.
    pub offset: u64,
    /// Index of the accessed memory.
    pub memory_index: u32,
}

/// Memory access immediate plus a lane index (SIMD load/store lane).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LaneMemArg {
    pub memarg: MemArg,
    pub lane: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Unreachable,
    Nop,
    Block(BlockControl),
    Loop(BlockControl),
    If(IfControl),
    /// Reached only by falling off the then-arm; jumps to the end label.
    Else(Label),
    End,
    Br(BranchTarget),
    BrIf(BranchTarget),
    BrTable(Box<BrTableData>),
    Return,
    Call(u32),
    CallIndirect {
        type_index: u32,
        table_index: u32,
    },

    Drop,
    Select,
    TypedSelect(ValueType),

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    TableGet(u32),
    TableSet(u32),

    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),

    MemorySize(u32),
    MemoryGrow(u32),

    I32Const(i32),
    I64Const(i64),
    /// Raw IEEE-754 bit pattern.
    F32Const(u32),
    /// Raw IEEE-754 bit pattern.
    F64Const(u64),

    RefNull(ValueType),
    RefIsNull,
    RefFunc(u32),

    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,

    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    MemoryInit {
        data_index: u32,
        memory_index: u32,
    },
    DataDrop(u32),
    MemoryCopy {
        dst_index: u32,
        src_index: u32,
    },
    MemoryFill(u32),
    TableInit {
        elem_index: u32,
        table_index: u32,
    },
    ElemDrop(u32),
    TableCopy {
        dst_index: u32,
        src_index: u32,
    },
    TableGrow(u32),
    TableSize(u32),
    TableFill(u32),

    V128Load(MemArg),
    V128Load8x8S(MemArg),
    V128Load8x8U(MemArg),
    V128Load16x4S(MemArg),
    V128Load16x4U(MemArg),
    V128Load32x2S(MemArg),
    V128Load32x2U(MemArg),
    V128Load8Splat(MemArg),
    V128Load16Splat(MemArg),
    V128Load32Splat(MemArg),
    V128Load64Splat(MemArg),
    V128Store(MemArg),
    V128Const([u8; 16]),
    I8x16Shuffle([u8; 16]),
    I8x16Swizzle,
    I8x16Splat,
    I16x8Splat,
    I32x4Splat,
    I64x2Splat,
    F32x4Splat,
    F64x2Splat,
    I8x16ExtractLaneS(u8),
    I8x16ExtractLaneU(u8),
    I8x16ReplaceLane(u8),
    I16x8ExtractLaneS(u8),
    I16x8ExtractLaneU(u8),
    I16x8ReplaceLane(u8),
    I32x4ExtractLane(u8),
    I32x4ReplaceLane(u8),
    I64x2ExtractLane(u8),
    I64x2ReplaceLane(u8),
    F32x4ExtractLane(u8),
    F32x4ReplaceLane(u8),
    F64x2ExtractLane(u8),
    F64x2ReplaceLane(u8),
    I8x16Eq,
    I8x16Ne,
    I8x16LtS,
    I8x16LtU,
    I8x16GtS,
    I8x16GtU,
    I8x16LeS,
    I8x16LeU,
    I8x16GeS,
    I8x16GeU,
    I16x8Eq,
    I16x8Ne,
    I16x8LtS,
    I16x8LtU,
    I16x8GtS,
    I16x8GtU,
    I16x8LeS,
    I16x8LeU,
    I16x8GeS,
    I16x8GeU,
    I32x4Eq,
    I32x4Ne,
    I32x4LtS,
    I32x4LtU,
    I32x4GtS,
    I32x4GtU,
    I32x4LeS,
    I32x4LeU,
    I32x4GeS,
    I32x4GeU,
    I64x2Eq,
    I64x2Ne,
    I64x2LtS,
    I64x2GtS,
    I64x2LeS,
    I64x2GeS,
    F32x4Eq,
    F32x4Ne,
    F32x4Lt,
    F32x4Gt,
    F32x4Le,
    F32x4Ge,
    F64x2Eq,
    F64x2Ne,
    F64x2Lt,
    F64x2Gt,
    F64x2Le,
    F64x2Ge,
    V128Not,
    V128And,
    V128AndNot,
    V128Or,
    V128Xor,
    V128Bitselect,
    V128AnyTrue,
    V128Load8Lane(LaneMemArg),
    V128Load16Lane(LaneMemArg),
    V128Load32Lane(LaneMemArg),
    V128Load64Lane(LaneMemArg),
    V128Store8Lane(LaneMemArg),
    V128Store16Lane(LaneMemArg),
    V128Store32Lane(LaneMemArg),
    V128Store64Lane(LaneMemArg),
    V128Load32Zero(MemArg),
    V128Load64Zero(MemArg),
    F32x4DemoteF64x2Zero,
    F64x2PromoteLowF32x4,
    I8x16Abs,
    I8x16Neg,
    I8x16Popcnt,
    I8x16AllTrue,
    I8x16Bitmask,
    I8x16NarrowI16x8S,
    I8x16NarrowI16x8U,
    F32x4Ceil,
    F32x4Floor,
    F32x4Trunc,
    F32x4Nearest,
    I8x16Shl,
    I8x16ShrS,
    I8x16ShrU,
    I8x16Add,
    I8x16AddSatS,
    I8x16AddSatU,
    I8x16Sub,
    I8x16SubSatS,
    I8x16SubSatU,
    F64x2Ceil,
    F64x2Floor,
    I8x16MinS,
    I8x16MinU,
    I8x16MaxS,
    I8x16MaxU,
    F64x2Trunc,
    I8x16AvgrU,
    I16x8ExtaddPairwiseI8x16S,
    I16x8ExtaddPairwiseI8x16U,
    I32x4ExtaddPairwiseI16x8S,
    I32x4ExtaddPairwiseI16x8U,
    I16x8Abs,
    I16x8Neg,
    I16x8Q15MulrSatS,
    I16x8AllTrue,
    I16x8Bitmask,
    I16x8NarrowI32x4S,
    I16x8NarrowI32x4U,
    I16x8ExtendLowI8x16S,
    I16x8ExtendHighI8x16S,
    I16x8ExtendLowI8x16U,
    I16x8ExtendHighI8x16U,
    I16x8Shl,
    I16x8ShrS,
    I16x8ShrU,
    I16x8Add,
    I16x8AddSatS,
    I16x8AddSatU,
    I16x8Sub,
    I16x8SubSatS,
    I16x8SubSatU,
    F64x2Nearest,
    I16x8Mul,
    I16x8MinS,
    I16x8MinU,
    I16x8MaxS,
    I16x8MaxU,
    I16x8AvgrU,
    I16x8ExtmulLowI8x16S,
    I16x8ExtmulHighI8x16S,
    I16x8ExtmulLowI8x16U,
    I16x8ExtmulHighI8x16U,
    I32x4Abs,
    I32x4Neg,
    I32x4AllTrue,
    I32x4Bitmask,
    I32x4ExtendLowI16x8S,
    I32x4ExtendHighI16x8S,
    I32x4ExtendLowI16x8U,
    I32x4ExtendHighI16x8U,
    I32x4Shl,
    I32x4ShrS,
    I32x4ShrU,
    I32x4Add,
    I32x4Sub,
    I32x4Mul,
    I32x4MinS,
    I32x4MinU,
    I32x4MaxS,
    I32x4MaxU,
    I32x4DotI16x8S,
    I32x4ExtmulLowI16x8S,
    I32x4ExtmulHighI16x8S,
    I32x4ExtmulLowI16x8U,
    I32x4ExtmulHighI16x8U,
    I64x2Abs,
    I64x2Neg,
    I64x2AllTrue,
    I64x2Bitmask,
    I64x2ExtendLowI32x4S,
    I64x2ExtendHighI32x4S,
    I64x2ExtendLowI32x4U,
    I64x2ExtendHighI32x4U,
    I64x2Shl,
    I64x2ShrS,
    I64x2ShrU,
    I64x2Add,
    I64x2Sub,
    I64x2Mul,
    I64x2ExtmulLowI32x4S,
    I64x2ExtmulHighI32x4S,
    I64x2ExtmulLowI32x4U,
    I64x2ExtmulHighI32x4U,
    F32x4Abs,
    F32x4Neg,
    F32x4Sqrt,
    F32x4Add,
    F32x4Sub,
    F32x4Mul,
    F32x4Div,
    F32x4Min,
    F32x4Max,
    F32x4Pmin,
    F32x4Pmax,
    F64x2Abs,
    F64x2Neg,
    F64x2Sqrt,
    F64x2Add,
    F64x2Sub,
    F64x2Mul,
    F64x2Div,
    F64x2Min,
    F64x2Max,
    F64x2Pmin,
    F64x2Pmax,
    I32x4TruncSatF32x4S,
    I32x4TruncSatF32x4U,
    F32x4ConvertI32x4S,
    F32x4ConvertI32x4U,
    I32x4TruncSatF64x2SZero,
    I32x4TruncSatF64x2UZero,
    F64x2ConvertLowI32x4S,
    F64x2ConvertLowI32x4U,
}

/// A function body as a flat list of instructions.
#[derive(Debug, Clone)]
pub struct Instructions {
    vec: Vec<Instruction>,
}

impl Instructions {
    pub fn new(vec: Vec<Instruction>) -> Self {
        Instructions { vec }
    }

    pub fn len(&self) -> u32 {
        self.vec.len() as u32
    }

    pub fn get(&self, pc: u32) -> Option<&Instruction> {
        self.vec.get(pc as usize)
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.vec
    }

    pub fn as_mut_slice(&mut self) -> &mut [Instruction] {
        &mut self.vec
    }

    pub fn iterate_from(&self, position: u32) -> InstructionIter {
        InstructionIter {
            instructions: &self.vec,
            position,
        }
    }
}

pub struct InstructionIter<'a> {
    instructions: &'a [Instruction],
    position: u32,
}

impl<'a> InstructionIter<'a> {
    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = &'a Instruction;

    #[inline]
    fn next(&mut self) -> Option<<Self as Iterator>::Item> {
        self.instructions
            .get(self.position as usize)
            .map(|instruction| {
                self.position += 1;
                instruction
            })
    }
}
