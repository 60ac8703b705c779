use super::ModuleContext;
use crate::isa::{BrTableData, BranchTarget, Instruction, Label};
use crate::module::FuncBody;
use crate::types::{BlockType, Signature, ValueType};
use crate::Error;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

/// Value type on the validator's stack.
///
/// `Any` appears only in unreachable code and compares equal to every
/// concrete type.
#[derive(Debug, Clone, Copy)]
enum StackValueType {
    /// Any value type.
    Any,
    /// Concrete value type.
    Specific(ValueType),
}

impl StackValueType {
    fn is_any(&self) -> bool {
        matches!(self, StackValueType::Any)
    }

    fn value_type(&self) -> ValueType {
        match *self {
            StackValueType::Any => unreachable!("must be checked by caller"),
            StackValueType::Specific(value_type) => value_type,
        }
    }
}

impl From<ValueType> for StackValueType {
    fn from(value_type: ValueType) -> Self {
        StackValueType::Specific(value_type)
    }
}

impl PartialEq<StackValueType> for StackValueType {
    fn eq(&self, other: &StackValueType) -> bool {
        if self.is_any() || other.is_any() {
            true
        } else {
            self.value_type() == other.value_type()
        }
    }
}

impl PartialEq<ValueType> for StackValueType {
    fn eq(&self, other: &ValueType) -> bool {
        if self.is_any() {
            true
        } else {
            self.value_type() == *other
        }
    }
}

/// Kind of a control frame.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    /// The implicit function-body block.
    Entry,
    Block,
    Loop,
    /// The then-arm of an `if` with no `else` seen yet.
    If,
    /// The else-arm of an `if`.
    IfAfterElse,
}

/// Control frame of the validator.
#[derive(Debug, Clone)]
struct ControlFrame {
    kind: FrameKind,
    param_types: Vec<ValueType>,
    result_types: Vec<ValueType>,
    /// Value stack height at entry (params excluded); `pop` cannot go below
    /// this unless the frame is unreachable.
    height: usize,
    /// Whether an instruction that never passes control further (e.g.
    /// `unreachable`, `br`) was seen; makes the stack polymorphic.
    unreachable: bool,
    /// Branch target of this frame, rewritten into branch instructions.
    label: Label,
}

impl ControlFrame {
    /// Types a branch to this frame carries: params for a loop, results
    /// otherwise.
    fn branch_types(&self) -> &[ValueType] {
        if self.kind == FrameKind::Loop {
            &self.param_types
        } else {
            &self.result_types
        }
    }
}

/// Single-pass type checker of one function body.
///
/// Alongside checking, it rewrites every branch argument to a resolved
/// [`Label`] and fills in the entry stack heights of the structured-control
/// labels the decoder produced.
pub(super) struct FunctionValidator<'a> {
    context: &'a ModuleContext<'a>,
    locals: Vec<ValueType>,
    value_stack: Vec<StackValueType>,
    frame_stack: Vec<ControlFrame>,
    results: Vec<ValueType>,
}

impl<'a> FunctionValidator<'a> {
    pub(super) fn validate(
        context: &'a ModuleContext<'a>,
        signature: &Signature,
        body: &mut FuncBody,
    ) -> Result<(), Error> {
        let mut locals: Vec<ValueType> = signature.params().to_vec();
        for &(count, value_type) in &body.locals {
            for _ in 0..count {
                locals.push(value_type);
            }
        }

        let mut validator = FunctionValidator {
            context,
            locals,
            value_stack: Vec::new(),
            frame_stack: Vec::new(),
            results: signature.results().to_vec(),
        };

        let code = body.code.as_mut_slice();
        validator.frame_stack.push(ControlFrame {
            kind: FrameKind::Entry,
            param_types: Vec::new(),
            result_types: validator.results.clone(),
            height: 0,
            unreachable: false,
            label: Label {
                continuation: code.len() as u32,
                arity: validator.results.len() as u32,
                height: 0,
            },
        });

        for pc in 0..code.len() {
            validator.validate_instruction(code, pc)?;
        }

        if !validator.frame_stack.is_empty() {
            return Err(Error::Validation(
                "function body is not terminated by `end`".into(),
            ));
        }
        Ok(())
    }

    fn push_value(&mut self, value_type: StackValueType) {
        self.value_stack.push(value_type);
    }

    fn pop_value(&mut self) -> Result<StackValueType, Error> {
        let frame = self
            .frame_stack
            .last()
            .expect("validated instructions are inside at least the entry frame");
        if self.value_stack.len() == frame.height {
            if frame.unreachable {
                return Ok(StackValueType::Any);
            }
            return Err(Error::Validation("tried to pop an empty stack".into()));
        }
        self.value_stack
            .pop()
            .ok_or_else(|| Error::Validation("tried to pop an empty stack".into()))
    }

    fn expect_value(&mut self, expected: ValueType) -> Result<StackValueType, Error> {
        let actual = self.pop_value()?;
        if actual != expected {
            return Err(Error::Validation(format!(
                "expected {} on the stack, found {:?}",
                expected, actual
            )));
        }
        Ok(actual)
    }

    fn expect_values(&mut self, expected: &[ValueType]) -> Result<(), Error> {
        for &value_type in expected.iter().rev() {
            self.expect_value(value_type)?;
        }
        Ok(())
    }

    /// Checks the expected types without consuming them: pops and pushes
    /// back exactly what was popped, so polymorphic entries survive in
    /// unreachable code.
    fn peek_values(&mut self, expected: &[ValueType]) -> Result<(), Error> {
        let mut popped = Vec::with_capacity(expected.len());
        for &value_type in expected.iter().rev() {
            popped.push(self.expect_value(value_type)?);
        }
        for value in popped.into_iter().rev() {
            self.push_value(value);
        }
        Ok(())
    }

    fn push_values(&mut self, types: &[ValueType]) {
        for &value_type in types {
            self.push_value(value_type.into());
        }
    }

    /// Marks the current frame polymorphic after an instruction that never
    /// passes control further.
    fn make_unreachable(&mut self) {
        let frame = self
            .frame_stack
            .last_mut()
            .expect("validated instructions are inside at least the entry frame");
        frame.unreachable = true;
        let height = frame.height;
        self.value_stack.truncate(height);
    }

    fn frame(&self, depth: u32) -> Result<&ControlFrame, Error> {
        let len = self.frame_stack.len();
        if (depth as usize) >= len {
            return Err(Error::Validation(format!(
                "label depth {} exceeds control stack of {} frames",
                depth, len
            )));
        }
        Ok(&self.frame_stack[len - 1 - depth as usize])
    }

    fn block_signature(&self, block_type: BlockType) -> Result<(Vec<ValueType>, Vec<ValueType>), Error> {
        match block_type {
            BlockType::Empty => Ok((Vec::new(), Vec::new())),
            BlockType::Value(value_type) => Ok((Vec::new(), alloc::vec![value_type])),
            BlockType::TypeIndex(index) => {
                let signature = self.context.require_type(index)?;
                Ok((signature.params().to_vec(), signature.results().to_vec()))
            }
        }
    }

    fn validate_instruction(&mut self, code: &mut [Instruction], pc: usize) -> Result<(), Error> {
        use self::Instruction::*;

        // Taking the instruction apart up front keeps the borrow on `code`
        // short; branch rewriting writes the resolved form back at the end
        // of the arm.
        match code[pc].clone() {
            Unreachable => self.make_unreachable(),
            Nop => {}

            Block(mut control) => {
                let (params, results) = self.block_signature(control.block_type)?;
                let arity = results.len() as u32;
                self.expect_values(&params)?;
                let height = self.value_stack.len();
                let label = Label {
                    continuation: control.label.continuation,
                    arity,
                    height: height as u32,
                };
                control.label = label;
                code[pc] = Block(control);
                self.frame_stack.push(ControlFrame {
                    kind: FrameKind::Block,
                    param_types: params.clone(),
                    result_types: results,
                    height,
                    unreachable: false,
                    label,
                });
                self.push_values(&params);
            }
            Loop(mut control) => {
                let (params, results) = self.block_signature(control.block_type)?;
                let arity = params.len() as u32;
                self.expect_values(&params)?;
                let height = self.value_stack.len();
                let label = Label {
                    continuation: control.label.continuation,
                    arity,
                    height: height as u32,
                };
                control.label = label;
                code[pc] = Loop(control);
                self.frame_stack.push(ControlFrame {
                    kind: FrameKind::Loop,
                    param_types: params.clone(),
                    result_types: results,
                    height,
                    unreachable: false,
                    label,
                });
                self.push_values(&params);
            }
            If(mut control) => {
                let (params, results) = self.block_signature(control.block_type)?;
                let arity = results.len() as u32;
                self.expect_value(ValueType::I32)?;
                self.expect_values(&params)?;
                let height = self.value_stack.len();
                let label = Label {
                    continuation: control.end_label.continuation,
                    arity,
                    height: height as u32,
                };
                control.end_label = label;
                code[pc] = If(control);
                self.frame_stack.push(ControlFrame {
                    kind: FrameKind::If,
                    param_types: params.clone(),
                    result_types: results,
                    height,
                    unreachable: false,
                    label,
                });
                self.push_values(&params);
            }
            Else(_) => {
                let frame = self
                    .frame_stack
                    .last()
                    .cloned()
                    .filter(|frame| frame.kind == FrameKind::If)
                    .ok_or_else(|| Error::Validation("misplaced else instruction".into()))?;

                self.expect_values(&frame.result_types)?;
                if self.value_stack.len() != frame.height {
                    return Err(Error::Validation(format!(
                        "unexpected stack height {} at else, expected {}",
                        self.value_stack.len(),
                        frame.height
                    )));
                }

                code[pc] = Else(frame.label);

                let top = self
                    .frame_stack
                    .last_mut()
                    .expect("checked to be an if frame above");
                top.kind = FrameKind::IfAfterElse;
                top.unreachable = false;
                let params = top.param_types.clone();
                self.push_values(&params);
            }
            End => {
                let frame = self
                    .frame_stack
                    .last()
                    .cloned()
                    .expect("every end matches a frame due to decoding");

                // An `if` with no `else` must have matching params and
                // results, since the empty else-arm passes params through.
                if frame.kind == FrameKind::If && frame.param_types != frame.result_types {
                    return Err(Error::Validation(
                        "if without else must have matching params and results".into(),
                    ));
                }

                self.expect_values(&frame.result_types)?;
                if self.value_stack.len() != frame.height {
                    return Err(Error::Validation(format!(
                        "unexpected stack height {} at end, expected {}",
                        self.value_stack.len(),
                        frame.height
                    )));
                }

                self.frame_stack.pop();
                self.push_values(&frame.result_types);
            }

            Br(target) => {
                let depth = target
                    .depth()
                    .expect("branches arrive depth-encoded from the decoder");
                let frame = self.frame(depth)?.clone();
                self.expect_values(frame.branch_types())?;
                code[pc] = Br(BranchTarget::Resolved(frame.label));
                self.make_unreachable();
            }
            BrIf(target) => {
                let depth = target
                    .depth()
                    .expect("branches arrive depth-encoded from the decoder");
                self.expect_value(ValueType::I32)?;
                let frame = self.frame(depth)?.clone();
                self.peek_values(frame.branch_types())?;
                code[pc] = BrIf(BranchTarget::Resolved(frame.label));
            }
            BrTable(data) => {
                self.expect_value(ValueType::I32)?;

                let default_depth = data
                    .default
                    .depth()
                    .expect("branches arrive depth-encoded from the decoder");
                let default_frame = self.frame(default_depth)?.clone();
                let default_types = default_frame.branch_types().to_vec();

                let mut resolved = Vec::with_capacity(data.targets.len());
                for target in &data.targets {
                    let depth = target
                        .depth()
                        .expect("branches arrive depth-encoded from the decoder");
                    let frame = self.frame(depth)?.clone();
                    if frame.branch_types().len() != default_types.len() {
                        return Err(Error::Validation(
                            "br_table targets disagree on arity".into(),
                        ));
                    }
                    self.peek_values(frame.branch_types())?;
                    resolved.push(BranchTarget::Resolved(frame.label));
                }

                self.expect_values(&default_types)?;
                code[pc] = BrTable(Box::new(BrTableData {
                    targets: resolved,
                    default: BranchTarget::Resolved(default_frame.label),
                }));
                self.make_unreachable();
            }
            Return => {
                let results = self.results.clone();
                self.expect_values(&results)?;
                self.make_unreachable();
            }

            Call(index) => {
                let signature = self.context.require_function(index)?.clone();
                self.expect_values(signature.params())?;
                self.push_values(signature.results());
            }
            CallIndirect {
                type_index,
                table_index,
            } => {
                let table = self.context.require_table(table_index)?;
                if table.elem_type != ValueType::FuncRef {
                    return Err(Error::Validation(format!(
                        "call_indirect needs a funcref table, table {} holds {}",
                        table_index, table.elem_type
                    )));
                }
                let address_type = table.address_type.value_type();
                let signature = self.context.require_type(type_index)?.clone();
                self.expect_value(address_type)?;
                self.expect_values(signature.params())?;
                self.push_values(signature.results());
            }

            Drop => {
                self.pop_value()?;
            }
            Select => {
                self.expect_value(ValueType::I32)?;
                let a = self.pop_value()?;
                let b = self.pop_value()?;
                if a != b {
                    return Err(Error::Validation(
                        "select operands must have the same type".into(),
                    ));
                }
                for operand in [a, b] {
                    if let StackValueType::Specific(value_type) = operand {
                        if value_type.is_ref() {
                            return Err(Error::Validation(
                                "untyped select cannot pick between references".into(),
                            ));
                        }
                    }
                }
                self.push_value(if a.is_any() { b } else { a });
            }
            TypedSelect(value_type) => {
                self.expect_value(ValueType::I32)?;
                self.expect_value(value_type)?;
                self.expect_value(value_type)?;
                self.push_value(value_type.into());
            }

            LocalGet(index) => {
                let local = self.require_local(index)?;
                self.push_value(local.into());
            }
            LocalSet(index) => {
                let local = self.require_local(index)?;
                self.expect_value(local)?;
            }
            LocalTee(index) => {
                let local = self.require_local(index)?;
                self.expect_value(local)?;
                self.push_value(local.into());
            }
            GlobalGet(index) => {
                let (global, _) = self.context.require_global(index)?;
                self.push_value(global.content_type.into());
            }
            GlobalSet(index) => {
                let (global, _) = self.context.require_global(index)?;
                if global.mutability != crate::module::Mutability::Variable {
                    return Err(Error::Validation(format!(
                        "global {} is immutable",
                        index
                    )));
                }
                let content_type = global.content_type;
                self.expect_value(content_type)?;
            }

            TableGet(index) => {
                let table = self.context.require_table(index)?;
                let (address, elem) = (table.address_type.value_type(), table.elem_type);
                self.expect_value(address)?;
                self.push_value(elem.into());
            }
            TableSet(index) => {
                let table = self.context.require_table(index)?;
                let (address, elem) = (table.address_type.value_type(), table.elem_type);
                self.expect_value(elem)?;
                self.expect_value(address)?;
            }

            I32Load(memarg) => self.validate_load(memarg, 4, ValueType::I32)?,
            I64Load(memarg) => self.validate_load(memarg, 8, ValueType::I64)?,
            F32Load(memarg) => self.validate_load(memarg, 4, ValueType::F32)?,
            F64Load(memarg) => self.validate_load(memarg, 8, ValueType::F64)?,
            I32Load8S(memarg) | I32Load8U(memarg) => {
                self.validate_load(memarg, 1, ValueType::I32)?
            }
            I32Load16S(memarg) | I32Load16U(memarg) => {
                self.validate_load(memarg, 2, ValueType::I32)?
            }
            I64Load8S(memarg) | I64Load8U(memarg) => {
                self.validate_load(memarg, 1, ValueType::I64)?
            }
            I64Load16S(memarg) | I64Load16U(memarg) => {
                self.validate_load(memarg, 2, ValueType::I64)?
            }
            I64Load32S(memarg) | I64Load32U(memarg) => {
                self.validate_load(memarg, 4, ValueType::I64)?
            }
            I32Store(memarg) => self.validate_store(memarg, 4, ValueType::I32)?,
            I64Store(memarg) => self.validate_store(memarg, 8, ValueType::I64)?,
            F32Store(memarg) => self.validate_store(memarg, 4, ValueType::F32)?,
            F64Store(memarg) => self.validate_store(memarg, 8, ValueType::F64)?,
            I32Store8(memarg) => self.validate_store(memarg, 1, ValueType::I32)?,
            I32Store16(memarg) => self.validate_store(memarg, 2, ValueType::I32)?,
            I64Store8(memarg) => self.validate_store(memarg, 1, ValueType::I64)?,
            I64Store16(memarg) => self.validate_store(memarg, 2, ValueType::I64)?,
            I64Store32(memarg) => self.validate_store(memarg, 4, ValueType::I64)?,

            MemorySize(index) => {
                let memory = self.context.require_memory(index)?;
                self.push_value(memory.address_type.value_type().into());
            }
            MemoryGrow(index) => {
                let memory = self.context.require_memory(index)?;
                let address = memory.address_type.value_type();
                self.expect_value(address)?;
                self.push_value(address.into());
            }

            I32Const(_) => self.push_value(ValueType::I32.into()),
            I64Const(_) => self.push_value(ValueType::I64.into()),
            F32Const(_) => self.push_value(ValueType::F32.into()),
            F64Const(_) => self.push_value(ValueType::F64.into()),
            V128Const(_) => self.push_value(ValueType::V128.into()),

            RefNull(value_type) => self.push_value(value_type.into()),
            RefIsNull => {
                let value = self.pop_value()?;
                if let StackValueType::Specific(value_type) = value {
                    if !value_type.is_ref() {
                        return Err(Error::Validation(format!(
                            "ref.is_null needs a reference, found {}",
                            value_type
                        )));
                    }
                }
                self.push_value(ValueType::I32.into());
            }
            RefFunc(index) => {
                self.context.require_declared_function(index)?;
                self.push_value(ValueType::FuncRef.into());
            }

            // i32 operators
            I32Eqz => self.validate_testop(ValueType::I32)?,
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU => self.validate_relop(ValueType::I32)?,
            I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S => {
                self.validate_unop(ValueType::I32)?
            }
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => {
                self.validate_binop(ValueType::I32)?
            }

            // i64 operators
            I64Eqz => self.validate_testop(ValueType::I64)?,
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS
            | I64GeU => self.validate_relop(ValueType::I64)?,
            I64Clz | I64Ctz | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S => {
                self.validate_unop(ValueType::I64)?
            }
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => {
                self.validate_binop(ValueType::I64)?
            }

            // f32 operators
            F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => self.validate_relop(ValueType::F32)?,
            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => {
                self.validate_unop(ValueType::F32)?
            }
            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => {
                self.validate_binop(ValueType::F32)?
            }

            // f64 operators
            F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => self.validate_relop(ValueType::F64)?,
            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => {
                self.validate_unop(ValueType::F64)?
            }
            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => {
                self.validate_binop(ValueType::F64)?
            }

            // conversions
            I32WrapI64 => self.validate_cvtop(ValueType::I64, ValueType::I32)?,
            I32TruncF32S | I32TruncF32U | I32TruncSatF32S | I32TruncSatF32U => {
                self.validate_cvtop(ValueType::F32, ValueType::I32)?
            }
            I32TruncF64S | I32TruncF64U | I32TruncSatF64S | I32TruncSatF64U => {
                self.validate_cvtop(ValueType::F64, ValueType::I32)?
            }
            I64ExtendI32S | I64ExtendI32U => self.validate_cvtop(ValueType::I32, ValueType::I64)?,
            I64TruncF32S | I64TruncF32U | I64TruncSatF32S | I64TruncSatF32U => {
                self.validate_cvtop(ValueType::F32, ValueType::I64)?
            }
            I64TruncF64S | I64TruncF64U | I64TruncSatF64S | I64TruncSatF64U => {
                self.validate_cvtop(ValueType::F64, ValueType::I64)?
            }
            F32ConvertI32S | F32ConvertI32U => {
                self.validate_cvtop(ValueType::I32, ValueType::F32)?
            }
            F32ConvertI64S | F32ConvertI64U => {
                self.validate_cvtop(ValueType::I64, ValueType::F32)?
            }
            F32DemoteF64 => self.validate_cvtop(ValueType::F64, ValueType::F32)?,
            F64ConvertI32S | F64ConvertI32U => {
                self.validate_cvtop(ValueType::I32, ValueType::F64)?
            }
            F64ConvertI64S | F64ConvertI64U => {
                self.validate_cvtop(ValueType::I64, ValueType::F64)?
            }
            F64PromoteF32 => self.validate_cvtop(ValueType::F32, ValueType::F64)?,
            I32ReinterpretF32 => self.validate_cvtop(ValueType::F32, ValueType::I32)?,
            I64ReinterpretF64 => self.validate_cvtop(ValueType::F64, ValueType::I64)?,
            F32ReinterpretI32 => self.validate_cvtop(ValueType::I32, ValueType::F32)?,
            F64ReinterpretI64 => self.validate_cvtop(ValueType::I64, ValueType::F64)?,

            // bulk memory and table instructions
            MemoryInit {
                data_index,
                memory_index,
            } => {
                let memory = self.context.require_memory(memory_index)?;
                let address = memory.address_type.value_type();
                self.context.require_data_segment(data_index)?;
                self.expect_value(ValueType::I32)?;
                self.expect_value(ValueType::I32)?;
                self.expect_value(address)?;
            }
            DataDrop(data_index) => {
                self.context.require_data_segment(data_index)?;
            }
            MemoryCopy {
                dst_index,
                src_index,
            } => {
                let dst = self.context.require_memory(dst_index)?;
                let src = self.context.require_memory(src_index)?;
                let (dst_addr, src_addr) =
                    (dst.address_type.value_type(), src.address_type.value_type());
                let len_type = if dst_addr == ValueType::I32 || src_addr == ValueType::I32 {
                    ValueType::I32
                } else {
                    ValueType::I64
                };
                self.expect_value(len_type)?;
                self.expect_value(src_addr)?;
                self.expect_value(dst_addr)?;
            }
            MemoryFill(index) => {
                let memory = self.context.require_memory(index)?;
                let address = memory.address_type.value_type();
                self.expect_value(address)?;
                self.expect_value(ValueType::I32)?;
                self.expect_value(address)?;
            }
            TableInit {
                elem_index,
                table_index,
            } => {
                let table = self.context.require_table(table_index)?;
                let (address, table_elem_type) =
                    (table.address_type.value_type(), table.elem_type);
                let segment = self.context.require_element_segment(elem_index)?;
                if segment.elem_type != table_elem_type {
                    return Err(Error::Validation(format!(
                        "table.init of a {} segment into a {} table",
                        segment.elem_type, table_elem_type
                    )));
                }
                self.expect_value(ValueType::I32)?;
                self.expect_value(ValueType::I32)?;
                self.expect_value(address)?;
            }
            ElemDrop(elem_index) => {
                self.context.require_element_segment(elem_index)?;
            }
            TableCopy {
                dst_index,
                src_index,
            } => {
                let dst = self.context.require_table(dst_index)?;
                let src = self.context.require_table(src_index)?;
                if dst.elem_type != src.elem_type {
                    return Err(Error::Validation(format!(
                        "table.copy between a {} and a {} table",
                        src.elem_type, dst.elem_type
                    )));
                }
                let (dst_addr, src_addr) =
                    (dst.address_type.value_type(), src.address_type.value_type());
                let len_type = if dst_addr == ValueType::I32 || src_addr == ValueType::I32 {
                    ValueType::I32
                } else {
                    ValueType::I64
                };
                self.expect_value(len_type)?;
                self.expect_value(src_addr)?;
                self.expect_value(dst_addr)?;
            }
            TableGrow(index) => {
                let table = self.context.require_table(index)?;
                let (address, elem) = (table.address_type.value_type(), table.elem_type);
                self.expect_value(address)?;
                self.expect_value(elem)?;
                self.push_value(address.into());
            }
            TableSize(index) => {
                let table = self.context.require_table(index)?;
                self.push_value(table.address_type.value_type().into());
            }
            TableFill(index) => {
                let table = self.context.require_table(index)?;
                let (address, elem) = (table.address_type.value_type(), table.elem_type);
                self.expect_value(address)?;
                self.expect_value(elem)?;
                self.expect_value(address)?;
            }

            // v128 memory accesses
            V128Load(memarg) => self.validate_load(memarg, 16, ValueType::V128)?,
            V128Load8x8S(memarg) | V128Load8x8U(memarg) | V128Load16x4S(memarg)
            | V128Load16x4U(memarg) | V128Load32x2S(memarg) | V128Load32x2U(memarg)
            | V128Load64Splat(memarg) | V128Load64Zero(memarg) => {
                self.validate_load(memarg, 8, ValueType::V128)?
            }
            V128Load8Splat(memarg) => self.validate_load(memarg, 1, ValueType::V128)?,
            V128Load16Splat(memarg) => self.validate_load(memarg, 2, ValueType::V128)?,
            V128Load32Splat(memarg) | V128Load32Zero(memarg) => {
                self.validate_load(memarg, 4, ValueType::V128)?
            }
            V128Store(memarg) => self.validate_store(memarg, 16, ValueType::V128)?,
            V128Load8Lane(args) => self.validate_lane_load(args, 1)?,
            V128Load16Lane(args) => self.validate_lane_load(args, 2)?,
            V128Load32Lane(args) => self.validate_lane_load(args, 4)?,
            V128Load64Lane(args) => self.validate_lane_load(args, 8)?,
            V128Store8Lane(args) => self.validate_lane_store(args, 1)?,
            V128Store16Lane(args) => self.validate_lane_store(args, 2)?,
            V128Store32Lane(args) => self.validate_lane_store(args, 4)?,
            V128Store64Lane(args) => self.validate_lane_store(args, 8)?,

            I8x16Shuffle(selectors) => {
                for &selector in &selectors {
                    if selector >= 32 {
                        return Err(Error::Validation(format!(
                            "shuffle selector {} out of range",
                            selector
                        )));
                    }
                }
                self.validate_binop(ValueType::V128)?;
            }

            // v128 splats
            I8x16Splat | I16x8Splat | I32x4Splat => {
                self.validate_cvtop(ValueType::I32, ValueType::V128)?
            }
            I64x2Splat => self.validate_cvtop(ValueType::I64, ValueType::V128)?,
            F32x4Splat => self.validate_cvtop(ValueType::F32, ValueType::V128)?,
            F64x2Splat => self.validate_cvtop(ValueType::F64, ValueType::V128)?,

            // v128 lane accesses
            I8x16ExtractLaneS(lane) | I8x16ExtractLaneU(lane) => {
                self.validate_extract_lane(lane, 16, ValueType::I32)?
            }
            I16x8ExtractLaneS(lane) | I16x8ExtractLaneU(lane) => {
                self.validate_extract_lane(lane, 8, ValueType::I32)?
            }
            I32x4ExtractLane(lane) => self.validate_extract_lane(lane, 4, ValueType::I32)?,
            I64x2ExtractLane(lane) => self.validate_extract_lane(lane, 2, ValueType::I64)?,
            F32x4ExtractLane(lane) => self.validate_extract_lane(lane, 4, ValueType::F32)?,
            F64x2ExtractLane(lane) => self.validate_extract_lane(lane, 2, ValueType::F64)?,
            I8x16ReplaceLane(lane) => self.validate_replace_lane(lane, 16, ValueType::I32)?,
            I16x8ReplaceLane(lane) => self.validate_replace_lane(lane, 8, ValueType::I32)?,
            I32x4ReplaceLane(lane) => self.validate_replace_lane(lane, 4, ValueType::I32)?,
            I64x2ReplaceLane(lane) => self.validate_replace_lane(lane, 2, ValueType::I64)?,
            F32x4ReplaceLane(lane) => self.validate_replace_lane(lane, 4, ValueType::F32)?,
            F64x2ReplaceLane(lane) => self.validate_replace_lane(lane, 2, ValueType::F64)?,

            // v128 -> i32 reductions
            V128AnyTrue | I8x16AllTrue | I8x16Bitmask | I16x8AllTrue | I16x8Bitmask
            | I32x4AllTrue | I32x4Bitmask | I64x2AllTrue | I64x2Bitmask => {
                self.validate_cvtop(ValueType::V128, ValueType::I32)?
            }

            // v128 shifts
            I8x16Shl | I8x16ShrS | I8x16ShrU | I16x8Shl | I16x8ShrS | I16x8ShrU | I32x4Shl
            | I32x4ShrS | I32x4ShrU | I64x2Shl | I64x2ShrS | I64x2ShrU => {
                self.expect_value(ValueType::I32)?;
                self.expect_value(ValueType::V128)?;
                self.push_value(ValueType::V128.into());
            }

            V128Bitselect => {
                self.expect_value(ValueType::V128)?;
                self.expect_value(ValueType::V128)?;
                self.expect_value(ValueType::V128)?;
                self.push_value(ValueType::V128.into());
            }

            // the remaining v128 unary operators
            V128Not | I8x16Abs | I8x16Neg | I8x16Popcnt | I16x8Abs | I16x8Neg | I32x4Abs
            | I32x4Neg | I64x2Abs | I64x2Neg | F32x4Abs | F32x4Neg | F32x4Sqrt | F32x4Ceil
            | F32x4Floor | F32x4Trunc | F32x4Nearest | F64x2Abs | F64x2Neg | F64x2Sqrt
            | F64x2Ceil | F64x2Floor | F64x2Trunc | F64x2Nearest | I16x8ExtendLowI8x16S
            | I16x8ExtendHighI8x16S | I16x8ExtendLowI8x16U | I16x8ExtendHighI8x16U
            | I32x4ExtendLowI16x8S | I32x4ExtendHighI16x8S | I32x4ExtendLowI16x8U
            | I32x4ExtendHighI16x8U | I64x2ExtendLowI32x4S | I64x2ExtendHighI32x4S
            | I64x2ExtendLowI32x4U | I64x2ExtendHighI32x4U | I16x8ExtaddPairwiseI8x16S
            | I16x8ExtaddPairwiseI8x16U | I32x4ExtaddPairwiseI16x8S
            | I32x4ExtaddPairwiseI16x8U | I32x4TruncSatF32x4S | I32x4TruncSatF32x4U
            | F32x4ConvertI32x4S | F32x4ConvertI32x4U | I32x4TruncSatF64x2SZero
            | I32x4TruncSatF64x2UZero | F64x2ConvertLowI32x4S | F64x2ConvertLowI32x4U
            | F32x4DemoteF64x2Zero | F64x2PromoteLowF32x4 => {
                self.validate_unop(ValueType::V128)?
            }

            // the remaining v128 binary operators
            I8x16Swizzle | I8x16Eq | I8x16Ne | I8x16LtS | I8x16LtU | I8x16GtS | I8x16GtU
            | I8x16LeS | I8x16LeU | I8x16GeS | I8x16GeU | I16x8Eq | I16x8Ne | I16x8LtS
            | I16x8LtU | I16x8GtS | I16x8GtU | I16x8LeS | I16x8LeU | I16x8GeS | I16x8GeU
            | I32x4Eq | I32x4Ne | I32x4LtS | I32x4LtU | I32x4GtS | I32x4GtU | I32x4LeS
            | I32x4LeU | I32x4GeS | I32x4GeU | I64x2Eq | I64x2Ne | I64x2LtS | I64x2GtS
            | I64x2LeS | I64x2GeS | F32x4Eq | F32x4Ne | F32x4Lt | F32x4Gt | F32x4Le | F32x4Ge
            | F64x2Eq | F64x2Ne | F64x2Lt | F64x2Gt | F64x2Le | F64x2Ge | V128And | V128AndNot
            | V128Or | V128Xor | I8x16NarrowI16x8S | I8x16NarrowI16x8U | I16x8NarrowI32x4S
            | I16x8NarrowI32x4U | I8x16Add | I8x16AddSatS | I8x16AddSatU | I8x16Sub
            | I8x16SubSatS | I8x16SubSatU | I8x16MinS | I8x16MinU | I8x16MaxS | I8x16MaxU
            | I8x16AvgrU | I16x8Add | I16x8AddSatS | I16x8AddSatU | I16x8Sub | I16x8SubSatS
            | I16x8SubSatU | I16x8Mul | I16x8MinS | I16x8MinU | I16x8MaxS | I16x8MaxU
            | I16x8AvgrU | I16x8Q15MulrSatS | I16x8ExtmulLowI8x16S | I16x8ExtmulHighI8x16S
            | I16x8ExtmulLowI8x16U | I16x8ExtmulHighI8x16U | I32x4Add | I32x4Sub | I32x4Mul
            | I32x4MinS | I32x4MinU | I32x4MaxS | I32x4MaxU | I32x4DotI16x8S
            | I32x4ExtmulLowI16x8S | I32x4ExtmulHighI16x8S | I32x4ExtmulLowI16x8U
            | I32x4ExtmulHighI16x8U | I64x2Add | I64x2Sub | I64x2Mul | I64x2ExtmulLowI32x4S
            | I64x2ExtmulHighI32x4S | I64x2ExtmulLowI32x4U | I64x2ExtmulHighI32x4U | F32x4Add
            | F32x4Sub | F32x4Mul | F32x4Div | F32x4Min | F32x4Max | F32x4Pmin | F32x4Pmax
            | F64x2Add | F64x2Sub | F64x2Mul | F64x2Div | F64x2Min | F64x2Max | F64x2Pmin
            | F64x2Pmax => self.validate_binop(ValueType::V128)?,
        }

        Ok(())
    }

    fn require_local(&self, index: u32) -> Result<ValueType, Error> {
        self.locals.get(index as usize).copied().ok_or_else(|| {
            Error::Validation(format!(
                "local {} out of range for function with {} locals",
                index,
                self.locals.len()
            ))
        })
    }

    fn validate_testop(&mut self, value_type: ValueType) -> Result<(), Error> {
        self.expect_value(value_type)?;
        self.push_value(ValueType::I32.into());
        Ok(())
    }

    fn validate_relop(&mut self, value_type: ValueType) -> Result<(), Error> {
        self.expect_value(value_type)?;
        self.expect_value(value_type)?;
        self.push_value(ValueType::I32.into());
        Ok(())
    }

    fn validate_unop(&mut self, value_type: ValueType) -> Result<(), Error> {
        self.expect_value(value_type)?;
        self.push_value(value_type.into());
        Ok(())
    }

    fn validate_binop(&mut self, value_type: ValueType) -> Result<(), Error> {
        self.expect_value(value_type)?;
        self.expect_value(value_type)?;
        self.push_value(value_type.into());
        Ok(())
    }

    fn validate_cvtop(&mut self, from: ValueType, to: ValueType) -> Result<(), Error> {
        self.expect_value(from)?;
        self.push_value(to.into());
        Ok(())
    }

    fn validate_load(
        &mut self,
        memarg: crate::isa::MemArg,
        width: u32,
        value_type: ValueType,
    ) -> Result<(), Error> {
        let memory = self.context.require_memory(memarg.memory_index)?;
        validate_alignment(memarg.align, width)?;
        let address = memory.address_type.value_type();
        self.expect_value(address)?;
        self.push_value(value_type.into());
        Ok(())
    }

    fn validate_store(
        &mut self,
        memarg: crate::isa::MemArg,
        width: u32,
        value_type: ValueType,
    ) -> Result<(), Error> {
        let memory = self.context.require_memory(memarg.memory_index)?;
        validate_alignment(memarg.align, width)?;
        let address = memory.address_type.value_type();
        self.expect_value(value_type)?;
        self.expect_value(address)?;
        Ok(())
    }

    fn validate_lane_load(
        &mut self,
        args: crate::isa::LaneMemArg,
        lane_width: u32,
    ) -> Result<(), Error> {
        let memory = self.context.require_memory(args.memarg.memory_index)?;
        validate_alignment(args.memarg.align, lane_width)?;
        validate_lane(args.lane, 16 / lane_width as u8)?;
        let address = memory.address_type.value_type();
        self.expect_value(ValueType::V128)?;
        self.expect_value(address)?;
        self.push_value(ValueType::V128.into());
        Ok(())
    }

    fn validate_lane_store(
        &mut self,
        args: crate::isa::LaneMemArg,
        lane_width: u32,
    ) -> Result<(), Error> {
        let memory = self.context.require_memory(args.memarg.memory_index)?;
        validate_alignment(args.memarg.align, lane_width)?;
        validate_lane(args.lane, 16 / lane_width as u8)?;
        let address = memory.address_type.value_type();
        self.expect_value(ValueType::V128)?;
        self.expect_value(address)?;
        Ok(())
    }

    fn validate_extract_lane(
        &mut self,
        lane: u8,
        lane_count: u8,
        value_type: ValueType,
    ) -> Result<(), Error> {
        validate_lane(lane, lane_count)?;
        self.expect_value(ValueType::V128)?;
        self.push_value(value_type.into());
        Ok(())
    }

    fn validate_replace_lane(
        &mut self,
        lane: u8,
        lane_count: u8,
        value_type: ValueType,
    ) -> Result<(), Error> {
        validate_lane(lane, lane_count)?;
        self.expect_value(value_type)?;
        self.expect_value(ValueType::V128)?;
        self.push_value(ValueType::V128.into());
        Ok(())
    }
}

fn validate_alignment(align: u32, width: u32) -> Result<(), Error> {
    if align >= 32 || (1u64 << align) > u64::from(width) {
        return Err(Error::Validation(format!(
            "alignment 2^{} exceeds access width of {} bytes",
            align, width
        )));
    }
    Ok(())
}

fn validate_lane(lane: u8, lane_count: u8) -> Result<(), Error> {
    if lane >= lane_count {
        return Err(Error::Validation(format!(
            "lane index {} out of range for {} lanes",
            lane, lane_count
        )));
    }
    Ok(())
}
