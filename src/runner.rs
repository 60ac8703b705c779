#![allow(clippy::unnecessary_wraps)]

use crate::{
    func::{FuncInstance, FuncInstanceInternal, FuncRef},
    host::Externals,
    instance::ModuleRef,
    isa::{self, Instruction, Label, LaneMemArg, MemArg},
    memory::{MemoryInstance, MemoryRef},
    nan_preserving_float::{F32, F64},
    table::{TableInstance, TableRef},
    types::{AddressType, ValueType},
    v128::{self, V128},
    value::{
        ArithmeticOps, ExtendInto, Float, FromValue, Integer, LittleEndianConvert, TransmuteInto,
        TruncateSaturateInto, TryTruncateInto, Value, WrapInto,
    },
    Signature, Trap, TrapKind,
};
use alloc::vec::Vec;
use core::fmt;

/// Maximum number of levels on the call stack.
pub const DEFAULT_CALL_STACK_LIMIT: usize = 256;

/// Maximum number of entries on a frame's value stack.
pub const DEFAULT_VALUE_STACK_LIMIT: usize = 1024 * 1024;

/// Interpreter action to execute after executing an instruction.
enum InstructionOutcome {
    /// Continue with the next instruction.
    RunNextInstruction,
    /// Branch to the label: truncate the value stack to the label's entry
    /// height while keeping its top `arity` values, then jump.
    Branch(Label),
    /// Jump without touching the value stack (`if`/`else` arms).
    Jump(u32),
    /// Execute a function call.
    ExecuteCall(FuncRef),
    /// Return from the current function block.
    Return,
}

/// Function run result.
enum RunResult {
    /// Function has returned; the values are the function's results.
    Return(Vec<Value>),
    /// Function is calling another function.
    NestedCall(FuncRef),
}

/// Function interpreter.
pub struct Interpreter {
    call_stack: Vec<FunctionContext>,
    return_types: Vec<ValueType>,
}

impl Interpreter {
    pub(crate) fn new(func: &FuncRef, args: &[Value]) -> Result<Interpreter, Trap> {
        let initial_frame = FunctionContext::new(func.clone(), args.to_vec());
        let mut call_stack = Vec::new();
        call_stack.push(initial_frame);

        let return_types = func.signature().results().to_vec();

        Ok(Interpreter {
            call_stack,
            return_types,
        })
    }

    pub(crate) fn start_execution<'a, E: Externals + 'a>(
        &mut self,
        externals: &'a mut E,
    ) -> Result<Vec<Value>, Trap> {
        let results = self.run_interpreter_loop(externals)?;

        debug_assert!(
            results.len() == self.return_types.len(),
            "results match the signature due to validation"
        );
        Ok(results)
    }

    fn run_interpreter_loop<'a, E: Externals + 'a>(
        &mut self,
        externals: &'a mut E,
    ) -> Result<Vec<Value>, Trap> {
        loop {
            let mut function_context = self.call_stack.pop().expect(
                "on loop entry - not empty; on loop continue - checking for emptiness; qed",
            );
            let function_ref = function_context.function.clone();
            let function_body = function_ref
                .body()
                .expect("host functions are dispatched below; internal functions have a body; qed");

            let function_return = self
                .do_run_function(&mut function_context, &function_body.code)
                .map_err(Trap::from)?;

            match function_return {
                RunResult::Return(results) => {
                    match self.call_stack.last_mut() {
                        Some(caller_context) => {
                            for value in results {
                                caller_context.value_stack.push(value)?;
                            }
                        }
                        None => {
                            // This was the last frame in the call stack;
                            // we are done executing.
                            return Ok(results);
                        }
                    }
                }
                RunResult::NestedCall(nested_func) => {
                    if self.call_stack.len() + 1 >= DEFAULT_CALL_STACK_LIMIT {
                        return Err(TrapKind::StackOverflow.into());
                    }

                    let args = function_context
                        .value_stack
                        .pop_many(nested_func.signature().params().len());

                    match *nested_func.as_internal() {
                        FuncInstanceInternal::Internal { .. } => {
                            let nested_context = FunctionContext::new(nested_func.clone(), args);
                            self.call_stack.push(function_context);
                            self.call_stack.push(nested_context);
                        }
                        FuncInstanceInternal::Host { .. } => {
                            let return_values =
                                FuncInstance::invoke(&nested_func, &args, externals)?;

                            // Check that the host function returned what its
                            // signature promised.
                            let expected = nested_func.signature().results();
                            if return_values.len() != expected.len()
                                || return_values
                                    .iter()
                                    .zip(expected)
                                    .any(|(value, &ty)| value.value_type() != ty)
                            {
                                return Err(TrapKind::UnexpectedSignature.into());
                            }

                            for value in return_values {
                                function_context.value_stack.push(value)?;
                            }
                            self.call_stack.push(function_context);
                        }
                    }
                }
            }
        }
    }

    fn do_run_function(
        &mut self,
        function_context: &mut FunctionContext,
        instructions: &isa::Instructions,
    ) -> Result<RunResult, TrapKind> {
        loop {
            let instruction = match instructions.get(function_context.position) {
                Some(instruction) => instruction,
                // Fell off the end of the body: implicit return. Validation
                // left exactly the result values on the stack.
                None => break,
            };
            function_context.position += 1;

            match self.run_instruction(function_context, instruction)? {
                InstructionOutcome::RunNextInstruction => {}
                InstructionOutcome::Branch(label) => {
                    function_context
                        .value_stack
                        .truncate_keeping(label.height, label.arity);
                    function_context.position = label.continuation;
                }
                InstructionOutcome::Jump(target) => {
                    function_context.position = target;
                }
                InstructionOutcome::ExecuteCall(func_ref) => {
                    return Ok(RunResult::NestedCall(func_ref));
                }
                InstructionOutcome::Return => break,
            }
        }

        let arity = function_context.function.signature().results().len();
        let results = function_context.value_stack.pop_many(arity);
        Ok(RunResult::Return(results))
    }

    #[inline(always)]
    fn run_instruction(
        &mut self,
        context: &mut FunctionContext,
        instruction: &Instruction,
    ) -> Result<InstructionOutcome, TrapKind> {
        match instruction {
            Instruction::Unreachable => Err(TrapKind::Unreachable),
            Instruction::Nop => Ok(InstructionOutcome::RunNextInstruction),
            // Control metadata is consumed by branches; the instructions
            // themselves have no effect.
            Instruction::Block(_) => Ok(InstructionOutcome::RunNextInstruction),
            Instruction::Loop(_) => Ok(InstructionOutcome::RunNextInstruction),
            Instruction::If(control) => self.run_if(context, control),
            Instruction::Else(label) => Ok(InstructionOutcome::Jump(label.continuation)),
            Instruction::End => Ok(InstructionOutcome::RunNextInstruction),
            Instruction::Br(target) => Ok(InstructionOutcome::Branch(target.label())),
            Instruction::BrIf(target) => self.run_br_if(context, target.label()),
            Instruction::BrTable(data) => self.run_br_table(context, data),
            Instruction::Return => Ok(InstructionOutcome::Return),

            Instruction::Call(index) => self.run_call(context, *index),
            Instruction::CallIndirect {
                type_index,
                table_index,
            } => self.run_call_indirect(context, *type_index, *table_index),

            Instruction::Drop => self.run_drop(context),
            Instruction::Select | Instruction::TypedSelect(_) => self.run_select(context),

            Instruction::LocalGet(index) => self.run_local_get(context, *index),
            Instruction::LocalSet(index) => self.run_local_set(context, *index),
            Instruction::LocalTee(index) => self.run_local_tee(context, *index),
            Instruction::GlobalGet(index) => self.run_global_get(context, *index),
            Instruction::GlobalSet(index) => self.run_global_set(context, *index),

            Instruction::TableGet(index) => self.run_table_get(context, *index),
            Instruction::TableSet(index) => self.run_table_set(context, *index),

            Instruction::I32Load(memarg) => self.run_load::<i32>(context, memarg),
            Instruction::I64Load(memarg) => self.run_load::<i64>(context, memarg),
            Instruction::F32Load(memarg) => self.run_load::<F32>(context, memarg),
            Instruction::F64Load(memarg) => self.run_load::<F64>(context, memarg),
            Instruction::I32Load8S(memarg) => self.run_load_extend::<i8, i32>(context, memarg),
            Instruction::I32Load8U(memarg) => self.run_load_extend::<u8, i32>(context, memarg),
            Instruction::I32Load16S(memarg) => self.run_load_extend::<i16, i32>(context, memarg),
            Instruction::I32Load16U(memarg) => self.run_load_extend::<u16, i32>(context, memarg),
            Instruction::I64Load8S(memarg) => self.run_load_extend::<i8, i64>(context, memarg),
            Instruction::I64Load8U(memarg) => self.run_load_extend::<u8, i64>(context, memarg),
            Instruction::I64Load16S(memarg) => self.run_load_extend::<i16, i64>(context, memarg),
            Instruction::I64Load16U(memarg) => self.run_load_extend::<u16, i64>(context, memarg),
            Instruction::I64Load32S(memarg) => self.run_load_extend::<i32, i64>(context, memarg),
            Instruction::I64Load32U(memarg) => self.run_load_extend::<u32, i64>(context, memarg),
            Instruction::I32Store(memarg) => self.run_store::<i32>(context, memarg),
            Instruction::I64Store(memarg) => self.run_store::<i64>(context, memarg),
            Instruction::F32Store(memarg) => self.run_store::<F32>(context, memarg),
            Instruction::F64Store(memarg) => self.run_store::<F64>(context, memarg),
            Instruction::I32Store8(memarg) => self.run_store_wrap::<i32, i8>(context, memarg),
            Instruction::I32Store16(memarg) => self.run_store_wrap::<i32, i16>(context, memarg),
            Instruction::I64Store8(memarg) => self.run_store_wrap::<i64, i8>(context, memarg),
            Instruction::I64Store16(memarg) => self.run_store_wrap::<i64, i16>(context, memarg),
            Instruction::I64Store32(memarg) => self.run_store_wrap::<i64, i32>(context, memarg),

            Instruction::MemorySize(index) => self.run_memory_size(context, *index),
            Instruction::MemoryGrow(index) => self.run_memory_grow(context, *index),

            Instruction::I32Const(value) => self.run_const(context, Value::I32(*value)),
            Instruction::I64Const(value) => self.run_const(context, Value::I64(*value)),
            Instruction::F32Const(bits) => self.run_const(context, Value::decode_f32(*bits)),
            Instruction::F64Const(bits) => self.run_const(context, Value::decode_f64(*bits)),

            Instruction::RefNull(value_type) => {
                self.run_const(context, Value::default(*value_type))
            }
            Instruction::RefIsNull => self.run_ref_is_null(context),
            Instruction::RefFunc(index) => self.run_ref_func(context, *index),

            Instruction::I32Eqz => self.run_eqz::<i32>(context),
            Instruction::I32Eq => self.run_eq::<i32>(context),
            Instruction::I32Ne => self.run_ne::<i32>(context),
            Instruction::I32LtS => self.run_lt::<i32>(context),
            Instruction::I32LtU => self.run_lt::<u32>(context),
            Instruction::I32GtS => self.run_gt::<i32>(context),
            Instruction::I32GtU => self.run_gt::<u32>(context),
            Instruction::I32LeS => self.run_lte::<i32>(context),
            Instruction::I32LeU => self.run_lte::<u32>(context),
            Instruction::I32GeS => self.run_gte::<i32>(context),
            Instruction::I32GeU => self.run_gte::<u32>(context),

            Instruction::I64Eqz => self.run_eqz::<i64>(context),
            Instruction::I64Eq => self.run_eq::<i64>(context),
            Instruction::I64Ne => self.run_ne::<i64>(context),
            Instruction::I64LtS => self.run_lt::<i64>(context),
            Instruction::I64LtU => self.run_lt::<u64>(context),
            Instruction::I64GtS => self.run_gt::<i64>(context),
            Instruction::I64GtU => self.run_gt::<u64>(context),
            Instruction::I64LeS => self.run_lte::<i64>(context),
            Instruction::I64LeU => self.run_lte::<u64>(context),
            Instruction::I64GeS => self.run_gte::<i64>(context),
            Instruction::I64GeU => self.run_gte::<u64>(context),

            Instruction::F32Eq => self.run_eq::<F32>(context),
            Instruction::F32Ne => self.run_ne::<F32>(context),
            Instruction::F32Lt => self.run_lt::<F32>(context),
            Instruction::F32Gt => self.run_gt::<F32>(context),
            Instruction::F32Le => self.run_lte::<F32>(context),
            Instruction::F32Ge => self.run_gte::<F32>(context),

            Instruction::F64Eq => self.run_eq::<F64>(context),
            Instruction::F64Ne => self.run_ne::<F64>(context),
            Instruction::F64Lt => self.run_lt::<F64>(context),
            Instruction::F64Gt => self.run_gt::<F64>(context),
            Instruction::F64Le => self.run_lte::<F64>(context),
            Instruction::F64Ge => self.run_gte::<F64>(context),

            Instruction::I32Clz => self.run_clz::<i32>(context),
            Instruction::I32Ctz => self.run_ctz::<i32>(context),
            Instruction::I32Popcnt => self.run_popcnt::<i32>(context),
            Instruction::I32Add => self.run_add::<i32>(context),
            Instruction::I32Sub => self.run_sub::<i32>(context),
            Instruction::I32Mul => self.run_mul::<i32>(context),
            Instruction::I32DivS => self.run_div::<i32>(context),
            Instruction::I32DivU => self.run_div::<u32>(context),
            Instruction::I32RemS => self.run_rem::<i32>(context),
            Instruction::I32RemU => self.run_rem::<u32>(context),
            Instruction::I32And => self.run_and::<i32>(context),
            Instruction::I32Or => self.run_or::<i32>(context),
            Instruction::I32Xor => self.run_xor::<i32>(context),
            Instruction::I32Shl => self.run_shl::<i32>(context, 0x1F),
            Instruction::I32ShrS => self.run_shr::<i32>(context, 0x1F),
            Instruction::I32ShrU => self.run_shr::<u32>(context, 0x1F),
            Instruction::I32Rotl => self.run_rotl::<i32>(context),
            Instruction::I32Rotr => self.run_rotr::<i32>(context),

            Instruction::I64Clz => self.run_clz::<i64>(context),
            Instruction::I64Ctz => self.run_ctz::<i64>(context),
            Instruction::I64Popcnt => self.run_popcnt::<i64>(context),
            Instruction::I64Add => self.run_add::<i64>(context),
            Instruction::I64Sub => self.run_sub::<i64>(context),
            Instruction::I64Mul => self.run_mul::<i64>(context),
            Instruction::I64DivS => self.run_div::<i64>(context),
            Instruction::I64DivU => self.run_div::<u64>(context),
            Instruction::I64RemS => self.run_rem::<i64>(context),
            Instruction::I64RemU => self.run_rem::<u64>(context),
            Instruction::I64And => self.run_and::<i64>(context),
            Instruction::I64Or => self.run_or::<i64>(context),
            Instruction::I64Xor => self.run_xor::<i64>(context),
            Instruction::I64Shl => self.run_shl::<i64>(context, 0x3F),
            Instruction::I64ShrS => self.run_shr::<i64>(context, 0x3F),
            Instruction::I64ShrU => self.run_shr::<u64>(context, 0x3F),
            Instruction::I64Rotl => self.run_rotl::<i64>(context),
            Instruction::I64Rotr => self.run_rotr::<i64>(context),

            Instruction::F32Abs => self.run_abs::<F32>(context),
            Instruction::F32Neg => self.run_neg::<F32>(context),
            Instruction::F32Ceil => self.run_ceil::<F32>(context),
            Instruction::F32Floor => self.run_floor::<F32>(context),
            Instruction::F32Trunc => self.run_trunc::<F32>(context),
            Instruction::F32Nearest => self.run_nearest::<F32>(context),
            Instruction::F32Sqrt => self.run_sqrt::<F32>(context),
            Instruction::F32Add => self.run_add::<F32>(context),
            Instruction::F32Sub => self.run_sub::<F32>(context),
            Instruction::F32Mul => self.run_mul::<F32>(context),
            Instruction::F32Div => self.run_div::<F32>(context),
            Instruction::F32Min => self.run_min::<F32>(context),
            Instruction::F32Max => self.run_max::<F32>(context),
            Instruction::F32Copysign => self.run_copysign::<F32>(context),

            Instruction::F64Abs => self.run_abs::<F64>(context),
            Instruction::F64Neg => self.run_neg::<F64>(context),
            Instruction::F64Ceil => self.run_ceil::<F64>(context),
            Instruction::F64Floor => self.run_floor::<F64>(context),
            Instruction::F64Trunc => self.run_trunc::<F64>(context),
            Instruction::F64Nearest => self.run_nearest::<F64>(context),
            Instruction::F64Sqrt => self.run_sqrt::<F64>(context),
            Instruction::F64Add => self.run_add::<F64>(context),
            Instruction::F64Sub => self.run_sub::<F64>(context),
            Instruction::F64Mul => self.run_mul::<F64>(context),
            Instruction::F64Div => self.run_div::<F64>(context),
            Instruction::F64Min => self.run_min::<F64>(context),
            Instruction::F64Max => self.run_max::<F64>(context),
            Instruction::F64Copysign => self.run_copysign::<F64>(context),

            Instruction::I32WrapI64 => self.run_wrap::<i64, i32>(context),
            Instruction::I32TruncF32S => self.run_trunc_to_int::<F32, i32>(context),
            Instruction::I32TruncF32U => self.run_trunc_to_int::<F32, u32>(context),
            Instruction::I32TruncF64S => self.run_trunc_to_int::<F64, i32>(context),
            Instruction::I32TruncF64U => self.run_trunc_to_int::<F64, u32>(context),
            Instruction::I64ExtendI32S => self.run_extend::<i32, i64>(context),
            Instruction::I64ExtendI32U => self.run_extend::<u32, u64>(context),
            Instruction::I64TruncF32S => self.run_trunc_to_int::<F32, i64>(context),
            Instruction::I64TruncF32U => self.run_trunc_to_int::<F32, u64>(context),
            Instruction::I64TruncF64S => self.run_trunc_to_int::<F64, i64>(context),
            Instruction::I64TruncF64U => self.run_trunc_to_int::<F64, u64>(context),
            Instruction::F32ConvertI32S => self.run_extend::<i32, F32>(context),
            Instruction::F32ConvertI32U => self.run_extend::<u32, F32>(context),
            Instruction::F32ConvertI64S => self.run_wrap::<i64, F32>(context),
            Instruction::F32ConvertI64U => self.run_wrap::<u64, F32>(context),
            Instruction::F32DemoteF64 => self.run_wrap::<F64, F32>(context),
            Instruction::F64ConvertI32S => self.run_extend::<i32, F64>(context),
            Instruction::F64ConvertI32U => self.run_extend::<u32, F64>(context),
            Instruction::F64ConvertI64S => self.run_extend::<i64, F64>(context),
            Instruction::F64ConvertI64U => self.run_extend::<u64, F64>(context),
            Instruction::F64PromoteF32 => self.run_extend::<F32, F64>(context),

            Instruction::I32ReinterpretF32 => self.run_reinterpret::<F32, i32>(context),
            Instruction::I64ReinterpretF64 => self.run_reinterpret::<F64, i64>(context),
            Instruction::F32ReinterpretI32 => self.run_reinterpret::<i32, F32>(context),
            Instruction::F64ReinterpretI64 => self.run_reinterpret::<i64, F64>(context),

            Instruction::I32Extend8S => self.run_sign_extend::<i32, i8>(context),
            Instruction::I32Extend16S => self.run_sign_extend::<i32, i16>(context),
            Instruction::I64Extend8S => self.run_sign_extend::<i64, i8>(context),
            Instruction::I64Extend16S => self.run_sign_extend::<i64, i16>(context),
            Instruction::I64Extend32S => self.run_sign_extend::<i64, i32>(context),

            Instruction::I32TruncSatF32S => self.run_trunc_sat::<F32, i32>(context),
            Instruction::I32TruncSatF32U => self.run_trunc_sat::<F32, u32>(context),
            Instruction::I32TruncSatF64S => self.run_trunc_sat::<F64, i32>(context),
            Instruction::I32TruncSatF64U => self.run_trunc_sat::<F64, u32>(context),
            Instruction::I64TruncSatF32S => self.run_trunc_sat::<F32, i64>(context),
            Instruction::I64TruncSatF32U => self.run_trunc_sat::<F32, u64>(context),
            Instruction::I64TruncSatF64S => self.run_trunc_sat::<F64, i64>(context),
            Instruction::I64TruncSatF64U => self.run_trunc_sat::<F64, u64>(context),

            Instruction::MemoryInit {
                data_index,
                memory_index,
            } => self.run_memory_init(context, *data_index, *memory_index),
            Instruction::DataDrop(index) => self.run_data_drop(context, *index),
            Instruction::MemoryCopy {
                dst_index,
                src_index,
            } => self.run_memory_copy(context, *dst_index, *src_index),
            Instruction::MemoryFill(index) => self.run_memory_fill(context, *index),
            Instruction::TableInit {
                elem_index,
                table_index,
            } => self.run_table_init(context, *elem_index, *table_index),
            Instruction::ElemDrop(index) => self.run_elem_drop(context, *index),
            Instruction::TableCopy {
                dst_index,
                src_index,
            } => self.run_table_copy(context, *dst_index, *src_index),
            Instruction::TableGrow(index) => self.run_table_grow(context, *index),
            Instruction::TableSize(index) => self.run_table_size(context, *index),
            Instruction::TableFill(index) => self.run_table_fill(context, *index),

            simd => self.run_simd_instruction(context, simd),
        }
    }

    fn run_if(
        &mut self,
        context: &mut FunctionContext,
        control: &isa::IfControl,
    ) -> Result<InstructionOutcome, TrapKind> {
        let condition: bool = context.value_stack.pop_as();
        if condition {
            return Ok(InstructionOutcome::RunNextInstruction);
        }
        match control.else_location {
            // Resume right behind the `else` marker.
            Some(else_location) => Ok(InstructionOutcome::Jump(else_location + 1)),
            None => Ok(InstructionOutcome::Jump(control.end_label.continuation)),
        }
    }

    fn run_br_if(
        &mut self,
        context: &mut FunctionContext,
        label: Label,
    ) -> Result<InstructionOutcome, TrapKind> {
        let condition: bool = context.value_stack.pop_as();
        if condition {
            Ok(InstructionOutcome::Branch(label))
        } else {
            Ok(InstructionOutcome::RunNextInstruction)
        }
    }

    fn run_br_table(
        &mut self,
        context: &mut FunctionContext,
        data: &isa::BrTableData,
    ) -> Result<InstructionOutcome, TrapKind> {
        let index: u32 = context.value_stack.pop_as();
        let target = data
            .targets
            .get(index as usize)
            .unwrap_or(&data.default)
            .label();
        Ok(InstructionOutcome::Branch(target))
    }

    fn run_call(
        &mut self,
        context: &mut FunctionContext,
        func_idx: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let func = context
            .module()
            .func_by_index(func_idx)
            .expect("Due to validation func should exist");
        Ok(InstructionOutcome::ExecuteCall(func))
    }

    fn run_call_indirect(
        &mut self,
        context: &mut FunctionContext,
        type_index: u32,
        table_index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(table_index)
            .expect("Due to validation table should exist");
        let table_func_idx = pop_address(context, table.address_type());
        let value = table
            .get(table_func_idx)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        let func_ref = match value {
            Value::FuncRef(Some(func_ref)) => func_ref,
            Value::FuncRef(None) => return Err(TrapKind::ElemUninitialized),
            _ => unreachable!("validation restricts call_indirect to funcref tables"),
        };

        {
            let actual_function_type = func_ref.signature();
            let required_function_type = context
                .module()
                .signature_by_index(type_index)
                .expect("Due to validation type should exist");

            if &*required_function_type != actual_function_type {
                return Err(TrapKind::UnexpectedSignature);
            }
        }

        Ok(InstructionOutcome::ExecuteCall(func_ref))
    }

    fn run_drop(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind> {
        let _ = context.value_stack.pop();
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_select(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind> {
        let condition: bool = context.value_stack.pop_as();
        let if_false = context.value_stack.pop();
        let if_true = context.value_stack.pop();
        context
            .value_stack
            .push(if condition { if_true } else { if_false })?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_local_get(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value = context.locals[index as usize].clone();
        context.value_stack.push(value)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_local_set(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value = context.value_stack.pop();
        context.locals[index as usize] = value;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_local_tee(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value = context.value_stack.top().clone();
        context.locals[index as usize] = value;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_global_get(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let global = context
            .module()
            .global_by_index(index)
            .expect("Due to validation global should exist");
        context.value_stack.push(global.get())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_global_set(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value = context.value_stack.pop();
        let global = context
            .module()
            .global_by_index(index)
            .expect("Due to validation global should exist");
        global
            .set(value)
            .expect("Due to validation set to a global should succeed");
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_get(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(index)
            .expect("Due to validation table should exist");
        let offset = pop_address(context, table.address_type());
        let value = table
            .get(offset)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        context.value_stack.push(value)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_set(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(index)
            .expect("Due to validation table should exist");
        let value = context.value_stack.pop();
        let offset = pop_address(context, table.address_type());
        table
            .set(offset, value)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_load<T>(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: LittleEndianConvert,
        Value: From<T>,
    {
        let memory = context.memory(memarg.memory_index);
        let address = effective_address(context, &memory, memarg)?;
        let value: T = memory
            .get_value(address)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        context.value_stack.push(value.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_load_extend<T, U>(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: ExtendInto<U> + LittleEndianConvert,
        Value: From<U>,
    {
        let memory = context.memory(memarg.memory_index);
        let address = effective_address(context, &memory, memarg)?;
        let value: T = memory
            .get_value(address)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        let stack_value: U = value.extend_into();
        context.value_stack.push(stack_value.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_store<T>(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + LittleEndianConvert,
    {
        let stack_value: T = context.value_stack.pop_as();
        let memory = context.memory(memarg.memory_index);
        let address = effective_address(context, &memory, memarg)?;
        memory
            .set_value(address, stack_value)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_store_wrap<T, U>(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + WrapInto<U>,
        U: LittleEndianConvert,
    {
        let stack_value: T = context.value_stack.pop_as();
        let stack_value = stack_value.wrap_into();
        let memory = context.memory(memarg.memory_index);
        let address = effective_address(context, &memory, memarg)?;
        memory
            .set_value(address, stack_value)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_memory_size(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let memory = context.memory(index);
        let pages = memory.current_pages();
        push_address(context, memory.address_type(), pages)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_memory_grow(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let memory = context.memory(index);
        let additional = pop_address(context, memory.address_type());
        let result = match memory.grow(additional) {
            Ok(previous) => previous,
            // Returns -1 (all address bits set) in case of error.
            Err(_) => match memory.address_type() {
                AddressType::I32 => u64::from(u32::MAX),
                AddressType::I64 => u64::MAX,
            },
        };
        push_address(context, memory.address_type(), result)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_const(
        &mut self,
        context: &mut FunctionContext,
        value: Value,
    ) -> Result<InstructionOutcome, TrapKind> {
        context.value_stack.push(value)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_ref_is_null(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value = context.value_stack.pop();
        let is_null = value.is_null_ref();
        context.value_stack.push(Value::I32(is_null as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_ref_func(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let func = context
            .module()
            .func_by_index(index)
            .expect("Due to validation func should exist");
        context.value_stack.push(Value::FuncRef(Some(func)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_memory_init(
        &mut self,
        context: &mut FunctionContext,
        data_index: u32,
        memory_index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let len: u32 = context.value_stack.pop_as();
        let src: u32 = context.value_stack.pop_as();
        let memory = context.memory(memory_index);
        let dst = pop_address(context, memory.address_type());

        let bytes = context
            .module()
            .data_segment_bytes(data_index, u64::from(src), u64::from(len))
            .ok_or(TrapKind::MemoryAccessOutOfBounds)?;
        memory
            .set(dst, &bytes)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_data_drop(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        context.module().drop_data_segment(index);
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_memory_copy(
        &mut self,
        context: &mut FunctionContext,
        dst_index: u32,
        src_index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let dst_memory = context.memory(dst_index);
        let src_memory = context.memory(src_index);
        let len = pop_copy_length(context, &dst_memory, &src_memory);
        let src = pop_address(context, src_memory.address_type());
        let dst = pop_address(context, dst_memory.address_type());

        MemoryInstance::transfer(&src_memory, src, &dst_memory, dst, len)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_memory_fill(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let memory = context.memory(index);
        let len = pop_address(context, memory.address_type());
        let value: u32 = context.value_stack.pop_as();
        let dst = pop_address(context, memory.address_type());

        memory
            .clear(dst, value as u8, len)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_init(
        &mut self,
        context: &mut FunctionContext,
        elem_index: u32,
        table_index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let len: u32 = context.value_stack.pop_as();
        let src: u32 = context.value_stack.pop_as();
        let table = context
            .module()
            .table_by_index(table_index)
            .expect("Due to validation table should exist");
        let dst = pop_address(context, table.address_type());

        let items = context
            .module()
            .elem_segment_items(elem_index, u64::from(src), u64::from(len))
            .ok_or(TrapKind::TableAccessOutOfBounds)?;
        table
            .init(dst, &items)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_elem_drop(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        context.module().drop_elem_segment(index);
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_copy(
        &mut self,
        context: &mut FunctionContext,
        dst_index: u32,
        src_index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let dst_table = context
            .module()
            .table_by_index(dst_index)
            .expect("Due to validation table should exist");
        let src_table = context
            .module()
            .table_by_index(src_index)
            .expect("Due to validation table should exist");
        let len = pop_table_copy_length(context, &dst_table, &src_table);
        let src = pop_address(context, src_table.address_type());
        let dst = pop_address(context, dst_table.address_type());

        TableInstance::transfer(&src_table, src, &dst_table, dst, len)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_grow(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(index)
            .expect("Due to validation table should exist");
        let additional = pop_address(context, table.address_type());
        let init = context.value_stack.pop();
        let result = match table.grow(additional, init) {
            Ok(previous) => previous,
            Err(_) => match table.address_type() {
                AddressType::I32 => u64::from(u32::MAX),
                AddressType::I64 => u64::MAX,
            },
        };
        push_address(context, table.address_type(), result)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_size(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(index)
            .expect("Due to validation table should exist");
        let size = table.current_size();
        push_address(context, table.address_type(), size)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_table_fill(
        &mut self,
        context: &mut FunctionContext,
        index: u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let table = context
            .module()
            .table_by_index(index)
            .expect("Due to validation table should exist");
        let len = pop_address(context, table.address_type());
        let value = context.value_stack.pop();
        let dst = pop_address(context, table.address_type());
        table
            .fill(dst, len, value)
            .map_err(|_| TrapKind::TableAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_eqz<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialEq<T> + Default,
    {
        let value: T = context.value_stack.pop_as();
        context
            .value_stack
            .push(Value::I32((value == T::default()) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_relop<T, F>(
        &mut self,
        context: &mut FunctionContext,
        f: F,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue,
        F: FnOnce(T, T) -> bool,
    {
        let (left, right) = context.value_stack.pop_pair_as::<T>();
        context.value_stack.push(Value::I32(f(left, right) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_eq<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialEq<T>,
    {
        self.run_relop(context, |left: T, right: T| left == right)
    }

    fn run_ne<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialEq<T>,
    {
        self.run_relop(context, |left: T, right: T| left != right)
    }

    fn run_lt<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialOrd<T>,
    {
        self.run_relop(context, |left: T, right: T| left < right)
    }

    fn run_gt<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialOrd<T>,
    {
        self.run_relop(context, |left: T, right: T| left > right)
    }

    fn run_lte<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialOrd<T>,
    {
        self.run_relop(context, |left: T, right: T| left <= right)
    }

    fn run_gte<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + PartialOrd<T>,
    {
        self.run_relop(context, |left: T, right: T| left >= right)
    }

    fn run_unop<T, U, F>(
        &mut self,
        context: &mut FunctionContext,
        f: F,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue,
        Value: From<U>,
        F: FnOnce(T) -> U,
    {
        let value: T = context.value_stack.pop_as();
        context.value_stack.push(f(value).into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_clz<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.leading_zeros())
    }

    fn run_ctz<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.trailing_zeros())
    }

    fn run_popcnt<T>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.count_ones())
    }

    fn run_binop<T, F>(
        &mut self,
        context: &mut FunctionContext,
        f: F,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue,
        Value: From<T>,
        F: FnOnce(T, T) -> Result<T, TrapKind>,
    {
        let (left, right) = context.value_stack.pop_pair_as::<T>();
        let result = f(left, right)?;
        context.value_stack.push(result.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_add<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + ArithmeticOps<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.add(right)))
    }

    fn run_sub<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + ArithmeticOps<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.sub(right)))
    }

    fn run_mul<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + ArithmeticOps<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.mul(right)))
    }

    fn run_div<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + ArithmeticOps<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| left.div(right))
    }

    fn run_rem<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| left.rem(right))
    }

    fn run_and<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::BitAnd<T, Output = T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left & right))
    }

    fn run_or<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::BitOr<T, Output = T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left | right))
    }

    fn run_xor<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::BitXor<T, Output = T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left ^ right))
    }

    fn run_shl<T>(
        &mut self,
        context: &mut FunctionContext,
        mask: T,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::Shl<T, Output = T> + core::ops::BitAnd<T, Output = T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left << (right & mask)))
    }

    fn run_shr<T>(
        &mut self,
        context: &mut FunctionContext,
        mask: T,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::Shr<T, Output = T> + core::ops::BitAnd<T, Output = T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left >> (right & mask)))
    }

    fn run_rotl<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.rotl(right)))
    }

    fn run_rotr<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.rotr(right)))
    }

    fn run_abs<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.abs())
    }

    fn run_neg<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + core::ops::Neg<Output = T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| -value)
    }

    fn run_ceil<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.ceil())
    }

    fn run_floor<T>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.floor())
    }

    fn run_trunc<T>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.trunc())
    }

    fn run_nearest<T>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.nearest())
    }

    fn run_sqrt<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.sqrt())
    }

    fn run_min<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.min(right)))
    }

    fn run_max<T>(&mut self, context: &mut FunctionContext) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.max(right)))
    }

    fn run_copysign<T>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + Float<T>,
        Value: From<T>,
    {
        self.run_binop(context, |left: T, right: T| Ok(left.copysign(right)))
    }

    fn run_wrap<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + WrapInto<U>,
        Value: From<U>,
    {
        self.run_unop(context, |value: T| value.wrap_into())
    }

    fn run_trunc_to_int<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + TryTruncateInto<U, TrapKind>,
        Value: From<U>,
    {
        let value: T = context.value_stack.pop_as();
        let result: U = value.try_truncate_into()?;
        context.value_stack.push(result.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_trunc_sat<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + TruncateSaturateInto<U>,
        Value: From<U>,
    {
        self.run_unop(context, |value: T| value.truncate_saturate_into())
    }

    fn run_extend<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + ExtendInto<U>,
        Value: From<U>,
    {
        self.run_unop(context, |value: T| value.extend_into())
    }

    /// `iN.extendM_s`: truncate to the low M bits, then sign-extend back.
    fn run_sign_extend<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + WrapInto<U>,
        U: ExtendInto<T>,
        Value: From<T>,
    {
        self.run_unop(context, |value: T| value.wrap_into().extend_into())
    }

    fn run_reinterpret<T, U>(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: FromValue + TransmuteInto<U>,
        Value: From<U>,
    {
        self.run_unop(context, |value: T| value.transmute_into())
    }

    fn run_v128_unop(
        &mut self,
        context: &mut FunctionContext,
        f: impl FnOnce(V128) -> V128,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value: V128 = context.value_stack.pop_as();
        context.value_stack.push(Value::V128(f(value)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_binop(
        &mut self,
        context: &mut FunctionContext,
        f: impl FnOnce(V128, V128) -> V128,
    ) -> Result<InstructionOutcome, TrapKind> {
        let right: V128 = context.value_stack.pop_as();
        let left: V128 = context.value_stack.pop_as();
        context.value_stack.push(Value::V128(f(left, right)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_test(
        &mut self,
        context: &mut FunctionContext,
        f: impl FnOnce(V128) -> bool,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value: V128 = context.value_stack.pop_as();
        context.value_stack.push(Value::I32(f(value) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_bitmask(
        &mut self,
        context: &mut FunctionContext,
        f: impl FnOnce(V128) -> u32,
    ) -> Result<InstructionOutcome, TrapKind> {
        let value: V128 = context.value_stack.pop_as();
        context.value_stack.push(Value::I32(f(value) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_shift(
        &mut self,
        context: &mut FunctionContext,
        f: impl FnOnce(V128, i32) -> V128,
    ) -> Result<InstructionOutcome, TrapKind> {
        let shift: i32 = context.value_stack.pop_as();
        let value: V128 = context.value_stack.pop_as();
        context.value_stack.push(Value::V128(f(value, shift)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_load_bytes<const N: usize>(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
    ) -> Result<[u8; N], TrapKind> {
        let memory = context.memory(memarg.memory_index);
        let address = effective_address(context, &memory, memarg)?;
        let mut bytes = [0u8; N];
        memory
            .get_into(address, &mut bytes)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(bytes)
    }

    fn run_v128_load_extend(
        &mut self,
        context: &mut FunctionContext,
        memarg: &MemArg,
        f: impl FnOnce([u8; 8]) -> V128,
    ) -> Result<InstructionOutcome, TrapKind> {
        let bytes = self.run_v128_load_bytes::<8>(context, memarg)?;
        context.value_stack.push(Value::V128(f(bytes)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_load_lane<T>(
        &mut self,
        context: &mut FunctionContext,
        args: &LaneMemArg,
        replace: impl FnOnce(V128, u8, T) -> V128,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: LittleEndianConvert,
    {
        let vector: V128 = context.value_stack.pop_as();
        let memory = context.memory(args.memarg.memory_index);
        let address = effective_address(context, &memory, &args.memarg)?;
        let value: T = memory
            .get_value(address)
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        context
            .value_stack
            .push(Value::V128(replace(vector, args.lane, value)))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_v128_store_lane<T>(
        &mut self,
        context: &mut FunctionContext,
        args: &LaneMemArg,
        extract: impl FnOnce(V128, u8) -> T,
    ) -> Result<InstructionOutcome, TrapKind>
    where
        T: LittleEndianConvert,
    {
        let vector: V128 = context.value_stack.pop_as();
        let memory = context.memory(args.memarg.memory_index);
        let address = effective_address(context, &memory, &args.memarg)?;
        memory
            .set_value(address, extract(vector, args.lane))
            .map_err(|_| TrapKind::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_simd_instruction(
        &mut self,
        context: &mut FunctionContext,
        instruction: &Instruction,
    ) -> Result<InstructionOutcome, TrapKind> {
        use crate::v128::{extract_lane, from_lanes, replace_lane, splat};

        match instruction {
            Instruction::V128Load(memarg) => self.run_load::<V128>(context, memarg),
            Instruction::V128Store(memarg) => self.run_store::<V128>(context, memarg),
            Instruction::V128Const(bytes) => {
                self.run_const(context, Value::V128(V128::from_bytes(*bytes)))
            }

            Instruction::V128Load8x8S(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load8x8_s)
            }
            Instruction::V128Load8x8U(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load8x8_u)
            }
            Instruction::V128Load16x4S(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load16x4_s)
            }
            Instruction::V128Load16x4U(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load16x4_u)
            }
            Instruction::V128Load32x2S(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load32x2_s)
            }
            Instruction::V128Load32x2U(memarg) => {
                self.run_v128_load_extend(context, memarg, v128::load32x2_u)
            }

            Instruction::V128Load8Splat(memarg) => {
                let bytes = self.run_v128_load_bytes::<1>(context, memarg)?;
                self.run_const(context, Value::V128(splat::<u8, 16>(bytes[0])))
            }
            Instruction::V128Load16Splat(memarg) => {
                let bytes = self.run_v128_load_bytes::<2>(context, memarg)?;
                self.run_const(
                    context,
                    Value::V128(splat::<u16, 8>(u16::from_le_bytes(bytes))),
                )
            }
            Instruction::V128Load32Splat(memarg) => {
                let bytes = self.run_v128_load_bytes::<4>(context, memarg)?;
                self.run_const(
                    context,
                    Value::V128(splat::<u32, 4>(u32::from_le_bytes(bytes))),
                )
            }
            Instruction::V128Load64Splat(memarg) => {
                let bytes = self.run_v128_load_bytes::<8>(context, memarg)?;
                self.run_const(
                    context,
                    Value::V128(splat::<u64, 2>(u64::from_le_bytes(bytes))),
                )
            }
            Instruction::V128Load32Zero(memarg) => {
                let bytes = self.run_v128_load_bytes::<4>(context, memarg)?;
                self.run_const(
                    context,
                    Value::V128(from_lanes([u32::from_le_bytes(bytes), 0, 0, 0])),
                )
            }
            Instruction::V128Load64Zero(memarg) => {
                let bytes = self.run_v128_load_bytes::<8>(context, memarg)?;
                self.run_const(
                    context,
                    Value::V128(from_lanes([u64::from_le_bytes(bytes), 0])),
                )
            }

            Instruction::V128Load8Lane(args) => {
                self.run_v128_load_lane::<u8>(context, args, replace_lane::<u8, 16>)
            }
            Instruction::V128Load16Lane(args) => {
                self.run_v128_load_lane::<u16>(context, args, replace_lane::<u16, 8>)
            }
            Instruction::V128Load32Lane(args) => {
                self.run_v128_load_lane::<u32>(context, args, replace_lane::<u32, 4>)
            }
            Instruction::V128Load64Lane(args) => {
                self.run_v128_load_lane::<u64>(context, args, replace_lane::<u64, 2>)
            }
            Instruction::V128Store8Lane(args) => {
                self.run_v128_store_lane::<u8>(context, args, extract_lane::<u8, 16>)
            }
            Instruction::V128Store16Lane(args) => {
                self.run_v128_store_lane::<u16>(context, args, extract_lane::<u16, 8>)
            }
            Instruction::V128Store32Lane(args) => {
                self.run_v128_store_lane::<u32>(context, args, extract_lane::<u32, 4>)
            }
            Instruction::V128Store64Lane(args) => {
                self.run_v128_store_lane::<u64>(context, args, extract_lane::<u64, 2>)
            }

            Instruction::I8x16Shuffle(selectors) => {
                self.run_v128_binop(context, |a, b| v128::i8x16_shuffle(a, b, selectors))
            }
            Instruction::I8x16Swizzle => self.run_v128_binop(context, v128::i8x16_swizzle),

            Instruction::I8x16Splat => {
                let value: i32 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<i8, 16>(value as i8)))
            }
            Instruction::I16x8Splat => {
                let value: i32 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<i16, 8>(value as i16)))
            }
            Instruction::I32x4Splat => {
                let value: i32 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<i32, 4>(value)))
            }
            Instruction::I64x2Splat => {
                let value: i64 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<i64, 2>(value)))
            }
            Instruction::F32x4Splat => {
                let value: F32 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<f32, 4>(value.to_float())))
            }
            Instruction::F64x2Splat => {
                let value: F64 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(splat::<f64, 2>(value.to_float())))
            }

            Instruction::I8x16ExtractLaneS(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::I32(i32::from(extract_lane::<i8, 16>(vector, *lane))),
                )
            }
            Instruction::I8x16ExtractLaneU(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::I32(i32::from(extract_lane::<u8, 16>(vector, *lane))),
                )
            }
            Instruction::I16x8ExtractLaneS(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::I32(i32::from(extract_lane::<i16, 8>(vector, *lane))),
                )
            }
            Instruction::I16x8ExtractLaneU(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::I32(i32::from(extract_lane::<u16, 8>(vector, *lane))),
                )
            }
            Instruction::I32x4ExtractLane(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(context, Value::I32(extract_lane::<i32, 4>(vector, *lane)))
            }
            Instruction::I64x2ExtractLane(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(context, Value::I64(extract_lane::<i64, 2>(vector, *lane)))
            }
            Instruction::F32x4ExtractLane(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::F32(extract_lane::<f32, 4>(vector, *lane).into()),
                )
            }
            Instruction::F64x2ExtractLane(lane) => {
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::F64(extract_lane::<f64, 2>(vector, *lane).into()),
                )
            }

            Instruction::I8x16ReplaceLane(lane) => {
                let value: i32 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<i8, 16>(vector, *lane, value as i8)),
                )
            }
            Instruction::I16x8ReplaceLane(lane) => {
                let value: i32 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<i16, 8>(vector, *lane, value as i16)),
                )
            }
            Instruction::I32x4ReplaceLane(lane) => {
                let value: i32 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<i32, 4>(vector, *lane, value)),
                )
            }
            Instruction::I64x2ReplaceLane(lane) => {
                let value: i64 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<i64, 2>(vector, *lane, value)),
                )
            }
            Instruction::F32x4ReplaceLane(lane) => {
                let value: F32 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<f32, 4>(vector, *lane, value.to_float())),
                )
            }
            Instruction::F64x2ReplaceLane(lane) => {
                let value: F64 = context.value_stack.pop_as();
                let vector: V128 = context.value_stack.pop_as();
                self.run_const(
                    context,
                    Value::V128(replace_lane::<f64, 2>(vector, *lane, value.to_float())),
                )
            }

            Instruction::I8x16Eq => self.run_v128_binop(context, v128::i8x16_eq),
            Instruction::I8x16Ne => self.run_v128_binop(context, v128::i8x16_ne),
            Instruction::I8x16LtS => self.run_v128_binop(context, v128::i8x16_lt_s),
            Instruction::I8x16LtU => self.run_v128_binop(context, v128::i8x16_lt_u),
            Instruction::I8x16GtS => self.run_v128_binop(context, v128::i8x16_gt_s),
            Instruction::I8x16GtU => self.run_v128_binop(context, v128::i8x16_gt_u),
            Instruction::I8x16LeS => self.run_v128_binop(context, v128::i8x16_le_s),
            Instruction::I8x16LeU => self.run_v128_binop(context, v128::i8x16_le_u),
            Instruction::I8x16GeS => self.run_v128_binop(context, v128::i8x16_ge_s),
            Instruction::I8x16GeU => self.run_v128_binop(context, v128::i8x16_ge_u),
            Instruction::I16x8Eq => self.run_v128_binop(context, v128::i16x8_eq),
            Instruction::I16x8Ne => self.run_v128_binop(context, v128::i16x8_ne),
            Instruction::I16x8LtS => self.run_v128_binop(context, v128::i16x8_lt_s),
            Instruction::I16x8LtU => self.run_v128_binop(context, v128::i16x8_lt_u),
            Instruction::I16x8GtS => self.run_v128_binop(context, v128::i16x8_gt_s),
            Instruction::I16x8GtU => self.run_v128_binop(context, v128::i16x8_gt_u),
            Instruction::I16x8LeS => self.run_v128_binop(context, v128::i16x8_le_s),
            Instruction::I16x8LeU => self.run_v128_binop(context, v128::i16x8_le_u),
            Instruction::I16x8GeS => self.run_v128_binop(context, v128::i16x8_ge_s),
            Instruction::I16x8GeU => self.run_v128_binop(context, v128::i16x8_ge_u),
            Instruction::I32x4Eq => self.run_v128_binop(context, v128::i32x4_eq),
            Instruction::I32x4Ne => self.run_v128_binop(context, v128::i32x4_ne),
            Instruction::I32x4LtS => self.run_v128_binop(context, v128::i32x4_lt_s),
            Instruction::I32x4LtU => self.run_v128_binop(context, v128::i32x4_lt_u),
            Instruction::I32x4GtS => self.run_v128_binop(context, v128::i32x4_gt_s),
            Instruction::I32x4GtU => self.run_v128_binop(context, v128::i32x4_gt_u),
            Instruction::I32x4LeS => self.run_v128_binop(context, v128::i32x4_le_s),
            Instruction::I32x4LeU => self.run_v128_binop(context, v128::i32x4_le_u),
            Instruction::I32x4GeS => self.run_v128_binop(context, v128::i32x4_ge_s),
            Instruction::I32x4GeU => self.run_v128_binop(context, v128::i32x4_ge_u),
            Instruction::I64x2Eq => self.run_v128_binop(context, v128::i64x2_eq),
            Instruction::I64x2Ne => self.run_v128_binop(context, v128::i64x2_ne),
            Instruction::I64x2LtS => self.run_v128_binop(context, v128::i64x2_lt_s),
            Instruction::I64x2GtS => self.run_v128_binop(context, v128::i64x2_gt_s),
            Instruction::I64x2LeS => self.run_v128_binop(context, v128::i64x2_le_s),
            Instruction::I64x2GeS => self.run_v128_binop(context, v128::i64x2_ge_s),
            Instruction::F32x4Eq => self.run_v128_binop(context, v128::f32x4_eq),
            Instruction::F32x4Ne => self.run_v128_binop(context, v128::f32x4_ne),
            Instruction::F32x4Lt => self.run_v128_binop(context, v128::f32x4_lt),
            Instruction::F32x4Gt => self.run_v128_binop(context, v128::f32x4_gt),
            Instruction::F32x4Le => self.run_v128_binop(context, v128::f32x4_le),
            Instruction::F32x4Ge => self.run_v128_binop(context, v128::f32x4_ge),
            Instruction::F64x2Eq => self.run_v128_binop(context, v128::f64x2_eq),
            Instruction::F64x2Ne => self.run_v128_binop(context, v128::f64x2_ne),
            Instruction::F64x2Lt => self.run_v128_binop(context, v128::f64x2_lt),
            Instruction::F64x2Gt => self.run_v128_binop(context, v128::f64x2_gt),
            Instruction::F64x2Le => self.run_v128_binop(context, v128::f64x2_le),
            Instruction::F64x2Ge => self.run_v128_binop(context, v128::f64x2_ge),

            Instruction::V128Not => self.run_v128_unop(context, v128::not),
            Instruction::V128And => self.run_v128_binop(context, v128::and),
            Instruction::V128AndNot => self.run_v128_binop(context, v128::andnot),
            Instruction::V128Or => self.run_v128_binop(context, v128::or),
            Instruction::V128Xor => self.run_v128_binop(context, v128::xor),
            Instruction::V128Bitselect => {
                let mask: V128 = context.value_stack.pop_as();
                let if_zero: V128 = context.value_stack.pop_as();
                let if_one: V128 = context.value_stack.pop_as();
                self.run_const(context, Value::V128(v128::bitselect(if_one, if_zero, mask)))
            }
            Instruction::V128AnyTrue => self.run_v128_test(context, V128::any_true),

            Instruction::I8x16Abs => self.run_v128_unop(context, v128::i8x16_abs),
            Instruction::I8x16Neg => self.run_v128_unop(context, v128::i8x16_neg),
            Instruction::I8x16Popcnt => self.run_v128_unop(context, v128::i8x16_popcnt),
            Instruction::I8x16AllTrue => self.run_v128_test(context, v128::i8x16_all_true),
            Instruction::I8x16Bitmask => self.run_v128_bitmask(context, v128::i8x16_bitmask),
            Instruction::I8x16NarrowI16x8S => {
                self.run_v128_binop(context, v128::i8x16_narrow_i16x8_s)
            }
            Instruction::I8x16NarrowI16x8U => {
                self.run_v128_binop(context, v128::i8x16_narrow_i16x8_u)
            }
            Instruction::I8x16Shl => self.run_v128_shift(context, v128::i8x16_shl),
            Instruction::I8x16ShrS => self.run_v128_shift(context, v128::i8x16_shr_s),
            Instruction::I8x16ShrU => self.run_v128_shift(context, v128::i8x16_shr_u),
            Instruction::I8x16Add => self.run_v128_binop(context, v128::i8x16_add),
            Instruction::I8x16AddSatS => self.run_v128_binop(context, v128::i8x16_add_sat_s),
            Instruction::I8x16AddSatU => self.run_v128_binop(context, v128::i8x16_add_sat_u),
            Instruction::I8x16Sub => self.run_v128_binop(context, v128::i8x16_sub),
            Instruction::I8x16SubSatS => self.run_v128_binop(context, v128::i8x16_sub_sat_s),
            Instruction::I8x16SubSatU => self.run_v128_binop(context, v128::i8x16_sub_sat_u),
            Instruction::I8x16MinS => self.run_v128_binop(context, v128::i8x16_min_s),
            Instruction::I8x16MinU => self.run_v128_binop(context, v128::i8x16_min_u),
            Instruction::I8x16MaxS => self.run_v128_binop(context, v128::i8x16_max_s),
            Instruction::I8x16MaxU => self.run_v128_binop(context, v128::i8x16_max_u),
            Instruction::I8x16AvgrU => self.run_v128_binop(context, v128::i8x16_avgr_u),

            Instruction::I16x8Abs => self.run_v128_unop(context, v128::i16x8_abs),
            Instruction::I16x8Neg => self.run_v128_unop(context, v128::i16x8_neg),
            Instruction::I16x8Q15MulrSatS => {
                self.run_v128_binop(context, v128::i16x8_q15mulr_sat_s)
            }
            Instruction::I16x8AllTrue => self.run_v128_test(context, v128::i16x8_all_true),
            Instruction::I16x8Bitmask => self.run_v128_bitmask(context, v128::i16x8_bitmask),
            Instruction::I16x8NarrowI32x4S => {
                self.run_v128_binop(context, v128::i16x8_narrow_i32x4_s)
            }
            Instruction::I16x8NarrowI32x4U => {
                self.run_v128_binop(context, v128::i16x8_narrow_i32x4_u)
            }
            Instruction::I16x8ExtendLowI8x16S => {
                self.run_v128_unop(context, v128::i16x8_extend_low_i8x16_s)
            }
            Instruction::I16x8ExtendHighI8x16S => {
                self.run_v128_unop(context, v128::i16x8_extend_high_i8x16_s)
            }
            Instruction::I16x8ExtendLowI8x16U => {
                self.run_v128_unop(context, v128::i16x8_extend_low_i8x16_u)
            }
            Instruction::I16x8ExtendHighI8x16U => {
                self.run_v128_unop(context, v128::i16x8_extend_high_i8x16_u)
            }
            Instruction::I16x8Shl => self.run_v128_shift(context, v128::i16x8_shl),
            Instruction::I16x8ShrS => self.run_v128_shift(context, v128::i16x8_shr_s),
            Instruction::I16x8ShrU => self.run_v128_shift(context, v128::i16x8_shr_u),
            Instruction::I16x8Add => self.run_v128_binop(context, v128::i16x8_add),
            Instruction::I16x8AddSatS => self.run_v128_binop(context, v128::i16x8_add_sat_s),
            Instruction::I16x8AddSatU => self.run_v128_binop(context, v128::i16x8_add_sat_u),
            Instruction::I16x8Sub => self.run_v128_binop(context, v128::i16x8_sub),
            Instruction::I16x8SubSatS => self.run_v128_binop(context, v128::i16x8_sub_sat_s),
            Instruction::I16x8SubSatU => self.run_v128_binop(context, v128::i16x8_sub_sat_u),
            Instruction::I16x8Mul => self.run_v128_binop(context, v128::i16x8_mul),
            Instruction::I16x8MinS => self.run_v128_binop(context, v128::i16x8_min_s),
            Instruction::I16x8MinU => self.run_v128_binop(context, v128::i16x8_min_u),
            Instruction::I16x8MaxS => self.run_v128_binop(context, v128::i16x8_max_s),
            Instruction::I16x8MaxU => self.run_v128_binop(context, v128::i16x8_max_u),
            Instruction::I16x8AvgrU => self.run_v128_binop(context, v128::i16x8_avgr_u),
            Instruction::I16x8ExtmulLowI8x16S => {
                self.run_v128_binop(context, v128::i16x8_extmul_low_i8x16_s)
            }
            Instruction::I16x8ExtmulHighI8x16S => {
                self.run_v128_binop(context, v128::i16x8_extmul_high_i8x16_s)
            }
            Instruction::I16x8ExtmulLowI8x16U => {
                self.run_v128_binop(context, v128::i16x8_extmul_low_i8x16_u)
            }
            Instruction::I16x8ExtmulHighI8x16U => {
                self.run_v128_binop(context, v128::i16x8_extmul_high_i8x16_u)
            }
            Instruction::I16x8ExtaddPairwiseI8x16S => {
                self.run_v128_unop(context, v128::i16x8_extadd_pairwise_i8x16_s)
            }
            Instruction::I16x8ExtaddPairwiseI8x16U => {
                self.run_v128_unop(context, v128::i16x8_extadd_pairwise_i8x16_u)
            }

            Instruction::I32x4Abs => self.run_v128_unop(context, v128::i32x4_abs),
            Instruction::I32x4Neg => self.run_v128_unop(context, v128::i32x4_neg),
            Instruction::I32x4AllTrue => self.run_v128_test(context, v128::i32x4_all_true),
            Instruction::I32x4Bitmask => self.run_v128_bitmask(context, v128::i32x4_bitmask),
            Instruction::I32x4ExtendLowI16x8S => {
                self.run_v128_unop(context, v128::i32x4_extend_low_i16x8_s)
            }
            Instruction::I32x4ExtendHighI16x8S => {
                self.run_v128_unop(context, v128::i32x4_extend_high_i16x8_s)
            }
            Instruction::I32x4ExtendLowI16x8U => {
                self.run_v128_unop(context, v128::i32x4_extend_low_i16x8_u)
            }
            Instruction::I32x4ExtendHighI16x8U => {
                self.run_v128_unop(context, v128::i32x4_extend_high_i16x8_u)
            }
            Instruction::I32x4Shl => self.run_v128_shift(context, v128::i32x4_shl),
            Instruction::I32x4ShrS => self.run_v128_shift(context, v128::i32x4_shr_s),
            Instruction::I32x4ShrU => self.run_v128_shift(context, v128::i32x4_shr_u),
            Instruction::I32x4Add => self.run_v128_binop(context, v128::i32x4_add),
            Instruction::I32x4Sub => self.run_v128_binop(context, v128::i32x4_sub),
            Instruction::I32x4Mul => self.run_v128_binop(context, v128::i32x4_mul),
            Instruction::I32x4MinS => self.run_v128_binop(context, v128::i32x4_min_s),
            Instruction::I32x4MinU => self.run_v128_binop(context, v128::i32x4_min_u),
            Instruction::I32x4MaxS => self.run_v128_binop(context, v128::i32x4_max_s),
            Instruction::I32x4MaxU => self.run_v128_binop(context, v128::i32x4_max_u),
            Instruction::I32x4DotI16x8S => self.run_v128_binop(context, v128::i32x4_dot_i16x8_s),
            Instruction::I32x4ExtmulLowI16x8S => {
                self.run_v128_binop(context, v128::i32x4_extmul_low_i16x8_s)
            }
            Instruction::I32x4ExtmulHighI16x8S => {
                self.run_v128_binop(context, v128::i32x4_extmul_high_i16x8_s)
            }
            Instruction::I32x4ExtmulLowI16x8U => {
                self.run_v128_binop(context, v128::i32x4_extmul_low_i16x8_u)
            }
            Instruction::I32x4ExtmulHighI16x8U => {
                self.run_v128_binop(context, v128::i32x4_extmul_high_i16x8_u)
            }
            Instruction::I32x4ExtaddPairwiseI16x8S => {
                self.run_v128_unop(context, v128::i32x4_extadd_pairwise_i16x8_s)
            }
            Instruction::I32x4ExtaddPairwiseI16x8U => {
                self.run_v128_unop(context, v128::i32x4_extadd_pairwise_i16x8_u)
            }

            Instruction::I64x2Abs => self.run_v128_unop(context, v128::i64x2_abs),
            Instruction::I64x2Neg => self.run_v128_unop(context, v128::i64x2_neg),
            Instruction::I64x2AllTrue => self.run_v128_test(context, v128::i64x2_all_true),
            Instruction::I64x2Bitmask => self.run_v128_bitmask(context, v128::i64x2_bitmask),
            Instruction::I64x2ExtendLowI32x4S => {
                self.run_v128_unop(context, v128::i64x2_extend_low_i32x4_s)
            }
            Instruction::I64x2ExtendHighI32x4S => {
                self.run_v128_unop(context, v128::i64x2_extend_high_i32x4_s)
            }
            Instruction::I64x2ExtendLowI32x4U => {
                self.run_v128_unop(context, v128::i64x2_extend_low_i32x4_u)
            }
            Instruction::I64x2ExtendHighI32x4U => {
                self.run_v128_unop(context, v128::i64x2_extend_high_i32x4_u)
            }
            Instruction::I64x2Shl => self.run_v128_shift(context, v128::i64x2_shl),
            Instruction::I64x2ShrS => self.run_v128_shift(context, v128::i64x2_shr_s),
            Instruction::I64x2ShrU => self.run_v128_shift(context, v128::i64x2_shr_u),
            Instruction::I64x2Add => self.run_v128_binop(context, v128::i64x2_add),
            Instruction::I64x2Sub => self.run_v128_binop(context, v128::i64x2_sub),
            Instruction::I64x2Mul => self.run_v128_binop(context, v128::i64x2_mul),
            Instruction::I64x2ExtmulLowI32x4S => {
                self.run_v128_binop(context, v128::i64x2_extmul_low_i32x4_s)
            }
            Instruction::I64x2ExtmulHighI32x4S => {
                self.run_v128_binop(context, v128::i64x2_extmul_high_i32x4_s)
            }
            Instruction::I64x2ExtmulLowI32x4U => {
                self.run_v128_binop(context, v128::i64x2_extmul_low_i32x4_u)
            }
            Instruction::I64x2ExtmulHighI32x4U => {
                self.run_v128_binop(context, v128::i64x2_extmul_high_i32x4_u)
            }

            Instruction::F32x4Abs => self.run_v128_unop(context, v128::f32x4_abs),
            Instruction::F32x4Neg => self.run_v128_unop(context, v128::f32x4_neg),
            Instruction::F32x4Sqrt => self.run_v128_unop(context, v128::f32x4_sqrt),
            Instruction::F32x4Ceil => self.run_v128_unop(context, v128::f32x4_ceil),
            Instruction::F32x4Floor => self.run_v128_unop(context, v128::f32x4_floor),
            Instruction::F32x4Trunc => self.run_v128_unop(context, v128::f32x4_trunc),
            Instruction::F32x4Nearest => self.run_v128_unop(context, v128::f32x4_nearest),
            Instruction::F32x4Add => self.run_v128_binop(context, v128::f32x4_add),
            Instruction::F32x4Sub => self.run_v128_binop(context, v128::f32x4_sub),
            Instruction::F32x4Mul => self.run_v128_binop(context, v128::f32x4_mul),
            Instruction::F32x4Div => self.run_v128_binop(context, v128::f32x4_div),
            Instruction::F32x4Min => self.run_v128_binop(context, v128::f32x4_min),
            Instruction::F32x4Max => self.run_v128_binop(context, v128::f32x4_max),
            Instruction::F32x4Pmin => self.run_v128_binop(context, v128::f32x4_pmin),
            Instruction::F32x4Pmax => self.run_v128_binop(context, v128::f32x4_pmax),

            Instruction::F64x2Abs => self.run_v128_unop(context, v128::f64x2_abs),
            Instruction::F64x2Neg => self.run_v128_unop(context, v128::f64x2_neg),
            Instruction::F64x2Sqrt => self.run_v128_unop(context, v128::f64x2_sqrt),
            Instruction::F64x2Ceil => self.run_v128_unop(context, v128::f64x2_ceil),
            Instruction::F64x2Floor => self.run_v128_unop(context, v128::f64x2_floor),
            Instruction::F64x2Trunc => self.run_v128_unop(context, v128::f64x2_trunc),
            Instruction::F64x2Nearest => self.run_v128_unop(context, v128::f64x2_nearest),
            Instruction::F64x2Add => self.run_v128_binop(context, v128::f64x2_add),
            Instruction::F64x2Sub => self.run_v128_binop(context, v128::f64x2_sub),
            Instruction::F64x2Mul => self.run_v128_binop(context, v128::f64x2_mul),
            Instruction::F64x2Div => self.run_v128_binop(context, v128::f64x2_div),
            Instruction::F64x2Min => self.run_v128_binop(context, v128::f64x2_min),
            Instruction::F64x2Max => self.run_v128_binop(context, v128::f64x2_max),
            Instruction::F64x2Pmin => self.run_v128_binop(context, v128::f64x2_pmin),
            Instruction::F64x2Pmax => self.run_v128_binop(context, v128::f64x2_pmax),

            Instruction::I32x4TruncSatF32x4S => {
                self.run_v128_unop(context, v128::i32x4_trunc_sat_f32x4_s)
            }
            Instruction::I32x4TruncSatF32x4U => {
                self.run_v128_unop(context, v128::i32x4_trunc_sat_f32x4_u)
            }
            Instruction::I32x4TruncSatF64x2SZero => {
                self.run_v128_unop(context, v128::i32x4_trunc_sat_f64x2_s_zero)
            }
            Instruction::I32x4TruncSatF64x2UZero => {
                self.run_v128_unop(context, v128::i32x4_trunc_sat_f64x2_u_zero)
            }
            Instruction::F32x4ConvertI32x4S => {
                self.run_v128_unop(context, v128::f32x4_convert_i32x4_s)
            }
            Instruction::F32x4ConvertI32x4U => {
                self.run_v128_unop(context, v128::f32x4_convert_i32x4_u)
            }
            Instruction::F64x2ConvertLowI32x4S => {
                self.run_v128_unop(context, v128::f64x2_convert_low_i32x4_s)
            }
            Instruction::F64x2ConvertLowI32x4U => {
                self.run_v128_unop(context, v128::f64x2_convert_low_i32x4_u)
            }
            Instruction::F32x4DemoteF64x2Zero => {
                self.run_v128_unop(context, v128::f32x4_demote_f64x2_zero)
            }
            Instruction::F64x2PromoteLowF32x4 => {
                self.run_v128_unop(context, v128::f64x2_promote_low_f32x4)
            }

            other => unreachable!("every instruction is dispatched; got {:?}", other),
        }
    }
}

/// Per-call execution state.
struct FunctionContext {
    /// The executed function.
    function: FuncRef,
    module: ModuleRef,
    /// Arguments followed by zero-initialized declared locals.
    locals: Vec<Value>,
    value_stack: ValueStack,
    /// Current instruction position.
    position: u32,
}

impl FunctionContext {
    fn new(function: FuncRef, args: Vec<Value>) -> Self {
        let module = match function.as_internal() {
            FuncInstanceInternal::Internal { module, .. } => {
                module.upgrade().expect("module deallocated")
            }
            FuncInstanceInternal::Host { .. } => {
                panic!("host functions are invoked through `Externals`, never as frames; qed")
            }
        };
        let body = function
            .body()
            .expect("just matched an internal function; qed");

        let mut locals = args;
        for &(count, value_type) in &body.locals {
            for _ in 0..count {
                locals.push(Value::default(value_type));
            }
        }

        FunctionContext {
            function,
            module: ModuleRef(module),
            locals,
            value_stack: ValueStack::new(),
            position: 0,
        }
    }

    fn module(&self) -> ModuleRef {
        self.module.clone()
    }

    fn memory(&self, index: u32) -> MemoryRef {
        self.module
            .memory_by_index(index)
            .expect("Due to validation memory should exist")
    }
}

impl fmt::Debug for FunctionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FunctionContext")
    }
}

/// Pops the dynamic address operand and adds the static offset, trapping on
/// overflow; the memory bounds themselves are checked by the access that
/// follows.
fn effective_address(
    context: &mut FunctionContext,
    memory: &MemoryRef,
    memarg: &MemArg,
) -> Result<u64, TrapKind> {
    let raw_address = pop_address(context, memory.address_type());
    memarg
        .offset
        .checked_add(raw_address)
        .ok_or(TrapKind::MemoryAccessOutOfBounds)
}

fn pop_address(context: &mut FunctionContext, address_type: AddressType) -> u64 {
    match address_type {
        AddressType::I32 => u64::from(context.value_stack.pop_as::<u32>()),
        AddressType::I64 => context.value_stack.pop_as::<u64>(),
    }
}

fn push_address(
    context: &mut FunctionContext,
    address_type: AddressType,
    value: u64,
) -> Result<(), TrapKind> {
    let value = match address_type {
        AddressType::I32 => Value::I32(value as u32 as i32),
        AddressType::I64 => Value::I64(value as i64),
    };
    context.value_stack.push(value)
}

/// The length operand of `memory.copy` is typed after the narrower of the
/// two memories.
fn pop_copy_length(
    context: &mut FunctionContext,
    dst: &MemoryRef,
    src: &MemoryRef,
) -> u64 {
    if dst.address_type() == AddressType::I32 || src.address_type() == AddressType::I32 {
        u64::from(context.value_stack.pop_as::<u32>())
    } else {
        context.value_stack.pop_as::<u64>()
    }
}

fn pop_table_copy_length(
    context: &mut FunctionContext,
    dst: &TableRef,
    src: &TableRef,
) -> u64 {
    if dst.address_type() == AddressType::I32 || src.address_type() == AddressType::I32 {
        u64::from(context.value_stack.pop_as::<u32>())
    } else {
        context.value_stack.pop_as::<u64>()
    }
}

pub(crate) fn check_function_args(signature: &Signature, args: &[Value]) -> Result<(), Trap> {
    if signature.params().len() != args.len() {
        return Err(TrapKind::UnexpectedSignature.into());
    }

    if signature
        .params()
        .iter()
        .zip(args.iter().map(|arg| arg.value_type()))
        .any(|(expected_type, actual_type)| &actual_type != expected_type)
    {
        return Err(TrapKind::UnexpectedSignature.into());
    }

    Ok(())
}

/// Operand stack of one activation frame.
struct ValueStack {
    buf: Vec<Value>,
}

impl fmt::Debug for ValueStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStack")
            .field("entries", &self.buf)
            .finish()
    }
}

impl ValueStack {
    fn new() -> ValueStack {
        ValueStack { buf: Vec::new() }
    }

    #[inline]
    fn push(&mut self, value: Value) -> Result<(), TrapKind> {
        if self.buf.len() == DEFAULT_VALUE_STACK_LIMIT {
            return Err(TrapKind::StackOverflow);
        }
        self.buf.push(value);
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Value {
        self.buf
            .pop()
            .expect("the stack is never empty on pop due to validation")
    }

    #[inline]
    fn pop_as<T>(&mut self) -> T
    where
        T: FromValue,
    {
        self.pop()
            .try_into()
            .expect("the top value has the popped type due to validation")
    }

    #[inline]
    fn pop_pair_as<T>(&mut self) -> (T, T)
    where
        T: FromValue,
    {
        let right = self.pop_as();
        let left = self.pop_as();
        (left, right)
    }

    #[inline]
    fn top(&self) -> &Value {
        self.buf
            .last()
            .expect("the stack is never empty on peek due to validation")
    }

    /// Pops the top `count` values, preserving their push order.
    fn pop_many(&mut self, count: usize) -> Vec<Value> {
        let split_at = self.buf.len() - count;
        self.buf.split_off(split_at)
    }

    /// Branch truncation: erase the range `[height, len - arity)`, keeping
    /// the top `arity` values as the branch results.
    fn truncate_keeping(&mut self, height: u32, arity: u32) {
        let keep_from = self.buf.len() - arity as usize;
        self.buf.drain(height as usize..keep_from);
    }
}
