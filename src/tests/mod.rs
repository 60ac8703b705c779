mod host;
mod wasm;

use super::Error;
use crate::{
    Externals, ImportsBuilder, Module, ModuleInstance, ModuleRef, NopExternals, TrapKind, Value,
};
use assert_matches::assert_matches;

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}
fn assert_std_err_impl<T: ::std::error::Error>() {}

#[test]
fn assert_error_properties() {
    assert_send::<Error>();
    assert_sync::<Error>();
    assert_std_err_impl::<Error>();
}

pub(crate) fn parse_wat(source: &str) -> Module {
    let wasm_binary = wat::parse_str(source).expect("Failed to parse wat source");
    Module::from_buffer(wasm_binary).expect("Failed to load parsed module")
}

pub(crate) fn instantiate(source: &str) -> ModuleRef {
    instantiate_with(source, &mut NopExternals)
}

pub(crate) fn instantiate_with<E: Externals>(source: &str, externals: &mut E) -> ModuleRef {
    let module = parse_wat(source);
    ModuleInstance::new(&module, &ImportsBuilder::default())
        .expect("Failed to instantiate module")
        .run_start(externals)
        .expect("Failed to run start function")
}

pub(crate) fn run(instance: &ModuleRef, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
    instance.invoke_export(name, args, &mut NopExternals)
}

#[track_caller]
pub(crate) fn assert_trap(result: Result<Vec<Value>, Error>, expected: &str) {
    match result {
        Err(Error::Trap(trap)) => {
            let kind_matches = match (trap.kind(), expected) {
                (TrapKind::Unreachable, "unreachable")
                | (TrapKind::MemoryAccessOutOfBounds, "memory oob")
                | (TrapKind::TableAccessOutOfBounds, "table oob")
                | (TrapKind::ElemUninitialized, "uninitialized")
                | (TrapKind::DivisionByZero, "division by zero")
                | (TrapKind::IntegerOverflow, "integer overflow")
                | (TrapKind::InvalidConversionToInt, "conversion")
                | (TrapKind::StackOverflow, "stack overflow")
                | (TrapKind::UnexpectedSignature, "signature") => true,
                _ => false,
            };
            assert!(
                kind_matches,
                "expected {} trap, got {:?}",
                expected,
                trap.kind()
            );
        }
        other => panic!("expected a trap, got {:?}", other),
    }
}

// Scenario: a module with one function returning a constant.

#[test]
fn invoke_const_function() {
    let instance = instantiate(
        r#"
        (module
            (func (export "main") (result i32)
                i32.const 42))
        "#,
    );
    assert_eq!(run(&instance, "main", &[]).unwrap(), vec![Value::I32(42)]);
}

// Scenario: signed division and its traps.

#[test]
fn signed_division() {
    let instance = instantiate(
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s))
        "#,
    );
    assert_eq!(
        run(&instance, "div", &[Value::I32(10), Value::I32(3)]).unwrap(),
        vec![Value::I32(3)]
    );
    assert_trap(
        run(&instance, "div", &[Value::I32(i32::MIN), Value::I32(-1)]),
        "integer overflow",
    );
    assert_trap(
        run(&instance, "div", &[Value::I32(5), Value::I32(0)]),
        "division by zero",
    );
}

#[test]
fn remainder_of_min_by_minus_one() {
    let instance = instantiate(
        r#"
        (module
            (func (export "rem") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.rem_s))
        "#,
    );
    assert_eq!(
        run(&instance, "rem", &[Value::I32(i32::MIN), Value::I32(-1)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_trap(
        run(&instance, "rem", &[Value::I32(5), Value::I32(0)]),
        "division by zero",
    );
}

// Scenario: a load that exactly reaches the end of memory succeeds; one byte
// past it traps.

#[test]
fn load_at_memory_edge() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "read") (param i32) (result i32)
                local.get 0
                i32.load))
        "#,
    );
    assert_eq!(
        run(&instance, "read", &[Value::I32(65532)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_trap(run(&instance, "read", &[Value::I32(65533)]), "memory oob");
}

// Scenario: a conditional branch out of a block skips the `local.set`.

#[test]
fn conditional_branch_out_of_block() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param i32) (result i32) (local i32)
                block $b (result i32)
                    local.get 0
                    local.get 0
                    i32.eqz
                    br_if $b
                    drop
                    i32.const 1
                    local.set 1
                    i32.const 2
                end
                local.get 1
                i32.add))
        "#,
    );
    // Branch taken: the carried value is the parameter (0) and the local was
    // never written, so the sum is 0.
    assert_eq!(
        run(&instance, "f", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(0)]
    );
    // Fall-through: block result 2 plus the written local 1.
    assert_eq!(
        run(&instance, "f", &[Value::I32(7)]).unwrap(),
        vec![Value::I32(3)]
    );
}

#[test]
fn unreachable_traps() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f")
                unreachable))
        "#,
    );
    assert_trap(run(&instance, "f", &[]), "unreachable");
}

#[test]
fn loop_branch_continues_at_head() {
    let instance = instantiate(
        r#"
        (module
            (func (export "sum_to") (param i32) (result i32) (local i32)
                block
                    loop
                        local.get 0
                        i32.eqz
                        br_if 1
                        local.get 1
                        local.get 0
                        i32.add
                        local.set 1
                        local.get 0
                        i32.const 1
                        i32.sub
                        local.set 0
                        br 0
                    end
                end
                local.get 1))
        "#,
    );
    assert_eq!(
        run(&instance, "sum_to", &[Value::I32(10)]).unwrap(),
        vec![Value::I32(55)]
    );
    assert_eq!(
        run(&instance, "sum_to", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(0)]
    );
}

#[test]
fn br_table_selects_target() {
    let instance = instantiate(
        r#"
        (module
            (func (export "classify") (param i32) (result i32)
                block
                    block
                        block
                            local.get 0
                            br_table 0 1 2
                        end
                        i32.const 10
                        return
                    end
                    i32.const 20
                    return
                end
                i32.const 30))
        "#,
    );
    assert_eq!(
        run(&instance, "classify", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(10)]
    );
    assert_eq!(
        run(&instance, "classify", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(20)]
    );
    // Out-of-range indices take the default target.
    assert_eq!(
        run(&instance, "classify", &[Value::I32(17)]).unwrap(),
        vec![Value::I32(30)]
    );
}

#[test]
fn if_without_else_falls_through() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param i32) (result i32) (local i32)
                local.get 0
                if
                    i32.const 5
                    local.set 1
                end
                local.get 1))
        "#,
    );
    assert_eq!(
        run(&instance, "f", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(5)]
    );
    assert_eq!(
        run(&instance, "f", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(0)]
    );
}

#[test]
fn if_else_arms() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param i32) (result i32)
                local.get 0
                if (result i32)
                    i32.const 1
                else
                    i32.const 2
                end))
        "#,
    );
    assert_eq!(
        run(&instance, "f", &[Value::I32(123)]).unwrap(),
        vec![Value::I32(1)]
    );
    assert_eq!(
        run(&instance, "f", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(2)]
    );
}

#[test]
fn multi_value_results() {
    let instance = instantiate(
        r#"
        (module
            (func (export "divmod") (param i32 i32) (result i32 i32)
                local.get 0
                local.get 1
                i32.div_u
                local.get 0
                local.get 1
                i32.rem_u))
        "#,
    );
    assert_eq!(
        run(&instance, "divmod", &[Value::I32(17), Value::I32(5)]).unwrap(),
        vec![Value::I32(3), Value::I32(2)]
    );
}

#[test]
fn block_with_params() {
    let instance = instantiate(
        r#"
        (module
            (type $swap (func (param i32 i32) (result i32 i32)))
            (func (export "f") (result i32)
                i32.const 10
                i32.const 3
                block (type $swap)
                    i32.sub
                    i32.const 100
                end
                i32.add))
        "#,
    );
    assert_eq!(run(&instance, "f", &[]).unwrap(), vec![Value::I32(107)]);
}

#[test]
fn select_picks_by_condition() {
    let instance = instantiate(
        r#"
        (module
            (func (export "sel") (param i32) (result i64)
                i64.const 111
                i64.const 222
                local.get 0
                select))
        "#,
    );
    assert_eq!(
        run(&instance, "sel", &[Value::I32(1)]).unwrap(),
        vec![Value::I64(111)]
    );
    assert_eq!(
        run(&instance, "sel", &[Value::I32(0)]).unwrap(),
        vec![Value::I64(222)]
    );
}

#[test]
fn typed_select_on_references() {
    let instance = instantiate(
        r#"
        (module
            (func (export "sel") (param i32) (result i32)
                ref.null extern
                ref.null extern
                local.get 0
                select (result externref)
                ref.is_null))
        "#,
    );
    assert_eq!(
        run(&instance, "sel", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(1)]
    );
}

#[test]
fn globals_are_readable_and_writable() {
    let instance = instantiate(
        r#"
        (module
            (global $g (mut i32) (i32.const 7))
            (func (export "bump") (result i32)
                global.get $g
                i32.const 1
                i32.add
                global.set $g
                global.get $g))
        "#,
    );
    assert_eq!(run(&instance, "bump", &[]).unwrap(), vec![Value::I32(8)]);
    assert_eq!(run(&instance, "bump", &[]).unwrap(), vec![Value::I32(9)]);
}

#[test]
fn start_function_runs_on_instantiation() {
    let instance = instantiate(
        r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func $init
                i32.const 99
                global.set $g)
            (start $init)
            (func (export "get") (result i32)
                global.get $g))
        "#,
    );
    assert_eq!(run(&instance, "get", &[]).unwrap(), vec![Value::I32(99)]);
}

#[test]
fn stack_exhaustion_traps() {
    let instance = instantiate(
        r#"
        (module
            (func $f (export "f")
                call $f))
        "#,
    );
    assert_trap(run(&instance, "f", &[]), "stack overflow");
}

#[test]
fn invoke_with_wrong_signature_fails() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param i32)))
        "#,
    );
    assert_matches!(
        run(&instance, "f", &[Value::I64(1)]),
        Err(Error::Trap(_))
    );
    assert_matches!(run(&instance, "f", &[]), Err(Error::Trap(_)));
}

// Floating point semantics.

#[test]
fn float_min_max_zero_signs() {
    let instance = instantiate(
        r#"
        (module
            (func (export "min") (param f64 f64) (result f64)
                local.get 0
                local.get 1
                f64.min)
            (func (export "max") (param f64 f64) (result f64)
                local.get 0
                local.get 1
                f64.max))
        "#,
    );
    let pos = Value::F64(0.0f64.into());
    let neg = Value::F64((-0.0f64).into());

    for args in [[pos.clone(), neg.clone()], [neg.clone(), pos.clone()]] {
        let result = run(&instance, "min", &args).unwrap();
        assert_matches!(&result[..], [Value::F64(v)] => assert_eq!(v.to_bits(), (-0.0f64).to_bits()));
        let result = run(&instance, "max", &args).unwrap();
        assert_matches!(&result[..], [Value::F64(v)] => assert_eq!(v.to_bits(), 0.0f64.to_bits()));
    }

    let nan = Value::F64(f64::NAN.into());
    let result = run(&instance, "min", &[nan, Value::F64(1.0.into())]).unwrap();
    assert_matches!(&result[..], [Value::F64(v)] => assert!(v.is_nan()));
}

#[test]
fn float_nearest_ties_to_even() {
    let instance = instantiate(
        r#"
        (module
            (func (export "nearest") (param f32) (result f32)
                local.get 0
                f32.nearest))
        "#,
    );
    let nearest = |input: f32| -> f32 {
        let result = run(&instance, "nearest", &[Value::F32(input.into())]).unwrap();
        match &result[..] {
            [Value::F32(v)] => v.to_float(),
            _ => panic!("expected a single f32"),
        }
    };
    assert_eq!(nearest(2.5), 2.0);
    assert_eq!(nearest(3.5), 4.0);
    assert_eq!(nearest(-0.5), -0.0);
}

#[test]
fn float_to_int_truncation_traps() {
    let instance = instantiate(
        r#"
        (module
            (func (export "trunc") (param f64) (result i32)
                local.get 0
                i32.trunc_f64_s)
            (func (export "trunc_sat") (param f64) (result i32)
                local.get 0
                i32.trunc_sat_f64_s))
        "#,
    );
    assert_eq!(
        run(&instance, "trunc", &[Value::F64((-7.9f64).into())]).unwrap(),
        vec![Value::I32(-7)]
    );
    assert_trap(
        run(&instance, "trunc", &[Value::F64(f64::NAN.into())]),
        "conversion",
    );
    assert_trap(
        run(&instance, "trunc", &[Value::F64(3e10f64.into())]),
        "conversion",
    );

    assert_eq!(
        run(&instance, "trunc_sat", &[Value::F64(f64::NAN.into())]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        run(&instance, "trunc_sat", &[Value::F64(3e10f64.into())]).unwrap(),
        vec![Value::I32(i32::MAX)]
    );
    assert_eq!(
        run(&instance, "trunc_sat", &[Value::F64(f64::NEG_INFINITY.into())]).unwrap(),
        vec![Value::I32(i32::MIN)]
    );
}

#[test]
fn reinterpret_round_trips() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f32_bits") (param i32) (result i32)
                local.get 0
                f32.reinterpret_i32
                i32.reinterpret_f32)
            (func (export "f64_bits") (param i64) (result i64)
                local.get 0
                f64.reinterpret_i64
                i64.reinterpret_f64))
        "#,
    );
    for bits in [0, 1, -1, 0x7f80_0001u32 as i32, i32::MIN] {
        assert_eq!(
            run(&instance, "f32_bits", &[Value::I32(bits)]).unwrap(),
            vec![Value::I32(bits)]
        );
    }
    let nan_bits = 0x7ff8_0000_0000_1234u64 as i64;
    assert_eq!(
        run(&instance, "f64_bits", &[Value::I64(nan_bits)]).unwrap(),
        vec![Value::I64(nan_bits)]
    );
}

#[test]
fn sign_extension_operators() {
    let instance = instantiate(
        r#"
        (module
            (func (export "ext8") (param i32) (result i32)
                local.get 0
                i32.extend8_s)
            (func (export "ext32") (param i64) (result i64)
                local.get 0
                i64.extend32_s))
        "#,
    );
    assert_eq!(
        run(&instance, "ext8", &[Value::I32(0x1FF)]).unwrap(),
        vec![Value::I32(-1)]
    );
    assert_eq!(
        run(&instance, "ext8", &[Value::I32(0x17F)]).unwrap(),
        vec![Value::I32(0x7F)]
    );
    assert_eq!(
        run(&instance, "ext32", &[Value::I64(0x1_8000_0000)]).unwrap(),
        vec![Value::I64(-0x8000_0000i64)]
    );
}

#[test]
fn wrapping_integer_arithmetic() {
    let instance = instantiate(
        r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add)
            (func (export "rot") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.rotl))
        "#,
    );
    assert_eq!(
        run(&instance, "add", &[Value::I32(i32::MAX), Value::I32(1)]).unwrap(),
        vec![Value::I32(i32::MIN)]
    );
    assert_eq!(
        run(&instance, "rot", &[Value::I32(0x4000_0001), Value::I32(1)]).unwrap(),
        vec![Value::I32(0x8000_0003u32 as i32)]
    );
}

// Memory instructions.

#[test]
fn memory_grow_returns_previous_size() {
    let instance = instantiate(
        r#"
        (module
            (memory 1 3)
            (func (export "grow") (param i32) (result i32)
                local.get 0
                memory.grow)
            (func (export "size") (result i32)
                memory.size))
        "#,
    );
    assert_eq!(run(&instance, "size", &[]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(
        run(&instance, "grow", &[Value::I32(2)]).unwrap(),
        vec![Value::I32(1)]
    );
    // Beyond the maximum: -1, with no side effect.
    assert_eq!(
        run(&instance, "grow", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(-1)]
    );
    assert_eq!(run(&instance, "size", &[]).unwrap(), vec![Value::I32(3)]);
}

#[test]
fn memory_fill_then_load() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "fill") (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                memory.fill)
            (func (export "load8") (param i32) (result i32)
                local.get 0
                i32.load8_u))
        "#,
    );
    run(
        &instance,
        "fill",
        &[Value::I32(16), Value::I32(0x1AB), Value::I32(4)],
    )
    .unwrap();
    // The fill value is taken modulo 256.
    assert_eq!(
        run(&instance, "load8", &[Value::I32(17)]).unwrap(),
        vec![Value::I32(0xAB)]
    );
    assert_eq!(
        run(&instance, "load8", &[Value::I32(20)]).unwrap(),
        vec![Value::I32(0)]
    );
    // Out-of-bounds fill traps without writing anything.
    assert_trap(
        run(
            &instance,
            "fill",
            &[Value::I32(65535), Value::I32(1), Value::I32(2)],
        ),
        "memory oob",
    );
}

#[test]
fn memory_copy_handles_overlap() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (data (i32.const 0) "\00\01\02\03\04\05\06\07\08\09")
            (func (export "copy") (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                memory.copy)
            (func (export "load8") (param i32) (result i32)
                local.get 0
                i32.load8_u))
        "#,
    );
    // Forward overlap: dst 4, src 0, len 6.
    run(
        &instance,
        "copy",
        &[Value::I32(4), Value::I32(0), Value::I32(6)],
    )
    .unwrap();
    let expected = [0, 1, 2, 3, 0, 1, 2, 3, 4, 5];
    for (address, value) in expected.iter().enumerate() {
        assert_eq!(
            run(&instance, "load8", &[Value::I32(address as i32)]).unwrap(),
            vec![Value::I32(*value)]
        );
    }
}

#[test]
fn memory_init_and_data_drop() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (data $seg "abcdef")
            (func (export "init") (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                memory.init $seg)
            (func (export "drop")
                data.drop $seg)
            (func (export "load8") (param i32) (result i32)
                local.get 0
                i32.load8_u))
        "#,
    );
    run(
        &instance,
        "init",
        &[Value::I32(100), Value::I32(2), Value::I32(3)],
    )
    .unwrap();
    assert_eq!(
        run(&instance, "load8", &[Value::I32(100)]).unwrap(),
        vec![Value::I32(b'c' as i32)]
    );

    run(&instance, "drop", &[]).unwrap();
    // A dropped segment behaves as if it had length zero: only zero-length
    // accesses at offset zero stay in bounds.
    run(
        &instance,
        "init",
        &[Value::I32(0), Value::I32(0), Value::I32(0)],
    )
    .unwrap();
    assert_trap(
        run(
            &instance,
            "init",
            &[Value::I32(0), Value::I32(0), Value::I32(1)],
        ),
        "memory oob",
    );
}

#[test]
fn memory64_addressing() {
    let instance = instantiate(
        r#"
        (module
            (memory i64 1)
            (func (export "store") (param i64 i64)
                local.get 0
                local.get 1
                i64.store)
            (func (export "load") (param i64) (result i64)
                local.get 0
                i64.load)
            (func (export "size") (result i64)
                memory.size))
        "#,
    );
    run(&instance, "store", &[Value::I64(8), Value::I64(0x0123_4567_89ab_cdef)]).unwrap();
    assert_eq!(
        run(&instance, "load", &[Value::I64(8)]).unwrap(),
        vec![Value::I64(0x0123_4567_89ab_cdef)]
    );
    assert_eq!(run(&instance, "size", &[]).unwrap(), vec![Value::I64(1)]);
    assert_trap(run(&instance, "load", &[Value::I64(65536)]), "memory oob");
}

// Table instructions and indirect calls.

#[test]
fn call_indirect_dispatch() {
    let instance = instantiate(
        r#"
        (module
            (type $t (func (result i32)))
            (table 2 funcref)
            (elem (i32.const 0) $a $b)
            (func $a (result i32) i32.const 10)
            (func $b (result i32) i32.const 20)
            (func (export "call") (param i32) (result i32)
                local.get 0
                call_indirect (type $t)))
        "#,
    );
    assert_eq!(
        run(&instance, "call", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(10)]
    );
    assert_eq!(
        run(&instance, "call", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(20)]
    );
    assert_trap(run(&instance, "call", &[Value::I32(2)]), "table oob");
}

#[test]
fn call_indirect_null_and_signature_mismatch() {
    let instance = instantiate(
        r#"
        (module
            (type $t (func (result i32)))
            (table 2 funcref)
            (elem (i32.const 0) $wrong)
            (func $wrong (param i32))
            (func (export "call") (param i32) (result i32)
                local.get 0
                call_indirect (type $t)))
        "#,
    );
    assert_trap(run(&instance, "call", &[Value::I32(0)]), "signature");
    assert_trap(run(&instance, "call", &[Value::I32(1)]), "uninitialized");
}

#[test]
fn table_get_set_grow() {
    let instance = instantiate(
        r#"
        (module
            (table $t 1 4 funcref)
            (func $f (result i32) i32.const 7)
            (func (export "setup") (result i32)
                i32.const 0
                ref.func $f
                table.set $t
                ref.null func
                i32.const 2
                table.grow $t)
            (func (export "size") (result i32)
                table.size $t)
            (func (export "is_set") (param i32) (result i32)
                local.get 0
                table.get $t
                ref.is_null
                i32.eqz)
            (elem declare func $f))
        "#,
    );
    assert_eq!(run(&instance, "setup", &[]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(run(&instance, "size", &[]).unwrap(), vec![Value::I32(3)]);
    assert_eq!(
        run(&instance, "is_set", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(1)]
    );
    assert_eq!(
        run(&instance, "is_set", &[Value::I32(1)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_trap(run(&instance, "is_set", &[Value::I32(3)]), "table oob");
}

#[test]
fn table_fill_and_copy() {
    let instance = instantiate(
        r#"
        (module
            (table $t 8 externref)
            (func (export "fill") (param i32 externref i32)
                local.get 0
                local.get 1
                local.get 2
                table.fill $t)
            (func (export "copy") (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                table.copy $t $t)
            (func (export "is_null") (param i32) (result i32)
                local.get 0
                table.get $t
                ref.is_null))
        "#,
    );
    run(
        &instance,
        "fill",
        &[Value::I32(2), Value::ExternRef(Some(5)), Value::I32(3)],
    )
    .unwrap();
    assert_eq!(
        run(&instance, "is_null", &[Value::I32(2)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        run(&instance, "is_null", &[Value::I32(5)]).unwrap(),
        vec![Value::I32(1)]
    );

    // Copy the filled range over itself, shifted by one.
    run(
        &instance,
        "copy",
        &[Value::I32(3), Value::I32(2), Value::I32(3)],
    )
    .unwrap();
    assert_eq!(
        run(&instance, "is_null", &[Value::I32(5)]).unwrap(),
        vec![Value::I32(0)]
    );

    assert_trap(
        run(
            &instance,
            "copy",
            &[Value::I32(6), Value::I32(0), Value::I32(3)],
        ),
        "table oob",
    );
}

#[test]
fn table_init_and_elem_drop() {
    let instance = instantiate(
        r#"
        (module
            (table $t 4 funcref)
            (func $f (result i32) i32.const 1)
            (elem $seg funcref (ref.func $f))
            (func (export "init")
                i32.const 0
                i32.const 0
                i32.const 1
                table.init $t $seg)
            (func (export "drop")
                elem.drop $seg))
        "#,
    );
    run(&instance, "init", &[]).unwrap();
    run(&instance, "drop", &[]).unwrap();
    assert_trap(run(&instance, "init", &[]), "table oob");
}

#[test]
fn ref_func_and_is_null() {
    let instance = instantiate(
        r#"
        (module
            (func $f)
            (elem declare func $f)
            (func (export "not_null") (result i32)
                ref.func $f
                ref.is_null)
            (func (export "null") (result i32)
                ref.null func
                ref.is_null))
        "#,
    );
    assert_eq!(run(&instance, "not_null", &[]).unwrap(), vec![Value::I32(0)]);
    assert_eq!(run(&instance, "null", &[]).unwrap(), vec![Value::I32(1)]);
}

#[test]
fn extended_const_initializer() {
    let instance = instantiate(
        r#"
        (module
            (global $g i32 (i32.add (i32.const 40) (i32.mul (i32.const 1) (i32.const 2))))
            (func (export "get") (result i32)
                global.get $g))
        "#,
    );
    assert_eq!(run(&instance, "get", &[]).unwrap(), vec![Value::I32(42)]);
}

// SIMD.

#[test]
fn simd_splat_add_extract() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param i32 i32) (result i32)
                local.get 0
                i32x4.splat
                local.get 1
                i32x4.splat
                i32x4.add
                i32x4.extract_lane 3))
        "#,
    );
    assert_eq!(
        run(&instance, "f", &[Value::I32(40), Value::I32(2)]).unwrap(),
        vec![Value::I32(42)]
    );
}

#[test]
fn simd_const_and_lane_ops() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (result i32)
                v128.const i8x16 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
                i8x16.extract_lane_u 9)
            (func (export "replace") (param i64) (result i64)
                v128.const i64x2 1 2
                local.get 0
                i64x2.replace_lane 1
                i64x2.extract_lane 1))
        "#,
    );
    assert_eq!(run(&instance, "f", &[]).unwrap(), vec![Value::I32(9)]);
    assert_eq!(
        run(&instance, "replace", &[Value::I64(-5)]).unwrap(),
        vec![Value::I64(-5)]
    );
}

#[test]
fn simd_saturating_and_compare() {
    let instance = instantiate(
        r#"
        (module
            (func (export "sat") (result i32)
                v128.const i8x16 100 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
                v128.const i8x16 100 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
                i8x16.add_sat_s
                i8x16.extract_lane_s 0)
            (func (export "cmp") (result i32)
                v128.const i32x4 1 2 3 4
                v128.const i32x4 1 0 3 0
                i32x4.eq
                i32x4.bitmask))
        "#,
    );
    assert_eq!(run(&instance, "sat", &[]).unwrap(), vec![Value::I32(127)]);
    assert_eq!(run(&instance, "cmp", &[]).unwrap(), vec![Value::I32(0b0101)]);
}

#[test]
fn simd_any_all_true() {
    let instance = instantiate(
        r#"
        (module
            (func (export "any") (param i32) (result i32)
                local.get 0
                i32x4.splat
                v128.any_true)
            (func (export "all") (result i32)
                v128.const i32x4 1 2 3 0
                i32x4.all_true))
        "#,
    );
    assert_eq!(
        run(&instance, "any", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        run(&instance, "any", &[Value::I32(3)]).unwrap(),
        vec![Value::I32(1)]
    );
    assert_eq!(run(&instance, "all", &[]).unwrap(), vec![Value::I32(0)]);
}

#[test]
fn simd_shuffle_and_swizzle() {
    let instance = instantiate(
        r#"
        (module
            (func (export "shuffle") (result i32)
                v128.const i8x16 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
                v128.const i8x16 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
                i8x16.shuffle 0 16 1 17 2 18 3 19 4 20 5 21 6 22 7 23
                i8x16.extract_lane_u 1)
            (func (export "swizzle") (result i32)
                v128.const i8x16 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25
                v128.const i8x16 3 0 0 0 0 0 0 0 0 0 0 0 0 0 0 99
                i8x16.swizzle
                i8x16.extract_lane_u 0))
        "#,
    );
    assert_eq!(run(&instance, "shuffle", &[]).unwrap(), vec![Value::I32(16)]);
    assert_eq!(run(&instance, "swizzle", &[]).unwrap(), vec![Value::I32(13)]);
}

#[test]
fn simd_memory_round_trip() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "store") (param i32 i64 i64)
                local.get 0
                local.get 1
                i64x2.splat
                local.get 2
                i64x2.replace_lane 1
                v128.store)
            (func (export "load_hi") (param i32) (result i64)
                local.get 0
                v128.load
                i64x2.extract_lane 1))
        "#,
    );
    run(
        &instance,
        "store",
        &[Value::I32(0), Value::I64(11), Value::I64(22)],
    )
    .unwrap();
    assert_eq!(
        run(&instance, "load_hi", &[Value::I32(0)]).unwrap(),
        vec![Value::I64(22)]
    );
    assert_trap(
        run(
            &instance,
            "store",
            &[Value::I32(65521), Value::I64(0), Value::I64(0)],
        ),
        "memory oob",
    );
}

#[test]
fn simd_float_arithmetic() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (param f32 f32) (result f32)
                local.get 0
                f32x4.splat
                local.get 1
                f32x4.splat
                f32x4.mul
                f32x4.extract_lane 2))
        "#,
    );
    assert_eq!(
        run(
            &instance,
            "f",
            &[Value::F32(1.5f32.into()), Value::F32(4.0f32.into())]
        )
        .unwrap(),
        vec![Value::F32(6.0f32.into())]
    );
}

#[test]
fn simd_shifts_modulo_lane_width() {
    let instance = instantiate(
        r#"
        (module
            (func (export "shl") (param i32) (result i32)
                v128.const i32x4 1 1 1 1
                local.get 0
                i32x4.shl
                i32x4.extract_lane 0))
        "#,
    );
    assert_eq!(
        run(&instance, "shl", &[Value::I32(33)]).unwrap(),
        vec![Value::I32(2)]
    );
}

#[test]
fn simd_bitselect() {
    let instance = instantiate(
        r#"
        (module
            (func (export "f") (result i32)
                v128.const i32x4 -1 -1 -1 -1
                v128.const i32x4 0 0 0 0
                v128.const i32x4 0xFF 0 0xFF 0
                v128.bitselect
                i32x4.extract_lane 0))
        "#,
    );
    assert_eq!(run(&instance, "f", &[]).unwrap(), vec![Value::I32(0xFF)]);
}

#[test]
fn simd_load_extend_and_zero() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (data (i32.const 0) "\ff\01\02\03\04\05\06\07")
            (func (export "extend") (result i32)
                i32.const 0
                v128.load8x8_s
                i16x8.extract_lane_s 0)
            (func (export "zero") (result i32)
                i32.const 0
                v128.load32_zero
                i32x4.extract_lane 1))
        "#,
    );
    assert_eq!(run(&instance, "extend", &[]).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(run(&instance, "zero", &[]).unwrap(), vec![Value::I32(0)]);
}
