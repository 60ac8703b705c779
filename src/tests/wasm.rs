use super::{assert_trap, instantiate, parse_wat, run};
use crate::memory_units::Pages;
use crate::{
    Error, FuncRef, GlobalDescriptor, GlobalInstance, GlobalRef, ImportsBuilder, MemoryDescriptor,
    MemoryInstance, MemoryRef, ModuleImportResolver, ModuleInstance, NopExternals, Signature,
    TableDescriptor, TableInstance, TableRef, Value,
};

struct Env {
    table_base: GlobalRef,
    memory_base: GlobalRef,
    memory: MemoryRef,
    table: TableRef,
}

impl Env {
    fn new() -> Env {
        Env {
            table_base: GlobalInstance::alloc(Value::I32(0), false),
            memory_base: GlobalInstance::alloc(Value::I32(0), false),
            memory: MemoryInstance::alloc(Pages(256), None).unwrap(),
            table: TableInstance::alloc(
                crate::ValueType::FuncRef,
                64,
                None,
                crate::AddressType::I32,
                Value::FuncRef(None),
            )
            .unwrap(),
        }
    }
}

impl ModuleImportResolver for Env {
    fn resolve_func(&self, _field_name: &str, _func_type: &Signature) -> Result<FuncRef, Error> {
        Err(Error::Instantiation(
            "env module doesn't provide any functions".into(),
        ))
    }

    fn resolve_global(
        &self,
        field_name: &str,
        _global_type: &GlobalDescriptor,
    ) -> Result<GlobalRef, Error> {
        match field_name {
            "tableBase" => Ok(self.table_base.clone()),
            "memoryBase" => Ok(self.memory_base.clone()),
            _ => Err(Error::Instantiation(format!(
                "env module doesn't provide global '{}'",
                field_name
            ))),
        }
    }

    fn resolve_memory(
        &self,
        field_name: &str,
        _memory_type: &MemoryDescriptor,
    ) -> Result<MemoryRef, Error> {
        match field_name {
            "memory" => Ok(self.memory.clone()),
            _ => Err(Error::Instantiation(format!(
                "env module doesn't provide memory '{}'",
                field_name
            ))),
        }
    }

    fn resolve_table(
        &self,
        field_name: &str,
        _table_type: &TableDescriptor,
    ) -> Result<TableRef, Error> {
        match field_name {
            "table" => Ok(self.table.clone()),
            _ => Err(Error::Instantiation(format!(
                "env module doesn't provide table '{}'",
                field_name
            ))),
        }
    }
}

#[test]
fn factorial() {
    let instance = instantiate(
        r#"
        (module
            (func $fac (export "fac") (param i64) (result i64)
                local.get 0
                i64.const 1
                i64.lt_s
                if (result i64)
                    i64.const 1
                else
                    local.get 0
                    local.get 0
                    i64.const 1
                    i64.sub
                    call $fac
                    i64.mul
                end))
        "#,
    );
    assert_eq!(
        run(&instance, "fac", &[Value::I64(0)]).unwrap(),
        vec![Value::I64(1)]
    );
    assert_eq!(
        run(&instance, "fac", &[Value::I64(5)]).unwrap(),
        vec![Value::I64(120)]
    );
    assert_eq!(
        run(&instance, "fac", &[Value::I64(20)]).unwrap(),
        vec![Value::I64(2_432_902_008_176_640_000)]
    );
}

#[test]
fn fibonacci_with_loop() {
    let instance = instantiate(
        r#"
        (module
            (func (export "fib") (param i32) (result i64)
                (local $a i64) (local $b i64) (local $tmp i64)
                i64.const 0
                local.set $a
                i64.const 1
                local.set $b
                block $done
                    loop $loop
                        local.get 0
                        i32.eqz
                        br_if $done
                        local.get $b
                        local.set $tmp
                        local.get $a
                        local.get $b
                        i64.add
                        local.set $b
                        local.get $tmp
                        local.set $a
                        local.get 0
                        i32.const 1
                        i32.sub
                        local.set 0
                        br $loop
                    end
                end
                local.get $a))
        "#,
    );
    assert_eq!(
        run(&instance, "fib", &[Value::I32(0)]).unwrap(),
        vec![Value::I64(0)]
    );
    assert_eq!(
        run(&instance, "fib", &[Value::I32(10)]).unwrap(),
        vec![Value::I64(55)]
    );
    assert_eq!(
        run(&instance, "fib", &[Value::I32(50)]).unwrap(),
        vec![Value::I64(12_586_269_025)]
    );
}

#[test]
fn memory_program_with_imported_env() {
    let env = Env::new();
    let module = parse_wat(
        r#"
        (module
            (import "env" "memory" (memory 1))
            (import "env" "memoryBase" (global $base i32))
            (func (export "store_at_base") (param i32)
                global.get $base
                local.get 0
                i32.store)
            (func (export "load_from_base") (result i32)
                global.get $base
                i32.load))
        "#,
    );
    let instance = ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env))
        .expect("instantiation failed")
        .assert_no_start();

    instance
        .invoke_export("store_at_base", &[Value::I32(0x2A)], &mut NopExternals)
        .unwrap();
    assert_eq!(
        instance
            .invoke_export("load_from_base", &[], &mut NopExternals)
            .unwrap(),
        vec![Value::I32(0x2A)]
    );
    // The module wrote through to the host-owned memory.
    assert_eq!(env.memory.get_value::<i32>(0).unwrap(), 0x2A);
}

#[test]
fn linking_through_registered_instance() {
    let library = instantiate(
        r#"
        (module
            (global (export "offset") i32 (i32.const 40))
            (func (export "add_offset") (param i32) (result i32)
                local.get 0
                global.get 0
                i32.add))
        "#,
    );

    let client_module = parse_wat(
        r#"
        (module
            (import "library" "add_offset" (func $add_offset (param i32) (result i32)))
            (import "library" "offset" (global $offset i32))
            (func (export "f") (result i32)
                i32.const 2
                call $add_offset)
            (func (export "g") (result i32)
                global.get $offset))
        "#,
    );

    // Registering the instantiated library under a name makes its exports
    // visible to the client's imports.
    let mut imports = ImportsBuilder::new();
    imports.push_resolver("library", &library);
    let client = ModuleInstance::new(&client_module, &imports)
        .expect("instantiation failed")
        .assert_no_start();

    assert_eq!(
        client.invoke_export("f", &[], &mut NopExternals).unwrap(),
        vec![Value::I32(42)]
    );
    assert_eq!(
        client.invoke_export("g", &[], &mut NopExternals).unwrap(),
        vec![Value::I32(40)]
    );
}

#[test]
fn shared_table_dispatch_across_modules() {
    let env = Env::new();

    let provider_module = parse_wat(
        r#"
        (module
            (import "env" "table" (table 64 funcref))
            (func $ten (result i32) i32.const 10)
            (elem (i32.const 0) $ten))
        "#,
    );
    let _provider = ModuleInstance::new(
        &provider_module,
        &ImportsBuilder::new().with_resolver("env", &env),
    )
    .expect("instantiation failed")
    .assert_no_start();

    let caller_module = parse_wat(
        r#"
        (module
            (import "env" "table" (table 64 funcref))
            (type $t (func (result i32)))
            (func (export "call") (param i32) (result i32)
                local.get 0
                call_indirect (type $t)))
        "#,
    );
    let caller = ModuleInstance::new(
        &caller_module,
        &ImportsBuilder::new().with_resolver("env", &env),
    )
    .expect("instantiation failed")
    .assert_no_start();

    // The provider's element segment landed in the shared table.
    assert_eq!(
        caller
            .invoke_export("call", &[Value::I32(0)], &mut NopExternals)
            .unwrap(),
        vec![Value::I32(10)]
    );
}

#[test]
fn import_type_mismatch_is_rejected() {
    let library = instantiate(
        r#"
        (module
            (func (export "f") (param i32) (result i32)
                local.get 0))
        "#,
    );

    // The client wants (i64) -> i64 under the same name.
    let client_module = parse_wat(
        r#"
        (module
            (import "library" "f" (func (param i64) (result i64))))
        "#,
    );

    let mut imports = ImportsBuilder::new();
    imports.push_resolver("library", &library);
    assert!(ModuleInstance::new(&client_module, &imports).is_err());
}

#[test]
fn memory_limits_subset_check_on_import() {
    let env = Env::new();

    // Requests a larger minimum than env provides.
    let module = parse_wat(
        r#"
        (module
            (import "env" "memory" (memory 512)))
        "#,
    );
    assert!(
        ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env)).is_err()
    );

    // A compatible request works.
    let module = parse_wat(
        r#"
        (module
            (import "env" "memory" (memory 1)))
        "#,
    );
    assert!(
        ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env)).is_ok()
    );
}

#[test]
fn string_search_program() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (data (i32.const 0) "the quick brown fox")
            ;; Returns the index of the first occurrence of the byte, or -1.
            (func (export "index_of") (param $needle i32) (result i32)
                (local $i i32)
                block $not_found
                    loop $scan
                        local.get $i
                        i32.const 19
                        i32.ge_u
                        br_if $not_found
                        local.get $i
                        i32.load8_u
                        local.get $needle
                        i32.eq
                        if
                            local.get $i
                            return
                        end
                        local.get $i
                        i32.const 1
                        i32.add
                        local.set $i
                        br $scan
                    end
                end
                i32.const -1))
        "#,
    );
    assert_eq!(
        run(&instance, "index_of", &[Value::I32(b'q' as i32)]).unwrap(),
        vec![Value::I32(4)]
    );
    assert_eq!(
        run(&instance, "index_of", &[Value::I32(b'x' as i32)]).unwrap(),
        vec![Value::I32(18)]
    );
    assert_eq!(
        run(&instance, "index_of", &[Value::I32(b'z' as i32)]).unwrap(),
        vec![Value::I32(-1)]
    );
}

#[test]
fn simd_sum_of_squares() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            ;; Sums the squares of 4 consecutive i32 values, vectorized.
            (func (export "sum_squares") (param $addr i32) (result i32)
                (local $v v128)
                local.get $addr
                v128.load
                local.tee $v
                local.get $v
                i32x4.mul
                (local.set $v)
                (i32.add
                    (i32.add
                        (i32x4.extract_lane 0 (local.get $v))
                        (i32x4.extract_lane 1 (local.get $v)))
                    (i32.add
                        (i32x4.extract_lane 2 (local.get $v))
                        (i32x4.extract_lane 3 (local.get $v)))))
            (func (export "put") (param i32 i32)
                local.get 0
                local.get 1
                i32.store))
        "#,
    );
    for (i, value) in [1, 2, 3, 4].iter().enumerate() {
        run(
            &instance,
            "put",
            &[Value::I32(i as i32 * 4), Value::I32(*value)],
        )
        .unwrap();
    }
    assert_eq!(
        run(&instance, "sum_squares", &[Value::I32(0)]).unwrap(),
        vec![Value::I32(1 + 4 + 9 + 16)]
    );
}

#[test]
fn out_of_bounds_segment_aborts_instantiation() {
    let module = parse_wat(
        r#"
        (module
            (memory 1)
            (data (i32.const 65534) "abcdef"))
        "#,
    );
    assert!(ModuleInstance::new(&module, &ImportsBuilder::default()).is_err());
}

#[test]
fn trapping_start_function_aborts_instantiation() {
    let module = parse_wat(
        r#"
        (module
            (func $boom unreachable)
            (start $boom))
        "#,
    );
    let not_started = ModuleInstance::new(&module, &ImportsBuilder::default()).unwrap();
    assert!(not_started.run_start(&mut NopExternals).is_err());
}

#[test]
fn state_persists_after_trap() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "write_then_trap")
                i32.const 0
                i32.const 77
                i32.store
                unreachable)
            (func (export "read") (result i32)
                i32.const 0
                i32.load))
        "#,
    );
    assert_trap(run(&instance, "write_then_trap", &[]), "unreachable");
    // The store committed before the trap is observable afterwards.
    assert_eq!(run(&instance, "read", &[]).unwrap(), vec![Value::I32(77)]);
}
