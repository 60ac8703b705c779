use super::parse_wat;
use crate::memory_units::Pages;
use crate::{
    Error, Externals, FuncInstance, FuncRef, HostError, ImportsBuilder, MemoryInstance, MemoryRef,
    ModuleImportResolver, ModuleInstance, ModuleRef, RuntimeArgs, Signature, Trap, TrapKind, Value,
    ValueType,
};
use assert_matches::assert_matches;

#[derive(Debug, Clone, PartialEq)]
struct HostErrorWithCode {
    error_code: u32,
}

impl ::core::fmt::Display for HostErrorWithCode {
    fn fmt(&self, f: &mut ::core::fmt::Formatter) -> Result<(), ::core::fmt::Error> {
        write!(f, "{}", self.error_code)
    }
}

impl HostError for HostErrorWithCode {}

/// Host state for the test environment.
///
/// This struct can be used as an external function executor and
/// as an imports provider.
struct TestHost {
    memory: Option<MemoryRef>,
    instance: Option<ModuleRef>,
}

impl TestHost {
    fn new() -> TestHost {
        TestHost {
            memory: Some(MemoryInstance::alloc(Pages(1), Some(Pages(1))).unwrap()),
            instance: None,
        }
    }
}

/// sub(a: i32, b: i32) -> i32
///
/// This function just subtracts one integer from another,
/// returning the subtraction result.
const SUB_FUNC_INDEX: usize = 0;

/// err(error_code: i32) -> !
///
/// This function traps upon a call.
/// The trap has a special type - HostErrorWithCode.
const ERR_FUNC_INDEX: usize = 1;

/// inc_mem(ptr: *mut u8)
///
/// Increments the value at the given address in memory. This function
/// requires attached memory.
const INC_MEM_FUNC_INDEX: usize = 2;

/// get_mem(ptr: *mut u8) -> u8
///
/// Returns the value at the given address in memory. This function
/// requires attached memory.
const GET_MEM_FUNC_INDEX: usize = 3;

/// recurse<T>(val: T) -> T
///
/// If called, resolves the exported function named 'recursive' from the
/// attached module instance and then calls into it with the provided
/// argument. Note that this function is polymorphic over type T.
/// This function requires an attached module instance.
const RECURSE_FUNC_INDEX: usize = 4;

impl Externals for TestHost {
    fn invoke_index(&mut self, index: usize, args: RuntimeArgs) -> Result<Vec<Value>, Trap> {
        match index {
            SUB_FUNC_INDEX => {
                let a: i32 = args.nth(0);
                let b: i32 = args.nth(1);

                Ok(vec![(a.wrapping_sub(b)).into()])
            }
            ERR_FUNC_INDEX => {
                let error_code: u32 = args.nth(0);
                let error = HostErrorWithCode { error_code };
                Err(TrapKind::Host(Box::new(error)).into())
            }
            INC_MEM_FUNC_INDEX => {
                let ptr: u32 = args.nth(0);

                let memory = self
                    .memory
                    .as_ref()
                    .expect("Function 'inc_mem' expects attached memory");
                let mut buf = [0u8; 1];
                memory.get_into(u64::from(ptr), &mut buf).unwrap();
                buf[0] += 1;
                memory.set(u64::from(ptr), &buf).unwrap();

                Ok(vec![])
            }
            GET_MEM_FUNC_INDEX => {
                let ptr: u32 = args.nth(0);

                let memory = self
                    .memory
                    .as_ref()
                    .expect("Function 'get_mem' expects attached memory");
                let mut buf = [0u8; 1];
                memory.get_into(u64::from(ptr), &mut buf).unwrap();

                Ok(vec![Value::I32(buf[0] as i32)])
            }
            RECURSE_FUNC_INDEX => {
                let val = args
                    .nth_value_checked(0)
                    .expect("Exactly one argument expected");

                let instance = self
                    .instance
                    .as_ref()
                    .expect("Function 'recurse' expects an attached module instance")
                    .clone();
                let mut result = instance
                    .invoke_export("recursive", &[val], self)
                    .expect("Failed to call 'recursive'");
                assert_eq!(result.len(), 1, "expected a single result");
                Ok(vec![result.remove(0)])
            }
            _ => panic!("env doesn't provide function at index {}", index),
        }
    }
}

impl TestHost {
    fn check_signature(&self, index: usize, signature: &Signature) -> bool {
        if index == RECURSE_FUNC_INDEX {
            // polymorphic function, signature is not known statically
            return true;
        }

        let (params, results): (&[ValueType], &[ValueType]) = match index {
            SUB_FUNC_INDEX => (&[ValueType::I32, ValueType::I32], &[ValueType::I32]),
            ERR_FUNC_INDEX => (&[ValueType::I32], &[]),
            INC_MEM_FUNC_INDEX => (&[ValueType::I32], &[]),
            GET_MEM_FUNC_INDEX => (&[ValueType::I32], &[ValueType::I32]),
            _ => return false,
        };

        signature.params() == params && signature.results() == results
    }
}

impl ModuleImportResolver for TestHost {
    fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
        let index = match field_name {
            "sub" => SUB_FUNC_INDEX,
            "err" => ERR_FUNC_INDEX,
            "inc_mem" => INC_MEM_FUNC_INDEX,
            "get_mem" => GET_MEM_FUNC_INDEX,
            "recurse" => RECURSE_FUNC_INDEX,
            _ => {
                return Err(Error::Instantiation(format!(
                    "Export {} not found",
                    field_name
                )));
            }
        };

        if !self.check_signature(index, signature) {
            return Err(Error::Instantiation(format!(
                "Export `{}` doesn't match expected type {:?}",
                field_name, signature
            )));
        }

        Ok(FuncInstance::alloc_host(signature.clone(), index))
    }
}

#[test]
fn call_host_func() {
    let module = parse_wat(
        r#"
        (module
            (import "env" "sub" (func $sub (param i32 i32) (result i32)))
            (func (export "test") (result i32)
                i32.const 5
                i32.const 7
                call $sub))
        "#,
    );

    let mut env = TestHost::new();

    let instance = ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env))
        .expect("Failed to instantiate module")
        .assert_no_start();

    assert_eq!(
        instance.invoke_export("test", &[], &mut env).unwrap(),
        vec![Value::I32(-2)]
    );
}

#[test]
fn host_err_is_reported_with_code() {
    let module = parse_wat(
        r#"
        (module
            (import "env" "err" (func $err (param i32)))
            (func (export "test")
                i32.const 228
                call $err))
        "#,
    );

    let mut env = TestHost::new();

    let instance = ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env))
        .expect("Failed to instantiate module")
        .assert_no_start();

    let error = instance
        .invoke_export("test", &[], &mut env)
        .expect_err("`test` expected to return an error");
    let host_error = error
        .as_host_error()
        .expect("`test` expected to return a host error")
        .downcast_ref::<HostErrorWithCode>()
        .expect("Failed to downcast to expected error type");
    assert_eq!(host_error.error_code, 228);
}

#[test]
fn host_func_can_mutate_host_memory() {
    let module = parse_wat(
        r#"
        (module
            (import "env" "inc_mem" (func $inc_mem (param i32)))
            (import "env" "get_mem" (func $get_mem (param i32) (result i32)))
            (func (export "test") (result i32)
                i32.const 1
                call $inc_mem
                i32.const 1
                call $inc_mem
                i32.const 1
                call $get_mem))
        "#,
    );

    let mut env = TestHost::new();

    let instance = ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env))
        .expect("Failed to instantiate module")
        .assert_no_start();

    assert_eq!(
        instance.invoke_export("test", &[], &mut env).unwrap(),
        vec![Value::I32(2)]
    );
    assert_eq!(
        env.memory.as_ref().unwrap().get_value::<u8>(1).unwrap(),
        2u8
    );
}

#[test]
fn host_function_can_reenter_the_interpreter() {
    let module = parse_wat(
        r#"
        (module
            (import "env" "recurse" (func $recurse (param i64) (result i64)))
            (func $recursive (export "recursive") (param i64) (result i64)
                local.get 0
                i64.const 0
                i64.gt_s
                if (result i64)
                    local.get 0
                    i64.const 1
                    i64.sub
                    call $recurse
                    local.get 0
                    i64.add
                else
                    i64.const 0
                end)
            (func (export "test") (result i64)
                i64.const 5
                call $recursive))
        "#,
    );

    let mut env = TestHost::new();
    let instance = ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env))
        .expect("Failed to instantiate module")
        .assert_no_start();
    env.instance = Some(instance.clone());

    assert_eq!(
        instance.invoke_export("test", &[], &mut env).unwrap(),
        // 5 + 4 + 3 + 2 + 1
        vec![Value::I64(15)]
    );
}

#[test]
fn import_with_mismatched_signature_is_rejected() {
    let module = parse_wat(
        r#"
        (module
            (import "env" "sub" (func $sub (param i64 i64) (result i64))))
        "#,
    );

    let env = TestHost::new();
    assert_matches!(
        ModuleInstance::new(&module, &ImportsBuilder::new().with_resolver("env", &env)),
        Err(Error::Instantiation(_))
    );
}

#[test]
fn defer_providing_externals() {
    // An `Externals` implementation can be distinct from the import
    // resolver; state is only needed at invocation time.
    struct HostImportResolver;

    impl ModuleImportResolver for HostImportResolver {
        fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
            if field_name != "host_fn" {
                return Err(Error::Instantiation(format!(
                    "Export {} not found",
                    field_name
                )));
            }
            Ok(FuncInstance::alloc_host(signature.clone(), 0))
        }
    }

    struct HostExternals<'a> {
        acc: &'a mut u32,
    }

    impl<'a> Externals for HostExternals<'a> {
        fn invoke_index(&mut self, index: usize, args: RuntimeArgs) -> Result<Vec<Value>, Trap> {
            assert_eq!(index, 0);
            let arg: u32 = args.nth(0);
            *self.acc += arg;
            Ok(vec![])
        }
    }

    let module = parse_wat(
        r#"
        (module
            (import "host" "host_fn" (func $host_fn (param i32)))
            (func (export "test")
                i32.const 2
                call $host_fn
                i32.const 3
                call $host_fn))
        "#,
    );

    let instance = ModuleInstance::new(
        &module,
        &ImportsBuilder::new().with_resolver("host", &HostImportResolver),
    )
    .expect("Failed to instantiate module")
    .assert_no_start();

    let mut acc = 0;
    {
        let mut externals = HostExternals { acc: &mut acc };
        instance
            .invoke_export("test", &[], &mut externals)
            .unwrap();
    }
    assert_eq!(acc, 5);
}

#[test]
fn host_function_returning_wrong_type_traps() {
    struct BadHost;

    impl Externals for BadHost {
        fn invoke_index(&mut self, _index: usize, _args: RuntimeArgs) -> Result<Vec<Value>, Trap> {
            // Promised an i32, returns an i64.
            Ok(vec![Value::I64(0)])
        }
    }

    impl ModuleImportResolver for BadHost {
        fn resolve_func(&self, _field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
            Ok(FuncInstance::alloc_host(signature.clone(), 0))
        }
    }

    let module = parse_wat(
        r#"
        (module
            (import "bad" "f" (func $f (result i32)))
            (func (export "test") (result i32)
                call $f))
        "#,
    );

    let instance = ModuleInstance::new(
        &module,
        &ImportsBuilder::new().with_resolver("bad", &BadHost),
    )
    .expect("Failed to instantiate module")
    .assert_no_start();

    let result = instance.invoke_export("test", &[], &mut BadHost);
    assert_matches!(result, Err(Error::Trap(trap)) => {
        assert_matches!(trap.kind(), TrapKind::UnexpectedSignature);
    });
}
