use super::validate_module;
use crate::decode::decode_module;
use crate::isa::{BranchTarget, Instruction};
use crate::module::Module;
use crate::Error;
use assert_matches::assert_matches;

fn validate_wat(source: &str) -> Result<Module, Error> {
    let wasm = wat::parse_str(source).expect("Failed to parse wat source");
    let mut module = decode_module(&wasm).expect("Failed to decode module");
    validate_module(&mut module)?;
    Ok(module)
}

#[track_caller]
fn assert_invalid(source: &str) {
    assert_matches!(validate_wat(source), Err(Error::Validation(_)));
}

#[track_caller]
fn assert_valid(source: &str) {
    if let Err(error) = validate_wat(source) {
        panic!("expected a valid module, got {}", error);
    }
}

#[test]
fn operand_type_mismatch() {
    assert_invalid(
        r#"
        (module
            (func (result i32)
                i32.const 1
                i64.const 2
                i32.add))
        "#,
    );
}

#[test]
fn stack_underflow() {
    assert_invalid(
        r#"
        (module
            (func (result i32)
                i32.add))
        "#,
    );
}

#[test]
fn missing_result() {
    assert_invalid(
        r#"
        (module
            (func (result i32)))
        "#,
    );
}

#[test]
fn leftover_values_at_end() {
    assert_invalid(
        r#"
        (module
            (func
                i32.const 1))
        "#,
    );
}

#[test]
fn branch_depth_out_of_range() {
    assert_invalid(
        r#"
        (module
            (func
                block
                    br 5
                end))
        "#,
    );
}

#[test]
fn local_index_out_of_range() {
    assert_invalid(
        r#"
        (module
            (func (param i32)
                local.get 3
                drop))
        "#,
    );
}

#[test]
fn global_index_out_of_range() {
    assert_invalid(
        r#"
        (module
            (func (result i32)
                global.get 0))
        "#,
    );
}

#[test]
fn set_of_immutable_global() {
    assert_invalid(
        r#"
        (module
            (global $g i32 (i32.const 0))
            (func
                i32.const 1
                global.set $g))
        "#,
    );
}

#[test]
fn polymorphic_stack_after_unreachable() {
    assert_valid(
        r#"
        (module
            (func (result i32)
                unreachable
                i32.add))
        "#,
    );
    assert_valid(
        r#"
        (module
            (func (result i64)
                block (result i64)
                    i64.const 1
                    br 0
                    ;; unreachable, arbitrarily typed
                    i32.add
                    drop
                end))
        "#,
    );
}

#[test]
fn unreachable_does_not_leak_into_outer_frame() {
    // The polymorphic stack ends at the enclosing block; the outer frame
    // still needs a real value.
    assert_invalid(
        r#"
        (module
            (func (result i32)
                block
                    unreachable
                end))
        "#,
    );
}

#[test]
fn if_without_else_needs_matching_types() {
    assert_invalid(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                if (result i32)
                    i32.const 1
                end))
        "#,
    );
    assert_valid(
        r#"
        (module
            (func (param i32) (result i32)
                i32.const 7
                local.get 0
                if (param i32) (result i32)
                    i32.const 1
                    i32.add
                end))
        "#,
    );
}

#[test]
fn untyped_select_rejects_references() {
    assert_invalid(
        r#"
        (module
            (func (param i32) (result funcref)
                ref.null func
                ref.null func
                local.get 0
                select))
        "#,
    );
}

#[test]
fn select_operands_must_match() {
    assert_invalid(
        r#"
        (module
            (func (param i32) (result i32)
                i32.const 1
                i64.const 2
                local.get 0
                select))
        "#,
    );
}

#[test]
fn alignment_must_not_exceed_width() {
    assert_invalid(
        r#"
        (module
            (memory 1)
            (func (result i32)
                i32.const 0
                i32.load align=8))
        "#,
    );
    assert_valid(
        r#"
        (module
            (memory 1)
            (func (result i32)
                i32.const 0
                i32.load align=4))
        "#,
    );
}

#[test]
fn load_requires_a_memory() {
    assert_invalid(
        r#"
        (module
            (func (result i32)
                i32.const 0
                i32.load))
        "#,
    );
}

#[test]
fn duplicate_export_names() {
    assert_invalid(
        r#"
        (module
            (func $a)
            (func $b)
            (export "f" (func $a))
            (export "f" (func $b)))
        "#,
    );
}

#[test]
fn start_function_must_have_empty_signature() {
    assert_invalid(
        r#"
        (module
            (func $f (param i32))
            (start $f))
        "#,
    );
}

#[test]
fn constant_expressions() {
    // Imported constant globals are addressable.
    assert_valid(
        r#"
        (module
            (import "env" "base" (global $base i32))
            (global $g i32 (global.get $base)))
        "#,
    );
    // Module-defined globals are not.
    assert_invalid(
        r#"
        (module
            (global $a i32 (i32.const 1))
            (global $b i32 (global.get $a)))
        "#,
    );
    // Imported mutable globals are not constant.
    assert_invalid(
        r#"
        (module
            (import "env" "base" (global $base (mut i32)))
            (global $g i32 (global.get $base)))
        "#,
    );
    // Extended constant arithmetic is allowed and type-checked.
    assert_valid(
        r#"
        (module
            (global $g i64 (i64.sub (i64.const 2) (i64.const 1))))
        "#,
    );
    assert_invalid(
        r#"
        (module
            (global $g i32 (i32.add (i32.const 1) (i64.const 2))))
        "#,
    );
    // The result type must match the declaration.
    assert_invalid(
        r#"
        (module
            (global $g i32 (i64.const 1)))
        "#,
    );
}

#[test]
fn segment_offset_type_must_match_address_type() {
    assert_invalid(
        r#"
        (module
            (memory 1)
            (data (i64.const 0) "x"))
        "#,
    );
    assert_valid(
        r#"
        (module
            (memory i64 1)
            (data (i64.const 0) "x"))
        "#,
    );
}

#[test]
fn ref_func_requires_declaration() {
    assert_invalid(
        r#"
        (module
            (func $f)
            (func (export "get") (result funcref)
                ref.func $f))
        "#,
    );
    assert_valid(
        r#"
        (module
            (func $f)
            (elem declare func $f)
            (func (export "get") (result funcref)
                ref.func $f))
        "#,
    );
}

#[test]
fn call_indirect_requires_funcref_table() {
    assert_invalid(
        r#"
        (module
            (table 1 externref)
            (type $t (func))
            (func
                i32.const 0
                call_indirect (type $t)))
        "#,
    );
}

#[test]
fn simd_lane_indices_are_bounded() {
    assert_invalid(
        r#"
        (module
            (func (result i32)
                v128.const i32x4 0 0 0 0
                i32x4.extract_lane 4))
        "#,
    );
    assert_valid(
        r#"
        (module
            (func (result i32)
                v128.const i32x4 0 0 0 0
                i32x4.extract_lane 3))
        "#,
    );
}

#[test]
fn table_init_element_type_must_match() {
    assert_invalid(
        r#"
        (module
            (table $t 4 externref)
            (func $f)
            (elem $seg funcref (ref.func $f))
            (func
                i32.const 0
                i32.const 0
                i32.const 1
                table.init $t $seg))
        "#,
    );
}

#[test]
fn branches_are_rewritten_to_labels() {
    let module = validate_wat(
        r#"
        (module
            (func (param i32) (result i32)
                block $b (result i32)
                    local.get 0
                    local.get 0
                    br_if $b
                    i32.const 7
                    i32.add
                end))
        "#,
    )
    .unwrap();

    // block, local.get, local.get, br_if, const, add, end(block), end
    let code = module.code[0].code.as_slice();
    assert_matches!(&code[3], Instruction::BrIf(BranchTarget::Resolved(label)) => {
        // Continuation is the instruction after the block's `end`.
        assert_eq!(label.continuation, 7);
        assert_eq!(label.arity, 1);
        assert_eq!(label.height, 0);
    });
}

#[test]
fn loop_branch_carries_params() {
    let module = validate_wat(
        r#"
        (module
            (func (param i32)
                i32.const 1
                loop (param i32)
                    drop
                end))
        "#,
    )
    .unwrap();
    let code = module.code[0].code.as_slice();
    assert_matches!(&code[1], Instruction::Loop(control) => {
        assert_eq!(control.label.continuation, 1);
        assert_eq!(control.label.arity, 1);
    });
}

#[test]
fn branch_height_accounts_for_surrounding_operands() {
    let module = validate_wat(
        r#"
        (module
            (func (result i32)
                i32.const 1
                block (result i32)
                    i32.const 2
                    br 0
                end
                i32.add))
        "#,
    )
    .unwrap();
    let code = module.code[0].code.as_slice();
    assert_matches!(&code[3], Instruction::Br(BranchTarget::Resolved(label)) => {
        // One operand (the outer const) is below the block.
        assert_eq!(label.height, 1);
        assert_eq!(label.arity, 1);
    });
}
