use crate::error::Error;
use crate::{compile_text, parse};

/// Instruction and label lines of one function, comments dropped, up to the
/// next top-level label or the stack region.
fn body_of(asm: &str, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut active = false;
    for line in asm.lines() {
        if line == format!("{}:", name) {
            active = true;
            continue;
        }
        if !active {
            continue;
        }
        if line.trim_start().starts_with(';') {
            continue;
        }
        if !line.starts_with(' ') && line.ends_with(':') && !line.starts_with("__sk_") {
            break;
        }
        out.push(line.trim().to_string());
    }
    out
}

#[test]
fn pinned_add_lowers_to_a_single_instruction() {
    let asm = compile_text(
        "fn add(a: u24 in DR0, b: u24 in DR1) -> u24 out DR0 { return a + b; }",
    )
    .unwrap();
    assert_eq!(body_of(&asm, "add"), vec!["ADDUR DR1, DR0", "RET"]);
}

#[test]
fn default_parameter_registers_match_the_pins() {
    let asm = compile_text("fn add(a: u24, b: u24) -> u24 { return a + b; }").unwrap();
    assert_eq!(body_of(&asm, "add"), vec!["ADDUR DR1, DR0", "RET"]);
}

#[test]
fn signed_arithmetic_selects_signed_opcodes() {
    let asm = compile_text(
        "fn sub(a: s24 in DR0, b: s24 in DR1) -> s24 out DR0 { return a - b; }",
    )
    .unwrap();
    assert_eq!(body_of(&asm, "sub"), vec!["SUBSR DR1, DR0", "RET"]);
}

#[test]
fn comparison_emits_compare_and_conditional_move() {
    let asm = compile_text(
        "fn less(a: s24 in DR0, b: s24 in DR1) -> u24 out DR2 { return a < b; }",
    )
    .unwrap();
    assert_eq!(
        body_of(&asm, "less"),
        vec![
            "CMPSR DR1, DR0",
            "MOVui #0, DR2",
            "MCCsi LT, #1, DR2",
            "RET"
        ]
    );
}

#[test]
fn unsigned_comparison_uses_unsigned_condition_codes() {
    let asm = compile_text(
        "fn less(a: u24 in DR0, b: u24 in DR1) -> u24 out DR2 { return a < b; }",
    )
    .unwrap();
    let body = body_of(&asm, "less");
    assert!(body.contains(&"CMPUR DR1, DR0".to_string()));
    assert!(body.contains(&"MCCsi BT, #1, DR2".to_string()));
}

#[test]
fn cast_is_a_free_reinterpret() {
    let asm =
        compile_text("fn tosigned(a: u24 in DR0) -> s24 out DR0 { return cast_s24(a); }").unwrap();
    assert_eq!(body_of(&asm, "tosigned"), vec!["RET"]);
}

#[test]
fn mixed_data_types_are_rejected() {
    let err =
        compile_text("fn f(a: u24 in DR0, b: s24 in DR1) -> u24 out DR0 { return a + b; }")
            .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn mixed_comparison_requires_casts() {
    let err =
        compile_text("fn f(a: u24 in DR0, b: s24 in DR1) -> u24 out DR0 { return a < b; }")
            .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));

    // The same comparison with an explicit cast is fine.
    compile_text(
        "fn f(a: u24 in DR0, b: s24 in DR1) -> u24 out DR0 { return a < cast_u24(b); }",
    )
    .unwrap();
}

#[test]
fn address_comparison_is_rejected() {
    let err = compile_text("fn f(p: addr<u24> in AR1) { if (p == p) { return; } }").unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn multiplication_has_no_scalar_lowering() {
    let err =
        compile_text("fn f(a: u24 in DR0, b: u24 in DR1) -> u24 out DR0 { return a * b; }")
            .unwrap_err();
    assert!(matches!(err, Error::Codegen { .. }));
}

#[test]
fn while_loop_shape() {
    let asm = compile_text(
        "fn count(n: u24 in DR0) -> u24 out DR0 {\
             let i: u24 = 0;\
             while (i < n) { i += 1; }\
             return i;\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "count");
    assert!(body.contains(&"__sk_while_1:".to_string()));
    assert!(body.contains(&"CMPUR DR0, DR1".to_string()));
    assert!(body.contains(&"BCCso EQ, __sk_endwhile_2".to_string()));
    assert!(body.contains(&"BALso __sk_while_1".to_string()));
    assert!(body.contains(&"__sk_endwhile_2:".to_string()));
    // The loop-allocated temporaries are saved and restored.
    assert!(body.contains(&"PUSHur DR1, AR0".to_string()));
    assert!(body.contains(&"POPur AR0, DR1".to_string()));
}

#[test]
fn if_else_branches_over_unique_labels() {
    let asm = compile_text(
        "fn pick(a: u24 in DR0) -> u24 out DR0 {\
             if (a) { return 1; } else { return 2; }\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "pick");
    let expect = [
        "TSTUR DR0",
        "BCCso EQ, __sk_else_1",
        "MOVui #1, DR0",
        "RET",
        "BALso __sk_endif_2",
        "__sk_else_1:",
        "MOVui #2, DR0",
        "RET",
        "__sk_endif_2:",
    ];
    assert_eq!(body, expect);
}

#[test]
fn break_and_continue_target_the_innermost_loop() {
    let asm = compile_text(
        "fn f(n: u24 in DR0) {\
             while (n) {\
                 if (n) { break; } else { continue; }\
             }\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "f");
    assert!(body.contains(&"BALso __sk_endwhile_2".to_string()));
    assert!(body.contains(&"BALso __sk_while_1".to_string()));
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let err = compile_text("fn f() { break; }").unwrap_err();
    assert!(matches!(err, Error::Codegen { .. }));
}

#[test]
fn struct_locals_get_a_frame_and_base_pointer() {
    let asm = compile_text(
        "struct Point { x: u24; y: u24; }\
         fn f() -> u24 {\
             let p: Point;\
             p.x = 1;\
             p.y = 2;\
             return get_content(get_addr(p.x));\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "f");
    assert!(body.contains(&"SUBASI #2, AR0".to_string()));
    assert!(body.contains(&"LEASO AR0, #0, AR1".to_string()));
    assert!(body.contains(&"STSO DR1, #0, AR1".to_string()));
    assert!(body.contains(&"STSO DR2, #1, AR1".to_string()));
    assert!(body.contains(&"LEASO AR1, #0, AR2".to_string()));
    assert!(body.contains(&"LDSO #0, AR2, DR3".to_string()));
    assert!(body.contains(&"ADDASI #2, AR0".to_string()));
    assert!(body.contains(&"PUSHAur AR1, AR0".to_string()));
    assert!(body.contains(&"POPAur AR0, AR1".to_string()));
}

#[test]
fn address_fields_use_the_address_load_store_forms() {
    let asm = compile_text(
        "struct Node { value: u24; next: addr<u24>; }\
         fn f(q: addr<u24> in AR1) {\
             let n: Node;\
             n.value = 5;\
             n.next = q;\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "f");
    // 'next' sits after the one-word 'value'.
    assert!(body.contains(&"STASO AR1, #1, AR2".to_string()));
}

#[test]
fn address_arithmetic_takes_a_data_delta() {
    let asm = compile_text(
        "fn f(p: addr<u24> in AR1, d: u24 in DR0) {\
             p += d;\
             p -= 1;\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "f");
    assert!(body.contains(&"ADDAUR DR0, AR1".to_string()));
    assert!(body.iter().any(|l| l.starts_with("SUBAUR ")));

    let err = compile_text(
        "fn f(p: addr<u24> in AR1, q: addr<u24> in AR2) { p += q; }",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn get_addr_of_a_scalar_local_is_rejected() {
    let err = compile_text(
        "fn f() -> u24 {\
             let x: u24 = 1;\
             return get_content(get_addr(x));\
         }",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Codegen { .. }));
}

#[test]
fn array_locals_index_statically_and_dynamically() {
    let asm = compile_text(
        "fn arr() -> u24 {\
             let a: u24[4];\
             a[0] = 7;\
             a[3] = 9;\
             let i: u24 = 2;\
             a[i] = 8;\
             return a[0];\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "arr");
    assert!(body.contains(&"SUBASI #4, AR0".to_string()));
    assert!(body.contains(&"STSO DR2, #3, AR1".to_string()));
    // Dynamic index: base copy plus index add.
    assert!(body.contains(&"LEASO AR1, #0, AR2".to_string()));
    assert!(body.contains(&"ADDAUR DR3, AR2".to_string()));
}

#[test]
fn array_index_out_of_bounds_is_rejected() {
    let err = compile_text(
        "fn arr() { let a: u24[4]; a[4] = 1; }",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Codegen { .. }));
}

#[test]
fn two_word_elements_scale_the_index() {
    let asm = compile_text(
        "fn f(i: u24 in DR0, q: addr<u24> in AR1) {\
             let a: addr<u24>[3];\
             a[i] = q;\
         }",
    )
    .unwrap();
    let body = body_of(&asm, "f");
    assert!(body.contains(&"SHLUI #1, DR1".to_string()));
    assert!(body.iter().any(|l| l.starts_with("STASO AR1, #0, ")));
}

#[test]
fn calls_move_arguments_into_parameter_registers() {
    let asm = compile_text(
        "fn helper(a: u24 in DR0) -> u24 out DR0 { return a; }\
         fn top(x: u24 in DR1) -> u24 out DR0 { return helper(x); }",
    )
    .unwrap();
    assert_eq!(body_of(&asm, "helper"), vec!["RET"]);
    assert_eq!(
        body_of(&asm, "top"),
        vec!["MOVur DR1, DR0", "BSRso helper", "RET"]
    );
}

#[test]
fn void_functions_cannot_be_used_as_values() {
    let err = compile_text(
        "fn noop() { }\
         fn f() -> u24 { return noop(); }",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn call_return_type_must_match() {
    let err = compile_text(
        "fn s() -> s24 out DR0 { return 0 - 1; }\
         fn f() -> u24 { return s(); }",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn register_exhaustion_is_a_static_error() {
    let mut source = String::from("fn f() {\n");
    for i in 0..16 {
        source.push_str(&format!("    let x{}: u24 = 1;\n", i));
    }
    source.push('}');
    let err = compile_text(&source).unwrap_err();
    assert!(matches!(err, Error::Codegen { .. }));
}

#[test]
fn globals_become_labelled_words() {
    let asm = compile_text(
        "let g: u24 = 42;\
         let p: addr<u24>;\
         fn main() { }",
    )
    .unwrap();
    let lines: Vec<&str> = asm.lines().collect();
    let g = lines.iter().position(|l| *l == "g:").unwrap();
    assert_eq!(lines[g + 1].trim(), ".dw24 #42");
    let p = lines.iter().position(|l| *l == "p:").unwrap();
    assert_eq!(lines[p + 1].trim(), ".dw24 #0");
    assert_eq!(lines[p + 2].trim(), ".dw24 #0");
}

#[test]
fn main_initializes_the_stack_pointer() {
    let asm = compile_text("fn main() { let x: u24 = 1; }").unwrap();
    let body = body_of(&asm, "main");
    assert_eq!(body[0], "ADRAso #__skald_stack_top, AR0");
    assert!(asm.contains("__skald_stack_area:"));
    assert!(asm.contains("__skald_stack_top:"));
}

#[test]
fn keywords_do_not_swallow_identifier_prefixes() {
    let asm =
        compile_text("fn f(letter: u24 in DR0) -> u24 out DR0 { return letter; }").unwrap();
    assert_eq!(body_of(&asm, "f"), vec!["RET"]);
}

#[test]
fn comments_and_bom_are_tolerated() {
    let source = "\u{feff}// leading comment\nfn f() { /* block\ncomment */ return; }";
    compile_text(source).unwrap();
}

#[test]
fn syntax_errors_surface_as_parse_errors() {
    assert!(matches!(parse("fn f( {"), Err(Error::Parse(_))));
    assert!(matches!(parse("let x u24;"), Err(Error::Parse(_))));
    assert!(matches!(
        parse("fn f() { let x: u24 = /* runaway"),
        Err(Error::Parse(_))
    ));
}

#[test]
fn generated_assembly_assembles() {
    let asm = compile_text(
        "fn helper(a: u24 in DR0) -> u24 out DR0 { return a + a; }\
         fn main() {\
             let x: u24 = 3;\
             x = helper(x);\
         }",
    )
    .unwrap();
    let mut assembler = amber_asm::Assembler::new(0);
    let first = assembler.assemble(&asm).unwrap();
    assert!(!first.is_empty());
    // The stack area ends the image; its top label sits right past it.
    let top = assembler.symbols()["__skald_stack_top"];
    assert_eq!(top as usize, first.len());

    let second = amber_asm::Assembler::new(0).assemble(&asm).unwrap();
    assert_eq!(first, second);
}
