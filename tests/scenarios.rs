//! Scenarios A-F: each compiles real ToyC source through the
//! full pipeline (preprocessor, lexer, parser, codegen) and checks
//! properties of the emitted IR text. When `clang` and `lli` are both on
//! `PATH`, a matching `#[ignore]`-gated test actually runs the program and
//! checks its exit code end to end.

use std::io::Write as _;
use std::process::Command;
use toyc::CompilerConfig;

fn compile(source: &str) -> String {
    let mut file = tempfile::Builder::new().suffix(".c").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    toyc::compile_to_ir(file.path(), &CompilerConfig::new()).expect("compilation should succeed")
}

fn tools_available() -> bool {
    Command::new("clang")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
        && Command::new("lli")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Runs `ir` through `lli` and returns its exit code.
fn run_ir(ir: &str) -> i32 {
    let mut ir_file = tempfile::Builder::new().suffix(".ll").tempfile().unwrap();
    ir_file.write_all(ir.as_bytes()).unwrap();
    let status = Command::new("lli")
        .arg(ir_file.path())
        .status()
        .expect("lli should run");
    status.code().unwrap_or(-1)
}

#[test]
fn scenario_a_arithmetic_and_return() {
    let ir = compile("int main() { return 1 + 2 * 3; }");
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("ret i32"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_a_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile("int main() { return 1 + 2 * 3; }");
    assert_eq!(run_ir(&ir), 7);
}

#[test]
fn scenario_b_short_circuit_skips_side_effect() {
    let ir = compile("int main() { int c = 0; int r = 0 && (c = c + 1); return c; }");
    // The right-hand side of `&&` must live in a block that's only
    // reachable when the left operand is true; a plain linear store to
    // `c`'s slot with no preceding conditional branch would mean the
    // short-circuit was compiled away.
    assert!(ir.contains("br i1"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_b_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile("int main() { int c = 0; int r = 0 && (c = c + 1); return c; }");
    assert_eq!(run_ir(&ir), 0);
}

#[test]
fn scenario_c_switch_fallthrough() {
    let ir = compile(
        "int main() { int x = 1; int r = 0;
          switch (x) { case 1: r = r + 10; case 2: r = r + 20; break; case 3: r = 30; break; }
          return r; }",
    );
    assert!(ir.contains("switch i32"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_c_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile(
        "int main() { int x = 1; int r = 0;
          switch (x) { case 1: r = r + 10; case 2: r = r + 20; break; case 3: r = 30; break; }
          return r; }",
    );
    assert_eq!(run_ir(&ir), 30);
}

#[test]
fn scenario_d_nested_macro_expansion() {
    let mut file = tempfile::Builder::new().suffix(".c").tempfile().unwrap();
    file.write_all(
        b"#define A 10\n#define SQUARE(x) ((x) * (x))\nint main() { return SQUARE(A); }\n",
    )
    .unwrap();
    let expanded = toyc::preprocess_file(file.path(), &CompilerConfig::new())
        .expect("preprocessing should succeed");
    assert!(expanded.contains("((10) * (10))"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_d_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile("#define A 10\n#define SQUARE(x) ((x) * (x))\nint main() { return SQUARE(A); }\n");
    assert_eq!(run_ir(&ir), 100);
}

#[test]
fn scenario_e_goto_across_declaration() {
    let ir = compile("int main() { int x = 1; goto L; int y = 10; L: return x + 2; }");
    assert!(ir.contains("br label"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_e_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile("int main() { int x = 1; goto L; int y = 10; L: return x + 2; }");
    assert_eq!(run_ir(&ir), 3);
}

#[test]
fn scenario_f_struct_forward_self_reference() {
    let ir = compile(
        "struct N { int v; struct N *next; };
         int main() { struct N a; a.v = 7; a.next = 0; return a.v; }",
    );
    assert!(ir.contains("%struct.N = type"));
    assert!(ir.contains("define i32 @main()"));
}

#[test]
#[ignore = "requires clang and lli on PATH"]
fn scenario_f_end_to_end() {
    if !tools_available() {
        return;
    }
    let ir = compile(
        "struct N { int v; struct N *next; };
         int main() { struct N a; a.v = 7; a.next = 0; return a.v; }",
    );
    assert_eq!(run_ir(&ir), 7);
}
