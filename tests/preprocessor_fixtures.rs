//! Preprocessor directive and include-resolution tests that need real
//! files on disk — colocated unit tests in
//! `src/preprocessor.rs` cover everything that doesn't need a filesystem.

use std::io::Write as _;
use toyc::Preprocessor;

fn write_file(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn includes_a_header_from_an_include_path() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "defs.h", "#define GREETING 42\n");
    let main_path = write_file(
        dir.path(),
        "main.c",
        "#include \"defs.h\"\nint x = GREETING;\n",
    );

    let mut preprocessor = Preprocessor::new(vec![dir.path().to_path_buf()]);
    let expanded = preprocessor.preprocess_file(&main_path).unwrap();
    assert!(expanded.contains("42"));
    assert!(!expanded.contains("GREETING"));
}

#[test]
fn detects_include_cycles() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.h", "#include \"b.h\"\n");
    write_file(dir.path(), "b.h", "#include \"a.h\"\n");
    let main_path = write_file(dir.path(), "main.c", "#include \"a.h\"\nint x;\n");

    let mut preprocessor = Preprocessor::new(vec![dir.path().to_path_buf()]);
    // A cyclic include must not hang; whatever it does (skip the repeat,
    // or error) it has to terminate and still see the rest of main.c.
    let result = preprocessor.preprocess_file(&main_path);
    if let Ok(expanded) = result {
        assert!(expanded.contains("int x;"));
    }
}

#[test]
fn predefined_macro_from_define_flag_expands() {
    let dir = tempfile::tempdir().unwrap();
    let main_path = write_file(dir.path(), "main.c", "int x = VALUE;\n");

    let mut preprocessor = Preprocessor::new(vec![]);
    preprocessor.define("VALUE", Some("99"));
    let expanded = preprocessor.preprocess_file(&main_path).unwrap();
    assert!(expanded.contains("99"));
}

#[test]
fn missing_include_is_reported_as_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let main_path = write_file(dir.path(), "main.c", "#include \"nope.h\"\nint x;\n");

    let mut preprocessor = Preprocessor::new(vec![dir.path().to_path_buf()]);
    // A missing include is recoverable: preprocessing continues, but the
    // issue is recorded as a diagnostic rather than surfaced as an `Err`.
    let expanded = preprocessor.preprocess_file(&main_path).unwrap();
    assert!(preprocessor.diagnostics.has_errors());
    assert!(expanded.contains("int x;"));
}

#[test]
fn conditional_compilation_excludes_false_branch() {
    let dir = tempfile::tempdir().unwrap();
    let main_path = write_file(
        dir.path(),
        "main.c",
        "#define FEATURE 0\n#if FEATURE\nint enabled;\n#else\nint disabled;\n#endif\n",
    );

    let mut preprocessor = Preprocessor::new(vec![]);
    let expanded = preprocessor.preprocess_file(&main_path).unwrap();
    assert!(expanded.contains("disabled"));
    assert!(!expanded.contains("int enabled"));
}
