//! toyc: a compiler front end and LLVM IR code generator for ToyC, a
//! small C-like teaching language.
//!
//! The pipeline a `compile_*` entry point drives is:
//!
//! ```text
//! source text
//!   -> preprocessor (macro expansion, #include, conditionals)
//!   -> lexer        (flat token stream)
//!   -> parser       (AST, via ParserActions/AstBuilder)
//!   -> resolver     (struct + function signature registration)
//!   -> codegen      (LLVM IR text)
//!   -> backend      (clang: object/executable, or write the IR as-is)
//! ```
//!
//! Every stage above is its own module so each can be exercised on its own
//! in tests without running the full pipeline.

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod resolver;
pub mod scope;
pub mod types;

pub use ast::Program;
pub use backend::{BackendError, OutputKind};
pub use codegen::CodeGenError;
pub use config::CompilerConfig;
pub use parser::{AstBuilder, ParseError, Parser, ParserActions};
pub use preprocessor::{Preprocessor, PreprocessError};

use std::fmt;
use std::path::Path;

/// The union of everything that can go wrong across the whole pipeline:
/// each stage keeps its own error type, and this is only the
/// thin wrapper `compile_*` needs to propagate whichever one fired.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codegen(#[from] CodeGenError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Runs the preprocessor and returns the expanded source text, with no
/// further compilation.
pub fn preprocess_file(source_path: &Path, config: &CompilerConfig) -> Result<String, CompileError> {
    let mut preprocessor = Preprocessor::new(config.include_paths.clone());
    for (name, value) in &config.predefined_macros {
        preprocessor.define(name, value.as_deref());
    }
    preprocessor
        .preprocess_file(source_path)
        .map_err(CompileError::Preprocess)
}

/// Preprocesses, tokenizes, and parses `source_path`, returning the AST
/// without running codegen — the shared front half of every `compile_*`
/// entry point below plus whatever test code wants just the `Program`.
pub fn parse_file(source_path: &Path, config: &CompilerConfig) -> Result<Program, CompileError> {
    let preprocessed = preprocess_file(source_path, config)?;
    let mut builder = AstBuilder;
    let mut parser = Parser::new(&preprocessed, source_path, &mut builder);
    parser.parse_program().map_err(CompileError::from)
}

/// Lowers a parsed `Program` straight to LLVM IR text, skipping the
/// preprocessor/lexer/parser stages — useful for tests and for tooling that
/// already has an AST.
pub fn generate_ir(program: &Program) -> Result<String, CompileError> {
    codegen::generate(program).map_err(CompileError::Codegen)
}

/// Compiles `source_path` all the way to IR text (used by `-l` and by
/// `compile_file` before handing the result to the backend).
pub fn compile_to_ir(source_path: &Path, config: &CompilerConfig) -> Result<String, CompileError> {
    let program = parse_file(source_path, config)?;
    generate_ir(&program)
}

/// Compiles `source_path` to `output_path`, honoring `config.output_kind`:
/// textual IR is written as-is, otherwise `backend` invokes
/// `clang` to produce a linked executable.
pub fn compile_file(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let ir = compile_to_ir(source_path, config)?;
    backend::emit(&ir, output_path, config.output_kind).map_err(CompileError::Backend)
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::TextualIr => write!(f, "textual IR"),
            OutputKind::Executable => write!(f, "executable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_source(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".c").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn compiles_minimal_program_to_ir() {
        let file = write_source("int main(void) { return 0; }\n");
        let config = CompilerConfig::new();
        let ir = compile_to_ir(file.path(), &config).expect("should compile");
        assert!(ir.contains("define i32 @main()"));
    }

    #[test]
    fn preprocess_only_expands_macros() {
        let file = write_source("#define VALUE 42\nint x = VALUE;\n");
        let config = CompilerConfig::new();
        let expanded = preprocess_file(file.path(), &config).expect("should preprocess");
        assert!(expanded.contains("42"));
        assert!(!expanded.contains("VALUE"));
    }

    #[test]
    fn missing_file_fails_at_the_preprocessor() {
        let config = CompilerConfig::new();
        let result = parse_file(Path::new("/nonexistent/path/does-not-exist.c"), &config);
        assert!(matches!(result, Err(CompileError::Preprocess(_))));
    }
}
