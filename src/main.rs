//! `toyc` command-line front end.
//!
//! Flat-flag CLI, not a subcommand tree: `toyc [options] <input-file>`.
//! The real work lives in the library crate; this binary is just argument
//! parsing, stdout/stderr plumbing, and a process exit code.

use clap::Parser as ClapParser;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use toyc::backend::OutputKind;
use toyc::CompilerConfig;

/// ToyC: a small C-like language compiler front end and LLVM IR generator.
#[derive(Debug, ClapParser)]
#[command(name = "toyc", version, about)]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Output file path. Defaults to the input file name with its
    /// extension stripped.
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit LLVM IR text instead of compiling to an executable.
    #[arg(short = 'l')]
    emit_ir: bool,

    /// Run only the preprocessor and print the expanded source to stdout.
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Define a macro, as `NAME` or `NAME=VALUE`. May be repeated.
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Add a directory to the `#include` search path. May be repeated.
    #[arg(short = 'I', value_name = "PATH")]
    include_paths: Vec<PathBuf>,

    /// Increase log verbosity (`-v`, `-vv`, ...). Overridden by `RUST_LOG`
    /// if it's set.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_directive = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Splits a `-D` argument into `(name, value)`, defaulting an unvalued
/// define to `"1"`.
fn parse_define(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (raw.to_string(), None),
    }
}

/// The input file's name with its extension stripped.
fn default_output_path(input: &std::path::Path) -> PathBuf {
    input.with_extension("")
}

fn run(cli: Cli) -> Result<(), String> {
    if !cli.input.exists() {
        return Err(format!("input file does not exist: {}", cli.input.display()));
    }

    let mut config = CompilerConfig::new();
    for raw in &cli.defines {
        let (name, value) = parse_define(raw);
        config = config.with_macro(name.as_str(), value.as_deref());
    }
    for path in &cli.include_paths {
        config = config.with_include_path(path.clone());
    }
    config = config.with_output_kind(if cli.emit_ir {
        OutputKind::TextualIr
    } else {
        OutputKind::Executable
    });

    if cli.preprocess_only {
        let expanded = toyc::preprocess_file(&cli.input, &config).map_err(|e| e.to_string())?;
        print!("{}", expanded);
        std::io::stdout().flush().ok();
        return Ok(());
    }

    let output_path = cli.output.clone().unwrap_or_else(|| default_output_path(&cli.input));
    toyc::compile_file(&cli.input, &output_path, &config).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("toyc: error: {}", message);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_define_without_value_defaults_to_none() {
        assert_eq!(parse_define("DEBUG"), ("DEBUG".to_string(), None));
    }

    #[test]
    fn parse_define_with_value_splits_on_equals() {
        assert_eq!(
            parse_define("VERSION=2"),
            ("VERSION".to_string(), Some("2".to_string()))
        );
    }

    #[test]
    fn default_output_path_strips_extension() {
        assert_eq!(
            default_output_path(std::path::Path::new("prog.c")),
            PathBuf::from("prog")
        );
    }
}
