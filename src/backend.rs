//! Turns generated LLVM IR text into an object file or linked executable.
//!
//! This crate carries no LLVM library dependency of its own — `codegen`
//! emits `.ll` text, and this is the only module that shells out to an
//! external toolchain (`clang`) to turn that into a binary. Kept as a
//! thin wrapper around `Command` rather than `inkwell`/`llvm-sys` for the
//! same reason `codegen` emits text: one `clang` on `PATH` is the whole
//! dependency, not a pinned LLVM library version.

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use tempfile::Builder;

/// Minimum clang version required: the generated IR uses opaque pointers
/// (`ptr`), which clang only parses starting at LLVM 15.
const MIN_CLANG_VERSION: u32 = 15;

static CLANG_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    ToolVersion(String),
    #[error("{tool} failed:\n{stderr}")]
    ToolFailed { tool: String, stderr: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What a compilation run should produce: `-l` asks for
/// textual IR with no toolchain involved at all; otherwise the default is
/// a linked, runnable executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    TextualIr,
    Executable,
}

/// Checks that `clang` is on `PATH` and meets [`MIN_CLANG_VERSION`].
/// Cached for the lifetime of the process — this runs a subprocess, so it's
/// only worth paying for once.
fn check_clang_version() -> Result<u32, String> {
    CLANG_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new("clang").arg("--version").output().map_err(|e| {
                format!(
                    "failed to run clang: {}. toyc requires clang {} or later.",
                    e, MIN_CLANG_VERSION
                )
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "clang --version failed with exit code {:?}: {}",
                    output.status.code(),
                    stderr
                ));
            }

            let version_str = String::from_utf8_lossy(&output.stdout);
            let version = parse_clang_version(&version_str).ok_or_else(|| {
                format!(
                    "could not parse clang version from: {}\n\
                     toyc requires clang {} or later (for opaque pointer support).",
                    version_str.lines().next().unwrap_or(&version_str),
                    MIN_CLANG_VERSION
                )
            })?;

            // Apple clang's version numbering trails upstream LLVM by about
            // one major version; Apple clang 14 already supports opaque
            // pointers.
            let is_apple = version_str.contains("Apple clang");
            let effective_min = if is_apple { 14 } else { MIN_CLANG_VERSION };

            if version < effective_min {
                return Err(format!(
                    "clang version {} detected, but toyc requires {} {} or later.\n\
                     The generated LLVM IR uses opaque pointers (requires LLVM 15+).",
                    version,
                    if is_apple { "Apple clang" } else { "clang" },
                    effective_min
                ));
            }

            Ok(version)
        })
        .clone()
}

fn parse_clang_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if line.contains("clang version")
            && let Some(idx) = line.find("version ")
        {
            let after_version = &line[idx + 8..];
            let major: String = after_version
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !major.is_empty() {
                return major.parse().ok();
            }
        }
    }
    None
}

/// Writes `ir` to `output_path` verbatim — the `-l` path, no toolchain
/// invocation at all.
pub fn emit_textual_ir(ir: &str, output_path: &Path) -> Result<(), BackendError> {
    fs::write(output_path, ir)?;
    Ok(())
}

/// Compiles `ir` to a native executable at `output_path`, linking `libm`.
pub fn emit_executable(ir: &str, output_path: &Path) -> Result<(), BackendError> {
    check_clang_version().map_err(BackendError::ToolVersion)?;

    let mut ir_file = Builder::new().suffix(".ll").tempfile()?;
    ir_file.write_all(ir.as_bytes())?;

    let output = Command::new("clang")
        .arg(ir_file.path())
        .arg("-o")
        .arg(output_path)
        .arg("-lm")
        .output()
        .map_err(|e| BackendError::Spawn {
            tool: "clang".to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(BackendError::ToolFailed {
            tool: "clang".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Top-level entry point used by the CLI and library `compile_*` wrappers:
/// dispatches on `kind` so callers don't need to know that textual-IR mode
/// skips the toolchain entirely.
pub fn emit(ir: &str, output_path: &Path, kind: OutputKind) -> Result<(), BackendError> {
    match kind {
        OutputKind::TextualIr => emit_textual_ir(ir, output_path),
        OutputKind::Executable => emit_executable(ir, output_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_clang_version_standard() {
        let output = "clang version 15.0.0 (https://github.com/llvm/llvm-project)\nTarget: x86_64";
        assert_eq!(parse_clang_version(output), Some(15));
    }

    #[test]
    fn parse_clang_version_apple() {
        let output =
            "Apple clang version 14.0.3 (clang-1403.0.22.14.1)\nTarget: arm64-apple-darwin";
        assert_eq!(parse_clang_version(output), Some(14));
    }

    #[test]
    fn parse_clang_version_homebrew() {
        let output = "Homebrew clang version 17.0.6\nTarget: arm64-apple-darwin23.0.0";
        assert_eq!(parse_clang_version(output), Some(17));
    }

    #[test]
    fn parse_clang_version_ubuntu() {
        let output = "Ubuntu clang version 15.0.7\nTarget: x86_64-pc-linux-gnu";
        assert_eq!(parse_clang_version(output), Some(15));
    }

    #[test]
    fn parse_clang_version_invalid() {
        assert_eq!(parse_clang_version("no version here"), None);
        assert_eq!(parse_clang_version("version "), None);
    }

    #[test]
    fn emit_textual_ir_writes_exact_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.ll");
        emit_textual_ir("target triple = \"x86_64\"\n", &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "target triple = \"x86_64\"\n"
        );
    }
}
