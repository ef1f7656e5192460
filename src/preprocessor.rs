//! A from-scratch, text-level macro expander.
//!
//! Independent of every other subsystem: it takes source text in and
//! produces preprocessed text out. `#include` cycle protection mirrors the
//! `HashSet<PathBuf>` + `canonicalize` idiom the include resolver for a
//! parsed-module language would use, adapted to work on raw bytes instead
//! of already-parsed declarations.

use crate::diagnostics::DiagnosticSink;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Cap on repeated object/function-macro expansion passes over one line,
/// guarding against self-referential macros.
const MAX_EXPANSION_PASSES: usize = 10;

#[derive(Debug, Clone)]
enum Macro {
    Object(String),
    Function { params: Vec<String>, body: String },
}

/// One entry of the conditional-compilation stack. `active`
/// is the *fully resolved* inclusion state for this level — already folded
/// together with every ancestor's state — so `should_include` is simply
/// "is the top of the stack active".
#[derive(Debug, Clone)]
struct CondFrame {
    parent_active: bool,
    was_ever_true: bool,
    saw_else: bool,
    active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("{0}: unterminated conditional (missing #endif)")]
    UnterminatedConditional(PathBuf),
    #[error("{0}:{1}: #else/#elif without matching #if")]
    DanglingElse(PathBuf, usize),
    #[error("{0}:{1}: #endif without matching #if")]
    DanglingEndif(PathBuf, usize),
    #[error("failed to read '{0}': {1}")]
    Io(PathBuf, std::io::Error),
}

pub struct Preprocessor {
    macros: HashMap<String, Macro>,
    include_paths: Vec<PathBuf>,
    /// Canonicalized paths currently being included, for cycle protection.
    including: HashSet<PathBuf>,
    conditional_stack: Vec<CondFrame>,
    pub diagnostics: DiagnosticSink,
}

impl Preprocessor {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Preprocessor {
            macros: HashMap::new(),
            include_paths,
            including: HashSet::new(),
            conditional_stack: Vec::new(),
            diagnostics: DiagnosticSink::new(),
        }
    }

    /// Predefines a macro from a `-D NAME[=VALUE]` flag;
    /// value defaults to `1`.
    pub fn define(&mut self, name: &str, value: Option<&str>) {
        self.macros.insert(
            name.to_string(),
            Macro::Object(value.unwrap_or("1").to_string()),
        );
    }

    fn should_include(&self) -> bool {
        self.conditional_stack.last().is_none_or(|f| f.active)
    }

    fn parent_active(&self) -> bool {
        self.conditional_stack.last().is_none_or(|f| f.active)
    }

    pub fn preprocess_file(&mut self, path: &Path) -> Result<String, PreprocessError> {
        let source =
            std::fs::read_to_string(path).map_err(|e| PreprocessError::Io(path.to_path_buf(), e))?;
        self.preprocess_text(&source, path)
    }

    pub fn preprocess_text(&mut self, source: &str, file: &Path) -> Result<String, PreprocessError> {
        let canonical = file
            .canonicalize()
            .unwrap_or_else(|_| file.to_path_buf());
        self.including.insert(canonical.clone());
        let stack_depth_on_entry = self.conditional_stack.len();

        let lines = join_continuations(source);
        let mut output = String::new();

        for (raw_line_no, line) in lines.iter().enumerate() {
            let line_no = raw_line_no + 1;
            let trimmed = line.trim_start();

            if let Some(rest) = trimmed.strip_prefix('#') {
                self.handle_directive(rest.trim(), file, line_no, &mut output)?;
                continue;
            }

            if !self.should_include() {
                continue;
            }

            let substituted = substitute_line_markers(line, file, line_no);
            let expanded = self.expand_macros(&substituted);
            output.push_str(&expanded);
            output.push('\n');
        }

        if self.conditional_stack.len() != stack_depth_on_entry {
            self.conditional_stack.truncate(stack_depth_on_entry);
            return Err(PreprocessError::UnterminatedConditional(file.to_path_buf()));
        }

        self.including.remove(&canonical);
        Ok(output)
    }

    fn handle_directive(
        &mut self,
        directive: &str,
        file: &Path,
        line_no: usize,
        output: &mut String,
    ) -> Result<(), PreprocessError> {
        if directive.is_empty() {
            // Bare `#` line: ignored.
            return Ok(());
        }
        let (keyword, rest) = split_first_word(directive);
        match keyword {
            "define" if self.should_include() => self.handle_define(rest),
            "undef" if self.should_include() => {
                self.macros.remove(rest.trim());
            }
            "include" if self.should_include() => {
                let text = self.handle_include(rest.trim(), file)?;
                output.push_str(&text);
            }
            "if" => self.push_conditional(rest),
            "ifdef" => {
                let defined = self.macros.contains_key(rest.trim());
                self.push_conditional_bool(defined);
            }
            "ifndef" => {
                let defined = self.macros.contains_key(rest.trim());
                self.push_conditional_bool(!defined);
            }
            "elif" => self.handle_elif(rest, file, line_no)?,
            "else" => self.handle_else(file, line_no)?,
            "endif" => self.handle_endif(file, line_no)?,
            // Unrecognized directives are ignored.
            _ => {}
        }
        Ok(())
    }

    fn handle_define(&mut self, directive_rest: &str) {
        let name_end = directive_rest
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(directive_rest.len());
        let name = &directive_rest[..name_end];
        if name.is_empty() {
            self.diagnostics.error("#define missing macro name");
            return;
        }
        let after_name = &directive_rest[name_end..];

        // The '(' must immediately follow the name for a function-like
        // macro; any whitespace before it makes this an
        // object macro whose body happens to start with a parenthesis.
        if let Some(full) = after_name.strip_prefix('(') {
            let close = match full.find(')') {
                Some(i) => i,
                None => {
                    self.diagnostics
                        .error(format!("malformed function-like macro '{}'", name));
                    return;
                }
            };
            let params: Vec<String> = full[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let body = full[close + 1..].trim().to_string();
            self.macros
                .insert(name.to_string(), Macro::Function { params, body });
        } else {
            self.macros
                .insert(name.to_string(), Macro::Object(after_name.trim().to_string()));
        }
    }

    fn handle_include(&mut self, arg: &str, file: &Path) -> Result<String, PreprocessError> {
        let (target, is_system) = if let Some(stripped) = arg.strip_prefix('"') {
            (stripped.trim_end_matches('"').to_string(), false)
        } else if let Some(stripped) = arg.strip_prefix('<') {
            (stripped.trim_end_matches('>').to_string(), true)
        } else {
            self.diagnostics
                .error(format!("malformed #include directive: {}", arg));
            return Ok(String::new());
        };

        let resolved = self.resolve_include(&target, file, is_system);
        let resolved = match resolved {
            Some(path) => path,
            None => {
                self.diagnostics
                    .error(format!("cannot find include file '{}'", target));
                return Ok(String::new());
            }
        };

        let canonical = resolved
            .canonicalize()
            .unwrap_or_else(|_| resolved.clone());
        if self.including.contains(&canonical) {
            // Cycle: return empty string, do not error.
            return Ok(String::new());
        }

        match std::fs::read_to_string(&resolved) {
            Ok(text) => self.preprocess_text(&text, &resolved),
            Err(e) => {
                self.diagnostics
                    .error(format!("cannot read include file '{}': {}", target, e));
                Ok(String::new())
            }
        }
    }

    fn resolve_include(&self, name: &str, current_file: &Path, is_system: bool) -> Option<PathBuf> {
        if !is_system {
            if let Some(dir) = current_file.parent() {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        for dir in &self.include_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn push_conditional(&mut self, expr: &str) {
        let parent_active = self.parent_active();
        let condition_true = parent_active && self.eval_condition(expr);
        self.conditional_stack.push(CondFrame {
            parent_active,
            was_ever_true: condition_true,
            saw_else: false,
            active: condition_true,
        });
    }

    fn push_conditional_bool(&mut self, condition_true: bool) {
        let parent_active = self.parent_active();
        let active = parent_active && condition_true;
        self.conditional_stack.push(CondFrame {
            parent_active,
            was_ever_true: active,
            saw_else: false,
            active,
        });
    }

    fn handle_elif(&mut self, expr: &str, file: &Path, line_no: usize) -> Result<(), PreprocessError> {
        let frame = self
            .conditional_stack
            .last_mut()
            .ok_or_else(|| PreprocessError::DanglingElse(file.to_path_buf(), line_no))?;
        if frame.saw_else {
            return Err(PreprocessError::DanglingElse(file.to_path_buf(), line_no));
        }
        if frame.was_ever_true {
            frame.active = false;
        } else {
            let parent_active = frame.parent_active;
            // Evaluate with the preprocessor's current macro set; borrow
            // ends before the condition is computed.
            drop(frame);
            let condition_true = parent_active && self.eval_condition(expr);
            let frame = self.conditional_stack.last_mut().unwrap();
            frame.active = condition_true;
            frame.was_ever_true = condition_true;
        }
        Ok(())
    }

    fn handle_else(&mut self, file: &Path, line_no: usize) -> Result<(), PreprocessError> {
        let frame = self
            .conditional_stack
            .last_mut()
            .ok_or_else(|| PreprocessError::DanglingElse(file.to_path_buf(), line_no))?;
        if frame.saw_else {
            return Err(PreprocessError::DanglingElse(file.to_path_buf(), line_no));
        }
        frame.saw_else = true;
        frame.active = frame.parent_active && !frame.was_ever_true;
        if frame.active {
            frame.was_ever_true = true;
        }
        Ok(())
    }

    fn handle_endif(&mut self, file: &Path, line_no: usize) -> Result<(), PreprocessError> {
        if self.conditional_stack.pop().is_none() {
            return Err(PreprocessError::DanglingEndif(file.to_path_buf(), line_no));
        }
        Ok(())
    }

    /// Condition evaluator for `#if`/`#elif`. Object macros
    /// are expanded first; then, in order: `defined(X)`/`defined X`,
    /// a decimal literal, a simple `<lit> op <lit>` comparison, a bare
    /// identifier (defined-ness), and finally integer parsing.
    ///
    /// An unparseable condition is treated as false (with a diagnostic)
    /// rather than true, since silently compiling in a branch no one could
    /// evaluate is the more dangerous failure mode (see DESIGN.md).
    fn eval_condition(&mut self, expr: &str) -> bool {
        let expanded = self.expand_object_macros_only(expr);
        let expr = expanded.trim();

        if let Some(rest) = expr.strip_prefix("defined") {
            let name = rest
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .trim();
            return self.macros.contains_key(name);
        }

        if let Ok(value) = expr.parse::<i64>() {
            return value != 0;
        }

        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if let Some(idx) = expr.find(op) {
                let lhs = expr[..idx].trim();
                let rhs = expr[idx + op.len()..].trim();
                if let (Ok(l), Ok(r)) = (lhs.parse::<i64>(), rhs.parse::<i64>()) {
                    return match op {
                        "==" => l == r,
                        "!=" => l != r,
                        "<=" => l <= r,
                        ">=" => l >= r,
                        "<" => l < r,
                        ">" => l > r,
                        _ => unreachable!(),
                    };
                }
            }
        }

        if is_identifier(expr) {
            return self.macros.contains_key(expr);
        }

        self.diagnostics
            .warning(format!("unparseable #if condition '{}', treating as false", expr));
        false
    }

    /// Full expand (object and function macros, iterated to a fixpoint or
    /// the 10-pass cap) used for ordinary source lines.
    fn expand_macros(&self, line: &str) -> String {
        let mut current = line.to_string();
        for _ in 0..MAX_EXPANSION_PASSES {
            let after_objects = self.expand_object_macros_only(&current);
            let after_functions = self.expand_function_macros(&after_objects);
            if after_functions == current {
                return after_functions;
            }
            current = after_functions;
        }
        current
    }

    fn expand_object_macros_only(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_EXPANSION_PASSES {
            let mut changed = false;
            for (name, value) in &self.macros {
                if let Macro::Object(body) = value {
                    let replaced = replace_whole_identifier(&current, name, body);
                    if replaced != current {
                        changed = true;
                        current = replaced;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        current
    }

    fn expand_function_macros(&self, text: &str) -> String {
        let mut result = String::new();
        let mut rest = text;
        'outer: loop {
            for (name, macro_def) in &self.macros {
                let Macro::Function { params, body } = macro_def else {
                    continue;
                };
                if let Some(pos) = find_whole_identifier(rest, name)
                    && rest[pos + name.len()..].starts_with('(')
                {
                    let open = pos + name.len();
                    if let Some(close) = matching_paren(rest, open) {
                        let args_text = &rest[open + 1..close];
                        let args = split_args(args_text);
                        result.push_str(&rest[..pos]);
                        if args.len() != params.len() && !(params.is_empty() && args_text.trim().is_empty()) {
                            // Arg-count mismatch: reported but expansion
                            // continues with a sentinel.
                            result.push_str("/* macro-arg-mismatch */");
                        } else {
                            let expanded_args: Vec<String> = args
                                .iter()
                                .map(|a| self.expand_object_macros_only(a.trim()))
                                .collect();
                            let mut substituted = body.clone();
                            for (param, arg) in params.iter().zip(expanded_args.iter()) {
                                substituted = replace_whole_identifier(&substituted, param, arg);
                            }
                            result.push_str(&substituted);
                        }
                        rest = &rest[close + 1..];
                        continue 'outer;
                    }
                }
            }
            break;
        }
        result.push_str(rest);
        result
    }
}

impl fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preprocessor")
            .field("macros", &self.macros.len())
            .field("conditional_depth", &self.conditional_stack.len())
            .finish()
    }
}

fn join_continuations(source: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    for raw in source.lines() {
        if let Some(stripped) = raw.strip_suffix('\\') {
            pending.push_str(stripped);
        } else {
            pending.push_str(raw);
            lines.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        lines.push(pending);
    }
    lines
}

fn substitute_line_markers(line: &str, file: &Path, line_no: usize) -> String {
    let with_line = replace_whole_identifier(line, "__LINE__", &line_no.to_string());
    replace_whole_identifier(&with_line, "__FILE__", &format!("\"{}\"", file.display()))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn find_whole_identifier(text: &str, name: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(rel) = text[start..].find(name) {
        let pos = start + rel;
        let before_ok = pos == 0 || !is_ident_char(text[..pos].chars().next_back().unwrap());
        let after = pos + name.len();
        let after_ok = after >= text.len() || !is_ident_char(text[after..].chars().next().unwrap());
        if before_ok && after_ok {
            return Some(pos);
        }
        start = pos + 1;
    }
    None
}

fn replace_whole_identifier(text: &str, name: &str, replacement: &str) -> String {
    let mut result = String::new();
    let mut rest = text;
    while let Some(pos) = find_whole_identifier(rest, name) {
        result.push_str(&rest[..pos]);
        result.push_str(replacement);
        rest = &rest[pos + name.len()..];
    }
    result.push_str(rest);
    result
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits macro-call arguments on top-level commas (paren-depth 0), so a
/// nested call like `MAX(f(a,b), c)` splits into two arguments, not three.
fn split_args(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    args.push(current);
    args
}

fn split_first_word(text: &str) -> (&str, &str) {
    let trimmed = text.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim_start()),
        None => (trimmed, ""),
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && text.chars().all(is_ident_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn run(source: &str) -> String {
        let mut pp = Preprocessor::new(vec![]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.c");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(source.as_bytes()).unwrap();
        pp.preprocess_file(&path).unwrap()
    }

    #[test]
    fn no_directives_is_idempotent() {
        let source = "int main() { return 0; }\n";
        let out = run(source);
        assert_eq!(out.trim_end(), source.trim_end());
    }

    #[test]
    fn object_macro_expands() {
        let out = run("#define A 10\nint x = A;\n");
        assert!(out.contains("int x = 10;"));
    }

    #[test]
    fn nested_function_macro_expands() {
        let out = run(
            "#define A 10\n#define SQUARE(x) ((x) * (x))\nint main() { return SQUARE(A); }\n",
        );
        assert!(out.contains("((10) * (10))"));
    }

    #[test]
    fn ifdef_gates_inactive_branch() {
        let out = run("#ifdef FOO\nshould_not_appear\n#else\nshould_appear\n#endif\n");
        assert!(!out.contains("should_not_appear"));
        assert!(out.contains("should_appear"));
    }

    #[test]
    fn nested_conditionals_track_depth_while_inactive() {
        let out = run(
            "#if 0\n#if 1\ninner\n#endif\nouter_should_not_appear\n#endif\nafter\n",
        );
        assert!(!out.contains("inner"));
        assert!(!out.contains("outer_should_not_appear"));
        assert!(out.contains("after"));
    }
}
