//! Tokenizer for preprocessed ToyC source.
//!
//! Produces a flat token stream with line/column info threaded through
//! from the start; `Parser` turns that into AST nodes. Token
//! identity is text-based, mirroring how terse single-character tokens are
//! usually compared in a hand-written recursive-descent front end: a token
//! just *is* its source spelling, and keywords are recognized by comparing
//! that spelling rather than carrying a separate enum tag.

use crate::diagnostics::SourceLocation;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    Int(i64),
    Float(f64),
    Str(String),
    /// A single (possibly escaped) character constant, carried as its
    /// integer value per `char_constant` in ParserActions.
    Char(i64),
    Punct,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: SourceLocation,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

pub fn tokenize(source: &str, file: &Path) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;

    macro_rules! push {
        ($kind:expr, $text:expr, $line:expr, $col:expr) => {
            tokens.push(Token {
                kind: $kind,
                text: $text,
                loc: SourceLocation::new(file.to_path_buf(), $line, $col),
            })
        };
    }

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            i += 1;
            line += 1;
            col = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            col += 1;
            continue;
        }

        // Line comment.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        // Block comment.
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            col += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    line += 1;
                    col = 1;
                } else {
                    col += 1;
                }
                i += 1;
            }
            i += 2;
            col += 2;
            continue;
        }

        let start_line = line;
        let start_col = col;

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = i;
            let mut is_float = false;
            if c == '0' && matches!(chars.get(i + 1), Some('x') | Some('X')) {
                i += 2;
                while i < chars.len() && chars[i].is_ascii_hexdigit() {
                    i += 1;
                }
            } else {
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if chars.get(i) == Some(&'.') {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if matches!(chars.get(i), Some('e') | Some('E')) {
                    is_float = true;
                    i += 1;
                    if matches!(chars.get(i), Some('+') | Some('-')) {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            // Trailing numeric suffixes (u, l, f, U, L, F) are skipped.
            while i < chars.len() && matches!(chars[i], 'u' | 'U' | 'l' | 'L' | 'f' | 'F') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            col += i - start;
            let digits = text.trim_end_matches(['u', 'U', 'l', 'L', 'f', 'F']);
            if is_float || digits.contains('.') || digits.to_lowercase().contains('e') {
                let value: f64 = digits.parse().unwrap_or(0.0);
                push!(TokenKind::Float(value), text, start_line, start_col);
            } else if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                let value = i64::from_str_radix(hex, 16).unwrap_or(0);
                push!(TokenKind::Int(value), text, start_line, start_col);
            } else {
                let value: i64 = digits.parse().unwrap_or(0);
                push!(TokenKind::Int(value), text, start_line, start_col);
            }
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            col += i - start;
            push!(TokenKind::Ident, text, start_line, start_col);
            continue;
        }

        if c == '"' {
            i += 1;
            col += 1;
            let mut value = String::new();
            while i < chars.len() && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    value.push(unescape(chars[i + 1]));
                    i += 2;
                    col += 2;
                } else {
                    value.push(chars[i]);
                    i += 1;
                    col += 1;
                }
            }
            i += 1;
            col += 1;
            push!(TokenKind::Str(value.clone()), value, start_line, start_col);
            continue;
        }

        if c == '\'' {
            i += 1;
            col += 1;
            let value = if chars.get(i) == Some(&'\\') {
                let escaped = unescape(chars[i + 1]);
                i += 2;
                col += 2;
                escaped
            } else {
                let ch = chars[i];
                i += 1;
                col += 1;
                ch
            };
            if chars.get(i) == Some(&'\'') {
                i += 1;
                col += 1;
            }
            push!(
                TokenKind::Char(value as i64),
                value.to_string(),
                start_line,
                start_col
            );
            continue;
        }

        // Multi-character punctuators, longest match first.
        const MULTI: &[&str] = &[
            "<<=", ">>=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&",
            "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
        ];
        let remaining: String = chars[i..].iter().take(3).collect();
        if let Some(&op) = MULTI.iter().find(|op| remaining.starts_with(*op)) {
            i += op.len();
            col += op.len();
            push!(TokenKind::Punct, op.to_string(), start_line, start_col);
            continue;
        }

        i += 1;
        col += 1;
        push!(TokenKind::Punct, c.to_string(), start_line, start_col);
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        loc: SourceLocation::new(file.to_path_buf(), line, col),
    });
    tokens
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        other => other,
    }
}
