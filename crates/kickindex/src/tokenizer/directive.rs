//
// tokenizer/directive.rs
//
// KickAssembler preprocessor-aware tokenizer
//
// Handles #define, #undef, #if/#elif/#else/#endif, #import, #importif,
// #importonce and the legacy `.import source "file"` form. Code in active
// regions is split into coarse tokens; inactive regions contribute nothing
// but their directive lines.
//

use regex::Regex;
use std::sync::OnceLock;

use crate::source_index::condition;
use crate::source_index::{ReferencedFileInfo, SymbolSet};

use super::{Diagnostic, DiagnosticCode, Token, TokenKind, TokenizeOutput, Tokenizer};

struct DirectivePatterns {
    /// `#name rest`
    head: Regex,
    symbol: Regex,
    /// `"path"` as the whole argument
    quoted: Regex,
    /// `COND "path"`
    conditional_import: Regex,
    legacy_import: Regex,
    legacy_import_once: Regex,
}

fn patterns() -> &'static DirectivePatterns {
    static PATTERNS: OnceLock<DirectivePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DirectivePatterns {
        head: Regex::new(
            r"^(\s*)#(define|undef|if|elif|else|endif|importif|importonce|import)\b(.*)$",
        )
        .unwrap(),
        symbol: Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap(),
        quoted: Regex::new(r#"^\s*"([^"]*)"\s*$"#).unwrap(),
        conditional_import: Regex::new(r#"^\s*(.+?)\s*"([^"]*)"\s*$"#).unwrap(),
        legacy_import: Regex::new(r#"^\s*\.import\s+source\s+"([^"]*)""#).unwrap(),
        legacy_import_once: Regex::new(r"^\s*\.importonce\b").unwrap(),
    })
}

/// Default tokenizer: preprocessor directives plus a coarse lexer for the rest
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveTokenizer;

impl DirectiveTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for DirectiveTokenizer {
    fn tokenize(&self, text: &str, incoming: &SymbolSet) -> TokenizeOutput {
        let mut scanner = Scanner {
            symbols: incoming.clone(),
            frames: Vec::new(),
            output: TokenizeOutput::default(),
        };
        let mut in_block_comment = false;

        for (line_num, line) in text.lines().enumerate() {
            let line_num = line_num as u32;
            let code = mask_comments(line, &mut in_block_comment);
            scanner.line(line_num, &code);
        }
        scanner.finish()
    }
}

#[derive(Debug)]
struct Frame {
    line: u32,
    parent_active: bool,
    active: bool,
    branch_taken: bool,
    seen_else: bool,
}

struct Scanner {
    symbols: SymbolSet,
    frames: Vec<Frame>,
    output: TokenizeOutput,
}

impl Scanner {
    fn active(&self) -> bool {
        self.frames.last().map(|f| f.active).unwrap_or(true)
    }

    fn line(&mut self, line: u32, code: &str) {
        let p = patterns();

        if let Some(caps) = p.head.captures(code) {
            let indent = caps.get(1).map(|m| m.len()).unwrap_or(0) as u32;
            let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let rest_match = caps.get(3);
            let rest = rest_match.map(|m| m.as_str()).unwrap_or_default();
            let rest_column = rest_match.map(|m| m.start()).unwrap_or(0) as u32;
            self.output.tokens.push(Token {
                kind: TokenKind::Directive,
                text: format!("#{}", name),
                line,
                column: indent,
            });
            self.directive(line, indent, name, rest, rest_column);
            return;
        }

        if !self.active() {
            return;
        }

        if let Some(caps) = p.legacy_import.captures(code) {
            if let Some(path) = caps.get(1) {
                self.push_reference(line, path.start() as u32, path.as_str());
            }
        } else if p.legacy_import_once.is_match(code) {
            self.output.is_import_once = true;
        }

        lex_code(line, code, &mut self.output);
    }

    fn directive(&mut self, line: u32, column: u32, name: &str, rest: &str, rest_column: u32) {
        let p = patterns();
        match name {
            "if" => {
                let parent_active = self.active();
                let active = parent_active && self.condition(line, rest_column, rest);
                self.frames.push(Frame {
                    line,
                    parent_active,
                    active,
                    branch_taken: active,
                    seen_else: false,
                });
            }
            "elif" => {
                let Some((seen_else, evaluate)) = self
                    .frames
                    .last()
                    .map(|f| (f.seen_else, f.parent_active && !f.branch_taken))
                else {
                    self.directive_error(line, column, "#elif without matching #if");
                    return;
                };
                if seen_else {
                    self.directive_error(line, column, "#elif after #else");
                }
                let result = evaluate && self.condition(line, rest_column, rest);
                if let Some(frame) = self.frames.last_mut() {
                    frame.active = result;
                    frame.branch_taken |= result;
                }
            }
            "else" => {
                let Some(frame) = self.frames.last_mut() else {
                    self.directive_error(line, column, "#else without matching #if");
                    return;
                };
                let duplicate = frame.seen_else;
                frame.active = frame.parent_active && !frame.branch_taken;
                frame.branch_taken = true;
                frame.seen_else = true;
                if duplicate {
                    self.directive_error(line, column, "duplicate #else");
                }
            }
            "endif" => {
                if self.frames.pop().is_none() {
                    self.directive_error(line, column, "#endif without matching #if");
                }
            }
            _ if !self.active() => {}
            "define" | "undef" => match p.symbol.captures(rest).and_then(|c| c.get(1)) {
                Some(symbol) if name == "define" => {
                    self.symbols = self.symbols.with(symbol.as_str());
                }
                Some(symbol) => {
                    self.symbols = self.symbols.without(symbol.as_str());
                }
                None => {
                    self.directive_error(line, column, &format!("#{} expects a symbol name", name))
                }
            },
            "import" => match p.quoted.captures(rest).and_then(|c| c.get(1)) {
                Some(path) => {
                    self.push_reference(line, rest_column + path.start() as u32, path.as_str())
                }
                None => self.directive_error(line, column, "#import expects a quoted file name"),
            },
            "importif" => {
                let Some(caps) = p.conditional_import.captures(rest) else {
                    self.directive_error(
                        line,
                        column,
                        "#importif expects a condition and a quoted file name",
                    );
                    return;
                };
                let (Some(cond), Some(path)) = (caps.get(1), caps.get(2)) else {
                    return;
                };
                if self.condition(line, rest_column + cond.start() as u32, cond.as_str()) {
                    self.push_reference(line, rest_column + path.start() as u32, path.as_str());
                }
            }
            "importonce" => self.output.is_import_once = true,
            _ => {}
        }
    }

    /// Evaluate a condition; failures count as false and leave a diagnostic
    fn condition(&mut self, line: u32, column: u32, expr: &str) -> bool {
        match condition::evaluate(expr, &self.symbols) {
            Ok(value) => value,
            Err(e) => {
                self.output.diagnostics.push(Diagnostic::error(
                    line,
                    column,
                    DiagnosticCode::Condition,
                    format!("invalid condition '{}': {}", expr.trim(), e),
                ));
                false
            }
        }
    }

    fn push_reference(&mut self, line: u32, column: u32, path: &str) {
        log::trace!("  import at line {}: '{}' with {}", line, path, self.symbols);
        self.output.references.push(ReferencedFileInfo::new(
            line,
            column,
            path,
            self.symbols.clone(),
        ));
    }

    fn directive_error(&mut self, line: u32, column: u32, message: &str) {
        self.output.diagnostics.push(Diagnostic::error(
            line,
            column,
            DiagnosticCode::Directive,
            message,
        ));
    }

    fn finish(mut self) -> TokenizeOutput {
        for frame in std::mem::take(&mut self.frames) {
            self.directive_error(frame.line, 0, "#if without matching #endif");
        }
        self.output.out_symbols = self.symbols;
        self.output
    }
}

/// Replace comment text with spaces, keeping byte offsets stable
fn mask_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if *in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                out.push_str("  ");
                *in_block_comment = false;
            } else {
                out.extend(std::iter::repeat(' ').take(c.len_utf8()));
            }
            continue;
        }
        if in_string {
            in_string = c != '"';
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                out.push(' ');
                for rest in chars.by_ref() {
                    out.extend(std::iter::repeat(' ').take(rest.len_utf8()));
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                *in_block_comment = true;
            }
            _ => out.push(c),
        }
    }
    out
}

/// Coarse lexer for non-directive code
fn lex_code(line: u32, code: &str, output: &mut TokenizeOutput) {
    let bytes = code.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = match c {
            b'"' => {
                pos += 1;
                while pos < bytes.len() && bytes[pos] != b'"' {
                    pos += 1;
                }
                if pos < bytes.len() {
                    pos += 1;
                } else {
                    output.diagnostics.push(Diagnostic::error(
                        line,
                        start as u32,
                        DiagnosticCode::Syntax,
                        "unterminated string literal",
                    ));
                }
                TokenKind::String
            }
            b'$' if bytes.get(pos + 1).is_some_and(u8::is_ascii_hexdigit) => {
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_hexdigit() {
                    pos += 1;
                }
                TokenKind::Number
            }
            b'%' if matches!(bytes.get(pos + 1), Some(b'0') | Some(b'1')) => {
                pos += 1;
                while pos < bytes.len() && matches!(bytes[pos], b'0' | b'1') {
                    pos += 1;
                }
                TokenKind::Number
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                TokenKind::Number
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic) => {
                pos += 1;
                while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                    pos += 1;
                }
                TokenKind::PseudoOp
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                    pos += 1;
                }
                if bytes.get(pos) == Some(&b':') {
                    output.tokens.push(Token {
                        kind: TokenKind::Label,
                        text: code[start..pos].to_string(),
                        line,
                        column: start as u32,
                    });
                    pos += 1;
                    continue;
                }
                TokenKind::Identifier
            }
            _ => {
                // Single punctuation character (may be multi-byte)
                pos += code[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
                TokenKind::Punct
            }
        };
        output.tokens.push(Token {
            kind,
            text: code[start..pos].to_string(),
            line,
            column: start as u32,
        });
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
