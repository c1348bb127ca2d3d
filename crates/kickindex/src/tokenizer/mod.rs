//
// tokenizer/mod.rs
//
// Tokenizer boundary consumed by the source index
//

pub mod directive;

pub use directive::DirectiveTokenizer;

use serde::{Deserialize, Serialize};

use crate::source_index::{ReferencedFileInfo, SymbolSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Preprocessor directive (`#import`, `#if`, ...)
    Directive,
    /// Assembler directive or pseudo-op (`.byte`, `.macro`, ...)
    PseudoOp,
    Label,
    Identifier,
    Number,
    String,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 0-based line
    pub line: u32,
    /// 0-based column (bytes)
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[default]
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    Syntax,
    Condition,
    Directive,
    UnresolvedImport,
    ReadFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        line: u32,
        column: u32,
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column,
            severity,
            code,
            message: message.into(),
        }
    }

    pub fn error(line: u32, column: u32, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(line, column, Severity::Error, code, message)
    }
}

/// Result of tokenizing one file under one incoming symbol set
#[derive(Debug, Clone, Default)]
pub struct TokenizeOutput {
    pub tokens: Vec<Token>,
    /// Symbols defined at the end of the file
    pub out_symbols: SymbolSet,
    /// File references found in active regions, each tagged with its local symbols
    pub references: Vec<ReferencedFileInfo>,
    /// Whether the file declared `#importonce`
    pub is_import_once: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Turns source text into tokens under a set of active preprocessor symbols.
///
/// Implementations must not fail: malformed input is reported through
/// `TokenizeOutput::diagnostics` with a best-effort token stream.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str, incoming: &SymbolSet) -> TokenizeOutput;
}
