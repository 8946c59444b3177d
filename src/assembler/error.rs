// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;
use std::sync::Arc;

use crate::core::ast::Node;
use crate::core::parser::ParseError;

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Assembler,
    Cli,
    Io,
    Syntax,
    Redefinition,
    Arity,
    UnknownOpcode,
    OperandPosition,
    DirectiveValue,
    UnresolvedSymbol,
    ResourceExhaustion,
    OperandCombination,
    Expression,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Fatal pipeline error carrying the originating node's position.
///
/// Every stage fails fast with one of these; the engine turns it into a
/// `Diagnostic` and aborts the run.
#[derive(Debug, Clone)]
pub struct BuildError {
    error: AsmError,
    line: u32,
    column: Option<usize>,
}

impl BuildError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>, node: &Node) -> Self {
        Self {
            error: AsmError::new(kind, msg, param),
            line: node.line,
            column: Some(node.column),
        }
    }

    pub fn at(kind: AsmErrorKind, msg: &str, param: Option<&str>, line: u32) -> Self {
        Self {
            error: AsmError::new(kind, msg, param),
            line,
            column: None,
        }
    }

    pub fn pos(kind: AsmErrorKind, msg: &str, param: Option<&str>, line: u32, column: usize) -> Self {
        Self {
            error: AsmError::new(kind, msg, param),
            line,
            column: Some(column),
        }
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.error.kind()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let column = self.column;
        Diagnostic::new(self.line, Severity::Error, self.error).with_column(column)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for BuildError {}

impl From<ParseError> for BuildError {
    fn from(err: ParseError) -> Self {
        Self {
            error: AsmError::new(AsmErrorKind::Syntax, &err.message, None),
            line: err.line,
            column: Some(err.column),
        }
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub(crate) line: u32,
    pub(crate) column: Option<usize>,
    pub(crate) code: String,
    pub(crate) severity: Severity,
    pub(crate) error: AsmError,
    pub(crate) file: Option<String>,
    pub(crate) source: Option<String>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: None,
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
            file: None,
            source: None,
        }
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!(
            "{}: {} [{}] - {}",
            self.line,
            sev,
            self.code,
            self.error.message()
        )
    }

    pub fn format_with_context(&self, lines: Option<&[String]>, use_color: bool) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        let header = match &self.file {
            Some(file) => format!("{file}:{}: {sev} [{}]", self.line, self.code),
            None => format!("{}: {sev} [{}]", self.line, self.code),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');

        let context = build_context_lines(
            self.line,
            self.column,
            lines,
            self.source.as_deref(),
            use_color,
        );
        for line in context {
            out.push_str(&line);
            out.push('\n');
        }

        out.push_str(&format!("{sev}: {}", self.error.message()));
        out
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }
}

/// Report from a successful assembly run.
pub struct AsmRunReport {
    words: Vec<u16>,
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
}

impl AsmRunReport {
    pub fn new(
        words: Vec<u16>,
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
    ) -> Self {
        Self {
            words,
            diagnostics,
            source_lines: source_lines.into(),
        }
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Error from a failed assembly run.
#[derive(Debug)]
pub struct AsmRunError {
    error: AsmError,
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
}

impl AsmRunError {
    pub fn new(
        error: AsmError,
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
    ) -> Self {
        Self {
            error,
            diagnostics,
            source_lines: source_lines.into(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AsmRunError {}

/// Build context lines for error display.
pub fn build_context_lines(
    line_num: u32,
    column: Option<usize>,
    lines: Option<&[String]>,
    source_override: Option<&str>,
    use_color: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    let line_idx = line_num.saturating_sub(1) as usize;

    if let Some(source) = source_override {
        let highlighted = highlight_line(source, column, use_color);
        out.push(format!("{:>5} | {}", line_num, highlighted));
        return out;
    }

    let lines = match lines {
        Some(lines) if !lines.is_empty() => lines,
        _ => {
            out.push(format!("{:>5} | <source unavailable>", line_num));
            return out;
        }
    };

    if line_idx >= lines.len() {
        out.push(format!("{:>5} | <source unavailable>", line_num));
        return out;
    }

    let line = &lines[line_idx];
    let display = highlight_line(line, column, use_color);
    out.push(format!("{:>5} | {}", line_num, display));

    out
}

fn highlight_line(line: &str, column: Option<usize>, use_color: bool) -> String {
    crate::core::report::highlight_line(line, column, use_color)
}

fn default_diagnostic_code(kind: AsmErrorKind) -> &'static str {
    match kind {
        AsmErrorKind::Assembler => "asm001",
        AsmErrorKind::Cli => "asm101",
        AsmErrorKind::Io => "asm102",
        AsmErrorKind::Syntax => "asm201",
        AsmErrorKind::Redefinition => "asm301",
        AsmErrorKind::Arity => "asm302",
        AsmErrorKind::UnknownOpcode => "asm303",
        AsmErrorKind::OperandPosition => "asm304",
        AsmErrorKind::DirectiveValue => "asm305",
        AsmErrorKind::UnresolvedSymbol => "asm306",
        AsmErrorKind::ResourceExhaustion => "asm307",
        AsmErrorKind::OperandCombination => "asm308",
        AsmErrorKind::Expression => "asm401",
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::NodeKind;

    #[test]
    fn diagnostic_format_includes_line_and_severity() {
        let err = AsmError::new(AsmErrorKind::Assembler, "Bad thing", None);
        let diag = Diagnostic::new(12, Severity::Error, err);
        assert_eq!(diag.format(), "12: ERROR [asm001] - Bad thing");
    }

    #[test]
    fn build_error_keeps_node_position() {
        let node = Node::new(NodeKind::Number(1), 4, 9);
        let err = BuildError::new(AsmErrorKind::Expression, "Bad fold", None, &node);
        let diag = err.into_diagnostic();
        assert_eq!(diag.line(), 4);
        assert_eq!(diag.column(), Some(9));
        assert_eq!(diag.code(), "asm401");
    }

    #[test]
    fn parse_errors_become_syntax_build_errors() {
        let err: BuildError = ParseError::new("Expected ]", 3, 7).into();
        assert_eq!(err.kind(), AsmErrorKind::Syntax);
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn format_with_context_renders_source_line() {
        let err = AsmError::new(AsmErrorKind::UnknownOpcode, "Unrecognized opcode", Some("FOO"));
        let diag = Diagnostic::new(2, Severity::Error, err)
            .with_file(Some("prog.asm".to_string()))
            .with_column(Some(1));
        let lines = vec!["SET A, 1".to_string(), "FOO B".to_string()];
        let rendered = diag.format_with_context(Some(&lines), false);
        assert!(rendered.contains("prog.asm:2: ERROR [asm303]"));
        assert!(rendered.contains("    2 | FOO B"));
        assert!(rendered.ends_with("ERROR: Unrecognized opcode: FOO"));
    }
}
