//! Compile-time error type.
//!
//! Every pass raises on first error; nothing is recovered. The error
//! carries the offending symbol, the enclosing function when one is
//! active, and the source span when the symbol map knows it.

use std::fmt;

/// Source position of a symbol, as recorded by the front end's symbol
/// map (`line`/`column` are 1-indexed in diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub line: u64,
    pub column: u64,
    pub start_pos: u64,
    pub end_pos: u64,
    pub end_column: u64,
}

impl SourceSpan {
    pub fn new(line: u64, column: u64) -> Self {
        SourceSpan {
            line,
            column,
            ..SourceSpan::default()
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Domain-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UndeclaredIdentifier,
    DuplicateSymbol,
    InvalidUnaryOperator,
    InvalidBinaryOperator,
    InvalidPointerAssignment,
    InvalidVectorAssignment,
    OutOfRangeVector,
    AllocationOverflow,
    InvalidRvalueType,
    InvalidPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub symbol: String,
    pub span: Option<SourceSpan>,
    pub function: Option<String>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, symbol: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            symbol: symbol.into(),
            span: None,
            function: None,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_optional_span(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.symbol.is_empty() {
            write!(f, " (`{}`)", self.symbol)?;
        }
        if let Some(function) = &self.function {
            write!(f, " in function \"{}\"", function)?;
        }
        if let Some(span) = &self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}
