//! Stack-machine evaluator for PHP syntax trees.
//!
//! The evaluator walks an already-parsed tree without leaning on host
//! recursion for control: work is scheduled on an explicit [`stack::EvalStack`],
//! and every variable, array element and object property lives in a
//! simulated [`heap::Heap`] as an addressable slot pointing at a
//! reference-counted value store.

use php_ast::Span;
use php_diagnostics::{codes, Diagnostic};
use php_diagnostics::span::SourceSpan;
use smol_str::SmolStr;
use thiserror::Error;

mod builtins;
pub mod config;
mod desugar;
pub mod environment;
mod eval;
mod handlers;
pub mod heap;
pub mod memory;
pub mod model;
mod ops;
pub mod stack;
pub mod value;

pub use config::{ConfigError, InterpreterConfig};
pub use environment::{Environment, GLOBAL_SCOPE};
pub use eval::Interpreter;
pub use heap::{Address, Heap};
pub use memory::Memory;
pub use value::{ArrayKey, PhpArray, PhpObject, Value};

/// Fatal errors. Any of these aborts the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Cannot use temporary expression in write context")]
    NotWritable { span: Span },

    #[error("Cannot use empty array elements in arrays")]
    EmptyArrayElement { span: Span },

    #[error("Cannot use [] for {context}")]
    EmptyOffset { context: &'static str, span: Span },

    #[error("Illegal offset type")]
    IllegalArrayKey { span: Span },

    #[error("{message}")]
    StringOffset { message: &'static str, span: Span },

    #[error("Cannot use object of type {class} as array")]
    ObjectAsArray { class: SmolStr, span: Span },

    #[error("Object of class {class} could not be converted to string")]
    ObjectToString { class: SmolStr, span: Span },

    #[error("Unsupported operand types")]
    UnsupportedOperands { span: Span },

    #[error("Modulo by zero")]
    ModuloByZero { span: Span },

    #[error("Bit shift by negative number")]
    NegativeShift { span: Span },

    #[error("{kind} '{name}' not found")]
    ClassNotFound { kind: &'static str, name: SmolStr, span: Span },

    #[error("Undefined class constant '{name}'")]
    UndefinedClassConstant { name: SmolStr, span: Span },

    #[error("Cannot instantiate {kind} {name}")]
    CannotInstantiate { kind: &'static str, name: SmolStr, span: Span },

    #[error("Cannot access {visibility} property {class}::${name}")]
    PropertyAccess { visibility: &'static str, class: SmolStr, name: SmolStr, span: Span },

    #[error("{message}")]
    Redeclared { message: String, span: Span },

    #[error("{message}")]
    Inheritance { message: String, span: Span },

    #[error("Constant expression contains invalid operations")]
    InvalidConstantExpression { span: Span },

    #[error("{message}")]
    LexicalVariable { message: String, span: Span },

    #[error("'break' not in the 'loop' or 'switch' context")]
    BreakOutsideSwitch { span: Span },

    #[error("invalid numeric literal: {raw}")]
    InvalidLiteral { raw: SmolStr, span: Span },

    #[error("{feature} is not supported")]
    Unsupported { feature: String, span: Span },

    #[error("Maximum evaluation depth of {limit} exceeded")]
    DepthExceeded { limit: usize, span: Span },

    #[error("Allowed memory size of {limit} bytes exhausted (tried to allocate {requested} bytes)")]
    MemoryExhausted { limit: usize, requested: usize, span: Span },

    #[error("internal evaluator error: {message}")]
    Internal { message: String, span: Span },
}

impl RuntimeError {
    /// Internal error not tied to a source location.
    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
            span: Span::dummy(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            RuntimeError::NotWritable { span } => *span,
            RuntimeError::EmptyArrayElement { span } => *span,
            RuntimeError::EmptyOffset { span, .. } => *span,
            RuntimeError::IllegalArrayKey { span } => *span,
            RuntimeError::StringOffset { span, .. } => *span,
            RuntimeError::ObjectAsArray { span, .. } => *span,
            RuntimeError::ObjectToString { span, .. } => *span,
            RuntimeError::UnsupportedOperands { span } => *span,
            RuntimeError::ModuloByZero { span } => *span,
            RuntimeError::NegativeShift { span } => *span,
            RuntimeError::ClassNotFound { span, .. } => *span,
            RuntimeError::UndefinedClassConstant { span, .. } => *span,
            RuntimeError::CannotInstantiate { span, .. } => *span,
            RuntimeError::PropertyAccess { span, .. } => *span,
            RuntimeError::Redeclared { span, .. } => *span,
            RuntimeError::Inheritance { span, .. } => *span,
            RuntimeError::InvalidConstantExpression { span } => *span,
            RuntimeError::LexicalVariable { span, .. } => *span,
            RuntimeError::BreakOutsideSwitch { span } => *span,
            RuntimeError::InvalidLiteral { span, .. } => *span,
            RuntimeError::Unsupported { span, .. } => *span,
            RuntimeError::DepthExceeded { span, .. } => *span,
            RuntimeError::MemoryExhausted { span, .. } => *span,
            RuntimeError::Internal { span, .. } => *span,
        }
    }

    /// Attaches a location to an error raised below the evaluator, where
    /// no span is known.
    pub fn at(self, at: Span) -> Self {
        match self {
            RuntimeError::Internal { message, span } if span == Span::dummy() => {
                RuntimeError::Internal { message, span: at }
            }
            other => other,
        }
    }

    /// The diagnostic code this error is reported under.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::NotWritable { .. } => codes::NOT_WRITABLE,
            RuntimeError::EmptyArrayElement { .. } => codes::EMPTY_ARRAY_ELEMENT,
            RuntimeError::EmptyOffset { .. } => codes::OFFSET_READ_WITHOUT_KEY,
            RuntimeError::IllegalArrayKey { .. } => codes::ILLEGAL_ARRAY_KEY,
            RuntimeError::StringOffset { .. } => codes::STRING_OFFSET_MISUSE,
            RuntimeError::ObjectAsArray { .. } => codes::UNSUPPORTED_OPERANDS,
            RuntimeError::ObjectToString { .. } => codes::OBJECT_TO_STRING,
            RuntimeError::UnsupportedOperands { .. } => codes::UNSUPPORTED_OPERANDS,
            RuntimeError::ModuloByZero { .. } | RuntimeError::NegativeShift { .. } => codes::ARITHMETIC,
            RuntimeError::ClassNotFound { .. } => codes::CLASS_NOT_FOUND,
            RuntimeError::UndefinedClassConstant { .. } => codes::UNDEFINED_CLASS_CONSTANT,
            RuntimeError::CannotInstantiate { .. } => codes::CANNOT_INSTANTIATE,
            RuntimeError::PropertyAccess { .. } => codes::PROPERTY_ACCESS,
            RuntimeError::Redeclared { .. } => codes::REDECLARED,
            RuntimeError::Inheritance { .. } | RuntimeError::LexicalVariable { .. } => codes::INHERITANCE,
            RuntimeError::InvalidConstantExpression { .. } => codes::INVALID_CONSTANT_EXPRESSION,
            RuntimeError::BreakOutsideSwitch { .. } => codes::BREAK_CONTEXT,
            RuntimeError::InvalidLiteral { .. } => codes::INTERNAL,
            RuntimeError::Unsupported { .. } => codes::UNSUPPORTED,
            RuntimeError::DepthExceeded { .. } => codes::DEPTH_EXCEEDED,
            RuntimeError::MemoryExhausted { .. } => codes::MEMORY_EXHAUSTED,
            RuntimeError::Internal { .. } => codes::INTERNAL,
        }
    }

    /// Converts the error into a fatal diagnostic located in `file`.
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        let span = self.span();
        Diagnostic::fatal(self.code(), self.to_string())
            .with_span(SourceSpan::new(file, span.start, span.end))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
