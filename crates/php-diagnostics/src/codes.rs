//! Registry of diagnostic codes.
//!
//! Codes follow the pattern `SCNNN`: `S` is the severity letter (`N`otice,
//! `W`arning, `F`atal), `C` the category digit, `NNN` a sequence number.

use std::collections::HashMap;

use crate::{DiagnosticError, Severity};

// Naming: variables and constants
pub const UNDEFINED_VARIABLE: &str = "N0001";
pub const CONSTANT_REDEFINED: &str = "W0002";
pub const UNDEFINED_CONSTANT: &str = "W0003";
pub const UNDEFINED_CLASS_CONSTANT: &str = "F0004";

// Containers: arrays, strings, offsets
pub const UNDEFINED_OFFSET: &str = "N1001";
pub const UNDEFINED_INDEX: &str = "N1002";
pub const UNINITIALIZED_STRING_OFFSET: &str = "N1003";
pub const ILLEGAL_OFFSET_TYPE: &str = "W1004";
pub const SCALAR_AS_ARRAY: &str = "W1005";
pub const ILLEGAL_STRING_OFFSET: &str = "W1006";
pub const EMPTY_STRING_OFFSET: &str = "W1007";
pub const OFFSET_READ_WITHOUT_KEY: &str = "F1008";
pub const STRING_OFFSET_MISUSE: &str = "F1009";
pub const ILLEGAL_ARRAY_KEY: &str = "F1010";
pub const NOT_WRITABLE: &str = "F1011";
pub const EMPTY_ARRAY_ELEMENT: &str = "F1012";
pub const NEXT_ELEMENT_OCCUPIED: &str = "W1013";

// Objects and classes
pub const UNDEFINED_PROPERTY: &str = "N2001";
pub const NON_OBJECT_PROPERTY: &str = "N2002";
pub const DEFAULT_OBJECT: &str = "W2003";
pub const NON_OBJECT_ASSIGN: &str = "W2004";
pub const CLASS_NOT_FOUND: &str = "F2005";
pub const PROPERTY_ACCESS: &str = "F2006";
pub const CANNOT_INSTANTIATE: &str = "F2007";

// Conversion and arithmetic
pub const ARRAY_TO_STRING: &str = "N3001";
pub const NON_WELL_FORMED_NUMERIC: &str = "N3002";
pub const NON_NUMERIC: &str = "W3003";
pub const DIVISION_BY_ZERO: &str = "W3004";
pub const OBJECT_TO_STRING: &str = "F3005";
pub const UNSUPPORTED_OPERANDS: &str = "F3006";
pub const ARITHMETIC: &str = "F3007";

// Declarations and control flow
pub const REDECLARED: &str = "F4001";
pub const INVALID_CONSTANT_EXPRESSION: &str = "F4002";
pub const INHERITANCE: &str = "F4003";
pub const BREAK_CONTEXT: &str = "F4004";

// Evaluator internals
pub const INTERNAL: &str = "F9001";
pub const UNSUPPORTED: &str = "F9002";
pub const DEPTH_EXCEEDED: &str = "F9003";
pub const MEMORY_EXHAUSTED: &str = "F9004";

/// Diagnostic categories, taken from the digit after the severity letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// x0xxx: variables and constants
    Naming,
    /// x1xxx: arrays, strings and offsets
    Containers,
    /// x2xxx: objects, classes and properties
    Objects,
    /// x3xxx: type juggling and arithmetic
    Conversion,
    /// x4xxx: declarations and control flow
    Declarations,
    /// x9xxx: evaluator bugs and unsupported constructs
    Internal,
}

impl ErrorCategory {
    /// Creates a category from a diagnostic code.
    pub fn from_code(code: &str) -> Option<Self> {
        let mut chars = code.chars();
        Severity::from_letter(chars.next()?)?;
        match chars.next()? {
            '0' => Some(ErrorCategory::Naming),
            '1' => Some(ErrorCategory::Containers),
            '2' => Some(ErrorCategory::Objects),
            '3' => Some(ErrorCategory::Conversion),
            '4' => Some(ErrorCategory::Declarations),
            '9' => Some(ErrorCategory::Internal),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Naming => "Naming",
            ErrorCategory::Containers => "Arrays/Strings",
            ErrorCategory::Objects => "Objects/Classes",
            ErrorCategory::Conversion => "Conversion",
            ErrorCategory::Declarations => "Declarations",
            ErrorCategory::Internal => "Internal",
        }
    }
}

/// Information about a registered code.
#[derive(Debug, Clone)]
pub struct CodeInfo {
    pub code: String,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub description: String,
}

impl CodeInfo {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Option<Self> {
        let code = code.into();
        let severity = Severity::from_letter(code.chars().next()?)?;
        let category = ErrorCategory::from_code(&code)?;
        Some(Self {
            code,
            severity,
            category,
            description: description.into(),
        })
    }
}

/// Registry of all known codes.
#[derive(Debug, Default)]
pub struct CodeRegistry {
    codes: HashMap<String, CodeInfo>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every code the evaluator emits.
    pub fn with_standard_codes() -> Self {
        let mut registry = Self::new();
        let standard = [
            (UNDEFINED_VARIABLE, "undefined variable"),
            (CONSTANT_REDEFINED, "constant already defined"),
            (UNDEFINED_CONSTANT, "use of undefined constant"),
            (UNDEFINED_CLASS_CONSTANT, "undefined class constant"),
            (UNDEFINED_OFFSET, "undefined integer offset"),
            (UNDEFINED_INDEX, "undefined string index"),
            (UNINITIALIZED_STRING_OFFSET, "uninitialized string offset"),
            (ILLEGAL_OFFSET_TYPE, "illegal offset type"),
            (SCALAR_AS_ARRAY, "scalar value used as an array"),
            (ILLEGAL_STRING_OFFSET, "illegal string offset"),
            (EMPTY_STRING_OFFSET, "empty string assigned to a string offset"),
            (OFFSET_READ_WITHOUT_KEY, "[] used for reading"),
            (STRING_OFFSET_MISUSE, "invalid use of a string offset"),
            (ILLEGAL_ARRAY_KEY, "array used as an array key"),
            (NOT_WRITABLE, "temporary expression in write context"),
            (EMPTY_ARRAY_ELEMENT, "empty element inside an array literal"),
            (NEXT_ELEMENT_OCCUPIED, "array append past the largest index"),
            (UNDEFINED_PROPERTY, "undefined property"),
            (NON_OBJECT_PROPERTY, "property read on a non-object"),
            (DEFAULT_OBJECT, "default object created from empty value"),
            (NON_OBJECT_ASSIGN, "property assigned on a non-object"),
            (CLASS_NOT_FOUND, "class not found"),
            (PROPERTY_ACCESS, "inaccessible property"),
            (CANNOT_INSTANTIATE, "class cannot be instantiated"),
            (ARRAY_TO_STRING, "array to string conversion"),
            (NON_WELL_FORMED_NUMERIC, "non well formed numeric value"),
            (NON_NUMERIC, "non-numeric value"),
            (DIVISION_BY_ZERO, "division by zero"),
            (OBJECT_TO_STRING, "object to string conversion"),
            (UNSUPPORTED_OPERANDS, "unsupported operand types"),
            (ARITHMETIC, "arithmetic error"),
            (REDECLARED, "name already declared"),
            (INVALID_CONSTANT_EXPRESSION, "invalid constant expression"),
            (INHERITANCE, "invalid inheritance"),
            (BREAK_CONTEXT, "break outside switch"),
            (INTERNAL, "internal evaluator error"),
            (UNSUPPORTED, "unsupported construct"),
            (DEPTH_EXCEEDED, "nesting depth exceeded"),
            (MEMORY_EXHAUSTED, "memory limit exhausted"),
        ];
        for (code, description) in standard {
            // Standard codes are well formed
            let _ = registry.register(code, description);
        }
        registry
    }

    /// Registers a code, rejecting codes that don't follow the `SCNNN` pattern.
    pub fn register(
        &mut self,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), DiagnosticError> {
        let code = code.into();
        let info = CodeInfo::new(code.clone(), description)
            .ok_or_else(|| DiagnosticError::InvalidCode(code.clone()))?;
        self.codes.insert(code, info);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&CodeInfo> {
        self.codes.get(code)
    }

    pub fn all_codes(&self) -> impl Iterator<Item = &CodeInfo> {
        self.codes.values()
    }

    pub fn codes_in_category(&self, category: ErrorCategory) -> impl Iterator<Item = &CodeInfo> {
        self.codes.values().filter(move |info| info.category == category)
    }
}
