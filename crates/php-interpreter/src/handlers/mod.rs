//! Per-construct handlers.
//!
//! Each submodule adds methods to [`Evaluator`](crate::eval::Evaluator). A
//! handler receives its node's children, schedules sub-evaluations through
//! the stack and leaves exactly one result behind: a value for value intent,
//! an address (or `Unaddressable`) for address intent, nothing for statements.

mod array;
mod assign;
mod constant;
mod control;
mod declarations;
mod echo;
mod objects;
mod offset;
mod unset;
mod variable;

pub(crate) use objects::DEFAULT_CLASS;

use php_ast::Span;
use php_diagnostics::codes;

use crate::eval::Evaluator;
use crate::value::{ArrayKey, IllegalKey, Value};
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    /// Casts an array key. An array key is fatal when `strict`, otherwise it
    /// warns like an object key does; both yield `None`.
    pub(crate) fn cast_key(&mut self, key: &Value, span: Span, strict: bool) -> Result<Option<ArrayKey>> {
        match ArrayKey::cast(key) {
            Ok(key) => Ok(Some(key)),
            Err(IllegalKey::Array) if strict => Err(RuntimeError::IllegalArrayKey { span }),
            Err(_) => {
                self.warning(codes::ILLEGAL_OFFSET_TYPE, "Illegal offset type".into(), span);
                Ok(None)
            }
        }
    }

    pub(crate) fn next_element_occupied(&mut self, span: Span) {
        self.warning(
            codes::NEXT_ELEMENT_OCCUPIED,
            "Cannot add element to the array as the next element is already occupied".into(),
            span,
        );
    }
}
