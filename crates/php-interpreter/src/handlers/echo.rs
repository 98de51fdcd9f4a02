//! `echo` and string conversion.

use php_ast::{Expr, Span};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::value::Value;
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn echo(&mut self, exprs: &'p [Expr]) -> Result<()> {
        for expr in exprs {
            let value = self.eval_value(expr)?;
            let text = self.coerce_to_string(&value, expr.span)?;
            self.interp.output.push_str(&text);
        }
        Ok(())
    }

    /// Converts a value to a string the way string contexts do. Arrays become
    /// `"Array"` with a notice; objects can't be converted.
    pub(crate) fn coerce_to_string(&mut self, value: &Value, span: Span) -> Result<SmolStr> {
        match value {
            Value::Array(_) => {
                self.notice(codes::ARRAY_TO_STRING, "Array to string conversion".into(), span);
                Ok(SmolStr::new_inline("Array"))
            }
            Value::Object(obj) => Err(RuntimeError::ObjectToString {
                class: obj.class.clone(),
                span,
            }),
            Value::Closure(_) => Err(RuntimeError::ObjectToString {
                class: SmolStr::new_inline("Closure"),
                span,
            }),
            scalar => scalar
                .scalar_to_string()
                .ok_or_else(|| RuntimeError::internal(format!("no string form for {}", scalar.type_name()))),
        }
    }
}
