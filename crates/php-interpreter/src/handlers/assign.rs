//! `=` and `=&`.

use php_ast::{AssignOp, Expr, Span};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::memory::StoreContent;
use crate::stack::{Indicator, Location};
use crate::value::Value;
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn assign(&mut self, left: &'p Expr, op: AssignOp, right: &'p Expr, span: Span) -> Result<()> {
        if op != AssignOp::Assign {
            return Err(RuntimeError::internal(format!(
                "compound assignment {:?} was not lowered",
                op
            )));
        }

        self.stack.push_indicator(Indicator::EndOfAssignment);
        let value = self.eval_value(right)?;
        let target = self.eval_address(left)?;
        self.stack.pop_indicator(Indicator::EndOfAssignment)?;

        let written = match target {
            Some(loc) if loc.is_string_offset() => self.write_string_offset(loc, &value, span)?,
            Some(loc) => {
                self.interp.memory.write(loc.slot, &value)?;
                value
            }
            None => Value::Null,
        };
        self.stack.push_value(written);
        Ok(())
    }

    pub(crate) fn assign_ref(&mut self, left: &'p Expr, right: &'p Expr, span: Span) -> Result<()> {
        self.stack.push_indicator(Indicator::EndOfAssignment);
        let source = self.eval_address(right)?;
        let target = self.eval_address(left)?;
        self.stack.pop_indicator(Indicator::EndOfAssignment)?;

        let (Some(target), Some(source)) = (target, source) else {
            self.stack.push_value(Value::Null);
            return Ok(());
        };
        if target.is_string_offset() || source.is_string_offset() {
            return Err(RuntimeError::StringOffset {
                message: "Cannot create references to/from string offsets",
                span,
            });
        }
        self.interp.memory.bind_reference(target.slot, source.slot)?;
        let value = self.interp.memory.value_of(target.slot)?;
        self.stack.push_value(value);
        Ok(())
    }

    /// Replaces one character of a string. The string is padded with spaces
    /// when the offset lies past its end. Yields the character written.
    fn write_string_offset(&mut self, loc: Location, value: &Value, span: Span) -> Result<Value> {
        let index = loc
            .offset
            .ok_or_else(|| RuntimeError::internal("string write without an offset"))?;
        let current = match self.interp.memory.content(loc.slot)? {
            StoreContent::Str(s) => s.clone(),
            other => {
                return Err(RuntimeError::internal(format!(
                    "string offset into {}",
                    other.type_name()
                )))
            }
        };

        let text = self.coerce_to_string(value, span)?;
        let Some(ch) = text.chars().next() else {
            self.warning(
                codes::EMPTY_STRING_OFFSET,
                "Cannot assign an empty string to a string offset".into(),
                span,
            );
            return Ok(Value::Null);
        };

        let limit = self.interp.config.memory_limit;
        let requested = index.saturating_add(1);
        if requested > limit {
            return Err(RuntimeError::MemoryExhausted { limit, requested, span });
        }

        let mut chars: Vec<char> = current.chars().collect();
        if index < chars.len() {
            chars[index] = ch;
        } else {
            chars.resize(index, ' ');
            chars.push(ch);
        }
        let updated: String = chars.into_iter().collect();
        self.interp.memory.write(loc.slot, &Value::String(SmolStr::new(updated)))?;
        Ok(Value::String(SmolStr::new(ch.to_string())))
    }
}
