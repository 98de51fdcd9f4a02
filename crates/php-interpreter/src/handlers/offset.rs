//! Subscripts: `$container[key]` and `$container[]`.

use php_ast::{Expr, Span};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::heap::Address;
use crate::memory::{CompositeMeta, StoreContent};
use crate::stack::Location;
use crate::value::{float_to_int, parse_numeric, ArrayKey, Number, NumericStr, Value};
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn offset_read(&mut self, container: &'p Expr, offset: Option<&'p Expr>, span: Span) -> Result<()> {
        let Some(offset) = offset else {
            return Err(RuntimeError::EmptyOffset {
                context: "reading",
                span,
            });
        };
        let base = self.eval_value(container)?;
        let key = self.eval_value(offset)?;

        let result = match base {
            // subscripting a scalar reads nothing and says nothing
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => Value::Null,
            Value::String(text) => self.read_string_offset(&text, &key, offset.span)?,
            Value::Array(array) => match self.cast_key(&key, offset.span, false)? {
                Some(key) => match array.get(&key) {
                    Some(value) => value.clone(),
                    None => {
                        self.undefined_key(&key, span);
                        Value::Null
                    }
                },
                None => Value::Null,
            },
            Value::Object(obj) => {
                return Err(RuntimeError::ObjectAsArray {
                    class: obj.class,
                    span,
                })
            }
            Value::Closure(_) => {
                return Err(RuntimeError::ObjectAsArray {
                    class: SmolStr::new_inline("Closure"),
                    span,
                })
            }
        };
        self.stack.push_value(result);
        Ok(())
    }

    pub(crate) fn undefined_key(&mut self, key: &ArrayKey, span: Span) {
        match key {
            ArrayKey::Int(n) => self.notice(codes::UNDEFINED_OFFSET, format!("Undefined offset: {}", n), span),
            ArrayKey::Str(s) => self.notice(codes::UNDEFINED_INDEX, format!("Undefined index: {}", s), span),
        }
    }

    fn read_string_offset(&mut self, text: &str, key: &Value, span: Span) -> Result<Value> {
        let Some(requested) = self.string_offset_index(key, span) else {
            return Ok(Value::Null);
        };
        let length = text.chars().count() as i64;
        let index = if requested < 0 { requested + length } else { requested };
        match (index >= 0).then(|| text.chars().nth(index as usize)).flatten() {
            Some(ch) => Ok(Value::String(SmolStr::new(ch.to_string()))),
            None => {
                self.notice(
                    codes::UNINITIALIZED_STRING_OFFSET,
                    format!("Uninitialized string offset: {}", requested),
                    span,
                );
                Ok(Value::Null)
            }
        }
    }

    /// Integer index for a string offset, before negative indices are
    /// resolved. `None` when the key can't index a string at all.
    fn string_offset_index(&mut self, key: &Value, span: Span) -> Option<i64> {
        match key {
            Value::Null => Some(0),
            Value::Bool(b) => Some(*b as i64),
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(float_to_int(*f)),
            Value::String(s) => match parse_numeric(s) {
                NumericStr::Numeric(Number::Int(n)) => Some(n),
                NumericStr::Leading(Number::Int(n)) => {
                    self.notice(
                        codes::NON_WELL_FORMED_NUMERIC,
                        "A non well formed numeric value encountered".into(),
                        span,
                    );
                    Some(n)
                }
                NumericStr::Numeric(number) | NumericStr::Leading(number) => {
                    self.illegal_string_offset(s, span);
                    Some(number.to_int())
                }
                NumericStr::NonNumeric => {
                    self.illegal_string_offset(s, span);
                    Some(0)
                }
            },
            Value::Array(_) | Value::Object(_) | Value::Closure(_) => {
                self.warning(codes::ILLEGAL_OFFSET_TYPE, "Illegal offset type".into(), span);
                None
            }
        }
    }

    fn illegal_string_offset(&mut self, key: &str, span: Span) {
        self.warning(
            codes::ILLEGAL_STRING_OFFSET,
            format!("Illegal string offset '{}'", key),
            span,
        );
    }

    pub(crate) fn offset_write(&mut self, container: &'p Expr, offset: Option<&'p Expr>, span: Span) -> Result<()> {
        // The key goes first so evaluating it can't invalidate the container
        let key = match offset {
            Some(offset) => Some(self.eval_value(offset)?),
            None => None,
        };
        let key_span = offset.map_or(span, |o| o.span);

        let Some(base) = self.eval_address(container)? else {
            self.push_location(None);
            return Ok(());
        };
        if base.is_string_offset() {
            return Err(RuntimeError::StringOffset {
                message: "Cannot use string offset as an array",
                span,
            });
        }

        let location = match self.interp.memory.content(base.slot)?.clone() {
            StoreContent::Null => {
                let composite = self.interp.memory.promote_to_array(base.slot)?;
                self.element_location(composite, key, key_span)?
            }
            StoreContent::Bool(_) | StoreContent::Int(_) | StoreContent::Float(_) => {
                self.warning(
                    codes::SCALAR_AS_ARRAY,
                    "Cannot use a scalar value as an array".into(),
                    span,
                );
                None
            }
            StoreContent::Str(text) => {
                let Some(key) = key else {
                    return Err(RuntimeError::StringOffset {
                        message: "[] operator not supported for strings",
                        span,
                    });
                };
                self.string_location(base, &text, &key, key_span)
            }
            StoreContent::Composite(composite) => match self.interp.memory.composite(composite)?.meta.clone() {
                CompositeMeta::Array { .. } => self.element_location(composite, key, key_span)?,
                CompositeMeta::Object { class } => {
                    return Err(RuntimeError::ObjectAsArray { class, span })
                }
                CompositeMeta::Closure(_) => {
                    return Err(RuntimeError::ObjectAsArray {
                        class: SmolStr::new_inline("Closure"),
                        span,
                    })
                }
            },
        };
        self.push_location(location);
        Ok(())
    }

    /// Location of an array element, created if missing. `key` is `None`
    /// for `[]`.
    fn element_location(&mut self, composite: Address, key: Option<Value>, span: Span) -> Result<Option<Location>> {
        let slot = match key {
            None => match self.interp.memory.append_element(composite)? {
                Some(slot) => slot,
                None => {
                    self.next_element_occupied(span);
                    return Ok(None);
                }
            },
            Some(key) => match self.cast_key(&key, span, true)? {
                Some(key) => self.interp.memory.element_or_insert(composite, key)?,
                None => return Ok(None),
            },
        };
        self.locate(slot).map(Some)
    }

    fn string_location(&mut self, base: Location, text: &str, key: &Value, span: Span) -> Option<Location> {
        let requested = self.string_offset_index(key, span)?;
        let index = if requested < 0 {
            requested + text.chars().count() as i64
        } else {
            requested
        };
        if index < 0 {
            self.warning(
                codes::ILLEGAL_STRING_OFFSET,
                format!("Illegal string offset:  {}", requested),
                span,
            );
            return None;
        }
        Some(Location {
            offset: Some(index as usize),
            ..base
        })
    }
}
