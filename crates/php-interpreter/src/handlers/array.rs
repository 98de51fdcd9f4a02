//! Array literals.

use php_ast::{ArrayItem, Span};

use crate::eval::Evaluator;
use crate::stack::Indicator;
use crate::value::{PhpArray, Value};
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn array_literal(&mut self, items: &'p [Option<ArrayItem>], span: Span) -> Result<()> {
        self.stack.push_indicator(Indicator::EndOfArray);
        let mut array = PhpArray::new();
        let last = items.len().saturating_sub(1);

        for (position, item) in items.iter().enumerate() {
            let Some(item) = item else {
                // a trailing comma leaves one hole at the very end
                if position == last && position > 0 {
                    continue;
                }
                return Err(RuntimeError::EmptyArrayElement { span });
            };
            match item {
                ArrayItem::Value(value) => {
                    let element_span = value.span;
                    let value = self.eval_value(value)?;
                    if array.push(value).is_none() {
                        self.next_element_occupied(element_span);
                    }
                }
                ArrayItem::Entry { key, value } => {
                    let key_value = self.eval_value(key)?;
                    let value = self.eval_value(value)?;
                    if let Some(key) = self.cast_key(&key_value, key.span, true)? {
                        array.insert(key, value);
                    }
                }
            }
        }

        self.stack.pop_indicator(Indicator::EndOfArray)?;
        self.stack.push_value(Value::Array(array));
        Ok(())
    }
}
