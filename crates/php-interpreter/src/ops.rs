//! Unary and binary operators with PHP 7 type juggling.

use std::cmp::Ordering;
use std::rc::Rc;

use php_ast::{BinaryOp, Expr, Span, UnaryOp};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::value::{float_to_int, parse_numeric, Number, NumericStr, PhpArray, PhpObject, Value};
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    /// Evaluate a binary operation.
    pub(crate) fn binary(&mut self, op: BinaryOp, left: &'p Expr, right: &'p Expr, span: Span) -> Result<()> {
        let value = match op {
            // Short-circuit
            BinaryOp::And => {
                let lhs = self.eval_value(left)?;
                Value::Bool(lhs.to_bool() && self.eval_value(right)?.to_bool())
            }
            BinaryOp::Or => {
                let lhs = self.eval_value(left)?;
                Value::Bool(lhs.to_bool() || self.eval_value(right)?.to_bool())
            }
            BinaryOp::Coalesce => {
                let lhs = self.eval_quiet(left)?;
                if lhs.is_null() {
                    self.eval_value(right)?
                } else {
                    lhs
                }
            }
            _ => {
                let lhs = self.eval_value(left)?;
                let rhs = self.eval_value(right)?;
                self.binary_values(op, lhs, rhs, span)?
            }
        };
        self.stack.push_value(value);
        Ok(())
    }

    fn binary_values(&mut self, op: BinaryOp, lhs: Value, rhs: Value, span: Span) -> Result<Value> {
        match op {
            // Arithmetic
            BinaryOp::Add => {
                if let (Value::Array(a), Value::Array(b)) = (&lhs, &rhs) {
                    return Ok(Value::Array(array_union(a, b)));
                }
                self.eval_arithmetic(lhs, rhs, span, i64::checked_add, |a, b| a + b)
            }
            BinaryOp::Sub => self.eval_arithmetic(lhs, rhs, span, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.eval_arithmetic(lhs, rhs, span, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => self.eval_divide(lhs, rhs, span),
            BinaryOp::Mod => {
                let a = self.to_int(&lhs, span)?;
                let b = self.to_int(&rhs, span)?;
                if b == 0 {
                    return Err(RuntimeError::ModuloByZero { span });
                }
                Ok(Value::Int(a.wrapping_rem(b)))
            }
            BinaryOp::Pow => self.eval_power(lhs, rhs, span),

            BinaryOp::Concat => {
                let a = self.coerce_to_string(&lhs, span)?;
                let b = self.coerce_to_string(&rhs, span)?;
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(&a);
                joined.push_str(&b);
                Ok(Value::String(SmolStr::new(joined)))
            }

            // Comparison; `>` and `>=` swap their operands
            BinaryOp::Eq => Ok(Value::Bool(loose_equals(&lhs, &rhs))),
            BinaryOp::NotEq => Ok(Value::Bool(!loose_equals(&lhs, &rhs))),
            BinaryOp::Identical => Ok(Value::Bool(strict_equals(&lhs, &rhs))),
            BinaryOp::NotIdentical => Ok(Value::Bool(!strict_equals(&lhs, &rhs))),
            BinaryOp::Lt => Ok(Value::Bool(loose_compare(&lhs, &rhs) == Some(Ordering::Less))),
            BinaryOp::LtEq => Ok(Value::Bool(matches!(
                loose_compare(&lhs, &rhs),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOp::Gt => Ok(Value::Bool(loose_compare(&rhs, &lhs) == Some(Ordering::Less))),
            BinaryOp::GtEq => Ok(Value::Bool(matches!(
                loose_compare(&rhs, &lhs),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOp::Spaceship => Ok(Value::Int(spaceship(&lhs, &rhs))),

            BinaryOp::Xor => Ok(Value::Bool(lhs.to_bool() ^ rhs.to_bool())),

            // Bitwise
            BinaryOp::BitAnd => self.eval_bitwise(lhs, rhs, span, false, |a, b| a & b),
            BinaryOp::BitOr => self.eval_bitwise(lhs, rhs, span, true, |a, b| a | b),
            BinaryOp::BitXor => self.eval_bitwise(lhs, rhs, span, false, |a, b| a ^ b),
            BinaryOp::Shl | BinaryOp::Shr => {
                let a = self.to_int(&lhs, span)?;
                let b = self.to_int(&rhs, span)?;
                shift(op, a, b, span).map(Value::Int)
            }

            BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => Err(RuntimeError::internal(format!(
                "short-circuit operator {} reached strict evaluation",
                op
            ))),
        }
    }

    fn eval_arithmetic<F, G>(&mut self, lhs: Value, rhs: Value, span: Span, int_op: F, float_op: G) -> Result<Value>
    where
        F: Fn(i64, i64) -> Option<i64>,
        G: Fn(f64, f64) -> f64,
    {
        let a = self.to_number(&lhs, span)?;
        let b = self.to_number(&rhs, span)?;
        Ok(match (a, b) {
            (Number::Int(a), Number::Int(b)) => match int_op(a, b) {
                Some(n) => Value::Int(n),
                // overflow promotes to float
                None => Value::Float(float_op(a as f64, b as f64)),
            },
            (a, b) => Value::Float(float_op(a.to_f64(), b.to_f64())),
        })
    }

    fn eval_divide(&mut self, lhs: Value, rhs: Value, span: Span) -> Result<Value> {
        let a = self.to_number(&lhs, span)?;
        let b = self.to_number(&rhs, span)?;
        if b.is_zero() {
            self.warning(codes::DIVISION_BY_ZERO, "Division by zero".into(), span);
            return Ok(Value::Float(a.to_f64() / b.to_f64()));
        }
        if let (Number::Int(x), Number::Int(y)) = (a, b) {
            if x.checked_rem(y) == Some(0) {
                if let Some(quotient) = x.checked_div(y) {
                    return Ok(Value::Int(quotient));
                }
            }
        }
        Ok(Value::Float(a.to_f64() / b.to_f64()))
    }

    fn eval_power(&mut self, lhs: Value, rhs: Value, span: Span) -> Result<Value> {
        let base = self.to_number(&lhs, span)?;
        let exp = self.to_number(&rhs, span)?;
        if let (Number::Int(b), Number::Int(e)) = (base, exp) {
            if let Some(n) = u32::try_from(e).ok().and_then(|e| b.checked_pow(e)) {
                return Ok(Value::Int(n));
            }
        }
        Ok(Value::Float(base.to_f64().powf(exp.to_f64())))
    }

    /// Integer bitwise operation, or byte-wise when both operands are
    /// strings. `padded` strings extend to the longer operand.
    fn eval_bitwise<F>(&mut self, lhs: Value, rhs: Value, span: Span, padded: bool, op: F) -> Result<Value>
    where
        F: Fn(i64, i64) -> i64,
    {
        if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
            return Ok(Value::String(bytewise(a, b, padded, |x, y| op(x as i64, y as i64) as u8)));
        }
        let a = self.to_int(&lhs, span)?;
        let b = self.to_int(&rhs, span)?;
        Ok(Value::Int(op(a, b)))
    }

    /// Numeric conversion for arithmetic. Partly numeric strings give a
    /// notice, non-numeric ones a warning and zero.
    fn to_number(&mut self, value: &Value, span: Span) -> Result<Number> {
        match value {
            Value::Null => Ok(Number::Int(0)),
            Value::Bool(b) => Ok(Number::Int(*b as i64)),
            Value::Int(n) => Ok(Number::Int(*n)),
            Value::Float(f) => Ok(Number::Float(*f)),
            Value::String(s) => Ok(match parse_numeric(s) {
                NumericStr::Numeric(number) => number,
                NumericStr::Leading(number) => {
                    self.notice(
                        codes::NON_WELL_FORMED_NUMERIC,
                        "A non well formed numeric value encountered".into(),
                        span,
                    );
                    number
                }
                NumericStr::NonNumeric => {
                    self.warning(codes::NON_NUMERIC, "A non-numeric value encountered".into(), span);
                    Number::Int(0)
                }
            }),
            Value::Array(_) | Value::Object(_) | Value::Closure(_) => Err(RuntimeError::UnsupportedOperands { span }),
        }
    }

    fn to_int(&mut self, value: &Value, span: Span) -> Result<i64> {
        self.to_number(value, span).map(Number::to_int)
    }

    /// Evaluate a unary operation.
    pub(crate) fn unary(&mut self, op: UnaryOp, operand: &'p Expr, span: Span) -> Result<()> {
        let value = self.eval_value(operand)?;
        let result = match op {
            UnaryOp::Not => Value::Bool(!value.to_bool()),
            UnaryOp::Plus => self.to_number(&value, span)?.into_value(),
            UnaryOp::Neg => match self.to_number(&value, span)? {
                Number::Int(n) => n.checked_neg().map_or(Value::Float(-(n as f64)), Value::Int),
                Number::Float(f) => Value::Float(-f),
            },
            UnaryOp::BitNot => match value {
                Value::Int(n) => Value::Int(!n),
                Value::Float(f) => Value::Int(!float_to_int(f)),
                Value::String(s) => {
                    let bytes: Vec<u8> = s.bytes().map(|b| !b).collect();
                    Value::String(SmolStr::new(String::from_utf8_lossy(&bytes)))
                }
                _ => return Err(RuntimeError::UnsupportedOperands { span }),
            },
        };
        self.stack.push_value(result);
        Ok(())
    }
}

/// Keys of `a`, then the keys of `b` that `a` lacks.
fn array_union(a: &PhpArray, b: &PhpArray) -> PhpArray {
    let mut union = a.clone();
    for (key, value) in b.iter() {
        if !union.contains_key(key) {
            union.insert(key.clone(), value.clone());
        }
    }
    union
}

fn bytewise(a: &str, b: &str, padded: bool, op: impl Fn(u8, u8) -> u8) -> SmolStr {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let len = if padded { a.len().max(b.len()) } else { a.len().min(b.len()) };
    let bytes: Vec<u8> = (0..len)
        .map(|i| op(a.get(i).copied().unwrap_or(0), b.get(i).copied().unwrap_or(0)))
        .collect();
    SmolStr::new(String::from_utf8_lossy(&bytes))
}

fn shift(op: BinaryOp, value: i64, by: i64, span: Span) -> Result<i64> {
    if by < 0 {
        return Err(RuntimeError::NegativeShift { span });
    }
    let wide = by >= i64::from(i64::BITS);
    Ok(match op {
        BinaryOp::Shl if wide => 0,
        BinaryOp::Shl => ((value as u64) << by) as i64,
        _ if wide => {
            if value < 0 {
                -1
            } else {
                0
            }
        }
        _ => value >> by,
    })
}

// ============================================================================
// Comparison
// ============================================================================

/// Loose (`==`, `<`) comparison. `None` when the operands are
/// uncomparable, e.g. arrays with different keys.
pub(crate) fn loose_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, Value::String(s)) => Some(compare_bytes("", s)),
        (Value::String(s), Value::Null) => Some(compare_bytes(s, "")),
        (Value::Null | Value::Bool(_), _) | (_, Value::Null | Value::Bool(_)) => Some(a.to_bool().cmp(&b.to_bool())),
        (Value::String(x), Value::String(y)) => compare_strings(x, y),
        (Value::Array(x), Value::Array(y)) => compare_arrays(x, y),
        (Value::Array(_), _) => Some(Ordering::Greater),
        (_, Value::Array(_)) => Some(Ordering::Less),
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y),
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y).then_some(Ordering::Equal),
        (Value::Object(_), Value::Closure(_)) | (Value::Closure(_), Value::Object(_)) => None,
        (Value::Object(_) | Value::Closure(_), _) => Some(Ordering::Greater),
        (_, Value::Object(_) | Value::Closure(_)) => Some(Ordering::Less),
        // Int, Float and String in any mix
        _ => compare_numbers(silent_number(a), silent_number(b)),
    }
}

pub(crate) fn loose_equals(a: &Value, b: &Value) -> bool {
    loose_compare(a, b) == Some(Ordering::Equal)
}

/// `===`: same type and value; arrays also need the same key order.
pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((kx, vx), (ky, vy))| kx == ky && strict_equals(vx, vy))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.class == y.class
                && x.properties.len() == y.properties.len()
                && x.properties.iter().all(|(name, prop)| {
                    y.get(name).map_or(false, |other| strict_equals(&prop.value, &other.value))
                })
        }
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `<=>`. Uncomparable operands give 1.
pub(crate) fn spaceship(a: &Value, b: &Value) -> i64 {
    match loose_compare(a, b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) | None => 1,
    }
}

fn compare_bytes(a: &str, b: &str) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Two numeric strings compare as numbers, anything else byte-wise.
fn compare_strings(a: &str, b: &str) -> Option<Ordering> {
    match (parse_numeric(a), parse_numeric(b)) {
        (NumericStr::Numeric(x), NumericStr::Numeric(y)) => compare_numbers(x, y),
        _ => Some(compare_bytes(a, b)),
    }
}

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
    }
}

/// Numeric value of a scalar for comparisons, without diagnostics.
fn silent_number(value: &Value) -> Number {
    match value {
        Value::Int(n) => Number::Int(*n),
        Value::Float(f) => Number::Float(*f),
        Value::Bool(b) => Number::Int(*b as i64),
        Value::String(s) => match parse_numeric(s) {
            NumericStr::Numeric(n) | NumericStr::Leading(n) => n,
            NumericStr::NonNumeric => Number::Int(0),
        },
        _ => Number::Int(0),
    }
}

/// Smaller arrays are less; equal sizes compare element-wise by the left
/// operand's keys.
fn compare_arrays(a: &PhpArray, b: &PhpArray) -> Option<Ordering> {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => {}
        unequal => return Some(unequal),
    }
    for (key, left) in a.iter() {
        let right = b.get(key)?;
        match loose_compare(left, right)? {
            Ordering::Equal => {}
            unequal => return Some(unequal),
        }
    }
    Some(Ordering::Equal)
}

fn compare_objects(a: &PhpObject, b: &PhpObject) -> Option<Ordering> {
    if a.class != b.class {
        return None;
    }
    match a.properties.len().cmp(&b.properties.len()) {
        Ordering::Equal => {}
        unequal => return Some(unequal),
    }
    for (name, left) in &a.properties {
        let right = b.get(name)?;
        match loose_compare(&left.value, &right.value)? {
            Ordering::Equal => {}
            unequal => return Some(unequal),
        }
    }
    Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayKey;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Int(1), &s("1")));
        assert!(loose_equals(&s("1e1"), &s("10")));
        assert!(loose_equals(&Value::Int(0), &s("a")));
        assert!(loose_equals(&Value::Null, &Value::Bool(false)));
        assert!(loose_equals(&Value::Null, &s("")));
        assert!(!loose_equals(&Value::Null, &s("0")));
        assert!(!loose_equals(&s("abc"), &s("ABC")));
        assert!(loose_equals(&Value::Bool(true), &s("x")));
        assert!(!loose_equals(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
    }

    #[test]
    fn test_array_comparison() {
        let a = Value::Array(PhpArray::from_values([Value::Int(1), Value::Int(2)]));
        let b = Value::Array(PhpArray::from_values([Value::Int(1), Value::Int(3)]));
        let short = Value::Array(PhpArray::from_values([Value::Int(9)]));
        assert_eq!(loose_compare(&a, &b), Some(Ordering::Less));
        assert_eq!(loose_compare(&short, &a), Some(Ordering::Less));
        assert_eq!(loose_compare(&a, &Value::Int(100)), Some(Ordering::Greater));

        let mut keyed = PhpArray::new();
        keyed.insert("x".into(), Value::Int(1));
        keyed.insert("y".into(), Value::Int(2));
        assert_eq!(loose_compare(&a, &Value::Array(keyed)), None);
    }

    #[test]
    fn test_strict_equality() {
        assert!(strict_equals(&Value::Int(1), &Value::Int(1)));
        assert!(!strict_equals(&Value::Int(1), &Value::Float(1.0)));
        assert!(!strict_equals(&Value::Int(1), &s("1")));

        let mut forward = PhpArray::new();
        forward.insert(ArrayKey::Int(0), Value::Int(1));
        forward.insert(ArrayKey::Int(1), Value::Int(2));
        let mut backward = PhpArray::new();
        backward.insert(ArrayKey::Int(1), Value::Int(2));
        backward.insert(ArrayKey::Int(0), Value::Int(1));
        let (forward, backward) = (Value::Array(forward), Value::Array(backward));
        assert!(loose_equals(&forward, &backward));
        assert!(!strict_equals(&forward, &backward));
    }

    #[test]
    fn test_spaceship() {
        assert_eq!(spaceship(&Value::Int(1), &Value::Int(2)), -1);
        assert_eq!(spaceship(&s("b"), &s("a")), 1);
        assert_eq!(spaceship(&Value::Float(1.5), &s("1.5")), 0);
    }

    #[test]
    fn test_shift_edges() {
        let span = Span::dummy();
        assert_eq!(shift(BinaryOp::Shl, 1, 3, span), Ok(8));
        assert_eq!(shift(BinaryOp::Shl, 1, 64, span), Ok(0));
        assert_eq!(shift(BinaryOp::Shr, -8, 70, span), Ok(-1));
        assert_eq!(shift(BinaryOp::Shr, -8, 1, span), Ok(-4));
        assert!(matches!(shift(BinaryOp::Shl, 1, -1, span), Err(RuntimeError::NegativeShift { .. })));
    }

    #[test]
    fn test_string_bitwise() {
        assert_eq!(bytewise("ab", "a", false, |x, y| x & y), "a");
        assert_eq!(bytewise("a", "  ", true, |x, y| x | y), "a ");
        assert_eq!(bytewise("ab", "a", false, |x, y| x ^ y), "\0");
    }

    #[test]
    fn test_array_union_keeps_left_keys() {
        let left = PhpArray::from_values([Value::Int(1)]);
        let right = PhpArray::from_values([Value::Int(7), Value::Int(8)]);
        let union = array_union(&left, &right);
        assert_eq!(union.values().cloned().collect::<Vec<_>>(), vec![Value::Int(1), Value::Int(8)]);
    }
}
