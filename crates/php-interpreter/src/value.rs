//! Materialized runtime values.
//!
//! A `Value` is what reading a slot produces: scalars directly, composites
//! fully copied out of the heap. Values never point back into the heap.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use php_ast::Visibility;
use smol_str::SmolStr;

use crate::model::ClosureDef;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(SmolStr),
    Array(PhpArray),
    Object(PhpObject),
    Closure(Rc<ClosureDef>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(SmolStr::new(s))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) | Value::Closure(_) => "object",
        }
    }

    /// Class name of objects and closures.
    pub fn class_name(&self) -> Option<SmolStr> {
        match self {
            Value::Object(obj) => Some(obj.class.clone()),
            Value::Closure(_) => Some(SmolStr::new_inline("Closure")),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean conversion: `""`, `"0"`, `0`, `0.0`, `[]` and `null` are false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !(s.is_empty() || s == "0"),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(_) | Value::Closure(_) => true,
        }
    }

    /// String form of a scalar; `None` for arrays, objects and closures.
    pub fn scalar_to_string(&self) -> Option<SmolStr> {
        match self {
            Value::Null | Value::Bool(false) => Some(SmolStr::default()),
            Value::Bool(true) => Some(SmolStr::new_inline("1")),
            Value::Int(n) => Some(SmolStr::new(n.to_string())),
            Value::Float(f) => Some(SmolStr::new(format_float(*f))),
            Value::String(s) => Some(s.clone()),
            Value::Array(_) | Value::Object(_) | Value::Closure(_) => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<PhpArray> for Value {
    fn from(arr: PhpArray) -> Self {
        Value::Array(arr)
    }
}

// ============================================================================
// Array keys
// ============================================================================

/// Array key after casting: integer or string, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Int(i64),
    Str(SmolStr),
}

/// Why a value could not become an array key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalKey {
    /// An array was used as a key
    Array,
    /// An object or closure was used as a key
    Object,
}

impl ArrayKey {
    /// Casts a value to an array key.
    ///
    /// Booleans become 0/1, floats are truncated toward zero, `null` becomes
    /// `""`, and strings holding a canonical decimal integer become integers.
    pub fn cast(value: &Value) -> Result<ArrayKey, IllegalKey> {
        match value {
            Value::Null => Ok(ArrayKey::Str(SmolStr::default())),
            Value::Bool(b) => Ok(ArrayKey::Int(*b as i64)),
            Value::Int(n) => Ok(ArrayKey::Int(*n)),
            Value::Float(f) => Ok(ArrayKey::Int(float_to_int(*f))),
            Value::String(s) => Ok(ArrayKey::from_str_key(s)),
            Value::Array(_) => Err(IllegalKey::Array),
            Value::Object(_) | Value::Closure(_) => Err(IllegalKey::Object),
        }
    }

    /// Keys a string: `"10"` becomes `10`, while `"010"`, `"-0"`, `"+1"` and
    /// `"1.0"` stay strings.
    pub fn from_str_key(s: &str) -> ArrayKey {
        match canonical_int(s) {
            Some(n) => ArrayKey::Int(n),
            None => ArrayKey::Str(SmolStr::new(s)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ArrayKey::Int(n) => Value::Int(*n),
            ArrayKey::Str(s) => Value::String(s.clone()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArrayKey::Int(n) => Some(*n),
            ArrayKey::Str(_) => None,
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(n: i64) -> Self {
        ArrayKey::Int(n)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        ArrayKey::from_str_key(s)
    }
}

impl From<SmolStr> for ArrayKey {
    fn from(s: SmolStr) -> Self {
        ArrayKey::from_str_key(&s)
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(n) => write!(f, "{}", n),
            ArrayKey::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Parses `0` or `-?[1-9][0-9]*` that fits in an i64.
fn canonical_int(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut chars = digits.chars();
    match chars.next()? {
        '0' => {
            if s == "0" {
                Some(0)
            } else {
                None
            }
        }
        '1'..='9' if chars.all(|c| c.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

/// Truncates toward zero; NaN, infinities and out-of-range values give 0.
pub fn float_to_int(f: f64) -> i64 {
    if f.is_finite() && f > i64::MIN as f64 && f < i64::MAX as f64 {
        // `as` truncates and maps -0.0 to 0
        f as i64
    } else {
        0
    }
}

// ============================================================================
// Arrays and objects
// ============================================================================

/// Ordered map with an auto-increment cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PhpArray {
    entries: IndexMap<ArrayKey, Value>,
    /// `None` once an element sits at `i64::MAX`
    next_index: Option<i64>,
}

impl Default for PhpArray {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            next_index: Some(0),
        }
    }
}

/// Moves an auto-increment cursor past an integer key. The cursor never goes
/// back, and never comes back once exhausted.
pub(crate) fn advance_cursor(cursor: &mut Option<i64>, key: &ArrayKey) {
    if let (ArrayKey::Int(n), Some(next)) = (key, *cursor) {
        if *n >= next {
            *cursor = n.checked_add(1);
        }
    }
}

impl PhpArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(entries: IndexMap<ArrayKey, Value>, next_index: Option<i64>) -> Self {
        Self { entries, next_index }
    }

    /// Builds a list keyed 0, 1, 2, ...
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut arr = Self::new();
        for value in values {
            arr.push(value);
        }
        arr
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_index(&self) -> Option<i64> {
        self.next_index
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or overwrites `key`, keeping its original position if present.
    /// Integer keys at or past the cursor move it to `key + 1`.
    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        advance_cursor(&mut self.next_index, &key);
        self.entries.insert(key, value);
    }

    /// Appends under the next auto-increment index and returns that key.
    /// `None`, with nothing stored, once the cursor is exhausted.
    pub fn push(&mut self, value: Value) -> Option<ArrayKey> {
        let key = ArrayKey::Int(self.next_index?);
        self.insert(key.clone(), value);
        Some(key)
    }

    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    pub value: Value,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhpObject {
    pub class: SmolStr,
    pub properties: IndexMap<SmolStr, ObjectProperty>,
}

impl PhpObject {
    pub fn new(class: impl Into<SmolStr>) -> Self {
        Self {
            class: class.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ObjectProperty> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<SmolStr>, value: Value, visibility: Visibility) {
        self.properties
            .insert(name.into(), ObjectProperty { value, visibility });
    }
}

// ============================================================================
// Numbers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn to_int(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Float(f) => float_to_int(f),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// How much of a string is numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericStr {
    /// The whole string (after leading whitespace) is a number
    Numeric(Number),
    /// A number followed by other characters, e.g. `"12abc"`
    Leading(Number),
    NonNumeric,
}

/// Parses the numeric prefix of a string: optional leading whitespace, sign,
/// digits with an optional fraction, and an optional exponent.
pub fn parse_numeric(s: &str) -> NumericStr {
    let bytes = s.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c) {
        pos += 1;
    }
    let start = pos;
    if pos < bytes.len() && matches!(bytes[pos], b'+' | b'-') {
        pos += 1;
    }

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut digits = pos - int_start;
    let mut is_float = false;

    if pos < bytes.len() && bytes[pos] == b'.' {
        let frac_start = pos + 1;
        let mut end = frac_start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if digits > 0 || end > frac_start {
            digits += end - frac_start;
            is_float = true;
            pos = end;
        }
    }
    if digits == 0 {
        return NumericStr::NonNumeric;
    }

    if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
        let mut end = pos + 1;
        if end < bytes.len() && matches!(bytes[end], b'+' | b'-') {
            end += 1;
        }
        let exp_digits = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end > exp_digits {
            is_float = true;
            pos = end;
        }
    }

    let text = &s[start..pos];
    let number = if is_float {
        Number::Float(text.parse().unwrap_or(0.0))
    } else {
        match text.parse::<i64>() {
            Ok(n) => Number::Int(n),
            Err(_) => Number::Float(text.parse().unwrap_or(0.0)),
        }
    };

    if pos == bytes.len() {
        NumericStr::Numeric(number)
    } else {
        NumericStr::Leading(number)
    }
}

/// Formats a float the way `echo` does: 14 significant digits, `%G` style,
/// with an exponent form like `1.0E+25` for very large or small magnitudes.
pub fn format_float(value: f64) -> String {
    const PRECISION: i32 = 14;

    if value.is_nan() {
        return "NAN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        if mantissa.contains('.') {
            format!("{}E{}{}", mantissa, sign, exponent.abs())
        } else {
            format!("{}.0E{}{}", mantissa, sign, exponent.abs())
        }
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array(_) => write!(f, "Array"),
            Value::Object(obj) => write!(f, "{} Object", obj.class),
            Value::Closure(_) => write!(f, "Closure Object"),
            scalar => match scalar.scalar_to_string() {
                Some(s) => write!(f, "{}", s),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_casting() {
        assert_eq!(ArrayKey::cast(&Value::string("10")), Ok(ArrayKey::Int(10)));
        assert_eq!(ArrayKey::cast(&Value::string("-7")), Ok(ArrayKey::Int(-7)));
        assert_eq!(ArrayKey::cast(&Value::string("0")), Ok(ArrayKey::Int(0)));
        for raw in ["010", "10.0", "+0", "-0", " 1", "1 ", "", "abc"] {
            assert_eq!(ArrayKey::cast(&Value::string(raw)), Ok(ArrayKey::Str(raw.into())));
        }
        assert_eq!(ArrayKey::cast(&Value::Float(-0.7)), Ok(ArrayKey::Int(0)));
        assert_eq!(ArrayKey::cast(&Value::Float(3.99)), Ok(ArrayKey::Int(3)));
        assert_eq!(ArrayKey::cast(&Value::Bool(true)), Ok(ArrayKey::Int(1)));
        assert_eq!(ArrayKey::cast(&Value::Null), Ok(ArrayKey::Str("".into())));
        assert_eq!(ArrayKey::cast(&Value::Array(PhpArray::new())), Err(IllegalKey::Array));
        assert_eq!(ArrayKey::cast(&Value::Object(PhpObject::new("A"))), Err(IllegalKey::Object));
    }

    #[test]
    fn test_key_casting_overflow_stays_string() {
        let huge = "99999999999999999999";
        assert_eq!(ArrayKey::cast(&Value::string(huge)), Ok(ArrayKey::Str(huge.into())));
    }

    #[test]
    fn test_key_casting_is_idempotent() {
        let inputs = [
            Value::string("10"),
            Value::string("010"),
            Value::Float(-0.7),
            Value::Bool(true),
            Value::Null,
        ];
        for input in inputs {
            let once = ArrayKey::cast(&input).unwrap();
            let twice = ArrayKey::cast(&once.to_value()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_next_index_never_decreases() {
        let mut arr = PhpArray::new();
        arr.push(Value::Int(4));
        arr.insert(ArrayKey::Int(6), Value::string("x"));
        arr.insert(ArrayKey::Int(-3), Value::string("neg"));
        arr.insert(ArrayKey::Int(2), Value::string("low"));
        let key = arr.push(Value::string("y"));

        assert_eq!(key, Some(ArrayKey::Int(7)));
        assert_eq!(arr.next_index(), Some(8));
        let keys: Vec<_> = arr.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                ArrayKey::Int(0),
                ArrayKey::Int(6),
                ArrayKey::Int(-3),
                ArrayKey::Int(2),
                ArrayKey::Int(7)
            ]
        );
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut arr = PhpArray::from_values([Value::Int(1), Value::Int(2)]);
        arr.insert(ArrayKey::Int(0), Value::Int(9));
        let values: Vec<_> = arr.values().cloned().collect();
        assert_eq!(values, vec![Value::Int(9), Value::Int(2)]);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::string("0").to_bool());
        assert!(!Value::string("").to_bool());
        assert!(Value::string("0.0").to_bool());
        assert!(!Value::Float(0.0).to_bool());
        assert!(!Value::Array(PhpArray::new()).to_bool());
        assert!(Value::Object(PhpObject::new("stdClass")).to_bool());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(1.0 / 3.0), "0.33333333333333");
        assert_eq!(format_float(1e25), "1.0E+25");
        assert_eq!(format_float(-1.5), "-1.5");
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(1e14), "1.0E+14");
        assert_eq!(format_float(1e13), "10000000000000");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1.0E-5");
        assert_eq!(format_float(1.5e-7), "1.5E-7");
        assert_eq!(format_float(f64::INFINITY), "INF");
        assert_eq!(format_float(-0.0), "-0");
    }

    #[test]
    fn test_numeric_strings() {
        assert_eq!(parse_numeric("42"), NumericStr::Numeric(Number::Int(42)));
        assert_eq!(parse_numeric("  -3.5"), NumericStr::Numeric(Number::Float(-3.5)));
        assert_eq!(parse_numeric("1e3"), NumericStr::Numeric(Number::Float(1000.0)));
        assert_eq!(parse_numeric(".5"), NumericStr::Numeric(Number::Float(0.5)));
        assert_eq!(parse_numeric("12abc"), NumericStr::Leading(Number::Int(12)));
        assert_eq!(parse_numeric("7 "), NumericStr::Leading(Number::Int(7)));
        assert_eq!(parse_numeric("1e"), NumericStr::Leading(Number::Int(1)));
        assert_eq!(parse_numeric("abc"), NumericStr::NonNumeric);
        assert_eq!(parse_numeric("."), NumericStr::NonNumeric);
        assert_eq!(parse_numeric(""), NumericStr::NonNumeric);
        assert_eq!(
            parse_numeric("9223372036854775808"),
            NumericStr::Numeric(Number::Float(9223372036854775808.0))
        );
    }
}
