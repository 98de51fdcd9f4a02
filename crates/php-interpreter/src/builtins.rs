//! Predefined constants and classes.

use std::rc::Rc;

use crate::eval::Interpreter;
use crate::handlers::DEFAULT_CLASS;
use crate::model::{ClassDef, Declaration};
use crate::value::Value;

/// Register every predefined constant and class in a fresh interpreter.
pub(crate) fn register(interp: &mut Interpreter) {
    // Core
    define(interp, "PHP_EOL", Value::string("\n"));
    define(interp, "PHP_VERSION", Value::string("7.4.0"));

    // Integers and floats
    define(interp, "PHP_INT_MAX", Value::Int(i64::MAX));
    define(interp, "PHP_INT_MIN", Value::Int(i64::MIN));
    define(interp, "PHP_INT_SIZE", Value::Int(8));
    define(interp, "PHP_FLOAT_EPSILON", Value::Float(f64::EPSILON));
    define(interp, "PHP_FLOAT_MAX", Value::Float(f64::MAX));
    define(interp, "PHP_FLOAT_MIN", Value::Float(f64::MIN_POSITIVE));
    define(interp, "PHP_FLOAT_DIG", Value::Int(f64::DIGITS as i64));
    define(interp, "NAN", Value::Float(f64::NAN));
    define(interp, "INF", Value::Float(f64::INFINITY));
    define(interp, "M_PI", Value::Float(std::f64::consts::PI));

    // Error levels
    define(interp, "E_ERROR", Value::Int(1));
    define(interp, "E_WARNING", Value::Int(2));
    define(interp, "E_NOTICE", Value::Int(8));
    define(interp, "E_ALL", Value::Int(32767));

    // Classes
    let std_class = ClassDef::new(DEFAULT_CLASS);
    let addr = interp.memory.intern(Declaration::Class(Rc::new(std_class)));
    interp.env.declare_class(DEFAULT_CLASS, addr);
}

fn define(interp: &mut Interpreter, name: &str, value: Value) {
    interp.env.declare_constant(name, &value, &mut interp.memory);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_predefined_constants() {
        let interp = Interpreter::new();
        assert_eq!(interp.constant("PHP_EOL"), Some(Value::string("\n")));
        assert_eq!(interp.constant("PHP_INT_MAX"), Some(Value::Int(i64::MAX)));
        assert_eq!(interp.constant("PHP_FLOAT_DIG"), Some(Value::Int(15)));
        assert_eq!(interp.constant("php_eol"), None);
    }

    #[test]
    fn test_std_class_is_declared() {
        let interp = Interpreter::new();
        assert!(interp.environment().lookup_class("STDCLASS").is_some());
    }
}
