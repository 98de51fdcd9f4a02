//! `const` declarations and constant fetches.

use php_ast::{ArrayItem, ConstElement, Expr, ExprKind, Span};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::model::Declaration;
use crate::value::Value;
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn declare_constants(&mut self, elements: &'p [ConstElement]) -> Result<()> {
        for element in elements {
            let value = self.constant_value(&element.value)?;
            let name = &element.name.node;
            let interp = &mut *self.interp;
            if !interp.env.declare_constant(name, &value, &mut interp.memory) {
                self.warning(
                    codes::CONSTANT_REDEFINED,
                    format!("Constant {} already defined", name),
                    element.name.span,
                );
            }
        }
        Ok(())
    }

    /// Evaluates an initializer that must be a constant expression.
    pub(crate) fn constant_value(&mut self, expr: &'p Expr) -> Result<Value> {
        if !is_constant_expr(expr) {
            return Err(RuntimeError::InvalidConstantExpression { span: expr.span });
        }
        let value = self.eval_value(expr)?;
        if matches!(value, Value::Object(_) | Value::Closure(_)) {
            return Err(RuntimeError::InvalidConstantExpression { span: expr.span });
        }
        Ok(value)
    }

    pub(crate) fn constant_fetch(&mut self, name: &SmolStr, span: Span) -> Result<()> {
        let value = match self.interp.env.constant(name) {
            Some(slot) => self.interp.memory.value_of(slot)?,
            None => match name.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => {
                    self.warning(
                        codes::UNDEFINED_CONSTANT,
                        format!("Use of undefined constant {} - assumed '{}'", name, name),
                        span,
                    );
                    Value::String(name.clone())
                }
            },
        };
        self.stack.push_value(value);
        Ok(())
    }

    pub(crate) fn class_constant_fetch(&mut self, class: &SmolStr, name: &SmolStr, span: Span) -> Result<()> {
        let env = &self.interp.env;
        let addr = env
            .lookup_class(class)
            .or_else(|| env.lookup_interface(class))
            .ok_or_else(|| RuntimeError::ClassNotFound {
                kind: "Class",
                name: class.clone(),
                span,
            })?;

        let (declared, constants) = match self.interp.memory.declaration(addr)? {
            Declaration::Class(def) => (def.name.clone(), &def.constants),
            Declaration::Interface(def) => (def.name.clone(), &def.constants),
            other => {
                return Err(RuntimeError::internal(format!(
                    "class table points at a {}",
                    other.kind()
                )))
            }
        };
        let value = if name.eq_ignore_ascii_case("class") {
            Value::String(declared)
        } else {
            constants
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedClassConstant {
                    name: name.clone(),
                    span,
                })?
        };
        self.stack.push_value(value);
        Ok(())
    }
}

/// Literals, constant fetches, and arrays, subscripts and operators over
/// those.
pub(crate) fn is_constant_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Integer(_)
        | ExprKind::Float(_)
        | ExprKind::String(_)
        | ExprKind::ConstFetch(_)
        | ExprKind::ClassConstFetch { .. } => true,
        ExprKind::Array(items) => items.iter().flatten().all(|item| match item {
            ArrayItem::Value(value) => is_constant_expr(value),
            ArrayItem::Entry { key, value } => is_constant_expr(key) && is_constant_expr(value),
        }),
        ExprKind::Offset {
            container,
            offset: Some(offset),
        } => is_constant_expr(container) && is_constant_expr(offset),
        ExprKind::Binary { left, right, .. } => is_constant_expr(left) && is_constant_expr(right),
        ExprKind::Unary { operand, .. } => is_constant_expr(operand),
        ExprKind::Paren(inner) => is_constant_expr(inner),
        ExprKind::Variable(_)
        | ExprKind::Offset { offset: None, .. }
        | ExprKind::Property { .. }
        | ExprKind::Assign { .. }
        | ExprKind::AssignRef { .. }
        | ExprKind::Closure(_)
        | ExprKind::New { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use php_ast::build::*;
    use php_ast::BinaryOp;

    #[test]
    fn test_constant_expressions() {
        assert!(is_constant_expr(&int(1)));
        assert!(is_constant_expr(&binary(BinaryOp::Concat, string("a"), constant("B"))));
        assert!(is_constant_expr(&array(vec![entry(string("k"), class_constant("C", "K"))])));
        assert!(is_constant_expr(&offset(array(vec![item(int(1))]), int(0))));

        assert!(!is_constant_expr(&var("a")));
        assert!(!is_constant_expr(&array(vec![item(var("a"))])));
        assert!(!is_constant_expr(&new_object("C", vec![])));
        assert!(!is_constant_expr(&closure(vec![], vec![], vec![])));
    }
}
