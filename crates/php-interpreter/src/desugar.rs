//! One-time lowering pass run before evaluation.
//!
//! Rewrites every compound assignment `l op= r` into `l = l op r`, including
//! inside function, method and closure bodies, so the assignment handler
//! only ever sees plain `=`.

use php_ast::{
    ArrayItem, AssignOp, Block, ClassMember, Expr, ExprKind, Program, Span, Stmt, StmtKind,
};
use tracing::debug;

use crate::eval::{STACK_GROW_BYTES, STACK_RED_ZONE_BYTES};
use crate::{Result, RuntimeError};

/// Returns a copy of `program` with compound assignments lowered. Nesting
/// deeper than `max_depth` is rejected before any of it runs.
pub fn lower(program: &Program, max_depth: usize) -> Result<Program> {
    let mut lowered = program.clone();
    let mut pass = Lowering {
        max_depth,
        depth: 0,
        rewrites: 0,
    };
    for stmt in &mut lowered.stmts {
        pass.stmt(stmt)?;
    }
    debug!(rewrites = pass.rewrites, "compound assignments lowered");
    Ok(lowered)
}

struct Lowering {
    max_depth: usize,
    depth: usize,
    rewrites: usize,
}

impl Lowering {
    /// Runs `f` one level deeper, growing the host stack when it runs low.
    fn nested(&mut self, span: Span, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::DepthExceeded {
                limit: self.max_depth,
                span,
            });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE_BYTES, STACK_GROW_BYTES, || f(self));
        self.depth -= 1;
        result
    }

    fn block(&mut self, block: &mut Block) -> Result<()> {
        for stmt in &mut block.stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn members(&mut self, members: &mut [ClassMember]) -> Result<()> {
        for member in members {
            match member {
                ClassMember::Constant(constant) => self.expr(&mut constant.value)?,
                ClassMember::Property(property) => {
                    if let Some(default) = &mut property.default {
                        self.expr(default)?;
                    }
                }
                ClassMember::Method(method) => {
                    if let Some(body) = &mut method.body {
                        self.block(body)?;
                    }
                }
                ClassMember::TraitUse(_) => {}
            }
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let span = stmt.span;
        self.nested(span, |pass| pass.stmt_kind(&mut stmt.kind))
    }

    fn stmt_kind(&mut self, kind: &mut StmtKind) -> Result<()> {
        match kind {
            StmtKind::Expr(expr) => self.expr(expr)?,
            StmtKind::Echo(exprs) | StmtKind::Unset(exprs) => {
                for expr in exprs {
                    self.expr(expr)?;
                }
            }
            StmtKind::Const(elements) => {
                for element in elements {
                    self.expr(&mut element.value)?;
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                elseif_branches,
                else_branch,
            } => {
                self.expr(condition)?;
                self.block(then_branch)?;
                for (cond, block) in elseif_branches {
                    self.expr(cond)?;
                    self.block(block)?;
                }
                if let Some(block) = else_branch {
                    self.block(block)?;
                }
            }
            StmtKind::Switch { subject, cases } => {
                self.expr(subject)?;
                for case in cases {
                    if let Some(test) = &mut case.test {
                        self.expr(test)?;
                    }
                    for stmt in &mut case.body {
                        self.stmt(stmt)?;
                    }
                }
            }
            StmtKind::Block(block) => self.block(block)?,
            StmtKind::Function(decl) => {
                for param in &mut decl.params {
                    if let Some(default) = &mut param.default {
                        self.expr(default)?;
                    }
                }
                self.block(&mut decl.body)?;
            }
            StmtKind::Class(decl) => self.members(&mut decl.members)?,
            StmtKind::Interface(decl) => self.members(&mut decl.members)?,
            StmtKind::Trait(decl) => self.members(&mut decl.members)?,
            StmtKind::InlineHtml(_) | StmtKind::Global(_) | StmtKind::Break => {}
        }
        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        self.nested(span, |pass| pass.expr_kind(expr))
    }

    fn expr_kind(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Assign { left, op, right } => {
                self.expr(left)?;
                self.expr(right)?;
                if let Some(binary) = op.binary_op() {
                    let target = (**left).clone();
                    let operand = std::mem::replace(&mut **right, Expr::new(ExprKind::Null, span));
                    **right = Expr::new(
                        ExprKind::Binary {
                            op: binary,
                            left: Box::new(target),
                            right: Box::new(operand),
                        },
                        span,
                    );
                    *op = AssignOp::Assign;
                    self.rewrites += 1;
                }
            }
            ExprKind::AssignRef { left, right } | ExprKind::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            ExprKind::Array(items) => {
                for item in items.iter_mut().flatten() {
                    match item {
                        ArrayItem::Value(value) => self.expr(value)?,
                        ArrayItem::Entry { key, value } => {
                            self.expr(key)?;
                            self.expr(value)?;
                        }
                    }
                }
            }
            ExprKind::Offset { container, offset } => {
                self.expr(container)?;
                if let Some(offset) = offset {
                    self.expr(offset)?;
                }
            }
            ExprKind::Property { object, .. } => self.expr(object)?,
            ExprKind::Unary { operand, .. } => self.expr(operand)?,
            ExprKind::Paren(inner) => self.expr(inner)?,
            ExprKind::New { args, .. } => {
                for arg in args {
                    self.expr(arg)?;
                }
            }
            ExprKind::Closure(decl) => self.block(&mut decl.body)?,
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Integer(_)
            | ExprKind::Float(_)
            | ExprKind::String(_)
            | ExprKind::Variable(_)
            | ExprKind::ConstFetch(_)
            | ExprKind::ClassConstFetch { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use php_ast::build::*;
    use php_ast::BinaryOp;
    use pretty_assertions::assert_eq;

    const LIMIT: usize = 512;

    #[test]
    fn test_compound_becomes_plain_assignment() {
        let source = program(vec![expr_stmt(compound(var("a"), AssignOp::Concat, string("x")))]);
        let expected = program(vec![expr_stmt(assign(
            var("a"),
            binary(BinaryOp::Concat, var("a"), string("x")),
        ))]);
        assert_eq!(lower(&source, LIMIT).unwrap(), expected);
    }

    #[test]
    fn test_coalesce_assignment() {
        let source = program(vec![expr_stmt(compound(
            offset(var("a"), string("k")),
            AssignOp::Coalesce,
            int(1),
        ))]);
        let expected = program(vec![expr_stmt(assign(
            offset(var("a"), string("k")),
            binary(BinaryOp::Coalesce, offset(var("a"), string("k")), int(1)),
        ))]);
        assert_eq!(lower(&source, LIMIT).unwrap(), expected);
    }

    #[test]
    fn test_nested_bodies_are_lowered() {
        let source = program(vec![
            function("f", vec![], vec![expr_stmt(compound(var("n"), AssignOp::Add, int(1)))]),
            expr_stmt(assign(
                var("g"),
                closure(vec![], vec![], vec![expr_stmt(compound(var("m"), AssignOp::Mul, int(2)))]),
            )),
        ]);
        let expected = program(vec![
            function("f", vec![], vec![expr_stmt(assign(var("n"), binary(BinaryOp::Add, var("n"), int(1))))]),
            expr_stmt(assign(
                var("g"),
                closure(vec![], vec![], vec![expr_stmt(assign(var("m"), binary(BinaryOp::Mul, var("m"), int(2))))]),
            )),
        ]);
        assert_eq!(lower(&source, LIMIT).unwrap(), expected);
    }

    #[test]
    fn test_plain_program_unchanged() {
        let source = program(vec![echo(vec![var("a")]), expr_stmt(assign(var("b"), int(2)))]);
        assert_eq!(lower(&source, LIMIT).unwrap(), source);
    }

    #[test]
    fn test_nesting_past_limit_is_rejected() {
        let mut deep = int(1);
        for _ in 0..100 {
            deep = binary(BinaryOp::Add, deep, int(1));
        }
        let source = program(vec![expr_stmt(assign(var("a"), deep))]);
        let err = lower(&source, 20).unwrap_err();
        assert!(matches!(err, RuntimeError::DepthExceeded { limit: 20, .. }));
        assert!(lower(&source, LIMIT).is_ok());
    }
}
