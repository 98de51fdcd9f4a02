//! Span-free constructors for syntax trees.
//!
//! Every node gets `Span::dummy()`. Embedders without a parser and the
//! evaluator's tests assemble programs with these.

use crate::*;

fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::dummy())
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::dummy())
}

fn block_of(stmts: Vec<Stmt>) -> Block {
    Block {
        stmts,
        span: Span::dummy(),
    }
}

pub fn ident(name: &str) -> Ident {
    Spanned::dummy(SmolStr::new(name))
}

pub fn program(stmts: Vec<Stmt>) -> Program {
    Program {
        stmts,
        span: Span::dummy(),
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub fn null() -> Expr {
    expr(ExprKind::Null)
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Bool(value))
}

/// Integer literal; negative values become `-` applied to a literal, as
/// source text has no negative literals.
pub fn int(value: i64) -> Expr {
    let literal = expr(ExprKind::Integer(SmolStr::new(value.unsigned_abs().to_string())));
    if value < 0 {
        unary(UnaryOp::Neg, literal)
    } else {
        literal
    }
}

/// Integer literal from its raw source text, e.g. `0x1A` or `0b101`
pub fn int_lit(raw: &str) -> Expr {
    expr(ExprKind::Integer(SmolStr::new(raw)))
}

pub fn float(value: f64) -> Expr {
    expr(ExprKind::Float(SmolStr::new(format!("{:?}", value))))
}

pub fn string(value: &str) -> Expr {
    expr(ExprKind::String(SmolStr::new(value)))
}

pub fn var(name: &str) -> Expr {
    expr(ExprKind::Variable(SmolStr::new(name)))
}

pub fn array(items: Vec<Option<ArrayItem>>) -> Expr {
    expr(ExprKind::Array(items))
}

pub fn item(value: Expr) -> Option<ArrayItem> {
    Some(ArrayItem::Value(value))
}

pub fn entry(key: Expr, value: Expr) -> Option<ArrayItem> {
    Some(ArrayItem::Entry { key, value })
}

/// The empty placeholder a stray comma leaves in an array literal
pub fn hole() -> Option<ArrayItem> {
    None
}

pub fn offset(container: Expr, key: Expr) -> Expr {
    expr(ExprKind::Offset {
        container: Box::new(container),
        offset: Some(Box::new(key)),
    })
}

/// `$container[]`
pub fn push(container: Expr) -> Expr {
    expr(ExprKind::Offset {
        container: Box::new(container),
        offset: None,
    })
}

pub fn prop(object: Expr, name: &str) -> Expr {
    expr(ExprKind::Property {
        object: Box::new(object),
        name: ident(name),
    })
}

pub fn assign(left: Expr, right: Expr) -> Expr {
    compound(left, AssignOp::Assign, right)
}

pub fn compound(left: Expr, op: AssignOp, right: Expr) -> Expr {
    expr(ExprKind::Assign {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

pub fn assign_ref(left: Expr, right: Expr) -> Expr {
    expr(ExprKind::AssignRef {
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn constant(name: &str) -> Expr {
    expr(ExprKind::ConstFetch(SmolStr::new(name)))
}

pub fn class_constant(class: &str, name: &str) -> Expr {
    expr(ExprKind::ClassConstFetch {
        class: ident(class),
        name: ident(name),
    })
}

pub fn new_object(class: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::New {
        class: ident(class),
        args,
    })
}

pub fn paren(inner: Expr) -> Expr {
    expr(ExprKind::Paren(Box::new(inner)))
}

pub fn param(name: &str) -> Param {
    Param {
        name: ident(name),
        default: None,
        by_ref: false,
        variadic: false,
        span: Span::dummy(),
    }
}

/// Closure literal; `uses` pairs a captured name with its by-reference flag
pub fn closure(params: Vec<Param>, uses: Vec<(&str, bool)>, body: Vec<Stmt>) -> Expr {
    let uses = uses
        .into_iter()
        .map(|(name, by_ref)| ClosureUse {
            name: ident(name),
            by_ref,
        })
        .collect();
    expr(ExprKind::Closure(Box::new(ClosureDecl {
        params,
        uses,
        by_ref: false,
        is_static: false,
        body: block_of(body),
        span: Span::dummy(),
    })))
}

// ============================================================================
// Statements
// ============================================================================

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

pub fn echo(exprs: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Echo(exprs))
}

pub fn inline(text: &str) -> Stmt {
    stmt(StmtKind::InlineHtml(SmolStr::new(text)))
}

pub fn global(names: &[&str]) -> Stmt {
    stmt(StmtKind::Global(names.iter().map(|n| ident(n)).collect()))
}

pub fn constants(elements: Vec<(&str, Expr)>) -> Stmt {
    stmt(StmtKind::Const(
        elements
            .into_iter()
            .map(|(name, value)| ConstElement {
                name: ident(name),
                value,
            })
            .collect(),
    ))
}

pub fn unset(targets: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Unset(targets))
}

pub fn if_else(condition: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        condition,
        then_branch: block_of(then),
        elseif_branches: Vec::new(),
        else_branch: otherwise.map(block_of),
    })
}

pub fn switch(subject: Expr, cases: Vec<SwitchCase>) -> Stmt {
    stmt(StmtKind::Switch { subject, cases })
}

pub fn case(test: Expr, body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        test: Some(test),
        body,
        span: Span::dummy(),
    }
}

pub fn default_case(body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        test: None,
        body,
        span: Span::dummy(),
    }
}

pub fn break_stmt() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(block_of(stmts)))
}

pub fn function(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Function(FunctionDecl {
        name: ident(name),
        params,
        by_ref: false,
        body: block_of(body),
        span: Span::dummy(),
    }))
}

// ============================================================================
// Classes, interfaces and traits
// ============================================================================

/// A plain (non-abstract, non-final) class without parent or interfaces
pub fn class(name: &str, members: Vec<ClassMember>) -> ClassDecl {
    ClassDecl {
        name: ident(name),
        parent: None,
        interfaces: Vec::new(),
        is_abstract: false,
        is_final: false,
        members,
        span: Span::dummy(),
    }
}

pub fn interface(name: &str, members: Vec<ClassMember>) -> InterfaceDecl {
    InterfaceDecl {
        name: ident(name),
        extends: Vec::new(),
        members,
        span: Span::dummy(),
    }
}

pub fn trait_decl(name: &str, members: Vec<ClassMember>) -> TraitDecl {
    TraitDecl {
        name: ident(name),
        members,
        span: Span::dummy(),
    }
}

pub fn class_stmt(decl: ClassDecl) -> Stmt {
    stmt(StmtKind::Class(decl))
}

pub fn interface_stmt(decl: InterfaceDecl) -> Stmt {
    stmt(StmtKind::Interface(decl))
}

pub fn trait_stmt(decl: TraitDecl) -> Stmt {
    stmt(StmtKind::Trait(decl))
}

pub fn property(name: &str, default: Option<Expr>, visibility: Visibility) -> ClassMember {
    ClassMember::Property(PropertyDecl {
        name: ident(name),
        default,
        modifiers: MemberModifiers {
            visibility,
            ..MemberModifiers::default()
        },
        span: Span::dummy(),
    })
}

/// Method member; a `None` body declares it without one (abstract or interface)
pub fn method(name: &str, body: Option<Vec<Stmt>>, modifiers: MemberModifiers) -> ClassMember {
    ClassMember::Method(MethodDecl {
        name: ident(name),
        params: Vec::new(),
        by_ref: false,
        body: body.map(block_of),
        modifiers,
        span: Span::dummy(),
    })
}

pub fn const_member(name: &str, value: Expr) -> ClassMember {
    ClassMember::Constant(ClassConstant {
        name: ident(name),
        value,
        visibility: Visibility::Public,
    })
}

pub fn use_traits(names: &[&str]) -> ClassMember {
    ClassMember::TraitUse(names.iter().map(|n| ident(n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assignment_shape() {
        let e = assign(offset(var("a"), int(1)), string("b"));
        match e.kind {
            ExprKind::Assign { left, op, right } => {
                assert_eq!(op, AssignOp::Assign);
                assert_eq!(left.kind.name(), "offsetlookup");
                assert_eq!(right.kind, ExprKind::String("b".into()));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_float_raw_text_round_trips() {
        match float(-0.7).kind {
            ExprKind::Float(raw) => assert_eq!(raw.parse::<f64>().unwrap(), -0.7),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_array_with_trailing_hole() {
        let e = array(vec![item(int(1)), entry(string("k"), int(2)), hole()]);
        match e.kind {
            ExprKind::Array(items) => {
                assert_eq!(items.len(), 3);
                assert!(items[2].is_none());
            }
            other => panic!("expected array, got {:?}", other),
        }
    }
}
