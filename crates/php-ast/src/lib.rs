//! PHP Abstract Syntax Tree
//!
//! Defines the node types the evaluation engine consumes. Producing these
//! trees (lexing and parsing source text) happens elsewhere; the evaluator
//! only relies on each node exposing its kind and kind-specific children.

use std::fmt;
use std::ops::Range;

pub use smol_str::SmolStr;

pub mod build;

/// Source span representing a byte range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

/// A spanned value - wraps any value with source location info
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn dummy(node: T) -> Self {
        Self {
            node,
            span: Span::dummy(),
        }
    }
}

/// Identifier (variable names without `$`, function, class and constant names)
pub type Ident = Spanned<SmolStr>;

// ============================================================================
// Program Structure
// ============================================================================

/// A complete script: the top-level statement list
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// ============================================================================
// Declarations
// ============================================================================

/// Member visibility. Members without an explicit modifier are public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// Modifiers attached to a property or method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberModifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
    pub by_ref: bool,
    pub variadic: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub by_ref: bool,
    pub body: Block,
    pub span: Span,
}

/// A variable captured by a closure's `use (...)` clause
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureUse {
    pub name: Ident,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureDecl {
    pub params: Vec<Param>,
    pub uses: Vec<ClosureUse>,
    pub by_ref: bool,
    pub is_static: bool,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Ident,
    pub parent: Option<Ident>,
    pub interfaces: Vec<Ident>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: Ident,
    pub extends: Vec<Ident>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDecl {
    pub name: Ident,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

/// Body element of a class, interface or trait
#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Constant(ClassConstant),
    Property(PropertyDecl),
    Method(MethodDecl),
    /// `use TraitA, TraitB;`
    TraitUse(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassConstant {
    pub name: Ident,
    pub value: Expr,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: Ident,
    pub default: Option<Expr>,
    pub modifiers: MemberModifiers,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub by_ref: bool,
    /// `None` for abstract and interface methods
    pub body: Option<Block>,
    pub modifiers: MemberModifiers,
    pub span: Span,
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement
    Expr(Expr),

    /// `echo a, b;`
    Echo(Vec<Expr>),

    /// Text outside `<?php ... ?>` tags
    InlineHtml(SmolStr),

    /// `global $a, $b;`
    Global(Vec<Ident>),

    /// `const A = 1, B = 2;`
    Const(Vec<ConstElement>),

    /// `unset($a, $b[1]);`
    Unset(Vec<Expr>),

    If {
        condition: Expr,
        then_branch: Block,
        elseif_branches: Vec<(Expr, Block)>,
        else_branch: Option<Block>,
    },

    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },

    Break,

    Block(Block),

    Function(FunctionDecl),
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Trait(TraitDecl),
}

impl StmtKind {
    /// Node kind name, used in diagnostics and tracing
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Expr(_) => "expression",
            StmtKind::Echo(_) => "echo",
            StmtKind::InlineHtml(_) => "inline",
            StmtKind::Global(_) => "global",
            StmtKind::Const(_) => "constant",
            StmtKind::Unset(_) => "unset",
            StmtKind::If { .. } => "if",
            StmtKind::Switch { .. } => "switch",
            StmtKind::Break => "break",
            StmtKind::Block(_) => "block",
            StmtKind::Function(_) => "function",
            StmtKind::Class(_) => "class",
            StmtKind::Interface(_) => "interface",
            StmtKind::Trait(_) => "trait",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstElement {
    pub name: Ident,
    pub value: Expr,
}

/// One `case expr:` or `default:` arm. `test` is `None` for `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether the expression can denote a memory location
    pub fn is_addressable(&self) -> bool {
        match &self.kind {
            ExprKind::Variable(_) | ExprKind::Offset { .. } | ExprKind::Property { .. } => true,
            ExprKind::Paren(inner) => inner.is_addressable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals (numbers keep their raw source text)
    Null,
    Bool(bool),
    Integer(SmolStr),
    Float(SmolStr),
    String(SmolStr),

    /// `$name`
    Variable(SmolStr),

    /// `[a, k => v, ]`; a `None` item is the placeholder a trailing comma leaves
    Array(Vec<Option<ArrayItem>>),

    /// `$a[k]`, or `$a[]` when `offset` is `None`
    Offset {
        container: Box<Expr>,
        offset: Option<Box<Expr>>,
    },

    /// `$o->name`
    Property {
        object: Box<Expr>,
        name: Ident,
    },

    /// `left = right` and the compound forms `left op= right`
    Assign {
        left: Box<Expr>,
        op: AssignOp,
        right: Box<Expr>,
    },

    /// `left = &right`
    AssignRef {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// Bare constant name, `FOO`
    ConstFetch(SmolStr),

    /// `Class::NAME`
    ClassConstFetch {
        class: Ident,
        name: Ident,
    },

    Closure(Box<ClosureDecl>),

    New {
        class: Ident,
        args: Vec<Expr>,
    },

    Paren(Box<Expr>),
}

impl ExprKind {
    /// Node kind name, used in diagnostics and tracing
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Null => "null",
            ExprKind::Bool(_) => "boolean",
            ExprKind::Integer(_) | ExprKind::Float(_) => "number",
            ExprKind::String(_) => "string",
            ExprKind::Variable(_) => "variable",
            ExprKind::Array(_) => "array",
            ExprKind::Offset { .. } => "offsetlookup",
            ExprKind::Property { .. } => "propertylookup",
            ExprKind::Assign { .. } => "assign",
            ExprKind::AssignRef { .. } => "assignref",
            ExprKind::Binary { .. } => "bin",
            ExprKind::Unary { .. } => "unary",
            ExprKind::ConstFetch(_) => "constref",
            ExprKind::ClassConstFetch { .. } => "staticlookup",
            ExprKind::Closure(_) => "closure",
            ExprKind::New { .. } => "new",
            ExprKind::Paren(_) => "parenthesis",
        }
    }
}

/// An array literal element
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    /// Element without a key: takes the next auto-increment index
    Value(Expr),
    /// `key => value`
    Entry { key: Expr, value: Expr },
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,

    // String
    Concat,

    // Comparison
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Spaceship,

    // Logical
    And,
    Or,
    Xor,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    // Other
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Concat => ".",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Spaceship => "<=>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "xor",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Coalesce => "??",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

/// Assignment operator: plain `=` or a compound form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssignOp {
    #[default]
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Coalesce,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, `None` for `=`
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::Pow => Some(BinaryOp::Pow),
            AssignOp::Concat => Some(BinaryOp::Concat),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::Coalesce => Some(BinaryOp::Coalesce),
        }
    }

    pub fn is_compound(&self) -> bool {
        !matches!(self, AssignOp::Assign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_span_merge() {
        let a = Span::new(4, 9);
        let b = Span::new(2, 6);
        assert_eq!(a.merge(b), Span::new(2, 9));
        assert_eq!(Range::from(Span::from(3..7)), 3..7);
    }

    #[test]
    fn test_compound_operator_mapping() {
        assert_eq!(AssignOp::Assign.binary_op(), None);
        assert_eq!(AssignOp::Concat.binary_op(), Some(BinaryOp::Concat));
        assert_eq!(AssignOp::Coalesce.binary_op(), Some(BinaryOp::Coalesce));
        assert!(AssignOp::Shl.is_compound());
        assert!(!AssignOp::Assign.is_compound());
    }

    #[test]
    fn test_addressable_expressions() {
        let var = Expr::new(ExprKind::Variable("a".into()), Span::dummy());
        assert!(var.is_addressable());

        let paren = Expr::new(ExprKind::Paren(Box::new(var.clone())), Span::dummy());
        assert!(paren.is_addressable());

        let lit = Expr::new(ExprKind::Integer("1".into()), Span::dummy());
        assert!(!lit.is_addressable());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ExprKind::Null.name(), "null");
        assert_eq!(StmtKind::Break.name(), "break");
        assert_eq!(BinaryOp::Spaceship.to_string(), "<=>");
    }
}
