//! The explicit evaluation stack.
//!
//! Handlers communicate only through this stack: they push syntax nodes to
//! evaluate, then pop the value or address those nodes left behind. Every
//! pop checks the tag it expects.

use std::fmt;

use php_ast::{Expr, Span, Stmt};

use crate::heap::Address;
use crate::value::Value;
use crate::{Result, RuntimeError};

/// What the caller wants out of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Value,
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AstNode<'p> {
    Stmt(&'p Stmt),
    Expr(&'p Expr),
}

impl<'p> AstNode<'p> {
    pub fn span(&self) -> Span {
        match self {
            AstNode::Stmt(stmt) => stmt.span,
            AstNode::Expr(expr) => expr.span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AstNode::Stmt(stmt) => stmt.kind.name(),
            AstNode::Expr(expr) => expr.kind.name(),
        }
    }
}

/// A resolved memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub slot: Address,
    pub store: Address,
    pub composite: Option<Address>,
    /// Character index when the location is a single string offset
    pub offset: Option<usize>,
}

impl Location {
    pub fn is_string_offset(&self) -> bool {
        self.offset.is_some()
    }
}

/// Control markers delimiting sub-evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    EndOfAssignment,
    EndOfArray,
    EndOfBlock,
    EndOfSwitch,
    /// Left in place of an address when a write target can't be produced
    Unaddressable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackNode<'p> {
    Ast { node: AstNode<'p>, intent: Intent },
    Value(Value),
    Address(Location),
    Indicator(Indicator),
}

impl<'p> StackNode<'p> {
    pub fn tag(&self) -> &'static str {
        match self {
            StackNode::Ast { .. } => "ast",
            StackNode::Value(_) => "value",
            StackNode::Address(_) => "address",
            StackNode::Indicator(_) => "indicator",
        }
    }
}

impl fmt::Display for StackNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackNode::Ast { node, intent } => write!(f, "ast({}, {:?})", node.kind_name(), intent),
            StackNode::Value(value) => write!(f, "value({})", value.type_name()),
            StackNode::Address(loc) => write!(f, "address({})", loc.slot),
            StackNode::Indicator(indicator) => write!(f, "indicator({:?})", indicator),
        }
    }
}

#[derive(Debug, Default)]
pub struct EvalStack<'p> {
    nodes: Vec<StackNode<'p>>,
}

fn unexpected(expected: &str, found: Option<&StackNode<'_>>) -> RuntimeError {
    let found = match found {
        Some(node) => node.to_string(),
        None => "empty stack".to_string(),
    };
    RuntimeError::internal(format!("expected {} on the stack, found {}", expected, found))
}

impl<'p> EvalStack<'p> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: StackNode<'p>) {
        self.nodes.push(node);
    }

    pub fn push_value(&mut self, value: Value) {
        self.nodes.push(StackNode::Value(value));
    }

    pub fn push_indicator(&mut self, indicator: Indicator) {
        self.nodes.push(StackNode::Indicator(indicator));
    }

    pub fn pop(&mut self) -> Option<StackNode<'p>> {
        self.nodes.pop()
    }

    pub fn peek(&self) -> Option<&StackNode<'p>> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &StackNode<'p>> {
        self.nodes.iter()
    }

    pub fn pop_value(&mut self) -> Result<Value> {
        match self.nodes.pop() {
            Some(StackNode::Value(value)) => Ok(value),
            other => Err(unexpected("value", other.as_ref())),
        }
    }

    /// Pops an address, or `None` if the producer left `Unaddressable`.
    pub fn pop_location(&mut self) -> Result<Option<Location>> {
        match self.nodes.pop() {
            Some(StackNode::Address(loc)) => Ok(Some(loc)),
            Some(StackNode::Indicator(Indicator::Unaddressable)) => Ok(None),
            other => Err(unexpected("address", other.as_ref())),
        }
    }

    pub fn pop_indicator(&mut self, expected: Indicator) -> Result<()> {
        match self.nodes.pop() {
            Some(StackNode::Indicator(found)) if found == expected => Ok(()),
            other => Err(unexpected(&format!("{:?}", expected), other.as_ref())),
        }
    }

    /// Drops everything above and including the nearest `indicator`.
    /// Returns false if no such indicator is on the stack.
    pub fn unwind_to(&mut self, indicator: Indicator) -> bool {
        let position = self
            .nodes
            .iter()
            .rposition(|node| matches!(node, StackNode::Indicator(found) if *found == indicator));
        match position {
            Some(index) => {
                self.nodes.truncate(index);
                true
            }
            None => false,
        }
    }
}
