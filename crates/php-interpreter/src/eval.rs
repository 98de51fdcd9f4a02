//! The interpreter façade and the dispatch loop.

use php_ast::{Expr, ExprKind, Program, Span, Stmt, StmtKind};
use php_diagnostics::span::SourceSpan;
use php_diagnostics::{codes, Diagnostic, DiagnosticLog, Severity};
use tracing::{instrument, trace};

use crate::builtins;
use crate::config::InterpreterConfig;
use crate::desugar;
use crate::environment::{Environment, GLOBAL_SCOPE};
use crate::heap::Address;
use crate::memory::Memory;
use crate::stack::{AstNode, EvalStack, Indicator, Intent, Location, StackNode};
use crate::value::Value;
use crate::{Result, RuntimeError};

// Each nesting level of dispatch runs a handler frame on the host stack; the
// stack is grown in these steps once less than the red zone is left.
pub(crate) const STACK_RED_ZONE_BYTES: usize = 128 * 1024;
pub(crate) const STACK_GROW_BYTES: usize = 1024 * 1024;

/// Owns all state of one program run: heap, scopes, output and diagnostics.
pub struct Interpreter {
    pub(crate) memory: Memory,
    pub(crate) env: Environment,
    pub(crate) output: String,
    pub(crate) diagnostics: DiagnosticLog,
    pub(crate) config: InterpreterConfig,
    /// Nodes left on the stack when the last run ended
    residual: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let mut interp = Interpreter {
            memory: Memory::new(),
            env: Environment::new(),
            output: String::new(),
            diagnostics: DiagnosticLog::new(),
            config,
            residual: 0,
        };
        builtins::register(&mut interp);
        interp
    }

    /// Executes `program` to completion. A fatal error aborts the run; it is
    /// also appended to the diagnostic log.
    #[instrument(skip_all, fields(statements = program.stmts.len()))]
    pub fn run(&mut self, program: &Program) -> Result<()> {
        let result = match desugar::lower(program, self.config.max_depth) {
            Ok(lowered) => self.execute(&lowered),
            Err(err) => {
                self.residual = 0;
                Err(err)
            }
        };

        if let Err(err) = &result {
            tracing::debug!(error = %err, residual = self.residual, "run aborted");
            let diagnostic = err.to_diagnostic(&self.config.source_name);
            self.diagnostics.push(diagnostic);
        }
        result
    }

    fn execute(&mut self, program: &Program) -> Result<()> {
        let mut evaluator = Evaluator::new(self);
        let result = evaluator.run_program(program);
        let residual = evaluator.stack.len();
        self.residual = residual;
        result
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Reads a variable straight from the global scope.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.variable(GLOBAL_SCOPE, name)
    }

    /// Like [`lookup_variable`](Self::lookup_variable), with a corrupt heap
    /// logged and read as unset.
    pub fn variable(&self, scope: usize, name: &str) -> Option<Value> {
        self.lookup_variable(scope, name).unwrap_or_else(|err| {
            tracing::debug!(error = %err, scope, name, "variable unreadable");
            None
        })
    }

    pub fn lookup_variable(&self, scope: usize, name: &str) -> Result<Option<Value>> {
        match self.env.lookup_variable(scope, name) {
            Some(slot) => self.memory.read(slot),
            None => Ok(None),
        }
    }

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.lookup_constant(name).unwrap_or_else(|err| {
            tracing::debug!(error = %err, name, "constant unreadable");
            None
        })
    }

    pub fn lookup_constant(&self, name: &str) -> Result<Option<Value>> {
        match self.env.constant(name) {
            Some(slot) => self.memory.read(slot),
            None => Ok(None),
        }
    }

    /// Opens an activation scope; subsequent runs execute inside it.
    pub fn enter_scope(&mut self, name: &str) -> usize {
        self.env.push_scope(name)
    }

    pub fn leave_scope(&mut self) -> Result<()> {
        self.env.pop_scope(&mut self.memory)
    }

    /// Stack entries left over by the last run; zero after a clean run.
    pub fn stack_depth(&self) -> usize {
        self.residual
    }

    pub(crate) fn report(&mut self, severity: Severity, code: &str, message: String, span: Span) {
        if !self.config.reports(severity) {
            return;
        }
        let location = SourceSpan::new(self.config.source_name.as_str(), span.start, span.end);
        self.diagnostics
            .push(Diagnostic::new(severity, Some(code.to_string()), message).with_span(location));
    }
}

/// Outcome of executing a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
}

/// Drives the evaluation stack for one run.
pub(crate) struct Evaluator<'i, 'p> {
    pub(crate) interp: &'i mut Interpreter,
    pub(crate) stack: EvalStack<'p>,
    depth: usize,
    /// Non-zero while evaluating the left side of `??`
    quiet: usize,
}

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn new(interp: &'i mut Interpreter) -> Self {
        Self {
            interp,
            stack: EvalStack::new(),
            depth: 0,
            quiet: 0,
        }
    }

    fn run_program(&mut self, program: &'p Program) -> Result<()> {
        for stmt in program.stmts.iter().rev() {
            self.push_stmt(stmt);
        }
        while !self.stack.is_empty() {
            let span = self.peek_span();
            if self.step()? == Flow::Break {
                return Err(RuntimeError::BreakOutsideSwitch { span });
            }
        }
        Ok(())
    }

    fn peek_span(&self) -> Span {
        match self.stack.peek() {
            Some(StackNode::Ast { node, .. }) => node.span(),
            _ => Span::dummy(),
        }
    }

    pub(crate) fn push_stmt(&mut self, stmt: &'p Stmt) {
        self.stack.push(StackNode::Ast {
            node: AstNode::Stmt(stmt),
            intent: Intent::Value,
        });
    }

    /// Pops one node and dispatches it. Only syntax nodes are dispatched;
    /// values, addresses and indicators belong to whoever pushed them.
    pub(crate) fn step(&mut self) -> Result<Flow> {
        let (node, intent) = match self.stack.pop() {
            Some(StackNode::Ast { node, intent }) => (node, intent),
            Some(other) => {
                return Err(RuntimeError::internal(format!("dispatch popped {}", other)));
            }
            None => return Err(RuntimeError::internal("dispatch on an empty stack")),
        };

        if self.depth >= self.interp.config.max_depth {
            return Err(RuntimeError::DepthExceeded {
                limit: self.interp.config.max_depth,
                span: node.span(),
            });
        }
        trace!(kind = node.kind_name(), ?intent, depth = self.depth, "dispatch");

        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE_BYTES, STACK_GROW_BYTES, || match node {
            AstNode::Stmt(stmt) => self.exec_stmt(stmt),
            AstNode::Expr(expr) => self.eval_expr(expr, intent).map(|()| Flow::Normal),
        });
        self.depth -= 1;
        result.map_err(|err| err.at(node.span()))
    }

    /// Schedules `expr` and runs it, leaving its result on the stack.
    pub(crate) fn eval(&mut self, expr: &'p Expr, intent: Intent) -> Result<()> {
        self.stack.push(StackNode::Ast {
            node: AstNode::Expr(expr),
            intent,
        });
        self.step().map(|_| ())
    }

    pub(crate) fn eval_value(&mut self, expr: &'p Expr) -> Result<Value> {
        self.eval(expr, Intent::Value)?;
        self.stack.pop_value()
    }

    /// Evaluates `expr` for writing. `None` when no location could be made.
    pub(crate) fn eval_address(&mut self, expr: &'p Expr) -> Result<Option<Location>> {
        self.eval(expr, Intent::Address)?;
        self.stack.pop_location()
    }

    /// Runs `stmts` above an `EndOfBlock` marker.
    pub(crate) fn exec_block(&mut self, stmts: &'p [Stmt]) -> Result<Flow> {
        self.stack.push_indicator(Indicator::EndOfBlock);
        for stmt in stmts.iter().rev() {
            self.push_stmt(stmt);
        }
        self.run_until(Indicator::EndOfBlock)
    }

    /// Steps until `indicator` surfaces and pops it. On `break` the stack is
    /// unwound through the indicator and `Flow::Break` returned.
    pub(crate) fn run_until(&mut self, indicator: Indicator) -> Result<Flow> {
        loop {
            if let Some(StackNode::Indicator(top)) = self.stack.peek() {
                if *top == indicator {
                    self.stack.pop();
                    return Ok(Flow::Normal);
                }
            }
            if self.step()? == Flow::Break {
                if !self.stack.unwind_to(indicator) {
                    return Err(RuntimeError::internal(format!("{:?} missing", indicator)));
                }
                return Ok(Flow::Break);
            }
        }
    }

    pub(crate) fn locate(&self, slot: Address) -> Result<Location> {
        let memory = &self.interp.memory;
        Ok(Location {
            slot,
            store: memory.store_of(slot)?,
            composite: memory.composite_of(slot)?,
            offset: None,
        })
    }

    pub(crate) fn push_location(&mut self, location: Option<Location>) {
        match location {
            Some(loc) => self.stack.push(StackNode::Address(loc)),
            None => self.stack.push_indicator(Indicator::Unaddressable),
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub(crate) fn notice(&mut self, code: &str, message: String, span: Span) {
        if self.quiet > 0 && is_existence_check(code) {
            return;
        }
        self.interp.report(Severity::Notice, code, message, span);
    }

    pub(crate) fn warning(&mut self, code: &str, message: String, span: Span) {
        self.interp.report(Severity::Warning, code, message, span);
    }

    /// Evaluates `expr` with existence notices suppressed.
    pub(crate) fn eval_quiet(&mut self, expr: &'p Expr) -> Result<Value> {
        self.quiet += 1;
        let value = self.eval_value(expr);
        self.quiet -= 1;
        value
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn exec_stmt(&mut self, stmt: &'p Stmt) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_value(expr)?;
            }
            StmtKind::Echo(exprs) => self.echo(exprs)?,
            StmtKind::InlineHtml(text) => self.interp.output.push_str(text),
            StmtKind::Global(names) => self.global_stmt(names)?,
            StmtKind::Const(elements) => self.declare_constants(elements)?,
            StmtKind::Unset(targets) => self.unset(targets)?,
            StmtKind::If {
                condition,
                then_branch,
                elseif_branches,
                else_branch,
            } => return self.if_stmt(condition, then_branch, elseif_branches, else_branch.as_ref()),
            StmtKind::Switch { subject, cases } => self.switch(subject, cases)?,
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Block(block) => return self.exec_block(&block.stmts),
            StmtKind::Function(decl) => self.declare_function(decl)?,
            StmtKind::Class(decl) => self.declare_class(decl)?,
            StmtKind::Interface(decl) => self.declare_interface(decl)?,
            StmtKind::Trait(decl) => self.declare_trait(decl)?,
        }
        Ok(Flow::Normal)
    }

    fn eval_expr(&mut self, expr: &'p Expr, intent: Intent) -> Result<()> {
        let span = expr.span;
        if intent == Intent::Address && !expr.is_addressable() {
            return Err(RuntimeError::NotWritable { span });
        }
        match &expr.kind {
            ExprKind::Null => self.stack.push_value(Value::Null),
            ExprKind::Bool(b) => self.stack.push_value(Value::Bool(*b)),
            ExprKind::Integer(raw) => {
                let value = parse_int_literal(raw).ok_or_else(|| RuntimeError::InvalidLiteral {
                    raw: raw.clone(),
                    span,
                })?;
                self.stack.push_value(value);
            }
            ExprKind::Float(raw) => {
                let value = parse_float_literal(raw).ok_or_else(|| RuntimeError::InvalidLiteral {
                    raw: raw.clone(),
                    span,
                })?;
                self.stack.push_value(Value::Float(value));
            }
            ExprKind::String(s) => self.stack.push_value(Value::String(s.clone())),
            ExprKind::Variable(name) => self.variable(name, intent, span)?,
            ExprKind::Array(items) => self.array_literal(items, span)?,
            ExprKind::Offset { container, offset } => match intent {
                Intent::Value => self.offset_read(container, offset.as_deref(), span)?,
                Intent::Address => self.offset_write(container, offset.as_deref(), span)?,
            },
            ExprKind::Property { object, name } => match intent {
                Intent::Value => self.property_read(object, &name.node, span)?,
                Intent::Address => self.property_write(object, &name.node, span)?,
            },
            ExprKind::Assign { left, op, right } => self.assign(left, *op, right, span)?,
            ExprKind::AssignRef { left, right } => self.assign_ref(left, right, span)?,
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, span)?,
            ExprKind::Unary { op, operand } => self.unary(*op, operand, span)?,
            ExprKind::ConstFetch(name) => self.constant_fetch(name, span)?,
            ExprKind::ClassConstFetch { class, name } => {
                self.class_constant_fetch(&class.node, &name.node, span)?
            }
            ExprKind::Closure(decl) => self.closure(decl, span)?,
            ExprKind::New { class, .. } => self.new_object(&class.node, span)?,
            // The inner result is left in place as ours
            ExprKind::Paren(inner) => self.eval(inner, intent)?,
        }
        Ok(())
    }
}

/// Notices `??` suppresses: the ones reporting that something is missing.
fn is_existence_check(code: &str) -> bool {
    matches!(
        code,
        codes::UNDEFINED_VARIABLE
            | codes::UNDEFINED_OFFSET
            | codes::UNDEFINED_INDEX
            | codes::UNINITIALIZED_STRING_OFFSET
            | codes::UNDEFINED_PROPERTY
            | codes::NON_OBJECT_PROPERTY
    )
}

/// Parses decimal, `0x`, `0o`/leading-zero octal and `0b` literals, with
/// `_` separators. Literals too large for an int become floats.
pub(crate) fn parse_int_literal(raw: &str) -> Option<Value> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    match i64::from_str_radix(digits, radix) {
        Ok(n) => Some(Value::Int(n)),
        Err(_) => {
            let value = digits.chars().fold(0.0f64, |acc, c| {
                acc * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64
            });
            Some(Value::Float(value))
        }
    }
}

pub(crate) fn parse_float_literal(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mistyped_binding_surfaces_as_error() {
        let mut interp = Interpreter::new();
        let constant = interp.env.constant("PHP_INT_SIZE").unwrap();
        let store = interp.memory.heap().slot(constant).unwrap().store;
        interp.env.bind_variable(GLOBAL_SCOPE, "ghost", store).unwrap();

        assert!(matches!(
            interp.lookup_variable(GLOBAL_SCOPE, "ghost"),
            Err(RuntimeError::Internal { .. })
        ));
        assert_eq!(interp.global("ghost"), None);
        assert_eq!(interp.lookup_variable(GLOBAL_SCOPE, "missing"), Ok(None));
        assert_eq!(interp.lookup_constant("PHP_INT_SIZE"), Ok(Some(Value::Int(8))));
    }

    #[test]
    fn test_int_literals() {
        assert_eq!(parse_int_literal("42"), Some(Value::Int(42)));
        assert_eq!(parse_int_literal("0x1A"), Some(Value::Int(26)));
        assert_eq!(parse_int_literal("0b101"), Some(Value::Int(5)));
        assert_eq!(parse_int_literal("017"), Some(Value::Int(15)));
        assert_eq!(parse_int_literal("0o17"), Some(Value::Int(15)));
        assert_eq!(parse_int_literal("1_000_000"), Some(Value::Int(1_000_000)));
        assert_eq!(parse_int_literal("0"), Some(Value::Int(0)));
        assert_eq!(parse_int_literal("089"), None);
        assert_eq!(parse_int_literal("0x"), None);
    }

    #[test]
    fn test_int_literal_overflow_becomes_float() {
        assert_eq!(
            parse_int_literal("9223372036854775808"),
            Some(Value::Float(9223372036854775808.0))
        );
        assert_eq!(
            parse_int_literal("0xFFFFFFFFFFFFFFFF"),
            Some(Value::Float(18446744073709551615.0))
        );
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(parse_float_literal("1.5"), Some(1.5));
        assert_eq!(parse_float_literal("1e3"), Some(1000.0));
        assert_eq!(parse_float_literal("1_0.5"), Some(10.5));
        assert_eq!(parse_float_literal("x"), None);
    }
}
