//! `if` and `switch`.

use php_ast::{Block, Expr, SwitchCase};

use crate::eval::{Evaluator, Flow};
use crate::ops::loose_equals;
use crate::stack::Indicator;
use crate::Result;

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn if_stmt(
        &mut self,
        condition: &'p Expr,
        then_branch: &'p Block,
        elseif_branches: &'p [(Expr, Block)],
        else_branch: Option<&'p Block>,
    ) -> Result<Flow> {
        if self.eval_value(condition)?.to_bool() {
            return self.exec_block(&then_branch.stmts);
        }
        for (condition, branch) in elseif_branches {
            if self.eval_value(condition)?.to_bool() {
                return self.exec_block(&branch.stmts);
            }
        }
        match else_branch {
            Some(branch) => self.exec_block(&branch.stmts),
            None => Ok(Flow::Normal),
        }
    }

    /// Runs a `switch`. Matching uses loose comparison in case order, falling
    /// back to `default` wherever it appears; execution then falls through
    /// every following case body until a `break`.
    pub(crate) fn switch(&mut self, subject: &'p Expr, cases: &'p [SwitchCase]) -> Result<()> {
        let subject = self.eval_value(subject)?;

        let mut start = None;
        for (position, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            let test = self.eval_value(test)?;
            if loose_equals(&subject, &test) {
                start = Some(position);
                break;
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|case| case.test.is_none())) else {
            return Ok(());
        };
        tracing::trace!(case = start, cases = cases.len(), "switch matched");

        self.stack.push_indicator(Indicator::EndOfSwitch);
        for case in cases[start..].iter().rev() {
            for stmt in case.body.iter().rev() {
                self.push_stmt(stmt);
            }
        }
        // `break` ends the switch and goes no further
        self.run_until(Indicator::EndOfSwitch)?;
        Ok(())
    }
}
