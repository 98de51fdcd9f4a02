//! Variable references and the `global` statement.

use php_ast::{Ident, Span};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::environment::GLOBAL_SCOPE;
use crate::eval::Evaluator;
use crate::heap::Address;
use crate::stack::{Intent, StackNode};
use crate::value::Value;
use crate::Result;

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn variable(&mut self, name: &SmolStr, intent: Intent, span: Span) -> Result<()> {
        match intent {
            Intent::Value => {
                let value = self.read_variable(name)?;
                let value = match value {
                    Some(value) => value,
                    None => {
                        self.notice(
                            codes::UNDEFINED_VARIABLE,
                            format!("Undefined variable: {}", name),
                            span,
                        );
                        Value::Null
                    }
                };
                self.stack.push_value(value);
            }
            Intent::Address => {
                let slot = self.variable_slot(name)?;
                let location = self.locate(slot)?;
                self.stack.push(StackNode::Address(location));
            }
        }
        Ok(())
    }

    fn read_variable(&self, name: &str) -> Result<Option<Value>> {
        match self.lookup_slot(name)? {
            Some(slot) => self.interp.memory.read(slot),
            None => Ok(None),
        }
    }

    /// Finds the slot `name` refers to in the current scope, following
    /// global aliases.
    pub(crate) fn lookup_slot(&self, name: &str) -> Result<Option<Address>> {
        let env = &self.interp.env;
        let Some(slot) = env.lookup_variable(env.current_scope_index(), name) else {
            return Ok(None);
        };
        if self.interp.memory.modifiers(slot)?.is_global {
            if let Some(global) = env.lookup_variable(GLOBAL_SCOPE, name) {
                return Ok(Some(global));
            }
        }
        Ok(Some(slot))
    }

    /// Like [`Evaluator::lookup_slot`], creating a null variable in the
    /// current scope when the name is unbound.
    pub(crate) fn variable_slot(&mut self, name: &SmolStr) -> Result<Address> {
        if let Some(slot) = self.lookup_slot(name)? {
            return Ok(slot);
        }
        let scope = self.interp.env.current_scope_index();
        let slot = self.interp.memory.allocate_variable(name.clone(), None);
        self.interp.env.bind_variable(scope, name.clone(), slot)?;
        Ok(slot)
    }

    pub(crate) fn global_stmt(&mut self, names: &'p [Ident]) -> Result<()> {
        for name in names {
            let interp = &mut *self.interp;
            interp
                .env
                .declare_global_alias(&name.node, &mut interp.memory)
                .map_err(|err| err.at(name.span))?;
        }
        Ok(())
    }
}
