//! `unset`.

use php_ast::{Expr, ExprKind};
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::heap::Address;
use crate::memory::{CompositeMeta, StoreContent};
use crate::value::ArrayKey;
use crate::{Result, RuntimeError};

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn unset(&mut self, targets: &'p [Expr]) -> Result<()> {
        for target in targets {
            self.unset_target(target)?;
        }
        Ok(())
    }

    fn unset_target(&mut self, target: &'p Expr) -> Result<()> {
        let span = target.span;
        match &target.kind {
            ExprKind::Paren(inner) => self.unset_target(inner),
            ExprKind::Variable(name) => {
                let interp = &mut *self.interp;
                let scope = interp.env.current_scope_index();
                let Some(slot) = interp.env.unbind_variable(scope, name) else {
                    return Ok(());
                };
                // an alias from `global` only drops the local name
                if interp.env.is_global() || !interp.memory.modifiers(slot)?.is_global {
                    interp.memory.release_slot(slot)?;
                }
                Ok(())
            }
            ExprKind::Offset { container, offset } => {
                let Some(offset) = offset else {
                    return Err(RuntimeError::EmptyOffset {
                        context: "unsetting",
                        span,
                    });
                };
                let key = self.eval_value(offset)?;
                let Some(base) = self.resolve_existing(container)? else {
                    return Ok(());
                };
                match self.interp.memory.content(base)?.clone() {
                    StoreContent::Str(_) => Err(RuntimeError::StringOffset {
                        message: "Cannot unset string offsets",
                        span,
                    }),
                    StoreContent::Composite(composite) => match self.interp.memory.composite(composite)?.meta.clone() {
                        CompositeMeta::Array { .. } => {
                            if let Some(key) = self.cast_key(&key, offset.span, false)? {
                                self.interp.memory.remove_element(composite, &key)?;
                            }
                            Ok(())
                        }
                        CompositeMeta::Object { class } => Err(RuntimeError::ObjectAsArray { class, span }),
                        CompositeMeta::Closure(_) => Err(RuntimeError::ObjectAsArray {
                            class: SmolStr::new_inline("Closure"),
                            span,
                        }),
                    },
                    // unsetting inside a scalar does nothing
                    _ => Ok(()),
                }
            }
            ExprKind::Property { object, name } => {
                let Some(base) = self.resolve_existing(object)? else {
                    return Ok(());
                };
                let Some(composite) = self.object_composite(base)? else {
                    return Ok(());
                };
                let key = ArrayKey::Str(name.node.clone());
                if let Some(slot) = self.interp.memory.element(composite, &key)? {
                    self.check_property_visibility(composite, slot, &name.node, span)?;
                    self.interp.memory.remove_element(composite, &key)?;
                }
                Ok(())
            }
            _ => Err(RuntimeError::NotWritable { span }),
        }
    }

    /// Resolves an unset target's container without creating anything.
    /// `None` when some part of the path doesn't exist.
    fn resolve_existing(&mut self, expr: &'p Expr) -> Result<Option<Address>> {
        match &expr.kind {
            ExprKind::Paren(inner) => self.resolve_existing(inner),
            ExprKind::Variable(name) => self.lookup_slot(name),
            ExprKind::Offset {
                container,
                offset: Some(offset),
            } => {
                let key = self.eval_value(offset)?;
                let Some(base) = self.resolve_existing(container)? else {
                    return Ok(None);
                };
                let Some(composite) = self.interp.memory.composite_of(base)? else {
                    return Ok(None);
                };
                if !self.interp.memory.composite(composite)?.is_array() {
                    return Ok(None);
                }
                match self.cast_key(&key, offset.span, false)? {
                    Some(key) => self.interp.memory.element(composite, &key),
                    None => Ok(None),
                }
            }
            ExprKind::Property { object, name } => {
                let Some(base) = self.resolve_existing(object)? else {
                    return Ok(None);
                };
                match self.object_composite(base)? {
                    Some(composite) => self
                        .interp
                        .memory
                        .element(composite, &ArrayKey::Str(name.node.clone())),
                    None => Ok(None),
                }
            }
            ExprKind::Offset { offset: None, .. } => Err(RuntimeError::EmptyOffset {
                context: "reading",
                span: expr.span,
            }),
            _ => Err(RuntimeError::NotWritable { span: expr.span }),
        }
    }

    fn object_composite(&self, slot: Address) -> Result<Option<Address>> {
        let memory = &self.interp.memory;
        match memory.composite_of(slot)? {
            Some(composite) if memory.composite(composite)?.class_name().is_some() => Ok(Some(composite)),
            _ => Ok(None),
        }
    }
}
