//! Objects: property access, `new` and closure literals.

use std::rc::Rc;

use php_ast::{ClosureDecl, Expr, Param, Span, Visibility};
use php_diagnostics::codes;
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::heap::Address;
use crate::memory::{CompositeMeta, StoreContent};
use crate::model::{ClassDef, ClosureDef, Declaration};
use crate::value::{ArrayKey, PhpObject, Value};
use crate::{Result, RuntimeError};

pub(crate) const DEFAULT_CLASS: &str = "stdClass";

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn property_read(&mut self, object: &'p Expr, name: &SmolStr, span: Span) -> Result<()> {
        let base = self.eval_value(object)?;
        let value = match &base {
            Value::Object(obj) => match obj.get(name) {
                Some(prop) if prop.visibility != Visibility::Public => {
                    return Err(RuntimeError::PropertyAccess {
                        visibility: prop.visibility.as_str(),
                        class: obj.class.clone(),
                        name: name.clone(),
                        span,
                    })
                }
                Some(prop) => prop.value.clone(),
                None => {
                    self.undefined_property(&obj.class, name, span);
                    Value::Null
                }
            },
            Value::Closure(_) => {
                self.undefined_property("Closure", name, span);
                Value::Null
            }
            _ => {
                self.notice(
                    codes::NON_OBJECT_PROPERTY,
                    format!("Trying to get property '{}' of non-object", name),
                    span,
                );
                Value::Null
            }
        };
        self.stack.push_value(value);
        Ok(())
    }

    fn undefined_property(&mut self, class: &str, name: &str, span: Span) {
        self.notice(
            codes::UNDEFINED_PROPERTY,
            format!("Undefined property: {}::${}", class, name),
            span,
        );
    }

    pub(crate) fn property_write(&mut self, object: &'p Expr, name: &SmolStr, span: Span) -> Result<()> {
        let Some(base) = self.eval_address(object)? else {
            self.push_location(None);
            return Ok(());
        };
        if base.is_string_offset() {
            return Err(RuntimeError::StringOffset {
                message: "Cannot use string offset as an object",
                span,
            });
        }

        let composite = match self.interp.memory.content(base.slot)?.clone() {
            StoreContent::Null | StoreContent::Bool(false) => self.default_object(base.slot, span)?,
            StoreContent::Str(text) if text.is_empty() => self.default_object(base.slot, span)?,
            StoreContent::Composite(composite) => {
                let meta = &self.interp.memory.composite(composite)?.meta;
                if matches!(meta, CompositeMeta::Object { .. }) {
                    Some(composite)
                } else {
                    self.not_an_object(name, span)
                }
            }
            _ => self.not_an_object(name, span),
        };
        let Some(composite) = composite else {
            self.push_location(None);
            return Ok(());
        };

        let key = ArrayKey::Str(name.clone());
        let slot = match self.interp.memory.element(composite, &key)? {
            Some(slot) => {
                self.check_property_visibility(composite, slot, name, span)?;
                slot
            }
            // dynamic properties are public
            None => self.interp.memory.element_or_insert(composite, key)?,
        };
        let location = self.locate(slot)?;
        self.push_location(Some(location));
        Ok(())
    }

    fn default_object(&mut self, slot: Address, span: Span) -> Result<Option<Address>> {
        self.warning(
            codes::DEFAULT_OBJECT,
            "Creating default object from empty value".into(),
            span,
        );
        self.interp.memory.promote_to_object(slot, DEFAULT_CLASS).map(Some)
    }

    fn not_an_object(&mut self, name: &str, span: Span) -> Option<Address> {
        self.warning(
            codes::NON_OBJECT_ASSIGN,
            format!("Attempt to assign property '{}' of non-object", name),
            span,
        );
        None
    }

    pub(crate) fn check_property_visibility(
        &self,
        composite: Address,
        slot: Address,
        name: &SmolStr,
        span: Span,
    ) -> Result<()> {
        let visibility = self.interp.memory.modifiers(slot)?.visibility;
        if visibility == Visibility::Public {
            return Ok(());
        }
        let class = self
            .interp
            .memory
            .composite(composite)?
            .class_name()
            .cloned()
            .unwrap_or_default();
        Err(RuntimeError::PropertyAccess {
            visibility: visibility.as_str(),
            class,
            name: name.clone(),
            span,
        })
    }

    pub(crate) fn new_object(&mut self, class: &SmolStr, span: Span) -> Result<()> {
        let def = self.instantiable_class(class, span)?;
        if def.has_constructor() {
            return Err(RuntimeError::Unsupported {
                feature: format!("Calling constructor {}::__construct()", def.name),
                span,
            });
        }

        let mut obj = PhpObject::new(def.name.clone());
        for prop in def.properties.values().filter(|p| !p.is_static) {
            obj.set(prop.name.clone(), prop.default.clone(), prop.visibility);
        }
        self.stack.push_value(Value::Object(obj));
        Ok(())
    }

    fn instantiable_class(&self, name: &SmolStr, span: Span) -> Result<Rc<ClassDef>> {
        let env = &self.interp.env;
        let Some(addr) = env.lookup_class(name) else {
            let kind = if env.lookup_interface(name).is_some() {
                "interface"
            } else if env.lookup_trait(name).is_some() {
                "trait"
            } else {
                return Err(RuntimeError::ClassNotFound {
                    kind: "Class",
                    name: name.clone(),
                    span,
                });
            };
            return Err(RuntimeError::CannotInstantiate {
                kind,
                name: name.clone(),
                span,
            });
        };
        let def = self.class_def(addr)?;
        if def.is_abstract {
            return Err(RuntimeError::CannotInstantiate {
                kind: "abstract class",
                name: def.name.clone(),
                span,
            });
        }
        Ok(def)
    }

    pub(crate) fn class_def(&self, addr: Address) -> Result<Rc<ClassDef>> {
        match self.interp.memory.declaration(addr)? {
            Declaration::Class(def) => Ok(Rc::clone(def)),
            other => Err(RuntimeError::internal(format!(
                "class table points at a {}",
                other.kind()
            ))),
        }
    }

    pub(crate) fn closure(&mut self, decl: &ClosureDecl, span: Span) -> Result<()> {
        check_params(&decl.params)?;
        for captured in &decl.uses {
            let name = &captured.name.node;
            if name == "this" {
                return Err(RuntimeError::LexicalVariable {
                    message: "Cannot use $this as lexical variable".into(),
                    span: captured.name.span,
                });
            }
            if decl.params.iter().any(|p| &p.name.node == name) {
                return Err(RuntimeError::LexicalVariable {
                    message: format!("Cannot use lexical variable ${} as a parameter name", name),
                    span: captured.name.span,
                });
            }
        }
        let def = ClosureDef {
            params: decl.params.clone(),
            uses: decl.uses.clone(),
            by_ref: decl.by_ref,
            is_static: decl.is_static,
            body: decl.body.clone(),
        };
        tracing::debug!(params = def.params.len(), uses = def.uses.len(), ?span, "closure created");
        self.stack.push_value(Value::Closure(Rc::new(def)));
        Ok(())
    }
}

/// Rejects a parameter list naming the same variable twice.
pub(crate) fn check_params(params: &[Param]) -> Result<()> {
    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|p| p.name.node == param.name.node) {
            return Err(RuntimeError::Redeclared {
                message: format!("Redefinition of parameter ${}", param.name.node),
                span: param.span,
            });
        }
    }
    Ok(())
}
