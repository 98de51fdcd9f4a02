//! Function, class, interface and trait declarations.
//!
//! Declarations are validated and flattened when the statement runs:
//! inherited, implemented and trait members are copied into the new
//! definition before its own members are applied on top.

use std::rc::Rc;

use indexmap::IndexMap;
use php_ast::{ClassDecl, ClassMember, FunctionDecl, Ident, InterfaceDecl, MethodDecl, PropertyDecl, TraitDecl, Visibility};
use smol_str::SmolStr;

use crate::eval::Evaluator;
use crate::handlers::objects::check_params;
use crate::model::{ClassDef, Declaration, FunctionDef, InterfaceDef, MethodDef, PropertyDef, TraitDef};
use crate::value::Value;
use crate::{Result, RuntimeError};

/// Abstract methods listed by name in the "must be declared abstract" error.
const ABSTRACT_METHODS_LISTED: usize = 3;

impl<'i, 'p> Evaluator<'i, 'p> {
    pub(crate) fn declare_function(&mut self, decl: &'p FunctionDecl) -> Result<()> {
        let name = &decl.name.node;
        if self.interp.env.lookup_function(name).is_some() {
            return Err(RuntimeError::Redeclared {
                message: format!("Cannot redeclare {}()", name),
                span: decl.name.span,
            });
        }
        check_params(&decl.params)?;

        let def = FunctionDef {
            name: name.clone(),
            params: decl.params.clone(),
            by_ref: decl.by_ref,
            body: decl.body.clone(),
        };
        let addr = self.interp.memory.intern(Declaration::Function(Rc::new(def)));
        self.interp.env.declare_function(name, addr);
        Ok(())
    }

    pub(crate) fn declare_class(&mut self, decl: &'p ClassDecl) -> Result<()> {
        let name = &decl.name.node;
        self.check_type_name(&decl.name, "class")?;

        let mut def = ClassDef::new(name.clone());
        def.is_abstract = decl.is_abstract;
        def.is_final = decl.is_final;

        if let Some(parent) = &decl.parent {
            let parent = self.parent_class(name, parent)?;
            def.parent = Some(parent.name.clone());
            def.interfaces = parent.interfaces.clone();
            def.constants = parent.constants.clone();
            def.properties = parent.properties.clone();
            def.methods = parent.methods.clone();
        }

        // constants that came from an interface may not be overridden
        let mut interface_constants: IndexMap<SmolStr, SmolStr> = IndexMap::new();
        for interface in &decl.interfaces {
            let interface = self.interface_def(name, interface)?;
            for implemented in std::iter::once(&interface.name).chain(&interface.parents) {
                if !def.interfaces.iter().any(|i| i.eq_ignore_ascii_case(implemented)) {
                    def.interfaces.push(implemented.clone());
                }
            }
            for (constant, value) in &interface.constants {
                def.constants.insert(constant.clone(), value.clone());
                interface_constants.insert(constant.clone(), interface.name.clone());
            }
            for (key, method) in &interface.methods {
                def.methods.entry(key.clone()).or_insert_with(|| method.clone());
            }
        }

        for member in &decl.members {
            if let ClassMember::TraitUse(traits) = member {
                for used in traits {
                    let used = self.trait_def(name, used)?;
                    merge_trait(&mut def.properties, &mut def.methods, &used);
                }
            }
        }

        let mut own = OwnMembers::default();
        for member in &decl.members {
            match member {
                ClassMember::Constant(constant) => {
                    let key = &constant.name.node;
                    if !own.constants.insert(key.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redefine class constant {}::{}", name, key),
                            span: constant.name.span,
                        });
                    }
                    if let Some(interface) = interface_constants.get(key) {
                        return Err(RuntimeError::Inheritance {
                            message: format!(
                                "Cannot inherit previously-inherited or override constant {} from interface {}",
                                key, interface
                            ),
                            span: constant.name.span,
                        });
                    }
                    let value = self.constant_value(&constant.value)?;
                    def.constants.insert(key.clone(), value);
                }
                ClassMember::Property(property) => {
                    if !own.properties.insert(property.name.node.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redeclare {}::${}", name, property.name.node),
                            span: property.name.span,
                        });
                    }
                    let prop = self.property_def(name, property)?;
                    def.properties.insert(prop.name.clone(), prop);
                }
                ClassMember::Method(method) => {
                    let key = method_key(&method.name.node);
                    if !own.methods.insert(key.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redeclare {}::{}()", name, method.name.node),
                            span: method.name.span,
                        });
                    }
                    let method = class_method(name, method)?;
                    if let Some(inherited) = def.methods.get(&key) {
                        if inherited.is_final {
                            return Err(RuntimeError::Inheritance {
                                message: format!("Cannot override final method {}::{}()", inherited.class, inherited.name),
                                span: decl.name.span,
                            });
                        }
                    }
                    def.methods.insert(key, method);
                }
                ClassMember::TraitUse(_) => {}
            }
        }

        if !def.is_abstract {
            check_concrete(&def, decl.name.span)?;
        }

        tracing::debug!(
            class = %def.name,
            parent = ?def.parent,
            methods = def.methods.len(),
            properties = def.properties.len(),
            "class declared"
        );
        let addr = self.interp.memory.intern(Declaration::Class(Rc::new(def)));
        self.interp.env.declare_class(name, addr);
        Ok(())
    }

    pub(crate) fn declare_interface(&mut self, decl: &'p InterfaceDecl) -> Result<()> {
        let name = &decl.name.node;
        self.check_type_name(&decl.name, "interface")?;

        let mut def = InterfaceDef {
            name: name.clone(),
            parents: Vec::new(),
            constants: IndexMap::new(),
            methods: IndexMap::new(),
        };
        for parent in &decl.extends {
            let parent = self.interface_def(name, parent)?;
            for ancestor in std::iter::once(&parent.name).chain(&parent.parents) {
                if !def.parents.iter().any(|p| p.eq_ignore_ascii_case(ancestor)) {
                    def.parents.push(ancestor.clone());
                }
            }
            def.constants.extend(parent.constants.iter().map(|(k, v)| (k.clone(), v.clone())));
            def.methods.extend(parent.methods.iter().map(|(k, m)| (k.clone(), m.clone())));
        }

        let mut own = OwnMembers::default();
        for member in &decl.members {
            match member {
                ClassMember::Constant(constant) => {
                    let key = &constant.name.node;
                    if !own.constants.insert(key.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redefine class constant {}::{}", name, key),
                            span: constant.name.span,
                        });
                    }
                    let value = self.constant_value(&constant.value)?;
                    def.constants.insert(key.clone(), value);
                }
                ClassMember::Property(property) => {
                    return Err(RuntimeError::Inheritance {
                        message: "Interfaces may not include variables".into(),
                        span: property.span,
                    })
                }
                ClassMember::Method(method) => {
                    let key = method_key(&method.name.node);
                    if !own.methods.insert(key.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redeclare {}::{}()", name, method.name.node),
                            span: method.name.span,
                        });
                    }
                    def.methods.insert(key, interface_method(name, method)?);
                }
                ClassMember::TraitUse(traits) => {
                    let used = traits.first().map(|t| t.node.clone()).unwrap_or_default();
                    return Err(RuntimeError::Inheritance {
                        message: format!("Cannot use traits inside of interfaces. {} is used in {}", used, name),
                        span: decl.name.span,
                    });
                }
            }
        }

        let addr = self.interp.memory.intern(Declaration::Interface(Rc::new(def)));
        self.interp.env.declare_interface(name, addr);
        Ok(())
    }

    pub(crate) fn declare_trait(&mut self, decl: &'p TraitDecl) -> Result<()> {
        let name = &decl.name.node;
        self.check_type_name(&decl.name, "trait")?;

        let mut def = TraitDef {
            name: name.clone(),
            properties: IndexMap::new(),
            methods: IndexMap::new(),
        };
        for member in &decl.members {
            if let ClassMember::TraitUse(traits) = member {
                for used in traits {
                    let used = self.trait_def(name, used)?;
                    merge_trait(&mut def.properties, &mut def.methods, &used);
                }
            }
        }

        let mut own = OwnMembers::default();
        for member in &decl.members {
            match member {
                ClassMember::Constant(constant) => {
                    return Err(RuntimeError::Inheritance {
                        message: "Traits cannot have constants".into(),
                        span: constant.name.span,
                    })
                }
                ClassMember::Property(property) => {
                    if !own.properties.insert(property.name.node.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redeclare {}::${}", name, property.name.node),
                            span: property.name.span,
                        });
                    }
                    let prop = self.property_def(name, property)?;
                    def.properties.insert(prop.name.clone(), prop);
                }
                ClassMember::Method(method) => {
                    let key = method_key(&method.name.node);
                    if !own.methods.insert(key.clone()) {
                        return Err(RuntimeError::Redeclared {
                            message: format!("Cannot redeclare {}::{}()", name, method.name.node),
                            span: method.name.span,
                        });
                    }
                    def.methods.insert(key, class_method(name, method)?);
                }
                ClassMember::TraitUse(_) => {}
            }
        }

        let addr = self.interp.memory.intern(Declaration::Trait(Rc::new(def)));
        self.interp.env.declare_trait(name, addr);
        Ok(())
    }

    fn check_type_name(&self, name: &Ident, kind: &str) -> Result<()> {
        if self.interp.env.type_name_taken(&name.node) {
            return Err(RuntimeError::Redeclared {
                message: format!(
                    "Cannot declare {} {}, because the name is already in use",
                    kind, name.node
                ),
                span: name.span,
            });
        }
        Ok(())
    }

    fn parent_class(&self, class: &SmolStr, parent: &Ident) -> Result<Rc<ClassDef>> {
        let env = &self.interp.env;
        let Some(addr) = env.lookup_class(&parent.node) else {
            let kind = if env.lookup_interface(&parent.node).is_some() {
                "interface"
            } else if env.lookup_trait(&parent.node).is_some() {
                "trait"
            } else {
                return Err(RuntimeError::ClassNotFound {
                    kind: "Class",
                    name: parent.node.clone(),
                    span: parent.span,
                });
            };
            return Err(RuntimeError::Inheritance {
                message: format!("Class {} cannot extend from {} {}", class, kind, parent.node),
                span: parent.span,
            });
        };
        let def = self.class_def(addr)?;
        if def.is_final {
            return Err(RuntimeError::Inheritance {
                message: format!("Class {} may not inherit from final class ({})", class, def.name),
                span: parent.span,
            });
        }
        Ok(def)
    }

    fn interface_def(&self, implementor: &SmolStr, interface: &Ident) -> Result<Rc<InterfaceDef>> {
        let env = &self.interp.env;
        let Some(addr) = env.lookup_interface(&interface.node) else {
            if env.type_name_taken(&interface.node) {
                return Err(RuntimeError::Inheritance {
                    message: format!("{} cannot implement {} - it is not an interface", implementor, interface.node),
                    span: interface.span,
                });
            }
            return Err(RuntimeError::ClassNotFound {
                kind: "Interface",
                name: interface.node.clone(),
                span: interface.span,
            });
        };
        match self.interp.memory.declaration(addr)? {
            Declaration::Interface(def) => Ok(Rc::clone(def)),
            other => Err(RuntimeError::internal(format!(
                "interface table points at a {}",
                other.kind()
            ))),
        }
    }

    fn trait_def(&self, user: &SmolStr, used: &Ident) -> Result<Rc<TraitDef>> {
        let env = &self.interp.env;
        let Some(addr) = env.lookup_trait(&used.node) else {
            if env.type_name_taken(&used.node) {
                return Err(RuntimeError::Inheritance {
                    message: format!("{} cannot use {} - it is not a trait", user, used.node),
                    span: used.span,
                });
            }
            return Err(RuntimeError::ClassNotFound {
                kind: "Trait",
                name: used.node.clone(),
                span: used.span,
            });
        };
        match self.interp.memory.declaration(addr)? {
            Declaration::Trait(def) => Ok(Rc::clone(def)),
            other => Err(RuntimeError::internal(format!(
                "trait table points at a {}",
                other.kind()
            ))),
        }
    }

    fn property_def(&mut self, class: &SmolStr, property: &'p PropertyDecl) -> Result<PropertyDef> {
        let default = match &property.default {
            Some(expr) => self.constant_value(expr)?,
            None => Value::Null,
        };
        Ok(PropertyDef {
            name: property.name.node.clone(),
            default,
            visibility: property.modifiers.visibility,
            is_static: property.modifiers.is_static,
            class: class.clone(),
        })
    }
}

/// Names declared directly in one class body.
#[derive(Default)]
struct OwnMembers {
    constants: rustc_hash::FxHashSet<SmolStr>,
    properties: rustc_hash::FxHashSet<SmolStr>,
    methods: rustc_hash::FxHashSet<SmolStr>,
}

fn method_key(name: &str) -> SmolStr {
    SmolStr::new(name.to_ascii_lowercase())
}

fn class_method(class: &SmolStr, method: &MethodDecl) -> Result<MethodDef> {
    check_params(&method.params)?;
    let modifiers = method.modifiers;
    match (&method.body, modifiers.is_abstract) {
        (Some(_), true) => Err(RuntimeError::Inheritance {
            message: format!("Abstract function {}::{}() cannot contain body", class, method.name.node),
            span: method.span,
        }),
        (None, false) => Err(RuntimeError::Inheritance {
            message: format!("Non-abstract method {}::{}() must contain body", class, method.name.node),
            span: method.span,
        }),
        _ => Ok(MethodDef {
            name: method.name.node.clone(),
            class: class.clone(),
            params: method.params.clone(),
            by_ref: method.by_ref,
            body: method.body.clone(),
            visibility: modifiers.visibility,
            is_static: modifiers.is_static,
            is_final: modifiers.is_final,
            is_abstract: modifiers.is_abstract,
        }),
    }
}

fn interface_method(interface: &SmolStr, method: &MethodDecl) -> Result<MethodDef> {
    check_params(&method.params)?;
    if method.body.is_some() {
        return Err(RuntimeError::Inheritance {
            message: format!("Interface function {}::{}() cannot contain body", interface, method.name.node),
            span: method.span,
        });
    }
    if method.modifiers.visibility != Visibility::Public {
        return Err(RuntimeError::Inheritance {
            message: format!(
                "Access type for interface method {}::{}() must be public",
                interface, method.name.node
            ),
            span: method.span,
        });
    }
    Ok(MethodDef {
        name: method.name.node.clone(),
        class: interface.clone(),
        params: method.params.clone(),
        by_ref: method.by_ref,
        body: None,
        visibility: Visibility::Public,
        is_static: method.modifiers.is_static,
        is_final: false,
        is_abstract: true,
    })
}

fn merge_trait(
    properties: &mut IndexMap<SmolStr, PropertyDef>,
    methods: &mut IndexMap<SmolStr, MethodDef>,
    used: &TraitDef,
) {
    properties.extend(used.properties.iter().map(|(k, p)| (k.clone(), p.clone())));
    methods.extend(used.methods.iter().map(|(k, m)| (k.clone(), m.clone())));
}

/// Fails when a concrete class still has abstract methods.
fn check_concrete(def: &ClassDef, span: php_ast::Span) -> Result<()> {
    let missing: Vec<&MethodDef> = def.abstract_methods().collect();
    if missing.is_empty() {
        return Ok(());
    }
    let mut listed: Vec<String> = missing
        .iter()
        .take(ABSTRACT_METHODS_LISTED)
        .map(|m| format!("{}::{}", m.class, m.name))
        .collect();
    if missing.len() > ABSTRACT_METHODS_LISTED {
        listed.push("...".into());
    }
    Err(RuntimeError::Inheritance {
        message: format!(
            "Class {} contains {} abstract method{} and must therefore be declared abstract or implement the remaining methods ({})",
            def.name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            listed.join(", ")
        ),
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use php_ast::build::*;
    use php_ast::MemberModifiers;
    use pretty_assertions::assert_eq;

    fn abstract_modifiers() -> MemberModifiers {
        MemberModifiers {
            is_abstract: true,
            ..MemberModifiers::default()
        }
    }

    #[test]
    fn test_abstract_method_with_body() {
        let decl = as_method(method("run", Some(vec![]), abstract_modifiers()));
        let err = class_method(&"A".into(), &decl).unwrap_err();
        assert_eq!(err.to_string(), "Abstract function A::run() cannot contain body");
    }

    #[test]
    fn test_concrete_method_without_body() {
        let decl = as_method(method("run", None, MemberModifiers::default()));
        let err = class_method(&"A".into(), &decl).unwrap_err();
        assert_eq!(err.to_string(), "Non-abstract method A::run() must contain body");
    }

    #[test]
    fn test_abstract_listing_is_capped() {
        let mut def = ClassDef::new("C");
        for name in ["a", "b", "c", "d"] {
            let decl = as_method(method(name, None, abstract_modifiers()));
            def.methods.insert(name.into(), class_method(&"C".into(), &decl).unwrap());
        }
        let err = check_concrete(&def, php_ast::Span::dummy()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Class C contains 4 abstract methods and must therefore be declared abstract \
             or implement the remaining methods (C::a, C::b, C::c, ...)"
        );
    }

    fn as_method(member: ClassMember) -> MethodDecl {
        match member {
            ClassMember::Method(decl) => decl,
            other => panic!("expected a method, got {:?}", other),
        }
    }
}
