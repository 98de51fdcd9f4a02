//! Declared-construct models.
//!
//! A declaration statement is validated into one of these records, then
//! interned into the heap as a `Declaration` and indexed by name.

use std::rc::Rc;

use indexmap::IndexMap;
use php_ast::{Block, ClosureUse, Param, Visibility};
use smol_str::SmolStr;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: SmolStr,
    pub params: Vec<Param>,
    pub by_ref: bool,
    pub body: Block,
}

/// Immutable closure definition, shared by every copy of the closure value.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureDef {
    pub params: Vec<Param>,
    pub uses: Vec<ClosureUse>,
    pub by_ref: bool,
    pub is_static: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: SmolStr,
    /// Class (or trait/interface) the method was declared in
    pub class: SmolStr,
    pub params: Vec<Param>,
    pub by_ref: bool,
    pub body: Option<Block>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: SmolStr,
    pub default: Value,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Declaring class
    pub class: SmolStr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: SmolStr,
    pub parent: Option<SmolStr>,
    /// Every interface implemented, directly or through the parent
    pub interfaces: Vec<SmolStr>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub constants: IndexMap<SmolStr, Value>,
    pub properties: IndexMap<SmolStr, PropertyDef>,
    /// Keyed by lower-cased method name
    pub methods: IndexMap<SmolStr, MethodDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            is_abstract: false,
            is_final: false,
            constants: IndexMap::new(),
            properties: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.get(name.to_ascii_lowercase().as_str())
    }

    pub fn has_constructor(&self) -> bool {
        self.methods.contains_key("__construct")
    }

    /// Abstract methods still lacking an implementation.
    pub fn abstract_methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.values().filter(|m| m.is_abstract)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    pub name: SmolStr,
    pub parents: Vec<SmolStr>,
    pub constants: IndexMap<SmolStr, Value>,
    pub methods: IndexMap<SmolStr, MethodDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDef {
    pub name: SmolStr,
    pub properties: IndexMap<SmolStr, PropertyDef>,
    pub methods: IndexMap<SmolStr, MethodDef>,
}

/// Heap record for an interned declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Interface(Rc<InterfaceDef>),
    Trait(Rc<TraitDef>),
}

impl Declaration {
    pub fn name(&self) -> &SmolStr {
        match self {
            Declaration::Function(f) => &f.name,
            Declaration::Class(c) => &c.name,
            Declaration::Interface(i) => &i.name,
            Declaration::Trait(t) => &t.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Declaration::Function(_) => "function",
            Declaration::Class(_) => "class",
            Declaration::Interface(_) => "interface",
            Declaration::Trait(_) => "trait",
        }
    }
}
