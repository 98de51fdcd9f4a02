//! Scopes and symbol tables.
//!
//! Scope 0 is the global scope and lives for the whole run. Every other
//! scope belongs to one activation and is discarded when it ends.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::heap::Address;
use crate::memory::{Memory, Modifiers};
use crate::value::Value;
use crate::{Result, RuntimeError};

pub const GLOBAL_SCOPE: usize = 0;

/// Name to address maps, one per symbol kind.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub variables: IndexMap<SmolStr, Address>,
    pub constants: IndexMap<SmolStr, Address>,
    /// Keyed by lower-cased name
    pub functions: FxHashMap<SmolStr, Address>,
    pub classes: FxHashMap<SmolStr, Address>,
    pub interfaces: FxHashMap<SmolStr, Address>,
    pub traits: FxHashMap<SmolStr, Address>,
}

#[derive(Debug)]
pub struct Scope {
    pub name: SmolStr,
    pub symbols: SymbolTable,
}

impl Scope {
    fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            symbols: SymbolTable::default(),
        }
    }
}

#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
    current: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn folded(name: &str) -> SmolStr {
    SmolStr::new(name.to_ascii_lowercase())
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new("global")],
            current: GLOBAL_SCOPE,
        }
    }

    pub fn current_scope_index(&self) -> usize {
        self.current
    }

    pub fn is_global(&self) -> bool {
        self.current == GLOBAL_SCOPE
    }

    pub fn scope(&self, index: usize) -> Option<&Scope> {
        self.scopes.get(index)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Opens a new activation scope and makes it current.
    pub fn push_scope(&mut self, name: impl Into<SmolStr>) -> usize {
        self.scopes.push(Scope::new(name));
        self.current = self.scopes.len() - 1;
        self.current
    }

    /// Discards the current scope, releasing its slots except those that
    /// belong to the global scope.
    pub fn pop_scope(&mut self, memory: &mut Memory) -> Result<()> {
        if self.current == GLOBAL_SCOPE {
            return Err(RuntimeError::internal("cannot pop the global scope"));
        }
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| RuntimeError::internal("scope stack is empty"))?;
        for (_, slot) in scope.symbols.variables {
            if !memory.modifiers(slot)?.is_global {
                memory.release_slot(slot)?;
            }
        }
        self.current = self.scopes.len() - 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub fn lookup_variable(&self, scope: usize, name: &str) -> Option<Address> {
        self.scopes.get(scope)?.symbols.variables.get(name).copied()
    }

    /// Binds `name` in `scope`, returning the address it replaced.
    pub fn bind_variable(&mut self, scope: usize, name: impl Into<SmolStr>, slot: Address) -> Result<Option<Address>> {
        let scope = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| RuntimeError::internal(format!("no scope {}", scope)))?;
        Ok(scope.symbols.variables.insert(name.into(), slot))
    }

    pub fn unbind_variable(&mut self, scope: usize, name: &str) -> Option<Address> {
        self.scopes
            .get_mut(scope)?
            .symbols
            .variables
            .shift_remove(name)
    }

    pub fn variables(&self, scope: usize) -> impl Iterator<Item = (&SmolStr, &Address)> {
        self.scopes
            .get(scope)
            .into_iter()
            .flat_map(|s| s.symbols.variables.iter())
    }

    /// The `global $name` statement: makes `name` in the current scope refer
    /// to the global scope's slot, creating that slot as null if needed.
    pub fn declare_global_alias(&mut self, name: &str, memory: &mut Memory) -> Result<Address> {
        let global = match self.lookup_variable(GLOBAL_SCOPE, name) {
            Some(slot) => slot,
            None => {
                let slot = memory.allocate_variable(name, None);
                self.bind_variable(GLOBAL_SCOPE, name, slot)?;
                slot
            }
        };
        if self.is_global() {
            return Ok(global);
        }

        let modifiers = Modifiers {
            is_global: true,
            ..memory.modifiers(global)?
        };
        memory.set_modifiers(global, modifiers)?;

        if let Some(previous) = self.bind_variable(self.current, name, global)? {
            if previous != global && !memory.modifiers(previous)?.is_global {
                memory.release_slot(previous)?;
            }
        }
        Ok(global)
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    /// Declares a global constant. Returns false, leaving the existing
    /// value in place, if the name is taken.
    pub fn declare_constant(&mut self, name: &str, value: &Value, memory: &mut Memory) -> bool {
        let constants = &mut self.scopes[GLOBAL_SCOPE].symbols.constants;
        if constants.contains_key(name) {
            return false;
        }
        let modifiers = Modifiers {
            is_const: true,
            ..Modifiers::default()
        };
        let slot = memory.allocate_initialized(name, modifiers, value);
        constants.insert(SmolStr::new(name), slot);
        true
    }

    pub fn constant(&self, name: &str) -> Option<Address> {
        self.scopes[GLOBAL_SCOPE].symbols.constants.get(name).copied()
    }

    // ------------------------------------------------------------------
    // Declarations (case-insensitive, always global)
    // ------------------------------------------------------------------

    fn globals_mut(&mut self) -> &mut SymbolTable {
        &mut self.scopes[GLOBAL_SCOPE].symbols
    }

    fn globals(&self) -> &SymbolTable {
        &self.scopes[GLOBAL_SCOPE].symbols
    }

    pub fn declare_function(&mut self, name: &str, addr: Address) {
        self.globals_mut().functions.insert(folded(name), addr);
    }

    pub fn lookup_function(&self, name: &str) -> Option<Address> {
        self.globals().functions.get(&folded(name)).copied()
    }

    pub fn declare_class(&mut self, name: &str, addr: Address) {
        self.globals_mut().classes.insert(folded(name), addr);
    }

    pub fn lookup_class(&self, name: &str) -> Option<Address> {
        self.globals().classes.get(&folded(name)).copied()
    }

    pub fn declare_interface(&mut self, name: &str, addr: Address) {
        self.globals_mut().interfaces.insert(folded(name), addr);
    }

    pub fn lookup_interface(&self, name: &str) -> Option<Address> {
        self.globals().interfaces.get(&folded(name)).copied()
    }

    pub fn declare_trait(&mut self, name: &str, addr: Address) {
        self.globals_mut().traits.insert(folded(name), addr);
    }

    pub fn lookup_trait(&self, name: &str) -> Option<Address> {
        self.globals().traits.get(&folded(name)).copied()
    }

    /// Classes, interfaces and traits share one name space.
    pub fn type_name_taken(&self, name: &str) -> bool {
        let key = folded(name);
        let globals = self.globals();
        globals.classes.contains_key(&key)
            || globals.interfaces.contains_key(&key)
            || globals.traits.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_global_scope_always_present() {
        let mut env = Environment::new();
        let mut memory = Memory::new();
        assert_eq!(env.current_scope_index(), GLOBAL_SCOPE);
        assert!(env.pop_scope(&mut memory).is_err());
    }

    #[test]
    fn test_global_alias_from_nested_scope() {
        let mut env = Environment::new();
        let mut memory = Memory::new();
        env.push_scope("f");

        let slot = env.declare_global_alias("x", &mut memory).unwrap();
        memory.write(slot, &Value::Int(5)).unwrap();

        assert_eq!(env.lookup_variable(1, "x"), Some(slot));
        let global = env.lookup_variable(GLOBAL_SCOPE, "x").unwrap();
        assert_eq!(memory.read(global).unwrap(), Some(Value::Int(5)));

        env.pop_scope(&mut memory).unwrap();
        assert_eq!(memory.read(global).unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn test_global_alias_replaces_local_binding() {
        let mut env = Environment::new();
        let mut memory = Memory::new();
        let existing = memory.allocate_variable("x", None);
        memory.write(existing, &Value::Int(1)).unwrap();
        env.bind_variable(GLOBAL_SCOPE, "x", existing).unwrap();

        env.push_scope("f");
        let local = memory.allocate_variable("x", None);
        env.bind_variable(1, "x", local).unwrap();
        let records = memory.live_records();

        let alias = env.declare_global_alias("x", &mut memory).unwrap();
        assert_eq!(alias, existing);
        // the shadowed local slot and its store are gone
        assert_eq!(memory.live_records(), records - 2);
    }

    #[test]
    fn test_pop_scope_releases_locals() {
        let mut env = Environment::new();
        let mut memory = Memory::new();
        env.push_scope("f");
        let local = memory.allocate_variable("tmp", None);
        env.bind_variable(1, "tmp", local).unwrap();

        env.pop_scope(&mut memory).unwrap();
        assert_eq!(memory.live_records(), 0);
        assert_eq!(env.current_scope_index(), GLOBAL_SCOPE);
    }

    #[test]
    fn test_constants_keep_first_value() {
        let mut env = Environment::new();
        let mut memory = Memory::new();
        assert!(env.declare_constant("A", &Value::Int(1), &mut memory));
        assert!(!env.declare_constant("A", &Value::Int(2), &mut memory));

        let slot = env.constant("A").unwrap();
        assert_eq!(memory.read(slot).unwrap(), Some(Value::Int(1)));
        assert!(memory.modifiers(slot).unwrap().is_const);
        // constant names are case-sensitive
        assert_eq!(env.constant("a"), None);
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        let mut env = Environment::new();
        env.declare_class("Foo", Address(7));
        assert_eq!(env.lookup_class("FOO"), Some(Address(7)));
        assert!(env.type_name_taken("foo"));
        assert!(!env.type_name_taken("bar"));
    }
}
