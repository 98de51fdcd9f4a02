//! Memory model: variable slots, value stores and composite stores.
//!
//! A slot names a location and points at exactly one store. A store holds a
//! scalar or owns one composite, and counts the slots pointing at it. When
//! that count drops to zero the store is freed together with its composite,
//! which in turn releases every child slot.
//!
//! Writing a composite value always builds a fresh composite (copy
//! semantics). Reference assignment re-points a slot at another slot's store.

use std::rc::Rc;

use indexmap::IndexMap;
use php_ast::Visibility;
use smol_str::SmolStr;
use tracing::debug;

use crate::heap::{Address, Heap, Record};
use crate::model::{ClosureDef, Declaration};
use crate::value::{advance_cursor, ArrayKey, PhpArray, PhpObject, Value};
use crate::{Result, RuntimeError};

/// Flags attached to a slot. Only some are meaningful in a given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_global: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub visibility: Visibility,
    pub is_final: bool,
    pub is_abstract: bool,
}

impl Modifiers {
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSlot {
    pub name: ArrayKey,
    pub modifiers: Modifiers,
    pub store: Address,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreContent {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Composite(Address),
}

impl StoreContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreContent::Null => "null",
            StoreContent::Bool(_) => "bool",
            StoreContent::Int(_) => "int",
            StoreContent::Float(_) => "float",
            StoreContent::Str(_) => "string",
            StoreContent::Composite(_) => "composite",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueStore {
    pub content: StoreContent,
    /// Slots currently pointing at this store
    pub refcount: usize,
}

impl ValueStore {
    /// A store owned by a single slot.
    pub fn new(content: StoreContent) -> Self {
        Self { content, refcount: 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompositeMeta {
    Array { next_index: Option<i64> },
    Object { class: SmolStr },
    Closure(Rc<ClosureDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeStore {
    /// Keys map to child slots; object properties use string keys
    pub entries: IndexMap<ArrayKey, Address>,
    pub meta: CompositeMeta,
}

impl CompositeStore {
    fn new(meta: CompositeMeta) -> Self {
        Self {
            entries: IndexMap::new(),
            meta,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.meta, CompositeMeta::Array { .. })
    }

    pub fn class_name(&self) -> Option<&SmolStr> {
        match &self.meta {
            CompositeMeta::Object { class } => Some(class),
            CompositeMeta::Closure(_) => None,
            CompositeMeta::Array { .. } => None,
        }
    }
}

/// Composite kinds a fresh variable can be created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeKind {
    Array,
    Object(SmolStr),
}

impl CompositeKind {
    fn meta(self) -> CompositeMeta {
        match self {
            CompositeKind::Array => CompositeMeta::Array { next_index: Some(0) },
            CompositeKind::Object(class) => CompositeMeta::Object { class },
        }
    }
}

#[derive(Debug, Default)]
pub struct Memory {
    heap: Heap,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocates a slot plus its store, and an empty composite when `kind`
    /// is given.
    pub fn allocate_variable(
        &mut self,
        name: impl Into<ArrayKey>,
        kind: Option<CompositeKind>,
    ) -> Address {
        let content = match kind {
            Some(kind) => {
                StoreContent::Composite(self.heap.alloc(Record::Composite(CompositeStore::new(kind.meta()))))
            }
            None => StoreContent::Null,
        };
        self.allocate_slot(name.into(), Modifiers::default(), content)
    }

    /// Allocates a slot holding a deep copy of `value`.
    pub fn allocate_initialized(
        &mut self,
        name: impl Into<ArrayKey>,
        modifiers: Modifiers,
        value: &Value,
    ) -> Address {
        let content = self.materialize_content(value);
        self.allocate_slot(name.into(), modifiers, content)
    }

    fn allocate_slot(&mut self, name: ArrayKey, modifiers: Modifiers, content: StoreContent) -> Address {
        let store = self.heap.alloc(Record::Store(ValueStore::new(content)));
        self.heap.alloc(Record::Slot(VariableSlot {
            name,
            modifiers,
            store,
        }))
    }

    /// Turns a value into store content, copying composites into new heap
    /// records.
    fn materialize_content(&mut self, value: &Value) -> StoreContent {
        match value {
            Value::Null => StoreContent::Null,
            Value::Bool(b) => StoreContent::Bool(*b),
            Value::Int(n) => StoreContent::Int(*n),
            Value::Float(f) => StoreContent::Float(*f),
            Value::String(s) => StoreContent::Str(s.clone()),
            Value::Array(arr) => {
                let mut composite = CompositeStore::new(CompositeMeta::Array {
                    next_index: arr.next_index(),
                });
                for (key, element) in arr.iter() {
                    let child = self.allocate_initialized(key.clone(), Modifiers::default(), element);
                    composite.entries.insert(key.clone(), child);
                }
                StoreContent::Composite(self.heap.alloc(Record::Composite(composite)))
            }
            Value::Object(obj) => {
                let mut composite = CompositeStore::new(CompositeMeta::Object {
                    class: obj.class.clone(),
                });
                for (name, prop) in &obj.properties {
                    let key = ArrayKey::Str(name.clone());
                    let child = self.allocate_initialized(
                        key.clone(),
                        Modifiers::with_visibility(prop.visibility),
                        &prop.value,
                    );
                    composite.entries.insert(key, child);
                }
                StoreContent::Composite(self.heap.alloc(Record::Composite(composite)))
            }
            Value::Closure(def) => {
                let composite = CompositeStore::new(CompositeMeta::Closure(Rc::clone(def)));
                StoreContent::Composite(self.heap.alloc(Record::Composite(composite)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Read / write
    // ------------------------------------------------------------------

    /// Materializes the value behind `slot`. `Ok(None)` means the slot was
    /// never allocated (or has been released).
    pub fn read(&self, slot: Address) -> Result<Option<Value>> {
        if !self.heap.contains(slot) {
            return Ok(None);
        }
        self.load_slot(slot, &mut Vec::new()).map(Some)
    }

    /// Like [`Memory::read`] but treats a missing slot as an internal error.
    pub fn value_of(&self, slot: Address) -> Result<Value> {
        self.load_slot(slot, &mut Vec::new())
    }

    fn load_slot(&self, slot: Address, path: &mut Vec<Address>) -> Result<Value> {
        let store = self.heap.slot(slot)?.store;
        match &self.heap.store(store)?.content {
            StoreContent::Null => Ok(Value::Null),
            StoreContent::Bool(b) => Ok(Value::Bool(*b)),
            StoreContent::Int(n) => Ok(Value::Int(*n)),
            StoreContent::Float(f) => Ok(Value::Float(*f)),
            StoreContent::Str(s) => Ok(Value::String(s.clone())),
            StoreContent::Composite(addr) => self.load_composite(*addr, path),
        }
    }

    fn load_composite(&self, addr: Address, path: &mut Vec<Address>) -> Result<Value> {
        // A composite reachable from itself through references reads as null
        if path.contains(&addr) {
            return Ok(Value::Null);
        }
        path.push(addr);
        let composite = self.heap.composite(addr)?;
        let value = match &composite.meta {
            CompositeMeta::Array { next_index } => {
                let mut entries = IndexMap::with_capacity(composite.entries.len());
                for (key, child) in &composite.entries {
                    entries.insert(key.clone(), self.load_slot(*child, path)?);
                }
                Value::Array(PhpArray::from_parts(entries, *next_index))
            }
            CompositeMeta::Object { class } => {
                let mut obj = PhpObject::new(class.clone());
                for (key, child) in &composite.entries {
                    let visibility = self.heap.slot(*child)?.modifiers.visibility;
                    let value = self.load_slot(*child, path)?;
                    obj.set(SmolStr::new(key.to_string()), value, visibility);
                }
                Value::Object(obj)
            }
            CompositeMeta::Closure(def) => Value::Closure(Rc::clone(def)),
        };
        path.pop();
        Ok(value)
    }

    /// The assignment primitive: replaces the content of the store `slot`
    /// points at. Every alias of the slot observes the new value.
    pub fn write(&mut self, slot: Address, value: &Value) -> Result<()> {
        let store = self.heap.slot(slot)?.store;
        // Build the copy before dropping the old content; `value` may have
        // been read out of it
        let content = self.materialize_content(value);
        let old = std::mem::replace(&mut self.heap.store_mut(store)?.content, content);
        if let StoreContent::Composite(composite) = old {
            self.free_composite(composite)?;
        }
        Ok(())
    }

    /// Reference assignment: makes `target` share `source`'s store.
    pub fn bind_reference(&mut self, target: Address, source: Address) -> Result<()> {
        let shared = self.heap.slot(source)?.store;
        let previous = self.heap.slot(target)?.store;
        if previous == shared {
            return Ok(());
        }
        self.heap.store_mut(shared)?.refcount += 1;
        self.heap.slot_mut(target)?.store = shared;
        self.release_store(previous)
    }

    // ------------------------------------------------------------------
    // Reclamation
    // ------------------------------------------------------------------

    /// Drops a slot and its claim on its store.
    pub fn release_slot(&mut self, slot: Address) -> Result<()> {
        match self.heap.free(slot) {
            Some(Record::Slot(VariableSlot { store, .. })) => self.release_store(store),
            Some(other) => Err(RuntimeError::internal(format!(
                "released {} at {} as a slot",
                other.kind(),
                slot
            ))),
            None => Err(RuntimeError::internal(format!("slot {} released twice", slot))),
        }
    }

    fn release_store(&mut self, store: Address) -> Result<()> {
        let record = self.heap.store_mut(store)?;
        record.refcount = record.refcount.saturating_sub(1);
        if record.refcount > 0 {
            return Ok(());
        }
        if let Some(Record::Store(ValueStore {
            content: StoreContent::Composite(composite),
            ..
        })) = self.heap.free(store)
        {
            self.free_composite(composite)?;
        }
        Ok(())
    }

    fn free_composite(&mut self, composite: Address) -> Result<()> {
        match self.heap.free(composite) {
            Some(Record::Composite(CompositeStore { entries, .. })) => {
                debug!(%composite, children = entries.len(), "composite reclaimed");
                for child in entries.into_values() {
                    self.release_slot(child)?;
                }
                Ok(())
            }
            Some(other) => Err(RuntimeError::internal(format!(
                "freed {} at {} as a composite",
                other.kind(),
                composite
            ))),
            None => Err(RuntimeError::internal(format!(
                "composite {} freed twice",
                composite
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn slot(&self, slot: Address) -> Result<&VariableSlot> {
        self.heap.slot(slot)
    }

    pub fn store_of(&self, slot: Address) -> Result<Address> {
        Ok(self.heap.slot(slot)?.store)
    }

    pub fn content(&self, slot: Address) -> Result<&StoreContent> {
        let store = self.store_of(slot)?;
        Ok(&self.heap.store(store)?.content)
    }

    /// The composite owned by `slot`'s store, if any.
    pub fn composite_of(&self, slot: Address) -> Result<Option<Address>> {
        match self.content(slot)? {
            StoreContent::Composite(addr) => Ok(Some(*addr)),
            _ => Ok(None),
        }
    }

    pub fn composite(&self, addr: Address) -> Result<&CompositeStore> {
        self.heap.composite(addr)
    }

    pub fn store_refcount(&self, store: Address) -> Result<usize> {
        Ok(self.heap.store(store)?.refcount)
    }

    pub fn modifiers(&self, slot: Address) -> Result<Modifiers> {
        Ok(self.heap.slot(slot)?.modifiers)
    }

    pub fn set_modifiers(&mut self, slot: Address, modifiers: Modifiers) -> Result<()> {
        self.heap.slot_mut(slot)?.modifiers = modifiers;
        Ok(())
    }

    pub fn live_records(&self) -> usize {
        self.heap.len()
    }

    pub fn composite_count(&self) -> usize {
        self.heap
            .records()
            .filter(|(_, record)| matches!(record, Record::Composite(_)))
            .count()
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    /// Replaces `slot`'s content with an empty array and returns the new
    /// composite.
    pub fn promote_to_array(&mut self, slot: Address) -> Result<Address> {
        self.promote(slot, CompositeKind::Array)
    }

    /// Replaces `slot`'s content with an empty object of `class`.
    pub fn promote_to_object(&mut self, slot: Address, class: impl Into<SmolStr>) -> Result<Address> {
        self.promote(slot, CompositeKind::Object(class.into()))
    }

    fn promote(&mut self, slot: Address, kind: CompositeKind) -> Result<Address> {
        let store = self.store_of(slot)?;
        let composite = self.heap.alloc(Record::Composite(CompositeStore::new(kind.meta())));
        let old = std::mem::replace(
            &mut self.heap.store_mut(store)?.content,
            StoreContent::Composite(composite),
        );
        if let StoreContent::Composite(previous) = old {
            self.free_composite(previous)?;
        }
        Ok(composite)
    }

    pub fn element(&self, composite: Address, key: &ArrayKey) -> Result<Option<Address>> {
        Ok(self.heap.composite(composite)?.entries.get(key).copied())
    }

    /// Returns the child slot under `key`, allocating a null one if absent.
    pub fn element_or_insert(&mut self, composite: Address, key: ArrayKey) -> Result<Address> {
        if let Some(existing) = self.element(composite, &key)? {
            return Ok(existing);
        }
        let child = self.allocate_variable(key.clone(), None);
        let store = self.heap.composite_mut(composite)?;
        if let CompositeMeta::Array { next_index } = &mut store.meta {
            advance_cursor(next_index, &key);
        }
        store.entries.insert(key, child);
        Ok(child)
    }

    /// Adds a null element under the next auto-increment index. `None` when
    /// the index space is used up.
    pub fn append_element(&mut self, composite: Address) -> Result<Option<Address>> {
        let next = match &self.heap.composite(composite)?.meta {
            CompositeMeta::Array { next_index } => *next_index,
            _ => {
                return Err(RuntimeError::internal(format!(
                    "append to non-array composite {}",
                    composite
                )))
            }
        };
        let Some(next) = next else {
            return Ok(None);
        };
        self.element_or_insert(composite, ArrayKey::Int(next)).map(Some)
    }

    /// Removes and releases the element under `key`. Returns whether it
    /// existed.
    pub fn remove_element(&mut self, composite: Address, key: &ArrayKey) -> Result<bool> {
        match self.heap.composite_mut(composite)?.entries.shift_remove(key) {
            Some(child) => {
                self.release_slot(child)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn intern(&mut self, declaration: Declaration) -> Address {
        debug!(kind = declaration.kind(), name = %declaration.name(), "declaration interned");
        self.heap.alloc(Record::Declaration(declaration))
    }

    pub fn declaration(&self, addr: Address) -> Result<&Declaration> {
        self.heap.declaration(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list(values: &[i64]) -> Value {
        Value::Array(PhpArray::from_values(values.iter().map(|n| Value::Int(*n))))
    }

    #[test]
    fn test_allocate_variable() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        let b = memory.allocate_variable("b", Some(CompositeKind::Array));

        assert_eq!(memory.read(a).unwrap(), Some(Value::Null));
        assert_eq!(memory.read(b).unwrap(), Some(Value::Array(PhpArray::new())));
        assert_eq!(memory.store_refcount(memory.store_of(a).unwrap()).unwrap(), 1);
        // two slots, two stores, one composite
        assert_eq!(memory.live_records(), 5);
    }

    #[test]
    fn test_read_unknown_address_is_undefined() {
        let memory = Memory::new();
        assert_eq!(memory.read(Address(42)).unwrap(), None);
        assert!(memory.value_of(Address(42)).is_err());
    }

    #[test]
    fn test_write_copies_composites() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        let b = memory.allocate_variable("b", None);

        memory.write(a, &list(&[1, 2])).unwrap();
        let copy = memory.read(a).unwrap().unwrap();
        memory.write(b, &copy).unwrap();

        let b_composite = memory.composite_of(b).unwrap().unwrap();
        let first = memory.element(b_composite, &ArrayKey::Int(0)).unwrap().unwrap();
        memory.write(first, &Value::Int(99)).unwrap();

        assert_eq!(memory.read(a).unwrap(), Some(list(&[1, 2])));
        assert_eq!(memory.read(b).unwrap(), Some(list(&[99, 2])));
        assert_ne!(memory.composite_of(a).unwrap(), Some(b_composite));
    }

    #[test]
    fn test_overwriting_composite_frees_it() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        memory.write(a, &list(&[1, 2, 3])).unwrap();
        assert_eq!(memory.composite_count(), 1);
        assert_eq!(memory.live_records(), 2 + 1 + 3 * 2);

        memory.write(a, &Value::string("flat")).unwrap();
        assert_eq!(memory.composite_count(), 0);
        assert_eq!(memory.live_records(), 2);
    }

    #[test]
    fn test_reference_binding_shares_store() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        let b = memory.allocate_variable("b", None);
        memory.write(a, &Value::Int(1)).unwrap();

        memory.bind_reference(b, a).unwrap();
        memory.write(b, &Value::Int(2)).unwrap();

        assert_eq!(memory.read(a).unwrap(), Some(Value::Int(2)));
        let store = memory.store_of(a).unwrap();
        assert_eq!(memory.store_of(b).unwrap(), store);
        assert_eq!(memory.store_refcount(store).unwrap(), 2);

        // rebinding to the same store is a no-op
        memory.bind_reference(b, a).unwrap();
        assert_eq!(memory.store_refcount(store).unwrap(), 2);
    }

    #[test]
    fn test_composite_freed_only_by_last_alias() {
        let mut memory = Memory::new();
        let owner = memory.allocate_variable("a", None);
        memory.write(owner, &list(&[7])).unwrap();
        let composite = memory.composite_of(owner).unwrap().unwrap();

        let first = memory.allocate_variable("b", None);
        let second = memory.allocate_variable("c", None);
        memory.bind_reference(first, owner).unwrap();
        memory.bind_reference(second, owner).unwrap();
        let store = memory.store_of(owner).unwrap();
        assert_eq!(memory.store_refcount(store).unwrap(), 3);

        memory.release_slot(owner).unwrap();
        assert!(memory.composite(composite).is_ok());
        memory.release_slot(first).unwrap();
        assert!(memory.composite(composite).is_ok());
        assert_eq!(memory.store_refcount(store).unwrap(), 1);

        memory.release_slot(second).unwrap();
        assert!(memory.composite(composite).is_err());
        assert_eq!(memory.live_records(), 0);
    }

    #[test]
    fn test_aliased_write_replaces_composite_once() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        let b = memory.allocate_variable("b", None);
        memory.write(a, &list(&[1])).unwrap();
        memory.bind_reference(b, a).unwrap();

        memory.write(a, &Value::Int(5)).unwrap();
        assert_eq!(memory.composite_count(), 0);
        memory.write(b, &Value::Int(6)).unwrap();
        assert_eq!(memory.read(a).unwrap(), Some(Value::Int(6)));
    }

    #[test]
    fn test_element_survives_through_reference() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", Some(CompositeKind::Array));
        let composite = memory.composite_of(a).unwrap().unwrap();
        let element = memory.append_element(composite).unwrap().unwrap();
        memory.write(element, &Value::string("kept")).unwrap();

        let r = memory.allocate_variable("r", None);
        memory.bind_reference(r, element).unwrap();
        memory.write(a, &Value::Null).unwrap();

        assert_eq!(memory.read(r).unwrap(), Some(Value::string("kept")));
        assert_eq!(memory.store_refcount(memory.store_of(r).unwrap()).unwrap(), 1);
    }

    #[test]
    fn test_element_insert_advances_next_index() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", Some(CompositeKind::Array));
        let composite = memory.composite_of(a).unwrap().unwrap();

        memory.element_or_insert(composite, ArrayKey::Int(5)).unwrap();
        memory.element_or_insert(composite, ArrayKey::Int(-2)).unwrap();
        memory.append_element(composite).unwrap().unwrap();

        let keys: Vec<_> = memory.composite(composite).unwrap().entries.keys().cloned().collect();
        assert_eq!(keys, vec![ArrayKey::Int(5), ArrayKey::Int(-2), ArrayKey::Int(6)]);
    }

    #[test]
    fn test_append_after_largest_index_is_refused() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", Some(CompositeKind::Array));
        let composite = memory.composite_of(a).unwrap().unwrap();
        let top = memory.element_or_insert(composite, ArrayKey::Int(i64::MAX)).unwrap();
        memory.write(top, &Value::Int(1)).unwrap();

        assert_eq!(memory.append_element(composite).unwrap(), None);
        memory.element_or_insert(composite, ArrayKey::Int(3)).unwrap();
        assert_eq!(memory.append_element(composite).unwrap(), None);
        assert_eq!(memory.value_of(top).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_remove_element_releases_child() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", None);
        memory.write(a, &list(&[1, 2])).unwrap();
        let composite = memory.composite_of(a).unwrap().unwrap();
        let before = memory.live_records();

        assert!(memory.remove_element(composite, &ArrayKey::Int(0)).unwrap());
        assert!(!memory.remove_element(composite, &ArrayKey::Int(0)).unwrap());
        assert_eq!(memory.live_records(), before - 2);
        // removal leaves the cursor alone
        let next = memory.append_element(composite).unwrap().unwrap();
        assert_eq!(memory.slot(next).unwrap().name, ArrayKey::Int(2));
    }

    #[test]
    fn test_objects_keep_property_visibility() {
        let mut memory = Memory::new();
        let mut obj = PhpObject::new("User");
        obj.set("name", Value::string("ann"), Visibility::Public);
        obj.set("secret", Value::Int(1), Visibility::Private);

        let slot = memory.allocate_initialized("u", Modifiers::default(), &Value::Object(obj.clone()));
        assert_eq!(memory.read(slot).unwrap(), Some(Value::Object(obj)));
    }

    #[test]
    fn test_self_referencing_array_reads_without_looping() {
        let mut memory = Memory::new();
        let a = memory.allocate_variable("a", Some(CompositeKind::Array));
        let composite = memory.composite_of(a).unwrap().unwrap();
        let element = memory.append_element(composite).unwrap().unwrap();
        memory.bind_reference(element, a).unwrap();

        let mut expected = PhpArray::new();
        expected.push(Value::Null);
        assert_eq!(memory.read(a).unwrap(), Some(Value::Array(expected)));
    }
}
