//! Flat address space of memory records.
//!
//! Addresses are handed out in increasing order and never reused. Freeing an
//! address drops its record; later lookups of it fail with an internal error.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::memory::{CompositeStore, ValueStore, VariableSlot};
use crate::model::Declaration;
use crate::{Result, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub usize);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Slot(VariableSlot),
    Store(ValueStore),
    Composite(CompositeStore),
    Declaration(Declaration),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Slot(_) => "slot",
            Record::Store(_) => "store",
            Record::Composite(_) => "composite",
            Record::Declaration(_) => "declaration",
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    ram: FxHashMap<Address, Record>,
    next: usize,
}

macro_rules! accessor {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, addr: Address) -> Result<&$ty> {
            match self.ram.get(&addr) {
                Some(Record::$variant(inner)) => Ok(inner),
                Some(other) => Err(mismatch(addr, stringify!($variant), other)),
                None => Err(dangling(addr)),
            }
        }

        pub fn $get_mut(&mut self, addr: Address) -> Result<&mut $ty> {
            match self.ram.get_mut(&addr) {
                Some(Record::$variant(inner)) => Ok(inner),
                Some(other) => Err(mismatch(addr, stringify!($variant), other)),
                None => Err(dangling(addr)),
            }
        }
    };
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, record: Record) -> Address {
        let addr = Address(self.next);
        self.next += 1;
        debug!(%addr, kind = record.kind(), "alloc");
        self.ram.insert(addr, record);
        addr
    }

    pub fn free(&mut self, addr: Address) -> Option<Record> {
        let record = self.ram.remove(&addr);
        if let Some(record) = &record {
            debug!(%addr, kind = record.kind(), "free");
        }
        record
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.ram.contains_key(&addr)
    }

    pub fn get(&self, addr: Address) -> Option<&Record> {
        self.ram.get(&addr)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.ram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ram.is_empty()
    }

    /// Addresses issued so far, including freed ones.
    pub fn issued(&self) -> usize {
        self.next
    }

    pub fn records(&self) -> impl Iterator<Item = (&Address, &Record)> {
        self.ram.iter()
    }

    accessor!(slot, slot_mut, Slot, VariableSlot);
    accessor!(store, store_mut, Store, ValueStore);
    accessor!(composite, composite_mut, Composite, CompositeStore);

    pub fn declaration(&self, addr: Address) -> Result<&Declaration> {
        match self.ram.get(&addr) {
            Some(Record::Declaration(decl)) => Ok(decl),
            Some(other) => Err(mismatch(addr, "Declaration", other)),
            None => Err(dangling(addr)),
        }
    }
}

fn mismatch(addr: Address, expected: &str, found: &Record) -> RuntimeError {
    RuntimeError::internal(format!(
        "expected {} at {}, found {}",
        expected.to_ascii_lowercase(),
        addr,
        found.kind()
    ))
}

fn dangling(addr: Address) -> RuntimeError {
    RuntimeError::internal(format!("no record at {}", addr))
}
