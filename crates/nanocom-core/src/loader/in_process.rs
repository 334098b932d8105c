//! In-process backend.
//!
//! Modules are registered as symbol tables built from functions already
//! linked into the host. Mapping only records a live image, which makes the
//! load/unload/lifecycle contract testable without building shared libraries
//! and lets a host ship built-in components next to native ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::{MappedImage, ModuleBackend};
use super::ModuleId;
use crate::error::{LoadError, Result};
use crate::symbols::{FnPtr, RawSymbol};

/// Exported symbols of an in-process module.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, RawSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `function` under `name`.
    pub fn with<F: FnPtr>(mut self, name: &str, function: F) -> Self {
        self.insert(name, function);
        self
    }

    pub fn insert<F: FnPtr>(&mut self, name: &str, function: F) {
        self.symbols.insert(name.to_string(), function.into_raw());
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.symbols.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<RawSymbol> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

struct Registration {
    table: Arc<SymbolTable>,
    live: Arc<AtomicUsize>,
}

/// Backend serving registered [`SymbolTable`]s.
#[derive(Default)]
pub struct InProcessBackend {
    modules: RwLock<HashMap<ModuleId, Registration>>,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, id: impl Into<ModuleId>, table: SymbolTable) -> Self {
        self.register(id, table);
        self
    }

    /// Register or replace a module. Images already mapped keep the old table.
    pub fn register(&self, id: impl Into<ModuleId>, table: SymbolTable) {
        let id = id.into();
        tracing::debug!(module = %id, symbols = table.len(), "in-process module registered");
        self.modules.write().insert(
            id,
            Registration {
                table: Arc::new(table),
                live: Arc::new(AtomicUsize::new(0)),
            },
        );
    }

    pub fn unregister(&self, id: &ModuleId) -> bool {
        self.modules.write().remove(id).is_some()
    }

    /// Number of images of `id` currently mapped.
    pub fn live_mappings(&self, id: &ModuleId) -> usize {
        self.modules
            .read()
            .get(id)
            .map(|r| r.live.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.modules.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ModuleBackend for InProcessBackend {
    fn map(&self, id: &ModuleId) -> Result<Box<dyn MappedImage>> {
        let modules = self.modules.read();
        let registration = modules.get(id).ok_or_else(|| LoadError::ModuleNotFound {
            module: id.to_string(),
            reason: "no in-process module registered under this id".to_string(),
        })?;
        registration.live.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(InProcessImage {
            location: format!("in-process:{}", id),
            table: Arc::clone(&registration.table),
            live: Arc::clone(&registration.live),
        }))
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

struct InProcessImage {
    location: String,
    table: Arc<SymbolTable>,
    live: Arc<AtomicUsize>,
}

impl MappedImage for InProcessImage {
    fn location(&self) -> &str {
        &self.location
    }

    fn symbol(&self, name: &str) -> std::result::Result<RawSymbol, String> {
        self.table
            .get(name)
            .ok_or_else(|| format!("undefined symbol: {}", name))
    }
}

impl Drop for InProcessImage {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
