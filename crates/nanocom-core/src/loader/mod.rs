//! Host-side module loader.
//!
//! The [`Loader`] maps modules through a [`ModuleBackend`], keeps one
//! lifecycle counter per module id for the mappings it owns and hands out
//! [`LoadedModule`] handles that unmap on drop.
//!
//! ```ignore
//! use nanocom_core::{Loader, LoaderConfig};
//!
//! let loader = Loader::new(LoaderConfig::from_env());
//! let version = loader.version("nanocom_component_a")?;
//! println!("{}", version);
//! ```

mod backend;
mod in_process;
mod module;
mod native;

pub use backend::{MappedImage, ModuleBackend};
pub use in_process::{InProcessBackend, SymbolTable};
pub use module::{LoadedModule, Symbol};
pub use native::{is_native_module, NativeBackend};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::symbols::FnPtr;
use crate::version::VersionDescriptor;
use module::ModuleInstance;

/// Identifier of a module: a bare name resolved against the search paths,
/// or a path to the library file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id contains a directory separator.
    pub fn is_path(&self) -> bool {
        self.0.contains('/') || (cfg!(windows) && self.0.contains('\\'))
    }

    /// True when the id already carries a native library extension.
    pub fn has_library_extension(&self) -> bool {
        is_native_module(Path::new(&self.0))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ModuleId> for ModuleId {
    fn from(id: &ModuleId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Loader events, delivered to the callback set with
/// [`Loader::set_event_callback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// A mapping was created. `mappings` counts live mappings of the id.
    Mapped {
        module: ModuleId,
        location: String,
        mappings: usize,
    },
    MapFailed {
        module: ModuleId,
        error: String,
    },
    SymbolMissing {
        module: ModuleId,
        symbol: String,
    },
    /// A mapping was released. At zero the image is gone.
    Unmapped { module: ModuleId, mappings: usize },
}

type EventCallback = Arc<dyn Fn(&LoaderEvent) + Send + Sync>;

pub(crate) struct LoaderInner {
    backend: Box<dyn ModuleBackend>,
    instances: Mutex<HashMap<ModuleId, Arc<ModuleInstance>>>,
    event_callback: RwLock<Option<EventCallback>>,
}

impl LoaderInner {
    pub(crate) fn emit(&self, event: &LoaderEvent) {
        // Clone out so the callback runs without any loader lock held.
        let callback = self.event_callback.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    /// On-unload hook, then unmap.
    pub(crate) fn release(&self, instance: &Arc<ModuleInstance>, image: Box<dyn MappedImage>) {
        let id = instance.id().clone();
        let remaining = {
            let mut instances = self.instances.lock();
            let remaining = match instance.counter.on_unload() {
                Ok(remaining) => remaining,
                Err(_) => {
                    tracing::error!(module = %id, "mapping released twice");
                    0
                }
            };
            if remaining == 0
                && instances
                    .get(&id)
                    .map(|current| Arc::ptr_eq(current, instance))
                    .unwrap_or(false)
            {
                instances.remove(&id);
            }
            image.unmap();
            remaining
        };

        tracing::debug!(module = %id, mappings = remaining, "module unmapped");
        self.emit(&LoaderEvent::Unmapped {
            module: id,
            mappings: remaining,
        });
    }
}

/// Maps modules, tracks their lifecycle and resolves their exports.
///
/// Cloning is cheap; clones share the registry and the backend.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    /// Loader over the platform dynamic loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_backend(NativeBackend::new(config))
    }

    /// Native loader configured from the environment.
    pub fn from_env() -> Self {
        Self::new(LoaderConfig::from_env())
    }

    pub fn with_backend(backend: impl ModuleBackend + 'static) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                backend: Box::new(backend),
                instances: Mutex::new(HashMap::new()),
                event_callback: RwLock::new(None),
            }),
        }
    }

    /// Set the event callback.
    pub fn with_event_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        self.set_event_callback(callback);
        self
    }

    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        *self.inner.event_callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_event_callback(&self) {
        *self.inner.event_callback.write() = None;
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Map a module and fire its on-load hook.
    ///
    /// Mapping and the hook run under the registry lock, so concurrent loads
    /// and unloads of the same id are serialised.
    pub fn load(&self, id: impl Into<ModuleId>) -> Result<LoadedModule> {
        let id = id.into();

        let mapped = {
            let mut instances = self.inner.instances.lock();
            self.inner.backend.map(&id).map(|image| {
                let instance = Arc::clone(
                    instances
                        .entry(id.clone())
                        .or_insert_with(|| Arc::new(ModuleInstance::new(id.clone(), image.location()))),
                );
                let mappings = instance.counter.on_load();
                (image, instance, mappings)
            })
        };

        match mapped {
            Ok((image, instance, mappings)) => {
                let location = image.location().to_string();
                if mappings > 1 {
                    tracing::debug!(module = %id, mappings, "module mapped again");
                } else {
                    tracing::info!(module = %id, %location, backend = self.backend_name(), "module loaded");
                }
                self.inner.emit(&LoaderEvent::Mapped {
                    module: id,
                    location,
                    mappings,
                });
                Ok(LoadedModule::new(Arc::clone(&self.inner), instance, image))
            }
            Err(e) => {
                tracing::warn!(module = %id, error = %e, "failed to load module");
                self.inner.emit(&LoaderEvent::MapFailed {
                    module: id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Load, resolve `symbol` as `F`, run `callback`, unload.
    ///
    /// The module is released on every path out of this call, including a
    /// failed lookup and a panicking callback. The module stays mapped for
    /// the whole callback.
    ///
    /// # Safety
    ///
    /// `F` must be the real signature of the export, and `callback` must not
    /// keep the function pointer (or anything it returns that points into the
    /// module) past its own return.
    pub unsafe fn invoke_with_callback<F, R>(
        &self,
        id: impl Into<ModuleId>,
        symbol: &str,
        callback: impl FnOnce(F) -> R,
    ) -> Result<R>
    where
        F: FnPtr,
    {
        let module = scopeguard::guard(self.load(id)?, |module| {
            tracing::trace!(module = %module.id(), "releasing module after callback");
            module.unload();
        });
        let function = module.resolve::<F>(symbol)?.function;
        Ok(callback(function))
    }

    /// Load, obtain the component's interface record, run `callback`, unload.
    ///
    /// # Safety
    ///
    /// The module's factory must return a `C::Interface`; see
    /// [`LoadedModule::interface`]. The callback must not keep the reference.
    pub unsafe fn with_component<C, R>(
        &self,
        id: impl Into<ModuleId>,
        callback: impl FnOnce(&C::Interface) -> R,
    ) -> Result<R>
    where
        C: Component,
    {
        let module = scopeguard::guard(self.load(id)?, |module| {
            tracing::trace!(module = %module.id(), "releasing module after callback");
            module.unload();
        });
        let interface = module.interface::<C>()?;
        Ok(callback(interface))
    }

    /// Version descriptor of a module, mapping it only for the query.
    pub fn version(&self, id: impl Into<ModuleId>) -> Result<VersionDescriptor> {
        self.load(id)?.version()
    }

    /// Host-side unload readiness: true when this loader holds no mapping.
    pub fn can_unload_now(&self, id: impl Into<ModuleId>) -> bool {
        self.mapping_count(id) == 0
    }

    pub fn mapping_count(&self, id: impl Into<ModuleId>) -> usize {
        self.inner
            .instances
            .lock()
            .get(&id.into())
            .map(|instance| instance.counter.count())
            .unwrap_or(0)
    }

    /// Ids with at least one live mapping, sorted.
    pub fn loaded_modules(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.inner.instances.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("backend", &self.backend_name())
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id() {
        let id = ModuleId::from("alpha");
        assert_eq!(id.as_str(), "alpha");
        assert_eq!(id.to_string(), "alpha");
        assert!(!id.is_path());
        assert!(!id.has_library_extension());

        let path = ModuleId::new("./target/debug/libalpha.so");
        assert!(path.is_path());
        assert!(path.has_library_extension());
    }

    #[test]
    fn test_missing_module_emits_event() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let loader = Loader::with_backend(InProcessBackend::new())
            .with_event_callback(move |event| sink.lock().push(event.clone()));

        let err = loader.load("ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(loader.can_unload_now("ghost"));
        assert!(loader.loaded_modules().is_empty());

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            LoaderEvent::MapFailed { module, .. } if module.as_str() == "ghost"
        ));
    }
}
