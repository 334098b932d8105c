//! Component loading and lifecycle protocol for native plugin modules.
//!
//! A component module is a shared library exporting three C symbols: a
//! version query, a factory returning its interface record and an
//! unload-readiness query (see [`symbols`]). Hosts map modules with a
//! [`Loader`], which fires on-load/on-unload hooks around every mapping and
//! guarantees release through scope guards. Modules export themselves with
//! [`export_component!`] and serialise their internals with the locks in
//! [`lock`].
//!
//! # Loader lock
//!
//! Mapping and unmapping run under the platform loader's own lock. Calling
//! back into a [`Loader`] from a module's static initialisers or finalisers
//! may deadlock and is not supported.

pub mod bounded;
pub mod component;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod lock;
pub mod symbols;
pub mod version;

pub use bounded::BoundedText;
pub use component::Component;
pub use config::{env_vars, LoaderConfig, DEFAULT_LOG_FILTER};
pub use error::{LoadError, Result};
pub use lifecycle::{CounterUnderflow, LifecycleCounter, LifecycleHold};
pub use loader::{
    InProcessBackend, LoadedModule, Loader, LoaderEvent, MappedImage, ModuleBackend, ModuleId,
    NativeBackend, Symbol, SymbolTable,
};
pub use lock::{CallSiteGuard, CallSiteLock, ModuleScopeGuard, ModuleScopeLock};
pub use symbols::{
    FactoryFn, FnPtr, RawSymbol, UnloadFn, VersionFn, EXPORTED_SYMBOLS, FACTORY_SYMBOL,
    UNLOAD_SYMBOL, VERSION_SYMBOL,
};
pub use version::{VersionCell, VersionDescriptor};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::component::Component;
    pub use crate::config::LoaderConfig;
    pub use crate::error::{LoadError, Result};
    pub use crate::loader::{LoadedModule, Loader, ModuleId};
    pub use crate::version::VersionDescriptor;
    pub use crate::{call_site_lock, declare_module_lock, export_component};
}
