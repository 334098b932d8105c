//! Mapped module handles.

use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::backend::MappedImage;
use super::{LoaderEvent, LoaderInner, ModuleId};
use crate::component::Component;
use crate::error::{LoadError, Result};
use crate::lifecycle::LifecycleCounter;
use crate::symbols::{FactoryFn, FnPtr, UnloadFn, VersionFn, FACTORY_SYMBOL, UNLOAD_SYMBOL, VERSION_SYMBOL};
use crate::version::VersionDescriptor;

/// Host-side state shared by every mapping of one module id.
///
/// Created on the first mapping and dropped from the loader's registry when
/// the last mapping is released, so a reload starts with a fresh counter and
/// an empty version cache.
pub(crate) struct ModuleInstance {
    id: ModuleId,
    location: String,
    pub(crate) counter: LifecycleCounter,
    version: OnceCell<VersionDescriptor>,
}

impl ModuleInstance {
    pub(crate) fn new(id: ModuleId, location: &str) -> Self {
        Self {
            id,
            location: location.to_string(),
            counter: LifecycleCounter::new(),
            version: OnceCell::new(),
        }
    }

    pub(crate) fn id(&self) -> &ModuleId {
        &self.id
    }
}

/// A module mapped into the process.
///
/// Dropping the handle fires the on-unload hook and then unmaps the image.
/// Nothing resolved through the handle may be used afterwards; the borrow on
/// [`Symbol`] and [`LoadedModule::interface`] enforces this for safe code.
pub struct LoadedModule {
    loader: Arc<LoaderInner>,
    instance: Arc<ModuleInstance>,
    image: ManuallyDrop<Box<dyn MappedImage>>,
}

impl LoadedModule {
    pub(crate) fn new(
        loader: Arc<LoaderInner>,
        instance: Arc<ModuleInstance>,
        image: Box<dyn MappedImage>,
    ) -> Self {
        Self {
            loader,
            instance,
            image: ManuallyDrop::new(image),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.instance.id
    }

    /// Where the image was mapped from.
    pub fn location(&self) -> &str {
        &self.instance.location
    }

    /// Mappings of this module id currently held through the same loader.
    pub fn mapping_count(&self) -> usize {
        self.instance.counter.count()
    }

    /// Resolve an exported function by name.
    ///
    /// # Safety
    ///
    /// `F` must be the real signature of the exported function.
    pub unsafe fn resolve<F: FnPtr>(&self, name: &str) -> Result<Symbol<'_, F>> {
        match self.image.symbol(name) {
            Ok(raw) => Ok(Symbol {
                function: F::from_raw(raw),
                _module: PhantomData,
            }),
            Err(reason) => {
                tracing::debug!(module = %self.id(), symbol = name, %reason, "symbol lookup failed");
                self.loader.emit(&LoaderEvent::SymbolMissing {
                    module: self.id().clone(),
                    symbol: name.to_string(),
                });
                Err(LoadError::SymbolNotFound {
                    module: self.id().to_string(),
                    symbol: name.to_string(),
                    reason,
                })
            }
        }
    }

    /// Query the module's version descriptor.
    ///
    /// The first successful query is cached for as long as the module stays
    /// mapped; later calls do not re-enter the module.
    pub fn version(&self) -> Result<VersionDescriptor> {
        self.instance
            .version
            .get_or_try_init(|| {
                // SAFETY: the version query's signature is part of the fixed
                // export contract.
                let query = unsafe { self.resolve::<VersionFn>(VERSION_SYMBOL)? };
                let version = unsafe { query() };
                tracing::debug!(module = %self.id(), %version, "version descriptor cached");
                Ok(version)
            })
            .copied()
    }

    /// Ask the module whether it is ready to be unloaded.
    pub fn can_unload_now(&self) -> Result<bool> {
        // SAFETY: fixed export contract.
        let query = unsafe { self.resolve::<UnloadFn>(UNLOAD_SYMBOL)? };
        Ok(unsafe { query() })
    }

    /// Obtain the component's interface record.
    ///
    /// # Safety
    ///
    /// The module's factory must return a pointer to a `C::Interface`. A
    /// mismatch cannot be detected and is undefined behaviour.
    pub unsafe fn interface<C: Component>(&self) -> Result<&C::Interface> {
        let factory = self.resolve::<FactoryFn<C::Interface>>(FACTORY_SYMBOL)?;
        let record = factory();
        record.as_ref().ok_or_else(|| {
            tracing::warn!(module = %self.id(), component = C::NAME, "factory returned null");
            LoadError::NullInterface {
                module: self.id().to_string(),
            }
        })
    }

    /// Release this mapping now.
    pub fn unload(self) {
        drop(self);
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        // SAFETY: taken exactly once, here; the field is never used again.
        let image = unsafe { ManuallyDrop::take(&mut self.image) };
        self.loader.release(&self.instance, image);
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", self.id())
            .field("location", &self.location())
            .field("mappings", &self.mapping_count())
            .finish()
    }
}

/// A typed function resolved from a [`LoadedModule`].
///
/// Borrows the module so the function cannot outlive the mapping.
pub struct Symbol<'m, F> {
    pub(crate) function: F,
    _module: PhantomData<&'m LoadedModule>,
}

impl<F> Deref for Symbol<'_, F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.function
    }
}

impl<F: FnPtr> std::fmt::Debug for Symbol<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({:p})", self.function.into_raw().as_ptr())
    }
}
