//! Mapping backends.
//!
//! A backend turns a [`ModuleId`] into a mapped image that can resolve
//! symbol addresses. Unmapping happens when the image is handed back through
//! [`MappedImage::unmap`]; the loader does that only after firing the
//! on-unload hook.

use crate::error::Result;
use crate::loader::ModuleId;
use crate::symbols::RawSymbol;

/// Source of module images.
pub trait ModuleBackend: Send + Sync {
    /// Map the module into the process.
    ///
    /// Fails with [`LoadError::ModuleNotFound`](crate::LoadError::ModuleNotFound)
    /// without leaving anything mapped.
    fn map(&self, id: &ModuleId) -> Result<Box<dyn MappedImage>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

impl<B: ModuleBackend + ?Sized> ModuleBackend for std::sync::Arc<B> {
    fn map(&self, id: &ModuleId) -> Result<Box<dyn MappedImage>> {
        (**self).map(id)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// A module image currently mapped into the process.
pub trait MappedImage: Send + Sync {
    /// Where the image came from (file path, registry key).
    fn location(&self) -> &str;

    /// Address of an exported symbol, or the reason it is unavailable.
    fn symbol(&self, name: &str) -> std::result::Result<RawSymbol, String>;

    /// Release the mapping.
    fn unmap(self: Box<Self>) {}
}
