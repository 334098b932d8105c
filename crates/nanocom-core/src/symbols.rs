//! The fixed symbol contract every component module exports.
//!
//! A compliant module exports exactly three functions under these names:
//!
//! - [`VERSION_SYMBOL`] -> [`VersionFn`]
//! - [`FACTORY_SYMBOL`] -> [`FactoryFn`] (return type differs per module)
//! - [`UNLOAD_SYMBOL`] -> [`UnloadFn`]

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::version::VersionDescriptor;

/// Version query: returns the module's cached [`VersionDescriptor`].
pub const VERSION_SYMBOL: &str = "nanocom_component_get_version";

/// Factory: returns a pointer to the module's static interface record.
pub const FACTORY_SYMBOL: &str = "nanocom_component_get_implementation";

/// Unload-readiness query: true iff the module's lifecycle counter is zero.
pub const UNLOAD_SYMBOL: &str = "nanocom_component_can_unload_now";

/// All exported names, in declaration order.
pub const EXPORTED_SYMBOLS: [&str; 3] = [VERSION_SYMBOL, FACTORY_SYMBOL, UNLOAD_SYMBOL];

pub type VersionFn = unsafe extern "C" fn() -> VersionDescriptor;

pub type UnloadFn = unsafe extern "C" fn() -> bool;

/// Factory signature for a module whose interface record is `I`.
pub type FactoryFn<I> = unsafe extern "C" fn() -> *const I;

/// Address of an exported symbol, untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(NonNull<c_void>);

// SAFETY: a symbol address is an immutable code location shared by the whole
// process; moving it between threads does not touch the pointee.
unsafe impl Send for RawSymbol {}
unsafe impl Sync for RawSymbol {}

impl RawSymbol {
    /// Wrap a raw address, rejecting null.
    pub fn new(address: *const c_void) -> Option<Self> {
        NonNull::new(address as *mut c_void).map(Self)
    }

    pub fn from_fn<F: FnPtr>(function: F) -> Self {
        function.into_raw()
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }
}

/// Pointer-sized `extern "C"` function pointer types.
///
/// This is the static part of the factory-type check: a symbol can only be
/// resolved as a function pointer with the C calling convention. Whether the
/// module's actual export has that exact signature cannot be verified.
///
/// # Safety
///
/// Implementors must be function pointer types with the same size and
/// representation as a data pointer. The trait is implemented here for every
/// `extern "C"` signature of up to six arguments and should not be
/// implemented elsewhere.
pub unsafe trait FnPtr: Copy + Send + Sync + 'static {
    /// Reinterpret a symbol address as this function pointer type.
    ///
    /// # Safety
    ///
    /// `symbol` must be the address of a function whose real signature is
    /// `Self`; anything else is undefined behaviour once the result is called.
    unsafe fn from_raw(symbol: RawSymbol) -> Self;

    fn into_raw(self) -> RawSymbol;
}

macro_rules! impl_fn_ptr {
    (@one $ty:ty; $($arg:ident),*) => {
        unsafe impl<R: 'static, $($arg: 'static),*> FnPtr for $ty {
            unsafe fn from_raw(symbol: RawSymbol) -> Self {
                debug_assert_eq!(
                    std::mem::size_of::<Self>(),
                    std::mem::size_of::<*const c_void>()
                );
                std::mem::transmute_copy::<*const c_void, Self>(&symbol.as_ptr())
            }

            fn into_raw(self) -> RawSymbol {
                // SAFETY: function pointers are never null.
                RawSymbol(unsafe { NonNull::new_unchecked(self as *mut c_void) })
            }
        }
    };
    ($($arg:ident),*) => {
        impl_fn_ptr!(@one unsafe extern "C" fn($($arg),*) -> R; $($arg),*);
        impl_fn_ptr!(@one extern "C" fn($($arg),*) -> R; $($arg),*);
    };
}

impl_fn_ptr!();
impl_fn_ptr!(A);
impl_fn_ptr!(A, B);
impl_fn_ptr!(A, B, C);
impl_fn_ptr!(A, B, C, D);
impl_fn_ptr!(A, B, C, D, E);
impl_fn_ptr!(A, B, C, D, E, G);

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn answer() -> i32 {
        42
    }

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    #[test]
    fn test_symbol_names_are_distinct() {
        assert_eq!(EXPORTED_SYMBOLS.len(), 3);
        assert_ne!(VERSION_SYMBOL, FACTORY_SYMBOL);
        assert_ne!(FACTORY_SYMBOL, UNLOAD_SYMBOL);
        assert!(EXPORTED_SYMBOLS.iter().all(|name| name.is_ascii()));
    }

    #[test]
    fn test_fn_ptr_round_trip() {
        let raw = RawSymbol::from_fn(answer as extern "C" fn() -> i32);
        let typed: unsafe extern "C" fn() -> i32 = unsafe { FnPtr::from_raw(raw) };
        assert_eq!(unsafe { typed() }, 42);

        let raw = RawSymbol::from_fn(add as extern "C" fn(i32, i32) -> i32);
        let typed: extern "C" fn(i32, i32) -> i32 = unsafe { FnPtr::from_raw(raw) };
        assert_eq!(typed(40, 2), 42);
    }

    #[test]
    fn test_raw_symbol_rejects_null() {
        assert!(RawSymbol::new(std::ptr::null()).is_none());
    }
}
