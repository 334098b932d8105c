//! Component descriptors and the module-side export macros.
//!
//! A module crate exports its component with [`export_component!`]:
//!
//! ```ignore
//! use nanocom_core::export_component;
//!
//! #[repr(C)]
//! pub struct Greeter {
//!     pub greet: unsafe extern "C" fn() -> u32,
//! }
//!
//! unsafe extern "C" fn greet() -> u32 {
//!     let _busy = lifecycle().hold();
//!     7
//! }
//!
//! export_component! {
//!     version: (1, 0, 0, "greeter"),
//!     interface: Greeter = Greeter { greet },
//! }
//! ```
//!
//! That emits `nanocom_component_get_version`,
//! `nanocom_component_get_implementation` and
//! `nanocom_component_can_unload_now` as unmangled C symbols, plus a
//! `lifecycle()` accessor for the module's own counter. The unload-readiness
//! export reports that counter, so interface methods should hold it while
//! they run.
//!
//! [`in_process_component!`] emits the same functions inside a named module,
//! without `#[no_mangle]`, and adds a `symbol_table()` constructor for the
//! [`InProcessBackend`](crate::InProcessBackend).

/// Static description of a component a host knows how to talk to.
///
/// Host and module agree on `Interface` out of band by compiling against the
/// same interface crate. The loader cannot verify the agreement.
pub trait Component {
    /// Name used in logs.
    const NAME: &'static str;

    /// `#[repr(C)]` record returned by the module's factory.
    type Interface: 'static;
}

/// Export a component from a `cdylib` module crate.
///
/// Use once per crate, at the crate root.
#[macro_export]
macro_rules! export_component {
    (
        version: ($major:expr, $minor:expr, $patch:expr, $description:expr $(,)?),
        interface: $iface:ty = $instance:expr $(,)?
    ) => {
        $crate::__component_exports! {
            [#[no_mangle]]
            ($major, $minor, $patch, $description)
            $iface = $instance
        }
    };
}

/// Declare a component linked into the current binary.
///
/// ```ignore
/// in_process_component! {
///     pub mod greeter {
///         version: (1, 0, 0, "greeter"),
///         interface: Greeter = Greeter { greet },
///     }
/// }
///
/// let backend = InProcessBackend::new().with_module("greeter", greeter::symbol_table());
/// ```
#[macro_export]
macro_rules! in_process_component {
    (
        $vis:vis mod $name:ident {
            version: ($major:expr, $minor:expr, $patch:expr, $description:expr $(,)?),
            interface: $iface:ty = $instance:expr $(,)?
        }
    ) => {
        $vis mod $name {
            #[allow(unused_imports)]
            use super::*;

            $crate::__component_exports! {
                []
                ($major, $minor, $patch, $description)
                $iface = $instance
            }

            /// Symbol table exporting this component.
            pub fn symbol_table() -> $crate::SymbolTable {
                $crate::SymbolTable::new()
                    .with(
                        $crate::VERSION_SYMBOL,
                        nanocom_component_get_version as $crate::VersionFn,
                    )
                    .with(
                        $crate::FACTORY_SYMBOL,
                        nanocom_component_get_implementation as $crate::FactoryFn<$iface>,
                    )
                    .with(
                        $crate::UNLOAD_SYMBOL,
                        nanocom_component_can_unload_now as $crate::UnloadFn,
                    )
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __component_exports {
    (
        [$(#[$attr:meta])*]
        ($major:expr, $minor:expr, $patch:expr, $description:expr)
        $iface:ty = $instance:expr
    ) => {
        static __NANOCOM_VERSION: $crate::VersionCell = $crate::VersionCell::new();
        static __NANOCOM_LIFECYCLE: $crate::LifecycleCounter = $crate::LifecycleCounter::new();
        static __NANOCOM_INTERFACE: $iface = $instance;

        /// This module's lifecycle counter.
        #[allow(dead_code)]
        pub fn lifecycle() -> &'static $crate::LifecycleCounter {
            &__NANOCOM_LIFECYCLE
        }

        $(#[$attr])*
        pub extern "C" fn nanocom_component_get_version() -> $crate::VersionDescriptor {
            __NANOCOM_VERSION.get_or_init(|| {
                $crate::VersionDescriptor::new($major, $minor, $patch, $description)
            })
        }

        $(#[$attr])*
        pub extern "C" fn nanocom_component_get_implementation() -> *const $iface {
            &__NANOCOM_INTERFACE
        }

        $(#[$attr])*
        pub extern "C" fn nanocom_component_can_unload_now() -> bool {
            __NANOCOM_LIFECYCLE.can_unload_now()
        }
    };
}
