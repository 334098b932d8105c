//! Native backend for .so/.dylib/.dll modules.

use std::ffi::c_void;
use std::path::Path;

use libloading::Library;

use super::backend::{MappedImage, ModuleBackend};
use super::ModuleId;
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::symbols::RawSymbol;

/// Maps modules with the platform dynamic loader.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend {
    config: LoaderConfig,
}

impl NativeBackend {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

impl ModuleBackend for NativeBackend {
    fn map(&self, id: &ModuleId) -> Result<Box<dyn MappedImage>> {
        let mut failures = Vec::new();

        for candidate in self.config.candidates(id) {
            // Bare names go to the platform search; joined paths must exist.
            let is_bare = candidate.components().count() == 1;
            if !is_bare && !candidate.exists() {
                failures.push(format!("{}: no such file", candidate.display()));
                continue;
            }

            // SAFETY: mapping runs the library's initialisers; modules are
            // trusted by the host that configured the search paths.
            match unsafe { Library::new(&candidate) } {
                Ok(library) => {
                    tracing::debug!(module = %id, path = %candidate.display(), "library mapped");
                    return Ok(Box::new(NativeImage {
                        library,
                        location: candidate.display().to_string(),
                    }));
                }
                Err(e) => failures.push(format!("{}: {}", candidate.display(), e)),
            }
        }

        Err(LoadError::ModuleNotFound {
            module: id.to_string(),
            reason: if failures.is_empty() {
                "no candidate paths".to_string()
            } else {
                failures.join("; ")
            },
        })
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// A library mapped by [`NativeBackend`].
struct NativeImage {
    library: Library,
    location: String,
}

impl MappedImage for NativeImage {
    fn location(&self) -> &str {
        &self.location
    }

    fn symbol(&self, name: &str) -> std::result::Result<RawSymbol, String> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);

        // SAFETY: the symbol is read as an address only; it is given a type
        // by the caller of `LoadedModule::resolve`.
        let symbol: libloading::Symbol<'_, *const c_void> =
            unsafe { self.library.get(&bytes) }.map_err(|e| e.to_string())?;
        RawSymbol::new(*symbol).ok_or_else(|| "symbol resolves to a null address".to_string())
    }

    fn unmap(self: Box<Self>) {
        let NativeImage { library, location } = *self;
        if let Err(e) = library.close() {
            tracing::warn!(path = %location, error = %e, "failed to unmap library");
        }
    }
}

/// Check if a file looks like a native module.
pub fn is_native_module(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| matches!(ext, "so" | "dylib" | "dll"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module() {
        let backend = NativeBackend::new(LoaderConfig::new());
        let result = backend.map(&ModuleId::new("nanocom_definitely_missing_module"));
        match result {
            Err(LoadError::ModuleNotFound { module, reason }) => {
                assert_eq!(module, "nanocom_definitely_missing_module");
                assert!(!reason.is_empty());
            }
            Err(e) => panic!("Expected ModuleNotFound, got {}", e),
            Ok(_) => panic!("Expected ModuleNotFound, got a mapping"),
        }
    }

    #[test]
    fn test_missing_path_is_not_handed_to_platform() {
        let backend = NativeBackend::new(LoaderConfig::new());
        let err = backend
            .map(&ModuleId::new("/nonexistent/path/libalpha.so"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_is_native_module() {
        assert!(is_native_module(Path::new("libalpha.so")));
        assert!(is_native_module(Path::new("alpha.dll")));
        assert!(is_native_module(Path::new("libalpha.dylib")));
        assert!(!is_native_module(Path::new("alpha.wasm")));
        assert!(!is_native_module(Path::new("alpha")));
    }
}
