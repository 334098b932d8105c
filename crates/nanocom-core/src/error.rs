//! Error types for module loading.
//!
//! Only recoverable conditions are represented here. Two failure classes of
//! the protocol are deliberately absent:
//!
//! - a factory resolved with the wrong function-pointer type is undefined
//!   behaviour, excluded by the `unsafe` contracts on the loader rather than
//!   reported at runtime;
//! - lock misuse (re-entrant acquisition) is a programming error and panics,
//!   see [`crate::lock`].

/// Errors surfaced by the loader and the lifecycle counter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The module could not be mapped into the process.
    #[error("Module not found: {module} ({reason})")]
    ModuleNotFound { module: String, reason: String },

    /// The module was mapped but does not export the requested symbol.
    #[error("Symbol `{symbol}` not found in module {module} ({reason})")]
    SymbolNotFound {
        module: String,
        symbol: String,
        reason: String,
    },

    /// The module's factory returned a null interface pointer.
    #[error("Module {module} returned a null component interface")]
    NullInterface { module: String },

    /// An on-unload hook fired more often than the matching on-load hook.
    #[error("Lifecycle counter underflow for module {module}")]
    CounterUnderflow { module: String },

    /// Loader configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    /// Module id the error refers to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            LoadError::ModuleNotFound { module, .. }
            | LoadError::SymbolNotFound { module, .. }
            | LoadError::NullInterface { module }
            | LoadError::CounterUnderflow { module } => Some(module),
            LoadError::Config(_) => None,
        }
    }

    /// True when the failure means the module is absent, so a host may treat
    /// the plugin as optional and skip it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::ModuleNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::SymbolNotFound {
            module: "alpha".to_string(),
            symbol: "nanocom_component_get_version".to_string(),
            reason: "undefined symbol".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("nanocom_component_get_version"));
        assert!(text.contains("alpha"));
    }

    #[test]
    fn test_error_module() {
        let err = LoadError::ModuleNotFound {
            module: "missing".to_string(),
            reason: "no such file".to_string(),
        };
        assert_eq!(err.module(), Some("missing"));
        assert!(err.is_not_found());
        assert_eq!(LoadError::Config("bad".into()).module(), None);
    }
}
