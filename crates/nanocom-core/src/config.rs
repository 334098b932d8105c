//! Loader configuration.
//!
//! Module identifiers are resolved against a list of search directories.
//! The list can be built in code, read from the `NANOCOM_MODULE_PATH`
//! environment variable, or loaded from a TOML file:
//!
//! ```toml
//! search_paths = ["/opt/app/plugins", "./target/debug"]
//! platform_naming = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::loader::ModuleId;

/// Environment variable names.
pub mod env_vars {
    /// Search path list, separated like `PATH` on the host platform.
    pub const MODULE_PATH: &str = "NANOCOM_MODULE_PATH";
    /// Log filter directive used by hosts that install a subscriber.
    pub const LOG: &str = "NANOCOM_LOG";
    /// When `true`, hosts emit logs as JSON.
    pub const LOG_JSON: &str = "NANOCOM_LOG_JSON";
}

/// Default log filter when [`env_vars::LOG`] is unset.
pub const DEFAULT_LOG_FILTER: &str = "nanocom=info";

/// How the loader turns a [`ModuleId`] into library paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched, in order, before the platform's own rules.
    pub search_paths: Vec<PathBuf>,
    /// Also try the platform file name (`libfoo.so`, `libfoo.dylib`, `foo.dll`).
    pub platform_naming: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            platform_naming: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus search paths from [`env_vars::MODULE_PATH`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(paths) = std::env::var_os(env_vars::MODULE_PATH) {
            config
                .search_paths
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
        config
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LoadError::Config(format!("Invalid loader config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoadError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Append a search directory.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_platform_naming(mut self, enabled: bool) -> Self {
        self.platform_naming = enabled;
        self
    }

    /// Candidate paths for `id`, most specific first.
    ///
    /// An id that already looks like a path is used unchanged. Otherwise each
    /// search directory is tried with the platform file name and with the
    /// bare id, then the platform file name and bare id are left to the
    /// platform loader's own search rules.
    pub fn candidates(&self, id: &ModuleId) -> Vec<PathBuf> {
        let raw = Path::new(id.as_str());
        if id.is_path() {
            return vec![raw.to_path_buf()];
        }

        let mut names = Vec::with_capacity(2);
        if self.platform_naming && !id.has_library_extension() {
            names.push(PathBuf::from(libloading::library_filename(id.as_str())));
        }
        names.push(raw.to_path_buf());

        let mut candidates: Vec<PathBuf> = self
            .search_paths
            .iter()
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .collect();
        candidates.extend(names);
        candidates.dedup();
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert!(config.search_paths.is_empty());
        assert!(config.platform_naming);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(env_vars::MODULE_PATH, "NANOCOM_MODULE_PATH");
        assert_eq!(env_vars::LOG, "NANOCOM_LOG");
        assert_eq!(env_vars::LOG_JSON, "NANOCOM_LOG_JSON");
    }

    #[test]
    fn test_candidates_without_search_paths() {
        let config = LoaderConfig::new();
        let candidates = config.candidates(&ModuleId::new("alpha"));
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0],
            PathBuf::from(libloading::library_filename("alpha"))
        );
        assert_eq!(candidates[1], PathBuf::from("alpha"));
    }

    #[test]
    fn test_candidates_search_paths_first() {
        let config = LoaderConfig::new()
            .with_search_path("/opt/one")
            .with_search_path("/opt/two")
            .with_platform_naming(false);
        let candidates = config.candidates(&ModuleId::new("alpha"));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/opt/one/alpha"),
                PathBuf::from("/opt/two/alpha"),
                PathBuf::from("alpha"),
            ]
        );
    }

    #[test]
    fn test_path_like_id_is_used_as_is() {
        let config = LoaderConfig::new().with_search_path("/opt/one");
        let candidates = config.candidates(&ModuleId::new("./plugins/libalpha.so"));
        assert_eq!(candidates, vec![PathBuf::from("./plugins/libalpha.so")]);
    }

    #[test]
    fn test_file_name_id_skips_platform_naming() {
        let config = LoaderConfig::new().with_search_path("/opt/one");
        let candidates = config.candidates(&ModuleId::new("libalpha.so"));
        assert_eq!(
            candidates,
            vec![PathBuf::from("/opt/one/libalpha.so"), PathBuf::from("libalpha.so")]
        );
    }

    #[test]
    fn test_from_toml() {
        let config = LoaderConfig::from_toml_str(
            r#"
            search_paths = ["/opt/plugins"]
            platform_naming = false
            "#,
        )
        .unwrap();
        assert_eq!(config.search_paths, vec![PathBuf::from("/opt/plugins")]);
        assert!(!config.platform_naming);

        let partial = LoaderConfig::from_toml_str("search_paths = []").unwrap();
        assert!(partial.platform_naming);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = LoaderConfig::from_toml_str("search_paths = 3").unwrap_err();
        assert!(matches!(err, LoadError::Config(_)));
    }
}
