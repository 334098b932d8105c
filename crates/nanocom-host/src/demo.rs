//! The host's use of each component.
//!
//! Every operation maps its module only for the duration of the call; the
//! loader releases it on the way out whether the call succeeds or not.

use anyhow::{bail, Context, Result};
use nanocom_core::{LoadError, Loader, ModuleId};
use nanocom_interfaces::{ComponentA, KvStore};
use serde::Serialize;

/// Key and value the store round trip uses.
pub const DEMO_KEY: &str = "key_one";
pub const DEMO_VALUE: i32 = 42;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub module: String,
    pub version: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlphaReport {
    pub answer: i32,
    pub connection_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvReport {
    pub key: String,
    pub stored: i32,
    pub deleted: bool,
}

/// Query a module's version descriptor.
pub fn module_info(loader: &Loader, id: &ModuleId) -> Result<ModuleInfo> {
    let version = loader
        .version(id)
        .with_context(|| format!("Failed to query version of {}", id))?;
    Ok(ModuleInfo {
        module: id.to_string(),
        version: version.semver().to_string(),
        major: version.major,
        minor: version.minor,
        patch: version.patch,
        description: version.description().to_string(),
    })
}

/// Call both methods of component A.
pub fn exercise_alpha(loader: &Loader, id: &ModuleId) -> Result<AlphaReport> {
    // SAFETY: the module is built against nanocom-interfaces.
    let report = unsafe {
        loader.with_component::<ComponentA, _>(id, |api| AlphaReport {
            answer: api.get42(),
            connection_string: api.connection_string().as_str().to_string(),
        })
    }
    .with_context(|| format!("Failed to use component A from {}", id))?;

    tracing::debug!(module = %id, answer = report.answer, "component A answered");
    Ok(report)
}

/// Create, write, read back and delete one store entry.
pub fn exercise_kv(loader: &Loader, id: &ModuleId, key: &str, value: i32) -> Result<KvReport> {
    // SAFETY: the module is built against nanocom-interfaces.
    let stored = unsafe {
        loader.with_component::<KvStore, _>(id, |api| -> Result<i32> {
            let bytes = value.to_ne_bytes();
            api.create(key, bytes.len())?;
            api.set_value(key, &bytes)?;
            let read = api.get_value(key)?;
            api.delete(key)?;

            let read: [u8; 4] = match read.try_into() {
                Ok(read) => read,
                Err(read) => bail!("Store returned {} bytes for {}", read.len(), key),
            };
            Ok(i32::from_ne_bytes(read))
        })
    }
    .with_context(|| format!("Failed to use the store from {}", id))??;

    if stored != value {
        bail!("Store returned {} for {}, expected {}", stored, key, value);
    }
    Ok(KvReport {
        key: key.to_string(),
        stored,
        deleted: true,
    })
}

/// True when `err` means the module could not be found at all.
pub fn is_missing_module(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<LoadError>())
        .any(LoadError::is_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanocom_core::{in_process_component, InProcessBackend};
    use nanocom_interfaces::{ComponentAApi, ConnectionString, Key, KvStatus, KvStoreApi};
    use std::sync::Arc;

    unsafe extern "C" fn get42(_: *const ComponentAApi) -> i32 {
        42
    }

    unsafe extern "C" fn connection_string(_: *const ComponentAApi) -> ConnectionString {
        ConnectionString::new("Server=test")
    }

    in_process_component! {
        mod alpha {
            version: (1, 0, 0, "alpha test component"),
            interface: ComponentAApi = ComponentAApi { get42, connection_string },
        }
    }

    // A store that loses everything written to it.
    unsafe extern "C" fn create(_: *const KvStoreApi, _: *const Key, _: usize) -> KvStatus {
        KvStatus::Ok
    }

    unsafe extern "C" fn set_value(_: *const KvStoreApi, _: *const Key, _: *const u8, _: usize) -> KvStatus {
        KvStatus::Ok
    }

    unsafe extern "C" fn get_value(
        _: *const KvStoreApi,
        _: *const Key,
        out: *mut u8,
        capacity: usize,
        out_len: *mut usize,
    ) -> KvStatus {
        *out_len = 4;
        if capacity < 4 {
            return KvStatus::BufferTooSmall;
        }
        std::ptr::write_bytes(out, 0, 4);
        KvStatus::Ok
    }

    unsafe extern "C" fn delete(_: *const KvStoreApi, _: *const Key) -> KvStatus {
        KvStatus::Ok
    }

    in_process_component! {
        mod forgetful {
            version: (0, 1, 0, "forgetful store"),
            interface: KvStoreApi = KvStoreApi { create, set_value, get_value, delete },
        }
    }

    fn loader() -> (Loader, Arc<InProcessBackend>) {
        let backend = Arc::new(
            InProcessBackend::new()
                .with_module("alpha", alpha::symbol_table())
                .with_module("forgetful", forgetful::symbol_table()),
        );
        (Loader::with_backend(Arc::clone(&backend)), backend)
    }

    #[test]
    fn test_module_info() {
        let (loader, _) = loader();
        let info = module_info(&loader, &ModuleId::new("alpha")).unwrap();
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.description, "alpha test component");
    }

    #[test]
    fn test_exercise_alpha() {
        let (loader, backend) = loader();
        let id = ModuleId::new("alpha");
        let report = exercise_alpha(&loader, &id).unwrap();
        assert_eq!(report.answer, 42);
        assert_eq!(report.connection_string, "Server=test");
        assert_eq!(backend.live_mappings(&id), 0);
    }

    #[test]
    fn test_kv_mismatch_is_reported() {
        let (loader, backend) = loader();
        let id = ModuleId::new("forgetful");
        let err = exercise_kv(&loader, &id, DEMO_KEY, DEMO_VALUE).unwrap_err();
        assert!(err.to_string().contains("expected 42"));
        assert!(!is_missing_module(&err));
        assert_eq!(backend.live_mappings(&id), 0);
    }

    #[test]
    fn test_missing_module_is_recognised() {
        let (loader, _) = loader();
        let err = module_info(&loader, &ModuleId::new("missing")).unwrap_err();
        assert!(is_missing_module(&err));
        assert!(err.to_string().contains("missing"));
    }
}
