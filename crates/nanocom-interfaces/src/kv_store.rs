//! Component B: a keyed byte store.
//!
//! Entries are created with a size, then written and read as whole values.
//! Keys are short texts of at most 63 bytes.

use nanocom_core::{BoundedText, Component};

/// Module id of the component B library.
pub const COMPONENT_B_MODULE: &str = "nanocom_component_b";

pub type Key = BoundedText<64>;

/// Result code of a store operation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvStatus {
    Ok = 0,
    NotFound = 1,
    AlreadyExists = 2,
    /// `get_value` buffer too small; the required length is reported.
    BufferTooSmall = 3,
    /// `set_value` length differs from the size given at creation.
    SizeMismatch = 4,
    InvalidArgument = 5,
}

#[repr(C)]
pub struct KvStoreApi {
    pub create: unsafe extern "C" fn(this: *const KvStoreApi, key: *const Key, size: usize) -> KvStatus,
    pub set_value: unsafe extern "C" fn(
        this: *const KvStoreApi,
        key: *const Key,
        data: *const u8,
        len: usize,
    ) -> KvStatus,
    pub get_value: unsafe extern "C" fn(
        this: *const KvStoreApi,
        key: *const Key,
        out: *mut u8,
        capacity: usize,
        out_len: *mut usize,
    ) -> KvStatus,
    pub delete: unsafe extern "C" fn(this: *const KvStoreApi, key: *const Key) -> KvStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    #[error("Key too long: {0} bytes (max {max})", max = Key::MAX_LEN)]
    KeyTooLong(usize),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Value for {key} must be {expected} bytes")]
    SizeMismatch { key: String, expected: usize },

    #[error("Store rejected {operation} on {key}: {status:?}")]
    Rejected {
        operation: &'static str,
        key: String,
        status: KvStatus,
    },
}

pub type KvResult<T> = std::result::Result<T, KvError>;

fn key_of(key: &str) -> KvResult<Key> {
    if Key::fits(key) {
        Ok(Key::new(key))
    } else {
        Err(KvError::KeyTooLong(key.len()))
    }
}

fn check(status: KvStatus, operation: &'static str, key: &str) -> KvResult<()> {
    match status {
        KvStatus::Ok => Ok(()),
        KvStatus::NotFound => Err(KvError::NotFound(key.to_string())),
        KvStatus::AlreadyExists => Err(KvError::AlreadyExists(key.to_string())),
        status => Err(KvError::Rejected {
            operation,
            key: key.to_string(),
            status,
        }),
    }
}

// SAFETY (all wrappers): the record comes from a module built against this
// crate, and every pointer passed stays valid for the call.
impl KvStoreApi {
    /// Create an entry holding `size` zero bytes.
    pub fn create(&self, key: &str, size: usize) -> KvResult<()> {
        let k = key_of(key)?;
        check(unsafe { (self.create)(self, &k, size) }, "create", key)
    }

    /// Overwrite an entry; `value` must have the size given at creation.
    pub fn set_value(&self, key: &str, value: &[u8]) -> KvResult<()> {
        let k = key_of(key)?;
        match unsafe { (self.set_value)(self, &k, value.as_ptr(), value.len()) } {
            KvStatus::SizeMismatch => {
                let expected = self.get_value(key).map(|v| v.len()).unwrap_or(0);
                Err(KvError::SizeMismatch {
                    key: key.to_string(),
                    expected,
                })
            }
            status => check(status, "set_value", key),
        }
    }

    pub fn get_value(&self, key: &str) -> KvResult<Vec<u8>> {
        let k = key_of(key)?;
        let mut buffer = vec![0u8; 64];
        loop {
            let mut len = 0usize;
            let status = unsafe {
                (self.get_value)(self, &k, buffer.as_mut_ptr(), buffer.len(), &mut len)
            };
            match status {
                KvStatus::Ok => {
                    buffer.truncate(len);
                    return Ok(buffer);
                }
                KvStatus::BufferTooSmall if len > buffer.len() => buffer.resize(len, 0),
                status => return check(status, "get_value", key).map(|()| Vec::new()),
            }
        }
    }

    pub fn delete(&self, key: &str) -> KvResult<()> {
        let k = key_of(key)?;
        check(unsafe { (self.delete)(self, &k) }, "delete", key)
    }
}

pub struct KvStore;

impl Component for KvStore {
    const NAME: &'static str = "kv-store";
    type Interface = KvStoreApi;
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn create(_: *const KvStoreApi, key: *const Key, _: usize) -> KvStatus {
        if (*key).as_str() == "taken" {
            KvStatus::AlreadyExists
        } else {
            KvStatus::Ok
        }
    }

    unsafe extern "C" fn set_value(
        _: *const KvStoreApi,
        _: *const Key,
        _: *const u8,
        _: usize,
    ) -> KvStatus {
        KvStatus::InvalidArgument
    }

    unsafe extern "C" fn get_value(
        _: *const KvStoreApi,
        key: *const Key,
        out: *mut u8,
        capacity: usize,
        out_len: *mut usize,
    ) -> KvStatus {
        if (*key).as_str() != "big" {
            return KvStatus::NotFound;
        }
        let value = [7u8; 100];
        *out_len = value.len();
        if capacity < value.len() {
            return KvStatus::BufferTooSmall;
        }
        std::ptr::copy_nonoverlapping(value.as_ptr(), out, value.len());
        KvStatus::Ok
    }

    unsafe extern "C" fn delete(_: *const KvStoreApi, _: *const Key) -> KvStatus {
        KvStatus::NotFound
    }

    fn api() -> KvStoreApi {
        KvStoreApi {
            create,
            set_value,
            get_value,
            delete,
        }
    }

    #[test]
    fn test_key_length_checked_before_call() {
        let long = "k".repeat(64);
        assert_eq!(api().create(&long, 4), Err(KvError::KeyTooLong(64)));
        assert!(api().create(&"k".repeat(63), 4).is_ok());
    }

    #[test]
    fn test_status_mapping() {
        let api = api();
        assert_eq!(
            api.create("taken", 1),
            Err(KvError::AlreadyExists("taken".to_string()))
        );
        assert_eq!(api.delete("x"), Err(KvError::NotFound("x".to_string())));
        assert!(matches!(
            api.set_value("x", &[1]),
            Err(KvError::Rejected {
                operation: "set_value",
                status: KvStatus::InvalidArgument,
                ..
            })
        ));
    }

    #[test]
    fn test_get_value_grows_buffer() {
        let value = api().get_value("big").unwrap();
        assert_eq!(value, vec![7u8; 100]);
        assert_eq!(api().get_value("small"), Err(KvError::NotFound("small".to_string())));
    }
}
