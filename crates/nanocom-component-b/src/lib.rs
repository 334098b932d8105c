//! Component B module: a keyed byte store.
//!
//! The store is module-scope state behind one lock, so every method of the
//! exported [`KvStoreApi`] record is serialised against the others.

use std::collections::BTreeMap;

use nanocom_core::{declare_module_lock, export_component};
use nanocom_interfaces::{Key, KvStatus, KvStoreApi};

pub const VERSION: (u32, u32, u32) = (1, 0, 0);
pub const DESCRIPTION: &str = "key-value store component";

declare_module_lock!(STORE: BTreeMap<String, Vec<u8>> = BTreeMap::new());

/// `key` must be null or point to a key that outlives `'a`.
unsafe fn key_text<'a>(key: *const Key) -> Option<&'a str> {
    key.as_ref().map(|k| k.as_str()).filter(|k| !k.is_empty())
}

unsafe extern "C" fn create(_this: *const KvStoreApi, key: *const Key, size: usize) -> KvStatus {
    let _busy = lifecycle().hold();
    let Some(key) = key_text(key) else {
        return KvStatus::InvalidArgument;
    };

    let mut store = STORE.enter();
    if store.contains_key(key) {
        return KvStatus::AlreadyExists;
    }
    store.insert(key.to_string(), vec![0; size]);
    tracing::debug!(key, size, "entry created");
    KvStatus::Ok
}

unsafe extern "C" fn set_value(
    _this: *const KvStoreApi,
    key: *const Key,
    data: *const u8,
    len: usize,
) -> KvStatus {
    let _busy = lifecycle().hold();
    let Some(key) = key_text(key) else {
        return KvStatus::InvalidArgument;
    };
    if data.is_null() && len > 0 {
        return KvStatus::InvalidArgument;
    }

    let mut store = STORE.enter();
    let Some(value) = store.get_mut(key) else {
        return KvStatus::NotFound;
    };
    if value.len() != len {
        return KvStatus::SizeMismatch;
    }
    if len > 0 {
        value.copy_from_slice(std::slice::from_raw_parts(data, len));
    }
    KvStatus::Ok
}

unsafe extern "C" fn get_value(
    _this: *const KvStoreApi,
    key: *const Key,
    out: *mut u8,
    capacity: usize,
    out_len: *mut usize,
) -> KvStatus {
    let _busy = lifecycle().hold();
    let Some(key) = key_text(key) else {
        return KvStatus::InvalidArgument;
    };
    if out_len.is_null() || (out.is_null() && capacity > 0) {
        return KvStatus::InvalidArgument;
    }

    let store = STORE.enter();
    let Some(value) = store.get(key) else {
        *out_len = 0;
        return KvStatus::NotFound;
    };
    *out_len = value.len();
    if value.len() > capacity {
        return KvStatus::BufferTooSmall;
    }
    if !value.is_empty() {
        std::ptr::copy_nonoverlapping(value.as_ptr(), out, value.len());
    }
    KvStatus::Ok
}

unsafe extern "C" fn delete(_this: *const KvStoreApi, key: *const Key) -> KvStatus {
    let _busy = lifecycle().hold();
    let Some(key) = key_text(key) else {
        return KvStatus::InvalidArgument;
    };

    match STORE.enter().remove(key) {
        Some(_) => {
            tracing::debug!(key, "entry deleted");
            KvStatus::Ok
        }
        None => KvStatus::NotFound,
    }
}

export_component! {
    version: (VERSION.0, VERSION.1, VERSION.2, DESCRIPTION),
    interface: KvStoreApi = KvStoreApi {
        create,
        set_value,
        get_value,
        delete,
    },
}
