//! Interface records shared by nanocom hosts and component modules.
//!
//! Host and module compile against the same record types, which is how they
//! agree on the factory's return type. Each record is `#[repr(C)]` and its
//! functions take the record itself as their first argument.

pub mod component_a;
pub mod kv_store;

pub use component_a::{ComponentA, ComponentAApi, ConnectionString, COMPONENT_A_MODULE};
pub use kv_store::{Key, KvError, KvStatus, KvStore, KvStoreApi, COMPONENT_B_MODULE};
