//! Component A: a constant and a connection string.

use nanocom_core::{BoundedText, Component};

/// Module id of the component A library.
pub const COMPONENT_A_MODULE: &str = "nanocom_component_a";

pub type ConnectionString = BoundedText<1024>;

#[repr(C)]
pub struct ComponentAApi {
    pub get42: unsafe extern "C" fn(this: *const ComponentAApi) -> i32,
    pub connection_string: unsafe extern "C" fn(this: *const ComponentAApi) -> ConnectionString,
}

impl ComponentAApi {
    pub fn get42(&self) -> i32 {
        // SAFETY: the record comes from a module built against this crate.
        unsafe { (self.get42)(self) }
    }

    pub fn connection_string(&self) -> ConnectionString {
        unsafe { (self.connection_string)(self) }
    }
}

pub struct ComponentA;

impl Component for ComponentA {
    const NAME: &'static str = "component-a";
    type Interface = ComponentAApi;
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn fixed(_this: *const ComponentAApi) -> i32 {
        42
    }

    unsafe extern "C" fn dsn(_this: *const ComponentAApi) -> ConnectionString {
        ConnectionString::new("DSN=test")
    }

    #[test]
    fn test_wrappers_call_through_record() {
        let api = ComponentAApi {
            get42: fixed,
            connection_string: dsn,
        };
        assert_eq!(api.get42(), 42);
        assert_eq!(api.connection_string().as_str(), "DSN=test");
    }

    #[test]
    fn test_connection_string_capacity() {
        assert_eq!(ConnectionString::CAPACITY, 1024);
        assert_eq!(std::mem::size_of::<ConnectionString>(), 1024);
    }
}
