//! Component A module.
//!
//! Exports the [`ComponentAApi`] record: `get42` and a connection string.
//! Each method serialises on its own call-site lock and holds the module's
//! lifecycle counter while it runs.

use nanocom_core::{call_site_lock, export_component};
use nanocom_interfaces::{ComponentAApi, ConnectionString};

pub const VERSION: (u32, u32, u32) = (1, 0, 0);
pub const DESCRIPTION: &str = "alpha test component";
pub const CONNECTION_STRING: &str = "Server=localhost;Database=nanocom;Application=component-a";

unsafe extern "C" fn get42(_this: *const ComponentAApi) -> i32 {
    let _busy = lifecycle().hold();
    let _guard = call_site_lock!();
    42
}

unsafe extern "C" fn connection_string(_this: *const ComponentAApi) -> ConnectionString {
    let _busy = lifecycle().hold();
    let guard = call_site_lock!();
    tracing::trace!(cycle = guard.cycle(), "connection string requested");
    ConnectionString::new(CONNECTION_STRING)
}

export_component! {
    version: (VERSION.0, VERSION.1, VERSION.2, DESCRIPTION),
    interface: ComponentAApi = ComponentAApi {
        get42,
        connection_string,
    },
}
