//! SDK surface for writing Hearth integration plugins: re-exports the
//! [`hearth_core::plugin::IntegrationPlugin`] trait plugin authors
//! implement, plus ergonomic helpers for building catalog data and talking
//! back to the hub.
//!
//! Grounded on the teacher's `plugin_api/src/api.rs`, which exposed
//! `log_info`/`create_property`/`update_property` methods on a `PluginHandle<T>`
//! wrapper over the raw FFI surface; here the same convenience methods are
//! exposed on [`hearth_core::plugin::PluginContext`] directly, since plugins
//! are safe trait objects rather than dlopen2-loaded libraries.

pub mod builders;

pub use async_trait::async_trait;
pub use hearth_core::browser::BrowserItem;
pub use hearth_core::error::ThingError;
pub use hearth_core::ids::*;
pub use hearth_core::info::*;
pub use hearth_core::plugin::{IntegrationPlugin, PluginContext};
pub use hearth_core::thing::Thing;
pub use hearth_core::types::*;
pub use hearth_core::value::{Value, ValueType};

/// Convenience logging methods on [`PluginContext`], mirroring the
/// teacher's `log_info`/`log_error` plugin-handle methods.
pub trait PluginContextExt {
    fn log_info(&self, message: impl std::fmt::Display);
    fn log_error(&self, message: impl std::fmt::Display);
}

impl PluginContextExt for PluginContext {
    fn log_info(&self, message: impl std::fmt::Display) {
        log::info!("[plugin {}] {message}", self.plugin_id());
    }

    fn log_error(&self, message: impl std::fmt::Display) {
        log::error!("[plugin {}] {message}", self.plugin_id());
    }
}
