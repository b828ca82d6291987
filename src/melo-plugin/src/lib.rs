//! Plugin support for the Melo media service.
//!
//! A plugin is a directory holding a `manifest.toml`:
//!
//! ```toml
//! name = "file"
//! version = "1.0.0"
//!
//! [melo]
//! version = "1.0.0"
//!
//! [native]
//! filename = "libmelo_file_plugin.so"
//! entry_point = "entry_point"
//! ```
//!
//! `[native]` plugins are shared libraries exporting an [`EntryPoint`].
//! `[exec]` plugins (`executable`, `args`) are external processes speaking the
//! JSON protocol in [`exec::protocol`]; their browsers and players are
//! proxied by [`ExecBrowser`] and [`ExecPlayer`].
//!
//! Activation is atomic: the entry point only stages registrations in a
//! [`PluginContext`], and the [`PluginLoader`] commits them to the core
//! registries once it returned `true`.

mod context;
pub mod exec;
mod loader;
mod manifest;
mod native;

pub use context::{CapabilityKind, PluginContext, Registration};
pub use exec::{ExecBrowser, ExecHostError, ExecPlayer};
pub use loader::{EntryPoint, LoadError, Plugin, PluginKind, PluginLoader};
pub use manifest::{Manifest, ManifestError, ModuleSpec, DEFAULT_ENTRY_POINT, MANIFEST_FILE};
