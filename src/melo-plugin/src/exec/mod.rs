//! Out-of-process plugins driven over stdio.

mod adapter;
mod host;
pub mod protocol;

pub(crate) use adapter::activate;
pub use adapter::{ExecBrowser, ExecPlayer};
pub use host::{ExecConfig, ExecHostError, ExecPluginHost};
