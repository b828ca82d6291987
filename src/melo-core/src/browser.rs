use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Static description of a browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: String,
    pub description: String,
}

impl BrowserInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Source of browsable media (file system, library, remote service...).
///
/// Implementations are registered in the browser registry under a unique id
/// and answer requests through the [`Request`] protocol.
pub trait Browser: Send + Sync {
    /// Constant description of the browser; must not change at runtime.
    fn info(&self) -> &BrowserInfo;

    /// Accept `request` for processing.
    ///
    /// The return value only says whether the request was accepted. The
    /// response goes through [`Request::complete`], either before returning
    /// or later from any thread. A browser returning `false` must never
    /// complete the request: it belongs to the caller again.
    fn handle_request(&self, request: Arc<Request>) -> bool;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn description(&self) -> &str {
        &self.info().description
    }
}
