//! Newline-delimited JSON protocol spoken with exec plugins.
//!
//! The host writes one [`PluginRequest`] per line to the plugin's stdin and
//! reads exactly one [`PluginResponse`] line back from its stdout.

use melo_core::Media;
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Unique request ID for correlation.
    pub id: u64,
    pub method: PluginMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this response correlates to.
    pub id: u64,
    pub result: PluginResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum PluginMethod {
    /// Handshake; the plugin answers with what it provides.
    Initialize,
    /// Forward a browser request payload.
    HandleRequest { browser_id: String, payload: String },
    /// Play `media` out of `list` (a single-item list for plain media).
    Play {
        player_id: String,
        media: Media,
        list: Vec<Media>,
        current: Option<usize>,
    },
    Pause { player_id: String },
    Reset { player_id: String },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum PluginResult {
    Initialized(PluginInfo),
    /// Completion payload for `HandleRequest`.
    Response { payload: String },
    /// Immediate status for player control.
    Ack { ok: bool },
    ShutdownAck,
    Error(PluginError),
}

/// Plugin initialization info returned after Initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: u32,
    #[serde(default)]
    pub browsers: Vec<CapabilityDescriptor>,
    #[serde(default)]
    pub players: Vec<CapabilityDescriptor>,
}

/// One browser or player offered by an exec plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginError {
    pub message: String,
}
