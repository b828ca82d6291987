//! Browser and Player implementations backed by an exec plugin process.

use super::host::{ExecHostError, ExecPluginHost};
use super::protocol::{CapabilityDescriptor, PluginMethod, PluginResult};
use crate::context::PluginContext;
use melo_core::{Browser, BrowserInfo, Player, PlayerInfo, PlaylistEntry, Request};
use std::sync::Arc;

/// Browser whose requests are answered by the plugin process.
pub struct ExecBrowser {
    host: Arc<ExecPluginHost>,
    id: String,
    info: BrowserInfo,
}

impl ExecBrowser {
    pub fn new(host: Arc<ExecPluginHost>, descriptor: &CapabilityDescriptor) -> Self {
        Self {
            host,
            id: descriptor.id.clone(),
            info: BrowserInfo::new(&descriptor.name, &descriptor.description),
        }
    }
}

impl Browser for ExecBrowser {
    fn info(&self) -> &BrowserInfo {
        &self.info
    }

    fn handle_request(&self, request: Arc<Request>) -> bool {
        let Ok(payload) = std::str::from_utf8(request.message()).map(str::to_owned) else {
            tracing::warn!(browser_id = %self.id, "exec browsers only accept UTF-8 payloads");
            return false;
        };
        if !self.host.is_running() {
            tracing::warn!(browser_id = %self.id, "exec plugin is not running");
            return false;
        }

        let host = Arc::clone(&self.host);
        let browser_id = self.id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("melo-exec-{browser_id}"))
            .spawn(move || {
                let method = PluginMethod::HandleRequest {
                    browser_id: browser_id.clone(),
                    payload,
                };
                match host.send_request(method) {
                    Ok(PluginResult::Response { payload }) => {
                        if let Err(err) = request.complete(payload) {
                            tracing::error!(browser_id = %browser_id, error = %err, "completion failed");
                        }
                    }
                    Ok(other) => {
                        tracing::error!(browser_id = %browser_id, ?other, "unexpected reply to request");
                    }
                    Err(err) => {
                        tracing::error!(browser_id = %browser_id, error = %err, "exec request failed");
                    }
                }
            });
        match spawned {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(browser_id = %self.id, error = %err, "failed to spawn request thread");
                false
            }
        }
    }
}

/// Player whose control calls are forwarded synchronously to the plugin process.
pub struct ExecPlayer {
    host: Arc<ExecPluginHost>,
    id: String,
    info: PlayerInfo,
}

impl ExecPlayer {
    pub fn new(host: Arc<ExecPluginHost>, descriptor: &CapabilityDescriptor) -> Self {
        Self {
            host,
            id: descriptor.id.clone(),
            info: PlayerInfo::new(&descriptor.name, &descriptor.description),
        }
    }

    fn control(&self, method: PluginMethod) -> bool {
        match self.host.send_request(method) {
            Ok(PluginResult::Ack { ok }) => ok,
            Ok(other) => {
                tracing::error!(player_id = %self.id, ?other, "unexpected reply to control call");
                false
            }
            Err(err) => {
                tracing::error!(player_id = %self.id, error = %err, "exec control call failed");
                false
            }
        }
    }
}

impl Player for ExecPlayer {
    fn info(&self) -> &PlayerInfo {
        &self.info
    }

    fn play(&self, entry: &PlaylistEntry) -> bool {
        self.control(PluginMethod::Play {
            player_id: self.id.clone(),
            media: entry.current().clone(),
            list: entry.items().to_vec(),
            current: entry.current_index(),
        })
    }

    fn pause(&self) -> bool {
        self.control(PluginMethod::Pause {
            player_id: self.id.clone(),
        })
    }

    fn reset(&self) -> bool {
        self.control(PluginMethod::Reset {
            player_id: self.id.clone(),
        })
    }
}

/// Start the plugin process and stage every capability it announces.
///
/// Returns the running host; the caller keeps it to stop the process on unload.
pub(crate) fn activate(
    host: ExecPluginHost,
    ctx: &mut PluginContext<'_>,
) -> Result<Arc<ExecPluginHost>, ExecHostError> {
    let info = host.start()?;
    let host = Arc::new(host);

    let mut accepted = true;
    for descriptor in &info.browsers {
        accepted &= ctx.add_browser(&descriptor.id, ExecBrowser::new(Arc::clone(&host), descriptor));
    }
    for descriptor in &info.players {
        accepted &= ctx.add_player(&descriptor.id, ExecPlayer::new(Arc::clone(&host), descriptor));
    }

    if !accepted {
        host.stop();
        return Err(ExecHostError::PluginError(format!(
            "plugin '{}' announced an id that could not be registered",
            info.name
        )));
    }
    Ok(host)
}
