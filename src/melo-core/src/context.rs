use crate::browser::Browser;
use crate::player::Player;
use crate::playlist::Playlist;
use crate::registry::Registry;
use crate::request::Request;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

pub type BrowserRegistry = Registry<dyn Browser>;
pub type PlayerRegistry = Registry<dyn Player>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("browser '{id}' is not registered")]
    NotFound { id: String },
    #[error("browser '{id}' rejected the request")]
    Rejected { id: String },
    #[error("browser '{id}' panicked while handling the request")]
    ProviderPanicked { id: String },
}

/// Process-scoped state of the media service.
///
/// Owns the browser and player registries and the playlist. Build one at
/// startup, hand references to whatever needs it (plugin loader, front-ends)
/// and call [`Core::shutdown`] before exiting. Tests create a fresh one each.
pub struct Core {
    browsers: Arc<BrowserRegistry>,
    players: Arc<PlayerRegistry>,
    playlist: Arc<Playlist>,
}

impl Core {
    pub fn new() -> Self {
        let players = Arc::new(PlayerRegistry::new("player"));
        Self {
            browsers: Arc::new(BrowserRegistry::new("browser")),
            playlist: Arc::new(Playlist::new(Arc::clone(&players))),
            players,
        }
    }

    pub fn browsers(&self) -> &Arc<BrowserRegistry> {
        &self.browsers
    }

    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    /// The shared playlist; players that drive it should hold it through
    /// [`Arc::downgrade`].
    pub fn playlist(&self) -> &Arc<Playlist> {
        &self.playlist
    }

    /// Hand `request` to browser `browser_id`.
    ///
    /// On `Rejected` the request is still pending and back in the caller's
    /// hands. A panic inside the browser is contained here and reported as
    /// `ProviderPanicked`; the request is left as the browser left it.
    pub fn dispatch(&self, browser_id: &str, request: Arc<Request>) -> Result<(), DispatchError> {
        let browser = self
            .browsers
            .get_by_id(browser_id)
            .ok_or_else(|| DispatchError::NotFound {
                id: browser_id.to_owned(),
            })?;

        let request_id = request.id();
        match catch_unwind(AssertUnwindSafe(|| browser.handle_request(request))) {
            Ok(true) => {
                tracing::debug!(browser_id, request = request_id, "request accepted");
                Ok(())
            }
            Ok(false) => {
                tracing::debug!(browser_id, request = request_id, "request rejected");
                Err(DispatchError::Rejected {
                    id: browser_id.to_owned(),
                })
            }
            Err(_) => {
                tracing::error!(browser_id, request = request_id, "browser panicked");
                Err(DispatchError::ProviderPanicked {
                    id: browser_id.to_owned(),
                })
            }
        }
    }

    /// Stop playback and drop the playlist. Registries are left to their owners.
    pub fn shutdown(&self) {
        self.playlist.clear();
        tracing::info!(
            browsers = self.browsers.len(),
            players = self.players.len(),
            "core shut down"
        );
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
