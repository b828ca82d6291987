use crate::playlist::PlaylistEntry;
use serde::{Deserialize, Serialize};

/// Static description of a player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub description: String,
}

impl PlayerInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Media playback backend.
///
/// Players are referenced by [`crate::Media::player_id`] and driven by the
/// [`crate::Playlist`]. Control calls return an immediate status; they do not
/// use the request protocol. The playlist is unlocked while they run, so a
/// player may call back into it (skip to the next media from `play`, say).
/// Keep the playlist as a `Weak` reference: the playlist reaches players
/// through the registry.
pub trait Player: Send + Sync {
    /// Constant description of the player; must not change at runtime.
    fn info(&self) -> &PlayerInfo;

    /// Start playing the current media of `entry`.
    fn play(&self, entry: &PlaylistEntry) -> bool;

    /// Pause playback. Players without pause support keep the default.
    fn pause(&self) -> bool {
        false
    }

    /// Stop playback and drop whatever the player was holding.
    fn reset(&self) -> bool;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn description(&self) -> &str {
        &self.info().description
    }
}
