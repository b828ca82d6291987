use melo_core::{Player, PlayerInfo, Playlist, PlaylistEntry};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing(PathBuf),
    Paused(PathBuf),
}

/// Player for `file://` media.
///
/// Tracks the transport state of the selected file; decoding is left to
/// whatever output the host wires behind it. When attached to a playlist,
/// files that have disappeared are skipped.
pub struct FilePlayer {
    info: PlayerInfo,
    state: Mutex<PlaybackState>,
    playlist: Weak<Playlist>,
}

impl FilePlayer {
    pub fn new() -> Self {
        Self {
            info: PlayerInfo::new("File player", "Plays local files"),
            state: Mutex::new(PlaybackState::Stopped),
            playlist: Weak::new(),
        }
    }

    pub fn with_playlist(playlist: &Arc<Playlist>) -> Self {
        Self {
            playlist: Arc::downgrade(playlist),
            ..Self::new()
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: PlaybackState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn skip(&self) -> bool {
        self.playlist
            .upgrade()
            .is_some_and(|playlist| playlist.next(false).is_ok())
    }
}

impl Default for FilePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for FilePlayer {
    fn info(&self) -> &PlayerInfo {
        &self.info
    }

    fn play(&self, entry: &PlaylistEntry) -> bool {
        let uri = entry.current().uri();
        let Some(path) = uri.strip_prefix("file://").map(PathBuf::from) else {
            tracing::warn!(uri, "file player only handles file:// media");
            return false;
        };
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "media file not found, skipping");
            return self.skip();
        }

        // Resuming the paused file keeps its position.
        let resumed = matches!(self.state(), PlaybackState::Paused(ref paused) if *paused == path);
        tracing::info!(path = %path.display(), resumed, "playing");
        self.set_state(PlaybackState::Playing(path));
        true
    }

    fn pause(&self) -> bool {
        match self.state() {
            PlaybackState::Playing(path) => {
                self.set_state(PlaybackState::Paused(path));
                true
            }
            _ => false,
        }
    }

    fn reset(&self) -> bool {
        self.set_state(PlaybackState::Stopped);
        true
    }
}
