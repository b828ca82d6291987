//! Global playback order shared by all players.
//!
//! The playlist is a list of entries. An entry is either a single media or a
//! parent media (an album, a directory...) with its own list of media. One
//! entry is current at a time and exactly one player, the one owning that
//! entry, is active. The playlist lock is never held across a player call.

use crate::media::Media;
use crate::player::Player;
use crate::registry::Registry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("player '{player_id}' is not available")]
    PlayerUnavailable { player_id: String },
    #[error("list mixes media from other players than '{player_id}'")]
    MixedPlayers { player_id: String },
    #[error("invalid playlist index {index} (length {len})")]
    InvalidIndex { index: usize, len: usize },
    #[error("invalid media index {index} (length {len})")]
    InvalidMediaIndex { index: usize, len: usize },
    #[error("no player available for the remaining entries")]
    NoPlayer,
    #[error("player '{player_id}' refused to play")]
    PlayerRefused { player_id: String },
    #[error("nothing is playing")]
    NotPlaying,
    #[error("no more media in that direction")]
    EndOfPlaylist,
}

/// One element of the playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    media: Media,
    list: Vec<Media>,
    current: Option<usize>,
}

impl PlaylistEntry {
    fn new(media: Media, list: Vec<Media>) -> Self {
        Self {
            media,
            list,
            current: None,
        }
    }

    /// The entry itself, or the parent when it holds a list.
    pub fn media(&self) -> &Media {
        &self.media
    }

    pub fn player_id(&self) -> &str {
        self.media.player_id()
    }

    pub fn uri(&self) -> &str {
        self.media.uri()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn items(&self) -> &[Media] {
        &self.list
    }

    pub fn get(&self, index: usize) -> Option<&Media> {
        self.list.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Media to hand to the player: the selected list item, else the entry itself.
    pub fn current(&self) -> &Media {
        self.current
            .and_then(|idx| self.list.get(idx))
            .unwrap_or(&self.media)
    }
}

/// The player driving the current entry, with the id it was resolved under.
#[derive(Clone)]
struct ActivePlayer {
    id: String,
    player: Arc<dyn Player>,
}

#[derive(Default)]
struct State {
    entries: Vec<PlaylistEntry>,
    current: usize,
    active: Option<ActivePlayer>,
}

impl State {
    fn check_index(&self, index: usize) -> Result<(), PlaylistError> {
        if index >= self.entries.len() {
            return Err(PlaylistError::InvalidIndex {
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }
}

/// Player calls decided under the lock, run after it is released.
#[must_use]
struct Transition {
    reset: Option<Arc<dyn Player>>,
    play: Option<(ActivePlayer, PlaylistEntry)>,
}

impl Transition {
    fn stop(previous: Option<ActivePlayer>) -> Self {
        Self {
            reset: previous.map(|active| active.player),
            play: None,
        }
    }

    fn run(self) -> Result<(), PlaylistError> {
        if let Some(player) = self.reset {
            player.reset();
        }
        let Some((active, entry)) = self.play else {
            return Ok(());
        };
        tracing::debug!(
            player_id = %active.id,
            uri = entry.current().uri(),
            "playing"
        );
        if active.player.play(&entry) {
            Ok(())
        } else {
            Err(PlaylistError::PlayerRefused {
                player_id: active.id,
            })
        }
    }
}

/// The playlist of a [`crate::Core`].
///
/// Every mutation goes through these methods and is serialized by one lock.
/// Players are resolved through the player registry given at construction and
/// are always called with the lock released, so a player may drive the
/// playlist from inside `play`, for instance to skip media it cannot handle.
pub struct Playlist {
    players: Arc<Registry<dyn Player>>,
    state: Mutex<State>,
}

impl Playlist {
    pub fn new(players: Arc<Registry<dyn Player>>) -> Self {
        Self {
            players,
            state: Mutex::new(State::default()),
        }
    }

    /// Append a single media.
    pub fn add(&self, media: Media) -> Result<(), PlaylistError> {
        let mut state = self.lock();
        self.push(&mut state, media, Vec::new())
    }

    /// Append a parent media with its list. All items must use the parent's player.
    pub fn add_list(&self, parent: Media, list: Vec<Media>) -> Result<(), PlaylistError> {
        let mut state = self.lock();
        self.push(&mut state, parent, list)
    }

    /// Append `media` and play it immediately.
    pub fn play_media(&self, media: Media) -> Result<(), PlaylistError> {
        self.push_and_play(media, Vec::new())
    }

    /// Append `parent` with its list and play the first item.
    pub fn play_list(&self, parent: Media, list: Vec<Media>) -> Result<(), PlaylistError> {
        self.push_and_play(parent, list)
    }

    /// Play entry `index`, at `media_index` in its list or from the start.
    ///
    /// Entries whose player has gone away are skipped forward.
    pub fn play_index(&self, index: usize, media_index: Option<usize>) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            self.select(&mut state, index, media_index)?
        };
        transition.run()
    }

    /// Play the current selection again, resuming the active player if any.
    pub fn play(&self) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            if state.entries.is_empty() {
                return Err(PlaylistError::NotPlaying);
            }
            let index = state.current;
            match state.active.clone() {
                Some(active) => Transition {
                    reset: None,
                    play: Some((active, state.entries[index].clone())),
                },
                None => {
                    let media_index = state.entries[index].current;
                    self.select(&mut state, index, media_index)?
                }
            }
        };
        transition.run()
    }

    pub fn pause(&self) -> Result<(), PlaylistError> {
        let active = self.lock().active.clone().ok_or(PlaylistError::NotPlaying)?;
        if active.player.pause() {
            Ok(())
        } else {
            Err(PlaylistError::PlayerRefused {
                player_id: active.id,
            })
        }
    }

    /// Move to the next media, or to the next entry when `parent` is set or
    /// the current list is exhausted.
    pub fn next(&self, parent: bool) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            if state.current >= state.entries.len() {
                return Err(PlaylistError::NotPlaying);
            }

            let current = state.current;
            let entry = &state.entries[current];
            let within = entry
                .current
                .filter(|idx| !parent && idx + 1 < entry.len())
                .map(|idx| idx + 1);
            if let Some(media_index) = within {
                self.select(&mut state, current, Some(media_index))?
            } else if current + 1 < state.entries.len() {
                self.select(&mut state, current + 1, None)?
            } else {
                return Err(PlaylistError::EndOfPlaylist);
            }
        };
        transition.run()
    }

    /// Move to the previous media, or to the previous entry when `parent` is
    /// set or the current list is at its start. Entering a list from the end
    /// selects its last media.
    pub fn previous(&self, parent: bool) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            if state.current >= state.entries.len() {
                return Err(PlaylistError::NotPlaying);
            }

            let current = state.current;
            let within = state.entries[current]
                .current
                .filter(|idx| !parent && *idx > 0)
                .map(|idx| idx - 1);
            if let Some(media_index) = within {
                self.select(&mut state, current, Some(media_index))?
            } else if current == 0 {
                return Err(PlaylistError::EndOfPlaylist);
            } else {
                let media_index = state.entries[current - 1].len().checked_sub(1);
                self.select(&mut state, current - 1, media_index)?
            }
        };
        transition.run()
    }

    /// Swap two entries.
    pub fn swap(&self, source: usize, destination: usize) -> Result<(), PlaylistError> {
        let mut state = self.lock();
        state.check_index(source)?;
        state.check_index(destination)?;

        state.entries.swap(source, destination);
        if state.current == source {
            state.current = destination;
        } else if state.current == destination {
            state.current = source;
        }
        Ok(())
    }

    /// Swap two media inside the list of entry `index`.
    pub fn swap_media(
        &self,
        index: usize,
        source: usize,
        destination: usize,
    ) -> Result<(), PlaylistError> {
        let mut state = self.lock();
        state.check_index(index)?;

        let entry = &mut state.entries[index];
        let len = entry.len();
        for media_index in [source, destination] {
            if media_index >= len {
                return Err(PlaylistError::InvalidMediaIndex {
                    index: media_index,
                    len,
                });
            }
        }

        entry.list.swap(source, destination);
        if entry.current == Some(source) {
            entry.current = Some(destination);
        } else if entry.current == Some(destination) {
            entry.current = Some(source);
        }
        Ok(())
    }

    /// Remove entry `index`; removing the playing entry resets its player.
    pub fn remove(&self, index: usize) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            state.check_index(index)?;

            let previous = if state.current == index {
                state.active.take()
            } else {
                None
            };
            state.entries.remove(index);

            if index == state.current {
                state.current = 0;
            } else if index < state.current {
                state.current -= 1;
            }
            Transition::stop(previous)
        };
        transition.run()
    }

    /// Remove one media from the list of entry `index`.
    pub fn remove_media(&self, index: usize, media_index: usize) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            state.check_index(index)?;

            let len = state.entries[index].len();
            if media_index >= len {
                return Err(PlaylistError::InvalidMediaIndex {
                    index: media_index,
                    len,
                });
            }

            let mut previous = None;
            match state.entries[index].current {
                Some(current) if current == media_index => {
                    if state.current == index {
                        previous = state.active.take();
                    }
                    state.entries[index].current = None;
                }
                Some(current) if media_index < current => {
                    state.entries[index].current = Some(current - 1);
                }
                _ => {}
            }

            let entry = &mut state.entries[index];
            entry.list.remove(media_index);
            if entry.list.is_empty() {
                entry.current = None;
            }
            Transition::stop(previous)
        };
        transition.run()
    }

    /// Drop every entry and reset the active player.
    pub fn clear(&self) {
        let transition = {
            let mut state = self.lock();
            state.current = 0;
            state.entries.clear();
            Transition::stop(state.active.take())
        };
        // Resetting never fails the transition.
        let _ = transition.run();
    }

    /// Stop using player `player_id`, resetting it if it is the active one.
    ///
    /// Called before a player is unregistered so the playlist does not keep
    /// driving it. Returns `true` if the player was active.
    pub fn release_player(&self, player_id: &str) -> bool {
        let previous = {
            let mut state = self.lock();
            let is_active = state
                .active
                .as_ref()
                .is_some_and(|active| active.id == player_id);
            if is_active {
                state.active.take()
            } else {
                None
            }
        };
        let released = previous.is_some();
        if released {
            tracing::info!(player_id, "active player released");
        }
        let _ = Transition::stop(previous).run();
        released
    }

    /// Id of the player driving the current entry, if any.
    pub fn active_player(&self) -> Option<String> {
        self.lock().active.as_ref().map(|active| active.id.clone())
    }

    pub fn entry(&self, index: usize) -> Option<PlaylistEntry> {
        self.lock().entries.get(index).cloned()
    }

    pub fn current_entry(&self) -> Option<PlaylistEntry> {
        let state = self.lock();
        state.entries.get(state.current).cloned()
    }

    pub fn current_index(&self) -> Option<usize> {
        let state = self.lock();
        (state.current < state.entries.len()).then_some(state.current)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn push_and_play(&self, media: Media, list: Vec<Media>) -> Result<(), PlaylistError> {
        let transition = {
            let mut state = self.lock();
            self.push(&mut state, media, list)?;
            let last = state.entries.len() - 1;
            self.select(&mut state, last, None)?
        };
        transition.run()
    }

    fn push(&self, state: &mut State, media: Media, list: Vec<Media>) -> Result<(), PlaylistError> {
        let player_id = media.player_id();
        if !self.players.has(player_id) {
            tracing::error!(player_id, "player is not available");
            return Err(PlaylistError::PlayerUnavailable {
                player_id: player_id.to_owned(),
            });
        }
        if list.iter().any(|item| item.player_id() != player_id) {
            tracing::error!(player_id, "mixed player ids in list");
            return Err(PlaylistError::MixedPlayers {
                player_id: player_id.to_owned(),
            });
        }

        state.entries.push(PlaylistEntry::new(media, list));
        Ok(())
    }

    /// Make entry `index` current and return the player calls to perform.
    fn select(
        &self,
        state: &mut State,
        index: usize,
        media_index: Option<usize>,
    ) -> Result<Transition, PlaylistError> {
        state.check_index(index)?;

        let found = (index..state.entries.len()).find_map(|idx| {
            let id = state.entries[idx].player_id();
            self.players.get_by_id(id).map(|player| {
                (
                    idx,
                    ActivePlayer {
                        id: id.to_owned(),
                        player,
                    },
                )
            })
        });
        let Some((found_index, next)) = found else {
            tracing::warn!(index, "no player available from this entry onwards");
            return Err(PlaylistError::NoPlayer);
        };
        // A skipped entry invalidates the requested position.
        let media_index = if found_index == index { media_index } else { None };

        let entry = &mut state.entries[found_index];
        entry.current = match media_index {
            Some(idx) if idx >= entry.len() => {
                return Err(PlaylistError::InvalidMediaIndex {
                    index: idx,
                    len: entry.len(),
                });
            }
            Some(idx) => Some(idx),
            None if entry.is_empty() => None,
            None => Some(0),
        };
        let snapshot = entry.clone();

        state.current = found_index;
        let previous = state.active.replace(next.clone());
        Ok(Transition {
            reset: previous.map(|active| active.player),
            play: Some((next, snapshot)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerInfo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Weak;

    #[derive(Default)]
    struct TestPlayer {
        info: PlayerInfo,
        uri: Mutex<Option<String>>,
        active: AtomicBool,
        paused: AtomicBool,
    }

    impl TestPlayer {
        fn uri(&self) -> Option<String> {
            self.uri.lock().unwrap().clone()
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    impl Player for TestPlayer {
        fn info(&self) -> &PlayerInfo {
            &self.info
        }

        fn play(&self, entry: &PlaylistEntry) -> bool {
            *self.uri.lock().unwrap() = Some(entry.current().uri().to_owned());
            self.active.store(true, Ordering::SeqCst);
            self.paused.store(false, Ordering::SeqCst);
            true
        }

        fn pause(&self) -> bool {
            self.paused.store(true, Ordering::SeqCst);
            true
        }

        fn reset(&self) -> bool {
            self.active.store(false, Ordering::SeqCst);
            true
        }
    }

    /// Skips media it cannot play by moving the playlist forward itself.
    #[derive(Default)]
    struct SkippingPlayer {
        info: PlayerInfo,
        playlist: Mutex<Weak<Playlist>>,
        played: Mutex<Vec<String>>,
    }

    impl Player for SkippingPlayer {
        fn info(&self) -> &PlayerInfo {
            &self.info
        }

        fn play(&self, entry: &PlaylistEntry) -> bool {
            let uri = entry.current().uri();
            if uri == "broken" {
                let playlist = self.playlist.lock().unwrap().upgrade();
                return playlist.is_some_and(|playlist| playlist.next(false).is_ok());
            }
            self.played.lock().unwrap().push(uri.to_owned());
            true
        }

        fn reset(&self) -> bool {
            true
        }
    }

    fn setup(ids: &[&str]) -> (Playlist, Vec<Arc<TestPlayer>>) {
        let registry: Arc<Registry<dyn Player>> = Arc::new(Registry::new("player"));
        let players = ids
            .iter()
            .map(|id| {
                let player = Arc::new(TestPlayer::default());
                assert!(registry.add(id, player.clone()));
                player
            })
            .collect();
        (Playlist::new(registry), players)
    }

    fn media(player_id: &str, uri: &str) -> Media {
        Media::new(player_id, uri)
    }

    #[test]
    fn add_and_remove_entries() {
        let (playlist, _players) = setup(&["test.player", "test.another.player"]);

        playlist.add(media("test.player", "protocol://an_uri")).unwrap();
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.entry(0).unwrap().uri(), "protocol://an_uri");
        assert!(playlist.entry(1).is_none());

        let list = vec![
            media("test.player", "protocol://another_uri"),
            media("test.player", "protocol://a_second_uri"),
            media("test.player", "protocol://a_third_uri"),
        ];
        playlist
            .add_list(media("test.player", "protocol://a_list_uri"), list)
            .unwrap();
        playlist
            .add_list(media("test.player", "protocol://a_list_uri"), Vec::new())
            .unwrap();
        assert_eq!(playlist.len(), 3);

        let entry = playlist.entry(1).unwrap();
        assert_eq!(entry.uri(), "protocol://a_list_uri");
        assert_eq!(entry.len(), 3);
        assert_eq!(entry.get(2).unwrap().uri(), "protocol://a_third_uri");
        assert!(playlist.entry(2).unwrap().is_empty());

        assert_eq!(
            playlist.add(media("test.invalid.player", "protocol://an_uri")),
            Err(PlaylistError::PlayerUnavailable {
                player_id: "test.invalid.player".into()
            })
        );
        let mixed = vec![
            media("test.player", "protocol://another_uri"),
            media("test.another.player", "protocol://a_second_uri"),
        ];
        assert!(matches!(
            playlist.add_list(media("test.player", "protocol://a_list_uri"), mixed),
            Err(PlaylistError::MixedPlayers { .. })
        ));
        assert_eq!(playlist.len(), 3);

        playlist.remove(0).unwrap();
        assert_eq!(playlist.len(), 2);
        assert_eq!(playlist.entry(0).unwrap().len(), 3);

        playlist.remove_media(0, 1).unwrap();
        let entry = playlist.entry(0).unwrap();
        let uris: Vec<_> = entry.items().iter().map(Media::uri).collect();
        assert_eq!(uris, ["protocol://another_uri", "protocol://a_third_uri"]);

        assert!(matches!(
            playlist.remove(5),
            Err(PlaylistError::InvalidIndex { index: 5, len: 2 })
        ));

        playlist.clear();
        assert!(playlist.is_empty());
    }

    #[test]
    fn play_media_then_add_keeps_playing() {
        let (playlist, players) = setup(&["test.player"]);
        let player = &players[0];

        playlist.play_media(media("test.player", "protocol://an_uri")).unwrap();
        assert_eq!(player.uri().as_deref(), Some("protocol://an_uri"));

        playlist
            .add_list(
                media("test.player", "protocol://an_uri"),
                vec![media("test.player", "protocol://another_uri")],
            )
            .unwrap();
        assert_eq!(player.uri().as_deref(), Some("protocol://an_uri"));
        assert_eq!(playlist.current_index(), Some(0));
    }

    #[test]
    fn previous_and_next_walk_entries_and_lists() {
        let (playlist, players) = setup(&["test.player.a", "test.player.b"]);
        let (a, b) = (players[0].as_ref(), players[1].as_ref());

        playlist.play_media(media("test.player.a", "a")).unwrap();
        playlist
            .add_list(
                media("test.player.b", "b"),
                vec![
                    media("test.player.b", "b0"),
                    media("test.player.b", "b1"),
                    media("test.player.b", "b2"),
                ],
            )
            .unwrap();
        playlist.add(media("test.player.a", "c")).unwrap();

        let expect = |player: &TestPlayer, other: &TestPlayer, uri: &str| {
            assert_eq!(player.uri().as_deref(), Some(uri));
            assert!(player.is_active());
            assert!(!other.is_active());
        };

        expect(a, b, "a");
        for uri in ["b0", "b1", "b2"] {
            playlist.next(false).unwrap();
            expect(b, a, uri);
        }
        playlist.next(false).unwrap();
        expect(a, b, "c");
        assert_eq!(playlist.next(false), Err(PlaylistError::EndOfPlaylist));

        for uri in ["b2", "b1", "b0"] {
            playlist.previous(false).unwrap();
            expect(b, a, uri);
        }
        playlist.previous(false).unwrap();
        expect(a, b, "a");
        assert_eq!(playlist.previous(false), Err(PlaylistError::EndOfPlaylist));

        playlist.next(true).unwrap();
        expect(b, a, "b0");
        playlist.next(true).unwrap();
        expect(a, b, "c");
        assert_eq!(playlist.next(true), Err(PlaylistError::EndOfPlaylist));
        playlist.previous(true).unwrap();
        expect(b, a, "b2");
        playlist.previous(true).unwrap();
        expect(a, b, "a");

        playlist.play_index(1, Some(1)).unwrap();
        expect(b, a, "b1");
        playlist.previous(false).unwrap();
        expect(b, a, "b0");
        playlist.next(true).unwrap();
        expect(a, b, "c");
    }

    #[test]
    fn play_skips_entries_without_player() {
        let registry: Arc<Registry<dyn Player>> = Arc::new(Registry::new("player"));
        let gone = Arc::new(TestPlayer::default());
        let kept = Arc::new(TestPlayer::default());
        registry.add("gone.player", gone.clone());
        registry.add("kept.player", kept.clone());
        let playlist = Playlist::new(Arc::clone(&registry));

        playlist.add(media("gone.player", "x")).unwrap();
        playlist.add(media("kept.player", "y")).unwrap();
        assert!(registry.remove("gone.player"));

        playlist.play_index(0, None).unwrap();
        assert_eq!(kept.uri().as_deref(), Some("y"));
        assert_eq!(playlist.current_index(), Some(1));

        assert!(registry.remove("kept.player"));
        assert_eq!(playlist.play_index(0, None), Err(PlaylistError::NoPlayer));
    }

    #[test]
    fn pause_and_resume_current_player() {
        let (playlist, players) = setup(&["test.player"]);
        assert_eq!(playlist.pause(), Err(PlaylistError::NotPlaying));
        assert_eq!(playlist.play(), Err(PlaylistError::NotPlaying));

        playlist.play_media(media("test.player", "song")).unwrap();
        playlist.pause().unwrap();
        assert!(players[0].paused.load(Ordering::SeqCst));

        playlist.play().unwrap();
        assert!(!players[0].paused.load(Ordering::SeqCst));
        assert_eq!(players[0].uri().as_deref(), Some("song"));
    }

    #[test]
    fn swap_follows_current_selection() {
        let (playlist, _players) = setup(&["test.player"]);
        playlist.play_media(media("test.player", "first")).unwrap();
        playlist
            .add_list(
                media("test.player", "list"),
                vec![media("test.player", "l0"), media("test.player", "l1")],
            )
            .unwrap();

        playlist.swap(0, 1).unwrap();
        assert_eq!(playlist.current_index(), Some(1));
        assert_eq!(playlist.current_entry().unwrap().uri(), "first");

        playlist.play_index(0, Some(1)).unwrap();
        playlist.swap_media(0, 0, 1).unwrap();
        let entry = playlist.entry(0).unwrap();
        assert_eq!(entry.current_index(), Some(0));
        assert_eq!(entry.current().uri(), "l1");

        assert!(matches!(
            playlist.swap_media(0, 0, 7),
            Err(PlaylistError::InvalidMediaIndex { index: 7, len: 2 })
        ));
    }

    #[test]
    fn player_can_drive_playlist_from_play() {
        let registry: Arc<Registry<dyn Player>> = Arc::new(Registry::new("player"));
        let player = Arc::new(SkippingPlayer::default());
        registry.add("skip.player", player.clone());
        let playlist = Arc::new(Playlist::new(registry));
        *player.playlist.lock().unwrap() = Arc::downgrade(&playlist);

        playlist
            .play_list(
                media("skip.player", "album"),
                vec![
                    media("skip.player", "broken"),
                    media("skip.player", "broken"),
                    media("skip.player", "good"),
                ],
            )
            .unwrap();

        assert_eq!(*player.played.lock().unwrap(), vec!["good".to_string()]);
        assert_eq!(playlist.current_entry().unwrap().current_index(), Some(2));

        playlist.add(media("skip.player", "broken")).unwrap();
        assert_eq!(
            playlist.next(false),
            Err(PlaylistError::PlayerRefused {
                player_id: "skip.player".into()
            })
        );
    }

    #[test]
    fn released_player_is_no_longer_driven() {
        let (playlist, players) = setup(&["test.player"]);
        playlist.play_media(media("test.player", "song")).unwrap();
        assert_eq!(playlist.active_player().as_deref(), Some("test.player"));

        assert!(!playlist.release_player("other.player"));
        assert!(players[0].is_active());

        assert!(playlist.release_player("test.player"));
        assert!(!players[0].is_active());
        assert_eq!(playlist.active_player(), None);
        assert_eq!(playlist.pause(), Err(PlaylistError::NotPlaying));
        assert!(!players[0].paused.load(Ordering::SeqCst));
        // The entry stays; playing again resolves the player afresh.
        assert_eq!(playlist.len(), 1);
    }

    #[test]
    fn removing_playing_media_resets_player() {
        let (playlist, players) = setup(&["test.player"]);
        playlist
            .play_list(
                media("test.player", "list"),
                vec![media("test.player", "l0"), media("test.player", "l1")],
            )
            .unwrap();
        assert!(players[0].is_active());

        playlist.remove_media(0, 0).unwrap();
        assert!(!players[0].is_active());
        assert_eq!(playlist.entry(0).unwrap().current_index(), None);

        playlist.clear();
        assert_eq!(playlist.current_index(), None);
    }
}
