//! Local files for Melo: a browser over a directory tree and a player for `file://` media.
//!
//! Built as a `cdylib` next to `manifest.toml`, or linked in and activated with
//! [`melo_plugin::PluginLoader::load_static`].

mod browser;
mod player;

pub use browser::{BrowseError, BrowseRequest, BrowseResponse, EntryKind, FileBrowser, ListingEntry};
pub use player::{FilePlayer, PlaybackState};

use directories::BaseDirs;
use melo_plugin::PluginContext;
use std::path::PathBuf;

pub const BROWSER_ID: &str = "file.browser";
pub const PLAYER_ID: &str = "file.player";

/// Root used when `MELO_FILE_ROOT` is unset: the user's home directory.
fn browse_root() -> PathBuf {
    if let Some(root) = std::env::var_os("MELO_FILE_ROOT") {
        return PathBuf::from(root);
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/"))
}

#[no_mangle]
pub fn entry_point(ctx: &mut PluginContext<'_>) -> bool {
    let root = browse_root();
    tracing::info!(plugin = ctx.plugin_name(), root = %root.display(), "registering file plugin");
    let player = FilePlayer::with_playlist(&ctx.playlist());
    ctx.add_browser(BROWSER_ID, FileBrowser::new(root)) && ctx.add_player(PLAYER_ID, player)
}
