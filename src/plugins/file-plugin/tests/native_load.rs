//! Loads the plugin the way a deployment does: the cdylib next to its
//! `manifest.toml`, opened through `libloading`.
#![cfg(target_os = "linux")]

use melo_core::{Core, Request};
use melo_file_plugin::{BrowseResponse, BROWSER_ID, PLAYER_ID};
use melo_plugin::{PluginKind, PluginLoader, MANIFEST_FILE};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// The cdylib cargo built alongside this test binary.
fn built_library() -> PathBuf {
    let stem = format!("{DLL_PREFIX}melo_file_plugin");
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let candidates = [deps, deps.parent().unwrap()];

    let mut found: Vec<PathBuf> = candidates
        .iter()
        .filter_map(|dir| fs::read_dir(dir).ok())
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&stem) && name.ends_with(DLL_SUFFIX))
        })
        .collect();
    found.sort_by_key(|path| fs::metadata(path).and_then(|m| m.modified()).ok());
    found
        .pop()
        .unwrap_or_else(|| panic!("{stem}{DLL_SUFFIX} not found next to {}", exe.display()))
}

/// A plugin directory holding the crate manifest and a copy of the library.
fn plugin_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join(MANIFEST_FILE);
    fs::copy(manifest, dir.path().join(MANIFEST_FILE)).unwrap();
    fs::copy(built_library(), dir.path().join("libmelo_file_plugin.so")).unwrap();
    dir
}

#[test]
fn native_plugin_registers_and_unloads() {
    let dir = plugin_dir();
    let core = Core::new();
    let loader = PluginLoader::new(&core);

    let plugin = loader.load_and_activate(dir.path()).unwrap();
    assert_eq!(plugin.kind(), PluginKind::Native);
    assert_eq!(plugin.name(), "file");
    assert_eq!(plugin.registrations().len(), 2);
    assert!(core.browsers().has(BROWSER_ID));
    assert!(core.players().has(PLAYER_ID));

    {
        let browser = core.browsers().get_by_id(BROWSER_ID).unwrap();
        assert_eq!(browser.name(), "Files");
        // Malformed requests are refused synchronously, no worker involved.
        let request = Request::create("not json", |_| {});
        assert!(!browser.handle_request(request.clone()));
        request.discard();
    }

    loader.unload(plugin);
    assert!(core.browsers().is_empty());
    assert!(core.players().is_empty());
    assert!(loader.loaded().is_empty());
}

#[test]
fn instance_held_across_unload_keeps_library_mapped() {
    let dir = plugin_dir();
    let core = Core::new();
    let loader = PluginLoader::new(&core);

    let plugin = loader.load_and_activate(dir.path()).unwrap();
    let held = core.browsers().get_by_id(BROWSER_ID).unwrap();
    loader.unload(plugin);
    assert!(!core.browsers().has(BROWSER_ID));

    // The library was left loaded, so the stale instance still runs.
    assert_eq!(held.name(), "Files");
    let (request, reply) = Request::with_reply(r#"{"recursive":false}"#);
    assert!(held.handle_request(request));
    let response = reply.blocking_recv_timeout(Duration::from_secs(5)).unwrap();
    let parsed: BrowseResponse = serde_json::from_slice(&response).unwrap();
    assert!(matches!(
        parsed,
        BrowseResponse::Listing { .. } | BrowseResponse::Error { .. }
    ));
}
