use crate::context::{CapabilityKind, PluginContext, Registration};
use crate::exec::{self, ExecConfig, ExecPluginHost};
use crate::manifest::{Manifest, ManifestError, ModuleSpec};
use crate::native::NativeModule;
use melo_core::{Browser, Core, Player};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Plugin entry point: stage browsers and players, return whether the plugin is usable.
///
/// Native plugins export it under the manifest's `entry_point` symbol:
///
/// ```rust,ignore
/// #[no_mangle]
/// pub fn entry_point(ctx: &mut melo_plugin::PluginContext<'_>) -> bool {
///     ctx.add_browser("my.browser", MyBrowser::default())
/// }
/// ```
pub type EntryPoint = fn(&mut PluginContext<'_>) -> bool;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("failed to open plugin library {path}: {source}")]
    Library {
        path: PathBuf,
        source: libloading::Error,
    },
    #[error("entry point `{symbol}` not found in {path}: {source}")]
    MissingEntryPoint {
        symbol: String,
        path: PathBuf,
        source: libloading::Error,
    },
    #[error("plugin '{name}' failed to activate")]
    ActivationFailed { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Static,
    Native,
    Exec,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Static => "static",
            PluginKind::Native => "native",
            PluginKind::Exec => "exec",
        }
    }
}

enum Module {
    Static(EntryPoint),
    Native(NativeModule),
    Exec {
        config: ExecConfig,
        host: Option<Arc<ExecPluginHost>>,
    },
}

/// A loaded plugin, active or not.
///
/// Dropping an active plugin without [`PluginLoader::unload`] leaves its
/// registrations in place and keeps its library loaded.
pub struct Plugin {
    name: String,
    version: String,
    dir: Option<PathBuf>,
    module: Module,
    registrations: Vec<Registration>,
    active: bool,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn kind(&self) -> PluginKind {
        match self.module {
            Module::Static(_) => PluginKind::Static,
            Module::Native(_) => PluginKind::Native,
            Module::Exec { .. } => PluginKind::Exec,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Ids this plugin owns in the core registries.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        if self.active {
            if let Module::Native(native) = &mut self.module {
                native.leak();
            }
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind())
            .field("active", &self.active)
            .field("registrations", &self.registrations)
            .finish()
    }
}

/// Loads plugins into a [`Core`] and tracks which ones are active.
pub struct PluginLoader<'a> {
    core: &'a Core,
    active: Mutex<BTreeSet<String>>,
}

impl<'a> PluginLoader<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self {
            core,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    /// Read the manifest in `dir` and open the plugin module without running it.
    pub fn load(&self, dir: &Path) -> Result<Plugin, LoadError> {
        let manifest = Manifest::from_dir(dir)?;
        let module = match &manifest.module {
            ModuleSpec::Native {
                library,
                entry_point,
            } => Module::Native(NativeModule::open(library, entry_point)?),
            ModuleSpec::Exec { executable, args } => Module::Exec {
                config: ExecConfig {
                    executable: executable.clone(),
                    args: args.clone(),
                    working_dir: Some(manifest.dir.clone()),
                },
                host: None,
            },
        };

        tracing::info!(
            plugin = %manifest.name,
            version = %manifest.version,
            dir = %dir.display(),
            "plugin loaded"
        );
        Ok(Plugin {
            name: manifest.name,
            version: manifest.version,
            dir: Some(manifest.dir),
            module,
            registrations: Vec::new(),
            active: false,
        })
    }

    /// Wrap a compiled-in entry point as a plugin.
    pub fn load_static(&self, name: &str, entry: EntryPoint) -> Plugin {
        Plugin {
            name: name.to_owned(),
            version: melo_core::version().to_owned(),
            dir: None,
            module: Module::Static(entry),
            registrations: Vec::new(),
            active: false,
        }
    }

    /// Run the plugin entry point and commit what it registered.
    ///
    /// Returns `false` if the entry point fails or panics, or if one of its
    /// ids was taken meanwhile. In every failure case nothing it staged stays
    /// registered.
    pub fn activate(&self, plugin: &mut Plugin) -> bool {
        if plugin.active {
            tracing::warn!(plugin = %plugin.name, "plugin already active");
            return false;
        }
        // Reserved now and released on failure, so two activations of the
        // same name cannot both get through.
        if !self.lock_active().insert(plugin.name.clone()) {
            tracing::error!(plugin = %plugin.name, "another plugin with this name is active");
            return false;
        }

        let mut ctx = PluginContext::new(self.core, &plugin.name);
        let succeeded = match &mut plugin.module {
            Module::Static(entry) => run_entry(*entry, &mut ctx),
            Module::Native(native) => run_entry(native.entry(), &mut ctx),
            Module::Exec { config, host } => {
                match exec::activate(ExecPluginHost::new(config.clone()), &mut ctx) {
                    Ok(started) => {
                        *host = Some(started);
                        true
                    }
                    Err(err) => {
                        tracing::error!(plugin = %plugin.name, error = %err, "exec plugin failed to start");
                        false
                    }
                }
            }
        };

        if !succeeded {
            tracing::error!(
                plugin = %plugin.name,
                discarded = ctx.staged().len(),
                "plugin activation failed, registrations rolled back"
            );
            drop(ctx);
            stop_exec(plugin);
            self.lock_active().remove(&plugin.name);
            return false;
        }

        match ctx.commit() {
            Ok(registrations) => {
                tracing::info!(
                    plugin = %plugin.name,
                    registrations = registrations.len(),
                    "plugin activated"
                );
                plugin.registrations = registrations;
                plugin.active = true;
                true
            }
            Err(conflict) => {
                tracing::error!(
                    plugin = %plugin.name,
                    kind = conflict.kind.as_str(),
                    id = %conflict.id,
                    "id taken during activation, registrations rolled back"
                );
                stop_exec(plugin);
                self.lock_active().remove(&plugin.name);
                false
            }
        }
    }

    /// Remove everything the plugin registered, then release its module.
    ///
    /// A player of the plugin that is active in the playlist is reset and
    /// released first, so the playlist stops driving it.
    pub fn unload(&self, mut plugin: Plugin) {
        if !plugin.active {
            tracing::debug!(plugin = %plugin.name, "unloading inactive plugin");
            return;
        }

        let mut browsers: Vec<Arc<dyn Browser>> = Vec::new();
        let mut players: Vec<Arc<dyn Player>> = Vec::new();
        for registration in &plugin.registrations {
            match registration.kind {
                CapabilityKind::Browser => browsers.extend(self.core.browsers().take(&registration.id)),
                CapabilityKind::Player => {
                    self.core.playlist().release_player(&registration.id);
                    players.extend(self.core.players().take(&registration.id));
                }
            }
        }
        stop_exec(&mut plugin);

        let still_referenced = browsers.iter().any(|b| Arc::strong_count(b) > 1)
            || players.iter().any(|p| Arc::strong_count(p) > 1);
        drop(browsers);
        drop(players);

        if let Module::Native(native) = &mut plugin.module {
            if still_referenced {
                tracing::warn!(
                    plugin = %plugin.name,
                    path = %native.path().display(),
                    "plugin instances still in use after unload"
                );
                native.leak();
            }
        }

        plugin.active = false;
        self.lock_active().remove(&plugin.name);
        tracing::info!(
            plugin = %plugin.name,
            registrations = plugin.registrations.len(),
            "plugin unloaded"
        );
    }

    /// [`PluginLoader::load`] followed by [`PluginLoader::activate`].
    pub fn load_and_activate(&self, dir: &Path) -> Result<Plugin, LoadError> {
        let mut plugin = self.load(dir)?;
        if !self.activate(&mut plugin) {
            return Err(LoadError::ActivationFailed {
                name: plugin.name.clone(),
            });
        }
        Ok(plugin)
    }

    /// Names of the active plugins, sorted.
    pub fn loaded(&self) -> Vec<String> {
        self.lock_active().iter().cloned().collect()
    }

    fn lock_active(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Call an entry point, containing any panic at the plugin boundary.
fn run_entry(entry: EntryPoint, ctx: &mut PluginContext<'_>) -> bool {
    let plugin = ctx.plugin_name().to_owned();
    match catch_unwind(AssertUnwindSafe(|| entry(ctx))) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(plugin = %plugin, "plugin entry point panicked");
            false
        }
    }
}

fn stop_exec(plugin: &mut Plugin) {
    if let Module::Exec { host, .. } = &mut plugin.module {
        if let Some(host) = host.take() {
            host.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use melo_core::{BrowserInfo, Media, PlayerInfo, PlaylistEntry, PlaylistError, Request};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    struct NullBrowser(BrowserInfo);

    impl Browser for NullBrowser {
        fn info(&self) -> &BrowserInfo {
            &self.0
        }

        fn handle_request(&self, _request: Arc<Request>) -> bool {
            false
        }
    }

    fn one_browser(ctx: &mut PluginContext<'_>) -> bool {
        ctx.add_browser("one.browser", NullBrowser(BrowserInfo::new("null", "")))
    }

    fn slow_browser(ctx: &mut PluginContext<'_>, id: &str) -> bool {
        std::thread::sleep(Duration::from_millis(50));
        ctx.add_browser(id, NullBrowser(BrowserInfo::new("slow", "")))
    }

    fn slow_a(ctx: &mut PluginContext<'_>) -> bool {
        slow_browser(ctx, "a.browser")
    }

    fn slow_b(ctx: &mut PluginContext<'_>) -> bool {
        slow_browser(ctx, "b.browser")
    }

    static PAUSES: AtomicUsize = AtomicUsize::new(0);
    static RESETS: AtomicUsize = AtomicUsize::new(0);

    struct CountingPlayer(PlayerInfo);

    impl Player for CountingPlayer {
        fn info(&self) -> &PlayerInfo {
            &self.0
        }

        fn play(&self, _entry: &PlaylistEntry) -> bool {
            true
        }

        fn pause(&self) -> bool {
            PAUSES.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn reset(&self) -> bool {
            RESETS.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn counting_player(ctx: &mut PluginContext<'_>) -> bool {
        ctx.add_player("counting.player", CountingPlayer(PlayerInfo::default()))
    }

    #[test]
    fn static_plugin_lifecycle() {
        let core = Core::new();
        let loader = PluginLoader::new(&core);
        let mut plugin = loader.load_static("one", one_browser);
        assert_eq!(plugin.kind(), PluginKind::Static);

        assert!(loader.activate(&mut plugin));
        assert!(!loader.activate(&mut plugin));
        assert!(core.browsers().has("one.browser"));
        assert_eq!(loader.loaded(), vec!["one".to_string()]);

        loader.unload(plugin);
        assert!(!core.browsers().has("one.browser"));
        assert!(loader.loaded().is_empty());
    }

    #[test]
    fn same_name_cannot_be_active_twice() {
        let core = Core::new();
        let loader = PluginLoader::new(&core);
        let mut first = loader.load_static("dup", one_browser);
        let mut second = loader.load_static("dup", |_| true);
        assert!(loader.activate(&mut first));
        assert!(!loader.activate(&mut second));
        loader.unload(first);
    }

    #[test]
    fn concurrent_activations_of_one_name_admit_one() {
        let core = Core::new();
        let loader = PluginLoader::new(&core);
        let barrier = Barrier::new(2);

        let activated: Vec<Plugin> = std::thread::scope(|scope| {
            let handles: Vec<_> = [slow_a as EntryPoint, slow_b]
                .into_iter()
                .map(|entry| {
                    let (loader, barrier) = (&loader, &barrier);
                    scope.spawn(move || {
                        let mut plugin = loader.load_static("twin", entry);
                        barrier.wait();
                        loader.activate(&mut plugin).then_some(plugin)
                    })
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(activated.len(), 1);
        assert_eq!(loader.loaded(), vec!["twin".to_string()]);
        assert_eq!(core.browsers().len(), 1);
        for plugin in activated {
            loader.unload(plugin);
        }
        assert!(loader.loaded().is_empty());
    }

    #[test]
    fn failed_activation_frees_the_name() {
        let core = Core::new();
        let loader = PluginLoader::new(&core);
        let mut broken = loader.load_static("flaky", |_| false);
        assert!(!loader.activate(&mut broken));
        assert!(loader.loaded().is_empty());

        let mut fixed = loader.load_static("flaky", one_browser);
        assert!(loader.activate(&mut fixed));
        loader.unload(fixed);
    }

    #[test]
    fn unload_releases_the_active_player() {
        let core = Core::new();
        let loader = PluginLoader::new(&core);
        let mut plugin = loader.load_static("counting", counting_player);
        assert!(loader.activate(&mut plugin));

        core.playlist()
            .play_media(Media::new("counting.player", "x://song"))
            .unwrap();
        core.playlist().pause().unwrap();
        assert_eq!(PAUSES.load(Ordering::SeqCst), 1);
        let resets = RESETS.load(Ordering::SeqCst);

        loader.unload(plugin);
        assert_eq!(RESETS.load(Ordering::SeqCst), resets + 1);
        assert_eq!(core.playlist().active_player(), None);
        assert_eq!(core.playlist().pause(), Err(PlaylistError::NotPlaying));
        assert_eq!(PAUSES.load(Ordering::SeqCst), 1);
        assert_eq!(core.playlist().play(), Err(PlaylistError::NoPlayer));
    }
}
