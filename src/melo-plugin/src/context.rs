use melo_core::{is_valid_id, Browser, Core, Player, Playlist};
use std::collections::HashSet;
use std::sync::Arc;

/// Which registry a plugin registration lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Browser,
    Player,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Browser => "browser",
            CapabilityKind::Player => "player",
        }
    }
}

/// An id a plugin owns in one of the core registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration {
    pub kind: CapabilityKind,
    pub id: String,
}

enum Staged {
    Browser(String, Arc<dyn Browser>),
    Player(String, Arc<dyn Player>),
}

impl Staged {
    fn registration(&self) -> Registration {
        match self {
            Staged::Browser(id, _) => Registration {
                kind: CapabilityKind::Browser,
                id: id.clone(),
            },
            Staged::Player(id, _) => Registration {
                kind: CapabilityKind::Player,
                id: id.clone(),
            },
        }
    }
}

/// Handle given to a plugin entry point.
///
/// Registrations are only staged here; nothing reaches the core registries
/// until the loader commits them after the entry point returned `true`.
pub struct PluginContext<'a> {
    core: &'a Core,
    plugin: String,
    staged: Vec<Staged>,
    ids: HashSet<Registration>,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(core: &'a Core, plugin: &str) -> Self {
        Self {
            core,
            plugin: plugin.to_owned(),
            staged: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Name of the plugin being activated.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    pub fn core_version(&self) -> &'static str {
        melo_core::version()
    }

    /// The core playlist, for players that move it themselves.
    ///
    /// Store it with [`Arc::downgrade`]; a strong reference held by a
    /// registered player would keep both alive forever.
    pub fn playlist(&self) -> Arc<Playlist> {
        Arc::clone(self.core.playlist())
    }

    pub fn add_browser<B: Browser + 'static>(&mut self, id: &str, browser: B) -> bool {
        self.add_browser_arc(id, Arc::new(browser))
    }

    pub fn add_browser_arc(&mut self, id: &str, browser: Arc<dyn Browser>) -> bool {
        if !self.check(CapabilityKind::Browser, id, self.core.browsers().has(id)) {
            return false;
        }
        self.staged.push(Staged::Browser(id.to_owned(), browser));
        true
    }

    pub fn add_player<P: Player + 'static>(&mut self, id: &str, player: P) -> bool {
        self.add_player_arc(id, Arc::new(player))
    }

    pub fn add_player_arc(&mut self, id: &str, player: Arc<dyn Player>) -> bool {
        if !self.check(CapabilityKind::Player, id, self.core.players().has(id)) {
            return false;
        }
        self.staged.push(Staged::Player(id.to_owned(), player));
        true
    }

    /// Ids staged so far, in registration order.
    pub fn staged(&self) -> Vec<Registration> {
        self.staged.iter().map(Staged::registration).collect()
    }

    fn check(&mut self, kind: CapabilityKind, id: &str, registered: bool) -> bool {
        if !is_valid_id(id) {
            tracing::error!(plugin = %self.plugin, kind = kind.as_str(), id, "invalid id");
            return false;
        }
        let registration = Registration {
            kind,
            id: id.to_owned(),
        };
        if registered || self.ids.contains(&registration) {
            tracing::error!(plugin = %self.plugin, kind = kind.as_str(), id, "id already registered");
            return false;
        }
        self.ids.insert(registration);
        true
    }

    /// Move every staged instance into the core registries.
    ///
    /// All or nothing: if an id was taken by someone else since it was
    /// staged, whatever this call already added is removed again.
    pub(crate) fn commit(self) -> Result<Vec<Registration>, Registration> {
        let mut committed: Vec<Registration> = Vec::with_capacity(self.staged.len());
        for staged in self.staged {
            let registration = staged.registration();
            let added = match staged {
                Staged::Browser(id, browser) => self.core.browsers().add(&id, browser),
                Staged::Player(id, player) => self.core.players().add(&id, player),
            };
            if !added {
                rollback(self.core, &committed);
                return Err(registration);
            }
            committed.push(registration);
        }
        Ok(committed)
    }
}

/// Remove `registrations` from the core registries.
fn rollback(core: &Core, registrations: &[Registration]) {
    for registration in registrations.iter().rev() {
        match registration.kind {
            CapabilityKind::Browser => core.browsers().remove(&registration.id),
            CapabilityKind::Player => core.players().remove(&registration.id),
        };
    }
}
