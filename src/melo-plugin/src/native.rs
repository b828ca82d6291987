use crate::loader::{EntryPoint, LoadError};
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};

/// A plugin shared library and its resolved entry point.
pub(crate) struct NativeModule {
    path: PathBuf,
    entry: EntryPoint,
    library: Option<Library>,
}

impl NativeModule {
    pub(crate) fn open(path: &Path, symbol: &str) -> Result<Self, LoadError> {
        // SAFETY: loading a plugin runs its initialisers; plugins are trusted code
        // built with the same toolchain as the host.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the entry point contract is `fn(&mut PluginContext<'_>) -> bool`,
        // the pointer stays valid as long as `library` is loaded.
        let entry = unsafe {
            let symbol: Symbol<EntryPoint> =
                library
                    .get(symbol.as_bytes())
                    .map_err(|source| LoadError::MissingEntryPoint {
                        symbol: symbol.to_owned(),
                        path: path.to_path_buf(),
                        source,
                    })?;
            *symbol
        };

        tracing::debug!(path = %path.display(), "plugin library opened");
        Ok(Self {
            path: path.to_path_buf(),
            entry,
            library: Some(library),
        })
    }

    pub(crate) fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the library mapped for the rest of the process.
    ///
    /// Used when code from the library may still run: unloading it would
    /// leave dangling vtables behind.
    pub(crate) fn leak(&mut self) {
        if let Some(library) = self.library.take() {
            tracing::warn!(path = %self.path.display(), "plugin library left loaded");
            std::mem::forget(library);
        }
    }
}
