//! `manifest.toml` describing a plugin directory.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.toml";
pub const DEFAULT_ENTRY_POINT: &str = "entry_point";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("plugin '{name}' declares no [native] or [exec] module")]
    MissingModule { name: String },
    #[error("plugin '{name}' declares both [native] and [exec] modules")]
    ConflictingModules { name: String },
    #[error("plugin '{name}' has invalid melo version '{version}'")]
    InvalidVersion { name: String, version: String },
    #[error("plugin '{name}' targets melo {required}, core is {core}")]
    IncompatibleCore {
        name: String,
        required: String,
        core: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    name: String,
    version: String,
    melo: MeloSection,
    native: Option<NativeSection>,
    exec: Option<ExecSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct MeloSection {
    version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct NativeSection {
    filename: PathBuf,
    #[serde(default = "default_entry_point")]
    entry_point: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExecSection {
    executable: PathBuf,
    #[serde(default)]
    args: Vec<String>,
}

/// How the plugin's code is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSpec {
    /// Shared library, path resolved against the plugin directory.
    Native { library: PathBuf, entry_point: String },
    /// External process speaking the exec protocol.
    Exec {
        executable: PathBuf,
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    /// Core version the plugin was built against.
    pub melo_version: String,
    pub module: ModuleSpec,
    pub dir: PathBuf,
}

impl Manifest {
    /// Read `manifest.toml` from a plugin directory.
    pub fn from_dir(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let contents = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&contents, dir)
    }

    /// Parse manifest text; relative module paths are resolved against `dir`.
    pub fn parse(contents: &str, dir: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(contents).map_err(|source| ManifestError::Parse {
            path: dir.join(MANIFEST_FILE),
            source,
        })?;

        let module = match (raw.native, raw.exec) {
            (Some(native), None) => ModuleSpec::Native {
                library: dir.join(native.filename),
                entry_point: native.entry_point,
            },
            (None, Some(exec)) => ModuleSpec::Exec {
                executable: dir.join(exec.executable),
                args: exec.args,
            },
            (None, None) => return Err(ManifestError::MissingModule { name: raw.name }),
            (Some(_), Some(_)) => return Err(ManifestError::ConflictingModules { name: raw.name }),
        };

        let manifest = Self {
            name: raw.name,
            version: raw.version,
            melo_version: raw.melo.version,
            module,
            dir: dir.to_path_buf(),
        };
        manifest.check_core_version(melo_core::version())?;
        Ok(manifest)
    }

    /// Plugins are compatible with any core sharing their major version.
    pub fn check_core_version(&self, core: &str) -> Result<(), ManifestError> {
        let required = major(&self.melo_version).ok_or_else(|| ManifestError::InvalidVersion {
            name: self.name.clone(),
            version: self.melo_version.clone(),
        })?;
        if major(core) != Some(required) {
            return Err(ManifestError::IncompatibleCore {
                name: self.name.clone(),
                required: self.melo_version.clone(),
                core: core.to_owned(),
            });
        }
        Ok(())
    }
}

fn major(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_owned()
}
