use melo_core::{Browser, BrowserInfo, Request};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Message accepted by [`FileBrowser`], as JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseRequest {
    /// Directory to list, relative to the browser root or absolute inside it.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// List the whole tree instead of one level.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    Audio,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    pub uri: String,
    pub kind: EntryKind,
}

/// Response to a [`BrowseRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrowseResponse {
    Listing {
        path: PathBuf,
        entries: Vec<ListingEntry>,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("{path} is outside the browsable root")]
    OutsideRoot { path: PathBuf },
    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Browses the local file system below a root directory.
///
/// Listing runs on a worker thread; the request is completed from there.
pub struct FileBrowser {
    info: BrowserInfo,
    root: PathBuf,
}

impl FileBrowser {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root).clean();
        Self {
            info: BrowserInfo::new("Files", "Browse local directories and audio files"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Browser for FileBrowser {
    fn info(&self) -> &BrowserInfo {
        &self.info
    }

    fn handle_request(&self, request: Arc<Request>) -> bool {
        let browse: BrowseRequest = match serde_json::from_slice(request.message()) {
            Ok(browse) => browse,
            Err(err) => {
                tracing::warn!(error = %err, "file browser rejected malformed request");
                return false;
            }
        };

        let root = self.root.clone();
        let spawned = std::thread::Builder::new()
            .name("melo-file-browser".into())
            .spawn(move || {
                let response = match list(&root, &browse) {
                    Ok(response) => response,
                    Err(err) => BrowseResponse::Error {
                        error: err.to_string(),
                    },
                };
                match serde_json::to_vec(&response) {
                    Ok(bytes) => {
                        if let Err(err) = request.complete(bytes) {
                            tracing::error!(error = %err, "file browser completion failed");
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "failed to encode listing"),
                }
            });
        match spawned {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn file browser worker");
                false
            }
        }
    }
}

fn list(root: &Path, request: &BrowseRequest) -> Result<BrowseResponse, BrowseError> {
    let requested = match &request.path {
        Some(path) => root.join(path),
        None => root.to_path_buf(),
    };
    let dir = canonicalize_within_root(&requested, root)
        .ok_or(BrowseError::OutsideRoot { path: requested })?;
    if !dir.is_dir() {
        return Err(BrowseError::NotADirectory { path: dir });
    }

    let mut walker = WalkDir::new(&dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if !request.recursive {
        walker = walker.max_depth(1);
    }

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let kind = if entry.file_type().is_dir() {
            EntryKind::Directory
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(is_supported_extension)
            .unwrap_or(false)
        {
            EntryKind::Audio
        } else {
            EntryKind::File
        };
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            uri: format!("file://{}", path.display()),
            kind,
        });
    }

    tracing::debug!(path = %dir.display(), entries = entries.len(), "directory listed");
    Ok(BrowseResponse::Listing { path: dir, entries })
}

fn canonicalize_within_root(path: &Path, root: &Path) -> Option<PathBuf> {
    let canon = path.canonicalize().ok()?.clean();
    canon.starts_with(root).then_some(canon)
}

pub(crate) fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mp3" | "m4a" | "flac" | "wav" | "ogg"
    )
}
