//! Plugin artifact discovery
//!
//! Artifacts live flat in a plugin directory and are named
//! `<id>[_v<major>[.<minor>...]].<ext>`; an artifact without a version suffix
//! is version `0`.

use crate::checksum::Checksum;
use crate::error::PluginError;
use crate::version::{Version, VersionRange};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Identity of a resolved plugin artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Directory the artifact was found in
    pub directory: PathBuf,
    /// Plugin id (file name prefix)
    pub id: String,
    /// Parsed version
    pub version: Version,
    /// Full artifact path
    pub path: PathBuf,
    /// Content checksum, the cache key
    pub checksum: Checksum,
}

impl PluginDescriptor {
    /// Artifact file name, for diagnostics
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An artifact candidate found on disk, before it is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    /// Full artifact path
    pub path: PathBuf,
    /// Parsed version
    pub version: Version,
}

/// Matches artifact file names of one plugin id
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    id: String,
    regex: Regex,
}

impl ArtifactPattern {
    /// Create pattern for `id` with artifact extension `extension`
    ///
    /// # Errors
    /// `PluginError::InvalidId` for empty ids or ids containing path separators
    pub fn new(id: &str, extension: &str) -> Result<Self, PluginError> {
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(PluginError::InvalidId(id.to_string()));
        }
        let regex = Regex::new(&format!(
            r"^{}(?:_v(\d+(?:\.\d+)*))?\.{}$",
            regex::escape(id),
            regex::escape(extension.trim_start_matches('.')),
        ))
        .map_err(|_| PluginError::InvalidId(id.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            regex,
        })
    }

    /// Plugin id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Version encoded in `file_name`, if the name belongs to this plugin
    #[must_use]
    pub fn version_of(&self, file_name: &str) -> Option<Version> {
        let captures = self.regex.captures(file_name)?;
        match captures.get(1) {
            Some(version) => version.as_str().parse().ok(),
            None => Some(Version::zero()),
        }
    }
}

/// List every artifact of `pattern` in `directory`
///
/// # Errors
/// - `PluginError::DirectoryNotFound` if `directory` is not a directory
/// - `PluginError::Io` if listing fails
pub fn scan(directory: &Path, pattern: &ArtifactPattern) -> Result<Vec<ArtifactCandidate>, PluginError> {
    if !directory.is_dir() {
        return Err(PluginError::DirectoryNotFound(directory.to_path_buf()));
    }

    let entries =
        std::fs::read_dir(directory).map_err(|e| PluginError::io_error(directory, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PluginError::io_error(directory, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(version) = pattern.version_of(file_name) {
            candidates.push(ArtifactCandidate { path, version });
        }
    }
    Ok(candidates)
}

/// Pick the highest version inside `range`
///
/// Among equal versions (e.g. `p.jar` and `p_v0.jar`) the lexicographically
/// greatest path wins, so the choice does not depend on directory order.
#[must_use]
pub fn select(candidates: Vec<ArtifactCandidate>, range: &VersionRange) -> Option<ArtifactCandidate> {
    candidates
        .into_iter()
        .filter(|candidate| range.contains(&candidate.version))
        .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)))
}
