//! Project-level configuration for the merge engine.
//!
//! Loaded from `.auto-claude/config.toml` at the project root. Every field is
//! optional; a missing file is equivalent to all defaults.

use std::path::Path;

use serde::Deserialize;

const DEFAULT_MAX_FILE_LINES: usize = 5000;
const DEFAULT_SYNTAX_CHECK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STALE_LOCK_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    base_branch: Option<String>,
    binary_extensions: Option<Vec<String>>,
    max_file_lines: Option<usize>,
    syntax_check_timeout_secs: Option<u64>,
    stale_lock_secs: Option<u64>,
}

/// Resolved configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub base_branch: Option<String>,
    pub binary_extensions: Vec<String>,
    pub max_file_lines: usize,
    pub syntax_check_timeout_secs: u64,
    pub stale_lock_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_branch: None,
            binary_extensions: default_binary_extensions(),
            max_file_lines: DEFAULT_MAX_FILE_LINES,
            syntax_check_timeout_secs: DEFAULT_SYNTAX_CHECK_TIMEOUT_SECS,
            stale_lock_secs: DEFAULT_STALE_LOCK_SECS,
        }
    }
}

impl CoreConfig {
    /// Load config from `<project_root>/.auto-claude/config.toml`.
    ///
    /// Missing file, unreadable file, or malformed TOML all fall back to
    /// defaults; this is intentionally permissive since the config is an
    /// optional override, not a required manifest.
    pub fn load(project_root: &Path) -> Self {
        let path = project_root.join(".auto-claude").join("config.toml");
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        let raw: RawConfig = match toml::from_str(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("ignoring malformed config at {}: {e}", path.display());
                RawConfig::default()
            }
        };
        let defaults = Self::default();
        Self {
            base_branch: raw.base_branch,
            binary_extensions: raw.binary_extensions.unwrap_or(defaults.binary_extensions),
            max_file_lines: raw.max_file_lines.unwrap_or(defaults.max_file_lines),
            syntax_check_timeout_secs: raw
                .syntax_check_timeout_secs
                .unwrap_or(defaults.syntax_check_timeout_secs),
            stale_lock_secs: raw.stale_lock_secs.unwrap_or(defaults.stale_lock_secs),
        }
    }
}

fn default_binary_extensions() -> Vec<String> {
    [
        // images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff",
        // archives
        "zip", "tar", "gz", "bz2", "xz", "7z", "rar",
        // executables / objects
        "exe", "dll", "so", "dylib", "o", "a", "bin", "wasm",
        // media
        "mp3", "mp4", "mov", "avi", "wav", "flac", "ogg", "webm",
        // fonts
        "ttf", "otf", "woff", "woff2",
        // office / documents
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CoreConfig::load(dir.path());
        assert_eq!(cfg.max_file_lines, DEFAULT_MAX_FILE_LINES);
        assert!(cfg.binary_extensions.contains(&"png".to_string()));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".auto-claude")).unwrap();
        std::fs::write(
            dir.path().join(".auto-claude/config.toml"),
            "max_file_lines = 100\nbase_branch = \"develop\"\n",
        )
        .unwrap();
        let cfg = CoreConfig::load(dir.path());
        assert_eq!(cfg.max_file_lines, 100);
        assert_eq!(cfg.base_branch.as_deref(), Some("develop"));
        assert_eq!(cfg.syntax_check_timeout_secs, DEFAULT_SYNTAX_CHECK_TIMEOUT_SECS);
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".auto-claude")).unwrap();
        std::fs::write(dir.path().join(".auto-claude/config.toml"), "not valid [[[").unwrap();
        let cfg = CoreConfig::load(dir.path());
        assert_eq!(cfg.max_file_lines, DEFAULT_MAX_FILE_LINES);
    }
}
