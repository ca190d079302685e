//! Per-action filesystem environment handed to a handler at construction.

use std::path::{Path, PathBuf};

/// Name of the handler-specific definition file inside an action directory.
pub const DEFINITION_FILE: &str = "def.json";

/// The action's own directory under the repository root.
///
/// Fixed for the handler's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEnvironment {
    action_name: String,
    self_directory: PathBuf,
}

impl ActionEnvironment {
    /// Scope an environment to `repository/action_name`.
    ///
    /// A relative repository is taken against the current directory, so
    /// `self_directory` is always absolute.
    pub fn new(repository: &Path, action_name: &str) -> Self {
        let directory = repository.join(action_name);
        let self_directory = std::path::absolute(&directory).unwrap_or(directory);
        Self {
            action_name: action_name.to_string(),
            self_directory,
        }
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn self_directory(&self) -> &Path {
        &self.self_directory
    }

    /// Path of the action's `def.json`.
    pub fn definition_path(&self) -> PathBuf {
        self.self_directory.join(DEFINITION_FILE)
    }

    /// Resolve a path from a definition file. Relative paths are taken
    /// relative to the action directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.self_directory.join(candidate)
        }
    }
}
