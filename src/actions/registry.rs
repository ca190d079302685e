//! Action registry: discovers actions on disk and builds their handlers.
//!
//! Every subdirectory of the action repository is one action. Its
//! `manifest.json` names the handler type; the handler then reads its own
//! `def.json`. Failures are isolated per action and never abort `prepare`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::actions::catalog::HandlerCatalog;
use crate::actions::environment::ActionEnvironment;
use crate::actions::handler::{HandlerSettings, IntentHandler};
use crate::error::RegistryError;

/// Name of the per-action manifest file.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct ActionManifest {
    #[serde(rename = "type")]
    handler_type: Option<String>,
    name: Option<String>,
}

/// A discovered action and its handler, if one could be built.
pub struct Action {
    name: String,
    handler: Option<Arc<dyn IntentHandler>>,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> Option<&Arc<dyn IntentHandler>> {
        self.handler.as_ref()
    }
}

/// Registry of actions, keyed by action (directory) name.
pub struct ActionRegistry {
    repository: PathBuf,
    settings: HandlerSettings,
    catalog: HandlerCatalog,
    /// Restricts discovery when set.
    used_action_names: Option<HashSet<String>>,
    actions: HashMap<String, Action>,
}

impl ActionRegistry {
    /// Create a registry over `repository` with the built-in handlers.
    pub fn new(repository: impl Into<PathBuf>, settings: HandlerSettings) -> Self {
        Self::with_catalog(repository, settings, HandlerCatalog::with_builtins())
    }

    pub fn with_catalog(
        repository: impl Into<PathBuf>,
        settings: HandlerSettings,
        catalog: HandlerCatalog,
    ) -> Self {
        let repository = repository.into();
        let repository = std::path::absolute(&repository).unwrap_or(repository);
        Self {
            repository,
            settings,
            catalog,
            used_action_names: None,
            actions: HashMap::new(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    /// Register extra handler types before `prepare`.
    pub fn catalog_mut(&mut self) -> &mut HandlerCatalog {
        &mut self.catalog
    }

    /// Only discover these actions. Without a call, every action is discovered.
    pub fn set_used_action_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used_action_names = Some(names.into_iter().map(Into::into).collect());
    }

    /// Discover actions and build their handlers.
    pub fn prepare(&mut self) {
        self.actions.clear();

        for name in self.discover() {
            let manifest = match self.load_manifest(&name) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::error!(action = %name, "{}", e);
                    continue;
                }
            };

            if let Some(declared) = manifest.name.as_deref()
                && declared != name
            {
                tracing::debug!(
                    action = %name,
                    declared,
                    "Manifest name differs from directory; using directory name"
                );
            }

            let handler = match self.build_handler(&name, &manifest) {
                Ok(handler) => Some(handler),
                Err(e) => {
                    tracing::warn!(action = %name, "No handler: {}", e);
                    None
                }
            };

            self.actions.insert(name.clone(), Action { name, handler });
        }

        tracing::info!(
            repository = %self.repository.display(),
            actions = self.actions.len(),
            handlers = self.actions.values().filter(|a| a.handler.is_some()).count(),
            "Action registry prepared"
        );
    }

    /// Subdirectory names of the repository, filtered by the used-name set.
    fn discover(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.repository) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    "{}",
                    RegistryError::RepositoryUnreadable {
                        path: self.repository.clone(),
                        reason: e.to_string(),
                    }
                );
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                self.used_action_names
                    .as_ref()
                    .is_none_or(|used| used.contains(name))
            })
            .collect();
        names.sort();
        names
    }

    fn load_manifest(&self, name: &str) -> Result<ActionManifest, RegistryError> {
        let path = self.repository.join(name).join(MANIFEST_FILE);
        let manifest_error = |reason: String| RegistryError::ManifestLoad {
            action: name.to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| manifest_error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| manifest_error(e.to_string()))
    }

    fn build_handler(
        &mut self,
        name: &str,
        manifest: &ActionManifest,
    ) -> Result<Arc<dyn IntentHandler>, RegistryError> {
        let handler_type = manifest
            .handler_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RegistryError::MissingType {
                action: name.to_string(),
            })?;

        let factory = self.catalog.resolve_type(handler_type)?;
        let environment = ActionEnvironment::new(&self.repository, name);
        let mut handler =
            factory(environment, &self.settings).map_err(|e| RegistryError::Construction {
                action: name.to_string(),
                reason: e.to_string(),
            })?;

        match handler.initialize() {
            Ok(()) => tracing::debug!(action = %name, kind = handler.kind(), "Handler ready"),
            Err(e) => tracing::error!(
                action = %name,
                kind = handler.kind(),
                "Handler failed to initialize: {}",
                e
            ),
        }

        Ok(Arc::from(handler))
    }

    /// Handler of an action, if the action exists and has one.
    pub fn action_handler(&self, name: &str) -> Option<Arc<dyn IntentHandler>> {
        self.actions.get(name).and_then(|a| a.handler.clone())
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Check if an action exists.
    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// List all action names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of discovered actions.
    pub fn count(&self) -> usize {
        self.actions.len()
    }
}
