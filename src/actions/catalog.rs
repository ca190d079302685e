//! Handler catalog: maps handler type strings to factories.
//!
//! A manifest's `type` is either a built-in alias (`builtin.command`) or a
//! dotted `<module>.<Symbol>` reference. References starting with `.` are
//! relative to this crate's action package. Modules are registered up front;
//! lookups are cached per locator, including misses.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::actions::builtin::{CommandHandler, HomeAssistantHandler, RemoteHttpHandler};
use crate::actions::environment::ActionEnvironment;
use crate::actions::handler::{HandlerSettings, IntentHandler};
use crate::error::{ActionError, RegistryError};

/// Package that relative (`.`-prefixed) locators resolve against.
pub const RELATIVE_ROOT: &str = "intent_action.actions";

/// Built-in aliases, substituted verbatim before parsing.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("builtin.command", ".builtin.command.CommandHandler"),
    ("builtin.remote_http", ".builtin.remote_http.RemoteHttpHandler"),
    (
        "builtin.home_automation",
        ".builtin.home_assistant.HomeAssistantHandler",
    ),
    ("buildin.command", ".builtin.command.CommandHandler"),
    ("buildin.remote_http", ".builtin.remote_http.RemoteHttpHandler"),
    (
        "buildin.homeassistant",
        ".builtin.home_assistant.HomeAssistantHandler",
    ),
];

const ALIAS_PREFIXES: &[&str] = &["builtin.", "buildin."];

/// Outcome of constructing a handler.
pub type FactoryResult = Result<Box<dyn IntentHandler>, ActionError>;

/// Constructs a handler for one action.
pub type HandlerFactory =
    Arc<dyn Fn(ActionEnvironment, &HandlerSettings) -> FactoryResult + Send + Sync>;

/// A parsed `(module locator, symbol)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReference {
    pub locator: String,
    pub symbol: String,
}

impl HandlerReference {
    /// Substitute built-in aliases, then split off the trailing symbol.
    pub fn parse(type_name: &str) -> Result<Self, RegistryError> {
        let mut name = type_name.trim();

        if ALIAS_PREFIXES.iter().any(|p| name.starts_with(p)) {
            name = BUILTIN_ALIASES
                .iter()
                .find(|(alias, _)| *alias == name)
                .map(|(_, target)| *target)
                .ok_or_else(|| RegistryError::UnknownAlias {
                    alias: name.to_string(),
                })?;
        }

        let invalid = || RegistryError::InvalidReference {
            reference: type_name.to_string(),
        };

        let (relative, path) = match name.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let parts: Vec<&str> = path.split('.').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        let module = parts[..parts.len() - 1].join(".");
        let locator = if relative {
            format!(".{module}")
        } else {
            module
        };
        Ok(Self {
            locator,
            symbol: parts[parts.len() - 1].to_string(),
        })
    }
}

impl fmt::Display for HandlerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.locator, self.symbol)
    }
}

/// Turn a relative locator into an absolute one.
fn absolute_locator(locator: &str) -> String {
    match locator.strip_prefix('.') {
        Some(rest) => format!("{RELATIVE_ROOT}.{rest}"),
        None => locator.to_string(),
    }
}

/// Registry of constructible handler types.
#[derive(Default)]
pub struct HandlerCatalog {
    /// Absolute locator → symbol → factory.
    modules: HashMap<String, HashMap<String, HandlerFactory>>,
    /// Requested locator → absolute locator, or `None` once a load failed.
    module_cache: HashMap<String, Option<String>>,
}

impl HandlerCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            ".builtin.command",
            "CommandHandler",
            Arc::new(|env: ActionEnvironment, _settings: &HandlerSettings| -> FactoryResult {
                Ok(Box::new(CommandHandler::new(env)))
            }),
        );
        catalog.register(
            ".builtin.remote_http",
            "RemoteHttpHandler",
            Arc::new(|env: ActionEnvironment, _settings: &HandlerSettings| -> FactoryResult {
                Ok(Box::new(RemoteHttpHandler::new(env)))
            }),
        );
        catalog.register(
            ".builtin.home_assistant",
            "HomeAssistantHandler",
            Arc::new(|env: ActionEnvironment, settings: &HandlerSettings| -> FactoryResult {
                Ok(Box::new(HomeAssistantHandler::new(env, settings)))
            }),
        );
        catalog
    }

    /// Register a handler type under `locator.symbol`.
    pub fn register(&mut self, locator: &str, symbol: &str, factory: HandlerFactory) {
        self.modules
            .entry(absolute_locator(locator))
            .or_default()
            .insert(symbol.to_string(), factory);
        self.module_cache.clear();
    }

    /// Look a module up, caching the outcome by locator string.
    fn load_module(&mut self, locator: &str) -> Option<&HashMap<String, HandlerFactory>> {
        let key = match self.module_cache.get(locator) {
            Some(cached) => cached.clone(),
            None => {
                let absolute = absolute_locator(locator);
                let found = self.modules.contains_key(&absolute).then_some(absolute);
                if found.is_none() {
                    tracing::debug!(locator, "Handler module unavailable");
                }
                self.module_cache.insert(locator.to_string(), found.clone());
                found
            }
        };
        key.and_then(|k| self.modules.get(&k))
    }

    /// Whether a locator lookup has been cached, and if so whether it hit.
    pub fn cached(&self, locator: &str) -> Option<bool> {
        self.module_cache.get(locator).map(Option::is_some)
    }

    /// Resolve a reference to its factory.
    pub fn resolve(&mut self, reference: &HandlerReference) -> Result<HandlerFactory, RegistryError> {
        let module =
            self.load_module(&reference.locator)
                .ok_or_else(|| RegistryError::ModuleUnavailable {
                    locator: reference.locator.clone(),
                })?;
        module
            .get(&reference.symbol)
            .cloned()
            .ok_or_else(|| RegistryError::SymbolNotFound {
                locator: reference.locator.clone(),
                symbol: reference.symbol.clone(),
            })
    }

    /// Parse a manifest type string and resolve it.
    pub fn resolve_type(&mut self, type_name: &str) -> Result<HandlerFactory, RegistryError> {
        let reference = HandlerReference::parse(type_name)?;
        self.resolve(&reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_expand_to_relative_references() {
        let r = HandlerReference::parse("builtin.command").unwrap();
        assert_eq!(r.locator, ".builtin.command");
        assert_eq!(r.symbol, "CommandHandler");

        let r = HandlerReference::parse("buildin.homeassistant").unwrap();
        assert_eq!(r.locator, ".builtin.home_assistant");
        assert_eq!(r.symbol, "HomeAssistantHandler");

        let r = HandlerReference::parse("builtin.home_automation").unwrap();
        assert_eq!(r.to_string(), ".builtin.home_assistant.HomeAssistantHandler");
    }

    #[test]
    fn unknown_alias_is_rejected() {
        assert!(matches!(
            HandlerReference::parse("builtin.teleport"),
            Err(RegistryError::UnknownAlias { .. })
        ));
    }

    #[test]
    fn absolute_reference_splits_last_segment() {
        let r = HandlerReference::parse("my_plugins.lights.LightHandler").unwrap();
        assert_eq!(r.locator, "my_plugins.lights");
        assert_eq!(r.symbol, "LightHandler");
    }

    #[test]
    fn fewer_than_two_components_is_invalid() {
        for bad in ["Handler", ".Handler", "", "a..b", "trailing."] {
            assert!(
                matches!(
                    HandlerReference::parse(bad),
                    Err(RegistryError::InvalidReference { .. })
                ),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn builtins_resolve_by_alias_and_absolute_path() {
        let mut catalog = HandlerCatalog::with_builtins();
        assert!(catalog.resolve_type("builtin.command").is_ok());
        assert!(catalog.resolve_type("builtin.remote_http").is_ok());
        assert!(catalog.resolve_type("buildin.homeassistant").is_ok());
        assert!(
            catalog
                .resolve_type("intent_action.actions.builtin.command.CommandHandler")
                .is_ok()
        );
    }

    #[test]
    fn unknown_symbol_and_module_fail() {
        let mut catalog = HandlerCatalog::with_builtins();
        assert!(matches!(
            catalog.resolve_type(".builtin.command.Nope"),
            Err(RegistryError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            catalog.resolve_type("nowhere.Handler"),
            Err(RegistryError::ModuleUnavailable { .. })
        ));
    }

    #[test]
    fn failed_module_lookup_is_cached() {
        let mut catalog = HandlerCatalog::with_builtins();
        assert_eq!(catalog.cached("nowhere"), None);
        let _ = catalog.resolve_type("nowhere.Handler");
        assert_eq!(catalog.cached("nowhere"), Some(false));
        let _ = catalog.resolve_type("builtin.command");
        assert_eq!(catalog.cached(".builtin.command"), Some(true));
    }
}
