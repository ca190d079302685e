//! Error types for the intent action service.

use std::path::PathBuf;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while discovering and resolving actions.
///
/// These never escape `ActionRegistry::prepare`; they are logged and the
/// affected action degrades to "no handler".
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Action repository {path} unreadable: {reason}")]
    RepositoryUnreadable { path: PathBuf, reason: String },

    #[error("Manifest for action {action} failed to load: {reason}")]
    ManifestLoad { action: String, reason: String },

    #[error("Action {action} has no handler type")]
    MissingType { action: String },

    #[error("Unknown built-in handler alias: {alias}")]
    UnknownAlias { alias: String },

    #[error("Invalid handler reference {reference}: expected <module>.<symbol>")]
    InvalidReference { reference: String },

    #[error("Handler module {locator} is unavailable")]
    ModuleUnavailable { locator: String },

    #[error("Handler {symbol} not found in module {locator}")]
    SymbolNotFound { locator: String, symbol: String },

    #[error("Handler for action {action} could not be constructed: {reason}")]
    Construction { action: String, reason: String },
}

/// Handler-level errors, raised while initializing or invoking a handler.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Failed to load definition {path}: {reason}")]
    DefinitionLoad { path: PathBuf, reason: String },

    #[error("Definition {path} is empty")]
    EmptyDefinition { path: PathBuf },

    #[error("Handler for action {action} is not ready")]
    NotReady { action: String },

    #[error("Action {action} has no command configured")]
    MissingCommand { action: String },

    #[error("Failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Command {command} exited with status {code:?}")]
    ProcessFailed { command: String, code: Option<i32> },

    #[error("Action {action} produced invalid output: {reason}")]
    InvalidOutput { action: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("No response from {url}")]
    EmptyResponse { url: String },

    #[error("Action {action} has no usable URL: {reason}")]
    InvalidUrl { action: String, reason: String },

    #[error("Unsupported handle_type (got {handle_type:?})")]
    UnsupportedHandleType { handle_type: Option<String> },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
