//! Handler contract shared by every action implementation.

use std::fmt;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::actions::environment::ActionEnvironment;
use crate::config::ServiceConfig;
use crate::error::ActionError;
use crate::messages::NluIntent;

/// Structured data returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse(pub Value);

impl HandlerResponse {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Text to speak, if any.
    ///
    /// Accepts `speech.text` and Home Assistant's `speech.plain.speech`.
    pub fn speech_text(&self) -> Option<&str> {
        let speech = self.0.get("speech")?;
        speech
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| {
                speech
                    .get("plain")
                    .and_then(|plain| plain.get("speech"))
                    .and_then(Value::as_str)
            })
            .filter(|text| !text.trim().is_empty())
    }
}

/// Lifecycle of a handler.
///
/// `Uninitialized → Ready` on a successful `initialize()`, otherwise
/// `Uninitialized → Disabled` for good.
#[derive(Debug)]
pub enum HandlerState<D> {
    Uninitialized,
    Ready(D),
    Disabled(String),
}

impl<D> HandlerState<D> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The loaded definition, or `NotReady` for the given action.
    pub fn ready(&self, action: &str) -> Result<&D, ActionError> {
        match self {
            Self::Ready(def) => Ok(def),
            _ => Err(ActionError::NotReady {
                action: action.to_string(),
            }),
        }
    }
}

/// Settings shared by every handler, derived from service configuration.
#[derive(Clone, Default)]
pub struct HandlerSettings {
    /// Bearer token used by Home Assistant handlers without their own credentials.
    pub fallback_token: Option<SecretString>,
}

impl fmt::Debug for HandlerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSettings")
            .field("fallback_token", &self.fallback_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl From<&ServiceConfig> for HandlerSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            fallback_token: config.fallback_token.clone(),
        }
    }
}

/// An action handler: initialized once, then invoked per intent.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Short kind label, used in logs and listings.
    fn kind(&self) -> &'static str;

    /// The environment this handler was constructed with.
    fn environment(&self) -> &ActionEnvironment;

    /// Load the definition and become ready. Best-effort: on error the
    /// handler stays unable to handle intents.
    fn initialize(&mut self) -> Result<(), ActionError>;

    fn is_ready(&self) -> bool;

    /// Handle one intent. `Ok(None)` means "nothing to forward".
    async fn handle(&self, intent: &NluIntent) -> Result<Option<HandlerResponse>, ActionError>;
}

/// Read and parse an action's `def.json`.
///
/// A `null` or empty-object definition counts as a load failure.
pub fn load_definition<T: DeserializeOwned>(env: &ActionEnvironment) -> Result<T, ActionError> {
    let path = env.definition_path();
    let raw = std::fs::read_to_string(&path).map_err(|e| ActionError::DefinitionLoad {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| ActionError::DefinitionLoad {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(ActionError::EmptyDefinition { path });
    }

    serde_json::from_value(value).map_err(|e| ActionError::DefinitionLoad {
        path,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Def {
        command: Option<String>,
    }

    fn env_with_def(contents: Option<&str>) -> (ActionEnvironment, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("act")).unwrap();
        if let Some(contents) = contents {
            std::fs::write(dir.path().join("act").join("def.json"), contents).unwrap();
        }
        (ActionEnvironment::new(dir.path(), "act"), dir)
    }

    #[test]
    fn speech_text_reads_both_shapes() {
        let plain = HandlerResponse::new(json!({"speech": {"text": "ok"}}));
        assert_eq!(plain.speech_text(), Some("ok"));

        let hass = HandlerResponse::new(json!({"speech": {"plain": {"speech": "done"}}}));
        assert_eq!(hass.speech_text(), Some("done"));

        let blank = HandlerResponse::new(json!({"speech": {"text": "  "}}));
        assert_eq!(blank.speech_text(), None);

        assert_eq!(HandlerResponse::new(json!({"other": 1})).speech_text(), None);
        assert_eq!(HandlerResponse::new(json!([1, 2])).speech_text(), None);
    }

    #[test]
    fn state_gates_readiness() {
        let state: HandlerState<u8> = HandlerState::Uninitialized;
        assert!(!state.is_ready());
        assert!(matches!(state.ready("x"), Err(ActionError::NotReady { .. })));

        let state = HandlerState::Ready(7u8);
        assert_eq!(*state.ready("x").unwrap(), 7);

        let state: HandlerState<u8> = HandlerState::Disabled("boom".into());
        assert!(state.ready("x").is_err());
    }

    #[test]
    fn loads_definition() {
        let (env, _dir) = env_with_def(Some(r#"{"command": "./run.sh"}"#));
        let def: Def = load_definition(&env).unwrap();
        assert_eq!(def.command.as_deref(), Some("./run.sh"));
    }

    #[test]
    fn missing_definition_fails() {
        let (env, _dir) = env_with_def(None);
        let err = load_definition::<Def>(&env).unwrap_err();
        assert!(matches!(err, ActionError::DefinitionLoad { .. }));
    }

    #[test]
    fn empty_or_malformed_definition_fails() {
        let (env, _dir) = env_with_def(Some("{}"));
        assert!(matches!(
            load_definition::<Def>(&env),
            Err(ActionError::EmptyDefinition { .. })
        ));

        let (env, _dir) = env_with_def(Some("null"));
        assert!(matches!(
            load_definition::<Def>(&env),
            Err(ActionError::EmptyDefinition { .. })
        ));

        let (env, _dir) = env_with_def(Some("{not json"));
        assert!(matches!(
            load_definition::<Def>(&env),
            Err(ActionError::DefinitionLoad { .. })
        ));
    }
}
