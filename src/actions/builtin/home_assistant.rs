//! Home Assistant handler.
//!
//! Depending on `handle_type` the intent is either fired as an event
//! (`/api/events/<type>`, no reply expected) or sent to the conversation
//! intent endpoint (`/api/intent/handle`, JSON reply with optional speech).

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::actions::environment::ActionEnvironment;
use crate::actions::handler::{
    HandlerResponse, HandlerSettings, HandlerState, IntentHandler, load_definition,
};
use crate::actions::http::{LazyClient, TlsSettings, post_json};
use crate::error::ActionError;
use crate::messages::NluIntent;

/// Default event type template; `{0}` is the intent name.
pub const DEFAULT_EVENT_TYPE_FORMAT: &str = "rhasspy_{0}";

const API_PASSWORD_HEADER: &str = "x-ha-access";

/// How intents are delivered to Home Assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Event,
    Intent,
}

impl FromStr for HandleType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "intent" => Ok(Self::Intent),
            other => Err(ActionError::UnsupportedHandleType {
                handle_type: Some(other.to_string()),
            }),
        }
    }
}

/// Credential sent with each request, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HassAuth {
    AccessToken(String),
    ApiPassword(String),
    FallbackToken(String),
    None,
}

impl HassAuth {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let (name, value) = match self {
            Self::AccessToken(token) | Self::FallbackToken(token) => {
                (AUTHORIZATION, format!("Bearer {token}"))
            }
            Self::ApiPassword(password) => {
                (HeaderName::from_static(API_PASSWORD_HEADER), password.clone())
            }
            Self::None => return headers,
        };
        match HeaderValue::from_str(&value) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(name, value);
            }
            Err(e) => tracing::warn!("Dropping unusable Home Assistant credential: {}", e),
        }
        headers
    }
}

#[derive(Deserialize)]
struct HomeAssistantDefinition {
    url: Option<String>,
    access_token: Option<String>,
    api_password: Option<String>,
    event_type_format: Option<String>,
    handle_type: Option<String>,
    certfile: Option<String>,
    keyfile: Option<String>,
    verify_ssl: Option<bool>,
}

struct HomeAssistantConfig {
    url: Option<String>,
    access_token: Option<SecretString>,
    api_password: Option<SecretString>,
    event_type_format: String,
    handle_type: Option<String>,
    tls: TlsSettings,
}

/// Replace `{0}` / `{}` in `template` with the intent name.
pub fn format_event_type(template: &str, intent_name: &str) -> String {
    template.replace("{0}", intent_name).replace("{}", intent_name)
}

/// Slot values plus the `_text`, `_raw_text` and `_intent` meta keys.
pub fn event_data(intent: &NluIntent) -> Map<String, Value> {
    let mut slots = intent.slot_values();
    slots.insert("_text".to_string(), json!(intent.input));
    slots.insert("_raw_text".to_string(), json!(intent.raw_input));
    slots.insert("_intent".to_string(), intent.to_hermes_json());
    slots
}

/// Sends intents to a Home Assistant instance.
pub struct HomeAssistantHandler {
    environment: ActionEnvironment,
    fallback_token: Option<SecretString>,
    state: HandlerState<HomeAssistantConfig>,
    client: LazyClient,
}

impl HomeAssistantHandler {
    pub fn new(environment: ActionEnvironment, settings: &HandlerSettings) -> Self {
        Self {
            environment,
            fallback_token: settings.fallback_token.clone(),
            state: HandlerState::Uninitialized,
            client: LazyClient::new(),
        }
    }

    fn load(&self) -> Result<HomeAssistantConfig, ActionError> {
        let definition: HomeAssistantDefinition = load_definition(&self.environment)?;
        let tls = TlsSettings::load(
            &self.environment,
            definition.certfile.as_deref(),
            definition.keyfile.as_deref(),
            definition.verify_ssl.unwrap_or(true),
        )?;
        Ok(HomeAssistantConfig {
            url: definition.url,
            access_token: definition.access_token.map(SecretString::from),
            api_password: definition.api_password.map(SecretString::from),
            event_type_format: definition
                .event_type_format
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE_FORMAT.to_string()),
            handle_type: definition.handle_type,
            tls,
        })
    }

    /// Credential to use: access token, then API password, then the
    /// service-wide fallback token.
    pub fn auth(&self) -> HassAuth {
        let non_empty = |s: &Option<SecretString>| {
            s.as_ref()
                .map(|s| s.expose_secret().to_string())
                .filter(|s| !s.is_empty())
        };
        let HandlerState::Ready(config) = &self.state else {
            return HassAuth::None;
        };
        if let Some(token) = non_empty(&config.access_token) {
            return HassAuth::AccessToken(token);
        }
        if let Some(password) = non_empty(&config.api_password) {
            return HassAuth::ApiPassword(password);
        }
        if let Some(token) = non_empty(&self.fallback_token) {
            return HassAuth::FallbackToken(token);
        }
        HassAuth::None
    }

    fn endpoint(&self, config: &HomeAssistantConfig, path: &str) -> Result<String, ActionError> {
        let action = self.environment.action_name().to_string();
        let base = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ActionError::InvalidUrl {
                action: action.clone(),
                reason: "no url configured".to_string(),
            })?;
        let base = Url::parse(base).map_err(|e| ActionError::InvalidUrl {
            action: action.clone(),
            reason: e.to_string(),
        })?;
        base.join(path)
            .map(String::from)
            .map_err(|e| ActionError::InvalidUrl {
                action,
                reason: e.to_string(),
            })
    }

    async fn post_event(
        &self,
        config: &HomeAssistantConfig,
        intent: &NluIntent,
    ) -> Result<(), ActionError> {
        let event_type = format_event_type(&config.event_type_format, intent.name());
        let url = self.endpoint(config, &format!("api/events/{event_type}"))?;
        let body = Value::Object(event_data(intent));

        let client = self.client.get(&config.tls).await?;
        post_json(client, &url, &body, self.auth().headers()).await?;
        Ok(())
    }

    async fn post_intent(
        &self,
        config: &HomeAssistantConfig,
        intent: &NluIntent,
    ) -> Result<Value, ActionError> {
        let url = self.endpoint(config, "api/intent/handle")?;
        let body = json!({
            "name": intent.name(),
            "data": event_data(intent),
        });

        let client = self.client.get(&config.tls).await?;
        let response = post_json(client, &url, &body, self.auth().headers()).await?;
        let value: Value = response.json().await.map_err(|e| ActionError::Http {
            url: url.clone(),
            reason: format!("invalid JSON response: {e}"),
        })?;

        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Err(ActionError::EmptyResponse { url });
        }
        Ok(value)
    }
}

#[async_trait]
impl IntentHandler for HomeAssistantHandler {
    fn kind(&self) -> &'static str {
        "home_assistant"
    }

    fn environment(&self) -> &ActionEnvironment {
        &self.environment
    }

    fn initialize(&mut self) -> Result<(), ActionError> {
        match self.load() {
            Ok(config) => {
                self.state = HandlerState::Ready(config);
                Ok(())
            }
            Err(e) => {
                self.state = HandlerState::Disabled(e.to_string());
                Err(e)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    async fn handle(&self, intent: &NluIntent) -> Result<Option<HandlerResponse>, ActionError> {
        let config = self.state.ready(self.environment.action_name())?;

        let handle_type = match config.handle_type.as_deref() {
            Some(raw) => raw.parse::<HandleType>()?,
            None => return Err(ActionError::UnsupportedHandleType { handle_type: None }),
        };

        match handle_type {
            HandleType::Event => {
                if let Err(e) = self.post_event(config, intent).await {
                    tracing::warn!(
                        action = %self.environment.action_name(),
                        intent = %intent.name(),
                        "Home Assistant event failed: {}",
                        e
                    );
                }
                Ok(None)
            }
            HandleType::Intent => {
                let value = self.post_intent(config, intent).await?;
                Ok(Some(HandlerResponse::new(value)))
            }
        }
    }
}
