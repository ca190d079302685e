//! Remote HTTP handler: POSTs the intent to a configured URL.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::actions::environment::ActionEnvironment;
use crate::actions::handler::{
    HandlerResponse, HandlerState, IntentHandler, load_definition,
};
use crate::actions::http::{LazyClient, TlsSettings, post_json};
use crate::error::ActionError;
use crate::messages::NluIntent;

fn default_verify() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RemoteHttpDefinition {
    handle_url: Option<String>,
    certfile: Option<String>,
    keyfile: Option<String>,
    #[serde(default = "default_verify")]
    verify_ssl: bool,
}

#[derive(Debug)]
struct RemoteHttpConfig {
    handle_url: Option<String>,
    tls: TlsSettings,
}

/// Forwards intents to a remote server and returns its JSON reply.
#[derive(Debug)]
pub struct RemoteHttpHandler {
    environment: ActionEnvironment,
    state: HandlerState<RemoteHttpConfig>,
    client: LazyClient,
}

impl RemoteHttpHandler {
    pub fn new(environment: ActionEnvironment) -> Self {
        Self {
            environment,
            state: HandlerState::Uninitialized,
            client: LazyClient::new(),
        }
    }

    pub fn handle_url(&self) -> Option<&str> {
        match &self.state {
            HandlerState::Ready(config) => config.handle_url.as_deref(),
            _ => None,
        }
    }

    fn load(&self) -> Result<RemoteHttpConfig, ActionError> {
        let definition: RemoteHttpDefinition = load_definition(&self.environment)?;
        let tls = TlsSettings::load(
            &self.environment,
            definition.certfile.as_deref(),
            definition.keyfile.as_deref(),
            definition.verify_ssl,
        )?;
        Ok(RemoteHttpConfig {
            handle_url: definition.handle_url.filter(|u| !u.trim().is_empty()),
            tls,
        })
    }
}

#[async_trait]
impl IntentHandler for RemoteHttpHandler {
    fn kind(&self) -> &'static str {
        "remote_http"
    }

    fn environment(&self) -> &ActionEnvironment {
        &self.environment
    }

    fn initialize(&mut self) -> Result<(), ActionError> {
        match self.load() {
            Ok(config) => {
                if config.handle_url.is_none() {
                    tracing::warn!(
                        action = %self.environment.action_name(),
                        "No handle_url configured; intents will be ignored"
                    );
                }
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

        let Some(url) = config.handle_url.as_deref() else {
            tracing::warn!(
                action = %self.environment.action_name(),
                "Can't handle intent. No handle URL."
            );
            return Ok(None);
        };

        let mut body = intent.to_rhasspy_json();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("site_id".to_string(), intent.site_id.clone().into());
        }

        let client = self.client.get(&config.tls).await?;
        let response = post_json(client, url, &body, HeaderMap::new()).await?;
        let value: serde_json::Value = response.json().await.map_err(|e| ActionError::Http {
            url: url.to_string(),
            reason: format!("invalid JSON response: {e}"),
        })?;

        Ok(Some(HandlerResponse::new(value)))
    }
}
