//! Boundary message types exchanged with the transport.
//!
//! Inbound intents use the Hermes JSON shape (camelCase keys). Handlers that
//! talk to scripts or remote servers receive the flatter Rhasspy shape built
//! by [`NluIntent::to_rhasspy_json`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ChannelError;

/// Topic prefix for recognized intents.
pub const INTENT_TOPIC_PREFIX: &str = "hermes/intent/";
/// Topic that enables intent handling.
pub const TOGGLE_ON_TOPIC: &str = "hermes/handle/toggleOn";
/// Topic that disables intent handling.
pub const TOGGLE_OFF_TOPIC: &str = "hermes/handle/toggleOff";
/// Topic speech output events are published on.
pub const TTS_SAY_TOPIC: &str = "hermes/tts/say";

fn default_site_id() -> String {
    "default".to_string()
}

/// Name and confidence of a recognized intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentName {
    pub intent_name: String,
    #[serde(default)]
    pub confidence_score: f64,
}

/// Character range of a slot inside the recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRange {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub raw_start: Option<usize>,
    #[serde(default)]
    pub raw_end: Option<usize>,
}

/// A named slot filled by the NLU stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(default)]
    pub entity: String,
    /// Tagged value, usually `{"kind": ..., "value": ...}`.
    pub value: Value,
    pub slot_name: String,
    #[serde(default)]
    pub raw_value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub range: Option<SlotRange>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Slot {
    /// Build a slot carrying a plain string value.
    pub fn new(slot_name: impl Into<String>, value: impl Into<String>) -> Self {
        let slot_name = slot_name.into();
        let value = value.into();
        Self {
            entity: slot_name.clone(),
            value: json!({ "kind": "Unknown", "value": value }),
            slot_name,
            raw_value: value,
            confidence: 1.0,
            range: None,
        }
    }

    /// The untagged slot value (`value.value`), or the raw JSON if untagged.
    pub fn plain_value(&self) -> Value {
        match self.value.get("value") {
            Some(v) => v.clone(),
            None => self.value.clone(),
        }
    }
}

/// An intent recognized by the NLU stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluIntent {
    pub input: String,
    pub intent: IntentName,
    #[serde(default = "default_site_id")]
    pub site_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub custom_data: Option<String>,
    #[serde(default)]
    pub raw_input: Option<String>,
    #[serde(default)]
    pub wakeword_id: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl NluIntent {
    pub fn new(intent_name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            intent: IntentName {
                intent_name: intent_name.into(),
                confidence_score: 1.0,
            },
            site_id: default_site_id(),
            id: None,
            slots: Vec::new(),
            session_id: None,
            custom_data: None,
            raw_input: None,
            wakeword_id: None,
            lang: None,
        }
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn with_site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = site_id.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_raw_input(mut self, raw_input: impl Into<String>) -> Self {
        self.raw_input = Some(raw_input.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.intent.intent_name
    }

    /// Raw input, falling back to the processed input.
    pub fn raw_text(&self) -> &str {
        self.raw_input.as_deref().unwrap_or(&self.input)
    }

    /// Slot name → plain slot value. Later slots win on duplicate names.
    pub fn slot_values(&self) -> Map<String, Value> {
        self.slots
            .iter()
            .map(|slot| (slot.slot_name.clone(), slot.plain_value()))
            .collect()
    }

    /// The full Hermes representation.
    pub fn to_hermes_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The Rhasspy representation handed to scripts and remote servers.
    pub fn to_rhasspy_json(&self) -> Value {
        let entities: Vec<Value> = self
            .slots
            .iter()
            .map(|slot| {
                let range = slot.range.as_ref();
                json!({
                    "entity": slot.entity,
                    "value": slot.plain_value(),
                    "raw_value": slot.raw_value,
                    "start": range.map(|r| r.start),
                    "end": range.map(|r| r.end),
                    "raw_start": range.and_then(|r| r.raw_start),
                    "raw_end": range.and_then(|r| r.raw_end),
                })
            })
            .collect();

        json!({
            "intent": {
                "name": self.intent.intent_name,
                "confidence": self.intent.confidence_score,
            },
            "entities": entities,
            "slots": self.slot_values(),
            "text": self.input,
            "raw_text": self.raw_text(),
            "tokens": self.input.split_whitespace().collect::<Vec<_>>(),
            "raw_tokens": self.raw_text().split_whitespace().collect::<Vec<_>>(),
            "wakeword_id": self.wakeword_id,
        })
    }
}

/// A request to speak text, produced when a handler returns speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechOutput {
    pub text: String,
    /// Fresh correlation id, unique per emitted event.
    #[serde(rename = "id")]
    pub correlation_id: String,
    pub site_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Payload of the handle toggle messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TogglePayload {
    #[serde(default = "default_site_id")]
    site_id: String,
}

/// Everything the router consumes from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Intent(NluIntent),
    HandleToggleOn { site_id: String },
    HandleToggleOff { site_id: String },
}

impl InboundMessage {
    /// Decode a message from its topic and JSON payload.
    pub fn from_topic(topic: &str, payload: Value) -> Result<Self, ChannelError> {
        if topic.starts_with(INTENT_TOPIC_PREFIX) {
            let intent: NluIntent = serde_json::from_value(payload)
                .map_err(|e| ChannelError::InvalidMessage(format!("{topic}: {e}")))?;
            return Ok(Self::Intent(intent));
        }

        let toggle = || -> Result<TogglePayload, ChannelError> {
            if payload.is_null() {
                return Ok(TogglePayload {
                    site_id: default_site_id(),
                });
            }
            serde_json::from_value(payload.clone())
                .map_err(|e| ChannelError::InvalidMessage(format!("{topic}: {e}")))
        };

        match topic {
            TOGGLE_ON_TOPIC => Ok(Self::HandleToggleOn {
                site_id: toggle()?.site_id,
            }),
            TOGGLE_OFF_TOPIC => Ok(Self::HandleToggleOff {
                site_id: toggle()?.site_id,
            }),
            other => Err(ChannelError::InvalidMessage(format!(
                "unexpected topic: {other}"
            ))),
        }
    }
}
