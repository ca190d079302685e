//! Intent router: binds intent names to action handlers and dispatches.
//!
//! The binding table is built once by [`IntentRouter::load`] and never
//! changes afterwards. An intent without an exact binding falls back to the
//! catch-all binding keyed by the empty string.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::actions::handler::IntentHandler;
use crate::actions::registry::ActionRegistry;
use crate::error::ConfigError;
use crate::messages::{InboundMessage, NluIntent, SpeechOutput};

/// Key of the catch-all binding.
pub const CATCH_ALL_INTENT: &str = "";

/// Intent name → action name, as read from the intent map file.
pub type IntentMap = HashMap<String, Option<String>>;

/// Read an intent map: `{"<intent>": {"action": "<action>"}}`.
///
/// A `null` document is an empty map. Entries without a string `action`
/// are kept with no action.
pub fn read_intent_map(path: &Path) -> Result<IntentMap, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    let entries = match value {
        Value::Null => return Ok(IntentMap::new()),
        Value::Object(entries) => entries,
        other => {
            return Err(ConfigError::ParseError(format!(
                "{}: expected an object, got {}",
                path.display(),
                other
            )));
        }
    };

    Ok(entries
        .into_iter()
        .map(|(intent, def)| {
            let action = def.get("action").and_then(Value::as_str).map(String::from);
            if action.is_none() {
                tracing::warn!(intent = %intent, "Intent map entry has no action");
            }
            (intent, action)
        })
        .collect())
}

/// An intent bound to an action and its handler.
pub struct IntentBinding {
    intent_name: String,
    action_name: Option<String>,
    handler: Option<Arc<dyn IntentHandler>>,
}

impl IntentBinding {
    pub fn intent_name(&self) -> &str {
        &self.intent_name
    }

    pub fn action_name(&self) -> Option<&str> {
        self.action_name.as_deref()
    }

    pub fn handler(&self) -> Option<&Arc<dyn IntentHandler>> {
        self.handler.as_ref()
    }
}

/// Summary of a binding, for listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BindingSummary {
    pub intent: String,
    pub action: Option<String>,
    pub handler: Option<&'static str>,
    pub ready: bool,
}

/// Routes intents to handlers and turns their replies into speech.
pub struct IntentRouter {
    bindings: HashMap<String, IntentBinding>,
    handle_enabled: AtomicBool,
    site_ids: Vec<String>,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::empty()
    }
}

impl IntentRouter {
    /// A router with no bindings.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
            handle_enabled: AtomicBool::new(true),
            site_ids: Vec::new(),
        }
    }

    /// Read the intent map and bind every intent to its handler.
    ///
    /// An unreadable map leaves the router empty.
    pub fn load(intent_map_path: &Path, registry: &mut ActionRegistry) -> Self {
        match read_intent_map(intent_map_path) {
            Ok(map) => Self::from_map(map, registry),
            Err(e) => {
                tracing::error!(
                    path = %intent_map_path.display(),
                    "Error loading intent map: {}",
                    e
                );
                Self::empty()
            }
        }
    }

    /// Restrict the registry to the referenced actions, prepare it, and
    /// resolve each binding's handler.
    pub fn from_map(map: IntentMap, registry: &mut ActionRegistry) -> Self {
        if map.is_empty() {
            tracing::warn!("Intent map is empty; no intents will be handled");
            return Self::empty();
        }

        registry.set_used_action_names(map.values().flatten().cloned());
        registry.prepare();

        let bindings: HashMap<String, IntentBinding> = map
            .into_iter()
            .map(|(intent_name, action_name)| {
                let handler = action_name
                    .as_deref()
                    .and_then(|action| registry.action_handler(action));
                if handler.is_none() {
                    tracing::warn!(
                        intent = %intent_name,
                        action = ?action_name,
                        "Intent has no handler"
                    );
                }
                let binding = IntentBinding {
                    intent_name: intent_name.clone(),
                    action_name,
                    handler,
                };
                (intent_name, binding)
            })
            .collect();

        tracing::info!(intents = bindings.len(), "Intent bindings loaded");

        Self {
            bindings,
            ..Self::empty()
        }
    }

    /// Only handle intents from these sites. Empty means every site.
    pub fn with_site_ids(mut self, site_ids: Vec<String>) -> Self {
        self.site_ids = site_ids;
        self
    }

    pub fn binding(&self, intent_name: &str) -> Option<&IntentBinding> {
        self.bindings.get(intent_name)
    }

    /// Binding table summary, sorted by intent name.
    pub fn summary(&self) -> Vec<BindingSummary> {
        let mut summary: Vec<BindingSummary> = self
            .bindings
            .values()
            .map(|b| BindingSummary {
                intent: b.intent_name.clone(),
                action: b.action_name.clone(),
                handler: b.handler.as_ref().map(|h| h.kind()),
                ready: b.handler.as_ref().is_some_and(|h| h.is_ready()),
            })
            .collect();
        summary.sort_by(|a, b| a.intent.cmp(&b.intent));
        summary
    }

    pub fn is_enabled(&self) -> bool {
        self.handle_enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.handle_enabled.store(enabled, Ordering::SeqCst);
    }

    fn accepts_site(&self, site_id: &str) -> bool {
        self.site_ids.is_empty() || self.site_ids.iter().any(|s| s == site_id)
    }

    /// Exact binding, else the catch-all.
    fn lookup(&self, intent_name: &str) -> Option<&IntentBinding> {
        self.bindings
            .get(intent_name)
            .or_else(|| self.bindings.get(CATCH_ALL_INTENT))
    }

    /// Run the bound handler and build at most one speech event.
    pub async fn dispatch(&self, intent: &NluIntent) -> Option<SpeechOutput> {
        let binding = self.lookup(intent.name())?;
        let Some(handler) = binding.handler.as_ref() else {
            tracing::debug!(intent = %intent.name(), "Binding has no handler");
            return None;
        };

        tracing::debug!(
            intent = %intent.name(),
            action = ?binding.action_name,
            kind = handler.kind(),
            "Dispatching intent"
        );

        let response = match handler.handle(intent).await {
            Ok(Some(response)) => response,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    intent = %intent.name(),
                    action = ?binding.action_name,
                    "Handler failed: {}",
                    e
                );
                return None;
            }
        };

        let text = response.speech_text()?;
        Some(SpeechOutput {
            text: text.to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            site_id: intent.site_id.clone(),
            session_id: intent.session_id.clone(),
            lang: intent.lang.clone(),
        })
    }

    /// Apply toggles and the site filter, returning the intent to dispatch.
    ///
    /// Synchronous, so a caller draining messages in order sees every
    /// toggle take effect before the next message is admitted.
    pub fn admit(&self, message: InboundMessage) -> Option<NluIntent> {
        match message {
            InboundMessage::Intent(intent) => {
                if !self.is_enabled() {
                    tracing::debug!(intent = %intent.name(), "Intent handling is disabled");
                    return None;
                }
                if !self.accepts_site(&intent.site_id) {
                    tracing::debug!(site_id = %intent.site_id, "Ignoring intent from other site");
                    return None;
                }
                Some(intent)
            }
            InboundMessage::HandleToggleOn { .. } => {
                self.set_enabled(true);
                tracing::debug!("Intent handling enabled");
                None
            }
            InboundMessage::HandleToggleOff { .. } => {
                self.set_enabled(false);
                tracing::debug!("Intent handling disabled");
                None
            }
        }
    }

    /// Handle one inbound transport message.
    pub async fn on_message(&self, message: InboundMessage) -> Option<SpeechOutput> {
        let intent = self.admit(message)?;
        self.dispatch(&intent).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::actions::catalog::FactoryResult;
    use crate::actions::environment::ActionEnvironment;
    use crate::actions::handler::{HandlerResponse, HandlerSettings};
    use crate::error::ActionError;

    /// Replies with a fixed speech text and counts calls.
    struct EchoHandler {
        environment: ActionEnvironment,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IntentHandler for EchoHandler {
        fn kind(&self) -> &'static str {
            "echo"
        }
        fn environment(&self) -> &ActionEnvironment {
            &self.environment
        }
        fn initialize(&mut self) -> Result<(), ActionError> {
            Ok(())
        }
        fn is_ready(&self) -> bool {
            true
        }
        async fn handle(
            &self,
            intent: &NluIntent,
        ) -> Result<Option<HandlerResponse>, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = match self.environment.action_name() {
                "silent" => return Ok(None),
                "failing" => return Err(ActionError::Tls("boom".into())),
                "blank" => String::new(),
                action => format!("{action}:{}", intent.name()),
            };
            Ok(Some(HandlerResponse::new(json!({"speech": {"text": text}}))))
        }
    }

    struct Fixture {
        _dir: TempDir,
        registry: ActionRegistry,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(actions: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        for action in actions {
            let path = dir.path().join(action);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(
                path.join("manifest.json"),
                r#"{"type": "tests.echo.EchoHandler"}"#,
            )
            .unwrap();
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = ActionRegistry::new(dir.path(), HandlerSettings::default());
        registry.catalog_mut().register(
            "tests.echo",
            "EchoHandler",
            Arc::new(move |environment: ActionEnvironment, _: &HandlerSettings| -> FactoryResult {
                Ok(Box::new(EchoHandler {
                    environment,
                    calls: Arc::clone(&counter),
                }))
            }),
        );
        Fixture {
            _dir: dir,
            registry,
            calls,
        }
    }

    fn map(pairs: &[(&str, Option<&str>)]) -> IntentMap {
        pairs
            .iter()
            .map(|(i, a)| (i.to_string(), a.map(String::from)))
            .collect()
    }

    #[tokio::test]
    async fn dispatches_to_bound_handler() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry);

        let intent = NluIntent::new("TurnOn", "turn on")
            .with_site_id("kitchen")
            .with_session_id("s-9");
        let speech = router.dispatch(&intent).await.unwrap();
        assert_eq!(speech.text, "lights:TurnOn");
        assert_eq!(speech.site_id, "kitchen");
        assert_eq!(speech.session_id.as_deref(), Some("s-9"));
        assert!(Uuid::parse_str(&speech.correlation_id).is_ok());
    }

    #[tokio::test]
    async fn unknown_intent_falls_back_to_catch_all() {
        let mut fx = fixture(&["lights", "fallback"]);
        let router = IntentRouter::from_map(
            map(&[("TurnOn", Some("lights")), ("", Some("fallback"))]),
            &mut fx.registry,
        );

        let speech = router.dispatch(&NluIntent::new("Weather", "weather")).await.unwrap();
        assert_eq!(speech.text, "fallback:Weather");
    }

    #[tokio::test]
    async fn unknown_intent_without_catch_all_emits_nothing() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry);
        assert!(router.dispatch(&NluIntent::new("Weather", "weather")).await.is_none());
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn only_referenced_actions_are_built() {
        let mut fx = fixture(&["lights", "music"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry);
        assert!(fx.registry.has("lights"));
        assert!(!fx.registry.has("music"));
        assert!(router.binding("TurnOn").unwrap().handler().is_some());
    }

    #[tokio::test]
    async fn empty_failing_or_handlerless_bindings_emit_nothing() {
        let mut fx = fixture(&["silent", "failing", "blank"]);
        let router = IntentRouter::from_map(
            map(&[
                ("Silent", Some("silent")),
                ("Failing", Some("failing")),
                ("Blank", Some("blank")),
                ("Missing", Some("not-there")),
                ("NoAction", None),
            ]),
            &mut fx.registry,
        );

        for name in ["Silent", "Failing", "Blank", "Missing", "NoAction"] {
            assert!(router.dispatch(&NluIntent::new(name, "x")).await.is_none(), "{name}");
        }
        assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
        assert!(router.binding("Missing").unwrap().handler().is_none());
        assert_eq!(router.binding("NoAction").unwrap().action_name(), None);
    }

    #[tokio::test]
    async fn repeated_dispatch_yields_independent_events() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry);
        let intent = NluIntent::new("TurnOn", "turn on");

        let mut first = router.dispatch(&intent).await.unwrap();
        let second = router.dispatch(&intent).await.unwrap();
        assert_eq!(first.text, second.text);
        assert_ne!(first.correlation_id, second.correlation_id);

        first.text.push_str(" (edited)");
        let third = router.dispatch(&intent).await.unwrap();
        assert_eq!(third.text, "lights:TurnOn");
    }

    #[tokio::test]
    async fn toggle_messages_gate_handling() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry);
        let intent = InboundMessage::Intent(NluIntent::new("TurnOn", "turn on"));

        assert!(router.on_message(intent.clone()).await.is_some());

        router
            .on_message(InboundMessage::HandleToggleOff {
                site_id: "default".into(),
            })
            .await;
        assert!(!router.is_enabled());
        assert!(router.on_message(intent.clone()).await.is_none());

        router
            .on_message(InboundMessage::HandleToggleOn {
                site_id: "default".into(),
            })
            .await;
        assert!(router.on_message(intent).await.is_some());
    }

    #[test]
    fn admit_applies_toggles_in_order() {
        let router = IntentRouter::empty().with_site_ids(vec!["kitchen".into()]);
        let intent = || InboundMessage::Intent(NluIntent::new("TurnOn", "on").with_site_id("kitchen"));

        assert!(router.admit(intent()).is_some());
        assert!(router.admit(InboundMessage::HandleToggleOff { site_id: "kitchen".into() }).is_none());
        assert!(router.admit(intent()).is_none());
        assert!(router.admit(InboundMessage::HandleToggleOn { site_id: "kitchen".into() }).is_none());
        assert_eq!(router.admit(intent()).unwrap().name(), "TurnOn");

        let den = InboundMessage::Intent(NluIntent::new("TurnOn", "on").with_site_id("den"));
        assert!(router.admit(den).is_none());
    }

    #[tokio::test]
    async fn site_filter_ignores_other_sites() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(map(&[("TurnOn", Some("lights"))]), &mut fx.registry)
            .with_site_ids(vec!["kitchen".into()]);

        let den = NluIntent::new("TurnOn", "on").with_site_id("den");
        let kitchen = NluIntent::new("TurnOn", "on").with_site_id("kitchen");
        assert!(router.on_message(InboundMessage::Intent(den)).await.is_none());
        assert!(router.on_message(InboundMessage::Intent(kitchen)).await.is_some());
    }

    #[test]
    fn reads_intent_map_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intent_map.json");
        std::fs::write(
            &path,
            r#"{"TurnOn": {"action": "lights"}, "": {"action": "fallback"}, "Odd": {"other": 1}}"#,
        )
        .unwrap();

        let map = read_intent_map(&path).unwrap();
        assert_eq!(map["TurnOn"].as_deref(), Some("lights"));
        assert_eq!(map[""].as_deref(), Some("fallback"));
        assert_eq!(map["Odd"], None);
    }

    #[test]
    fn unreadable_intent_map_yields_empty_router() {
        let dir = TempDir::new().unwrap();
        let mut registry = ActionRegistry::new(dir.path(), HandlerSettings::default());

        let router = IntentRouter::load(&dir.path().join("missing.json"), &mut registry);
        assert!(router.summary().is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2]").unwrap();
        assert!(read_intent_map(&bad).is_err());
        let router = IntentRouter::load(&bad, &mut registry);
        assert!(router.summary().is_empty());

        let null = dir.path().join("null.json");
        std::fs::write(&null, "null").unwrap();
        assert!(read_intent_map(&null).unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_lists_bindings() {
        let mut fx = fixture(&["lights"]);
        let router = IntentRouter::from_map(
            map(&[("TurnOn", Some("lights")), ("Other", None)]),
            &mut fx.registry,
        );
        let summary = router.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].intent, "Other");
        assert_eq!(summary[0].handler, None);
        assert_eq!(summary[1].handler, Some("echo"));
        assert!(summary[1].ready);
    }
}
