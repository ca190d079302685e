//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration, read from the process environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Profile root directory.
    pub profile_dir: PathBuf,
    /// Action repository: one subdirectory per action.
    pub actions_dir: PathBuf,
    /// Intent name → action name map.
    pub intent_map_path: PathBuf,
    /// Sites whose intents are handled. Empty means every site.
    pub site_ids: Vec<String>,
    /// Fallback bearer token for the Home Assistant handler.
    pub fallback_token: Option<SecretString>,
    /// Serve the HTTP ingress on this port instead of the CLI channel.
    pub http_port: Option<u16>,
    /// Directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile_dir = lookup("RHASSPY_PROFILE_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("RHASSPY_PROFILE_DIR".to_string()))?;

        let actions_dir = lookup("INTENT_ACTION_REPOSITORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| profile_dir.join("actions"));

        let intent_map_path = lookup("INTENT_ACTION_MAP")
            .map(PathBuf::from)
            .unwrap_or_else(|| profile_dir.join("intent_map.json"));

        let site_ids: Vec<String> = lookup("INTENT_ACTION_SITE_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let fallback_token = lookup("HASSIO_TOKEN")
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let http_port = match lookup("INTENT_ACTION_HTTP_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "INTENT_ACTION_HTTP_PORT".to_string(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let log_dir = lookup("INTENT_ACTION_LOG_DIR").map(PathBuf::from);

        Ok(Self {
            profile_dir,
            actions_dir,
            intent_map_path,
            site_ids,
            fallback_token,
            http_port,
            log_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_derive_from_profile_dir() {
        let config = ServiceConfig::from_lookup(lookup(&[("RHASSPY_PROFILE_DIR", "/profile")]))
            .unwrap();
        assert_eq!(config.actions_dir, PathBuf::from("/profile/actions"));
        assert_eq!(
            config.intent_map_path,
            PathBuf::from("/profile/intent_map.json")
        );
        assert!(config.site_ids.is_empty());
        assert!(config.fallback_token.is_none());
        assert!(config.http_port.is_none());
    }

    #[test]
    fn missing_profile_dir_is_an_error() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "RHASSPY_PROFILE_DIR"));
    }

    #[test]
    fn overrides_are_honored() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("RHASSPY_PROFILE_DIR", "/profile"),
            ("INTENT_ACTION_REPOSITORY", "/srv/actions"),
            ("INTENT_ACTION_SITE_IDS", "kitchen, den,,"),
            ("HASSIO_TOKEN", "supervisor"),
            ("INTENT_ACTION_HTTP_PORT", "12101"),
        ]))
        .unwrap();
        assert_eq!(config.actions_dir, PathBuf::from("/srv/actions"));
        assert_eq!(config.site_ids, vec!["kitchen", "den"]);
        assert_eq!(
            config.fallback_token.as_ref().unwrap().expose_secret(),
            "supervisor"
        );
        assert_eq!(config.http_port, Some(12101));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("RHASSPY_PROFILE_DIR", "/profile"),
            ("INTENT_ACTION_HTTP_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
