//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::registry::SectionRegistry;

/// Client configuration for talking to the onboarding service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the onboarding service, without trailing slash.
    pub api_url: String,
    /// Bearer token forwarded on every request, if set.
    pub api_token: Option<SecretString>,
    /// Which wizard variant to drive.
    pub registry: SectionRegistry,
    /// Transport-level timeout for every request.
    pub http_timeout: Duration,
    /// Client-side limit for the final "submit everything" action.
    pub final_submit_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            registry: SectionRegistry::full(),
            http_timeout: Duration::from_secs(120),
            final_submit_timeout: Duration::from_secs(30),
        }
    }

    /// Build from `ONBOARDING_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("ONBOARDING_API_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("ONBOARDING_API_URL".to_string()))?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_API_URL".to_string(),
                message: format!("expected an http(s) URL, got {api_url}"),
            });
        }

        let mut config = Self::new(api_url);

        config.api_token = lookup("ONBOARDING_API_TOKEN")
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        config.registry = match lookup("ONBOARDING_WIZARD").as_deref().map(str::trim) {
            None | Some("") | Some("full") => SectionRegistry::full(),
            Some("legacy") => SectionRegistry::legacy(),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "ONBOARDING_WIZARD".to_string(),
                    message: format!("expected full or legacy, got {other}"),
                });
            }
        };

        if let Some(secs) = parse_secs(&lookup, "ONBOARDING_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "ONBOARDING_FINAL_SUBMIT_TIMEOUT_SECS")? {
            config.final_submit_timeout = secs;
        }

        Ok(config)
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected whole seconds, got {raw}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(Duration::from_secs(secs)))
}
