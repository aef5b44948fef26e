//! Connection configuration for the Bitrise API
//!
//! The API token is never compiled in. It comes from `BITRISE_API_TOKEN` or
//! the `bitrise.api_token` key of the AppFlow settings file.

use crate::error::{BitriseError, Result};
use appflow_config::ProviderSettings;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.bitrise.io/v0.1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_ENV: &str = "BITRISE_API_TOKEN";
const URL_ENV: &str = "BITRISE_API_URL";
const TIMEOUT_ENV: &str = "BITRISE_TIMEOUT_SECS";
const ORGANIZATION_ENV: &str = "BITRISE_ORGANIZATION";
const STRICT_ENV: &str = "BITRISE_STRICT_STATUS";

/// How remote responses are judged before being accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Accept any body that decodes, whatever the HTTP status or `status` field
    #[default]
    Lenient,
    /// Require a 2xx HTTP status and a `status` of "ok" or "success"
    Strict,
}

impl StatusPolicy {
    pub fn accepts(&self, http_status: u16, status: &str) -> bool {
        match self {
            StatusPolicy::Lenient => true,
            StatusPolicy::Strict => {
                (200..300).contains(&http_status)
                    && matches!(status.to_ascii_lowercase().as_str(), "ok" | "success")
            }
        }
    }
}

/// Bitrise API configuration
#[derive(Clone)]
pub struct BitriseConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Used when a spec carries no organization_slug
    pub default_organization: Option<String>,
    pub status_policy: StatusPolicy,
}

impl std::fmt::Debug for BitriseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitriseConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("default_organization", &self.default_organization)
            .field("status_policy", &self.status_policy)
            .finish()
    }
}

impl BitriseConfig {
    /// Configuration with default endpoint and timeout
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            default_organization: None,
            status_policy: StatusPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_organization(mut self, organization: impl Into<String>) -> Self {
        self.default_organization = Some(organization.into());
        self
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Create BitriseConfig from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::from_settings(&ProviderSettings::default())
    }

    /// Settings file discovered by appflow-config, overridden by environment variables
    pub fn load() -> Result<Self> {
        let settings = appflow_config::load_settings()?;
        Self::from_settings(&settings.bitrise)
    }

    /// Layer environment variables over file settings
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_token = env_non_empty(TOKEN_ENV)
            .or_else(|| settings.api_token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(BitriseError::MissingCredential(TOKEN_ENV))?;

        let mut config = Self::new(api_token);

        if let Some(url) = env_non_empty(URL_ENV).or_else(|| settings.endpoint.clone()) {
            config.base_url = url;
        }

        if let Some(raw) = env_non_empty(TIMEOUT_ENV) {
            let secs = raw.parse::<u64>().map_err(|_| {
                BitriseError::InvalidConfig(format!("{} must be a number of seconds: {}", TIMEOUT_ENV, raw))
            })?;
            config.timeout = Duration::from_secs(secs);
        } else if let Some(secs) = settings.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }

        config.default_organization =
            env_non_empty(ORGANIZATION_ENV).or_else(|| settings.organization.clone());

        let strict = match env_non_empty(STRICT_ENV) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                BitriseError::InvalidConfig(format!("{} must be true or false: {}", STRICT_ENV, raw))
            })?,
            None => settings.strict_status.unwrap_or(false),
        };
        if strict {
            config.status_policy = StatusPolicy::Strict;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(BitriseError::InvalidConfig(format!(
                "base URL must start with http:// or https://: {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(BitriseError::InvalidConfig("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_ENV: [&str; 5] = [TOKEN_ENV, URL_ENV, TIMEOUT_ENV, ORGANIZATION_ENV, STRICT_ENV];

    fn without_env<R>(f: impl FnOnce() -> R) -> R {
        temp_env::with_vars_unset(ALL_ENV, f)
    }

    #[test]
    #[serial]
    fn test_missing_token() {
        let result = without_env(BitriseConfig::from_env);
        assert!(matches!(result, Err(BitriseError::MissingCredential(TOKEN_ENV))));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let config = without_env(|| {
            temp_env::with_var(TOKEN_ENV, Some("tok"), BitriseConfig::from_env)
        })
        .unwrap();

        assert_eq!(config.api_token, "tok");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.status_policy, StatusPolicy::Lenient);
        assert!(config.default_organization.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides_settings() {
        let settings = ProviderSettings {
            api_token: Some("file-token".to_string()),
            endpoint: Some("https://file.example".to_string()),
            timeout_secs: Some(30),
            organization: Some("file-org".to_string()),
            strict_status: Some(false),
        };

        let config = without_env(|| {
            temp_env::with_vars(
                [
                    (TOKEN_ENV, Some("env-token")),
                    (TIMEOUT_ENV, Some("5")),
                    (STRICT_ENV, Some("true")),
                ],
                || BitriseConfig::from_settings(&settings),
            )
        })
        .unwrap();

        assert_eq!(config.api_token, "env-token");
        assert_eq!(config.base_url, "https://file.example");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.default_organization.as_deref(), Some("file-org"));
        assert_eq!(config.status_policy, StatusPolicy::Strict);
    }

    #[test]
    #[serial]
    fn test_invalid_timeout() {
        let result = without_env(|| {
            temp_env::with_vars(
                [(TOKEN_ENV, Some("tok")), (TIMEOUT_ENV, Some("soon"))],
                BitriseConfig::from_env,
            )
        });
        assert!(matches!(result, Err(BitriseError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = BitriseConfig::new("tok").with_base_url("ftp://example.com");
        assert!(config.validate().is_err());
        assert!(BitriseConfig::new("tok").validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = BitriseConfig::new("super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_status_policy() {
        assert!(StatusPolicy::Lenient.accepts(500, "error"));
        assert!(StatusPolicy::Strict.accepts(200, "ok"));
        assert!(StatusPolicy::Strict.accepts(201, "success"));
        assert!(!StatusPolicy::Strict.accepts(200, "error"));
        assert!(!StatusPolicy::Strict.accepts(422, "ok"));
    }
}
