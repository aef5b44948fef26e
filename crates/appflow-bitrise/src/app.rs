//! App data model: desired spec, wire payloads and remote results

use crate::error::{BitriseError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPO_PROVIDER: &str = "github";
pub const DEFAULT_REPO_TYPE: &str = "git";
pub const DEFAULT_MODE: &str = "manual";

const MAX_SLUG_LEN: usize = 128;

fn default_repo_provider() -> String {
    DEFAULT_REPO_PROVIDER.to_string()
}

fn default_repo_type() -> String {
    DEFAULT_REPO_TYPE.to_string()
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

/// Desired state of one Bitrise app
///
/// Deserialized from the `config` blob of an `app` resource. Only
/// `repo_url`, `git_repo_slug`, `project_type`, `stack_id` and `config` are
/// required; everything else has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Repository provider, e.g. "github"
    #[serde(default = "default_repo_provider", alias = "repo_provider")]
    pub provider: String,

    #[serde(default)]
    pub is_public: bool,

    /// Falls back to the provider's default organization when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_slug: Option<String>,

    pub repo_url: String,

    /// Repository type, e.g. "git"
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,

    pub git_repo_slug: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Project / OS type, e.g. "ios"
    pub project_type: String,

    pub stack_id: String,

    /// Opaque configuration name passed through to finish
    pub config: String,

    #[serde(default = "default_mode")]
    pub mode: String,
}

impl AppSpec {
    pub fn new(
        repo_url: impl Into<String>,
        git_repo_slug: impl Into<String>,
        project_type: impl Into<String>,
        stack_id: impl Into<String>,
        config: impl Into<String>,
    ) -> Self {
        Self {
            provider: default_repo_provider(),
            is_public: false,
            organization_slug: None,
            repo_url: repo_url.into(),
            repo_type: default_repo_type(),
            git_repo_slug: git_repo_slug.into(),
            git_owner: None,
            title: None,
            project_type: project_type.into(),
            stack_id: stack_id.into(),
            config: config.into(),
            mode: default_mode(),
        }
    }

    pub fn with_organization(mut self, organization_slug: impl Into<String>) -> Self {
        self.organization_slug = Some(organization_slug.into());
        self
    }

    pub fn with_owner(mut self, git_owner: impl Into<String>) -> Self {
        self.git_owner = Some(git_owner.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Reject specs whose required fields are blank
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("repo_url", &self.repo_url),
            ("git_repo_slug", &self.git_repo_slug),
            ("project_type", &self.project_type),
            ("stack_id", &self.stack_id),
            ("config", &self.config),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BitriseError::InvalidSpec(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// Body of `POST /apps/register`
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub provider: &'a str,
    pub is_public: bool,
    pub organization_slug: &'a str,
    pub repo_url: &'a str,
    #[serde(rename = "type")]
    pub repo_type: &'a str,
    pub git_repo_slug: &'a str,
    pub git_owner: &'a str,
    pub title: &'a str,
}

impl<'a> RegisterRequest<'a> {
    pub fn new(spec: &'a AppSpec, organization_slug: &'a str) -> Self {
        Self {
            provider: &spec.provider,
            is_public: spec.is_public,
            organization_slug,
            repo_url: &spec.repo_url,
            repo_type: &spec.repo_type,
            git_repo_slug: &spec.git_repo_slug,
            git_owner: spec.git_owner.as_deref().unwrap_or_default(),
            title: spec.title.as_deref().unwrap_or_default(),
        }
    }
}

/// Body of `POST /apps/{slug}/finish`
#[derive(Debug, Serialize)]
pub struct FinishRequest<'a> {
    pub project_type: &'a str,
    pub stack_id: &'a str,
    pub config: &'a str,
    pub mode: &'a str,
    pub organization_slug: &'a str,
}

impl<'a> FinishRequest<'a> {
    pub fn new(spec: &'a AppSpec, organization_slug: &'a str) -> Self {
        Self {
            project_type: &spec.project_type,
            stack_id: &spec.stack_id,
            config: &spec.config,
            mode: &spec.mode,
            organization_slug,
        }
    }
}

/// Response of `POST /apps/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub status: String,
    pub slug: AppSlug,
}

/// Response of `POST /apps/{slug}/finish`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationResult {
    pub status: String,
    pub build_trigger_token: String,
    pub branch_name: String,
    pub is_webhook_auto_reg_supported: bool,
    pub default_workflow_id: String,
}

/// Payloads carrying a remote `status` field
pub trait StatusPayload {
    fn status(&self) -> &str;
}

impl StatusPayload for RegistrationResult {
    fn status(&self) -> &str {
        &self.status
    }
}

impl StatusPayload for FinalizationResult {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Opaque app identifier assigned by Bitrise at registration
///
/// Any string is accepted on construction since the remote side owns the
/// format; [`AppSlug::path_segment`] is the gate before it enters a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppSlug(String);

impl AppSlug {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, bounded, and limited to `[A-Za-z0-9_-]`
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_SLUG_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// The slug, if it is safe to interpolate into a request path
    pub fn path_segment(&self) -> Result<&str> {
        if self.is_valid() {
            Ok(&self.0)
        } else {
            Err(BitriseError::InvalidHandle(self.0.clone()))
        }
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for AppSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AppSlug {
    fn from(slug: String) -> Self {
        Self(slug)
    }
}

impl From<&str> for AppSlug {
    fn from(slug: &str) -> Self {
        Self(slug.to_string())
    }
}

impl AsRef<str> for AppSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
