//! Two-phase app provisioning
//!
//! Bitrise creates an app in two calls: `register` returns a slug, and
//! `finish` attaches the build configuration to that slug. Nothing rolls
//! back a registration whose finish failed, so [`CreateOutcome`] keeps that
//! partial state visible to the caller.

use crate::app::{
    AppSlug, AppSpec, FinalizationResult, FinishRequest, RegisterRequest, RegistrationResult,
    StatusPayload,
};
use crate::client::{ApiClient, RawResponse};
use crate::config::{BitriseConfig, StatusPolicy};
use crate::error::{BitriseError, Operation, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio::time::Instant;

const REGISTER_PATH: &str = "apps/register";

/// Furthest point a create call reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    Unregistered,
    Registered,
    Finalized,
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionPhase::Unregistered => write!(f, "unregistered"),
            ProvisionPhase::Registered => write!(f, "registered"),
            ProvisionPhase::Finalized => write!(f, "finalized"),
        }
    }
}

/// Result of [`Provisioner::create`]
#[derive(Debug)]
pub enum CreateOutcome {
    /// Both phases succeeded
    Created {
        handle: AppSlug,
        result: FinalizationResult,
    },
    /// Registered remotely, finish failed; the app exists half-configured
    RegisteredOnly {
        handle: AppSlug,
        error: BitriseError,
    },
    /// Failed before anything was registered
    Failed(BitriseError),
}

impl CreateOutcome {
    pub fn handle(&self) -> Option<&AppSlug> {
        match self {
            CreateOutcome::Created { handle, .. } | CreateOutcome::RegisteredOnly { handle, .. } => {
                Some(handle)
            }
            CreateOutcome::Failed(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created { .. })
    }

    pub fn phase(&self) -> ProvisionPhase {
        match self {
            CreateOutcome::Created { .. } => ProvisionPhase::Finalized,
            CreateOutcome::RegisteredOnly { .. } => ProvisionPhase::Registered,
            CreateOutcome::Failed(_) => ProvisionPhase::Unregistered,
        }
    }

    /// Collapse into a plain result; a partial create becomes
    /// [`BitriseError::FinalizeAfterRegister`] naming the handle
    pub fn into_result(self) -> Result<FinalizationResult> {
        match self {
            CreateOutcome::Created { result, .. } => Ok(result),
            CreateOutcome::RegisteredOnly { handle, error } => {
                Err(BitriseError::FinalizeAfterRegister {
                    handle: handle.into_inner(),
                    source: Box::new(error),
                })
            }
            CreateOutcome::Failed(error) => Err(error),
        }
    }
}

/// Realizes [`AppSpec`]s as Bitrise apps
#[derive(Debug, Clone)]
pub struct Provisioner {
    client: ApiClient,
    default_organization: Option<String>,
    policy: StatusPolicy,
}

impl Provisioner {
    pub fn new(config: &BitriseConfig) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(config)?,
            default_organization: config.default_organization.clone(),
            policy: config.status_policy,
        })
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.policy
    }

    fn organization<'a>(&'a self, spec: &'a AppSpec) -> Result<&'a str> {
        spec.organization_slug
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .or(self.default_organization.as_deref())
            .ok_or_else(|| {
                BitriseError::InvalidSpec(
                    "organization_slug is not set and no default organization is configured"
                        .to_string(),
                )
            })
    }

    /// Phase 1: register the repository and return the new app slug
    pub async fn register(&self, spec: &AppSpec) -> Result<AppSlug> {
        spec.validate()?;
        let organization = self.organization(spec)?;
        let payload = RegisterRequest::new(spec, organization);

        let response = self
            .client
            .send(Method::POST, REGISTER_PATH, Some(&payload))
            .await?;
        let registered: RegistrationResult = self.decode(Operation::Register, &response)?;

        tracing::info!(
            "Registered {} as app {} (status {:?})",
            spec.repo_url,
            registered.slug,
            registered.status
        );
        Ok(registered.slug)
    }

    /// Phase 2: attach build configuration to a registered app
    pub async fn finalize(&self, spec: &AppSpec, handle: &AppSlug) -> Result<FinalizationResult> {
        let segment = handle.path_segment()?;
        spec.validate()?;
        let organization = self.organization(spec)?;
        let payload = FinishRequest::new(spec, organization);

        let path = format!("apps/{}/finish", segment);
        let response = self.client.send(Method::POST, &path, Some(&payload)).await?;
        let finished: FinalizationResult = self.decode(Operation::Finalize, &response)?;

        tracing::info!(
            "Finalized app {} (stack {}, branch {})",
            handle,
            spec.stack_id,
            finished.branch_name
        );
        Ok(finished)
    }

    /// Register then finalize; finalize runs only after a successful register
    pub async fn create(&self, spec: &AppSpec) -> CreateOutcome {
        self.create_bounded(spec, None).await
    }

    /// Like [`create`](Self::create), with both phases bounded by `deadline`
    pub async fn create_until(&self, spec: &AppSpec, deadline: Instant) -> CreateOutcome {
        self.create_bounded(spec, Some(deadline)).await
    }

    async fn create_bounded(&self, spec: &AppSpec, deadline: Option<Instant>) -> CreateOutcome {
        let handle = match bounded(deadline, Operation::Register, self.register(spec)).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!("Create of {} failed before registration: {}", spec.repo_url, error);
                return CreateOutcome::Failed(error);
            }
        };
        tracing::debug!("App {}: {}", handle, ProvisionPhase::Registered);

        match bounded(deadline, Operation::Finalize, self.finalize(spec, &handle)).await {
            Ok(result) => {
                tracing::debug!("App {}: {}", handle, ProvisionPhase::Finalized);
                CreateOutcome::Created { handle, result }
            }
            Err(error) => {
                tracing::warn!(
                    "App {} was registered but finish failed, manual cleanup or a retried finish is needed: {}",
                    handle,
                    error
                );
                CreateOutcome::RegisteredOnly { handle, error }
            }
        }
    }

    fn decode<T>(&self, operation: Operation, response: &RawResponse) -> Result<T>
    where
        T: DeserializeOwned + StatusPayload,
    {
        let http_status = response.status.as_u16();
        let payload: T =
            serde_json::from_slice(&response.body).map_err(|source| BitriseError::Decode {
                operation,
                http_status,
                source,
            })?;

        if !self.policy.accepts(http_status, payload.status()) {
            return Err(BitriseError::Rejected {
                operation,
                http_status,
                status: payload.status().to_string(),
            });
        }
        if !response.status.is_success() {
            tracing::warn!(
                "Accepting {} response with HTTP {} (status {:?})",
                operation,
                http_status,
                payload.status()
            );
        }
        Ok(payload)
    }
}

async fn bounded<T>(
    deadline: Option<Instant>,
    operation: Operation,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(BitriseError::DeadlineExceeded(operation)),
        },
        None => call.await,
    }
}
