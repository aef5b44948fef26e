//! Bitrise provider for AppFlow
//!
//! This crate implements the CloudProvider trait for Bitrise apps. An app is
//! created in two remote calls: the repository is registered, which yields
//! an app slug, and the build configuration is then attached to that slug.
//!
//! # Requirements
//!
//! - `BITRISE_API_TOKEN` env var, or `bitrise.api_token` in the settings file
//! - Optional: `BITRISE_API_URL`, `BITRISE_TIMEOUT_SECS`,
//!   `BITRISE_ORGANIZATION`, `BITRISE_STRICT_STATUS`
//!
//! # Example
//!
//! ```ignore
//! use appflow_bitrise::{AppSpec, BitriseConfig, CreateOutcome, Provisioner};
//!
//! let config = BitriseConfig::load()?;
//! let provisioner = Provisioner::new(&config)?;
//!
//! let spec = AppSpec::new("https://github.com/x/y", "y", "ios", "osx-xcode-16", "default-ios-config")
//!     .with_organization("org1");
//!
//! match provisioner.create(&spec).await {
//!     CreateOutcome::Created { handle, result } => println!("{handle}: {}", result.branch_name),
//!     CreateOutcome::RegisteredOnly { handle, error } => eprintln!("{handle} needs cleanup: {error}"),
//!     CreateOutcome::Failed(error) => eprintln!("nothing created: {error}"),
//! }
//! ```
//!
//! # Declarative management
//!
//! ```ignore
//! use appflow_bitrise::BitriseProvider;
//! use appflow_cloud::{reconcile, ResourceConfig, ResourceSet, StateManager};
//!
//! let provider = BitriseProvider::new(&BitriseConfig::load()?)?;
//! let mut desired = ResourceSet::new();
//! desired.add(ResourceConfig::new("app", "ios-client", "bitrise", spec_json));
//!
//! let result = reconcile(&provider, &desired, &StateManager::new(".")).await?;
//! ```

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod provisioner;

pub use app::{AppSlug, AppSpec, FinalizationResult, RegistrationResult};
pub use client::{ApiClient, RawResponse};
pub use config::{BitriseConfig, StatusPolicy};
pub use error::{BitriseError, Operation, Result};
pub use provider::{BitriseProvider, RESOURCE_TYPE};
pub use provisioner::{CreateOutcome, ProvisionPhase, Provisioner};
