//! AppFlow provider abstraction
//!
//! This crate holds everything that is not specific to one remote platform:
//! the provider trait, desired-state types, plans, and the state file that
//! remembers remote handles between runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 host (IaC tool, CLI)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ResourceSet
//! ┌─────────────────▼───────────────────────────────┐
//! │                 appflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  reconcile: lock → plan → apply → save   │   │
//! │  │  trait CloudProvider { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Plan/Action │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │    bitrise    │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod reconcile;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use provider::{CloudProvider, ResourceConfig, ResourceSet};
pub use reconcile::{import, reconcile};
pub use state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateLock, StateManager,
};
