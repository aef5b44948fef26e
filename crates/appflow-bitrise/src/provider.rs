//! Bitrise provider implementation
//!
//! Only creation talks to Bitrise. Updates and deletes are recorded in
//! state alone: there is no remote update endpoint in use, and forgetting an
//! app never deletes it remotely.

use crate::app::{AppSlug, AppSpec, FinalizationResult};
use crate::config::BitriseConfig;
use crate::error::Result;
use crate::provisioner::{CreateOutcome, Provisioner};
use appflow_cloud::{
    Action, ActionType, ApplyResult, CloudError, CloudProvider, Plan, ProviderState, ResourceSet,
    ResourceState, ResourceStatus,
};
use async_trait::async_trait;

/// Resource type handled by this provider
pub const RESOURCE_TYPE: &str = "app";

/// Bitrise provider
#[derive(Debug, Clone)]
pub struct BitriseProvider {
    provisioner: Provisioner,
}

impl BitriseProvider {
    pub fn new(config: &BitriseConfig) -> Result<Self> {
        Ok(Self {
            provisioner: Provisioner::new(config)?,
        })
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    async fn apply_create(&self, action: &Action, state: &mut ProviderState, result: &mut ApplyResult) {
        let Some(desired) = &action.desired else {
            result.add_failure(action, "desired configuration is missing", action.handle.clone());
            return;
        };
        let spec: AppSpec = match serde_json::from_value(desired.clone()) {
            Ok(spec) => spec,
            Err(e) => {
                result.add_failure(action, format!("invalid app spec: {}", e), action.handle.clone());
                return;
            }
        };

        let outcome = match &action.handle {
            Some(handle) => {
                let handle = AppSlug::new(handle.as_str());
                tracing::info!("Resuming finish for registered app {}", handle);
                match self.provisioner.finalize(&spec, &handle).await {
                    Ok(finished) => CreateOutcome::Created {
                        handle,
                        result: finished,
                    },
                    Err(error) => CreateOutcome::RegisteredOnly { handle, error },
                }
            }
            None => {
                tracing::info!("Creating app: {}", action.resource_id);
                self.provisioner.create(&spec).await
            }
        };

        let key = action.resource_key();
        match outcome {
            CreateOutcome::Created {
                handle,
                result: finished,
            } => {
                let resource = record(state, &key, &handle, ResourceStatus::Provisioned, desired);
                set_finalization_attributes(resource, &finished);
                result.add_success(
                    action,
                    format!("アプリ {} を作成しました ({})", action.resource_id, handle),
                    Some(handle.into_inner()),
                );
            }
            CreateOutcome::RegisteredOnly { handle, error } if !handle.is_valid() => {
                // Nothing addressable was registered; the next plan starts over
                if state.remove(&key).is_some() {
                    tracing::debug!("Dropped unusable handle {:?} for {}", handle.as_str(), key);
                }
                result.add_failure(action, error.to_string(), None);
            }
            CreateOutcome::RegisteredOnly { handle, error } => {
                record(state, &key, &handle, ResourceStatus::Registered, desired);
                result.add_failure(
                    action,
                    format!("アプリ {} は登録済みですが finish に失敗しました: {}", handle, error),
                    Some(handle.into_inner()),
                );
            }
            CreateOutcome::Failed(error) => {
                result.add_failure(action, error.to_string(), None);
            }
        }
    }
}

/// Insert or refresh the state entry for `key`, keeping its creation time
fn record<'a>(
    state: &'a mut ProviderState,
    key: &str,
    handle: &AppSlug,
    status: ResourceStatus,
    desired: &serde_json::Value,
) -> &'a mut ResourceState {
    let entry = state
        .resources
        .entry(key.to_string())
        .or_insert_with(|| ResourceState::new(handle.as_str(), RESOURCE_TYPE));
    entry.handle = handle.as_str().to_string();
    entry.set_status(status);
    entry.set_config(desired.clone());
    entry
}

fn set_finalization_attributes(resource: &mut ResourceState, finished: &FinalizationResult) {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(finished) {
        for (key, value) in fields {
            resource.set_attribute(key, value);
        }
    }
}

#[async_trait]
impl CloudProvider for BitriseProvider {
    fn name(&self) -> &str {
        "bitrise"
    }

    fn display_name(&self) -> &str {
        "Bitrise"
    }

    async fn plan(&self, desired: &ResourceSet, current: &ProviderState) -> appflow_cloud::Result<Plan> {
        let mut actions = Vec::new();

        for resource in desired.iter() {
            if resource.resource_type != RESOURCE_TYPE {
                tracing::debug!("Skipping unsupported resource type: {}", resource.key());
                continue;
            }

            // A broken spec fails the plan instead of half of an apply
            let spec: AppSpec = resource.parse()?;
            spec.validate().map_err(|e| CloudError::InvalidResource {
                key: resource.key(),
                message: e.to_string(),
            })?;

            let action = match current.get(&resource.key()) {
                None => Action::new(
                    ActionType::Create,
                    RESOURCE_TYPE,
                    &resource.id,
                    format!("アプリ {} を作成 ({})", resource.id, spec.repo_url),
                )
                .with_desired(resource.config.clone()),
                Some(existing)
                    if existing.status == ResourceStatus::Registered
                        && !AppSlug::new(existing.handle.as_str()).is_valid() =>
                {
                    Action::new(
                        ActionType::Create,
                        RESOURCE_TYPE,
                        &resource.id,
                        format!("アプリ {} を再登録 (handle {:?} は無効)", resource.id, existing.handle),
                    )
                    .with_desired(resource.config.clone())
                }
                Some(existing) if existing.status == ResourceStatus::Registered => Action::new(
                    ActionType::Create,
                    RESOURCE_TYPE,
                    &resource.id,
                    format!("登録済みアプリ {} の finish を再実行", existing.handle),
                )
                .with_desired(resource.config.clone())
                .with_handle(&existing.handle),
                Some(existing) if existing.config != resource.config => Action::new(
                    ActionType::Update,
                    RESOURCE_TYPE,
                    &resource.id,
                    format!("アプリ {} の設定を更新 (state のみ)", existing.handle),
                )
                .with_desired(resource.config.clone())
                .with_handle(&existing.handle),
                Some(existing) => Action::new(
                    ActionType::NoOp,
                    RESOURCE_TYPE,
                    &resource.id,
                    format!("アプリ {} は最新です", existing.handle),
                )
                .with_handle(&existing.handle),
            };
            actions.push(action);
        }

        let prefix = format!("{}:", RESOURCE_TYPE);
        for (key, existing) in current.iter() {
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            if desired.get(RESOURCE_TYPE, id).is_none() {
                actions.push(
                    Action::new(
                        ActionType::Delete,
                        RESOURCE_TYPE,
                        id,
                        format!("アプリ {} を管理対象から外す", existing.handle),
                    )
                    .with_handle(&existing.handle),
                );
            }
        }

        Ok(Plan::new(actions))
    }

    async fn apply(&self, plan: &Plan, state: &mut ProviderState) -> appflow_cloud::Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        for action in &plan.actions {
            if action.resource_type != RESOURCE_TYPE {
                result.add_failure(
                    action,
                    format!("未対応のリソースタイプ: {}", action.resource_type),
                    None,
                );
                continue;
            }

            let key = action.resource_key();
            match action.action_type {
                ActionType::Create => self.apply_create(action, state, &mut result).await,
                ActionType::Update => match (state.resources.get_mut(&key), &action.desired) {
                    (Some(existing), Some(desired)) => {
                        existing.set_config(desired.clone());
                        result.add_success(
                            action,
                            format!("アプリ {} の設定を記録しました", existing.handle),
                            Some(existing.handle.clone()),
                        );
                    }
                    _ => result.add_failure(
                        action,
                        format!("state にアプリがありません: {}", key),
                        action.handle.clone(),
                    ),
                },
                ActionType::Delete => match state.remove(&key) {
                    Some(removed) => {
                        tracing::warn!(
                            "Forgetting app {}; it still exists on Bitrise and must be deleted there",
                            removed.handle
                        );
                        result.add_success(
                            action,
                            format!("アプリ {} を管理対象から外しました", removed.handle),
                            Some(removed.handle),
                        );
                    }
                    None => tracing::debug!("{} already absent from state", key),
                },
                ActionType::NoOp => {}
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn import(&self, resource_type: &str, handle: &str) -> appflow_cloud::Result<ResourceState> {
        if resource_type != RESOURCE_TYPE {
            return Err(CloudError::InvalidConfig(format!(
                "未対応のリソースタイプ: {}",
                resource_type
            )));
        }
        let slug = AppSlug::new(handle);
        slug.path_segment().map_err(|e| CloudError::InvalidResource {
            key: format!("{}:{}", RESOURCE_TYPE, handle),
            message: e.to_string(),
        })?;

        Ok(ResourceState::new(slug.into_inner(), RESOURCE_TYPE).with_status(ResourceStatus::Imported))
    }
}
