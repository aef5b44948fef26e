//! Drives a provider against the persisted state
//!
//! The state file is locked for the whole run and is saved even when some
//! actions fail, so handles of partially created resources are not lost.

use crate::action::ApplyResult;
use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, ResourceSet};
use crate::state::StateManager;

/// Plan and apply `desired` for one provider, then persist the outcome
pub async fn reconcile(
    provider: &dyn CloudProvider,
    desired: &ResourceSet,
    manager: &StateManager,
) -> Result<ApplyResult> {
    let lock = manager.acquire_lock().await?;
    let mut global = manager.load().await?;

    let desired = desired.for_provider(provider.name());
    let mut current = global.provider_state(provider.name());

    let plan = provider.plan(&desired, &current).await?;
    tracing::info!("{}: {}", provider.display_name(), plan.summary());

    let applied = provider.apply(&plan, &mut current).await;

    global.replace_provider_state(provider.name(), current);
    manager.save(&global).await?;
    lock.release().await?;

    let result = applied?;
    if !result.is_success() {
        tracing::warn!(
            "{}: {} action(s) failed, {} left a remote artifact",
            provider.display_name(),
            result.failed.len(),
            result.partial().count()
        );
    }
    Ok(result)
}

/// Adopt an existing remote entity under `type:id`
pub async fn import(
    provider: &dyn CloudProvider,
    manager: &StateManager,
    resource_type: &str,
    id: &str,
    handle: &str,
) -> Result<()> {
    let lock = manager.acquire_lock().await?;
    let mut global = manager.load().await?;

    let key = format!("{}:{}:{}", provider.name(), resource_type, id);
    if global.get_resource(&key).is_some() {
        return Err(CloudError::ResourceAlreadyExists(key));
    }

    let resource = provider.import(resource_type, handle).await?;
    tracing::info!("Imported {} as {}", handle, key);
    global.set_resource(key, resource);

    manager.save(&global).await?;
    lock.release().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionType, Plan};
    use crate::provider::ResourceConfig;
    use crate::state::{ProviderState, ResourceState, ResourceStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    /// Creates every missing resource with a handle derived from its id
    struct EchoProvider;

    #[async_trait]
    impl CloudProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn display_name(&self) -> &str {
            "Echo"
        }

        async fn plan(&self, desired: &ResourceSet, current: &ProviderState) -> Result<Plan> {
            let actions = desired
                .iter()
                .map(|r| {
                    let action_type = if current.get(&r.key()).is_some() {
                        ActionType::NoOp
                    } else {
                        ActionType::Create
                    };
                    Action::new(action_type, &r.resource_type, &r.id, "")
                        .with_desired(r.config.clone())
                })
                .collect();
            Ok(Plan::new(actions))
        }

        async fn apply(&self, plan: &Plan, state: &mut ProviderState) -> Result<ApplyResult> {
            let mut result = ApplyResult::new();
            for action in &plan.actions {
                if action.action_type != ActionType::Create {
                    continue;
                }
                let handle = format!("h-{}", action.resource_id);
                state.add(
                    action.resource_key(),
                    ResourceState::new(&handle, &action.resource_type)
                        .with_status(ResourceStatus::Provisioned),
                );
                result.add_success(action, "created", Some(handle));
            }
            Ok(result)
        }

        async fn import(&self, resource_type: &str, handle: &str) -> Result<ResourceState> {
            Ok(ResourceState::new(handle, resource_type).with_status(ResourceStatus::Imported))
        }
    }

    #[tokio::test]
    async fn test_reconcile_persists_and_is_stable() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let desired: ResourceSet = [
            ResourceConfig::new("app", "a", "echo", json!({})),
            ResourceConfig::new("app", "other", "someone-else", json!({})),
        ]
        .into_iter()
        .collect();

        let first = reconcile(&EchoProvider, &desired, &manager).await.unwrap();
        assert_eq!(first.succeeded.len(), 1);

        let state = manager.load().await.unwrap();
        assert_eq!(state.get_resource("echo:app:a").unwrap().handle, "h-a");
        assert!(state.get_resource("echo:app:other").is_none());

        let second = reconcile(&EchoProvider, &desired, &manager).await.unwrap();
        assert!(second.succeeded.is_empty());
        assert!(!temp_dir.path().join(".appflow/lock.json").exists());
    }

    #[tokio::test]
    async fn test_import_rejects_existing_key() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        import(&EchoProvider, &manager, "app", "legacy", "slug-1")
            .await
            .unwrap();
        let state = manager.load().await.unwrap();
        let resource = state.get_resource("echo:app:legacy").unwrap();
        assert_eq!(resource.status, ResourceStatus::Imported);

        let err = import(&EchoProvider, &manager, "app", "legacy", "slug-2")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    }
}
