use super::capacity::CapacityTracker;
use super::invocation::{Invocation, Work};
use super::status::StatusSender;
use super::traits::Provider;
use super::types::{ProviderError, ProviderId, ProviderStatus};
use crate::config::model::LoadBalancerSettings;
use async_trait::async_trait;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

/// 进程内provider
///
/// 常规请求直接返回自己的标识，容量与状态由 `CapacityTracker` 管理
pub struct InMemoryProvider {
    id: ProviderId,
    capacity: Arc<CapacityTracker>,
}

impl InMemoryProvider {
    pub fn new(settings: &LoadBalancerSettings, notifier: StatusSender) -> Self {
        Self::with_id(ProviderId::random(), settings, notifier)
    }

    pub fn with_id(id: ProviderId, settings: &LoadBalancerSettings, notifier: StatusSender) -> Self {
        let capacity = Arc::new(CapacityTracker::new(
            id.clone(),
            settings.max_concurrent_workers_per_provider,
            settings.teardown_grace_period(),
            notifier,
        ));
        info!("New provider instance spawned: {}", id);
        Self { id, capacity }
    }

    pub fn status(&self) -> ProviderStatus {
        self.capacity.status()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.in_flight()
    }

    pub fn concurrency_limit(&self) -> usize {
        self.capacity.concurrency_limit()
    }

    /// 模拟外部故障或恢复，只影响健康检查的观测结果
    pub fn set_health(&self, status: ProviderStatus) {
        self.capacity.set_health(status);
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn get(&self) -> String {
        debug!("Invoked on provider {}", self.id);
        self.id.to_string()
    }

    fn probe(&self) -> ProviderStatus {
        self.capacity.status()
    }

    fn invoke(&self, work: Work) -> Result<Invocation, ProviderError> {
        self.capacity.submit(work)
    }

    async fn teardown(&self) -> bool {
        self.capacity.teardown().await
    }
}

impl fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("id", &self.id)
            .field("status", &self.capacity.status())
            .field("in_flight", &self.capacity.in_flight())
            .finish()
    }
}

impl PartialEq for InMemoryProvider {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InMemoryProvider {}

impl Hash for InMemoryProvider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
