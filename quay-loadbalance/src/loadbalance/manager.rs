use super::registry::InMemoryRegistry;
use super::selector::{MetricsSnapshot, ProviderSelector};
use super::traits::{LoadBalancer, ProviderRegistry};
use quay_core::{
    BalancingStrategy, Config, Invocation, ProviderAction, ProviderError, ProviderId,
    RegistrySettings,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 分发请求时的错误
#[derive(Error, Debug)]
pub enum LoadBalancerError {
    #[error("Service unavailable: no provider can accept requests")]
    ServiceUnavailable,
    #[error("Selected provider rejected the request: {0}")]
    ProviderRejected(#[from] ProviderError),
}

/// 负载均衡管理器
/// 负责从注册表中选择provider并分发请求，同时记录每个provider的调用次数
pub struct LoadBalanceManager {
    registry: Arc<dyn ProviderRegistry>,
    selector: ProviderSelector,
}

impl LoadBalanceManager {
    /// 创建新的负载均衡管理器
    pub fn new(registry: Arc<dyn ProviderRegistry>, strategy: BalancingStrategy) -> Self {
        info!("Load balancer created with {} strategy", strategy);
        Self {
            registry,
            selector: ProviderSelector::new(strategy),
        }
    }

    /// 获取调用统计快照
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.selector.snapshot()
    }
}

impl LoadBalancer for LoadBalanceManager {
    fn dispatch(&self) -> Result<Invocation, LoadBalancerError> {
        // 选择器锁在前，注册表锁在后
        let Some(provider) = self.selector.select(|| self.registry.available()) else {
            warn!("No available provider to dispatch request");
            return Err(LoadBalancerError::ServiceUnavailable);
        };

        debug!("Dispatching request to provider {}", provider.id());
        Ok(ProviderAction::Get.invoke_on(&provider)?)
    }

    fn registry(&self) -> Arc<dyn ProviderRegistry> {
        Arc::clone(&self.registry)
    }

    fn set_strategy(&self, strategy: BalancingStrategy) {
        self.selector.set_strategy(strategy);
    }

    fn strategy(&self) -> BalancingStrategy {
        self.selector.strategy()
    }

    fn metrics(&self) -> HashMap<ProviderId, u64> {
        self.selector.metrics()
    }

    fn clear_metrics(&self) {
        self.selector.clear_metrics();
    }
}

/// 负载均衡器构建器
///
/// 默认使用配置中的策略，并按注册表配置创建 `InMemoryRegistry`
pub struct LoadBalancerBuilder {
    strategy: BalancingStrategy,
    registry_settings: RegistrySettings,
    registry: Option<Arc<dyn ProviderRegistry>>,
}

impl LoadBalancerBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            strategy: config.load_balancer.default_strategy,
            registry_settings: config.registry.clone(),
            registry: None,
        }
    }

    pub fn with_strategy(mut self, strategy: BalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> LoadBalanceManager {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(InMemoryRegistry::new(self.registry_settings)));
        LoadBalanceManager::new(registry, self.strategy)
    }
}
