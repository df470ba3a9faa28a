use super::registry::{InMemoryRegistry, RegistryError, RegistryShared};
use super::traits::ProviderRegistry;
use quay_core::{
    Invocation, Provider, ProviderAction, ProviderError, ProviderStatus, RegistrySettings, Reply,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 熔断器关闭所需的连续健康检查成功次数
pub const CONSECUTIVE_SUCCESSES_TO_CLOSE: u32 = 2;

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// 单轮健康检查后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

/// 单个provider的健康检查任务（简单熔断器）
///
/// 定期探测provider状态，与请求流量无关：
/// - 探测失败（超时、取消、错误）视为 `OutOfService`，熔断器打开并从注册表注销；
///   熔断期间每次失败都会再次注销
/// - 超时的探测不会被取消，下一轮继续等待它而不是再提交一个
/// - 熔断器打开后连续两次健康则关闭并重新注册，注册失败时teardown该provider
/// - 观测到 `TearDown` 时永久停止
pub struct HealthSupervisor {
    provider: Arc<dyn Provider>,
    registry: Weak<RegistryShared>,
    check_interval: Duration,
    check_timeout: Duration,
    cancel: CancellationToken,
    circuit: CircuitState,
    consecutive_successes: u32,
    pending: Option<Invocation>,
}

impl HealthSupervisor {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        registry: Weak<RegistryShared>,
        settings: &RegistrySettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            registry,
            check_interval: settings.health_check_interval(),
            check_timeout: settings.health_check_timeout(),
            cancel,
            circuit: CircuitState::Closed,
            consecutive_successes: 0,
            pending: None,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let provider_id = self.provider.id().clone();
        let cancel = self.cancel.clone();
        info!(
            "Starting health supervisor for provider {} with interval: {:?}",
            provider_id, self.check_interval
        );

        loop {
            let observed = tokio::select! {
                _ = cancel.cancelled() => break,
                status = self.observe() => status,
            };

            if self.on_observation(observed).await == Step::Stop {
                if let Some(shared) = self.registry.upgrade() {
                    InMemoryRegistry::from_shared(shared).forget(&provider_id);
                }
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        info!("Health supervisor for provider {} stopped", provider_id);
    }

    /// 通过provider的有界执行器发起一次健康检查
    async fn observe(&mut self) -> ProviderStatus {
        let mut invocation = match self.pending.take() {
            Some(invocation) => invocation,
            None => match ProviderAction::HealthCheck.invoke_on(&self.provider) {
                Ok(invocation) => invocation,
                Err(ProviderError::TornDown(_)) => return ProviderStatus::TearDown,
            },
        };

        match tokio::time::timeout(self.check_timeout, &mut invocation).await {
            Ok(Ok(Reply::Health(status))) => status,
            Ok(Ok(other)) => {
                warn!(
                    "Unexpected health check reply from provider {}: {:?}",
                    self.provider.id(),
                    other
                );
                ProviderStatus::OutOfService
            }
            Ok(Err(e)) => {
                warn!("Health check failed for provider {}: {}", self.provider.id(), e);
                ProviderStatus::OutOfService
            }
            Err(_) => {
                // 不取消，留到下一轮继续等待
                self.pending = Some(invocation);
                warn!(
                    "Unable to reach health check for provider {}, timeout after {}ms",
                    self.provider.id(),
                    self.check_timeout.as_millis()
                );
                ProviderStatus::OutOfService
            }
        }
    }

    async fn on_observation(&mut self, status: ProviderStatus) -> Step {
        let Some(shared) = self.registry.upgrade() else {
            debug!("Registry for provider {} is gone", self.provider.id());
            return Step::Stop;
        };
        let registry = InMemoryRegistry::from_shared(shared);

        match status {
            ProviderStatus::TearDown => {
                debug!("Provider {} is torn down, stopping health checks", self.provider.id());
                Step::Stop
            }
            ProviderStatus::OutOfService => {
                self.consecutive_successes = 0;
                if self.circuit == CircuitState::Closed {
                    info!("Open circuit breaker for provider {}", self.provider.id());
                    self.circuit = CircuitState::Open;
                }
                // 熔断期间调用方可能已重新注册
                registry.deregister(self.provider.as_ref());
                Step::Continue
            }
            ProviderStatus::Ok | ProviderStatus::Busy => {
                if self.circuit == CircuitState::Closed {
                    return Step::Continue;
                }

                self.consecutive_successes += 1;
                debug!(
                    "Provider {} healthy while circuit open ({}/{})",
                    self.provider.id(),
                    self.consecutive_successes,
                    CONSECUTIVE_SUCCESSES_TO_CLOSE
                );
                if self.consecutive_successes < CONSECUTIVE_SUCCESSES_TO_CLOSE {
                    return Step::Continue;
                }

                self.circuit = CircuitState::Closed;
                self.consecutive_successes = 0;
                info!("Close circuit breaker for provider {}", self.provider.id());
                self.readmit(&registry).await
            }
        }
    }

    async fn readmit(&self, registry: &InMemoryRegistry) -> Step {
        match registry.register(Arc::clone(&self.provider)) {
            Ok(()) | Err(RegistryError::AlreadyRegistered(_)) => Step::Continue,
            Err(RegistryError::TornDown(_)) => Step::Stop,
            Err(e) => {
                warn!(
                    "Unable to re-register provider {} after successful circuit breaker checks: {}",
                    self.provider.id(),
                    e
                );
                self.provider.teardown().await;
                Step::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::{InMemoryProvider, LoadBalancerSettings};

    fn settings(max: usize) -> RegistrySettings {
        RegistrySettings {
            max_allowed_registered_providers: max,
            health_check_frequency_millis: 20,
            health_check_request_timeout_millis: 50,
        }
    }

    fn provider(registry: &InMemoryRegistry) -> Arc<InMemoryProvider> {
        let settings = LoadBalancerSettings {
            max_concurrent_workers_per_provider: 10,
            teardown_grace_period_millis: 200,
            ..LoadBalancerSettings::default()
        };
        Arc::new(InMemoryProvider::new(&settings, registry.notifier()))
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_circuit_opens_and_closes() {
        let registry = InMemoryRegistry::new(settings(2));
        let p1 = provider(&registry);
        let p2 = provider(&registry);
        registry.register(p1.clone()).unwrap();
        registry.register(p2.clone()).unwrap();

        p1.set_health(ProviderStatus::OutOfService);
        assert!(wait_until(|| registry.len() == 1).await);
        assert_eq!(registry.available()[0].id(), p2.id());

        p1.set_health(ProviderStatus::Ok);
        assert!(wait_until(|| registry.len() == 2).await);
        assert_eq!(registry.supervised_count(), 2);

        p1.teardown().await;
        assert_eq!(registry.len(), 1);
        registry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reregistration_during_open_circuit_is_undone() {
        let registry = InMemoryRegistry::new(settings(2));
        let p1 = provider(&registry);
        registry.register(p1.clone()).unwrap();

        p1.set_health(ProviderStatus::OutOfService);
        assert!(wait_until(|| registry.is_empty()).await);

        // 熔断仍然打开，手动注册会在下一次失败的检查后被撤销
        registry.register(p1.clone()).unwrap();
        assert!(wait_until(|| registry.is_empty()).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.is_empty());

        p1.set_health(ProviderStatus::Ok);
        assert!(wait_until(|| registry.len() == 1).await);
        assert_eq!(registry.supervised_count(), 1);
        registry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_readmission_tears_provider_down() {
        let registry = InMemoryRegistry::new(settings(1));
        let p1 = provider(&registry);
        let p2 = provider(&registry);
        registry.register(p1.clone()).unwrap();

        p1.set_health(ProviderStatus::OutOfService);
        assert!(wait_until(|| registry.is_empty()).await);

        // 熔断期间名额被占用
        registry.register(p2.clone()).unwrap();
        p1.set_health(ProviderStatus::Ok);

        assert!(wait_until(|| p1.status() == ProviderStatus::TearDown).await);
        assert!(wait_until(|| registry.supervised_count() == 1).await);
        assert_eq!(registry.available()[0].id(), p2.id());
        registry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_health_check_timeout_counts_as_failure() {
        let registry = InMemoryRegistry::new(settings(2));
        let settings = LoadBalancerSettings {
            max_concurrent_workers_per_provider: 1,
            teardown_grace_period_millis: 100,
            ..LoadBalancerSettings::default()
        };
        let p1 = Arc::new(InMemoryProvider::new(&settings, registry.notifier()));
        let as_dyn: Arc<dyn Provider> = p1.clone();

        // 占满唯一的执行槽，健康检查只能排队直到超时
        let _blocker = ProviderAction::SlowGet(Duration::from_secs(30))
            .invoke_on(&as_dyn)
            .unwrap();
        let p2 = provider(&registry);
        registry.register(p2.clone()).unwrap();
        registry.register(p1.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let available = registry.available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id(), p2.id());

        // 超时的检查一直在排队，没有被重复提交
        assert_eq!(p1.in_flight(), 2);
        assert_eq!(p1.status(), ProviderStatus::Busy);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_supervisor_stops_on_cancel() {
        let registry = InMemoryRegistry::new(settings(2));
        let p1 = provider(&registry);
        let cancel = CancellationToken::new();
        let supervisor = HealthSupervisor::new(
            p1.clone(),
            registry.downgrade(),
            registry.settings(),
            cancel.clone(),
        );

        let handle = supervisor.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
