use quay_core::{
    BalancingStrategy, Invocation, Provider, ProviderId, ProviderStatus, RegistrySettings,
    StatusSender,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::manager::LoadBalancerError;
use super::registry::RegistryError;

/// Provider注册表接口
///
/// 维护可被负载均衡器选择的provider集合。实现需要保证检查与修改是原子的，
/// 并且 `available()` 返回的快照与注册表内部状态互不影响。
pub trait ProviderRegistry: Send + Sync {
    /// 注册provider，超出上限或重复注册时失败
    fn register(&self, provider: Arc<dyn Provider>) -> Result<(), RegistryError>;

    /// 从可选集合中移除provider，未注册时不做任何事
    fn deregister(&self, provider: &dyn Provider);

    /// 当前可选provider的快照
    fn available(&self) -> Vec<Arc<dyn Provider>>;

    /// 处理provider状态变更
    fn on_status_changed(&self, provider: &ProviderId, status: ProviderStatus);

    fn settings(&self) -> &RegistrySettings;

    /// provider向注册表报告状态变更所用的发送端
    fn notifier(&self) -> StatusSender;

    /// 停止注册表启动的所有后台任务
    fn shutdown(&self);
}

/// 负载均衡器接口
///
/// 分发、策略切换与调用统计共享同一个临界区
pub trait LoadBalancer: Send + Sync {
    /// 选择一个provider并提交常规请求，立即返回异步句柄
    fn dispatch(&self) -> Result<Invocation, LoadBalancerError>;

    fn registry(&self) -> Arc<dyn ProviderRegistry>;

    fn set_strategy(&self, strategy: BalancingStrategy);

    fn strategy(&self) -> BalancingStrategy;

    /// 每个provider被选中的次数
    fn metrics(&self) -> HashMap<ProviderId, u64>;

    fn clear_metrics(&self);
}
