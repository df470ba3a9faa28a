use super::invocation::{Invocation, Work};
use super::types::{ProviderError, ProviderId, ProviderStatus};
use async_trait::async_trait;
use std::fmt;

/// 后端provider接口
///
/// 每种后端实现一个该trait的变体，负载均衡器和注册表只依赖这组能力
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// 唯一标识
    fn id(&self) -> &ProviderId;

    /// 常规请求的处理逻辑
    fn get(&self) -> String;

    /// 返回当前观测到的健康状态，不修改状态
    fn probe(&self) -> ProviderStatus;

    /// 提交任务到provider的有界执行器，立即返回异步句柄
    fn invoke(&self, work: Work) -> Result<Invocation, ProviderError>;

    /// 进入终态，停止接收新任务并在宽限期内等待在途任务
    ///
    /// 返回是否在宽限期内全部完成
    async fn teardown(&self) -> bool;
}

impl PartialEq for dyn Provider {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for dyn Provider {}
