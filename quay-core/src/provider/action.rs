use super::invocation::{Invocation, Work};
use super::traits::Provider;
use super::types::{ProviderError, Reply};
use std::sync::Arc;
use std::time::Duration;

/// 可以提交给provider的预定义操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    Get,
    /// 先等待指定时长再执行 `Get`，用于模拟长耗时请求
    SlowGet(Duration),
    HealthCheck,
}

impl ProviderAction {
    /// 为指定provider构造任务单元
    pub fn into_work(self, provider: Arc<dyn Provider>) -> Work {
        match self {
            ProviderAction::Get => Box::pin(async move { Ok(Reply::Payload(provider.get())) }),
            ProviderAction::SlowGet(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(Reply::Payload(provider.get()))
            }),
            ProviderAction::HealthCheck => {
                Box::pin(async move { Ok(Reply::Health(provider.probe())) })
            }
        }
    }

    /// 构造任务并提交给该provider
    pub fn invoke_on(self, provider: &Arc<dyn Provider>) -> Result<Invocation, ProviderError> {
        provider.invoke(self.into_work(Arc::clone(provider)))
    }
}
