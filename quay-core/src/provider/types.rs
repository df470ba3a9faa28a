use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Provider唯一标识
///
/// 作为指标的key，也是provider之间判断相等的唯一依据
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(Uuid);

impl ProviderId {
    /// 生成新的随机标识
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Provider状态
///
/// 初始为 `Ok`，`TearDown` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    /// 在途任务数达到并发上限
    Busy,
    OutOfService,
    TearDown,
}

impl ProviderStatus {
    /// 健康检查视角下是否健康（繁忙也算健康）
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProviderStatus::Ok | ProviderStatus::Busy)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Ok => write!(f, "OK"),
            ProviderStatus::Busy => write!(f, "BUSY"),
            ProviderStatus::OutOfService => write!(f, "OUT_OF_SERVICE"),
            ProviderStatus::TearDown => write!(f, "TEARDOWN"),
        }
    }
}

/// 一次任务执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Payload(String),
    Health(ProviderStatus),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider {0} has been torn down and no longer accepts work")]
    TornDown(ProviderId),
}

/// 异步任务句柄上暴露给调用方的错误
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("provider work failed: {0}")]
    Failed(anyhow::Error),
    #[error("provider work was cancelled")]
    Cancelled,
    #[error("provider work panicked: {0}")]
    Panicked(String),
}
