use super::types::{ProviderId, ProviderStatus};
use tokio::sync::mpsc;
use tracing::debug;

/// Provider状态变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub provider: ProviderId,
    pub status: ProviderStatus,
}

pub type StatusReceiver = mpsc::UnboundedReceiver<StatusEvent>;

/// 状态事件发送端
///
/// Provider通过它把状态变化通知给注册表，注册表在自己的锁内消费这些事件
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSender {
    /// 创建一对状态事件通道
    pub fn channel() -> (Self, StatusReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 不挂接任何注册表的发送端，事件会被直接丢弃
    pub fn detached() -> Self {
        let (sender, _rx) = Self::channel();
        sender
    }

    pub fn notify(&self, provider: &ProviderId, status: ProviderStatus) {
        let event = StatusEvent {
            provider: provider.clone(),
            status,
        };
        if self.tx.send(event).is_err() {
            debug!(
                "Status listener for provider {} is gone, dropping {} event",
                provider, status
            );
        }
    }
}
