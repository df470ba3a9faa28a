use super::invocation::{Invocation, Work};
use super::status::StatusSender;
use super::types::{ProviderError, ProviderId, ProviderStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Provider容量跟踪器
///
/// 把在途任务数换算成provider的可用状态：
/// - 提交后在途数达到上限且当前为 `Ok` 时切换到 `Busy`
/// - 任一任务完成时，若当前为 `Busy` 则切回 `Ok`（不重新检查在途数）
///
/// 状态变更与事件发送在同一把锁内完成，保证同一provider的事件有序。
#[derive(Debug)]
pub struct CapacityTracker {
    provider: ProviderId,
    concurrency_limit: usize,
    grace_period: Duration,
    state: Mutex<CapacityState>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    notifier: StatusSender,
}

#[derive(Debug, Clone, Copy)]
struct CapacityState {
    status: ProviderStatus,
    in_flight: usize,
}

/// 任务结束（包括失败、panic、取消）时执行完成计数
struct CompletionGuard {
    tracker: Arc<CapacityTracker>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.tracker.task_completed();
    }
}

impl CapacityTracker {
    pub fn new(
        provider: ProviderId,
        concurrency_limit: usize,
        grace_period: Duration,
        notifier: StatusSender,
    ) -> Self {
        let concurrency_limit = concurrency_limit.max(1);
        Self {
            provider,
            concurrency_limit,
            grace_period,
            state: Mutex::new(CapacityState {
                status: ProviderStatus::Ok,
                in_flight: 0,
            }),
            permits: Arc::new(Semaphore::new(concurrency_limit)),
            tasks: TaskTracker::new(),
            notifier,
        }
    }

    pub fn status(&self) -> ProviderStatus {
        self.state.lock().status
    }

    /// 已提交但尚未完成的任务数（含排队中的任务）
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// 提交任务到有界执行器，立即返回句柄
    pub fn submit(self: &Arc<Self>, work: Work) -> Result<Invocation, ProviderError> {
        {
            let mut state = self.state.lock();
            if state.status == ProviderStatus::TearDown {
                return Err(ProviderError::TornDown(self.provider.clone()));
            }

            state.in_flight += 1;
            if state.status == ProviderStatus::Ok && state.in_flight >= self.concurrency_limit {
                info!(
                    "Reached max number of concurrent workers ({}) for provider {}, switching to busy",
                    self.concurrency_limit, self.provider
                );
                state.status = ProviderStatus::Busy;
                self.notifier.notify(&self.provider, ProviderStatus::Busy);
            }
        }

        let guard = CompletionGuard {
            tracker: Arc::clone(self),
        };
        let permits = Arc::clone(&self.permits);
        let handle = self.tasks.spawn(async move {
            let _guard = guard;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| anyhow::anyhow!("provider executor is closed"))?;
            work.await
        });

        Ok(Invocation::new(self.provider.clone(), handle))
    }

    /// 单个任务完成时调用
    pub fn task_completed(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.status == ProviderStatus::Busy {
            debug!(
                "Task completed on busy provider {} ({} still in flight), switching back to ok",
                self.provider, state.in_flight
            );
            state.status = ProviderStatus::Ok;
            self.notifier.notify(&self.provider, ProviderStatus::Ok);
        }
    }

    /// 直接覆盖状态，不发送事件，用于模拟外部故障与恢复
    ///
    /// 已经teardown的provider不受影响，`TearDown` 也不能通过这里设置。
    pub fn set_health(&self, status: ProviderStatus) {
        if status == ProviderStatus::TearDown {
            warn!(
                "Ignoring attempt to set teardown status on provider {} outside of teardown",
                self.provider
            );
            return;
        }

        let mut state = self.state.lock();
        if state.status != ProviderStatus::TearDown {
            state.status = status;
        }
    }

    /// 进入终态并等待在途任务在宽限期内结束
    ///
    /// 返回是否在宽限期内全部完成
    pub async fn teardown(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != ProviderStatus::TearDown {
                info!("Tearing down provider {}", self.provider);
                state.status = ProviderStatus::TearDown;
                self.notifier.notify(&self.provider, ProviderStatus::TearDown);
            }
        }

        self.tasks.close();
        match tokio::time::timeout(self.grace_period, self.tasks.wait()).await {
            Ok(()) => {
                info!("Provider {} torn down properly", self.provider);
                true
            }
            Err(_) => {
                warn!(
                    "Provider {} still had {} tasks in flight after {}ms grace period",
                    self.provider,
                    self.tasks.len(),
                    self.grace_period.as_millis()
                );
                false
            }
        }
    }
}
