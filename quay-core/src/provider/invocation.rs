use super::types::{InvocationError, ProviderId, Reply};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};

/// 提交给provider执行的一个任务单元
pub type Work = BoxFuture<'static, anyhow::Result<Reply>>;

/// 异步任务句柄
///
/// `invoke` 立即返回该句柄，调用方只有在 `.await` 时才会等待任务完成。
/// 丢弃句柄不会取消任务。
#[derive(Debug)]
pub struct Invocation {
    provider: ProviderId,
    handle: JoinHandle<anyhow::Result<Reply>>,
}

impl Invocation {
    pub(crate) fn new(provider: ProviderId, handle: JoinHandle<anyhow::Result<Reply>>) -> Self {
        Self { provider, handle }
    }

    /// 执行该任务的provider
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 取消任务，完成计数照常进行
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for Invocation {
    type Output = Result<Reply, InvocationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(reply))) => Poll::Ready(Ok(reply)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(InvocationError::Failed(e))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(join_error(e))),
        }
    }
}

fn join_error(e: JoinError) -> InvocationError {
    if e.is_cancelled() {
        return InvocationError::Cancelled;
    }

    match e.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            InvocationError::Panicked(message)
        }
        Err(e) => InvocationError::Panicked(e.to_string()),
    }
}
