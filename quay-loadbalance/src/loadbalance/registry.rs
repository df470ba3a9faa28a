use super::health_checker::HealthSupervisor;
use super::traits::ProviderRegistry;
use parking_lot::Mutex;
use quay_core::{
    Provider, ProviderId, ProviderStatus, RegistrySettings, StatusEvent, StatusReceiver,
    StatusSender,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 注册表操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Maximum providers limit reached ({max})")]
    RegistryFull { max: usize },
    #[error("Provider {0} already registered")]
    AlreadyRegistered(ProviderId),
    #[error("Provider {0} has been torn down and cannot be registered")]
    TornDown(ProviderId),
}

/// 内存中的provider注册表
///
/// 维护可被选择的provider集合，并为每个provider启动一个健康检查任务。
/// 所有成员变更（注册、注销、状态事件、熔断）都在同一把锁内完成。
#[derive(Clone)]
pub struct InMemoryRegistry {
    shared: Arc<RegistryShared>,
}

pub(crate) struct RegistryShared {
    settings: RegistrySettings,
    notifier: StatusSender,
    shutdown: CancellationToken,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    selectable: Vec<Arc<dyn Provider>>,
    members: HashMap<ProviderId, Member>,
    inbox: StatusReceiver,
}

/// 注册表对单个provider的成员记录，生命周期内只对应一个健康检查任务
struct Member {
    provider: Arc<dyn Provider>,
    membership: Membership,
    supervisor: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Selectable,
    /// 因繁忙被移出
    Busy,
    /// 被注销（手动或熔断）
    Detached,
}

impl InMemoryRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        let (notifier, inbox) = StatusSender::channel();
        Self {
            shared: Arc::new(RegistryShared {
                settings,
                notifier,
                shutdown: CancellationToken::new(),
                state: Mutex::new(RegistryState {
                    selectable: Vec::new(),
                    members: HashMap::new(),
                    inbox,
                }),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryShared> {
        Arc::downgrade(&self.shared)
    }

    /// 当前可选provider数量
    pub fn len(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.drain_inbox();
        state.selectable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 仍在运行健康检查的provider数量
    pub fn supervised_count(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.drain_inbox();
        state.members.len()
    }

    /// 健康检查任务退出时清理成员记录
    pub(crate) fn forget(&self, provider: &ProviderId) {
        let mut state = self.shared.state.lock();
        state.drain_inbox();
        state.remove_selectable(provider);
        if state.members.remove(provider).is_some() {
            debug!("Forgot provider {} after its supervisor stopped", provider);
        }
    }
}

impl ProviderRegistry for InMemoryRegistry {
    fn register(&self, provider: Arc<dyn Provider>) -> Result<(), RegistryError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.drain_inbox();

        let max = self.shared.settings.max_allowed_registered_providers;
        if state.selectable.len() >= max {
            return Err(RegistryError::RegistryFull { max });
        }

        let id = provider.id().clone();
        if state.position(&id).is_some() {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        let status = provider.probe();
        if status == ProviderStatus::TearDown {
            return Err(RegistryError::TornDown(id));
        }

        let membership = if status == ProviderStatus::Busy {
            Membership::Busy
        } else {
            state.selectable.push(Arc::clone(&provider));
            Membership::Selectable
        };

        match state.members.get_mut(&id) {
            Some(member) => {
                member.membership = membership;
                debug!("Re-registered provider {} ({:?})", id, membership);
            }
            None => {
                let supervisor = self.shared.shutdown.child_token();
                HealthSupervisor::new(
                    Arc::clone(&provider),
                    self.downgrade(),
                    &self.shared.settings,
                    supervisor.clone(),
                )
                .spawn();
                state.members.insert(
                    id.clone(),
                    Member {
                        provider,
                        membership,
                        supervisor,
                    },
                );
                info!("Registered provider {} ({:?})", id, membership);
            }
        }

        Ok(())
    }

    fn deregister(&self, provider: &dyn Provider) {
        let mut state = self.shared.state.lock();
        state.drain_inbox();

        let id = provider.id();
        state.remove_selectable(id);
        if let Some(member) = state.members.get_mut(id) {
            member.membership = Membership::Detached;
            debug!("Deregistered provider {}", id);
        }
    }

    fn available(&self) -> Vec<Arc<dyn Provider>> {
        let mut state = self.shared.state.lock();
        state.drain_inbox();
        state.selectable.clone()
    }

    fn on_status_changed(&self, provider: &ProviderId, status: ProviderStatus) {
        let mut state = self.shared.state.lock();
        state.drain_inbox();
        state.apply(provider, status);
    }

    fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    fn notifier(&self) -> StatusSender {
        self.shared.notifier.clone()
    }

    fn shutdown(&self) {
        info!("Shutting down provider registry health supervisors");
        self.shared.shutdown.cancel();
    }
}

impl RegistryState {
    /// 在处理任何读写之前，先应用所有已发送的状态事件
    fn drain_inbox(&mut self) {
        while let Ok(StatusEvent { provider, status }) = self.inbox.try_recv() {
            self.apply(&provider, status);
        }
    }

    fn apply(&mut self, provider: &ProviderId, status: ProviderStatus) {
        let Some(member) = self.members.get_mut(provider) else {
            debug!("Ignoring {} event for unregistered provider {}", status, provider);
            return;
        };

        match status {
            ProviderStatus::Busy => {
                if member.membership == Membership::Selectable {
                    member.membership = Membership::Busy;
                    self.remove_selectable(provider);
                    debug!("Provider {} is busy, removed from selectable set", provider);
                }
            }
            ProviderStatus::Ok => {
                if member.membership != Membership::Selectable {
                    member.membership = Membership::Selectable;
                    let provider_ref = Arc::clone(&member.provider);
                    if self.position(provider).is_none() {
                        self.selectable.push(provider_ref);
                    }
                    debug!("Provider {} is available again", provider);
                }
            }
            ProviderStatus::TearDown => {
                member.supervisor.cancel();
                self.members.remove(provider);
                self.remove_selectable(provider);
                info!("Provider {} torn down, removed from registry", provider);
            }
            // 由健康检查决定是否注销
            ProviderStatus::OutOfService => {}
        }
    }

    fn position(&self, provider: &ProviderId) -> Option<usize> {
        self.selectable.iter().position(|p| p.id() == provider)
    }

    fn remove_selectable(&mut self, provider: &ProviderId) {
        if let Some(index) = self.position(provider) {
            self.selectable.remove(index);
        }
    }
}

impl Drop for RegistryShared {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let members = self.state.get_mut().members.len();
        if members > 0 {
            warn!("Provider registry dropped with {} supervised providers", members);
        }
    }
}
