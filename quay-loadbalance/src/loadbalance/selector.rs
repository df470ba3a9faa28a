use parking_lot::Mutex;
use quay_core::{BalancingStrategy, Provider, ProviderId};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Provider选择器
///
/// 策略、轮询游标和调用统计放在同一把锁里，读取注册表快照、选择、
/// 推进游标和计数在一个临界区内完成。
pub struct ProviderSelector {
    state: Mutex<SelectionState>,
}

struct SelectionState {
    strategy: BalancingStrategy,
    cursor: usize,
    calls: HashMap<ProviderId, u64>,
}

/// 调用统计快照，用于展示和序列化
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub strategy: BalancingStrategy,
    pub total_dispatches: u64,
    pub per_provider: BTreeMap<String, u64>,
}

impl ProviderSelector {
    pub fn new(strategy: BalancingStrategy) -> Self {
        Self {
            state: Mutex::new(SelectionState {
                strategy,
                cursor: 0,
                calls: HashMap::new(),
            }),
        }
    }

    /// 在持有选择器锁的情况下获取候选快照并选出一个provider
    ///
    /// 候选为空时返回 `None`，不修改任何状态
    pub fn select<F>(&self, candidates: F) -> Option<Arc<dyn Provider>>
    where
        F: FnOnce() -> Vec<Arc<dyn Provider>>,
    {
        let mut state = self.state.lock();
        let candidates = candidates();
        if candidates.is_empty() {
            return None;
        }

        let index = match state.strategy {
            BalancingStrategy::Random => rand::rng().random_range(0..candidates.len()),
            BalancingStrategy::RoundRobin => {
                // 集合缩小后游标可能越界
                if state.cursor >= candidates.len() {
                    state.cursor = 0;
                }
                let index = state.cursor;
                state.cursor += 1;
                index
            }
        };

        let selected = Arc::clone(&candidates[index]);
        *state.calls.entry(selected.id().clone()).or_insert(0) += 1;
        debug!(
            "Selected provider {} ({}/{}) using {} strategy",
            selected.id(),
            index + 1,
            candidates.len(),
            state.strategy
        );
        Some(selected)
    }

    pub fn set_strategy(&self, strategy: BalancingStrategy) {
        let mut state = self.state.lock();
        if state.strategy != strategy {
            debug!("Switching strategy from {} to {}", state.strategy, strategy);
            state.strategy = strategy;
        }
    }

    pub fn strategy(&self) -> BalancingStrategy {
        self.state.lock().strategy
    }

    pub fn metrics(&self) -> HashMap<ProviderId, u64> {
        self.state.lock().calls.clone()
    }

    pub fn clear_metrics(&self) {
        self.state.lock().calls.clear();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        MetricsSnapshot {
            strategy: state.strategy,
            total_dispatches: state.calls.values().sum(),
            per_provider: state
                .calls
                .iter()
                .map(|(id, count)| (id.to_string(), *count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::{InMemoryProvider, LoadBalancerSettings, StatusSender};

    fn providers(count: usize) -> Vec<Arc<dyn Provider>> {
        let settings = LoadBalancerSettings::default();
        (0..count)
            .map(|_| {
                Arc::new(InMemoryProvider::new(&settings, StatusSender::detached()))
                    as Arc<dyn Provider>
            })
            .collect()
    }

    #[test]
    fn test_empty_candidates_select_nothing() {
        let selector = ProviderSelector::new(BalancingStrategy::RoundRobin);
        assert!(selector.select(Vec::new).is_none());
        assert!(selector.metrics().is_empty());
    }

    #[test]
    fn test_round_robin_follows_insertion_order() {
        let selector = ProviderSelector::new(BalancingStrategy::RoundRobin);
        let candidates = providers(3);

        for round in 0..9 {
            let selected = selector.select(|| candidates.clone()).unwrap();
            assert_eq!(selected.id(), candidates[round % 3].id());
        }

        let metrics = selector.metrics();
        assert!(candidates.iter().all(|p| metrics[p.id()] == 3));
    }

    #[test]
    fn test_round_robin_cursor_resets_when_set_shrinks() {
        let selector = ProviderSelector::new(BalancingStrategy::RoundRobin);
        let candidates = providers(3);

        selector.select(|| candidates.clone());
        selector.select(|| candidates.clone());
        selector.select(|| candidates.clone());

        // 游标为3，集合缩小到2，应从头开始
        let shrunk = candidates[..2].to_vec();
        let selected = selector.select(|| shrunk.clone()).unwrap();
        assert_eq!(selected.id(), candidates[0].id());
    }

    #[test]
    fn test_random_only_selects_candidates() {
        let selector = ProviderSelector::new(BalancingStrategy::Random);
        let candidates = providers(4);

        for _ in 0..200 {
            let selected = selector.select(|| candidates.clone()).unwrap();
            assert!(candidates.iter().any(|p| p.id() == selected.id()));
        }
        assert_eq!(selector.snapshot().total_dispatches, 200);
    }

    #[test]
    fn test_clear_metrics_and_switch_strategy() {
        let selector = ProviderSelector::new(BalancingStrategy::Random);
        let candidates = providers(2);
        selector.select(|| candidates.clone());

        selector.set_strategy(BalancingStrategy::RoundRobin);
        assert_eq!(selector.strategy(), BalancingStrategy::RoundRobin);

        selector.clear_metrics();
        let snapshot = selector.snapshot();
        assert_eq!(snapshot.total_dispatches, 0);
        assert!(snapshot.per_provider.is_empty());
    }
}
