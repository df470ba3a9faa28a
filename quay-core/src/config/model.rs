use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub load_balancer: LoadBalancerSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
}

/// 负载均衡器配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoadBalancerSettings {
    #[serde(default)]
    pub default_strategy: BalancingStrategy,
    /// 每个provider允许同时执行的任务数
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers_per_provider: usize,
    /// teardown时等待在途任务完成的最长时间
    #[serde(default = "default_teardown_grace_period")]
    pub teardown_grace_period_millis: u64,
}

/// 注册表与健康检查配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistrySettings {
    #[serde(default = "default_max_registered_providers")]
    pub max_allowed_registered_providers: usize,
    #[serde(default = "default_health_check_frequency")]
    pub health_check_frequency_millis: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_request_timeout_millis: u64,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            default_strategy: BalancingStrategy::default(),
            max_concurrent_workers_per_provider: default_max_concurrent_workers(),
            teardown_grace_period_millis: default_teardown_grace_period(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_allowed_registered_providers: default_max_registered_providers(),
            health_check_frequency_millis: default_health_check_frequency(),
            health_check_request_timeout_millis: default_health_check_timeout(),
        }
    }
}

impl LoadBalancerSettings {
    pub fn teardown_grace_period(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_period_millis)
    }
}

impl RegistrySettings {
    /// 两次健康检查之间的间隔
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_frequency_millis)
    }

    /// 单次健康检查的超时时间
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_request_timeout_millis)
    }
}

/// 负载均衡策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// 在可用provider中均匀随机选择
    #[default]
    Random,
    /// 按注册顺序轮询
    RoundRobin,
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalancingStrategy::Random => write!(f, "random"),
            BalancingStrategy::RoundRobin => write!(f, "round_robin"),
        }
    }
}

impl FromStr for BalancingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(BalancingStrategy::Random),
            "round_robin" | "roundrobin" => Ok(BalancingStrategy::RoundRobin),
            other => anyhow::bail!("Unknown balancing strategy '{}'", other),
        }
    }
}

// Default value functions
fn default_max_concurrent_workers() -> usize {
    10
}

fn default_teardown_grace_period() -> u64 {
    5000 // 5秒内等待在途任务完成
}

fn default_max_registered_providers() -> usize {
    10
}

fn default_health_check_frequency() -> u64 {
    1000
}

fn default_health_check_timeout() -> u64 {
    500
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        self.validate_load_balancer_config(&self.load_balancer)?;
        self.validate_registry_config(&self.registry)?;
        Ok(())
    }

    fn validate_load_balancer_config(&self, settings: &LoadBalancerSettings) -> Result<()> {
        if settings.max_concurrent_workers_per_provider == 0 {
            anyhow::bail!("load_balancer.max_concurrent_workers_per_provider cannot be 0");
        }

        if settings.teardown_grace_period_millis == 0 {
            anyhow::bail!("load_balancer.teardown_grace_period_millis cannot be 0");
        }

        Ok(())
    }

    fn validate_registry_config(&self, settings: &RegistrySettings) -> Result<()> {
        if settings.max_allowed_registered_providers == 0 {
            anyhow::bail!("registry.max_allowed_registered_providers cannot be 0");
        }

        if settings.health_check_frequency_millis == 0 {
            anyhow::bail!("registry.health_check_frequency_millis cannot be 0");
        }

        if settings.health_check_request_timeout_millis == 0 {
            anyhow::bail!("registry.health_check_request_timeout_millis cannot be 0");
        }

        Ok(())
    }

    /// 生成带注释的示例配置
    pub fn example_toml() -> String {
        let defaults = Config::default();
        format!(
            r#"# Quay load balancer configuration

[load_balancer]
# random | round_robin
default_strategy = "{}"
# maximum units of work a provider runs at once before reporting busy
max_concurrent_workers_per_provider = {}
# how long teardown waits for in-flight work
teardown_grace_period_millis = {}

[registry]
max_allowed_registered_providers = {}
health_check_frequency_millis = {}
health_check_request_timeout_millis = {}
"#,
            defaults.load_balancer.default_strategy,
            defaults.load_balancer.max_concurrent_workers_per_provider,
            defaults.load_balancer.teardown_grace_period_millis,
            defaults.registry.max_allowed_registered_providers,
            defaults.registry.health_check_frequency_millis,
            defaults.registry.health_check_request_timeout_millis,
        )
    }
}
