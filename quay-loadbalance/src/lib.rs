//! Quay Load Balance Library
//!
//! This library provides load balancing functionality for Quay including:
//! - Provider registry with busy/teardown tracking
//! - Per-provider health supervision (circuit breaker)
//! - Random and round-robin selection strategies
//! - Dispatch metrics

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    InMemoryRegistry, LoadBalanceManager, LoadBalancer, LoadBalancerBuilder, LoadBalancerError,
    MetricsSnapshot, ProviderRegistry, RegistryError, CONSECUTIVE_SUCCESSES_TO_CLOSE,
};
