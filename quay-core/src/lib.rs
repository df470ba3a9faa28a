//! Quay Core Library
//!
//! This library provides core functionality for the Quay load balancer including:
//! - Configuration management
//! - Provider abstraction and capacity tracking
//! - Shared types and status events

pub mod config;
pub mod provider;

// Re-export commonly used types
pub use config::model::{BalancingStrategy, Config, LoadBalancerSettings, RegistrySettings};
pub use provider::{
    CapacityTracker, InMemoryProvider, Invocation, InvocationError, Provider, ProviderAction,
    ProviderError, ProviderId, ProviderStatus, Reply, StatusEvent, StatusReceiver, StatusSender,
    Work,
};
