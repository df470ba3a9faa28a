pub mod health_checker;
pub mod manager;
pub mod registry;
pub mod selector;
pub mod traits;


pub use health_checker::{CircuitState, HealthSupervisor, CONSECUTIVE_SUCCESSES_TO_CLOSE};
pub use manager::{LoadBalanceManager, LoadBalancerBuilder, LoadBalancerError};
pub use registry::{InMemoryRegistry, RegistryError};
pub use selector::{MetricsSnapshot, ProviderSelector};
pub use traits::{LoadBalancer, ProviderRegistry};
