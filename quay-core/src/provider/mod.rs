pub mod action;
pub mod capacity;
pub mod in_memory;
pub mod invocation;
pub mod status;
pub mod traits;
pub mod types;

pub use action::ProviderAction;
pub use capacity::CapacityTracker;
pub use in_memory::InMemoryProvider;
pub use invocation::{Invocation, Work};
pub use status::{StatusEvent, StatusReceiver, StatusSender};
pub use traits::Provider;
pub use types::{InvocationError, ProviderError, ProviderId, ProviderStatus, Reply};
