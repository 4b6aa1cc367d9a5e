//! Linear GraphQL record client and notifiers.

#[cfg(feature = "test-util")]
pub mod mock;
mod linear;
mod notify;
mod retry;

pub use linear::{LinearClient, DEFAULT_API_URL};
pub use notify::{SlackNotifier, TrackerNotifier};
pub use retry::RetryPolicy;
pub use sentinel_types::{ClientError, Notifier, RecordClient};

#[cfg(feature = "test-util")]
pub use mock::InMemoryRecordClient;
