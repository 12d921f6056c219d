//! Domain value objects.

mod event_id;
mod retry_policy;

pub use event_id::EventId;
pub use retry_policy::RetryPolicy;
