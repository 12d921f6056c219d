//! Client-side push subscription lifecycle.
//!
//! Capability probing, the per-device ledger, the subscribe protocol, the
//! staleness reconciler and the controller that the UI talks to.

pub mod capability;
pub mod controller;
pub mod ledger;
pub mod platform;
pub mod protocol;
pub mod reconciler;
pub mod status;
pub mod timer;

pub use capability::{
    CapabilityProber, CapabilityResult, EnvironmentSource, PermissionState, PlatformEnvironment,
    ProbeSnapshot, StaticEnvironment,
};
pub use controller::{SubscriptionController, SubscriptionView};
pub use ledger::{DeviceSubscription, FileLedger, MemoryLedger, SubscriptionLedger};
pub use platform::{PlatformError, PushPlatform, WorkerRegistration, WorkerScript};
pub use protocol::{SubscribeFailure, SubscriptionProtocol, SubscriptionSuccess};
pub use reconciler::{DismissalRegistry, DismissalState, StalenessReconciler};
pub use status::SubscriptionStatus;
pub use timer::CancellableTimer;
