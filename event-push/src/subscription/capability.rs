//! Capability prober.
//!
//! Decides whether push notifications are usable on this device at all and,
//! if not, which out-of-band action (if any) would make them usable.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ledger::{DeviceSubscription, SubscriptionLedger};
use crate::domain::EventId;

static IOS_DEVICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(iPhone|iPad|iPod)\b").unwrap());

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Not asked yet (or the prompt was dismissed).
    #[default]
    Default,
    Granted,
    Denied,
}

/// Snapshot of the runtime the page is executing in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformEnvironment {
    pub has_notification_api: bool,
    pub has_worker_api: bool,
    pub has_push_api: bool,
    pub user_agent: String,
    /// Reported max touch points; iPadOS masquerades as a desktop Mac otherwise.
    pub max_touch_points: u32,
    /// Running as an installed home-screen app (`display-mode: standalone`).
    pub standalone: bool,
    pub permission: PermissionState,
}

impl PlatformEnvironment {
    /// Whether the browser is a mobile-Safari-class engine that only exposes
    /// push to installed home-screen apps.
    pub fn is_mobile_safari_class(&self) -> bool {
        if IOS_DEVICE_REGEX.is_match(&self.user_agent) {
            return true;
        }

        // iPadOS 13+ requests the desktop site and reports "Macintosh".
        self.user_agent.contains("Macintosh") && self.max_touch_points > 1
    }
}

/// Supplies environment snapshots; implemented by the platform glue.
pub trait EnvironmentSource: Send + Sync {
    fn snapshot(&self) -> PlatformEnvironment;
}

/// A fixed environment, handy for tests and server-side rendering.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment(pub PlatformEnvironment);

impl EnvironmentSource for StaticEnvironment {
    fn snapshot(&self) -> PlatformEnvironment {
        self.0.clone()
    }
}

/// Outcome of a capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityResult {
    /// Missing notification, worker or push API. Terminal.
    Unsupported,
    /// Mobile Safari outside an installed home-screen app.
    RequiresInstall,
    /// Permission was persistently refused.
    PermissionDenied,
    /// Subscribe may be offered.
    Ready,
}

impl CapabilityResult {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Probe result together with the ledger entry it was evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub capability: CapabilityResult,
    pub subscription: DeviceSubscription,
}

/// Classify an environment.
///
/// Precedence: install requirement first (Safari hides the APIs outside
/// installed mode, so missing APIs there are not terminal), then missing
/// APIs, then a denied permission.
pub fn classify(env: &PlatformEnvironment) -> CapabilityResult {
    if env.is_mobile_safari_class() && !env.standalone {
        return CapabilityResult::RequiresInstall;
    }
    if !env.has_notification_api || !env.has_worker_api || !env.has_push_api {
        return CapabilityResult::Unsupported;
    }
    if env.permission == PermissionState::Denied {
        return CapabilityResult::PermissionDenied;
    }
    CapabilityResult::Ready
}

/// Reads the platform environment and ledger; never mutates either.
#[derive(Clone)]
pub struct CapabilityProber {
    environment: Arc<dyn EnvironmentSource>,
    ledger: Arc<dyn SubscriptionLedger>,
}

impl CapabilityProber {
    pub fn new(environment: Arc<dyn EnvironmentSource>, ledger: Arc<dyn SubscriptionLedger>) -> Self {
        Self { environment, ledger }
    }

    pub fn environment(&self) -> PlatformEnvironment {
        self.environment.snapshot()
    }

    pub fn probe(&self, event_id: &EventId) -> CapabilityResult {
        let capability = classify(&self.environment.snapshot());
        tracing::trace!(event_id = %event_id, ?capability, "Capability probed");
        capability
    }

    /// Probe plus the current ledger entry for the event.
    ///
    /// An unreadable ledger is reported as unsubscribed.
    pub async fn snapshot(&self, event_id: &EventId) -> ProbeSnapshot {
        let capability = self.probe(event_id);
        let subscription = match self.ledger.get(event_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Failed to read subscription ledger");
                DeviceSubscription::unsubscribed()
            }
        };
        ProbeSnapshot {
            capability,
            subscription,
        }
    }
}
