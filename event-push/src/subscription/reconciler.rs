//! Staleness reconciler.
//!
//! Push tokens can rot on the platform side without any client-visible
//! error. The reconciler uses subscription age as a heuristic and offers a
//! low-friction refresh through a banner that the user can also dismiss for
//! the rest of the session.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::capability::{CapabilityProber, PermissionState};
use super::ledger::{DeviceSubscription, SubscriptionLedger};
use super::protocol::{SubscribeFailure, SubscriptionProtocol, SubscriptionSuccess};
use super::timer::CancellableTimer;
use crate::config::PushPolicy;
use crate::domain::EventId;
use crate::time::{Clock, duration_to_ms};

/// Per-event banner state for the current browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissalState {
    #[default]
    NotDismissed,
    Dismissed,
    Resolved,
}

/// Session-scoped dismissal records. Not persisted; a new browser session
/// starts from an empty registry (or calls [`DismissalRegistry::reset`]).
#[derive(Debug, Default)]
pub struct DismissalRegistry {
    records: DashMap<EventId, DismissalState>,
}

impl DismissalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, event_id: &EventId) -> DismissalState {
        self.records
            .get(event_id)
            .map(|r| *r.value())
            .unwrap_or_default()
    }

    /// Record that the banner was shown; creates the record lazily.
    pub fn mark_shown(&self, event_id: &EventId) {
        self.records
            .entry(event_id.clone())
            .or_insert(DismissalState::NotDismissed);
    }

    pub fn mark_dismissed(&self, event_id: &EventId) {
        self.records
            .insert(event_id.clone(), DismissalState::Dismissed);
    }

    pub fn mark_resolved(&self, event_id: &EventId) {
        self.records
            .insert(event_id.clone(), DismissalState::Resolved);
    }

    /// Start a new session.
    pub fn reset(&self) {
        self.records.clear();
    }
}

pub struct StalenessReconciler {
    prober: CapabilityProber,
    protocol: Arc<SubscriptionProtocol>,
    ledger: Arc<dyn SubscriptionLedger>,
    dismissals: Arc<DismissalRegistry>,
    clock: Arc<dyn Clock>,
    policy: PushPolicy,
}

impl StalenessReconciler {
    pub fn new(
        prober: CapabilityProber,
        protocol: Arc<SubscriptionProtocol>,
        dismissals: Arc<DismissalRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::clone(protocol.ledger());
        let policy = protocol.policy().clone();
        Self {
            prober,
            protocol,
            ledger,
            dismissals,
            clock,
            policy,
        }
    }

    pub fn dismissals(&self) -> &Arc<DismissalRegistry> {
        &self.dismissals
    }

    pub fn policy(&self) -> &PushPolicy {
        &self.policy
    }

    /// Whether the staleness banner should be shown for `event_id`.
    pub async fn should_prompt(&self, event_id: &EventId) -> bool {
        if !self.prober.probe(event_id).is_ready() {
            return false;
        }

        if self.dismissals.state(event_id) != DismissalState::NotDismissed {
            return false;
        }

        let subscription = match self.ledger.get(event_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to read subscription ledger");
                DeviceSubscription::unsubscribed()
            }
        };

        let prompt = self.is_stale(&subscription);
        if prompt {
            self.dismissals.mark_shown(event_id);
        }
        debug!(event_id = %event_id, prompt, "Staleness check");
        prompt
    }

    /// Unsubscribed, or subscribed for longer than the threshold.
    pub fn is_stale(&self, subscription: &DeviceSubscription) -> bool {
        if !subscription.is_subscribed() {
            return true;
        }
        let threshold_ms = duration_to_ms(self.policy.stale_threshold);
        match subscription.age_millis(self.clock.now_millis()) {
            Some(age) => age > threshold_ms,
            // Subscribed without a timestamp: nothing proves it is fresh.
            None => true,
        }
    }

    /// Evaluate [`Self::should_prompt`] once the page has settled.
    ///
    /// The returned timer can be cancelled when the user navigates away.
    pub fn schedule_prompt<F>(
        self: &Arc<Self>,
        event_id: &EventId,
        on_decision: F,
    ) -> CancellableTimer
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let timer = CancellableTimer::new();
        let reconciler = Arc::clone(self);
        let event_id = event_id.clone();

        timer.start(self.policy.settle_delay, move || {
            tokio::spawn(async move {
                let decision = reconciler.should_prompt(&event_id).await;
                on_decision(decision);
            });
        });
        timer
    }

    /// Clear the ledger, re-run the subscribe protocol, and resolve the banner on success.
    pub async fn refresh(
        &self,
        event_id: &EventId,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        let success = self.protocol.resubscribe(event_id).await?;
        self.dismissals.mark_resolved(event_id);
        info!(event_id = %event_id, "Stale subscription refreshed");
        Ok(success)
    }

    /// The user closed the banner without refreshing.
    pub fn dismiss(&self, event_id: &EventId) {
        self.dismissals.mark_dismissed(event_id);
        debug!(event_id = %event_id, "Staleness banner dismissed for this session");
    }

    /// Clear a ledger entry whose platform permission has been revoked.
    ///
    /// Returns true when an entry was cleared.
    pub async fn reconcile_permission(&self, event_id: &EventId) -> bool {
        let environment = self.prober.environment();
        if environment.permission == PermissionState::Granted {
            return false;
        }

        let subscribed = match self.ledger.get(event_id).await {
            Ok(subscription) => subscription.is_subscribed(),
            Err(_) => false,
        };
        if !subscribed {
            return false;
        }

        match self.ledger.clear(event_id).await {
            Ok(()) => {
                info!(
                    event_id = %event_id,
                    permission = ?environment.permission,
                    "Notification permission revoked, cleared subscription"
                );
                true
            }
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to clear revoked subscription");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dismissal_lifecycle() {
        let registry = DismissalRegistry::new();
        let id = EventId::new("gala").unwrap();

        assert_eq!(registry.state(&id), DismissalState::NotDismissed);
        registry.mark_shown(&id);
        assert_eq!(registry.state(&id), DismissalState::NotDismissed);

        registry.mark_dismissed(&id);
        registry.mark_shown(&id);
        assert_eq!(registry.state(&id), DismissalState::Dismissed);

        registry.mark_resolved(&id);
        assert_eq!(registry.state(&id), DismissalState::Resolved);

        registry.reset();
        assert_eq!(registry.state(&id), DismissalState::NotDismissed);
    }
}
