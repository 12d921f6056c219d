//! UI-facing entry points for the subscribe control and staleness banner.
//!
//! The controller is the only caller of the protocol. It consults the prober
//! first and never starts an attempt unless the environment is ready.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::capability::{CapabilityProber, CapabilityResult};
use super::protocol::SubscriptionProtocol;
use super::reconciler::StalenessReconciler;
use super::status::SubscriptionStatus;
use super::timer::CancellableTimer;
use crate::domain::EventId;

/// What the subscribe control should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub event_id: EventId,
    pub status: SubscriptionStatus,
    pub message: &'static str,
    pub can_subscribe: bool,
    pub can_retry: bool,
}

impl SubscriptionView {
    fn new(event_id: &EventId, status: SubscriptionStatus) -> Self {
        Self {
            event_id: event_id.clone(),
            status,
            message: status.message(),
            can_subscribe: status.can_subscribe(),
            can_retry: status.can_retry(),
        }
    }
}

pub struct SubscriptionController {
    prober: CapabilityProber,
    protocol: Arc<SubscriptionProtocol>,
    reconciler: Arc<StalenessReconciler>,
}

impl SubscriptionController {
    pub fn new(
        prober: CapabilityProber,
        protocol: Arc<SubscriptionProtocol>,
        reconciler: Arc<StalenessReconciler>,
    ) -> Self {
        Self {
            prober,
            protocol,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &Arc<StalenessReconciler> {
        &self.reconciler
    }

    /// Current state of the control for `event_id`.
    pub async fn view(&self, event_id: &EventId) -> SubscriptionView {
        let capability = self.prober.probe(event_id);
        if capability == CapabilityResult::PermissionDenied {
            self.reconciler.reconcile_permission(event_id).await;
        }
        if !capability.is_ready() {
            return SubscriptionView::new(event_id, capability.into());
        }

        if self.protocol.is_in_flight(event_id) {
            return SubscriptionView::new(event_id, SubscriptionStatus::InProgress);
        }

        self.reconciler.reconcile_permission(event_id).await;

        let snapshot = self.prober.snapshot(event_id).await;
        let status = if snapshot.subscription.is_subscribed() {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::NotSubscribed
        };
        SubscriptionView::new(event_id, status)
    }

    /// The subscribe button was pressed.
    pub async fn subscribe_clicked(&self, event_id: &EventId) -> SubscriptionView {
        let capability = self.prober.probe(event_id);
        if !capability.is_ready() {
            debug!(event_id = %event_id, ?capability, "Subscribe suppressed by capability gate");
            return SubscriptionView::new(event_id, capability.into());
        }

        match self.protocol.subscribe(event_id).await {
            Ok(_) => SubscriptionView::new(event_id, SubscriptionStatus::Subscribed),
            Err(failure) => SubscriptionView::new(event_id, (&failure).into()),
        }
    }

    /// The staleness banner's refresh action was pressed.
    pub async fn refresh_clicked(&self, event_id: &EventId) -> SubscriptionView {
        let capability = self.prober.probe(event_id);
        if !capability.is_ready() {
            debug!(event_id = %event_id, ?capability, "Refresh suppressed by capability gate");
            return SubscriptionView::new(event_id, capability.into());
        }

        match self.reconciler.refresh(event_id).await {
            Ok(_) => SubscriptionView::new(event_id, SubscriptionStatus::Subscribed),
            Err(failure) => SubscriptionView::new(event_id, (&failure).into()),
        }
    }

    /// The staleness banner was closed without refreshing.
    pub fn banner_dismissed(&self, event_id: &EventId) {
        self.reconciler.dismiss(event_id);
    }

    /// Decide on the staleness banner once the page has settled.
    pub fn page_viewed<F>(&self, event_id: &EventId, on_decision: F) -> CancellableTimer
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.reconciler.schedule_prompt(event_id, on_decision)
    }
}
