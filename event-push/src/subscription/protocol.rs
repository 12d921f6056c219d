//! Token acquisition and registration protocol.
//!
//! `subscribe` is a strictly sequential pipeline:
//!
//! 1. request permission
//! 2. register the background worker
//! 3. mint a push token
//! 4. bind the token to the event topic (retried, the binder is idempotent)
//! 5. commit the ledger
//!
//! Steps 1-4 never touch the ledger, so any failure leaves it exactly as it
//! was. The commit is the only write and it happens last.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::capability::PermissionState;
use super::ledger::{DeviceSubscription, SubscriptionLedger};
use super::platform::{PushPlatform, WorkerRegistration, WorkerScript};
use crate::binder::{BindOutcome, TopicBinder, bind_with_retry};
use crate::config::{MessagingConfig, PushPolicy};
use crate::domain::EventId;
use crate::time::Clock;
use crate::utils::redact_token;

/// Why a subscribe/refresh attempt did not commit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeFailure {
    #[error("notification permission was not granted")]
    PermissionDenied,

    #[error("background worker registration failed: {0}")]
    WorkerRegistration(String),

    #[error("no push token was issued")]
    TokenUnavailable,

    #[error("topic binding failed: {0}")]
    Binding(String),

    /// Another attempt for the same event is still running on this device.
    #[error("a subscription attempt is already in progress")]
    InProgress,

    #[error("subscription ledger unavailable: {0}")]
    Storage(String),
}

impl SubscribeFailure {
    /// Whether offering a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PermissionDenied)
    }
}

/// A committed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSuccess {
    pub event_id: EventId,
    pub token: String,
    pub subscribed_at_epoch_millis: i64,
    pub binding: BindOutcome,
}

/// Marks an event as having an attempt in flight; released on drop.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<EventId>>,
    event_id: EventId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<EventId>>, event_id: &EventId) -> Option<Self> {
        if !in_flight.lock().insert(event_id.clone()) {
            return None;
        }
        Some(Self {
            in_flight,
            event_id: event_id.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.event_id);
    }
}

pub struct SubscriptionProtocol {
    platform: Arc<dyn PushPlatform>,
    binder: Arc<dyn TopicBinder>,
    ledger: Arc<dyn SubscriptionLedger>,
    clock: Arc<dyn Clock>,
    messaging: MessagingConfig,
    app_origin: Url,
    policy: PushPolicy,
    in_flight: Mutex<HashSet<EventId>>,
}

impl SubscriptionProtocol {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        binder: Arc<dyn TopicBinder>,
        ledger: Arc<dyn SubscriptionLedger>,
        clock: Arc<dyn Clock>,
        messaging: MessagingConfig,
        app_origin: Url,
        policy: PushPolicy,
    ) -> Self {
        Self {
            platform,
            binder,
            ledger,
            clock,
            messaging,
            app_origin,
            policy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Lifecycle policy shared with the staleness reconciler.
    pub fn policy(&self) -> &PushPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &Arc<dyn SubscriptionLedger> {
        &self.ledger
    }

    /// Whether an attempt for `event_id` is currently running.
    pub fn is_in_flight(&self, event_id: &EventId) -> bool {
        self.in_flight.lock().contains(event_id)
    }

    /// Subscribe this device to the event's broadcast topic.
    pub async fn subscribe(
        &self,
        event_id: &EventId,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        let _guard =
            InFlightGuard::acquire(&self.in_flight, event_id).ok_or(SubscribeFailure::InProgress)?;
        info!(event_id = %event_id, "Starting push subscription");
        self.run_pipeline(event_id).await
    }

    /// Drop the current ledger entry, then run the full pipeline again.
    ///
    /// The clear happens before the permission request, so an attempt that
    /// dies midway leaves the device observably unsubscribed.
    pub async fn resubscribe(
        &self,
        event_id: &EventId,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        let _guard =
            InFlightGuard::acquire(&self.in_flight, event_id).ok_or(SubscribeFailure::InProgress)?;
        info!(event_id = %event_id, "Refreshing push subscription");

        self.ledger
            .clear(event_id)
            .await
            .map_err(|e| SubscribeFailure::Storage(e.to_string()))?;

        self.run_pipeline(event_id).await
    }

    async fn run_pipeline(
        &self,
        event_id: &EventId,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        let result = self.run_steps(event_id).await;
        if let Err(failure) = &result {
            warn!(event_id = %event_id, failure = %failure, "Push subscription did not complete");
        }
        result
    }

    async fn run_steps(
        &self,
        event_id: &EventId,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        self.request_permission().await?;
        let registration = self.register_worker().await?;
        let token = self.mint_token(&registration).await?;
        let binding = self.bind_topic(&token, event_id).await?;
        self.commit(event_id, token, binding).await
    }

    async fn request_permission(&self) -> Result<(), SubscribeFailure> {
        match self.platform.request_permission().await {
            Ok(PermissionState::Granted) => Ok(()),
            Ok(state) => {
                debug!(?state, "Notification permission not granted");
                Err(SubscribeFailure::PermissionDenied)
            }
            Err(e) => {
                debug!(error = %e, "Permission request failed");
                Err(SubscribeFailure::PermissionDenied)
            }
        }
    }

    async fn register_worker(&self) -> Result<WorkerRegistration, SubscribeFailure> {
        let script = WorkerScript::from_config(&self.app_origin, &self.messaging)
            .map_err(|e| SubscribeFailure::WorkerRegistration(e.to_string()))?;

        self.platform
            .register_worker(&script)
            .await
            .map_err(|e| SubscribeFailure::WorkerRegistration(e.to_string()))
    }

    async fn mint_token(
        &self,
        registration: &WorkerRegistration,
    ) -> Result<String, SubscribeFailure> {
        match self
            .platform
            .mint_token(registration, &self.messaging.vapid_public_key)
            .await
        {
            Ok(Some(token)) if !token.trim().is_empty() => Ok(token),
            Ok(_) => Err(SubscribeFailure::TokenUnavailable),
            Err(e) => {
                debug!(error = %e, "Token mint failed");
                Err(SubscribeFailure::TokenUnavailable)
            }
        }
    }

    async fn bind_topic(
        &self,
        token: &str,
        event_id: &EventId,
    ) -> Result<BindOutcome, SubscribeFailure> {
        bind_with_retry(
            self.binder.as_ref(),
            &self.policy.binder_retry,
            token,
            event_id,
        )
            .await
            .map_err(|e| SubscribeFailure::Binding(e.to_string()))
    }

    async fn commit(
        &self,
        event_id: &EventId,
        token: String,
        binding: BindOutcome,
    ) -> Result<SubscriptionSuccess, SubscribeFailure> {
        let now = self.clock.now_millis();
        self.ledger
            .set(event_id, DeviceSubscription::subscribed(token.clone(), now))
            .await
            .map_err(|e| SubscribeFailure::Storage(e.to_string()))?;

        info!(
            event_id = %event_id,
            token = %redact_token(&token),
            ?binding,
            "Push subscription committed"
        );

        Ok(SubscriptionSuccess {
            event_id: event_id.clone(),
            token,
            subscribed_at_epoch_millis: now,
            binding,
        })
    }
}
