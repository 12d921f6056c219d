use serde::Serialize;

use super::capability::CapabilityResult;
use super::protocol::SubscribeFailure;

/// Every state the subscribe control can be in, each with one fixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Unsupported,
    RequiresInstall,
    PermissionDenied,
    NotSubscribed,
    Subscribed,
    InProgress,
    WorkerRegistrationFailed,
    TokenUnavailable,
    BindingFailed,
    StorageFailed,
}

impl SubscriptionStatus {
    pub fn message(self) -> &'static str {
        match self {
            Self::Unsupported => "Notifications are not supported on this browser.",
            Self::RequiresInstall => {
                "Add this site to your home screen, then open it from there to enable notifications."
            }
            Self::PermissionDenied => {
                "Notifications are blocked. Allow them in your browser settings to subscribe."
            }
            Self::NotSubscribed => "Get notified when new announcements are posted.",
            Self::Subscribed => "You're subscribed to announcements for this event.",
            Self::InProgress => "Setting up notifications…",
            Self::WorkerRegistrationFailed => {
                "We couldn't set up background notifications. Please try again."
            }
            Self::TokenUnavailable => "This device didn't receive a push token. Please try again.",
            Self::BindingFailed => "We couldn't reach the notification service. Please try again.",
            Self::StorageFailed => "We couldn't save your subscription on this device. Please try again.",
        }
    }

    /// Whether the UI should offer a retry action.
    pub fn can_retry(self) -> bool {
        matches!(
            self,
            Self::WorkerRegistrationFailed
                | Self::TokenUnavailable
                | Self::BindingFailed
                | Self::StorageFailed
        )
    }

    /// Whether the subscribe button is shown at all.
    pub fn can_subscribe(self) -> bool {
        matches!(self, Self::NotSubscribed) || self.can_retry()
    }
}

impl From<CapabilityResult> for SubscriptionStatus {
    /// A ready environment maps to `NotSubscribed`; the caller upgrades it
    /// from the ledger.
    fn from(capability: CapabilityResult) -> Self {
        match capability {
            CapabilityResult::Unsupported => Self::Unsupported,
            CapabilityResult::RequiresInstall => Self::RequiresInstall,
            CapabilityResult::PermissionDenied => Self::PermissionDenied,
            CapabilityResult::Ready => Self::NotSubscribed,
        }
    }
}

impl From<&SubscribeFailure> for SubscriptionStatus {
    fn from(failure: &SubscribeFailure) -> Self {
        match failure {
            SubscribeFailure::PermissionDenied => Self::PermissionDenied,
            SubscribeFailure::WorkerRegistration(_) => Self::WorkerRegistrationFailed,
            SubscribeFailure::TokenUnavailable => Self::TokenUnavailable,
            SubscribeFailure::Binding(_) => Self::BindingFailed,
            SubscribeFailure::InProgress => Self::InProgress,
            SubscribeFailure::Storage(_) => Self::StorageFailed,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL: [SubscriptionStatus; 10] = [
        SubscriptionStatus::Unsupported,
        SubscriptionStatus::RequiresInstall,
        SubscriptionStatus::PermissionDenied,
        SubscriptionStatus::NotSubscribed,
        SubscriptionStatus::Subscribed,
        SubscriptionStatus::InProgress,
        SubscriptionStatus::WorkerRegistrationFailed,
        SubscriptionStatus::TokenUnavailable,
        SubscriptionStatus::BindingFailed,
        SubscriptionStatus::StorageFailed,
    ];

    #[test]
    fn test_messages_are_distinct() {
        let messages: HashSet<_> = ALL.iter().map(|s| s.message()).collect();
        assert_eq!(messages.len(), ALL.len());
    }

    #[test]
    fn test_failure_mapping_hides_details() {
        let failure = SubscribeFailure::Binding("connection reset by peer".to_string());
        let status = SubscriptionStatus::from(&failure);
        assert_eq!(status, SubscriptionStatus::BindingFailed);
        assert!(!status.message().contains("connection reset"));
        assert!(status.can_retry());
    }

    #[test]
    fn test_permanent_states_offer_no_retry() {
        for status in [
            SubscriptionStatus::Unsupported,
            SubscriptionStatus::RequiresInstall,
            SubscriptionStatus::PermissionDenied,
        ] {
            assert!(!status.can_retry());
            assert!(!status.can_subscribe());
        }
    }
}
