//! Background delivery agent.
//!
//! Runs in the worker context, independent of any page. It renders what it
//! receives and routes clicks; it never reads or writes the subscription
//! ledger.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::payload::{DEFAULT_DEEP_LINK, NotificationPayload};
use crate::subscription::PlatformError;

/// Shared tag for announcements that do not name an event.
pub const ANNOUNCEMENT_TAG: &str = "event-announcement";

const DEFAULT_ICON: &str = "/icons/icon-192.png";
const DEFAULT_BADGE: &str = "/icons/badge-72.png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    pub url: String,
}

/// A notification as handed to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Notifications sharing a tag replace each other in the tray.
    pub tag: String,
    pub renotify: bool,
    pub data: NotificationData,
}

impl RenderedNotification {
    pub fn from_payload(payload: NotificationPayload, icon: &str, badge: &str) -> Self {
        let tag = payload
            .event_id
            .as_deref()
            .map(|id| format!("event-{}", id))
            .unwrap_or_else(|| ANNOUNCEMENT_TAG.to_string());

        Self {
            title: payload.title,
            body: payload.body,
            icon: icon.to_string(),
            badge: badge.to_string(),
            tag,
            renotify: true,
            data: NotificationData {
                url: payload.deep_link_url,
            },
        }
    }
}

/// A click on a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClick {
    pub tag: String,
    pub url: Option<String>,
}

/// An open app window known to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: Url,
}

/// Platform notification tray.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, notification: &RenderedNotification) -> Result<(), PlatformError>;

    async fn close(&self, tag: &str) -> Result<(), PlatformError>;
}

/// Windows controlled by the worker.
#[async_trait]
pub trait WindowClients: Send + Sync {
    async fn list(&self) -> Result<Vec<WindowClient>, PlatformError>;

    async fn focus(&self, client_id: &str) -> Result<(), PlatformError>;

    async fn open(&self, url: &Url) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(Url),
    Opened(Url),
    /// Neither focusing nor opening worked; already logged.
    Failed(Url),
}

pub struct DeliveryAgent {
    surface: Arc<dyn NotificationSurface>,
    clients: Arc<dyn WindowClients>,
    app_origin: Url,
    icon: String,
    badge: String,
}

impl DeliveryAgent {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        clients: Arc<dyn WindowClients>,
        app_origin: Url,
    ) -> Self {
        Self {
            surface,
            clients,
            app_origin,
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
        }
    }

    pub fn with_icons(mut self, icon: impl Into<String>, badge: impl Into<String>) -> Self {
        self.icon = icon.into();
        self.badge = badge.into();
        self
    }

    /// Render an incoming push message. Never fails.
    pub async fn on_message(&self, message: &Value) -> RenderedNotification {
        let payload = NotificationPayload::from_value(message);
        let notification = RenderedNotification::from_payload(payload, &self.icon, &self.badge);

        if let Err(e) = self.surface.show(&notification).await {
            warn!(tag = %notification.tag, error = %e, "Failed to show notification");
        } else {
            debug!(tag = %notification.tag, "Notification shown");
        }
        notification
    }

    /// Close the clicked notification and bring the app up at its deep link.
    pub async fn on_notification_click(&self, click: &NotificationClick) -> ClickOutcome {
        if let Err(e) = self.surface.close(&click.tag).await {
            debug!(tag = %click.tag, error = %e, "Failed to close notification");
        }

        let target = resolve_deep_link(&self.app_origin, click.url.as_deref());

        match self.clients.list().await {
            Ok(windows) => {
                if let Some(window) = windows.iter().find(|w| w.url == target) {
                    match self.clients.focus(&window.id).await {
                        Ok(()) => return ClickOutcome::Focused(target),
                        Err(e) => {
                            debug!(client = %window.id, error = %e, "Failed to focus window")
                        }
                    }
                }
            }
            Err(e) => debug!(error = %e, "Failed to list windows"),
        }

        match self.clients.open(&target).await {
            Ok(()) => ClickOutcome::Opened(target),
            Err(e) => {
                warn!(url = %target, error = %e, "Failed to open window for notification click");
                ClickOutcome::Failed(target)
            }
        }
    }
}

/// Resolve a deep link against the app origin.
///
/// Missing, unparsable or cross-origin links resolve to the site root.
pub fn resolve_deep_link(origin: &Url, link: Option<&str>) -> Url {
    let root = || {
        origin
            .join(DEFAULT_DEEP_LINK)
            .unwrap_or_else(|_| origin.clone())
    };

    let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) else {
        return root();
    };

    match origin.join(link) {
        Ok(url) if url.origin() == origin.origin() => url,
        Ok(url) => {
            debug!(url = %url, "Ignoring cross-origin deep link");
            root()
        }
        Err(_) => root(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://events.example").unwrap()
    }

    #[test]
    fn test_resolve_deep_link() {
        let origin = origin();
        assert_eq!(
            resolve_deep_link(&origin, Some("/event/gala")).as_str(),
            "https://events.example/event/gala"
        );
        assert_eq!(
            resolve_deep_link(&origin, Some("https://events.example/event/fair?x=1")).as_str(),
            "https://events.example/event/fair?x=1"
        );
        assert_eq!(resolve_deep_link(&origin, None).as_str(), "https://events.example/");
        assert_eq!(resolve_deep_link(&origin, Some("  ")).as_str(), "https://events.example/");
        assert_eq!(
            resolve_deep_link(&origin, Some("https://evil.example/phish")).as_str(),
            "https://events.example/"
        );
    }

    #[test]
    fn test_tag_per_event_stream() {
        let mut payload = NotificationPayload::default();
        assert_eq!(
            RenderedNotification::from_payload(payload.clone(), "i", "b").tag,
            ANNOUNCEMENT_TAG
        );

        payload.event_id = Some("gala".to_string());
        let rendered = RenderedNotification::from_payload(payload, "i", "b");
        assert_eq!(rendered.tag, "event-gala");
        assert!(rendered.renotify);
    }
}
