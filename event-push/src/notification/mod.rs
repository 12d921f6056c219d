//! Delivery side: payload format, the background delivery agent, and the
//! server-side fan-out that feeds it.

pub mod agent;
pub mod fanout;
pub mod payload;
pub mod sender;

pub use agent::{
    ANNOUNCEMENT_TAG, ClickOutcome, DeliveryAgent, NotificationClick, NotificationSurface,
    RenderedNotification, WindowClient, WindowClients, resolve_deep_link,
};
pub use fanout::{Announcement, FanoutReport, FanoutService};
pub use payload::NotificationPayload;
pub use sender::{HttpPushSender, PushSender, SendError};
