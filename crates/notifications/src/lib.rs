//! Notification routing for the marketplace core.
//!
//! - [`NotificationRouter`]: renders a notification from its template,
//!   stores it, and queues it for the channels the recipient enabled
//! - [`Dispatcher`]: background worker sending queued notifications through
//!   the push, email and SMS adapters with a per-channel timeout
//! - [`OrderNotifications`]: projection that maps order events to
//!   notifications for the buyer or the seller

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod order_events;
pub mod postgres;
pub mod preferences;
pub mod router;
pub mod store;
pub mod templates;

pub use channels::{
    ChannelSet, Delivery, EmailChannel, PushChannel, RecordingChannels, SmsChannel,
    TracingChannels,
};
pub use config::NotificationConfig;
pub use dispatch::{DispatchHandle, DispatchJob, Dispatcher};
pub use error::{NotificationError, Result};
pub use model::{
    EntityKind, EntityRef, Notification, NotificationFilter, NotificationId, NotificationRequest,
    NotificationStats, NotificationType, Priority,
};
pub use order_events::{OrderNotifications, OrderParties, route_order_event};
pub use postgres::{PostgresNotificationStore, PostgresPreferenceStore};
pub use preferences::{
    Category, CategoryToggles, Channel, InMemoryPreferenceStore, NotificationPreference,
    PreferenceStore, PreferenceUpdate, QuietHours, QuietHoursPolicy, SmsToggles, plan_channels,
};
pub use router::NotificationRouter;
pub use store::{InMemoryNotificationStore, NotificationStore};
pub use templates::{
    FALLBACK_MESSAGE, FALLBACK_TITLE, Localized, NotificationTemplate, RenderedText,
    TemplateRegistry,
};
