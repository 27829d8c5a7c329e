//! Event source adapter for a request-handling web framework.
//!
//! The framework's instrumentation hooks arrive as `Notification`s; the
//! `RequestSubscriber` turns each into calls on an `EventAggregator` so that
//! every request yields one record.

pub mod notification;
pub mod request;

pub use notification::{Notification, NotificationKind};
pub use request::RequestSubscriber;
