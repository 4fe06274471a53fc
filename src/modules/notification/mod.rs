pub mod dispatcher;
pub mod model;

pub use dispatcher::{LogNotificationSink, NotificationDispatcher, NotificationSink};
pub use model::NotificationEvent;
