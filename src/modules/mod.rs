pub mod notification;
pub mod video;
