//! Notify module: notification bus and the toast list that displays it.

mod bus;
mod tray;

pub use bus::NotificationBus;
pub use tray::{ActiveToast, ToastTray};
