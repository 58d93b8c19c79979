//! Push message presentation.

use chrono::Utc;
use serde::Serialize;

use crate::clients::WindowAction;

pub const NOTIFICATION_TITLE: &str = "Smart Expense Tracker";
pub const DEFAULT_BODY: &str = "New update available";
const ICON: &str = "/icon-192x192.png";

/// Action id that opens the app from a notification.
pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  /// Milliseconds since the epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

/// A notification ready for the host to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  /// Build the notification for a push message. An absent payload gets the
  /// default body.
  pub fn from_push(payload: Option<&str>) -> Self {
    let action = |action: &str, title: &str| NotificationAction {
      action: action.to_string(),
      title: title.to_string(),
      icon: ICON.to_string(),
    };

    Self {
      title: NOTIFICATION_TITLE.to_string(),
      body: payload.unwrap_or(DEFAULT_BODY).to_string(),
      icon: ICON.to_string(),
      badge: ICON.to_string(),
      vibrate: vec![200, 100, 200],
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![action(EXPLORE_ACTION, "View"), action(CLOSE_ACTION, "Close")],
    }
  }
}

/// Result of a notification click, after the notification was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Dismissed,
  Window(WindowAction),
}
