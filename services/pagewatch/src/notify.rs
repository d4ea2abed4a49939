//! Notifier trait and notification payload types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ResourceConfig;

/// What kind of observation triggered a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Initial,
    Change,
    Error,
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyEvent::Initial => write!(f, "initial"),
            NotifyEvent::Change => write!(f, "change"),
            NotifyEvent::Error => write!(f, "error"),
        }
    }
}

/// Fully rendered, channel-agnostic notification content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub url: String,
    pub name: String,
    pub priority_label: String,
    pub priority: u8,
    pub tags: Vec<String>,
    pub timestamp: String,
    pub event: NotifyEvent,
    pub hash: Option<String>,
    pub diff: Option<String>,
}

impl NotificationPayload {
    /// Build a payload for the given resource and event, with `detail`
    /// carrying the diff text or error description
    pub fn new(
        resource: &ResourceConfig,
        event: NotifyEvent,
        detail: &str,
        hash: Option<String>,
        diff: Option<String>,
    ) -> Self {
        let title = match event {
            NotifyEvent::Initial => format!("First snapshot: {}", resource.name),
            NotifyEvent::Change => format!("Change detected: {}", resource.name),
            NotifyEvent::Error => format!("Monitor error: {}", resource.name),
        };

        Self {
            title,
            message: detail.to_string(),
            url: resource.url.clone(),
            name: resource.name.clone(),
            priority_label: resource.priority.label().to_string(),
            priority: resource.priority.level(),
            tags: resource.tags.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
            hash,
            diff,
        }
    }
}

/// Trait for sending notifications through one channel
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Get the channel type name (e.g. "ntfy")
    fn type_name(&self) -> &str;

    /// Send a notification
    async fn notify(&self, payload: &NotificationPayload) -> crate::Result<()>;
}
