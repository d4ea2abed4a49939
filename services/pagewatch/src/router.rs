//! Channel resolution and parallel notification dispatch

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ChannelConfig, ChannelRef, Config, ResourceConfig};
use crate::io::HttpClient;
use crate::notify::{NotificationPayload, Notifier};
use crate::ntfy::NtfyNotifier;
use crate::throttle::ErrorThrottle;
use crate::webhook::WebhookNotifier;

/// One channel's delivery failure within a dispatch
#[derive(Debug, Clone)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: String,
}

/// Outcome of delivering one payload to a resource's channels
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<ChannelFailure>,
}

impl DispatchReport {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.delivered == 0
    }
}

/// Resolves a resource's channels and delivers payloads to them
pub struct NotificationRouter {
    channels: HashMap<String, ChannelConfig>,
    default_channel: Option<ChannelConfig>,
    throttle: ErrorThrottle,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("default_channel", &self.default_channel.is_some())
            .finish()
    }
}

impl NotificationRouter {
    pub fn new(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        Self {
            channels: config.channels.clone(),
            default_channel: config.default_channel.clone(),
            throttle: ErrorThrottle {
                threshold: config.error_notification_threshold,
                cooldown_ms: config.error_notification_cooldown_ms,
            },
            http,
        }
    }

    /// The throttling policy applied to error alerts
    pub fn throttle(&self) -> ErrorThrottle {
        self.throttle
    }

    /// Resolve a resource's channel list: configured notifiers first, then
    /// the default channel, then none. An unknown named channel is a
    /// configuration error, surfaced before any delivery is attempted.
    pub fn resolve(&self, resource: &ResourceConfig) -> crate::Result<Vec<Arc<dyn Notifier>>> {
        let mut configs: Vec<ChannelConfig> = Vec::new();

        if resource.notifiers.is_empty() {
            if let Some(default) = &self.default_channel {
                configs.push(default.clone());
            }
        } else {
            for reference in &resource.notifiers {
                match reference {
                    ChannelRef::Named(name) => match self.channels.get(name) {
                        Some(config) => configs.push(config.clone()),
                        None => {
                            return Err(crate::WatchError::Config(format!(
                                "Resource '{}' references unknown notification channel {:?}",
                                resource.name, name
                            )));
                        }
                    },
                    ChannelRef::Inline(config) => configs.push(config.clone()),
                }
            }
        }

        Ok(configs
            .iter()
            .map(|config| self.build_notifier(config))
            .collect())
    }

    fn build_notifier(&self, config: &ChannelConfig) -> Arc<dyn Notifier> {
        match config {
            ChannelConfig::Ntfy { topic, server } => {
                Arc::new(NtfyNotifier::new(topic, server, Arc::clone(&self.http)))
            }
            ChannelConfig::Webhook {
                url,
                method,
                headers,
                body,
            } => Arc::new(WebhookNotifier::new(
                url,
                method,
                headers,
                body.as_deref(),
                Arc::clone(&self.http),
            )),
        }
    }

    /// Deliver a payload to every resolved channel concurrently.
    ///
    /// Individual failures are collected; the dispatch only fails as a whole
    /// when every channel failed. No resolved channels is a silent no-op.
    pub async fn dispatch(
        &self,
        resource: &ResourceConfig,
        payload: &NotificationPayload,
    ) -> crate::Result<DispatchReport> {
        let notifiers = self.resolve(resource)?;
        if notifiers.is_empty() {
            tracing::debug!("No notification channels configured for '{}'", resource.name);
            return Ok(DispatchReport::default());
        }

        let attempted = notifiers.len();
        let mut handles = Vec::new();
        for notifier in notifiers {
            let payload = payload.clone();
            handles.push(tokio::spawn(async move {
                let channel = notifier.type_name().to_string();
                let result = notifier.notify(&payload).await;
                (channel, result)
            }));
        }

        let mut report = DispatchReport {
            attempted,
            ..DispatchReport::default()
        };
        for handle in handles {
            match handle.await {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((channel, Err(e))) => report.failures.push(ChannelFailure {
                    channel,
                    error: e.to_string(),
                }),
                Err(e) => report.failures.push(ChannelFailure {
                    channel: "unknown".to_string(),
                    error: format!("notification task failed: {}", e),
                }),
            }
        }

        if report.all_failed() {
            let reasons: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.channel, f.error))
                .collect();
            return Err(crate::WatchError::Notify(format!(
                "All {} channels failed for '{}': {}",
                report.attempted,
                resource.name,
                reasons.join("; ")
            )));
        }

        if !report.failures.is_empty() {
            tracing::warn!(
                "{} of {} channels failed for '{}': {:?}",
                report.failures.len(),
                report.attempted,
                resource.name,
                report.failures
            );
        }

        Ok(report)
    }
}
