//! Generic webhook notification channel

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::io::HttpClient;
use crate::notify::{NotificationPayload, Notifier};
use crate::template;

/// Sends notifications to a templated webhook endpoint
pub struct WebhookNotifier {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    body: Option<String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field("method", &self.method)
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&str>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        tracing::debug!("Created WebhookNotifier for {} {}", method, url);
        Self {
            url: url.to_string(),
            method: method.to_ascii_uppercase(),
            headers: headers.clone(),
            body: body.map(|b| b.to_string()),
            http,
        }
    }

    /// The structured body sent when no body template is configured
    fn default_body(payload: &NotificationPayload) -> String {
        json!({
            "title": payload.title,
            "message": payload.message,
            "url": payload.url,
            "name": payload.name,
            "priority": payload.priority,
            "tags": payload.tags,
            "timestamp": payload.timestamp,
            "event": payload.event,
            "hash": payload.hash,
            "diff": payload.diff,
        })
        .to_string()
    }

    fn render_field(template_str: &str, payload: &NotificationPayload, field: &str) -> String {
        let rendered = template::render(template_str, payload);
        if !rendered.unknown.is_empty() {
            tracing::warn!(
                "Unknown placeholders in webhook {}: {:?}",
                field,
                rendered.unknown
            );
        }
        rendered.text
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, payload: &NotificationPayload) -> crate::Result<()> {
        let url = Self::render_field(&self.url, payload, "url");

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(key, value)| (key.clone(), Self::render_field(value, payload, "header")))
            .collect();

        let body = match &self.body {
            Some(template_str) => Some(Self::render_field(template_str, payload, "body")),
            None if self.method == "GET" => None,
            None => {
                if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(Self::default_body(payload))
            }
        };

        tracing::debug!("Sending webhook notification: {} {}", self.method, url);

        let response = self.http.send(&self.method, &url, &headers, body).await?;

        if !(200..300).contains(&response.status) {
            return Err(crate::WatchError::Notify(format!(
                "Webhook {} returned status {}: {}",
                url, response.status, response.body
            )));
        }

        tracing::debug!("Webhook notification sent successfully");
        Ok(())
    }
}
