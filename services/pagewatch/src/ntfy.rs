//! ntfy push notification channel

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::io::HttpClient;
use crate::notify::{NotificationPayload, Notifier};

/// Sends notifications to an ntfy topic
pub struct NtfyNotifier {
    topic: String,
    server: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for NtfyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtfyNotifier")
            .field("topic", &self.topic)
            .field("server", &self.server)
            .finish()
    }
}

impl NtfyNotifier {
    pub fn new(topic: &str, server: &str, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created NtfyNotifier for topic '{}' at {}", topic, server);
        Self {
            topic: topic.to_string(),
            server: server.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    fn type_name(&self) -> &str {
        "ntfy"
    }

    async fn notify(&self, payload: &NotificationPayload) -> crate::Result<()> {
        let body = json!({
            "topic": self.topic,
            "title": payload.title,
            "priority": payload.priority,
            "message": payload.message,
            "tags": payload.tags,
            "click": payload.url,
        });

        tracing::debug!(
            "Sending ntfy notification to topic '{}': {}",
            self.topic,
            payload.title
        );

        let response = self.http.post_json(&self.server, &body).await?;

        if !(200..300).contains(&response.status) {
            return Err(crate::WatchError::Notify(format!(
                "ntfy server returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("ntfy notification sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Priority, ResourceConfig};
    use crate::io::{HttpResponse, MockHttpClient};
    use crate::notify::NotifyEvent;

    fn test_payload() -> NotificationPayload {
        let resource = ResourceConfig {
            name: "Example".to_string(),
            url: "https://example.com".to_string(),
            selector: None,
            enabled: true,
            priority: Priority::High,
            tags: vec!["web".to_string()],
            notify_on_first_run: true,
            notifiers: Vec::new(),
        };
        NotificationPayload::new(&resource, NotifyEvent::Change, "content changed", None, None)
    }

    #[tokio::test]
    async fn posts_expected_json_body() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json()
            .withf(|url, body| {
                url == "https://ntfy.example.com"
                    && body["topic"] == "watch"
                    && body["title"] == "Change detected: Example"
                    && body["priority"] == 4
                    && body["message"] == "content changed"
                    && body["tags"][0] == "web"
                    && body["click"] == "https://example.com"
            })
            .returning(|_, _| {
                Box::pin(async {
                    Ok(HttpResponse {
                        status: 200,
                        body: "{}".to_string(),
                    })
                })
            });

        let notifier = NtfyNotifier::new("watch", "https://ntfy.example.com", Arc::new(mock));
        notifier.notify(&test_payload()).await.unwrap();
    }

    #[tokio::test]
    async fn trims_trailing_slash_from_server() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json()
            .withf(|url, _| url == "https://ntfy.sh")
            .returning(|_, _| {
                Box::pin(async {
                    Ok(HttpResponse {
                        status: 200,
                        body: "{}".to_string(),
                    })
                })
            });

        let notifier = NtfyNotifier::new("watch", "https://ntfy.sh/", Arc::new(mock));
        notifier.notify(&test_payload()).await.unwrap();
    }

    #[tokio::test]
    async fn returns_error_on_non_2xx() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json().returning(|_, _| {
            Box::pin(async {
                Ok(HttpResponse {
                    status: 403,
                    body: "forbidden".to_string(),
                })
            })
        });

        let notifier = NtfyNotifier::new("watch", "https://ntfy.sh", Arc::new(mock));
        let err = notifier.notify(&test_payload()).await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn returns_error_on_http_failure() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json().returning(|_, _| {
            Box::pin(async { Err(crate::WatchError::Http("timeout".to_string())) })
        });

        let notifier = NtfyNotifier::new("watch", "https://ntfy.sh", Arc::new(mock));
        let err = notifier.notify(&test_payload()).await.unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn type_name_is_ntfy() {
        let mock = MockHttpClient::new();
        let notifier = NtfyNotifier::new("watch", "https://ntfy.sh", Arc::new(mock));
        assert_eq!(notifier.type_name(), "ntfy");
    }
}
