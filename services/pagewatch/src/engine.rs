//! Engine: orchestrates the per-resource pipeline of fetching, diffing,
//! persisting, and notifying

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ResourceConfig;
use crate::differ::{self, ChangeResult, DiffLimits};
use crate::fetcher::{FetchSuccess, Fetcher};
use crate::notify::{NotificationPayload, NotifyEvent};
use crate::router::NotificationRouter;
use crate::snapshot::{Snapshot, SnapshotEntry, SnapshotStore};
use crate::throttle::ThrottleDecision;

/// Aggregate counts for one full run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub changed: usize,
    pub first_runs: usize,
    pub errors: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked={} changed={} first_runs={} errors={}",
            self.checked, self.changed, self.first_runs, self.errors
        )
    }
}

/// Result of one resource's pipeline
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub name: String,
    pub result: ChangeResult,
    pub notified: bool,
}

/// The engine runs all enabled resources' pipelines concurrently
pub struct Engine {
    fetcher: Arc<Fetcher>,
    store: Arc<SnapshotStore>,
    router: Arc<NotificationRouter>,
    limits: DiffLimits,
}

impl Engine {
    pub fn new(
        fetcher: Arc<Fetcher>,
        store: Arc<SnapshotStore>,
        router: Arc<NotificationRouter>,
        limits: DiffLimits,
    ) -> Self {
        Self {
            fetcher,
            store,
            router,
            limits,
        }
    }

    /// Check every enabled resource once. One resource's failure never
    /// affects another's pipeline.
    pub async fn run(&self, resources: &[ResourceConfig]) -> RunSummary {
        let mut handles = Vec::new();
        for resource in resources {
            if !resource.enabled {
                tracing::debug!("Skipping disabled resource '{}'", resource.name);
                continue;
            }

            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let router = Arc::clone(&self.router);
            let limits = self.limits.clone();
            let resource = resource.clone();

            handles.push(tokio::spawn(async move {
                check_resource(fetcher, store, router, limits, resource).await
            }));
        }

        let mut summary = RunSummary::default();
        for handle in handles {
            summary.checked += 1;
            match handle.await {
                Ok(Ok(outcome)) => {
                    if outcome.result.error.is_some() {
                        summary.errors += 1;
                    } else if outcome.result.is_first_run {
                        summary.first_runs += 1;
                    } else if outcome.result.changed {
                        summary.changed += 1;
                    }
                }
                Ok(Err(e)) => {
                    summary.errors += 1;
                    tracing::error!("Resource pipeline failed: {}", e);
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!("Resource task aborted: {}", e);
                }
            }
        }

        tracing::info!("Run complete: {}", summary);
        summary
    }
}

/// One resource's full pipeline: fetch, diff, persist, notify
async fn check_resource(
    fetcher: Arc<Fetcher>,
    store: Arc<SnapshotStore>,
    router: Arc<NotificationRouter>,
    limits: DiffLimits,
    resource: ResourceConfig,
) -> crate::Result<ResourceOutcome> {
    match fetcher
        .fetch(&resource.name, &resource.url, resource.selector.as_deref())
        .await
    {
        Ok(fetched) => handle_success(store, router, &limits, &resource, fetched).await,
        Err(e) => handle_failure(store, router, &resource, &e.to_string()).await,
    }
}

async fn handle_success(
    store: Arc<SnapshotStore>,
    router: Arc<NotificationRouter>,
    limits: &DiffLimits,
    resource: &ResourceConfig,
    fetched: FetchSuccess,
) -> crate::Result<ResourceOutcome> {
    for warning in &fetched.warnings {
        tracing::debug!("Fetch warning for '{}': {:?}", resource.name, warning);
    }

    let now = current_epoch_ms();
    let entry = SnapshotEntry {
        timestamp_epoch_ms: now,
        hash: differ::content_hash(&fetched.content),
        content: fetched.content,
        status: fetched.status,
    };

    let prior = store.load(&resource.url, &resource.name)?;
    let result = differ::compare(prior.as_ref().map(|s| &s.current), &entry, limits);

    // The record is rewritten wholesale on every run; counters follow the
    // increment rules, previous only rotates on a confirmed change.
    let snapshot = match prior {
        None => Snapshot {
            url: resource.url.clone(),
            name: resource.name.clone(),
            current: entry,
            previous: None,
            last_check_epoch_ms: now,
            change_count: 0,
            error_count: 0,
            enabled: resource.enabled,
            selector: resource.selector.clone(),
            last_error_notification_epoch_ms: None,
        },
        Some(p) if result.changed => Snapshot {
            url: resource.url.clone(),
            name: resource.name.clone(),
            previous: Some(p.current),
            current: entry,
            last_check_epoch_ms: now,
            change_count: p.change_count + 1,
            error_count: 0,
            enabled: resource.enabled,
            selector: resource.selector.clone(),
            last_error_notification_epoch_ms: p.last_error_notification_epoch_ms,
        },
        Some(p) => Snapshot {
            url: resource.url.clone(),
            name: resource.name.clone(),
            previous: p.previous,
            current: entry,
            last_check_epoch_ms: now,
            change_count: p.change_count,
            error_count: 0,
            enabled: resource.enabled,
            selector: resource.selector.clone(),
            last_error_notification_epoch_ms: p.last_error_notification_epoch_ms,
        },
    };
    store.save(&snapshot)?;

    let event = if result.is_first_run {
        if resource.notify_on_first_run {
            Some(NotifyEvent::Initial)
        } else {
            None
        }
    } else if result.changed {
        Some(NotifyEvent::Change)
    } else {
        None
    };

    let mut notified = false;
    if let Some(event) = event {
        let detail = match event {
            NotifyEvent::Change if !result.diff.is_empty() => result.diff.clone(),
            NotifyEvent::Change => "Content changed".to_string(),
            _ => format!("First snapshot recorded for {}", resource.url),
        };
        let diff = (!result.diff.is_empty()).then(|| result.diff.clone());
        let payload =
            NotificationPayload::new(resource, event, &detail, result.new_hash.clone(), diff);

        // a change is a change even when no alert got through
        match router.dispatch(resource, &payload).await {
            Ok(report) => notified = report.delivered > 0,
            Err(e) => {
                tracing::warn!("Notification dispatch for '{}' failed: {}", resource.name, e);
            }
        }
    }

    Ok(ResourceOutcome {
        name: resource.name.clone(),
        result,
        notified,
    })
}

async fn handle_failure(
    store: Arc<SnapshotStore>,
    router: Arc<NotificationRouter>,
    resource: &ResourceConfig,
    message: &str,
) -> crate::Result<ResourceOutcome> {
    tracing::warn!("Resource '{}' failed: {}", resource.name, message);

    let now = current_epoch_ms();
    let prior = store.load(&resource.url, &resource.name)?;
    let mut snapshot = match prior {
        Some(p) => Snapshot {
            error_count: p.error_count + 1,
            last_check_epoch_ms: now,
            enabled: resource.enabled,
            selector: resource.selector.clone(),
            ..p
        },
        // no prior record: the failure itself creates it, starting at 1
        None => Snapshot {
            url: resource.url.clone(),
            name: resource.name.clone(),
            current: SnapshotEntry {
                timestamp_epoch_ms: now,
                content: String::new(),
                hash: String::new(),
                status: 0,
            },
            previous: None,
            last_check_epoch_ms: now,
            change_count: 0,
            error_count: 1,
            enabled: resource.enabled,
            selector: resource.selector.clone(),
            last_error_notification_epoch_ms: None,
        },
    };
    store.save(&snapshot)?;

    let decision = router.throttle().evaluate(
        snapshot.error_count,
        snapshot.last_error_notification_epoch_ms,
        now,
    );

    let mut notified = false;
    match decision {
        ThrottleDecision::Send => {
            let detail = format!("{} ({} consecutive failures)", message, snapshot.error_count);
            let payload =
                NotificationPayload::new(resource, NotifyEvent::Error, &detail, None, None);
            match router.dispatch(resource, &payload).await {
                Ok(report) if report.delivered > 0 => {
                    notified = true;
                    snapshot.last_error_notification_epoch_ms = Some(now);
                    store.save(&snapshot)?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Error notification for '{}' failed: {}", resource.name, e);
                }
            }
        }
        reason => {
            tracing::debug!(
                "Error notification for '{}' suppressed: {}",
                resource.name,
                reason
            );
        }
    }

    Ok(ResourceOutcome {
        name: resource.name.clone(),
        result: ChangeResult::from_error(message),
        notified,
    })
}

fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, Config, Priority};
    use crate::differ::content_hash;
    use crate::fetcher::FetchPolicy;
    use crate::io::{HttpResponse, MockHttpClient};
    use std::path::Path;

    const PAGE_URL: &str = "https://example.com/page";

    fn test_resource(notify_on_first_run: bool) -> ResourceConfig {
        ResourceConfig {
            name: "Example".to_string(),
            url: PAGE_URL.to_string(),
            selector: None,
            enabled: true,
            priority: Priority::Default,
            tags: Vec::new(),
            notify_on_first_run,
            notifiers: Vec::new(),
        }
    }

    fn test_config(default_channel: Option<ChannelConfig>) -> Config {
        Config {
            default_channel,
            error_notification_threshold: 3,
            error_notification_cooldown_ms: 3_600_000,
            ..Config::default()
        }
    }

    fn ntfy_default() -> Option<ChannelConfig> {
        Some(ChannelConfig::Ntfy {
            topic: "watch".to_string(),
            server: "https://ntfy.test".to_string(),
        })
    }

    fn test_policy() -> FetchPolicy {
        FetchPolicy {
            timeout_ms: 1_000,
            retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            large_content_threshold: usize::MAX,
        }
    }

    fn engine_with(mock: MockHttpClient, dir: &Path, config: &Config) -> (Engine, Arc<SnapshotStore>) {
        let http: Arc<dyn crate::io::HttpClient> = Arc::new(mock);
        let fetcher = Arc::new(Fetcher::new(test_policy(), Arc::clone(&http)));
        let store = Arc::new(SnapshotStore::new(dir));
        let router = Arc::new(NotificationRouter::new(config, http));
        (
            Engine::new(fetcher, Arc::clone(&store), router, DiffLimits::default()),
            store,
        )
    }

    fn page_ok(body: &'static str) -> crate::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn ntfy_ok() -> crate::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }

    #[tokio::test]
    async fn first_run_persists_without_notification_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Box::pin(async { page_ok("content") }));
        // no post_json expectation: a notification would panic the mock

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);
        let summary = engine.run(&[test_resource(false)]).await;

        assert_eq!(
            summary,
            RunSummary {
                checked: 1,
                changed: 0,
                first_runs: 1,
                errors: 0
            }
        );

        let snapshot = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(snapshot.change_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.current.content, "content");
        assert_eq!(snapshot.current.hash, content_hash("content"));
        assert_eq!(snapshot.current.status, 200);
        assert!(snapshot.previous.is_none());
    }

    #[tokio::test]
    async fn first_run_sends_initial_notification_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Box::pin(async { page_ok("content") }));
        mock.expect_post_json()
            .times(1)
            .withf(|url, body| {
                url == "https://ntfy.test" && body["title"] == "First snapshot: Example"
            })
            .returning(|_, _| Box::pin(async { ntfy_ok() }));

        let config = test_config(ntfy_default());
        let (engine, _store) = engine_with(mock, dir.path(), &config);
        let summary = engine.run(&[test_resource(true)]).await;

        assert_eq!(summary.first_runs, 1);
    }

    #[tokio::test]
    async fn unchanged_content_updates_snapshot_without_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get()
            .times(2)
            .returning(|_| Box::pin(async { page_ok("stable") }));

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);

        // first run without initial alerts, then an identical second run
        let resource = test_resource(false);
        engine.run(std::slice::from_ref(&resource)).await;
        let first = store.load(PAGE_URL, "Example").unwrap().unwrap();

        let summary = engine.run(std::slice::from_ref(&resource)).await;
        assert_eq!(
            summary,
            RunSummary {
                checked: 1,
                changed: 0,
                first_runs: 0,
                errors: 0
            }
        );

        let second = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(second.change_count, 0);
        assert!(second.previous.is_none());
        assert_eq!(second.current.hash, first.current.hash);
        assert!(second.last_check_epoch_ms >= first.last_check_epoch_ms);
    }

    #[tokio::test]
    async fn changed_content_rotates_previous_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { page_ok("old content\nline two") }));
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { page_ok("new content\nline two") }));
        mock.expect_post_json()
            .times(1)
            .withf(|_, body| {
                body["title"] == "Change detected: Example"
                    && body["message"]
                        .as_str()
                        .unwrap()
                        .contains("- old content")
            })
            .returning(|_, _| Box::pin(async { ntfy_ok() }));

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);

        let resource = test_resource(false);
        engine.run(std::slice::from_ref(&resource)).await;
        let first = store.load(PAGE_URL, "Example").unwrap().unwrap();

        let summary = engine.run(std::slice::from_ref(&resource)).await;
        assert_eq!(summary.changed, 1);

        let second = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(second.change_count, 1);
        assert_eq!(second.previous.as_ref().unwrap(), &first.current);
        assert_eq!(second.current.hash, content_hash("new content\nline two"));
    }

    #[tokio::test]
    async fn fetch_failure_creates_error_snapshot_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get().times(1).returning(|_| {
            Box::pin(async { Err(crate::WatchError::Http("refused".to_string())) })
        });
        // threshold is 3: no notification expected

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);
        let summary = engine.run(&[test_resource(true)]).await;

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.checked, 1);

        let snapshot = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.current.status, 0);
        assert!(snapshot.last_error_notification_epoch_ms.is_none());
    }

    #[tokio::test]
    async fn repeated_failures_reach_threshold_and_notify_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get().times(4).returning(|_| {
            Box::pin(async { Err(crate::WatchError::Http("refused".to_string())) })
        });
        // only the third failure crosses the threshold; the fourth is
        // inside the cooldown window
        mock.expect_post_json()
            .times(1)
            .withf(|_, body| {
                body["title"] == "Monitor error: Example"
                    && body["message"].as_str().unwrap().contains("3 consecutive")
            })
            .returning(|_, _| Box::pin(async { ntfy_ok() }));

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);

        let resource = test_resource(true);
        for _ in 0..4 {
            engine.run(std::slice::from_ref(&resource)).await;
        }

        let snapshot = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(snapshot.error_count, 4);
        assert!(snapshot.last_error_notification_epoch_ms.is_some());
    }

    #[tokio::test]
    async fn success_resets_error_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Box::pin(async { Err(crate::WatchError::Http("refused".to_string())) })
            });
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { page_ok("recovered") }));

        let config = test_config(None);
        let (engine, store) = engine_with(mock, dir.path(), &config);

        let resource = test_resource(false);
        engine.run(std::slice::from_ref(&resource)).await;
        assert_eq!(
            store.load(PAGE_URL, "Example").unwrap().unwrap().error_count,
            1
        );

        engine.run(std::slice::from_ref(&resource)).await;
        let snapshot = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.current.content, "recovered");
    }

    #[tokio::test]
    async fn one_resource_failing_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        mock.expect_get()
            .withf(|url| url.contains("broken"))
            .returning(|_| Box::pin(async { Err(crate::WatchError::Http("down".to_string())) }));
        mock.expect_get()
            .withf(|url| url.contains("healthy"))
            .returning(|_| Box::pin(async { page_ok("fine") }));

        let config = test_config(None);
        let (engine, store) = engine_with(mock, dir.path(), &config);

        let broken = ResourceConfig {
            name: "Broken".to_string(),
            url: "https://broken.example.com".to_string(),
            ..test_resource(false)
        };
        let healthy = ResourceConfig {
            name: "Healthy".to_string(),
            url: "https://healthy.example.com".to_string(),
            ..test_resource(false)
        };

        let summary = engine.run(&[broken, healthy]).await;
        assert_eq!(
            summary,
            RunSummary {
                checked: 2,
                changed: 0,
                first_runs: 1,
                errors: 1
            }
        );
        assert!(store
            .load("https://healthy.example.com", "Healthy")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn disabled_resources_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // no expectations: any fetch would panic the mock
        let mock = MockHttpClient::new();

        let config = test_config(None);
        let (engine, _store) = engine_with(mock, dir.path(), &config);

        let mut resource = test_resource(false);
        resource.enabled = false;
        let summary = engine.run(&[resource]).await;
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { page_ok("v1") }));
        mock.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { page_ok("v2") }));
        mock.expect_post_json().times(1).returning(|_, _| {
            Box::pin(async { Err(crate::WatchError::Http("ntfy down".to_string())) })
        });

        let config = test_config(ntfy_default());
        let (engine, store) = engine_with(mock, dir.path(), &config);

        let resource = test_resource(false);
        engine.run(std::slice::from_ref(&resource)).await;
        let summary = engine.run(std::slice::from_ref(&resource)).await;

        // the change is still recorded and counted
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.errors, 0);
        let snapshot = store.load(PAGE_URL, "Example").unwrap().unwrap();
        assert_eq!(snapshot.change_count, 1);
    }
}
