//! pagewatch - website change monitoring and notification service
//!
//! Fetches configured web resources, detects content changes against
//! persisted snapshots, and sends alerts through ntfy and webhook channels.

pub mod config;
pub mod differ;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod io;
pub mod notify;
pub mod ntfy;
pub mod router;
pub mod selector;
pub mod snapshot;
pub mod template;
pub mod throttle;
pub mod webhook;

pub use config::{load_config, Config};
pub use engine::RunSummary;
pub use error::{Result, WatchError};

use std::sync::Arc;

use crate::differ::DiffLimits;
use crate::engine::Engine;
use crate::fetcher::{FetchPolicy, Fetcher};
use crate::io::ReqwestHttpClient;
use crate::router::NotificationRouter;
use crate::snapshot::SnapshotStore;

/// Run one full check cycle over every resource in the configuration
pub async fn run(config: &Config) -> Result<RunSummary> {
    let http: Arc<dyn io::HttpClient> = Arc::new(ReqwestHttpClient::default());

    let fetcher = Arc::new(Fetcher::new(
        FetchPolicy::from_config(config),
        Arc::clone(&http),
    ));
    let store = Arc::new(SnapshotStore::new(&config.snapshot_dir));
    let router = Arc::new(NotificationRouter::new(config, http));

    let engine = Engine::new(fetcher, store, router, DiffLimits::default());

    tracing::info!(
        "Checking {} resources ({} enabled)",
        config.resources.len(),
        config.resources.iter().filter(|r| r.enabled).count()
    );

    Ok(engine.run(&config.resources).await)
}
