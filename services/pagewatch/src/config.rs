//! Configuration types for the pagewatch service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_large_content_threshold")]
    pub large_content_threshold: usize,
    #[serde(default = "default_error_notification_threshold")]
    pub error_notification_threshold: u32,
    #[serde(default = "default_error_notification_cooldown_ms")]
    pub error_notification_cooldown_ms: u64,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default)]
    pub default_channel: Option<ChannelConfig>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            large_content_threshold: default_large_content_threshold(),
            error_notification_threshold: default_error_notification_threshold(),
            error_notification_cooldown_ms: default_error_notification_cooldown_ms(),
            snapshot_dir: default_snapshot_dir(),
            default_channel: None,
            channels: HashMap::new(),
            resources: Vec::new(),
        }
    }
}

/// Notification channel configuration with tagged enum for extensibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelConfig {
    #[serde(rename = "ntfy")]
    Ntfy {
        topic: String,
        #[serde(default = "default_ntfy_server")]
        server: String,
    },
    #[serde(rename = "webhook")]
    Webhook {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
}

impl ChannelConfig {
    pub fn type_name(&self) -> &str {
        match self {
            ChannelConfig::Ntfy { .. } => "ntfy",
            ChannelConfig::Webhook { .. } => "webhook",
        }
    }
}

/// Reference to a notification channel: the name of a configured channel,
/// or a full inline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Named(String),
    Inline(ChannelConfig),
}

/// Alert priority, ordered from least to most important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Min,
    Low,
    #[default]
    Default,
    High,
    Urgent,
}

impl Priority {
    /// Numeric priority level used by notification channels (min=1 .. urgent=5)
    pub fn level(&self) -> u8 {
        match self {
            Priority::Min => 1,
            Priority::Low => 2,
            Priority::Default => 3,
            Priority::High => 4,
            Priority::Urgent => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Parse a priority label; unrecognized values fall back to the default tier
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "min" => Priority::Min,
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Default,
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Priority::parse(&value))
    }
}

/// One monitored resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub notify_on_first_run: bool,
    #[serde(default)]
    pub notifiers: Vec<ChannelRef>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    3
}

fn default_large_content_threshold() -> usize {
    512 * 1024
}

fn default_error_notification_threshold() -> u32 {
    3
}

fn default_error_notification_cooldown_ms() -> u64 {
    3_600_000
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

fn default_true() -> bool {
    true
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::WatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
