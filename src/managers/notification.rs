//! Discord webhook notification manager
//!
//! Sends the outcome of scheduled runs to Discord. A notification goes out only when
//! the record asks for the event AND the company policy allows it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

use crate::config::{expand_tilde, NotificationConfig, NotifyEvent, PolicyConfig};

/// Notification manager for sending Discord webhooks
pub struct NotificationManager {
    config: NotificationConfig,
    policy: PolicyConfig,
    cache_path: PathBuf,
}

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    Failure = 15158332, // #E74C3C
    Success = 3066993,  // #2ECC71
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }
}

/// Notification payload to send
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_type: NotifyEvent,
    pub record_name: String,
    pub database: String,
    pub destination: String,
    pub message: String,
    pub error: Option<String>,
    pub duration_secs: Option<u64>,
}

/// Discord webhook payload
#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

/// Rate limit cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix timestamp of last notification
    last_sent: u64,
    count: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct NotificationCache {
    entries: HashMap<String, CacheEntry>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl NotificationManager {
    pub fn new(config: NotificationConfig, policy: PolicyConfig) -> Self {
        let cache_path = expand_tilde(&config.cache_file);
        Self {
            config,
            policy,
            cache_path,
        }
    }

    /// Whether an event may be sent for a record subscribed to `record_events`
    pub fn is_enabled(&self, event: NotifyEvent, record_events: &[NotifyEvent]) -> bool {
        if self.config.discord_webhook_url.is_empty() {
            return false;
        }
        let allowed = match event {
            NotifyEvent::Success => self.policy.enable_success_notifications,
            NotifyEvent::Failure => self.policy.enable_failure_notifications,
        };
        allowed && record_events.contains(&event)
    }

    /// Send a notification if enabled and not rate-limited
    pub fn send(&self, notification: Notification, record_events: &[NotifyEvent]) -> Result<()> {
        if !self.is_enabled(notification.event_type, record_events) {
            debug!(
                "Notification type {:?} not enabled for '{}', skipping",
                notification.event_type, notification.record_name
            );
            return Ok(());
        }

        let cache_key = format!(
            "{}:{}:{:?}",
            notification.record_name, notification.destination, notification.event_type
        );

        if self.is_rate_limited(&cache_key)? {
            debug!("Notification rate-limited for key: {}", cache_key);
            return Ok(());
        }

        let payload = self.build_payload(&notification);
        self.send_webhook(&payload)?;

        if self.config.rate_limit_minutes > 0 {
            self.update_cache(&cache_key)?;
        }

        info!(
            "Sent {:?} notification for record '{}'",
            notification.event_type, notification.record_name
        );

        Ok(())
    }

    /// Build Discord webhook payload
    fn build_payload(&self, notification: &Notification) -> DiscordPayload {
        let (color, emoji, label) = match notification.event_type {
            NotifyEvent::Failure => (NotificationColor::Failure, "\u{274C}", "Backup failed"),
            NotifyEvent::Success => (NotificationColor::Success, "\u{2705}", "Backup completed"),
        };

        let mut fields = vec![
            DiscordField {
                name: "Record".to_string(),
                value: notification.record_name.clone(),
                inline: true,
            },
            DiscordField {
                name: "Database".to_string(),
                value: notification.database.clone(),
                inline: true,
            },
            DiscordField {
                name: "Destination".to_string(),
                value: notification.destination.clone(),
                inline: true,
            },
        ];

        if let Some(duration) = notification.duration_secs {
            fields.push(DiscordField {
                name: "Duration".to_string(),
                value: format_duration(duration),
                inline: true,
            });
        }

        if let Some(ref error) = notification.error {
            let error_display = if error.chars().count() > 500 {
                format!("{}...", error.chars().take(497).collect::<String>())
            } else {
                error.clone()
            };
            fields.push(DiscordField {
                name: "Error".to_string(),
                value: format!("```\n{}\n```", error_display),
                inline: false,
            });
        }

        let timestamp = chrono::DateTime::from_timestamp(now_secs() as i64, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string());

        let embed = DiscordEmbed {
            title: format!("{} Autobackup: {}", emoji, label),
            description: Some(notification.message.clone()),
            color: color.as_decimal(),
            fields,
            footer: Some(DiscordFooter {
                text: "autobackup".to_string(),
            }),
            timestamp,
        };

        DiscordPayload {
            username: Some("Autobackup".to_string()),
            embeds: vec![embed],
        }
    }

    /// Send webhook to Discord
    fn send_webhook(&self, payload: &DiscordPayload) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .post(&self.config.discord_webhook_url)
            .json(payload)
            .send()
            .context("Failed to send Discord webhook")?;

        let status = response.status();
        if status.is_success() {
            debug!("Discord webhook sent successfully");
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            error!("Discord webhook failed with status {}: {}", status, body);
            anyhow::bail!("Discord webhook failed with status {}: {}", status, body)
        }
    }

    fn is_rate_limited(&self, cache_key: &str) -> Result<bool> {
        if self.config.rate_limit_minutes == 0 {
            return Ok(false);
        }

        let cache = self.load_cache()?;
        if let Some(entry) = cache.entries.get(cache_key) {
            let rate_limit_secs = self.config.rate_limit_minutes * 60;
            if now_secs().saturating_sub(entry.last_sent) < rate_limit_secs {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn update_cache(&self, cache_key: &str) -> Result<()> {
        let mut cache = self.load_cache()?;
        let now = now_secs();

        let count = cache.entries.get(cache_key).map_or(1, |e| e.count + 1);
        cache
            .entries
            .insert(cache_key.to_string(), CacheEntry { last_sent: now, count });

        // Entries older than a day can never rate-limit again
        let cutoff = now.saturating_sub(86400);
        cache.entries.retain(|_, v| v.last_sent > cutoff);

        self.save_cache(&cache)
    }

    fn load_cache(&self) -> Result<NotificationCache> {
        if !self.cache_path.exists() {
            return Ok(NotificationCache::default());
        }

        let content = fs::read_to_string(&self.cache_path)
            .context("Failed to read notification cache")?;

        serde_json::from_str(&content).context("Failed to parse notification cache")
    }

    fn save_cache(&self, cache: &NotificationCache) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(cache)
            .context("Failed to serialize notification cache")?;

        fs::write(&self.cache_path, content).context("Failed to write notification cache")?;

        Ok(())
    }
}

/// Format duration in human-readable form
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
