//! Test fixtures and sample data

use autobackup::backends::{ArtifactId, ListedArtifact};
use chrono::{TimeZone, Utc};
use std::io::{self, Read};
use std::path::Path;

/// Backup file name for `source` stamped on day `day` of January 2024
pub fn backup_name(source: &str, day: u32) -> String {
    format!("Backup_{}_2024-01-{:02}_02.00.00.zip", source, day)
}

/// Listing entry whose timestamp follows `day`
pub fn listed(source: &str, day: u32) -> ListedArtifact {
    let name = backup_name(source, day);
    ListedArtifact {
        id: ArtifactId::new(format!("mock://{}", name)),
        location: name.clone(),
        name,
        timestamp: Utc.with_ymd_and_hms(2024, 1, day, 2, 0, 0).unwrap(),
    }
}

/// `count` listing entries, oldest first
pub fn listing(source: &str, count: u32) -> Vec<ListedArtifact> {
    (1..=count).map(|day| listed(source, day)).collect()
}

/// Reader that yields `good_bytes` bytes and then fails
pub struct FailingReader {
    remaining: usize,
}

impl FailingReader {
    pub fn new(good_bytes: usize) -> Self {
        Self {
            remaining: good_bytes,
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "No space left on device"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(b'x');
        self.remaining -= n;
        Ok(n)
    }
}

/// Fill in the `{dir}` placeholder of a TOML template
pub fn render(template: &str, dir: &Path) -> String {
    template.replace("{dir}", &dir.display().to_string())
}

/// Minimal valid config TOML template
pub fn minimal_config_toml() -> &'static str {
    r#"
[global]
log_directory = "{dir}/logs"
lock_directory = "{dir}/locks"
state_file = "{dir}/state/last-results.json"

[destinations.local]
type = "local"
path = "{dir}/backups"
description = "Local test destination"

[records.nightly]
database = "prod"
destination = "local"
keep = 3
"#
}

/// Config with one destination of every kind
pub fn multi_destination_config_toml() -> &'static str {
    r#"
[global]
log_directory = "{dir}/logs"
lock_directory = "{dir}/locks"
state_file = "{dir}/state/last-results.json"

[policy]
enable_drive = false

[destinations.local]
type = "local"
path = "{dir}/backups"

[destinations.nas]
type = "sftp"
path = "/srv/backups"
host = "nas.internal"
port = 2222
user = "backup"

[destinations.drive]
type = "drive"
path = "1AbCdEfGh"
credentials_type = "text"
credentials_input = "{}"

[destinations.box]
type = "dropbox"
path = "/Backups"
app_key = "key"
app_secret = "secret"
app_token = "token"

[records.nightly]
database = "prod"
destination = "local"
keep = 7

[records.offsite]
database = "prod"
destination = "box"
scope = "db"
chunk_size_mb = 0
notify_on_failure = true

[records.archive]
database = "prod"
destination = "nas"
scope = "fs"
enabled = false
"#
}

/// Config whose record asks to keep a single copy
pub fn invalid_keep_config_toml() -> &'static str {
    r#"
[destinations.local]
type = "local"
path = "{dir}/backups"

[records.nightly]
database = "prod"
destination = "local"
keep = 1
"#
}

/// Config whose record points to a destination that does not exist
pub fn missing_destination_config_toml() -> &'static str {
    r#"
[destinations.local]
type = "local"
path = "{dir}/backups"

[records.nightly]
database = "prod"
destination = "nowhere"
"#
}
