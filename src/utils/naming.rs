//! Backup artifact names: `Backup_<source>_<YYYY-MM-DD_HH.MM.SS>.<zip|txt>`

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    #[error("Unsupported file extension '{0}' (supported formats: txt, zip)")]
    UnsupportedExtension(String),

    #[error("Not a backup artifact name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactExtension {
    /// Backup archive
    Zip,
    /// Connectivity test payload
    Txt,
}

impl ArtifactExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactExtension::Zip => "zip",
            ArtifactExtension::Txt => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactExtension::Zip => "application/zip",
            ArtifactExtension::Txt => "text/plain",
        }
    }
}

impl FromStr for ArtifactExtension {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(ArtifactExtension::Zip),
            "txt" => Ok(ArtifactExtension::Txt),
            other => Err(NamingError::UnsupportedExtension(other.to_string())),
        }
    }
}

/// Unique name of one backup run's artifact.
///
/// The timestamp is captured once and reused for the file name and for any
/// created/modified metadata a backend records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    source: String,
    stamp: NaiveDateTime,
    captured_at: DateTime<Utc>,
    extension: ArtifactExtension,
}

impl ArtifactName {
    /// Capture the current time and build the name for `source`
    pub fn capture(source: &str, extension: ArtifactExtension, utc: bool) -> Self {
        let captured_at = Utc::now();
        let stamp = if utc {
            captured_at.naive_utc()
        } else {
            captured_at.with_timezone(&Local).naive_local()
        };
        Self::at(source, stamp, captured_at, extension)
    }

    pub fn at(
        source: &str,
        stamp: NaiveDateTime,
        captured_at: DateTime<Utc>,
        extension: ArtifactExtension,
    ) -> Self {
        Self {
            source: source.to_string(),
            stamp,
            captured_at,
            extension,
        }
    }

    /// Parse an existing artifact file name
    pub fn parse(file_name: &str) -> Result<Self, NamingError> {
        let caps = artifact_regex()
            .captures(file_name)
            .ok_or_else(|| NamingError::InvalidName(file_name.to_string()))?;

        let stamp = NaiveDateTime::parse_from_str(&caps["stamp"], TIMESTAMP_FORMAT)
            .map_err(|_| NamingError::InvalidName(file_name.to_string()))?;
        let extension = caps["ext"].parse()?;

        Ok(Self {
            source: caps["source"].to_string(),
            stamp,
            captured_at: stamp.and_utc(),
            extension,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn extension(&self) -> ArtifactExtension {
        self.extension
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup_{}_{}.{}",
            self.source,
            self.stamp.format(TIMESTAMP_FORMAT),
            self.extension.as_str()
        )
    }
}

fn artifact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^Backup_(?P<source>.+)_(?P<stamp>\d{4}-\d{2}-\d{2}_\d{2}\.\d{2}\.\d{2})\.(?P<ext>zip|txt)$",
        )
        .expect("artifact name pattern is valid")
    })
}

/// Whether a listed file name is a backup archive subject to retention
///
/// Test payloads (`.txt`) never match.
pub fn is_backup_archive(file_name: &str) -> bool {
    artifact_regex()
        .captures(file_name)
        .map(|caps| &caps["ext"] == ArtifactExtension::Zip.as_str())
        .unwrap_or(false)
}
