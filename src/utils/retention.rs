//! Count-based retention: decides which older artifacts to delete after an upload

use crate::backends::{ArtifactId, ListedArtifact};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel that disables pruning
pub const RETENTION_DISABLED: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The backup retention quantity must be either -1 or greater than 1 (got {0})")]
pub struct PolicyError(pub i64);

/// Maximum number of artifacts kept at a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RetentionQuota(i64);

impl RetentionQuota {
    pub fn disabled() -> Self {
        Self(RETENTION_DISABLED)
    }

    pub fn keep(count: i64) -> Result<Self, PolicyError> {
        Self::try_from(count)
    }

    pub fn is_active(&self) -> bool {
        self.0 > 0
    }

    pub fn keep_count(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for RetentionQuota {
    type Error = PolicyError;

    // Keeping 0 or 1 would delete the newest artifact too
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == RETENTION_DISABLED || value > 1 {
            Ok(Self(value))
        } else {
            Err(PolicyError(value))
        }
    }
}

impl From<RetentionQuota> for i64 {
    fn from(quota: RetentionQuota) -> i64 {
        quota.0
    }
}

impl fmt::Display for RetentionQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_active() {
            write!(f, "keep {}", self.0)
        } else {
            f.write_str("disabled")
        }
    }
}

/// Select the artifacts to delete from a fresh listing.
///
/// The listing is ordered newest first by its backend timestamp (a stable sort, so
/// ties keep the backend's order) and everything beyond the kept window is returned.
/// When the just-uploaded artifact is not yet visible in the listing one slot is
/// reserved for it, so an eventually consistent listing never causes the window to
/// be filled entirely with older artifacts.
pub fn prune(
    listing: &[ListedArtifact],
    just_uploaded: &ArtifactId,
    quota: RetentionQuota,
) -> Vec<ListedArtifact> {
    if !quota.is_active() {
        return Vec::new();
    }

    let mut sorted: Vec<ListedArtifact> = listing.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let present = sorted.iter().any(|entry| &entry.id == just_uploaded);
    let desired = if present {
        quota.keep_count()
    } else {
        quota.keep_count() - 1
    };
    let keep = usize::try_from(desired).unwrap_or(0).min(sorted.len());

    sorted.split_off(keep)
}
