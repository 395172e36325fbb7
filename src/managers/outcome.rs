//! Uniform result of a run, a connection test or a test upload

use crate::backends::BackendError;
use crate::config::ConfigError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Config,
    Auth,
    Transfer,
    Policy,
    /// The producer could not generate the dump
    Artifact,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Config => "configuration",
            ErrorKind::Auth => "authentication",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Policy => "policy",
            ErrorKind::Artifact => "artifact",
        };
        f.write_str(label)
    }
}

impl From<&BackendError> for ErrorKind {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::Auth(_) => ErrorKind::Auth,
            BackendError::Transfer(_) => ErrorKind::Transfer,
            BackendError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<&ConfigError> for ErrorKind {
    fn from(err: &ConfigError) -> Self {
        match err {
            ConfigError::Policy(_) => ErrorKind::Policy,
            _ => ErrorKind::Config,
        }
    }
}

/// Where the engine was when a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Connecting,
    Uploading,
    Pruning,
    Disconnecting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Idle => "idle",
            RunPhase::Connecting => "connecting",
            RunPhase::Uploading => "uploading",
            RunPhase::Pruning => "pruning",
            RunPhase::Disconnecting => "disconnecting",
            RunPhase::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        detail: String,
    },
    Failure {
        kind: ErrorKind,
        phase: RunPhase,
        detail: String,
    },
}

impl Outcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Outcome::Success {
            detail: detail.into(),
        }
    }

    pub fn failure(kind: ErrorKind, phase: RunPhase, detail: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            phase,
            detail: detail.into(),
        }
    }

    /// Failure raised by the company policy before anything else happens
    pub fn policy_denied(kind: crate::config::DestinationKind) -> Self {
        Outcome::failure(
            ErrorKind::Policy,
            RunPhase::Idle,
            format!(
                "You cannot use this functionality without the {} policy enabled.",
                kind
            ),
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn detail(&self) -> &str {
        match self {
            Outcome::Success { detail } | Outcome::Failure { detail, .. } => detail,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Result pair shown to the operator
    pub fn result_type(&self) -> ResultType {
        match self {
            Outcome::Success { .. } => ResultType::Success,
            Outcome::Failure { .. } => ResultType::Danger,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { detail } => f.write_str(detail),
            Outcome::Failure {
                kind,
                phase,
                detail,
            } => write!(f, "{} error while {}: {}", kind, phase, detail),
        }
    }
}

/// Severity of a reported result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Success,
    Warning,
    Danger,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Success => f.write_str("SUCCESS"),
            ResultType::Warning => f.write_str("WARNING"),
            ResultType::Danger => f.write_str("DANGER"),
        }
    }
}

/// A reported result with the moment it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub result_type: ResultType,
    pub timestamp: DateTime<Local>,
    pub details: String,
}

impl RunReport {
    pub fn new(result_type: ResultType, details: impl Into<String>) -> Self {
        Self {
            result_type,
            timestamp: Local::now(),
            details: details.into(),
        }
    }

    pub fn from_outcome(outcome: &Outcome) -> Self {
        Self::new(outcome.result_type(), outcome.to_string())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RESULT TYPE: {}\nDATE: {}\nDETAILS: {}",
            self.result_type,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.details
        )
    }
}
