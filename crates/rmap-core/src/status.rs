//! Resolution outcomes: status labels and the per-call result value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event_log::LogLevel;

/// Outcome label recorded by `status()`.
///
/// Match labels name the strategy that produced a trustworthy association;
/// the verification labels are recorded by every `verify()` call, whether it
/// passes or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusLabel {
    #[serde(rename = "foundInIndex")]
    FoundInIndex,
    #[serde(rename = "multiRMMatch")]
    MultiRmMatch,
    #[serde(rename = "storageMatch")]
    StorageMatch,
    #[serde(rename = "smMatch")]
    SysmetaMatch,
    #[serde(rename = "guessMatch")]
    GuessMatch,
    #[serde(rename = "foundAndValid")]
    FoundAndValid,
    #[serde(rename = "foundButNotValid")]
    FoundButNotValid,
    #[serde(rename = "rmFetchError")]
    RmFetchError,
    #[serde(rename = "noPidForSeriesId")]
    NoPidForSeriesId,
    #[serde(rename = "unauthorized")]
    Unauthorized,
    #[serde(rename = "allMiss")]
    AllMiss,
}

impl StatusLabel {
    /// Short machine-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::FoundInIndex => "foundInIndex",
            StatusLabel::MultiRmMatch => "multiRMMatch",
            StatusLabel::StorageMatch => "storageMatch",
            StatusLabel::SysmetaMatch => "smMatch",
            StatusLabel::GuessMatch => "guessMatch",
            StatusLabel::FoundAndValid => "foundAndValid",
            StatusLabel::FoundButNotValid => "foundButNotValid",
            StatusLabel::RmFetchError => "rmFetchError",
            StatusLabel::NoPidForSeriesId => "noPidForSeriesId",
            StatusLabel::Unauthorized => "unauthorized",
            StatusLabel::AllMiss => "allMiss",
        }
    }

    /// Human-readable description.
    pub fn message(&self) -> &'static str {
        match self {
            StatusLabel::FoundInIndex => "Resource map pid found in index",
            StatusLabel::MultiRmMatch => {
                "Multiple versions of resource map found in index and resolved to the most recent"
            }
            StatusLabel::StorageMatch => "Resource map pid found in local storage",
            StatusLabel::SysmetaMatch => "Resource map pid found by walking sysmeta",
            StatusLabel::GuessMatch => "Resource map pid guessed based on naming convention",
            StatusLabel::FoundAndValid => "Resource map pid found and links to the given PID",
            StatusLabel::FoundButNotValid => {
                "Resource map pid found but does not link to the given PID"
            }
            StatusLabel::RmFetchError => "Error fetching resource map via object API",
            StatusLabel::NoPidForSeriesId => "PID not found for series ID",
            StatusLabel::Unauthorized => {
                "Stopped resolution: user not authorized to access sysmeta"
            }
            StatusLabel::AllMiss => "Resource map pid not found by any strategy",
        }
    }

    /// Severity the event log records this label at.
    pub fn level(&self) -> LogLevel {
        match self {
            StatusLabel::RmFetchError
            | StatusLabel::Unauthorized
            | StatusLabel::NoPidForSeriesId
            | StatusLabel::AllMiss => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value produced by every `status()` call and returned by `resolve()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    /// The PID the result is about. For a series ID resolved through its
    /// current version, this is the concrete version PID.
    pub pid: String,
    pub rm: Option<String>,
    /// Some attempt for this PID was refused access to system metadata.
    /// Only set on failed results.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unauthorized: bool,
    /// The index listed several resource maps that could not be narrowed to
    /// one. Only set on failed results.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub multiple_rms: bool,
}

impl ResolutionResult {
    pub fn found(pid: impl Into<String>, rm: impl Into<String>) -> Self {
        Self {
            success: true,
            pid: pid.into(),
            rm: Some(rm.into()),
            unauthorized: false,
            multiple_rms: false,
        }
    }

    pub fn missing(pid: impl Into<String>) -> Self {
        Self {
            success: false,
            pid: pid.into(),
            rm: None,
            unauthorized: false,
            multiple_rms: false,
        }
    }
}
