use std::fmt;

use serde::{Deserialize, Serialize};

/// One playlist record submitted for validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub url: String,

    /// Raw `#EXTINF` section before the channel name (duration and `tvg-*` attributes),
    /// written back untouched when the entry ends up in the output playlist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Entry {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            info: None,
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

/// Terminal classification of one entry
///
/// Serialized as `{"status": "failed", "reason": "..."}`. Downstream reports depend on
/// these names, do not rename them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Working,
    Failed(String),
    Timeout,
    Skipped(String),
}

impl Verdict {
    pub const INTERRUPTED: &'static str = "interrupted";
    pub const GENERAL_ERROR: &'static str = "general error";

    #[must_use]
    pub fn interrupted() -> Self {
        Self::Skipped(Self::INTERRUPTED.to_string())
    }

    #[must_use]
    pub fn general_error() -> Self {
        Self::Failed(Self::GENERAL_ERROR.to_string())
    }

    #[must_use]
    pub const fn is_working(&self) -> bool {
        matches!(self, Self::Working)
    }

    /// Whether this verdict describes the URL itself and may be reused for later entries.
    /// Skipped work says nothing about the endpoint.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Timeout => write!(f, "timeout"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_with_stable_tags() {
        let json = serde_json::to_value(Verdict::Failed("403 forbidden".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "403 forbidden");

        let json = serde_json::to_value(Verdict::Working).unwrap();
        assert_eq!(json["status"], "working");
        assert!(json.get("reason").is_none());

        let json = serde_json::to_value(Verdict::interrupted()).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "interrupted");
    }

    #[test]
    fn skipped_is_not_cacheable() {
        assert!(Verdict::Working.is_cacheable());
        assert!(Verdict::Timeout.is_cacheable());
        assert!(Verdict::general_error().is_cacheable());
        assert!(!Verdict::interrupted().is_cacheable());
    }
}
