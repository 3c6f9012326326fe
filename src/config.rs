use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External program used to confirm a stream decodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTool {
    /// Decode a short slice of the stream into a null muxer
    #[default]
    Ffmpeg,
    /// Only open the stream and read its headers
    Ffprobe,
}

impl MediaTool {
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Ffprobe => "ffprobe",
        }
    }
}

/// What to do when the media tool exits non-zero with diagnostics that match no known failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedExitPolicy {
    /// Count the stream as not decodable. Favours a clean output playlist.
    #[default]
    Reject,
    /// Count the stream as decodable ("probably fine"), logging a warning for each one.
    Accept,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("media timeout ({timeout:?}) must be longer than the sample duration ({sample:?})")]
    MediaTimeoutTooShort { timeout: Duration, sample: Duration },

    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Options for one validation pass
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Number of entries validated at the same time
    pub concurrency: usize,
    pub reachability_timeout: Duration,
    /// Hard limit for the media tool; the process is killed once it elapses
    pub media_timeout: Duration,
    /// How much of the stream the media tool reads
    pub sample_duration: Duration,
    /// Extra reachability attempts after a timeout
    pub retry_count: u32,
    pub max_redirects: usize,
    /// How long in-flight work may keep running after an interrupt
    pub shutdown_grace: Duration,
    pub media_tool: MediaTool,
    pub unrecognized_exit: UnrecognizedExitPolicy,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            reachability_timeout: Duration::from_secs(15),
            media_timeout: Duration::from_secs(30),
            sample_duration: Duration::from_secs(10),
            retry_count: 1,
            max_redirects: 5,
            shutdown_grace: Duration::from_secs(5),
            media_tool: MediaTool::default(),
            unrecognized_exit: UnrecognizedExitPolicy::default(),
        }
    }
}

impl CheckConfig {
    /// # Errors
    /// Errors when an option makes a pass impossible to run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.reachability_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("reachability"));
        }
        if self.media_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("media"));
        }
        // ffprobe does not honour the sample duration
        if self.media_tool == MediaTool::Ffmpeg && self.media_timeout <= self.sample_duration {
            return Err(ConfigError::MediaTimeoutTooShort {
                timeout: self.media_timeout,
                sample: self.sample_duration,
            });
        }
        Ok(())
    }
}
