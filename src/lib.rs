#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Checks IPTV playlist entries for streams that are both reachable and decodable

pub mod cache;
pub mod config;
pub mod entry;
pub mod ffmpeg;
pub mod playlist;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod stats;
pub mod util;
pub mod validator;

#[cfg(test)]
mod testing;

pub use config::{CheckConfig, MediaTool, UnrecognizedExitPolicy};
pub use entry::{Entry, Verdict};
pub use scheduler::{RunReport, Scheduler};
pub use stats::StatsSnapshot;
