//! M3U adapter between playlist text and the validation engine

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::entry::{Entry, Verdict};

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const DEFAULT_INFO: &str = "-1";

/// `#EXTINF:<info>,<name>` where quoted attribute values in `<info>` may contain commas
static EXTINF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^#EXTINF:(?P<info>(?:[^,"]|"[^"]*")*),(?P<name>.*)$"#)
        .expect("EXTINF pattern is valid")
});

static TVG_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-name="([^"]*)""#).expect("tvg-name pattern is valid"));

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("unable to read playlist {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to download playlist {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("playlist {0} contains no channels")]
    Empty(String),
}

/// Reads a playlist from a local path or an http(s) URL
///
/// # Errors
/// Errors when the file cannot be read or the download fails
#[instrument(skip(client))]
pub async fn load(client: &reqwest::Client, source: &str) -> Result<String, PlaylistError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let download = |e: reqwest::Error| PlaylistError::Download {
            url: source.to_string(),
            source: e,
        };
        let res = client
            .get(source)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(download)?;
        return res.text().await.map_err(download);
    }

    tokio::fs::read_to_string(source)
        .await
        .map_err(|e| PlaylistError::Read {
            path: source.into(),
            source: e,
        })
}

/// Loads and parses a playlist, refusing one without any channel
///
/// # Errors
/// See [`load`], plus [`PlaylistError::Empty`]
pub async fn read_entries(
    client: &reqwest::Client,
    source: &str,
) -> Result<Vec<Entry>, PlaylistError> {
    let content = load(client, source).await?;
    let entries = parse(&content);
    if entries.is_empty() {
        return Err(PlaylistError::Empty(source.to_string()));
    }

    info!("Loaded {} channels from {source}", entries.len());
    Ok(entries)
}

/// Parses M3U text into entries, in playlist order
///
/// Each `#EXTINF` line is paired with the next line that is not a comment. Other
/// directives (`#EXTVLCOPT`, `#EXTGRP`, ...) in between are ignored, as are URLs without
/// a preceding `#EXTINF`.
#[must_use]
pub fn parse(content: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut pending: Option<(String, String)> = None;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF) {
            if let Some((name, _)) = pending.take() {
                warn!("Channel {name} has no URL, ignoring it");
            }
            pending = parse_extinf(line);
            if pending.is_none() {
                warn!("Malformed EXTINF at line {}: {line}", line_num + 1);
            }
        } else if line.starts_with('#') {
            continue;
        } else if let Some((name, info)) = pending.take() {
            entries.push(Entry::new(name, line).with_info(info));
        } else {
            debug!("Ignoring URL without EXTINF at line {}: {line}", line_num + 1);
        }
    }

    entries
}

/// Returns `(name, info)`
fn parse_extinf(line: &str) -> Option<(String, String)> {
    let caps = EXTINF_REGEX.captures(line)?;
    let info = caps["info"].trim();
    let mut name = caps["name"].trim().to_string();

    if name.is_empty() {
        name = TVG_NAME_REGEX
            .captures(info)
            .map(|c| c[1].trim().to_string())
            .filter(|n| !n.is_empty())?;
    }

    Some((name, info.to_string()))
}

/// Renders accepted entries back into M3U text
#[must_use]
pub fn serialize(accepted: &[(Entry, Verdict)]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (entry, _) in accepted {
        let info = entry.info.as_deref().unwrap_or(DEFAULT_INFO);
        // Writing into a String cannot fail
        let _ = writeln!(out, "{EXTINF}{info},{}", entry.name);
        let _ = writeln!(out, "{}", entry.url);
    }
    out
}

/// Writes accepted entries as an M3U playlist at `path`
///
/// # Errors
/// Errors when the file cannot be written
pub async fn save(path: &Path, accepted: &[(Entry, Verdict)]) -> std::io::Result<()> {
    tokio::fs::write(path, serialize(accepted)).await
}
