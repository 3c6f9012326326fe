use std::path::Path;

use chrono::{DateTime, Utc};
use indoc::formatdoc;
use serde::Serialize;

use crate::{
    entry::{Entry, Verdict},
    scheduler::RunReport,
    stats::StatsSnapshot,
};

/// Human readable end-of-run summary
#[must_use]
pub fn summary(stats: &StatsSnapshot, accepted: usize, interrupted: bool) -> String {
    let mut text = formatdoc!(
        "
        Checked channels: {}
          Working: {}
          Failed:  {}
          Timeout: {}
          Skipped: {}
        Channels written: {accepted}",
        stats.total(),
        stats.working,
        stats.failed,
        stats.timeout,
        stats.skipped,
    );
    if interrupted {
        text.push_str("\n(interrupted, skipped channels were not checked)");
    }
    text
}

#[derive(Debug, Serialize)]
struct Record<'a> {
    playlist: &'a str,
    name: &'a str,
    url: &'a str,
    #[serde(flatten)]
    verdict: &'a Verdict,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    interrupted: bool,
    stats: StatsSnapshot,
    accepted: usize,
    records: Vec<Record<'a>>,
}

/// Renders every record of every pass, as `(playlist source, report)` pairs, to JSON
///
/// # Errors
/// Errors when serialization fails
pub fn to_json(
    passes: &[(String, RunReport)],
    accepted: usize,
    generated_at: DateTime<Utc>,
) -> serde_json::Result<String> {
    let stats = passes
        .iter()
        .fold(StatsSnapshot::default(), |acc, (_, r)| acc + r.stats);
    let records = passes
        .iter()
        .flat_map(|(source, report)| {
            report
                .records
                .iter()
                .map(move |(entry, verdict): &(Entry, Verdict)| Record {
                    playlist: source,
                    name: &entry.name,
                    url: &entry.url,
                    verdict,
                })
        })
        .collect();

    serde_json::to_string_pretty(&JsonReport {
        generated_at,
        interrupted: passes.iter().any(|(_, r)| r.interrupted),
        stats,
        accepted,
        records,
    })
}

/// # Errors
/// Errors when serialization fails or the file cannot be written
pub async fn save_json(
    path: &Path,
    passes: &[(String, RunReport)],
    accepted: usize,
) -> anyhow::Result<()> {
    let json = to_json(passes, accepted, Utc::now())?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            records: vec![
                (Entry::new("News", "http://a/live"), Verdict::Working),
                (
                    Entry::new("Sport", "http://b/live"),
                    Verdict::Failed("403 forbidden".into()),
                ),
            ],
            accepted: vec![(Entry::new("News", "http://a/live"), Verdict::Working)],
            stats: StatsSnapshot {
                working: 1,
                failed: 1,
                ..Default::default()
            },
            interrupted: false,
        }
    }

    #[test]
    fn summary_lists_every_counter() {
        let text = summary(&report().stats, 1, false);
        assert!(text.starts_with("Checked channels: 2\n"));
        assert!(text.contains("Working: 1"));
        assert!(text.contains("Failed:  1"));
        assert!(text.ends_with("Channels written: 1"));

        let text = summary(&report().stats, 1, true);
        assert!(text.contains("interrupted"));
    }

    #[test]
    fn json_report_flattens_verdicts() {
        let passes = vec![("list.m3u".to_string(), report())];
        let json = to_json(&passes, 1, DateTime::UNIX_EPOCH).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["stats"]["working"], 1);
        assert_eq!(value["accepted"], 1);
        assert_eq!(value["generated_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["records"][1]["playlist"], "list.m3u");
        assert_eq!(value["records"][1]["status"], "failed");
        assert_eq!(value["records"][1]["reason"], "403 forbidden");
        assert_eq!(value["records"][0]["status"], "working");
    }
}
