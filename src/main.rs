#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use iptv_checker::{
    CheckConfig, MediaTool, RunReport, Scheduler, StatsSnapshot, UnrecognizedExitPolicy,
    ffmpeg::{self, FfmpegProber},
    playlist,
    probe::HttpProber,
    report,
    sink::ResultSink,
    util::{init_http_client, spawn_ct_watcher, warn_ulimit},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Checks every channel of an IPTV playlist and writes out the ones that actually play
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path or URL of a playlist to check. Repeat to check several playlists in a row
    #[arg(short, long = "playlist", required = true, env = "IPTV_CHECKER_PLAYLIST")]
    playlists: Vec<String>,

    /// Where to write the working channels
    #[arg(short, long, default_value = "iptv.m3u", env = "IPTV_CHECKER_OUTPUT")]
    output: PathBuf,

    /// Also write a JSON report with the verdict of every channel
    #[arg(long, env = "IPTV_CHECKER_REPORT")]
    report: Option<PathBuf>,

    /// The amount of channels checked in parallel
    #[arg(short = 'j', long, default_value_t = 10, env = "IPTV_CHECKER_CONCURRENCY")]
    concurrency: usize,

    /// Seconds to wait for a stream to answer the network check
    #[arg(long, default_value_t = 15, env = "IPTV_CHECKER_TIMEOUT")]
    timeout: u64,

    /// Seconds the media tool may run before it is killed
    #[arg(long, default_value_t = 30, env = "IPTV_CHECKER_MEDIA_TIMEOUT")]
    media_timeout: u64,

    /// Seconds of each stream decoded by ffmpeg
    #[arg(long, default_value_t = 10, env = "IPTV_CHECKER_SAMPLE")]
    sample: u64,

    /// Extra attempts when the network check times out
    #[arg(long, default_value_t = 1, env = "IPTV_CHECKER_RETRIES")]
    retries: u32,

    /// Maximum redirects followed by the network check
    #[arg(long, default_value_t = 5, env = "IPTV_CHECKER_MAX_REDIRECTS")]
    max_redirects: usize,

    /// Seconds in-flight checks may keep running after CTRL+C
    #[arg(long, default_value_t = 5, env = "IPTV_CHECKER_GRACE")]
    grace: u64,

    /// Program used to confirm streams decode
    #[arg(long, value_enum, default_value_t = MediaTool::Ffmpeg, env = "IPTV_CHECKER_MEDIA_TOOL")]
    media_tool: MediaTool,

    /// Count streams as working when the media tool fails with an unknown error
    #[arg(long, env = "IPTV_CHECKER_ACCEPT_UNRECOGNIZED")]
    accept_unrecognized: bool,
}

impl Args {
    const fn check_config(&self) -> CheckConfig {
        CheckConfig {
            concurrency: self.concurrency,
            reachability_timeout: Duration::from_secs(self.timeout),
            media_timeout: Duration::from_secs(self.media_timeout),
            sample_duration: Duration::from_secs(self.sample),
            retry_count: self.retries,
            max_redirects: self.max_redirects,
            shutdown_grace: Duration::from_secs(self.grace),
            media_tool: self.media_tool,
            unrecognized_exit: if self.accept_unrecognized {
                UnrecognizedExitPolicy::Accept
            } else {
                UnrecognizedExitPolicy::Reject
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.check_config();
    config.validate().context("Invalid options")?;

    let program = config.media_tool.program();
    ensure!(
        ffmpeg::is_installed(program).await,
        "`{program}` is not installed or available in PATH!"
    );
    warn_ulimit(config.concurrency);

    let client = init_http_client(config.max_redirects);
    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());

    // Every playlist is loaded before anything is probed
    let mut playlists = Vec::with_capacity(args.playlists.len());
    for source in &args.playlists {
        info!("Loading playlist from {source}");
        let entries = playlist::read_entries(&client, source)
            .await
            .with_context(|| format!("Loading playlist {source}"))?;
        playlists.push((source.clone(), entries));
    }

    let mut scheduler = Scheduler::new(
        config.clone(),
        Arc::new(HttpProber::new(client)),
        Arc::new(FfmpegProber::new(&config)),
    );

    let mut passes: Vec<(String, RunReport)> = Vec::with_capacity(playlists.len());
    for (source, entries) in playlists {
        if ct.is_cancelled() {
            warn!("Interrupted, not checking {source}");
            continue;
        }

        info!("Checking {source}");
        scheduler.set_progress(progress_bar(entries.len()));
        let pass = scheduler.run(entries, &ct).await;
        passes.push((source, pass));
    }

    let accepted = write_outputs(&args, &passes).await?;

    let stats = passes
        .iter()
        .fold(StatsSnapshot::default(), |acc, (_, pass)| acc + pass.stats);
    println!(
        "{}",
        report::summary(&stats, accepted, ct.is_cancelled())
    );

    Ok(())
}

/// Writes the output playlist and the optional report, returning the number of channels
/// written. Nothing is written when no pass ran, so an earlier output is kept.
async fn write_outputs(args: &Args, passes: &[(String, RunReport)]) -> Result<usize> {
    if passes.is_empty() {
        warn!(
            "No playlist was checked, leaving {} untouched",
            args.output.display()
        );
        return Ok(0);
    }

    let mut output = ResultSink::new();
    for (_, pass) in passes {
        output.extend(pass.accepted.iter().cloned());
    }
    let accepted = output.into_accepted();

    playlist::save(&args.output, &accepted)
        .await
        .with_context(|| format!("Writing {}", args.output.display()))?;
    info!(
        "Wrote {} working channels to {}",
        accepted.len(),
        args.output.display()
    );

    if let Some(path) = &args.report {
        report::save_json(path, passes, accepted.len())
            .await
            .with_context(|| format!("Writing report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    Ok(accepted.len())
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style);
    }
    pb
}

#[cfg(test)]
mod tests {
    use iptv_checker::{Entry, Verdict};
    use tempfile::TempDir;

    use super::*;

    fn args(output: &std::path::Path) -> Args {
        Args::parse_from([
            "iptv-checker",
            "-p",
            "list.m3u",
            "-o",
            output.to_str().unwrap(),
        ])
    }

    #[tokio::test]
    async fn no_pass_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("iptv.m3u");
        std::fs::write(&output, "#EXTM3U\n#EXTINF:-1,Old\nhttp://old/live\n").unwrap();

        let written = write_outputs(&args(&output), &[]).await.unwrap();

        assert_eq!(written, 0);
        assert!(std::fs::read_to_string(&output).unwrap().contains("Old"));
    }

    #[tokio::test]
    async fn passes_are_merged_by_name() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("iptv.m3u");
        let pass = |entries: Vec<Entry>| RunReport {
            accepted: entries.iter().cloned().map(|e| (e, Verdict::Working)).collect(),
            records: entries.into_iter().map(|e| (e, Verdict::Working)).collect(),
            stats: StatsSnapshot::default(),
            interrupted: false,
        };
        let passes = vec![
            (
                "a.m3u".to_string(),
                pass(vec![
                    Entry::new("News", "http://a/news"),
                    Entry::new("Sport", "http://a/sport"),
                ]),
            ),
            (
                "b.m3u".to_string(),
                pass(vec![Entry::new("News", "http://b/news")]),
            ),
        ];

        let written = write_outputs(&args(&output), &passes).await.unwrap();

        assert_eq!(written, 2);
        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("http://b/news"));
        assert!(!content.contains("http://a/news"));
    }
}
