use std::{ffi::OsString, io::ErrorKind, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{io::AsyncReadExt, process::Command};
use tracing::{debug, error, instrument, warn};

use crate::{
    config::{CheckConfig, MediaTool, UnrecognizedExitPolicy},
    probe::{MediaOutcome, MediaProbe},
    util::truncate_string,
};

/// Diagnostic substrings that mean the stream is definitely unusable, checked in order
const KNOWN_FAILURES: &[(&str, &str)] = &[
    ("403 forbidden", "forbidden"),
    ("401 unauthorized", "unauthorized"),
    ("not found", "not found"),
    ("invalid data found", "invalid data"),
    ("input/output error", "input/output error"),
    ("connection refused", "connection refused"),
    ("connection timed out", "connection timed out"),
    ("could not find codec parameters", "no playable stream"),
    ("does not contain any stream", "no playable stream"),
    ("end of file", "unexpected end of stream"),
];

/// Checks if the given media tool is installed / available in PATH
pub async fn is_installed(program: &str) -> bool {
    debug!("Checking for {program} installation");
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok_and(|s| s.success())
}

/// Runs ffmpeg (or ffprobe) against a stream URL to confirm it decodes
#[derive(Debug, Clone)]
pub struct FfmpegProber {
    tool: MediaTool,
    program: OsString,
    sample_duration: Duration,
    unrecognized_exit: UnrecognizedExitPolicy,
}

impl FfmpegProber {
    #[must_use]
    pub fn new(config: &CheckConfig) -> Self {
        Self {
            tool: config.media_tool,
            program: config.media_tool.program().into(),
            sample_duration: config.sample_duration,
            unrecognized_exit: config.unrecognized_exit,
        }
    }

    /// Use another executable than the one found in PATH
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-v", "error"]
            .into_iter()
            .map(String::from)
            .collect();

        match self.tool {
            MediaTool::Ffmpeg => {
                args.extend(["-nostdin".into(), "-i".into(), url.into()]);
                // Decode a bounded slice only, into a null muxer
                args.extend([
                    "-t".into(),
                    format!("{:.3}", self.sample_duration.as_secs_f64()),
                    "-f".into(),
                    "null".into(),
                    "-".into(),
                ]);
            }
            MediaTool::Ffprobe => args.push(url.into()),
        }

        args
    }
}

#[async_trait]
impl MediaProbe for FfmpegProber {
    #[instrument(skip(self), fields(tool = self.tool.program()))]
    async fn probe(&self, url: &str, timeout: Duration) -> MediaOutcome {
        let mut command = Command::new(&self.program);
        command.args(self.args(url));

        let process = match MediaProcess::spawn(command) {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!("`{}` is not installed or available in PATH!", self.tool.program());
                return MediaOutcome::NotDecodable("media tool not found".into());
            }
            Err(e) => {
                error!("Unable to spawn {}: {e}", self.tool.program());
                return MediaOutcome::NotDecodable("general error".into());
            }
        };

        match process.finish(timeout).await {
            Finished::Exited { success, code, stderr } => {
                debug!(success, code, "Media tool exited");
                classify_exit(success, code, &stderr, self.unrecognized_exit)
            }
            Finished::Killed => {
                debug!("Media tool ran past {timeout:?} and was killed");
                MediaOutcome::TimedOut
            }
            Finished::Failed(e) => {
                error!("Waiting on {} failed: {e}", self.tool.program());
                MediaOutcome::NotDecodable("general error".into())
            }
        }
    }
}

enum Finished {
    Exited {
        success: bool,
        code: Option<i32>,
        stderr: String,
    },
    Killed,
    Failed(std::io::Error),
}

/// A spawned media tool. The child is killed if this handle is dropped before it exits,
/// and killed then reaped when [`MediaProcess::finish`] hits its deadline.
struct MediaProcess {
    child: tokio::process::Child,
}

impl MediaProcess {
    fn spawn(mut command: Command) -> std::io::Result<Self> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Self { child })
    }

    #[cfg(test)]
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn finish(mut self, timeout: Duration) -> Finished {
        let mut stderr_pipe = self.child.stderr.take();

        let waited = {
            // Stderr is drained while waiting so a chatty process cannot block on a full pipe
            let read_stderr = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stderr_pipe.as_mut() {
                    pipe.read_to_end(&mut buf).await.ok();
                }
                buf
            };
            let wait = async { tokio::join!(self.child.wait(), read_stderr) };
            tokio::time::timeout(timeout, wait).await
        };

        match waited {
            Ok((Ok(status), stderr)) => Finished::Exited {
                success: status.success(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            },
            Ok((Err(e), _)) => Finished::Failed(e),
            Err(_) => {
                // Sends SIGKILL and reaps the child
                if let Err(e) = self.child.kill().await {
                    warn!("Unable to kill timed out media tool: {e}");
                }
                Finished::Killed
            }
        }
    }
}

/// Turns the media tool's exit status and diagnostics into an outcome
#[must_use]
pub fn classify_exit(
    success: bool,
    code: Option<i32>,
    stderr: &str,
    policy: UnrecognizedExitPolicy,
) -> MediaOutcome {
    if success {
        return MediaOutcome::Decodable;
    }

    let diagnostics = stderr.to_lowercase();
    if let Some((_, reason)) = KNOWN_FAILURES
        .iter()
        .find(|(needle, _)| diagnostics.contains(needle))
    {
        return MediaOutcome::NotDecodable((*reason).to_string());
    }

    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    match policy {
        UnrecognizedExitPolicy::Accept => {
            warn!(
                "Media tool exited with {code} and unrecognized diagnostics, accepting anyway: {}",
                truncate_string(&stderr.trim(), 200)
            );
            MediaOutcome::Decodable
        }
        UnrecognizedExitPolicy::Reject => {
            MediaOutcome::NotDecodable(format!("unrecognized failure (exit {code})"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_decodable_regardless_of_diagnostics() {
        let outcome = classify_exit(
            true,
            Some(0),
            "Invalid data found",
            UnrecognizedExitPolicy::Reject,
        );
        assert_eq!(outcome, MediaOutcome::Decodable);
    }

    #[test]
    fn known_diagnostics_are_not_decodable() {
        let cases = [
            (
                "http://x: Server returned 404 Not Found",
                "not found",
            ),
            (
                "http://x: Invalid data found when processing input",
                "invalid data",
            ),
            ("http://x: Input/output error", "input/output error"),
            ("Server returned 403 Forbidden (access denied)", "forbidden"),
        ];

        for (stderr, reason) in cases {
            assert_eq!(
                classify_exit(false, Some(1), stderr, UnrecognizedExitPolicy::Accept),
                MediaOutcome::NotDecodable(reason.into()),
                "{stderr}"
            );
        }
    }

    #[test]
    fn unrecognized_failure_follows_policy() {
        let stderr = "Something new went wrong";
        assert_eq!(
            classify_exit(false, Some(187), stderr, UnrecognizedExitPolicy::Reject),
            MediaOutcome::NotDecodable("unrecognized failure (exit 187)".into())
        );
        assert_eq!(
            classify_exit(false, Some(187), stderr, UnrecognizedExitPolicy::Accept),
            MediaOutcome::Decodable
        );
    }

    #[test]
    fn ffmpeg_reads_a_bounded_slice() {
        let config = CheckConfig {
            sample_duration: Duration::from_secs(7),
            ..Default::default()
        };
        let args = FfmpegProber::new(&config).args("http://example.com/live");
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "7.000");
        assert!(args.ends_with(&["-f".into(), "null".into(), "-".into()]));
    }

    #[cfg(target_os = "linux")]
    mod process {
        use std::{os::unix::fs::PermissionsExt, path::Path};

        use tempfile::TempDir;

        use super::*;

        /// Writes an executable shell script standing in for the media tool
        fn fake_tool(dir: &TempDir, body: &str) -> std::path::PathBuf {
            let path = dir.path().join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn prober(program: &Path) -> FfmpegProber {
            FfmpegProber::new(&CheckConfig::default()).with_program(program)
        }

        #[tokio::test]
        async fn successful_exit_is_decodable() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(&dir, "exit 0");
            let outcome = prober(&tool)
                .probe("http://example.com/live", Duration::from_secs(5))
                .await;
            assert_eq!(outcome, MediaOutcome::Decodable);
        }

        #[tokio::test]
        async fn diagnostics_are_read_from_stderr() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(
                &dir,
                "echo 'http://example.com/live: Invalid data found when processing input' >&2\nexit 1",
            );
            let outcome = prober(&tool)
                .probe("http://example.com/live", Duration::from_secs(5))
                .await;
            assert_eq!(outcome, MediaOutcome::NotDecodable("invalid data".into()));
        }

        #[tokio::test]
        async fn missing_tool_is_not_decodable() {
            let outcome = prober(Path::new("/nonexistent/ffmpeg"))
                .probe("http://example.com/live", Duration::from_secs(5))
                .await;
            assert_eq!(
                outcome,
                MediaOutcome::NotDecodable("media tool not found".into())
            );
        }

        #[tokio::test]
        async fn timed_out_process_is_killed_and_reaped() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(&dir, "exec sleep 30");

            let mut command = Command::new(&tool);
            command.arg("http://example.com/live");
            let process = MediaProcess::spawn(command).unwrap();
            let pid = process.id().unwrap();
            assert!(Path::new(&format!("/proc/{pid}")).exists());

            let finished = process.finish(Duration::from_millis(200)).await;
            assert!(matches!(finished, Finished::Killed));
            assert!(
                !Path::new(&format!("/proc/{pid}")).exists(),
                "media tool {pid} is still around after the timeout"
            );
        }

        #[tokio::test]
        async fn probe_reports_timeout() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(&dir, "exec sleep 30");
            let outcome = prober(&tool)
                .probe("http://example.com/live", Duration::from_millis(200))
                .await;
            assert_eq!(outcome, MediaOutcome::TimedOut);
        }
    }
}
