use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue},
    redirect,
};
use rlimit::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Truncates a string to a maximum length, adding `...` to the end if it was truncated.
///
/// This function will continuously try to reduce length if string is being
/// truncated in the middle of a UTF codepoint
///
/// # Arguments
/// * `string` - The string to truncate
/// * `max_length` - The maximum length of the string, at least 4
#[must_use]
pub fn truncate_string(string: &impl ToString, max_length: usize) -> String {
    let string = string.to_string();
    if string.len() <= max_length || max_length < 4 {
        return string;
    }

    let mut attempted_len = max_length - 3;
    loop {
        if let Some(truncated) = string.get(..attempted_len) {
            return format!("{truncated}...");
        }
        attempted_len -= 1;
    }
}

/// Every in-flight entry holds a socket and possibly a media tool process with its own pipes
pub fn warn_ulimit(concurrency: usize) {
    let Ok((limit, _)) = rlimit::getrlimit(Resource::NOFILE) else {
        return;
    };
    let wanted = (concurrency as u64).saturating_mul(8).max(1024);
    if limit < wanted {
        warn!(
            "Your file limit ({limit}) is low for {concurrency} concurrent checks. Consider raising it via `ulimit -n {wanted}`"
        );
    }
}

/// Builds the client shared by the reachability prober and the playlist download
///
/// # Panics
/// Panics when the TLS backend cannot be initialised
#[must_use]
pub fn init_http_client(max_redirects: usize) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_str(&format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .expect("Package metadata is a valid header value"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect::Policy::limited(max_redirects))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Unable to build HTTP client")
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal!");
        ct.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate_string(&"Channel One", 20), "Channel One");
        assert_eq!(truncate_string(&"Channel One HD Backup", 10), "Channel...");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 'é' is two bytes, cutting at byte 5 would split it
        let truncated = truncate_string(&"Téléfoot Live", 8);
        assert_eq!(truncated, "Tél...");
    }
}
