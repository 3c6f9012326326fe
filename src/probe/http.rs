use std::{error::Error as _, io, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RANGE};
use tracing::{debug, instrument};

use super::{Reachability, ReachabilityProbe};

/// Reachability check over HTTP(S) using `HEAD`, falling back to a one-byte ranged `GET`
/// for servers that refuse `HEAD`
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    /// The client's redirect policy bounds the redirect chain,
    /// see [`crate::util::init_http_client`]
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    async fn request(&self, url: &str) -> Result<StatusCode, reqwest::Error> {
        let res = self.client.head(url).send().await?;
        let status = res.status();
        if status != StatusCode::METHOD_NOT_ALLOWED && status != StatusCode::NOT_IMPLEMENTED {
            return Ok(status);
        }

        debug!("{url} refused HEAD ({status}), retrying with a ranged GET");
        // Response is dropped without reading the body
        let res = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        Ok(res.status())
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProber {
    #[instrument(skip(self))]
    async fn check(&self, url: &str, timeout: Duration) -> Reachability {
        let Ok(result) = tokio::time::timeout(timeout, self.request(url)).await else {
            debug!("No response within {timeout:?}");
            return Reachability::TimedOut;
        };

        match result {
            Ok(status) if status.is_success() => Reachability::Reachable,
            Ok(status) => Reachability::Unreachable(status_reason(status)),
            Err(e) if e.is_timeout() => Reachability::TimedOut,
            Err(e) => {
                debug!("Request failed: {e:?}");
                Reachability::Unreachable(transport_reason(&e).to_string())
            }
        }
    }
}

/// Maps a non-success status to `"<code> <reason>"`
#[must_use]
pub fn status_reason(status: StatusCode) -> String {
    let text = match status.as_u16() {
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not found",
        408 => "request timeout",
        410 => "gone",
        429 => "too many requests",
        300..=399 => "unfollowed redirect",
        400..=499 => "client error",
        500..=599 => "server error",
        _ => "unexpected status",
    };
    format!("{} {text}", status.as_u16())
}

/// Folds a transport error into a short, stable reason. Raw error text differs between
/// TLS backends and library versions, so it never reaches reports.
#[must_use]
pub fn transport_reason(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        return "request timeout";
    }
    if error.is_redirect() {
        return "too many redirects";
    }
    if error.is_builder() {
        return "invalid url";
    }

    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return "connection refused",
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return "connection reset";
                }
                io::ErrorKind::TimedOut => return "request timeout",
                _ => {}
            }
        }
        source = err.source();
    }

    classify_message(&format!("{error:?}"))
}

fn classify_message(message: &str) -> &'static str {
    let message = message.to_lowercase();
    if message.contains("dns") || message.contains("lookup") || message.contains("resolve") {
        "host not found"
    } else if message.contains("refused") {
        "connection refused"
    } else if message.contains("certificate")
        || message.contains("tls")
        || message.contains("ssl")
        || message.contains("handshake")
    {
        "tls error"
    } else if message.contains("reset") || message.contains("closed") {
        "connection reset"
    } else if message.contains("connect") {
        "connection failed"
    } else {
        "request error"
    }
}
