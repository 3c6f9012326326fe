use std::{sync::Arc, time::Duration};

use reqwest::Url;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    cache::ProbeCache,
    config::CheckConfig,
    entry::{Entry, Verdict},
    probe::{MediaOutcome, MediaProbe, Reachability, ReachabilityProbe},
};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// Headroom given to the media prober to kill and reap its process on its own deadline
/// before the validator drops it
const MEDIA_DEADLINE_SLACK: Duration = Duration::from_secs(1);

/// Runs the reachability check then the media check for one entry
///
/// Every failure is turned into a [`Verdict`], nothing here can fail the whole pass.
pub struct Validator {
    reachability: Arc<dyn ReachabilityProbe>,
    media: Arc<dyn MediaProbe>,
    cache: Arc<ProbeCache>,
    reachability_timeout: Duration,
    media_timeout: Duration,
    retry_count: u32,
}

impl Validator {
    #[must_use]
    pub fn new(
        reachability: Arc<dyn ReachabilityProbe>,
        media: Arc<dyn MediaProbe>,
        cache: Arc<ProbeCache>,
        config: &CheckConfig,
    ) -> Self {
        Self {
            reachability,
            media,
            cache,
            reachability_timeout: config.reachability_timeout,
            media_timeout: config.media_timeout,
            retry_count: config.retry_count,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ProbeCache {
        &self.cache
    }

    /// Validates `entry`, reusing the verdict of an earlier entry with the same URL.
    ///
    /// `ct` is only checked before the first reachability attempt and during retry
    /// back-off. Once a stage started it runs until it finishes or its timeout, which is
    /// enforced here and not left to the probe.
    #[instrument(skip_all, fields(name = %entry.name))]
    pub async fn validate(&self, entry: &Entry, ct: &CancellationToken) -> Verdict {
        if let Some(verdict) = self.cache.get(&entry.url) {
            debug!("Reusing verdict for {}: {verdict}", entry.url);
            return verdict;
        }

        self.cache
            .get_or_resolve(&entry.url, || self.probe(&entry.url, ct))
            .await
    }

    async fn probe(&self, url: &str, ct: &CancellationToken) -> Verdict {
        match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(_) => return Verdict::Failed("unsupported scheme".into()),
            Err(_) => return Verdict::Failed("invalid url".into()),
        }

        let mut attempt = 0;
        loop {
            if ct.is_cancelled() {
                return Verdict::interrupted();
            }

            let check = self.reachability.check(url, self.reachability_timeout);
            let reachability = tokio::time::timeout(self.reachability_timeout, check)
                .await
                .unwrap_or(Reachability::TimedOut);

            match reachability {
                Reachability::Reachable => break,
                // Not reachable means not decodable either, the media tool is not worth spawning
                Reachability::Unreachable(reason) => return Verdict::Failed(reason),
                Reachability::TimedOut if attempt < self.retry_count => {
                    attempt += 1;
                    debug!("{url} timed out, retry {attempt}/{}", self.retry_count);
                    select! {
                        () = ct.cancelled() => return Verdict::interrupted(),
                        () = tokio::time::sleep(RETRY_BACKOFF * attempt) => {}
                    }
                }
                Reachability::TimedOut => return Verdict::Timeout,
            }
        }

        let probe = self.media.probe(url, self.media_timeout);
        match tokio::time::timeout(self.media_timeout + MEDIA_DEADLINE_SLACK, probe).await {
            Ok(MediaOutcome::Decodable) => Verdict::Working,
            Ok(MediaOutcome::NotDecodable(reason)) => Verdict::Failed(reason),
            Ok(MediaOutcome::TimedOut) => Verdict::Timeout,
            Err(_) => {
                debug!("Media probe of {url} ignored its {:?} deadline", self.media_timeout);
                Verdict::Timeout
            }
        }
    }
}
