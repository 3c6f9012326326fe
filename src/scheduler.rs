use std::{collections::HashMap, sync::Arc, time::Duration};

use indicatif::ProgressBar;
use tokio::{
    select,
    sync::Semaphore,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    cache::ProbeCache,
    config::CheckConfig,
    entry::{Entry, Verdict},
    probe::{MediaProbe, ReachabilityProbe},
    sink::ResultSink,
    stats::{Stats, StatsSnapshot},
    util::truncate_string,
    validator::Validator,
};

/// Everything one pass produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One record per entry, in completion order
    pub records: Vec<(Entry, Verdict)>,
    /// Working entries, deduplicated by channel name
    pub accepted: Vec<(Entry, Verdict)>,
    pub stats: StatsSnapshot,
    pub interrupted: bool,
}

/// Fans entries out to a bounded pool of validators and folds their verdicts back in
pub struct Scheduler {
    config: CheckConfig,
    reachability: Arc<dyn ReachabilityProbe>,
    media: Arc<dyn MediaProbe>,
    cache: Arc<ProbeCache>,
    stats: Arc<Stats>,
    progress: ProgressBar,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: CheckConfig,
        reachability: Arc<dyn ReachabilityProbe>,
        media: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            config,
            reachability,
            media,
            cache: Arc::new(ProbeCache::new()),
            stats: Arc::new(Stats::new()),
            progress: ProgressBar::hidden(),
        }
    }

    /// Report one line per resolved entry on this bar, for the next pass
    pub fn set_progress(&mut self, progress: ProgressBar) {
        self.progress = progress;
    }

    /// Live counters of the pass currently running
    #[must_use]
    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Validates every entry and returns exactly one record per entry.
    ///
    /// Once `ct` is cancelled no new validation starts and entries still waiting for a
    /// slot are recorded as skipped. In-flight ones get [`CheckConfig::shutdown_grace`]
    /// to finish before they are dropped and recorded as skipped too.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn run(&mut self, entries: Vec<Entry>, ct: &CancellationToken) -> RunReport {
        // Nothing carries over from a previous pass
        self.cache.clear();
        self.stats.reset();

        let total = entries.len();
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let validator = Arc::new(Validator::new(
            self.reachability.clone(),
            self.media.clone(),
            self.cache.clone(),
            &self.config,
        ));
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let hard_stop = CancellationToken::new();
        let grace_watcher =
            spawn_grace_watcher(ct.clone(), hard_stop.clone(), self.config.shutdown_grace);

        info!(
            "Checking {total} entries with {} concurrent workers",
            self.config.concurrency
        );

        let mut tasks = JoinSet::new();
        let mut task_entries = HashMap::with_capacity(total);
        for (index, entry) in entries.iter().enumerate() {
            let entry = entry.clone();
            let ct = ct.clone();
            let hard_stop = hard_stop.clone();
            let permits = permits.clone();
            let validator = validator.clone();

            let handle = tasks.spawn(async move {
                let _permit = select! {
                    biased;
                    () = ct.cancelled() => return (index, Verdict::interrupted()),
                    permit = permits.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return (index, Verdict::interrupted()),
                    },
                };

                let verdict = select! {
                    () = hard_stop.cancelled() => Verdict::interrupted(),
                    v = validator.validate(&entry, &ct) => v,
                };
                (index, verdict)
            });
            task_entries.insert(handle.id(), index);
        }

        let mut sink = ResultSink::new();
        let mut records = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, verdict) = match joined {
                Ok((id, result)) => {
                    task_entries.remove(&id);
                    result
                }
                Err(e) => {
                    let Some(index) = task_entries.remove(&e.id()) else {
                        error!("Lost track of a validation task: {e}");
                        continue;
                    };
                    error!("Validating {} failed: {e}", entries[index].url);
                    (index, Verdict::general_error())
                }
            };

            let entry = &entries[index];
            self.stats.record(&verdict);
            self.report_progress(records.len() + 1, total, entry, &verdict);
            sink.offer(entry.clone(), verdict.clone());
            records.push((entry.clone(), verdict));
        }
        grace_watcher.abort();

        let stats = self.stats.snapshot();
        let interrupted = ct.is_cancelled();
        if interrupted {
            info!(
                "Pass interrupted, {} of {total} entries were skipped",
                stats.skipped
            );
        }
        self.progress.finish_and_clear();

        RunReport {
            records,
            accepted: sink.into_accepted(),
            stats,
            interrupted,
        }
    }

    fn report_progress(&self, done: usize, total: usize, entry: &Entry, verdict: &Verdict) {
        debug!("{} ({}): {verdict}", entry.name, entry.url);

        let s = self.stats.snapshot();
        self.progress.println(format!(
            "[{done}/{total}] {}: {verdict}",
            truncate_string(&entry.name, 60)
        ));
        self.progress.set_message(format!(
            "{} working, {} failed, {} timeout, {} skipped",
            s.working, s.failed, s.timeout, s.skipped
        ));
        self.progress.inc(1);
    }
}

/// Cancels `hard_stop` once `ct` has been cancelled for `grace`
fn spawn_grace_watcher(
    ct: CancellationToken,
    hard_stop: CancellationToken,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        ct.cancelled().await;
        info!("Not starting new checks, waiting up to {grace:?} for the ones in flight");
        tokio::time::sleep(grace).await;
        hard_stop.cancel();
    })
}
