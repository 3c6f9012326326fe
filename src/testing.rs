//! Scripted probers for exercising the validator and scheduler without network or ffmpeg

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::probe::{MediaOutcome, MediaProbe, Reachability, ReachabilityProbe};

/// Answers with a fixed outcome, or a per-URL one, after an optional delay
pub struct FakeReachability {
    default: Reachability,
    by_url: HashMap<String, Reachability>,
    first: Mutex<Option<Reachability>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeReachability {
    pub fn new(default: Reachability) -> Self {
        Self {
            default,
            by_url: HashMap::new(),
            first: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_url(mut self, url: &str, outcome: Reachability) -> Self {
        self.by_url.insert(url.to_string(), outcome);
        self
    }

    /// The very first call answers `outcome` instead
    pub fn then_first(self, outcome: Reachability) -> Self {
        *self.first.lock().unwrap() = Some(outcome);
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for FakeReachability {
    async fn check(&self, url: &str, _timeout: Duration) -> Reachability {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(first) = self.first.lock().unwrap().take() {
            return first;
        }
        self.by_url
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Media prober counterpart of [`FakeReachability`], also tracks calls per URL
pub struct FakeMedia {
    default: MediaOutcome,
    by_url: HashMap<String, MediaOutcome>,
    delay: Duration,
    calls: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl FakeMedia {
    pub fn new(default: MediaOutcome) -> Self {
        Self {
            default,
            by_url: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            per_url: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_url(mut self, url: &str, outcome: MediaOutcome) -> Self {
        self.by_url.insert(url.to_string(), outcome);
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.per_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MediaProbe for FakeMedia {
    async fn probe(&self, url: &str, _timeout: Duration) -> MediaOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_url
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.by_url
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
