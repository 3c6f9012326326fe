use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OnceCell;

use crate::entry::Verdict;

/// Verdicts of the current pass, keyed by URL
///
/// Resolution is single-flight: concurrent entries sharing a URL wait on the first one's
/// probe instead of starting their own. Only the map lookup is under the lock, never the
/// probing itself.
#[derive(Debug, Default)]
pub struct ProbeCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<Verdict>>>>,
}

impl ProbeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, url: &str) -> Arc<OnceCell<Verdict>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(url.to_string()).or_default().clone()
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<Verdict> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(url).and_then(|cell| cell.get().cloned())
    }

    /// Returns the cached verdict for `url`, or runs `resolve` to produce it.
    ///
    /// Verdicts that are not [cacheable](Verdict::is_cacheable) are returned without
    /// being stored, so a later entry with the same URL probes again. The same goes for a
    /// `resolve` future that gets dropped halfway.
    pub async fn get_or_resolve<F, Fut>(&self, url: &str, resolve: F) -> Verdict
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Verdict>,
    {
        let slot = self.slot(url);
        let result = slot
            .get_or_try_init(|| async move {
                let verdict = resolve().await;
                if verdict.is_cacheable() {
                    Ok(verdict)
                } else {
                    Err(verdict)
                }
            })
            .await;

        match result {
            Ok(verdict) => verdict.clone(),
            Err(uncached) => uncached,
        }
    }

    /// Number of URLs with a stored verdict
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|cell| cell.initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every verdict, for reusing the cache across passes
    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
