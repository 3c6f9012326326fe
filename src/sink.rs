use std::collections::HashMap;

use crate::entry::{Entry, Verdict};

/// Working entries kept for the output playlist, one per channel name
///
/// When a name shows up again, the newer entry replaces the older one in place: the
/// channel keeps the position where its name was first seen.
#[derive(Debug, Default)]
pub struct ResultSink {
    accepted: Vec<(Entry, Verdict)>,
    by_name: HashMap<String, usize>,
}

impl ResultSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `entry` if its verdict is [`Verdict::Working`]. Returns whether it was kept.
    pub fn offer(&mut self, entry: Entry, verdict: Verdict) -> bool {
        if !verdict.is_working() {
            return false;
        }

        match self.by_name.get(&entry.name) {
            Some(&index) => self.accepted[index] = (entry, verdict),
            None => {
                self.by_name.insert(entry.name.clone(), self.accepted.len());
                self.accepted.push((entry, verdict));
            }
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).map(|&i| &self.accepted[i].0)
    }

    /// The accepted set, ready for serialization
    #[must_use]
    pub fn into_accepted(self) -> Vec<(Entry, Verdict)> {
        self.accepted
    }
}

impl Extend<(Entry, Verdict)> for ResultSink {
    fn extend<T: IntoIterator<Item = (Entry, Verdict)>>(&mut self, iter: T) {
        for (entry, verdict) in iter {
            self.offer(entry, verdict);
        }
    }
}
