use crate::render::LogEntry;
use std::collections::VecDeque;

/// Maximum number of entries the log keeps.
pub const LOG_CAPACITY: usize = 20;

/// Most-recent-first list of rendered entries with a fixed cap.
#[derive(Debug, Clone)]
pub struct LogView {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(LOG_CAPACITY)
    }
}

impl LogView {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Puts `entry` at the top and drops entries from the bottom until the
    /// cap holds again. Returns what was evicted, oldest last.
    pub fn prepend(&mut self, entry: LogEntry) -> Vec<LogEntry> {
        self.entries.push_front(entry);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(old) = self.entries.pop_back() {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Prepends a block of entries so that they read in the given order at
    /// the top of the log.
    pub fn prepend_block(&mut self, block: Vec<LogEntry>) -> Vec<LogEntry> {
        let mut evicted = Vec::new();
        for entry in block.into_iter().rev() {
            evicted.extend(self.prepend(entry));
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn to_html(&self) -> String {
        self.entries.iter().map(LogEntry::to_html).collect()
    }
}
