// Watermark Domain Model

use crate::domain::clock::LogicalTime;
use std::collections::BTreeMap;

/// Per task-group checkpoints
///
/// Inputs at or before a group's watermark are considered processed. The
/// mapping is loaded once per run, mutated in memory, and saved in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks {
    marks: BTreeMap<String, LogicalTime>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current watermark for a group (zero if never set)
    pub fn get(&self, group: &str) -> LogicalTime {
        self.marks.get(group).copied().unwrap_or(LogicalTime::ZERO)
    }

    /// Whether a watermark was ever recorded for the group
    pub fn contains(&self, group: &str) -> bool {
        self.marks.contains_key(group)
    }

    /// Move a group's watermark forward; never moves it backward
    ///
    /// Returns true if the stored value changed.
    pub fn advance(&mut self, group: &str, to: LogicalTime) -> bool {
        match self.marks.get_mut(group) {
            Some(current) if *current >= to => false,
            Some(current) => {
                *current = to;
                true
            }
            None => {
                self.marks.insert(group.to_string(), to);
                true
            }
        }
    }

    /// Raw insert used when restoring from persistent storage
    pub fn restore(&mut self, group: impl Into<String>, value: LogicalTime) {
        self.marks.insert(group.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LogicalTime)> {
        self.marks.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
