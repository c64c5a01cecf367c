pub mod process;

#[cfg(test)]
pub mod fake;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

// start_time guards against a pid recycled between the two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub pid: u32,
    pub start_time: u64,
    pub cpu_time_ms: u64,
    pub observed_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub username: String,
    pub status: String,
    pub created_at: u64,
    // percent of one logical core
    pub cpu_percent: f64,
    pub memory_resident_bytes: u64,
    pub memory_virtual_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    Vanished,
    AccessDenied,
    Zombie,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Vanished => "vanished",
            SkipReason::AccessDenied => "access_denied",
            SkipReason::Zombie => "zombie",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipTally {
    counts: BTreeMap<SkipReason, usize>,
}

impl SkipTally {
    pub fn record(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(&mut self, other: &SkipTally) {
        for (reason, n) in &other.counts {
            *self.counts.entry(*reason).or_insert(0) += n;
        }
    }
}

impl fmt::Display for SkipTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (reason, n) in &self.counts {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{reason}={n}")?;
            first = false;
        }
        Ok(())
    }
}

pub trait ProcessTable {
    fn prime(&mut self) -> Vec<Result<Checkpoint, SkipReason>>;

    fn measure(&mut self, checkpoint: &Checkpoint) -> Result<ProcessSample, SkipReason>;

    // 0 when the host does not report it
    fn logical_core_count(&self) -> usize;
}
