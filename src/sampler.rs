use crate::collectors::{Checkpoint, ProcessSample, ProcessTable, SkipReason, SkipTally};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct CpuSampler {
    window: Duration,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_WINDOW)
    }
}

impl CpuSampler {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn prime<T: ProcessTable>(&self, table: &mut T) -> Primed {
        let mut checkpoints = HashMap::new();
        let mut order = Vec::new();
        let mut skipped = SkipTally::default();
        let mut seen = 0_usize;

        for entry in table.prime() {
            seen += 1;
            match entry {
                Ok(checkpoint) => {
                    if checkpoints.contains_key(&checkpoint.pid) {
                        skipped.record(SkipReason::Duplicate);
                        continue;
                    }
                    checkpoints.insert(checkpoint.pid, checkpoint);
                    order.push(checkpoint.pid);
                }
                Err(reason) => {
                    debug!(reason = %reason, "process skipped while priming");
                    skipped.record(reason);
                }
            }
        }

        Primed {
            window: self.window,
            order,
            checkpoints,
            seen,
            skipped,
        }
    }

    pub async fn sample_all<T: ProcessTable>(&self, table: &mut T) -> Measured {
        let primed = self.prime(table);
        debug!(seen = primed.seen(), primed = primed.len(), "sampling window started");
        primed.measure(table).await
    }
}

#[derive(Debug)]
pub struct Primed {
    window: Duration,
    order: Vec<u32>,
    checkpoints: HashMap<u32, Checkpoint>,
    seen: usize,
    skipped: SkipTally,
}

impl Primed {
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub async fn measure<T: ProcessTable>(self, table: &mut T) -> Measured {
        if !self.is_empty() && !self.window.is_zero() {
            tokio::time::sleep(self.window).await;
        }

        let mut samples = Vec::with_capacity(self.order.len());
        let mut measure_skipped = SkipTally::default();
        for pid in &self.order {
            let Some(checkpoint) = self.checkpoints.get(pid) else {
                continue;
            };
            match table.measure(checkpoint) {
                Ok(sample) => samples.push(sample),
                Err(reason) => {
                    debug!(pid = *pid, reason = %reason, "process skipped while measuring");
                    measure_skipped.record(reason);
                }
            }
        }

        Measured {
            samples,
            seen: self.seen,
            prime_skipped: self.skipped,
            measure_skipped,
        }
    }
}

#[derive(Debug)]
pub struct Measured {
    pub samples: Vec<ProcessSample>,
    pub seen: usize,
    pub prime_skipped: SkipTally,
    pub measure_skipped: SkipTally,
}

impl Measured {
    pub fn skipped(&self) -> SkipTally {
        let mut total = self.prime_skipped.clone();
        total.merge(&self.measure_skipped);
        total
    }
}
