use crate::collectors::{Checkpoint, ProcessSample, ProcessTable, SkipReason};
use std::collections::HashMap;
use std::time::Instant;

// A primed pid with no `measured` entry reports `Vanished`.
#[derive(Debug, Default)]
pub struct FakeTable {
    primed: Vec<Result<Checkpoint, SkipReason>>,
    measured: HashMap<u32, Result<ProcessSample, SkipReason>>,
    cores: usize,
    pub prime_calls: usize,
    pub measure_calls: usize,
}

impl FakeTable {
    pub fn new(cores: usize) -> Self {
        Self {
            cores,
            ..Self::default()
        }
    }

    pub fn with_process(mut self, sample: ProcessSample) -> Self {
        self.primed.push(Ok(checkpoint(sample.pid, sample.created_at)));
        self.measured.insert(sample.pid, Ok(sample));
        self
    }

    pub fn with_prime_skip(mut self, reason: SkipReason) -> Self {
        self.primed.push(Err(reason));
        self
    }

    pub fn with_measure_skip(mut self, pid: u32, reason: SkipReason) -> Self {
        self.primed.push(Ok(checkpoint(pid, 0)));
        self.measured.insert(pid, Err(reason));
        self
    }
}

impl ProcessTable for FakeTable {
    fn prime(&mut self) -> Vec<Result<Checkpoint, SkipReason>> {
        self.prime_calls += 1;
        self.primed.clone()
    }

    fn measure(&mut self, checkpoint: &Checkpoint) -> Result<ProcessSample, SkipReason> {
        self.measure_calls += 1;
        self.measured
            .get(&checkpoint.pid)
            .cloned()
            .unwrap_or(Err(SkipReason::Vanished))
    }

    fn logical_core_count(&self) -> usize {
        self.cores
    }
}

fn checkpoint(pid: u32, start_time: u64) -> Checkpoint {
    Checkpoint {
        pid,
        start_time,
        cpu_time_ms: 0,
        observed_at: Instant::now(),
    }
}

pub fn sample(pid: u32, cpu_percent: f64, memory_bytes: u64) -> ProcessSample {
    ProcessSample {
        pid,
        name: format!("proc-{pid}"),
        username: "root".to_string(),
        status: "running".to_string(),
        created_at: 1_700_000_000 + u64::from(pid),
        cpu_percent,
        memory_resident_bytes: memory_bytes,
        memory_virtual_bytes: memory_bytes * 4,
    }
}
