use crate::collectors::{Checkpoint, ProcessSample, ProcessTable, SkipReason};
use std::time::Instant;
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind, Users,
};
use tracing::debug;

const UNKNOWN_USER: &str = "unknown";

// CPU percent is computed from accumulated CPU time between the two
// refreshes, not from sysinfo's own `cpu_usage`, which needs at least
// 200ms between global CPU reads on Linux.
pub struct SysinfoTable {
    system: System,
    users: Users,
    refreshed_at: Option<Instant>,
}

impl SysinfoTable {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system,
            users: Users::new_with_refreshed_list(),
            refreshed_at: None,
        }
    }

    fn username(&self, process: &Process) -> Result<String, SkipReason> {
        let uid = process.user_id().ok_or(SkipReason::AccessDenied)?;
        Ok(self
            .users
            .get_user_by_id(uid)
            .map(|user| user.name().to_string())
            .unwrap_or_else(|| UNKNOWN_USER.to_string()))
    }

    fn refresh(&mut self) -> Instant {
        let kind = ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet)
            .without_tasks();
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        Instant::now()
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn prime(&mut self) -> Vec<Result<Checkpoint, SkipReason>> {
        let observed_at = self.refresh();
        self.refreshed_at = None;

        self.system
            .processes()
            .values()
            .map(|process| {
                if process.status() == ProcessStatus::Zombie {
                    return Err(SkipReason::Zombie);
                }
                Ok(Checkpoint {
                    pid: process.pid().as_u32(),
                    start_time: process.start_time(),
                    cpu_time_ms: process.accumulated_cpu_time(),
                    observed_at,
                })
            })
            .collect()
    }

    fn measure(&mut self, checkpoint: &Checkpoint) -> Result<ProcessSample, SkipReason> {
        let refreshed_at = match self.refreshed_at {
            Some(at) => at,
            None => {
                let at = self.refresh();
                self.refreshed_at = Some(at);
                at
            }
        };

        let process = self
            .system
            .process(Pid::from_u32(checkpoint.pid))
            .ok_or(SkipReason::Vanished)?;
        if process.start_time() != checkpoint.start_time {
            debug!(pid = checkpoint.pid, "pid reused between sampling passes");
            return Err(SkipReason::Vanished);
        }

        let status = process.status();
        match status {
            ProcessStatus::Zombie => return Err(SkipReason::Zombie),
            ProcessStatus::Dead => return Err(SkipReason::Vanished),
            _ => {}
        }

        let username = self.username(process)?;
        let elapsed_ms = refreshed_at
            .saturating_duration_since(checkpoint.observed_at)
            .as_secs_f64()
            * 1000.0;
        let cpu_percent = cpu_rate(
            checkpoint.cpu_time_ms,
            process.accumulated_cpu_time(),
            elapsed_ms,
        );

        Ok(ProcessSample {
            pid: checkpoint.pid,
            name: process.name().to_string_lossy().into_owned(),
            username,
            status: status_label(status).to_string(),
            created_at: process.start_time(),
            cpu_percent,
            memory_resident_bytes: process.memory(),
            memory_virtual_bytes: process.virtual_memory(),
        })
    }

    fn logical_core_count(&self) -> usize {
        self.system.cpus().len()
    }
}

// Percent of one core spent between two CPU time readings.
fn cpu_rate(before_ms: u64, after_ms: u64, elapsed_ms: f64) -> f64 {
    if elapsed_ms <= 0.0 {
        return 0.0;
    }
    after_ms.saturating_sub(before_ms) as f64 / elapsed_ms * 100.0
}

fn status_label(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "running",
        ProcessStatus::Sleep => "sleeping",
        ProcessStatus::Idle => "idle",
        ProcessStatus::Stop => "stopped",
        ProcessStatus::Zombie => "zombie",
        ProcessStatus::Tracing => "tracing",
        ProcessStatus::Dead => "dead",
        ProcessStatus::Waking | ProcessStatus::Wakekill => "waking",
        _ => "unknown",
    }
}
