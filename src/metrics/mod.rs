mod types;

pub use types::{CaptureMetrics, MetricsSnapshot, SystemMetrics};

use std::{collections::VecDeque, sync::Arc};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_CAPTURES: usize = 20;

/// Capture-loop counters and a ring buffer of the latest capture timings.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_captures: VecDeque<CaptureMetrics>,
    capture_count: u64,
    emitted_count: u64,
    cancelled_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsState {
    fn system_metrics(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes, so take the baseline now
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_captures: VecDeque::with_capacity(MAX_RECENT_CAPTURES),
                capture_count: 0,
                emitted_count: 0,
                cancelled_count: 0,
                system,
                pid,
            })),
        }
    }

    /// Current process CPU percentage and resident memory in MiB.
    pub async fn sample_system_metrics(&self) -> SystemMetrics {
        self.inner.lock().await.system_metrics()
    }

    pub async fn record_capture(&self, metrics: CaptureMetrics) {
        let mut state = self.inner.lock().await;

        state.capture_count += 1;
        if metrics.emitted {
            state.emitted_count += 1;
        }

        state.recent_captures.push_back(metrics);
        if state.recent_captures.len() > MAX_RECENT_CAPTURES {
            state.recent_captures.pop_front();
        }
    }

    /// A tick found the previous render still pending and aborted it.
    pub async fn record_cancelled(&self) {
        self.inner.lock().await.cancelled_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        MetricsSnapshot {
            system: state.system_metrics(),
            recent_captures: state.recent_captures.iter().cloned().collect(),
            capture_count: state.capture_count,
            emitted_count: state.emitted_count,
            cancelled_count: state.cancelled_count,
        }
    }

}
