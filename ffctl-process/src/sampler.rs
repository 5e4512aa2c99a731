use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically reads CPU and resident memory for one child process.
///
/// Limits are declarative only; the sampler observes, it never enforces.
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<Inner>,
}

struct Inner {
    reading: Mutex<(f64, u64)>,
    task: Mutex<Option<JoinHandle<()>>>,
    limits: (f64, u64),
}

impl Sampler {
    pub fn new(cpu_limit: f64, memory_limit: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                reading: Mutex::new((0.0, 0)),
                task: Mutex::new(None),
                limits: (cpu_limit, memory_limit),
            }),
        }
    }

    /// Attach to a live PID and start the refresh tick. A missing or
    /// already-exited PID is tolerated; the reading stays at zero.
    pub fn start(&self, pid: u32) {
        self.stop();
        if pid == 0 {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut system = System::new();
            let target = sysinfo::Pid::from_u32(pid);
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
                let reading = system
                    .process(target)
                    .map(|proc| (f64::from(proc.cpu_usage()), proc.memory()))
                    .unwrap_or((0.0, 0));
                *inner.reading.lock() = reading;
            }
        });

        *self.inner.task.lock() = Some(handle);
    }

    /// Detach and zero the reading.
    pub fn stop(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        *self.inner.reading.lock() = (0.0, 0);
    }

    /// Most recent `(cpu_percent, rss_bytes)`, or zeros when detached.
    pub fn current(&self) -> (f64, u64) {
        *self.inner.reading.lock()
    }

    /// Configured `(cpu_percent, memory_bytes)` limits.
    pub fn limits(&self) -> (f64, u64) {
        self.inner.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_sampler_reads_zero() {
        let sampler = Sampler::new(50.0, 1024);
        assert_eq!(sampler.current(), (0.0, 0));
        assert_eq!(sampler.limits(), (50.0, 1024));
    }

    #[tokio::test]
    async fn samples_own_process() {
        let sampler = Sampler::new(0.0, 0);
        sampler.start(std::process::id());

        // Two ticks so cpu_usage has a delta to work with.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let (_cpu, memory) = sampler.current();
        assert!(memory > 0);

        sampler.stop();
        assert_eq!(sampler.current(), (0.0, 0));
    }

    #[tokio::test]
    async fn missing_pid_is_tolerated() {
        let sampler = Sampler::new(0.0, 0);
        sampler.start(u32::MAX - 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sampler.current(), (0.0, 0));
        sampler.stop();
    }
}
