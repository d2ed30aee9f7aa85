//! Background jobs keyed by uid.
//!
//! Jobs run on a small multi-thread `tokio` runtime owned by the registry.
//! Each job shares a status record with the UI thread and polls a stop flag
//! at every I/O step.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{HostError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStatus {
    /// 0..1.
    pub progress: f64,
    pub info: String,
    pub running: bool,
    pub failed: bool,
}

/// The job side of a status record.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    status: Arc<Mutex<JobStatus>>,
    stop: Arc<AtomicBool>,
}

impl JobHandle {
    fn lock(&self) -> MutexGuard<'_, JobStatus> {
        match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> JobStatus {
        self.lock().clone()
    }

    pub fn set_progress(&self, progress: f64, info: impl Into<String>) {
        let mut status = self.lock();
        status.progress = progress.clamp(0.0, 1.0);
        status.info = info.into();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Error out when a stop was requested.
    pub fn check(&self) -> Result<()> {
        if self.should_stop() { Err(HostError::Stopped) } else { Ok(()) }
    }

    fn finish(&self, result: &Result<()>) {
        let mut status = self.lock();
        status.running = false;
        match result {
            Ok(()) => {
                status.progress = 1.0;
                status.info = "done".into();
            }
            Err(e) => {
                status.failed = !matches!(e, HostError::Stopped);
                status.info = e.to_string();
            }
        }
    }
}

struct RegistryInner {
    runtime: tokio::runtime::Runtime,
    jobs: Mutex<HashMap<String, JobHandle>>,
}

/// Owner of all jobs of the host.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("atrium-job")
            .enable_all()
            .build()?;
        Ok(Self { inner: Arc::new(RegistryInner { runtime, jobs: Mutex::new(HashMap::new()) }) })
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobHandle>> {
        match self.inner.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a job unless one with `uid` is still running.
    pub fn spawn<F, Fut>(&self, uid: &str, job: F) -> bool
    where
        F: FnOnce(JobHandle) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = {
            let mut jobs = self.jobs();
            if jobs.get(uid).is_some_and(|h| h.lock().running) {
                return false;
            }
            let handle = JobHandle::default();
            handle.lock().running = true;
            jobs.insert(uid.to_string(), handle.clone());
            handle
        };
        let fut = job(handle.clone());
        let uid = uid.to_string();
        self.inner.runtime.spawn(async move {
            let result = fut.await;
            match &result {
                Ok(()) => tracing::info!(uid, "job finished"),
                Err(HostError::Stopped) => tracing::info!(uid, "job stopped"),
                Err(e) => tracing::warn!(uid, "job failed: {e}"),
            }
            handle.finish(&result);
        });
        true
    }

    pub fn status(&self, uid: &str) -> Option<JobStatus> {
        self.jobs().get(uid).map(JobHandle::snapshot)
    }

    pub fn is_running(&self, uid: &str) -> bool {
        self.status(uid).is_some_and(|s| s.running)
    }

    /// Progress 0..1, or −1 for an unknown uid.
    pub fn progress(&self, uid: &str) -> f64 {
        self.status(uid).map(|s| s.progress).unwrap_or(-1.0)
    }

    pub fn info(&self, uid: &str) -> Option<String> {
        self.status(uid).map(|s| s.info)
    }

    /// Ask a job to stop. False for an unknown uid.
    pub fn stop(&self, uid: &str) -> bool {
        match self.jobs().get(uid) {
            Some(h) => {
                h.stop.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Ask every job to stop (host shutdown).
    pub fn stop_all(&self) {
        for h in self.jobs().values() {
            h.stop.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_idle(reg: &JobRegistry, uid: &str) {
        let start = Instant::now();
        while reg.is_running(uid) && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn one_job_per_uid() {
        let reg = JobRegistry::new().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let g = gate.clone();
        assert!(reg.spawn("a", move |h| async move {
            while !g.load(Ordering::Acquire) {
                if h.should_stop() {
                    return Err(HostError::Stopped);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Ok::<(), HostError>(())
        }));
        assert!(!reg.spawn("a", |_| async { Ok::<(), HostError>(()) }));
        gate.store(true, Ordering::Release);
        wait_idle(&reg, "a");
        assert_eq!(reg.progress("a"), 1.0);
        assert_eq!(reg.info("a").as_deref(), Some("done"));
        assert!(reg.spawn("a", |_| async { Ok::<(), HostError>(()) }));
    }

    #[test]
    fn stop_is_cooperative() {
        let reg = JobRegistry::new().unwrap();
        reg.spawn("loop", |h| async move {
            while !h.should_stop() {
                h.set_progress(0.5, "working");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Err::<(), HostError>(HostError::Stopped)
        });
        assert!(reg.stop("loop"));
        wait_idle(&reg, "loop");
        let status = reg.status("loop").unwrap();
        assert!(!status.running);
        assert!(!status.failed);
        assert_eq!(status.info, "stopped");
        assert!(!reg.stop("unknown"));
        assert_eq!(reg.progress("unknown"), -1.0);
    }
}
