// Tracks running jobs and their process handles for cancellation
use crate::models::{JobId, JobSummary};
use crate::process_manager::ProcessHandle;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Per-job cancellation flag that a controller can both poll and await.
#[derive(Debug, Clone, Default)]
pub struct JobCancellation {
    inner: Arc<CancelState>,
}

impl JobCancellation {
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

/// What a controller receives when its job is tracked.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: JobId,
    pub cancellation: JobCancellation,
    /// Stop generation observed at submission
    pub generation: u64,
}

#[derive(Debug)]
struct RegistryEntry {
    summary: JobSummary,
    cancellation: JobCancellation,
    handle: Option<ProcessHandle>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: Mutex<HashMap<JobId, RegistryEntry>>,
    stop_generation: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job before any of its processes exist.
    pub fn track(&self, summary: JobSummary) -> JobTicket {
        let cancellation = JobCancellation::default();
        let job_id = summary.id.clone();
        // Read under the lock so a concurrent cancel_all either sees this entry or bumps past it
        let mut entries = self.entries.lock();
        let generation = self.stop_generation.load(Ordering::SeqCst);
        entries.insert(
            job_id.clone(),
            RegistryEntry {
                summary,
                cancellation: cancellation.clone(),
                handle: None,
            },
        );
        drop(entries);

        debug!("Tracking job {}", job_id);
        JobTicket {
            job_id,
            cancellation,
            generation,
        }
    }

    /// Attach the live process of the job's next pass. A job that was cancelled
    /// while between passes gets its new process cancelled right away.
    pub fn register(&self, job_id: &str, handle: ProcessHandle) -> bool {
        let cancelled = {
            let mut entries = self.entries.lock();
            entries.get_mut(job_id).map(|entry| {
                entry.summary.current_pass += 1;
                entry.summary.pid = handle.pid();
                entry.handle = Some(handle.clone());
                entry.cancellation.is_cancelled()
            })
        };

        match cancelled {
            Some(cancelled) => {
                if cancelled {
                    handle.cancel();
                }
                true
            }
            None => {
                handle.cancel();
                false
            }
        }
    }

    /// Record the pid once the supervisor has spawned the process.
    pub fn update_pid(&self, job_id: &str, pid: Option<u32>) {
        if let Some(entry) = self.entries.lock().get_mut(job_id) {
            entry.summary.pid = pid;
        }
    }

    pub fn unregister(&self, job_id: &str) -> bool {
        let removed = self.entries.lock().remove(job_id).is_some();
        if removed {
            debug!("Unregistered job {}", job_id);
        }
        removed
    }

    /// Cancel one job. Returns false for unknown or already finished jobs.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let target = self
            .entries
            .lock()
            .get(job_id)
            .map(|entry| (entry.cancellation.clone(), entry.handle.clone()));

        match target {
            Some((cancellation, handle)) => {
                cancellation.cancel();
                if let Some(handle) = handle {
                    handle.cancel();
                }
                info!("Cancelled job {}", job_id);
                true
            }
            None => false,
        }
    }

    /// Raise the stop flag, then cancel every tracked job. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let targets: Vec<(JobId, JobCancellation, Option<ProcessHandle>)> = {
            let entries = self.entries.lock();
            self.stop_generation.fetch_add(1, Ordering::SeqCst);
            entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.cancellation.clone(), entry.handle.clone()))
                .collect()
        };

        for (job_id, cancellation, handle) in &targets {
            cancellation.cancel();
            if let Some(handle) = handle {
                info!("Stopping upscaler process {:?} of job {}", handle.pid(), job_id);
                handle.cancel();
            }
        }
        targets.len()
    }

    /// Whether `cancel_all` ran after a job observed `generation`.
    pub fn is_stop_requested(&self, generation: u64) -> bool {
        self.stop_generation.load(Ordering::SeqCst) != generation
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn active_jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.summary.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }
}
