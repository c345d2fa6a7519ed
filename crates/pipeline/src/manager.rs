//! Process-wide job registry and lifecycle owner.
//!
//! The manager is the only shared mutable root: handlers receive it
//! explicitly, workers never see it. The registry lock guards membership
//! only; status reads go through each job's own cell, and no blocking I/O
//! ever happens under the registry lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gatewatch_core::counting::CountingConfig;
use gatewatch_core::Detector;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::FrameBroadcaster;
use crate::config::PipelineConfig;
use crate::control::{ControlChannel, ControlMsg};
use crate::error::PipelineError;
use crate::job::{JobDescriptor, JobKind};
use crate::source::SourceFactory;
use crate::status::{JobPhase, JobStatus, StatusCell};
use crate::store::EventWriter;
use crate::worker::JobWorker;

/// How often the retention sweeper wakes up, bounded by the retention
/// window itself so short retentions still expire promptly.
const SWEEP_INTERVAL_MAX: Duration = Duration::from_secs(60);

/// One registry entry: capability handles shared with the worker task.
#[derive(Clone)]
struct JobEntry {
    descriptor: JobDescriptor,
    status: Arc<StatusCell>,
    control: Arc<ControlChannel>,
    broadcaster: FrameBroadcaster,
    cancel: CancellationToken,
    abort: AbortHandle,
}

/// Registry listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub kind: JobKind,
    pub camera_id: String,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Registry of active and recently terminated jobs.
pub struct JobManager {
    cfg: Arc<PipelineConfig>,
    detector: Arc<dyn Detector>,
    store: Arc<EventWriter>,
    sources: Arc<SourceFactory>,
    jobs: Mutex<HashMap<String, JobEntry>>,
    sweeper_cancel: CancellationToken,
}

impl JobManager {
    /// Create the manager and spawn its retention sweeper.
    pub fn start(
        cfg: PipelineConfig,
        detector: Arc<dyn Detector>,
        store: EventWriter,
        sources: SourceFactory,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            cfg: Arc::new(cfg),
            detector,
            store: Arc::new(store),
            sources: Arc::new(sources),
            jobs: Mutex::new(HashMap::new()),
            sweeper_cancel: CancellationToken::new(),
        });

        let sweeper = Arc::clone(&manager);
        let cancel = manager.sweeper_cancel.clone();
        tokio::spawn(async move {
            sweeper.run_retention_sweeper(cancel).await;
        });

        manager
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Register and spawn a new job.
    ///
    /// Rejects when the concurrent-job cap is reached or when an RTSP job is
    /// already active for the same camera.
    pub fn submit(&self, descriptor: JobDescriptor) -> Result<String, PipelineError> {
        descriptor.validate()?;
        if descriptor.count_enabled {
            // Fail invalid counting setups at submission, not in the worker.
            CountingConfig::new(
                descriptor.line,
                self.cfg.crossing_threshold_px,
                self.cfg.reversal_policy,
            )?;
        }

        let mut jobs = self.jobs.lock();

        let active = jobs
            .values()
            .filter(|e| !e.status.phase().is_terminal())
            .count();
        if active >= self.cfg.max_concurrent_jobs {
            return Err(PipelineError::ResourceExhausted(self.cfg.max_concurrent_jobs));
        }

        if descriptor.kind == JobKind::RtspStream {
            let conflict = jobs.values().any(|e| {
                e.descriptor.kind == JobKind::RtspStream
                    && e.descriptor.camera_id == descriptor.camera_id
                    && !e.status.phase().is_terminal()
            });
            if conflict {
                return Err(PipelineError::AlreadyExists(descriptor.camera_id.clone()));
            }
        }

        let job_id = descriptor.job_id.clone();
        let status = Arc::new(StatusCell::new());
        let control = Arc::new(ControlChannel::new(self.cfg.control_queue_cap));
        let broadcaster = FrameBroadcaster::new();
        let cancel = CancellationToken::new();

        let worker = JobWorker {
            descriptor: descriptor.clone(),
            cfg: Arc::clone(&self.cfg),
            detector: Arc::clone(&self.detector),
            store: Arc::clone(&self.store),
            broadcaster: broadcaster.clone(),
            control: Arc::clone(&control),
            status: Arc::clone(&status),
            cancel: cancel.clone(),
            sources: Arc::clone(&self.sources),
        };
        let handle = tokio::spawn(worker.run());

        jobs.insert(
            job_id.clone(),
            JobEntry {
                descriptor,
                status,
                control,
                broadcaster,
                cancel,
                abort: handle.abort_handle(),
            },
        );

        tracing::info!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    fn entry(&self, job_id: &str) -> Result<JobEntry, PipelineError> {
        self.jobs
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))
    }

    /// Request a graceful stop and arm the force-stop watchdog.
    ///
    /// Returns immediately with the last status; termination is observable
    /// via [`status`](Self::status) or the broadcaster ending.
    pub fn stop(&self, job_id: &str) -> Result<JobStatus, PipelineError> {
        let entry = self.entry(job_id)?;
        let snapshot = entry.status.snapshot();
        if snapshot.phase.is_terminal() {
            return Ok(snapshot);
        }

        entry.control.push(ControlMsg::Stop);

        // Watchdog: a worker stuck in a hung decoder cannot observe the
        // control queue, so force-unblock it after the grace period.
        let grace = self.cfg.stop_grace;
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if entry.abort.is_finished() {
                return;
            }
            tracing::warn!(job_id = %job_id, "Worker ignored STOP, force-cancelling");
            entry.cancel.cancel();
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !entry.abort.is_finished() {
                entry.abort.abort();
                entry
                    .status
                    .set_terminal(JobPhase::Stopped, Some("force-stopped after grace period".into()));
                entry.broadcaster.close();
            }
        });

        Ok(snapshot)
    }

    pub fn pause(&self, job_id: &str) -> Result<(), PipelineError> {
        let entry = self.entry(job_id)?;
        let phase = entry.status.phase();
        if phase != JobPhase::Running {
            return Err(PipelineError::InvalidState { op: "pause", phase });
        }
        entry.control.push(ControlMsg::Pause);
        Ok(())
    }

    pub fn resume(&self, job_id: &str) -> Result<(), PipelineError> {
        let entry = self.entry(job_id)?;
        let phase = entry.status.phase();
        if phase != JobPhase::Paused {
            return Err(PipelineError::InvalidState { op: "resume", phase });
        }
        entry.control.push(ControlMsg::Resume);
        Ok(())
    }

    /// Enqueue a seek by a signed frame delta; applies on the worker's next
    /// iteration. File jobs only.
    pub fn seek(&self, job_id: &str, delta_frames: i64) -> Result<(), PipelineError> {
        let entry = self.entry(job_id)?;
        if entry.descriptor.kind != JobKind::FileVideo {
            return Err(PipelineError::InvalidKind("seek"));
        }
        let phase = entry.status.phase();
        if !matches!(phase, JobPhase::Running | JobPhase::Paused) {
            return Err(PipelineError::InvalidState { op: "seek", phase });
        }
        entry.control.push(ControlMsg::Seek(delta_frames));
        Ok(())
    }

    /// Coherent status snapshot.
    pub fn status(&self, job_id: &str) -> Result<JobStatus, PipelineError> {
        Ok(self.entry(job_id)?.status.snapshot())
    }

    pub fn descriptor(&self, job_id: &str) -> Result<JobDescriptor, PipelineError> {
        Ok(self.entry(job_id)?.descriptor)
    }

    /// Handle for subscribing to the job's annotated frames.
    pub fn broadcaster(&self, job_id: &str) -> Result<FrameBroadcaster, PipelineError> {
        Ok(self.entry(job_id)?.broadcaster)
    }

    /// All active plus recently terminated jobs.
    pub fn list(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.lock();
        let mut summaries: Vec<JobSummary> = jobs
            .values()
            .map(|e| JobSummary {
                job_id: e.descriptor.job_id.clone(),
                kind: e.descriptor.kind,
                camera_id: e.descriptor.camera_id.clone(),
                status: e.status.snapshot(),
            })
            .collect();
        summaries.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        summaries
    }

    async fn run_retention_sweeper(&self, cancel: CancellationToken) {
        let retention = self.cfg.job_retention;
        let period = retention.min(SWEEP_INTERVAL_MAX).max(Duration::from_millis(50));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let mut expired = Vec::new();
            {
                let mut jobs = self.jobs.lock();
                jobs.retain(|job_id, entry| {
                    let keep = match entry.status.snapshot().terminal_since {
                        Some(at) => at.elapsed() < retention,
                        None => true,
                    };
                    if !keep {
                        expired.push(job_id.clone());
                    }
                    keep
                });
            }
            for job_id in expired {
                tracing::info!(job_id = %job_id, "Expired terminated job from registry");
            }
        }
    }

    /// Drain: ask every active worker to stop, wait up to the drain budget,
    /// force-close the rest. Returns whether every job terminated
    /// gracefully (drives the process exit code).
    pub async fn shutdown(&self) -> bool {
        self.sweeper_cancel.cancel();

        let entries: Vec<JobEntry> = self.jobs.lock().values().cloned().collect();
        for entry in &entries {
            if !entry.status.phase().is_terminal() {
                entry.control.push(ControlMsg::Stop);
            }
        }

        let deadline = Instant::now() + self.cfg.drain_timeout;
        loop {
            if entries.iter().all(|e| e.abort.is_finished()) {
                tracing::info!(jobs = entries.len(), "All jobs drained");
                return true;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stragglers: Vec<&JobEntry> =
            entries.iter().filter(|e| !e.abort.is_finished()).collect();
        tracing::warn!(count = stragglers.len(), "Drain timed out, force-closing workers");
        for entry in &stragglers {
            entry.cancel.cancel();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        for entry in &stragglers {
            if !entry.abort.is_finished() {
                entry.abort.abort();
            }
            entry
                .status
                .set_terminal(JobPhase::Stopped, Some("forced shutdown".into()));
            entry.broadcaster.close();
        }
        false
    }
}
