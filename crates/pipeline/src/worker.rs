//! The per-job worker: one long-lived task driving
//! decode -> detect -> track -> count -> annotate -> broadcast -> persist.
//!
//! Control commands are observed only at iteration boundaries; nothing
//! preempts an iteration. Every terminal path releases the decoder, flushes
//! and closes the encoder, closes the broadcaster, and freezes the status
//! snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gatewatch_core::annotate::{annotate_frame, encode_jpeg, CountOverlay};
use gatewatch_core::counting::{CountingConfig, LineCounter};
use gatewatch_core::tracker::{MultiObjectTracker, Track};
use gatewatch_core::{Detection, Detector, DetectorError, Frame};
use gatewatch_db::models::completion::NewCompletion;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{FrameBroadcaster, FrameMeta, JpegFrame};
use crate::config::PipelineConfig;
use crate::control::{ControlChannel, ControlMsg};
use crate::encoder::EncoderSink;
use crate::error::PipelineError;
use crate::job::{JobDescriptor, JobKind};
use crate::source::{FrameSource, SourceFactory};
use crate::status::{JobPhase, StatusCell};
use crate::store::EventWriter;

/// Consecutive twice-failed frames before the detector error becomes fatal.
const DETECTOR_FAILURE_LIMIT: u32 = 30;

/// EWMA weight of the newest instantaneous frame rate.
const FPS_EWMA_ALPHA: f64 = 0.1;

enum ControlOutcome {
    Continue,
    Stop,
}

enum ReconnectOutcome {
    Recovered,
    Stopped,
}

/// Everything a worker needs, and nothing more: capability handles only, no
/// reference back to the manager.
pub(crate) struct JobWorker {
    pub(crate) descriptor: JobDescriptor,
    pub(crate) cfg: Arc<PipelineConfig>,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) store: Arc<EventWriter>,
    pub(crate) broadcaster: FrameBroadcaster,
    pub(crate) control: Arc<ControlChannel>,
    pub(crate) status: Arc<StatusCell>,
    pub(crate) cancel: CancellationToken,
    pub(crate) sources: Arc<SourceFactory>,
}

impl JobWorker {
    /// Run the job to a terminal phase, then release everything.
    pub(crate) async fn run(mut self) {
        let job_id = self.descriptor.job_id.clone();
        let (phase, error, objects) = match self.process().await {
            Ok((phase, objects)) => {
                tracing::info!(job_id = %job_id, phase = ?phase, "Job finished");
                (phase, None, objects)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                (JobPhase::Failed, Some(e.to_string()), 0)
            }
        };

        self.broadcaster.close();
        self.status.set_terminal(phase, error);

        let snapshot = self.status.snapshot();
        let completion = NewCompletion {
            file_type: self.descriptor.kind.file_type().to_string(),
            file_name: self.output_name(),
            object_count: objects as i64,
            entry_count: snapshot.entry_count as i64,
            exit_count: snapshot.exit_count as i64,
            net_count: snapshot.net_count,
        };
        if let Err(e) = self.store.record_completion(&completion).await {
            tracing::warn!(job_id = %job_id, error = %e, "Completion record failed");
        }
    }

    fn output_name(&self) -> String {
        self.descriptor
            .output_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.descriptor.source.clone())
    }

    /// Open resources, run the loop, release resources.
    async fn process(&mut self) -> Result<(JobPhase, u64), PipelineError> {
        let mut source = self.sources.open(&self.descriptor).await?;
        let props = source.properties().clone();
        let is_file = self.descriptor.kind == JobKind::FileVideo;
        self.status.update(|s| {
            s.phase = JobPhase::Running;
            s.stream_properties = Some(props.clone());
            if is_file {
                s.progress = Some(0.0);
            }
        });
        tracing::info!(
            job_id = %self.descriptor.job_id,
            width = props.width,
            height = props.height,
            fps = props.fps,
            "Source opened",
        );

        let mut encoder = None;
        if is_file {
            if let Some(path) = self.descriptor.output_path.clone() {
                match self.sources.open_encoder(&path, &props).await {
                    Ok(enc) => encoder = Some(enc),
                    Err(e) => {
                        source.close().await;
                        return Err(e);
                    }
                }
            }
        }

        let mut tracker = MultiObjectTracker::new(self.cfg.tracker_config());
        let mut counter = if self.descriptor.count_enabled {
            let counting = CountingConfig::new(
                self.descriptor.line,
                self.cfg.crossing_threshold_px,
                self.cfg.reversal_policy,
            );
            match counting {
                Ok(cfg) => Some(LineCounter::new(cfg, &self.descriptor.camera_id)),
                Err(e) => {
                    if let Some(enc) = encoder.take() {
                        enc.abort().await;
                    }
                    source.close().await;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let outcome = self
            .run_loop(&mut source, encoder.as_mut(), &mut tracker, counter.as_mut())
            .await;

        match &outcome {
            Ok(_) => {
                if let Some(enc) = encoder.take() {
                    if let Err(e) = enc.finish().await {
                        tracing::warn!(
                            job_id = %self.descriptor.job_id,
                            error = %e,
                            "Encoder flush failed",
                        );
                    }
                }
            }
            Err(_) => {
                if let Some(enc) = encoder.take() {
                    enc.abort().await;
                }
            }
        }
        source.close().await;

        outcome.map(|phase| (phase, tracker.ids_issued()))
    }

    async fn run_loop(
        &mut self,
        source: &mut FrameSource,
        mut encoder: Option<&mut EncoderSink>,
        tracker: &mut MultiObjectTracker,
        mut counter: Option<&mut LineCounter>,
    ) -> Result<JobPhase, PipelineError> {
        let started = Instant::now();
        let is_file = self.descriptor.kind == JobKind::FileVideo;
        let total_frames = source.properties().total_frames;
        let fps_cap = self.effective_fps_cap();
        let frame_interval = (fps_cap > 0.0).then(|| Duration::from_secs_f64(1.0 / fps_cap));

        let mut paused = false;
        let mut frames_in: u64 = 0;
        let mut frames_out: u64 = 0;
        let mut fps_ewma = 0.0f64;
        let mut last_frame_at: Option<Instant> = None;
        let mut next_deadline: Option<tokio::time::Instant> = None;
        let mut detector_failures: u32 = 0;

        loop {
            // Control is observed here and only here.
            while let Some(msg) = self.control.try_pop() {
                match self
                    .apply_control(msg, source, tracker, counter.as_deref_mut(), &mut paused)
                    .await?
                {
                    ControlOutcome::Continue => {}
                    ControlOutcome::Stop => return Ok(JobPhase::Stopped),
                }
            }
            if self.cancel.is_cancelled() {
                return Ok(JobPhase::Stopped);
            }

            if paused {
                if self.status.phase() != JobPhase::Paused {
                    self.status.update(|s| s.phase = JobPhase::Paused);
                    tracing::info!(job_id = %self.descriptor.job_id, "Job paused");
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(JobPhase::Stopped),
                    msg = self.control.recv() => {
                        match self
                            .apply_control(msg, source, tracker, counter.as_deref_mut(), &mut paused)
                            .await?
                        {
                            ControlOutcome::Continue => {}
                            ControlOutcome::Stop => return Ok(JobPhase::Stopped),
                        }
                    }
                }
                if !paused {
                    self.status.update(|s| s.phase = JobPhase::Running);
                    tracing::info!(job_id = %self.descriptor.job_id, "Job resumed");
                    // Pacing and rate measurement restart after a pause.
                    last_frame_at = None;
                    next_deadline = None;
                }
                continue;
            }

            let frame = match source.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(JobPhase::Completed),
                Err(e) => {
                    if self.descriptor.kind == JobKind::RtspStream {
                        match self.reconnect(source, e).await? {
                            ReconnectOutcome::Recovered => continue,
                            ReconnectOutcome::Stopped => return Ok(JobPhase::Stopped),
                        }
                    }
                    return Err(e);
                }
            };
            frames_in += 1;

            // Wall-clock pacing toward the fps cap. Drop-free: every frame
            // is still processed.
            if let Some(interval) = frame_interval {
                let now = tokio::time::Instant::now();
                let deadline = next_deadline.unwrap_or(now);
                if deadline > now {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(JobPhase::Stopped),
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                next_deadline = Some(deadline.max(now) + interval);
            }

            // Detect, retrying once; a frame that fails twice is dropped.
            let detections = match self.detect_with_retry(&frame) {
                Ok(d) => {
                    detector_failures = 0;
                    d
                }
                Err(e) => {
                    detector_failures += 1;
                    if detector_failures >= DETECTOR_FAILURE_LIMIT {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        job_id = %self.descriptor.job_id,
                        frame_index = frame.index,
                        error = %e,
                        "Detector failed twice, dropping frame",
                    );
                    self.status.update(|s| {
                        s.frames_in = frames_in;
                        s.last_frame_index = Some(frame.index);
                    });
                    continue;
                }
            };
            let detections: Vec<Detection> = detections
                .into_iter()
                .filter(|d| d.confidence >= self.cfg.min_det_conf)
                .filter(|d| self.cfg.target_class_id.is_none_or(|c| d.class_id == c))
                .collect();

            tracker.step(frame.index, &detections)?;
            let live: Vec<&Track> = tracker.tracks().iter().collect();
            let seen: Vec<&Track> = tracker.tracks_seen_at(frame.index).collect();

            let mut overlay = None;
            if let Some(counter) = counter.as_deref_mut() {
                let events =
                    counter.observe(frame.index, frame.width, frame.height, &live, frame.captured_at)?;
                for event in &events {
                    if let Err(e) = self.store.record_event(event, None).await {
                        tracing::error!(
                            job_id = %self.descriptor.job_id,
                            error = %e,
                            "Event lost: store and journal both failed",
                        );
                    }
                    tracing::info!(
                        job_id = %self.descriptor.job_id,
                        track_id = event.track_id,
                        direction = event.direction.as_str(),
                        frame_index = event.frame_index,
                        "Crossing counted",
                    );
                }
                let (entry, exit, net) = counter.counts();
                self.status.update(|s| {
                    s.entry_count = entry;
                    s.exit_count = exit;
                    s.net_count = net;
                });
                overlay = Some(CountOverlay {
                    entry,
                    exit,
                    net,
                });
            }

            let line = self.descriptor.count_enabled.then_some(self.descriptor.line);
            let annotated = annotate_frame(&frame, &seen, line.as_ref(), overlay);
            let jpeg = encode_jpeg(&annotated, self.cfg.jpeg_quality)?;

            frames_out += 1;
            self.broadcaster.publish(Arc::new(JpegFrame {
                bytes: jpeg,
                meta: FrameMeta {
                    sequence: frames_out,
                    frame_index: frame.index,
                    captured_at: frame.captured_at,
                },
            }));
            if let Some(enc) = encoder.as_deref_mut() {
                enc.write_frame(annotated.as_raw()).await?;
            }

            let now = Instant::now();
            if let Some(prev) = last_frame_at {
                let elapsed = now.duration_since(prev).as_secs_f64();
                if elapsed > 0.0 {
                    let instant = 1.0 / elapsed;
                    fps_ewma = if fps_ewma == 0.0 {
                        instant
                    } else {
                        (1.0 - FPS_EWMA_ALPHA) * fps_ewma + FPS_EWMA_ALPHA * instant
                    };
                }
            }
            last_frame_at = Some(now);

            let progress = total_frames
                .map(|t| if t == 0 { 1.0 } else { (frames_in as f64 / t as f64).min(1.0) });
            self.status.update(|s| {
                s.frames_in = frames_in;
                s.frames_out = frames_out;
                s.fps_measured = fps_ewma;
                s.uptime_s = started.elapsed().as_secs_f64();
                s.last_frame_index = Some(frame.index);
                if is_file {
                    s.progress = progress;
                }
            });
        }
    }

    async fn apply_control(
        &self,
        msg: ControlMsg,
        source: &mut FrameSource,
        tracker: &mut MultiObjectTracker,
        counter: Option<&mut LineCounter>,
        paused: &mut bool,
    ) -> Result<ControlOutcome, PipelineError> {
        match msg {
            ControlMsg::Pause => {
                *paused = true;
                Ok(ControlOutcome::Continue)
            }
            ControlMsg::Resume => {
                *paused = false;
                Ok(ControlOutcome::Continue)
            }
            ControlMsg::Stop => {
                tracing::info!(job_id = %self.descriptor.job_id, "Stop observed");
                Ok(ControlOutcome::Stop)
            }
            ControlMsg::Seek(delta) => {
                if self.descriptor.kind != JobKind::FileVideo {
                    tracing::debug!(job_id = %self.descriptor.job_id, "Seek ignored for stream job");
                    return Ok(ControlOutcome::Continue);
                }
                let index = source.seek_by(delta).await?;
                // Track state cannot survive a discontinuity; counts do.
                tracker.reset();
                if let Some(counter) = counter {
                    counter.reset_tracks();
                }
                self.status.update(|s| s.last_frame_index = Some(index));
                tracing::info!(
                    job_id = %self.descriptor.job_id,
                    delta,
                    new_index = index,
                    "Seek applied",
                );
                Ok(ControlOutcome::Continue)
            }
        }
    }

    /// Reconnect an RTSP source after a read failure, keeping frame indices
    /// monotonic across the gap.
    async fn reconnect(
        &self,
        source: &mut FrameSource,
        cause: PipelineError,
    ) -> Result<ReconnectOutcome, PipelineError> {
        let attempts = self.cfg.rtsp_reconnect_attempts;
        tracing::warn!(
            job_id = %self.descriptor.job_id,
            error = %cause,
            "Stream read failed, reconnecting",
        );
        let resume_at = self
            .status
            .snapshot()
            .last_frame_index
            .map(|i| i + 1)
            .unwrap_or(0);

        for attempt in 1..=attempts {
            source.close().await;
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(ReconnectOutcome::Stopped),
                () = tokio::time::sleep(self.cfg.rtsp_reconnect_delay) => {}
            }
            match self.sources.open(&self.descriptor).await {
                Ok(mut fresh) => {
                    fresh.resume_from(resume_at);
                    *source = fresh;
                    tracing::info!(
                        job_id = %self.descriptor.job_id,
                        attempt,
                        "Reconnected to stream",
                    );
                    return Ok(ReconnectOutcome::Recovered);
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %self.descriptor.job_id,
                        attempt,
                        error = %e,
                        "Reconnect attempt failed",
                    );
                }
            }
        }

        Err(PipelineError::SourceUnavailable(format!(
            "reconnect failed after {attempts} attempts: {cause}"
        )))
    }

    fn detect_with_retry(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        match self.detector.detect(frame) {
            Ok(detections) => Ok(detections),
            Err(first) => {
                tracing::debug!(
                    job_id = %self.descriptor.job_id,
                    error = %first,
                    "Detector failed, retrying once",
                );
                self.detector.detect(frame)
            }
        }
    }

    fn effective_fps_cap(&self) -> f64 {
        if self.descriptor.fps_cap > 0.0 {
            self.descriptor.fps_cap
        } else if self.descriptor.kind == JobKind::RtspStream {
            self.cfg.rtsp_fps_cap
        } else {
            0.0
        }
    }
}
