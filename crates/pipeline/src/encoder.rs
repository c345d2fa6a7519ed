//! Annotated-output video encoding through an ffmpeg subprocess.
//!
//! The worker feeds raw rgb24 frames into ffmpeg's stdin; ffmpeg writes an
//! H.264 MP4. `finish` flushes and waits for the muxer so the output is
//! playable; an abandoned encoder is killed with the child process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::error::PipelineError;

/// Budget for ffmpeg to drain and finalize the container on `finish`.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// An owned ffmpeg encoder process.
pub struct VideoEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
}

impl VideoEncoder {
    pub async fn spawn(
        output: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Self, PipelineError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let fps = if fps > 0.0 { fps } else { 30.0 };

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{width}x{height}")])
            .args(["-r", &format!("{fps:.3}")])
            .args(["-i", "-"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::SourceUnavailable(format!("ffmpeg not runnable: {e}")))?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            frame_len: width as usize * height as usize * 3,
        })
    }

    /// Write one rgb24 frame.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), PipelineError> {
        if data.len() != self.frame_len {
            return Err(PipelineError::SourceUnavailable(format!(
                "encoder fed {} bytes, expected {}",
                data.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::SourceUnavailable("encoder already closed".into()))?;
        stdin
            .write_all(data)
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("encoder write failed: {e}")))
    }

    /// Close stdin and wait for ffmpeg to finalize the file.
    pub async fn finish(mut self) -> Result<(), PipelineError> {
        drop(self.stdin.take());
        let status = tokio::time::timeout(FLUSH_TIMEOUT, self.child.wait())
            .await
            .map_err(|_| PipelineError::SourceUnavailable("encoder flush timed out".into()))?
            .map_err(|e| PipelineError::SourceUnavailable(format!("encoder wait failed: {e}")))?;
        if !status.success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "encoder exited with {status}"
            )));
        }
        Ok(())
    }

    /// Kill the encoder without flushing (failure paths).
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "encoder already gone on abort");
        }
        let _ = self.child.wait().await;
    }
}

/// The worker's output-video sink. Real media encodes through ffmpeg; the
/// synthetic source pairs with a discarding sink so the full worker path
/// runs without an ffmpeg binary.
pub enum EncoderSink {
    Ffmpeg(VideoEncoder),
    Discard,
}

impl EncoderSink {
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), PipelineError> {
        match self {
            EncoderSink::Ffmpeg(enc) => enc.write_frame(data).await,
            EncoderSink::Discard => Ok(()),
        }
    }

    pub async fn finish(self) -> Result<(), PipelineError> {
        match self {
            EncoderSink::Ffmpeg(enc) => enc.finish().await,
            EncoderSink::Discard => Ok(()),
        }
    }

    pub async fn abort(self) {
        if let EncoderSink::Ffmpeg(enc) = self {
            enc.abort().await;
        }
    }
}
