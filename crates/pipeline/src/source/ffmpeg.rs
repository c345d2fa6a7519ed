//! FFmpeg/ffprobe-backed decoding.
//!
//! Media is probed with `ffprobe -print_format json` and decoded by an
//! `ffmpeg` child process writing tightly packed rgb24 frames to stdout.
//! Seeking restarts the decoder at the target position; RTSP inputs use TCP
//! transport and a read timeout so a dead camera surfaces as an error
//! instead of a hang.

use std::process::Stdio;
use std::time::Duration;

use gatewatch_core::Frame;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::PipelineError;
use crate::status::StreamProperties;

/// Patience for a single frame read before the source counts as gone.
const READ_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    r_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
    }
    s.parse::<f64>().unwrap_or(0.0)
}

fn parse_duration(probe: &FfprobeOutput) -> f64 {
    if let Some(d) = &probe.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    if let Some(stream) = first_video_stream(probe) {
        if let Some(d) = &stream.duration {
            if let Ok(secs) = d.parse::<f64>() {
                return secs;
            }
        }
    }
    0.0
}

fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Total frames from `nb_frames`, falling back to duration * framerate.
fn parse_total_frames(probe: &FfprobeOutput) -> Option<u64> {
    if let Some(stream) = first_video_stream(probe) {
        if let Some(nb) = &stream.nb_frames {
            if let Ok(n) = nb.parse::<u64>() {
                return Some(n);
            }
        }
    }
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return Some((duration * fps).round() as u64);
    }
    None
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Run ffprobe against a file path or RTSP URL and return the stream
/// properties. Used both when opening a source and by the pre-flight
/// `/rtsp/test` endpoint.
pub async fn probe_source(source: &str, rtsp: bool) -> Result<StreamProperties, PipelineError> {
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
    if rtsp {
        cmd.args(["-rtsp_transport", "tcp"]);
    }
    cmd.arg(source);
    cmd.stdin(Stdio::null());

    let probing = cmd.output();
    let output = tokio::time::timeout(READ_TIMEOUT, probing)
        .await
        .map_err(|_| PipelineError::SourceUnavailable(format!("probe timed out: {source}")))?
        .map_err(|e| PipelineError::SourceUnavailable(format!("ffprobe not runnable: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::SourceUnavailable(format!(
            "ffprobe failed for {source}: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let probe: FfprobeOutput = serde_json::from_str(&stdout)
        .map_err(|e| PipelineError::SourceUnavailable(format!("unparseable probe output: {e}")))?;

    let video = first_video_stream(&probe).ok_or_else(|| {
        PipelineError::SourceUnavailable(format!("no video stream in {source}"))
    })?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(PipelineError::SourceUnavailable(format!(
                "missing dimensions for {source}"
            )))
        }
    };

    Ok(StreamProperties {
        width,
        height,
        fps: parse_framerate(&probe),
        total_frames: if rtsp { None } else { parse_total_frames(&probe) },
    })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// An owned ffmpeg decoder process.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    props: StreamProperties,
    source: String,
    rtsp: bool,
    frame_len: usize,
    next_index: u64,
}

impl FfmpegSource {
    pub async fn open_file(path: &str) -> Result<Self, PipelineError> {
        let props = probe_source(path, false).await?;
        Self::spawn(path.to_string(), false, props, 0).await
    }

    pub async fn open_rtsp(url: &str) -> Result<Self, PipelineError> {
        let props = probe_source(url, true).await?;
        Self::spawn(url.to_string(), true, props, 0).await
    }

    async fn spawn(
        source: String,
        rtsp: bool,
        props: StreamProperties,
        start_frame: u64,
    ) -> Result<Self, PipelineError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-nostdin", "-loglevel", "error"]);
        if rtsp {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        if start_frame > 0 && props.fps > 0.0 {
            // Keyframe-accurate fast seek; close enough for preview scrubbing.
            cmd.args(["-ss", &format!("{:.3}", start_frame as f64 / props.fps)]);
        }
        cmd.args(["-i", &source]);
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::SourceUnavailable(format!("ffmpeg not runnable: {e}")))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::SourceUnavailable("ffmpeg stdout not captured".into())
        })?;

        let frame_len = props.width as usize * props.height as usize * 3;
        Ok(Self {
            child,
            stdout,
            props,
            source,
            rtsp,
            frame_len,
            next_index: start_frame,
        })
    }

    pub fn properties(&self) -> &StreamProperties {
        &self.props
    }

    /// Read one rgb24 frame. `Ok(None)` on clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let mut buf = vec![0u8; self.frame_len];
        let read = tokio::time::timeout(READ_TIMEOUT, self.stdout.read_exact(&mut buf)).await;
        match read {
            Ok(Ok(_)) => {
                let index = self.next_index;
                self.next_index += 1;
                let frame = Frame::from_rgb24(
                    index,
                    self.props.width,
                    self.props.height,
                    buf,
                    chrono::Utc::now(),
                )?;
                Ok(Some(frame))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if self.rtsp {
                    // A live stream has no EOF; the connection dropped.
                    Err(PipelineError::SourceUnavailable(format!(
                        "stream closed: {}",
                        self.source
                    )))
                } else {
                    Ok(None)
                }
            }
            Ok(Err(e)) => Err(PipelineError::SourceUnavailable(format!(
                "decode read failed: {e}"
            ))),
            Err(_) => Err(PipelineError::SourceUnavailable(format!(
                "no frame within {}s from {}",
                READ_TIMEOUT.as_secs(),
                self.source
            ))),
        }
    }

    /// Seek by a signed frame delta: restart the decoder at the clamped
    /// target position. Returns the new frame index.
    pub async fn seek_by(&mut self, delta: i64) -> Result<u64, PipelineError> {
        let total = self.props.total_frames;
        let mut target = self.next_index as i64 + delta;
        if target < 0 {
            target = 0;
        }
        if let Some(total) = total {
            target = target.min(total.saturating_sub(1) as i64);
        }

        self.close().await;
        let replacement = Self::spawn(
            self.source.clone(),
            self.rtsp,
            self.props.clone(),
            target as u64,
        )
        .await?;
        *self = replacement;
        Ok(self.next_index)
    }

    pub fn resume_from(&mut self, index: u64) {
        self.next_index = index;
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "ffmpeg already gone on close");
        }
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(
        nb_frames: Option<&str>,
        duration: Option<&str>,
        r_frame_rate: Option<&str>,
    ) -> FfprobeOutput {
        FfprobeOutput {
            streams: vec![FfprobeStream {
                codec_type: Some("video".into()),
                width: Some(1920),
                height: Some(1080),
                r_frame_rate: r_frame_rate.map(String::from),
                duration: None,
                nb_frames: nb_frames.map(String::from),
            }],
            format: FfprobeFormat {
                duration: duration.map(String::from),
            },
        }
    }

    #[test]
    fn fraction_standard() {
        assert!((parse_fraction("30/1") - 30.0).abs() < 0.001);
    }

    #[test]
    fn fraction_ntsc() {
        assert!((parse_fraction("24000/1001") - 23.976).abs() < 0.01);
    }

    #[test]
    fn fraction_plain_number() {
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
    }

    #[test]
    fn fraction_zero_denominator() {
        assert_eq!(parse_fraction("30/0"), 0.0);
    }

    #[test]
    fn total_frames_from_nb_frames() {
        let probe = probe_with(Some("300"), Some("10.0"), Some("30/1"));
        assert_eq!(parse_total_frames(&probe), Some(300));
    }

    #[test]
    fn total_frames_estimated_from_duration() {
        let probe = probe_with(None, Some("10.0"), Some("30/1"));
        assert_eq!(parse_total_frames(&probe), Some(300));
    }

    #[test]
    fn total_frames_unknown_without_metadata() {
        let probe = probe_with(None, None, None);
        assert_eq!(parse_total_frames(&probe), None);
    }

    #[test]
    fn framerate_parsed_from_stream() {
        let probe = probe_with(None, None, Some("24000/1001"));
        assert!((parse_framerate(&probe) - 23.976).abs() < 0.01);
    }
}
