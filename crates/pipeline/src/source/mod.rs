//! Frame sources: where decoded frames come from.
//!
//! Real media goes through an ffmpeg subprocess ([`ffmpeg::FfmpegSource`]);
//! tests and demos use a [`synthetic::SyntheticSource`] that fabricates
//! frames in memory. Both are driven through the [`FrameSource`] enum so the
//! worker does not care which one it holds.

pub mod ffmpeg;
pub mod synthetic;

use gatewatch_core::Frame;

use crate::error::PipelineError;
use crate::job::{JobDescriptor, JobKind};
use crate::status::StreamProperties;

pub use ffmpeg::probe_source;
pub use synthetic::SyntheticSpec;

/// An open, owned frame source. Closed on every terminal transition.
pub enum FrameSource {
    Ffmpeg(ffmpeg::FfmpegSource),
    Synthetic(synthetic::SyntheticSource),
}

impl FrameSource {
    pub fn properties(&self) -> &StreamProperties {
        match self {
            FrameSource::Ffmpeg(s) => s.properties(),
            FrameSource::Synthetic(s) => s.properties(),
        }
    }

    /// Read the next frame. `Ok(None)` means end of stream (files only).
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        match self {
            FrameSource::Ffmpeg(s) => s.read_frame().await,
            FrameSource::Synthetic(s) => s.read_frame().await,
        }
    }

    /// Seek by a signed number of frames. Returns the new frame index.
    pub async fn seek_by(&mut self, delta: i64) -> Result<u64, PipelineError> {
        match self {
            FrameSource::Ffmpeg(s) => s.seek_by(delta).await,
            FrameSource::Synthetic(s) => s.seek_by(delta),
        }
    }

    /// Continue numbering from `index` after a reconnect, so frame indices
    /// keep increasing across an RTSP drop.
    pub fn resume_from(&mut self, index: u64) {
        match self {
            FrameSource::Ffmpeg(s) => s.resume_from(index),
            FrameSource::Synthetic(s) => s.resume_from(index),
        }
    }

    /// Release the decoder and any underlying socket/process.
    pub async fn close(&mut self) {
        if let FrameSource::Ffmpeg(s) = self {
            s.close().await;
        }
    }
}

/// Opens sources for job descriptors.
///
/// The manager holds one factory for the whole process; tests swap in the
/// synthetic variant to run the full pipeline without ffmpeg or a camera.
pub enum SourceFactory {
    /// Decode real files and RTSP URLs with ffmpeg.
    Media,
    /// Fabricate frames in memory with the configured shape.
    Synthetic(SyntheticSpec),
}

impl SourceFactory {
    /// Open the output-video sink matching this factory's media backend.
    pub async fn open_encoder(
        &self,
        output: &std::path::Path,
        props: &StreamProperties,
    ) -> Result<crate::encoder::EncoderSink, PipelineError> {
        match self {
            SourceFactory::Media => {
                let encoder =
                    crate::encoder::VideoEncoder::spawn(output, props.width, props.height, props.fps)
                        .await?;
                Ok(crate::encoder::EncoderSink::Ffmpeg(encoder))
            }
            SourceFactory::Synthetic(_) => Ok(crate::encoder::EncoderSink::Discard),
        }
    }

    pub async fn open(&self, descriptor: &JobDescriptor) -> Result<FrameSource, PipelineError> {
        match self {
            SourceFactory::Media => match descriptor.kind {
                JobKind::FileVideo => {
                    let source = ffmpeg::FfmpegSource::open_file(&descriptor.source).await?;
                    Ok(FrameSource::Ffmpeg(source))
                }
                JobKind::RtspStream => {
                    let source = ffmpeg::FfmpegSource::open_rtsp(&descriptor.source).await?;
                    Ok(FrameSource::Ffmpeg(source))
                }
            },
            SourceFactory::Synthetic(spec) => {
                let endless = descriptor.kind == JobKind::RtspStream;
                Ok(FrameSource::Synthetic(synthetic::SyntheticSource::new(
                    spec.clone(),
                    endless,
                )))
            }
        }
    }
}
