//! The Gatewatch processing plane.
//!
//! One long-lived Tokio task per job drives
//! decode -> detect -> track -> count -> annotate -> broadcast -> persist,
//! while the [`JobManager`] owns lifecycle: submission, control commands,
//! status snapshots, retention of terminated jobs, and drain on shutdown.

pub mod broadcast;
pub mod config;
pub mod control;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod job;
pub mod manager;
pub mod source;
pub mod status;
pub mod store;
mod worker;

pub use broadcast::{FrameBroadcaster, FrameMeta, FrameSubscription, JpegFrame, NextFrame};
pub use config::PipelineConfig;
pub use control::ControlMsg;
pub use detector::{ScriptedDetector, SerialDetector};
pub use error::PipelineError;
pub use job::{JobDescriptor, JobKind};
pub use manager::{JobManager, JobSummary};
pub use source::{SourceFactory, SyntheticSpec};
pub use status::{JobPhase, JobStatus, StreamProperties};
pub use store::EventWriter;
