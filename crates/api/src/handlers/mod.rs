pub mod detect;
pub mod events;
pub mod jobs;
pub mod rtsp;
pub mod stream;
