//! Media probing and frame sampling via ffprobe/ffmpeg.

pub mod frames;
pub mod probe;

pub use frames::{Alignment, FrameSampler};
pub use probe::{MediaProber, SourceDescriptor};
