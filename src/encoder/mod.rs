//! Transcode sessions driven through HandBrakeCLI.

pub mod batch;
pub mod handbrake;
pub mod interrupt;
pub mod performance;
pub mod policy;
pub mod session;

pub use batch::{BatchSummary, SessionBatch};
pub use interrupt::Cancellation;
pub use policy::{EncodeOverrides, EncodingParameters, ResolutionClass};
pub use session::{SessionState, TranscodeSession};
