//! Page-side frame sampling: pull a frame, hash it on a blocking thread,
//! draw the preview and hand the fingerprint to the bridge.

pub mod controller;
pub mod loop_worker;
pub mod preview;
pub mod source;

pub use controller::CaptureController;
pub use loop_worker::{CaptureConfig, CaptureLoop, SharedSource};
pub use preview::{NoPreview, PngPreview, Preview, PreviewSink};
pub use source::{DirectorySource, FrameSource, PatternSource};
