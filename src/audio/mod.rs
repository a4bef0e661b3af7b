//! Audio helpers: reference-voice decoding and output post-processing.

pub mod postprocess;
pub mod wav;

pub use postprocess::post_process;
pub use wav::{AudioError, ReferenceVoice};
