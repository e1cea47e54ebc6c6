//! # Audio Module
//!
//! Uploaded recordings are passed to the model as-is; this module only
//! inspects them for logging.

pub mod wav;

pub use wav::WavInfo;
