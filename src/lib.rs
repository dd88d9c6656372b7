//! captionforge library
//!
//! Turns one photo or short video into three styled Instagram captions and a
//! fixed-size hashtag set: validate the upload, reduce it to a single frame,
//! classify its theme with a remote vision model, then generate captions and
//! hashtags concurrently with a Bedrock text model.
//!
//! The entry point is [`pipeline::Pipeline`]; the remote services sit behind
//! the [`vision::VisualClassifier`], [`generate::TextGenerator`] and
//! [`media::FrameExtractor`] traits so they can be swapped or mocked.

pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod logging;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod resilience;
pub mod vision;

pub use error::{CapabilityError, ErrorCategory, ProcessingError};
pub use output::FormattedOutput;
pub use pipeline::Pipeline;
