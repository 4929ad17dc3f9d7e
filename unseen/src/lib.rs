//! Live color-vision-deficiency preview with text contrast checks.
//!
//! Frames from a [`CaptureDevice`](capture::CaptureDevice) are run through a
//! [`VisionMode`](ie::VisionMode) simulation and published; every few frames
//! the text in them is located and graded against WCAG contrast.

pub mod capture;
pub mod config;
pub mod error;
pub mod inspect;
pub mod pipeline;
pub mod publish;
pub mod slot;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineSettings, PipelineState};
pub use publish::{Event, PublishedFrame, Snapshot, Status};
