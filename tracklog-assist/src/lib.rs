//! Tracklog Assist Library
//!
//! This library drives a labelling session frame by frame: it keeps the live
//! set of boxes for the current frame, advances them with an external
//! [`Tracker`], and lets operator edits override tracked boxes.

pub mod session;
pub mod tracker;

pub use session::{FrameUpdate, LabellingSession, LiveBox, SessionConfig};
pub use tracker::Tracker;

/// Result type for tracklog-assist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tracklog-assist operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Tracklog core error: {0}")]
    Core(#[from] tracklog_core::Error),

    #[error("Frame is {found_width}x{found_height}, session expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        found_width: u32,
        found_height: u32,
    },
}
