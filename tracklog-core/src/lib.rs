//! Tracklog Core Library
//!
//! This library provides the annotation state model for frame-by-frame box
//! labelling: box geometry, the sparse per-timestamp timeline store, and the
//! diff-encoded text event log (`BB_CREATE`, `BB_MOVE`, ...) used to persist it.

pub mod codec;
pub mod event;
pub mod export;
pub mod geometry;
pub mod record;
pub mod timeline;

pub use codec::{count_objects, read_events, write_events, DecodeOptions, EncodeOptions};
pub use event::{Command, CommandKind, Event};
pub use export::{FlatRecord, RecordExport, RecordFile};
pub use geometry::{Anchor, BoundingBox};
pub use record::{BoxInfo, LabelledBox, DEFAULT_CONFIDENCE};
pub use timeline::{Frame, RenameOutcome, Timestep, TimelineStore};

/// Result type for tracklog-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tracklog-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: object {object_id} has no open BB_CREATE")]
    UnknownObject { line: usize, object_id: u32 },

    #[error("line {line}: object {object_id} is already open")]
    DuplicateObject { line: usize, object_id: u32 },

    #[error("Invalid timestep: {0}")]
    InvalidTimestep(String),

    #[error("Invalid magic bytes, expected 'TLB\\0'")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Too many records for one file: {0}")]
    TooManyRecords(usize),
}

impl Error {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}
