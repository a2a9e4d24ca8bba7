//! Flat fixed-record export of an event log
//!
//! Every non-delete event becomes one record holding the full geometry of
//! its object at that time. Deletes produce no record but still close the
//! object for the rest of the log.

use crate::codec::ProtocolState;
use crate::event::is_ignored_line;
use crate::{Error, Event, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufRead, Read, Write};
use tracing::warn;

/// Magic bytes for record files: "TLB\0"
const MAGIC: [u8; 4] = [b'T', b'L', b'B', 0];

/// Current record file version
const VERSION: u16 = 1;

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 36;

/// One box update
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatRecord {
    /// Timestamp in microseconds
    pub t: u64,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: u32,
    /// Object id; repeats once per update of the object
    pub track_id: u32,
    pub class_confidence: f32,
}

impl FlatRecord {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            t: reader.read_u64::<LittleEndian>()?,
            x: reader.read_f32::<LittleEndian>()?,
            y: reader.read_f32::<LittleEndian>()?,
            w: reader.read_f32::<LittleEndian>()?,
            h: reader.read_f32::<LittleEndian>()?,
            class_id: reader.read_u32::<LittleEndian>()?,
            track_id: reader.read_u32::<LittleEndian>()?,
            class_confidence: reader.read_f32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.t)?;
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.w)?;
        writer.write_f32::<LittleEndian>(self.h)?;
        writer.write_u32::<LittleEndian>(self.class_id)?;
        writer.write_u32::<LittleEndian>(self.track_id)?;
        writer.write_f32::<LittleEndian>(self.class_confidence)?;
        Ok(())
    }
}

/// Records flattened from an event log
#[derive(Debug, Clone, Default)]
pub struct RecordExport {
    /// Records in file order
    pub records: Vec<FlatRecord>,
    /// Objects never closed by a `BB_DELETE`
    pub open_tracks: Vec<u32>,
}

impl RecordExport {
    /// Flattens an event log read from `reader`.
    ///
    /// Protocol errors are fatal; objects left open at the end are only
    /// reported in [`RecordExport::open_tracks`].
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut state = ProtocolState::default();
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;
            if is_ignored_line(&line) {
                continue;
            }

            let event = Event::parse_line(&line, line_number)?;
            if let Some(applied) = state.apply(&event, line_number)? {
                records.push(FlatRecord {
                    t: event.timestamp,
                    x: applied.bbox.x as f32,
                    y: applied.bbox.y as f32,
                    w: applied.bbox.width as f32,
                    h: applied.bbox.height as f32,
                    class_id: applied.class_id,
                    track_id: event.object_id,
                    class_confidence: applied.confidence as f32,
                });
            }
        }

        let open_tracks = state.open_objects();
        if !open_tracks.is_empty() {
            warn!(?open_tracks, "some boxes were created but never deleted");
        }

        Ok(Self {
            records,
            open_tracks,
        })
    }
}

/// Binary file of fixed-size records
#[derive(Debug, Clone)]
pub struct RecordFile {
    /// Format version
    pub version: u16,
    /// Records in file order
    pub records: Vec<FlatRecord>,
}

impl RecordFile {
    /// Creates a record file at the current version
    pub fn new(records: Vec<FlatRecord>) -> Self {
        Self {
            version: VERSION,
            records,
        }
    }

    /// Reads a record file from a reader
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let count = reader.read_u32::<LittleEndian>()?;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(FlatRecord::read(&mut reader)?);
        }

        Ok(Self { version, records })
    }

    /// Writes the record file to a writer
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(record_count(self.records.len())?)?;
        for record in &self.records {
            record.write(&mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn record_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TooManyRecords(len))
}
