//! Sparse timestamp → object → record store
//!
//! The store is the single source of truth of a labelling session. Frames are
//! keyed by timestamp; most edits that propagate across frames walk the
//! timeline in steps of one [`Timestep`] and stop at the first gap.

use crate::{BoxInfo, Error, LabelledBox, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Boxes of a single frame, keyed by object id
pub type Frame = BTreeMap<u32, BoxInfo>;

/// Fixed distance between two consecutive frames, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestep(u64);

impl Timestep {
    /// Frame rate used when none is given
    pub const DEFAULT_FPS: u32 = 200;

    /// Creates a timestep from a duration in microseconds
    pub fn new(micros: u64) -> Result<Self> {
        if micros == 0 {
            return Err(Error::InvalidTimestep("timestep must be positive".into()));
        }
        Ok(Self(micros))
    }

    /// Derives the timestep from a frame rate: `1_000_000 / fps` microseconds
    pub fn from_fps(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(Error::InvalidTimestep("frame rate must be positive".into()));
        }
        Self::new(1_000_000 / fps as u64).map_err(|_| {
            Error::InvalidTimestep(format!(
                "frame rate {} gives a zero microsecond timestep",
                fps
            ))
        })
    }

    /// Returns the timestep in microseconds
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Timestamp of a 0-based frame index
    pub fn frame_timestamp(self, frame_index: u64) -> Result<u64> {
        frame_index
            .checked_add(1)
            .and_then(|frames| frames.checked_mul(self.0))
            .ok_or_else(|| {
                Error::InvalidTimestep(format!("frame {} is out of timestamp range", frame_index))
            })
    }
}

impl Default for Timestep {
    fn default() -> Self {
        Self(1_000_000 / Self::DEFAULT_FPS as u64)
    }
}

/// Result of an object renaming request
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The contiguous run was renamed; `frames` entries were moved
    Renamed { frames: usize },
    /// The target id is already used by another object in that frame;
    /// nothing was changed
    Collision,
}

/// Timeline of box records for a whole sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineStore {
    frames: BTreeMap<u64, Frame>,
    next_object_id: u32,
}

impl TimelineStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames, including empty ones
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the store holds no frame at all
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Gets the frame recorded at a timestamp
    pub fn frame(&self, timestamp: u64) -> Option<&Frame> {
        self.frames.get(&timestamp)
    }

    /// Gets the frame at a timestamp, creating an empty one if needed
    pub fn frame_mut_or_insert(&mut self, timestamp: u64) -> &mut Frame {
        self.frames.entry(timestamp).or_default()
    }

    /// Gets the record of an object at a timestamp
    pub fn get(&self, timestamp: u64, object_id: u32) -> Option<&BoxInfo> {
        self.frames.get(&timestamp)?.get(&object_id)
    }

    /// Gets a mutable record of an object at a timestamp
    pub fn get_mut(&mut self, timestamp: u64, object_id: u32) -> Option<&mut BoxInfo> {
        self.frames.get_mut(&timestamp)?.get_mut(&object_id)
    }

    /// Iterates frames in ascending timestamp order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Frame)> {
        self.frames.iter().map(|(ts, frame)| (*ts, frame))
    }

    /// All timestamps, ascending
    pub fn timestamps(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.keys().copied()
    }

    /// Every object id present anywhere in the timeline
    pub fn object_ids(&self) -> BTreeSet<u32> {
        self.frames
            .values()
            .flat_map(|frame| frame.keys().copied())
            .collect()
    }

    /// Timestamps at which an object has a record
    pub fn occurrences(&self, object_id: u32) -> Vec<u64> {
        self.frames
            .iter()
            .filter(|(_, frame)| frame.contains_key(&object_id))
            .map(|(ts, _)| *ts)
            .collect()
    }

    /// Inserts or replaces a single record
    pub fn insert(&mut self, timestamp: u64, object_id: u32, info: BoxInfo) {
        self.reserve_object_id(object_id);
        self.frame_mut_or_insert(timestamp).insert(object_id, info);
    }

    /// Overwrites the whole frame at `timestamp` with the given boxes.
    ///
    /// An empty iterator leaves an explicit empty frame behind, which the
    /// encoder turns into a scene clear.
    pub fn snapshot<I>(&mut self, timestamp: u64, boxes: I)
    where
        I: IntoIterator<Item = LabelledBox>,
    {
        let frame: Frame = boxes
            .into_iter()
            .map(|labelled| (labelled.object_id, labelled.info))
            .collect();
        if let Some(max_id) = frame.keys().next_back() {
            self.reserve_object_id(*max_id);
        }
        self.frames.insert(timestamp, frame);
    }

    /// First id that no object in the store uses
    pub fn next_object_id(&self) -> u32 {
        self.next_object_id
    }

    /// Hands out a fresh object id
    pub fn allocate_object_id(&mut self) -> u32 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    /// Makes sure the id generator never hands out `object_id` again
    pub fn reserve_object_id(&mut self, object_id: u32) {
        if object_id >= self.next_object_id {
            self.next_object_id = object_id + 1;
        }
    }

    /// Prunes the live set for the frame at `timestamp` and returns the
    /// manually created records stored there, which the caller merges back
    /// into the live set once tracked boxes have been advanced.
    ///
    /// A live box is dropped when a manual record at this timestamp overrides
    /// its id, when the stored record for its id has expired, or when its own
    /// end of track has been reached.
    pub fn reconcile_frame<T>(&mut self, timestamp: u64, live: &mut Vec<T>) -> Vec<LabelledBox>
    where
        T: AsRef<LabelledBox>,
    {
        let frame = self.frame_mut_or_insert(timestamp);

        let overridden: BTreeSet<u32> = frame
            .iter()
            .filter(|(_, info)| info.manually_created || info.is_expired_at(timestamp))
            .map(|(id, _)| *id)
            .collect();

        live.retain(|item| {
            let labelled = item.as_ref();
            !overridden.contains(&labelled.object_id) && !labelled.info.is_expired_at(timestamp)
        });

        frame
            .iter()
            .filter(|(_, info)| info.manually_created && !info.is_expired_at(timestamp))
            .map(|(id, info)| LabelledBox::new(*id, info.clone()))
            .collect()
    }

    /// Renames the contiguous run of `old_id` around `timestamp` to `new_id`.
    ///
    /// The walk goes backward and forward in steps of `timestep` and stops at
    /// the first frame that is missing or does not contain `old_id`. Other
    /// occurrences of `old_id`, past a gap, are left alone.
    pub fn rename_object(
        &mut self,
        old_id: u32,
        new_id: u32,
        timestamp: u64,
        timestep: Timestep,
    ) -> RenameOutcome {
        if old_id == new_id {
            return RenameOutcome::Renamed { frames: 0 };
        }
        if self
            .frame(timestamp)
            .is_some_and(|frame| frame.contains_key(&new_id))
        {
            debug!(old_id, new_id, timestamp, "rename refused, id already in frame");
            return RenameOutcome::Collision;
        }

        let mut run = self.run_before(old_id, timestamp, timestep);
        if self.get(timestamp, old_id).is_some() {
            run.push(timestamp);
        }
        run.extend(self.run_after(old_id, timestamp, timestep));

        for ts in &run {
            let Some(frame) = self.frames.get_mut(ts) else {
                continue;
            };
            if let Some(info) = frame.remove(&old_id) {
                if frame.insert(new_id, info).is_some() {
                    warn!(old_id, new_id, timestamp = *ts, "rename overwrote an existing record");
                }
            }
        }

        self.reserve_object_id(new_id);
        debug!(old_id, new_id, frames = run.len(), "renamed object");
        RenameOutcome::Renamed { frames: run.len() }
    }

    /// Sets the class of every occurrence of an object, across the whole
    /// timeline. Returns the number of records changed.
    pub fn rename_class(&mut self, object_id: u32, class_id: u32) -> usize {
        let mut changed = 0;
        for frame in self.frames.values_mut() {
            if let Some(info) = frame.get_mut(&object_id) {
                info.class_id = Some(class_id);
                changed += 1;
            }
        }
        debug!(object_id, class_id, changed, "changed object class");
        changed
    }

    /// Removes every occurrence of an object. Returns the number of records
    /// removed.
    pub fn purge_object(&mut self, object_id: u32) -> usize {
        let removed = self
            .frames
            .values_mut()
            .filter_map(|frame| frame.remove(&object_id))
            .count();
        info!(object_id, removed, "purged object");
        removed
    }

    /// Drops every occurrence of an object after `from_timestamp` and reopens
    /// the track (clears the end of track) on the remaining ones, so that its
    /// future can be labelled again. Returns the number of records removed.
    pub fn expire_future(&mut self, object_id: u32, from_timestamp: u64) -> usize {
        let mut removed = 0;
        for (ts, frame) in self.frames.iter_mut() {
            if *ts > from_timestamp {
                if frame.remove(&object_id).is_some() {
                    removed += 1;
                }
            } else if let Some(info) = frame.get_mut(&object_id) {
                info.end_of_track = None;
            }
        }
        info!(object_id, from_timestamp, removed, "cleared future of object");
        removed
    }

    /// Ends the track of an object at `from_timestamp`.
    ///
    /// The contiguous run after `from_timestamp` is removed and the
    /// contiguous run up to and including it gets `end_of_track` set to
    /// `from_timestamp`. Returns the number of records removed.
    pub fn terminate_track(&mut self, object_id: u32, from_timestamp: u64, timestep: Timestep) -> usize {
        let future = self.run_after(object_id, from_timestamp, timestep);
        for ts in &future {
            if let Some(frame) = self.frames.get_mut(ts) {
                frame.remove(&object_id);
            }
        }

        let mut past = self.run_before(object_id, from_timestamp, timestep);
        past.push(from_timestamp);
        for ts in past {
            if let Some(info) = self.get_mut(ts, object_id) {
                info.end_of_track = Some(from_timestamp);
            }
        }

        info!(object_id, from_timestamp, removed = future.len(), "terminated track");
        future.len()
    }

    /// Contiguous timestamps before `timestamp` holding `object_id`,
    /// in ascending order
    fn run_before(&self, object_id: u32, timestamp: u64, timestep: Timestep) -> Vec<u64> {
        let mut run = Vec::new();
        let mut cursor = timestamp.checked_sub(timestep.as_micros());
        while let Some(ts) = cursor {
            if self.get(ts, object_id).is_none() {
                break;
            }
            run.push(ts);
            cursor = ts.checked_sub(timestep.as_micros());
        }
        run.reverse();
        run
    }

    /// Contiguous timestamps after `timestamp` holding `object_id`,
    /// in ascending order
    fn run_after(&self, object_id: u32, timestamp: u64, timestep: Timestep) -> Vec<u64> {
        let mut run = Vec::new();
        let mut cursor = timestamp.checked_add(timestep.as_micros());
        while let Some(ts) = cursor {
            if self.get(ts, object_id).is_none() {
                break;
            }
            run.push(ts);
            cursor = ts.checked_add(timestep.as_micros());
        }
        run
    }
}
