//! Event log encoding and decoding
//!
//! Encoding walks the timeline in timestamp order and emits, per object, the
//! narrowest command describing the change since the last emitted geometry.
//! Decoding replays the commands to rebuild absolute geometry and stamps the
//! end of track on the run of frames that precedes each `BB_DELETE`.

use crate::event::{is_ignored_line, COMMENT_PREFIX};
use crate::{
    BoundingBox, BoxInfo, Command, CommandKind, Error, Event, Result, Timestep, TimelineStore,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Emit a `BB_MOVE_AND_RESIZE` for an unchanged box instead of skipping it
    pub redundant: bool,
    /// Use `BB_MOVE` / `BB_RESIZE` when only one of position or size changed
    pub full_protocol: bool,
    /// Objects live until a `BB_DELETE` is written. When false every box is a
    /// one-shot detection deleted `expiry_delay` after its creation.
    pub tracked: bool,
    /// Offset of the synthetic `BB_DELETE` for untracked objects
    pub expiry_delay: u64,
    /// Class written for records without one
    pub default_class_id: u32,
    /// Comment block written before the first event
    pub header: Option<String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            redundant: true,
            full_protocol: false,
            tracked: true,
            expiry_delay: 100_000,
            default_class_id: 0,
            header: None,
        }
    }
}

/// Decoder configuration
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Frame step used to walk back when a track is deleted
    pub timestep: Timestep,
    /// Commands whose records end up in the store; `None` keeps all of them
    pub keep: Option<Vec<CommandKind>>,
}

impl DecodeOptions {
    /// Creates decode options keeping every command
    pub fn new(timestep: Timestep) -> Self {
        Self {
            timestep,
            keep: None,
        }
    }

    fn keeps(&self, kind: CommandKind) -> bool {
        self.keep.as_ref().map_or(true, |keep| keep.contains(&kind))
    }
}

/// Builds the event sequence describing the whole store
pub fn encode_events(store: &TimelineStore, options: &EncodeOptions) -> Vec<Event> {
    let mut events = Vec::new();
    let mut last_geometry: BTreeMap<u32, BoundingBox> = BTreeMap::new();
    // synthetic deletes of untracked objects, keyed by due timestamp
    let mut pending: BTreeMap<u64, BTreeSet<u32>> = BTreeMap::new();
    // end_of_track of the last visible record of each open object
    let mut track_ends: BTreeMap<u32, u64> = BTreeMap::new();

    for (timestamp, frame) in store.iter() {
        if !options.tracked {
            flush_pending(&mut pending, Some(timestamp), &mut events);
        }
        close_ended_tracks(
            &mut track_ends,
            &mut last_geometry,
            Some(timestamp),
            &mut events,
        );

        let visible: BTreeMap<u32, &BoxInfo> = frame
            .iter()
            .filter(|(_, info)| !info.is_expired_at(timestamp))
            .map(|(id, info)| (*id, info))
            .collect();

        if visible.is_empty() {
            for object_id in last_geometry.keys() {
                events.push(Event::delete(timestamp, *object_id));
            }
            last_geometry.clear();
            track_ends.clear();
            continue;
        }

        for (&object_id, info) in &visible {
            let bbox = info.bbox;
            match last_geometry.get(&object_id) {
                Some(previous) => {
                    if let Some(command) = diff_command(previous, &bbox, info.confidence, options) {
                        events.push(Event::new(timestamp, object_id, command));
                        last_geometry.insert(object_id, bbox);
                    }
                }
                None => {
                    if !options.tracked && cancel_pending(&mut pending, object_id) {
                        // recreated before its synthetic delete was due
                        events.push(Event::delete(timestamp, object_id));
                    }
                    events.push(Event::new(
                        timestamp,
                        object_id,
                        Command::Create {
                            class_id: info.class_id.unwrap_or(options.default_class_id),
                            bbox,
                            confidence: info.confidence,
                        },
                    ));
                    if options.tracked {
                        last_geometry.insert(object_id, bbox);
                    } else {
                        pending
                            .entry(timestamp + options.expiry_delay)
                            .or_default()
                            .insert(object_id);
                    }
                }
            }
            if last_geometry.contains_key(&object_id) {
                match info.end_of_track {
                    Some(end) => track_ends.insert(object_id, end),
                    None => track_ends.remove(&object_id),
                };
            }
        }

        let gone: Vec<u32> = last_geometry
            .keys()
            .filter(|id| !visible.contains_key(id))
            .copied()
            .collect();
        for object_id in gone {
            events.push(Event::delete(timestamp, object_id));
            last_geometry.remove(&object_id);
            track_ends.remove(&object_id);
        }
    }

    close_ended_tracks(&mut track_ends, &mut last_geometry, None, &mut events);
    flush_pending(&mut pending, None, &mut events);
    events
}

/// Writes the store as an event log. Returns the number of events written.
pub fn write_events<W: Write>(
    mut writer: W,
    store: &TimelineStore,
    options: &EncodeOptions,
) -> Result<usize> {
    if let Some(header) = &options.header {
        for line in header.lines() {
            if line.starts_with(COMMENT_PREFIX) {
                writeln!(writer, "{}", line)?;
            } else {
                writeln!(writer, "{} {}", COMMENT_PREFIX, line)?;
            }
        }
    }

    let events = encode_events(store, options);
    for event in &events {
        writeln!(writer, "{}", event)?;
    }
    writer.flush()?;

    debug!(events = events.len(), frames = store.len(), "wrote event log");
    Ok(events.len())
}

/// Reads an event log into a timeline store.
///
/// Fails on the first malformed line. Lines must be in non-decreasing
/// timestamp order for the end-of-track backfill to be right; the decoder
/// warns but does not sort.
pub fn read_events<R: BufRead>(reader: R, options: &DecodeOptions) -> Result<TimelineStore> {
    let mut state = ProtocolState::default();
    let mut store = TimelineStore::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if is_ignored_line(&line) {
            continue;
        }

        let event = Event::parse_line(&line, line_number)?;
        let applied = state.apply(&event, line_number)?;
        if !options.keeps(event.command.kind()) {
            continue;
        }

        match applied {
            Some(applied) => {
                let info = BoxInfo::new(applied.class_id, applied.bbox)
                    .with_confidence(applied.confidence);
                store.insert(event.timestamp, event.object_id, info);
            }
            None => {
                let stamped = backfill_end_of_track(
                    &mut store,
                    event.object_id,
                    event.timestamp,
                    options.timestep,
                );
                debug!(
                    object_id = event.object_id,
                    end_of_track = event.timestamp,
                    stamped,
                    "closed track"
                );
            }
        }
    }

    let open = state.open_objects();
    if !open.is_empty() {
        warn!(?open, "tracks still open at end of log");
    }
    Ok(store)
}

/// Number of distinct object ids created in an event log
pub fn count_objects<R: BufRead>(reader: R) -> Result<usize> {
    let mut created = BTreeSet::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if is_ignored_line(&line) {
            continue;
        }
        let event = Event::parse_line(&line, index + 1)?;
        if event.command.kind() == CommandKind::Create {
            created.insert(event.object_id);
        }
    }
    Ok(created.len())
}

/// Sets `end_of_track` on the contiguous run of records of `object_id`
/// ending one timestep before `end`. Returns the number of records stamped.
fn backfill_end_of_track(
    store: &mut TimelineStore,
    object_id: u32,
    end: u64,
    timestep: Timestep,
) -> usize {
    let mut stamped = 0;
    let mut cursor = end.checked_sub(timestep.as_micros());
    while let Some(ts) = cursor {
        match store.get_mut(ts, object_id) {
            Some(info) => {
                info.end_of_track = Some(end);
                stamped += 1;
            }
            None => break,
        }
        cursor = ts.checked_sub(timestep.as_micros());
    }
    stamped
}

fn diff_command(
    previous: &BoundingBox,
    current: &BoundingBox,
    confidence: f64,
    options: &EncodeOptions,
) -> Option<Command> {
    let moved = previous.position() != current.position();
    let resized = previous.size() != current.size();

    let move_and_resize = Command::MoveAndResize {
        bbox: *current,
        confidence,
    };
    match (moved, resized) {
        (true, false) if options.full_protocol => Some(Command::Move {
            x: current.x,
            y: current.y,
            confidence,
        }),
        (false, true) if options.full_protocol => Some(Command::Resize {
            width: current.width,
            height: current.height,
            confidence,
        }),
        (false, false) if !options.redundant => None,
        _ => Some(move_and_resize),
    }
}

/// Emits a `BB_DELETE` at the end of track of every open object whose track
/// ended before `until` (all of them for `None`), in timestamp order.
fn close_ended_tracks(
    track_ends: &mut BTreeMap<u32, u64>,
    last_geometry: &mut BTreeMap<u32, BoundingBox>,
    until: Option<u64>,
    events: &mut Vec<Event>,
) {
    let mut ended: Vec<(u64, u32)> = track_ends
        .iter()
        .filter(|(_, end)| until.map_or(true, |until| **end < until))
        .map(|(id, end)| (*end, *id))
        .collect();
    ended.sort_unstable();

    for (end, object_id) in ended {
        events.push(Event::delete(end, object_id));
        track_ends.remove(&object_id);
        last_geometry.remove(&object_id);
    }
}

/// Emits pending deletes due at or before `until` (all of them for `None`)
fn flush_pending(
    pending: &mut BTreeMap<u64, BTreeSet<u32>>,
    until: Option<u64>,
    events: &mut Vec<Event>,
) {
    while let Some(entry) = pending.first_entry() {
        if until.is_some_and(|until| *entry.key() > until) {
            break;
        }
        let (due, ids) = entry.remove_entry();
        events.extend(ids.into_iter().map(|id| Event::delete(due, id)));
    }
}

fn cancel_pending(pending: &mut BTreeMap<u64, BTreeSet<u32>>, object_id: u32) -> bool {
    let mut found = false;
    pending.retain(|_, ids| {
        found |= ids.remove(&object_id);
        !ids.is_empty()
    });
    found
}

/// Absolute state of an object after applying one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Applied {
    pub class_id: u32,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy)]
struct OpenObject {
    class_id: u32,
    bbox: BoundingBox,
}

/// Replays protocol commands, tracking which objects are open and their
/// last known geometry.
#[derive(Debug, Default)]
pub(crate) struct ProtocolState {
    open: BTreeMap<u32, OpenObject>,
    last_timestamp: Option<u64>,
}

impl ProtocolState {
    /// Applies an event. Returns the resulting absolute state, or `None` for
    /// a delete.
    pub fn apply(&mut self, event: &Event, line: usize) -> Result<Option<Applied>> {
        if self.last_timestamp.is_some_and(|last| event.timestamp < last) {
            warn!(
                line,
                timestamp = event.timestamp,
                "timestamps go backwards, end of track may be wrong"
            );
        }
        self.last_timestamp = Some(event.timestamp);

        let object_id = event.object_id;
        if let Command::Create {
            class_id,
            bbox,
            confidence,
        } = event.command
        {
            if self.open.contains_key(&object_id) {
                return Err(Error::DuplicateObject { line, object_id });
            }
            self.open.insert(object_id, OpenObject { class_id, bbox });
            return Ok(Some(Applied {
                class_id,
                bbox,
                confidence,
            }));
        }

        let Some(object) = self.open.get_mut(&object_id) else {
            return Err(Error::UnknownObject { line, object_id });
        };

        let confidence = match event.command {
            Command::Move { x, y, confidence } => {
                object.bbox.x = x;
                object.bbox.y = y;
                confidence
            }
            Command::Resize {
                width,
                height,
                confidence,
            } => {
                object.bbox.width = width;
                object.bbox.height = height;
                confidence
            }
            Command::MoveAndResize { bbox, confidence } => {
                object.bbox = bbox;
                confidence
            }
            Command::Delete => {
                self.open.remove(&object_id);
                return Ok(None);
            }
            Command::Create { .. } => unreachable!("handled above"),
        };

        Ok(Some(Applied {
            class_id: object.class_id,
            bbox: object.bbox,
            confidence,
        }))
    }

    /// Ids of objects created and not yet deleted
    pub fn open_objects(&self) -> Vec<u32> {
        self.open.keys().copied().collect()
    }
}
