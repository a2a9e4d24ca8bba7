//! Frame-by-frame labelling session

use crate::{Error, Result, Tracker};
use image::RgbaImage;
use std::io::Write;
use tracing::{debug, info, warn};
use tracklog_core::{
    write_events, BoundingBox, BoxInfo, EncodeOptions, LabelledBox, RenameOutcome, Timestep,
    TimelineStore,
};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Distance between two frames
    pub timestep: Timestep,
    /// Boxes with a shorter diagonal are rejected, in pixels
    pub min_diagonal: f64,
    /// Frame width in pixels
    pub frame_width: u32,
    /// Frame height in pixels
    pub frame_height: u32,
    /// Class given to new boxes until the operator picks another one
    pub default_class_id: u32,
}

impl SessionConfig {
    /// Creates a configuration for frames of the given size
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            timestep: Timestep::default(),
            min_diagonal: 20.0,
            frame_width,
            frame_height,
            default_class_id: 0,
        }
    }
}

/// A box of the current frame and its tracking handle, if any
#[derive(Debug)]
pub struct LiveBox<H> {
    pub label: LabelledBox,
    handle: Option<H>,
}

impl<H> LiveBox<H> {
    fn new(label: LabelledBox) -> Self {
        Self {
            label,
            handle: None,
        }
    }

    /// True while a tracker follows this box
    pub fn is_tracked(&self) -> bool {
        self.handle.is_some()
    }
}

impl<H> AsRef<LabelledBox> for LiveBox<H> {
    fn as_ref(&self) -> &LabelledBox {
        &self.label
    }
}

/// What happened to the live set during [`LabellingSession::advance`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameUpdate {
    /// Boxes moved by the tracker
    pub tracked: usize,
    /// Boxes dropped because the tracker lost them
    pub lost: Vec<u32>,
    /// Manual boxes merged from the store
    pub manual: usize,
}

/// Labelling session state: the timeline store plus the live boxes of the
/// frame being edited
pub struct LabellingSession<T: Tracker> {
    config: SessionConfig,
    store: TimelineStore,
    tracker: T,
    live: Vec<LiveBox<T::Handle>>,
    current_class_id: u32,
    current_frame: Option<RgbaImage>,
}

impl<T: Tracker> LabellingSession<T> {
    /// Starts a session over an empty timeline
    pub fn new(config: SessionConfig, tracker: T) -> Self {
        Self::with_store(config, tracker, TimelineStore::new())
    }

    /// Resumes a session over an existing timeline, e.g. a decoded label file
    pub fn with_store(config: SessionConfig, tracker: T, store: TimelineStore) -> Self {
        let current_class_id = config.default_class_id;
        Self {
            config,
            store,
            tracker,
            live: Vec::new(),
            current_class_id,
            current_frame: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    pub fn into_store(self) -> TimelineStore {
        self.store
    }

    /// Timestamp of a 0-based frame index
    pub fn frame_timestamp(&self, frame_index: u64) -> Result<u64> {
        Ok(self.config.timestep.frame_timestamp(frame_index)?)
    }

    /// Boxes of the current frame
    pub fn live(&self) -> impl Iterator<Item = &LabelledBox> {
        self.live.iter().map(|live| &live.label)
    }

    /// Gets a box of the current frame by id
    pub fn live_box(&self, object_id: u32) -> Option<&LiveBox<T::Handle>> {
        self.live.iter().find(|live| live.label.object_id == object_id)
    }

    pub fn current_class_id(&self) -> u32 {
        self.current_class_id
    }

    pub fn set_current_class_id(&mut self, class_id: u32) {
        self.current_class_id = class_id;
    }

    /// Adds an operator-drawn box to the current frame.
    ///
    /// Returns the new object id, or `None` if the box is too small to keep.
    pub fn add_box(&mut self, mut bbox: BoundingBox) -> Option<u32> {
        bbox.normalize();
        if bbox.is_degenerate(self.config.min_diagonal) {
            debug!(?bbox, "box below minimum size ignored");
            return None;
        }
        bbox.clip_to_frame(self.config.frame_width, self.config.frame_height);

        let object_id = self.store.allocate_object_id();
        let info = BoxInfo::new(self.current_class_id, bbox);
        self.live
            .push(LiveBox::new(LabelledBox::new(object_id, info)));
        info!(object_id, "box created");
        Some(object_id)
    }

    /// Applies an operator edit (move or resize) to a live box.
    ///
    /// The box becomes manually set and its tracker is released. Returns
    /// false, leaving the box untouched, if the id is unknown or the new
    /// geometry is too small.
    pub fn edit_box(&mut self, object_id: u32, mut bbox: BoundingBox) -> bool {
        bbox.normalize();
        if bbox.is_degenerate(self.config.min_diagonal) {
            return false;
        }
        bbox.clip_to_frame(self.config.frame_width, self.config.frame_height);

        let Some(live) = self.live_mut(object_id) else {
            return false;
        };
        live.label.info.bbox = bbox;
        live.label.info.manually_created = true;
        live.handle = None;
        true
    }

    /// Removes a box from the current frame only
    pub fn delete_box(&mut self, object_id: u32) -> bool {
        let before = self.live.len();
        self.live.retain(|live| live.label.object_id != object_id);
        let deleted = self.live.len() != before;
        if deleted {
            info!(object_id, "box deleted");
        }
        deleted
    }

    /// Records the live set as the content of the frame at `timestamp`
    pub fn save_current(&mut self, timestamp: u64) {
        let boxes: Vec<LabelledBox> = self.live.iter().map(|live| live.label.clone()).collect();
        self.store.snapshot(timestamp, boxes);
    }

    /// Replaces the live set by the stored boxes of `timestamp` that are
    /// still alive there, and makes `frame` the image trackers start from on
    /// the next [`advance`](Self::advance). Used when jumping or stepping
    /// backward.
    pub fn load_frame(&mut self, timestamp: u64, frame: RgbaImage) -> Result<()> {
        self.check_frame_size(&frame)?;
        self.current_frame = Some(frame);
        self.live.clear();
        let Some(stored) = self.store.frame(timestamp) else {
            return Ok(());
        };
        for (object_id, info) in stored {
            if info.is_expired_at(timestamp) {
                continue;
            }
            let mut label = LabelledBox::new(*object_id, info.clone());
            label
                .info
                .bbox
                .clip_to_frame(self.config.frame_width, self.config.frame_height);
            self.live.push(LiveBox::new(label));
        }
        Ok(())
    }

    /// Saves the current frame and loads another one without tracking
    pub fn seek(
        &mut self,
        from_timestamp: u64,
        to_timestamp: u64,
        frame: RgbaImage,
    ) -> Result<()> {
        self.check_frame_size(&frame)?;
        self.save_current(from_timestamp);
        self.load_frame(to_timestamp, frame)
    }

    /// Moves the session to the next frame.
    ///
    /// Stored manual boxes of `timestamp` override tracked ones with the same
    /// id and expired tracks are dropped. Every other live box is followed by
    /// the tracker from the previous frame to `frame`; boxes the tracker loses
    /// are dropped.
    pub fn advance(&mut self, timestamp: u64, frame: RgbaImage) -> Result<FrameUpdate> {
        self.check_frame_size(&frame)?;

        let previous = self.current_frame.take();
        let reference = previous.as_ref().unwrap_or(&frame);

        let manual = self.store.reconcile_frame(timestamp, &mut self.live);
        self.acquire_handles(reference);

        let mut update = self.track(&frame);
        update.manual = self.merge_manual(manual);

        self.current_frame = Some(frame);
        debug!(timestamp, ?update, "advanced frame");
        Ok(update)
    }

    /// Renames an object along its contiguous run around `timestamp`, the
    /// timestamp of the current frame.
    ///
    /// Refused when another box of the current frame already uses `new_id`.
    /// The live set is saved first so the store sees the current frame.
    pub fn rename_object(&mut self, old_id: u32, new_id: u32, timestamp: u64) -> RenameOutcome {
        if old_id != new_id && self.live_box(new_id).is_some() {
            return RenameOutcome::Collision;
        }
        self.save_current(timestamp);

        let outcome = self
            .store
            .rename_object(old_id, new_id, timestamp, self.config.timestep);
        if let RenameOutcome::Renamed { .. } = outcome {
            if let Some(live) = self.live_mut(old_id) {
                live.label.object_id = new_id;
            }
        }
        outcome
    }

    /// Changes the class of an object everywhere in the timeline. The class
    /// also becomes the default for new boxes.
    pub fn rename_class(&mut self, object_id: u32, class_id: u32) -> usize {
        let changed = self.store.rename_class(object_id, class_id);
        if let Some(live) = self.live_mut(object_id) {
            live.label.info.class_id = Some(class_id);
        }
        self.current_class_id = class_id;
        changed
    }

    /// Deletes every instance of an object, past and future
    pub fn purge_object(&mut self, object_id: u32) -> usize {
        self.live.retain(|live| live.label.object_id != object_id);
        self.store.purge_object(object_id)
    }

    /// Drops the future of an object so it can be labelled again
    pub fn expire_future(&mut self, object_id: u32, timestamp: u64) -> usize {
        if let Some(live) = self.live_mut(object_id) {
            live.label.info.end_of_track = None;
        }
        self.store.expire_future(object_id, timestamp)
    }

    /// Stops tracking an object at `timestamp`
    pub fn terminate_track(&mut self, object_id: u32, timestamp: u64) -> usize {
        if let Some(live) = self.live_mut(object_id) {
            live.label.info.end_of_track = Some(timestamp);
        }
        self.store
            .terminate_track(object_id, timestamp, self.config.timestep)
    }

    /// Saves the current frame and writes the whole timeline as an event log
    pub fn finish<W: Write>(
        &mut self,
        timestamp: u64,
        writer: W,
        options: &EncodeOptions,
    ) -> Result<usize> {
        self.save_current(timestamp);
        Ok(write_events(writer, &self.store, options)?)
    }

    fn check_frame_size(&self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() != (self.config.frame_width, self.config.frame_height) {
            return Err(Error::FrameSize {
                width: self.config.frame_width,
                height: self.config.frame_height,
                found_width: frame.width(),
                found_height: frame.height(),
            });
        }
        Ok(())
    }

    fn live_mut(&mut self, object_id: u32) -> Option<&mut LiveBox<T::Handle>> {
        self.live
            .iter_mut()
            .find(|live| live.label.object_id == object_id)
    }

    fn acquire_handles(&mut self, reference: &RgbaImage) {
        for live in self.live.iter_mut().filter(|live| live.handle.is_none()) {
            let object_id = live.label.object_id;
            match self.tracker.init(reference, &live.label.info.bbox) {
                Some(handle) => {
                    live.handle = Some(handle);
                    debug!(object_id, "tracker initialized");
                }
                None => warn!(object_id, "could not initialize tracker"),
            }
        }
    }

    fn track(&mut self, frame: &RgbaImage) -> FrameUpdate {
        let mut update = FrameUpdate::default();
        let (width, height) = (self.config.frame_width, self.config.frame_height);
        let tracker = &mut self.tracker;

        self.live.retain_mut(|live| {
            let Some(handle) = live.handle.as_mut() else {
                return true;
            };
            match tracker.advance(handle, frame) {
                Some(mut bbox) => {
                    bbox.clip_to_frame(width, height);
                    live.label.info.bbox = bbox;
                    live.label.info.manually_created = false;
                    update.tracked += 1;
                    true
                }
                None => {
                    warn!(object_id = live.label.object_id, "track lost, box removed");
                    update.lost.push(live.label.object_id);
                    false
                }
            }
        });
        update
    }

    fn merge_manual(&mut self, manual: Vec<LabelledBox>) -> usize {
        let mut merged = 0;
        for mut label in manual {
            if label.info.bbox.is_degenerate(self.config.min_diagonal) {
                continue;
            }
            label
                .info
                .bbox
                .clip_to_frame(self.config.frame_width, self.config.frame_height);
            self.live.retain(|live| live.label.object_id != label.object_id);
            self.live.push(LiveBox::new(label));
            merged += 1;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tracklog_core::{read_events, DecodeOptions};

    const DT: u64 = 100;

    /// Moves every box `shift` pixels right per frame; loses a box after
    /// `lose_after` advances. Records the red channel of the top-left pixel
    /// of every image a tracker was initialized on.
    struct ShiftTracker {
        shift: f64,
        lose_after: Option<u32>,
        refuse_init: bool,
        init_images: Vec<u8>,
    }

    struct ShiftHandle {
        bbox: BoundingBox,
        advances: u32,
    }

    impl ShiftTracker {
        fn new(shift: f64) -> Self {
            Self {
                shift,
                lose_after: None,
                refuse_init: false,
                init_images: Vec::new(),
            }
        }
    }

    impl Tracker for ShiftTracker {
        type Handle = ShiftHandle;

        fn init(&mut self, frame: &RgbaImage, bbox: &BoundingBox) -> Option<ShiftHandle> {
            self.init_images.push(frame.get_pixel(0, 0)[0]);
            if self.refuse_init {
                return None;
            }
            Some(ShiftHandle {
                bbox: *bbox,
                advances: 0,
            })
        }

        fn advance(&mut self, handle: &mut ShiftHandle, _frame: &RgbaImage) -> Option<BoundingBox> {
            if self.lose_after.is_some_and(|limit| handle.advances >= limit) {
                return None;
            }
            handle.advances += 1;
            handle.bbox.x += self.shift;
            Some(handle.bbox)
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            timestep: Timestep::new(DT).unwrap(),
            ..SessionConfig::new(100, 80)
        }
    }

    fn frame() -> RgbaImage {
        RgbaImage::new(100, 80)
    }

    fn numbered_frame(number: u8) -> RgbaImage {
        RgbaImage::from_pixel(100, 80, image::Rgba([number, 0, 0, 255]))
    }

    fn session(tracker: ShiftTracker) -> LabellingSession<ShiftTracker> {
        LabellingSession::new(config(), tracker)
    }

    #[test]
    fn test_degenerate_box_is_ignored() {
        let mut session = session(ShiftTracker::new(1.0));
        assert_eq!(session.add_box(BoundingBox::new(10.0, 10.0, 5.0, 5.0)), None);
        assert_eq!(session.live().count(), 0);
        assert_eq!(session.store().next_object_id(), 0);
    }

    #[test]
    fn test_add_box_normalizes_and_clips() {
        let mut session = session(ShiftTracker::new(1.0));
        let id = session
            .add_box(BoundingBox::new(5.0, 10.0, -10.0, 30.0))
            .unwrap();
        let label = session.live_box(id).unwrap();
        assert_eq!(label.label.info.bbox, BoundingBox::new(0.0, 10.0, 5.0, 30.0));
        assert!(label.label.info.manually_created);
        assert!(!label.is_tracked());
    }

    #[test]
    fn test_advance_tracks_boxes() {
        let mut session = session(ShiftTracker::new(2.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);

        let update = session.advance(2 * DT, frame()).unwrap();
        assert_eq!(update.tracked, 1);
        assert!(update.lost.is_empty());

        let live = session.live_box(id).unwrap();
        assert_eq!(live.label.info.bbox.x, 12.0);
        assert!(!live.label.info.manually_created);
        assert!(live.is_tracked());
    }

    #[test]
    fn test_tracked_box_is_clipped() {
        let mut session = session(ShiftTracker::new(15.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(70.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, frame()).unwrap();

        let bbox = session.live_box(id).unwrap().label.info.bbox;
        assert_eq!(bbox.x, 85.0);
        assert_eq!(bbox.width, 14.0);
    }

    #[test]
    fn test_manual_box_wins_over_tracking() {
        let mut session = session(ShiftTracker::new(2.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);

        let manual = BoxInfo::new(0, BoundingBox::new(40.0, 40.0, 20.0, 20.0));
        session.store.insert(2 * DT, id, manual);

        let update = session.advance(2 * DT, frame()).unwrap();
        assert_eq!(update.tracked, 0);
        assert_eq!(update.manual, 1);

        let live = session.live_box(id).unwrap();
        assert_eq!(live.label.info.bbox, BoundingBox::new(40.0, 40.0, 20.0, 20.0));
        assert!(live.label.info.manually_created);
        assert_eq!(session.live().count(), 1);
    }

    #[test]
    fn test_lost_track_is_dropped() {
        let mut tracker = ShiftTracker::new(1.0);
        tracker.lose_after = Some(1);
        let mut session = session(tracker);
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);

        session.advance(2 * DT, frame()).unwrap();
        session.save_current(2 * DT);
        let update = session.advance(3 * DT, frame()).unwrap();

        assert_eq!(update.lost, vec![id]);
        assert_eq!(session.live().count(), 0);
    }

    #[test]
    fn test_failed_init_keeps_box() {
        let mut tracker = ShiftTracker::new(1.0);
        tracker.refuse_init = true;
        let mut session = session(tracker);
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);

        let update = session.advance(2 * DT, frame()).unwrap();
        assert_eq!(update.tracked, 0);
        assert_eq!(session.live_box(id).unwrap().label.info.bbox.x, 10.0);
    }

    #[test]
    fn test_terminated_track_disappears() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, frame()).unwrap();

        session.terminate_track(id, 2 * DT);
        session.save_current(2 * DT);
        session.advance(3 * DT, frame()).unwrap();

        assert_eq!(session.live().count(), 0);
        assert_eq!(session.store().get(DT, id).unwrap().end_of_track, Some(2 * DT));
    }

    #[test]
    fn test_rename_refused_when_id_is_live() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let first = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let second = session
            .add_box(BoundingBox::new(50.0, 10.0, 20.0, 20.0))
            .unwrap();

        assert_eq!(
            session.rename_object(first, second, DT),
            RenameOutcome::Collision
        );
        assert!(session.live_box(first).is_some());

        session.save_current(DT);
        assert_eq!(
            session.rename_object(first, 7, DT),
            RenameOutcome::Renamed { frames: 1 }
        );
        assert!(session.live_box(7).is_some());
        assert!(session.store().get(DT, 7).is_some());
        assert_eq!(session.store().next_object_id(), 8);
    }

    #[test]
    fn test_frame_size_is_checked() {
        let mut session = session(ShiftTracker::new(1.0));
        let err = session.advance(DT, RgbaImage::new(10, 10)).unwrap_err();
        assert!(matches!(err, Error::FrameSize { found_width: 10, .. }));
    }

    #[test]
    fn test_seek_back_restores_frame() {
        let mut session = session(ShiftTracker::new(2.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, frame()).unwrap();

        session.seek(2 * DT, DT, frame()).unwrap();
        let live = session.live_box(id).unwrap();
        assert_eq!(live.label.info.bbox.x, 10.0);
        assert_eq!(session.store().get(2 * DT, id).unwrap().bbox.x, 12.0);
    }

    #[test]
    fn test_seek_sets_tracker_reference_image() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, numbered_frame(1)).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, numbered_frame(2)).unwrap();
        session.advance(3 * DT, numbered_frame(3)).unwrap();
        assert_eq!(session.tracker.init_images, vec![1]);

        session.seek(3 * DT, DT, numbered_frame(1)).unwrap();
        assert!(!session.live_box(id).unwrap().is_tracked());
        session.advance(2 * DT, numbered_frame(2)).unwrap();
        assert_eq!(session.tracker.init_images, vec![1, 1]);
    }

    #[test]
    fn test_load_frame_checks_size() {
        let mut session = session(ShiftTracker::new(1.0));
        let err = session.load_frame(DT, RgbaImage::new(10, 10)).unwrap_err();
        assert!(matches!(err, Error::FrameSize { found_height: 10, .. }));
    }

    #[test]
    fn test_rename_uses_unsaved_live_set() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let first = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let second = session
            .add_box(BoundingBox::new(50.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.delete_box(second);

        assert_eq!(
            session.rename_object(first, second, DT),
            RenameOutcome::Renamed { frames: 1 }
        );
        assert!(session.live_box(second).is_some());
        assert!(session.store().get(DT, first).is_none());
        assert_eq!(session.store().get(DT, second).unwrap().bbox.x, 10.0);
    }

    #[test]
    fn test_rename_class_updates_live_box_and_current_class() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.save_current(2 * DT);

        assert_eq!(session.rename_class(id, 4), 2);
        assert_eq!(session.live_box(id).unwrap().label.info.class_id, Some(4));
        assert_eq!(session.store().get(DT, id).unwrap().class_id, Some(4));
        assert_eq!(session.current_class_id(), 4);

        let other = session
            .add_box(BoundingBox::new(50.0, 10.0, 20.0, 20.0))
            .unwrap();
        assert_eq!(session.live_box(other).unwrap().label.info.class_id, Some(4));
    }

    #[test]
    fn test_purge_object_clears_live_and_store() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        let kept = session
            .add_box(BoundingBox::new(50.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.save_current(3 * DT);

        assert_eq!(session.purge_object(id), 2);
        assert!(session.live_box(id).is_none());
        assert!(session.live_box(kept).is_some());
        assert!(session.store().occurrences(id).is_empty());
        assert_eq!(session.store().occurrences(kept), vec![DT, 3 * DT]);
    }

    #[test]
    fn test_expire_future_reopens_track() {
        let mut session = session(ShiftTracker::new(1.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.save_current(2 * DT);
        session.save_current(3 * DT);
        session.terminate_track(id, 3 * DT);
        assert_eq!(
            session.live_box(id).unwrap().label.info.end_of_track,
            Some(3 * DT)
        );

        assert_eq!(session.expire_future(id, 2 * DT), 1);
        assert_eq!(session.live_box(id).unwrap().label.info.end_of_track, None);
        assert!(session.store().get(3 * DT, id).is_none());
        assert_eq!(session.store().get(DT, id).unwrap().end_of_track, None);
        assert_eq!(session.store().get(2 * DT, id).unwrap().end_of_track, None);
    }

    #[test]
    fn test_edit_box_releases_tracker() {
        let mut session = session(ShiftTracker::new(2.0));
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, frame()).unwrap();
        assert!(session.live_box(id).unwrap().is_tracked());

        assert!(!session.edit_box(id, BoundingBox::new(30.0, 30.0, 2.0, 2.0)));
        assert_eq!(session.live_box(id).unwrap().label.info.bbox.x, 12.0);

        assert!(session.edit_box(id, BoundingBox::new(60.0, 50.0, -20.0, -20.0)));
        let live = session.live_box(id).unwrap();
        assert_eq!(live.label.info.bbox, BoundingBox::new(40.0, 30.0, 20.0, 20.0));
        assert!(live.label.info.manually_created);
        assert!(!live.is_tracked());
        assert!(!session.edit_box(99, BoundingBox::new(10.0, 10.0, 20.0, 20.0)));
    }

    #[test]
    fn test_finish_writes_decodable_log() {
        let mut session = session(ShiftTracker::new(2.0));
        session.set_current_class_id(3);
        session.advance(DT, frame()).unwrap();
        let id = session
            .add_box(BoundingBox::new(10.0, 10.0, 20.0, 20.0))
            .unwrap();
        session.save_current(DT);
        session.advance(2 * DT, frame()).unwrap();
        session.save_current(2 * DT);
        session.advance(3 * DT, frame()).unwrap();
        session.delete_box(id);

        let mut buffer = Vec::new();
        let written = session
            .finish(3 * DT, &mut buffer, &EncodeOptions::default())
            .unwrap();
        assert_eq!(written, 3);

        let store = read_events(
            Cursor::new(buffer),
            &DecodeOptions::new(Timestep::new(DT).unwrap()),
        )
        .unwrap();
        assert_eq!(store.get(DT, id).unwrap().class_id, Some(3));
        assert_eq!(store.get(2 * DT, id).unwrap().bbox.x, 12.0);
        assert_eq!(store.get(2 * DT, id).unwrap().end_of_track, Some(3 * DT));
    }
}
