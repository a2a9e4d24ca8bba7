//! Visual tracking capability

use image::RgbaImage;
use tracklog_core::BoundingBox;

/// Single-object visual tracker.
///
/// Implement this trait to plug any tracking algorithm into a
/// [`LabellingSession`](crate::LabellingSession). The session owns one handle
/// per tracked box and drops it when the track ends or is lost.
pub trait Tracker {
    /// Per-box tracking state
    type Handle;

    /// Starts tracking the region `bbox` of `frame`. Returns `None` if the
    /// region cannot be tracked.
    fn init(&mut self, frame: &RgbaImage, bbox: &BoundingBox) -> Option<Self::Handle>;

    /// Locates the tracked region in the next frame. Returns `None` when the
    /// target is lost.
    fn advance(&mut self, handle: &mut Self::Handle, frame: &RgbaImage) -> Option<BoundingBox>;
}
