//! Per-frame box records held by the timeline store

use crate::BoundingBox;

/// Confidence assigned to boxes that do not carry one
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Everything the timeline knows about one object at one timestamp
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxInfo {
    /// Object class; `None` falls back to the encoder's default class
    pub class_id: Option<u32>,
    /// Box geometry
    pub bbox: BoundingBox,
    /// Class confidence
    pub confidence: f64,
    /// Set by direct operator edit at this timestamp rather than by tracking
    pub manually_created: bool,
    /// Timestamp at which the track ends (`None` = the track continues)
    pub end_of_track: Option<u64>,
}

impl BoxInfo {
    /// Creates a manually set record with full confidence and an open track
    pub fn new(class_id: u32, bbox: BoundingBox) -> Self {
        Self {
            class_id: Some(class_id),
            bbox,
            confidence: DEFAULT_CONFIDENCE,
            manually_created: true,
            end_of_track: None,
        }
    }

    /// Sets the confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the end of track
    pub fn with_end_of_track(mut self, end_of_track: u64) -> Self {
        self.end_of_track = Some(end_of_track);
        self
    }

    /// Checks if the track has ended at the given timestamp
    pub fn is_expired_at(&self, timestamp: u64) -> bool {
        self.end_of_track.is_some_and(|end| timestamp >= end)
    }
}

/// A box record together with its object identity
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelledBox {
    /// Identity, unique within a frame
    pub object_id: u32,
    /// Record payload
    pub info: BoxInfo,
}

impl LabelledBox {
    /// Creates a new labelled box
    pub fn new(object_id: u32, info: BoxInfo) -> Self {
        Self { object_id, info }
    }
}

impl AsRef<LabelledBox> for LabelledBox {
    fn as_ref(&self) -> &LabelledBox {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_inclusive() {
        let info = BoxInfo::new(0, BoundingBox::new(0.0, 0.0, 10.0, 10.0)).with_end_of_track(200);
        assert!(!info.is_expired_at(100));
        assert!(info.is_expired_at(200));
        assert!(info.is_expired_at(300));
    }

    #[test]
    fn test_open_track_never_expires() {
        let info = BoxInfo::new(3, BoundingBox::default());
        assert!(!info.is_expired_at(u64::MAX));
        assert_eq!(info.confidence, DEFAULT_CONFIDENCE);
        assert!(info.manually_created);
    }
}
