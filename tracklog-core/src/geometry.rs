//! Box geometry for labelled objects

/// Axis-aligned rectangle in pixel units.
///
/// While a box is being dragged the width or height may be negative; call
/// [`BoundingBox::normalize`] (or [`BoundingBox::clip_to_frame`], which
/// normalizes first) before storing it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Horizontal extent
    pub width: f64,
    /// Vertical extent
    pub height: f64,
}

/// Corner or edge of a box held by the cursor while resizing.
///
/// The opposite corner (or edge) stays fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Left,
    Right,
    Top,
    Bottom,
}

impl BoundingBox {
    /// Creates a new bounding box
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the top-left corner
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Returns `(width, height)`
    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Flips a negative width or height so the box is described from its
    /// top-left corner.
    pub fn normalize(&mut self) {
        if self.width < 0.0 {
            self.width = -self.width;
            self.x -= self.width;
        }
        if self.height < 0.0 {
            self.height = -self.height;
            self.y -= self.height;
        }
    }

    /// Normalizes the box, then shrinks it until it lies inside a frame of
    /// the given size. The box is never discarded; a box that lies entirely
    /// outside the frame ends up with a zero extent.
    pub fn clip_to_frame(&mut self, frame_width: u32, frame_height: u32) {
        self.normalize();

        let max_x = frame_width as f64 - 1.0;
        let max_y = frame_height as f64 - 1.0;

        if self.x + self.width > max_x {
            self.width = max_x - self.x;
        }
        if self.y + self.height > max_y {
            self.height = max_y - self.y;
        }
        if self.x < 0.0 {
            self.width += self.x;
            self.x = 0.0;
        }
        if self.y < 0.0 {
            self.height += self.y;
            self.y = 0.0;
        }

        self.width = self.width.max(0.0);
        self.height = self.height.max(0.0);
    }

    /// True when the diagonal is shorter than `min_diagonal`
    pub fn is_degenerate(&self, min_diagonal: f64) -> bool {
        self.width * self.width + self.height * self.height < min_diagonal * min_diagonal
    }

    /// Moves `anchor` to `(x, y)` keeping the opposite corner or edge in place.
    ///
    /// Dragging past the fixed side leaves a negative extent behind; the
    /// caller is expected to [`normalize`](Self::normalize) afterwards.
    pub fn resize_from_anchor(&mut self, anchor: Anchor, x: f64, y: f64) {
        let right = self.x + self.width;
        let bottom = self.y + self.height;

        match anchor {
            Anchor::TopLeft => {
                self.x = x;
                self.y = y;
                self.width = right - x;
                self.height = bottom - y;
            }
            Anchor::TopRight => {
                self.y = y;
                self.width = x - self.x;
                self.height = bottom - y;
            }
            Anchor::BottomLeft => {
                self.x = x;
                self.width = right - x;
                self.height = y - self.y;
            }
            Anchor::BottomRight => {
                self.width = x - self.x;
                self.height = y - self.y;
            }
            Anchor::Left => {
                self.x = x;
                self.width = right - x;
            }
            Anchor::Right => {
                self.width = x - self.x;
            }
            Anchor::Top => {
                self.y = y;
                self.height = bottom - y;
            }
            Anchor::Bottom => {
                self.height = y - self.y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_flips_negative_extent() {
        let mut bbox = BoundingBox::new(50.0, 40.0, -20.0, -10.0);
        bbox.normalize();
        assert_eq!(bbox, BoundingBox::new(30.0, 30.0, 20.0, 10.0));
    }

    #[test]
    fn test_clip_negative_origin() {
        let mut bbox = BoundingBox::new(-5.0, 10.0, 10.0, 10.0);
        bbox.clip_to_frame(100, 100);
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.width, 5.0);
        assert_eq!(bbox.y, 10.0);
        assert_eq!(bbox.height, 10.0);
    }

    #[test]
    fn test_clip_far_edges() {
        let mut bbox = BoundingBox::new(90.0, 45.0, 20.0, 20.0);
        bbox.clip_to_frame(100, 50);
        assert_eq!(bbox, BoundingBox::new(90.0, 45.0, 9.0, 4.0));
    }

    #[test]
    fn test_clip_normalizes_first() {
        let mut bbox = BoundingBox::new(5.0, 5.0, -10.0, 10.0);
        bbox.clip_to_frame(100, 100);
        assert_eq!(bbox, BoundingBox::new(0.0, 5.0, 5.0, 10.0));
    }

    #[test]
    fn test_clip_outside_frame_collapses() {
        let mut bbox = BoundingBox::new(150.0, 10.0, 10.0, 10.0);
        bbox.clip_to_frame(100, 100);
        assert_eq!(bbox.width, 0.0);
        assert_eq!(bbox.height, 10.0);
    }

    #[test]
    fn test_degenerate() {
        let bbox = BoundingBox::new(0.0, 0.0, 12.0, 16.0);
        assert!(!bbox.is_degenerate(20.0));
        assert!(bbox.is_degenerate(20.5));
    }

    #[test]
    fn test_resize_corners() {
        let base = BoundingBox::new(10.0, 10.0, 20.0, 20.0);

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::TopLeft, 5.0, 0.0);
        assert_eq!(bbox, BoundingBox::new(5.0, 0.0, 25.0, 30.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::TopRight, 40.0, 15.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 15.0, 30.0, 15.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::BottomLeft, 0.0, 50.0);
        assert_eq!(bbox, BoundingBox::new(0.0, 10.0, 30.0, 40.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::BottomRight, 35.0, 25.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 10.0, 25.0, 15.0));
    }

    #[test]
    fn test_resize_edges_ignore_other_axis() {
        let base = BoundingBox::new(10.0, 10.0, 20.0, 20.0);

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::Left, 0.0, 999.0);
        assert_eq!(bbox, BoundingBox::new(0.0, 10.0, 30.0, 20.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::Right, 50.0, 999.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 10.0, 40.0, 20.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::Top, 999.0, 5.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 5.0, 20.0, 25.0));

        let mut bbox = base;
        bbox.resize_from_anchor(Anchor::Bottom, 999.0, 12.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 10.0, 20.0, 2.0));
    }

    #[test]
    fn test_resize_past_fixed_side_then_normalize() {
        let mut bbox = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        bbox.resize_from_anchor(Anchor::Right, 4.0, 0.0);
        assert_eq!(bbox.width, -6.0);
        bbox.normalize();
        assert_eq!(bbox, BoundingBox::new(4.0, 10.0, 6.0, 20.0));
    }
}
