//! Capture region (spec.md §3: `Rect`).

use crate::error::{CatResult, Error};

/// A capture region in screen pixels. Coordinates are floating point on the
/// wire (matching the platform APIs, which report sub-pixel display scales)
/// but are integer-rounded before any indexing happens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> CatResult<Self> {
        let r = Self { x, y, width, height };
        r.validate()?;
        Ok(r)
    }

    fn validate(&self) -> CatResult<()> {
        if self.width < 1.0 || self.height < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "rect must have width >= 1 and height >= 1, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Integer-rounded bounds, clamped so the region stays within `(screen_width, screen_height)`.
    ///
    /// Spec.md §9 open question (a): a region that partially overlaps the
    /// screen edge is rejected at config time rather than silently cropped,
    /// since the source left this unspecified.
    pub fn clamped_to_screen(&self, screen_width: u32, screen_height: u32) -> CatResult<(u32, u32, u32, u32)> {
        let x = self.x.round() as i64;
        let y = self.y.round() as i64;
        let width = self.width.round() as i64;
        let height = self.height.round() as i64;

        if x < 0 || y < 0 || width < 1 || height < 1 {
            return Err(Error::InvalidConfig(format!(
                "rect ({x},{y},{width}x{height}) has a non-positive dimension or negative origin"
            )));
        }
        let (x, y, width, height) = (x as u32, y as u32, width as u32, height as u32);
        if x.saturating_add(width) > screen_width || y.saturating_add(height) > screen_height {
            return Err(Error::InvalidConfig(format!(
                "rect ({x},{y},{width}x{height}) extends past the screen bounds ({screen_width}x{screen_height})"
            )));
        }
        Ok((x, y, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_dims() {
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_err());
        assert!(Rect::new(0.0, 0.0, 10.0, -1.0).is_err());
    }

    #[test]
    fn clamps_within_screen() {
        let r = Rect::new(10.0, 10.0, 100.0, 50.0).unwrap();
        assert_eq!(r.clamped_to_screen(1920, 1080).unwrap(), (10, 10, 100, 50));
    }

    #[test]
    fn rejects_region_past_screen_edge() {
        let r = Rect::new(1900.0, 0.0, 100.0, 50.0).unwrap();
        assert!(r.clamped_to_screen(1920, 1080).is_err());
    }
}
