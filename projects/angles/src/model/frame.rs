use super::points::PointSequence;
use crate::error::DecodeError;
use crate::media::{MediaSource, Size};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One annotated instant of a video.
///
/// Frames are compared by position in their video's list, never by value: two
/// frames may share a timestamp.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Frame {
    /// Presentation time in seconds
    pub seconds: f64,
    /// Sample index in the decoded video track. Absent in archives written
    /// before schema version 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub points: PointSequence,
    #[serde(skip)]
    images: FrameImages,
}

/// Decoded images, rebuilt on demand after [`Frame::free_memory`]
#[derive(Debug, Clone, Default)]
struct FrameImages {
    full: Option<RgbImage>,
    /// Bounds the thumbnail was decoded for, and the image
    thumbnail: Option<(Size, RgbImage)>,
}

impl Frame {
    pub fn new(seconds: f64, index: Option<usize>) -> Self {
        Self {
            seconds,
            index,
            ..Self::default()
        }
    }

    pub fn with_points(seconds: f64, index: Option<usize>, points: PointSequence) -> Self {
        Self {
            points,
            ..Self::new(seconds, index)
        }
    }

    pub fn angle_count(&self) -> usize {
        self.points.angle_count()
    }

    pub fn angles_in_degrees(&self) -> Vec<f64> {
        self.points.angles_in_degrees()
    }

    /// Full-resolution image at `at` seconds, decoded on first use.
    pub fn image_with(
        &mut self,
        source: &mut dyn MediaSource,
        at: f64,
    ) -> Result<&RgbImage, DecodeError> {
        let image = match self.images.full.take() {
            Some(image) => image,
            None => source.image_at(at, Size::UNCONSTRAINED)?,
        };
        Ok(self.images.full.insert(image))
    }

    /// Thumbnail at `at` seconds constrained to `bounds`. A cached thumbnail is
    /// reused only when it was decoded for the same bounds.
    pub fn thumbnail_with(
        &mut self,
        source: &mut dyn MediaSource,
        at: f64,
        bounds: Size,
    ) -> Result<&RgbImage, DecodeError> {
        let image = match self.images.thumbnail.take() {
            Some((cached, image)) if cached == bounds => image,
            _ => source.image_at(at, bounds)?,
        };
        Ok(&self.images.thumbnail.insert((bounds, image)).1)
    }

    pub fn has_cached_images(&self) -> bool {
        self.images.full.is_some() || self.images.thumbnail.is_some()
    }

    /// Drop decoded images. Seconds, index and points are untouched.
    pub fn free_memory(&mut self) {
        self.images = FrameImages::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::StubOpener;
    use crate::media::MediaOpener;
    use crate::model::Point;
    use std::path::Path;

    #[test]
    fn test_images_are_cached_until_freed() {
        let opener = StubOpener::new(vec![0.0, 1.0]);
        let mut source = opener.open(Path::new("clip.mov")).unwrap();
        let mut frame = Frame::new(1.0, Some(1));
        frame.points.push(Point::new(3.0, 4.0));

        let first = frame.image_with(source.as_mut(), 1.0).unwrap().clone();
        assert_eq!(first.dimensions(), (1920, 1080));
        assert!(frame.has_cached_images());

        // A cached image is returned even when the decoder would now fail.
        let mut broken = StubOpener::new(vec![]);
        broken.fail_images = true;
        let mut broken_source = broken.open(Path::new("clip.mov")).unwrap();
        assert!(frame.image_with(broken_source.as_mut(), 1.0).is_ok());

        frame.free_memory();
        assert!(!frame.has_cached_images());
        assert!(frame.image_with(broken_source.as_mut(), 1.0).is_err());
        assert_eq!(frame.seconds, 1.0);
        assert_eq!(frame.index, Some(1));
        assert_eq!(frame.points.len(), 1);
    }

    #[test]
    fn test_thumbnail_respects_bounds() {
        let opener = StubOpener::new(vec![0.0]);
        let mut source = opener.open(Path::new("clip.mov")).unwrap();
        let mut frame = Frame::new(0.0, Some(0));
        let thumb = frame
            .thumbnail_with(source.as_mut(), 0.0, Size::new(0, 108))
            .unwrap();
        assert_eq!(thumb.dimensions(), (192, 108));
    }

    #[test]
    fn test_thumbnail_redecodes_for_new_bounds() {
        let opener = StubOpener::new(vec![0.0]);
        let mut source = opener.open(Path::new("clip.mov")).unwrap();
        let mut frame = Frame::new(0.0, Some(0));

        let small = frame
            .thumbnail_with(source.as_mut(), 0.0, Size::new(0, 64))
            .unwrap();
        assert_eq!(small.height(), 64);
        let large = frame
            .thumbnail_with(source.as_mut(), 0.0, Size::new(0, 256))
            .unwrap();
        assert_eq!(large.height(), 256);

        // Same bounds again come from the cache, even with a failing decoder.
        let mut broken = StubOpener::new(vec![]);
        broken.fail_images = true;
        let mut broken_source = broken.open(Path::new("clip.mov")).unwrap();
        let cached = frame
            .thumbnail_with(broken_source.as_mut(), 0.0, Size::new(0, 256))
            .unwrap();
        assert_eq!(cached.height(), 256);
        assert!(frame
            .thumbnail_with(broken_source.as_mut(), 0.0, Size::new(0, 64))
            .is_err());
    }

    #[test]
    fn test_serialization_skips_images_and_missing_index() {
        let mut frame = Frame::new(2.5, None);
        frame.points.push(Point::new(1.0, 2.0));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "seconds": 2.5, "points": [{ "x": 1.0, "y": 2.0 }] })
        );

        let old: Frame = serde_json::from_str(r#"{"seconds": 4.0, "points": []}"#).unwrap();
        assert_eq!(old.index, None);
        let new: Frame =
            serde_json::from_str(r#"{"seconds": 4.0, "index": 120, "points": []}"#).unwrap();
        assert_eq!(new.index, Some(120));
    }
}
