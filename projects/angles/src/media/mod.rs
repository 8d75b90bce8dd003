pub mod ffmpeg_source;

use crate::error::DecodeError;
use image::RgbImage;
use std::path::Path;

pub use ffmpeg_source::FfmpegOpener;

/// Pixel dimensions. A zero dimension in a requested size means "unconstrained":
/// it follows from the other dimension and the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const UNCONSTRAINED: Size = Size {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// An opened video file.
pub trait MediaSource: Send {
    /// Intrinsic size of the primary video track (after the track transform).
    fn dimensions(&self) -> Size;

    /// Presentation timestamps, in seconds, of every valid sample of the
    /// primary video track, sorted ascending.
    fn sample_timestamps(&mut self) -> Result<Vec<f64>, DecodeError>;

    /// The image shown at `seconds`, scaled to fit inside `max_size`.
    fn image_at(&mut self, seconds: f64, max_size: Size) -> Result<RgbImage, DecodeError>;
}

/// Opens video files into [`MediaSource`]s.
pub trait MediaOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>, DecodeError>;
}

/// Output size for an image of `source` dimensions constrained by `max_size`,
/// preserving aspect ratio. Never upscales.
pub fn fit_size(source: Size, max_size: Size) -> Size {
    if source.width == 0 || source.height == 0 {
        return source;
    }
    let sx = if max_size.width == 0 {
        f64::INFINITY
    } else {
        max_size.width as f64 / source.width as f64
    };
    let sy = if max_size.height == 0 {
        f64::INFINITY
    } else {
        max_size.height as f64 / source.height as f64
    };
    let scale = sx.min(sy).min(1.0);
    Size {
        width: ((source.width as f64 * scale).round() as u32).max(1),
        height: ((source.height as f64 * scale).round() as u32).max(1),
    }
}

/// Requested decode size for a thumbnail that will be aspect-filled into a
/// square of `side` pixels.
///
/// Wide video is bounded by height and tall video by width, so the short side
/// of the decoded image matches the square and the long side overflows for
/// cropping.
pub fn thumbnail_bounds(video: Size, side: u32) -> Size {
    if video.aspect_ratio() > Size::square(side).aspect_ratio() {
        Size::new(0, side)
    } else {
        Size::new(side, 0)
    }
}

#[cfg(test)]
pub mod testing {
    //! Stub decoder for model tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct StubOpener {
        pub timestamps: Vec<f64>,
        pub dimensions: Size,
        pub fail_open: bool,
        pub fail_images: bool,
        pub opens: Arc<AtomicUsize>,
        pub scans: Arc<AtomicUsize>,
    }

    impl StubOpener {
        pub fn new(timestamps: Vec<f64>) -> Self {
            Self {
                timestamps,
                dimensions: Size::new(1920, 1080),
                fail_open: false,
                fail_images: false,
                opens: Arc::new(AtomicUsize::new(0)),
                scans: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_open: true,
                ..Self::new(Vec::new())
            }
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        pub fn scan_count(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }
    }

    impl MediaOpener for StubOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>, DecodeError> {
            if self.fail_open {
                return Err(DecodeError::Open {
                    path: path.to_path_buf(),
                    reason: "stub failure".to_string(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubSource {
                path: path.to_path_buf(),
                opener: self.clone(),
            }))
        }
    }

    struct StubSource {
        path: std::path::PathBuf,
        opener: StubOpener,
    }

    impl MediaSource for StubSource {
        fn dimensions(&self) -> Size {
            self.opener.dimensions
        }

        fn sample_timestamps(&mut self) -> Result<Vec<f64>, DecodeError> {
            self.opener.scans.fetch_add(1, Ordering::SeqCst);
            Ok(self.opener.timestamps.clone())
        }

        fn image_at(&mut self, seconds: f64, max_size: Size) -> Result<RgbImage, DecodeError> {
            if self.opener.fail_images {
                return Err(DecodeError::ImageGeneration {
                    path: self.path.clone(),
                    seconds,
                    reason: "stub failure".to_string(),
                });
            }
            let size = fit_size(self.opener.dimensions, max_size);
            let shade = (seconds * 10.0).clamp(0.0, 255.0) as u8;
            Ok(RgbImage::from_pixel(
                size.width,
                size.height,
                image::Rgb([shade, shade, shade]),
            ))
        }
    }
}
