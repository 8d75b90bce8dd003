use crate::media::Size;
use crate::model::Point;
use geo::Intersects;
use geo_types::{coord, Coord, Rect};

/// Where an image of known size sits inside a view.
///
/// Images are drawn aspect-fit: scaled by the larger factor that still fits
/// the view and centred, which letterboxes one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMapping {
    image: Size,
    rect: Rect<f64>,
}

impl DisplayMapping {
    /// `view_width` x `view_height` is the view in display units.
    pub fn aspect_fit(view_width: f64, view_height: f64, image: Size) -> Self {
        let image_w = image.width as f64;
        let image_h = image.height as f64;
        let scale = (view_width / image_w).min(view_height / image_h);
        let w = scale * image_w;
        let h = scale * image_h;
        let x = (view_width - w) / 2.0;
        let y = (view_height - h) / 2.0;
        Self {
            image,
            rect: Rect::new(coord! { x: x, y: y }, coord! { x: x + w, y: y + h }),
        }
    }

    /// The image's rectangle in display space
    pub fn image_rect(&self) -> Rect<f64> {
        self.rect
    }

    /// True if a display position falls on the image, edges included.
    pub fn contains(&self, display: Point) -> bool {
        self.rect.intersects(&to_coord(display))
    }

    pub fn normalize(&self, display: Point) -> Point {
        let min = self.rect.min();
        Point {
            x: (display.x - min.x) / self.rect.width() * self.image.width as f64,
            y: (display.y - min.y) / self.rect.height() * self.image.height as f64,
        }
    }

    pub fn denormalize(&self, normalized: Point) -> Point {
        let min = self.rect.min();
        Point {
            x: normalized.x / self.image.width as f64 * self.rect.width() + min.x,
            y: normalized.y / self.image.height as f64 * self.rect.height() + min.y,
        }
    }
}

fn to_coord(p: Point) -> Coord<f64> {
    coord! { x: p.x, y: p.y }
}
