//! Preview rasterization
//!
//! Shared by on-demand requests and the background prefetch. Pages are fitted
//! into a square of `preview_edge` units, painted onto a white surface and
//! flipped so that bottom-up PDF content lands right-side-up in the top-down
//! pixel grid.
//!
//! ```text
//!   user space (y up)              surface (y down)
//!   ┌──────────┐ y1                ┌──────────┐ 0
//!   │    A     │                   │    A     │
//!   │    B     │   translate(H)    │    B     │
//!   └──────────┘ y0  · flip · s    └──────────┘ H = height · s
//! ```

use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

use crate::bitmap::PageImage;
use crate::engine::{PageRect, RasterEngine};

/// Largest surface edge we agree to allocate, in pixels
pub const MAX_SURFACE_EDGE: u32 = 16_384;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 2D affine transform mapping `(x, y)` to `(a·x + c·y + e, b·x + d·y + f)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f32, ty: f32) -> Self {
        Transform {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Transform {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Apply `self` first, then `next`
    pub fn then(&self, next: &Transform) -> Transform {
        Transform {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// Uniform scale and pixel size of a page preview
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewGeometry {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

impl PreviewGeometry {
    /// Fit `bounds` inside an `edge` × `edge` square, preserving aspect ratio.
    ///
    /// Returns `None` for degenerate boxes.
    pub fn fit(bounds: &PageRect, edge: f32) -> Option<Self> {
        let (width, height) = (bounds.width(), bounds.height());
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) || !valid(edge) {
            return None;
        }

        let scale = (edge / width).min(edge / height);
        Some(Self {
            scale,
            width: ((width * scale).round() as u32).max(1),
            height: ((height * scale).round() as u32).max(1),
        })
    }

    /// Page-to-surface transform: translate by the scaled height, flip the
    /// vertical axis, scale uniformly. The media box origin maps to the
    /// bottom-left pixel corner.
    pub fn transform(&self, bounds: &PageRect) -> Transform {
        let scaled_height = bounds.height() * self.scale;
        Transform::translate(-bounds.x0, -bounds.y0)
            .then(&Transform::scale(self.scale, self.scale))
            .then(&Transform::scale(1.0, -1.0))
            .then(&Transform::translate(0.0, scaled_height))
    }
}

/// Owned RGBA drawing surface handed to the engine
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    /// Allocate a transparent surface; `None` for zero or oversized dimensions
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 || width > MAX_SURFACE_EDGE || height > MAX_SURFACE_EDGE {
            return None;
        }
        Some(Self {
            pixels: RgbaImage::new(width, height),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    /// Fill the pixel-space rectangle spanned by two corners, clipped to the surface
    pub fn fill_rect(&mut self, (x0, y0): (f32, f32), (x1, y1): (f32, f32), color: Rgba<u8>) {
        let clamp_x = |v: f32| v.round().clamp(0.0, self.width() as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, self.height() as f32) as u32;

        let (left, right) = (clamp_x(x0.min(x1)), clamp_x(x0.max(x1)));
        let (top, bottom) = (clamp_y(y0.min(y1)), clamp_y(y0.max(y1)));

        for y in top..bottom {
            for x in left..right {
                self.pixels.put_pixel(x, y, color);
            }
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

/// Rasterize one page into a preview bitmap.
///
/// Yields `None` when the index is outside `1..=page_count`, the page or its
/// bounds cannot be obtained, the surface cannot be allocated or the engine
/// fails to paint. Synchronous and CPU-bound.
pub fn render_page<E: RasterEngine>(
    engine: &E,
    doc: &E::Handle,
    page_index: usize,
    page_count: usize,
    preview_edge: f32,
) -> Option<PageImage> {
    if page_index == 0 || page_index > page_count {
        trace!("Page {} outside 1..={}", page_index, page_count);
        return None;
    }

    let Some(page) = engine.page(doc, page_index) else {
        debug!("Page {} unavailable", page_index);
        return None;
    };
    let bounds = engine.page_bounds(&page)?;
    let Some(geometry) = PreviewGeometry::fit(&bounds, preview_edge) else {
        debug!("Page {} has degenerate bounds {:?}", page_index, bounds);
        return None;
    };

    let mut surface = Surface::new(geometry.width, geometry.height)?;
    surface.fill(WHITE);

    let transform = geometry.transform(&bounds);
    if let Err(e) = engine.paint(&page, &mut surface, &transform) {
        debug!("Page {} failed to paint: {}", page_index, e);
        return None;
    }

    Some(PageImage::new(page_index, geometry.scale, surface.into_pixels()))
}
