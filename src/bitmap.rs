//! Rendered page bitmaps

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::Result;

/// Low-resolution preview of a single page
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    page_index: usize,
    scale: f32,
    pixels: RgbaImage,
}

impl PageImage {
    pub fn new(page_index: usize, scale: f32, pixels: RgbaImage) -> Self {
        Self {
            page_index,
            scale,
            pixels,
        }
    }

    /// 1-based page index this preview was rendered from
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Uniform user-space to pixel scale used for the preview
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// True when every pixel has the same color (e.g. a locked or empty page)
    pub fn is_uniform(&self) -> bool {
        let mut pixels = self.pixels.pixels();
        match pixels.next() {
            Some(first) => pixels.all(|p| p == first),
            None => true,
        }
    }

    /// Same dimensions, same scale and identical pixels
    pub fn same_content(&self, other: &PageImage) -> bool {
        self.scale == other.scale && self.pixels == other.pixels
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
        Ok(output)
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.pixels.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}
