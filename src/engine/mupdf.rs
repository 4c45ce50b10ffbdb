//! MuPDF-backed raster engine
//!
//! MuPDF documents are not thread-safe, so the handle stores only the source
//! path and the accepted credential. Every operation opens a fresh
//! `mupdf::Document`, re-authenticates, and drops it when done.

use std::path::{Path, PathBuf};

use ::mupdf::{Colorspace, Document, Matrix, Pixmap};
use image::Rgba;
use tracing::debug;

use super::{PageRect, RasterEngine};
use crate::error::{PreviewError, Result};
use crate::render::{Surface, Transform};

/// Stateless engine; all document state lives in [`MupdfHandle`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    pub fn new() -> Self {
        Self
    }
}

pub struct MupdfHandle {
    path: PathBuf,
    /// Credential that unlocked the document, replayed on every reopen
    credential: Option<String>,
    encrypted: bool,
    unlocked: bool,
    page_count: usize,
}

impl MupdfHandle {
    fn open_document(&self) -> Result<Document> {
        reopen(&self.path, self.credential.as_deref())
    }
}

/// Open `path` again and replay the credential that unlocked it
fn reopen(path: &Path, credential: Option<&str>) -> Result<Document> {
    let path_str = path.to_string_lossy();
    let mut doc = Document::open(&*path_str)?;
    if let Some(credential) = credential {
        if !doc.authenticate(credential)? {
            return Err(PreviewError::Engine(format!(
                "credential no longer unlocks {}",
                path.display()
            )));
        }
    }
    Ok(doc)
}

/// Page descriptor; content is reloaded from the document when painting
pub struct MupdfPage {
    handle_path: PathBuf,
    credential: Option<String>,
    page_index: usize,
    bounds: PageRect,
    /// Content streams are unreadable; painting leaves the surface blank
    locked: bool,
}

impl RasterEngine for MupdfEngine {
    type Handle = MupdfHandle;
    type Page = MupdfPage;

    fn open(&self, location: &Path) -> Result<Self::Handle> {
        let path_str = location.to_string_lossy();
        let doc = Document::open(&*path_str)
            .map_err(|e| PreviewError::open(path_str.to_string(), e))?;
        let encrypted = doc
            .needs_password()
            .map_err(|e| PreviewError::open(path_str.to_string(), e))?;

        let page_count = match doc.page_count() {
            Ok(count) => count.max(0) as usize,
            Err(e) => {
                debug!("MuPDF could not count pages of {}: {}", path_str, e);
                0
            }
        };

        Ok(MupdfHandle {
            path: location.to_path_buf(),
            credential: None,
            encrypted,
            unlocked: !encrypted,
            page_count,
        })
    }

    fn is_encrypted(&self, doc: &Self::Handle) -> bool {
        doc.encrypted
    }

    fn is_unlocked(&self, doc: &Self::Handle) -> bool {
        doc.unlocked
    }

    fn unlock(&self, doc: &mut Self::Handle, credential: &[u8]) -> bool {
        let credential = String::from_utf8_lossy(credential).into_owned();

        let attempt = Document::open(&*doc.path.to_string_lossy()).and_then(|mut fresh| {
            if !fresh.authenticate(&credential)? {
                return Ok(None);
            }
            Ok(Some(fresh.page_count().ok()))
        });

        match attempt {
            Ok(Some(page_count)) => {
                doc.credential = Some(credential);
                doc.unlocked = true;
                if let Some(count) = page_count {
                    doc.page_count = count.max(0) as usize;
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!("MuPDF authentication error for {}: {}", doc.path.display(), e);
                false
            }
        }
    }

    fn page_count(&self, doc: &Self::Handle) -> usize {
        doc.page_count
    }

    fn page(&self, doc: &Self::Handle, page_index: usize) -> Option<Self::Page> {
        let zero_based = i32::try_from(page_index.checked_sub(1)?).ok()?;
        let loaded = doc
            .open_document()
            .and_then(|d| Ok(d.load_page(zero_based)?.bounds()?));

        match loaded {
            Ok(rect) => Some(MupdfPage {
                handle_path: doc.path.clone(),
                credential: doc.credential.clone(),
                page_index,
                bounds: PageRect::new(rect.x0, rect.y0, rect.x1, rect.y1),
                locked: !doc.unlocked,
            }),
            Err(e) => {
                debug!("MuPDF could not load page {}: {}", page_index, e);
                None
            }
        }
    }

    fn page_bounds(&self, page: &Self::Page) -> Option<PageRect> {
        Some(page.bounds)
    }

    fn paint(&self, page: &Self::Page, surface: &mut Surface, transform: &Transform) -> Result<()> {
        if page.locked {
            return Ok(());
        }

        let doc = reopen(&page.handle_path, page.credential.as_deref())?;
        let mupdf_page = doc.load_page((page.page_index - 1) as i32)?;

        // MuPDF page space is already top-down: the flip folds away and only
        // the uniform scale of the preview transform remains.
        let matrix = Matrix::new_scale(transform.a, -transform.d);
        let colorspace = Colorspace::device_rgb();
        let pixmap = mupdf_page.to_pixmap(&matrix, &colorspace, false, false)?;

        blit_pixmap(&pixmap, surface);
        Ok(())
    }
}

/// Copy MuPDF samples onto the surface, clipped to the smaller of the two
fn blit_pixmap(pixmap: &Pixmap, surface: &mut Surface) {
    let width = (pixmap.width() as u32).min(surface.width());
    let height = (pixmap.height() as u32).min(surface.height());
    let stride = pixmap.width() as usize;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let pixels = surface.pixels_mut();
    for y in 0..height {
        for x in 0..width {
            let offset = (y as usize * stride + x as usize) * n;
            let r = samples.get(offset).copied().unwrap_or(255);
            let g = samples.get(offset + 1).copied().unwrap_or(255);
            let b = samples.get(offset + 2).copied().unwrap_or(255);
            pixels.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{self, WHITE};

    /// Single empty US Letter page
    const MINIMAL_PDF: &[u8] = b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj
3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >>
endobj
4 0 obj
<< /Length 0 >>
stream
endstream
endobj
xref
0 5
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000115 00000 n
0000000226 00000 n
trailer
<< /Size 5 /Root 1 0 R >>
startxref
276
%%EOF";

    fn write_pdf(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("letter.pdf");
        std::fs::write(&path, MINIMAL_PDF).unwrap();
        path
    }

    #[test]
    fn test_open_minimal_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MupdfEngine::new();
        let handle = engine.open(&write_pdf(&dir)).unwrap();

        assert!(!engine.is_encrypted(&handle));
        assert!(engine.is_unlocked(&handle));
        assert_eq!(engine.page_count(&handle), 1);
    }

    #[test]
    fn test_page_mapping_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MupdfEngine::new();
        let handle = engine.open(&write_pdf(&dir)).unwrap();

        assert!(engine.page(&handle, 0).is_none());
        assert!(engine.page(&handle, 2).is_none());

        let page = engine.page(&handle, 1).unwrap();
        let bounds = engine.page_bounds(&page).unwrap();
        assert_eq!((bounds.width(), bounds.height()), (612.0, 792.0));
    }

    #[test]
    fn test_render_letter_preview() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MupdfEngine::new();
        let handle = engine.open(&write_pdf(&dir)).unwrap();

        let image = render::render_page(&engine, &handle, 1, 1, 240.0).unwrap();
        assert_eq!((image.width(), image.height()), (185, 240));
        assert!(image.is_uniform());
        assert_eq!(image.pixel(92, 120), WHITE);
    }

    #[test]
    fn test_locked_page_paints_blank() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MupdfEngine::new();
        let handle = engine.open(&write_pdf(&dir)).unwrap();

        let mut page = engine.page(&handle, 1).unwrap();
        page.locked = true;
        // A missing file proves the native document is never reopened
        page.handle_path = dir.path().join("gone.pdf");

        let mut surface = Surface::new(185, 240).unwrap();
        surface.fill(WHITE);
        let transform = Transform::scale(0.3, 0.3);
        assert!(engine.paint(&page, &mut surface, &transform).is_ok());
        assert!(surface.pixels().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_stale_credential_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir);

        // Unencrypted files accept any credential
        assert!(reopen(&path, Some("anything")).is_ok());
        assert!(reopen(&dir.path().join("gone.pdf"), None).is_err());
    }

    #[test]
    fn test_blit_clips_to_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir);
        let doc = reopen(&path, None).unwrap();
        let page = doc.load_page(0).unwrap();
        let pixmap = page
            .to_pixmap(&Matrix::new_scale(0.5, 0.5), &Colorspace::device_rgb(), false, false)
            .unwrap();

        let mut surface = Surface::new(10, 10).unwrap();
        surface.fill(Rgba([0, 0, 0, 255]));
        blit_pixmap(&pixmap, &mut surface);
        assert!(surface.pixels().pixels().all(|p| *p == WHITE));
    }
}
