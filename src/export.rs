//! Export module.
//! Writes finalized pages plus the pending tail either as one PDF (one image per
//! paper page, scaled to the paper width) or as numbered PNG files.
//! The output format is picked from the file extension.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use thiserror::Error;
use tracing::{debug, info};

use crate::pager::Page;
use crate::paper::PaperSize;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown file format for {0} (expected .pdf or .png)")]
    UnsupportedFormat(PathBuf),

    #[error("nothing captured yet")]
    Empty,

    #[error("failed to write {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    PngSequence,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(ExportFormat::Pdf),
            Some("png") => Ok(ExportFormat::PngSequence),
            _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub format: ExportFormat,
    /// Paper pages or image files written.
    pub pages: usize,
    pub files: Vec<PathBuf>,
}

/// Exports `pages` followed by `tail` to `path`. An empty tail is skipped.
pub fn export(path: &Path, pages: &[Page], tail: &RgbImage, paper: PaperSize) -> Result<ExportSummary, ExportError> {
    let format = ExportFormat::from_path(path)?;
    let images = collect(pages, tail);
    if images.is_empty() {
        return Err(ExportError::Empty);
    }

    let summary = match format {
        ExportFormat::Pdf => export_pdf(path, &images, paper)?,
        ExportFormat::PngSequence => export_sequence(path, &images)?,
    };
    info!(path = %path.display(), pages = summary.pages, ?format, "export finished");
    Ok(summary)
}

fn collect<'a>(pages: &'a [Page], tail: &'a RgbImage) -> Vec<&'a RgbImage> {
    let mut images: Vec<&RgbImage> = pages.iter().map(|p| &**p).collect();
    if tail.height() > 0 && tail.width() > 0 {
        images.push(tail);
    }
    images
}

/// One PDF page per image. Each image is scaled to the paper width and anchored
/// at the top-left corner.
pub fn export_pdf(path: &Path, images: &[&RgbImage], paper: PaperSize) -> Result<ExportSummary, ExportError> {
    let (paper_w, paper_h) = paper.dimensions_pt();
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(images.len());
    for image in images {
        let scale = paper_w / image.width() as f32;
        let drawn_w = image.width() as f32 * scale;
        let drawn_h = image.height() as f32 * scale;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width()),
                "Height" => i64::from(image.height()),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            image.as_raw().clone(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        drawn_w.into(),
                        0.into(),
                        0.into(),
                        drawn_h.into(),
                        0.into(),
                        (paper_h - drawn_h).into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let media_box: Vec<Object> = vec![0.into(), 0.into(), paper_w.into(), paper_h.into()];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => media_box,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    doc.save(path)?;

    Ok(ExportSummary {
        format: ExportFormat::Pdf,
        pages: images.len(),
        files: vec![path.to_path_buf()],
    })
}

/// Writes `<stem>-0000.png`, `<stem>-0001.png`, ... next to `path`.
/// Stops at the first failing file; files already written are kept.
pub fn export_sequence(path: &Path, images: &[&RgbImage]) -> Result<ExportSummary, ExportError> {
    let mut files = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let file = sequence_path(path, index);
        image.save(&file).map_err(|source| ExportError::Image {
            path: file.clone(),
            source,
        })?;
        debug!(file = %file.display(), "page written");
        files.push(file);
    }

    Ok(ExportSummary {
        format: ExportFormat::PngSequence,
        pages: files.len(),
        files,
    })
}

/// `shot.png` -> `shot-0003.png` for index 3.
pub fn sequence_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}-{index:04}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::tests::{scroll_content, window};
    use image::imageops;
    use std::sync::Arc;

    fn split(content: &RgbImage, heights: &[u32]) -> (Vec<Page>, RgbImage) {
        let mut top = 0;
        let mut pages = Vec::new();
        for &h in heights {
            pages.push(Arc::new(window(content, top, h)));
            top += h;
        }
        let tail = window(content, top, content.height() - top);
        (pages, tail)
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a/b.PDF")).unwrap(), ExportFormat::Pdf);
        assert_eq!(ExportFormat::from_path(Path::new("b.png")).unwrap(), ExportFormat::PngSequence);
        assert!(matches!(
            ExportFormat::from_path(Path::new("b.jpg")),
            Err(ExportError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ExportFormat::from_path(Path::new("noext")),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn sequence_names_are_zero_padded() {
        assert_eq!(sequence_path(Path::new("/tmp/out.png"), 7), PathBuf::from("/tmp/out-0007.png"));
        assert_eq!(sequence_path(Path::new("doc.PNG"), 12), PathBuf::from("doc-0012.png"));
    }

    #[test]
    fn png_sequence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(20, 530);
        let (pages, tail) = split(&content, &[200, 180, 120]);

        let summary = export(&dir.path().join("scroll.png"), &pages, &tail, PaperSize::A4).unwrap();
        assert_eq!(summary.pages, 4);

        let mut rebuilt = RgbImage::new(20, 530);
        let mut y = 0i64;
        for file in &summary.files {
            let part = image::open(file).unwrap().to_rgb8();
            imageops::replace(&mut rebuilt, &part, 0, y);
            y += i64::from(part.height());
        }
        assert_eq!(y, 530);
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn empty_tail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(10, 300);
        let (pages, tail) = split(&content, &[150, 150]);
        assert_eq!(tail.height(), 0);

        let summary = export(&dir.path().join("x.png"), &pages, &tail, PaperSize::A4).unwrap();

        assert_eq!(summary.files.len(), 2);
        assert!(!dir.path().join("x-0002.png").exists());
    }

    #[test]
    fn pdf_has_one_page_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(30, 400);
        let (pages, tail) = split(&content, &[150, 150]);
        let path = dir.path().join("doc.pdf");

        let summary = export(&path, &pages, &tail, PaperSize::Letter).unwrap();
        assert_eq!(summary.pages, 3);

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn pdf_skips_empty_tail() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(30, 300);
        let (pages, tail) = split(&content, &[150, 150]);
        assert_eq!(tail.height(), 0);
        let path = dir.path().join("doc.pdf");

        let summary = export(&path, &pages, &tail, PaperSize::A4).unwrap();
        assert_eq!(summary.pages, pages.len());

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), pages.len());
    }

    #[test]
    fn unknown_format_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(10, 100);
        let (pages, tail) = split(&content, &[50]);

        let err = export(&dir.path().join("x.tiff"), &pages, &tail, PaperSize::A4).unwrap_err();

        assert!(matches!(err, ExportError::UnsupportedFormat(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_page_keeps_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = scroll_content(10, 300);
        let (pages, tail) = split(&content, &[100, 100]);
        // A directory squatting on the second file name makes that write fail.
        fs::create_dir(dir.path().join("x-0001.png")).unwrap();

        let err = export(&dir.path().join("x.png"), &pages, &tail, PaperSize::A4).unwrap_err();

        assert!(matches!(err, ExportError::Image { .. }));
        assert!(dir.path().join("x-0000.png").exists());
        assert!(!dir.path().join("x-0002.png").exists());
    }

    #[test]
    fn nothing_to_export() {
        let err = export(Path::new("x.pdf"), &[], &RgbImage::new(0, 0), PaperSize::A4).unwrap_err();
        assert!(matches!(err, ExportError::Empty));
    }
}
