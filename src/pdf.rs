//! PDF assembly for batch exports.
//!
//! One page per exported image. The image is embedded as a JPEG XObject
//! (`DCTDecode`), fitted inside the page margin with its aspect ratio kept
//! and centered on both axes.
//!
//! An optional text layer carries recognized text for search and selection.
//! It is drawn in rendering mode 3 (neither filled nor stroked), so it is
//! selectable but never visible. Layout, in page millimetres from the top:
//!
//! ```text
//! line i baseline = image.y + text_offset + i * line_spacing
//! dropped when     baseline >= page_height - margin
//! ```
//!
//! Page geometry is configured in millimetres ([`PdfConfig`]) and converted
//! to PDF points (1/72 in) only when content streams are written.

use crate::archive::AssemblyError;
use crate::config::{OcrConfig, PdfConfig};
use crate::imaging::calculations::{Placement, fit_to_page};
use crate::types::{Dimensions, Size};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::debug;

const POINTS_PER_MM: f64 = 72.0 / 25.4;

fn pt(mm: f64) -> f32 {
    (mm * POINTS_PER_MM) as f32
}

/// One page's worth of input.
#[derive(Debug, Clone)]
struct PageSpec {
    jpeg: Vec<u8>,
    pixels: Dimensions,
    text_lines: Vec<String>,
}

/// Collects pages and writes the document on [`PdfAssembler::finish`].
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    page: PdfConfig,
    text: OcrConfig,
    pages: Vec<PageSpec>,
}

impl PdfAssembler {
    pub fn new(page: PdfConfig, text: OcrConfig) -> Self {
        Self {
            page,
            text,
            pages: Vec::new(),
        }
    }

    fn page_size(&self) -> Size {
        Size {
            width: self.page.page_width_mm,
            height: self.page.page_height_mm,
        }
    }

    /// Where an image of `pixels` lands on the page, in millimetres.
    pub fn placement(&self, pixels: Dimensions) -> Placement {
        fit_to_page(pixels, self.page_size(), self.page.margin_mm)
    }

    /// Baseline offsets (mm from the page top) of the text lines that fit
    /// below `placement`'s top edge.
    pub fn text_baselines(&self, placement: &Placement, lines: usize) -> Vec<f64> {
        let limit = self.page.page_height_mm - self.page.margin_mm;
        (0..lines)
            .map(|i| placement.y + self.text.text_offset_mm + i as f64 * self.text.line_spacing_mm)
            .take_while(|y| *y < limit)
            .collect()
    }

    /// Queue a page. `text_lines` may be empty for an image-only page.
    pub fn add_page(&mut self, jpeg: Vec<u8>, pixels: Dimensions, text_lines: Vec<String>) {
        self.pages.push(PageSpec {
            jpeg,
            pixels,
            text_lines,
        });
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Write the document. A document with no queued pages gets one blank
    /// page.
    pub fn finish(self) -> Result<Vec<u8>, AssemblyError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            pt(self.page.page_width_mm).into(),
            pt(self.page.page_height_mm).into(),
        ];

        let mut kids: Vec<Object> = Vec::new();
        for (i, page) in self.pages.iter().enumerate() {
            let page_id = self.write_page(&mut doc, pages_id, font_id, page)?;
            debug!(page = i + 1, lines = page.text_lines.len(), "pdf page written");
            kids.push(page_id.into());
        }
        if kids.is_empty() {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
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

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
        Ok(buffer)
    }

    fn write_page(
        &self,
        doc: &mut Document,
        pages_id: ObjectId,
        font_id: ObjectId,
        page: &PageSpec,
    ) -> Result<ObjectId, AssemblyError> {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.pixels.width as i64,
                "Height" => page.pixels.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg.clone(),
        ));

        let placement = self.placement(page.pixels);
        let page_h = self.page.page_height_mm;
        // PDF space has its origin at the bottom-left
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    pt(placement.width).into(),
                    0.into(),
                    0.into(),
                    pt(placement.height).into(),
                    pt(placement.x).into(),
                    pt(page_h - placement.y - placement.height).into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ];

        let baselines = self.text_baselines(&placement, page.text_lines.len());
        if !baselines.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec!["F1".into(), (self.text.font_size_pt as f32).into()],
            ));
            operations.push(Operation::new("Tr", vec![3.into()]));
            for (line, y) in page.text_lines.iter().zip(baselines) {
                operations.push(Operation::new(
                    "Tm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        pt(placement.x).into(),
                        pt(page_h - y).into(),
                    ],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(line), StringFormat::Literal)],
                ));
            }
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
                "Font" => dictionary! { "F1" => font_id },
            },
        }))
    }
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{ImageBackend, OutputFormat, Quality, RustBackend};
    use crate::test_helpers::gradient_image;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        RustBackend::new()
            .encode(&gradient_image(width, height), OutputFormat::Jpeg(Quality::new(80)))
            .unwrap()
    }

    fn assembler() -> PdfAssembler {
        PdfAssembler::new(PdfConfig::default(), OcrConfig::default())
    }

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn page_text(bytes: &[u8], page: u32) -> Vec<u8> {
        let doc = Document::load_mem(bytes).unwrap();
        let pages = doc.get_pages();
        doc.get_page_content(pages[&page]).unwrap()
    }

    // =========================================================================
    // Layout
    // =========================================================================

    #[test]
    fn landscape_image_fills_width_inside_margin() {
        let p = assembler().placement(dims(400, 200));
        assert!((p.width - 190.0).abs() < 1e-9);
        assert!((p.height - 95.0).abs() < 1e-9);
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!((p.y - (297.0 - 95.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn portrait_image_fills_height_inside_margin() {
        let p = assembler().placement(dims(100, 400));
        assert!((p.height - 277.0).abs() < 1e-9);
        assert!((p.width - 69.25).abs() < 1e-9);
    }

    #[test]
    fn text_lines_past_bottom_margin_are_dropped() {
        let a = assembler();
        let placement = Placement {
            x: 10.0,
            y: 250.0,
            width: 100.0,
            height: 20.0,
        };
        // 260, 268, 276, 284 fit; 292 >= 287 does not
        let baselines = a.text_baselines(&placement, 10);
        assert_eq!(baselines, vec![260.0, 268.0, 276.0, 284.0]);
    }

    // =========================================================================
    // Document output
    // =========================================================================

    #[test]
    fn one_page_per_image_in_order() {
        let mut a = assembler();
        a.add_page(jpeg(40, 20), dims(40, 20), vec![]);
        a.add_page(jpeg(20, 40), dims(20, 40), vec![]);
        a.add_page(jpeg(30, 30), dims(30, 30), vec![]);
        assert_eq!(a.page_count(), 3);

        let bytes = a.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn text_layer_is_invisible_and_one_show_per_line() {
        let mut a = assembler();
        a.add_page(
            jpeg(40, 20),
            dims(40, 20),
            vec!["first line".into(), "second line".into()],
        );
        let content = Content::decode(&page_text(&a.finish().unwrap(), 1)).unwrap();
        let ops: Vec<&str> = content.operations.iter().map(|o| o.operator.as_str()).collect();

        assert!(ops.contains(&"Do"));
        assert_eq!(ops.iter().filter(|o| **o == "Tj").count(), 2);
        let tr = content
            .operations
            .iter()
            .find(|o| o.operator == "Tr")
            .unwrap();
        assert_eq!(tr.operands[0].as_i64().unwrap(), 3);
    }

    #[test]
    fn image_only_page_has_no_text_object() {
        let mut a = assembler();
        a.add_page(jpeg(40, 20), dims(40, 20), vec![]);
        let content = Content::decode(&page_text(&a.finish().unwrap(), 1)).unwrap();
        assert!(!content.operations.iter().any(|o| o.operator == "BT"));
    }

    #[test]
    fn empty_document_has_one_blank_page() {
        let bytes = assembler().finish().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(win_ansi("café ✓"), b"caf\xe9 ?".to_vec());
    }
}
