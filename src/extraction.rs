//! Cascading PDF text extraction.
//!
//! Lease documents arrive as anything from clean digital PDFs to crooked
//! scans. Backends are tried in a fixed priority order behind a common trait;
//! the first one to produce non-empty text wins and its name travels with the
//! result. A backend error never aborts the cascade -- it is logged and the
//! next backend runs.

use crate::error::{LeaseError, Result};
use log::{debug, info, warn};
use lopdf::content::Content;
use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// `pdf-extract` text layer.
    PdfExtract,
    /// `lopdf` built-in per-page text extraction.
    LopdfText,
    /// `lopdf` content-stream walk with line grouping by text position.
    LopdfLayout,
    /// OCR over embedded page images (feature `ocr`).
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::PdfExtract => "pdf-extract",
            ExtractionMethod::LopdfText => "lopdf-text",
            ExtractionMethod::LopdfLayout => "lopdf-layout",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

/// Extracted text with the backend that produced it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub source_method: ExtractionMethod,
}

/// A single extraction backend. Implementations must be infallible at the
/// cascade level: returning `Err` just means "try the next one".
pub trait TextBackend {
    fn method(&self) -> ExtractionMethod;
    fn extract(&self, path: &Path) -> Result<String>;
}

pub struct TextExtractionCascade {
    backends: Vec<Box<dyn TextBackend>>,
}

impl Default for TextExtractionCascade {
    fn default() -> Self {
        let mut backends: Vec<Box<dyn TextBackend>> = vec![
            Box::new(PdfExtractBackend),
            Box::new(LopdfTextBackend),
            Box::new(LopdfLayoutBackend),
        ];
        #[cfg(feature = "ocr")]
        backends.push(Box::new(ocr::OcrBackend::default()));
        Self { backends }
    }
}

impl TextExtractionCascade {
    /// Build a cascade with an explicit backend order (used by tests and by
    /// callers that want to disable OCR).
    pub fn with_backends(backends: Vec<Box<dyn TextBackend>>) -> Self {
        Self { backends }
    }

    /// Try each backend in priority order and return the first non-empty
    /// result. All-fail is an `ExtractionFailed` error, recoverable by the
    /// caller (e.g. by asking for a re-upload).
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        if !path.exists() {
            return Err(LeaseError::ExtractionFailed(format!(
                "File {} does not exist",
                path.display()
            )));
        }

        for backend in &self.backends {
            let method = backend.method();
            debug!("Trying {} on {}", method.as_str(), path.display());
            match backend.extract(path) {
                Ok(text) if !text.trim().is_empty() => {
                    info!("{} extraction succeeded", method.as_str());
                    return Ok(ExtractedDocument {
                        text,
                        source_method: method,
                    });
                }
                Ok(_) => {
                    debug!("{} yielded no text", method.as_str());
                }
                Err(e) => {
                    warn!("{} failed: {}", method.as_str(), e);
                }
            }
        }

        Err(LeaseError::ExtractionFailed(format!(
            "All extraction backends failed for {}",
            path.display()
        )))
    }
}

struct PdfExtractBackend;

impl TextBackend for PdfExtractBackend {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PdfExtract
    }

    fn extract(&self, path: &Path) -> Result<String> {
        pdf_extract::extract_text(path)
            .map_err(|e| LeaseError::ExtractionFailed(e.to_string()))
    }
}

struct LopdfTextBackend;

impl TextBackend for LopdfTextBackend {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::LopdfText
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let doc = Document::load(path).map_err(|e| LeaseError::ExtractionFailed(e.to_string()))?;
        let mut text = String::new();
        for page_number in doc.get_pages().keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push_str("\n\n");
                }
                Err(e) => debug!("lopdf text extraction skipped page {}: {}", page_number, e),
            }
        }
        Ok(text)
    }
}

/// Walks the raw content streams and groups show-text operations into lines
/// by their vertical position. Catches documents whose text layer confuses
/// the simpler extractors (multi-column layouts, rotated blocks).
struct LopdfLayoutBackend;

impl TextBackend for LopdfLayoutBackend {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::LopdfLayout
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let doc = Document::load(path).map_err(|e| LeaseError::ExtractionFailed(e.to_string()))?;
        let mut pages = Vec::new();
        for (page_number, page_id) in doc.get_pages() {
            let content_data = doc
                .get_page_content(page_id)
                .map_err(|e| LeaseError::ExtractionFailed(e.to_string()))?;
            match Content::decode(&content_data) {
                Ok(content) => pages.push(page_text_from_content(&content)),
                Err(e) => debug!("layout walk skipped page {}: {}", page_number, e),
            }
        }
        Ok(pages.join("\n\n"))
    }
}

fn page_text_from_content(content: &Content) -> String {
    // (line_key, text) runs; line_key is the y position rounded to a point so
    // runs on the same baseline coalesce.
    let mut runs: Vec<(i64, String)> = Vec::new();
    let mut y = 0.0f64;

    for operation in &content.operations {
        match operation.operator.as_str() {
            "BT" => y = 0.0,
            "Td" | "TD" => {
                if let Some(ty) = operand_as_f64(operation.operands.get(1)) {
                    y += ty;
                }
            }
            "Tm" => {
                // Text matrix: operand 5 is the absolute y translation.
                if let Some(abs_y) = operand_as_f64(operation.operands.get(5)) {
                    y = abs_y;
                }
            }
            "T*" => y -= 1.0,
            "Tj" | "'" | "\"" => {
                for operand in &operation.operands {
                    if let Object::String(bytes, _) = operand {
                        runs.push((y.round() as i64, decode_text_bytes(bytes)));
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    let mut line = String::new();
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            line.push_str(&decode_text_bytes(bytes));
                        }
                    }
                    runs.push((y.round() as i64, line));
                }
            }
            _ => {}
        }
    }

    // Top of page has the largest y; stable sort keeps reading order within a line.
    runs.sort_by_key(|(line_y, _)| -line_y);

    let mut out = String::new();
    let mut last_y: Option<i64> = None;
    for (line_y, text) in runs {
        match last_y {
            Some(prev) if prev == line_y => out.push(' '),
            Some(_) => out.push('\n'),
            None => {}
        }
        out.push_str(&text);
        last_y = Some(line_y);
    }
    out
}

fn operand_as_f64(operand: Option<&Object>) -> Option<f64> {
    match operand {
        Some(Object::Integer(i)) => Some(*i as f64),
        Some(Object::Real(r)) => Some(*r as f64),
        _ => None,
    }
}

/// Best-effort string decode. Simple fonts store roughly-Latin bytes; CID
/// fonts need ToUnicode maps this walker does not chase, which is acceptable
/// for a mid-cascade fallback.
fn decode_text_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect()
}

#[cfg(feature = "ocr")]
pub use self::ocr::OcrBackend;

#[cfg(feature = "ocr")]
mod ocr {
    use super::{ExtractionMethod, TextBackend};
    use crate::error::{LeaseError, Result};
    use image::ImageFormat;
    use log::debug;
    use lopdf::{Document, Object};
    use std::io::Cursor;
    use std::path::Path;

    /// Last-resort backend for scanned leases: pulls embedded page images,
    /// binarizes them, and runs tesseract. Best-effort by design.
    pub struct OcrBackend {
        language: String,
        /// Fixed binarization threshold applied after grayscale conversion.
        threshold: u8,
    }

    impl Default for OcrBackend {
        fn default() -> Self {
            Self {
                language: "eng".to_string(),
                threshold: 150,
            }
        }
    }

    impl OcrBackend {
        pub fn with_language(mut self, language: impl Into<String>) -> Self {
            self.language = language.into();
            self
        }

        fn recognize(&self, image_bytes: &[u8]) -> Result<String> {
            let prepared = preprocess(image_bytes, self.threshold)?;
            let text = tesseract::Tesseract::new(None, Some(&self.language))
                .map_err(|e| LeaseError::ExtractionFailed(format!("Tesseract init: {}", e)))?
                .set_image_from_mem(&prepared)
                .map_err(|e| LeaseError::ExtractionFailed(format!("Tesseract image: {}", e)))?
                .recognize()
                .map_err(|e| LeaseError::ExtractionFailed(format!("Tesseract recognize: {}", e)))?
                .get_text()
                .map_err(|e| LeaseError::ExtractionFailed(format!("OCR text: {}", e)))?;
            Ok(text)
        }
    }

    impl TextBackend for OcrBackend {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::Ocr
        }

        fn extract(&self, path: &Path) -> Result<String> {
            let doc =
                Document::load(path).map_err(|e| LeaseError::ExtractionFailed(e.to_string()))?;
            let mut text = String::new();
            for (page_number, page_id) in doc.get_pages() {
                for image_bytes in embedded_page_images(&doc, page_id) {
                    match self.recognize(&image_bytes) {
                        Ok(page_text) => {
                            text.push_str(&page_text);
                            text.push_str("\n\n");
                        }
                        Err(e) => debug!("OCR skipped an image on page {}: {}", page_number, e),
                    }
                }
            }
            Ok(text)
        }
    }

    /// Grayscale + fixed-threshold binarization before recognition; raises
    /// the hit rate on low-contrast scans.
    fn preprocess(image_bytes: &[u8], threshold: u8) -> Result<Vec<u8>> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| LeaseError::ExtractionFailed(format!("Image decode: {}", e)))?;
        let mut gray = img.to_luma8();
        for pixel in gray.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
        }
        let mut out = Vec::new();
        gray.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| LeaseError::ExtractionFailed(format!("Image encode: {}", e)))?;
        Ok(out)
    }

    /// Scanned PDFs typically store each page as one image XObject. Only
    /// JPEG (DCTDecode) streams are handed to the decoder directly; other
    /// filters are skipped.
    fn embedded_page_images(doc: &Document, page_id: lopdf::ObjectId) -> Vec<Vec<u8>> {
        let mut images = Vec::new();
        let (resource_dict, resource_ids) = doc.get_page_resources(page_id);

        let mut xobject_ids = Vec::new();
        if let Some(dict) = resource_dict {
            collect_xobject_ids(dict, &mut xobject_ids);
        }
        for resource_id in resource_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object(resource_id) {
                collect_xobject_ids(dict, &mut xobject_ids);
            }
        }

        for object_id in xobject_ids {
            if let Ok(Object::Stream(stream)) = doc.get_object(object_id) {
                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .and_then(|s| s.as_name())
                    .map(|n| n == b"Image".as_slice())
                    .unwrap_or(false);
                let is_jpeg = stream
                    .dict
                    .get(b"Filter")
                    .and_then(|f| f.as_name())
                    .map(|n| n == b"DCTDecode".as_slice())
                    .unwrap_or(false);
                if is_image && is_jpeg {
                    images.push(stream.content.clone());
                }
            }
        }
        images
    }

    fn collect_xobject_ids(dict: &lopdf::Dictionary, out: &mut Vec<lopdf::ObjectId>) {
        if let Ok(Object::Dictionary(xobjects)) = dict.get(b"XObject") {
            for (_, value) in xobjects.iter() {
                if let Object::Reference(id) = value {
                    out.push(*id);
                }
            }
        }
    }
}
