//! Text recognition seam for searchable PDFs.
//!
//! The PDF exporter asks a [`TextRecognizer`] for the text of each rendered
//! page image and lays the result out as an invisible text layer. With the
//! `ocr` feature, [`OarRecognizer`] runs ONNX detection and recognition
//! models through `oar-ocr`; otherwise callers plug in their own engine.
//!
//! A failing recognizer only costs the text layer of that one page.

use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("recognition failed: {0}")]
    Failed(String),
    #[error("language '{0}' is not available")]
    UnsupportedLanguage(String),
    #[error("no {0} configured under [ocr]")]
    MissingModel(&'static str),
}

/// An OCR engine.
pub trait TextRecognizer {
    /// Recognize the text in `image`. `language` is a hint such as `"eng"`.
    fn recognize(&self, image: &RgbaImage, language: &str) -> Result<String, OcrError>;
}

/// Recognizer that always returns the same text. Useful when the text is
/// known up front, and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedText(pub String);

impl TextRecognizer for FixedText {
    fn recognize(&self, _image: &RgbaImage, _language: &str) -> Result<String, OcrError> {
        Ok(self.0.clone())
    }
}

#[cfg(feature = "ocr")]
pub use engine::OarRecognizer;

#[cfg(feature = "ocr")]
mod engine {
    use super::{OcrError, TextRecognizer};
    use crate::config::OcrConfig;
    use image::{ImageFormat, RgbaImage};
    use oar_ocr::pipeline::{OAROCR, OAROCRBuilder};
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::{debug, info};

    /// ONNX text detection + recognition. One model set serves one
    /// language, the one named in `[ocr] language`.
    pub struct OarRecognizer {
        pipeline: Mutex<OAROCR>,
        language: String,
    }

    fn model_path(path: Option<&Path>, what: &'static str) -> Result<String, OcrError> {
        path.map(|p| p.display().to_string())
            .ok_or(OcrError::MissingModel(what))
    }

    impl OarRecognizer {
        pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
            let detection = model_path(config.detection_model.as_deref(), "detection_model")?;
            let recognition =
                model_path(config.recognition_model.as_deref(), "recognition_model")?;
            let dictionary = model_path(config.dictionary.as_deref(), "dictionary")?;

            let pipeline = OAROCRBuilder::new(detection, recognition, dictionary)
                .text_detection_batch_size(1)
                .text_recognition_batch_size(1)
                .build()
                .map_err(|e| OcrError::Failed(e.to_string()))?;
            info!(language = %config.language, "OCR pipeline ready");
            Ok(Self {
                pipeline: Mutex::new(pipeline),
                language: config.language.clone(),
            })
        }
    }

    impl TextRecognizer for OarRecognizer {
        fn recognize(&self, image: &RgbaImage, language: &str) -> Result<String, OcrError> {
            if language != self.language {
                return Err(OcrError::UnsupportedLanguage(language.to_string()));
            }
            // the pipeline reads its input from disk
            let page = tempfile::Builder::new()
                .prefix("cropbatch-ocr-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| OcrError::Failed(e.to_string()))?;
            image
                .save_with_format(page.path(), ImageFormat::Png)
                .map_err(|e| OcrError::Failed(e.to_string()))?;

            let mut pipeline = self
                .pipeline
                .lock()
                .map_err(|_| OcrError::Failed("OCR pipeline lock poisoned".into()))?;
            let result = pipeline
                .predict(page.path())
                .map_err(|e| OcrError::Failed(e.to_string()))?;
            let lines: Vec<&str> = result
                .text_regions
                .iter()
                .filter_map(|region| region.text.as_deref())
                .collect();
            debug!(regions = lines.len(), "page recognized");
            Ok(lines.join("\n"))
        }
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word wrap at `budget` characters.
///
/// A word joins the current line while `line + ' ' + word` fits the budget;
/// the joining space always counts, so the first word of a line may use at
/// most `budget - 1` characters before it is placed alone. Words longer than
/// the budget get a line of their own and are never split.
pub fn wrap_lines(text: &str, budget: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = current.chars().count() + 1 + word.chars().count();
        if candidate <= budget {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
