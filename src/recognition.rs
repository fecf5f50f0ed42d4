// The recognition engine itself is an external collaborator. Two engines are
// provided: a Tesseract-backed one behind the `ocr` feature, and a stub that
// recognizes nothing, so builds without system Tesseract/Leptonica still work.

use async_trait::async_trait;
use image::DynamicImage;
use tracing::warn;

pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Contract for the optical-text-recognition engine: given a bitmap, return
/// the recognized text regions in the engine's own detection order.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize_regions(&self, image: &DynamicImage) -> Result<Vec<String>, EngineError>;
}

#[async_trait]
impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    async fn recognize_regions(&self, image: &DynamicImage) -> Result<Vec<String>, EngineError> {
        (**self).recognize_regions(image).await
    }
}

/// Wraps the engine for the capture pipeline: joins the recognized regions
/// with a single space, preserving engine order, and maps every failure mode
/// (engine error, nothing detected) to the empty string. Downstream stages
/// treat empty text as "no data available", never as an error.
pub struct RecognitionAdapter<E> {
    engine: E,
}

impl<E: TextRecognizer> RecognitionAdapter<E> {
    pub fn new(engine: E) -> Self {
        RecognitionAdapter { engine }
    }

    pub async fn recognize(&self, image: &DynamicImage) -> String {
        match self.engine.recognize_regions(image).await {
            Ok(regions) => regions.join(" "),
            Err(e) => {
                warn!(error = %e, "Recognition engine failed, continuing without text");
                String::new()
            }
        }
    }
}

/// Engine used when the `ocr` feature is disabled: detects no text, so every
/// scan falls back to manual entry.
pub struct NullRecognizer;

#[async_trait]
impl TextRecognizer for NullRecognizer {
    async fn recognize_regions(&self, _image: &DynamicImage) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "ocr")]
mod real {
    use super::{EngineError, TextRecognizer};
    use async_trait::async_trait;
    use image::DynamicImage;
    use leptess::LepTess;

    pub struct TesseractRecognizer {
        language: String,
    }

    impl TesseractRecognizer {
        pub fn new(language: impl Into<String>) -> Self {
            TesseractRecognizer {
                language: language.into(),
            }
        }
    }

    #[async_trait]
    impl TextRecognizer for TesseractRecognizer {
        async fn recognize_regions(
            &self,
            image: &DynamicImage,
        ) -> Result<Vec<String>, EngineError> {
            // Tesseract wants a file, not pixels; hand the bitmap over as a
            // lossless temp PNG.
            let tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
            image.save_with_format(tmp.path(), image::ImageFormat::Png)?;

            let mut lt = LepTess::new(None, &self.language)?;
            lt.set_image(tmp.path())?;
            let text = lt.get_utf8_text()?;

            Ok(text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect())
        }
    }
}

#[cfg(feature = "ocr")]
pub use real::TesseractRecognizer;

#[cfg(feature = "ocr")]
pub fn default_engine(language: &str) -> Box<dyn TextRecognizer> {
    Box::new(TesseractRecognizer::new(language))
}

#[cfg(not(feature = "ocr"))]
pub fn default_engine(_language: &str) -> Box<dyn TextRecognizer> {
    Box::new(NullRecognizer)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Engine that always reports the same regions.
    pub struct FixedRecognizer(pub Vec<&'static str>);

    #[async_trait]
    impl TextRecognizer for FixedRecognizer {
        async fn recognize_regions(
            &self,
            _image: &DynamicImage,
        ) -> Result<Vec<String>, EngineError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    /// Engine that always fails internally.
    pub struct FailingRecognizer;

    #[async_trait]
    impl TextRecognizer for FailingRecognizer {
        async fn recognize_regions(
            &self,
            _image: &DynamicImage,
        ) -> Result<Vec<String>, EngineError> {
            Err("engine exploded".into())
        }
    }
}
