pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::{BackendLauncher, EngineState, OcrBackend, Recognition, RecognitionEngine};
pub use preprocess::{PreprocessOptions, Rect};
pub use setup::TesseractLauncher;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{ExtractionLogService, FieldMapping};
use crate::config::AppConfig;
use crate::error::{OcrError, Result};
use crate::fields::{self, DocumentType, FieldResult};
use crate::paths;
use crate::storage::{JsonDirStore, KeyValueStore, SelectionHistoryStore, SelectionRecord};

/// Whole-document extraction output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Full recognized text
    pub text: String,
    /// Engine-level confidence in [0, 1]
    pub confidence: f32,
    pub fields: BTreeMap<String, FieldResult>,
}

/// Owns the recognition engine, the selection history and the extraction
/// log for one process, and runs both extraction paths through them.
pub struct ExtractionService {
    engine: RecognitionEngine,
    history: SelectionHistoryStore,
    log: ExtractionLogService,
    document_preprocess: PreprocessOptions,
    region_preprocess: PreprocessOptions,
    min_selection_size: u32,
}

impl ExtractionService {
    pub fn new(engine: RecognitionEngine, store: Arc<dyn KeyValueStore>, config: &AppConfig) -> Self {
        engine.set_document_type(config.default_document_type);
        Self {
            engine,
            history: SelectionHistoryStore::new(Arc::clone(&store)),
            log: ExtractionLogService::new(store),
            document_preprocess: config.document_preprocess,
            region_preprocess: config.region_preprocess,
            min_selection_size: config.min_selection_size,
        }
    }

    /// Tesseract-backed service persisting under the configured data dir.
    pub fn from_config(config: &AppConfig) -> Self {
        let data_dir = config.data_dir();
        let launcher = TesseractLauncher::new(config.tesseract.clone(), &data_dir);
        let store = JsonDirStore::new(paths::store_dir(&data_dir));
        Self::new(
            RecognitionEngine::new(Arc::new(launcher)),
            Arc::new(store),
            config,
        )
    }

    pub fn engine(&self) -> &RecognitionEngine {
        &self.engine
    }

    pub fn log(&self) -> &ExtractionLogService {
        &self.log
    }

    pub fn history(&self) -> &SelectionHistoryStore {
        &self.history
    }

    pub fn selection_history(&self, image_id: &str) -> Vec<SelectionRecord> {
        self.history.get(image_id)
    }

    /// Extracts all fields using the engine's ambient document type.
    pub async fn extract_document(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        self.extract_document_as(bytes, self.engine.document_type()).await
    }

    /// Extracts all fields of `document_type` from a whole document image.
    ///
    /// The attempt is logged whether recognition succeeds or fails.
    pub async fn extract_document_as(
        &self,
        bytes: &[u8],
        document_type: DocumentType,
    ) -> Result<ExtractionResult> {
        let img = preprocess::decode(bytes)?;
        let normalized = preprocess::normalize(&img, &self.document_preprocess);

        let recognition = match self.engine.recognize(normalized).await {
            Ok(recognition) => recognition,
            Err(e) => {
                self.log.log_attempt(document_type, Vec::new(), false);
                return Err(e);
            }
        };

        let fields = fields::extract_fields(&recognition.text, document_type);
        let success = !fields.is_empty();
        self.log
            .log_attempt(document_type, FieldMapping::from_fields(&fields), success);

        info!(
            "{} extraction: {} fields (engine conf: {:.2})",
            document_type,
            fields.len(),
            recognition.confidence
        );

        Ok(ExtractionResult {
            text: recognition.text,
            confidence: recognition.confidence,
            fields,
        })
    }

    /// Recognizes one selected rectangle and returns the canonical value of
    /// `field_key`.
    ///
    /// Selections smaller than the minimum size fail before any recognition.
    /// When the field pattern does not match, the trimmed recognized text is
    /// used instead.
    pub async fn extract_region(
        &self,
        bytes: &[u8],
        image_id: &str,
        rect: Rect,
        field_key: &str,
        document_type: DocumentType,
    ) -> Result<String> {
        let min = self.min_selection_size;
        if rect.width < min || rect.height < min {
            return Err(OcrError::Validation {
                width: rect.width,
                height: rect.height,
                min,
            });
        }

        let img = preprocess::decode(bytes)?;
        let cropped = preprocess::crop(&img, &rect)?;
        let normalized = preprocess::normalize(&cropped, &self.region_preprocess);

        let recognition = match self.engine.recognize(normalized).await {
            Ok(recognition) => recognition,
            Err(e) => {
                self.log
                    .log_field_mapping_for(document_type, field_key, "", 0.0);
                return Err(e);
            }
        };

        let raw = match fields::match_field(&recognition.text, field_key, document_type) {
            Some(captured) => captured,
            None => {
                debug!(
                    "Pattern for {} did not match region text, using raw text",
                    field_key
                );
                recognition.text.trim().to_string()
            }
        };

        let value = fields::format(&raw, field_key);
        let confidence = fields::score(&value, field_key, document_type);

        self.history.record(image_id, rect, field_key, &value);
        self.log
            .log_field_mapping_for(document_type, field_key, &value, confidence);

        if value.is_empty() {
            warn!("Region {:?} on {} produced no text for {}", rect, image_id, field_key);
        }

        Ok(value)
    }

    /// Releases the recognition engine. Call once at session end.
    pub async fn shutdown(&self) {
        self.engine.terminate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LogAction;
    use crate::storage::MemoryStore;
    use anyhow::anyhow;
    use image::RgbaImage;

    struct ScriptedBackend {
        text: Option<&'static str>,
    }

    impl OcrBackend for ScriptedBackend {
        fn recognize(&self, _img: &RgbaImage) -> anyhow::Result<Recognition> {
            match self.text {
                Some(text) => Ok(Recognition {
                    text: text.to_string(),
                    confidence: 0.9,
                }),
                None => Err(anyhow!("engine crashed")),
            }
        }
    }

    /// Launches a backend that always answers `text`, or always fails on `None`.
    struct ScriptedLauncher {
        text: Option<&'static str>,
    }

    impl BackendLauncher for ScriptedLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            Ok(Arc::new(ScriptedBackend { text: self.text }))
        }
    }

    type Seen = Arc<std::sync::Mutex<Vec<(u32, u32, image::Rgba<u8>)>>>;

    /// Records the size and top-left pixel of every image it is handed.
    struct RecordingBackend {
        seen: Seen,
    }

    impl OcrBackend for RecordingBackend {
        fn recognize(&self, img: &RgbaImage) -> anyhow::Result<Recognition> {
            let (width, height) = img.dimensions();
            self.seen.lock().unwrap().push((width, height, *img.get_pixel(0, 0)));
            Ok(Recognition {
                text: "CPF 123.456.789-01".to_string(),
                confidence: 0.9,
            })
        }
    }

    struct RecordingLauncher {
        seen: Seen,
    }

    impl BackendLauncher for RecordingLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            Ok(Arc::new(RecordingBackend { seen: self.seen.clone() }))
        }
    }

    fn recording_service() -> (ExtractionService, Seen) {
        let seen = Seen::default();
        let engine = RecognitionEngine::new(Arc::new(RecordingLauncher { seen: seen.clone() }));
        let svc = ExtractionService::new(engine, Arc::new(MemoryStore::default()), &AppConfig::default());
        (svc, seen)
    }

    fn solid(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 40, 255]))
    }

    fn service(text: Option<&'static str>) -> ExtractionService {
        let engine = RecognitionEngine::new(Arc::new(ScriptedLauncher { text }));
        ExtractionService::new(engine, Arc::new(MemoryStore::default()), &AppConfig::default())
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        preprocess::encode_png(&RgbaImage::new(width, height)).unwrap()
    }

    #[tokio::test]
    async fn test_extract_document() {
        let svc = service(Some("RG: 12.345.678-9\nCPF: 123.456.789-01"));

        let result = svc.extract_document(&png(100, 60)).await.unwrap();

        assert_eq!(result.fields["rg"].value, "123456789");
        assert_eq!(result.fields["cpf"].value, "123.456.789-01");
        assert!((result.confidence - 0.9).abs() < 1e-6);

        let entries = svc.log().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, LogAction::OcrAttempt);
        assert_eq!(entries[0].document_type, Some(DocumentType::Rg));
        assert_eq!(entries[0].field_mappings.len(), 2);
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn test_extract_document_uses_ambient_type() {
        let svc = service(Some("NOME: CARLOS ALBERTO LIMA\nREGISTRO 01234567890"));
        svc.engine().set_document_type(DocumentType::Cnh);

        let result = svc.extract_document(&png(100, 60)).await.unwrap();

        assert_eq!(result.fields["registroCnh"].value, "01234567890");
        assert_eq!(svc.log().entries()[0].document_type, Some(DocumentType::Cnh));
    }

    #[tokio::test]
    async fn test_document_without_fields_logged_as_failure() {
        let svc = service(Some("illegible"));
        let result = svc
            .extract_document_as(&png(100, 60), DocumentType::Creci)
            .await
            .unwrap();

        assert!(result.fields.is_empty());
        assert!(!svc.log().entries()[0].success);
    }

    #[tokio::test]
    async fn test_recognition_failure_logged_before_error() {
        let svc = service(None);

        let err = svc.extract_document(&png(100, 60)).await.unwrap_err();

        assert!(matches!(err, OcrError::Recognition(_)));
        let entries = svc.log().entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(svc.log().success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_rendering_error() {
        let svc = service(Some("x"));
        let err = svc.extract_document(b"not an image").await.unwrap_err();
        assert!(matches!(err, OcrError::Rendering(_)));
        assert_eq!(svc.engine().launch_count(), 0);
    }

    #[tokio::test]
    async fn test_small_region_rejected_without_recognition() {
        let svc = service(Some("CPF 123.456.789-01"));

        let err = svc
            .extract_region(&png(100, 60), "doc1.png", Rect::new(10, 10, 5, 5), "cpf", DocumentType::Rg)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OcrError::Validation {
                width: 5,
                height: 5,
                min: 10
            }
        ));
        assert_eq!(svc.engine().launch_count(), 0);
        assert_eq!(svc.engine().state(), EngineState::Uninitialized);
        assert!(svc.log().is_empty());
        assert!(svc.selection_history("doc1.png").is_empty());
    }

    #[tokio::test]
    async fn test_region_with_pattern_match() {
        let svc = service(Some("CPF: 123.456.789-01"));

        let value = svc
            .extract_region(&png(100, 60), "doc1.png", Rect::new(0, 0, 80, 20), "cpf", DocumentType::Rg)
            .await
            .unwrap();

        assert_eq!(value, "123.456.789-01");

        let history = svc.selection_history("doc1.png");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field, "cpf");
        assert_eq!(history[0].rectangle, Rect::new(0, 0, 80, 20));

        let entries = svc.log().entries();
        assert_eq!(entries[0].action, LogAction::FieldMapping);
        assert_eq!(entries[0].field_mappings[0].value, "123.456.789-01");
        assert!((entries[0].field_mappings[0].confidence - 1.0).abs() < 1e-4);
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn test_region_falls_back_to_raw_text() {
        let svc = service(Some("  joao   da silva \n"));

        let value = svc
            .extract_region(
                &png(100, 60),
                "doc1.png",
                Rect::new(0, 0, 90, 30),
                "nomeCompleto",
                DocumentType::Rg,
            )
            .await
            .unwrap();

        assert_eq!(value, "Joao Da Silva");
    }

    #[tokio::test]
    async fn test_region_reselection_replaces_history() {
        let svc = service(Some("RG 12.345.678-9"));
        let bytes = png(100, 60);

        svc.extract_region(&bytes, "doc1.png", Rect::new(0, 0, 40, 20), "rg", DocumentType::Rg)
            .await
            .unwrap();
        svc.extract_region(&bytes, "doc1.png", Rect::new(10, 10, 60, 30), "rg", DocumentType::Rg)
            .await
            .unwrap();

        let history = svc.selection_history("doc1.png");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rectangle, Rect::new(10, 10, 60, 30));
        assert_eq!(svc.engine().launch_count(), 1);
    }

    #[tokio::test]
    async fn test_region_recognition_failure_logged() {
        let svc = service(None);

        let err = svc
            .extract_region(&png(100, 60), "doc1.png", Rect::new(0, 0, 50, 20), "rg", DocumentType::Rg)
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Recognition(_)));
        let entries = svc.log().entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert!(svc.selection_history("doc1.png").is_empty());
    }

    #[tokio::test]
    async fn test_region_outside_image_is_rendering_error() {
        let svc = service(Some("x"));
        let err = svc
            .extract_region(&png(100, 60), "doc1.png", Rect::new(200, 0, 50, 20), "rg", DocumentType::Rg)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Rendering(_)));
    }

    #[tokio::test]
    async fn test_document_is_normalized_before_recognition() {
        let (svc, seen) = recording_service();
        let src = solid(100, 60);

        svc.extract_document(&preprocess::encode_png(&src).unwrap()).await.unwrap();

        let expected = *preprocess::normalize(&src, &PreprocessOptions::document()).get_pixel(0, 0);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(100, 60, expected)]);
        assert_ne!(expected, *src.get_pixel(0, 0));
    }

    #[tokio::test]
    async fn test_region_is_cropped_and_normalized_more_strongly() {
        let (svc, seen) = recording_service();
        let src = solid(100, 60);

        svc.extract_region(
            &preprocess::encode_png(&src).unwrap(),
            "doc1.png",
            Rect::new(10, 10, 40, 20),
            "cpf",
            DocumentType::Rg,
        )
        .await
        .unwrap();

        let region = *preprocess::normalize(&solid(40, 20), &PreprocessOptions::region()).get_pixel(0, 0);
        let document = *preprocess::normalize(&src, &PreprocessOptions::document()).get_pixel(0, 0);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(40, 20, region)]);
        assert_ne!(region, document);
    }

    #[tokio::test]
    async fn test_shutdown_terminates_engine() {
        let svc = service(Some("x"));
        svc.extract_document(&png(20, 20)).await.unwrap();
        svc.shutdown().await;
        assert_eq!(svc.engine().state(), EngineState::Terminated);

        svc.extract_document(&png(20, 20)).await.unwrap();
        assert_eq!(svc.engine().launch_count(), 2);
    }
}
