use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context};
use image::RgbaImage;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{OcrError, Result};
use crate::fields::DocumentType;

/// Characters the recognizer may emit: Latin letters with Portuguese
/// diacritics, digits, `. , -` and space.
pub const CHAR_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz\
ÁÀÂÃÉÊÍÓÔÕÚÜÇáàâãéêíóôõúüç0123456789.,- ";

/// Page segmentation mode 6: a single uniform block of text.
const PAGE_SEGMENTATION_MODE: &str = "6";

/// Raw recognizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Recognized text, one line per recognized text line
    pub text: String,
    /// Engine-level confidence in [0, 1]
    pub confidence: f32,
}

/// A ready-to-use recognizer instance.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, img: &RgbaImage) -> anyhow::Result<Recognition>;

    /// Releases resources held by the instance.
    fn shutdown(&self) {}
}

/// Creates recognizer instances. Called once per initialization sequence.
pub trait BackendLauncher: Send + Sync {
    fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>>;
}

/// Lifecycle of a [`RecognitionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Terminated,
}

/// Stateful wrapper around a recognizer with lazy, single-flight initialization.
///
/// The backend slot is guarded by an async mutex held for the whole of
/// initialization and recognition, so concurrent callers share one in-flight
/// initialization and their recognitions run one at a time.
pub struct RecognitionEngine {
    launcher: Arc<dyn BackendLauncher>,
    backend: tokio::sync::Mutex<Option<Arc<dyn OcrBackend>>>,
    state: Mutex<EngineState>,
    document_type: Mutex<DocumentType>,
    launches: AtomicUsize,
}

impl RecognitionEngine {
    pub fn new(launcher: Arc<dyn BackendLauncher>) -> Self {
        Self {
            launcher,
            backend: tokio::sync::Mutex::new(None),
            state: Mutex::new(EngineState::Uninitialized),
            document_type: Mutex::new(DocumentType::default()),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Ambient document type used by callers that do not pick one per call.
    pub fn document_type(&self) -> DocumentType {
        *self
            .document_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_document_type(&self, document_type: DocumentType) {
        *self
            .document_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = document_type;
        debug!("Engine document type set to {}", document_type);
    }

    /// Number of initialization sequences started so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Recognizes text in a normalized image, initializing the engine first
    /// if it is not ready.
    pub async fn recognize(&self, img: RgbaImage) -> Result<Recognition> {
        let mut slot = self.backend.lock().await;

        let backend = match slot.as_ref() {
            Some(backend) => Arc::clone(backend),
            None => {
                let backend = self.initialize().await?;
                *slot = Some(Arc::clone(&backend));
                backend
            }
        };

        let (width, height) = img.dimensions();
        let recognition = tokio::task::spawn_blocking(move || backend.recognize(&img))
            .await
            .map_err(OcrError::recognition)?
            .map_err(|e| OcrError::Recognition(format!("{e:#}")))?;

        debug!(
            "Recognized {} chars from {}x{} image (conf: {:.2})",
            recognition.text.len(),
            width,
            height,
            recognition.confidence
        );

        Ok(recognition)
    }

    /// Runs with the backend slot locked and empty.
    async fn initialize(&self) -> Result<Arc<dyn OcrBackend>> {
        self.set_state(EngineState::Initializing);
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Initializing recognition engine (launch #{})", attempt);

        let launcher = Arc::clone(&self.launcher);
        let launched = tokio::task::spawn_blocking(move || launcher.launch())
            .await
            .map_err(OcrError::recognition)
            .and_then(|r| r.map_err(|e| OcrError::Recognition(format!("{e:#}"))));

        match launched {
            Ok(backend) => {
                self.set_state(EngineState::Ready);
                info!("Recognition engine ready");
                Ok(backend)
            }
            Err(e) => {
                self.set_state(EngineState::Uninitialized);
                warn!("Recognition engine initialization failed: {}", e);
                Err(e)
            }
        }
    }

    /// Releases the recognizer. A later `recognize` initializes a new one.
    pub async fn terminate(&self) {
        let mut slot = self.backend.lock().await;
        if let Some(backend) = slot.take() {
            backend.shutdown();
            self.set_state(EngineState::Terminated);
            info!("Recognition engine terminated");
        }
    }
}

/// Recognizer backed by the Tesseract command-line program.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    pub executable: PathBuf,
    pub tessdata: PathBuf,
    pub language: String,
}

impl OcrBackend for TesseractBackend {
    fn recognize(&self, img: &RgbaImage) -> anyhow::Result<Recognition> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write recognition input")?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("--tessdata-dir")
            .arg(&self.tessdata)
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(PAGE_SEGMENTATION_MODE)
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={CHAR_WHITELIST}"))
            .arg("-c")
            .arg("preserve_interword_spaces=1")
            .arg("-c")
            .arg("load_system_dawg=1")
            .arg("-c")
            .arg("load_freq_dawg=1")
            .arg("-c")
            .arg("language_model_ngram_on=1")
            .arg("tsv")
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

/// Rebuilds text line by line from Tesseract TSV word rows.
///
/// TSV fields: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Only level 5 (word) rows with a
/// non-negative confidence and non-empty text contribute.
pub fn parse_tsv_output(tsv: &str) -> Recognition {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(i32, i32, i32, i32)> = None;
    let mut current_words: Vec<&str> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut word_count = 0usize;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[1].parse().unwrap_or(-1),
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_key.is_some_and(|k| k != key) && !current_words.is_empty() {
            lines.push(current_words.join(" "));
            current_words.clear();
        }
        current_key = Some(key);

        current_words.push(text);
        conf_sum += conf;
        word_count += 1;
    }

    if !current_words.is_empty() {
        lines.push(current_words.join(" "));
    }

    let confidence = if word_count > 0 {
        (conf_sum / word_count as f32 / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Recognition {
        text: lines.join("\n"),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FixedBackend {
        text: &'static str,
        shutdowns: Arc<AtomicUsize>,
    }

    impl OcrBackend for FixedBackend {
        fn recognize(&self, _img: &RgbaImage) -> anyhow::Result<Recognition> {
            Ok(Recognition {
                text: self.text.to_string(),
                confidence: 0.9,
            })
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingBackend;

    impl OcrBackend for FailingBackend {
        fn recognize(&self, _img: &RgbaImage) -> anyhow::Result<Recognition> {
            Err(anyhow!("blurry input"))
        }
    }

    #[derive(Default)]
    struct SlowLauncher {
        launched: AtomicUsize,
        shutdowns: Arc<AtomicUsize>,
    }

    impl BackendLauncher for SlowLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(FixedBackend {
                text: "RG 12.345.678-9",
                shutdowns: Arc::clone(&self.shutdowns),
            }))
        }
    }

    /// Fails the first launch, succeeds afterwards.
    #[derive(Default)]
    struct FlakyLauncher {
        launched: AtomicUsize,
    }

    impl BackendLauncher for FlakyLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            if self.launched.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(anyhow!("language data missing"));
            }
            Ok(Arc::new(FixedBackend {
                text: "ok",
                shutdowns: Arc::default(),
            }))
        }
    }

    struct FailingLauncher;

    impl BackendLauncher for FailingLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            Ok(Arc::new(FailingBackend))
        }
    }

    fn blank() -> RgbaImage {
        RgbaImage::new(4, 4)
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_initialization() {
        let launcher = Arc::new(SlowLauncher::default());
        let engine = RecognitionEngine::new(launcher.clone());
        assert_eq!(engine.state(), EngineState::Uninitialized);

        let (a, b) = tokio::join!(engine.recognize(blank()), engine.recognize(blank()));

        assert_eq!(a.unwrap().text, "RG 12.345.678-9");
        assert_eq!(b.unwrap().text, "RG 12.345.678-9");
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
        assert_eq!(engine.launch_count(), 1);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    /// Blocks inside `launch` until the test has passed the gate twice.
    struct GatedLauncher {
        gate: Arc<std::sync::Barrier>,
    }

    impl BackendLauncher for GatedLauncher {
        fn launch(&self) -> anyhow::Result<Arc<dyn OcrBackend>> {
            self.gate.wait();
            self.gate.wait();
            Ok(Arc::new(FixedBackend {
                text: "RG 12.345.678-9",
                shutdowns: Arc::default(),
            }))
        }
    }

    async fn pass(gate: &Arc<std::sync::Barrier>) {
        let gate = Arc::clone(gate);
        tokio::task::spawn_blocking(move || {
            gate.wait();
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_state_is_initializing_while_launch_runs() {
        let gate = Arc::new(std::sync::Barrier::new(2));
        let engine = Arc::new(RecognitionEngine::new(Arc::new(GatedLauncher {
            gate: Arc::clone(&gate),
        })));

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.recognize(blank()).await }
        });
        pass(&gate).await;
        assert_eq!(engine.state(), EngineState::Initializing);

        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.recognize(blank()).await }
        });
        pass(&gate).await;

        assert_eq!(first.await.unwrap().unwrap().text, "RG 12.345.678-9");
        assert_eq!(second.await.unwrap().unwrap().text, "RG 12.345.678-9");
        assert_eq!(engine.launch_count(), 1);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_terminate_then_recognize_reinitializes() {
        let launcher = Arc::new(SlowLauncher::default());
        let engine = RecognitionEngine::new(launcher.clone());

        engine.recognize(blank()).await.unwrap();
        engine.terminate().await;
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(launcher.shutdowns.load(Ordering::SeqCst), 1);

        engine.recognize(blank()).await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_terminate_before_init_is_noop() {
        let engine = RecognitionEngine::new(Arc::new(SlowLauncher::default()));
        engine.terminate().await;
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_recognition_failure_is_wrapped() {
        let engine = RecognitionEngine::new(Arc::new(FailingLauncher));
        let err = engine.recognize(blank()).await.unwrap_err();
        assert!(err.to_string().contains("check image quality"));
        match err {
            OcrError::Recognition(msg) => assert!(msg.contains("blurry input")),
            other => panic!("unexpected error: {other:?}"),
        }
        // The backend stays usable after a failed recognition.
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retried() {
        let engine = RecognitionEngine::new(Arc::new(FlakyLauncher::default()));

        let err = engine.recognize(blank()).await.unwrap_err();
        assert!(matches!(err, OcrError::Recognition(_)));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        let ok = engine.recognize(blank()).await.unwrap();
        assert_eq!(ok.text, "ok");
        assert_eq!(engine.launch_count(), 2);
    }

    #[test]
    fn test_document_type_ambient_state() {
        let engine = RecognitionEngine::new(Arc::new(SlowLauncher::default()));
        assert_eq!(engine.document_type(), DocumentType::Rg);
        engine.set_document_type(DocumentType::Creci);
        assert_eq!(engine.document_type(), DocumentType::Creci);
    }

    #[test]
    fn test_parse_tsv_output() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
            1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
            4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t\n\
            5\t1\t1\t1\t1\t1\t10\t10\t40\t20\t90.0\tNome:\n\
            5\t1\t1\t1\t1\t2\t60\t10\t60\t20\t80.0\tMARIA\n\
            5\t1\t1\t1\t2\t1\t10\t40\t30\t20\t70.0\tRG\n\
            5\t1\t1\t1\t2\t2\t50\t40\t90\t20\t60.0\t12.345.678-9\n\
            5\t1\t1\t1\t2\t3\t150\t40\t10\t20\t-1\t \n";

        let recognition = parse_tsv_output(tsv);

        assert_eq!(recognition.text, "Nome: MARIA\nRG 12.345.678-9");
        assert!((recognition.confidence - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_empty() {
        let recognition = parse_tsv_output("level\tpage_num\n");
        assert_eq!(recognition.text, "");
        assert_eq!(recognition.confidence, 0.0);
    }

    #[test]
    fn test_whitelist_covers_field_punctuation() {
        for c in ['.', ',', '-', ' ', 'ç', 'Ã', '9'] {
            assert!(CHAR_WHITELIST.contains(c), "missing {c:?}");
        }
        assert!(!CHAR_WHITELIST.contains('/'));
    }
}
