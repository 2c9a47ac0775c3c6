use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use super::engine::{BackendLauncher, OcrBackend, TesseractBackend};
use crate::config::TesseractConfig;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

const COMMON_EXECUTABLES: [&str; 5] = [
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

const SYSTEM_TESSDATA: [&str; 6] = [
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
    r"C:\Program Files\Tesseract-OCR\tessdata",
];

/// Launches [`TesseractBackend`] instances after locating the executable
/// and the language data, downloading the latter when allowed.
pub struct TesseractLauncher {
    config: TesseractConfig,
    local_tessdata: PathBuf,
}

impl TesseractLauncher {
    /// `data_dir` hosts downloaded language data under `tessdata/`.
    pub fn new(config: TesseractConfig, data_dir: &Path) -> Self {
        Self {
            config,
            local_tessdata: data_dir.join("tessdata"),
        }
    }
}

impl BackendLauncher for TesseractLauncher {
    fn launch(&self) -> Result<Arc<dyn OcrBackend>> {
        let executable = find_tesseract_executable(self.config.executable.as_deref())?;
        let language = self.config.language.as_str();

        let tessdata = match find_tessdata_dir(
            self.config.tessdata_dir.as_deref(),
            &self.local_tessdata,
            language,
        ) {
            Ok(dir) => dir,
            Err(e) if self.config.download_language_data => {
                info!("{e}; downloading {language}.traineddata");
                download_tessdata(&self.local_tessdata, language)?;
                self.local_tessdata.clone()
            }
            Err(e) => return Err(e),
        };

        info!(
            "Using Tesseract {} with {} data from {}",
            executable.display(),
            language,
            tessdata.display()
        );

        Ok(Arc::new(TesseractBackend {
            executable,
            tessdata,
            language: language.to_string(),
        }))
    }
}

fn runs(executable: &Path) -> bool {
    Command::new(executable)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Finds a working Tesseract executable: explicit override, then `PATH`,
/// then common install locations.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if runs(path) {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!(
            "Configured Tesseract executable does not run: {}",
            path.display()
        ));
    }

    let on_path = PathBuf::from("tesseract");
    if runs(&on_path) {
        return Ok(on_path);
    }

    for path in COMMON_EXECUTABLES {
        let p = PathBuf::from(path);
        if p.exists() && runs(&p) {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR or set tesseract.executable in config.json"
    ))
}

/// Finds a directory containing `<language>.traineddata`: explicit override,
/// then the local data directory, then `TESSDATA_PREFIX`, then system paths.
pub fn find_tessdata_dir(configured: Option<&Path>, local: &Path, language: &str) -> Result<PathBuf> {
    let file = traineddata_file(language);

    if let Some(dir) = configured {
        if dir.join(&file).exists() {
            return Ok(dir.to_path_buf());
        }
        return Err(anyhow!("{} not found in {}", file, dir.display()));
    }

    if local.join(&file).exists() {
        return Ok(local.to_path_buf());
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(&file).exists() {
            return Ok(p);
        }
        let p = p.join("tessdata");
        if p.join(&file).exists() {
            return Ok(p);
        }
    }

    for path in SYSTEM_TESSDATA {
        let p = PathBuf::from(path);
        if p.join(&file).exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("{} not found", file))
}

pub fn traineddata_file(language: &str) -> String {
    format!("{language}.traineddata")
}

/// Downloads `<language>.traineddata` from the public tessdata repository.
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let file = traineddata_file(language);
    let url = format!("{}/{}", TESSDATA_REPO, file);
    let target = tessdata_dir.join(&file);

    fs::create_dir_all(tessdata_dir)
        .with_context(|| format!("Failed to create {}", tessdata_dir.display()))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    debug!("GET {}", url);
    let response = client
        .get(&url)
        .header("User-Agent", "docscan-ocr")
        .send()
        .with_context(|| format!("Failed to download {file}"))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            file,
            response.status()
        ));
    }

    let bytes = response.bytes()?;

    // Only complete downloads get the real name.
    let partial = tessdata_dir.join(format!("{file}.part"));
    let mut out = fs::File::create(&partial)?;
    out.write_all(&bytes)?;
    out.sync_all()?;
    fs::rename(&partial, &target)?;

    info!("Downloaded {} ({} bytes)", file, bytes.len());

    Ok(())
}
