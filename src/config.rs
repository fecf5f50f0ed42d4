use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Deserialize)]
pub struct Config {
    /// Root directory for everything the app persists: the SQLite database
    /// and the invoice image directory both live under it.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub ocr: OcrSection,
}

fn default_data_dir() -> String {
    "ledger-data".to_string()
}

#[derive(Deserialize)]
pub struct OcrSection {
    #[serde(default = "default_ocr_language")]
    pub language: String,
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for OcrSection {
    fn default() -> Self {
        OcrSection {
            language: default_ocr_language(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the config file, or fall back to defaults when it doesn't exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match fs::read_to_string(&path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config {
                data_dir: default_data_dir(),
                ocr: OcrSection::default(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("ledger.db")
    }

    pub fn images_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("invoice-images")
    }
}
