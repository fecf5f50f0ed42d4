use crate::error::StorageError;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// JPEG quality factor used for all stored invoice images (0.8).
const JPEG_QUALITY: u8 = 80;

/// File-backed blob storage for invoice images. One file per invoice,
/// addressed only by the generated id stored on the invoice record.
pub struct ImageStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ImageStore {
    /// Open the store, creating its directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(ImageStore {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    /// Encode the bitmap as JPEG and write it under a fresh id.
    ///
    /// The id is derived from the encoded bytes, a nanosecond timestamp and a
    /// per-store sequence counter; two saves never collide, not even two saves
    /// of the same bitmap in the same instant.
    pub fn save(&self, image: &DynamicImage) -> Result<String, StorageError> {
        let mut encoded = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut encoded), JPEG_QUALITY);
        // JPEG has no alpha channel; flatten before encoding.
        image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(StorageError::Encoding)?;

        let file_id = self.generate_file_id(&encoded);
        fs::write(self.path_for(&file_id), &encoded)?;
        info!(file_id = %file_id, bytes = encoded.len(), "Invoice image saved");
        Ok(file_id)
    }

    /// Load and decode a stored image. Missing or undecodable files yield
    /// `None`; absence is a normal answer here, not an error.
    pub fn load(&self, file_id: &str) -> Option<DynamicImage> {
        let data = fs::read(self.path_for(file_id)).ok()?;
        match image::load_from_memory(&data) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "Stored image failed to decode");
                None
            }
        }
    }

    /// Remove a stored image. Deleting a file that is already gone succeeds;
    /// only unexpected filesystem failures are reported.
    pub fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(file_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn path_for(&self, file_id: &str) -> PathBuf {
        self.dir.join(file_id)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn generate_file_id(&self, encoded: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(encoded);
        hasher.update(
            Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_le_bytes(),
        );
        hasher.update(self.seq.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}.jpg", &digest[..32])
    }
}
