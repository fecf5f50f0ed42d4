use crate::error::{CommitError, ValidationError};
use crate::heuristics::{self, ScanFields};
use crate::image_store::ImageStore;
use crate::recognition::{RecognitionAdapter, TextRecognizer};
use crate::store::{InvoiceRecord, LedgerStore};
use chrono::{Local, NaiveDate};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{info, warn};

/// Lifecycle of one scan-or-edit workflow. `Committed` and `Failed` are
/// terminal for the session instance; `reset` starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Extracting,
    Reviewing,
    Committing,
    Committed,
    Failed,
}

/// Handed out when a bitmap enters the session. Recognition runs detached
/// from the session's borrow in real callers, so a result may arrive after
/// the user has already cancelled or started over; the ticket's generation
/// decides whether the result still belongs to this workflow.
#[derive(Debug, Clone, Copy)]
pub struct ScanTicket {
    generation: u64,
}

struct EditTarget {
    invoice_id: i64,
    image_file: String,
}

/// The capture-to-record orchestrator: holds the captured bitmap, the
/// user-correctable field values, and drives the commit that ties the image
/// store and the record store together.
pub struct CaptureSession {
    state: SessionState,
    generation: u64,
    captured_image: Option<DynamicImage>,
    placeholder_image: bool,
    pending_amount: f64,
    pending_date: NaiveDate,
    pending_vendor: String,
    editing: Option<EditTarget>,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new() -> Self {
        CaptureSession {
            state: SessionState::Idle,
            generation: 0,
            captured_image: None,
            placeholder_image: false,
            pending_amount: 0.0,
            pending_date: Local::now().date_naive(),
            pending_vendor: String::new(),
            editing: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while recognition is in flight; the UI disables field edits.
    pub fn is_processing(&self) -> bool {
        self.state == SessionState::Extracting
    }

    pub fn amount(&self) -> f64 {
        self.pending_amount
    }

    pub fn date(&self) -> NaiveDate {
        self.pending_date
    }

    pub fn vendor(&self) -> &str {
        &self.pending_vendor
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder_image
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_amount(&mut self, amount: f64) {
        self.pending_amount = amount;
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.pending_date = date;
    }

    pub fn set_vendor(&mut self, vendor: impl Into<String>) {
        self.pending_vendor = vendor.into();
    }

    /// User asked to scan. No data is held yet.
    pub fn start_scan(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Capturing;
        } else {
            warn!(state = ?self.state, "start_scan ignored outside Idle");
        }
    }

    /// The camera/picker produced a bitmap. The bitmap stays with the session
    /// for the rest of the workflow; recognition results must present the
    /// returned ticket to be accepted.
    pub fn image_captured(&mut self, image: DynamicImage) -> ScanTicket {
        self.captured_image = Some(image);
        self.placeholder_image = false;
        self.state = SessionState::Extracting;
        ScanTicket {
            generation: self.generation,
        }
    }

    /// Apply an extraction result. Returns false when the result is stale
    /// (the session was cancelled or restarted after the ticket was issued),
    /// in which case nothing changes.
    pub fn apply_extraction(&mut self, ticket: ScanTicket, fields: ScanFields) -> bool {
        if ticket.generation != self.generation || self.state != SessionState::Extracting {
            warn!(
                ticket_generation = ticket.generation,
                session_generation = self.generation,
                "Stale recognition result dropped"
            );
            return false;
        }
        // Absent fields prefill to zero / today; the user corrects them.
        self.pending_amount = fields.amount.unwrap_or(0.0);
        self.pending_date = fields.date.unwrap_or_else(|| Local::now().date_naive());
        self.state = SessionState::Reviewing;
        info!(
            amount = self.pending_amount,
            date = %self.pending_date,
            "Extraction applied, reviewing"
        );
        true
    }

    /// Drive capture → recognition → extraction → review in one call.
    pub async fn process_image<E: TextRecognizer>(
        &mut self,
        adapter: &RecognitionAdapter<E>,
        image: DynamicImage,
    ) {
        let ticket = self.image_captured(image);
        let text = {
            let image = self
                .captured_image
                .as_ref()
                .expect("bitmap was captured above");
            adapter.recognize(image).await
        };
        let fields = heuristics::extract_fields(&text);
        self.apply_extraction(ticket, fields);
    }

    /// Seed the session from an existing invoice instead of a fresh capture.
    ///
    /// When the stored image cannot be loaded the session reviews against a
    /// placeholder bitmap; the placeholder flag keeps a later commit from
    /// overwriting the stored file with stand-in pixels.
    pub fn start_edit(&mut self, invoice: &InvoiceRecord, images: &ImageStore) {
        self.generation += 1;
        self.editing = Some(EditTarget {
            invoice_id: invoice.id,
            image_file: invoice.image_file.clone(),
        });
        self.pending_amount = invoice.amount;
        self.pending_date = invoice.date;
        self.pending_vendor = invoice.vendor.clone().unwrap_or_default();
        match images.load(&invoice.image_file) {
            Some(image) => {
                self.captured_image = Some(image);
                self.placeholder_image = false;
            }
            None => {
                warn!(
                    invoice_id = invoice.id,
                    file = %invoice.image_file,
                    "Invoice image could not be loaded, editing with placeholder"
                );
                self.captured_image = Some(placeholder_bitmap());
                self.placeholder_image = true;
            }
        }
        self.last_error = None;
        self.state = SessionState::Reviewing;
    }

    /// Discard all in-memory session state without touching storage. Also the
    /// way out of the terminal `Committed`/`Failed` states.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.clear_form();
        self.state = SessionState::Idle;
    }

    fn clear_form(&mut self) {
        self.captured_image = None;
        self.placeholder_image = false;
        self.pending_amount = 0.0;
        self.pending_date = Local::now().date_naive();
        self.pending_vendor = String::new();
        self.editing = None;
        self.last_error = None;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.pending_amount <= 0.0 {
            return Err(ValidationError::InvalidAmount);
        }
        if self.pending_date > Local::now().date_naive() {
            return Err(ValidationError::FutureDate);
        }
        if self.editing.is_none() && (self.captured_image.is_none() || self.placeholder_image) {
            return Err(ValidationError::MissingImage);
        }
        Ok(())
    }

    /// Persist the reviewed invoice into `property_id`.
    ///
    /// Validation failures leave the session where it was, fields intact.
    /// Storage failures move it to `Failed`, also with fields intact, so the
    /// user can retry without re-entering anything. An image written before a
    /// record-store failure is not rolled back; the orphaned file is a leak,
    /// not a corruption.
    pub fn commit(
        &mut self,
        images: &ImageStore,
        store: &LedgerStore,
        property_id: i64,
    ) -> Result<i64, CommitError> {
        if let Err(e) = self.validate() {
            self.last_error = Some(e.to_string());
            return Err(e.into());
        }
        self.state = SessionState::Committing;

        match self.commit_inner(images, store, property_id) {
            Ok(invoice_id) => {
                // The workflow is done; drop the form so a stray second
                // commit can never write a duplicate.
                self.clear_form();
                self.state = SessionState::Committed;
                info!(invoice_id, property_id, "Invoice committed");
                Ok(invoice_id)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn commit_inner(
        &self,
        images: &ImageStore,
        store: &LedgerStore,
        property_id: i64,
    ) -> Result<i64, CommitError> {
        let vendor = match self.pending_vendor.trim() {
            "" => None,
            v => Some(v),
        };

        match &self.editing {
            // Edit while the real image never loaded: fields only, the stored
            // file is left exactly as it was.
            Some(target) if self.placeholder_image => {
                store.update_invoice(
                    target.invoice_id,
                    property_id,
                    &target.image_file,
                    self.pending_amount,
                    self.pending_date,
                    vendor,
                )?;
                Ok(target.invoice_id)
            }
            // Edit with a live bitmap: write the replacement first, then
            // retire the old file. Cleanup failure never blocks the commit.
            Some(target) => {
                let image = self
                    .captured_image
                    .as_ref()
                    .expect("non-placeholder review always holds a bitmap");
                let file_id = images.save(image)?;
                store.update_invoice(
                    target.invoice_id,
                    property_id,
                    &file_id,
                    self.pending_amount,
                    self.pending_date,
                    vendor,
                )?;
                if target.image_file != file_id {
                    if let Err(e) = images.delete(&target.image_file) {
                        warn!(
                            invoice_id = target.invoice_id,
                            file = %target.image_file,
                            error = %e,
                            "Old invoice image cleanup failed"
                        );
                    }
                }
                Ok(target.invoice_id)
            }
            None => {
                let image = self
                    .captured_image
                    .as_ref()
                    .expect("validation requires an image for new invoices");
                let file_id = images.save(image)?;
                let invoice_id = store.insert_invoice(
                    property_id,
                    &file_id,
                    self.pending_amount,
                    self.pending_date,
                    vendor,
                )?;
                Ok(invoice_id)
            }
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

fn placeholder_bitmap() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([200, 200, 200])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::testing::FixedRecognizer;
    use chrono::Duration;
    use std::fs;

    fn bitmap() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([10, 20, 30])))
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        images: ImageStore,
        store: LedgerStore,
        property_id: i64,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageStore::new(dir.path().join("images")).unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.db")).unwrap();
        let property_id = store.add_property("Test Property", None, None).unwrap();
        Fixture {
            _dir: dir,
            images,
            store,
            property_id,
        }
    }

    fn stored_file_count(images: &ImageStore) -> usize {
        fs::read_dir(images.dir()).unwrap().count()
    }

    fn yesterday() -> NaiveDate {
        Local::now().date_naive() - Duration::days(1)
    }

    #[tokio::test]
    async fn scan_prefills_fields_from_recognized_text() {
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec![
            "ACME Plumbing",
            "Invoice Total: $1,234.56",
            "Date: 05/01/2024",
        ]));

        let mut session = CaptureSession::new();
        session.start_scan();
        assert_eq!(session.state(), SessionState::Capturing);
        session.process_image(&adapter, bitmap()).await;

        assert_eq!(session.state(), SessionState::Reviewing);
        assert_eq!(session.amount(), 1234.56);
        assert_eq!(
            session.date(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn empty_recognition_still_reaches_review_with_defaults() {
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec![]));
        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;

        assert_eq!(session.state(), SessionState::Reviewing);
        assert_eq!(session.amount(), 0.0);
        assert_eq!(session.date(), Local::now().date_naive());
    }

    #[test]
    fn stale_recognition_result_is_dropped() {
        let mut session = CaptureSession::new();
        session.start_scan();
        let ticket = session.image_captured(bitmap());
        session.cancel();

        let applied = session.apply_extraction(
            ticket,
            heuristics::extract_fields("Total $99.00 on 01/02/2024"),
        );
        assert!(!applied);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.amount(), 0.0);
    }

    #[tokio::test]
    async fn commit_new_invoice_persists_image_and_record() {
        let fx = fixture();
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec!["Total $45.00 12/01/2023"]));

        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;
        session.set_vendor("ACME Plumbing");

        let invoice_id = session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap();
        assert_eq!(session.state(), SessionState::Committed);

        let invoice = fx.store.get_invoice(invoice_id).unwrap().unwrap();
        assert_eq!(invoice.amount, 45.0);
        assert_eq!(invoice.vendor.as_deref(), Some("ACME Plumbing"));
        assert_eq!(invoice.property_id, fx.property_id);
        assert!(fx.images.load(&invoice.image_file).is_some());
    }

    #[tokio::test]
    async fn zero_amount_fails_validation_and_writes_nothing() {
        let fx = fixture();
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec![]));

        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;
        session.set_date(yesterday());
        assert_eq!(session.amount(), 0.0);

        let err = session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Validation(ValidationError::InvalidAmount)
        ));
        // No image store write, no record, and the session stays reviewable.
        assert_eq!(stored_file_count(&fx.images), 0);
        assert_eq!(fx.store.invoice_count(fx.property_id).unwrap(), 0);
        assert_eq!(session.state(), SessionState::Reviewing);
    }

    #[tokio::test]
    async fn future_date_fails_validation() {
        let fx = fixture();
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec![]));

        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;
        session.set_amount(10.0);
        session.set_date(Local::now().date_naive() + Duration::days(1));

        let err = session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Validation(ValidationError::FutureDate)
        ));
        assert_eq!(stored_file_count(&fx.images), 0);
    }

    #[test]
    fn new_invoice_without_image_fails_validation() {
        let fx = fixture();
        let mut session = CaptureSession::new();
        session.set_amount(10.0);
        session.set_date(yesterday());

        let err = session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Validation(ValidationError::MissingImage)
        ));
    }

    #[test]
    fn placeholder_edit_commits_fields_without_touching_images() {
        let fx = fixture();
        // The record points at a file that no longer exists.
        let invoice_id = fx
            .store
            .insert_invoice(fx.property_id, "ghost.jpg", 12.0, yesterday(), None)
            .unwrap();
        let invoice = fx.store.get_invoice(invoice_id).unwrap().unwrap();

        let mut session = CaptureSession::new();
        session.start_edit(&invoice, &fx.images);
        assert!(session.is_placeholder());
        assert_eq!(session.state(), SessionState::Reviewing);
        assert_eq!(session.amount(), 12.0);

        session.set_amount(77.0);
        session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap();

        // Fields updated, image store untouched, stale reference preserved.
        let updated = fx.store.get_invoice(invoice_id).unwrap().unwrap();
        assert_eq!(updated.amount, 77.0);
        assert_eq!(updated.image_file, "ghost.jpg");
        assert_eq!(stored_file_count(&fx.images), 0);
    }

    #[tokio::test]
    async fn edit_with_new_capture_replaces_the_image_file() {
        let fx = fixture();
        let old_file = fx.images.save(&bitmap()).unwrap();
        let invoice_id = fx
            .store
            .insert_invoice(fx.property_id, &old_file, 5.0, yesterday(), None)
            .unwrap();
        let invoice = fx.store.get_invoice(invoice_id).unwrap().unwrap();

        let mut session = CaptureSession::new();
        session.start_edit(&invoice, &fx.images);
        assert!(!session.is_placeholder());

        // User re-scans the paper invoice while editing.
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec!["Total $62.00 03/04/2024"]));
        session.process_image(&adapter, bitmap()).await;
        assert_eq!(session.amount(), 62.0);

        session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap();

        let updated = fx.store.get_invoice(invoice_id).unwrap().unwrap();
        assert_ne!(updated.image_file, old_file);
        assert!(fx.images.load(&updated.image_file).is_some());
        assert!(fx.images.load(&old_file).is_none());
        assert_eq!(stored_file_count(&fx.images), 1);
    }

    #[tokio::test]
    async fn record_store_failure_keeps_fields_for_retry() {
        let fx = fixture();
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec!["Total $33.00 01/15/2024"]));

        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;

        // No such property: the FK rejects the insert after the image write.
        let err = session.commit(&fx.images, &fx.store, 9999).unwrap_err();
        assert!(matches!(err, CommitError::Storage(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.amount(), 33.0);
        assert!(session.last_error().is_some());
        // The already-written image is not rolled back.
        assert_eq!(stored_file_count(&fx.images), 1);

        // Retry against a real property succeeds without re-entering data.
        let invoice_id = session
            .commit(&fx.images, &fx.store, fx.property_id)
            .unwrap();
        let invoice = fx.store.get_invoice(invoice_id).unwrap().unwrap();
        assert_eq!(invoice.amount, 33.0);
        assert_eq!(session.state(), SessionState::Committed);
    }

    #[tokio::test]
    async fn cancel_discards_in_memory_state_only() {
        let fx = fixture();
        let adapter = RecognitionAdapter::new(FixedRecognizer(vec!["Total $21.00"]));

        let mut session = CaptureSession::new();
        session.start_scan();
        session.process_image(&adapter, bitmap()).await;
        assert_eq!(session.amount(), 21.0);

        session.cancel();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.amount(), 0.0);
        assert_eq!(session.vendor(), "");
        assert_eq!(stored_file_count(&fx.images), 0);
    }
}
