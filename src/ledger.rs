// Workflows that span the record store and the image store. Record-only
// reads and writes live on `LedgerStore`; everything here has to keep files
// and records consistent with each other.

use crate::error::{CommitError, ValidationError};
use crate::image_store::ImageStore;
use crate::store::LedgerStore;
use tracing::{info, warn};

/// Create a property. The name must be non-empty after trimming.
pub fn add_property(
    store: &LedgerStore,
    name: &str,
    address: Option<&str>,
    notes: Option<&str>,
) -> Result<i64, CommitError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(store.add_property(name, address, notes)?)
}

pub fn update_property(
    store: &LedgerStore,
    id: i64,
    name: &str,
    address: Option<&str>,
    notes: Option<&str>,
) -> Result<bool, CommitError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(store.update_property(id, name, address, notes)?)
}

/// Delete one invoice: its image file first, then the record. A file that is
/// already gone is fine, and any other cleanup failure is logged and ignored
/// rather than blocking the record delete.
pub fn delete_invoice(
    store: &LedgerStore,
    images: &ImageStore,
    invoice_id: i64,
) -> Result<bool, CommitError> {
    let Some(invoice) = store.get_invoice(invoice_id)? else {
        return Ok(false);
    };
    if let Err(e) = images.delete(&invoice.image_file) {
        warn!(
            invoice_id,
            file = %invoice.image_file,
            error = %e,
            "Invoice image cleanup failed"
        );
    }
    Ok(store.delete_invoice_record(invoice_id)?)
}

/// Delete a property and everything it owns, in two explicit phases so the
/// cleanup order stays deterministic: collect the owned invoices, delete
/// their image files (best effort), then the invoice records, then the
/// property itself.
pub fn delete_property(
    store: &LedgerStore,
    images: &ImageStore,
    property_id: i64,
) -> Result<bool, CommitError> {
    let invoices = store.invoices_for_property(property_id)?;
    for invoice in &invoices {
        if let Err(e) = images.delete(&invoice.image_file) {
            warn!(
                invoice_id = invoice.id,
                file = %invoice.image_file,
                error = %e,
                "Invoice image cleanup failed during property delete"
            );
        }
    }
    let removed = store.delete_invoices_for_property(property_id)?;
    if removed > 0 {
        info!(property_id, invoices = removed, "Owned invoices removed");
    }
    Ok(store.delete_property_record(property_id)?)
}
