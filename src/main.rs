mod config;
mod error;
mod heuristics;
mod image_store;
mod ledger;
mod recognition;
mod session;
mod store;

use chrono::NaiveDate;
use image_store::ImageStore;
use recognition::RecognitionAdapter;
use serde::Serialize;
use session::CaptureSession;
use std::fs;
use store::{LedgerStore, PropertyRecord};
use tracing::info;

const CONFIG_PATH: &str = ".config/invoice_capture.toml";

#[derive(Serialize)]
struct PropertySummary {
    #[serde(flatten)]
    property: PropertyRecord,
    total_expenses: f64,
    invoice_count: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cfg = config::Config::load_or_default(CONFIG_PATH)?;
    fs::create_dir_all(&cfg.data_dir)?;
    let store = LedgerStore::new(cfg.db_path())?;
    let images = ImageStore::new(cfg.images_dir())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("add-property") => {
            let name = args.get(1).ok_or("usage: add-property <name> [address] [notes]")?;
            let id = ledger::add_property(
                &store,
                name,
                args.get(2).map(String::as_str),
                args.get(3).map(String::as_str),
            )?;
            println!("Created property {id}");
        }
        Some("properties") => {
            let mut summaries = Vec::new();
            for property in store.properties()? {
                summaries.push(PropertySummary {
                    total_expenses: store.total_expenses(property.id)?,
                    invoice_count: store.invoice_count(property.id)?,
                    property,
                });
            }
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Some("update-property") => {
            let id: i64 = args
                .get(1)
                .ok_or("usage: update-property <id> <name> [address] [notes]")?
                .parse()?;
            let name = args.get(2).ok_or("update-property needs a name")?;
            let found = ledger::update_property(
                &store,
                id,
                name,
                args.get(3).map(String::as_str),
                args.get(4).map(String::as_str),
            )?;
            println!("{}", if found { "Updated" } else { "No such property" });
        }
        Some("delete-property") => {
            let id: i64 = args.get(1).ok_or("usage: delete-property <id>")?.parse()?;
            let found = ledger::delete_property(&store, &images, id)?;
            println!("{}", if found { "Deleted" } else { "No such property" });
        }
        Some("invoices") => {
            let property_id: i64 = args
                .get(1)
                .ok_or("usage: invoices <property-id> [year month]")?
                .parse()?;
            let invoices = match (args.get(2), args.get(3)) {
                (Some(year), Some(month)) => {
                    store.invoices_for_month(property_id, year.parse()?, month.parse()?)?
                }
                _ => store.invoices_for_property(property_id)?,
            };
            println!("{}", serde_json::to_string_pretty(&invoices)?);
        }
        Some("scan") => scan(&cfg, &store, &images, &args[1..]).await?,
        Some("edit") => edit(&store, &images, &args[1..])?,
        Some("delete-invoice") => {
            let id: i64 = args.get(1).ok_or("usage: delete-invoice <id>")?.parse()?;
            let found = ledger::delete_invoice(&store, &images, id)?;
            println!("{}", if found { "Deleted" } else { "No such invoice" });
        }
        _ => {
            eprintln!(
                "usage: invoice_capture <command>\n\
                 \n\
                 \tadd-property <name> [address] [notes]\n\
                 \tproperties\n\
                 \tupdate-property <id> <name> [address] [notes]\n\
                 \tdelete-property <id>\n\
                 \tinvoices <property-id> [year month]\n\
                 \tscan <property-id> <image-path> [amount] [date] [vendor]\n\
                 \tedit <invoice-id> [amount] [date] [vendor]\n\
                 \tdelete-invoice <id>"
            );
        }
    }

    Ok(())
}

/// Photograph-to-record flow: the image file on disk stands in for the
/// camera/picker. Recognition prefills amount and date; positional overrides
/// play the part of the user correcting the review form.
async fn scan(
    cfg: &config::Config,
    store: &LedgerStore,
    images: &ImageStore,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let property_id: i64 = args
        .get(0)
        .ok_or("usage: scan <property-id> <image-path> [amount] [date] [vendor]")?
        .parse()?;
    let path = args.get(1).ok_or("scan needs an image path")?;
    store
        .get_property(property_id)?
        .ok_or_else(|| format!("No property with id {property_id}"))?;

    let bitmap = image::open(path)?;
    info!(path = %path, width = bitmap.width(), height = bitmap.height(), "Image loaded");

    let adapter = RecognitionAdapter::new(recognition::default_engine(&cfg.ocr.language));
    let mut session = CaptureSession::new();
    session.start_scan();
    session.process_image(&adapter, bitmap).await;
    println!(
        "Prefilled from scan: amount = {:.2}, date = {}",
        session.amount(),
        session.date()
    );

    apply_overrides(&mut session, args.get(2), args.get(3), args.get(4))?;

    let invoice_id = session.commit(images, store, property_id)?;
    let invoice = store
        .get_invoice(invoice_id)?
        .expect("committed invoice must exist");
    println!("{}", serde_json::to_string_pretty(&invoice)?);
    Ok(())
}

fn edit(
    store: &LedgerStore,
    images: &ImageStore,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let invoice_id: i64 = args
        .get(0)
        .ok_or("usage: edit <invoice-id> [amount] [date] [vendor]")?
        .parse()?;
    let invoice = store
        .get_invoice(invoice_id)?
        .ok_or_else(|| format!("No invoice with id {invoice_id}"))?;

    let mut session = CaptureSession::new();
    session.start_edit(&invoice, images);
    if session.is_placeholder() {
        println!("Stored image could not be loaded; editing fields only.");
    }

    apply_overrides(&mut session, args.get(1), args.get(2), args.get(3))?;

    session.commit(images, store, invoice.property_id)?;
    let updated = store
        .get_invoice(invoice_id)?
        .expect("updated invoice must exist");
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

fn apply_overrides(
    session: &mut CaptureSession,
    amount: Option<&String>,
    date: Option<&String>,
    vendor: Option<&String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(amount) = amount {
        session.set_amount(amount.parse()?);
    }
    if let Some(date) = date {
        session.set_date(NaiveDate::parse_from_str(date, "%Y-%m-%d")?);
    }
    if let Some(vendor) = vendor {
        session.set_vendor(vendor.clone());
    }
    Ok(())
}
