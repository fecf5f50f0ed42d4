use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub struct LedgerStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyRecord {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRecord {
    pub id: i64,
    pub property_id: i64,
    /// Name of the image file in the image store, never embedded bytes.
    pub image_file: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub vendor: Option<String>,
    pub created_at: DateTime<Utc>,
}

const INVOICE_COLUMNS: &str = "id, property_id, image_file, amount, date, vendor, created_at";
const PROPERTY_COLUMNS: &str = "id, name, address, notes, created_at";

impl LedgerStore {
    /// Open (or create) the ledger database.
    ///
    /// No `ON DELETE CASCADE` on the invoice FK: cascade deletion is an
    /// explicit two-phase operation so image files and records are cleaned up
    /// in a deterministic order.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS properties (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                address TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                property_id INTEGER NOT NULL REFERENCES properties(id),
                image_file TEXT NOT NULL,
                amount REAL NOT NULL,
                date TEXT NOT NULL,
                vendor TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_property_id ON invoices(property_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_date ON invoices(date)",
            [],
        )?;

        info!("Ledger database initialized");
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    pub fn add_property(
        &self,
        name: &str,
        address: Option<&str>,
        notes: Option<&str>,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO properties (name, address, notes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, address, notes, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(property_id = id, name = %name, "Property stored");
        Ok(id)
    }

    pub fn update_property(
        &self,
        id: i64,
        name: &str,
        address: Option<&str>,
        notes: Option<&str>,
    ) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE properties SET name = ?1, address = ?2, notes = ?3 WHERE id = ?4",
            params![name, address, notes, id],
        )?;
        Ok(changed > 0)
    }

    pub fn get_property(&self, id: i64) -> SqliteResult<Option<PropertyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_property(row)?)),
            None => Ok(None),
        }
    }

    /// All properties, most recently created first.
    pub fn properties(&self) -> SqliteResult<Vec<PropertyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], |row| Self::row_to_property(row))?;
        rows.collect()
    }

    pub fn delete_property_record(&self, id: i64) -> SqliteResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM properties WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Invoices
    // -----------------------------------------------------------------------

    pub fn insert_invoice(
        &self,
        property_id: i64,
        image_file: &str,
        amount: f64,
        date: NaiveDate,
        vendor: Option<&str>,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO invoices (property_id, image_file, amount, date, vendor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                property_id,
                image_file,
                amount,
                date.format("%Y-%m-%d").to_string(),
                vendor,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(invoice_id = id, property_id, image_file = %image_file, "Invoice stored");
        Ok(id)
    }

    pub fn update_invoice(
        &self,
        id: i64,
        property_id: i64,
        image_file: &str,
        amount: f64,
        date: NaiveDate,
        vendor: Option<&str>,
    ) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE invoices
             SET property_id = ?1, image_file = ?2, amount = ?3, date = ?4, vendor = ?5
             WHERE id = ?6",
            params![
                property_id,
                image_file,
                amount,
                date.format("%Y-%m-%d").to_string(),
                vendor,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_invoice(&self, id: i64) -> SqliteResult<Option<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_invoice(row)?)),
            None => Ok(None),
        }
    }

    /// All invoices for a property, newest invoice date first.
    pub fn invoices_for_property(&self, property_id: i64) -> SqliteResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE property_id = ?1
             ORDER BY date DESC, created_at DESC"
        ))?;
        let rows = stmt.query_map(params![property_id], |row| Self::row_to_invoice(row))?;
        rows.collect()
    }

    /// Invoices for a property falling in the given calendar month.
    pub fn invoices_for_month(
        &self,
        property_id: i64,
        year: i32,
        month: u32,
    ) -> SqliteResult<Vec<InvoiceRecord>> {
        let prefix = format!("{year:04}-{month:02}");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE property_id = ?1 AND strftime('%Y-%m', date) = ?2
             ORDER BY date DESC, created_at DESC"
        ))?;
        let rows = stmt.query_map(params![property_id, prefix], |row| Self::row_to_invoice(row))?;
        rows.collect()
    }

    pub fn delete_invoice_record(&self, id: i64) -> SqliteResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn delete_invoices_for_property(&self, property_id: i64) -> SqliteResult<usize> {
        self.conn.execute(
            "DELETE FROM invoices WHERE property_id = ?1",
            params![property_id],
        )
    }

    /// Sum of invoice amounts for a property. Derived, never stored.
    pub fn total_expenses(&self, property_id: i64) -> SqliteResult<f64> {
        self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE property_id = ?1",
            params![property_id],
            |row| row.get(0),
        )
    }

    pub fn invoice_count(&self, property_id: i64) -> SqliteResult<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM invoices WHERE property_id = ?1",
            params![property_id],
            |row| row.get(0),
        )
    }

    // -----------------------------------------------------------------------
    // Row mappers
    // -----------------------------------------------------------------------

    fn row_to_property(row: &rusqlite::Row<'_>) -> rusqlite::Result<PropertyRecord> {
        Ok(PropertyRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            address: row.get(2)?,
            notes: row.get(3)?,
            created_at: parse_timestamp(row.get::<_, String>(4)?, 4)?,
        })
    }

    fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRecord> {
        Ok(InvoiceRecord {
            id: row.get(0)?,
            property_id: row.get(1)?,
            image_file: row.get(2)?,
            amount: row.get(3)?,
            date: parse_date(row.get::<_, String>(4)?, 4)?,
            vendor: row.get(5)?,
            created_at: parse_timestamp(row.get::<_, String>(6)?, 6)?,
        })
    }
}

fn parse_date(raw: String, column: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
