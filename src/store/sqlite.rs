use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, params_from_iter};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|e| {
        tracing::error!("Invalid date in database: '{}' - {}", s, e);
        Utc::now().date_naive()
    })
}

fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn site_from_row(row: &Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        site_code: row.get(1)?,
        site_name: row.get(2)?,
        address_line1: row.get(3)?,
        address_line2: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        postal_code: row.get(7)?,
        country: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

const SITE_COLS: &str = "id, site_code, site_name, address_line1, address_line2, city, state, \
                         postal_code, country, created_at";

fn contact_from_row(row: &Row) -> rusqlite::Result<SiteContact> {
    Ok(SiteContact {
        id: row.get(0)?,
        site_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        room_number: row.get(6)?,
        is_primary: row.get(7)?,
    })
}

fn kit_type_from_row(row: &Row) -> rusqlite::Result<KitType> {
    Ok(KitType {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        default_expiry_days: row.get(3)?,
        standard_weight: row.get(4)?,
        weight_variance: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn labkit_from_row(row: &Row) -> rusqlite::Result<Labkit> {
    Ok(Labkit {
        id: row.get(0)?,
        barcode: row.get(1)?,
        kit_type_id: row.get(2)?,
        site_id: row.get(3)?,
        shipment_id: row.get(4)?,
        lot_number: row.get(5)?,
        measured_weight: row.get(6)?,
        expiry_date: row.get::<_, Option<String>>(7)?.map(|s| parse_date(&s)),
        status: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

const LABKIT_COLS: &str = "l.id, l.barcode, l.kit_type_id, l.site_id, l.shipment_id, \
                           l.lot_number, l.measured_weight, l.expiry_date, l.status, \
                           l.created_at, l.updated_at";

fn labkit_detail_from_row(row: &Row) -> rusqlite::Result<LabkitDetail> {
    Ok(LabkitDetail {
        labkit: labkit_from_row(row)?,
        kit_type_name: row.get(11)?,
        site_name: row.get(12)?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<LabkitSummary> {
    Ok(LabkitSummary {
        id: row.get(0)?,
        barcode: row.get(1)?,
        kit_type_name: row.get(2)?,
        status: row.get(3)?,
    })
}

fn shipment_row_from_row(row: &Row) -> rusqlite::Result<ShipmentRow> {
    Ok(ShipmentRow {
        shipment: Shipment {
            id: row.get(0)?,
            site_id: row.get(1)?,
            shipped_at: row.get::<_, Option<String>>(2)?.map(|s| parse_datetime(&s)),
            expected_arrival: row.get::<_, Option<String>>(3)?.map(|s| parse_date(&s)),
            carrier: row.get(4)?,
            tracking_number: row.get(5)?,
            status: row.get(6)?,
        },
        site_name: row.get(7)?,
    })
}

fn status_event_from_row(row: &Row) -> rusqlite::Result<StatusEvent> {
    Ok(StatusEvent {
        id: row.get(0)?,
        labkit_id: row.get(1)?,
        old_status: row.get(2)?,
        new_status: row.get(3)?,
        event_time: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn kit_event_from_row(row: &Row) -> rusqlite::Result<KitEvent> {
    Ok(KitEvent {
        id: row.get(0)?,
        labkit_id: row.get(1)?,
        event_type: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        created_by: row.get(5)?,
    })
}

fn audit_from_row(row: &Row) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: parse_datetime(&row.get::<_, String>(1)?),
        user: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        action: row.get(5)?,
        field_name: row.get(6)?,
        old_value: row.get(7)?,
        new_value: row.get(8)?,
        description: row.get(9)?,
    })
}

fn token_from_row(row: &Row) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

/// Appends an audit row on the given connection. Called inside the same
/// transaction as the mutation it describes, so a committed mutation always
/// has its audit row.
#[allow(clippy::too_many_arguments)]
fn insert_audit(
    conn: &Connection,
    actor: &str,
    entity_type: &str,
    entity_id: i64,
    action: AuditAction,
    field_name: Option<&str>,
    old_value: Option<&str>,
    new_value: Option<&str>,
    description: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO audit_log (timestamp, user, entity_type, entity_id, action, field_name, old_value, new_value, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            format_datetime(&Utc::now()),
            actor,
            entity_type,
            entity_id,
            action.as_str(),
            field_name,
            old_value,
            new_value,
            description,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_event(
    conn: &Connection,
    labkit_id: i64,
    event_type: &str,
    description: Option<&str>,
    actor: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO labkit_event (labkit_id, event_type, description, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            labkit_id,
            event_type,
            description,
            format_datetime(&Utc::now()),
            actor,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rejects a measured weight outside the kit type's tolerated range. Kits
/// without a measurement, and types without a configured standard weight or
/// variance, are never rejected.
fn check_weight(conn: &Connection, kit_type_id: i64, measured: Option<f64>) -> Result<()> {
    let Some(measured) = measured else {
        return Ok(());
    };
    let range: Option<(Option<f64>, Option<f64>)> = conn
        .query_row(
            "SELECT standard_weight, weight_variance FROM kit_type WHERE id = ?1",
            params![kit_type_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((Some(standard), Some(variance))) = range {
        if (measured - standard).abs() > variance {
            return Err(Error::Validation(format!(
                "measured weight {measured} outside {standard} +/- {variance} for this kit type"
            )));
        }
    }
    Ok(())
}

/// Deletes a labkit and its dependent event rows within the caller's
/// transaction. The DELETE audit row is written first and survives as an
/// orphaned historical record keyed by the now-gone labkit id.
fn delete_labkit_rows(conn: &Connection, labkit_id: i64, actor: &str) -> Result<()> {
    let barcode: String = conn
        .query_row(
            "SELECT barcode FROM labkit WHERE id = ?1",
            params![labkit_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(Error::NotFound)?;

    insert_audit(
        conn,
        actor,
        "Labkit",
        labkit_id,
        AuditAction::Delete,
        None,
        None,
        None,
        Some(&format!("Labkit {barcode} deleted")),
    )?;

    conn.execute(
        "DELETE FROM labkit_status_event WHERE labkit_id = ?1",
        params![labkit_id],
    )?;
    conn.execute(
        "DELETE FROM labkit_event WHERE labkit_id = ?1",
        params![labkit_id],
    )?;
    conn.execute("DELETE FROM labkit WHERE id = ?1", params![labkit_id])?;
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Site operations

    fn create_site(&self, new: &NewSite) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO site (site_code, site_name, address_line1, address_line2, city, state, postal_code, country, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.site_code,
                new.site_name,
                new.address_line1,
                new.address_line2,
                new.city,
                new.state,
                new.postal_code,
                new.country,
                format_datetime(&Utc::now()),
            ],
        )
        .map_err(|e| Error::unique_or_db(e, "site"))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_site(&self, id: i64) -> Result<Option<Site>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SITE_COLS} FROM site WHERE id = ?1"),
            params![id],
            site_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_sites(&self) -> Result<Vec<Site>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {SITE_COLS} FROM site ORDER BY id"))?;
        let rows = stmt.query_map([], site_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_site(&self, id: i64, new: &NewSite) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE site SET site_code = ?1, site_name = ?2, address_line1 = ?3, address_line2 = ?4,
                     city = ?5, state = ?6, postal_code = ?7, country = ?8
                 WHERE id = ?9",
                params![
                    new.site_code,
                    new.site_name,
                    new.address_line1,
                    new.address_line2,
                    new.city,
                    new.state,
                    new.postal_code,
                    new.country,
                    id,
                ],
            )
            .map_err(|e| Error::unique_or_db(e, "site"))?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_site(&self, id: i64, actor: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM site WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        let labkit_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM labkit WHERE site_id = ?1")?;
            let ids = stmt.query_map(params![id], |row| row.get(0))?;
            ids.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for labkit_id in labkit_ids {
            delete_labkit_rows(&tx, labkit_id, actor)?;
        }

        tx.execute("DELETE FROM site_contact WHERE site_id = ?1", params![id])?;
        tx.execute(
            "UPDATE shipment SET site_id = NULL WHERE site_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM site WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    // Site contact operations

    fn create_site_contact(&self, site_id: i64, new: &NewSiteContact) -> Result<i64> {
        let conn = self.conn();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM site WHERE id = ?1",
                params![site_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        conn.execute(
            "INSERT INTO site_contact (site_id, name, role, email, phone, room_number, is_primary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                site_id,
                new.name,
                new.role,
                new.email,
                new.phone,
                new.room_number,
                new.is_primary,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_site_contacts(&self, site_id: i64) -> Result<Vec<SiteContact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, site_id, name, role, email, phone, room_number, is_primary
             FROM site_contact WHERE site_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![site_id], contact_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_site_contact(&self, id: i64, new: &NewSiteContact) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE site_contact SET name = ?1, role = ?2, email = ?3, phone = ?4,
                 room_number = ?5, is_primary = ?6
             WHERE id = ?7",
            params![
                new.name,
                new.role,
                new.email,
                new.phone,
                new.room_number,
                new.is_primary,
                id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_site_contact(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM site_contact WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Kit type operations

    fn create_kit_type(&self, new: &NewKitType) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kit_type (name, description, default_expiry_days, standard_weight, weight_variance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.name,
                new.description,
                new.default_expiry_days,
                new.standard_weight,
                new.weight_variance,
                format_datetime(&Utc::now()),
            ],
        )
        .map_err(|e| Error::unique_or_db(e, "kit type"))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_kit_type(&self, id: i64) -> Result<Option<KitType>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, description, default_expiry_days, standard_weight, weight_variance, created_at
             FROM kit_type WHERE id = ?1",
            params![id],
            kit_type_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_kit_types(&self) -> Result<Vec<KitType>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, default_expiry_days, standard_weight, weight_variance, created_at
             FROM kit_type ORDER BY id",
        )?;
        let rows = stmt.query_map([], kit_type_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_kit_type(&self, id: i64, new: &NewKitType) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE kit_type SET name = ?1, description = ?2, default_expiry_days = ?3,
                     standard_weight = ?4, weight_variance = ?5
                 WHERE id = ?6",
                params![
                    new.name,
                    new.description,
                    new.default_expiry_days,
                    new.standard_weight,
                    new.weight_variance,
                    id,
                ],
            )
            .map_err(|e| Error::unique_or_db(e, "kit type"))?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_kit_type(&self, id: i64, actor: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM kit_type WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        let labkit_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM labkit WHERE kit_type_id = ?1")?;
            let ids = stmt.query_map(params![id], |row| row.get(0))?;
            ids.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for labkit_id in labkit_ids {
            delete_labkit_rows(&tx, labkit_id, actor)?;
        }

        tx.execute("DELETE FROM kit_type WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    // Labkit operations

    fn create_labkit(&self, new: &NewLabkit, actor: &str) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        check_weight(&tx, new.kit_type_id, new.measured_weight)?;

        let now = format_datetime(&Utc::now());
        tx.execute(
            "INSERT INTO labkit (barcode, kit_type_id, site_id, lot_number, measured_weight, expiry_date, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                new.barcode,
                new.kit_type_id,
                new.site_id,
                new.lot_number,
                new.measured_weight,
                new.expiry_date.as_ref().map(format_date),
                INITIAL_STATUS,
                now,
            ],
        )
        .map_err(|e| Error::unique_or_db(e, "labkit"))?;
        let id = tx.last_insert_rowid();

        insert_audit(
            &tx,
            actor,
            "Labkit",
            id,
            AuditAction::Create,
            None,
            None,
            None,
            Some(&format!("Labkit {} created", new.barcode)),
        )?;
        insert_event(&tx, id, "created", Some("Labkit created"), actor)?;

        tx.commit()?;
        Ok(id)
    }

    fn get_labkit(&self, id: i64) -> Result<Option<Labkit>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LABKIT_COLS} FROM labkit l WHERE l.id = ?1"),
            params![id],
            labkit_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_labkit_by_barcode(&self, barcode: &str) -> Result<Option<Labkit>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LABKIT_COLS} FROM labkit l WHERE l.barcode = ?1"),
            params![barcode],
            labkit_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_labkit_detail(&self, id: i64) -> Result<Option<LabkitDetail>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {LABKIT_COLS}, t.name, s.site_name
                 FROM labkit l
                 LEFT JOIN kit_type t ON l.kit_type_id = t.id
                 LEFT JOIN site s ON l.site_id = s.id
                 WHERE l.id = ?1"
            ),
            params![id],
            labkit_detail_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_labkits(&self) -> Result<Vec<LabkitDetail>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LABKIT_COLS}, t.name, s.site_name
             FROM labkit l
             LEFT JOIN kit_type t ON l.kit_type_id = t.id
             LEFT JOIN site s ON l.site_id = s.id
             ORDER BY l.id"
        ))?;
        let rows = stmt.query_map([], labkit_detail_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_unassigned_labkits(&self) -> Result<Vec<LabkitSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.barcode, t.name, l.status
             FROM labkit l
             LEFT JOIN kit_type t ON l.kit_type_id = t.id
             WHERE l.shipment_id IS NULL
             ORDER BY l.id",
        )?;
        let rows = stmt.query_map([], summary_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_labkit(&self, id: i64, new: &NewLabkit, actor: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        check_weight(&tx, new.kit_type_id, new.measured_weight)?;

        let rows = tx
            .execute(
                "UPDATE labkit SET barcode = ?1, kit_type_id = ?2, site_id = ?3, lot_number = ?4,
                     measured_weight = ?5, expiry_date = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    new.barcode,
                    new.kit_type_id,
                    new.site_id,
                    new.lot_number,
                    new.measured_weight,
                    new.expiry_date.as_ref().map(format_date),
                    format_datetime(&Utc::now()),
                    id,
                ],
            )
            .map_err(|e| Error::unique_or_db(e, "labkit"))?;
        if rows == 0 {
            return Err(Error::NotFound);
        }

        insert_audit(
            &tx,
            actor,
            "Labkit",
            id,
            AuditAction::Update,
            None,
            None,
            None,
            Some(&format!("Labkit {} updated", new.barcode)),
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_labkit(&self, id: i64, actor: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        delete_labkit_rows(&tx, id, actor)?;
        tx.commit()?;
        Ok(())
    }

    // Status lifecycle

    fn transition_status(
        &self,
        barcode: &str,
        new_status: &str,
        actor: &str,
    ) -> Result<Transition> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let found: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, status FROM labkit WHERE barcode = ?1",
                params![barcode],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((labkit_id, old_status)) = found else {
            return Err(Error::NotFound);
        };

        let now = Utc::now();
        tx.execute(
            "INSERT INTO labkit_status_event (labkit_id, old_status, new_status, event_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![labkit_id, old_status, new_status, format_datetime(&now)],
        )?;
        tx.execute(
            "UPDATE labkit SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_status, format_datetime(&now), labkit_id],
        )?;
        insert_audit(
            &tx,
            actor,
            "Labkit",
            labkit_id,
            AuditAction::StatusChange,
            Some("status"),
            Some(&old_status),
            Some(new_status),
            Some(&format!(
                "Status changed from {old_status} to {new_status}"
            )),
        )?;
        tx.commit()?;

        // The free-form event trail is informational, not authoritative: a
        // failure here must not undo the committed transition.
        let event_logged = match insert_event(
            &conn,
            labkit_id,
            "status_changed",
            Some(&format!("Status {old_status} -> {new_status}")),
            actor,
        ) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    "Failed to record status_changed event for labkit {labkit_id}: {e}"
                );
                false
            }
        };

        Ok(Transition {
            labkit_id,
            barcode: barcode.to_string(),
            old_status,
            new_status: new_status.to_string(),
            event_logged,
        })
    }

    fn status_history(&self, barcode: &str) -> Result<Vec<StatusEvent>> {
        let conn = self.conn();
        let labkit_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM labkit WHERE barcode = ?1",
                params![barcode],
                |row| row.get(0),
            )
            .optional()?;
        let Some(labkit_id) = labkit_id else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT id, labkit_id, old_status, new_status, event_time
             FROM labkit_status_event
             WHERE labkit_id = ?1
             ORDER BY event_time, id",
        )?;
        let rows = stmt.query_map(params![labkit_id], status_event_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Free-form event trail

    fn add_labkit_event(
        &self,
        labkit_id: i64,
        event_type: &str,
        description: Option<&str>,
        actor: &str,
    ) -> Result<i64> {
        let conn = self.conn();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM labkit WHERE id = ?1",
                params![labkit_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }
        insert_event(&conn, labkit_id, event_type, description, actor).map_err(Error::from)
    }

    fn list_labkit_events(&self, labkit_id: i64) -> Result<Vec<KitEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, labkit_id, event_type, description, created_at, created_by
             FROM labkit_event
             WHERE labkit_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![labkit_id], kit_event_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Inventory aggregation

    fn inventory_overview(
        &self,
        site: Option<SiteFilter>,
        kit_type: Option<i64>,
    ) -> Result<Vec<InventoryRow>> {
        let placeholders = (1..=AVAILABLE_STATUSES.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut conditions = vec![format!("l.status IN ({placeholders})")];
        let mut args: Vec<Box<dyn ToSql>> = AVAILABLE_STATUSES
            .iter()
            .map(|s| Box::new(*s) as Box<dyn ToSql>)
            .collect();

        match site {
            Some(SiteFilter::CentralDepot) => conditions.push("l.site_id IS NULL".to_string()),
            Some(SiteFilter::Site(id)) => {
                args.push(Box::new(id));
                conditions.push(format!("l.site_id = ?{}", args.len()));
            }
            None => {}
        }
        if let Some(type_id) = kit_type {
            args.push(Box::new(type_id));
            conditions.push(format!("l.kit_type_id = ?{}", args.len()));
        }

        let query = format!(
            "SELECT COALESCE(s.site_name, 'Central depot') AS site_name,
                    t.name AS kit_type_name,
                    COUNT(*) AS available_count
             FROM labkit l
             LEFT JOIN site s ON l.site_id = s.id
             LEFT JOIN kit_type t ON l.kit_type_id = t.id
             WHERE {}
             GROUP BY COALESCE(s.site_name, 'Central depot'), t.name
             ORDER BY site_name, kit_type_name",
            conditions.join(" AND ")
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(InventoryRow {
                site_name: row.get(0)?,
                kit_type_name: row.get(1)?,
                available_count: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Shipment operations

    fn create_shipment(&self, new: &NewShipment) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO shipment (site_id, shipped_at, expected_arrival, carrier, tracking_number, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.site_id,
                new.shipped_at.as_ref().map(format_datetime),
                new.expected_arrival.as_ref().map(format_date),
                new.carrier,
                new.tracking_number,
                new.status,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_shipment(&self, id: i64) -> Result<Option<ShipmentRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT sh.id, sh.site_id, sh.shipped_at, sh.expected_arrival, sh.carrier,
                    sh.tracking_number, sh.status, s.site_name
             FROM shipment sh
             LEFT JOIN site s ON sh.site_id = s.id
             WHERE sh.id = ?1",
            params![id],
            shipment_row_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_shipment_labkits(&self, shipment_id: i64) -> Result<Vec<LabkitSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.barcode, t.name, l.status
             FROM labkit l
             LEFT JOIN kit_type t ON l.kit_type_id = t.id
             WHERE l.shipment_id = ?1
             ORDER BY l.id",
        )?;
        let rows = stmt.query_map(params![shipment_id], summary_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_shipments_with_counts(&self) -> Result<Vec<ShipmentSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT sh.id, s.site_name, sh.shipped_at, sh.carrier, sh.tracking_number, sh.status,
                    COUNT(l.id) AS number_of_kits
             FROM shipment sh
             LEFT JOIN site s ON sh.site_id = s.id
             LEFT JOIN labkit l ON l.shipment_id = sh.id
             GROUP BY sh.id, s.site_name, sh.shipped_at, sh.carrier, sh.tracking_number, sh.status
             ORDER BY sh.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ShipmentSummary {
                id: row.get(0)?,
                site_name: row.get(1)?,
                shipped_at: row.get::<_, Option<String>>(2)?.map(|s| parse_datetime(&s)),
                carrier: row.get(3)?,
                tracking_number: row.get(4)?,
                status: row.get(5)?,
                number_of_kits: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_shipment(&self, id: i64, new: &NewShipment) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE shipment SET site_id = ?1, shipped_at = ?2, expected_arrival = ?3,
                 carrier = ?4, tracking_number = ?5, status = ?6
             WHERE id = ?7",
            params![
                new.site_id,
                new.shipped_at.as_ref().map(format_datetime),
                new.expected_arrival.as_ref().map(format_date),
                new.carrier,
                new.tracking_number,
                new.status,
                id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn set_shipment_labkits(
        &self,
        shipment_id: i64,
        labkit_ids: &[i64],
        actor: &str,
    ) -> Result<AssignmentOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM shipment WHERE id = ?1",
                params![shipment_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        let current: HashSet<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM labkit WHERE shipment_id = ?1")?;
            let ids = stmt.query_map(params![shipment_id], |row| row.get(0))?;
            ids.collect::<std::result::Result<HashSet<_>, _>>()?
        };
        let desired: HashSet<i64> = labkit_ids.iter().copied().collect();

        let mut to_remove: Vec<i64> = current.difference(&desired).copied().collect();
        let mut to_add: Vec<i64> = desired.difference(&current).copied().collect();
        to_remove.sort_unstable();
        to_add.sort_unstable();

        let mut outcome = AssignmentOutcome::default();

        for labkit_id in to_remove {
            tx.execute(
                "UPDATE labkit SET shipment_id = NULL WHERE id = ?1",
                params![labkit_id],
            )?;
            insert_event(
                &tx,
                labkit_id,
                "removed_from_shipment",
                Some(&format!("Removed from shipment {shipment_id}")),
                actor,
            )?;
            outcome.removed.push(labkit_id);
        }

        for labkit_id in to_add {
            let rows = tx.execute(
                "UPDATE labkit SET shipment_id = ?1 WHERE id = ?2",
                params![shipment_id, labkit_id],
            )?;
            // Unknown ids in the desired set are skipped, not errors
            if rows == 0 {
                continue;
            }
            insert_event(
                &tx,
                labkit_id,
                "added_to_shipment",
                Some(&format!("Added to shipment {shipment_id}")),
                actor,
            )?;
            outcome.added.push(labkit_id);
        }

        tx.commit()?;
        Ok(outcome)
    }

    // Audit log

    #[allow(clippy::too_many_arguments)]
    fn record_audit(
        &self,
        actor: &str,
        entity_type: &str,
        entity_id: i64,
        action: AuditAction,
        field_name: Option<&str>,
        old_value: Option<&str>,
        new_value: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        insert_audit(
            &conn,
            actor,
            entity_type,
            entity_id,
            action,
            field_name,
            old_value,
            new_value,
            description,
        )
        .map_err(Error::from)
    }

    fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(entity_type) = &filter.entity_type {
            args.push(entity_type.clone());
            conditions.push(format!("entity_type = ?{}", args.len()));
        }
        if let Some(from) = &filter.from {
            // Inclusive midnight bound; stored timestamps are RFC 3339 and
            // compare lexicographically within a day.
            args.push(format!("{}T00:00:00", format_date(from)));
            conditions.push(format!("timestamp >= ?{}", args.len()));
        }
        if let Some(to) = &filter.to {
            // Exclusive bound at midnight of the following day.
            let next = *to + chrono::Days::new(1);
            args.push(format!("{}T00:00:00", format_date(&next)));
            conditions.push(format!("timestamp < ?{}", args.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT id, timestamp, user, entity_type, entity_id, action, field_name, old_value, new_value, description
             FROM audit_log
             {where_clause}
             ORDER BY timestamp DESC, id DESC"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), audit_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // User operations

    fn create_user(&self, username: &str, password_hash: &str, role: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO app_user (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, password_hash, role],
        )
        .map_err(|e| Error::unique_or_db(e, "user"))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, password_hash, role FROM app_user WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    role: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, password_hash, role FROM app_user WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    role: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    token.id,
                    token.token_hash,
                    token.token_lookup,
                    token.is_admin,
                    token.user_id,
                    format_datetime(&token.created_at),
                    token.expires_at.as_ref().map(format_datetime),
                ],
            )
            .map_err(|e| Error::unique_or_db(e, "token"))?;
        Ok(())
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
