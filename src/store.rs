use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use rusqlite::{
    ffi, params, params_from_iter, types::Value, Connection, ErrorCode, OptionalExtension, Row,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Contact, ContactChanges, Phone};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key")]
    DuplicateKey,
    #[error("database: {0}")]
    Failure(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            StoreError::DuplicateKey
        } else {
            StoreError::Failure(err)
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ContactStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] when the email is taken.
    fn create_contact(
        &self,
        name: &str,
        email: &str,
        address: Option<&str>,
    ) -> StoreResult<Contact>;
    fn get_contact(&self, id: i64) -> StoreResult<Option<Contact>>;
    /// Case-insensitive substring match on name or email, ordered by name.
    /// `page` is 1-based.
    fn list_contacts(&self, search: &str, page: u32, per_page: u32) -> StoreResult<Vec<Contact>>;
    fn count_contacts(&self, search: &str) -> StoreResult<i64>;
    /// Overwrites only the supplied fields and refreshes `updated_at`.
    fn update_contact(&self, id: i64, changes: &ContactChanges) -> StoreResult<Option<Contact>>;
    /// Removes the contact and, through the foreign key, all its phones.
    fn delete_contact(&self, id: i64) -> StoreResult<bool>;
    fn health_check(&self) -> StoreResult<()>;
}

/// Phone persistence. Phones are owned by exactly one contact.
pub trait PhoneStore: Send + Sync {
    fn add_phone(&self, contact_id: i64, number: &str, label: Option<&str>) -> StoreResult<Phone>;
    /// Phones of a contact in creation order.
    fn list_phones_by_contact(&self, contact_id: i64) -> StoreResult<Vec<Phone>>;
    fn delete_phone(&self, id: i64) -> StoreResult<bool>;
    /// Deletes the phone only if it belongs to `contact_id` and the contact
    /// keeps at least one other phone. Check and delete are one statement.
    fn delete_phone_keeping_one(&self, contact_id: i64, phone_id: i64) -> StoreResult<bool>;
}

pub fn init_db(conn: &Arc<Mutex<Connection>>) -> StoreResult<()> {
    let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            address     TEXT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS phones (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            contact_id  INTEGER NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            number      TEXT NOT NULL,
            label       TEXT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_phones_contact_id ON phones(contact_id);
        "#,
    )?;
    Ok(())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// LIKE pattern matching `term` literally anywhere in the value.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

const SEARCH_FILTER: &str = "WHERE name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        address: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn phone_from_row(row: &Row<'_>) -> rusqlite::Result<Phone> {
    Ok(Phone {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        number: row.get(2)?,
        label: row.get(3)?,
    })
}

fn fetch_contact_by_id(conn: &Connection, id: i64) -> StoreResult<Option<Contact>> {
    let contact = conn
        .query_row(
            "SELECT id, name, email, address, created_at, updated_at FROM contacts WHERE id = ?1",
            params![id],
            contact_from_row,
        )
        .optional()?;
    Ok(contact)
}

/// SQLite-backed store sharing one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn open(path: &str) -> StoreResult<Self> {
        let conn = Arc::new(Mutex::new(Connection::open(path)?));
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory()?));
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.count_contacts("")? == 0)
    }
}

impl ContactStore for SqliteStore {
    fn create_contact(
        &self,
        name: &str,
        email: &str,
        address: Option<&str>,
    ) -> StoreResult<Contact> {
        let conn = self.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO contacts (name, email, address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, email, address, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "contact inserted");

        Ok(Contact {
            id,
            name: name.to_string(),
            email: email.to_string(),
            address: address.map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn get_contact(&self, id: i64) -> StoreResult<Option<Contact>> {
        let conn = self.lock();
        fetch_contact_by_id(&conn, id)
    }

    fn list_contacts(&self, search: &str, page: u32, per_page: u32) -> StoreResult<Vec<Contact>> {
        let conn = self.lock();
        let limit = i64::from(per_page.max(1));
        let offset = i64::from(page.max(1) - 1) * limit;

        let contacts = if search.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, address, created_at, updated_at FROM contacts
                 ORDER BY name COLLATE NOCASE ASC, id ASC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit, offset], contact_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, email, address, created_at, updated_at FROM contacts
                 {SEARCH_FILTER}
                 ORDER BY name COLLATE NOCASE ASC, id ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(params![like_pattern(search), limit, offset], contact_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(contacts)
    }

    fn count_contacts(&self, search: &str) -> StoreResult<i64> {
        let conn = self.lock();
        let count = if search.is_empty() {
            conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?
        } else {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM contacts {SEARCH_FILTER}"),
                params![like_pattern(search)],
                |r| r.get(0),
            )?
        };
        Ok(count)
    }

    fn update_contact(&self, id: i64, changes: &ContactChanges) -> StoreResult<Option<Contact>> {
        let conn = self.lock();
        if changes.is_empty() {
            return fetch_contact_by_id(&conn, id);
        }

        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(name) = &changes.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(email) = &changes.email {
            sets.push("email = ?");
            values.push(Value::Text(email.clone()));
        }
        if let Some(address) = &changes.address {
            sets.push("address = ?");
            values.push(address.clone().map_or(Value::Null, Value::Text));
        }
        sets.push("updated_at = ?");
        values.push(Value::Text(now_timestamp()));
        values.push(Value::Integer(id));

        let sql = format!("UPDATE contacts SET {} WHERE id = ?", sets.join(", "));
        let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
        if updated == 0 {
            return Ok(None);
        }
        fetch_contact_by_id(&conn, id)
    }

    fn delete_contact(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock();
        let rows_affected = conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
        debug!(id, rows_affected, "contact delete");
        Ok(rows_affected > 0)
    }

    fn health_check(&self) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }
}

impl PhoneStore for SqliteStore {
    fn add_phone(&self, contact_id: i64, number: &str, label: Option<&str>) -> StoreResult<Phone> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO phones (contact_id, number, label) VALUES (?1, ?2, ?3)",
            params![contact_id, number, label],
        )?;
        Ok(Phone {
            id: conn.last_insert_rowid(),
            contact_id,
            number: number.to_string(),
            label: label.map(str::to_string),
        })
    }

    fn list_phones_by_contact(&self, contact_id: i64) -> StoreResult<Vec<Phone>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, contact_id, number, label FROM phones
             WHERE contact_id = ?1 ORDER BY id ASC",
        )?;
        let phones = stmt
            .query_map(params![contact_id], phone_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(phones)
    }

    fn delete_phone(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock();
        let rows_affected = conn.execute("DELETE FROM phones WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    fn delete_phone_keeping_one(&self, contact_id: i64, phone_id: i64) -> StoreResult<bool> {
        let conn = self.lock();
        let rows_affected = conn.execute(
            "DELETE FROM phones
             WHERE id = ?1 AND contact_id = ?2
               AND (SELECT COUNT(*) FROM phones WHERE contact_id = ?2) > 1",
            params![phone_id, contact_id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Inserts a few sample contacts, each with at least one phone.
pub fn seed_data(store: &SqliteStore) -> StoreResult<usize> {
    struct SeedContact {
        name: &'static str,
        email: &'static str,
        address: Option<&'static str>,
        phones: &'static [(&'static str, Option<&'static str>)],
    }

    const SEEDS: &[SeedContact] = &[
        SeedContact {
            name: "Ana Petrovska",
            email: "ana.petrovska@example.com",
            address: Some("Partizanska 12, Skopje"),
            phones: &[("+389 70 111 222", Some("mobile")), ("+389 2 3111 222", Some("work"))],
        },
        SeedContact {
            name: "Bojan Trajkov",
            email: "bojan.trajkov@example.com",
            address: Some("Ilindenska 4, Bitola"),
            phones: &[("+389 71 333 444", Some("mobile"))],
        },
        SeedContact {
            name: "Elena Stojanova",
            email: "elena@example.org",
            address: None,
            phones: &[("(02) 555-0101", None)],
        },
        SeedContact {
            name: "Marko Nikolov",
            email: "marko.nikolov@example.net",
            address: Some("Bulevar Goce Delcev 9, Skopje"),
            phones: &[("+389 75 666 777", Some("home")), ("+389 75 666 778", Some("work"))],
        },
        SeedContact {
            name: "Teca",
            email: "teca@example.com",
            address: Some("Street 1"),
            phones: &[("38911112222", Some("home"))],
        },
    ];

    for seed in SEEDS {
        let contact = store.create_contact(seed.name, seed.email, seed.address)?;
        for (number, label) in seed.phones {
            store.add_phone(contact.id, number, *label)?;
        }
    }
    info!(count = SEEDS.len(), "seeded sample contacts");
    Ok(SEEDS.len())
}
