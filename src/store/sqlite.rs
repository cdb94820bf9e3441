use super::{AccountStore, MenuItemStore, TastingStore, UsageStore};
use crate::account::Account;
use crate::error::StoreError;
use crate::menu::{name_key, non_blank, MenuItem, MenuItemUpdate, NewMenuItem};
use crate::quota::MonthKey;
use crate::ratings::{ItemSummary, Rating, TastingLog, TastingRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

const MENU_ITEM_COLUMNS: &str =
    "id, restaurant_id, name, price, description, category, sub_category, created_by_id, created, updated";

/// SQLite-backed store for accounts, menu items, usage counters and tastings.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES accounts(id),
                created TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT PRIMARY KEY REFERENCES accounts(id),
                status TEXT NOT NULL,
                updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS menu_items (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                price TEXT,
                description TEXT,
                category TEXT,
                sub_category TEXT,
                created_by_id TEXT,
                created TEXT NOT NULL,
                updated TEXT,
                deleted TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_menu_items_restaurant ON menu_items(restaurant_id);
            CREATE TABLE IF NOT EXISTS usage_counters (
                user_id TEXT NOT NULL,
                month TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, month)
            );
            CREATE TABLE IF NOT EXISTS tastings (
                user_id TEXT NOT NULL,
                menu_item_id TEXT NOT NULL REFERENCES menu_items(id),
                tried INTEGER NOT NULL DEFAULT 0,
                stars INTEGER,
                review TEXT,
                updated TEXT NOT NULL,
                PRIMARY KEY (user_id, menu_item_id)
            );",
        )?;
        Ok(())
    }
}

fn now() -> String {
    timestamp(&Utc::now())
}

/// Fixed-width so that text ordering is time ordering.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn menu_item_from_row(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    let created: String = row.get(8)?;
    let updated: Option<String> = row.get(9)?;
    Ok(MenuItem {
        id: row.get(0)?,
        restaurant_id: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        sub_category: row.get(6)?,
        created_by_id: row.get(7)?,
        created: parse_timestamp(8, &created)?,
        updated: updated.as_deref().map(|u| parse_timestamp(9, u)).transpose()?,
    })
}

fn load_menu_item(conn: &Connection, id: &str) -> Result<MenuItem, StoreError> {
    conn.query_row(
        &format!("SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE id = ?1 AND deleted IS NULL"),
        params![id],
        menu_item_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound {
        entity: "menu item",
        id: id.to_string(),
    })
}

fn load_account(conn: &Connection, id: &str) -> Result<Option<Account>, StoreError> {
    let account = conn
        .query_row(
            "SELECT a.id, a.name, a.is_admin, s.status
             FROM accounts a LEFT JOIN subscriptions s ON s.user_id = a.id
             WHERE a.id = ?1",
            params![id],
            |row| {
                let is_admin: bool = row.get(2)?;
                let status: Option<String> = row.get(3)?;
                Ok(Account {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_admin,
                    is_paid: is_admin || status.as_deref() == Some("active"),
                })
            },
        )
        .optional()?;
    Ok(account)
}

// ── Menu items ───────────────────────────────────────────────────────────

impl MenuItemStore for SqliteStore {
    fn list_menu_items(&self, restaurant_id: &str) -> Result<Vec<MenuItem>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items
             WHERE restaurant_id = ?1 AND deleted IS NULL
             ORDER BY created DESC, rowid DESC"
        ))?;
        let items = stmt
            .query_map(params![restaurant_id], menu_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn get_menu_item(&self, id: &str) -> Result<MenuItem, StoreError> {
        load_menu_item(&*self.conn()?, id)
    }

    fn create_menu_item(&self, item: &NewMenuItem, created_by: Option<&str>) -> Result<MenuItem, StoreError> {
        let name = item.name.trim();
        if item.restaurant_id.trim().is_empty() || name.is_empty() {
            return Err(StoreError::MissingFields("restaurantId and name are required".into()));
        }

        let conn = self.conn()?;
        let key = name_key(name);
        let mut stmt = conn.prepare("SELECT name FROM menu_items WHERE restaurant_id = ?1 AND deleted IS NULL")?;
        let taken = stmt
            .query_map(params![item.restaurant_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .any(|existing| name_key(existing) == key);
        if taken {
            return Err(StoreError::DuplicateName { name: name.to_string() });
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO menu_items (id, restaurant_id, name, price, description, category, sub_category, created_by_id, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                item.restaurant_id,
                name,
                item.price.as_deref().and_then(non_blank),
                item.description.as_deref().and_then(non_blank),
                item.category.as_deref().and_then(non_blank),
                item.sub_category.as_deref().and_then(non_blank),
                created_by,
                now(),
            ],
        )?;
        load_menu_item(&conn, &id)
    }

    fn update_menu_item(&self, update: &MenuItemUpdate) -> Result<MenuItem, StoreError> {
        let conn = self.conn()?;
        let existing = load_menu_item(&conn, &update.id)?;
        let pick = |new: &Option<String>, old: Option<String>| new.as_deref().and_then(non_blank).or(old);
        let name = non_blank(&update.name).unwrap_or(existing.name);
        conn.execute(
            "UPDATE menu_items
             SET name = ?2, price = ?3, description = ?4, category = ?5, sub_category = ?6, updated = ?7
             WHERE id = ?1",
            params![
                update.id,
                name,
                pick(&update.price, existing.price),
                pick(&update.description, existing.description),
                pick(&update.category, existing.category),
                pick(&update.sub_category, existing.sub_category),
                now(),
            ],
        )?;
        load_menu_item(&conn, &update.id)
    }

    fn replace_menu_item(&self, update: &MenuItemUpdate) -> Result<MenuItem, StoreError> {
        let name = non_blank(&update.name)
            .ok_or_else(|| StoreError::MissingFields("id and name are required".into()))?;
        let conn = self.conn()?;
        load_menu_item(&conn, &update.id)?;
        conn.execute(
            "UPDATE menu_items
             SET name = ?2, price = ?3, description = ?4, category = ?5, sub_category = ?6, updated = ?7
             WHERE id = ?1",
            params![
                update.id,
                name,
                update.price.as_deref().and_then(non_blank),
                update.description.as_deref().and_then(non_blank),
                update.category.as_deref().and_then(non_blank),
                update.sub_category.as_deref().and_then(non_blank),
                now(),
            ],
        )?;
        load_menu_item(&conn, &update.id)
    }

    fn delete_menu_item(&self, id: &str) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE menu_items SET deleted = ?2 WHERE id = ?1 AND deleted IS NULL",
            params![id, now()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "menu item",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

// ── Usage counters ───────────────────────────────────────────────────────

impl UsageStore for SqliteStore {
    fn usage(&self, user_id: &str, month: &MonthKey) -> Result<u32, StoreError> {
        let count = self
            .conn()?
            .query_row(
                "SELECT count FROM usage_counters WHERE user_id = ?1 AND month = ?2",
                params![user_id, month.as_str()],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    fn increment_usage(&self, user_id: &str, month: &MonthKey) -> Result<u32, StoreError> {
        let count = self.conn()?.query_row(
            "INSERT INTO usage_counters (user_id, month, count) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, month) DO UPDATE SET count = count + 1
             RETURNING count",
            params![user_id, month.as_str()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn reset_usage(&self, user_id: &str, month: &MonthKey) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO usage_counters (user_id, month, count) VALUES (?1, ?2, 0)
             ON CONFLICT(user_id, month) DO UPDATE SET count = 0",
            params![user_id, month.as_str()],
        )?;
        Ok(())
    }
}

// ── Accounts ─────────────────────────────────────────────────────────────

impl AccountStore for SqliteStore {
    fn create_account(&self, name: &str, is_admin: bool) -> Result<Account, StoreError> {
        let name = non_blank(name).ok_or_else(|| StoreError::MissingFields("name is required".into()))?;
        let id = Uuid::new_v4().to_string();
        self.conn()?.execute(
            "INSERT INTO accounts (id, name, is_admin, created) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, is_admin, now()],
        )?;
        Ok(Account {
            id,
            name,
            is_admin,
            is_paid: is_admin,
        })
    }

    fn get_account(&self, id: &str) -> Result<Account, StoreError> {
        load_account(&*self.conn()?, id)?.ok_or_else(|| StoreError::NotFound {
            entity: "account",
            id: id.to_string(),
        })
    }

    fn set_subscription(&self, user_id: &str, active: bool) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if load_account(&conn, user_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            });
        }
        conn.execute(
            "INSERT INTO subscriptions (user_id, status, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET status = excluded.status, updated = excluded.updated",
            params![user_id, if active { "active" } else { "canceled" }, now()],
        )?;
        Ok(())
    }

    fn create_session(&self, user_id: &str) -> Result<String, StoreError> {
        let conn = self.conn()?;
        if load_account(&conn, user_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            });
        }
        let token = Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created) VALUES (?1, ?2, ?3)",
            params![token, user_id, now()],
        )?;
        Ok(token)
    }

    fn account_for_session(&self, token: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn()?;
        let user_id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        match user_id {
            Some(id) => load_account(&conn, &id),
            None => Ok(None),
        }
    }
}

// ── Tastings ─────────────────────────────────────────────────────────────

impl TastingStore for SqliteStore {
    fn tasting_log(&self, user_id: &str, restaurant_id: &str) -> Result<TastingLog, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.menu_item_id, t.tried, t.stars, t.review
             FROM tastings t JOIN menu_items m ON m.id = t.menu_item_id
             WHERE t.user_id = ?1 AND m.restaurant_id = ?2 AND m.deleted IS NULL",
        )?;
        let rows = stmt
            .query_map(params![user_id, restaurant_id], |row| {
                let stars: Option<u8> = row.get(2)?;
                let record = TastingRecord {
                    tried: row.get(1)?,
                    rating: stars.map(|stars| Rating {
                        stars,
                        text: None,
                    }),
                };
                Ok((row.get::<_, String>(0)?, record, row.get::<_, Option<String>>(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut log = TastingLog::default();
        for (item_id, mut record, review) in rows {
            if let Some(rating) = record.rating.as_mut() {
                rating.text = review;
            }
            log.set(item_id, record);
        }
        Ok(log)
    }

    fn put_tasting(&self, user_id: &str, item_id: &str, record: &TastingRecord) -> Result<TastingRecord, StoreError> {
        record.validate()?;
        let conn = self.conn()?;
        load_menu_item(&conn, item_id)?;

        if record.is_empty() {
            conn.execute(
                "DELETE FROM tastings WHERE user_id = ?1 AND menu_item_id = ?2",
                params![user_id, item_id],
            )?;
            return Ok(TastingRecord::default());
        }

        let (stars, review) = match &record.rating {
            Some(r) => (Some(r.stars), r.text.as_deref().and_then(non_blank)),
            None => (None, None),
        };
        conn.execute(
            "INSERT INTO tastings (user_id, menu_item_id, tried, stars, review, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, menu_item_id) DO UPDATE SET
                tried = excluded.tried, stars = excluded.stars,
                review = excluded.review, updated = excluded.updated",
            params![user_id, item_id, record.tried, stars, review, now()],
        )?;
        Ok(TastingRecord {
            tried: record.tried,
            rating: stars.map(|stars| Rating { stars, text: review }),
        })
    }

    fn menu_summaries(&self, restaurant_id: &str) -> Result<Vec<ItemSummary>, StoreError> {
        let items = self.list_menu_items(restaurant_id)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.menu_item_id, AVG(t.stars), COUNT(t.stars)
             FROM tastings t JOIN menu_items m ON m.id = t.menu_item_id
             WHERE m.restaurant_id = ?1 AND m.deleted IS NULL AND t.stars IS NOT NULL
             GROUP BY t.menu_item_id",
        )?;
        let aggregates: HashMap<String, (f64, u32)> = stmt
            .query_map(params![restaurant_id], |row| {
                Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get(2)?)))
            })?
            .collect::<Result<_, _>>()?;

        Ok(items
            .into_iter()
            .map(|item| {
                let (avg_stars, review_count) = match aggregates.get(&item.id) {
                    Some(&(avg, count)) => (Some(avg), count),
                    None => (None, 0),
                };
                ItemSummary {
                    item,
                    avg_stars,
                    review_count,
                }
            })
            .collect())
    }
}
