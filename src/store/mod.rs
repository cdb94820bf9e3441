//! Persistence collaborators.
//!
//! The pipeline only talks to these traits. [`SqliteStore`] implements all of
//! them over one connection. Operations are synchronous and short; SQLite runs
//! in-process.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::account::Account;
use crate::error::StoreError;
use crate::menu::{MenuItem, MenuItemUpdate, NewMenuItem};
use crate::quota::MonthKey;
use crate::ratings::{ItemSummary, TastingLog, TastingRecord};

/// Menu items per restaurant, with soft deletion and case-insensitive
/// duplicate-name rejection on insert.
pub trait MenuItemStore: Send + Sync {
    /// Live items for a restaurant, newest first.
    fn list_menu_items(&self, restaurant_id: &str) -> Result<Vec<MenuItem>, StoreError>;

    /// A live item by id.
    fn get_menu_item(&self, id: &str) -> Result<MenuItem, StoreError>;

    /// Insert a new item. Fails with [`StoreError::DuplicateName`] when a live
    /// item of the same restaurant has the same trimmed, lower-cased name.
    fn create_menu_item(&self, item: &NewMenuItem, created_by: Option<&str>) -> Result<MenuItem, StoreError>;

    /// Set the fields present in `update`; absent fields keep their value.
    fn update_menu_item(&self, update: &MenuItemUpdate) -> Result<MenuItem, StoreError>;

    /// Overwrite name, price, description and tags; absent fields are cleared.
    fn replace_menu_item(&self, update: &MenuItemUpdate) -> Result<MenuItem, StoreError>;

    /// Soft-delete an item.
    fn delete_menu_item(&self, id: &str) -> Result<(), StoreError>;
}

/// Monthly AI usage counters keyed by (user, month).
pub trait UsageStore: Send + Sync {
    /// Current count; 0 when no row exists.
    fn usage(&self, user_id: &str, month: &MonthKey) -> Result<u32, StoreError>;

    /// Create the row at 1 or increment it, atomically. Returns the new count.
    fn increment_usage(&self, user_id: &str, month: &MonthKey) -> Result<u32, StoreError>;

    /// Set the count to 0, creating the row if needed.
    fn reset_usage(&self, user_id: &str, month: &MonthKey) -> Result<(), StoreError>;
}

/// Accounts, sessions and subscription status.
pub trait AccountStore: Send + Sync {
    fn create_account(&self, name: &str, is_admin: bool) -> Result<Account, StoreError>;

    fn get_account(&self, id: &str) -> Result<Account, StoreError>;

    /// Mark the account's subscription active or inactive.
    fn set_subscription(&self, user_id: &str, active: bool) -> Result<(), StoreError>;

    /// Issue a new session token.
    fn create_session(&self, user_id: &str) -> Result<String, StoreError>;

    /// The account a session token belongs to, if the token is known.
    fn account_for_session(&self, token: &str) -> Result<Option<Account>, StoreError>;
}

/// Tried flags and ratings.
pub trait TastingStore: Send + Sync {
    /// One user's records for the live items of a restaurant.
    fn tasting_log(&self, user_id: &str, restaurant_id: &str) -> Result<TastingLog, StoreError>;

    /// Replace the user's record for an item. An empty record removes it.
    fn put_tasting(&self, user_id: &str, item_id: &str, record: &TastingRecord) -> Result<TastingRecord, StoreError>;

    /// Live items of a restaurant with their rating aggregates, newest first.
    fn menu_summaries(&self, restaurant_id: &str) -> Result<Vec<ItemSummary>, StoreError>;
}
