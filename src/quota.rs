//! Monthly quota on the remote AI extraction strategy.
//!
//! One counter per (user, `YYYY-MM`). [`QuotaGate::authorize`] runs before
//! the remote call and mutates nothing; [`QuotaGate::record_success`] runs
//! after a successful extraction and increments the counter in a single
//! upsert. A failed extraction is never charged.
//!
//! The month is taken from the UTC clock when the ticket is issued, so a call
//! that straddles midnight on the last day of a month is charged to the month
//! it was authorized in.

use crate::account::Account;
use crate::error::ScanError;
use crate::store::UsageStore;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Calendar month key, `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthKey(String);

impl MonthKey {
    /// The current UTC month.
    pub fn current() -> Self {
        Self::from_date(&Utc::now())
    }

    pub fn from_date<Tz: TimeZone>(date: &DateTime<Tz>) -> Self {
        Self(format!("{:04}-{:02}", date.year(), date.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission to make one remote call, issued by [`QuotaGate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTicket {
    user_id: String,
    month: MonthKey,
    metered: bool,
}

impl QuotaTicket {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn month(&self) -> &MonthKey {
        &self.month
    }

    /// `false` for paid and admin accounts.
    pub fn is_metered(&self) -> bool {
        self.metered
    }
}

/// Usage reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub count: u32,
    /// `None` (JSON `null`) means unlimited.
    pub limit: Option<u32>,
    pub is_paid: bool,
}

/// Checks and counts free-tier AI extractions.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn UsageStore>,
    limit: u32,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn UsageStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Check the quota for the current month.
    pub fn authorize(&self, account: &Account) -> Result<QuotaTicket, ScanError> {
        self.authorize_in(account, MonthKey::current())
    }

    /// Check the quota for `month`. Refusal leaves the counter untouched.
    pub fn authorize_in(&self, account: &Account, month: MonthKey) -> Result<QuotaTicket, ScanError> {
        if account.is_paid_or_admin() {
            return Ok(QuotaTicket {
                user_id: account.id.clone(),
                month,
                metered: false,
            });
        }

        let used = self.store.usage(&account.id, &month)?;
        if used >= self.limit {
            info!("Quota refused for {} in {}: {}/{}", account.id, month, used, self.limit);
            return Err(ScanError::QuotaExceeded {
                used,
                limit: self.limit,
            });
        }

        Ok(QuotaTicket {
            user_id: account.id.clone(),
            month,
            metered: true,
        })
    }

    /// Charge a successful extraction. Returns the new count, or `None` for
    /// unmetered tickets.
    pub fn record_success(&self, ticket: QuotaTicket) -> Result<Option<u32>, ScanError> {
        if !ticket.metered {
            return Ok(None);
        }
        let count = self.store.increment_usage(&ticket.user_id, &ticket.month)?;
        debug!("Usage for {} in {} is now {}", ticket.user_id, ticket.month, count);
        Ok(Some(count))
    }

    /// Usage for the current month. Anonymous callers see the free-tier
    /// ceiling with a zero count.
    pub fn snapshot(&self, account: Option<&Account>) -> Result<UsageSnapshot, ScanError> {
        self.snapshot_in(account, &MonthKey::current())
    }

    pub fn snapshot_in(&self, account: Option<&Account>, month: &MonthKey) -> Result<UsageSnapshot, ScanError> {
        match account {
            None => Ok(UsageSnapshot {
                count: 0,
                limit: Some(self.limit),
                is_paid: false,
            }),
            Some(a) if a.is_paid_or_admin() => Ok(UsageSnapshot {
                count: 0,
                limit: None,
                is_paid: true,
            }),
            Some(a) => Ok(UsageSnapshot {
                count: self.store.usage(&a.id, month)?,
                limit: Some(self.limit),
                is_paid: false,
            }),
        }
    }

    /// Zero `user_id`'s counter for the current month. Admin only.
    pub fn reset(&self, caller: &Account, user_id: &str) -> Result<(), ScanError> {
        self.reset_in(caller, user_id, &MonthKey::current())
    }

    pub fn reset_in(&self, caller: &Account, user_id: &str, month: &MonthKey) -> Result<(), ScanError> {
        if !caller.is_admin {
            return Err(ScanError::Forbidden("usage reset requires an admin".into()));
        }
        self.store.reset_usage(user_id, month)?;
        info!("Admin {} reset usage for {} in {}", caller.id, user_id, month);
        Ok(())
    }
}
