//! Per-user tasting notes: which items were tried, and how they rated.
//!
//! A user's notes for a restaurant are a map from item id to a small record.
//! Writes replace the whole record for an item, never a single field.

use crate::error::StoreError;
use crate::menu::MenuItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MIN_STARS: u8 = 1;
pub const MAX_STARS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub stars: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Rating {
    pub fn new(stars: u8, text: Option<String>) -> Result<Self, StoreError> {
        let rating = Self {
            stars,
            text: text.and_then(|t| crate::menu::non_blank(&t)),
        };
        rating.validate()?;
        Ok(rating)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if (MIN_STARS..=MAX_STARS).contains(&self.stars) {
            Ok(())
        } else {
            Err(StoreError::InvalidRating { stars: self.stars })
        }
    }
}

/// Everything one user recorded about one item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TastingRecord {
    #[serde(default)]
    pub tried: bool,
    #[serde(default)]
    pub rating: Option<Rating>,
}

impl TastingRecord {
    pub fn tried() -> Self {
        Self {
            tried: true,
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.rating.as_ref().map_or(Ok(()), Rating::validate)
    }

    /// Neither tried nor rated.
    pub fn is_empty(&self) -> bool {
        !self.tried && self.rating.is_none()
    }
}

/// Item id → record, for one user and restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TastingLog(HashMap<String, TastingRecord>);

impl TastingLog {
    /// The record for `item_id`; an empty record if nothing was noted.
    pub fn get(&self, item_id: &str) -> TastingRecord {
        self.0.get(item_id).cloned().unwrap_or_default()
    }

    /// Replace the record for `item_id`. Empty records are dropped.
    pub fn set(&mut self, item_id: impl Into<String>, record: TastingRecord) {
        let item_id = item_id.into();
        if record.is_empty() {
            self.0.remove(&item_id);
        } else {
            self.0.insert(item_id, record);
        }
    }

    pub fn tried_count(&self) -> usize {
        self.0.values().filter(|r| r.tried).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TastingRecord)> {
        self.0.iter()
    }
}

/// A stored item with its rating aggregate over all users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    #[serde(flatten)]
    pub item: MenuItem,
    pub avg_stars: Option<f64>,
    pub review_count: u32,
}
