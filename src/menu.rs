//! Menu item types: transient candidates and persisted records.
//!
//! A [`MenuItemCandidate`] is what a scan produces and what the review step
//! edits. A [`MenuItem`] is what the store holds. Reconciliation maps the
//! first onto the second (see [`crate::reconcile`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A not-yet-persisted menu item.
///
/// Optional fields are omitted from JSON when absent, matching the
/// `{name, price?, description?}` shape the extraction endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemCandidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
}

impl MenuItemCandidate {
    /// A candidate with only a (trimmed) name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_price(mut self, price: impl AsRef<str>) -> Self {
        self.price = non_blank(price.as_ref());
        self
    }

    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.description = non_blank(description.as_ref());
        self
    }

    pub fn with_category(mut self, category: impl AsRef<str>) -> Self {
        self.category = non_blank(category.as_ref());
        self
    }

    pub fn with_sub_category(mut self, sub_category: impl AsRef<str>) -> Self {
        self.sub_category = non_blank(sub_category.as_ref());
        self
    }

    /// Trim every field and turn blank optionals into `None`.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            price: self.price.as_deref().and_then(non_blank),
            description: self.description.as_deref().and_then(non_blank),
            category: self.category.as_deref().and_then(non_blank),
            sub_category: self.sub_category.as_deref().and_then(non_blank),
        }
    }

    /// Identity key used for duplicate detection: trimmed, lower-cased name.
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// A menu item stored for a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub created_by_id: Option<String>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl MenuItem {
    /// A bare record, mostly useful for building fixtures.
    pub fn new(id: impl Into<String>, restaurant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            restaurant_id: restaurant_id.into(),
            name: name.into(),
            price: None,
            description: None,
            category: None,
            sub_category: None,
            created_by_id: None,
            created: Utc::now(),
            updated: None,
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// Fields for inserting a menu item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMenuItem {
    pub restaurant_id: String,
    pub name: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
}

impl NewMenuItem {
    pub fn from_candidate(restaurant_id: impl Into<String>, candidate: &MenuItemCandidate) -> Self {
        let c = candidate.clone().normalized();
        Self {
            restaurant_id: restaurant_id.into(),
            name: c.name,
            price: c.price,
            description: c.description,
            category: c.category,
            sub_category: c.sub_category,
        }
    }
}

/// An update addressed to an existing item.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItemUpdate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
}

impl MenuItemUpdate {
    /// The existing item's id carrying the candidate's fields.
    pub fn from_candidate(id: impl Into<String>, candidate: &MenuItemCandidate) -> Self {
        let c = candidate.clone().normalized();
        Self {
            id: id.into(),
            name: c.name,
            price: c.price,
            description: c.description,
            category: c.category,
            sub_category: c.sub_category,
        }
    }
}

/// Trimmed, lower-cased name: the sole identity key between items.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// `Some(trimmed)` unless the value is blank.
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// `true` when the optional holds a non-blank string.
pub(crate) fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ── Review-step editing ─────────────────────────────────────────────────

/// Editable field of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateField {
    Name,
    Price,
    Description,
    Category,
    SubCategory,
}

/// The candidate list under review, with the manual corrections the review
/// step offers. Every operation is index-based; out-of-range indices leave
/// the list unchanged and return `false`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateList(Vec<MenuItemCandidate>);

impl CandidateList {
    pub fn new(items: Vec<MenuItemCandidate>) -> Self {
        Self(items)
    }

    pub fn as_slice(&self) -> &[MenuItemCandidate] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<MenuItemCandidate> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace one field of one candidate. Blank optional values clear the field.
    pub fn edit(&mut self, idx: usize, field: CandidateField, value: &str) -> bool {
        let Some(item) = self.0.get_mut(idx) else {
            return false;
        };
        match field {
            CandidateField::Name => item.name = value.to_string(),
            CandidateField::Price => item.price = non_blank(value),
            CandidateField::Description => item.description = non_blank(value),
            CandidateField::Category => item.category = non_blank(value),
            CandidateField::SubCategory => item.sub_category = non_blank(value),
        }
        true
    }

    pub fn remove(&mut self, idx: usize) -> Option<MenuItemCandidate> {
        (idx < self.0.len()).then(|| self.0.remove(idx))
    }

    /// Append an empty candidate for manual entry.
    pub fn push_blank(&mut self) {
        self.0.push(MenuItemCandidate::default());
    }

    /// Split the name at byte offset `at`. The first half keeps the other
    /// fields; the second half becomes a name-only candidate. Refused when
    /// either half would be blank.
    pub fn split(&mut self, idx: usize, at: usize) -> bool {
        let Some(item) = self.0.get(idx) else {
            return false;
        };
        if !item.name.is_char_boundary(at) {
            return false;
        }
        let (before, after) = item.name.split_at(at);
        let (before, after) = (before.trim().to_string(), after.trim().to_string());
        if before.is_empty() || after.is_empty() {
            return false;
        }
        let first = MenuItemCandidate {
            name: before,
            ..item.clone()
        };
        self.0.splice(idx..=idx, [first, MenuItemCandidate::new(after)]);
        true
    }

    /// Split at the first space at or after the middle of the name.
    pub fn split_near_middle(&mut self, idx: usize) -> bool {
        let Some(item) = self.0.get(idx) else {
            return false;
        };
        let name = &item.name;
        let mut mid = name.len() / 2;
        while !name.is_char_boundary(mid) {
            mid += 1;
        }
        match name[mid..].find(' ') {
            Some(offset) if mid + offset > 0 => self.split(idx, mid + offset),
            _ => false,
        }
    }

    /// Merge a candidate with the one after it: names are joined with a
    /// space, and each optional field takes the first non-empty value.
    pub fn merge_with_next(&mut self, idx: usize) -> bool {
        if idx + 1 >= self.0.len() {
            return false;
        }
        let next = self.0.remove(idx + 1);
        let item = &mut self.0[idx];
        item.name = format!("{} {}", item.name, next.name);
        item.price = item.price.take().filter(|p| !p.is_empty()).or(next.price);
        item.description = item
            .description
            .take()
            .filter(|d| !d.is_empty())
            .or(next.description);
        item.category = item.category.take().or(next.category);
        item.sub_category = item.sub_category.take().or(next.sub_category);
        true
    }
}

impl From<Vec<MenuItemCandidate>> for CandidateList {
    fn from(items: Vec<MenuItemCandidate>) -> Self {
        Self(items)
    }
}
