//! Reconciliation: classify scanned candidates against a restaurant's stored
//! items, then write the result.
//!
//! Classification is a pure function of the two lists. The only identity key
//! is the trimmed, lower-cased name; there is no fuzzy matching.

use crate::error::{ScanError, StoreError};
use crate::menu::{is_filled, MenuItem, MenuItemCandidate, MenuItemUpdate, NewMenuItem};
use crate::progress::ProgressCallback;
use crate::store::MenuItemStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// How one candidate relates to the stored items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Classification {
    /// No stored item has this name.
    New,
    /// A stored item has this name and already holds everything the candidate offers.
    Duplicate {
        #[serde(rename = "existingId")]
        existing_id: String,
    },
    /// A stored item has this name but lacks a field the candidate supplies.
    UpdateCandidate {
        #[serde(rename = "existingId")]
        existing_id: String,
        update: MenuItemUpdate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledCandidate {
    pub candidate: MenuItemCandidate,
    pub classification: Classification,
}

/// Per-candidate classifications, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    pub entries: Vec<ReconciledCandidate>,
}

impl Reconciliation {
    /// Candidates to insert.
    pub fn new_items(&self) -> impl Iterator<Item = &MenuItemCandidate> {
        self.entries
            .iter()
            .filter(|e| e.classification == Classification::New)
            .map(|e| &e.candidate)
    }

    /// Updates to apply.
    pub fn updates(&self) -> impl Iterator<Item = &MenuItemUpdate> {
        self.entries.iter().filter_map(|e| match &e.classification {
            Classification::UpdateCandidate { update, .. } => Some(update),
            _ => None,
        })
    }

    /// Plain duplicates; these are skipped on write.
    pub fn duplicates(&self) -> impl Iterator<Item = &MenuItemCandidate> {
        self.entries
            .iter()
            .filter(|e| matches!(e.classification, Classification::Duplicate { .. }))
            .map(|e| &e.candidate)
    }
}

/// Classify every candidate against `existing`.
///
/// A candidate matching a stored item is an update-candidate iff it supplies a
/// non-empty description, price, category or sub-category that the stored
/// item lacks.
pub fn reconcile(candidates: &[MenuItemCandidate], existing: &[MenuItem]) -> Reconciliation {
    let mut by_name: HashMap<String, &MenuItem> = HashMap::with_capacity(existing.len());
    for item in existing {
        by_name.entry(item.name_key()).or_insert(item);
    }

    let entries = candidates
        .iter()
        .map(|candidate| {
            let classification = match by_name.get(&candidate.name_key()) {
                None => Classification::New,
                Some(item) if supplies_missing_field(candidate, item) => {
                    Classification::UpdateCandidate {
                        existing_id: item.id.clone(),
                        update: MenuItemUpdate::from_candidate(&item.id, candidate),
                    }
                }
                Some(item) => Classification::Duplicate {
                    existing_id: item.id.clone(),
                },
            };
            ReconciledCandidate {
                candidate: candidate.clone(),
                classification,
            }
        })
        .collect();

    Reconciliation { entries }
}

fn supplies_missing_field(candidate: &MenuItemCandidate, item: &MenuItem) -> bool {
    let gap = |offered: &Option<String>, stored: &Option<String>| is_filled(offered) && !is_filled(stored);
    gap(&candidate.description, &item.description)
        || gap(&candidate.price, &item.price)
        || gap(&candidate.category, &item.category)
        || gap(&candidate.sub_category, &item.sub_category)
}

// ── Batch apply ──────────────────────────────────────────────────────────

/// Outcome of [`apply_reconciliation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub added: usize,
    pub updated: usize,
    /// Inserts the store refused as duplicates or incomplete.
    pub skipped: usize,
}

/// Insert the new candidates, then apply the updates.
///
/// The batch is not atomic. A store-level duplicate or missing-field rejection
/// on insert is counted as skipped; any other store error stops the batch with
/// [`ScanError::BatchFailed`], and items already written stay written.
pub fn apply_reconciliation(
    store: &dyn MenuItemStore,
    restaurant_id: &str,
    user_id: &str,
    reconciliation: &Reconciliation,
    progress: Option<&ProgressCallback>,
) -> Result<BatchReport, ScanError> {
    let new_items: Vec<_> = reconciliation.new_items().collect();
    let updates: Vec<_> = reconciliation.updates().collect();
    let total = new_items.len() + updates.len();
    let mut report = BatchReport::default();
    let mut done = 0;

    let fail = |report: &BatchReport, e: StoreError| {
        warn!("Batch stopped after {} added, {} updated: {}", report.added, report.updated, e);
        ScanError::BatchFailed {
            added: report.added,
            updated: report.updated,
            detail: e.to_string(),
        }
    };

    for candidate in new_items {
        match store.create_menu_item(&NewMenuItem::from_candidate(restaurant_id, candidate), Some(user_id)) {
            Ok(_) => report.added += 1,
            Err(e @ (StoreError::DuplicateName { .. } | StoreError::MissingFields(_))) => {
                debug!("Skipping '{}': {}", candidate.name, e);
                report.skipped += 1;
            }
            Err(e) => return Err(fail(&report, e)),
        }
        done += 1;
        if let Some(cb) = progress {
            cb.on_batch_progress(done, total);
        }
    }

    for update in updates {
        if let Err(e) = store.update_menu_item(update) {
            return Err(fail(&report, e));
        }
        report.updated += 1;
        done += 1;
        if let Some(cb) = progress {
            cb.on_batch_progress(done, total);
        }
    }

    info!(
        "Batch for restaurant {}: {} added, {} updated, {} skipped",
        restaurant_id, report.added, report.updated, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::sync::{Arc, Mutex};

    fn fries(description: &str) -> MenuItem {
        MenuItem::new("x", "r1", "Fries").with_description(description)
    }

    #[test]
    fn plain_duplicate_is_not_update() {
        let existing = vec![MenuItem::new("x", "r1", "fries").with_description("crispy")];
        let rec = reconcile(&[MenuItemCandidate::new("Fries")], &existing);
        assert_eq!(
            rec.entries[0].classification,
            Classification::Duplicate { existing_id: "x".into() }
        );
        assert_eq!(rec.duplicates().count(), 1);
        assert_eq!(rec.new_items().count(), 0);
    }

    #[test]
    fn missing_description_makes_update_candidate() {
        let rec = reconcile(
            &[MenuItemCandidate::new("Fries").with_description("crispy")],
            &[fries("")],
        );
        let updates: Vec<_> = rec.updates().cloned().collect();
        assert_eq!(
            updates,
            vec![MenuItemUpdate {
                id: "x".into(),
                name: "Fries".into(),
                description: Some("crispy".into()),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn unmatched_is_new() {
        let rec = reconcile(&[MenuItemCandidate::new("Onion Rings")], &[fries("crispy")]);
        assert_eq!(rec.entries[0].classification, Classification::New);
    }

    #[test]
    fn names_equal_ignoring_case_and_space_are_never_new() {
        let existing = vec![MenuItem::new("a", "r1", "  Pad Thai ")];
        for name in ["pad thai", "PAD THAI", " Pad Thai", "pad thai  "] {
            let rec = reconcile(&[MenuItemCandidate::new(name).with_price("$9")], &existing);
            assert_ne!(rec.entries[0].classification, Classification::New, "{name}");
        }
    }

    #[test]
    fn first_matching_existing_item_wins() {
        let existing = vec![
            MenuItem::new("first", "r1", "Soup"),
            MenuItem::new("second", "r1", "soup").with_price("$4"),
        ];
        let rec = reconcile(&[MenuItemCandidate::new("Soup").with_price("$5")], &existing);
        assert!(matches!(
            &rec.entries[0].classification,
            Classification::UpdateCandidate { existing_id, .. } if existing_id == "first"
        ));
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let candidates = vec![
            MenuItemCandidate::new("Fries").with_description("crispy"),
            MenuItemCandidate::new("Tea"),
            MenuItemCandidate::new("Salad").with_price("$8"),
        ];
        let existing = vec![fries(""), MenuItem::new("t", "r1", "tea")];
        assert_eq!(reconcile(&candidates, &existing), reconcile(&candidates, &existing));
    }

    #[test]
    fn classification_json_shape() {
        let json = serde_json::to_value(Classification::Duplicate { existing_id: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "duplicate", "existingId": "x"}));
        let json = serde_json::to_value(Classification::New).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "new"}));
    }

    struct Recorder(Mutex<Vec<(usize, usize)>>);

    impl crate::progress::ScanProgressCallback for Recorder {
        fn on_batch_progress(&self, done: usize, total: usize) {
            self.0.lock().unwrap().push((done, total));
        }
    }

    #[test]
    fn apply_inserts_new_updates_gaps_and_skips_duplicates() {
        let store = SqliteStore::in_memory().unwrap();
        let fries = store
            .create_menu_item(
                &NewMenuItem {
                    restaurant_id: "r1".into(),
                    name: "Fries".into(),
                    price: Some("$4".into()),
                    ..Default::default()
                },
                None,
            )
            .unwrap();

        let candidates = vec![
            MenuItemCandidate::new("fries").with_description("crispy"),
            MenuItemCandidate::new("Burger").with_price("$12"),
            MenuItemCandidate::new("burger"),
        ];
        let existing = store.list_menu_items("r1").unwrap();
        let rec = reconcile(&candidates, &existing);

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let cb: ProgressCallback = recorder.clone();
        let report = apply_reconciliation(&store, "r1", "u1", &rec, Some(&cb)).unwrap();

        assert_eq!(report, BatchReport { added: 1, updated: 1, skipped: 1 });
        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);

        let updated = store.get_menu_item(&fries.id).unwrap();
        assert_eq!(updated.description.as_deref(), Some("crispy"));
        assert_eq!(updated.price.as_deref(), Some("$4"));
        assert_eq!(store.list_menu_items("r1").unwrap().len(), 2);
    }

    #[test]
    fn apply_stops_on_store_failure_without_rollback() {
        let store = SqliteStore::in_memory().unwrap();
        let rec = Reconciliation {
            entries: vec![
                ReconciledCandidate {
                    candidate: MenuItemCandidate::new("Tea"),
                    classification: Classification::New,
                },
                ReconciledCandidate {
                    candidate: MenuItemCandidate::new("Ghost").with_price("$1"),
                    classification: Classification::UpdateCandidate {
                        existing_id: "missing".into(),
                        update: MenuItemUpdate {
                            id: "missing".into(),
                            name: "Ghost".into(),
                            price: Some("$1".into()),
                            ..Default::default()
                        },
                    },
                },
            ],
        };
        let err = apply_reconciliation(&store, "r1", "u1", &rec, None).unwrap_err();
        assert!(matches!(err, ScanError::BatchFailed { added: 1, updated: 0, .. }));
        assert_eq!(store.list_menu_items("r1").unwrap().len(), 1);
    }
}
