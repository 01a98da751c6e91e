//! Cached route snapshots and in-place item patching.
//!
//! The cache is a denormalized mirror of what the server returned. Route items
//! are opaque JSON owned by the server; the only field the engine reads is the
//! item `id`, used to locate the item a queued action targets.

use crate::{RouteId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Item status written after a check-in.
pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";

/// Item status written after a check-out.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// A route as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDocument {
    pub id: RouteId,
    pub date: String,
    pub owner_id: String,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub status: String,
}

/// A route snapshot held in the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRoute {
    /// Server-assigned route identifier
    pub id: RouteId,
    /// Calendar date of the route as the server spelled it
    pub date: String,
    /// Assigned worker
    pub owner_id: String,
    /// Route items, passed through untouched apart from patches
    pub items: Vec<Value>,
    /// Server-defined lifecycle label
    pub status: String,
    /// Milliseconds since epoch of the last write-through
    pub cached_at: Timestamp,
}

impl CachedRoute {
    /// Snapshot a fetched document.
    pub fn from_document(doc: RouteDocument, cached_at: Timestamp) -> Self {
        Self {
            id: doc.id,
            date: doc.date,
            owner_id: doc.owner_id,
            items: doc.items,
            status: doc.status,
            cached_at,
        }
    }

    /// Find an item by id.
    pub fn item(&self, item_id: &str) -> Option<&Value> {
        self.items.iter().find(|item| item_matches(item, item_id))
    }

    /// Apply a patch to the targeted item.
    ///
    /// Returns `false` when the patch targets another route or the item is not
    /// in this snapshot; the route is left untouched in that case.
    pub fn apply_patch(&mut self, patch: &RoutePatch, at: Timestamp) -> bool {
        if patch.route_id != self.id {
            return false;
        }

        let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item_matches(item, &patch.item_id))
        else {
            return false;
        };

        let Some(fields) = item.as_object_mut() else {
            return false;
        };

        patch.change.apply(fields);
        self.cached_at = at;
        true
    }
}

/// A change to one field set of a route item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ItemChange {
    /// Overwrite the given top-level fields
    SetFields { fields: Map<String, Value> },
    /// Set `productCounts[product_id]` to a quantity
    SetProductCount { product_id: String, quantity: f64 },
    /// Add one to a numeric counter field, creating it at 1
    Increment { field: String },
}

impl ItemChange {
    /// Whether applying the change twice leaves the item as applying it once.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, ItemChange::Increment { .. })
    }

    fn apply(&self, item: &mut Map<String, Value>) {
        match self {
            ItemChange::SetFields { fields } => {
                for (k, v) in fields {
                    item.insert(k.clone(), v.clone());
                }
            }
            ItemChange::SetProductCount {
                product_id,
                quantity,
            } => {
                let counts = item
                    .entry("productCounts")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !counts.is_object() {
                    *counts = Value::Object(Map::new());
                }
                if let Some(counts) = counts.as_object_mut() {
                    counts.insert(product_id.clone(), number(*quantity));
                }
            }
            ItemChange::Increment { field } => {
                let next = item.get(field).and_then(Value::as_i64).unwrap_or(0) + 1;
                item.insert(field.clone(), Value::from(next));
            }
        }
    }
}

/// A change targeted at one item of one cached route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePatch {
    pub route_id: RouteId,
    pub item_id: String,
    pub change: ItemChange,
}

impl RoutePatch {
    /// Whether both patches touch the same item of the same route.
    pub fn same_target(&self, other: &RoutePatch) -> bool {
        self.route_id == other.route_id && self.item_id == other.item_id
    }

    /// Patch that overwrites the given fields.
    pub fn set_fields(
        route_id: impl Into<RouteId>,
        item_id: impl Into<String>,
        fields: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            item_id: item_id.into(),
            change: ItemChange::SetFields {
                fields: fields
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            },
        }
    }
}

/// Pick the cached routes for a calendar date.
///
/// `prefix_hits` is the indexed prefix lookup. When it is empty the full scan
/// is filtered here instead, tolerating timestamps and other spellings of the
/// same day that a plain prefix lookup misses.
pub fn select_routes_for_date<F>(
    prefix_hits: Vec<CachedRoute>,
    full_scan: F,
    date: &str,
) -> Vec<CachedRoute>
where
    F: FnOnce() -> Vec<CachedRoute>,
{
    if !prefix_hits.is_empty() {
        return prefix_hits;
    }

    let wanted = calendar_day(date);
    full_scan()
        .into_iter()
        .filter(|route| {
            route.date.starts_with(date)
                || (wanted.is_some() && calendar_day(&route.date) == wanted)
        })
        .collect()
}

/// The `YYYY-MM-DD` part of a date or timestamp string, if it has one.
pub fn calendar_day(value: &str) -> Option<&str> {
    let value = value.trim();
    let day = value.get(..10)?;
    let bytes = day.as_bytes();
    let shaped = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    shaped.then_some(day)
}

fn item_matches(item: &Value, item_id: &str) -> bool {
    match item.get("id") {
        Some(Value::String(s)) => s == item_id,
        Some(Value::Number(n)) => n.to_string() == item_id,
        _ => false,
    }
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(id: &str, date: &str) -> CachedRoute {
        CachedRoute {
            id: id.to_string(),
            date: date.to_string(),
            owner_id: "emp-1".to_string(),
            items: vec![
                json!({"id": "item-a", "storeName": "Mercado Sol", "status": "PENDING"}),
                json!({"id": 42, "storeName": "Atacadao", "status": "PENDING"}),
            ],
            status: "OPEN".to_string(),
            cached_at: 1000,
        }
    }

    #[test]
    fn set_fields_patch_touches_only_target_item() {
        let mut cached = route("r-1", "2024-05-10");
        let patch = RoutePatch::set_fields(
            "r-1",
            "item-a",
            [("status", json!(STATUS_IN_PROGRESS)), ("checkInAt", json!(2000))],
        );

        assert!(cached.apply_patch(&patch, 2500));
        assert_eq!(cached.items[0]["status"], STATUS_IN_PROGRESS);
        assert_eq!(cached.items[0]["checkInAt"], 2000);
        assert_eq!(cached.items[0]["storeName"], "Mercado Sol");
        assert_eq!(cached.items[1]["status"], "PENDING");
        assert_eq!(cached.cached_at, 2500);
    }

    #[test]
    fn numeric_item_ids_match_textually() {
        let mut cached = route("r-1", "2024-05-10");
        let patch = RoutePatch::set_fields("r-1", "42", [("status", json!(STATUS_COMPLETED))]);
        assert!(cached.apply_patch(&patch, 2000));
        assert_eq!(cached.items[1]["status"], STATUS_COMPLETED);
    }

    #[test]
    fn patch_for_other_route_or_missing_item_is_ignored() {
        let mut cached = route("r-1", "2024-05-10");
        let before = cached.clone();

        let other_route = RoutePatch::set_fields("r-2", "item-a", [("status", json!("X"))]);
        assert!(!cached.apply_patch(&other_route, 2000));

        let missing_item = RoutePatch::set_fields("r-1", "item-z", [("status", json!("X"))]);
        assert!(!cached.apply_patch(&missing_item, 2000));

        assert_eq!(cached, before);
    }

    #[test]
    fn product_count_and_increment() {
        let mut cached = route("r-1", "2024-05-10");
        let count = RoutePatch {
            route_id: "r-1".into(),
            item_id: "item-a".into(),
            change: ItemChange::SetProductCount {
                product_id: "sku-9".into(),
                quantity: 12.0,
            },
        };
        let photo = RoutePatch {
            route_id: "r-1".into(),
            item_id: "item-a".into(),
            change: ItemChange::Increment {
                field: "photoCount".into(),
            },
        };

        cached.apply_patch(&count, 2000);
        cached.apply_patch(&photo, 2000);
        cached.apply_patch(&photo, 2000);

        assert_eq!(cached.items[0]["productCounts"]["sku-9"], 12);
        assert_eq!(cached.items[0]["photoCount"], 2);
    }

    #[test]
    fn from_document_keeps_items_verbatim() {
        let doc: RouteDocument = serde_json::from_value(json!({
            "id": "r-7",
            "date": "2024-05-10",
            "ownerId": "emp-3",
            "items": [{"id": "x", "nested": {"deep": [1, 2, 3]}}],
            "status": "OPEN"
        }))
        .unwrap();

        let cached = CachedRoute::from_document(doc, 99);
        assert_eq!(cached.owner_id, "emp-3");
        assert_eq!(cached.items[0]["nested"]["deep"][2], 3);
        assert_eq!(cached.cached_at, 99);
    }

    #[test]
    fn prefix_hits_win() {
        let hits = vec![route("r-1", "2024-05-10")];
        let selected = select_routes_for_date(hits, || panic!("full scan not needed"), "2024-05-10");
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn empty_prefix_lookup_falls_back_to_full_scan() {
        let all = vec![
            route("r-1", "2024-05-10T03:00:00.000Z"),
            route("r-2", "2024-05-11"),
            route("r-3", " 2024-05-10"),
        ];
        let selected = select_routes_for_date(Vec::new(), || all, "2024-05-10");
        let ids: Vec<_> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-3"]);
    }

    #[test]
    fn calendar_day_shapes() {
        assert_eq!(calendar_day("2024-05-10"), Some("2024-05-10"));
        assert_eq!(calendar_day("2024-05-10T23:59:59Z"), Some("2024-05-10"));
        assert_eq!(calendar_day("10/05/2024"), None);
        assert_eq!(calendar_day("2024"), None);
    }
}
