//! Database operations for the routes table.

use super::{Pool, StoreError};
use fieldsync_engine::{CachedRoute, RoutePatch, Timestamp};
use sqlx::Row;

/// A stored route row from the database.
#[derive(Debug)]
pub struct StoredRoute {
    pub id: String,
    pub date: String,
    pub owner_id: String,
    pub items: String,
    pub status: String,
    pub cached_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredRoute {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRoute {
            id: row.try_get("id")?,
            date: row.try_get("date")?,
            owner_id: row.try_get("owner_id")?,
            items: row.try_get("items")?,
            status: row.try_get("status")?,
            cached_at: row.try_get("cached_at")?,
        })
    }
}

impl StoredRoute {
    /// Convert database row to a cached route.
    pub fn to_cached_route(&self) -> Result<CachedRoute, StoreError> {
        let items = serde_json::from_str(&self.items).map_err(|e| StoreError::Corrupt {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(CachedRoute {
            id: self.id.clone(),
            date: self.date.clone(),
            owner_id: self.owner_id.clone(),
            items,
            status: self.status.clone(),
            cached_at: self.cached_at,
        })
    }
}

/// Upsert a route snapshot, replacing any previous row with the same id.
pub async fn upsert_route(pool: &Pool, route: &CachedRoute) -> Result<(), StoreError> {
    let items = serde_json::to_string(&route.items).map_err(|source| StoreError::Encode {
        what: "route items",
        source,
    })?;

    sqlx::query(
        r#"
        INSERT INTO routes (id, date, owner_id, items, status, cached_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            date = excluded.date,
            owner_id = excluded.owner_id,
            items = excluded.items,
            status = excluded.status,
            cached_at = excluded.cached_at
        "#,
    )
    .bind(&route.id)
    .bind(&route.date)
    .bind(&route.owner_id)
    .bind(items)
    .bind(&route.status)
    .bind(route.cached_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort upsert: caching never fails the caller's flow.
pub async fn put_route(pool: &Pool, route: &CachedRoute) {
    if let Err(e) = upsert_route(pool, route).await {
        tracing::error!(route_id = %route.id, error = %e, "Failed to cache route");
    }
}

/// Get a cached route by id.
pub async fn get_route(pool: &Pool, id: &str) -> Result<Option<CachedRoute>, StoreError> {
    let stored = sqlx::query_as::<_, StoredRoute>(
        "SELECT id, date, owner_id, items, status, cached_at FROM routes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    stored.map(|s| s.to_cached_route()).transpose()
}

/// Routes whose `date` starts with `prefix`.
///
/// A plain string prefix match on the indexed column. Callers fall back to
/// [`get_all_routes`] when this comes back empty.
pub async fn get_routes_by_date_prefix(
    pool: &Pool,
    prefix: &str,
) -> Result<Vec<CachedRoute>, StoreError> {
    // [prefix, prefix + U+10FFFF) covers every string starting with prefix
    let upper = format!("{}\u{10FFFF}", prefix);

    let rows = sqlx::query_as::<_, StoredRoute>(
        r#"
        SELECT id, date, owner_id, items, status, cached_at
        FROM routes
        WHERE date >= ? AND date < ?
        ORDER BY date ASC, id ASC
        "#,
    )
    .bind(prefix)
    .bind(upper)
    .fetch_all(pool)
    .await?;

    decode_rows(rows)
}

/// Routes assigned to a worker.
pub async fn get_routes_by_owner(
    pool: &Pool,
    owner_id: &str,
) -> Result<Vec<CachedRoute>, StoreError> {
    let rows = sqlx::query_as::<_, StoredRoute>(
        r#"
        SELECT id, date, owner_id, items, status, cached_at
        FROM routes
        WHERE owner_id = ?
        ORDER BY date ASC, id ASC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    decode_rows(rows)
}

/// Every cached route.
pub async fn get_all_routes(pool: &Pool) -> Result<Vec<CachedRoute>, StoreError> {
    let rows = sqlx::query_as::<_, StoredRoute>(
        "SELECT id, date, owner_id, items, status, cached_at FROM routes ORDER BY date ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    decode_rows(rows)
}

/// Patch one item of a cached route in place.
///
/// Returns `false` when the route is not cached or the item is not in it.
pub async fn patch_route_item(
    pool: &Pool,
    patch: &RoutePatch,
    at: Timestamp,
) -> Result<bool, StoreError> {
    let Some(mut route) = get_route(pool, &patch.route_id).await? else {
        return Ok(false);
    };

    if !route.apply_patch(patch, at) {
        return Ok(false);
    }

    upsert_route(pool, &route).await?;
    Ok(true)
}

fn decode_rows(rows: Vec<StoredRoute>) -> Result<Vec<CachedRoute>, StoreError> {
    rows.iter().map(StoredRoute::to_cached_route).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    fn route(id: &str, date: &str, owner: &str) -> CachedRoute {
        CachedRoute {
            id: id.into(),
            date: date.into(),
            owner_id: owner.into(),
            items: vec![json!({"id": "A", "status": "PENDING"})],
            status: "OPEN".into(),
            cached_at: 1,
        }
    }

    #[tokio::test]
    async fn put_twice_keeps_one_row_with_latest_content() {
        let (_dir, pool) = test_pool().await;

        let mut first = route("r-1", "2024-05-10", "emp-1");
        put_route(&pool, &first).await;

        first.items = vec![json!({"id": "B"}), json!({"id": "C"})];
        first.cached_at = 2;
        put_route(&pool, &first).await;

        let all = get_all_routes(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].items.len(), 2);
        assert_eq!(all[0].items[0]["id"], "B");
        assert_eq!(all[0].cached_at, 2);
    }

    #[tokio::test]
    async fn date_prefix_lookup() {
        let (_dir, pool) = test_pool().await;
        put_route(&pool, &route("r-1", "2024-05-10", "emp-1")).await;
        put_route(&pool, &route("r-2", "2024-05-10T08:00:00Z", "emp-2")).await;
        put_route(&pool, &route("r-3", "2024-05-11", "emp-1")).await;

        let hits = get_routes_by_date_prefix(&pool, "2024-05-10").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-2"]);

        assert!(get_routes_by_date_prefix(&pool, "10/05/2024")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn owner_lookup_and_missing_route() {
        let (_dir, pool) = test_pool().await;
        put_route(&pool, &route("r-1", "2024-05-10", "emp-1")).await;
        put_route(&pool, &route("r-2", "2024-05-11", "emp-2")).await;

        let mine = get_routes_by_owner(&pool, "emp-1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "r-1");

        assert!(get_route(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn patch_item_in_place() {
        let (_dir, pool) = test_pool().await;
        put_route(&pool, &route("r-1", "2024-05-10", "emp-1")).await;

        let patch = RoutePatch::set_fields("r-1", "A", [("status", json!("COMPLETED"))]);
        assert!(patch_route_item(&pool, &patch, 50).await.unwrap());

        let cached = get_route(&pool, "r-1").await.unwrap().unwrap();
        assert_eq!(cached.items[0]["status"], "COMPLETED");
        assert_eq!(cached.cached_at, 50);

        let elsewhere = RoutePatch::set_fields("r-9", "A", [("status", json!("X"))]);
        assert!(!patch_route_item(&pool, &elsewhere, 60).await.unwrap());
    }
}
