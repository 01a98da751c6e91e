//! Read-through route cache.
//!
//! Online, every fetch writes through to the store. When the remote cannot be
//! reached (or answers with an error) the stored copy is served instead.

use std::sync::Arc;

use fieldsync_engine::outcome::UNAUTHORIZED;
use fieldsync_engine::{select_routes_for_date, CachedRoute};
use serde::Serialize;

use crate::connectivity::Connectivity;
use crate::db::{self, Pool, StoreError};
use crate::now_millis;
use crate::remote::{ApiClient, ApiError};

/// Data plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched<T> {
    pub data: T,
    pub from_cache: bool,
}

impl<T> Fetched<T> {
    fn remote(data: T) -> Self {
        Self {
            data,
            from_cache: false,
        }
    }

    fn cached(data: T) -> Self {
        Self {
            data,
            from_cache: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteCache {
    pool: Pool,
    client: ApiClient,
    connectivity: Arc<Connectivity>,
}

impl RouteCache {
    pub fn new(pool: Pool, client: ApiClient, connectivity: Arc<Connectivity>) -> Self {
        Self {
            pool,
            client,
            connectivity,
        }
    }

    /// One route, fresh if possible.
    pub async fn route(&self, id: &str) -> Result<Option<Fetched<CachedRoute>>, StoreError> {
        if self.connectivity.is_online() {
            match self.client.fetch_route(id).await {
                Ok(doc) => {
                    let route = CachedRoute::from_document(doc, now_millis());
                    db::put_route(&self.pool, &route).await;
                    return Ok(Some(Fetched::remote(route)));
                }
                Err(e) => self.fetch_failed(&e),
            }
        }

        Ok(db::get_route(&self.pool, id).await?.map(Fetched::cached))
    }

    /// Routes for a date and/or worker, fresh if possible.
    pub async fn routes(
        &self,
        date: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Fetched<Vec<CachedRoute>>, StoreError> {
        if self.connectivity.is_online() {
            match self.client.fetch_routes(date, owner_id).await {
                Ok(docs) => {
                    let now = now_millis();
                    let mut routes = Vec::with_capacity(docs.len());
                    for doc in docs {
                        let route = CachedRoute::from_document(doc, now);
                        db::put_route(&self.pool, &route).await;
                        routes.push(route);
                    }
                    return Ok(Fetched::remote(routes));
                }
                Err(e) => self.fetch_failed(&e),
            }
        }

        let routes = self.stored_routes(date, owner_id).await?;
        Ok(Fetched::cached(routes))
    }

    async fn stored_routes(
        &self,
        date: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Vec<CachedRoute>, StoreError> {
        let routes = match (date, owner_id) {
            (Some(date), _) => {
                let hits = db::get_routes_by_date_prefix(&self.pool, date).await?;
                let all = if hits.is_empty() {
                    db::get_all_routes(&self.pool).await?
                } else {
                    Vec::new()
                };
                select_routes_for_date(hits, || all, date)
            }
            (None, Some(owner_id)) => return db::get_routes_by_owner(&self.pool, owner_id).await,
            (None, None) => return db::get_all_routes(&self.pool).await,
        };

        Ok(match owner_id {
            Some(owner_id) => routes
                .into_iter()
                .filter(|route| route.owner_id == owner_id)
                .collect(),
            None => routes,
        })
    }

    fn fetch_failed(&self, e: &ApiError) {
        if e.status() == Some(UNAUTHORIZED) {
            self.client.session().invalidate();
        }
        tracing::warn!(error = %e, "Route fetch failed; serving cached copy");
    }
}
