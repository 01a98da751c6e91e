//! Database operations for the pending action queue.

use super::{Pool, StoreError};
use fieldsync_engine::{
    ActionId, ActionKind, ActionPayload, ActionState, HttpMethod, NewAction, PendingAction,
    Timestamp,
};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite};

const ACTION_COLUMNS: &str = "id, client_ref, kind, endpoint, method, payload, created_at, \
                              state, last_error, retry_count";

/// A stored action row from the database.
#[derive(Debug)]
pub struct StoredAction {
    pub id: i64,
    pub client_ref: String,
    pub kind: String,
    pub endpoint: String,
    pub method: String,
    pub payload: String,
    pub created_at: i64,
    pub state: String,
    pub last_error: Option<String>,
    pub retry_count: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredAction {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredAction {
            id: row.try_get("id")?,
            client_ref: row.try_get("client_ref")?,
            kind: row.try_get("kind")?,
            endpoint: row.try_get("endpoint")?,
            method: row.try_get("method")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            state: row.try_get("state")?,
            last_error: row.try_get("last_error")?,
            retry_count: row.try_get("retry_count")?,
        })
    }
}

impl StoredAction {
    /// Convert database row to an engine action.
    pub fn to_pending_action(&self) -> Result<PendingAction, fieldsync_engine::Error> {
        let kind: ActionKind = self.kind.parse()?;
        Ok(PendingAction {
            id: self.id,
            client_ref: self.client_ref.clone(),
            kind,
            endpoint: self.endpoint.clone(),
            method: self.method.parse::<HttpMethod>()?,
            payload: ActionPayload::from_stored(kind, &self.payload)?,
            created_at: self.created_at,
            state: self.state.parse::<ActionState>()?,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count.max(0) as u32,
        })
    }
}

/// A queued row whose kind, method, state or payload no longer decodes.
///
/// Such rows are moved to ERROR so they surface in listings and can be
/// discarded by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndecodableAction {
    pub id: ActionId,
    pub kind: String,
    pub endpoint: String,
    pub created_at: Timestamp,
    pub state: String,
    pub last_error: Option<String>,
}

/// One row of a queue listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Action(PendingAction),
    Undecodable(UndecodableAction),
}

/// Partial update of a queued action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionUpdate {
    pub state: Option<ActionState>,
    /// `Some(None)` clears the stored error
    pub last_error: Option<Option<String>>,
    /// Add one to `retry_count`
    pub bump_retry: bool,
}

impl ActionUpdate {
    /// Move to `state`, leaving everything else alone.
    pub fn state(state: ActionState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Record a failed attempt.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(ActionState::Error),
            last_error: Some(Some(message.into())),
            bump_retry: true,
        }
    }

    fn is_empty(&self) -> bool {
        self.state.is_none() && self.last_error.is_none() && !self.bump_retry
    }
}

/// Append an action to the queue as PENDING with no retries.
///
/// Returns the assigned id.
pub async fn enqueue_action(
    pool: &Pool,
    action: &NewAction,
    client_ref: &str,
    created_at: Timestamp,
) -> Result<ActionId, StoreError> {
    let payload = serde_json::to_string(&action.payload).map_err(|source| StoreError::Encode {
        what: "action payload",
        source,
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO pending_actions (
            client_ref, kind, endpoint, method, payload, created_at, state, retry_count
        )
        VALUES (?, ?, ?, ?, ?, ?, 'PENDING', 0)
        "#,
    )
    .bind(client_ref)
    .bind(action.kind().as_str())
    .bind(&action.endpoint)
    .bind(action.method.as_str())
    .bind(payload)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Get a queued action by id.
pub async fn get_action(pool: &Pool, id: ActionId) -> Result<Option<PendingAction>, StoreError> {
    let stored = sqlx::query_as::<_, StoredAction>(&format!(
        "SELECT {} FROM pending_actions WHERE id = ?",
        ACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    stored
        .map(|s| {
            s.to_pending_action().map_err(|e| StoreError::Corrupt {
                id: s.id.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Apply a partial update to an action.
///
/// Returns `false` when no row has that id.
pub async fn update_action(
    pool: &Pool,
    id: ActionId,
    update: &ActionUpdate,
) -> Result<bool, StoreError> {
    if update.is_empty() {
        return Ok(true);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE pending_actions SET ");
    let mut set = qb.separated(", ");
    if let Some(state) = update.state {
        set.push("state = ").push_bind_unseparated(state.as_str());
    }
    if let Some(last_error) = &update.last_error {
        set.push("last_error = ").push_bind_unseparated(last_error.clone());
    }
    if update.bump_retry {
        set.push("retry_count = retry_count + 1");
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Delete an action. Returns `false` if it was already gone.
pub async fn delete_action(pool: &Pool, id: ActionId) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM pending_actions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List actions in any of `states`, oldest first.
///
/// Rows that no longer decode are left out and moved to ERROR.
pub async fn list_actions_by_state(
    pool: &Pool,
    states: &[ActionState],
) -> Result<Vec<PendingAction>, StoreError> {
    let entries = list_queue_entries(pool, states).await?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            QueueEntry::Action(action) => Some(action),
            QueueEntry::Undecodable(_) => None,
        })
        .collect())
}

/// List every row in any of `states`, oldest first, undecodable ones included.
pub async fn list_queue_entries(
    pool: &Pool,
    states: &[ActionState],
) -> Result<Vec<QueueEntry>, StoreError> {
    if states.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM pending_actions WHERE state IN (",
        ACTION_COLUMNS
    ));
    let mut list = qb.separated(", ");
    for state in states {
        list.push_bind(state.as_str());
    }
    qb.push(") ORDER BY created_at ASC, id ASC");

    let rows = qb.build_query_as::<StoredAction>().fetch_all(pool).await?;
    decode_rows(pool, rows).await
}

/// List actions of one kind, oldest first.
pub async fn list_actions_by_kind(
    pool: &Pool,
    kind: ActionKind,
) -> Result<Vec<PendingAction>, StoreError> {
    let rows = sqlx::query_as::<_, StoredAction>(&format!(
        "SELECT {} FROM pending_actions WHERE kind = ? ORDER BY created_at ASC, id ASC",
        ACTION_COLUMNS
    ))
    .bind(kind.as_str())
    .fetch_all(pool)
    .await?;

    Ok(decode_rows(pool, rows)
        .await?
        .into_iter()
        .filter_map(|entry| match entry {
            QueueEntry::Action(action) => Some(action),
            QueueEntry::Undecodable(_) => None,
        })
        .collect())
}

/// Count actions in any of `states`.
pub async fn count_actions_by_state(
    pool: &Pool,
    states: &[ActionState],
) -> Result<i64, StoreError> {
    if states.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM pending_actions WHERE state IN (");
    let mut list = qb.separated(", ");
    for state in states {
        list.push_bind(state.as_str());
    }
    qb.push(")");

    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

/// Put actions stranded in SYNCING by an interrupted drain back to PENDING.
pub async fn reset_interrupted(pool: &Pool) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE pending_actions SET state = 'PENDING' WHERE state = 'SYNCING'")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

async fn decode_rows(pool: &Pool, rows: Vec<StoredAction>) -> Result<Vec<QueueEntry>, StoreError> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        match row.to_pending_action() {
            Ok(action) => entries.push(QueueEntry::Action(action)),
            Err(e) => entries.push(QueueEntry::Undecodable(quarantine(pool, row, e).await?)),
        }
    }
    Ok(entries)
}

async fn quarantine(
    pool: &Pool,
    row: StoredAction,
    error: fieldsync_engine::Error,
) -> Result<UndecodableAction, StoreError> {
    let reason = format!("undecodable: {}", error);
    let error_state = ActionState::Error.as_str();

    if row.state != error_state || row.last_error.as_deref() != Some(reason.as_str()) {
        tracing::warn!(action_id = row.id, error = %error, "Queued action no longer decodes; moving to ERROR");
        sqlx::query("UPDATE pending_actions SET state = ?, last_error = ? WHERE id = ?")
            .bind(error_state)
            .bind(&reason)
            .bind(row.id)
            .execute(pool)
            .await?;
    }

    Ok(UndecodableAction {
        id: row.id,
        kind: row.kind,
        endpoint: row.endpoint,
        created_at: row.created_at,
        state: error_state.to_string(),
        last_error: Some(reason),
    })
}
