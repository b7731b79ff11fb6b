use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{
    ActivityFilter, ActivityPatch, ActivityQuery, ActivityStore, SortDirection, StoreError,
};
use crate::config::DatabaseConfig;
use crate::workflow::{Activity, ActivityKind, ActivityStatus, Parameters, Workflow, WorkflowLog};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        "order" INTEGER NOT NULL,
        parameters TEXT NOT NULL DEFAULT '{}',
        started_at TEXT,
        ended_at TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_activities_status_order
    ON activities (status, "order")
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_activities_workflow_order
    ON activities (workflow_id, "order")
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS workflow_logs (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        activity_id TEXT,
        status TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )
    "#,
];

const ACTIVITY_COLUMNS: &str = r#"
    SELECT id, workflow_id, kind, status, "order", parameters, started_at, ended_at
    FROM activities
    WHERE 1 = 1"#;

/// SQLite-backed activity store
pub struct SqliteActivityStore {
    pool: SqlitePool,
}

impl SqliteActivityStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Backend(format!("{}: {e}", parent.display())))?;
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!(url = %config.url, "Activity store ready");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Decode(format!("id '{raw}': {e}")))
}

fn activity_from_row(row: &SqliteRow) -> Result<Activity, StoreError> {
    let id: String = row.try_get("id")?;
    let workflow_id: String = row.try_get("workflow_id")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let order: i32 = row.try_get("order")?;
    let parameters: String = row.try_get("parameters")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;

    Ok(Activity {
        id: parse_uuid(&id)?,
        workflow_id: parse_uuid(&workflow_id)?,
        kind: ActivityKind::parse(&kind),
        status: ActivityStatus::from_str(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        order,
        parameters: serde_json::from_str::<Parameters>(&parameters)?,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

// `kind` is matched in Rust after the fetch so that alias spellings written
// by other tools still match.
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ActivityFilter) {
    if let Some(id) = filter.id {
        builder.push(" AND id = ").push_bind(id.to_string());
    }
    if let Some(workflow_id) = filter.workflow_id {
        builder
            .push(" AND workflow_id = ")
            .push_bind(workflow_id.to_string());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(order) = filter.order {
        builder.push(r#" AND "order" = "#).push_bind(order);
    }
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.status)
        .bind(timestamp(workflow.created_at))
        .bind(timestamp(workflow.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, status, created_at, updated_at
            FROM workflows
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Workflow, StoreError> {
                let id: String = row.try_get("id")?;
                let created_at: String = row.try_get("created_at")?;
                let updated_at: String = row.try_get("updated_at")?;
                Ok(Workflow {
                    id: parse_uuid(&id)?,
                    name: row.try_get("name")?,
                    status: row.try_get("status")?,
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    async fn insert(&self, activity: &Activity) -> Result<(), StoreError> {
        if self.get(activity.id).await?.is_some() {
            return Err(StoreError::Duplicate(activity.id));
        }
        sqlx::query(
            r#"
            INSERT INTO activities
                (id, workflow_id, kind, status, "order", parameters, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(activity.id.to_string())
        .bind(activity.workflow_id.to_string())
        .bind(activity.kind.wire_name())
        .bind(activity.status.as_str())
        .bind(activity.order)
        .bind(serde_json::to_string(&activity.parameters)?)
        .bind(activity.started_at.map(timestamp))
        .bind(activity.ended_at.map(timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Activity>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(ACTIVITY_COLUMNS);
        push_filter(&mut builder, &ActivityFilter::by_id(id));
        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(activity_from_row).transpose()
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(ACTIVITY_COLUMNS);
        push_filter(&mut builder, &query.filter);
        match query.order_by {
            Some(SortDirection::Ascending) => builder.push(r#" ORDER BY "order" ASC, rowid ASC"#),
            Some(SortDirection::Descending) => builder.push(r#" ORDER BY "order" DESC, rowid ASC"#),
            None => builder.push(" ORDER BY rowid ASC"),
        };
        if query.filter.kind.is_none() {
            if let Some(limit) = query.limit {
                builder.push(" LIMIT ").push_bind(limit as i64);
            }
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut activities = rows
            .iter()
            .map(activity_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if query.filter.kind.is_some() {
            activities.retain(|a| query.filter.matches(a));
            if let Some(limit) = query.limit {
                activities.truncate(limit);
            }
        }
        Ok(activities)
    }

    async fn update_where(
        &self,
        filter: &ActivityFilter,
        patch: &ActivityPatch,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut select = QueryBuilder::<Sqlite>::new(ACTIVITY_COLUMNS);
        push_filter(&mut select, filter);
        let rows = select.build().fetch_all(&mut *tx).await?;

        let mut touched = 0;
        for row in &rows {
            let mut activity = activity_from_row(row)?;
            if !filter.matches(&activity) {
                continue;
            }
            patch.apply(&mut activity);

            let mut update = QueryBuilder::<Sqlite>::new("UPDATE activities SET status = ");
            update
                .push_bind(activity.status.as_str())
                .push(", started_at = ")
                .push_bind(activity.started_at.map(timestamp))
                .push(", ended_at = ")
                .push_bind(activity.ended_at.map(timestamp))
                .push(", parameters = ")
                .push_bind(serde_json::to_string(&activity.parameters)?)
                .push(" WHERE id = ")
                .push_bind(activity.id.to_string());
            touched += update.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(touched)
    }

    async fn replace(&self, activity: &Activity) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE activities
            SET workflow_id = ?2, kind = ?3, status = ?4, "order" = ?5,
                parameters = ?6, started_at = ?7, ended_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(activity.id.to_string())
        .bind(activity.workflow_id.to_string())
        .bind(activity.kind.wire_name())
        .bind(activity.status.as_str())
        .bind(activity.order)
        .bind(serde_json::to_string(&activity.parameters)?)
        .bind(activity.started_at.map(timestamp))
        .bind(activity.ended_at.map(timestamp))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(activity.id));
        }
        Ok(())
    }

    async fn append_log(&self, entry: &WorkflowLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_logs (id, workflow_id, activity_id, status, message, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.workflow_id.to_string())
        .bind(entry.activity_id.map(|id| id.to_string()))
        .bind(&entry.status)
        .bind(&entry.message)
        .bind(timestamp(entry.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn logs(&self, workflow_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, activity_id, status, message, timestamp
            FROM workflow_logs
            WHERE workflow_id = ?1
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<WorkflowLog, StoreError> {
                let id: String = row.try_get("id")?;
                let workflow_id: String = row.try_get("workflow_id")?;
                let activity_id: Option<String> = row.try_get("activity_id")?;
                let at: String = row.try_get("timestamp")?;
                Ok(WorkflowLog {
                    id: parse_uuid(&id)?,
                    workflow_id: parse_uuid(&workflow_id)?,
                    activity_id: activity_id.as_deref().map(parse_uuid).transpose()?,
                    status: row.try_get("status")?,
                    message: row.try_get("message")?,
                    timestamp: parse_timestamp(&at)?,
                })
            })
            .collect()
    }
}
