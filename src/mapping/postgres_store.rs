//! PostgreSQL-backed mapping store.
//!
//! Rows live in `email_mappings` (see `migrations/`); recipient lists and meta
//! are JSONB arrays. A partial unique index over live rows enforces one mapping
//! per triple, and its violation surfaces as `StoreError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use crate::postgres::{PostgresPool, PostgresPoolError};

use super::store::{MappingStore, StoreError};
use super::types::{MappingKey, MappingRecord, NewMapping, PageRequest};

const COLUMNS: &str = "id, module, menu, task, to_recipients, cc_recipients, subject, body, \
                       is_active, meta, last_updated_by, created_at, updated_at, deleted_at";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

struct MappingRow(MappingRecord);

impl<'r> FromRow<'r, PgRow> for MappingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let to: Json<Vec<String>> = row.try_get("to_recipients")?;
        let cc: Json<Vec<String>> = row.try_get("cc_recipients")?;
        let meta: Json<Vec<String>> = row.try_get("meta")?;

        Ok(MappingRow(MappingRecord {
            id: row.try_get("id")?,
            module: row.try_get("module")?,
            menu: row.try_get("menu")?,
            task: row.try_get("task")?,
            to: to.0,
            cc: cc.0,
            subject: row.try_get("subject")?,
            body: row.try_get("body")?,
            is_active: row.try_get("is_active")?,
            meta: meta.0,
            last_updated_by: row.try_get("last_updated_by")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
        }))
    }
}

pub struct PostgresMappingStore {
    pool: PostgresPool,
}

impl PostgresMappingStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// Map a write error, turning unique index violations into conflicts
    fn write_error(err: PostgresPoolError, key: &MappingKey) -> StoreError {
        if let PostgresPoolError::Sqlx(sqlx::Error::Database(db)) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::conflict(key);
            }
        }
        StoreError::from(err)
    }

    async fn fetch_for_key(
        &self,
        key: &MappingKey,
        active_only: bool,
    ) -> Result<Option<MappingRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM email_mappings \
             WHERE module = $1 AND menu = $2 AND task = $3 AND deleted_at IS NULL \
             AND ($4 = FALSE OR is_active = TRUE) \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let key = key.clone();

        let row: Option<MappingRow> = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(&sql)
                    .bind(&key.module)
                    .bind(&key.menu)
                    .bind(&key.task)
                    .bind(active_only)
                    .fetch_optional(&pool)
                    .await
            })
            .await?;

        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl MappingStore for PostgresMappingStore {
    async fn find_active(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        self.fetch_for_key(key, true).await
    }

    async fn find_exact(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        self.fetch_for_key(key, false).await
    }

    async fn get(&self, id: i64) -> Result<Option<MappingRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM email_mappings WHERE id = $1 AND deleted_at IS NULL");

        let row: Option<MappingRow> = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(&sql).bind(id).fetch_optional(&pool).await
            })
            .await?;

        Ok(row.map(|r| r.0))
    }

    async fn list(&self, page: PageRequest) -> Result<(Vec<MappingRecord>, u64), StoreError> {
        // LIMIT NULL means no limit in PostgreSQL
        let sql = format!(
            "SELECT {COLUMNS} FROM email_mappings WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let limit = page.limit.map(i64::from);
        let offset = page.offset as i64;

        let (rows, total): (Vec<MappingRow>, i64) = self
            .pool
            .execute(|pool| async move {
                let rows: Vec<MappingRow> = sqlx::query_as(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&pool)
                    .await?;
                let (total,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM email_mappings WHERE deleted_at IS NULL")
                        .fetch_one(&pool)
                        .await?;
                Ok::<_, sqlx::Error>((rows, total))
            })
            .await?;

        Ok((rows.into_iter().map(|r| r.0).collect(), total.max(0) as u64))
    }

    async fn insert(&self, mapping: NewMapping) -> Result<MappingRecord, StoreError> {
        let key = mapping.key();
        let sql = format!(
            "INSERT INTO email_mappings \
             (module, menu, task, to_recipients, cc_recipients, subject, body, is_active, meta, last_updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );

        let row: MappingRow = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(&sql)
                    .bind(&mapping.module)
                    .bind(&mapping.menu)
                    .bind(&mapping.task)
                    .bind(Json(&mapping.to))
                    .bind(Json(&mapping.cc))
                    .bind(&mapping.subject)
                    .bind(&mapping.body)
                    .bind(mapping.is_active)
                    .bind(Json(&mapping.meta))
                    .bind(mapping.last_updated_by)
                    .fetch_one(&pool)
                    .await
            })
            .await
            .map_err(|e| Self::write_error(e, &key))?;

        tracing::debug!(mapping_id = row.0.id, key = %key, "Mapping inserted");
        Ok(row.0)
    }

    async fn update(&self, record: &MappingRecord) -> Result<MappingRecord, StoreError> {
        let key = record.key();
        let record = record.clone();
        let id = record.id;
        let sql = format!(
            "UPDATE email_mappings SET \
             module = $2, menu = $3, task = $4, to_recipients = $5, cc_recipients = $6, \
             subject = $7, body = $8, is_active = $9, meta = $10, last_updated_by = $11, \
             updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {COLUMNS}"
        );

        let row: Option<MappingRow> = self
            .pool
            .execute(|pool| async move {
                sqlx::query_as(&sql)
                    .bind(record.id)
                    .bind(&record.module)
                    .bind(&record.menu)
                    .bind(&record.task)
                    .bind(Json(&record.to))
                    .bind(Json(&record.cc))
                    .bind(&record.subject)
                    .bind(&record.body)
                    .bind(record.is_active)
                    .bind(Json(&record.meta))
                    .bind(record.last_updated_by)
                    .fetch_optional(&pool)
                    .await
            })
            .await
            .map_err(|e| Self::write_error(e, &key))?;

        row.map(|r| r.0).ok_or(StoreError::NotFound(id))
    }

    async fn soft_delete(&self, id: i64) -> Result<MappingRecord, StoreError> {
        let before = self.get(id).await?.ok_or(StoreError::NotFound(id))?;

        let affected = self
            .pool
            .execute(|pool| async move {
                sqlx::query(
                    "UPDATE email_mappings SET deleted_at = NOW(), updated_at = NOW() \
                     WHERE id = $1 AND deleted_at IS NULL",
                )
                .bind(id)
                .execute(&pool)
                .await
                .map(|result| result.rows_affected())
            })
            .await?;

        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(before)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_code() {
        assert_eq!(UNIQUE_VIOLATION, "23505");
    }

    #[test]
    fn test_circuit_open_maps_to_unavailable() {
        let key = MappingKey::new("Sales", "Leads", "Create");
        let err = PostgresMappingStore::write_error(PostgresPoolError::CircuitOpen, &key);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_row_not_found_is_not_a_conflict() {
        let key = MappingKey::new("Sales", "Leads", "Create");
        let err = PostgresMappingStore::write_error(
            PostgresPoolError::Sqlx(sqlx::Error::RowNotFound),
            &key,
        );
        assert!(matches!(err, StoreError::Postgres(_)));
    }
}
