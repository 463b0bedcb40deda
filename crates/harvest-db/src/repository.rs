use chrono::{DateTime, Utc};
use harvest_core::error::AppError;
use harvest_core::models::{CollectionTarget, Payload};
use harvest_core::traits::RecordSink;
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// A document as stored, with its generated id and insertion time.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub target: CollectionTarget,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only document store in PostgreSQL.
///
/// Every `(store, collection)` pair maps onto rows of the single `records`
/// table; repeated inserts of the same document are kept as duplicates.
#[derive(Clone)]
pub struct RecordRepository {
    pool: Pool<Postgres>,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert documents in order inside one transaction. Returns the number written.
    pub async fn insert_documents(
        &self,
        target: &CollectionTarget,
        documents: &[serde_json::Value],
    ) -> Result<u64, AppError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for document in documents {
            sqlx::query(
                r#"
                INSERT INTO records (store_name, collection_name, document)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&target.store)
            .bind(&target.collection)
            .bind(document)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        tracing::debug!(%target, count = documents.len(), "Committed documents");

        Ok(documents.len() as u64)
    }

    /// Count the documents stored in a collection.
    pub async fn count(&self, target: &CollectionTarget) -> Result<u64, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM records
            WHERE store_name = $1 AND collection_name = $2
            "#,
        )
        .bind(&target.store)
        .bind(&target.collection)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.0.max(0) as u64)
    }

    /// Most recently inserted documents in a collection, newest first.
    pub async fn list_recent(
        &self,
        target: &CollectionTarget,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, AppError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, store_name, collection_name, document, created_at
            FROM records
            WHERE store_name = $1 AND collection_name = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(&target.store)
        .bind(&target.collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every collection that holds at least one document, with its size.
    pub async fn collections(&self) -> Result<Vec<(CollectionTarget, u64)>, AppError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT store_name, collection_name, COUNT(*)
            FROM records
            GROUP BY store_name, collection_name
            ORDER BY store_name, collection_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|(store, collection, count)| {
                (CollectionTarget::new(store, collection), count.max(0) as u64)
            })
            .collect())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::PersistenceError(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    store_name: String,
    collection_name: String,
    document: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<RecordRow> for StoredDocument {
    fn from(row: RecordRow) -> Self {
        StoredDocument {
            id: row.id,
            target: CollectionTarget::new(row.store_name, row.collection_name),
            document: row.document,
            created_at: row.created_at,
        }
    }
}

// -- Trait implementation --

impl RecordSink for RecordRepository {
    async fn insert(&self, target: &CollectionTarget, payload: Payload) -> Result<u64, AppError> {
        if payload.is_null() {
            return Err(AppError::PersistenceError(format!(
                "Cannot insert a null document into {target}"
            )));
        }
        let documents = payload.into_documents();
        self.insert_documents(target, &documents).await
    }
}
