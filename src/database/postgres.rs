//! PostgreSQL document store: one table per collection,
//! `("id" TEXT PRIMARY KEY, "doc" JSONB NOT NULL)`, plus a partial unique
//! index per unique field covering the visible documents.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use tracing::debug;

use crate::database::store::{document_id, Document, DocumentStore, Session, StoreError, UpdateOptions};
use crate::filter::filter::VISIBLE_SQL;
use crate::filter::{FieldPath, Filter, SqlParam};

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_document(value: Value) -> Result<Document, StoreError> {
    Ok(serde_json::from_value(value)?)
}

fn create_table_sql(collection: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS \"{}\" (\"id\" TEXT PRIMARY KEY, \"doc\" JSONB NOT NULL)", collection)
}

fn unique_index_name(collection: &str, field: &str) -> String {
    format!("{}_{}_unique", collection, field)
}

fn unique_index_sql(collection: &str, field: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ((\"doc\" ->> '{}')) WHERE {}",
        unique_index_name(collection, field),
        collection,
        field,
        VISIBLE_SQL
    )
}

fn insert_sql(collection: &str) -> String {
    format!("INSERT INTO \"{}\" (\"id\", \"doc\") VALUES ($1, $2) RETURNING \"id\"", collection)
}

fn find_by_id_sql(collection: &str, include_deleted: bool) -> String {
    let mut sql = format!("SELECT \"doc\" FROM \"{}\" WHERE \"id\" = $1", collection);
    if !include_deleted {
        sql.push_str(" AND ");
        sql.push_str(VISIBLE_SQL);
    }
    sql
}

/// `$1` id, `$2` fields merged over the stored document
fn update_sql(collection: &str, include_deleted: bool) -> String {
    let mut sql = format!("UPDATE \"{}\" SET \"doc\" = \"doc\" || $2 WHERE \"id\" = $1", collection);
    if !include_deleted {
        sql.push_str(" AND ");
        sql.push_str(VISIBLE_SQL);
    }
    sql.push_str(" RETURNING \"doc\"");
    sql
}

/// `$1` id, `$2` fields merged on conflict, `$3` full document to insert
fn upsert_sql(collection: &str) -> String {
    format!(
        "INSERT INTO \"{c}\" AS t (\"id\", \"doc\") VALUES ($1, $3) \
         ON CONFLICT (\"id\") DO UPDATE SET \"doc\" = t.\"doc\" || $2 RETURNING \"doc\"",
        c = collection
    )
}

/// Unique violations name their index; the primary key means a duplicate id
fn map_write_error(err: sqlx::Error, collection: &str, id: &str) -> StoreError {
    let unique_field = match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => Some(
            db.constraint()
                .and_then(|name| name.strip_prefix(collection)?.strip_prefix('_')?.strip_suffix("_unique"))
                .map(str::to_string),
        ),
        _ => None,
    };
    match unique_field {
        Some(Some(field)) => StoreError::UniqueViolation { collection: collection.to_string(), field },
        Some(None) => StoreError::DuplicateId { collection: collection.to_string(), id: id.to_string() },
        None => StoreError::Sqlx(err),
    }
}

fn bind_params<'q, O>(
    mut q: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for p in params {
        q = match p {
            SqlParam::Json(v) => q.bind(v.clone()),
            SqlParam::Text(s) => q.bind(s.clone()),
        };
    }
    q
}

/// Run a scalar query on the session's transaction when one is given,
/// otherwise on the pool.
macro_rules! fetch_on {
    ($self:ident, $session:expr, $query:expr, $method:ident) => {
        match $session {
            None => $query.$method(&$self.pool).await,
            Some(Session::Postgres(tx)) => $query.$method(&mut **tx).await,
            Some(Session::Memory(_)) => return Err(StoreError::SessionMismatch),
        }
    };
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_collection(&self, collection: &str, unique_fields: &[String]) -> Result<(), StoreError> {
        Filter::validate_collection_name(collection)?;
        sqlx::query(&create_table_sql(collection)).execute(&self.pool).await?;
        for field in unique_fields {
            FieldPath::parse(field)?;
            sqlx::query(&unique_index_sql(collection, field)).execute(&self.pool).await?;
        }
        debug!("Ensured collection table: {}", collection);
        Ok(())
    }

    async fn insert_one(
        &self,
        collection: &str,
        doc: Document,
        session: Option<&mut Session>,
    ) -> Result<(), StoreError> {
        Filter::validate_collection_name(collection)?;
        let id = document_id(&doc)?.to_string();
        let sql = insert_sql(collection);
        let query = sqlx::query_scalar::<_, String>(&sql).bind(id.clone()).bind(Value::Object(doc));

        fetch_on!(self, session, query, fetch_one).map_err(|e| map_write_error(e, collection, &id))?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        include_deleted: bool,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError> {
        Filter::validate_collection_name(collection)?;
        let sql = find_by_id_sql(collection, include_deleted);
        let query = sqlx::query_scalar::<_, Value>(&sql).bind(id.to_string());

        fetch_on!(self, session, query, fetch_optional)?.map(into_document).transpose()
    }

    async fn find_many(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let sql_result = filter.to_sql();
        let query = bind_params(sqlx::query_scalar::<_, Value>(&sql_result.query), &sql_result.params);
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(into_document).collect()
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let sql_result = filter.to_count_sql();
        let query = bind_params(sqlx::query_scalar::<_, i64>(&sql_result.query), &sql_result.params);
        let count = query.fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        set: Document,
        options: UpdateOptions,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError> {
        Filter::validate_collection_name(collection)?;

        let result = if options.upsert {
            let mut inserted = Document::new();
            inserted.insert("id".to_string(), id.into());
            inserted.extend(options.set_on_insert);
            inserted.extend(set.clone());

            let sql = upsert_sql(collection);
            let query = sqlx::query_scalar::<_, Value>(&sql)
                .bind(id.to_string())
                .bind(Value::Object(set))
                .bind(Value::Object(inserted));
            fetch_on!(self, session, query, fetch_optional)
        } else {
            let sql = update_sql(collection, options.include_deleted);
            let query = sqlx::query_scalar::<_, Value>(&sql).bind(id.to_string()).bind(Value::Object(set));
            fetch_on!(self, session, query, fetch_optional)
        };
        let row = result.map_err(|e| map_write_error(e, collection, id))?;

        row.map(into_document).transpose()
    }

    async fn begin(&self) -> Result<Session, StoreError> {
        Ok(Session::Postgres(self.pool.begin().await?))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
