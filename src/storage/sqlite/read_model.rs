//! SQLite ReadModelStore implementation.

use async_trait::async_trait;
use sea_query::{Alias, ColumnDef, Expr, Index, OnConflict, Order, Query, SqliteQueryBuilder, Table};
use sea_query_binder::SqlxBinder;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::domain::{Room, ROOM_AGGREGATE_TYPE};
use crate::storage::schema::ReadModel;
use crate::storage::{ReadModelStore, Result, StorageError};

/// SQLite implementation of ReadModelStore.
///
/// One row per aggregate; the projected record is stored as a JSON body
/// alongside the columns queries filter on.
pub struct SqliteReadModel {
    pool: SqlitePool,
    table: String,
}

impl SqliteReadModel {
    pub fn new(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        let create_table = Table::create()
            .table(Alias::new(&self.table))
            .if_not_exists()
            .col(ColumnDef::new(ReadModel::Id).text().not_null().primary_key())
            .col(ColumnDef::new(ReadModel::AggregateType).text().not_null())
            .col(ColumnDef::new(ReadModel::Version).big_integer().not_null())
            .col(
                ColumnDef::new(ReadModel::Deleted)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(ColumnDef::new(ReadModel::Body).text().not_null())
            .col(ColumnDef::new(ReadModel::UpdatedAt).text().not_null())
            .to_string(SqliteQueryBuilder);
        sqlx::query(&create_table).execute(&self.pool).await?;

        let create_index = Index::create()
            .if_not_exists()
            .name(format!("idx_{}_aggregate_type", self.table))
            .table(Alias::new(&self.table))
            .col(ReadModel::AggregateType)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&create_index).execute(&self.pool).await?;

        info!(table = %self.table, "Read model schema initialized (SQLite)");
        Ok(())
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Room> {
        let body: String = row.get("body");
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ReadModelStore for SqliteReadModel {
    async fn get(&self, id: &str) -> Result<Option<Room>> {
        let (sql, values) = Query::select()
            .column(ReadModel::Body)
            .from(Alias::new(&self.table))
            .and_where(Expr::col(ReadModel::Id).eq(id))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list(&self, aggregate_type: Option<&str>) -> Result<Vec<Room>> {
        let mut select = Query::select();
        select
            .column(ReadModel::Body)
            .from(Alias::new(&self.table))
            .order_by(ReadModel::Id, Order::Asc);
        if let Some(aggregate_type) = aggregate_type {
            select.and_where(Expr::col(ReadModel::AggregateType).eq(aggregate_type));
        }
        let (sql, values) = select.build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn save(&self, room: &Room, expected_version: u64) -> Result<()> {
        let body = serde_json::to_string(room)?;
        let now = chrono::Utc::now().to_rfc3339();

        let (sql, values) = if expected_version == 0 {
            Query::insert()
                .into_table(Alias::new(&self.table))
                .columns([
                    ReadModel::Id,
                    ReadModel::AggregateType,
                    ReadModel::Version,
                    ReadModel::Deleted,
                    ReadModel::Body,
                    ReadModel::UpdatedAt,
                ])
                .values_panic([
                    room.id.as_str().into(),
                    ROOM_AGGREGATE_TYPE.into(),
                    (room.version as i64).into(),
                    room.deleted.into(),
                    body.into(),
                    now.into(),
                ])
                .on_conflict(OnConflict::column(ReadModel::Id).do_nothing().to_owned())
                .build_sqlx(SqliteQueryBuilder)
        } else {
            Query::update()
                .table(Alias::new(&self.table))
                .value(ReadModel::Version, room.version as i64)
                .value(ReadModel::Deleted, room.deleted)
                .value(ReadModel::Body, body)
                .value(ReadModel::UpdatedAt, now)
                .and_where(Expr::col(ReadModel::Id).eq(room.id.as_str()))
                .and_where(Expr::col(ReadModel::Version).eq(expected_version as i64))
                .build_sqlx(SqliteQueryBuilder)
        };

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await?;
        if result.rows_affected() != 1 {
            return Err(StorageError::Conflict {
                aggregate_id: room.id.clone(),
                expected: expected_version,
            });
        }
        Ok(())
    }
}
