//! SQLite EventLog and ChangeFeed implementation.

use async_trait::async_trait;
use sea_query::{
    Alias, ColumnDef, Expr, Index, OnConflict, Order, Query, SqliteQueryBuilder, Table,
};
use sea_query_binder::SqlxBinder;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::config::ResourceNames;
use crate::domain::{EventRecord, RoomEvent, ROOM_AGGREGATE_TYPE};
use crate::storage::schema::{Aggregates, Events, Stream, KIND_EVENT, KIND_VERSION};
use crate::storage::{
    ChangeFeed, ChangeNotification, ChangeRecord, EventLog, Result, StorageError,
};

/// SQLite implementation of EventLog.
///
/// The version record table, the event table and a `<events>_stream` table
/// are written in one `BEGIN IMMEDIATE` transaction per append. The stream
/// table is the change feed.
pub struct SqliteEventLog {
    pool: SqlitePool,
    aggregates_table: String,
    events_table: String,
    stream_table: String,
}

impl SqliteEventLog {
    /// Create a new SQLite event log over the configured tables.
    pub fn new(pool: SqlitePool, names: &ResourceNames) -> Self {
        Self {
            pool,
            aggregates_table: names.aggregates_table.clone(),
            events_table: names.events_table.clone(),
            stream_table: format!("{}_stream", names.events_table),
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        let aggregates = Table::create()
            .table(Alias::new(&self.aggregates_table))
            .if_not_exists()
            .col(
                ColumnDef::new(Aggregates::AggregateId)
                    .text()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(Aggregates::AggregateType).text().not_null())
            .col(ColumnDef::new(Aggregates::Version).big_integer().not_null())
            .col(ColumnDef::new(Aggregates::UpdatedAt).text().not_null())
            .to_string(SqliteQueryBuilder);
        sqlx::query(&aggregates).execute(&self.pool).await?;

        let events = Table::create()
            .table(Alias::new(&self.events_table))
            .if_not_exists()
            .col(ColumnDef::new(Events::AggregateId).text().not_null())
            .col(ColumnDef::new(Events::Version).big_integer().not_null())
            .col(ColumnDef::new(Events::Data).text().not_null())
            .col(ColumnDef::new(Events::CreatedAt).text().not_null())
            .primary_key(
                Index::create()
                    .col(Events::AggregateId)
                    .col(Events::Version),
            )
            .to_string(SqliteQueryBuilder);
        sqlx::query(&events).execute(&self.pool).await?;

        let stream = Table::create()
            .table(Alias::new(&self.stream_table))
            .if_not_exists()
            .col(
                ColumnDef::new(Stream::Seq)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Stream::RecordKind).text().not_null())
            .col(ColumnDef::new(Stream::AggregateId).text().not_null())
            .col(ColumnDef::new(Stream::Version).big_integer().not_null())
            .col(ColumnDef::new(Stream::Data).text().null())
            .to_string(SqliteQueryBuilder);
        sqlx::query(&stream).execute(&self.pool).await?;

        info!(
            aggregates = %self.aggregates_table,
            events = %self.events_table,
            "Event log schema initialized (SQLite)"
        );
        Ok(())
    }

    /// Compare-and-set the version record, then write the event and its
    /// stream rows. Must run inside an open transaction.
    async fn append_in_tx(
        &self,
        conn: &mut SqliteConnection,
        aggregate_id: &str,
        expected_version: u64,
        data: &str,
    ) -> Result<u64> {
        let version = expected_version + 1;
        let now = chrono::Utc::now().to_rfc3339();

        let (sql, values) = if expected_version == 0 {
            Query::insert()
                .into_table(Alias::new(&self.aggregates_table))
                .columns([
                    Aggregates::AggregateId,
                    Aggregates::AggregateType,
                    Aggregates::Version,
                    Aggregates::UpdatedAt,
                ])
                .values_panic([
                    aggregate_id.into(),
                    ROOM_AGGREGATE_TYPE.into(),
                    (version as i64).into(),
                    now.clone().into(),
                ])
                .on_conflict(
                    OnConflict::column(Aggregates::AggregateId)
                        .do_nothing()
                        .to_owned(),
                )
                .build_sqlx(SqliteQueryBuilder)
        } else {
            Query::update()
                .table(Alias::new(&self.aggregates_table))
                .value(Aggregates::Version, version as i64)
                .value(Aggregates::UpdatedAt, now.clone())
                .and_where(Expr::col(Aggregates::AggregateId).eq(aggregate_id))
                .and_where(Expr::col(Aggregates::Version).eq(expected_version as i64))
                .build_sqlx(SqliteQueryBuilder)
        };

        let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;
        if result.rows_affected() != 1 {
            return Err(StorageError::Conflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
            });
        }

        let (sql, values) = Query::insert()
            .into_table(Alias::new(&self.events_table))
            .columns([
                Events::AggregateId,
                Events::Version,
                Events::Data,
                Events::CreatedAt,
            ])
            .values_panic([
                aggregate_id.into(),
                (version as i64).into(),
                data.into(),
                now.into(),
            ])
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *conn).await?;

        let (sql, values) = Query::insert()
            .into_table(Alias::new(&self.stream_table))
            .columns([
                Stream::RecordKind,
                Stream::AggregateId,
                Stream::Version,
                Stream::Data,
            ])
            .values_panic([
                KIND_VERSION.into(),
                aggregate_id.into(),
                (version as i64).into(),
                Option::<String>::None.into(),
            ])
            .values_panic([
                KIND_EVENT.into(),
                aggregate_id.into(),
                (version as i64).into(),
                data.into(),
            ])
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *conn).await?;

        Ok(version)
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn load_version(&self, aggregate_id: &str) -> Result<Option<u64>> {
        let (sql, values) = Query::select()
            .column(Aggregates::Version)
            .from(Alias::new(&self.aggregates_table))
            .and_where(Expr::col(Aggregates::AggregateId).eq(aggregate_id))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<i64, _>("version") as u64))
    }

    async fn try_append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        event: &RoomEvent,
    ) -> Result<u64> {
        let data = event.to_data()?;

        // BEGIN IMMEDIATE takes the write lock upfront so two appenders cannot
        // both read the same version before either writes.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = self
            .append_in_tx(&mut conn, aggregate_id, expected_version, &data)
            .await;

        match result {
            Ok(version) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                debug!(aggregate_id, version, "Event appended");
                Ok(version)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn read_events(&self, aggregate_id: &str) -> Result<Vec<EventRecord>> {
        let (sql, values) = Query::select()
            .columns([Events::Version, Events::Data])
            .from(Alias::new(&self.events_table))
            .and_where(Expr::col(Events::AggregateId).eq(aggregate_id))
            .order_by(Events::Version, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                EventRecord::new(
                    aggregate_id,
                    row.get::<i64, _>("version") as u64,
                    row.get::<String, _>("data"),
                )
            })
            .collect())
    }
}

#[async_trait]
impl ChangeFeed for SqliteEventLog {
    async fn poll(&self, limit: usize) -> Result<Vec<ChangeNotification>> {
        let (sql, values) = Query::select()
            .columns([
                Stream::Seq,
                Stream::RecordKind,
                Stream::AggregateId,
                Stream::Version,
                Stream::Data,
            ])
            .from(Alias::new(&self.stream_table))
            .order_by(Stream::Seq, Order::Asc)
            .limit(limit as u64)
            .build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            let sequence = row.get::<i64, _>("seq") as u64;
            let kind: String = row.get("record_kind");
            let aggregate_id: String = row.get("aggregate_id");
            let version = row.get::<i64, _>("version") as u64;

            let change = match (kind.as_str(), row.get::<Option<String>, _>("data")) {
                (KIND_EVENT, Some(data)) => {
                    ChangeRecord::Event(EventRecord::new(aggregate_id, version, data))
                }
                _ => ChangeRecord::AggregateVersion {
                    aggregate_id,
                    version,
                },
            };
            changes.push(ChangeNotification { sequence, change });
        }

        Ok(changes)
    }

    async fn ack(&self, sequence: u64) -> Result<()> {
        let (sql, values) = Query::delete()
            .from_table(Alias::new(&self.stream_table))
            .and_where(Expr::col(Stream::Seq).eq(sequence as i64))
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.pool).await?;
        Ok(())
    }
}
