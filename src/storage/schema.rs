//! Database schema definitions using sea-query.
//!
//! Table names come from configuration; these define the column
//! identifiers for type-safe query building.

use sea_query::Iden;

/// Aggregate Version Record table.
#[derive(Iden)]
pub enum Aggregates {
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "version"]
    Version,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Event Record table.
#[derive(Iden)]
pub enum Events {
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "version"]
    Version,
    #[iden = "data"]
    Data,
    #[iden = "created_at"]
    CreatedAt,
}

/// Change stream written in the same transaction as the tables above.
#[derive(Iden)]
pub enum Stream {
    #[iden = "seq"]
    Seq,
    #[iden = "record_kind"]
    RecordKind,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "version"]
    Version,
    #[iden = "data"]
    Data,
}

/// Read model table.
#[derive(Iden)]
pub enum ReadModel {
    #[iden = "id"]
    Id,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "version"]
    Version,
    #[iden = "deleted"]
    Deleted,
    #[iden = "body"]
    Body,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// `record_kind` of a stream row for the version record.
pub const KIND_VERSION: &str = "version";
/// `record_kind` of a stream row for an Event Record.
pub const KIND_EVENT: &str = "event";
