//! Soft-delete interception layer
//!
//! Every read path here adds `deleted_at IS NULL` for entities in the
//! soft-delete registry, and every delete on a registered entity becomes an
//! update that stamps `deleted_at`. Entities outside the registry pass through
//! unmodified. The functions are generic over [`ConnectionTrait`] so they run
//! the same way on a pool connection or inside a transaction.
//!
//! There is deliberately no way to obtain an unfiltered query from this module.

use super::models;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Select,
};
use uuid::Uuid;

/// An entity reachable through the record store gateway
pub trait Record: EntityTrait {
    /// Entity name used in logs and audit entries
    const NAME: &'static str;

    fn id_column() -> Self::Column;

    /// `Some` only for entities in the soft-delete registry
    fn deleted_at_column() -> Option<Self::Column> {
        None
    }
}

macro_rules! record {
    ($module:ident, $name:literal, soft_delete) => {
        impl Record for models::$module::Entity {
            const NAME: &'static str = $name;

            fn id_column() -> Self::Column {
                models::$module::Column::Id
            }

            fn deleted_at_column() -> Option<Self::Column> {
                Some(models::$module::Column::DeletedAt)
            }
        }
    };
    ($module:ident, $name:literal) => {
        impl Record for models::$module::Entity {
            const NAME: &'static str = $name;

            fn id_column() -> Self::Column {
                models::$module::Column::Id
            }
        }
    };
}

// Soft-delete registry
record!(company, "Company", soft_delete);
record!(user, "User", soft_delete);
record!(invoice, "Invoice", soft_delete);
record!(project, "WebProject", soft_delete);
record!(payment, "Payment", soft_delete);
record!(domain, "Domain", soft_delete);
record!(workplace, "Workplace", soft_delete);

// Physically deleted
record!(proposal, "Proposal");
record!(service, "Service");
record!(ticket, "Ticket");
record!(employee, "Employee");
record!(company_note, "CompanyNote");
record!(company_contact, "CompanyContact");
record!(company_activity, "CompanyActivity");
record!(contact_message, "ContactMessage");

/// Whether deletes of `E` are tombstoned
pub fn is_soft_deletable<E: Record>() -> bool {
    E::deleted_at_column().is_some()
}

/// Add the live-row predicate for registered entities
fn live<E: Record>(filter: Condition) -> Condition {
    match E::deleted_at_column() {
        Some(deleted_at) => Condition::all().add(filter).add(deleted_at.is_null()),
        None => filter,
    }
}

/// Base query over live rows; callers may add ordering and paging
pub fn select<E: Record>(filter: Condition) -> Select<E> {
    E::find().filter(live::<E>(filter))
}

/// List every live row matching `filter`
pub async fn find_many<E, C>(db: &C, filter: Condition) -> Result<Vec<E::Model>, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    select::<E>(filter).all(db).await
}

/// First live row matching `filter`
pub async fn find_first<E, C>(db: &C, filter: Condition) -> Result<Option<E::Model>, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    select::<E>(filter).one(db).await
}

/// Live row by primary key. A tombstoned row is "not found".
pub async fn find_unique<E, C>(db: &C, id: Uuid) -> Result<Option<E::Model>, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    find_first::<E, C>(db, Condition::all().add(E::id_column().eq(id))).await
}

/// Count live rows matching `filter`
pub async fn count<E, C>(db: &C, filter: Condition) -> Result<u64, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    let count: Option<i64> = select::<E>(filter)
        .select_only()
        .column_as(Expr::col(E::id_column()).count(), "count")
        .into_tuple()
        .one(db)
        .await?;

    Ok(count.unwrap_or(0).max(0) as u64)
}

/// Sum a decimal column over live rows; an empty set sums to zero
pub async fn sum<E, C>(db: &C, column: E::Column, filter: Condition) -> Result<Decimal, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    let total: Option<Option<Decimal>> = select::<E>(filter)
        .select_only()
        .column_as(Expr::col(column).sum(), "total")
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(Decimal::ZERO))
}

/// Count live rows per value of a text column
pub async fn group_count<E, C>(
    db: &C,
    column: E::Column,
    filter: Condition,
) -> Result<Vec<(String, i64)>, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    select::<E>(filter)
        .select_only()
        .column(column)
        .column_as(Expr::col(E::id_column()).count(), "count")
        .group_by(column)
        .into_tuple()
        .all(db)
        .await
}

/// Delete one row by id. Returns the number of rows affected.
///
/// Registered entities are tombstoned; a row that is already tombstoned
/// keeps its original `deleted_at` and reports zero rows.
pub async fn delete<E, C>(db: &C, id: Uuid) -> Result<u64, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    delete_many::<E, C>(db, Condition::all().add(E::id_column().eq(id))).await
}

/// Bulk form of [`delete`]
pub async fn delete_many<E, C>(db: &C, filter: Condition) -> Result<u64, DbErr>
where
    E: Record,
    C: ConnectionTrait,
{
    let affected = match E::deleted_at_column() {
        Some(deleted_at) => {
            let now = Utc::now().fixed_offset();
            E::update_many()
                .col_expr(deleted_at, Expr::value(now))
                .filter(live::<E>(filter))
                .exec(db)
                .await?
                .rows_affected
        }
        None => E::delete_many().filter(filter).exec(db).await?.rows_affected,
    };

    tracing::debug!(entity = E::NAME, affected, soft = is_soft_deletable::<E>(), "Deleted records");
    Ok(affected)
}
