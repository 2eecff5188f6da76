//! Schema bootstrap from the entity definitions

use super::models::*;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

/// Create every table that does not exist yet. Safe to run repeatedly.
pub async fn sync<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    // Parents before children so foreign keys resolve
    create(db, &schema, CompanyEntity).await?;
    create(db, &schema, UserEntity).await?;
    create(db, &schema, InvoiceEntity).await?;
    create(db, &schema, PaymentEntity).await?;
    payment_key_index(db).await?;
    create(db, &schema, ProposalEntity).await?;
    create(db, &schema, ProjectEntity).await?;
    create(db, &schema, ServiceEntity).await?;
    create(db, &schema, TicketEntity).await?;
    create(db, &schema, DomainEntity).await?;
    create(db, &schema, WorkplaceEntity).await?;
    create(db, &schema, EmployeeEntity).await?;
    create(db, &schema, CompanyNoteEntity).await?;
    create(db, &schema, CompanyContactEntity).await?;
    create(db, &schema, CompanyActivityEntity).await?;
    create(db, &schema, AuditLogEntity).await?;
    create(db, &schema, IdempotencyRecordEntity).await?;
    create(db, &schema, ContactMessageEntity).await?;

    info!("Schema synchronized");
    Ok(())
}

async fn create<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}

/// A payment idempotency key is unique within its invoice. Rows without a
/// key never collide.
async fn payment_key_index<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let stmt = Index::create()
        .name("idx_payments_invoice_idempotency_key")
        .table(PaymentEntity)
        .col(PaymentColumn::InvoiceId)
        .col(PaymentColumn::IdempotencyKey)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}
