//! SeaORM entity models
//!
//! One module per table. Every entity is re-exported as
//! `XEntity / X / XActiveModel / XColumn`.

pub(crate) mod audit_log;
pub(crate) mod company;
pub(crate) mod company_activity;
pub(crate) mod company_contact;
pub(crate) mod company_note;
pub(crate) mod contact_message;
pub(crate) mod domain;
pub(crate) mod employee;
pub(crate) mod idempotency_record;
pub(crate) mod invoice;
pub(crate) mod payment;
pub(crate) mod project;
pub(crate) mod proposal;
pub(crate) mod service;
pub(crate) mod ticket;
pub(crate) mod user;
pub(crate) mod workplace;

pub use company::{
    ActiveModel as CompanyActiveModel, Column as CompanyColumn, Entity as CompanyEntity,
    Model as Company,
};

pub use user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity, Model as User,
};

pub use invoice::{
    ActiveModel as InvoiceActiveModel, Column as InvoiceColumn, Entity as InvoiceEntity,
    InvoiceStatus, Model as Invoice,
};

pub use payment::{
    ActiveModel as PaymentActiveModel, Column as PaymentColumn, Entity as PaymentEntity,
    Model as Payment, PaymentMethod,
};

pub use proposal::{
    ActiveModel as ProposalActiveModel, Column as ProposalColumn, Entity as ProposalEntity,
    Model as Proposal,
};

pub use project::{
    ActiveModel as ProjectActiveModel, Column as ProjectColumn, Entity as ProjectEntity,
    Model as Project,
};

pub use service::{
    ActiveModel as ServiceActiveModel, Column as ServiceColumn, Entity as ServiceEntity,
    Model as Service,
};

pub use ticket::{
    ActiveModel as TicketActiveModel, Column as TicketColumn, Entity as TicketEntity,
    Model as Ticket,
};

pub use domain::{
    ActiveModel as DomainActiveModel, Column as DomainColumn, Entity as DomainEntity,
    Model as Domain,
};

pub use workplace::{
    ActiveModel as WorkplaceActiveModel, Column as WorkplaceColumn, Entity as WorkplaceEntity,
    Model as Workplace,
};

pub use employee::{
    ActiveModel as EmployeeActiveModel, Column as EmployeeColumn, Entity as EmployeeEntity,
    Model as Employee,
};

pub use company_note::{
    ActiveModel as CompanyNoteActiveModel, Column as CompanyNoteColumn,
    Entity as CompanyNoteEntity, Model as CompanyNote,
};

pub use company_contact::{
    ActiveModel as CompanyContactActiveModel, Column as CompanyContactColumn,
    Entity as CompanyContactEntity, Model as CompanyContact,
};

pub use company_activity::{
    ActiveModel as CompanyActivityActiveModel, Column as CompanyActivityColumn,
    Entity as CompanyActivityEntity, Model as CompanyActivity,
};

pub use audit_log::{
    ActiveModel as AuditLogActiveModel, Column as AuditLogColumn, Entity as AuditLogEntity,
    Model as AuditLog,
};

pub use idempotency_record::{
    outcome as idempotency_outcome, ActiveModel as IdempotencyRecordActiveModel,
    Column as IdempotencyRecordColumn, Entity as IdempotencyRecordEntity,
    Model as IdempotencyRecord,
};

pub use contact_message::{
    ActiveModel as ContactMessageActiveModel, Column as ContactMessageColumn,
    Entity as ContactMessageEntity, Model as ContactMessage,
};
