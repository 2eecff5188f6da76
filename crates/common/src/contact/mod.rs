//! Public contact form intake
//!
//! Submissions are deduplicated by idempotency key, limited per client IP
//! over a trailing window, validated, and stored with the consent timestamp.
//! Free text is HTML-sanitized before it is stored, since the admin inbox
//! renders it.

use crate::auth::RequestContext;
use crate::db::models::*;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::idempotency::{IdempotencyGuard, IdempotencyOutcome, IdempotencyScope};
use crate::metrics;
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Bucket for requests that arrive without a client address
const UNKNOWN_IP: &str = "unknown";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactSubmission {
    #[validate(length(min = 2, max = 100, message = "Ad en az 2 karakter olmalı."))]
    pub name: String,

    #[validate(email(message = "Geçerli bir e-posta adresi girin."))]
    pub email: String,

    #[validate(length(max = 30))]
    #[serde(default)]
    pub phone: Option<String>,

    #[validate(length(min = 10, max = 5000, message = "Mesaj en az 10 karakter olmalı."))]
    pub message: String,

    /// Explicit consent to personal data processing
    #[serde(default)]
    pub consent: bool,

    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ContactOutcome {
    Accepted { message_id: Uuid },
    AlreadySubmitted,
}

#[derive(Clone)]
pub struct ContactDesk {
    repo: Repository,
    idempotency: IdempotencyGuard,
    max_per_window: u64,
    window: Duration,
}

impl ContactDesk {
    pub fn new(
        repo: Repository,
        idempotency: IdempotencyGuard,
        max_per_window: u64,
        window: Duration,
    ) -> Self {
        Self {
            repo,
            idempotency,
            max_per_window,
            window,
        }
    }

    pub async fn submit(
        &self,
        ctx: &RequestContext,
        submission: ContactSubmission,
    ) -> Result<ContactOutcome> {
        let ticket = match self
            .idempotency
            .verify(
                submission.idempotency_key.as_deref(),
                IdempotencyScope::ContactSubmission,
            )
            .await?
        {
            IdempotencyOutcome::Duplicate => return Ok(ContactOutcome::AlreadySubmitted),
            outcome => outcome.into_ticket(),
        };

        let result = self.submit_guarded(ctx, submission).await;
        self.idempotency.settle(ticket, &result).await;
        result
    }

    async fn submit_guarded(
        &self,
        ctx: &RequestContext,
        submission: ContactSubmission,
    ) -> Result<ContactOutcome> {
        let ip = ctx.client_ip.as_deref().unwrap_or(UNKNOWN_IP);
        self.check_rate_limit(ip).await?;

        submission.validate()?;
        if !submission.consent {
            return Err(AppError::Validation {
                message: "Kişisel verilerin işlenmesine onay vermeniz gerekiyor.".to_string(),
                field: Some("consent".to_string()),
            });
        }

        let name = sanitize(&submission.name);
        let message = sanitize(&submission.message);
        if name.is_empty() || message.is_empty() {
            return Err(AppError::Validation {
                message: "Gönderilen metin geçerli içerik barındırmıyor.".to_string(),
                field: Some(if name.is_empty() { "name" } else { "message" }.to_string()),
            });
        }

        let now = Utc::now().fixed_offset();
        let stored = self
            .repo
            .insert_contact_message(ContactMessageActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name),
                email: Set(submission.email.trim().to_lowercase()),
                phone: Set(submission.phone.filter(|p| !p.trim().is_empty())),
                message: Set(message),
                ip_address: Set(Some(ip.to_string())),
                user_agent: Set(ctx.user_agent.clone()),
                consent_at: Set(now),
                read: Set(false),
                created_at: Set(now),
            })
            .await?;

        info!(message_id = %stored.id, ip, "Contact message stored");
        Ok(ContactOutcome::Accepted {
            message_id: stored.id,
        })
    }

    async fn check_rate_limit(&self, ip: &str) -> Result<()> {
        let window = chrono::Duration::from_std(self.window).map_err(|e| AppError::Configuration {
            message: format!("Invalid contact window: {}", e),
        })?;
        let since = Utc::now().fixed_offset() - window;

        let recent = self
            .repo
            .count_contact_messages_since(ip, since)
            .await
            .map_err(|e| AppError::ServiceUnavailable {
                message: format!("Rate limit check failed: {}", e),
            })?;

        if recent >= self.max_per_window {
            warn!(ip, recent, limit = self.max_per_window, "Contact submissions rate limited");
            metrics::record_rate_limited("contact");
            return Err(AppError::RateLimited {
                limit: self.max_per_window,
                window_secs: self.window.as_secs(),
            });
        }
        Ok(())
    }
}

/// Strip markup that could execute in the admin inbox
fn sanitize(text: &str) -> String {
    ammonia::clean(text.trim()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use crate::testing::{self, MemoryIdempotencyStore};
    use sea_orm::EntityTrait;
    use std::sync::Arc;

    const IP: &str = "203.0.113.7";

    fn desk(pool: &DbPool) -> ContactDesk {
        ContactDesk::new(
            Repository::new(pool.clone()),
            IdempotencyGuard::new(
                Arc::new(MemoryIdempotencyStore::default()),
                Duration::from_secs(3600),
                false,
            ),
            5,
            Duration::from_secs(3600),
        )
    }

    fn submission(key: Option<&str>) -> ContactSubmission {
        ContactSubmission {
            name: "Ayşe Yılmaz".to_string(),
            email: "Ayse@Example.com".to_string(),
            phone: None,
            message: "Kurumsal web sitesi için teklif almak istiyoruz.".to_string(),
            consent: true,
            idempotency_key: key.map(str::to_string),
        }
    }

    fn visitor() -> RequestContext {
        RequestContext::anonymous().with_client(IP, Some("Mozilla/5.0".to_string()))
    }

    async fn stored(pool: &DbPool) -> Vec<ContactMessage> {
        ContactMessageEntity::find().all(pool.read()).await.unwrap()
    }

    #[tokio::test]
    async fn test_accepts_and_stores() {
        let pool = testing::sqlite_pool().await;
        let outcome = desk(&pool).submit(&visitor(), submission(None)).await.unwrap();

        let rows = stored(&pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(outcome, ContactOutcome::Accepted { message_id: rows[0].id });
        assert_eq!(rows[0].email, "ayse@example.com");
        assert_eq!(rows[0].ip_address.as_deref(), Some(IP));
        assert_eq!(rows[0].user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(!rows[0].read);
    }

    #[tokio::test]
    async fn test_sixth_submission_in_window_is_rejected() {
        let pool = testing::sqlite_pool().await;
        let recent = Utc::now().fixed_offset() - chrono::Duration::minutes(10);
        for _ in 0..5 {
            testing::seed_contact_message(pool.write(), IP, recent).await;
        }

        let err = desk(&pool).submit(&visitor(), submission(None)).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { limit: 5, window_secs: 3600 }));
        assert_eq!(stored(&pool).await.len(), 5);

        // Another address is unaffected
        let other = RequestContext::anonymous().with_client("203.0.113.8", None);
        assert!(desk(&pool).submit(&other, submission(None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_old_submissions_fall_out_of_window() {
        let pool = testing::sqlite_pool().await;
        let old = Utc::now().fixed_offset() - chrono::Duration::hours(2);
        for _ in 0..5 {
            testing::seed_contact_message(pool.write(), IP, old).await;
        }

        assert!(desk(&pool).submit(&visitor(), submission(None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_key_is_stored_once() {
        let pool = testing::sqlite_pool().await;
        let desk = desk(&pool);

        assert!(matches!(
            desk.submit(&visitor(), submission(Some("form-1"))).await.unwrap(),
            ContactOutcome::Accepted { .. }
        ));
        assert_eq!(
            desk.submit(&visitor(), submission(Some("form-1"))).await.unwrap(),
            ContactOutcome::AlreadySubmitted
        );
        assert_eq!(stored(&pool).await.len(), 1);
    }

    #[tokio::test]
    async fn test_markup_is_neutralized_before_storage() {
        let pool = testing::sqlite_pool().await;
        let mut hostile = submission(None);
        hostile.name = "Ayşe<script>alert('ad')</script>".to_string();
        hostile.message =
            "Teklif istiyoruz <script>fetch('/admin')</script><img src=x onerror=alert(1)>"
                .to_string();

        desk(&pool).submit(&visitor(), hostile).await.unwrap();

        let rows = stored(&pool).await;
        assert_eq!(rows[0].name, "Ayşe");
        assert!(rows[0].message.starts_with("Teklif istiyoruz"));
        for text in [&rows[0].name, &rows[0].message] {
            assert!(!text.contains("<script"));
            assert!(!text.contains("onerror"));
            assert!(!text.contains("fetch("));
        }
    }

    #[tokio::test]
    async fn test_markup_only_message_is_rejected() {
        let pool = testing::sqlite_pool().await;
        let mut empty = submission(None);
        empty.message = "<script>alert('only markup')</script>".to_string();

        assert!(matches!(
            desk(&pool).submit(&visitor(), empty).await,
            Err(AppError::Validation { field: Some(ref f), .. }) if f == "message"
        ));
        assert!(stored(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_submissions_are_rejected() {
        let pool = testing::sqlite_pool().await;
        let desk = desk(&pool);

        let mut bad_email = submission(Some("bad"));
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            desk.submit(&visitor(), bad_email).await,
            Err(AppError::Validation { field: Some(ref f), .. }) if f == "email"
        ));

        let mut no_consent = submission(None);
        no_consent.consent = false;
        assert!(matches!(
            desk.submit(&visitor(), no_consent).await,
            Err(AppError::Validation { field: Some(ref f), .. }) if f == "consent"
        ));
        assert!(stored(&pool).await.is_empty());

        // The rejected key was released and may be reused once fixed
        assert!(desk.submit(&visitor(), submission(Some("bad"))).await.is_ok());
    }
}
