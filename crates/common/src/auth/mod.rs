//! Principal resolution
//!
//! Provides:
//! - The acting principal and its role
//! - Per-request context consumed by every guard
//! - JWT session token issuing and validation

use crate::errors::{AppError, Result};
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Principal role. `Admin` is the only privileged role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    /// Privileged roles are not tenant-scoped
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Client => "CLIENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "CLIENT" => Ok(Role::Client),
            other => Err(AppError::Validation {
                message: format!("Unknown role: {}", other),
                field: Some("role".to_string()),
            }),
        }
    }
}

/// Authenticated user acting on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    /// Owning tenant; `None` for admins and for accounts not yet linked
    pub company_id: Option<Uuid>,
}

/// Per-request context
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    /// Context for an anonymous caller
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    /// Context for a signed-in principal
    pub fn for_principal(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            ..Self::anonymous()
        }
    }

    pub fn with_client(mut self, ip: impl Into<String>, user_agent: Option<String>) -> Self {
        self.client_ip = Some(ip.into());
        self.user_agent = user_agent;
        self
    }

    /// Build a context from inbound request headers.
    ///
    /// A missing or invalid bearer token yields an anonymous context;
    /// the guards decide whether that is acceptable.
    pub fn from_headers(headers: &HeaderMap, tokens: &SessionTokens) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let request_id = header("x-request-id").unwrap_or_else(|| Uuid::new_v4().to_string());

        // First hop of x-forwarded-for, then x-real-ip
        let client_ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .or_else(|| header("x-real-ip"));

        let principal = header("authorization")
            .as_deref()
            .and_then(extract_bearer)
            .and_then(|token| match tokens.principal(token) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::debug!(error = %e, request_id = %request_id, "Ignoring invalid session token");
                    None
                }
            });

        Self {
            principal,
            client_ip,
            user_agent: header("user-agent"),
            request_id,
        }
    }
}

/// Resolve the acting principal or fail with `Unauthorized`
pub fn require_principal(ctx: &RequestContext) -> Result<&Principal> {
    ctx.principal.as_ref().ok_or_else(|| AppError::Unauthorized {
        message: "No authenticated principal".to_string(),
    })
}

/// Resolve the acting principal and require the privileged role
pub fn require_privileged(ctx: &RequestContext) -> Result<&Principal> {
    let principal = require_principal(ctx)?;
    if principal.role.is_privileged() {
        Ok(principal)
    } else {
        Err(AppError::Forbidden {
            message: format!("Role {} may not perform this action", principal.role),
        })
    }
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub company_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT session token manager
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl SessionTokens {
    /// Create a new token manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Issue a session token carrying the principal snapshot
    pub fn issue(&self, principal: &Principal) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = SessionClaims {
            sub: principal.id.to_string(),
            email: principal.email.clone(),
            name: principal.name.clone(),
            role: principal.role,
            company_id: principal.company_id.map(|id| id.to_string()),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to issue session token: {}", e),
        })
    }

    /// Validate a token and rebuild the principal it carries
    pub fn principal(&self, token: &str) -> Result<Principal> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Unauthorized {
                    message: "Session expired".to_string(),
                },
                _ => AppError::Unauthorized {
                    message: "Invalid session token".to_string(),
                },
            })?;

        let parse = |raw: &str| {
            Uuid::parse_str(raw).map_err(|_| AppError::Unauthorized {
                message: "Malformed session token".to_string(),
            })
        };

        Ok(Principal {
            id: parse(&claims.sub)?,
            email: claims.email,
            name: claims.name,
            role: claims.role,
            company_id: claims.company_id.as_deref().map(parse).transpose()?,
        })
    }
}

/// Extract the token from a `Bearer` Authorization header
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}
