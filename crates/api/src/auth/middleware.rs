//! Authentication middleware for Axum

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header::{AUTHORIZATION, COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use revlens_shared::OrgId;
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::JwtManager;
use crate::error::ApiError;

/// Cookie set by the dashboard frontend for SPA clients
const AUTH_COOKIE: &str = "revlens_auth_token";

/// Authenticated user with the organization every query is scoped to
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub org_id: OrgId,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("No organization found")]
    NoOrganization,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth | AuthError::InvalidToken => ApiError::Unauthorized,
            AuthError::NoOrganization => ApiError::NoOrganization,
            AuthError::DatabaseError(detail) => ApiError::Upstream(detail),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Resolves which organization a user acts for
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// `claimed` is the organization named in the token, if any. Returns
    /// `None` when the user is not a member of it (or of any organization).
    async fn resolve_org(
        &self,
        user_id: Uuid,
        claimed: Option<Uuid>,
    ) -> Result<Option<Uuid>, AuthError>;
}

pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn resolve_org(
        &self,
        user_id: Uuid,
        claimed: Option<Uuid>,
    ) -> Result<Option<Uuid>, AuthError> {
        let org_id: Option<Uuid> = match claimed {
            Some(org_id) => sqlx::query_scalar::<_, Uuid>(
                "SELECT org_id FROM organization_members WHERE user_id = $1 AND org_id = $2",
            )
            .bind(user_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await,
            // Oldest membership is the default organization
            None => sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT org_id FROM organization_members
                WHERE user_id = $1
                ORDER BY created_at ASC
                LIMIT 1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await,
        }
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(org_id)
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub memberships: Arc<dyn MembershipStore>,
}

fn extract_token_from_cookie(request: &Request) -> Option<String> {
    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|cookie| cookie.strip_prefix(AUTH_COOKIE)?.strip_prefix('='))
                .map(String::from)
        })
}

/// Extract bearer token from Authorization header or the auth cookie
fn extract_bearer_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    extract_token_from_cookie(request)
}

/// Middleware that requires an authenticated user with an organization
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(&request) {
        Some(token) => authenticate_jwt(&auth_state, &token).await,
        None => Err(AuthError::MissingAuth),
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                org_id = %auth_user.org_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

async fn authenticate_jwt(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    let claims = auth_state
        .jwt_manager
        .validate_access_token(token)
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            AuthError::InvalidToken
        })?;

    let org_id = auth_state
        .memberships
        .resolve_org(claims.sub, claims.org_id)
        .await?
        .ok_or(AuthError::NoOrganization)?;

    Ok(AuthUser {
        user_id: claims.sub,
        org_id: OrgId(org_id),
        email: claims.email,
    })
}

/// Fixed user -> organizations table for tests
#[cfg(test)]
#[derive(Default)]
pub struct StaticMemberships {
    members: std::collections::HashMap<Uuid, Vec<Uuid>>,
}

#[cfg(test)]
impl StaticMemberships {
    pub fn with_member(mut self, user_id: Uuid, org_id: Uuid) -> Self {
        self.members.entry(user_id).or_default().push(org_id);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl MembershipStore for StaticMemberships {
    async fn resolve_org(
        &self,
        user_id: Uuid,
        claimed: Option<Uuid>,
    ) -> Result<Option<Uuid>, AuthError> {
        let orgs = self.members.get(&user_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(match claimed {
            Some(org_id) => orgs.iter().copied().find(|o| *o == org_id),
            None => orgs.first().copied(),
        })
    }
}
