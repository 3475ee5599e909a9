//! Operator principal extraction.
//!
//! Identity is owned by an upstream auth layer; by the time a request gets
//! here it carries the authenticated principal in headers. This extractor
//! only reads them and enforces role gates.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use gatehouse_protocol::defaults::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

/// The authenticated operator behind a request.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }

    /// Admins and editors may draft proposals.
    pub fn require_editor(&self) -> Result<(), ApiError> {
        match self.role {
            Role::Admin | Role::Editor => Ok(()),
            Role::Viewer => Err(ApiError::Forbidden("Editor role required".to_string())),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| ApiError::Forbidden("Missing or invalid actor identity".to_string()))?;

        let role = match parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("viewer")
        {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            "viewer" => Role::Viewer,
            other => {
                return Err(ApiError::Forbidden(format!("Unknown role: {other}")));
            }
        };

        Ok(Actor { user_id, role })
    }
}
