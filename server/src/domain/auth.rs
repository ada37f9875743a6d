//! Minimal project-role extractor.
//!
//! This service has no separate auth/identity component (`spec.md` §1
//! treats it as an external collaborator). In its place, the collaborator
//! CRUD routes trust a `X-User-Id` / `X-Project-Role` header pair set by
//! whatever sits in front of this service in a real deployment — mirrors
//! how the original Python test suite drives the service under test
//! (`tests.utils.make_headers`). Telemetry ingest never uses this; it
//! authenticates purely via the per-sensor bearer token (§4.3).

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use uuid::Uuid;

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectRole {
    Viewer,
    Editor,
    Owner,
}

impl ProjectRole {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// The caller's identity and role within the project named in the request.
#[derive(Debug, Clone, Copy)]
pub struct ProjectActor {
    pub user_id: Uuid,
    pub role: ProjectRole,
}

impl ProjectActor {
    /// Reject with `forbidden` unless the actor's role is at least `min`.
    pub fn require_at_least(&self, min: ProjectRole) -> Result<(), DomainError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(DomainError::Forbidden(
                "insufficient project role".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for ProjectActor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Uuid>().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid X-User-Id"))?;

        let role = parts
            .headers
            .get("x-project-role")
            .and_then(|v| v.to_str().ok())
            .and_then(ProjectRole::parse)
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing or invalid X-Project-Role",
            ))?;

        Ok(Self { user_id, role })
    }
}
