//! Caller identity for staff routes.
//!
//! Sessions are handled by the auth layer in front of this service, which
//! forwards the resolved identity as trusted headers. Handlers take a
//! `Staff` extractor and call `require` with the roles they accept.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::model::Role;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORG_ID_HEADER: &str = "x-org-id";
pub const ORG_ROLE_HEADER: &str = "x-org-role";

pub const STAFF_ROLES: &[Role] = &[Role::Owner, Role::Manager, Role::Staff];
pub const MANAGER_ROLES: &[Role] = &[Role::Owner, Role::Manager];

/// The authenticated caller and their role in the session organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staff {
    pub user_id: String,
    pub org_id: String,
    pub role: Role,
}

impl Staff {
    /// Fail with 403 unless the caller holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<&Self, ApiError> {
        if roles.contains(&self.role) {
            Ok(self)
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Like `require`, for routes addressing an organisation by path.
    pub fn require_org(&self, org_id: &str, roles: &[Role]) -> Result<&Self, ApiError> {
        if self.org_id != org_id {
            return Err(ApiError::Forbidden);
        }
        self.require(roles)
    }
}

/// A signed-in user, for routes that are not scoped to an organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for Staff
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER).ok_or(ApiError::Forbidden)?;
        let org_id = header(parts, ORG_ID_HEADER).ok_or(ApiError::Forbidden)?;
        let role = header(parts, ORG_ROLE_HEADER)
            .and_then(|r| r.to_ascii_uppercase().parse::<Role>().ok())
            .ok_or(ApiError::Forbidden)?;

        Ok(Staff {
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            role,
        })
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER).ok_or(ApiError::Forbidden)?;
        Ok(Caller {
            user_id: user_id.to_string(),
        })
    }
}
