use thiserror::Error;

use crate::db_types::{Role, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User is missing {0} of the requested roles")]
    RoleNotAllowed(usize),
    #[error("The requested role does not exist")]
    RoleNotFound,
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        AuthApiError::DatabaseError(e.to_string())
    }
}

/// Role bookkeeping. Authentication itself happens outside the engine; callers hand in an already-authenticated
/// user id and the engine only answers "does this user hold these roles".
#[allow(async_fn_in_trait)]
pub trait AuthManagement {
    /// Succeeds only if the user holds *all* of the given roles.
    async fn check_user_has_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError>;

    async fn fetch_roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, AuthApiError>;

    /// Assigns the roles to the user. Roles the user already holds are left alone.
    async fn assign_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError>;

    /// Removes the roles from the user, returning the number of assignments that were deleted.
    async fn remove_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<u64, AuthApiError>;
}
