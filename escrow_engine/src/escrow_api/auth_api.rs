use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Role, UserId},
    traits::{AuthApiError, AuthManagement},
};

pub struct AuthApi<B> {
    db: B,
}

impl<B: Debug> Debug for AuthApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthApi ({:?})", self.db)
    }
}

impl<B> AuthApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuthApi<B>
where B: AuthManagement
{
    pub async fn roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, AuthApiError> {
        self.db.fetch_roles_for_user(user_id).await
    }

    /// Succeeds if the user holds every role in `roles`.
    pub async fn check_user_has_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError> {
        self.db.check_user_has_roles(user_id, roles).await
    }

    pub async fn is_admin(&self, user_id: &UserId) -> Result<bool, AuthApiError> {
        match self.db.check_user_has_roles(user_id, &[Role::Admin]).await {
            Ok(()) => Ok(true),
            Err(AuthApiError::RoleNotAllowed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn assign_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<(), AuthApiError> {
        self.db.assign_roles(user_id, roles).await?;
        info!("🔄️🔑️ {user_id} was granted {roles:?}");
        Ok(())
    }

    pub async fn remove_roles(&self, user_id: &UserId, roles: &[Role]) -> Result<u64, AuthApiError> {
        let removed = self.db.remove_roles(user_id, roles).await?;
        info!("🔄️🔑️ {removed} role(s) removed from {user_id}");
        Ok(removed)
    }
}
