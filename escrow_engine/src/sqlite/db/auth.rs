//! Sqlite database operations for role assignments.
//!
//! Generally clients should never call these methods directly, and prefer to use the [`AuthManagement`] trait methods
//! that are implemented on the [`SqliteDatabase`] struct instead.
//!
//! [`AuthManagement`]: crate::traits::AuthManagement
//! [`SqliteDatabase`]: crate::SqliteDatabase
use log::debug;
use sqlx::{Row, SqliteConnection};

use crate::{
    db_types::{Role, UserId},
    traits::AuthApiError,
};

pub async fn roles_for_user(user_id: &UserId, conn: &mut SqliteConnection) -> Result<Vec<Role>, AuthApiError> {
    let rows = sqlx::query("SELECT role FROM role_assignments WHERE user_id = $1 ORDER BY role")
        .bind(user_id.as_str())
        .fetch_all(conn)
        .await?;
    let roles = rows
        .iter()
        .map(|r| r.try_get::<String, _>("role").map_err(AuthApiError::from))
        .map(|r| r.and_then(|s| s.parse::<Role>().map_err(|_| AuthApiError::RoleNotFound)))
        .collect::<Result<Vec<Role>, _>>()?;
    Ok(roles)
}

pub async fn user_has_roles(user_id: &UserId, roles: &[Role], conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    let held = roles_for_user(user_id, conn).await?;
    let missing = roles.iter().filter(|r| !held.contains(r)).count();
    if missing == 0 {
        Ok(())
    } else {
        Err(AuthApiError::RoleNotAllowed(missing))
    }
}

pub async fn assign_roles(user_id: &UserId, roles: &[Role], conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    for role in roles {
        sqlx::query("INSERT INTO role_assignments (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id.as_str())
            .bind(role.to_string())
            .execute(&mut *conn)
            .await?;
    }
    debug!("🗃️ Roles {roles:?} assigned to {user_id}");
    Ok(())
}

pub async fn remove_roles(user_id: &UserId, roles: &[Role], conn: &mut SqliteConnection) -> Result<u64, AuthApiError> {
    let mut removed = 0;
    for role in roles {
        let result = sqlx::query("DELETE FROM role_assignments WHERE user_id = $1 AND role = $2")
            .bind(user_id.as_str())
            .bind(role.to_string())
            .execute(&mut *conn)
            .await?;
        removed += result.rows_affected();
    }
    debug!("🗃️ {removed} role assignment(s) removed from {user_id}");
    Ok(removed)
}
