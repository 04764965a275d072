//! First-superuser provisioning.
//!
//! Managed skills are owned by the first superuser, so bootstrap makes sure
//! that account exists before any skill pass runs.

use serde::Deserialize;

use crate::model::{NewUser, UserRecord};
use crate::reconcile::ReconcileError;
use crate::security::{ConfigError, PasswordHasher, Secret};
use crate::store::PersistenceGateway;

/// Credentials of the first superuser.
#[derive(Debug, Clone, Deserialize)]
pub struct SuperuserSettings {
    pub email: String,
    pub password: Secret,
}

impl SuperuserSettings {
    pub fn new(email: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "superuser.email".to_string(),
            });
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing {
                name: "superuser.password".to_string(),
            });
        }
        Ok(())
    }
}

/// Look up the superuser by email, creating it when absent.
///
/// An existing account is returned as is; its password is not reset.
/// Returns the user and whether it was created.
pub async fn ensure_superuser<G>(
    gateway: &G,
    passwords: &PasswordHasher,
    settings: &SuperuserSettings,
) -> Result<(UserRecord, bool), ReconcileError>
where
    G: PersistenceGateway + ?Sized,
{
    settings.validate()?;

    let mut tx = gateway.begin().await?;
    if let Some(user) = tx.find_user_by_email(&settings.email).await? {
        tx.commit().await?;
        tracing::debug!("Superuser {} already exists", user.email);
        return Ok((user, false));
    }

    let hashed_password = passwords.hash(settings.password.expose())?;
    let user = tx
        .insert_user(NewUser {
            email: settings.email.clone(),
            hashed_password,
            is_superuser: true,
        })
        .await?;
    tx.commit().await?;

    tracing::info!("Created superuser {}", user.email);
    Ok((user, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGateway;

    #[tokio::test]
    async fn test_creates_superuser_once() {
        let gateway = MemoryGateway::new();
        let passwords = PasswordHasher::new();
        let settings = SuperuserSettings::new("admin@example.com", "changethis");

        let (user, created) = ensure_superuser(&gateway, &passwords, &settings)
            .await
            .unwrap();
        assert!(created);
        assert!(user.is_superuser);
        assert!(passwords.verify("changethis", &user.hashed_password));

        let (again, created) = ensure_superuser(&gateway, &passwords, &settings)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
        assert_eq!(gateway.users().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_password_not_reset() {
        let gateway = MemoryGateway::new();
        let passwords = PasswordHasher::new();
        ensure_superuser(
            &gateway,
            &passwords,
            &SuperuserSettings::new("admin@example.com", "first"),
        )
        .await
        .unwrap();

        let (user, _) = ensure_superuser(
            &gateway,
            &passwords,
            &SuperuserSettings::new("admin@example.com", "second"),
        )
        .await
        .unwrap();
        assert!(passwords.verify("first", &user.hashed_password));
    }

    #[tokio::test]
    async fn test_empty_settings_rejected() {
        let gateway = MemoryGateway::new();
        let passwords = PasswordHasher::new();

        for settings in [
            SuperuserSettings::new("", "pw"),
            SuperuserSettings::new("admin@example.com", ""),
        ] {
            let result = ensure_superuser(&gateway, &passwords, &settings).await;
            assert!(matches!(result, Err(ReconcileError::Config(_))));
        }
        assert!(gateway.users().is_empty());
    }
}
