//! Account creation for partners and back-office admins.
//!
//! Each account is an auth-provider user plus a local row. The two writes are
//! not transactional; when the local insert fails the auth user is deleted again.

use db::models::{
    admin_user::AdminUser,
    partner::{CreatePartner, Partner},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info, warn};
use ts_rs::TS;
use utils::phone::normalize_phone;
use uuid::Uuid;

use super::auth::{AuthAdmin, AuthError, AuthUser};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error("phone number already registered")]
    PhoneExists,
    #[error("email already registered")]
    EmailExists,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("auth provider error: {0}")]
    Auth(AuthError),
}

impl From<AuthError> for OnboardingError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailExists => Self::EmailExists,
            AuthError::NotConfigured => Self::NotConfigured("auth provider"),
            AuthError::InvalidToken => Self::Unauthorized("invalid or expired access token".into()),
            other => Self::Auth(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePartnerAccount {
    pub email: String,
    pub password: String,
    pub company_name: String,
    pub contact_name: String,
    pub phone: String,
    pub city: String,
    pub district: Option<String>,
    #[serde(default)]
    pub service_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateAdminAccount {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct BootstrapAdminAccount {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub bootstrap_token: String,
}

pub struct OnboardingService;

impl OnboardingService {
    pub async fn create_partner(
        pool: &SqlitePool,
        auth: &dyn AuthAdmin,
        data: &CreatePartnerAccount,
        default_country_code: &str,
    ) -> Result<Partner, OnboardingError> {
        let email = validate_credentials(&data.email, &data.password)?;
        let company_name = required("company_name", &data.company_name)?;
        let contact_name = required("contact_name", &data.contact_name)?;
        let city = required("city", &data.city)?;
        let phone = normalize_phone(&data.phone, default_country_code)
            .ok_or_else(|| OnboardingError::Validation("phone is invalid".into()))?;

        let mut service_types: Vec<String> = data
            .service_types
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        service_types.sort();
        service_types.dedup();

        // Checked before touching the auth provider so a duplicate never creates a user.
        if Partner::find_by_phone(pool, &phone).await?.is_some() {
            return Err(OnboardingError::PhoneExists);
        }

        let user = auth
            .create_user(
                &email,
                &data.password,
                serde_json::json!({
                    "role": "partner",
                    "company_name": company_name,
                    "contact_name": contact_name,
                    "phone": phone,
                }),
            )
            .await?;

        let create = CreatePartner {
            auth_user_id: user.id,
            company_name,
            contact_name,
            email,
            phone,
            city,
            district: data
                .district
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            service_types,
        };

        match Partner::create(pool, &create, Uuid::new_v4()).await {
            Ok(partner) => {
                info!(
                    partner_id = %partner.id,
                    auth_user_id = %user.id,
                    "Partner account created"
                );
                Ok(partner)
            }
            Err(e) => {
                rollback_auth_user(auth, &user, &e).await;
                if db::is_unique_violation_on(&e, "partners.phone") {
                    Err(OnboardingError::PhoneExists)
                } else if db::is_unique_violation_on(&e, "partners.email") {
                    Err(OnboardingError::EmailExists)
                } else {
                    Err(OnboardingError::Database(e))
                }
            }
        }
    }

    /// Creates an admin. The caller must already be verified as an admin.
    pub async fn create_admin(
        pool: &SqlitePool,
        auth: &dyn AuthAdmin,
        data: &CreateAdminAccount,
    ) -> Result<AdminUser, OnboardingError> {
        Self::provision_admin(pool, auth, data, false).await
    }

    async fn provision_admin(
        pool: &SqlitePool,
        auth: &dyn AuthAdmin,
        data: &CreateAdminAccount,
        only_if_first: bool,
    ) -> Result<AdminUser, OnboardingError> {
        let email = validate_credentials(&data.email, &data.password)?;
        let full_name = data
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let user = auth
            .create_user(
                &email,
                &data.password,
                serde_json::json!({ "role": "admin", "full_name": full_name }),
            )
            .await?;

        let inserted = if only_if_first {
            AdminUser::create_first(pool, user.id, &email, full_name).await
        } else {
            AdminUser::create(pool, user.id, &email, full_name)
                .await
                .map(Some)
        };

        match inserted {
            Ok(Some(admin)) => {
                info!(admin_id = %admin.id, auth_user_id = %user.id, "Admin account created");
                Ok(admin)
            }
            Ok(None) => {
                rollback_auth_user(auth, &user, "an admin already exists").await;
                Err(OnboardingError::Conflict("an admin already exists".into()))
            }
            Err(e) => {
                rollback_auth_user(auth, &user, &e).await;
                if db::is_unique_violation_on(&e, "admin_users.email") {
                    Err(OnboardingError::EmailExists)
                } else {
                    Err(OnboardingError::Database(e))
                }
            }
        }
    }

    /// Creates the first admin, guarded by the deployment's bootstrap token.
    pub async fn bootstrap_admin(
        pool: &SqlitePool,
        auth: &dyn AuthAdmin,
        data: &BootstrapAdminAccount,
        expected_token: Option<&SecretString>,
    ) -> Result<AdminUser, OnboardingError> {
        let expected = expected_token.ok_or(OnboardingError::NotConfigured("admin bootstrap"))?;
        if !tokens_match(expected.expose_secret(), data.bootstrap_token.trim()) {
            warn!("Admin bootstrap attempted with an invalid token");
            return Err(OnboardingError::Forbidden("invalid bootstrap token".into()));
        }
        // Early exit only; the insert itself re-checks atomically.
        if AdminUser::count(pool).await? > 0 {
            return Err(OnboardingError::Conflict("an admin already exists".into()));
        }

        Self::provision_admin(
            pool,
            auth,
            &CreateAdminAccount {
                email: data.email.clone(),
                password: data.password.clone(),
                full_name: data.full_name.clone(),
            },
            true,
        )
        .await
    }

    /// Resolves a bearer token to an admin row.
    pub async fn verify_admin(
        pool: &SqlitePool,
        auth: &dyn AuthAdmin,
        access_token: &str,
    ) -> Result<AdminUser, OnboardingError> {
        let user = auth.user_from_token(access_token).await?;
        AdminUser::find_by_auth_user_id(pool, user.id)
            .await?
            .ok_or_else(|| OnboardingError::Forbidden("admin access required".into()))
    }
}

async fn rollback_auth_user(
    auth: &dyn AuthAdmin,
    user: &AuthUser,
    cause: impl std::fmt::Display,
) {
    warn!(
        auth_user_id = %user.id,
        error = %cause,
        "Local insert failed, deleting auth user"
    );
    if let Err(e) = auth.delete_user(user.id).await {
        error!(
            auth_user_id = %user.id,
            error = %e,
            "Failed to delete auth user after insert failure; account is orphaned"
        );
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<String, OnboardingError> {
    let email = email.trim().to_lowercase();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(OnboardingError::Validation("email is invalid".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(OnboardingError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(email)
}

fn required(field: &str, value: &str) -> Result<String, OnboardingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OnboardingError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn tokens_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;
    use crate::services::test_support::FakeAuthAdmin;

    fn partner_account(email: &str, phone: &str) -> CreatePartnerAccount {
        CreatePartnerAccount {
            email: email.to_string(),
            password: "hunter22".to_string(),
            company_name: "Anadolu Cekici".to_string(),
            contact_name: "Mert Aydin".to_string(),
            phone: phone.to_string(),
            city: "Ankara".to_string(),
            district: Some(" Cankaya ".to_string()),
            service_types: vec![
                "Towing".to_string(),
                "towing".to_string(),
                "battery".to_string(),
            ],
        }
    }

    #[tokio::test]
    async fn test_create_partner_normalizes_and_links_auth_user() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();

        let partner = OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("Owner@Example.com", "0532 000 00 01"),
            "90",
        )
        .await
        .unwrap();

        assert_eq!(partner.phone, "+905320000001");
        assert_eq!(partner.email, "owner@example.com");
        assert_eq!(partner.district.as_deref(), Some("Cankaya"));
        assert_eq!(
            partner.service_types.0,
            vec!["battery".to_string(), "towing".to_string()]
        );
        assert_eq!(auth.users().len(), 1);
        assert_eq!(auth.users()[0].id, partner.auth_user_id);
    }

    #[tokio::test]
    async fn test_duplicate_phone_never_creates_auth_user() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("first@example.com", "+90 532 000 00 02"),
            "90",
        )
        .await
        .unwrap();

        let err = OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("second@example.com", "05320000002"),
            "90",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OnboardingError::PhoneExists));
        assert_eq!(auth.users().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_deletes_auth_user() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("shared@example.com", "+905320000003"),
            "90",
        )
        .await
        .unwrap();

        // Remove the auth user so the provider accepts the email again and
        // the local unique email index is what fails.
        let existing = auth.users()[0].id;
        auth.delete_user(existing).await.unwrap();

        let err = OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("shared@example.com", "+905320000004"),
            "90",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OnboardingError::EmailExists));
        assert!(auth.users().is_empty());
        assert_eq!(auth.deleted().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_from_provider() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        auth.fail_next_create(AuthError::EmailExists);

        let err = OnboardingService::create_partner(
            &db.pool,
            &auth,
            &partner_account("taken@example.com", "+905320000005"),
            "90",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnboardingError::EmailExists));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_once_and_with_token() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        let token = SecretString::from("s3cret-bootstrap");
        let account = |bootstrap_token: &str, email: &str| BootstrapAdminAccount {
            email: email.to_string(),
            password: "correct horse".to_string(),
            full_name: Some("Ops".to_string()),
            bootstrap_token: bootstrap_token.to_string(),
        };

        let err = OnboardingService::bootstrap_admin(
            &db.pool,
            &auth,
            &account("nope", "a@example.com"),
            Some(&token),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnboardingError::Forbidden(_)));

        let err = OnboardingService::bootstrap_admin(
            &db.pool,
            &auth,
            &account("x", "a@example.com"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnboardingError::NotConfigured(_)));

        let admin = OnboardingService::bootstrap_admin(
            &db.pool,
            &auth,
            &account("s3cret-bootstrap", "a@example.com"),
            Some(&token),
        )
        .await
        .unwrap();
        assert_eq!(admin.email, "a@example.com");

        let err = OnboardingService::bootstrap_admin(
            &db.pool,
            &auth,
            &account("s3cret-bootstrap", "b@example.com"),
            Some(&token),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnboardingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_bootstraps_create_one_admin() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        let token = SecretString::from("s3cret-bootstrap");
        let account = |email: &str| BootstrapAdminAccount {
            email: email.to_string(),
            password: "correct horse".to_string(),
            full_name: None,
            bootstrap_token: "s3cret-bootstrap".to_string(),
        };
        let (first, second) = (account("a@example.com"), account("b@example.com"));

        let (a, b) = tokio::join!(
            OnboardingService::bootstrap_admin(&db.pool, &auth, &first, Some(&token)),
            OnboardingService::bootstrap_admin(&db.pool, &auth, &second, Some(&token)),
        );

        let created = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(created, 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(OnboardingError::Conflict(_))
        ));
        assert_eq!(AdminUser::count(&db.pool).await.unwrap(), 1);
        // A loser that got as far as the auth provider is cleaned up again.
        assert_eq!(auth.users().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_admin() {
        let db = DBService::new_in_memory().await.unwrap();
        let auth = FakeAuthAdmin::new();
        let admin_auth_id = auth.add_user_with_token("boss@example.com", "admin-token");
        AdminUser::create(&db.pool, admin_auth_id, "boss@example.com", None)
            .await
            .unwrap();
        auth.add_user_with_token("partner@example.com", "partner-token");

        let admin = OnboardingService::verify_admin(&db.pool, &auth, "admin-token")
            .await
            .unwrap();
        assert_eq!(admin.auth_user_id, admin_auth_id);

        let err = OnboardingService::verify_admin(&db.pool, &auth, "partner-token")
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Forbidden(_)));

        let err = OnboardingService::verify_admin(&db.pool, &auth, "garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Unauthorized(_)));
    }

    #[test]
    fn test_token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
    }
}
