//! Bearer-token extractors for routes that need a signed-in caller.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use db::models::admin_user::AdminUser;
use deployment::Deployment;
use services::services::{auth::AuthUser, onboarding::OnboardingService};

use crate::{DeploymentImpl, error::ApiError};

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Any user signed in with the auth provider.
pub struct RequireUser(pub AuthUser);

impl FromRequestParts<DeploymentImpl> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let user = deployment.auth().user_from_token(token).await?;
        Ok(RequireUser(user))
    }
}

/// A signed-in user with a row in `admin_users`.
pub struct RequireAdmin(pub AdminUser);

impl FromRequestParts<DeploymentImpl> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let admin =
            OnboardingService::verify_admin(&deployment.db().pool, deployment.auth(), token)
                .await?;
        Ok(RequireAdmin(admin))
    }
}

/// Admin when a valid admin token is present, otherwise anonymous.
pub struct MaybeAdmin(pub Option<AdminUser>);

impl FromRequestParts<DeploymentImpl> for MaybeAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAdmin(None));
        };
        let admin = OnboardingService::verify_admin(&deployment.db().pool, deployment.auth(), token)
            .await
            .ok();
        Ok(MaybeAdmin(admin))
    }
}
