pub mod api_key;
pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::ROLE_ADMIN, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Accepts either a login JWT or an API key as the bearer token.
#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        if let Ok(claims) = state.jwt.verify_token(bearer.token()) {
            return Ok(AuthenticatedUser {
                user_id: claims.sub,
                username: claims.username,
                role: claims.role,
            });
        }

        let mut conn = state.db()?;
        let user = api_key::find_user_by_key(&mut conn, bearer.token())?
            .ok_or_else(AppError::unauthorized)?;

        Ok(AuthenticatedUser {
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}

/// An authenticated user with the staff role.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_staff() {
            return Err(AppError::forbidden());
        }
        Ok(StaffUser(user))
    }
}
