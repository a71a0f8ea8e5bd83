pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, lifecycle::Requester, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub reviewer: bool,
}

impl AuthenticatedUser {
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id.clone(),
            reviewer: self.reviewer,
        }
    }

    pub fn require_reviewer(&self) -> Result<(), AppError> {
        if self.reviewer {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

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

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        if claims.sub.trim().is_empty() {
            return Err(AppError::unauthorized());
        }

        Ok(AuthenticatedUser {
            reviewer: state.config.is_reviewer_role(&claims.role),
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}
