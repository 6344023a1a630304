use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::UserProfile;
use crate::routes::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn for_profile(profile: &UserProfile) -> Vec<Role> {
        let mut roles = vec![Role::User];
        if profile.is_moderator {
            roles.push(Role::Moderator);
        }
        if profile.is_admin {
            roles.push(Role::Admin);
        }
        roles
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity provider user id.
    pub sub: String,
    pub username: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

impl Claims {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_staff(&self) -> bool {
        self.has_role(Role::Moderator) || self.has_role(Role::Admin)
    }
}

/// Validate a JWT and return its claims.
pub fn decode_jwt(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState missing from app data");
            return ready(Err(ApiError::Internal));
        };
        // Delegate to BearerAuth to parse the header.
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return ready(
                decode_jwt(&state.config.jwt_secret, bearer.token())
                    .map(Auth)
                    .map_err(|_| ApiError::Unauthorized("Your session has expired, please sign in again".into())),
            );
        }
        ready(Err(ApiError::Unauthorized("You must be logged in".into())))
    }
}

/// Create a session token for a user.
pub fn create_jwt(
    secret: &str,
    user_id: &str,
    username: &str,
    roles: Vec<Role>,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize;
    let claims = Claims { sub: user_id.to_string(), username: username.to_string(), exp: expiration, roles };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn token_round_trip_keeps_subject_and_roles() {
        let token = create_jwt(SECRET, "u-1", "ana_gt", vec![Role::User, Role::Moderator], 1).unwrap();
        let claims = decode_jwt(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.username, "ana_gt");
        assert!(claims.is_staff());
        assert!(!claims.has_role(Role::Admin));
    }

    #[test]
    fn wrong_secret_and_expired_tokens_fail() {
        let token = create_jwt(SECRET, "u-1", "ana", vec![Role::User], 1).unwrap();
        assert!(decode_jwt("another-secret-another-secret-123", &token).is_err());
        let expired = create_jwt(SECRET, "u-1", "ana", vec![Role::User], -2).unwrap();
        assert!(decode_jwt(SECRET, &expired).is_err());
    }
}
