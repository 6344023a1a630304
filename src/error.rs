use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use validator::ValidationErrors;

use crate::identity::IdentityError;
use crate::repo::RepoError;
use crate::storage::StorageError;
use crate::validation::{field_messages, first_message};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{}", first_message(.0))] Validation(ValidationErrors),
    #[error("{0}")] Invalid(String),
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] Forbidden(String),
    #[error("not found")] NotFound,
    #[error("{0}")] Conflict(String),
    #[error("{0}")] PayloadTooLarge(String),
    #[error("{0}")] UnsupportedMediaType(String),
    #[error("something went wrong, please try again later")] Unavailable,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn login_required(action: &str) -> Self {
        ApiError::Unauthorized(format!("You must be logged in to {action}"))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict("conflict".into()),
            RepoError::InvalidReference(what) => ApiError::Invalid(what),
            RepoError::Unavailable => {
                tracing::error!("backing store unavailable");
                ApiError::Unavailable
            }
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound | StorageError::InvalidPath => ApiError::NotFound,
            StorageError::Other(msg) => {
                tracing::error!(error = %msg, "avatar storage failure");
                ApiError::Internal
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::AlreadyRegistered => ApiError::Conflict("An account with this email already exists".into()),
            IdentityError::InvalidCredentials => ApiError::Unauthorized("Invalid email or password".into()),
            IdentityError::EmailNotConfirmed => {
                ApiError::Forbidden("Please verify your email before signing in".into())
            }
            IdentityError::NotFound => ApiError::NotFound,
            IdentityError::Rejected(msg) => ApiError::BadRequest(msg),
            IdentityError::Backend(msg) => {
                tracing::error!(error = %msg, "identity provider failure");
                ApiError::Unavailable
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) | ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let fields = match self {
            ApiError::Validation(errs) => Some(field_messages(errs)),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string(), fields })
    }
}
