//! Form schemas. Every request body that creates or changes data is one of
//! these and gets `.validate()`d before anything else happens.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{Category, EducationLevel, ProfileUpdate};

pub static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("static regex"));

fn validate_category(category: &str) -> Result<(), ValidationError> {
    category
        .parse::<Category>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("category").with_message("Please select a category".into()))
}

/// Blank optional text is stored as null.
fn none_if_blank(v: Option<String>) -> Option<String> {
    v.and_then(|s| {
        let t = s.trim();
        if t.is_empty() { None } else { Some(t.to_string()) }
    })
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct LoginForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct RegisterForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(path = *USERNAME_RE, message = "Username can only contain letters, numbers, and underscores")
    )]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ForgotPasswordForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ResetPasswordForm {
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    /// Recovery token from the reset link, when not signed in.
    #[serde(default)]
    pub token: Option<String>,
}

impl ResetPasswordForm {
    pub fn recovery_token(&self) -> Option<String> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreatePostForm {
    #[validate(length(min = 10, max = 200, message = "Title must be between 10 and 200 characters"))]
    pub title: String,
    #[validate(length(min = 50, max = 10000, message = "Content must be between 50 and 10,000 characters"))]
    pub content: String,
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

impl CreatePostForm {
    /// Only meaningful after `validate()` succeeded.
    pub fn category(&self) -> Category {
        self.category.parse().unwrap_or(Category::General)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateReplyForm {
    #[validate(length(min = 10, max = 5000, message = "Reply must be between 10 and 5,000 characters"))]
    pub content: String,
    #[validate(length(min = 1, message = "Post ID is required"))]
    pub post_id: String,
    #[serde(default)]
    pub parent_reply_id: Option<String>,
}

impl CreateReplyForm {
    pub fn parent(&self) -> Option<String> {
        none_if_blank(self.parent_reply_id.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateProfileForm {
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(path = *USERNAME_RE, message = "Username can only contain letters, numbers, and underscores")
    )]
    pub username: String,
    #[validate(length(max = 100, message = "Full name must be at most 100 characters"))]
    pub full_name: Option<String>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,
    pub education_level: Option<EducationLevel>,
    #[validate(length(max = 100, message = "Field of interest must be at most 100 characters"))]
    pub field_of_interest: Option<String>,
}

impl From<UpdateProfileForm> for ProfileUpdate {
    fn from(f: UpdateProfileForm) -> Self {
        ProfileUpdate {
            username: f.username,
            full_name: none_if_blank(f.full_name),
            bio: none_if_blank(f.bio),
            location: none_if_blank(f.location),
            education_level: f.education_level,
            field_of_interest: none_if_blank(f.field_of_interest),
        }
    }
}

/// Field name -> messages, in field-name order.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let msgs = errs
                .iter()
                .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                .collect();
            (field.to_string(), msgs)
        })
        .collect()
}

pub fn first_message(errors: &ValidationErrors) -> String {
    field_messages(errors)
        .into_values()
        .flatten()
        .next()
        .unwrap_or_else(|| "Invalid input".to_string())
}
