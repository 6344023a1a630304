use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Opaque string ids (UUID v4 text)
pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Scholarships,
    Visa,
    Tests,
    University,
    General,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Scholarships,
        Category::Visa,
        Category::Tests,
        Category::University,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Scholarships => "scholarships",
            Category::Visa => "visa",
            Category::Tests => "tests",
            Category::University => "university",
            Category::General => "general",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Scholarships => "Scholarships",
            Category::Visa => "Visa",
            Category::Tests => "Tests",
            Category::University => "University",
            Category::General => "General",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Scholarships => "Fulbright, LASPAU, and other scholarship programs",
            Category::Visa => "F-1, J-1, and other visa processes",
            Category::Tests => "TOEFL, GRE, SAT preparation and tips",
            Category::University => "Admissions, campus life, and university selection",
            Category::General => "Other discussions and community topics",
        }
    }

    pub fn info(&self) -> CategoryInfo {
        CategoryInfo {
            id: *self,
            label: self.label().to_string(),
            description: self.description().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Undergraduate,
    Graduate,
    Postgraduate,
    Other,
}

impl EducationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "high_school",
            EducationLevel::Undergraduate => "undergraduate",
            EducationLevel::Graduate => "graduate",
            EducationLevel::Postgraduate => "postgraduate",
            EducationLevel::Other => "other",
        }
    }
}

impl FromStr for EducationLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_school" => Ok(EducationLevel::HighSchool),
            "undergraduate" => Ok(EducationLevel::Undergraduate),
            "graduate" => Ok(EducationLevel::Graduate),
            "postgraduate" => Ok(EducationLevel::Postgraduate),
            "other" => Ok(EducationLevel::Other),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryInfo {
    pub id: Category,
    pub label: String,
    pub description: String,
}

// ---------------------------------------------------------------- rows

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub education_level: Option<EducationLevel>,
    pub field_of_interest: Option<String>,
    pub reputation_score: i32,
    pub is_moderator: bool,
    pub is_admin: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub email_verified: bool,
}

/// Profile columns a user may change. `None` clears the column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub education_level: Option<EducationLevel>,
    pub field_of_interest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Id,
    pub author_id: Id,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub view_count: i64,
    pub reply_count: i64,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub author_id: Id,
    pub title: String,
    pub content: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reply {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub parent_reply_id: Option<Id>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReply {
    pub post_id: Id,
    pub author_id: Id,
    pub parent_reply_id: Option<Id>,
    pub content: String,
}

// ---------------------------------------------------------------- views

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthorSummary {
    pub id: Id,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl AuthorSummary {
    pub fn of(user: Option<&UserProfile>, id: &str) -> Self {
        match user {
            Some(u) => AuthorSummary {
                id: u.id.clone(),
                username: u.username.clone(),
                avatar_url: u.profile_image_url.clone(),
            },
            None => AuthorSummary { id: id.to_string(), username: "unknown".into(), avatar_url: None },
        }
    }
}

/// Post shaped for listing and detail views.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub category: CategoryInfo,
    pub author: AuthorSummary,
    pub replies: i64,
    pub views: i64,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

impl PostView {
    pub fn from_row(post: Post, author: AuthorSummary) -> Self {
        PostView {
            id: post.id,
            title: post.title,
            content: post.content,
            category: post.category.info(),
            author,
            replies: post.reply_count,
            views: post.view_count,
            is_pinned: post.is_pinned,
            is_locked: post.is_locked,
            created_at: post.created_at,
        }
    }
}

/// Reply with denormalized author info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReplyView {
    pub id: Id,
    pub post_id: Id,
    pub content: String,
    pub author_id: Id,
    pub author_display_name: String,
    pub author_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub parent_reply_id: Option<Id>,
}

impl ReplyView {
    pub fn from_row(reply: Reply, author: AuthorSummary) -> Self {
        ReplyView {
            id: reply.id,
            post_id: reply.post_id,
            content: reply.content,
            author_id: author.id,
            author_display_name: author.username,
            author_avatar: author.avatar_url,
            created_at: reply.created_at,
            parent_reply_id: reply.parent_reply_id,
        }
    }
}
