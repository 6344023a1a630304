use crate::auth::Role;
use crate::listing::SortMode;
use crate::models::{AuthorSummary, Category, CategoryInfo, EducationLevel, PostView, ReplyView, UserProfile};
use crate::pagination::PageMarker;
use crate::routes::{
    AvatarResponse, CreatedPostResponse, CreatedReplyResponse, LoginResponse, MessageResponse, PostDetailResponse,
    ListedPost, PostListResponse, ProfileResponse, RegisterResponse, SessionUser, TokenResponse,
};
use crate::validation::{
    CreatePostForm, CreateReplyForm, ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm, UpdateProfileForm,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_categories,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::list_replies,
        crate::routes::create_reply,
        crate::routes::delete_post,
        crate::routes::delete_reply,
        crate::routes::report_post,
        crate::routes::report_reply,
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::forgot_password,
        crate::routes::reset_password,
        crate::routes::auth_me,
        crate::routes::refresh_token,
        crate::routes::get_profile,
        crate::routes::update_profile,
        crate::routes::upload_avatar,
        crate::routes::delete_avatar,
    ),
    components(schemas(
        Category, CategoryInfo, EducationLevel, AuthorSummary, PostView, ReplyView, UserProfile,
        SortMode, PageMarker, Role,
        CreatePostForm, CreateReplyForm, LoginForm, RegisterForm, ForgotPasswordForm, ResetPasswordForm,
        UpdateProfileForm,
        ListedPost, PostListResponse, PostDetailResponse, CreatedPostResponse, CreatedReplyResponse, MessageResponse,
        RegisterResponse, LoginResponse, SessionUser, TokenResponse, ProfileResponse, AvatarResponse
    )),
    tags(
        (name = "forum", description = "Posts, replies and categories"),
        (name = "moderation", description = "Placeholder delete and report actions"),
        (name = "auth", description = "Accounts and sessions"),
        (name = "profile", description = "Own profile and avatar"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_forum_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/api/v1/posts", "/api/v1/posts/{id}", "/api/v1/replies", "/api/v1/profile/avatar"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
