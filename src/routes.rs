use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::TryStreamExt as _;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{create_jwt, Auth, Claims, Role};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::identity::IdentityProvider;
use crate::listing::{filter_and_sort, format_relative_time, ListingFilter, ListingParams};
use crate::models::*;
use crate::pagination::{paginate, visible_page_numbers, PageMarker};
use crate::repo::{PostQuery, Repo, RepoError, RepoResult};
use crate::storage::{accepted_avatar, avatar_path, path_from_url, AvatarStore, AVATAR_SIZE_LIMIT};
use crate::threading::{build_thread, ThreadedReply};
use crate::validation::*;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(web::JsonConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
            .service(web::resource("/categories").route(web::get().to(list_categories)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/replies").route(web::get().to(list_replies)))
            .service(web::resource("/posts/{id}/report").route(web::post().to(report_post)))
            .service(web::resource("/replies").route(web::post().to(create_reply)))
            .service(web::resource("/replies/{id}").route(web::delete().to(delete_reply)))
            .service(web::resource("/replies/{id}/report").route(web::post().to(report_reply)))
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/forgot-password").route(web::post().to(forgot_password)))
            .service(web::resource("/auth/reset-password").route(web::post().to(reset_password)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(
                web::resource("/profile")
                    .route(web::get().to(get_profile))
                    .route(web::put().to(update_profile)),
            )
            .service(
                web::resource("/profile/avatar")
                    .route(web::post().to(upload_avatar))
                    .route(web::delete().to(delete_avatar)),
            ),
    );
    // public fetch route (no /api/v1 prefix so <img src="/media/avatars/..."> works)
    cfg.route("/media/{path:.*}", web::get().to(get_media));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub avatars: Arc<dyn AvatarStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Demo-mode affordance: a missing backing store reads as `fallback()`.
    fn or_demo<T>(&self, res: RepoResult<T>, what: &str, fallback: impl FnOnce() -> T) -> Result<T, ApiError> {
        match res {
            Err(RepoError::Unavailable) if self.config.demo_fallback => {
                warn!(what, "backing store unavailable, serving demo fallback");
                Ok(fallback())
            }
            other => other.map_err(ApiError::from),
        }
    }

    fn issue_token(&self, user_id: &str, username: &str, roles: Vec<Role>) -> Result<String, ApiError> {
        create_jwt(&self.config.jwt_secret, user_id, username, roles, self.config.jwt_ttl_hours).map_err(|e| {
            tracing::error!(error = %e, "failed to sign session token");
            ApiError::Internal
        })
    }
}

fn signed_in(auth: Option<Auth>, action: &str) -> Result<Claims, ApiError> {
    auth.map(|a| a.0).ok_or_else(|| ApiError::login_required(action))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse { message: text.to_string() }
}

// ---------------- Forum -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "forum",
    responses((status = 200, description = "Forum categories", body = [CategoryInfo]))
)]
pub async fn list_categories() -> HttpResponse {
    let categories: Vec<CategoryInfo> = Category::ALL.iter().map(Category::info).collect();
    HttpResponse::Ok().json(categories)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListedPost {
    #[serde(flatten)]
    pub post: PostView,
    /// Age label such as `5 minutes ago`.
    pub created_label: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostListResponse {
    pub items: Vec<ListedPost>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub pages: Vec<PageMarker>,
}

const MAX_PAGE_SIZE: usize = 50;

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    tag = "forum",
    params(ListingParams),
    responses(
        (status = 200, description = "Filtered, sorted and paginated posts", body = PostListResponse),
        (status = 400, description = "Malformed query")
    )
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<ListingParams>) -> Result<HttpResponse, ApiError> {
    let params = query.into_inner();
    let filter = ListingFilter::from_params(&params);
    let loaded = data
        .repo
        .list_posts(PostQuery { category: filter.category.category(), sort: filter.sort, limit: None })
        .await;
    let posts = data.or_demo(loaded, "list_posts", Vec::new)?;
    let sorted = filter_and_sort(posts, &filter);

    let page_size = params.page_size.unwrap_or(data.config.forum_page_size).clamp(1, MAX_PAGE_SIZE);
    let page = params.page.unwrap_or(1);
    let slice = paginate(&sorted, page_size, page);
    let now = chrono::Utc::now();
    let items = slice
        .items
        .into_iter()
        .map(|post| ListedPost { created_label: format_relative_time(post.created_at, now), post })
        .collect();
    Ok(HttpResponse::Ok().json(PostListResponse {
        items,
        page,
        page_size,
        total_items: sorted.len(),
        total_pages: slice.total_pages,
        pages: visible_page_numbers(page, slice.total_pages),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedPostResponse {
    pub message: String,
    pub post_id: Id,
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    tag = "forum",
    request_body = CreatePostForm,
    responses(
        (status = 201, description = "Post created", body = CreatedPostResponse),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_post(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<CreatePostForm>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    let claims = signed_in(auth, "create a post")?;
    let category = form.category();
    let post = data
        .repo
        .create_post(NewPost { author_id: claims.sub, title: form.title, content: form.content, category })
        .await?;
    info!(post_id = %post.id, category = %category, "post created");
    Ok(HttpResponse::Created().json(CreatedPostResponse { message: "Post created successfully!".into(), post_id: post.id }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostDetailResponse {
    pub post: PostView,
    /// Top-level replies, each with its direct children.
    #[schema(value_type = Vec<Object>)]
    pub replies: Vec<ThreadedReply<ReplyView>>,
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    tag = "forum",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with threaded replies", body = PostDetailResponse),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    // view counting never blocks the read
    if let Err(e) = data.repo.increment_view_count(&id).await {
        if e != RepoError::NotFound {
            warn!(post_id = %id, error = %e, "failed to count view");
        }
    }
    let post = data.repo.get_post(&id).await?;
    let replies = data.repo.list_replies(&id).await?;
    Ok(HttpResponse::Ok().json(PostDetailResponse { post, replies: build_thread(replies) }))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/replies",
    tag = "forum",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Threaded replies, oldest first"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_replies(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.get_post_row(&post_id).await?;
    let replies = data.repo.list_replies(&post_id).await?;
    Ok(HttpResponse::Ok().json(build_thread(replies)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedReplyResponse {
    pub message: String,
    pub reply_id: Id,
}

#[utoipa::path(
    post,
    path = "/api/v1/replies",
    tag = "forum",
    request_body = CreateReplyForm,
    responses(
        (status = 201, description = "Reply created", body = CreatedReplyResponse),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Post is locked"),
        (status = 404, description = "Post not found"),
        (status = 422, description = "Validation failed or parent reply belongs to another post")
    )
)]
pub async fn create_reply(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<CreateReplyForm>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    let claims = signed_in(auth, "reply")?;
    let post = data.repo.get_post_row(&form.post_id).await?;
    if post.is_locked {
        return Err(ApiError::Forbidden("This post is locked".into()));
    }
    let parent_reply_id = form.parent();
    let reply = data
        .repo
        .create_reply(NewReply { post_id: post.id, author_id: claims.sub, parent_reply_id, content: form.content })
        .await?;
    Ok(HttpResponse::Created().json(CreatedReplyResponse { message: "Reply posted successfully!".into(), reply_id: reply.id }))
}

// ---------------- Placeholder moderation -----------------------

fn ensure_owner_or_staff(claims: &Claims, author_id: &str, what: &str) -> Result<(), ApiError> {
    if claims.sub == author_id || claims.is_staff() {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!("You can only delete your own {what}")))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    tag = "moderation",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Acknowledged; nothing is deleted", body = MessageResponse),
        (status = 403, description = "Not the author or staff"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "delete a post")?;
    let post = data.repo.get_post_row(&path.into_inner()).await?;
    ensure_owner_or_staff(&claims, &post.author_id, "posts")?;
    info!(post_id = %post.id, by = %claims.sub, "post delete requested (demo mode)");
    Ok(HttpResponse::Ok().json(message("Post deleted (demo mode)")))
}

#[utoipa::path(
    delete,
    path = "/api/v1/replies/{id}",
    tag = "moderation",
    params(("id" = String, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Acknowledged; nothing is deleted", body = MessageResponse),
        (status = 403, description = "Not the author or staff"),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn delete_reply(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "delete a reply")?;
    let reply = data.repo.get_reply(&path.into_inner()).await?;
    ensure_owner_or_staff(&claims, &reply.author_id, "replies")?;
    info!(reply_id = %reply.id, by = %claims.sub, "reply delete requested (demo mode)");
    Ok(HttpResponse::Ok().json(message("Reply deleted (demo mode)")))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/report",
    tag = "moderation",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 202, description = "Report received", body = MessageResponse),
        (status = 404, description = "Post not found")
    )
)]
pub async fn report_post(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "report a post")?;
    let post = data.repo.get_post_row(&path.into_inner()).await?;
    info!(post_id = %post.id, by = %claims.sub, "post reported");
    Ok(HttpResponse::Accepted().json(message("Post reported. Thank you for helping keep the community safe.")))
}

#[utoipa::path(
    post,
    path = "/api/v1/replies/{id}/report",
    tag = "moderation",
    params(("id" = String, Path, description = "Reply id")),
    responses(
        (status = 202, description = "Report received", body = MessageResponse),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn report_reply(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "report a reply")?;
    let reply = data.repo.get_reply(&path.into_inner()).await?;
    info!(reply_id = %reply.id, by = %claims.sub, "reply reported");
    Ok(HttpResponse::Accepted().json(message("Reply reported. Thank you for helping keep the community safe.")))
}

// ---------------- Accounts -----------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Id,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterForm,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 409, description = "Username or email already taken"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterForm>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;

    let taken = data.repo.find_by_username(&form.username).await;
    if data.or_demo(taken, "username check", || None)?.is_some() {
        return Err(ApiError::Conflict("Username is already taken".into()));
    }

    let who = data
        .identity
        .sign_up(&form.email, &form.password, &form.username, &data.config.confirm_redirect())
        .await?;
    let profile = NewUser {
        id: who.id.clone(),
        email: who.email.clone(),
        username: form.username,
        email_verified: who.email_confirmed,
    };
    // the account exists with the provider either way
    if let Err(e) = data.repo.create_user(profile).await {
        tracing::error!(user_id = %who.id, error = %e, "failed to create user profile");
    }

    let text = if who.email_confirmed {
        "Account created successfully!"
    } else {
        "Account created successfully! Please check your email to verify your account."
    };
    Ok(HttpResponse::Created().json(RegisterResponse { message: text.into(), user_id: who.id }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionUser {
    pub id: Id,
    pub username: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: SessionUser,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginForm,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Email not verified")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginForm>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    let who = data.identity.sign_in(&form.email, &form.password).await?;

    let (username, roles) = match data.repo.get_user(&who.id).await {
        Ok(profile) => (profile.username.clone(), Role::for_profile(&profile)),
        Err(e) => {
            if e != RepoError::NotFound {
                warn!(user_id = %who.id, error = %e, "profile lookup failed at sign in");
            }
            (fallback_username(&who.username, &who.email), vec![Role::User])
        }
    };
    if let Err(e) = data.repo.touch_last_login(&who.id).await {
        warn!(user_id = %who.id, error = %e, "failed to update last_login");
    }

    let token = data.issue_token(&who.id, &username, roles.clone())?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Signed in successfully".into(),
        token,
        user: SessionUser { id: who.id, username, roles },
    }))
}

fn fallback_username(username: &Option<String>, email: &str) -> String {
    username
        .clone()
        .or_else(|| email.split('@').next().filter(|s| !s.is_empty()).map(str::to_string))
        .unwrap_or_else(|| "User".into())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Signed out", body = MessageResponse))
)]
pub async fn logout(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.identity.sign_out(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(message("Signed out")))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordForm,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn forgot_password(data: web::Data<AppState>, payload: web::Json<ForgotPasswordForm>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    data.identity.request_password_reset(&form.email, &data.config.password_reset_redirect()).await?;
    Ok(HttpResponse::Ok().json(message("Check your email for a password reset link")))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordForm,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Reset link invalid or expired"),
        (status = 401, description = "Neither signed in nor holding a recovery token"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn reset_password(
    auth: Option<Auth>,
    bearer: Option<BearerAuth>,
    data: web::Data<AppState>,
    payload: web::Json<ResetPasswordForm>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    if let Some(Auth(claims)) = auth {
        data.identity.update_password(&claims.sub, &form.password).await?;
        return Ok(HttpResponse::Ok().json(message("Password updated successfully")));
    }
    // a bearer that is not our session is the provider's recovery token
    let recovery = form
        .recovery_token()
        .or_else(|| bearer.map(|b| b.token().to_string()))
        .ok_or_else(|| ApiError::login_required("change your password"))?;
    data.identity.complete_password_reset(&recovery, &form.password).await?;
    info!("password reset completed from recovery link");
    Ok(HttpResponse::Ok().json(message("Password updated successfully")))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current session", body = SessionUser),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let Claims { sub, username, roles, .. } = auth.0;
    Ok(HttpResponse::Ok().json(SessionUser { id: sub, username, roles }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Fresh session token", body = TokenResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn refresh_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let token = data.issue_token(&auth.0.sub, &auth.0.username, auth.0.roles.clone())?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

// ---------------- Profile -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    tag = "profile",
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No profile row and demo fallback disabled")
    )
)]
pub async fn get_profile(auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "view your profile")?;
    match data.repo.get_user(&claims.sub).await {
        Ok(profile) => Ok(HttpResponse::Ok().json(profile)),
        Err(RepoError::NotFound | RepoError::Unavailable) if data.config.demo_fallback => {
            warn!(user_id = %claims.sub, "no profile row, serving profile built from the session");
            Ok(HttpResponse::Ok().json(session_profile(&data, &claims).await))
        }
        Err(e) => Err(e.into()),
    }
}

/// Stand-in profile for accounts whose row does not exist yet.
async fn session_profile(data: &AppState, claims: &Claims) -> UserProfile {
    let who = data.identity.get_user(&claims.sub).await.ok().flatten();
    let now = chrono::Utc::now();
    UserProfile {
        id: claims.sub.clone(),
        email: who.as_ref().map(|w| w.email.clone()).unwrap_or_default(),
        username: claims.username.clone(),
        full_name: None,
        profile_image_url: None,
        bio: None,
        location: None,
        education_level: None,
        field_of_interest: None,
        reputation_score: 0,
        is_moderator: claims.has_role(Role::Moderator),
        is_admin: claims.has_role(Role::Admin),
        email_verified: who.as_ref().is_some_and(|w| w.email_confirmed),
        created_at: who.as_ref().map(|w| w.created_at).unwrap_or(now),
        updated_at: now,
        last_login: Some(now),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub message: String,
    pub profile: UserProfile,
}

#[utoipa::path(
    put,
    path = "/api/v1/profile",
    tag = "profile",
    request_body = UpdateProfileForm,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Username is already taken"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_profile(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfileForm>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    let claims = signed_in(auth, "update your profile")?;
    if let Some(other) = data.repo.find_by_username(&form.username).await? {
        if other.id != claims.sub {
            return Err(ApiError::Conflict("Username is already taken".into()));
        }
    }
    let profile = data.repo.update_profile(&claims.sub, form.into()).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict("Username is already taken".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Ok().json(ProfileResponse { message: "Profile updated successfully".into(), profile }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvatarResponse {
    pub message: String,
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/profile/avatar",
    tag = "profile",
    responses(
        (status = 200, description = "Avatar stored", body = AvatarResponse),
        (status = 400, description = "No file provided"),
        (status = 401, description = "Not logged in"),
        (status = 413, description = "File larger than 5MB"),
        (status = 415, description = "Not a JPEG, PNG, WebP or GIF image")
    )
)]
pub async fn upload_avatar(auth: Option<Auth>, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "upload an image")?;
    let mut bytes: Vec<u8> = Vec::new();
    let mut found = false;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart error: {e}");
        ApiError::BadRequest("Malformed upload".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        found = true;
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::warn!("stream read error: {e}");
            ApiError::BadRequest("Malformed upload".into())
        })? {
            if bytes.len() + chunk.len() > AVATAR_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge("File too large. Maximum size is 5MB.".into()));
            }
            bytes.extend_from_slice(&chunk);
        }
        break;
    }
    if !found || bytes.is_empty() {
        return Err(ApiError::BadRequest("No file provided".into()));
    }
    let (mime, ext) = accepted_avatar(&bytes).ok_or_else(|| {
        ApiError::UnsupportedMediaType("Invalid file type. Please upload a JPEG, PNG, WebP, or GIF image.".into())
    })?;

    let path = avatar_path(&claims.sub, chrono::Utc::now().timestamp_millis(), ext);
    data.avatars.upload(&path, mime, &bytes).await?;
    let url = data.avatars.public_url(&path);
    data.repo.set_profile_image(&claims.sub, Some(url.clone())).await?;
    log::info!("avatar stored user={} path={path} size={}", claims.sub, bytes.len());
    Ok(HttpResponse::Ok().json(AvatarResponse { message: "Profile image updated successfully".into(), url }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/profile/avatar",
    tag = "profile",
    responses(
        (status = 200, description = "Avatar removed", body = MessageResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn delete_avatar(auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let claims = signed_in(auth, "remove your profile image")?;
    let profile = data.repo.get_user(&claims.sub).await?;
    if let Some(path) = profile.profile_image_url.as_deref().and_then(path_from_url) {
        if let Err(e) = data.avatars.remove(&path).await {
            log::warn!("avatar removal failed path={path}: {e}");
        }
    }
    data.repo.set_profile_image(&claims.sub, None).await?;
    Ok(HttpResponse::Ok().json(message("Profile image removed")))
}

// serve stored avatar bytes
pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let (bytes, mime) = data.avatars.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", mime))
        .insert_header(("Cache-Control", "public, max-age=3600"))
        .body(bytes))
}
