use async_trait::async_trait;

use crate::listing::SortMode;
use crate::models::*;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("{0}")] InvalidReference(String),
    /// The backing table or database is not there (yet).
    #[error("unavailable")] Unavailable,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub category: Option<Category>,
    pub sort: SortMode,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Pinned first, then newest first (or most viewed for `Popular`).
    async fn list_posts(&self, query: PostQuery) -> RepoResult<Vec<PostView>>;
    async fn get_post(&self, id: &str) -> RepoResult<PostView>;
    async fn get_post_row(&self, id: &str) -> RepoResult<Post>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn increment_view_count(&self, id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    /// Oldest first.
    async fn list_replies(&self, post_id: &str) -> RepoResult<Vec<ReplyView>>;
    async fn get_reply(&self, id: &str) -> RepoResult<Reply>;
    /// Checks the post exists and the parent (if any) belongs to it, then
    /// bumps the post's reply counter.
    async fn create_reply(&self, new: NewReply) -> RepoResult<Reply>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: &str) -> RepoResult<UserProfile>;
    async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>>;
    async fn create_user(&self, new: NewUser) -> RepoResult<UserProfile>;
    async fn update_profile(&self, id: &str, upd: ProfileUpdate) -> RepoResult<UserProfile>;
    async fn set_profile_image(&self, id: &str, url: Option<String>) -> RepoResult<UserProfile>;
    async fn touch_last_login(&self, id: &str) -> RepoResult<()>;
}

pub trait Repo: PostRepo + ReplyRepo + UserRepo {}

impl<T> Repo for T where T: PostRepo + ReplyRepo + UserRepo {}

const PARENT_MISMATCH: &str = "Parent reply does not belong to this post";

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tracing::{error, info, warn};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, UserProfile>,
        // insertion order is creation order
        posts: Vec<Post>,
        replies: Vec<Reply>,
    }

    impl State {
        fn author(&self, id: &str) -> AuthorSummary {
            AuthorSummary::of(self.users.get(id), id)
        }

        fn post_view(&self, post: &Post) -> PostView {
            PostView::from_row(post.clone(), self.author(&post.author_id))
        }

        fn post_mut(&mut self, id: &str) -> RepoResult<&mut Post> {
            self.posts.iter_mut().find(|p| p.id == id).ok_or(RepoError::NotFound)
        }

        fn user_mut(&mut self, id: &str) -> RepoResult<&mut UserProfile> {
            self.users.get_mut(id).ok_or(RepoError::NotFound)
        }
    }

    /// Process-local store. With a snapshot path every write is flushed to
    /// JSON and the file is reloaded on start.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
                        State::default()
                    }
                },
                Err(_) => {
                    info!(path = %path.display(), "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let bytes = match self.read().map(|s| serde_json::to_vec_pretty(&*s)) {
                Ok(Ok(b)) => b,
                Ok(Err(e)) => {
                    error!(error = %e, "failed to serialize snapshot");
                    return;
                }
                Err(_) => return,
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(path.as_path(), bytes) {
                error!(path = %path.display(), error = %e, "failed to write snapshot");
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Moderation flags have no API; used for seeding and tests.
        pub fn set_post_flags(&self, id: &str, pinned: bool, locked: bool) -> RepoResult<()> {
            let mut s = self.write()?;
            let post = s.post_mut(id)?;
            post.is_pinned = pinned;
            post.is_locked = locked;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self, query: PostQuery) -> RepoResult<Vec<PostView>> {
            let s = self.read()?;
            // newest inserted first, so equal timestamps still read newest-first
            let mut v: Vec<&Post> = s
                .posts
                .iter()
                .rev()
                .filter(|p| query.category.map_or(true, |c| p.category == c))
                .collect();
            match query.sort {
                SortMode::Newest => v.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned).then(b.created_at.cmp(&a.created_at))),
                SortMode::Popular => v.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned).then(b.view_count.cmp(&a.view_count))),
            }
            let limit = query.limit.unwrap_or(usize::MAX);
            Ok(v.into_iter().take(limit).map(|p| s.post_view(p)).collect())
        }

        async fn get_post(&self, id: &str) -> RepoResult<PostView> {
            let s = self.read()?;
            let post = s.posts.iter().find(|p| p.id == id).ok_or(RepoError::NotFound)?;
            Ok(s.post_view(post))
        }

        async fn get_post_row(&self, id: &str) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.iter().find(|p| p.id == id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let now = Utc::now();
            let post = Post {
                id: new_id(),
                author_id: new.author_id,
                title: new.title,
                content: new.content,
                category: new.category,
                view_count: 0,
                reply_count: 0,
                is_pinned: false,
                is_locked: false,
                created_at: now,
                updated_at: now,
            };
            s.posts.push(post.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(post)
        }

        async fn increment_view_count(&self, id: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            s.post_mut(id)?.view_count += 1;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyRepo for InMemRepo {
        async fn list_replies(&self, post_id: &str) -> RepoResult<Vec<ReplyView>> {
            let s = self.read()?;
            let mut v: Vec<&Reply> = s.replies.iter().filter(|r| r.post_id == post_id).collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at)); // ascending
            Ok(v.into_iter().map(|r| ReplyView::from_row(r.clone(), s.author(&r.author_id))).collect())
        }

        async fn get_reply(&self, id: &str) -> RepoResult<Reply> {
            let s = self.read()?;
            s.replies.iter().find(|r| r.id == id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
            let mut s = self.write()?;
            s.post_mut(&new.post_id)?;
            if let Some(parent) = new.parent_reply_id.as_deref() {
                let same_post = s.replies.iter().any(|r| r.id == parent && r.post_id == new.post_id);
                if !same_post {
                    return Err(RepoError::InvalidReference(PARENT_MISMATCH.into()));
                }
            }
            let now = Utc::now();
            let reply = Reply {
                id: new_id(),
                post_id: new.post_id,
                author_id: new.author_id,
                parent_reply_id: new.parent_reply_id,
                content: new.content,
                created_at: now,
                updated_at: now,
            };
            s.replies.push(reply.clone());
            s.post_mut(&reply.post_id)?.reply_count += 1;
            drop(s);
            self.persist();
            Ok(reply)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: &str) -> RepoResult<UserProfile> {
            let s = self.read()?;
            s.users.get(id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>> {
            let s = self.read()?;
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<UserProfile> {
            let mut s = self.write()?;
            if s.users.contains_key(&new.id) || s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let user = UserProfile {
                id: new.id,
                email: new.email,
                username: new.username,
                full_name: None,
                profile_image_url: None,
                bio: None,
                location: None,
                education_level: None,
                field_of_interest: None,
                reputation_score: 0,
                is_moderator: false,
                is_admin: false,
                email_verified: new.email_verified,
                created_at: now,
                updated_at: now,
                last_login: None,
            };
            s.users.insert(user.id.clone(), user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn update_profile(&self, id: &str, upd: ProfileUpdate) -> RepoResult<UserProfile> {
            let mut s = self.write()?;

            // uniqueness check before the mutable borrow
            if s.users.values().any(|u| u.username == upd.username && u.id != id) {
                return Err(RepoError::Conflict);
            }

            let user = s.user_mut(id)?;
            user.username = upd.username;
            user.full_name = upd.full_name;
            user.bio = upd.bio;
            user.location = upd.location;
            user.education_level = upd.education_level;
            user.field_of_interest = upd.field_of_interest;
            user.updated_at = Utc::now();

            let updated = user.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn set_profile_image(&self, id: &str, url: Option<String>) -> RepoResult<UserProfile> {
            let mut s = self.write()?;
            let user = s.user_mut(id)?;
            user.profile_image_url = url;
            user.updated_at = Utc::now();
            let updated = user.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn touch_last_login(&self, id: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            s.user_mut(id)?.last_login = Some(Utc::now());
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> RepoResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| RepoError::Internal(e.to_string()))
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("42P01") => RepoError::Unavailable, // undefined_table
                Some("23505") => RepoError::Conflict,
                Some("23503") => RepoError::InvalidReference("referenced row does not exist".into()),
                _ => RepoError::Internal(e.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => RepoError::Unavailable,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[derive(sqlx::FromRow)]
    struct PostRow {
        id: String,
        author_id: String,
        title: String,
        content: String,
        category: String,
        view_count: i64,
        reply_count: i64,
        is_pinned: bool,
        is_locked: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        author_username: Option<String>,
        author_avatar: Option<String>,
    }

    impl PostRow {
        fn into_post(self) -> RepoResult<(Post, AuthorSummary)> {
            let category = self.category.parse().map_err(|e: UnknownVariant| RepoError::Internal(e.to_string()))?;
            let author = AuthorSummary {
                id: self.author_id.clone(),
                username: self.author_username.unwrap_or_else(|| "unknown".into()),
                avatar_url: self.author_avatar,
            };
            let post = Post {
                id: self.id,
                author_id: self.author_id,
                title: self.title,
                content: self.content,
                category,
                view_count: self.view_count,
                reply_count: self.reply_count,
                is_pinned: self.is_pinned,
                is_locked: self.is_locked,
                created_at: self.created_at,
                updated_at: self.updated_at,
            };
            Ok((post, author))
        }

        fn into_view(self) -> RepoResult<PostView> {
            let (post, author) = self.into_post()?;
            Ok(PostView::from_row(post, author))
        }
    }

    #[derive(sqlx::FromRow)]
    struct ReplyRow {
        id: String,
        post_id: String,
        author_id: String,
        parent_reply_id: Option<String>,
        content: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        author_username: Option<String>,
        author_avatar: Option<String>,
    }

    impl ReplyRow {
        fn into_view(self) -> ReplyView {
            let author = AuthorSummary {
                id: self.author_id.clone(),
                username: self.author_username.unwrap_or_else(|| "unknown".into()),
                avatar_url: self.author_avatar,
            };
            let reply = Reply {
                id: self.id,
                post_id: self.post_id,
                author_id: self.author_id,
                parent_reply_id: self.parent_reply_id,
                content: self.content,
                created_at: self.created_at,
                updated_at: self.updated_at,
            };
            ReplyView::from_row(reply, author)
        }
    }

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: String,
        email: String,
        username: String,
        full_name: Option<String>,
        profile_image_url: Option<String>,
        bio: Option<String>,
        location: Option<String>,
        education_level: Option<String>,
        field_of_interest: Option<String>,
        reputation_score: i32,
        is_moderator: bool,
        is_admin: bool,
        email_verified: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        last_login: Option<DateTime<Utc>>,
    }

    impl From<UserRow> for UserProfile {
        fn from(r: UserRow) -> Self {
            UserProfile {
                id: r.id,
                email: r.email,
                username: r.username,
                full_name: r.full_name,
                profile_image_url: r.profile_image_url,
                bio: r.bio,
                location: r.location,
                // unknown values from older rows read as unset
                education_level: r.education_level.and_then(|v| v.parse().ok()),
                field_of_interest: r.field_of_interest,
                reputation_score: r.reputation_score,
                is_moderator: r.is_moderator,
                is_admin: r.is_admin,
                email_verified: r.email_verified,
                created_at: r.created_at,
                updated_at: r.updated_at,
                last_login: r.last_login,
            }
        }
    }

    const POST_SELECT: &str = r#"
        SELECT p.id, p.author_id, p.title, p.content, p.category, p.view_count, p.reply_count,
               p.is_pinned, p.is_locked, p.created_at, p.updated_at,
               u.username AS author_username, u.profile_image_url AS author_avatar
        FROM forum_posts p
        LEFT JOIN users u ON u.id = p.author_id
    "#;

    const REPLY_SELECT: &str = r#"
        SELECT r.id, r.post_id, r.author_id, r.parent_reply_id, r.content, r.created_at, r.updated_at,
               u.username AS author_username, u.profile_image_url AS author_avatar
        FROM forum_replies r
        LEFT JOIN users u ON u.id = r.author_id
    "#;

    const USER_COLUMNS: &str = "id, email, username, full_name, profile_image_url, bio, location, \
        education_level, field_of_interest, reputation_score, is_moderator, is_admin, email_verified, \
        created_at, updated_at, last_login";

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self, query: PostQuery) -> RepoResult<Vec<PostView>> {
            let order = match query.sort {
                SortMode::Newest => "p.created_at",
                SortMode::Popular => "p.view_count",
            };
            let sql = format!(
                "{POST_SELECT} WHERE ($1::text IS NULL OR p.category = $1) ORDER BY p.is_pinned DESC, {order} DESC LIMIT $2"
            );
            let rows = sqlx::query_as::<_, PostRow>(&sql)
                .bind(query.category.map(|c| c.as_str()))
                .bind(query.limit.map(|l| l as i64))
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
            rows.into_iter().map(PostRow::into_view).collect()
        }

        async fn get_post(&self, id: &str) -> RepoResult<PostView> {
            let sql = format!("{POST_SELECT} WHERE p.id = $1");
            let row = sqlx::query_as::<_, PostRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            row.into_view()
        }

        async fn get_post_row(&self, id: &str) -> RepoResult<Post> {
            let sql = format!("{POST_SELECT} WHERE p.id = $1");
            let row = sqlx::query_as::<_, PostRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.into_post()?.0)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let id = new_id();
            sqlx::query("INSERT INTO forum_posts (id, author_id, title, content, category) VALUES ($1,$2,$3,$4,$5)")
                .bind(&id)
                .bind(&new.author_id)
                .bind(&new.title)
                .bind(&new.content)
                .bind(new.category.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            self.get_post_row(&id).await
        }

        async fn increment_view_count(&self, id: &str) -> RepoResult<()> {
            let done = sqlx::query("UPDATE forum_posts SET view_count = view_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyRepo for PgRepo {
        async fn list_replies(&self, post_id: &str) -> RepoResult<Vec<ReplyView>> {
            let sql = format!("{REPLY_SELECT} WHERE r.post_id = $1 ORDER BY r.created_at ASC");
            let rows = sqlx::query_as::<_, ReplyRow>(&sql)
                .bind(post_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(rows.into_iter().map(ReplyRow::into_view).collect())
        }

        async fn get_reply(&self, id: &str) -> RepoResult<Reply> {
            let sql = format!("{REPLY_SELECT} WHERE r.id = $1");
            let row = sqlx::query_as::<_, ReplyRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(Reply {
                id: row.id,
                post_id: row.post_id,
                author_id: row.author_id,
                parent_reply_id: row.parent_reply_id,
                content: row.content,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }

        async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM forum_posts WHERE id = $1")
                .bind(&new.post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            if let Some(parent) = new.parent_reply_id.as_deref() {
                let same_post: Option<(String,)> =
                    sqlx::query_as("SELECT id FROM forum_replies WHERE id = $1 AND post_id = $2")
                        .bind(parent)
                        .bind(&new.post_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(map_err)?;
                if same_post.is_none() {
                    return Err(RepoError::InvalidReference(PARENT_MISMATCH.into()));
                }
            }
            let id = new_id();
            sqlx::query(
                "INSERT INTO forum_replies (id, post_id, author_id, parent_reply_id, content) VALUES ($1,$2,$3,$4,$5)",
            )
            .bind(&id)
            .bind(&new.post_id)
            .bind(&new.author_id)
            .bind(new.parent_reply_id.as_deref())
            .bind(&new.content)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            sqlx::query("UPDATE forum_posts SET reply_count = reply_count + 1 WHERE id = $1")
                .bind(&new.post_id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            self.get_reply(&id).await
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: &str) -> RepoResult<UserProfile> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.into())
        }

        async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.map(Into::into))
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<UserProfile> {
            let sql = format!(
                "INSERT INTO users (id, email, username, email_verified) VALUES ($1,$2,$3,$4) RETURNING {USER_COLUMNS}"
            );
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(&new.id)
                .bind(&new.email)
                .bind(&new.username)
                .bind(new.email_verified)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.into())
        }

        async fn update_profile(&self, id: &str, upd: ProfileUpdate) -> RepoResult<UserProfile> {
            let sql = format!(
                "UPDATE users SET username = $2, full_name = $3, bio = $4, location = $5, education_level = $6, \
                 field_of_interest = $7, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
            );
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .bind(&upd.username)
                .bind(upd.full_name.as_deref())
                .bind(upd.bio.as_deref())
                .bind(upd.location.as_deref())
                .bind(upd.education_level.map(|e| e.as_str()))
                .bind(upd.field_of_interest.as_deref())
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.into())
        }

        async fn set_profile_image(&self, id: &str, url: Option<String>) -> RepoResult<UserProfile> {
            let sql = format!(
                "UPDATE users SET profile_image_url = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
            );
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .bind(url)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(row.into())
        }

        async fn touch_last_login(&self, id: &str) -> RepoResult<()> {
            sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }
    }
}
