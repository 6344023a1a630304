//! Identity and session collaborator.
//!
//! Account records (email + password) live with an identity provider, not in
//! the forum tables. The server only asks it to register, check credentials
//! and change passwords; sessions handed to clients are our own JWTs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("already registered")]
    AlreadyRegistered,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email not confirmed")]
    EmailNotConfirmed,
    #[error("not found")]
    NotFound,
    /// Provider refused the request with a user-facing reason.
    #[error("{0}")]
    Rejected(String),
    #[error("backend: {0}")]
    Backend(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `redirect_to` is where the confirmation link lands.
    async fn sign_up(&self, email: &str, password: &str, username: &str, redirect_to: &str) -> IdentityResult<Identity>;
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity>;
    async fn sign_out(&self, user_id: &str) -> IdentityResult<()>;
    /// Sends a reset link pointing at `redirect_to`. Unknown addresses are not reported.
    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> IdentityResult<()>;
    /// Sets a new password for a signed-in account.
    async fn update_password(&self, user_id: &str, password: &str) -> IdentityResult<()>;
    /// Sets a new password using the recovery token carried by a reset link.
    async fn complete_password_reset(&self, recovery_token: &str, password: &str) -> IdentityResult<()>;
    async fn get_user(&self, user_id: &str) -> IdentityResult<Option<Identity>>;
}

const INVALID_RESET_LINK: &str = "Password reset link is invalid or has expired";

// ---------------- In-memory provider (dev / tests) ----------------
pub mod inmem {
    use super::*;
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
        Argon2,
    };
    use std::collections::HashMap;
    use std::sync::RwLock;
    use tracing::info;

    struct Account {
        identity: Identity,
        password_hash: String,
    }

    #[derive(Default)]
    pub struct InMemIdentity {
        accounts: RwLock<HashMap<String, Account>>,
        // one-time recovery token -> user id
        reset_tokens: RwLock<HashMap<String, String>>,
        require_confirmation: bool,
    }

    fn hash_password(pwd: &str) -> IdentityResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(pwd.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| IdentityError::Backend(e.to_string()))
    }

    fn verify_password(hash: &str, pwd: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default().verify_password(pwd.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    fn poisoned<T>(_: T) -> IdentityError {
        IdentityError::Backend("identity lock poisoned".into())
    }

    impl InMemIdentity {
        pub fn new() -> Self {
            Self::default()
        }

        /// New accounts cannot sign in until `confirm_email` is called.
        pub fn requiring_confirmation() -> Self {
            Self { require_confirmation: true, ..Self::default() }
        }

        pub fn confirm_email(&self, user_id: &str) -> IdentityResult<()> {
            let mut accounts = self.accounts.write().map_err(poisoned)?;
            let account = accounts.get_mut(user_id).ok_or(IdentityError::NotFound)?;
            account.identity.email_confirmed = true;
            Ok(())
        }

        /// Recovery token of the latest reset link issued for `email`, if still unused.
        pub fn pending_reset_token(&self, email: &str) -> Option<String> {
            let email = email.trim().to_lowercase();
            let accounts = self.accounts.read().ok()?;
            let user_id = accounts.values().find(|a| a.identity.email == email)?.identity.id.clone();
            let tokens = self.reset_tokens.read().ok()?;
            tokens.iter().find(|(_, uid)| **uid == user_id).map(|(token, _)| token.clone())
        }

        fn set_password(&self, user_id: &str, password: &str) -> IdentityResult<()> {
            let password_hash = hash_password(password)?;
            let mut accounts = self.accounts.write().map_err(poisoned)?;
            let account = accounts.get_mut(user_id).ok_or(IdentityError::NotFound)?;
            account.password_hash = password_hash;
            Ok(())
        }
    }

    #[async_trait]
    impl IdentityProvider for InMemIdentity {
        async fn sign_up(&self, email: &str, password: &str, username: &str, _redirect_to: &str) -> IdentityResult<Identity> {
            let email = email.trim().to_lowercase();
            let password_hash = hash_password(password)?;
            let mut accounts = self.accounts.write().map_err(poisoned)?;
            if accounts.values().any(|a| a.identity.email == email) {
                return Err(IdentityError::AlreadyRegistered);
            }
            let identity = Identity {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                username: Some(username.to_string()),
                email_confirmed: !self.require_confirmation,
                created_at: Utc::now(),
            };
            accounts.insert(identity.id.clone(), Account { identity: identity.clone(), password_hash });
            Ok(identity)
        }

        async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
            let email = email.trim().to_lowercase();
            let accounts = self.accounts.read().map_err(poisoned)?;
            let account = accounts
                .values()
                .find(|a| a.identity.email == email)
                .ok_or(IdentityError::InvalidCredentials)?;
            if !verify_password(&account.password_hash, password) {
                return Err(IdentityError::InvalidCredentials);
            }
            if !account.identity.email_confirmed {
                return Err(IdentityError::EmailNotConfirmed);
            }
            Ok(account.identity.clone())
        }

        async fn sign_out(&self, _user_id: &str) -> IdentityResult<()> {
            Ok(())
        }

        async fn request_password_reset(&self, email: &str, redirect_to: &str) -> IdentityResult<()> {
            let email = email.trim().to_lowercase();
            let user_id = {
                let accounts = self.accounts.read().map_err(poisoned)?;
                match accounts.values().find(|a| a.identity.email == email) {
                    Some(a) => a.identity.id.clone(),
                    None => return Ok(()),
                }
            };
            let token = uuid::Uuid::new_v4().simple().to_string();
            let mut tokens = self.reset_tokens.write().map_err(poisoned)?;
            // a new link supersedes older ones
            tokens.retain(|_, uid| *uid != user_id);
            tokens.insert(token, user_id);
            // no mailer in-process; the link is only logged
            info!(%email, %redirect_to, "password reset requested");
            Ok(())
        }

        async fn update_password(&self, user_id: &str, password: &str) -> IdentityResult<()> {
            self.set_password(user_id, password)
        }

        async fn complete_password_reset(&self, recovery_token: &str, password: &str) -> IdentityResult<()> {
            let user_id = self
                .reset_tokens
                .write()
                .map_err(poisoned)?
                .remove(recovery_token)
                .ok_or_else(|| IdentityError::Rejected(INVALID_RESET_LINK.into()))?;
            self.set_password(&user_id, password)
        }

        async fn get_user(&self, user_id: &str) -> IdentityResult<Option<Identity>> {
            let accounts = self.accounts.read().map_err(poisoned)?;
            Ok(accounts.get(user_id).map(|a| a.identity.clone()))
        }
    }
}

// ---------------- Hosted provider (GoTrue-compatible REST API) ----------------
pub mod hosted {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;
    use tracing::{debug, warn};

    /// Talks to a hosted auth service. The anon key authorises public calls
    /// (sign up / sign in / recover); the service key authorises admin calls.
    pub struct HostedIdentity {
        client: reqwest::Client,
        base_url: String,
        anon_key: String,
        service_key: String,
    }

    #[derive(Deserialize)]
    struct RemoteUser {
        id: String,
        email: Option<String>,
        email_confirmed_at: Option<DateTime<Utc>>,
        created_at: Option<DateTime<Utc>>,
        #[serde(default)]
        user_metadata: serde_json::Value,
        #[serde(default)]
        identities: Option<Vec<serde_json::Value>>,
    }

    impl From<RemoteUser> for Identity {
        fn from(u: RemoteUser) -> Self {
            Identity {
                username: u.user_metadata.get("username").and_then(|v| v.as_str()).map(str::to_string),
                id: u.id,
                email: u.email.unwrap_or_default(),
                email_confirmed: u.email_confirmed_at.is_some(),
                created_at: u.created_at.unwrap_or_else(Utc::now),
            }
        }
    }

    #[derive(Deserialize)]
    struct TokenResponse {
        user: RemoteUser,
    }

    /// Sign up answers with either a session (`{user, access_token}`) or a bare user.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SignUpResponse {
        Session { user: RemoteUser },
        User(RemoteUser),
    }

    #[derive(Deserialize, Default)]
    struct RemoteError {
        #[serde(alias = "error_description", alias = "message")]
        msg: Option<String>,
    }

    impl HostedIdentity {
        pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, service_key: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                anon_key: anon_key.into(),
                service_key: service_key.into(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}/auth/v1{}", self.base_url, path)
        }

        fn public(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
            builder.header("apikey", &self.anon_key).bearer_auth(&self.anon_key)
        }

        fn admin(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
            builder.header("apikey", &self.service_key).bearer_auth(&self.service_key)
        }

        async fn send(&self, req: reqwest::RequestBuilder) -> IdentityResult<reqwest::Response> {
            req.send().await.map_err(|e| IdentityError::Backend(e.to_string()))
        }

        async fn error_message(resp: reqwest::Response) -> (StatusCode, String) {
            let status = resp.status();
            let body: RemoteError = resp.json().await.unwrap_or_default();
            (status, body.msg.unwrap_or_else(|| status.to_string()))
        }
    }

    #[async_trait]
    impl IdentityProvider for HostedIdentity {
        async fn sign_up(&self, email: &str, password: &str, username: &str, redirect_to: &str) -> IdentityResult<Identity> {
            let body = json!({ "email": email, "password": password, "data": { "username": username } });
            let req = self.client.post(self.url("/signup")).query(&[("redirect_to", redirect_to)]).json(&body);
            let resp = self.send(self.public(req)).await?;
            if !resp.status().is_success() {
                let (status, msg) = Self::error_message(resp).await;
                if msg.contains("already registered") {
                    return Err(IdentityError::AlreadyRegistered);
                }
                if status.is_server_error() {
                    return Err(IdentityError::Backend(msg));
                }
                return Err(IdentityError::Rejected(msg));
            }
            let user = match resp.json::<SignUpResponse>().await.map_err(|e| IdentityError::Backend(e.to_string()))? {
                SignUpResponse::Session { user } | SignUpResponse::User(user) => user,
            };
            // an existing, confirmed address comes back with no identities
            if user.identities.as_ref().is_some_and(|ids| ids.is_empty()) {
                return Err(IdentityError::AlreadyRegistered);
            }
            Ok(user.into())
        }

        async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
            let body = json!({ "email": email, "password": password });
            let req = self.client.post(self.url("/token")).query(&[("grant_type", "password")]).json(&body);
            let resp = self.send(self.public(req)).await?;
            if !resp.status().is_success() {
                let (status, msg) = Self::error_message(resp).await;
                if msg.contains("Invalid login credentials") {
                    return Err(IdentityError::InvalidCredentials);
                }
                if msg.contains("Email not confirmed") {
                    return Err(IdentityError::EmailNotConfirmed);
                }
                if status.is_server_error() {
                    return Err(IdentityError::Backend(msg));
                }
                return Err(IdentityError::Rejected(msg));
            }
            let token: TokenResponse = resp.json().await.map_err(|e| IdentityError::Backend(e.to_string()))?;
            Ok(token.user.into())
        }

        async fn sign_out(&self, user_id: &str) -> IdentityResult<()> {
            // provider sessions are never handed to clients, nothing to revoke remotely
            debug!(%user_id, "sign out");
            Ok(())
        }

        async fn request_password_reset(&self, email: &str, redirect_to: &str) -> IdentityResult<()> {
            let req = self
                .client
                .post(self.url("/recover"))
                .query(&[("redirect_to", redirect_to)])
                .json(&json!({ "email": email }));
            let resp = self.send(self.public(req)).await?;
            if !resp.status().is_success() {
                let (status, msg) = Self::error_message(resp).await;
                warn!(%status, %msg, "password reset request refused");
                if status.is_server_error() {
                    return Err(IdentityError::Backend(msg));
                }
                return Err(IdentityError::Rejected(msg));
            }
            Ok(())
        }

        async fn update_password(&self, user_id: &str, password: &str) -> IdentityResult<()> {
            let url = self.url(&format!("/admin/users/{}", urlencoding::encode(user_id)));
            let resp = self.send(self.admin(self.client.put(url).json(&json!({ "password": password })))).await?;
            match resp.status() {
                s if s.is_success() => Ok(()),
                StatusCode::NOT_FOUND => Err(IdentityError::NotFound),
                _ => {
                    let (status, msg) = Self::error_message(resp).await;
                    if status.is_server_error() {
                        Err(IdentityError::Backend(msg))
                    } else {
                        Err(IdentityError::Rejected(msg))
                    }
                }
            }
        }

        async fn complete_password_reset(&self, recovery_token: &str, password: &str) -> IdentityResult<()> {
            // the recovery link signs the user in; its access token authorises the change
            let req = self
                .client
                .put(self.url("/user"))
                .header("apikey", &self.anon_key)
                .bearer_auth(recovery_token)
                .json(&json!({ "password": password }));
            let resp = self.send(req).await?;
            match resp.status() {
                s if s.is_success() => Ok(()),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Rejected(INVALID_RESET_LINK.into())),
                _ => {
                    let (status, msg) = Self::error_message(resp).await;
                    if status.is_server_error() {
                        Err(IdentityError::Backend(msg))
                    } else {
                        Err(IdentityError::Rejected(msg))
                    }
                }
            }
        }

        async fn get_user(&self, user_id: &str) -> IdentityResult<Option<Identity>> {
            let url = self.url(&format!("/admin/users/{}", urlencoding::encode(user_id)));
            let resp = self.send(self.admin(self.client.get(url))).await?;
            match resp.status() {
                StatusCode::NOT_FOUND => Ok(None),
                s if s.is_success() => {
                    let user: RemoteUser = resp.json().await.map_err(|e| IdentityError::Backend(e.to_string()))?;
                    Ok(Some(user.into()))
                }
                _ => {
                    let (_, msg) = Self::error_message(resp).await;
                    Err(IdentityError::Backend(msg))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::inmem::InMemIdentity;
    use super::*;

    const CONFIRM: &str = "http://localhost:3000/auth/callback";
    const RESET: &str = "http://localhost:3000/auth/reset-password";

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let idp = InMemIdentity::new();
        let who = idp.sign_up("Ana@Example.com", "correct horse", "ana_gt", CONFIRM).await.unwrap();
        assert_eq!(who.email, "ana@example.com");
        let again = idp.sign_in("ana@example.com", "correct horse").await.unwrap();
        assert_eq!(again.id, who.id);
        assert_eq!(again.username.as_deref(), Some("ana_gt"));
    }

    #[tokio::test]
    async fn duplicate_email_and_bad_password() {
        let idp = InMemIdentity::new();
        idp.sign_up("ana@example.com", "correct horse", "ana", CONFIRM).await.unwrap();
        assert_eq!(
            idp.sign_up("ana@example.com", "other pass", "ana2", CONFIRM).await.unwrap_err(),
            IdentityError::AlreadyRegistered
        );
        assert_eq!(
            idp.sign_in("ana@example.com", "wrong horse").await.unwrap_err(),
            IdentityError::InvalidCredentials
        );
        assert_eq!(
            idp.sign_in("nobody@example.com", "correct horse").await.unwrap_err(),
            IdentityError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn confirmation_gate() {
        let idp = InMemIdentity::requiring_confirmation();
        let who = idp.sign_up("ana@example.com", "correct horse", "ana", CONFIRM).await.unwrap();
        assert_eq!(
            idp.sign_in("ana@example.com", "correct horse").await.unwrap_err(),
            IdentityError::EmailNotConfirmed
        );
        idp.confirm_email(&who.id).unwrap();
        assert!(idp.sign_in("ana@example.com", "correct horse").await.is_ok());
    }

    #[tokio::test]
    async fn password_change_takes_effect() {
        let idp = InMemIdentity::new();
        let who = idp.sign_up("ana@example.com", "correct horse", "ana", CONFIRM).await.unwrap();
        idp.update_password(&who.id, "battery staple").await.unwrap();
        assert!(idp.sign_in("ana@example.com", "correct horse").await.is_err());
        assert!(idp.sign_in("ana@example.com", "battery staple").await.is_ok());
        assert!(idp.request_password_reset("ghost@example.com", RESET).await.is_ok());
        assert!(idp.pending_reset_token("ghost@example.com").is_none());
    }

    #[tokio::test]
    async fn recovery_token_is_single_use() {
        let idp = InMemIdentity::new();
        idp.sign_up("ana@example.com", "correct horse", "ana", CONFIRM).await.unwrap();
        assert!(idp.pending_reset_token("ana@example.com").is_none());

        idp.request_password_reset("Ana@Example.com", RESET).await.unwrap();
        let first = idp.pending_reset_token("ana@example.com").unwrap();
        idp.request_password_reset("ana@example.com", RESET).await.unwrap();
        let token = idp.pending_reset_token("ana@example.com").unwrap();
        assert_ne!(first, token);
        assert!(matches!(
            idp.complete_password_reset(&first, "battery staple").await.unwrap_err(),
            IdentityError::Rejected(_)
        ));

        idp.complete_password_reset(&token, "battery staple").await.unwrap();
        assert!(idp.sign_in("ana@example.com", "battery staple").await.is_ok());
        assert!(matches!(
            idp.complete_password_reset(&token, "another password").await.unwrap_err(),
            IdentityError::Rejected(_)
        ));
        assert!(idp.pending_reset_token("ana@example.com").is_none());
    }
}
