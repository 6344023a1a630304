#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use guateabroad::auth::decode_jwt;
use guateabroad::identity::inmem::InMemIdentity;
use guateabroad::identity::IdentityProvider;
use guateabroad::repo::inmem::InMemRepo;
use guateabroad::repo::UserRepo;
use guateabroad::storage::FsAvatarStore;
use guateabroad::{configure, AppConfig, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

fn state(repo: &InMemRepo, identity: Arc<InMemIdentity>) -> AppState {
    AppState {
        repo: Arc::new(repo.clone()),
        identity,
        avatars: Arc::new(FsAvatarStore::new(std::env::temp_dir().join("guateabroad-accounts-tests"), "/media")),
        config: Arc::new(AppConfig::for_secret(SECRET)),
    }
}

fn registration(email: &str, username: &str) -> Value {
    json!({
        "email": email,
        "username": username,
        "password": "correct horse battery",
        "confirm_password": "correct horse battery"
    })
}

#[actix_web::test]
async fn register_login_me_refresh_logout() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, Arc::new(InMemIdentity::new())))).configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(registration("ana@example.com", "ana_gt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let reg: Value = test::read_body_json(resp).await;
    assert_eq!(reg["message"], "Account created successfully!");
    let user_id = reg["user_id"].as_str().unwrap().to_string();
    let profile = repo.get_user(&user_id).await.unwrap();
    assert_eq!(profile.username, "ana_gt");
    assert!(profile.last_login.is_none());

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "ana@example.com", "password": "correct horse battery"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let login: Value = test::read_body_json(resp).await;
    assert_eq!(login["message"], "Signed in successfully");
    assert_eq!(login["user"]["username"], "ana_gt");
    assert_eq!(login["user"]["roles"], json!(["user"]));
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(decode_jwt(SECRET, &token).unwrap().sub, user_id);
    assert!(repo.get_user(&user_id).await.unwrap().last_login.is_some());

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["id"], user_id.as_str());
    assert_eq!(me["username"], "ana_gt");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/refresh")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let refreshed: Value = test::call_and_read_body_json(&app, req).await;
    let claims = decode_jwt(SECRET, refreshed["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.username, "ana_gt");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/logout")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn registration_conflicts_and_validation() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, Arc::new(InMemIdentity::new())))).configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(registration("ana@example.com", "ana_gt"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(registration("other@example.com", "ana_gt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "Username is already taken");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(registration("ana@example.com", "someone_else"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "An account with this email already exists");

    let mut bad = registration("new@example.com", "new user!");
    bad["confirm_password"] = json!("something else");
    let req = test::TestRequest::post().uri("/api/v1/auth/register").set_json(bad).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["fields"]["confirm_password"][0], "Passwords do not match");
    assert_eq!(v["fields"]["username"][0], "Username can only contain letters, numbers, and underscores");
}

#[actix_web::test]
async fn login_failures_use_friendly_messages() {
    let repo = InMemRepo::new();
    let identity = Arc::new(InMemIdentity::requiring_confirmation());
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, identity.clone()))).configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(registration("ana@example.com", "ana_gt"))
        .to_request();
    let reg: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reg["message"], "Account created successfully! Please check your email to verify your account.");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "ana@example.com", "password": "correct horse battery"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "Please verify your email before signing in");

    identity.confirm_email(reg["user_id"].as_str().unwrap()).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "ana@example.com", "password": "wrong password"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "Invalid email or password");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "not-an-email", "password": ""}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);
}

#[actix_web::test]
async fn forgot_then_reset_without_signing_in() {
    let repo = InMemRepo::new();
    let identity = Arc::new(InMemIdentity::new());
    identity.sign_up("ana@example.com", "correct horse battery", "ana_gt", "http://localhost:3000/auth/callback").await.unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, identity.clone()))).configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/forgot-password")
        .set_json(json!({"email": "ana@example.com"}))
        .to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["message"], "Check your email for a password reset link");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/forgot-password")
        .set_json(json!({"email": "nope"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);

    // neither a session nor a recovery token
    let body = json!({"password": "new password 123", "confirm_password": "new password 123"});
    let req = test::TestRequest::post().uri("/api/v1/auth/reset-password").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "You must be logged in to change your password");

    let token = identity.pending_reset_token("ana@example.com").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/reset-password")
        .set_json(json!({"password": "new password 123", "confirm_password": "new password 123", "token": token}))
        .to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["message"], "Password updated successfully");
    assert!(identity.sign_in("ana@example.com", "new password 123").await.is_ok());
    assert!(identity.sign_in("ana@example.com", "correct horse battery").await.is_err());

    // the link works once
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/reset-password")
        .set_json(json!({"password": "third password", "confirm_password": "third password", "token": token}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "Password reset link is invalid or has expired");
}

#[actix_web::test]
async fn recovery_token_accepted_as_bearer() {
    let repo = InMemRepo::new();
    let identity = Arc::new(InMemIdentity::new());
    identity.sign_up("ana@example.com", "correct horse battery", "ana_gt", "http://localhost:3000/auth/callback").await.unwrap();
    identity.request_password_reset("ana@example.com", "http://localhost:3000/auth/reset-password").await.unwrap();
    let token = identity.pending_reset_token("ana@example.com").unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, identity.clone()))).configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/reset-password")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(json!({"password": "new password 123", "confirm_password": "new password 123"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert!(identity.sign_in("ana@example.com", "new password 123").await.is_ok());
}

#[actix_web::test]
async fn signed_in_user_changes_password() {
    let repo = InMemRepo::new();
    let identity = Arc::new(InMemIdentity::new());
    identity.sign_up("ana@example.com", "correct horse battery", "ana_gt", "http://localhost:3000/auth/callback").await.unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(&repo, identity.clone()))).configure(configure),
    )
    .await;

    // no profile row: login falls back to the provider's username
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({"email": "ana@example.com", "password": "correct horse battery"}))
        .to_request();
    let login: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(login["user"]["username"], "ana_gt");
    let token = login["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/reset-password")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(json!({"password": "new password 123", "confirm_password": "new password 123"}))
        .to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["message"], "Password updated successfully");

    assert!(identity.sign_in("ana@example.com", "new password 123").await.is_ok());
    assert!(identity.sign_in("ana@example.com", "correct horse battery").await.is_err());
}
