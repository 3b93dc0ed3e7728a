//! Integration tests for registration, login and token verification

mod common;

use collabspace::shared::ErrorKind;
use common::{register, spawn_app};

#[tokio::test]
async fn test_register_login_and_verify_agree_on_identity() {
    let app = spawn_app();
    let registered = register(&app, "Ada", "ada@example.com").await;

    let (user, token) = app
        .state
        .credentials
        .login("ada@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(user.id, registered.id);

    let identity = app.state.credentials.authenticate(&token).unwrap();
    assert_eq!(identity.user_id, registered.id);
    assert_eq!(identity.email, "ada@example.com");
    assert_eq!(identity.name, "Ada");
}

#[tokio::test]
async fn test_email_is_normalised_for_login() {
    let app = spawn_app();
    let registered = register(&app, "Ada", "  Ada@Example.COM ").await;

    let (user, _) = app
        .state
        .credentials
        .login("ada@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(user.id, registered.id);
}

#[tokio::test]
async fn test_duplicate_email_is_a_conflict() {
    let app = spawn_app();
    register(&app, "Ada", "ada@example.com").await;

    let result = app
        .state
        .credentials
        .register("Other", "ada@example.com", "password456")
        .await;
    assert_kind!(result, ErrorKind::Conflict);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_the_same() {
    let app = spawn_app();
    register(&app, "Ada", "ada@example.com").await;

    let wrong_password = app
        .state
        .credentials
        .login("ada@example.com", "not-the-password")
        .await
        .unwrap_err();
    let unknown = app
        .state
        .credentials
        .login("nobody@example.com", "password123")
        .await
        .unwrap_err();

    assert_eq!(wrong_password.kind(), ErrorKind::NotAuthorized);
    assert_eq!(unknown.kind(), ErrorKind::NotAuthorized);
    assert_eq!(wrong_password.message(), unknown.message());
}

#[tokio::test]
async fn test_garbage_and_foreign_tokens_are_rejected() {
    let app = spawn_app();
    let user = register(&app, "Ada", "ada@example.com").await;

    assert_kind!(app.state.credentials.authenticate("not-a-jwt"), ErrorKind::NotAuthorized);

    let mut tampered = user.token.clone();
    tampered.push('x');
    assert_kind!(app.state.credentials.authenticate(&tampered), ErrorKind::NotAuthorized);
}

#[tokio::test]
async fn test_current_user_resolves_token() {
    let app = spawn_app();
    let user = register(&app, "Ada", "ada@example.com").await;

    let me = app.state.credentials.current_user(&user.token).await.unwrap();
    assert_eq!(me.id, user.id);
    assert_ne!(me.password_hash, "password123");
}
