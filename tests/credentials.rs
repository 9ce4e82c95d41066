mod common;

use std::fs;

use chrono::{TimeDelta, Utc};
use common::{StubAuthorizer, token, write_client_secret, write_token};
use sheet_sync::error::AuthError;
use sheet_sync::io::auth::{ClientSecret, CredentialProvider, TOKEN_FILE, TokenStore};
use tempfile::tempdir;

#[test]
fn valid_token_is_returned_unchanged() {
    let dir = tempdir().expect("temporary directory");
    let stored = token("valid", TimeDelta::hours(1), Some("refresh"));
    write_token(dir.path(), &stored);
    let authorizer = StubAuthorizer::default();
    let provider = CredentialProvider::new(dir.path(), authorizer.clone());

    let credentials = provider.obtain().expect("credentials");

    assert_eq!(credentials, stored);
    assert!(authorizer.calls().is_empty());
}

#[test]
fn expired_token_with_refresh_is_refreshed_and_persisted() {
    let dir = tempdir().expect("temporary directory");
    write_token(
        dir.path(),
        &token("stale", TimeDelta::hours(-1), Some("refresh")),
    );
    let authorizer = StubAuthorizer::default();
    let provider = CredentialProvider::new(dir.path(), authorizer.clone());

    let credentials = provider.obtain().expect("credentials");

    assert_eq!(credentials.access_token(), "refreshed-token");
    assert_eq!(credentials.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(authorizer.calls(), vec!["refresh"]);

    let persisted = TokenStore::new(dir.path().join(TOKEN_FILE))
        .load()
        .expect("token loaded")
        .expect("token present");
    assert_eq!(persisted, credentials);
}

#[test]
fn expired_token_without_refresh_needs_client_secret() {
    let dir = tempdir().expect("temporary directory");
    write_token(dir.path(), &token("stale", TimeDelta::hours(-1), None));
    let authorizer = StubAuthorizer::default();
    let provider = CredentialProvider::new(dir.path(), authorizer.clone());

    let err = provider.obtain().expect_err("no client secret");

    assert!(matches!(
        err,
        AuthError::MissingClientSecret(path) if path.ends_with("credentials.json")
    ));
    assert!(authorizer.calls().is_empty());
}

#[test]
fn missing_token_runs_interactive_authorization_and_persists() {
    let dir = tempdir().expect("temporary directory");
    write_client_secret(dir.path());
    let authorizer = StubAuthorizer::default();
    let provider = CredentialProvider::new(dir.path(), authorizer.clone());

    let credentials = provider.obtain().expect("credentials");

    assert_eq!(credentials.access_token(), "fresh-token");
    assert_eq!(credentials.client_id.as_deref(), Some("client-id"));
    assert_eq!(authorizer.calls(), vec!["authorize"]);
    assert!(dir.path().join(TOKEN_FILE).exists());

    // A second run reuses the persisted token.
    let again = provider.obtain().expect("credentials");
    assert_eq!(again, credentials);
    assert_eq!(authorizer.calls(), vec!["authorize"]);
}

#[test]
fn unreadable_token_file_falls_back_to_authorization() {
    let dir = tempdir().expect("temporary directory");
    fs::write(dir.path().join(TOKEN_FILE), "not json").expect("token written");
    write_client_secret(dir.path());
    let authorizer = StubAuthorizer::default();
    let provider = CredentialProvider::new(dir.path(), authorizer.clone());

    provider.obtain().expect("credentials");
    assert_eq!(authorizer.calls(), vec!["authorize"]);
}

#[test]
fn python_style_token_file_is_understood() {
    let dir = tempdir().expect("temporary directory");
    let expiry = (Utc::now() + TimeDelta::hours(1)).format("%Y-%m-%dT%H:%M:%S%.6fZ");
    let json = format!(
        r#"{{"token": "ya29.abc", "refresh_token": "1//xyz", "token_uri": "https://oauth2.googleapis.com/token", "client_id": "id", "client_secret": "secret", "scopes": ["https://www.googleapis.com/auth/spreadsheets"], "universe_domain": "googleapis.com", "account": "", "expiry": "{expiry}"}}"#
    );
    fs::write(dir.path().join(TOKEN_FILE), json).expect("token written");
    let provider = CredentialProvider::new(dir.path(), StubAuthorizer::default());

    let credentials = provider.obtain().expect("credentials");
    assert_eq!(credentials.access_token(), "ya29.abc");
    assert!(credentials.can_refresh());
}

#[test]
fn client_secret_accepts_web_section_and_rejects_others() {
    let dir = tempdir().expect("temporary directory");
    let web = dir.path().join("web.json");
    fs::write(
        &web,
        r#"{"web": {"client_id": "w", "client_secret": "s"}}"#,
    )
    .expect("secret written");
    let secret = ClientSecret::load(&web).expect("secret loaded");
    assert_eq!(secret.client_id, "w");
    assert_eq!(secret.token_uri, "https://oauth2.googleapis.com/token");

    let other = dir.path().join("other.json");
    fs::write(&other, r#"{"service_account": {}}"#).expect("secret written");
    assert!(matches!(
        ClientSecret::load(&other),
        Err(AuthError::InvalidClientSecret(_))
    ));
}
