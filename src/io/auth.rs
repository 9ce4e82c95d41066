//! Credential provider for the spreadsheet API.
//!
//! Tokens are persisted as JSON next to the OAuth client secret so that later
//! runs can reuse or refresh them without prompting the user again.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::AuthError;

/// OAuth scope granting read/write access to spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
/// File holding the OAuth client secret, relative to the credentials directory.
pub const CLIENT_SECRET_FILE: &str = "credentials.json";
/// File holding the persisted token, relative to the credentials directory.
pub const TOKEN_FILE: &str = "token.json";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens expiring within this many seconds are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An access token together with what is needed to refresh it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Bearer token to present to the API; empty when none was issued.
    pub fn access_token(&self) -> &str {
        self.token.as_deref().unwrap_or_default()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - TimeDelta::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.token.as_deref().is_some_and(|token| !token.is_empty()) && !self.is_expired_at(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// The `installed` (desktop) or `web` OAuth client definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Loads a client secret file as downloaded from the cloud console.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let source = fs::read_to_string(path).map_err(|err| AuthError::Store {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let file: ClientSecretFile = serde_json::from_str(&source)
            .map_err(|err| AuthError::InvalidClientSecret(err.to_string()))?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecret("expected an 'installed' or 'web' section".into())
        })
    }
}

/// Reads and writes the persisted token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored token, or `None` when there is none or it cannot be
    /// parsed (the caller then re-authorizes).
    pub fn load(&self) -> Result<Option<Credentials>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let source = fs::read_to_string(&self.path).map_err(|err| self.store_error(err))?;
        match serde_json::from_str(&source) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    /// Writes the token through a temporary file and a rename so a crash never
    /// leaves a truncated token behind.
    pub fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.store_error(err))?;
        }
        let json = serde_json::to_string_pretty(credentials).map_err(|err| self.store_error(err))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|err| self.store_error(err))?;
        fs::rename(&tmp, &self.path).map_err(|err| self.store_error(err))?;
        debug!(path = %self.path.display(), "token persisted");
        Ok(())
    }

    fn store_error(&self, err: impl std::fmt::Display) -> AuthError {
        AuthError::Store {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

/// Talks to the authorization server.
pub trait Authorizer {
    /// Exchanges a refresh token for a new access token.
    fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError>;

    /// Runs the interactive consent flow for a client secret.
    fn authorize(&self, secret: &ClientSecret) -> Result<Credentials, AuthError>;
}

/// Produces valid credentials, reusing, refreshing, or re-authorizing as
/// needed, and persists whatever it had to change.
#[derive(Debug)]
pub struct CredentialProvider<A> {
    store: TokenStore,
    client_secret_path: PathBuf,
    authorizer: A,
}

impl<A: Authorizer> CredentialProvider<A> {
    /// Uses `token.json` and `credentials.json` inside `credentials_dir`.
    pub fn new(credentials_dir: &Path, authorizer: A) -> Self {
        Self {
            store: TokenStore::new(credentials_dir.join(TOKEN_FILE)),
            client_secret_path: credentials_dir.join(CLIENT_SECRET_FILE),
            authorizer,
        }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn obtain(&self) -> Result<Credentials, AuthError> {
        self.obtain_at(Utc::now())
    }

    #[instrument(level = "info", skip_all, fields(token = %self.store.path().display()))]
    pub fn obtain_at(&self, now: DateTime<Utc>) -> Result<Credentials, AuthError> {
        let existing = self.store.load()?;

        let fresh = match existing {
            Some(credentials) if credentials.is_valid_at(now) => {
                debug!("reusing stored token");
                return Ok(credentials);
            }
            Some(credentials) if credentials.is_expired_at(now) && credentials.can_refresh() => {
                info!("stored token expired; refreshing");
                self.authorizer.refresh(&credentials)?
            }
            _ => {
                if !self.client_secret_path.exists() {
                    return Err(AuthError::MissingClientSecret(
                        self.client_secret_path.clone(),
                    ));
                }
                info!("no usable token; starting interactive authorization");
                let secret = ClientSecret::load(&self.client_secret_path)?;
                self.authorizer.authorize(&secret)?
            }
        };

        self.store.save(&fresh)?;
        Ok(fresh)
    }
}

/// [`Authorizer`] backed by the OAuth 2.0 HTTP endpoints and a loopback
/// redirect listener.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    agent: ureq::Agent,
    scopes: Vec<String>,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            scopes: vec![SPREADSHEETS_SCOPE.to_string()],
        }
    }

    fn request_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, String> {
        let response = self
            .agent
            .post(token_uri)
            .send_form(form)
            .map_err(|err| match err {
                ureq::Error::Status(code, response) => {
                    let body = response.into_string().unwrap_or_default();
                    format!("token endpoint returned {code}: {body}")
                }
                other => other.to_string(),
            })?;
        response
            .into_json::<TokenResponse>()
            .map_err(|err| format!("malformed token response: {err}"))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credentials(
        self,
        previous_refresh: Option<String>,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        default_scopes: &[String],
    ) -> Credentials {
        let scopes = match self.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => default_scopes.to_vec(),
        };
        Credentials {
            token: Some(self.access_token),
            refresh_token: self.refresh_token.or(previous_refresh),
            token_uri: Some(token_uri.to_string()),
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            scopes,
            expiry: self
                .expires_in
                .map(|seconds| Utc::now() + TimeDelta::seconds(seconds)),
        }
    }
}

impl Authorizer for OAuthClient {
    fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("no refresh token".into()))?;
        let client_id = credentials
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("token file has no client_id".into()))?;
        let client_secret = credentials.client_secret.as_deref().unwrap_or_default();
        let token_uri = credentials.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let response = self
            .request_token(
                token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ],
            )
            .map_err(AuthError::Refresh)?;

        Ok(response.into_credentials(
            credentials.refresh_token.clone(),
            token_uri,
            client_id,
            client_secret,
            &credentials.scopes,
        ))
    }

    fn authorize(&self, secret: &ClientSecret) -> Result<Credentials, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .map_err(|err| AuthError::Authorization(format!("cannot bind loopback: {err}")))?;
        let port = listener
            .local_addr()
            .map_err(|err| AuthError::Authorization(err.to_string()))?
            .port();
        let redirect_uri = format!("http://localhost:{port}/");
        let state = Uuid::new_v4().simple().to_string();
        let scope = self.scopes.join(" ");

        let consent_url = Url::parse_with_params(
            &secret.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", secret.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|err| AuthError::InvalidClientSecret(format!("auth_uri: {err}")))?;

        println!("Please visit this URL to authorize this application: {consent_url}");
        let code = wait_for_code(&listener, &state)?;

        let response = self
            .request_token(
                &secret.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("client_id", secret.client_id.as_str()),
                    ("client_secret", secret.client_secret.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                ],
            )
            .map_err(AuthError::Authorization)?;

        Ok(response.into_credentials(
            None,
            &secret.token_uri,
            &secret.client_id,
            &secret.client_secret,
            &self.scopes,
        ))
    }
}

/// Accepts loopback requests until one carries the authorization result.
fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String, AuthError> {
    for stream in listener.incoming() {
        let mut stream =
            stream.map_err(|err| AuthError::Authorization(format!("loopback accept: {err}")))?;
        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .map_err(|err| AuthError::Authorization(format!("loopback read: {err}")))?;

        match parse_redirect(&request_line, state) {
            Ok(Some(code)) => {
                respond(
                    &mut stream,
                    "200 OK",
                    "The authentication flow has completed. You may close this window.",
                );
                return Ok(code);
            }
            Ok(None) => respond(&mut stream, "404 Not Found", "Not found."),
            Err(err) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed.");
                return Err(err);
            }
        }
    }
    Err(AuthError::Authorization("loopback listener closed".into()))
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()) {
        debug!(error = %err, "failed to answer loopback request");
    }
}

/// Extracts the authorization code from a redirect request line such as
/// `GET /?state=..&code=.. HTTP/1.1`.
///
/// Returns `Ok(None)` for requests that carry neither a code nor an error
/// (browsers also ask for `/favicon.ico`).
fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Option<String>, AuthError> {
    let target = request_line.split_whitespace().nth(1).unwrap_or_default();
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|err| AuthError::Authorization(format!("bad redirect: {err}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(AuthError::Authorization(format!(
                    "authorization server returned '{value}'"
                )));
            }
            _ => {}
        }
    }

    match code {
        None => Ok(None),
        Some(_) if state.as_deref() != Some(expected_state) => Err(AuthError::Authorization(
            "state mismatch in redirect".into(),
        )),
        Some(code) => Ok(Some(code)),
    }
}
