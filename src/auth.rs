//! OAuth2 authentication management for Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, info, warn};
use yup_oauth2::ApplicationSecret;

use crate::error::{GmailError, Result};

/// Scopes requested up front so the cached token covers every operation:
/// - gmail.readonly / gmail.modify: scanning and label changes
/// - gmail.send: mailto unsubscribe and subscribe requests
/// - gmail.settings.basic: filter creation and removal
/// - userinfo.email: account identity
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.settings.basic",
    "https://www.googleapis.com/auth/userinfo.email",
];

pub const REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Uses the installed-app flow (a browser opens on first run) and persists
/// tokens to `token_cache_path`; refresh happens inside the authenticator.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = match yup_oauth2::read_application_secret(credentials_path).await {
        Ok(secret) => secret,
        Err(e) => {
            debug!("Credentials file unavailable ({}), trying environment", e);
            load_credentials_from_env().map_err(|_| {
                GmailError::AuthError(format!(
                    "Failed to read credentials from {:?}: {}",
                    credentials_path, e
                ))
            })?
        }
    };

    if let Some(parent) = token_cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Cache one token covering every scope before concurrent calls start
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Load OAuth2 credentials from `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET`
/// and optionally `GMAIL_REDIRECT_URI` (defaults to http://localhost:8080).
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Pull the most useful token out of a persisted token cache.
///
/// A refresh token is preferred since revoking it invalidates the whole grant.
pub fn cached_token(cache: &serde_json::Value) -> Option<String> {
    find_string_field(cache, "refresh_token").or_else(|| find_string_field(cache, "access_token"))
}

fn find_string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => map
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| map.values().find_map(|v| find_string_field(v, key))),
        serde_json::Value::Array(items) => items.iter().find_map(|v| find_string_field(v, key)),
        _ => None,
    }
}

/// Revoke an OAuth2 token at Google's revocation endpoint.
pub async fn revoke_token(http: &reqwest::Client, endpoint: &str, token: &str) -> Result<()> {
    let response = http.post(endpoint).form(&[("token", token)]).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(GmailError::AuthError(format!(
            "Token revocation failed with HTTP {}",
            response.status().as_u16()
        )))
    }
}

/// Revoke the cached grant (best effort) and delete the token cache.
///
/// Returns true when a cache file was removed.
pub async fn logout(http: &reqwest::Client, endpoint: &str, token_cache_path: &Path) -> Result<bool> {
    if !token_cache_path.exists() {
        info!("No cached token at {:?}", token_cache_path);
        return Ok(false);
    }

    let content = tokio::fs::read_to_string(token_cache_path).await?;
    match serde_json::from_str::<serde_json::Value>(&content)
        .ok()
        .as_ref()
        .and_then(cached_token)
    {
        Some(token) => match revoke_token(http, endpoint, &token).await {
            Ok(()) => info!("Revoked OAuth2 grant"),
            Err(e) => warn!("Could not revoke token, removing cache anyway: {}", e),
        },
        None => warn!("Token cache did not contain a token"),
    }

    tokio::fs::remove_file(token_cache_path).await?;
    Ok(true)
}

/// Secure token file permissions on Unix systems (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // Windows relies on ACLs of the user profile directory
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_load_credentials() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "test-client-id",
                "project_id": "test-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost:8080"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let creds = load_credentials(temp_file.path()).await.unwrap();
        assert_eq!(creds.installed.client_id, "test-client-id");
        assert_eq!(creds.installed.client_secret, "test-secret");
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "test content")
            .await
            .unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env() {
        env::set_var("GMAIL_CLIENT_ID", "test-id");
        env::set_var("GMAIL_CLIENT_SECRET", "test-secret");
        env::set_var("GMAIL_REDIRECT_URI", "http://localhost:9999");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.client_id, "test-id");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
        env::remove_var("GMAIL_REDIRECT_URI");
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env_missing() {
        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");

        let err = load_credentials_from_env().unwrap_err();
        assert!(err.to_string().contains("GMAIL_CLIENT_ID"));
    }

    #[test]
    fn test_scopes_cover_send_and_filters() {
        assert_eq!(REQUIRED_SCOPES.len(), 5);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.send"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.settings.basic"));
    }

    #[test]
    fn test_cached_token_prefers_refresh_token() {
        let cache = serde_json::json!([
            {"scopes": ["a"], "token": {"access_token": "ya29.abc", "refresh_token": "1//refresh"}}
        ]);
        assert_eq!(cached_token(&cache).as_deref(), Some("1//refresh"));

        let access_only = serde_json::json!({"token": {"access_token": "ya29.abc"}});
        assert_eq!(cached_token(&access_only).as_deref(), Some("ya29.abc"));

        assert!(cached_token(&serde_json::json!({"scopes": []})).is_none());
    }

    #[tokio::test]
    async fn test_logout_revokes_and_removes_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=1%2F%2Frefresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cache = NamedTempFile::new().unwrap();
        tokio::fs::write(
            cache.path(),
            r#"[{"scopes":["x"],"token":{"access_token":"ya29","refresh_token":"1//refresh"}}]"#,
        )
        .await
        .unwrap();

        let http = reqwest::Client::new();
        let removed = logout(&http, &format!("{}/revoke", server.uri()), cache.path())
            .await
            .unwrap();

        assert!(removed);
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn test_logout_removes_cache_even_if_revoke_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let cache = NamedTempFile::new().unwrap();
        tokio::fs::write(cache.path(), r#"{"token":{"access_token":"ya29"}}"#)
            .await
            .unwrap();

        let http = reqwest::Client::new();
        let removed = logout(&http, &format!("{}/revoke", server.uri()), cache.path())
            .await
            .unwrap();
        assert!(removed);
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn test_logout_without_cache() {
        let http = reqwest::Client::new();
        let removed = logout(&http, REVOKE_ENDPOINT, Path::new("/tmp/no-such-newsletters-token.json"))
            .await
            .unwrap();
        assert!(!removed);
    }
}
