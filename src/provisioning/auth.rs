//! Authentication strategies for the provisioning panel.
//!
//! A deployment either logs in with a username and password and keeps the
//! session cookie, or authenticates with a bearer token (static, or obtained
//! from the same login endpoint).

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{BotError, Result};

const LOGIN_PATH: &str = "login";
const SESSION_COOKIE: &str = "session";

/// Proof of authentication attached to every panel request
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `name=value` pair sent in the Cookie header
    Cookie(String),
    Bearer(String),
}

impl Credential {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Cookie(pair) => request.header(COOKIE, pair),
            Credential::Bearer(token) => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Cookie(_) => write!(f, "Cookie(..)"),
            Credential::Bearer(_) => write!(f, "Bearer(..)"),
        }
    }
}

/// Produces a fresh credential for the panel
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenLoginResponse {
    success: bool,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    token: Option<String>,
}

async fn post_login(
    http: &reqwest::Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<Response> {
    let url = format!("{}{}", base_url, LOGIN_PATH);
    let response = http
        .post(&url)
        .json(&LoginRequest { username, password })
        .send()
        .await
        .map_err(|e| BotError::AuthFailed {
            message: format!("cannot reach panel: {}", e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BotError::AuthFailed {
            message: format!("login returned {}", status),
        });
    }
    Ok(response)
}

/// Username/password login that keeps the session cookie
pub struct SessionLogin {
    username: String,
    password: String,
}

impl SessionLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Authenticator for SessionLogin {
    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential> {
        let response = post_login(http, base_url, &self.username, &self.password).await?;

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|raw| raw.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| pair.contains('='))
            .collect();

        // Fall back to the first cookie if the panel uses a different name
        let pair = cookies
            .iter()
            .find(|pair| pair.split('=').next() == Some(SESSION_COOKIE))
            .or_else(|| cookies.first())
            .cloned()
            .ok_or_else(|| BotError::AuthFailed {
                message: "session cookie not found".to_string(),
            })?;

        debug!("Obtained panel session cookie");
        Ok(Credential::Cookie(pair))
    }
}

/// Bearer token authentication. With credentials the token is requested from
/// the login endpoint; otherwise the configured static token is reused.
pub struct BearerAuth {
    token: Option<String>,
    credentials: Option<(String, String)>,
}

impl BearerAuth {
    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            credentials: None,
        }
    }

    pub fn with_login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            token: None,
            credentials: Some((username.into(), password.into())),
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuth {
    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential> {
        let Some((username, password)) = &self.credentials else {
            return self
                .token
                .clone()
                .map(Credential::Bearer)
                .ok_or_else(|| BotError::AuthFailed {
                    message: "no bearer token configured".to_string(),
                });
        };

        let response = post_login(http, base_url, username, password).await?;
        let body: TokenLoginResponse = response.json().await.map_err(|e| BotError::AuthFailed {
            message: format!("invalid login response: {}", e),
        })?;

        match body.token {
            Some(token) if body.success && !token.is_empty() => {
                debug!("Obtained panel bearer token");
                Ok(Credential::Bearer(token))
            }
            _ => Err(BotError::AuthFailed {
                message: if body.msg.is_empty() {
                    "login response carried no token".to_string()
                } else {
                    body.msg
                },
            }),
        }
    }
}
