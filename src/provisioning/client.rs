use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::auth::{Authenticator, Credential};
use super::types::{
    CreateKeyRequest, CreateKeyResponse, DeleteKeyRequest, ExtendKeyRequest, GenericResponse,
    TrafficResponse,
};
use super::{Provisioner, KEY_VALIDITY_DAYS};
use crate::config::PanelConfig;
use crate::error::{BotError, Result};
use crate::models::{IssuedKey, UserId};

const ADD_CLIENT_PATH: &str = "xui/inbound/addClient";
const UPDATE_CLIENT_PATH: &str = "xui/inbound/updateClient";
const DEL_CLIENT_PATH: &str = "xui/inbound/delClient";
const CLIENT_TRAFFIC_PATH: &str = "xui/inbound/getClientTraffics";

#[derive(Debug, Default)]
struct Session {
    credential: Option<Credential>,
    /// Bumped on every successful login
    generation: u64,
}

/// HTTP client for the provisioning panel.
///
/// The session credential is shared by all callers. A request rejected as
/// unauthorized triggers one re-login and one retry; a second rejection
/// fails with [`BotError::AuthExhausted`].
pub struct PanelClient {
    base_url: String,
    http: reqwest::Client,
    authenticator: Box<dyn Authenticator>,
    session: RwLock<Session>,
    /// Serializes logins so only one refresh is in flight
    refresh: Mutex<()>,
}

impl PanelClient {
    pub fn new(config: &PanelConfig, authenticator: Box<dyn Authenticator>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("keyrenew/0.1")
            .build()
            .map_err(|e| BotError::Config {
                message: format!("cannot build panel HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: config.base_url.clone(),
            http,
            authenticator,
            session: RwLock::new(Session::default()),
            refresh: Mutex::new(()),
        })
    }

    /// Log in eagerly, replacing any current session.
    pub async fn authenticate(&self) -> Result<()> {
        let generation = self.session.read().await.generation;
        self.refresh_session(generation).await
    }

    async fn current_session(&self) -> Result<(Credential, u64)> {
        let generation = {
            let session = self.session.read().await;
            if let Some(credential) = &session.credential {
                return Ok((credential.clone(), session.generation));
            }
            session.generation
        };

        self.refresh_session(generation).await?;

        let session = self.session.read().await;
        session
            .credential
            .clone()
            .map(|c| (c, session.generation))
            .ok_or_else(|| BotError::AuthFailed {
                message: "no session after login".to_string(),
            })
    }

    /// Replace the session unless another caller already replaced the one
    /// that was observed as `stale_generation`.
    async fn refresh_session(&self, stale_generation: u64) -> Result<()> {
        let _guard = self.refresh.lock().await;

        if self.session.read().await.generation != stale_generation {
            debug!("Panel session already refreshed by another caller");
            return Ok(());
        }

        let credential = self.authenticator.login(&self.http, &self.base_url).await?;

        let mut session = self.session.write().await;
        session.credential = Some(credential);
        session.generation += 1;
        info!(
            generation = session.generation,
            "Authenticated with provisioning panel"
        );
        Ok(())
    }

    async fn send<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> RequestBuilder + Send + Sync,
    {
        let (credential, generation) = self.current_session().await?;
        let response = credential
            .apply(build(&self.http, &self.base_url))
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(operation, response).await;
        }

        debug!(operation, reason = "session_expired", "Re-authenticating...");
        self.refresh_session(generation).await?;

        let (credential, _) = self.current_session().await?;
        let response = credential
            .apply(build(&self.http, &self.base_url))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(operation, "Panel rejected the refreshed session");
            return Err(BotError::AuthExhausted);
        }
        decode(operation, response).await
    }

    async fn post_generic<B>(&self, operation: &'static str, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + Sync,
    {
        let response: GenericResponse = self
            .send(operation, |http, base| {
                http.post(format!("{}{}", base, path)).json(body)
            })
            .await?;

        if !response.success {
            return Err(BotError::Provisioning {
                message: format!("{}: {}", operation, response.message),
            });
        }
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(BotError::Provisioning {
            message: format!("{} failed: status={}", operation, status),
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let truncated: String = text.chars().take(1000).collect();
        debug!(error = %e, response = %truncated, "Failed to parse panel response");
        BotError::Provisioning {
            message: format!("{}: invalid response: {}", operation, e),
        }
    })
}

#[async_trait]
impl Provisioner for PanelClient {
    async fn create_key(&self, subscriber: UserId) -> Result<IssuedKey> {
        let expires_at = Utc::now() + Duration::days(KEY_VALIDITY_DAYS);
        let request = CreateKeyRequest {
            subscriber_id: subscriber,
            label: format!("user-{}", subscriber),
            device_limit: 1,
            data_cap_gb: 0,
            expires_at_unix: expires_at.timestamp(),
            enabled: true,
        };

        let response: CreateKeyResponse = self
            .send("createKey", |http, base| {
                http.post(format!("{}{}", base, ADD_CLIENT_PATH))
                    .json(&request)
            })
            .await?;

        if !response.success {
            return Err(BotError::Provisioning {
                message: format!("createKey: {}", response.message),
            });
        }
        let key = response.key.ok_or_else(|| BotError::Provisioning {
            message: "createKey: response carried no key".to_string(),
        })?;

        info!(subscriber, key_id = %key.id, "Created key");
        Ok(IssuedKey {
            id: key.id,
            expires_at,
        })
    }

    async fn extend_key(&self, key_id: &str, days: i64) -> Result<DateTime<Utc>> {
        // Counted from now, not from the current expiry
        let expires_at = Utc::now() + Duration::days(days);
        let request = ExtendKeyRequest {
            id: key_id,
            expires_at_unix: expires_at.timestamp(),
            operation: "update",
        };

        self.post_generic("extendKey", UPDATE_CLIENT_PATH, &request)
            .await?;
        info!(key_id, days, "Extended key");
        Ok(expires_at)
    }

    async fn delete_key(&self, key_id: &str) -> Result<()> {
        self.post_generic("deleteKey", DEL_CLIENT_PATH, &DeleteKeyRequest { id: key_id })
            .await?;
        info!(key_id, "Deleted key");
        Ok(())
    }

    async fn query_expiry(&self, key_id: &str) -> Result<DateTime<Utc>> {
        let path = format!(
            "{}?id={}",
            CLIENT_TRAFFIC_PATH,
            urlencoding::encode(key_id)
        );
        let response: TrafficResponse = self
            .send("queryTraffic", |http, base| {
                http.get(format!("{}{}", base, path))
            })
            .await?;

        let not_found = || BotError::KeyNotFound {
            key_id: key_id.to_string(),
        };
        if !response.success {
            debug!(key_id, message = %response.message, "Traffic query unsuccessful");
            return Err(not_found());
        }
        let entries = response.entries.unwrap_or_default();
        let entry = entries
            .iter()
            .find(|e| e.id == key_id)
            .or_else(|| entries.first())
            .ok_or_else(not_found)?;

        if !entry.enabled {
            debug!(key_id, "Key is disabled on the panel");
        }
        DateTime::from_timestamp(entry.expires_at_unix, 0).ok_or_else(|| BotError::Provisioning {
            message: format!("queryTraffic: invalid expiry {}", entry.expires_at_unix),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::auth::{BearerAuth, SessionLogin};
    use axum::extract::{Query, State};
    use axum::http::{header, HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fake panel issuing sessions `s1`, `s2`, ... and accepting those at or
    /// above `valid_from`.
    #[derive(Clone, Default)]
    struct FakePanel {
        logins: Arc<AtomicUsize>,
        requests: Arc<AtomicUsize>,
        valid_from: Arc<AtomicUsize>,
        reject_all: Arc<AtomicBool>,
        last_body: Arc<parking_lot::Mutex<Option<serde_json::Value>>>,
    }

    impl FakePanel {
        fn authorized(&self, headers: &HeaderMap) -> bool {
            if self.reject_all.load(Ordering::SeqCst) {
                return false;
            }
            let presented = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("session=s"))
                .or_else(|| {
                    headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.strip_prefix("Bearer s"))
                })
                .and_then(|n| n.parse::<usize>().ok());
            presented.is_some_and(|n| n >= self.valid_from.load(Ordering::SeqCst))
        }

        fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        /// Expire every session issued so far
        fn expire_sessions(&self) {
            self.valid_from.store(self.logins() + 1, Ordering::SeqCst);
        }
    }

    async fn login(State(panel): State<FakePanel>) -> impl IntoResponse {
        let n = panel.logins.fetch_add(1, Ordering::SeqCst) + 1;
        (
            [(header::SET_COOKIE, format!("session=s{}; Path=/; HttpOnly", n))],
            Json(json!({ "success": true, "token": format!("s{}", n) })),
        )
    }

    async fn generic(
        State(panel): State<FakePanel>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> AxumResponse {
        panel.requests.fetch_add(1, Ordering::SeqCst);
        if !panel.authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        let known = body["id"].as_str() != Some("missing");
        *panel.last_body.lock() = Some(body);
        if known {
            Json(json!({ "success": true, "msg": "" })).into_response()
        } else {
            Json(json!({ "success": false, "msg": "client not found" })).into_response()
        }
    }

    async fn add_client(
        State(panel): State<FakePanel>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> AxumResponse {
        panel.requests.fetch_add(1, Ordering::SeqCst);
        if !panel.authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        let id = format!("key-{}", body["id"]);
        *panel.last_body.lock() = Some(body);
        Json(json!({ "success": true, "msg": "", "obj": { "id": id } })).into_response()
    }

    async fn traffic(
        State(panel): State<FakePanel>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> AxumResponse {
        panel.requests.fetch_add(1, Ordering::SeqCst);
        if !panel.authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        match query.get("id").map(String::as_str) {
            Some("abc123") => Json(json!({
                "success": true,
                "msg": "",
                "obj": [{ "id": "abc123", "expiryTime": 1_900_000_000, "enable": true }]
            }))
            .into_response(),
            _ => Json(json!({ "success": true, "msg": "", "obj": null })).into_response(),
        }
    }

    async fn spawn_panel(panel: FakePanel) -> String {
        let app = Router::new()
            .route("/login", post(login))
            .route("/xui/inbound/addClient", post(add_client))
            .route("/xui/inbound/updateClient", post(generic))
            .route("/xui/inbound/delClient", post(generic))
            .route("/xui/inbound/getClientTraffics", get(traffic))
            .with_state(panel);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn panel_config(base_url: String) -> PanelConfig {
        PanelConfig {
            base_url,
            timeout: std::time::Duration::from_secs(5),
        }
    }

    async fn session_client(panel: &FakePanel) -> PanelClient {
        let base_url = spawn_panel(panel.clone()).await;
        PanelClient::new(
            &panel_config(base_url),
            Box::new(SessionLogin::new("admin", "secret")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_logs_in_lazily_on_first_call() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;

        client.extend_key("abc123", 30).await.unwrap();
        assert_eq!(panel.logins(), 1);
        assert_eq!(panel.requests(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_reauthenticates_once() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;
        client.authenticate().await.unwrap();
        panel.expire_sessions();

        let before = Utc::now();
        let expires_at = client.extend_key("abc123", 30).await.unwrap();

        assert_eq!(panel.logins(), 2, "exactly one re-authentication");
        assert_eq!(panel.requests(), 2, "original call retried exactly once");
        assert!(expires_at >= before + Duration::days(30));

        let body = panel.last_body.lock().clone().unwrap();
        assert_eq!(body["operation"], "update");
        assert_eq!(body["id"], "abc123");
    }

    #[tokio::test]
    async fn test_second_rejection_exhausts_auth() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;
        client.authenticate().await.unwrap();
        panel.reject_all.store(true, Ordering::SeqCst);

        let result = client.extend_key("abc123", 30).await;

        assert!(matches!(result, Err(BotError::AuthExhausted)));
        assert_eq!(panel.logins(), 2, "one re-authentication, not two");
        assert_eq!(panel.requests(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let panel = FakePanel::default();
        let client = Arc::new(session_client(&panel).await);
        client.authenticate().await.unwrap();
        panel.expire_sessions();

        let a = {
            let client = client.clone();
            tokio::spawn(async move { client.extend_key("abc123", 30).await })
        };
        let b = {
            let client = client.clone();
            tokio::spawn(async move { client.delete_key("abc123").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(panel.logins(), 2);
    }

    #[tokio::test]
    async fn test_create_key_sends_defaults() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;

        let key = client.create_key(42).await.unwrap();
        assert_eq!(key.id, "key-42");
        assert!(key.expires_at > Utc::now() + Duration::days(29));

        let body = panel.last_body.lock().clone().unwrap();
        assert_eq!(body["email"], "user-42");
        assert_eq!(body["limitIp"], 1);
        assert_eq!(body["totalGB"], 0);
        assert_eq!(body["enable"], true);
    }

    #[tokio::test]
    async fn test_application_failure_is_provisioning_error() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;

        let result = client.extend_key("missing", 30).await;
        assert!(matches!(result, Err(BotError::Provisioning { .. })));
        assert_eq!(panel.logins(), 1);
    }

    #[tokio::test]
    async fn test_query_expiry() {
        let panel = FakePanel::default();
        let client = session_client(&panel).await;

        let expiry = client.query_expiry("abc123").await.unwrap();
        assert_eq!(expiry.timestamp(), 1_900_000_000);

        let missing = client.query_expiry("nope").await;
        assert!(matches!(missing, Err(BotError::KeyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_bearer_login_refreshes_token() {
        let panel = FakePanel::default();
        let base_url = spawn_panel(panel.clone()).await;
        let client = PanelClient::new(
            &panel_config(base_url),
            Box::new(BearerAuth::with_login("admin", "secret")),
        )
        .unwrap();
        client.authenticate().await.unwrap();
        panel.expire_sessions();

        client.delete_key("abc123").await.unwrap();
        assert_eq!(panel.logins(), 2);
    }

    #[tokio::test]
    async fn test_login_failure_propagates_without_retry() {
        let client = PanelClient::new(
            &panel_config("http://127.0.0.1:9/".to_string()),
            Box::new(SessionLogin::new("admin", "secret")),
        )
        .unwrap();

        let result = client.extend_key("abc123", 30).await;
        assert!(matches!(result, Err(BotError::AuthFailed { .. })));
    }
}
