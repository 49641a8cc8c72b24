use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{AppConfig, AuthMode};
use crate::error::ReportError;
use crate::schemas::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, TokenPair};

/// Lifecycle of the credentials held for the management API.
#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(TokenPair),
    /// A request came back 401; the pair is kept until the refresh
    /// attempt resolves one way or the other.
    ExpiredPendingRefresh(TokenPair),
}

#[derive(Debug, Clone)]
enum AuthBackend {
    /// Long-lived admin token. A 401 against it is terminal — there is
    /// nothing to refresh.
    Static { token: String },
    Login { username: String, password: String },
}

/// Owns the token pair and the login/refresh flows against the API.
///
/// Invariant: whenever the state is `Authenticated`, the pair is the one
/// produced by the most recent successful login or refresh. A failed
/// refresh falls back to a full login before any further request is made.
#[derive(Debug)]
pub struct Session {
    backend: AuthBackend,
    state: SessionState,
}

impl Session {
    pub fn from_config(config: &AppConfig) -> Result<Self, ReportError> {
        let backend = match config.auth_mode {
            AuthMode::Static => AuthBackend::Static {
                token: config
                    .api_admin_token
                    .clone()
                    .ok_or_else(|| ReportError::Config("API_ADMIN_TOKEN missing".to_string()))?,
            },
            AuthMode::Login => AuthBackend::Login {
                username: config
                    .api_username
                    .clone()
                    .ok_or_else(|| ReportError::Config("API_USERNAME missing".to_string()))?,
                password: config
                    .api_password
                    .clone()
                    .ok_or_else(|| ReportError::Config("API_PASSWORD missing".to_string()))?,
            },
        };
        Ok(Self {
            backend,
            state: SessionState::Unauthenticated,
        })
    }

    /// Return a bearer token for the next request, logging in first if
    /// the session has none yet.
    pub async fn bearer(&mut self, http: &Client, base_url: &str) -> Result<String, ReportError> {
        match &self.backend {
            AuthBackend::Static { token } => Ok(token.clone()),
            AuthBackend::Login { .. } => match &self.state {
                SessionState::Authenticated(pair) => Ok(pair.access.clone()),
                _ => self.login(http, base_url).await,
            },
        }
    }

    /// The access token of the current authenticated pair, if any. Lets a
    /// caller whose token was rejected detect that a concurrent refresh
    /// already replaced it.
    pub fn current_access(&self) -> Option<String> {
        match &self.state {
            SessionState::Authenticated(pair) => Some(pair.access.clone()),
            _ => None,
        }
    }

    /// Mark the current access token as rejected. The next call must go
    /// through `refresh` before reusing the pair.
    pub fn invalidate(&mut self) {
        if let SessionState::Authenticated(pair) = &self.state {
            self.state = SessionState::ExpiredPendingRefresh(pair.clone());
        }
    }

    /// Exchange the refresh token for a new access token. Falls back to a
    /// full login when the refresh is rejected; if that fails too the
    /// session drops to `Unauthenticated` and the caller must fail the
    /// current request.
    pub async fn refresh(&mut self, http: &Client, base_url: &str) -> Result<String, ReportError> {
        if matches!(self.backend, AuthBackend::Static { .. }) {
            return Err(ReportError::Auth(
                "admin token rejected by the API and cannot be refreshed".to_string(),
            ));
        }

        let refresh_token = match &self.state {
            SessionState::ExpiredPendingRefresh(pair) | SessionState::Authenticated(pair) => {
                pair.refresh.clone()
            }
            SessionState::Unauthenticated => None,
        };

        if let Some(refresh_token) = refresh_token {
            match self.try_refresh(http, base_url, &refresh_token).await {
                Ok(access) => {
                    self.state = SessionState::Authenticated(TokenPair {
                        access: access.clone(),
                        refresh: Some(refresh_token),
                    });
                    return Ok(access);
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh rejected, re-authenticating from scratch");
                }
            }
        }

        match self.login(http, base_url).await {
            Ok(access) => Ok(access),
            Err(e) => {
                self.state = SessionState::Unauthenticated;
                Err(e)
            }
        }
    }

    async fn login(&mut self, http: &Client, base_url: &str) -> Result<String, ReportError> {
        let (username, password) = match &self.backend {
            AuthBackend::Login { username, password } => (username.clone(), password.clone()),
            AuthBackend::Static { .. } => {
                return Err(ReportError::Auth(
                    "login flow is not available in static token mode".to_string(),
                ));
            }
        };

        let response = http
            .post(format!("{base_url}/login/"))
            .json(&LoginRequest {
                username: &username,
                password: &password,
            })
            .send()
            .await
            .map_err(|e| ReportError::Auth(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Auth(format!("login returned {status}")));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Auth(format!("login response unreadable: {e}")))?;

        let access = body
            .access
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReportError::Auth("login response carried no access token".to_string()))?;

        info!("Authenticated against the management API");
        self.state = SessionState::Authenticated(TokenPair {
            access: access.clone(),
            refresh: body.refresh,
        });
        Ok(access)
    }

    async fn try_refresh(
        &self,
        http: &Client,
        base_url: &str,
        refresh_token: &str,
    ) -> Result<String, ReportError> {
        let response = http
            .post(format!("{base_url}/token/refresh/"))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| ReportError::Auth(format!("refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            return Err(ReportError::Auth(format!(
                "token refresh returned {status} {detail}"
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Auth(format!("refresh response unreadable: {e}")))?;

        body.access
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReportError::Auth("refresh response carried no access token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use chrono_tz::Tz;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login_config() -> AppConfig {
        AppConfig {
            api_base_url: "http://unused".to_string(),
            auth_mode: AuthMode::Login,
            api_admin_token: None,
            api_username: Some("admin".to_string()),
            api_password: Some("secret".to_string()),
            telegram_api_base: "https://api.telegram.org".to_string(),
            telegram_bot_token: "bot-token".to_string(),
            telegram_chat_id: "-100".to_string(),
            report_hour: 7,
            report_timezone: "Asia/Tashkent".parse::<Tz>().unwrap(),
            request_timeout_seconds: 5,
            page_size: 100,
        }
    }

    #[tokio::test]
    async fn login_stores_token_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .and(body_partial_json(json!({"username": "admin"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access": "acc-1", "refresh": "ref-1"})),
            )
            .mount(&server)
            .await;

        let mut session = Session::from_config(&login_config()).unwrap();
        let http = Client::new();
        let access = session.bearer(&http, &server.uri()).await.unwrap();

        assert_eq!(access, "acc-1");
        match &session.state {
            SessionState::Authenticated(pair) => {
                assert_eq!(pair.refresh.as_deref(), Some("ref-1"));
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_without_access_field_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "ok"})))
            .mount(&server)
            .await;

        let mut session = Session::from_config(&login_config()).unwrap();
        let http = Client::new();
        let result = session.bearer(&http, &server.uri()).await;

        assert!(matches!(result, Err(ReportError::Auth(_))));
    }

    #[tokio::test]
    async fn refresh_replaces_access_and_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .and(body_partial_json(json!({"refresh": "ref-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "acc-2"})))
            .mount(&server)
            .await;

        let mut session = Session::from_config(&login_config()).unwrap();
        session.state = SessionState::Authenticated(TokenPair {
            access: "acc-1".to_string(),
            refresh: Some("ref-1".to_string()),
        });
        session.invalidate();

        let http = Client::new();
        let access = session.refresh(&http, &server.uri()).await.unwrap();

        assert_eq!(access, "acc-2");
        match &session.state {
            SessionState::Authenticated(pair) => {
                assert_eq!(pair.access, "acc-2");
                assert_eq!(pair.refresh.as_deref(), Some("ref-1"));
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "token expired"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access": "acc-3", "refresh": "ref-3"})),
            )
            .mount(&server)
            .await;

        let mut session = Session::from_config(&login_config()).unwrap();
        session.state = SessionState::ExpiredPendingRefresh(TokenPair {
            access: "acc-1".to_string(),
            refresh: Some("stale".to_string()),
        });

        let http = Client::new();
        let access = session.refresh(&http, &server.uri()).await.unwrap();

        assert_eq!(access, "acc-3");
    }

    #[tokio::test]
    async fn refresh_and_login_both_failing_drops_to_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut session = Session::from_config(&login_config()).unwrap();
        session.state = SessionState::ExpiredPendingRefresh(TokenPair {
            access: "acc-1".to_string(),
            refresh: Some("stale".to_string()),
        });

        let http = Client::new();
        let result = session.refresh(&http, &server.uri()).await;

        assert!(matches!(result, Err(ReportError::Auth(_))));
        assert!(matches!(&session.state, SessionState::Unauthenticated));
    }

    #[tokio::test]
    async fn static_mode_cannot_refresh() {
        let config = AppConfig {
            auth_mode: AuthMode::Static,
            api_admin_token: Some("admin-token".to_string()),
            api_username: None,
            api_password: None,
            ..login_config()
        };
        let mut session = Session::from_config(&config).unwrap();
        let http = Client::new();

        let bearer = session.bearer(&http, "http://unused").await.unwrap();
        assert_eq!(bearer, "admin-token");

        let result = session.refresh(&http, "http://unused").await;
        assert!(matches!(result, Err(ReportError::Auth(_))));
    }
}
