use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::ReportError;
use crate::schemas::ExpenseStats;
use crate::services::session::Session;

/// Authenticated client for the property-management API.
///
/// On a 401 the client refreshes the session exactly once and retries the
/// same request exactly once; a second 401 (or a failed refresh) fails the
/// request. All other non-2xx statuses fail immediately without retry.
pub struct ApiClient {
    http: Client,
    base_url: String,
    page_size: u32,
    request_timeout: Duration,
    /// The cycle issues its four fetches concurrently; the mutex keeps
    /// login/refresh transitions serialized across them.
    session: Mutex<Session>,
}

/// Hard ceiling on `next`-link pages per list fetch, so a misbehaving API
/// echoing a self-referential link cannot wedge the cycle.
const MAX_PAGES: usize = 50;

impl ApiClient {
    pub fn new(http: Client, config: &AppConfig, session: Session) -> Self {
        Self {
            http,
            base_url: config.api_base_url.clone(),
            page_size: config.page_size,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            session: Mutex::new(session),
        }
    }

    pub async fn fetch_apartments(&self) -> Result<Vec<Value>, ReportError> {
        self.list_all("/apartments/", "apartments").await
    }

    pub async fn fetch_payments(&self) -> Result<Vec<Value>, ReportError> {
        self.list_all("/payments/", "payments").await
    }

    pub async fn fetch_clients(&self) -> Result<Vec<Value>, ReportError> {
        self.list_all("/users/?user_type=client", "users").await
    }

    /// The statistics endpoint is optional on older API deployments; a
    /// 404 is tolerated and reported as absent rather than failed.
    pub async fn fetch_expense_stats(&self) -> Result<Option<ExpenseStats>, ReportError> {
        let url = format!("{}/expenses/statistics/", self.base_url);
        let response = self.send_authed(&url, "expenses").await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("Expense statistics endpoint not available (404), skipping section");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ReportError::fetch("expenses", format!("API returned {status}")));
        }

        let stats: ExpenseStats = response
            .json()
            .await
            .map_err(|e| ReportError::fetch("expenses", format!("unreadable body: {e}")))?;
        Ok(Some(stats))
    }

    /// Fetch every page of a list endpoint, following the `next` URL the
    /// API returns. Bare-array responses (non-paginated deployments) are
    /// accepted as a single page.
    async fn list_all(
        &self,
        path: &str,
        resource: &'static str,
    ) -> Result<Vec<Value>, ReportError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}{}page_size={}",
            self.base_url, path, separator, self.page_size
        );

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(ReportError::fetch(
                    resource,
                    format!("pagination did not terminate within {MAX_PAGES} pages"),
                ));
            }
            let body = self.get_json(&url, resource).await?;
            match body {
                Value::Array(page) => {
                    items.extend(page);
                    return Ok(items);
                }
                Value::Object(ref obj) => {
                    if let Some(results) = obj.get("results").and_then(Value::as_array) {
                        items.extend(results.iter().cloned());
                    }
                    match obj.get("next").and_then(Value::as_str).filter(|n| !n.is_empty()) {
                        Some(next) => url = next.to_string(),
                        None => return Ok(items),
                    }
                }
                _ => {
                    return Err(ReportError::fetch(
                        resource,
                        "unexpected response shape (not a list or page object)",
                    ));
                }
            }
        }
    }

    async fn get_json(&self, url: &str, resource: &'static str) -> Result<Value, ReportError> {
        let response = self.send_authed(url, resource).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::fetch(resource, format!("API returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| ReportError::fetch(resource, format!("unreadable body: {e}")))
    }

    async fn send_authed(
        &self,
        url: &str,
        resource: &'static str,
    ) -> Result<Response, ReportError> {
        let token = {
            let mut session = self.session.lock().await;
            session.bearer(&self.http, &self.base_url).await?
        };
        let response = self.send(url, &token, resource).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(resource, "Access token rejected (401), refreshing and retrying once");
        let token = {
            let mut session = self.session.lock().await;
            // A concurrent fetch may have refreshed the pair while this
            // request was in flight; reuse its token instead of burning
            // another refresh.
            match session.current_access() {
                Some(current) if current != token => current,
                _ => {
                    session.invalidate();
                    session.refresh(&self.http, &self.base_url).await?
                }
            }
        };

        let retry = self.send(url, &token, resource).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ReportError::Auth(format!(
                "{resource}: still unauthorized after token refresh"
            )));
        }
        Ok(retry)
    }

    async fn send(
        &self,
        url: &str,
        token: &str,
        resource: &'static str,
    ) -> Result<Response, ReportError> {
        self.http
            .get(url)
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReportError::fetch(
                        resource,
                        format!("timed out after {}s", self.request_timeout.as_secs()),
                    )
                } else {
                    ReportError::fetch(resource, format!("request failed: {e}"))
                }
            })
    }
}
