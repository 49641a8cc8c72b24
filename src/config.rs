use std::env;

use chrono_tz::Tz;

use crate::error::ReportError;

/// How the reporter authenticates against the management API.
///
/// `Static` uses a long-lived admin bearer token from the environment;
/// `Login` performs the username/password flow and maintains an
/// access/refresh token pair for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Static,
    Login,
}

impl AuthMode {
    fn from_env(value: Option<String>) -> Result<Self, ReportError> {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "" | "static" => Ok(Self::Static),
            "login" => Ok(Self::Login),
            other => Err(ReportError::Config(format!(
                "AUTH_MODE must be 'static' or 'login', got '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Login => "login",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub auth_mode: AuthMode,
    pub api_admin_token: Option<String>,
    pub api_username: Option<String>,
    pub api_password: Option<String>,
    pub telegram_api_base: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub report_hour: u32,
    pub report_timezone: Tz,
    pub request_timeout_seconds: u64,
    pub page_size: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ReportError> {
        let auth_mode = AuthMode::from_env(env_opt("AUTH_MODE"))?;

        let api_admin_token = env_opt("API_ADMIN_TOKEN");
        let api_username = env_opt("API_USERNAME");
        let api_password = env_opt("API_PASSWORD");

        match auth_mode {
            AuthMode::Static if api_admin_token.is_none() => {
                return Err(ReportError::Config(
                    "API_ADMIN_TOKEN is required when AUTH_MODE=static".to_string(),
                ));
            }
            AuthMode::Login if api_username.is_none() || api_password.is_none() => {
                return Err(ReportError::Config(
                    "API_USERNAME and API_PASSWORD are required when AUTH_MODE=login".to_string(),
                ));
            }
            _ => {}
        }

        let telegram_bot_token = env_required("TELEGRAM_BOT_TOKEN")?;
        let telegram_chat_id = env_required("TELEGRAM_CHAT_ID")?;

        let report_hour = env_parse_or("REPORT_HOUR", 7u32);
        if report_hour > 23 {
            return Err(ReportError::Config(format!(
                "REPORT_HOUR must be 0-23, got {report_hour}"
            )));
        }

        let tz_name = env_or("REPORT_TIMEZONE", "Asia/Tashkent");
        let report_timezone: Tz = tz_name
            .parse()
            .map_err(|_| ReportError::Config(format!("unknown REPORT_TIMEZONE '{tz_name}'")))?;

        Ok(Self {
            api_base_url: normalize_base_url(&env_or(
                "API_BASE_URL",
                "https://api.uyreport.uz/api/v1",
            )),
            auth_mode,
            api_admin_token,
            api_username,
            api_password,
            telegram_api_base: normalize_base_url(&env_or(
                "TELEGRAM_API_BASE",
                "https://api.telegram.org",
            )),
            telegram_bot_token,
            telegram_chat_id,
            report_hour,
            report_timezone,
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 15),
            page_size: env_parse_or("PAGE_SIZE", 100),
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_required(key: &str) -> Result<String, ReportError> {
    env_opt(key).ok_or_else(|| ReportError::Config(format!("{key} is required")))
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn normalize_base_url(raw: &str) -> String {
    let mut url = raw.trim().to_string();
    while url.ends_with('/') {
        url.pop();
    }
    url
}
