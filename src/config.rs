use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";
pub const DEFAULT_QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub identity_url: String,
    pub identity_anon_key: String,
    pub gemini_api_key: Option<String>,
    pub gemini_endpoint: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub email_api_key: Option<String>,
    pub email_api_url: String,
    pub email_from: String,
    pub frontend_origin: String,
    pub app_url: String,
    pub qr_endpoint: String,
    pub bind_addr: String,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let frontend_origin = var_or("FRONTEND_ORIGIN", "http://localhost:3000");
        Ok(Self {
            mongo_uri: required("MONGO_URI")?,
            database_name: var_or("DATABASE_NAME", "zeno"),
            jwt_secret: required("JWT_SECRET")?,
            identity_url: required("IDENTITY_URL")?,
            identity_anon_key: required("IDENTITY_ANON_KEY")?,
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_endpoint: var_or("GEMINI_ENDPOINT", DEFAULT_GEMINI_ENDPOINT),
            llm_temperature: parsed("LLM_TEMPERATURE", 0.8)?,
            llm_max_tokens: parsed("LLM_MAX_TOKENS", 200)?,
            email_api_key: env::var("EMAIL_API_KEY").ok().filter(|k| !k.is_empty()),
            email_api_url: var_or("EMAIL_API_URL", "https://api.resend.com"),
            email_from: var_or("EMAIL_FROM", "Zeno <onboarding@resend.dev>"),
            app_url: var_or("APP_URL", &frontend_origin),
            frontend_origin,
            qr_endpoint: var_or("QR_ENDPOINT", DEFAULT_QR_ENDPOINT),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 20)?),
        })
    }

    /// Link a new member follows to join through `code`.
    pub fn join_link(&self, code: &str) -> String {
        format!("{}/?code={}", self.app_url.trim_end_matches('/'), code)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".into(),
        database_name: "zeno_test".into(),
        jwt_secret: "test-secret".into(),
        identity_url: "http://localhost:9999".into(),
        identity_anon_key: "anon".into(),
        gemini_api_key: None,
        gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.into(),
        llm_temperature: 0.8,
        llm_max_tokens: 200,
        email_api_key: None,
        email_api_url: "http://localhost:9998".into(),
        email_from: "Zeno <onboarding@resend.dev>".into(),
        frontend_origin: "http://localhost:3000".into(),
        app_url: "https://zeno.example".into(),
        qr_endpoint: DEFAULT_QR_ENDPOINT.into(),
        bind_addr: "127.0.0.1:0".into(),
        http_timeout: Duration::from_secs(5),
    }
}
