//! Client for the hosted identity provider (GoTrue-compatible REST API).
//!
//! Sign-up, sign-in, refresh, sign-out and password recovery are forwarded
//! as single requests; this service never sees password hashes and never
//! issues tokens itself.

use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    base_url: String,
    anon_key: String,
}

/// User record as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl IdentityUser {
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata.get("display_name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: IdentityUser,
}

/// Outcome of a sign-up: a session when the provider auto-confirms,
/// otherwise just the pending user.
#[derive(Debug, Clone, Serialize)]
pub struct SignUp {
    pub user: Option<IdentityUser>,
    pub session: Option<Session>,
}

impl IdentityClient {
    pub fn new(http: Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        redirect_to: &str,
    ) -> AppResult<SignUp> {
        debug!("identity sign_up for {}", email);
        let resp = self
            .with_key(self.http.post(self.url("signup")))
            .bearer_auth(&self.anon_key)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "display_name": display_name },
            }))
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;

        // Auto-confirming providers answer with a session, others with the user.
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body).map_err(bad_payload)?;
            Ok(SignUp {
                user: Some(session.user.clone()),
                session: Some(session),
            })
        } else {
            let user = body
                .get("id")
                .is_some()
                .then(|| serde_json::from_value(body))
                .transpose()
                .map_err(bad_payload)?;
            Ok(SignUp { user, session: None })
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session> {
        debug!("identity sign_in for {}", email);
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AppResult<Session> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> AppResult<Session> {
        let resp = self
            .with_key(self.http.post(self.url("token")))
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Revokes the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> AppResult<()> {
        let resp = self
            .with_key(self.http.post(self.url("logout")))
            .bearer_auth(access_token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Asks the provider to email a password reset link.
    pub async fn recover(&self, email: &str, redirect_to: &str) -> AppResult<()> {
        let resp = self
            .with_key(self.http.post(self.url("recover")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn get_user(&self, access_token: &str) -> AppResult<IdentityUser> {
        let resp = self
            .with_key(self.http.get(self.url("user")))
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Turns a non-success answer into `AppError::Identity` with the provider's message.
async fn check(resp: Response) -> AppResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .unwrap_or("Authentication request failed")
        .to_string();
    warn!("identity provider returned {}: {}", status, message);
    Err(AppError::Identity {
        status: status.as_u16(),
        message,
    })
}

fn bad_payload(err: serde_json::Error) -> AppError {
    AppError::Upstream {
        status: 200,
        body: format!("unexpected identity payload: {err}"),
    }
}
